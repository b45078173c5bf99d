/// Inverter nested in a top module, wired through port-to-port bindings
use deltasim::{Sensitivity, SimulationBuilder};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut sim = SimulationBuilder::new();
    let sig_in = sim.signal("sig_in", false)?;
    let sig_out = sim.signal("sig_out", false)?;

    let mut top = sim.module("top")?;
    let top_in = top.in_port::<bool>("top_in")?;
    let top_out = top.out_port::<bool>("top_out")?;
    {
        let mut sub = top.child("sub_instance")?;
        let input = sub.in_port::<bool>("in")?;
        let output = sub.out_port::<bool>("out")?;
        sub.bind_port(&input, &top_in)?;
        sub.bind_port(&output, &top_out)?;
        sub.method("process", Sensitivity::new().on(&input), move |ctx| {
            let value = ctx.read(&input)?;
            ctx.write(&output, !value)
        })?;
    }
    top.bind(&top_in, &sig_in)?;
    top.bind(&top_out, &sig_out)?;

    let mut simulation = sim.build()?;
    simulation.write(&sig_in, true)?;
    simulation.run(Some(1))?;

    println!("Output: {}", simulation.read(&sig_out)? as u8);
    Ok(())
}
