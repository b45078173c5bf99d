/// A buffer read right after it is written still returns the previous value
use deltasim::{Sensitivity, SimulationBuilder};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut sim = SimulationBuilder::new();
    let s1 = sim.signal("s1", false)?;
    let s2 = sim.signal("s2", false)?;
    let s_out = sim.signal("s_out", false)?;

    let mut buf = sim.module("buf")?;
    let in1 = buf.in_port::<bool>("in1")?;
    let in2 = buf.in_port::<bool>("in2")?;
    let out = buf.out_port::<bool>("out")?;
    let internal = buf.buffer("internal_buf", false)?;
    buf.bind(&in1, &s1)?;
    buf.bind(&in2, &s2)?;
    buf.bind(&out, &s_out)?;

    buf.method("process", Sensitivity::new().on(&in1).on(&in2), move |ctx| {
        let (a, b) = (ctx.read(&in1)?, ctx.read(&in2)?);
        ctx.info(format!("Processing inputs {} and {}", a as u8, b as u8));
        let temp = a && b;
        ctx.write(&internal, temp)?;
        let buffered = ctx.read(&internal)?;
        ctx.info(format!("temp: {}, reading buffer: {}", temp as u8, buffered as u8));
        ctx.write(&out, buffered)
    })?;

    let mut simulation = sim.build()?;

    simulation.write(&s1, true)?;
    simulation.write(&s2, false)?;
    simulation.run(Some(1))?;
    println!("Input (true, false) Output 1: {}", simulation.read(&s_out)? as u8);

    simulation.write(&s1, true)?;
    simulation.write(&s2, true)?;
    simulation.run(Some(1))?;
    println!("Input (true, true) Output 2: {}", simulation.read(&s_out)? as u8);
    Ok(())
}
