/// AND gate driven by a stimulus thread and sampled by a monitor thread
use deltasim::{Sensitivity, SimulationBuilder, Suspend};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut sim = SimulationBuilder::new();

    let mut tb = sim.module("tb")?;
    let sig_a = tb.signal("sig_a", false)?;
    let sig_b = tb.signal("sig_b", false)?;
    let sig_out = tb.signal("sig_out", false)?;

    {
        let mut dut = tb.child("dut_instance")?;
        let a = dut.in_port::<bool>("a")?;
        let b = dut.in_port::<bool>("b")?;
        let out = dut.out_port::<bool>("out")?;
        dut.bind(&a, &sig_a)?;
        dut.bind(&b, &sig_b)?;
        dut.bind(&out, &sig_out)?;
        dut.method("process", Sensitivity::new().on(&a).on(&b), move |ctx| {
            let value = ctx.read(&a)? && ctx.read(&b)?;
            ctx.write(&out, value)
        })?;
    }

    // Time | a | b | expected out
    //   0  | 0 | 0 | 0
    //   1  | 0 | 1 | 0
    //   2  | 1 | 0 | 0
    //   3  | 1 | 1 | 1
    let vectors = [(false, false), (false, true), (true, false), (true, true)];
    let mut step = 0;
    tb.thread("stimulus", Sensitivity::new(), move |ctx| {
        match vectors.get(step) {
            Some(&(a, b)) => {
                ctx.write(&sig_a, a)?;
                ctx.write(&sig_b, b)?;
                step += 1;
                Ok(Suspend::WaitFor(1))
            }
            None => {
                ctx.stop();
                Ok(Suspend::Finish)
            }
        }
    })?;

    tb.thread("monitor", Sensitivity::new(), move |ctx| {
        let message = format!(
            "a={}, b={}, out={}",
            ctx.read(&sig_a)? as u8,
            ctx.read(&sig_b)? as u8,
            ctx.read(&sig_out)? as u8
        );
        ctx.info(message);
        Ok(Suspend::WaitFor(1))
    })?;

    let mut simulation = sim.build()?;
    let outcome = simulation.run(None)?;

    println!("Simulation {:?} at {} ns", outcome, simulation.time());
    println!("Final output: {}", simulation.read(&sig_out)? as u8);
    Ok(())
}
