/// Counter incremented on every rising clock edge
use deltasim::{ClockSpec, Sensitivity, SimulationBuilder, Suspend};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut sim = SimulationBuilder::new();
    let clock = sim.clock("my_clock", ClockSpec::new(10))?;
    let count_sig = sim.signal("count_sig", 0i32)?;

    let mut module = sim.module("mod")?;
    let clk = module.in_port::<bool>("clk")?;
    let counter = module.out_port::<i32>("counter")?;
    module.bind(&clk, &clock.signal())?;
    module.bind(&counter, &count_sig)?;

    let mut count = 0;
    module.thread(
        "increment",
        Sensitivity::new().posedge(&clk).dont_initialize(),
        move |ctx| {
            if ctx.posedge(&clk)? {
                count += 1;
                ctx.write(&counter, count)?;
                ctx.info(format!("Counter incremented to {}", count));
            }
            Ok(Suspend::Wait)
        },
    )?;

    let mut simulation = sim.build()?;
    let outcome = simulation.run(Some(100))?;

    println!(
        "{:?} at {} ns after {} delta cycles, counter = {}",
        outcome,
        simulation.time(),
        simulation.delta_count(),
        simulation.read(&count_sig)?
    );
    Ok(())
}
