/// Producer and consumer connected by a bounded FIFO of depth 3
use deltasim::{Fifo, ProcessContext, Sensitivity, SimError, SimulationBuilder, Suspend, ThreadProcess};

/// Writes `total` values, pausing `interval` between writes and blocking
/// while the FIFO is full
struct Producer {
    fifo: Fifo<i32>,
    next: i32,
    total: i32,
    interval: u64,
    paused: bool,
}

impl ThreadProcess for Producer {
    fn resume(&mut self, ctx: &mut ProcessContext<'_>) -> Result<Suspend, SimError> {
        if self.next == self.total {
            return Ok(Suspend::Finish);
        }
        if !self.paused {
            self.paused = true;
            return Ok(Suspend::WaitFor(self.interval));
        }
        if !ctx.fifo_try_write(&self.fifo, self.next)? {
            return Ok(Suspend::event(&self.fifo));
        }
        ctx.info(format!("Produced {}", self.next));
        self.next += 1;
        self.paused = false;
        self.resume(ctx)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut sim = SimulationBuilder::new();
    let fifo = sim.fifo::<i32>("fifo", 3)?;

    sim.module("prod")?.thread_process(
        "produce",
        Sensitivity::new(),
        Producer {
            fifo,
            next: 0,
            total: 5,
            interval: 1,
            paused: false,
        },
    )?;

    sim.module("cons")?
        .thread("consume", Sensitivity::new(), move |ctx| match ctx.fifo_try_read(&fifo)? {
            Some(data) => {
                ctx.info(format!("Consumed {}", data));
                Ok(Suspend::WaitFor(2))
            }
            None => Ok(Suspend::event(&fifo)),
        })?;

    let mut simulation = sim.build()?;
    let outcome = simulation.run(Some(20))?;
    println!(
        "{:?} at {} ns, {} item(s) left in the FIFO",
        outcome,
        simulation.time(),
        simulation.fifo_len(&fifo)?
    );
    Ok(())
}
