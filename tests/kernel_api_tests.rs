use deltasim::{
    ClockSpec, Fifo, Port, ProcessContext, RunOutcome, Sensitivity, Severity, SimError,
    SimulationBuilder, SimulationConfig, Suspend, ThreadProcess,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cell::RefCell;
use std::rc::Rc;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// AND gate with ports a, b and out, driven by the caller's signals
fn and_gate(
    sim: &mut SimulationBuilder,
    name: &str,
) -> Result<(Port<bool>, Port<bool>, Port<bool>), SimError> {
    let mut dut = sim.module(name)?;
    let a = dut.in_port::<bool>("a")?;
    let b = dut.in_port::<bool>("b")?;
    let out = dut.out_port::<bool>("out")?;
    dut.method("process", Sensitivity::new().on(&a).on(&b), move |ctx| {
        let value = ctx.read(&a)? && ctx.read(&b)?;
        ctx.write(&out, value)
    })?;
    Ok((a, b, out))
}

#[test]
fn test_and_gate_testbench() {
    init_logging();
    let mut sim = SimulationBuilder::new();
    let sig_a = sim.signal("sig_a", false).unwrap();
    let sig_b = sim.signal("sig_b", false).unwrap();
    let sig_out = sim.signal("sig_out", false).unwrap();

    let (a, b, out) = and_gate(&mut sim, "dut").unwrap();
    sim.bind(&a, &sig_a).unwrap();
    sim.bind(&b, &sig_b).unwrap();
    sim.bind(&out, &sig_out).unwrap();

    let samples = Rc::new(RefCell::new(Vec::new()));
    let log = samples.clone();
    let mut tb = sim.module("tb").unwrap();

    let vectors = [(false, false), (false, true), (true, false), (true, true)];
    let mut step = 0;
    tb.thread("stimulus", Sensitivity::new(), move |ctx| {
        if let Some(&(a, b)) = vectors.get(step) {
            ctx.write(&sig_a, a)?;
            ctx.write(&sig_b, b)?;
            step += 1;
            return Ok(Suspend::WaitFor(1));
        }
        ctx.stop();
        Ok(Suspend::Finish)
    })
    .unwrap();

    // Samples the committed values of the previous instant
    tb.thread("monitor", Sensitivity::new(), move |ctx| {
        let out = ctx.read(&sig_out)?;
        ctx.info(format!("out={}", out as u8));
        log.borrow_mut().push((ctx.time().ticks(), out));
        Ok(Suspend::WaitFor(1))
    })
    .unwrap();

    let mut sim = sim.build().unwrap();
    assert_eq!(sim.run(None).unwrap(), RunOutcome::Stopped);
    assert_eq!(sim.time().ticks(), 4);
    assert!(sim.read(&sig_out).unwrap());

    let samples = samples.borrow();
    let outputs: Vec<bool> = samples.iter().map(|(_, out)| *out).collect();
    assert_eq!(samples.iter().map(|(t, _)| *t).collect::<Vec<_>>(), vec![0, 1, 2, 3]);
    assert_eq!(outputs, vec![false, false, false, false]);
    assert_eq!(sim.diagnostics().len(), 4);
}

#[test]
fn test_and_gate_external_stimulus() {
    init_logging();
    let mut sim = SimulationBuilder::new();
    let sig_a = sim.signal("a", false).unwrap();
    let sig_b = sim.signal("b", false).unwrap();
    let sig_out = sim.signal("out", true).unwrap();
    let (a, b, out) = and_gate(&mut sim, "dut").unwrap();
    sim.bind(&a, &sig_a).unwrap();
    sim.bind(&b, &sig_b).unwrap();
    sim.bind(&out, &sig_out).unwrap();
    let mut sim = sim.build().unwrap();

    let mut outputs = Vec::new();
    for (a, b) in [(false, false), (false, true), (true, false), (true, true)] {
        sim.write(&sig_a, a).unwrap();
        sim.write(&sig_b, b).unwrap();
        sim.run(Some(1)).unwrap();
        outputs.push(sim.read(&sig_out).unwrap());
    }
    assert_eq!(outputs, vec![false, false, false, true]);
}

#[test]
fn test_and_gate_random_vectors() {
    init_logging();
    let mut sim = SimulationBuilder::new();
    let sig_a = sim.signal("a", false).unwrap();
    let sig_b = sim.signal("b", false).unwrap();
    let sig_out = sim.signal("out", false).unwrap();
    let (a, b, out) = and_gate(&mut sim, "dut").unwrap();
    sim.bind_by_name("dut.a", "a").unwrap();
    sim.bind_by_name("dut.b", "b").unwrap();
    sim.bind_by_name("dut.out", "out").unwrap();
    let mut sim = sim.build().unwrap();

    let mut rng = StdRng::seed_from_u64(0x5eed);
    for _ in 0..64 {
        let (x, y) = (rng.gen::<bool>(), rng.gen::<bool>());
        sim.write(&sig_a, x).unwrap();
        sim.write(&sig_b, y).unwrap();
        sim.run(Some(1)).unwrap();
        assert_eq!(sim.read(&sig_out).unwrap(), x && y);
        // Ports read through to the bound signals
        assert_eq!(sim.read(&a).unwrap(), x);
        assert_eq!(sim.read(&b).unwrap(), y);
        assert_eq!(sim.read(&out).unwrap(), x && y);
    }
    assert_eq!(sim.time().ticks(), 64);
}

#[test]
fn test_passthrough_loopback_converges() {
    init_logging();
    let mut sim = SimulationBuilder::new();
    let sig = sim.signal("sig", false).unwrap();
    let mut m = sim.module("mod").unwrap();
    let input = m.in_port::<bool>("in_port").unwrap();
    let output = m.out_port::<bool>("out_port").unwrap();
    m.bind(&input, &sig).unwrap();
    m.bind(&output, &sig).unwrap();
    m.method("process", Sensitivity::new().on(&input), move |ctx| {
        let value = ctx.read(&input)?;
        ctx.write(&output, value)?;
        ctx.info("Data passed through");
        Ok(())
    })
    .unwrap();

    let mut sim = sim.build().unwrap();
    sim.write(&sig, true).unwrap();
    assert_eq!(sim.run(Some(1)).unwrap(), RunOutcome::Starved);
    assert!(sim.read(&sig).unwrap());
    assert_eq!(sim.diagnostics().len(), 1);
    assert_eq!(sim.diagnostics()[0].source, "mod");
}

#[test]
fn test_clocked_counter_static_posedge() {
    init_logging();
    let mut sim = SimulationBuilder::new();
    let clock = sim.clock("my_clock", ClockSpec::new(10)).unwrap();
    let count_sig = sim.signal("count_sig", 0i32).unwrap();

    let mut m = sim.module("mod").unwrap();
    let clk = m.in_port::<bool>("clk").unwrap();
    let counter = m.out_port::<i32>("counter").unwrap();
    m.bind(&clk, &clock.signal()).unwrap();
    m.bind(&counter, &count_sig).unwrap();

    let mut count = 0;
    m.thread("increment", Sensitivity::new().posedge(&clk), move |ctx| {
        if ctx.posedge(&clk)? {
            count += 1;
            ctx.write(&counter, count)?;
        }
        Ok(Suspend::Wait)
    })
    .unwrap();

    let mut sim = sim.build().unwrap();
    assert_eq!(sim.run(Some(100)).unwrap(), RunOutcome::TimeLimit);
    assert_eq!(sim.read(&count_sig).unwrap(), 10);
    assert_eq!(sim.time().ticks(), 100);
}

#[test]
fn test_clocked_counter_dynamic_edge_wait() {
    init_logging();
    let mut sim = SimulationBuilder::new();
    let clock = sim.clock("clk", ClockSpec::new(10)).unwrap();
    let count = sim.signal("count", 0u32).unwrap();
    let clk = clock.signal();

    sim.module("counter")
        .unwrap()
        .thread("run", Sensitivity::new(), move |ctx| {
            if ctx.posedge(&clk)? {
                let value = ctx.read(&count)?;
                ctx.write(&count, value + 1)?;
            }
            Ok(Suspend::posedge(&clk))
        })
        .unwrap();

    let mut sim = sim.build().unwrap();
    sim.run(Some(100)).unwrap();
    assert_eq!(sim.read(&count).unwrap(), 10);

    // Continuing from the same state
    sim.run(Some(50)).unwrap();
    assert_eq!(sim.read(&count).unwrap(), 15);
}

#[test]
fn test_hierarchical_inverter() {
    init_logging();
    let mut sim = SimulationBuilder::new();
    let sig_in = sim.signal("sig_in", false).unwrap();
    let sig_out = sim.signal("sig_out", false).unwrap();

    let mut top = sim.module("top").unwrap();
    let top_in = top.in_port::<bool>("top_in").unwrap();
    let top_out = top.out_port::<bool>("top_out").unwrap();
    {
        let mut sub = top.child("sub_instance").unwrap();
        let input = sub.in_port::<bool>("in").unwrap();
        let output = sub.out_port::<bool>("out").unwrap();
        sub.bind_port(&input, &top_in).unwrap();
        sub.bind_port(&output, &top_out).unwrap();
        sub.method("process", Sensitivity::new().on(&input), move |ctx| {
            let value = ctx.read(&input)?;
            ctx.write(&output, !value)
        })
        .unwrap();
    }
    top.bind(&top_in, &sig_in).unwrap();
    top.bind(&top_out, &sig_out).unwrap();

    let mut sim = sim.build().unwrap();
    sim.write(&sig_in, true).unwrap();
    sim.run(Some(1)).unwrap();
    assert!(!sim.read(&sig_out).unwrap());

    sim.write(&sig_in, false).unwrap();
    sim.run(Some(1)).unwrap();
    assert!(sim.read(&sig_out).unwrap());

    let inner = sim.find_port::<bool>("top.sub_instance.out").unwrap();
    assert!(sim.read(&inner).unwrap());
}

#[test]
fn test_buffer_read_after_write_sees_old_value() {
    init_logging();
    let mut sim = SimulationBuilder::new();
    let s1 = sim.signal("s1", false).unwrap();
    let s2 = sim.signal("s2", false).unwrap();
    let s_out = sim.signal("s_out", false).unwrap();

    let mut buf = sim.module("buf").unwrap();
    let in1 = buf.in_port::<bool>("in1").unwrap();
    let in2 = buf.in_port::<bool>("in2").unwrap();
    let out = buf.out_port::<bool>("out").unwrap();
    let internal = buf.buffer("internal_buf", false).unwrap();
    buf.bind(&in1, &s1).unwrap();
    buf.bind(&in2, &s2).unwrap();
    buf.bind(&out, &s_out).unwrap();

    let events = Rc::new(RefCell::new(0));
    let counter = events.clone();
    buf.method("process", Sensitivity::new().on(&in1).on(&in2), move |ctx| {
        let temp = ctx.read(&in1)? && ctx.read(&in2)?;
        ctx.write(&internal, temp)?;
        // Still the value committed before this activation
        let stale = ctx.read(&internal)?;
        ctx.write(&out, stale)
    })
    .unwrap();
    buf.method("watch", Sensitivity::new().on(&internal).dont_initialize(), move |_ctx| {
        *counter.borrow_mut() += 1;
        Ok(())
    })
    .unwrap();

    let mut sim = sim.build().unwrap();
    sim.write(&s1, true).unwrap();
    sim.write(&s2, false).unwrap();
    sim.run(Some(1)).unwrap();
    assert!(!sim.read(&s_out).unwrap());

    sim.write(&s2, true).unwrap();
    sim.run(Some(1)).unwrap();
    assert!(!sim.read(&s_out).unwrap(), "output lags the buffer by one activation");
    assert!(sim.read(&internal).unwrap());

    // Rewriting the same value into a buffer is still an event
    assert_eq!(*events.borrow(), 2);
}

/// Writes `count` values as fast as the FIFO accepts them
struct GreedyProducer {
    fifo: Fifo<u32>,
    next: u32,
    count: u32,
    log: Rc<RefCell<Vec<u64>>>,
}

impl ThreadProcess for GreedyProducer {
    fn resume(&mut self, ctx: &mut ProcessContext<'_>) -> Result<Suspend, SimError> {
        while self.next < self.count {
            if !ctx.fifo_try_write(&self.fifo, self.next)? {
                return Ok(Suspend::event(&self.fifo));
            }
            self.log.borrow_mut().push(ctx.time().ticks());
            self.next += 1;
        }
        Ok(Suspend::Finish)
    }
}

#[test]
fn test_bounded_fifo_blocks_producer() {
    init_logging();
    let mut sim = SimulationBuilder::new();
    let writes = Rc::new(RefCell::new(Vec::new()));
    let reads = Rc::new(RefCell::new(Vec::new()));

    let mut top = sim.module("top").unwrap();
    let fifo = top.fifo::<u32>("fifo", 3).unwrap();
    top.thread_process(
        "producer",
        Sensitivity::new(),
        GreedyProducer {
            fifo,
            next: 0,
            count: 5,
            log: writes.clone(),
        },
    )
    .unwrap();

    let log = reads.clone();
    top.thread("consumer", Sensitivity::new(), move |ctx| {
        match ctx.fifo_try_read(&fifo)? {
            Some(value) => {
                log.borrow_mut().push((ctx.time().ticks(), value));
                Ok(Suspend::WaitFor(2))
            }
            None => Ok(Suspend::event(&fifo)),
        }
    })
    .unwrap();

    let mut sim = sim.build().unwrap();
    assert_eq!(sim.run(Some(20)).unwrap(), RunOutcome::Starved);
    assert_eq!(sim.time().ticks(), 20);
    assert_eq!(*writes.borrow(), vec![0, 0, 0, 0, 2]);
    assert_eq!(
        *reads.borrow(),
        vec![(0, 0), (2, 1), (4, 2), (6, 3), (8, 4)]
    );
    assert_eq!(sim.fifo_len(&fifo).unwrap(), 0);
}

#[test]
fn test_fifo_paced_producer() {
    init_logging();
    let mut sim = SimulationBuilder::new();
    let reads = Rc::new(RefCell::new(Vec::new()));
    let mut top = sim.module("top").unwrap();
    let fifo = top.fifo::<i32>("fifo", 3).unwrap();

    let mut produced = 0;
    let mut started = false;
    top.thread("producer", Sensitivity::new(), move |ctx| {
        if started {
            if !ctx.fifo_try_write(&fifo, produced)? {
                return Err(ctx.fail("fifo unexpectedly full"));
            }
            produced += 1;
            if produced == 5 {
                return Ok(Suspend::Finish);
            }
        }
        started = true;
        Ok(Suspend::WaitFor(1))
    })
    .unwrap();

    let log = reads.clone();
    top.thread("consumer", Sensitivity::new(), move |ctx| {
        match ctx.fifo_try_read(&fifo)? {
            Some(value) => {
                log.borrow_mut().push((ctx.time().ticks(), value));
                Ok(Suspend::WaitFor(2))
            }
            None => Ok(Suspend::event(&fifo)),
        }
    })
    .unwrap();

    let mut sim = sim.build().unwrap();
    sim.run(Some(20)).unwrap();
    assert_eq!(
        *reads.borrow(),
        vec![(1, 0), (3, 1), (5, 2), (7, 3), (9, 4)]
    );
}

#[test]
fn test_binding_errors_detected_at_build() {
    init_logging();

    // Dangling port
    let mut sim = SimulationBuilder::new();
    sim.module("m").unwrap().in_port::<bool>("x").unwrap();
    assert!(matches!(sim.build().err(), Some(SimError::Binding { .. })));

    // Double binding
    let mut sim = SimulationBuilder::new();
    let s = sim.signal("s", false).unwrap();
    let t = sim.signal("t", false).unwrap();
    let mut m = sim.module("m").unwrap();
    let p = m.in_port::<bool>("p").unwrap();
    m.bind(&p, &s).unwrap();
    assert!(m.bind(&p, &t).is_err());
}

#[test]
fn test_divergence_stops_run_with_error() {
    init_logging();
    let config = SimulationConfig::new().with_max_delta_cycles(50);
    let mut sim = SimulationBuilder::with_config(config);
    let x = sim.signal("x", false).unwrap();
    sim.module("osc")
        .unwrap()
        .method("toggle", Sensitivity::new().on(&x), move |ctx| {
            let value = ctx.read(&x)?;
            ctx.write(&x, !value)
        })
        .unwrap();

    let mut sim = sim.build().unwrap();
    match sim.run(None) {
        Err(SimError::Divergence { signals, .. }) => assert_eq!(signals, vec!["x".to_string()]),
        other => panic!("expected divergence, got {:?}", other),
    }
}

#[test]
fn test_warning_diagnostics_are_collected() {
    init_logging();
    let mut sim = SimulationBuilder::new();
    let opcode = sim.signal("opcode", 7u8).unwrap();
    sim.module("ctrl")
        .unwrap()
        .method("decode", Sensitivity::new().on(&opcode), move |ctx| {
            let op = ctx.read(&opcode)?;
            if op > 4 {
                ctx.warning(format!("unknown opcode {}", op));
            }
            Ok(())
        })
        .unwrap();

    let mut sim = sim.build().unwrap();
    sim.run(Some(1)).unwrap();
    let diagnostics = sim.diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].severity, Severity::Warning);
    assert_eq!(
        diagnostics[0].to_string(),
        "Warning: (ctrl) @0: unknown opcode 7"
    );
}
