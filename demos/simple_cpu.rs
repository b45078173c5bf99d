/// Single-cycle toy CPU: program counter, instruction and data memories,
/// control unit, register file and ALU wired through signals.
///
/// Instruction format (16 bits):
/// `[15:12] opcode | [11:9] rd | [8:6] rs1 | [5:0] immediate`, with `rs2`
/// taken from `immediate[5:3]` for ALU operations.
use deltasim::{
    ClockSpec, ModuleBuilder, Sensitivity, Signal, SimError, SimulationBuilder, Suspend,
};
use std::cell::RefCell;
use std::rc::Rc;

type Word = u16;
type Address = u8;

const NUM_REGISTERS: usize = 8;
const DATA_WORDS: usize = 1 << 8;

const HALT: Word = 0;
const LOAD: Word = 1;
const STORE: Word = 2;
const ADD: Word = 3;
const SUB: Word = 4;

const ALU_ADD: u8 = 0;
const ALU_SUB: u8 = 1;

struct Fields {
    opcode: Word,
    rd: u8,
    rs1: u8,
    rs2: u8,
    immediate: Word,
}

fn decode(instruction: Word) -> Fields {
    let immediate = instruction & 0x3f;
    Fields {
        opcode: instruction >> 12,
        rd: ((instruction >> 9) & 0x7) as u8,
        rs1: ((instruction >> 6) & 0x7) as u8,
        rs2: ((immediate >> 3) & 0x7) as u8,
        immediate,
    }
}

fn encode(opcode: Word, rd: u8, rs1: u8, immediate: Word) -> Word {
    (opcode << 12) | ((rd as Word) << 9) | ((rs1 as Word) << 6) | (immediate & 0x3f)
}

/// Every wire of the datapath
#[derive(Clone, Copy)]
struct Wires {
    clk: Signal<bool>,
    reset: Signal<bool>,
    pc_addr: Signal<Address>,
    instruction: Signal<Word>,
    pc_en: Signal<bool>,
    mem_rd: Signal<bool>,
    mem_wr: Signal<bool>,
    mem_addr: Signal<Address>,
    mem_wr_data: Signal<Word>,
    mem_rd_data: Signal<Word>,
    rf_rd1_addr: Signal<u8>,
    rf_rd2_addr: Signal<u8>,
    rf_wr_addr: Signal<u8>,
    rf_rd1_data: Signal<Word>,
    rf_rd2_data: Signal<Word>,
    rf_wr_data: Signal<Word>,
    rf_wr_en: Signal<bool>,
    alu_op1: Signal<Word>,
    alu_op2: Signal<Word>,
    alu_res: Signal<Word>,
    alu_ctrl: Signal<u8>,
}

impl Wires {
    fn create(cpu: &mut ModuleBuilder<'_>, clk: Signal<bool>) -> Result<Self, SimError> {
        Ok(Self {
            clk,
            reset: cpu.signal("reset", true)?,
            pc_addr: cpu.signal("pc_addr", 0)?,
            instruction: cpu.signal("instruction", 0)?,
            pc_en: cpu.signal("pc_en", false)?,
            mem_rd: cpu.signal("mem_rd", false)?,
            mem_wr: cpu.signal("mem_wr", false)?,
            mem_addr: cpu.signal("mem_addr", 0)?,
            mem_wr_data: cpu.signal("mem_wr_data", 0)?,
            mem_rd_data: cpu.signal("mem_rd_data", 0)?,
            rf_rd1_addr: cpu.signal("rf_rd1_addr", 0)?,
            rf_rd2_addr: cpu.signal("rf_rd2_addr", 0)?,
            rf_wr_addr: cpu.signal("rf_wr_addr", 0)?,
            rf_rd1_data: cpu.signal("rf_rd1_data", 0)?,
            rf_rd2_data: cpu.signal("rf_rd2_data", 0)?,
            rf_wr_data: cpu.signal("rf_wr_data", 0)?,
            rf_wr_en: cpu.signal("rf_wr_en", false)?,
            alu_op1: cpu.signal("alu_op1", 0)?,
            alu_op2: cpu.signal("alu_op2", 0)?,
            alu_res: cpu.signal("alu_res", 0)?,
            alu_ctrl: cpu.signal("alu_ctrl", 0)?,
        })
    }
}

fn program_counter(cpu: &mut ModuleBuilder<'_>, w: Wires) -> Result<(), SimError> {
    let mut pc = cpu.child("pc")?;
    let clk = pc.in_port::<bool>("clk")?;
    let reset = pc.in_port::<bool>("reset")?;
    let enable = pc.in_port::<bool>("enable")?;
    let current = pc.out_port::<Address>("current_address")?;
    pc.bind(&clk, &w.clk)?;
    pc.bind(&reset, &w.reset)?;
    pc.bind(&enable, &w.pc_en)?;
    pc.bind(&current, &w.pc_addr)?;

    let mut value: Address = 0;
    pc.thread("increment", Sensitivity::new(), move |ctx| {
        if ctx.posedge(&clk)? {
            if ctx.read(&reset)? {
                value = 0;
            } else if ctx.read(&enable)? {
                value = value.wrapping_add(1);
            }
            ctx.write(&current, value)?;
        }
        Ok(Suspend::posedge(&clk))
    })?;
    Ok(())
}

fn instruction_memory(cpu: &mut ModuleBuilder<'_>, w: Wires, program: Vec<Word>) -> Result<(), SimError> {
    let mut imem = cpu.child("imem")?;
    let addr = imem.in_port::<Address>("addr_in")?;
    let out = imem.out_port::<Word>("instruction_out")?;
    imem.bind(&addr, &w.pc_addr)?;
    imem.bind(&out, &w.instruction)?;

    imem.method("read_instruction", Sensitivity::new().on(&addr), move |ctx| {
        let index = ctx.read(&addr)? as usize;
        // Out of bounds reads report an error and fetch HALT
        let instruction = ctx.read_or_default(&program, index);
        ctx.write(&out, instruction)
    })?;
    Ok(())
}

fn data_memory(cpu: &mut ModuleBuilder<'_>, w: Wires, memory: Rc<RefCell<Vec<Word>>>) -> Result<(), SimError> {
    let mut dmem = cpu.child("dmem")?;
    let clk = dmem.in_port::<bool>("clk")?;
    let addr = dmem.in_port::<Address>("addr_in")?;
    let data_in = dmem.in_port::<Word>("data_in")?;
    let write_enable = dmem.in_port::<bool>("write_enable")?;
    let data_out = dmem.out_port::<Word>("data_out")?;
    dmem.bind(&clk, &w.clk)?;
    dmem.bind(&addr, &w.mem_addr)?;
    dmem.bind(&data_in, &w.mem_wr_data)?;
    dmem.bind(&write_enable, &w.mem_wr)?;
    dmem.bind(&data_out, &w.mem_rd_data)?;

    let sensitivity = Sensitivity::new().posedge(&clk).on(&addr);
    dmem.method("access", sensitivity, move |ctx| {
        let index = ctx.read(&addr)? as usize;
        if ctx.posedge(&clk)? && ctx.read(&write_enable)? {
            let value = ctx.read(&data_in)?;
            match memory.borrow_mut().get_mut(index) {
                Some(slot) => {
                    *slot = value;
                    ctx.info(format!("Wrote {} to address {}", value, index));
                }
                None => ctx.error(format!("write to address {} out of bounds", index)),
            }
        }
        let value = ctx.read_or_default(memory.borrow().as_slice(), index);
        ctx.write(&data_out, value)
    })?;
    Ok(())
}

fn control_unit(cpu: &mut ModuleBuilder<'_>, w: Wires) -> Result<(), SimError> {
    let mut ctrl = cpu.child("ctrl")?;
    let instruction = ctrl.in_port::<Word>("instruction_in")?;
    let pc_enable = ctrl.out_port::<bool>("pc_enable")?;
    let mem_read = ctrl.out_port::<bool>("mem_read_enable")?;
    let mem_write = ctrl.out_port::<bool>("mem_write_enable")?;
    let mem_addr = ctrl.out_port::<Address>("mem_addr")?;
    let rd1 = ctrl.out_port::<u8>("reg_read1_addr")?;
    let rd2 = ctrl.out_port::<u8>("reg_read2_addr")?;
    let wr = ctrl.out_port::<u8>("reg_write_addr")?;
    let wr_en = ctrl.out_port::<bool>("reg_write_enable")?;
    let alu_control = ctrl.out_port::<u8>("alu_control")?;
    ctrl.bind(&instruction, &w.instruction)?;
    ctrl.bind(&pc_enable, &w.pc_en)?;
    ctrl.bind(&mem_read, &w.mem_rd)?;
    ctrl.bind(&mem_write, &w.mem_wr)?;
    ctrl.bind(&mem_addr, &w.mem_addr)?;
    ctrl.bind(&rd1, &w.rf_rd1_addr)?;
    ctrl.bind(&rd2, &w.rf_rd2_addr)?;
    ctrl.bind(&wr, &w.rf_wr_addr)?;
    ctrl.bind(&wr_en, &w.rf_wr_en)?;
    ctrl.bind(&alu_control, &w.alu_ctrl)?;

    let sensitivity = Sensitivity::new().on(&instruction).dont_initialize();
    ctrl.method("decode", sensitivity, move |ctx| {
        let fields = decode(ctx.read(&instruction)?);

        ctx.write(&pc_enable, true)?;
        ctx.write(&mem_read, false)?;
        ctx.write(&mem_write, false)?;
        ctx.write(&wr_en, false)?;
        ctx.write(&alu_control, ALU_ADD)?;

        match fields.opcode {
            LOAD => {
                ctx.write(&mem_read, true)?;
                ctx.write(&mem_addr, fields.immediate as Address)?;
                ctx.write(&wr_en, true)?;
                ctx.write(&wr, fields.rd)?;
            }
            STORE => {
                ctx.write(&mem_write, true)?;
                ctx.write(&mem_addr, fields.immediate as Address)?;
            }
            ADD | SUB => {
                let op = if fields.opcode == ADD { ALU_ADD } else { ALU_SUB };
                ctx.write(&alu_control, op)?;
                ctx.write(&wr_en, true)?;
                ctx.write(&wr, fields.rd)?;
            }
            HALT => {
                ctx.info("HALT instruction encountered. Stopping simulation.");
                ctx.stop();
            }
            other => ctx.warning(format!("Unknown opcode: {:04b}", other)),
        }

        ctx.write(&rd1, fields.rs1)?;
        ctx.write(&rd2, fields.rs2)
    })?;
    Ok(())
}

fn register_file(cpu: &mut ModuleBuilder<'_>, w: Wires, registers: Rc<RefCell<Vec<Word>>>) -> Result<(), SimError> {
    let mut rf = cpu.child("regfile")?;
    let clk = rf.in_port::<bool>("clk")?;
    let rd1 = rf.in_port::<u8>("read_reg1_addr")?;
    let rd2 = rf.in_port::<u8>("read_reg2_addr")?;
    let wr = rf.in_port::<u8>("write_reg_addr")?;
    let data = rf.in_port::<Word>("write_data")?;
    let enable = rf.in_port::<bool>("write_enable")?;
    let out1 = rf.out_port::<Word>("read_data1")?;
    let out2 = rf.out_port::<Word>("read_data2")?;
    rf.bind(&clk, &w.clk)?;
    rf.bind(&rd1, &w.rf_rd1_addr)?;
    rf.bind(&rd2, &w.rf_rd2_addr)?;
    rf.bind(&wr, &w.rf_wr_addr)?;
    rf.bind(&data, &w.rf_wr_data)?;
    rf.bind(&enable, &w.rf_wr_en)?;
    rf.bind(&out1, &w.rf_rd1_data)?;
    rf.bind(&out2, &w.rf_rd2_data)?;

    let sensitivity = Sensitivity::new().posedge(&clk).on(&rd1).on(&rd2);
    rf.method("access", sensitivity, move |ctx| {
        if ctx.posedge(&clk)? && ctx.read(&enable)? {
            let (index, value) = (ctx.read(&wr)? as usize, ctx.read(&data)?);
            match registers.borrow_mut().get_mut(index) {
                Some(slot) => {
                    *slot = value;
                    ctx.info(format!("Wrote {} to register {}", value, index));
                }
                None => ctx.error(format!("register {} out of bounds", index)),
            }
        }

        let (first, second) = (ctx.read(&rd1)? as usize, ctx.read(&rd2)? as usize);
        let regs = registers.borrow();
        let first = ctx.read_or_default(regs.as_slice(), first);
        let second = ctx.read_or_default(regs.as_slice(), second);
        ctx.write(&out1, first)?;
        ctx.write(&out2, second)
    })?;
    Ok(())
}

fn alu(cpu: &mut ModuleBuilder<'_>, w: Wires) -> Result<(), SimError> {
    let mut alu = cpu.child("alu")?;
    let op1 = alu.in_port::<Word>("operand1")?;
    let op2 = alu.in_port::<Word>("operand2")?;
    let control = alu.in_port::<u8>("alu_control")?;
    let result = alu.out_port::<Word>("result")?;
    alu.bind(&op1, &w.alu_op1)?;
    alu.bind(&op2, &w.alu_op2)?;
    alu.bind(&control, &w.alu_ctrl)?;
    alu.bind(&result, &w.alu_res)?;

    let sensitivity = Sensitivity::new().on(&op1).on(&op2).on(&control);
    alu.method("perform_operation", sensitivity, move |ctx| {
        let (a, b) = (ctx.read(&op1)?, ctx.read(&op2)?);
        let value = match ctx.read(&control)? {
            ALU_ADD => a.wrapping_add(b),
            ALU_SUB => a.wrapping_sub(b),
            _ => {
                ctx.warning("Invalid ALU control signal.");
                0
            }
        };
        ctx.write(&result, value)
    })?;
    Ok(())
}

/// Routes register, memory and ALU data according to the current opcode
fn data_paths(cpu: &mut ModuleBuilder<'_>, w: Wires) -> Result<(), SimError> {
    let sensitivity = Sensitivity::new()
        .on(&w.instruction)
        .on(&w.rf_rd1_data)
        .on(&w.rf_rd2_data)
        .on(&w.alu_res)
        .on(&w.mem_rd_data)
        .dont_initialize();
    cpu.method("connect_data_paths", sensitivity, move |ctx| {
        match decode(ctx.read(&w.instruction)?).opcode {
            LOAD => {
                let value = ctx.read(&w.mem_rd_data)?;
                ctx.write(&w.rf_wr_data, value)?;
            }
            STORE => {
                let value = ctx.read(&w.rf_rd1_data)?;
                ctx.write(&w.mem_wr_data, value)?;
            }
            ADD | SUB => {
                let (a, b) = (ctx.read(&w.rf_rd1_data)?, ctx.read(&w.rf_rd2_data)?);
                ctx.write(&w.alu_op1, a)?;
                ctx.write(&w.alu_op2, b)?;
                let result = ctx.read(&w.alu_res)?;
                ctx.write(&w.rf_wr_data, result)?;
            }
            _ => {}
        }
        Ok(())
    })?;

    // Release reset after a short delay
    let mut released = false;
    cpu.thread("reset_pc", Sensitivity::new(), move |ctx| {
        if released {
            ctx.write(&w.reset, false)?;
            return Ok(Suspend::Finish);
        }
        released = true;
        Ok(Suspend::WaitFor(5))
    })?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let program = vec![
        encode(LOAD, 1, 0, 10),      // R1 <- mem[10]
        encode(LOAD, 2, 0, 11),      // R2 <- mem[11]
        encode(ADD, 3, 1, 2 << 3),   // R3 <- R1 + R2
        encode(SUB, 4, 2, 1 << 3),   // R4 <- R2 - R1
        encode(STORE, 0, 3, 12),     // mem[12] <- R3
        encode(0x7, 0, 0, 0),        // unknown opcode
        encode(HALT, 0, 0, 0),
    ];

    let mut data = vec![0; DATA_WORDS];
    data[10] = 10;
    data[11] = 11;
    let data = Rc::new(RefCell::new(data));
    let registers = Rc::new(RefCell::new(vec![0; NUM_REGISTERS]));

    let mut sim = SimulationBuilder::new();
    let clock = sim.clock("clock", ClockSpec::new(10))?;
    let mut cpu = sim.module("cpu")?;
    let wires = Wires::create(&mut cpu, clock.signal())?;
    instruction_memory(&mut cpu, wires, program)?;
    data_memory(&mut cpu, wires, data.clone())?;
    program_counter(&mut cpu, wires)?;
    control_unit(&mut cpu, wires)?;
    register_file(&mut cpu, wires, registers.clone())?;
    alu(&mut cpu, wires)?;
    data_paths(&mut cpu, wires)?;

    let mut simulation = sim.build()?;
    let stats = simulation.stats();
    println!(
        "CPU elaborated: {} signals, {} ports, {} processes",
        stats.channels, stats.ports, stats.processes
    );

    let outcome = simulation.run(Some(100))?;

    println!("{:?} at {} ns", outcome, simulation.time());
    println!("Registers: {:?}", registers.borrow());
    println!("mem[12] = {}", data.borrow()[12]);
    println!("Diagnostics reported: {}", simulation.diagnostics().len());
    Ok(())
}
