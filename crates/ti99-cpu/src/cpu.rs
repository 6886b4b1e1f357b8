//! The interpreter: register file, cycle budget, and interrupt handling.

use emu_core::{Observable, Value};

use crate::bus::Bus;
use crate::decode;
use crate::registers::Registers;

/// A TMS9900-class interpreter.
///
/// `cyc` is the signed cycle budget described by the scheduler contract:
/// the scheduler debits it by the scanline length before calling
/// [`Cpu::run_until_positive`]; the interpreter credits it back by each
/// instruction's charged cost until it turns positive, then yields.
pub struct Cpu {
    pub regs: Registers,
    pub cyc: i64,
    /// Interrupt level + 1 currently pending, if any (0 is never stored).
    pending: Option<u8>,
    /// Set by BLWP/XOP; locks interrupt delivery until after the next
    /// instruction has executed.
    x_lock: bool,
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu {
    #[must_use]
    pub fn new() -> Self {
        Self {
            regs: Registers::default(),
            cyc: 0,
            pending: None,
            x_lock: false,
        }
    }

    /// Loads WP/PC from the reset vector at `0x0000`/`0x0002` and clears
    /// ST, mirroring the BLWP-style workspace switch every other vector
    /// uses.
    pub fn reset(&mut self, bus: &mut impl Bus) {
        let wp = bus.read(0x0000).value;
        let pc = bus.read(0x0002).value;
        self.regs = Registers::new(pc, wp, 0);
        self.cyc = 0;
        self.pending = None;
        self.x_lock = false;
    }

    /// Requests (or, with `None`, deasserts) delivery of an interrupt at
    /// the given level. Level 0 is "none pending" and is never stored as
    /// `Some(0)`.
    pub fn request_interrupt(&mut self, level: Option<u8>) {
        self.pending = level.filter(|&l| l > 0);
    }

    /// Runs instructions until the cycle budget turns positive, delivering
    /// any pending, unmasked interrupt at each instruction boundary that
    /// isn't locked out by the previous instruction's X flag.
    pub fn run_until_positive(&mut self, bus: &mut impl Bus) {
        while self.cyc <= 0 {
            if !self.x_lock {
                self.maybe_deliver_interrupt(bus);
            }
            let cost = self.step(bus);
            self.cyc += i64::from(cost);
        }
    }

    /// Runs exactly one instruction, delivering a pending interrupt first
    /// if one isn't locked out. For the debugger's single-step/undo loop;
    /// the scanline scheduler uses `run_until_positive` instead.
    pub fn step_single(&mut self, bus: &mut impl Bus) -> i32 {
        if !self.x_lock {
            self.maybe_deliver_interrupt(bus);
        }
        self.step(bus)
    }

    fn maybe_deliver_interrupt(&mut self, bus: &mut impl Bus) {
        let Some(level) = self.pending else { return };
        if level > self.regs.interrupt_mask() {
            return;
        }
        let vector = u16::from(level) * 4;
        self.context_switch(bus, vector, None);
        self.regs.set_interrupt_mask(level.saturating_sub(1));
        self.pending = None;
    }

    /// One fetch-decode-execute cycle. Returns the cycle cost charged.
    fn step(&mut self, bus: &mut impl Bus) -> i32 {
        self.x_lock = false;
        let fetch = bus.read(self.regs.pc);
        let op = fetch.value;
        self.regs.pc = self.regs.pc.wrapping_add(2);
        decode::execute(self, bus, op, fetch.cycles)
    }

    /// Performs a BLWP-equivalent context switch: pushes old WP/PC/ST into
    /// R13/R14/R15 of the *new* workspace, then adopts it. `extra_r11`, if
    /// given, is stashed into R11 of the new workspace (used by XOP to
    /// record the operand's effective address).
    pub(crate) fn context_switch(&mut self, bus: &mut impl Bus, vector: u16, extra_r11: Option<u16>) {
        let new_wp = bus.read(vector).value;
        let new_pc = bus.read(vector.wrapping_add(2)).value;
        let old_wp = self.regs.wp;
        let old_pc = self.regs.pc;
        let old_st = self.regs.st;
        let reg_addr = |wp: u16, n: u16| wp.wrapping_add(n * 2);
        bus.write(reg_addr(new_wp, 13), old_wp);
        bus.write(reg_addr(new_wp, 14), old_pc);
        bus.write(reg_addr(new_wp, 15), old_st);
        if let Some(r11) = extra_r11 {
            bus.write(reg_addr(new_wp, 11), r11);
        }
        self.regs.wp = new_wp;
        self.regs.pc = new_pc;
        self.x_lock = true;
    }
}

const QUERY_PATHS: &[&str] = &["pc", "wp", "st", "cyc"];

impl Observable for Cpu {
    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "pc" => Some(Value::U16(self.regs.pc)),
            "wp" => Some(Value::U16(self.regs.wp)),
            "st" => Some(Value::U16(self.regs.st)),
            "cyc" => Some(Value::U64(self.cyc as u64)),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        QUERY_PATHS
    }
}
