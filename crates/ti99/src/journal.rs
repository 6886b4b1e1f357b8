//! Single-step undo journal for the debugger.
//!
//! A ring of fixed-width deltas, each an (operation-code, before-value)
//! pair packed into a `u32`. [`crate::bus::MachineBus`] records one delta
//! per device field that actually changed on every port access; the
//! scheduler records a PC/WP/ST pair at every instruction boundary.
//! `undo_one` walks the ring backward, applying each delta's inverse,
//! until it consumes the boundary marker that started the instruction.

use std::collections::VecDeque;

use ti99_cpu::Cpu;

use crate::bus::MachineBus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeltaCode {
    /// Marks the start of an instruction; `before` is the PC it began at.
    /// `undo_one` stops here.
    PcBoundary,
    /// Paired with `PcBoundary`, pushed immediately before it: `before` is
    /// `(wp << 16) | st`.
    CpuWpSt,
    /// `before` is `(addr << 16) | value`, for fast RAM and expansion RAM
    /// (this also covers the general registers, which are workspace-
    /// aliased fast RAM words).
    MemWord,
    VdpReg,
    VdpAddr,
    VdpLatch,
    VdpStatus,
    VdpVram,
    GromAddr,
    GromLatch,
    GromLastByte,
    GromVram,
    CartBank,
    CruRow,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Delta {
    code: DeltaCode,
    before: u32,
}

/// Returned exhaustion sentinel described by the testable property: once
/// the ring runs dry, stepping backward further is a no-op the debugger
/// can detect and stop on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndoResult {
    Restored,
    Exhausted,
}

pub struct UndoJournal {
    ring: VecDeque<Delta>,
    capacity: usize,
}

/// Packs an `Option<u8>` latch into a `u32`: bit 16 marks presence.
pub(crate) fn pack_latch(latch: Option<u8>) -> u32 {
    match latch {
        None => 0,
        Some(byte) => 0x1_0000 | u32::from(byte),
    }
}

fn unpack_latch(before: u32) -> Option<u8> {
    if before & 0x1_0000 != 0 {
        Some(before as u8)
    } else {
        None
    }
}

impl UndoJournal {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: VecDeque::with_capacity(capacity.min(4096)),
            capacity: capacity.max(1),
        }
    }

    pub(crate) fn record(&mut self, code: DeltaCode, before: u32) {
        if self.ring.len() >= self.capacity {
            self.ring.pop_front();
        }
        self.ring.push_back(Delta { code, before });
    }

    /// Called once per instruction, before it executes, with the CPU's
    /// pre-instruction PC/WP/ST.
    pub(crate) fn mark_instruction_boundary(&mut self, pc: u16, wp: u16, st: u16) {
        self.record(DeltaCode::CpuWpSt, u32::from(wp) << 16 | u32::from(st));
        self.record(DeltaCode::PcBoundary, u32::from(pc));
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Reverses one instruction's worth of state changes: pops deltas and
    /// applies their inverse until the instruction's boundary marker is
    /// consumed, then restores PC/WP/ST.
    pub fn undo_one(&mut self, cpu: &mut Cpu, bus: &mut MachineBus) -> UndoResult {
        if self.ring.is_empty() {
            return UndoResult::Exhausted;
        }
        loop {
            let Some(delta) = self.ring.pop_back() else {
                return UndoResult::Exhausted;
            };
            if delta.code == DeltaCode::PcBoundary {
                cpu.regs.pc = delta.before as u16;
                if let Some(wpst) = self.ring.pop_back() {
                    cpu.regs.wp = (wpst.before >> 16) as u16;
                    cpu.regs.st = wpst.before as u16;
                }
                return UndoResult::Restored;
            }
            apply_reverse(delta, bus);
        }
    }
}

fn apply_reverse(delta: Delta, bus: &mut MachineBus) {
    match delta.code {
        DeltaCode::PcBoundary | DeltaCode::CpuWpSt => unreachable!("consumed by undo_one"),
        DeltaCode::MemWord => {
            let addr = (delta.before >> 16) as u16;
            let value = delta.before as u16;
            bus.restore_word(addr, value);
        }
        DeltaCode::VdpReg => {
            let index = (delta.before >> 16) as usize;
            let value = delta.before as u8;
            bus.vdp.set_reg(index, value);
        }
        DeltaCode::VdpAddr => bus.vdp.set_address(delta.before as u16),
        DeltaCode::VdpLatch => bus.vdp.set_latch(unpack_latch(delta.before)),
        DeltaCode::VdpStatus => bus.vdp.set_status_byte(delta.before as u8),
        DeltaCode::VdpVram => {
            let addr = (delta.before >> 8) as u16;
            let value = delta.before as u8;
            bus.vdp.set_vram_byte(addr, value);
        }
        DeltaCode::GromAddr => bus.grom.set_address(delta.before as u16),
        DeltaCode::GromLatch => bus.grom.set_latch(unpack_latch(delta.before)),
        DeltaCode::GromLastByte => bus.grom.set_last_byte(delta.before as u8),
        DeltaCode::GromVram => {
            let addr = (delta.before >> 8) as u16;
            let value = delta.before as u8;
            bus.grom.poke(addr, value);
        }
        DeltaCode::CartBank => bus.cartridge.set_bank(delta.before as usize),
        DeltaCode::CruRow => bus.cru.set_row_selector(delta.before as u8),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::NullAudioSink;
    use ti99_cartridge::Cartridge;
    use ti99_grom::Grom;

    fn make_bus() -> MachineBus {
        let rom = vec![0u8; 0x2000];
        let grom = Grom::new(vec![0u8; 0x6000], Vec::new());
        let cartridge = Cartridge::empty();
        MachineBus::new(rom, grom, cartridge, Box::new(NullAudioSink))
    }

    #[test]
    fn exhausted_on_empty_ring() {
        let mut journal = UndoJournal::new(16);
        let mut cpu = Cpu::new();
        let mut bus = make_bus();
        assert_eq!(journal.undo_one(&mut cpu, &mut bus), UndoResult::Exhausted);
    }

    #[test]
    fn undoes_a_memory_write_and_restores_pc() {
        use ti99_cpu::Bus;

        let mut cpu = Cpu::new();
        let mut bus = make_bus();
        bus.journal = Some(UndoJournal::new(16));
        bus.journal.as_mut().unwrap().mark_instruction_boundary(0x6000, 0x8300, 0x0000);
        cpu.regs.pc = 0x6002;
        bus.write(0x8000, 0xBEEF);
        assert_eq!(bus.read(0x8000).value, 0xBEEF);

        let mut journal = bus.journal.take().unwrap();
        let result = journal.undo_one(&mut cpu, &mut bus);
        assert_eq!(result, UndoResult::Restored);
        assert_eq!(cpu.regs.pc, 0x6000);
        assert_eq!(bus.read(0x8000).value, 0);
    }

    #[test]
    fn ring_evicts_oldest_entry_past_capacity() {
        let mut journal = UndoJournal::new(2);
        journal.record(DeltaCode::CruRow, 1);
        journal.record(DeltaCode::CruRow, 2);
        journal.record(DeltaCode::CruRow, 3);
        assert_eq!(journal.ring.len(), 2);
        assert_eq!(journal.ring.front().unwrap().before, 2);
    }
}
