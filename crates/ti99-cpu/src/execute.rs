//! Per-instruction execution bodies.
//!
//! Every function here returns the cycle cost it charged *beyond* the
//! opcode's own fetch (which the caller in [`crate::decode`] already
//! accounted for): base instruction cost, any addressing-mode surcharge,
//! and the cost of every bus access the body actually performs.

use crate::alu;
use crate::bus::Bus;
use crate::cpu::Cpu;
use crate::ea::{self, Operand};
use crate::flags::{self, C, EQ, LGT, OP, OV};

fn td_d_ts_s(op: u16) -> (u8, u8, u8, u8) {
    let td = ((op >> 10) & 0x3) as u8;
    let d = ((op >> 6) & 0xF) as u8;
    let ts = ((op >> 4) & 0x3) as u8;
    let s = (op & 0xF) as u8;
    (td, d, ts, s)
}

/// Dispatches the twelve two-general-address instructions (MOV/A/S/C/SOC/
/// SZC, word and byte forms), opcode nibble `0x4`..=`0xF`.
pub fn two_operand(cpu: &mut Cpu, bus: &mut impl Bus, op: u16) -> i32 {
    let nibble = (op >> 12) & 0xF;
    let is_byte = nibble & 1 == 1;
    let (td, d, ts, s) = td_d_ts_s(op);

    let (src_op, src_cost) = ea::resolve(bus, &mut cpu.regs, ts, s, is_byte);
    let (dst_op, dst_cost) = ea::resolve(bus, &mut cpu.regs, td, d, is_byte);
    let mut cost = 6 + src_cost + dst_cost;

    macro_rules! apply_word {
        ($f:expr) => {{
            let (src, c1) = ea::read_word(bus, src_op);
            let (dst, c2) = ea::read_word(bus, dst_op);
            let (result, st) = $f(cpu.regs.st, src, dst);
            cpu.regs.st = st;
            let c3 = ea::write_word(bus, dst_op, result);
            cost += c1 + c2 + c3;
        }};
    }
    macro_rules! apply_byte {
        ($f:expr) => {{
            let (src, c1) = ea::read_byte(bus, src_op);
            let (dst, c2) = ea::read_byte(bus, dst_op);
            let (result, st) = $f(cpu.regs.st, src, dst);
            cpu.regs.st = st;
            let c3 = ea::write_byte(bus, dst_op, result);
            cost += c1 + c2 + c3;
        }};
    }
    macro_rules! compare_only {
        ($read:ident, $cmp:expr) => {{
            let (src, c1) = ea::$read(bus, src_op);
            let (dst, c2) = ea::$read(bus, dst_op);
            cpu.regs.st = $cmp(cpu.regs.st, src, dst);
            cost += c1 + c2;
        }};
    }

    match nibble {
        0x4 => apply_word!(|st, src: u16, dst: u16| {
            let result = dst & !src;
            (result, alu::logic_word(st, result))
        }),
        0x5 => apply_byte!(|st, src: u8, dst: u8| {
            let result = dst & !src;
            (result, alu::logic_byte(st, result))
        }),
        0x6 => apply_word!(|st, src, dst| alu::sub_word(st, dst, src)),
        0x7 => apply_byte!(|st, src, dst| alu::sub_byte(st, dst, src)),
        0x8 => compare_only!(read_word, alu::compare_word),
        0x9 => compare_only!(read_byte, alu::compare_byte),
        0xA => apply_word!(alu::add_word),
        0xB => apply_byte!(alu::add_byte),
        0xC => apply_word!(|st, src: u16, _dst: u16| (src, alu::logic_word(st, src))),
        0xD => apply_byte!(|st, src: u8, _dst: u8| (src, alu::logic_byte(st, src))),
        0xE => apply_word!(|st, src: u16, dst: u16| {
            let result = dst | src;
            (result, alu::logic_word(st, result))
        }),
        0xF => apply_byte!(|st, src: u8, dst: u8| {
            let result = dst | src;
            (result, alu::logic_byte(st, result))
        }),
        _ => unreachable!(),
    }
    cost
}

/// Single-operand group (BLWP/B/X/CLR/NEG/INV/INC/INCT/DEC/DECT/BL/SWPB/
/// SETO/ABS), opcode range `0x0400`..=`0x077F`.
pub fn single_operand(cpu: &mut Cpu, bus: &mut impl Bus, op: u16) -> i32 {
    let ts = ((op >> 4) & 0x3) as u8;
    let s = (op & 0xF) as u8;
    let base = op & 0xFFC0;

    match base {
        0x0400 => {
            // BLWP
            let (target, c) = ea::resolve(bus, &mut cpu.regs, ts, s, false);
            cpu.context_switch(bus, target.word_addr(), None);
            6 + c
        }
        0x0440 => {
            // B
            let (target, c) = ea::resolve(bus, &mut cpu.regs, ts, s, false);
            cpu.regs.pc = target.word_addr();
            6 + c
        }
        0x0480 => {
            // X: fetch the word at the operand and execute it in place of
            // the next instruction.
            let (target, c) = ea::resolve(bus, &mut cpu.regs, ts, s, false);
            let (fetched, c2) = ea::read_word(bus, target);
            6 + c + c2 + crate::decode::execute(cpu, bus, fetched, 0)
        }
        0x04C0 => unary_word(cpu, bus, ts, s, |st, _v| (0, alu::logic_word(st, 0))),
        0x0500 => unary_word(cpu, bus, ts, s, |st, v| alu::sub_word(st, 0, v)),
        0x0540 => unary_word(cpu, bus, ts, s, |st, v| {
            let r = !v;
            (r, alu::logic_word(st, r))
        }),
        0x0580 => unary_word(cpu, bus, ts, s, |st, v| alu::add_word(st, v, 1)),
        0x05C0 => unary_word(cpu, bus, ts, s, |st, v| alu::add_word(st, v, 2)),
        0x0600 => unary_word(cpu, bus, ts, s, |st, v| alu::sub_word(st, v, 1)),
        0x0640 => unary_word(cpu, bus, ts, s, |st, v| alu::sub_word(st, v, 2)),
        0x0680 => {
            // BL: return address into R11, then branch.
            let (target, c) = ea::resolve(bus, &mut cpu.regs, ts, s, false);
            let r11 = cpu.regs.reg_addr(11);
            let c2 = bus.write(r11, cpu.regs.pc);
            cpu.regs.pc = target.word_addr();
            6 + c + c2
        }
        0x06C0 => unary_word(cpu, bus, ts, s, |st, v| {
            let r = v.rotate_left(8);
            (r, st)
        }),
        0x0700 => unary_word(cpu, bus, ts, s, |st, _v| (0xFFFF, alu::logic_word(st, 0xFFFF))),
        0x0740 => unary_word(cpu, bus, ts, s, |st, v| {
            let result = if (v as i16) < 0 { v.wrapping_neg() } else { v };
            let st = flags::update_lae_word(st, result);
            let st = flags::set_if(st, C, false);
            let st = flags::set_if(st, OV, v == 0x8000);
            (result, st)
        }),
        _ => {
            eprintln!("ti99-cpu: unhandled single-operand opcode {op:#06X}");
            4
        }
    }
}

fn unary_word(cpu: &mut Cpu, bus: &mut impl Bus, ts: u8, s: u8, f: impl Fn(u16, u16) -> (u16, u16)) -> i32 {
    let (operand, c1) = ea::resolve(bus, &mut cpu.regs, ts, s, false);
    let (value, c2) = ea::read_word(bus, operand);
    let (result, st) = f(cpu.regs.st, value);
    cpu.regs.st = st;
    let c3 = ea::write_word(bus, operand, result);
    6 + c1 + c2 + c3
}

/// Immediate / no-operand group, `0x0200`..=`0x03FF`.
pub fn immediate(cpu: &mut Cpu, bus: &mut impl Bus, op: u16) -> i32 {
    let base = op & 0xFFE0;
    let reg = (op & 0xF) as u8;
    match base {
        0x0200 => {
            // LI Rd, imm
            let imm = bus.read(cpu.regs.pc).value;
            cpu.regs.pc = cpu.regs.pc.wrapping_add(2);
            cpu.regs.st = alu::logic_word(cpu.regs.st, imm);
            bus.write(cpu.regs.reg_addr(reg), imm);
            12
        }
        0x0220 => {
            // AI Rd, imm
            let imm = bus.read(cpu.regs.pc).value;
            cpu.regs.pc = cpu.regs.pc.wrapping_add(2);
            let addr = cpu.regs.reg_addr(reg);
            let current = bus.read(addr).value;
            let (result, st) = alu::add_word(cpu.regs.st, current, imm);
            cpu.regs.st = st;
            bus.write(addr, result);
            14
        }
        0x0240 => {
            // ANDI Rd, imm
            let imm = bus.read(cpu.regs.pc).value;
            cpu.regs.pc = cpu.regs.pc.wrapping_add(2);
            let addr = cpu.regs.reg_addr(reg);
            let current = bus.read(addr).value;
            let result = current & imm;
            cpu.regs.st = alu::logic_word(cpu.regs.st, result);
            bus.write(addr, result);
            14
        }
        0x0260 => {
            // ORI Rd, imm
            let imm = bus.read(cpu.regs.pc).value;
            cpu.regs.pc = cpu.regs.pc.wrapping_add(2);
            let addr = cpu.regs.reg_addr(reg);
            let current = bus.read(addr).value;
            let result = current | imm;
            cpu.regs.st = alu::logic_word(cpu.regs.st, result);
            bus.write(addr, result);
            14
        }
        0x0280 => {
            // CI Rd, imm
            let imm = bus.read(cpu.regs.pc).value;
            cpu.regs.pc = cpu.regs.pc.wrapping_add(2);
            let current = bus.read(cpu.regs.reg_addr(reg)).value;
            cpu.regs.st = alu::compare_word(cpu.regs.st, current, imm);
            14
        }
        0x02A0 => {
            // STWP Rd
            bus.write(cpu.regs.reg_addr(reg), cpu.regs.wp);
            8
        }
        0x02C0 => {
            // STST Rd
            bus.write(cpu.regs.reg_addr(reg), cpu.regs.st);
            8
        }
        0x02E0 => {
            // LWPI imm
            let imm = bus.read(cpu.regs.pc).value;
            cpu.regs.pc = cpu.regs.pc.wrapping_add(2);
            cpu.regs.wp = imm;
            10
        }
        0x0300 => {
            // LIMI imm
            let imm = bus.read(cpu.regs.pc).value;
            cpu.regs.pc = cpu.regs.pc.wrapping_add(2);
            cpu.regs.set_interrupt_mask((imm & 0xF) as u8);
            16
        }
        0x0340 | 0x03A0 | 0x03C0 => 12,   // IDLE / CKON / CKOF: no architectural effect modeled
        0x0360 => 12,                     // RSET: leaves mask/state untouched in this core
        0x0380 => {
            // RTWP: pop ST/PC/WP from R15/R14/R13
            let wp = cpu.regs.wp;
            let st = bus.read(wp.wrapping_add(15 * 2)).value;
            let pc = bus.read(wp.wrapping_add(14 * 2)).value;
            let new_wp = bus.read(wp.wrapping_add(13 * 2)).value;
            cpu.regs.st = st;
            cpu.regs.pc = pc;
            cpu.regs.wp = new_wp;
            14
        }
        0x03E0 => 12, // LREX: no peripheral bus to reset in this core
        _ => {
            eprintln!("ti99-cpu: unhandled immediate-group opcode {op:#06X}");
            4
        }
    }
}

const fn jump_taken(st: u16, base: u16) -> bool {
    let lgt = st & LGT != 0;
    let agt = st & flags::AGT != 0;
    let eq = st & EQ != 0;
    let c = st & C != 0;
    let ov = st & OV != 0;
    let op_flag = st & OP != 0;
    match base {
        0x1000 => true,                  // JMP
        0x1100 => !agt && !eq,           // JLT
        0x1200 => !lgt || eq,            // JLE
        0x1300 => eq,                    // JEQ
        0x1400 => lgt || eq,             // JHE
        0x1500 => agt,                   // JGT
        0x1600 => !eq,                   // JNE
        0x1700 => !c,                    // JNC
        0x1800 => c,                     // JOC
        0x1900 => !ov,                   // JNO
        0x1A00 => !lgt && !eq,           // JL
        0x1B00 => lgt && !eq,            // JH
        0x1C00 => op_flag,               // JOP
        _ => false,
    }
}

/// Conditional/unconditional jumps, `0x1000`..=`0x1CFF`.
pub fn jump(cpu: &mut Cpu, op: u16) -> i32 {
    let base = op & 0xFF00;
    if jump_taken(cpu.regs.st, base) {
        let disp = i16::from(op as i8);
        cpu.regs.pc = (i32::from(cpu.regs.pc as i16) + i32::from(disp) * 2) as u16;
        10
    } else {
        8
    }
}

fn cru_base(cpu: &Cpu, bus: &mut impl Bus) -> i16 {
    let r12 = bus.read(cpu.regs.reg_addr(12)).value;
    (r12 >> 1) as i16
}

/// SBO/SBZ/TB, `0x1D00`..=`0x1FFF`.
pub fn cru_single(cpu: &mut Cpu, bus: &mut impl Bus, op: u16) -> i32 {
    let disp = i16::from(op as i8);
    let bit = (cru_base(cpu, bus) + disp) as u16;
    match op & 0xFF00 {
        0x1D00 => {
            bus.cru_write(bit, true);
            12
        }
        0x1E00 => {
            bus.cru_write(bit, false);
            12
        }
        0x1F00 => {
            let value = bus.cru_read(bit);
            cpu.regs.st = flags::set_if(cpu.regs.st, EQ, value);
            12
        }
        _ => unreachable!(),
    }
}

/// Shift group (SRA/SRL/SLA/SRC), `0x0800`..=`0x0BFF`.
pub fn shift(cpu: &mut Cpu, bus: &mut impl Bus, op: u16) -> i32 {
    let kind = (op >> 8) & 0x3;
    let mut count = ((op >> 4) & 0xF) as u32;
    let reg = (op & 0xF) as u8;
    let addr = cpu.regs.reg_addr(reg);
    let value = bus.read(addr).value;

    if count == 0 {
        let r0 = bus.read(cpu.regs.reg_addr(0)).value & 0xF;
        count = if r0 == 0 { 16 } else { u32::from(r0) };
    }

    let mut result = value;
    let mut carry_out = false;
    let mut overflow = false;
    let sign_changed_during_shift = |orig: u16, shifted: u16| (orig ^ shifted) & 0x8000 != 0;

    match kind {
        0 => {
            // SRA: arithmetic right shift, sign-extends.
            for _ in 0..count {
                carry_out = result & 1 != 0;
                result = ((result as i16) >> 1) as u16;
            }
        }
        1 => {
            // SRL: logical right shift.
            for _ in 0..count {
                carry_out = result & 1 != 0;
                result >>= 1;
            }
        }
        2 => {
            // SLA: left shift; overflow sticky if the sign ever changes.
            for _ in 0..count {
                carry_out = result & 0x8000 != 0;
                let shifted = result << 1;
                if sign_changed_during_shift(result, shifted) {
                    overflow = true;
                }
                result = shifted;
            }
        }
        3 => {
            // SRC: rotate right.
            for _ in 0..count {
                carry_out = result & 1 != 0;
                result = result.rotate_right(1);
            }
        }
        _ => unreachable!(),
    }

    cpu.regs.st = alu::logic_word(cpu.regs.st, result);
    cpu.regs.st = flags::set_if(cpu.regs.st, C, carry_out);
    if kind == 2 {
        cpu.regs.st = flags::set_if(cpu.regs.st, OV, overflow);
    }
    bus.write(addr, result);
    12 + 2 * count as i32
}

/// XOP/COC/CZC/XOR/LDCR/STCR/MPY/DIV, opcode range `0x2000`..=`0x3FFF`.
pub fn format3(cpu: &mut Cpu, bus: &mut impl Bus, op: u16) -> i32 {
    let opcode6 = (op >> 10) & 0x3F;
    let d = ((op >> 6) & 0xF) as u8;
    let ts = ((op >> 4) & 0x3) as u8;
    let s = (op & 0xF) as u8;

    match opcode6 {
        0x08 => {
            // COC: test-ones — LGT=1 "when all one-bits of the mask are
            // also one in the source"; modeled as EQ-only result.
            let (src_op, c1) = ea::resolve(bus, &mut cpu.regs, ts, s, false);
            let (src, c2) = ea::read_word(bus, src_op);
            let mask = bus.read(cpu.regs.reg_addr(d)).value;
            let eq = src & mask == mask;
            cpu.regs.st = flags::set_if(cpu.regs.st, EQ, eq);
            6 + c1 + c2
        }
        0x09 => {
            // CZC: test-zeros.
            let (src_op, c1) = ea::resolve(bus, &mut cpu.regs, ts, s, false);
            let (src, c2) = ea::read_word(bus, src_op);
            let mask = bus.read(cpu.regs.reg_addr(d)).value;
            let eq = src & mask == 0;
            cpu.regs.st = flags::set_if(cpu.regs.st, EQ, eq);
            6 + c1 + c2
        }
        0x0A => {
            // XOR
            let (src_op, c1) = ea::resolve(bus, &mut cpu.regs, ts, s, false);
            let (src, c2) = ea::read_word(bus, src_op);
            let dst_addr = cpu.regs.reg_addr(d);
            let dst = bus.read(dst_addr).value;
            let result = src ^ dst;
            cpu.regs.st = alu::logic_word(cpu.regs.st, result);
            let c3 = bus.write(dst_addr, result);
            6 + c1 + c2 + c3
        }
        0x0B => {
            // XOP n
            let (operand, c1) = ea::resolve(bus, &mut cpu.regs, ts, s, false);
            let vector = 0x0040 + u16::from(d) * 4;
            let source_addr = operand.word_addr();
            cpu.context_switch(bus, vector, Some(source_addr));
            cpu.regs.st |= flags::X;
            6 + c1
        }
        0x0C => cru_transfer(cpu, bus, ts, s, d, true),
        0x0D => cru_transfer(cpu, bus, ts, s, d, false),
        0x0E => {
            // MPY Rs * Rd -> (Rd, Rd+1)
            let (src_op, c1) = ea::resolve(bus, &mut cpu.regs, ts, s, false);
            let (src, c2) = ea::read_word(bus, src_op);
            let dst_addr = cpu.regs.reg_addr(d);
            let dst = bus.read(dst_addr).value;
            let product = u32::from(src) * u32::from(dst);
            bus.write(dst_addr, (product >> 16) as u16);
            bus.write(cpu.regs.reg_addr(d.wrapping_add(1)), product as u16);
            58 + c1 + c2
        }
        0x0F => {
            // DIV
            let (src_op, c1) = ea::resolve(bus, &mut cpu.regs, ts, s, false);
            let (divisor, c2) = ea::read_word(bus, src_op);
            let hi = bus.read(cpu.regs.reg_addr(d)).value;
            let lo = bus.read(cpu.regs.reg_addr(d.wrapping_add(1))).value;
            if divisor <= hi {
                cpu.regs.st = flags::set_if(cpu.regs.st, OV, true);
            } else {
                cpu.regs.st = flags::set_if(cpu.regs.st, OV, false);
                let dividend = (u32::from(hi) << 16) | u32::from(lo);
                let quotient = dividend / u32::from(divisor);
                let remainder = dividend % u32::from(divisor);
                bus.write(cpu.regs.reg_addr(d), quotient as u16);
                bus.write(cpu.regs.reg_addr(d.wrapping_add(1)), remainder as u16);
            }
            96 + c1 + c2
        }
        _ => {
            eprintln!("ti99-cpu: unhandled format-III opcode {op:#06X}");
            4
        }
    }
}

fn cru_transfer(cpu: &mut Cpu, bus: &mut impl Bus, ts: u8, s: u8, count_field: u8, is_ldcr: bool) -> i32 {
    let count = if count_field == 0 { 16 } else { u32::from(count_field) };
    let is_byte = count <= 8;
    let (operand, c1) = ea::resolve(bus, &mut cpu.regs, ts, s, is_byte);
    let base = cru_base(cpu, bus) as u16;
    let mut cost = 20 + 2 * count as i32 + c1;

    if is_ldcr {
        let (value, c2) = if is_byte {
            let (b, c) = ea::read_byte(bus, operand);
            (u16::from(b), c)
        } else {
            ea::read_word(bus, operand)
        };
        cost += c2;
        for i in 0..count {
            bus.cru_write(base.wrapping_add(i as u16), value & (1 << i) != 0);
        }
        let flag_value = if is_byte { value as u8 as i8 as i32 } else { value as i16 as i32 };
        cpu.regs.st = flags::update_lae_word(cpu.regs.st, (flag_value & 0xFFFF) as u16);
    } else {
        let mut value: u16 = 0;
        for i in 0..count {
            if bus.cru_read(base.wrapping_add(i as u16)) {
                value |= 1 << i;
            }
        }
        let c2 = if is_byte {
            ea::write_byte(bus, operand, value as u8)
        } else {
            ea::write_word(bus, operand, value)
        };
        cost += c2;
        cpu.regs.st = if is_byte {
            alu::logic_byte(cpu.regs.st, value as u8)
        } else {
            alu::logic_word(cpu.regs.st, value)
        };
    }
    cost
}
