//! Top-level TI-99/4A-class machine: CPU, bus, and the scanline scheduler.

use emu_core::{Observable, Value};
use ti99_cartridge::Cartridge;
use ti99_cpu::{Bus, Cpu};
use ti99_grom::Grom;

use crate::bus::MachineBus;
use crate::config::{ConfigError, EmulatorConfig, VideoStandard};
use crate::journal::{UndoJournal, UndoResult};
use crate::sinks::{AudioSink, VideoSink};

/// Cycles charged to `total_cycles`/debited from the CPU's budget per
/// scanline, regardless of how many instructions actually ran.
const CYCLES_PER_SCANLINE: i64 = 191;
/// Last visible scanline (0-indexed); lines past this are vertical blank.
const LAST_VISIBLE_LINE: u16 = 239;
/// Scanline at which the VDP's F flag is set and a VBL interrupt may fire.
const VBLANK_LINE: u16 = 246;

pub struct Emulator {
    cpu: Cpu,
    bus: MachineBus,
    /// Current scanline, 0..scanlines_per_frame.
    y: u16,
    video_standard: VideoStandard,
}

impl Emulator {
    /// Builds a machine from `config`, resetting the CPU from the vector at
    /// `0x0000`/`0x0002` in `config.console_rom`.
    pub fn new(config: EmulatorConfig, audio: Box<dyn AudioSink>) -> Result<Self, ConfigError> {
        config.validate()?;
        let grom = Grom::new(config.console_grom, Vec::new());
        let cartridge = Cartridge::new(config.cartridge);
        let mut bus = MachineBus::new(config.console_rom, grom, cartridge, audio);
        let mut cpu = Cpu::new();
        cpu.reset(&mut bus);
        Ok(Self { cpu, bus, y: 0, video_standard: config.video_standard })
    }

    /// Enables the debugger's undo journal with a ring of `capacity`
    /// deltas. Recording has a real cost (a snapshot/diff per device
    /// access), so it is off by default.
    pub fn enable_undo(&mut self, capacity: usize) {
        self.bus.journal = Some(UndoJournal::new(capacity));
    }

    pub fn disable_undo(&mut self) {
        self.bus.journal = None;
    }

    /// Runs exactly one CPU instruction, recording an undo delta if
    /// journaling is enabled. Used by the debugger's single-step loop, as
    /// opposed to the scanline-paced [`Emulator::run_frame`].
    pub fn single_step(&mut self) {
        if let Some(journal) = &mut self.bus.journal {
            journal.mark_instruction_boundary(self.cpu.regs.pc, self.cpu.regs.wp, self.cpu.regs.st);
        }
        self.cpu.step_single(&mut self.bus);
    }

    /// Reverses the last single-stepped instruction. Returns
    /// [`UndoResult::Exhausted`] if the journal is disabled or empty.
    pub fn undo_step(&mut self) -> UndoResult {
        let Some(mut journal) = self.bus.journal.take() else {
            return UndoResult::Exhausted;
        };
        let result = journal.undo_one(&mut self.cpu, &mut self.bus);
        self.bus.journal = Some(journal);
        result
    }

    /// Runs one full frame: every scanline is rendered (if visible),
    /// vertical blank is raised at line 246, and the CPU is run forward by
    /// a flat 191 cycles per line, interleaved with interrupt delivery at
    /// instruction boundaries.
    pub fn run_frame(&mut self, video: &mut dyn VideoSink) {
        let scanlines = self.video_standard.scanlines_per_frame();
        for _ in 0..scanlines {
            if self.y <= LAST_VISIBLE_LINE {
                let mut line = [0u8; 256];
                self.bus.vdp.render_line(self.y, &mut line);
                video.scanline(self.y, &line);
            }
            if self.y == VBLANK_LINE {
                self.bus.vdp.raise_vblank();
                if self.bus.vdp.wants_interrupt() {
                    self.cpu.request_interrupt(Some(1));
                }
            }
            self.y = (self.y + 1) % scanlines;
            self.bus.total_cycles = self.bus.total_cycles.wrapping_add(CYCLES_PER_SCANLINE as u64);
            self.cpu.cyc -= CYCLES_PER_SCANLINE;
            self.cpu.run_until_positive(&mut self.bus);
        }
    }

    /// Sets or clears a single keyboard key. `row`/`column` are 0-7.
    pub fn set_key(&mut self, row: usize, column: usize, pressed: bool) {
        self.bus.cru.set_key(row, column, pressed);
    }

    /// Re-runs the reset sequence: reloads WP/PC from the vector and
    /// clears the CPU's interrupt/cycle state. Device state (VDP, GROM,
    /// PSG, CRU) is left as-is, matching a real console's RESET line.
    pub fn request_reset(&mut self) {
        self.cpu.reset(&mut self.bus);
    }

    #[must_use]
    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    #[must_use]
    pub fn current_scanline(&self) -> u16 {
        self.y
    }

    /// `safe_read(addr)`: the side-effect-free memory peek the memory map
    /// specifies for debuggers and tooling. Never advances a VDP/GROM
    /// address, never clears VDP status bits, never refills a GROM's
    /// pre-fetch byte — safe to call at any point without perturbing the
    /// machine.
    #[must_use]
    pub fn peek_word(&self, addr: u16) -> u16 {
        self.bus.safe_read(addr)
    }

    /// Writes a word directly to the bus, bypassing the CPU. Used by tests
    /// to stage instruction words and operands at a known address.
    pub fn bus_write_for_test(&mut self, addr: u16, value: u16) {
        self.bus.write(addr, value);
    }

    /// Reads a word through the real, mutating bus path, bypassing the
    /// CPU. Unlike `peek_word`, this runs the target port's side effects
    /// (VDP status clears, GROM auto-increment, …) — for tests that need
    /// to exercise those side effects directly rather than via CPU
    /// instructions.
    pub fn mutating_read_for_test(&mut self, addr: u16) -> u16 {
        self.bus.read(addr).value
    }

    /// Sets a VDP register directly, bypassing the control-port protocol.
    /// Used by tests that need a register (e.g. IE) preset before the
    /// first scanline runs.
    pub fn poke_vdp_reg_for_test(&mut self, n: usize, value: u8) {
        self.bus.vdp.set_reg(n, value);
    }
}

impl Observable for Emulator {
    fn query(&self, path: &str) -> Option<Value> {
        if let Some(rest) = path.strip_prefix("cpu.") {
            self.cpu.query(rest)
        } else if let Some(rest) = path.strip_prefix("vdp.") {
            match rest {
                "addr" => Some(Value::U16(self.bus.vdp.address())),
                "status" => Some(Value::U8(self.bus.vdp.status_byte())),
                _ => rest.strip_prefix("reg").and_then(|n| n.parse::<usize>().ok()).and_then(|n| {
                    (n < 8).then(|| Value::U8(self.bus.vdp.reg(n)))
                }),
            }
        } else if let Some(rest) = path.strip_prefix("grom.") {
            match rest {
                "addr" => Some(Value::U16(self.bus.grom.address())),
                "last_byte" => Some(Value::U8(self.bus.grom.last_byte())),
                _ => None,
            }
        } else if let Some(rest) = path.strip_prefix("cru.") {
            match rest {
                "row" => Some(Value::U8(self.bus.cru.row_selector())),
                "alpha_lock" => Some(Value::Bool(self.bus.cru.alpha_lock())),
                _ => None,
            }
        } else {
            match path {
                "y" => Some(Value::U16(self.y)),
                "total_cycles" => Some(Value::U64(self.bus.total_cycles)),
                "cart_bank" => Some(Value::U64(self.bus.cartridge.current_bank() as u64)),
                _ => self.cpu.query(path),
            }
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &[
            "cpu.<pc|wp|st|cyc>",
            "vdp.addr",
            "vdp.status",
            "vdp.reg<0-7>",
            "grom.addr",
            "grom.last_byte",
            "cru.row",
            "cru.alpha_lock",
            "y",
            "total_cycles",
            "cart_bank",
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CONSOLE_GROM_SIZE, CONSOLE_ROM_SIZE};
    use crate::sinks::{NullAudioSink, NullVideoSink};

    fn make_config() -> EmulatorConfig {
        let mut rom = vec![0u8; CONSOLE_ROM_SIZE];
        // Reset vector: WP = 0x8300, PC = 0x8010 (fast RAM, so tests can
        // poke instruction words directly; 0x6000 would land in the
        // cartridge window, which only accepts bank-select writes).
        rom[0] = 0x83;
        rom[1] = 0x00;
        rom[2] = 0x80;
        rom[3] = 0x10;
        EmulatorConfig {
            console_rom: rom,
            console_grom: vec![0u8; CONSOLE_GROM_SIZE],
            cartridge: Vec::new(),
            video_standard: VideoStandard::Ntsc,
            sams: false,
        }
    }

    #[test]
    fn new_resets_cpu_from_vector() {
        let emu = Emulator::new(make_config(), Box::new(NullAudioSink)).unwrap();
        assert_eq!(emu.cpu().regs.wp, 0x8300);
        assert_eq!(emu.cpu().regs.pc, 0x8010);
    }

    #[test]
    fn run_frame_advances_scanline_counter_back_to_zero() {
        let mut emu = Emulator::new(make_config(), Box::new(NullAudioSink)).unwrap();
        let mut video = NullVideoSink;
        emu.run_frame(&mut video);
        assert_eq!(emu.current_scanline(), 0);
    }

    #[test]
    fn undo_step_reverses_a_register_write() {
        let mut emu = Emulator::new(make_config(), Box::new(NullAudioSink)).unwrap();
        emu.enable_undo(64);
        // LI R0, 0x1234 at the reset PC.
        emu.bus.write(0x8010, 0x0200);
        emu.bus.write(0x8012, 0x1234);
        let wp = emu.cpu.regs.wp;
        emu.single_step();
        assert_eq!(emu.bus.read(wp).value, 0x1234);
        let result = emu.undo_step();
        assert_eq!(result, UndoResult::Restored);
        assert_eq!(emu.bus.read(wp).value, 0);
        assert_eq!(emu.cpu.regs.pc, 0x8010);
    }

    #[test]
    fn undo_step_reports_exhaustion_once_empty() {
        let mut emu = Emulator::new(make_config(), Box::new(NullAudioSink)).unwrap();
        emu.enable_undo(64);
        assert_eq!(emu.undo_step(), UndoResult::Exhausted);
    }

    #[test]
    fn observable_routes_to_cpu_and_vdp() {
        let emu = Emulator::new(make_config(), Box::new(NullAudioSink)).unwrap();
        assert_eq!(emu.query("cpu.pc"), Some(Value::U16(0x8010)));
        assert_eq!(emu.query("vdp.addr"), Some(Value::U16(0)));
        assert_eq!(emu.query("y"), Some(Value::U16(0)));
    }
}
