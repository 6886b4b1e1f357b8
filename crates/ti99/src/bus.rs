//! The machine bus: owns every memory-mapped device and routes CPU
//! accesses to them via [`memmap::classify`].

use ti99_cartridge::Cartridge;
use ti99_cpu::{Access, Bus};
use ti99_cru::Cru;
use ti99_grom::Grom;
use ti_sn76489::Sn76489;
use ti_tms9918::Vdp;

use crate::journal::{pack_latch, DeltaCode, UndoJournal};
use crate::memmap::{self, PageKind};
use crate::sinks::AudioSink;

pub struct MachineBus {
    rom: Box<[u8]>,
    low_expansion_ram: Box<[u8]>,
    high_expansion_ram: Box<[u8]>,
    fast_ram: [u8; 256],
    pub(crate) cartridge: Cartridge,
    pub(crate) vdp: Vdp,
    pub(crate) grom: Grom,
    pub(crate) cru: Cru,
    pub(crate) psg: Sn76489,
    /// Monotonic cycle counter sampled by the CRU timer; advanced by a
    /// flat 191 per scanline regardless of actual instruction cost.
    pub(crate) total_cycles: u64,
    pub(crate) audio: Box<dyn AudioSink>,
    /// Present only while the debugger's undo journal is recording.
    pub(crate) journal: Option<UndoJournal>,
    /// Addresses in an unimplemented peripheral region already warned
    /// about, so a tight loop against a stub port doesn't flood stderr.
    logged_stubs: std::collections::HashSet<u16>,
}

const LOW_EXPANSION_SIZE: usize = 0x2000;
const HIGH_EXPANSION_SIZE: usize = 0x6000;

struct VdpSnapshot {
    addr: u16,
    latch: Option<u8>,
    status: u8,
    regs: [u8; 8],
    vram_byte: u8,
}

struct GromSnapshot {
    addr: u16,
    latch: Option<u8>,
    last_byte: u8,
    byte: u8,
}

impl MachineBus {
    pub(crate) fn new(
        rom: Vec<u8>,
        grom: Grom,
        cartridge: Cartridge,
        audio: Box<dyn AudioSink>,
    ) -> Self {
        Self {
            rom: rom.into_boxed_slice(),
            low_expansion_ram: vec![0; LOW_EXPANSION_SIZE].into_boxed_slice(),
            high_expansion_ram: vec![0; HIGH_EXPANSION_SIZE].into_boxed_slice(),
            fast_ram: [0; 256],
            cartridge,
            vdp: Vdp::new(),
            grom,
            cru: Cru::new(),
            psg: Sn76489::new(3_579_545, 48_000),
            total_cycles: 0,
            audio,
            journal: None,
            logged_stubs: std::collections::HashSet::new(),
        }
    }

    fn pump_audio(&mut self) {
        for byte in self.psg.take_buffer() {
            self.audio.push_sample(byte);
        }
    }

    /// Warns once per distinct address in a page with no installed device.
    fn warn_unmapped(&mut self, addr: u16, region: &str) {
        if self.logged_stubs.insert(addr) {
            eprintln!("ti99: access to unmapped {region} port at {addr:#06x} (further hits at this address are silent)");
        }
    }

    /// Records the before-value of a fast-RAM/expansion-RAM word write, if
    /// the undo journal is active. Covers the general registers too, since
    /// R0..R15 are workspace-aliased fast RAM words.
    fn record_mem_word(&mut self, addr: u16, before: u16) {
        if let Some(journal) = &mut self.journal {
            journal.record(DeltaCode::MemWord, u32::from(addr) << 16 | u32::from(before));
        }
    }

    /// Writes a raw word into whichever RAM region backs `addr`, bypassing
    /// cost accounting and journal recording. Used only to replay a
    /// [`DeltaCode::MemWord`] delta.
    pub(crate) fn restore_word(&mut self, addr: u16, value: u16) {
        match memmap::classify(addr) {
            PageKind::LowExpansionRam => write_word(&mut self.low_expansion_ram, addr - 0x2000, value),
            PageKind::HighExpansionRam => write_word(&mut self.high_expansion_ram, addr - 0xA000, value),
            PageKind::FastRam => write_word_wrap(&mut self.fast_ram, addr & 0xFF, value),
            _ => {}
        }
    }

    fn snapshot_vdp(&self) -> VdpSnapshot {
        let addr = self.vdp.address();
        VdpSnapshot {
            addr,
            latch: self.vdp.latch(),
            status: self.vdp.status_byte(),
            regs: std::array::from_fn(|i| self.vdp.reg(i)),
            vram_byte: self.vdp.vram_byte(addr),
        }
    }

    /// Diffs the VDP's observable state against a pre-access snapshot and
    /// records one delta per field that actually changed, rather than
    /// decoding which of the VDP's internal branches ran.
    fn diff_vdp(&mut self, before: VdpSnapshot) {
        let Some(journal) = &mut self.journal else { return };
        if before.addr != self.vdp.address() {
            journal.record(DeltaCode::VdpAddr, u32::from(before.addr));
        }
        if before.latch != self.vdp.latch() {
            journal.record(DeltaCode::VdpLatch, pack_latch(before.latch));
        }
        if before.status != self.vdp.status_byte() {
            journal.record(DeltaCode::VdpStatus, u32::from(before.status));
        }
        for (i, &old) in before.regs.iter().enumerate() {
            if old != self.vdp.reg(i) {
                journal.record(DeltaCode::VdpReg, (i as u32) << 16 | u32::from(old));
            }
        }
        if self.vdp.vram_byte(before.addr) != before.vram_byte {
            journal.record(
                DeltaCode::VdpVram,
                u32::from(before.addr) << 8 | u32::from(before.vram_byte),
            );
        }
    }

    fn snapshot_grom(&self) -> GromSnapshot {
        let addr = self.grom.address();
        GromSnapshot {
            addr,
            latch: self.grom.latch(),
            last_byte: self.grom.last_byte(),
            byte: self.grom.peek(addr),
        }
    }

    fn diff_grom(&mut self, before: GromSnapshot) {
        let Some(journal) = &mut self.journal else { return };
        if before.addr != self.grom.address() {
            journal.record(DeltaCode::GromAddr, u32::from(before.addr));
        }
        if before.latch != self.grom.latch() {
            journal.record(DeltaCode::GromLatch, pack_latch(before.latch));
        }
        if before.last_byte != self.grom.last_byte() {
            journal.record(DeltaCode::GromLastByte, u32::from(before.last_byte));
        }
        if self.grom.peek(before.addr) != before.byte {
            journal.record(
                DeltaCode::GromVram,
                u32::from(before.addr) << 8 | u32::from(before.byte),
            );
        }
    }
}

impl Bus for MachineBus {
    fn read(&mut self, addr: u16) -> Access {
        let kind = memmap::classify(addr);
        let cost = memmap::read_cost(kind);
        let value = match kind {
            PageKind::SystemRom => {
                let lo = self.rom[usize::from(addr)];
                let hi = self.rom.get(usize::from(addr) + 1).copied().unwrap_or(0);
                u16::from(lo) << 8 | u16::from(hi)
            }
            PageKind::LowExpansionRam => read_word(&self.low_expansion_ram, addr - 0x2000),
            PageKind::HighExpansionRam => read_word(&self.high_expansion_ram, addr - 0xA000),
            PageKind::PeripheralStub => {
                self.warn_unmapped(addr, "peripheral card");
                0
            }
            PageKind::SpeechStub => {
                self.warn_unmapped(addr, "speech synthesizer");
                0
            }
            PageKind::CartridgeRom => {
                let offset = usize::from(addr - ti99_cartridge::WINDOW_BASE);
                u16::from(self.cartridge.read(offset)) << 8
                    | u16::from(self.cartridge.read(offset + 1))
            }
            PageKind::FastRam => read_word_wrap(&self.fast_ram, addr & 0xFF),
            PageKind::SoundPort => 0,
            PageKind::VdpDataRead => {
                let snap = self.snapshot_vdp();
                let value = u16::from(self.vdp.data_read()) << 8;
                self.diff_vdp(snap);
                value
            }
            PageKind::VdpStatusRead => {
                let snap = self.snapshot_vdp();
                let value = u16::from(self.vdp.status_read()) << 8;
                self.diff_vdp(snap);
                value
            }
            PageKind::VdpDataWrite | PageKind::VdpAddressWrite => 0,
            PageKind::GromDataRead => {
                let snap = self.snapshot_grom();
                let value = u16::from(self.grom.read_data()) << 8;
                self.diff_grom(snap);
                value
            }
            PageKind::GromAddressRead => {
                let snap = self.snapshot_grom();
                let value = u16::from(self.grom.read_address()) << 8;
                self.diff_grom(snap);
                value
            }
            PageKind::GromDataWrite | PageKind::GromAddressWrite => 0,
        };
        self.pump_audio();
        Access::new(value, cost)
    }

    /// Side-effect-free equivalent of [`read`](Self::read): never advances
    /// a VDP/GROM address, never clears VDP status bits, never refills a
    /// GROM's pre-fetch byte, never logs an unmapped-port warning. Each
    /// branch here peeks whatever `read`'s matching branch would have
    /// observed without running the mutating half of that branch.
    fn safe_read(&self, addr: u16) -> u16 {
        match memmap::classify(addr) {
            PageKind::SystemRom => {
                let lo = self.rom[usize::from(addr)];
                let hi = self.rom.get(usize::from(addr) + 1).copied().unwrap_or(0);
                u16::from(lo) << 8 | u16::from(hi)
            }
            PageKind::LowExpansionRam => read_word(&self.low_expansion_ram, addr - 0x2000),
            PageKind::HighExpansionRam => read_word(&self.high_expansion_ram, addr - 0xA000),
            PageKind::PeripheralStub | PageKind::SpeechStub | PageKind::SoundPort => 0,
            PageKind::CartridgeRom => {
                let offset = usize::from(addr - ti99_cartridge::WINDOW_BASE);
                u16::from(self.cartridge.read(offset)) << 8
                    | u16::from(self.cartridge.read(offset + 1))
            }
            PageKind::FastRam => read_word_wrap(&self.fast_ram, addr & 0xFF),
            PageKind::VdpDataRead => u16::from(self.vdp.vram_byte(self.vdp.address())) << 8,
            PageKind::VdpStatusRead => u16::from(self.vdp.status_byte()) << 8,
            PageKind::VdpDataWrite | PageKind::VdpAddressWrite => 0,
            PageKind::GromDataRead => u16::from(self.grom.last_byte()) << 8,
            PageKind::GromAddressRead => u16::from((self.grom.address() >> 8) as u8) << 8,
            PageKind::GromDataWrite | PageKind::GromAddressWrite => 0,
        }
    }

    fn write(&mut self, addr: u16, value: u16) -> i32 {
        let kind = memmap::classify(addr);
        let cost = memmap::write_cost(kind);
        match kind {
            PageKind::SystemRom => {}
            PageKind::PeripheralStub => self.warn_unmapped(addr, "peripheral card"),
            PageKind::SpeechStub => self.warn_unmapped(addr, "speech synthesizer"),
            PageKind::LowExpansionRam => {
                let offset = addr - 0x2000;
                let before = read_word(&self.low_expansion_ram, offset);
                self.record_mem_word(addr, before);
                write_word(&mut self.low_expansion_ram, offset, value);
            }
            PageKind::HighExpansionRam => {
                let offset = addr - 0xA000;
                let before = read_word(&self.high_expansion_ram, offset);
                self.record_mem_word(addr, before);
                write_word(&mut self.high_expansion_ram, offset, value);
            }
            PageKind::CartridgeRom => {
                if let Some(journal) = &mut self.journal {
                    journal.record(DeltaCode::CartBank, self.cartridge.current_bank() as u32);
                }
                self.cartridge.select_bank(addr);
            }
            PageKind::FastRam => {
                let offset = addr & 0xFF;
                let before = read_word_wrap(&self.fast_ram, offset);
                self.record_mem_word(addr, before);
                write_word_wrap(&mut self.fast_ram, offset, value);
            }
            PageKind::SoundPort => self.psg.write((value >> 8) as u8),
            PageKind::VdpDataRead | PageKind::VdpStatusRead => {}
            PageKind::VdpDataWrite => {
                let snap = self.snapshot_vdp();
                self.vdp.data_write((value >> 8) as u8);
                self.diff_vdp(snap);
            }
            PageKind::VdpAddressWrite => {
                let snap = self.snapshot_vdp();
                self.vdp.control_write((value >> 8) as u8);
                self.diff_vdp(snap);
            }
            PageKind::GromDataRead | PageKind::GromAddressRead => {}
            PageKind::GromDataWrite => {
                let snap = self.snapshot_grom();
                self.grom.write_data((value >> 8) as u8);
                self.diff_grom(snap);
            }
            PageKind::GromAddressWrite => {
                let snap = self.snapshot_grom();
                self.grom.write_address((value >> 8) as u8);
                self.diff_grom(snap);
            }
        }
        self.pump_audio();
        cost
    }

    fn cru_read(&mut self, bit: u16) -> bool {
        self.cru.read(bit, self.total_cycles, self.vdp_f())
    }

    fn cru_write(&mut self, bit: u16, value: bool) {
        let before_row = self.cru.row_selector();
        self.cru.write(bit, value);
        if before_row != self.cru.row_selector() {
            if let Some(journal) = &mut self.journal {
                journal.record(DeltaCode::CruRow, u32::from(before_row));
            }
        }
    }
}

impl MachineBus {
    fn vdp_f(&self) -> bool {
        // Peek without the read-clears-status side effect: mirrors the
        // status byte's top bit directly.
        self.vdp.status_f()
    }
}

fn read_word(buf: &[u8], offset: u16) -> u16 {
    let i = usize::from(offset);
    let hi = buf.get(i).copied().unwrap_or(0);
    let lo = buf.get(i + 1).copied().unwrap_or(0);
    u16::from(hi) << 8 | u16::from(lo)
}

fn write_word(buf: &mut [u8], offset: u16, value: u16) {
    let i = usize::from(offset);
    if let Some(hi) = buf.get_mut(i) {
        *hi = (value >> 8) as u8;
    }
    if let Some(lo) = buf.get_mut(i + 1) {
        *lo = value as u8;
    }
}

fn read_word_wrap(buf: &[u8; 256], offset: u16) -> u16 {
    let i = usize::from(offset);
    let hi = buf[i];
    let lo = buf[(i + 1) & 0xFF];
    u16::from(hi) << 8 | u16::from(lo)
}

fn write_word_wrap(buf: &mut [u8; 256], offset: u16, value: u16) {
    let i = usize::from(offset);
    buf[i] = (value >> 8) as u8;
    buf[(i + 1) & 0xFF] = value as u8;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::NullAudioSink;

    fn make_bus() -> MachineBus {
        let rom = vec![0u8; 0x2000];
        let grom = Grom::new(vec![0u8; 0x6000], Vec::new());
        let cartridge = Cartridge::empty();
        MachineBus::new(rom, grom, cartridge, Box::new(NullAudioSink))
    }

    #[test]
    fn fast_ram_aliases_every_256_bytes() {
        let mut bus = make_bus();
        bus.write(0x8000, 0xABCD);
        assert_eq!(bus.read(0x8100).value, 0xABCD);
        assert_eq!(bus.read(0x8200).value, 0xABCD);
        assert_eq!(bus.read(0x8300).value, 0xABCD);
    }

    #[test]
    fn rom_writes_are_ignored() {
        let mut bus = make_bus();
        bus.rom[0] = 0x12;
        bus.write(0x0000, 0xFFFF);
        assert_eq!(bus.read(0x0000).value, 0x1200);
    }

    #[test]
    fn sound_port_write_costs_34_cycles() {
        let mut bus = make_bus();
        let cost = bus.write(0x8400, 0x4000);
        assert_eq!(cost, 34);
    }

    #[test]
    fn cartridge_write_selects_bank_not_data() {
        let mut bus = make_bus();
        bus.cartridge = Cartridge::new(vec![0u8; 0x1000 * 4]);
        bus.write(0x6002, 0);
        assert_eq!(bus.cartridge.current_bank(), 1);
    }

    #[test]
    fn journal_records_nothing_when_disabled() {
        let mut bus = make_bus();
        bus.write(0x8000, 0x1234);
        assert!(bus.journal.is_none());
    }

    #[test]
    fn safe_read_does_not_advance_vdp_address_or_clear_status() {
        let mut bus = make_bus();
        bus.vdp.raise_vblank();
        bus.vdp.set_vram_byte(0, 0x42);
        let addr_before = bus.vdp.address();
        let status_before = bus.vdp.status_byte();

        assert_eq!(bus.safe_read(0x8800), 0x4200); // VDP data port
        assert_eq!(bus.vdp.address(), addr_before);
        assert_eq!(bus.safe_read(0x8802), u16::from(status_before) << 8); // status port
        assert_eq!(bus.vdp.status_byte(), status_before);
    }

    #[test]
    fn safe_read_does_not_advance_grom_or_clear_latch() {
        let mut bus = make_bus();
        bus.write(0x9C02, 0x1000); // address high = 0x10
        bus.write(0x9C02, 0x0000); // address low = 0x00, completes the load
        let addr_before = bus.grom.address();
        let last_before = bus.grom.last_byte();

        assert_eq!(bus.safe_read(0x9800), u16::from(last_before) << 8);
        assert_eq!(bus.grom.address(), addr_before);
        assert_eq!(bus.grom.last_byte(), last_before);
    }

    #[test]
    fn journal_captures_vdp_register_write() {
        let mut bus = make_bus();
        bus.journal = Some(UndoJournal::new(64));
        bus.write(0x8C02, 0x0000); // latch low byte
        bus.write(0x8C02, 0x8100); // register 1 <- 0x00
        let journal = bus.journal.take().unwrap();
        assert!(!journal.is_empty());
    }
}
