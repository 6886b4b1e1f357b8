//! Cartridge ROM bank controller.
//!
//! The `0x6000-0x7FFF` window is a read-through to the currently selected
//! bank. Any write into that window is interpreted as a bank-select: the
//! new bank is `(address >> 1) & bank_mask`, with no data stored. Reads
//! outside the loaded image return 0xFF, mirroring an empty cartridge
//! socket.

pub const WINDOW_BASE: u16 = 0x6000;
pub const WINDOW_SIZE: usize = 0x2000;
const BANK_STRIDE: usize = 0x1000;

pub struct Cartridge {
    rom: Vec<u8>,
    bank: usize,
    bank_mask: usize,
}

impl Cartridge {
    /// Loads a cartridge image. Bank count is derived from the image size
    /// (rounded up to a whole number of `BANK_STRIDE`-sized banks), and
    /// the select mask is the next power of two above that count, minus
    /// one, so that `(addr >> 1) & bank_mask` always lands on a bank the
    /// image actually has data for (or past the end, read as 0xFF).
    #[must_use]
    pub fn new(rom: Vec<u8>) -> Self {
        let bank_count = rom.len().div_ceil(BANK_STRIDE).max(1);
        let bank_mask = bank_count.next_power_of_two() - 1;
        Self { rom, bank: 0, bank_mask }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    #[must_use]
    pub fn current_bank(&self) -> usize {
        self.bank
    }

    /// Reads a byte from the current bank's view of the cartridge window.
    /// `offset` is relative to `WINDOW_BASE` (0..WINDOW_SIZE).
    #[must_use]
    pub fn read(&self, offset: usize) -> u8 {
        let index = self.bank * BANK_STRIDE + offset;
        self.rom.get(index).copied().unwrap_or(0xFF)
    }

    /// Any write into the cartridge window selects a new bank; no data is
    /// stored. `addr` is the absolute CPU address (0x6000..0x8000).
    pub fn select_bank(&mut self, addr: u16) {
        self.bank = (usize::from(addr) >> 1) & self.bank_mask;
    }

    /// Restores a bank index directly. Exists for the debugger's undo
    /// journal, which snapshots and restores `current_bank()` around every
    /// window write rather than re-deriving it from a past address.
    pub fn set_bank(&mut self, bank: usize) {
        self.bank = bank;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_rom(banks: usize) -> Vec<u8> {
        let mut rom = vec![0u8; banks * BANK_STRIDE];
        for (bank, chunk) in rom.chunks_mut(BANK_STRIDE).enumerate() {
            chunk[0] = bank as u8;
        }
        rom
    }

    #[test]
    fn starts_on_bank_zero() {
        let cart = Cartridge::new(make_rom(4));
        assert_eq!(cart.read(0), 0);
    }

    #[test]
    fn write_into_window_selects_bank_from_address() {
        let mut cart = Cartridge::new(make_rom(4));
        // bank_mask for 4 banks is 3; (0x6002 >> 1) & 3 = 0x3001 & 3 = 1
        cart.select_bank(0x6002);
        assert_eq!(cart.current_bank(), 1);
        assert_eq!(cart.read(0), 1);
    }

    #[test]
    fn bank_select_wraps_via_mask() {
        let mut cart = Cartridge::new(make_rom(4));
        cart.select_bank(0x6000 + (9 * 2)); // (addr>>1)=9, mask=3 -> bank 1
        assert_eq!(cart.current_bank(), 1);
    }

    #[test]
    fn out_of_range_read_returns_0xff() {
        let cart = Cartridge::empty();
        assert_eq!(cart.read(0), 0xFF);
    }
}
