//! GROM (Graphics ROM) sequencer.
//!
//! GROM is addressed as a 3-bit bank (the high 3 address bits) plus a
//! 13-bit offset that auto-increments and wraps within the bank. Two
//! address-port writes load a 16-bit address (high byte first); loading
//! the address immediately pre-fetches the byte at that address into
//! `last_byte`, which is what makes the following data-port read return
//! the right byte with no extra latency. Each data-port read then
//! refills `last_byte` from the next address and increments.
//!
//! Console firmware lives in banks 0-2 (24 KiB) and is read-only;
//! cartridges may supply additional banks (3-7) that this sequencer
//! treats as writable GRAM. Writes into the read-only console banks are
//! accepted (so the latch/address machinery still runs and the access
//! still costs cycles) but have no effect on the backing bytes.

const BANK_SIZE: usize = 0x2000;
const OFFSET_MASK: u16 = 0x1FFF;
const CONSOLE_BANKS: usize = 3;

pub struct Grom {
    console: Box<[u8]>,
    cart: Vec<u8>,
    addr: u16,
    /// Buffered high byte while waiting for the low byte of a new
    /// address (`None` = next write starts a fresh load).
    addr_latch: Option<u8>,
    last_byte: u8,
}

impl Grom {
    /// `console` must be exactly 24 KiB (3 banks). `cart` holds any
    /// cartridge-supplied GROM banks (banks 3 and up), treated as
    /// writable GRAM; it may be empty.
    #[must_use]
    pub fn new(console: Vec<u8>, cart: Vec<u8>) -> Self {
        let mut grom = Self {
            console: console.into_boxed_slice(),
            cart,
            addr: 0,
            addr_latch: None,
            last_byte: 0,
        };
        grom.last_byte = grom.byte_at(0);
        grom
    }

    fn byte_at(&self, addr: u16) -> u8 {
        let bank = usize::from(addr >> 13);
        let offset = usize::from(addr & OFFSET_MASK);
        if bank < CONSOLE_BANKS {
            self.console.get(bank * BANK_SIZE + offset).copied().unwrap_or(0)
        } else {
            let cart_offset = (bank - CONSOLE_BANKS) * BANK_SIZE + offset;
            self.cart.get(cart_offset).copied().unwrap_or(0)
        }
    }

    fn store_at(&mut self, addr: u16, value: u8) {
        let bank = usize::from(addr >> 13);
        if bank < CONSOLE_BANKS {
            return; // console GROM is read-only
        }
        let offset = usize::from(addr & OFFSET_MASK);
        let cart_offset = (bank - CONSOLE_BANKS) * BANK_SIZE + offset;
        if let Some(slot) = self.cart.get_mut(cart_offset) {
            *slot = value;
        }
    }

    fn bump_offset(&mut self) {
        let bank = self.addr & !OFFSET_MASK;
        let offset = (self.addr & OFFSET_MASK).wrapping_add(1) & OFFSET_MASK;
        self.addr = bank | offset;
    }

    /// Two-phase address-port write: first byte is the high half,
    /// second is the low half. Completing the second phase pre-fetches
    /// `last_byte` and advances the address.
    pub fn write_address(&mut self, byte: u8) {
        match self.addr_latch.take() {
            None => self.addr_latch = Some(byte),
            Some(high) => {
                self.addr = u16::from(high) << 8 | u16::from(byte);
                self.last_byte = self.byte_at(self.addr);
                self.bump_offset();
            }
        }
    }

    /// Address-port read: returns the current address's high byte and
    /// clears the write latch (a fresh address load can then begin).
    pub fn read_address(&mut self) -> u8 {
        self.addr_latch = None;
        (self.addr >> 8) as u8
    }

    /// Data-port read: returns the pre-fetched byte, then refills it
    /// from the (already-advanced) address and increments again.
    pub fn read_data(&mut self) -> u8 {
        self.addr_latch = None;
        let value = self.last_byte;
        self.last_byte = self.byte_at(self.addr);
        self.bump_offset();
        value
    }

    /// Data-port write: stores into cartridge GRAM if the bank is
    /// writable, otherwise is a no-op; either way the address still
    /// advances.
    pub fn write_data(&mut self, byte: u8) {
        self.addr_latch = None;
        self.store_at(self.addr, byte);
        self.bump_offset();
    }

    #[must_use]
    pub fn address(&self) -> u16 {
        self.addr
    }

    // The following accessors exist for the debugger's undo journal, which
    // snapshots and restores device state around every port access rather
    // than decoding each operation's internal branches.

    pub fn set_address(&mut self, addr: u16) {
        self.addr = addr;
    }

    #[must_use]
    pub fn latch(&self) -> Option<u8> {
        self.addr_latch
    }

    pub fn set_latch(&mut self, latch: Option<u8>) {
        self.addr_latch = latch;
    }

    #[must_use]
    pub fn last_byte(&self) -> u8 {
        self.last_byte
    }

    pub fn set_last_byte(&mut self, byte: u8) {
        self.last_byte = byte;
    }

    /// Peeks the byte backing a given address without the side effects of
    /// a real data-port read (no latch reset, no auto-increment).
    #[must_use]
    pub fn peek(&self, addr: u16) -> u8 {
        self.byte_at(addr)
    }

    /// Pokes the byte backing a given address, subject to the same
    /// console-bank-is-read-only rule as a real data-port write.
    pub fn poke(&mut self, addr: u16, value: u8) {
        self.store_at(addr, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn console_image() -> Vec<u8> {
        let mut data = vec![0u8; CONSOLE_BANKS * BANK_SIZE];
        data[0] = 0xAA;
        data[1] = 0xBB;
        data[BANK_SIZE] = 0xCC;
        data
    }

    #[test]
    fn address_load_prefetches_first_byte() {
        let mut grom = Grom::new(console_image(), Vec::new());
        grom.write_address(0x00);
        grom.write_address(0x00);
        assert_eq!(grom.last_byte, 0xAA);
    }

    #[test]
    fn data_read_returns_prefetch_then_advances() {
        let mut grom = Grom::new(console_image(), Vec::new());
        grom.write_address(0x00);
        grom.write_address(0x00);
        assert_eq!(grom.read_data(), 0xAA);
        assert_eq!(grom.read_data(), 0xBB);
    }

    #[test]
    fn offset_wraps_within_bank_preserving_bank_bits() {
        let mut grom = Grom::new(console_image(), Vec::new());
        grom.write_address((0x2000u16 >> 8) as u8);
        grom.write_address(0xFF);
        // addr = 0x20FF; bump wraps into bank 1 unaffected until 0x1FFF boundary
        assert_eq!(grom.address() & !OFFSET_MASK, 0x2000);
    }

    #[test]
    fn write_into_console_bank_is_ignored() {
        let mut grom = Grom::new(console_image(), Vec::new());
        grom.write_address(0x00);
        grom.write_address(0x00);
        grom.write_data(0x99);
        assert_eq!(grom.byte_at(0), 0xAA);
    }

    #[test]
    fn write_into_cartridge_bank_is_stored() {
        let mut grom = Grom::new(console_image(), vec![0u8; BANK_SIZE]);
        let cart_addr = (CONSOLE_BANKS as u16) * BANK_SIZE as u16; // start of bank 3
        grom.write_address((cart_addr >> 8) as u8);
        grom.write_address((cart_addr & 0xFF) as u8);
        // the address-load pre-fetch already advanced the address by one
        // before this write lands.
        grom.write_data(0x42);
        assert_eq!(grom.cart[1], 0x42);
    }

    #[test]
    fn address_port_read_clears_latch() {
        let mut grom = Grom::new(console_image(), Vec::new());
        grom.write_address(0x12);
        let _ = grom.read_address();
        assert!(grom.addr_latch.is_none());
        // Next write_address now starts a fresh high-byte phase, not a
        // continuation of the stale 0x12.
        grom.write_address(0x00);
        grom.write_address(0x00);
        assert_eq!(grom.address() & 0xFF00, 0);
    }
}
