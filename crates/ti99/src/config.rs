//! Emulator configuration: ROM/GROM/cartridge images and machine options.

use std::fmt;

/// Console ROM size: 8 KiB, mapped read-only at `0x0000-0x1FFF`.
pub const CONSOLE_ROM_SIZE: usize = 0x2000;
/// Console GROM size: 24 KiB (3 banks), mapped through the GROM ports.
pub const CONSOLE_GROM_SIZE: usize = 0x6000;

/// Scanline count per frame; selects NTSC (262) or PAL (313) timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoStandard {
    Ntsc,
    Pal,
}

impl VideoStandard {
    #[must_use]
    pub fn scanlines_per_frame(self) -> u16 {
        match self {
            VideoStandard::Ntsc => 262,
            VideoStandard::Pal => 313,
        }
    }
}

/// Configuration needed to build an [`crate::Emulator`].
pub struct EmulatorConfig {
    pub console_rom: Vec<u8>,
    pub console_grom: Vec<u8>,
    /// Cartridge ROM image; empty means no cartridge inserted.
    pub cartridge: Vec<u8>,
    pub video_standard: VideoStandard,
    /// Enables the SAMS mapper's (currently inert) CRU configuration bits.
    pub sams: bool,
}

/// Errors that abort machine construction. Anomalies encountered once the
/// machine is running (bad opcodes, out-of-range CRU bits) are logged and
/// do not produce this type; only configuration is fail-fast.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    WrongLength { what: &'static str, expected: usize, got: usize },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "{e}"),
            Self::WrongLength { what, expected, got } => write!(
                f,
                "{what} must be exactly {expected} bytes, got {got}"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Reads a ROM/GROM/cartridge image from disk.
pub fn load_rom(path: &std::path::Path) -> Result<Vec<u8>, ConfigError> {
    Ok(std::fs::read(path)?)
}

impl EmulatorConfig {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.console_rom.len() != CONSOLE_ROM_SIZE {
            return Err(ConfigError::WrongLength {
                what: "console ROM",
                expected: CONSOLE_ROM_SIZE,
                got: self.console_rom.len(),
            });
        }
        if self.console_grom.len() != CONSOLE_GROM_SIZE {
            return Err(ConfigError::WrongLength {
                what: "console GROM",
                expected: CONSOLE_GROM_SIZE,
                got: self.console_grom.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(rom_len: usize, grom_len: usize) -> EmulatorConfig {
        EmulatorConfig {
            console_rom: vec![0; rom_len],
            console_grom: vec![0; grom_len],
            cartridge: Vec::new(),
            video_standard: VideoStandard::Ntsc,
            sams: false,
        }
    }

    #[test]
    fn rejects_wrong_rom_length() {
        let err = config(100, CONSOLE_GROM_SIZE).validate().unwrap_err();
        assert!(matches!(err, ConfigError::WrongLength { what: "console ROM", .. }));
    }

    #[test]
    fn accepts_correctly_sized_images() {
        assert!(config(CONSOLE_ROM_SIZE, CONSOLE_GROM_SIZE).validate().is_ok());
    }

    #[test]
    fn ntsc_and_pal_scanline_counts() {
        assert_eq!(VideoStandard::Ntsc.scanlines_per_frame(), 262);
        assert_eq!(VideoStandard::Pal.scanlines_per_frame(), 313);
    }
}
