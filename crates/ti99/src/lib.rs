//! TI-99/4A-class machine aggregate: memory map, device bus, scanline
//! scheduler, and the debugger's undo journal.
//!
//! This crate wires together the lower-level device crates
//! (`ti99-cpu`, `ti-tms9918`, `ti-sn76489`, `ti99-grom`, `ti99-cru`,
//! `ti99-cartridge`) into a runnable machine. [`Emulator`] is the entry
//! point a host program drives: build one from an [`EmulatorConfig`],
//! call [`Emulator::run_frame`] once per video frame, and feed key
//! events through [`Emulator::set_key`].

mod bus;
mod config;
mod emulator;
mod journal;
mod memmap;
mod sinks;

pub use config::{
    load_rom, ConfigError, EmulatorConfig, VideoStandard, CONSOLE_GROM_SIZE, CONSOLE_ROM_SIZE,
};
pub use emulator::Emulator;
pub use journal::{UndoJournal, UndoResult};
pub use sinks::{AudioSink, NullAudioSink, NullVideoSink, VideoSink};
