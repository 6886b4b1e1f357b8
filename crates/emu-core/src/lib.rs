//! Core traits and types shared across the emulator's device crates.

mod observable;

pub use observable::{Observable, Value};
