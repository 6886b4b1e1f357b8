//! Host boundary: video/audio output traits the scheduler drives once per
//! scanline/sample. The core never polls input; the host calls
//! [`crate::Emulator::set_key`]/[`crate::Emulator::request_reset`] directly.

/// Receives one rendered scanline at a time, palette-indexed per the
/// fixed 16-colour TMS9918A palette.
pub trait VideoSink {
    fn scanline(&mut self, y: u16, pixels: &[u8]);
}

/// Receives one PSG output byte at a time.
pub trait AudioSink {
    fn push_sample(&mut self, byte: u8);
}

pub struct NullVideoSink;

impl VideoSink for NullVideoSink {
    fn scanline(&mut self, _y: u16, _pixels: &[u8]) {}
}

pub struct NullAudioSink;

impl AudioSink for NullAudioSink {
    fn push_sample(&mut self, _byte: u8) {}
}
