//! Texas Instruments SN76489-class Programmable Sound Generator.
//!
//! Three square-wave tone generators and a shared noise generator, each
//! with its own 4-bit attenuator, mixed down to a single 8-bit output
//! stream that the host samples at its own rate.
//!
//! # Write protocol
//!
//! The chip exposes a single write-only I/O port. A byte with bit 7 set
//! is a LATCH/DATA byte: bits 6-5 select the channel (0-2 = tone, 3 =
//! noise), bit 4 selects register type (0 = tone/noise, 1 = volume), and
//! bits 3-0 are the low 4 data bits. For tone channels a following byte
//! with bit 7 clear supplies the remaining 6 high bits of the 10-bit
//! period into the most recently latched tone register.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]

/// Attenuation-to-linear-volume table, indexed by the 4-bit register
/// value (0 = full volume, 15 = silent), mirroring the chip's 2 dB step
/// logarithmic taper.
const VOLUME_TABLE: [f32; 16] = [
    1.0000, 0.7943, 0.6310, 0.5012, 0.3981, 0.3162, 0.2512, 0.1995, 0.1585, 0.1259, 0.1000,
    0.0794, 0.0631, 0.0501, 0.0398, 0.0000,
];

/// A single square-wave tone generator (10-bit period).
struct ToneGenerator {
    period: u16,
    counter: u16,
    output: bool,
}

impl ToneGenerator {
    fn new() -> Self {
        Self { period: 0, counter: 0, output: false }
    }

    fn clock(&mut self) {
        if self.counter > 0 {
            self.counter -= 1;
        }
        if self.counter == 0 {
            self.counter = self.period;
            self.output = !self.output;
        }
    }
}

/// Which shift rate the noise generator's counter runs at, or that it
/// should instead be clocked by tone channel 2's output.
#[derive(Clone, Copy, PartialEq, Eq)]
enum NoisePeriod {
    Rate(u16),
    Tone2,
}

/// 16-bit LFSR noise generator, selectable between "white" (all taps)
/// and "periodic" (single tap) feedback.
struct NoiseGenerator {
    control: u8,
    counter: u16,
    lfsr: u16,
    output: bool,
}

impl NoiseGenerator {
    fn new() -> Self {
        Self { control: 0, counter: 0, lfsr: 0x8000, output: false }
    }

    fn period(&self) -> NoisePeriod {
        match self.control & 0x03 {
            0 => NoisePeriod::Rate(0x10),
            1 => NoisePeriod::Rate(0x20),
            2 => NoisePeriod::Rate(0x40),
            _ => NoisePeriod::Tone2,
        }
    }

    fn white(&self) -> bool {
        self.control & 0x04 != 0
    }

    fn set_control(&mut self, value: u8) {
        self.control = value & 0x07;
        self.lfsr = 0x8000;
    }

    /// Clocks the LFSR once (called when the selected period source
    /// ticks, whether that's the internal counter or tone channel 2).
    fn shift(&mut self) {
        let feedback = if self.white() {
            ((self.lfsr ^ (self.lfsr >> 3)) & 1) != 0
        } else {
            (self.lfsr & 1) != 0
        };
        self.lfsr = (self.lfsr >> 1) | (u16::from(feedback) << 15);
        self.output = self.lfsr & 1 != 0;
    }

    fn clock(&mut self, tone2_edge: bool) {
        match self.period() {
            NoisePeriod::Tone2 => {
                if tone2_edge {
                    self.shift();
                }
            }
            NoisePeriod::Rate(rate) => {
                if self.counter > 0 {
                    self.counter -= 1;
                }
                if self.counter == 0 {
                    self.counter = rate;
                    self.shift();
                }
            }
        }
    }
}

/// Which register the next DATA byte (bit 7 clear) continues.
#[derive(Clone, Copy)]
enum Latched {
    Tone(usize),
    Volume(usize),
    Noise,
}

pub struct Sn76489 {
    tone: [ToneGenerator; 3],
    volume: [u8; 4],
    noise: NoiseGenerator,
    latched: Latched,

    clock_counter: u32,
    accumulator: f32,
    sample_count: u32,
    ticks_per_sample: f32,
    buffer: Vec<u8>,
}

impl Sn76489 {
    /// `clock_freq` is the chip's input clock in Hz (typically
    /// 3,579,545, the NTSC colorburst rate shared with the VDP).
    /// `sample_rate` is the host's audio output rate.
    #[must_use]
    pub fn new(clock_freq: u32, sample_rate: u32) -> Self {
        Self {
            tone: [ToneGenerator::new(), ToneGenerator::new(), ToneGenerator::new()],
            volume: [0x0F; 4],
            noise: NoiseGenerator::new(),
            latched: Latched::Tone(0),
            clock_counter: 0,
            accumulator: 0.0,
            sample_count: 0,
            ticks_per_sample: clock_freq as f32 / sample_rate as f32,
            buffer: Vec::with_capacity(sample_rate as usize / 50 + 1),
        }
    }

    /// Writes a byte to the sound port (the `0x8400` high-half write).
    pub fn write(&mut self, byte: u8) {
        if byte & 0x80 != 0 {
            let channel = usize::from((byte >> 5) & 0x03);
            let is_volume = byte & 0x10 != 0;
            let data = byte & 0x0F;
            if is_volume {
                self.volume[channel] = data;
                self.latched = Latched::Volume(channel);
            } else if channel == 3 {
                self.noise.set_control(data);
                self.latched = Latched::Noise;
            } else {
                self.tone[channel].period = (self.tone[channel].period & 0x3F0) | u16::from(data);
                self.latched = Latched::Tone(channel);
            }
        } else {
            let data = byte & 0x3F;
            match self.latched {
                Latched::Tone(ch) => {
                    self.tone[ch].period =
                        (self.tone[ch].period & 0x00F) | (u16::from(data) << 4);
                }
                Latched::Volume(ch) => {
                    self.volume[ch] = data & 0x0F;
                }
                Latched::Noise => {
                    self.noise.set_control(data & 0x07);
                }
            }
        }
    }

    /// Advances the chip by one input clock cycle.
    pub fn tick(&mut self) {
        self.clock_counter += 1;
        // Tone and noise generators clock at input / 16.
        let mut tone2_edge = false;
        if self.clock_counter.is_multiple_of(16) {
            for (i, tone) in self.tone.iter_mut().enumerate() {
                let before = tone.output;
                tone.clock();
                if i == 2 && before != tone.output && tone.output {
                    tone2_edge = true;
                }
            }
            self.noise.clock(tone2_edge);
        }

        let sample = self.mix();
        self.accumulator += sample;
        self.sample_count += 1;

        if self.sample_count as f32 >= self.ticks_per_sample {
            let n = self.sample_count as f32;
            let avg = self.accumulator / n;
            self.buffer.push((avg.clamp(0.0, 1.0) * 255.0) as u8);
            self.accumulator = 0.0;
            self.sample_count = 0;
        }
    }

    fn mix(&self) -> f32 {
        let mut total = 0.0f32;
        for ch in 0..3 {
            if self.tone[ch].output {
                total += VOLUME_TABLE[self.volume[ch] as usize];
            }
        }
        if self.noise.output {
            total += VOLUME_TABLE[self.volume[3] as usize];
        }
        total / 4.0
    }

    /// Drains the accumulated output samples.
    pub fn take_buffer(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buffer)
    }

    #[must_use]
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLOCK: u32 = 3_579_545;
    const SAMPLE_RATE: u32 = 48_000;

    #[test]
    fn tone_latch_then_data_sets_full_10_bit_period() {
        let mut psg = Sn76489::new(CLOCK, SAMPLE_RATE);
        psg.write(0x8E); // latch tone0, low nibble 0xE
        psg.write(0x03); // data byte, high 6 bits = 0b000011
        assert_eq!(psg.tone[0].period, (0x03 << 4) | 0x0E);
    }

    #[test]
    fn volume_write_is_single_byte() {
        let mut psg = Sn76489::new(CLOCK, SAMPLE_RATE);
        psg.write(0x90 | 0x05); // latch+data volume ch0 = 5
        assert_eq!(psg.volume[0], 5);
    }

    #[test]
    fn silent_channel_produces_zero_samples() {
        let mut psg = Sn76489::new(CLOCK, SAMPLE_RATE);
        for _ in 0..50_000 {
            psg.tick();
        }
        let buf = psg.take_buffer();
        assert!(!buf.is_empty());
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn tone_a_produces_nonzero_samples_at_full_volume() {
        let mut psg = Sn76489::new(CLOCK, SAMPLE_RATE);
        psg.write(0x80 | 0x08); // latch tone0 low nibble 8
        psg.write(0x00); // high bits 0 -> small period, audible
        psg.write(0x90 | 0x00); // volume ch0 = 0 (full volume)
        for _ in 0..50_000 {
            psg.tick();
        }
        let buf = psg.take_buffer();
        assert!(buf.iter().any(|&b| b > 0));
    }

    #[test]
    fn noise_control_write_resets_lfsr_seed() {
        let mut psg = Sn76489::new(CLOCK, SAMPLE_RATE);
        psg.noise.lfsr = 1;
        psg.write(0xE0 | 0x04); // latch noise, white + rate 0
        assert_eq!(psg.noise.lfsr, 0x8000);
    }

    #[test]
    fn take_buffer_drains() {
        let mut psg = Sn76489::new(CLOCK, SAMPLE_RATE);
        for _ in 0..1000 {
            psg.tick();
        }
        let buf = psg.take_buffer();
        assert!(!buf.is_empty());
        assert_eq!(psg.buffer_len(), 0);
    }
}
