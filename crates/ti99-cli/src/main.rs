//! Headless TI-99/4A-class runner: loads a console ROM/GROM (and
//! optionally a cartridge), runs a fixed number of frames with no window
//! toolkit attached, and optionally dumps the final frame as a PPM.

use std::path::PathBuf;
use std::process;

use ti99::{load_rom, Emulator, EmulatorConfig, NullAudioSink, VideoSink, VideoStandard};

struct CliArgs {
    rom_path: Option<PathBuf>,
    grom_path: Option<PathBuf>,
    cart_path: Option<PathBuf>,
    frames: u32,
    pal: bool,
    dump_ppm: Option<PathBuf>,
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        rom_path: None,
        grom_path: None,
        cart_path: None,
        frames: 60,
        pal: false,
        dump_ppm: None,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--rom" => {
                i += 1;
                cli.rom_path = args.get(i).map(PathBuf::from);
            }
            "--grom" => {
                i += 1;
                cli.grom_path = args.get(i).map(PathBuf::from);
            }
            "--cart" => {
                i += 1;
                cli.cart_path = args.get(i).map(PathBuf::from);
            }
            "--frames" => {
                i += 1;
                if let Some(s) = args.get(i) {
                    cli.frames = s.parse().unwrap_or(60);
                }
            }
            "--pal" => {
                cli.pal = true;
            }
            "--dump-ppm" => {
                i += 1;
                cli.dump_ppm = args.get(i).map(PathBuf::from);
            }
            "--help" | "-h" => {
                eprintln!("Usage: ti99-cli --rom <file> --grom <file> [OPTIONS]");
                eprintln!();
                eprintln!("Options:");
                eprintln!("  --rom <file>        Console ROM image, 8 KiB [required]");
                eprintln!("  --grom <file>       Console GROM image, 24 KiB [required]");
                eprintln!("  --cart <file>       Cartridge ROM image");
                eprintln!("  --frames <n>        Number of frames to run [default: 60]");
                eprintln!("  --pal               Use PAL timing (313 scanlines/frame) instead of NTSC");
                eprintln!("  --dump-ppm <file>   Save the last frame as a PPM image");
                process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                process::exit(1);
            }
        }
        i += 1;
    }

    cli
}

/// Captures the most recently rendered frame, 256x240 palette indices.
struct FrameCapture {
    rows: Vec<[u8; 256]>,
}

impl FrameCapture {
    fn new() -> Self {
        Self { rows: vec![[0u8; 256]; 240] }
    }
}

impl VideoSink for FrameCapture {
    fn scanline(&mut self, y: u16, pixels: &[u8]) {
        if let Some(row) = self.rows.get_mut(usize::from(y)) {
            row.copy_from_slice(pixels);
        }
    }
}

fn save_ppm(frame: &FrameCapture, path: &PathBuf) -> std::io::Result<()> {
    use std::io::Write;

    let file = std::fs::File::create(path)?;
    let mut w = std::io::BufWriter::new(file);
    writeln!(w, "P6")?;
    writeln!(w, "256 240")?;
    writeln!(w, "255")?;
    for row in &frame.rows {
        for &index in row {
            let (r, g, b) = ti_tms9918::PALETTE[usize::from(index & 0x0F)];
            w.write_all(&[r, g, b])?;
        }
    }
    Ok(())
}

fn main() {
    let cli = parse_args();

    let Some(rom_path) = cli.rom_path else {
        eprintln!("--rom is required");
        process::exit(1);
    };
    let Some(grom_path) = cli.grom_path else {
        eprintln!("--grom is required");
        process::exit(1);
    };

    let console_rom = match load_rom(&rom_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Failed to read ROM {}: {e}", rom_path.display());
            process::exit(1);
        }
    };
    let console_grom = match load_rom(&grom_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Failed to read GROM {}: {e}", grom_path.display());
            process::exit(1);
        }
    };
    let cartridge = match &cli.cart_path {
        Some(path) => match load_rom(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                eprintln!("Failed to read cartridge {}: {e}", path.display());
                process::exit(1);
            }
        },
        None => Vec::new(),
    };

    let config = EmulatorConfig {
        console_rom,
        console_grom,
        cartridge,
        video_standard: if cli.pal { VideoStandard::Pal } else { VideoStandard::Ntsc },
        sams: false,
    };

    let mut emu = match Emulator::new(config, Box::new(NullAudioSink)) {
        Ok(emu) => emu,
        Err(e) => {
            eprintln!("Failed to build machine: {e}");
            process::exit(1);
        }
    };

    let mut frame = FrameCapture::new();
    for _ in 0..cli.frames {
        emu.run_frame(&mut frame);
    }

    eprintln!(
        "Ran {} frames; cpu.pc = {:#06x}, scanline = {}",
        cli.frames,
        emu.cpu().regs.pc,
        emu.current_scanline()
    );

    if let Some(path) = &cli.dump_ppm {
        if let Err(e) = save_ppm(&frame, path) {
            eprintln!("Failed to write PPM {}: {e}", path.display());
            process::exit(1);
        }
        eprintln!("Saved frame to {}", path.display());
    }
}
