//! Per-scanline tile rendering for the four TMS9918A modes plus the
//! text-bitmap variant.

use crate::registers::Mode;
use crate::{sprites, Vdp};

impl Vdp {
    /// Renders one visible scanline (0..192) into `out`, a 256-byte
    /// palette-indexed line buffer, then overlays sprites (skipped in the
    /// text modes, which have no sprite plane on real hardware).
    pub fn render_line(&mut self, y: u16, out: &mut [u8]) {
        debug_assert!(out.len() >= 256);
        self.coinc_shadow = [false; 256];

        if self.regs.blanked() {
            out[..256].fill(0);
            return;
        }

        match self.regs.mode() {
            Mode::Graphics1 => self.render_graphics1(y, out),
            Mode::Graphics2 => self.render_graphics2(y, out),
            Mode::Multicolor => self.render_multicolor(y, out),
            Mode::Text => self.render_text(y, out, false),
            Mode::TextBitmap => self.render_text(y, out, true),
        }

        if !matches!(self.regs.mode(), Mode::Text | Mode::TextBitmap) {
            sprites::overlay(self, y, out);
        }
    }

    fn render_graphics1(&self, y: u16, out: &mut [u8]) {
        let row = y / 8;
        let fine = y % 8;
        let name_base = self.regs.name_table_base();
        let pattern_base = self.regs.pattern_table_base(false);
        let color_base = self.regs.color_table_base(false);
        for col in 0..32u16 {
            let name = self.vram[(name_base + row * 32 + col) as usize];
            let pattern = self.vram[(pattern_base + u16::from(name) * 8 + fine) as usize];
            let color = self.vram[(color_base + u16::from(name) / 8) as usize];
            let fg = color >> 4;
            let bg = color & 0x0F;
            draw_pattern_byte(out, col * 8, pattern, fg, bg);
        }
    }

    fn render_graphics2(&self, y: u16, out: &mut [u8]) {
        let row = y / 8;
        let fine = y % 8;
        let third = row / 8; // selects which third of the pattern/color tables
        let name_base = self.regs.name_table_base();
        let pattern_base = self.regs.pattern_table_base(true);
        let color_base = self.regs.color_table_base(true);
        for col in 0..32u16 {
            let name = u16::from(self.vram[(name_base + row * 32 + col) as usize]);
            let tile_offset = third * 0x0100 + name;
            let pattern = self.vram[(pattern_base + tile_offset * 8 + fine) as usize];
            let color = self.vram[(color_base + tile_offset * 8 + fine) as usize];
            let fg = color >> 4;
            let bg = color & 0x0F;
            draw_pattern_byte(out, col * 8, pattern, fg, bg);
        }
    }

    fn render_multicolor(&self, y: u16, out: &mut [u8]) {
        let row = y / 8;
        let fine = (y % 8) / 4;
        let name_base = self.regs.name_table_base();
        let pattern_base = self.regs.pattern_table_base(false);
        for col in 0..32u16 {
            let name = self.vram[(name_base + row * 32 + col) as usize];
            let byte = self.vram[(pattern_base + u16::from(name) * 8 + (row % 4) * 2 + fine) as usize];
            let fg = byte >> 4;
            let bg = byte & 0x0F;
            for px in 0..8u16 {
                out[(col * 8 + px) as usize] = if px < 4 { fg } else { bg };
            }
        }
    }

    fn render_text(&self, y: u16, out: &mut [u8], bitmap: bool) {
        out[..8].fill(self.regs.text_bg());
        out[248..256].fill(self.regs.text_bg());
        let row = y / 8;
        let fine = y % 8;
        let name_base = self.regs.name_table_base();
        let pattern_base = self.regs.pattern_table_base(bitmap);
        let fg = self.regs.text_fg();
        let bg = self.regs.text_bg();
        for col in 0..40u16 {
            let name = self.vram[(name_base + row * 40 + col) as usize];
            let pattern = self.vram[(pattern_base + u16::from(name) * 8 + fine) as usize];
            let x0 = 8 + col * 6;
            for px in 0..6u16 {
                let bit = pattern & (0x80 >> px) != 0;
                out[(x0 + px) as usize] = if bit { fg } else { bg };
            }
        }
    }
}

fn draw_pattern_byte(out: &mut [u8], x0: u16, pattern: u8, fg: u8, bg: u8) {
    for px in 0..8u16 {
        let bit = pattern & (0x80 >> px) != 0;
        out[(x0 + px) as usize] = if bit { fg } else { bg };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graphics1_draws_solid_tile() {
        let mut vdp = Vdp::new();
        vdp.regs.set(1, 0x40); // not blanked
        vdp.regs.set(4, 0x01); // pattern table base 0x0800
        vdp.regs.set(3, 0x80); // color table base 0x2000
        vdp.vram[0] = 0; // name 0 at (0,0)
        vdp.vram[0x0800] = 0xFF; // pattern table, tile 0 row 0 = all set
        vdp.vram[0x2000] = 0xF1; // color table, fg=0xF bg=1
        let mut line = [0u8; 256];
        vdp.render_line(0, &mut line);
        assert_eq!(line[0], 0x0F);
    }

    #[test]
    fn multicolor_cycles_through_all_eight_pattern_bytes() {
        let mut vdp = Vdp::new();
        vdp.regs.set(1, 0x40 | 0x08); // not blanked, multicolor mode bit
        vdp.regs.set(4, 0x01); // pattern table base 0x0800
        vdp.vram[0] = 0; // name 0 at every name-table row used below
        vdp.vram[32] = 0; // row 1
        vdp.vram[64] = 0; // row 2
        vdp.vram[96] = 0; // row 3
        // Tile 0's 8 pattern bytes, one distinct value per offset so a
        // wrong addressing formula reads the wrong byte.
        for (offset, value) in [0x10, 0x21, 0x32, 0x43, 0x54, 0x65, 0x76, 0x87].into_iter().enumerate() {
            vdp.vram[0x0800 + offset] = value;
        }
        let mut line = [0u8; 256];
        // Name-table row 0 covers y = 0..8; within it fine = y/4 selects
        // offsets (0,2)*2+fine for rows 0..3, i.e. all of 0..7 across the
        // four 8-pixel-tall name rows this test samples.
        for (y, expect_hi, expect_lo) in [(0u16, 0x1, 0x0), (4, 0x2, 0x1), (8, 0x3, 0x2), (12, 0x4, 0x3)] {
            vdp.render_line(y, &mut line);
            assert_eq!(line[0], expect_hi);
            assert_eq!(line[4], expect_lo);
        }
    }

    #[test]
    fn blanked_screen_is_solid() {
        let mut vdp = Vdp::new();
        let mut line = [5u8; 256];
        vdp.render_line(0, &mut line);
        assert_eq!(line[0], 0);
    }
}
