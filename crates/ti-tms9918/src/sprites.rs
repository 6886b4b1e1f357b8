//! Sprite engine: per-scanline selection, early-clock shift, coincidence
//! shadowing, and the 5th-sprite sticky status flag.

use crate::{Vdp, STATUS_COINCIDENCE, STATUS_FIFTH_SPRITE};

const MAX_SPRITES_PER_LINE: usize = 4;
const TERMINATOR_Y: u8 = 0xD0;
const EARLY_CLOCK_SHIFT: i16 = 32;

struct SpriteAttr {
    y: u8,
    x: u8,
    pattern: u8,
    early_clock: bool,
    color: u8,
}

fn read_attr(vdp: &Vdp, index: u16) -> SpriteAttr {
    let base = vdp.regs.sprite_attr_base() + index * 4;
    let y = vdp.vram[base as usize];
    let x = vdp.vram[base as usize + 1];
    let pattern = vdp.vram[base as usize + 2];
    let flags = vdp.vram[base as usize + 3];
    SpriteAttr {
        y,
        x,
        pattern,
        early_clock: flags & 0x80 != 0,
        color: flags & 0x0F,
    }
}

/// Draws sprites visible on scanline `y` over the already-rendered
/// background in `out`, applying the 4-per-line cap, the 5th-sprite flag,
/// and coincidence tracking.
pub fn overlay(vdp: &mut Vdp, y: u16, out: &mut [u8]) {
    let size = if vdp.regs.sprites_large() { 16i16 } else { 8i16 };
    let scale = if vdp.regs.sprites_magnified() { 2i16 } else { 1i16 };
    let visible_height = size * scale;
    let pattern_base = vdp.regs.sprite_pattern_base();

    let mut drawn = 0usize;
    for index in 0..32u16 {
        let attr = read_attr(vdp, index);
        if attr.y == TERMINATOR_Y {
            break;
        }
        // Y > 0xD0 (the terminator value) wraps to the top of the screen.
        let signed_y = if attr.y > TERMINATOR_Y {
            i16::from(attr.y) - 256
        } else {
            i16::from(attr.y)
        };
        let top = signed_y + 1;
        let rel = y as i16 - top;
        if rel < 0 || rel >= visible_height {
            continue;
        }

        if drawn == MAX_SPRITES_PER_LINE {
            if vdp.status & STATUS_FIFTH_SPRITE == 0 {
                // Only the first overflow on a line latches its index; a
                // later one on the same line must not overwrite it.
                vdp.status = (vdp.status & !0x1F) | STATUS_FIFTH_SPRITE | (index as u8 & 0x1F);
            }
            continue;
        }
        drawn += 1;

        let line_in_sprite = rel / scale;
        let row_byte = if size == 16 {
            let quadrant = if line_in_sprite < 8 { 0u16 } else { 2u16 };
            vdp.vram[(pattern_base + (u16::from(attr.pattern) & 0xFC) * 8 + quadrant * 8 + line_in_sprite % 8) as usize]
        } else {
            vdp.vram[(pattern_base + u16::from(attr.pattern) * 8 + line_in_sprite) as usize]
        };

        let mut x0 = i16::from(attr.x);
        if attr.early_clock {
            x0 -= EARLY_CLOCK_SHIFT;
        }

        if attr.color == 0 {
            continue; // transparent sprites still occupy a slot, draw nothing
        }

        for bit in 0..8i16 {
            if row_byte & (0x80 >> bit) == 0 {
                continue;
            }
            for s in 0..scale {
                let px = x0 + bit * scale + s;
                if !(0..256).contains(&px) {
                    continue;
                }
                let px = px as usize;
                if vdp.coinc_shadow[px] {
                    vdp.status |= STATUS_COINCIDENCE;
                } else {
                    vdp.coinc_shadow[px] = true;
                }
                out[px] = attr.color;
            }
        }
    }
}
