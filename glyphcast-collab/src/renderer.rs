//! ASCII renderer boundary. The SIMD/scalar pixel-to-colored-ASCII kernel
//! itself is an external collaborator; this module only describes its
//! contract and a scalar reference implementation usable in tests.

use glyphcast_proto::types::ColorMode;

/// A captured, immutable pixel frame as handed off by the media capture
/// collaborator. Tightly packed 8-bit RGB, row-major.
#[derive(Debug, Clone)]
pub struct PixelFrame {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
    pub capture_timestamp_ns: u64,
}

impl PixelFrame {
    pub fn new(width: u32, height: u32, rgb: Vec<u8>, capture_timestamp_ns: u64) -> Self {
        debug_assert_eq!(rgb.len(), width as usize * height as usize * 3);
        Self {
            width,
            height,
            rgb,
            capture_timestamp_ns,
        }
    }
}

/// One source's contribution to an n-way composite: who it came from, and
/// their most recent frame (absent if they haven't sent one yet).
pub struct FrameSource<'a> {
    pub client_id: u32,
    pub frame: Option<&'a PixelFrame>,
}

/// Output of a render call: the colored ASCII bytes plus a content hash
/// used for duplicate-commit suppression downstream.
pub struct RenderedFrame {
    pub bytes: Vec<u8>,
    pub content_hash: u32,
}

/// The pure composition/rendering function consumed by the per-client video
/// render pipeline. Implementations must be safe to call
/// concurrently from multiple render threads with disjoint inputs, and must
/// never block.
pub trait AsciiRenderer: Send + Sync {
    fn render(
        &self,
        sources: &[FrameSource<'_>],
        target_width: u16,
        target_height: u16,
        color_mode: ColorMode,
    ) -> RenderedFrame;
}

/// A minimal scalar renderer: tiles sources into a grid, downsamples each
/// to an even share of the target dimensions, and maps luminance to a fixed
/// ASCII ramp. Not the production SIMD kernel — good enough to drive the
/// pipeline end to end in tests without a real capture/renderer pair.
pub struct ScalarAsciiRenderer;

const RAMP: &[u8] = b" .:-=+*#%@";

impl AsciiRenderer for ScalarAsciiRenderer {
    fn render(
        &self,
        sources: &[FrameSource<'_>],
        target_width: u16,
        target_height: u16,
        color_mode: ColorMode,
    ) -> RenderedFrame {
        let present: Vec<&FrameSource<'_>> = sources.iter().filter(|s| s.frame.is_some()).collect();

        let mut out = Vec::with_capacity(target_width as usize * target_height as usize * 4);

        if present.is_empty() {
            for row in 0..target_height {
                out.extend(std::iter::repeat(b' ').take(target_width as usize));
                if row + 1 < target_height {
                    out.push(b'\n');
                }
            }
        } else {
            let cols = (present.len() as f64).sqrt().ceil() as usize;
            let rows = present.len().div_ceil(cols);
            let cell_w = (target_width as usize / cols.max(1)).max(1);
            let cell_h = (target_height as usize / rows.max(1)).max(1);

            for grid_row in 0..rows {
                for cell_row in 0..cell_h {
                    for grid_col in 0..cols {
                        let idx = grid_row * cols + grid_col;
                        match present.get(idx) {
                            Some(source) => {
                                let frame = source.frame.unwrap();
                                for cell_col in 0..cell_w {
                                    let px = sample_pixel(frame, cell_col, cell_w, cell_row, cell_h);
                                    let luminance = (px.0 as u32 + px.1 as u32 + px.2 as u32) / 3;
                                    let ramp_idx = (luminance as usize * (RAMP.len() - 1)) / 255;
                                    push_glyph(&mut out, RAMP[ramp_idx], px, color_mode);
                                }
                            }
                            None => {
                                out.extend(std::iter::repeat(b' ').take(cell_w));
                            }
                        }
                    }
                    out.push(b'\n');
                }
            }
        }

        let content_hash = crc32fast_hash(&out);
        RenderedFrame {
            bytes: out,
            content_hash,
        }
    }
}

fn sample_pixel(frame: &PixelFrame, cell_col: usize, cell_w: usize, cell_row: usize, cell_h: usize) -> (u8, u8, u8) {
    let fx = (cell_col * frame.width as usize / cell_w.max(1)).min(frame.width.saturating_sub(1) as usize);
    let fy = (cell_row * frame.height as usize / cell_h.max(1)).min(frame.height.saturating_sub(1) as usize);

    let offset = (fy * frame.width as usize + fx) * 3;
    match frame.rgb.get(offset..offset + 3) {
        Some(bytes) => (bytes[0], bytes[1], bytes[2]),
        None => (0, 0, 0),
    }
}

fn push_glyph(out: &mut Vec<u8>, glyph: u8, rgb: (u8, u8, u8), color_mode: ColorMode) {
    match color_mode {
        ColorMode::Mono => out.push(glyph),
        ColorMode::Ansi16 | ColorMode::Ansi256 | ColorMode::TrueColor => {
            out.extend_from_slice(format!("\x1b[38;2;{};{};{}m", rgb.0, rgb.1, rgb.2).as_bytes());
            out.push(glyph);
            out.extend_from_slice(b"\x1b[0m");
        }
    }
}

fn crc32fast_hash(bytes: &[u8]) -> u32 {
    glyphcast_proto::checksum(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sources_render_blank_grid() {
        let renderer = ScalarAsciiRenderer;
        let rendered = renderer.render(&[], 4, 2, ColorMode::Mono);
        assert_eq!(rendered.bytes, b"    \n    ");
    }

    #[test]
    fn identical_input_produces_identical_hash() {
        let frame = PixelFrame::new(2, 2, vec![10u8; 12], 0);
        let source = FrameSource {
            client_id: 1,
            frame: Some(&frame),
        };
        let renderer = ScalarAsciiRenderer;
        let a = renderer.render(&[source], 8, 4, ColorMode::Mono);
        let frame2 = PixelFrame::new(2, 2, vec![10u8; 12], 0);
        let source2 = FrameSource {
            client_id: 1,
            frame: Some(&frame2),
        };
        let b = renderer.render(&[source2], 8, 4, ColorMode::Mono);
        assert_eq!(a.content_hash, b.content_hash);
        assert_eq!(a.bytes, b.bytes);
    }
}
