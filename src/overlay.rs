//! Time-limited overlay stages applied to frames before the caller's
//! transform runs.
//!
//! Overlays are registered when a stateful event happens (today: a
//! screenshot was saved) and expire on their own. Expiry is always checked
//! against an explicitly passed "now" instant; there is no hidden timer, so
//! tests can drive time forward themselves.

mod font;

use crate::camera::{Frame, FrameFormat};
use std::path::Path;
use std::time::Instant;

/// Caption color for the screenshot message (orange, matches the preview
/// accent).
const CAPTION_COLOR: (u8, u8, u8) = (200, 120, 0);

/// Top-left corner where the screenshot caption is painted.
const CAPTION_ORIGIN: (u32, u32) = (16, 16);

/// A frame transform bound to an expiration instant.
///
/// Bound arguments live inside the closure; the overlay itself is immutable
/// once created apart from the expiry comparison.
pub struct TimedOverlay {
    transform: Box<dyn Fn(Frame) -> Frame>,
    expires_at: Instant,
}

impl TimedOverlay {
    /// Wrap a transform with an expiration instant.
    pub fn new<F>(expires_at: Instant, transform: F) -> Self
    where
        F: Fn(Frame) -> Frame + 'static,
    {
        Self {
            transform: Box::new(transform),
            expires_at,
        }
    }

    /// Run the bound transform over a frame.
    pub fn apply(&self, frame: Frame) -> Frame {
        (self.transform)(frame)
    }

    /// Pure comparison against the stored expiry instant.
    pub fn is_expired(&self, now: Instant) -> bool {
        now > self.expires_at
    }
}

impl std::fmt::Debug for TimedOverlay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimedOverlay")
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Insertion-ordered collection of active overlays.
///
/// Invariant: after `tick(_, now)` returns, no overlay with
/// `expires_at <= now` remains, and survivors were applied oldest-first
/// (so the newest overlay draws on top).
#[derive(Debug, Default)]
pub struct OverlayRegistry {
    overlays: Vec<TimedOverlay>,
}

impl OverlayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an overlay; it will apply after all earlier ones.
    pub fn add(&mut self, overlay: TimedOverlay) {
        self.overlays.push(overlay);
    }

    /// Number of currently registered overlays (expired ones linger until
    /// the next tick).
    pub fn len(&self) -> usize {
        self.overlays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overlays.is_empty()
    }

    /// Prune expired overlays, then fold the survivors over the frame in
    /// insertion order.
    pub fn tick(&mut self, frame: Frame, now: Instant) -> Frame {
        let before = self.overlays.len();
        self.overlays.retain(|o| !o.is_expired(now));
        if self.overlays.len() < before {
            log::debug!("pruned {} expired overlay(s)", before - self.overlays.len());
        }

        self.overlays
            .iter()
            .fold(frame, |frame, overlay| overlay.apply(frame))
    }
}

/// Paint text onto a frame with the built-in 5x7 font.
///
/// `(x, y)` is the top-left corner of the first glyph. Pixels falling
/// outside the frame are skipped. On grayscale frames the color collapses
/// to its luminance.
pub fn draw_text(frame: &mut Frame, text: &str, x: u32, y: u32, color: (u8, u8, u8), scale: u32) {
    let scale = scale.max(1);
    let bpp = frame.bytes_per_pixel();
    let (width, height) = (frame.width, frame.height);
    let luma = ((color.0 as u32 * 299 + color.1 as u32 * 587 + color.2 as u32 * 114) / 1000) as u8;

    let advance = (font::GLYPH_WIDTH + font::GLYPH_SPACING) * scale;
    let mut pen_x = x;

    for c in text.chars() {
        let columns = font::glyph(c);
        for (col, bits) in columns.iter().enumerate() {
            for row in 0..font::GLYPH_HEIGHT {
                if bits >> row & 1 == 0 {
                    continue;
                }
                for sx in 0..scale {
                    for sy in 0..scale {
                        let px = pen_x + col as u32 * scale + sx;
                        let py = y + row * scale + sy;
                        if px >= width || py >= height {
                            continue;
                        }
                        let idx = (py as usize * width as usize + px as usize) * bpp;
                        match frame.format {
                            FrameFormat::Rgb => {
                                frame.data[idx] = color.0;
                                frame.data[idx + 1] = color.1;
                                frame.data[idx + 2] = color.2;
                            }
                            FrameFormat::Gray => frame.data[idx] = luma,
                        }
                    }
                }
            }
        }
        pen_x += advance;
    }
}

/// Overlay announcing where a screenshot was written.
///
/// Paints `Screenshot saved at: <path>` near the top-left corner of every
/// frame until `expires_at`.
pub fn screenshot_caption(path: &Path, expires_at: Instant) -> TimedOverlay {
    let message = format!("Screenshot saved at: {}", path.display());
    TimedOverlay::new(expires_at, move |mut frame| {
        draw_text(
            &mut frame,
            &message,
            CAPTION_ORIGIN.0,
            CAPTION_ORIGIN.1,
            CAPTION_COLOR,
            1,
        );
        frame
    })
}
