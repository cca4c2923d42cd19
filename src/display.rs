//! Live preview surface and key sampling.
//!
//! The engine draws through the `DisplaySurface` trait; the shipped
//! implementation renders truecolor half-blocks into the terminal's
//! alternate screen. `poll_key` is the loop's single pacing point: it
//! blocks for a short, configurable interval while sampling the keyboard.

use crate::camera::Frame;
use crossterm::cursor::{Hide, Show};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, size, EnterAlternateScreen, LeaveAlternateScreen, SetTitle,
};
use std::fmt;
use std::io::{self, Write};
use std::time::Duration;

/// Errors raised by the preview surface.
#[derive(Debug)]
pub enum DisplayError {
    /// Terminal I/O failed (writing frames or reading events)
    Io(io::Error),
}

impl fmt::Display for DisplayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayError::Io(e) => write!(f, "Display I/O error: {}", e),
        }
    }
}

impl std::error::Error for DisplayError {}

impl From<io::Error> for DisplayError {
    fn from(e: io::Error) -> Self {
        DisplayError::Io(e)
    }
}

/// Where processed frames are shown and key presses are sampled.
///
/// `close` must be idempotent; the engine calls it on every exit path.
pub trait DisplaySurface {
    /// Render a frame.
    fn show(&mut self, frame: &Frame) -> Result<(), DisplayError>;

    /// Block up to `wait` for a single key press. Returns the pressed
    /// character, or `None` when the interval elapses quietly.
    fn poll_key(&mut self, wait: Duration) -> Result<Option<char>, DisplayError>;

    /// Tear the surface down. Safe to call more than once.
    fn close(&mut self);
}

/// Terminal-backed preview: raw mode plus alternate screen, one `▀` cell
/// per two vertically stacked pixels.
pub struct TerminalDisplay {
    stdout: io::Stdout,
    open: bool,
}

impl TerminalDisplay {
    /// Enter raw mode and the alternate screen, and set the window title.
    pub fn open(title: &str) -> Result<Self, DisplayError> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        if let Err(e) = execute!(
            stdout,
            EnterAlternateScreen,
            Hide,
            SetTitle(title.to_string())
        ) {
            // Half-initialized terminals are worse than a failed open.
            let _ = disable_raw_mode();
            return Err(e.into());
        }
        log::debug!("terminal preview opened: {}", title);
        Ok(Self { stdout, open: true })
    }
}

impl DisplaySurface for TerminalDisplay {
    fn show(&mut self, frame: &Frame) -> Result<(), DisplayError> {
        let (cols, rows) = size()?;
        let rendered = render_half_blocks(frame, cols, rows);
        self.stdout.write_all(rendered.as_bytes())?;
        self.stdout.flush()?;
        Ok(())
    }

    fn poll_key(&mut self, wait: Duration) -> Result<Option<char>, DisplayError> {
        if !event::poll(wait)? {
            return Ok(None);
        }
        match event::read()? {
            Event::Key(KeyEvent {
                code: KeyCode::Char(c),
                kind: KeyEventKind::Press,
                ..
            }) => Ok(Some(c)),
            _ => Ok(None),
        }
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            let _ = execute!(self.stdout, LeaveAlternateScreen, Show);
            let _ = disable_raw_mode();
            log::debug!("terminal preview closed");
        }
    }
}

impl Drop for TerminalDisplay {
    fn drop(&mut self) {
        self.close();
    }
}

/// Fit a frame into a cell grid, preserving aspect ratio.
///
/// Each terminal cell holds two pixels vertically, so the usable pixel
/// grid is `cols x rows*2`. Returns the output size in pixels (the height
/// is always even).
fn scaled_dimensions(frame_w: u32, frame_h: u32, cols: u16, rows: u16) -> (u32, u32) {
    let max_w = cols.max(1) as f64;
    let max_h = (rows.max(1) as u32 * 2) as f64;
    let scale = (max_w / frame_w as f64).min(max_h / frame_h as f64);
    let out_w = ((frame_w as f64 * scale) as u32).max(1);
    let out_h = ((frame_h as f64 * scale) as u32).max(2) & !1;
    (out_w, out_h)
}

/// Render a frame as rows of truecolor `▀` cells positioned with raw ANSI
/// escapes (foreground = upper pixel, background = lower pixel).
fn render_half_blocks(frame: &Frame, cols: u16, rows: u16) -> String {
    let (out_w, out_h) = scaled_dimensions(frame.width, frame.height, cols, rows);

    let sample = |ox: u32, oy: u32| -> (u8, u8, u8) {
        let sx = (ox as u64 * frame.width as u64 / out_w as u64) as u32;
        let sy = (oy as u64 * frame.height as u64 / out_h as u64) as u32;
        frame.pixel(sx.min(frame.width - 1), sy.min(frame.height - 1))
    };

    let mut out = String::with_capacity((out_w as usize + 8) * (out_h as usize / 2) * 24);
    for cell_row in 0..out_h / 2 {
        // 1-based cursor addressing
        out.push_str(&format!("\x1b[{};1H", cell_row + 1));
        for x in 0..out_w {
            let (tr, tg, tb) = sample(x, cell_row * 2);
            let (br, bg, bb) = sample(x, cell_row * 2 + 1);
            out.push_str(&format!(
                "\x1b[38;2;{};{};{}m\x1b[48;2;{};{};{}m\u{2580}",
                tr, tg, tb, br, bg, bb
            ));
        }
        out.push_str("\x1b[0m");
    }
    out
}
