//! Frame-sequence buffering and on-exit export.
//!
//! The recorder buffers processed frames in memory while the loop runs and
//! renders them once at shutdown: GIFs through the `image` codec, MP4 by
//! streaming raw RGB frames into an `ffmpeg` child process.

use crate::camera::Frame;
use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, RgbaImage};
use std::fmt;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

/// Export container for the recorded sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceFormat {
    Gif,
    Mp4,
}

impl SequenceFormat {
    /// Parse a user-supplied format name. Leading dots and case are
    /// ignored, so `".MP4"` works. Returns `None` for unsupported values.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().trim_start_matches('.').to_lowercase().as_str() {
            "gif" => Some(SequenceFormat::Gif),
            "mp4" => Some(SequenceFormat::Mp4),
            _ => None,
        }
    }

    /// File extension without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            SequenceFormat::Gif => "gif",
            SequenceFormat::Mp4 => "mp4",
        }
    }
}

impl fmt::Display for SequenceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Errors that can occur while exporting a recorded sequence.
#[derive(Debug)]
pub enum ExportError {
    /// FFmpeg binary not found on PATH (MP4 export only)
    FfmpegNotFound,
    /// FFmpeg exited unsuccessfully
    FfmpegFailed(String),
    /// GIF encoding failed
    EncodeFailed(String),
    /// Filesystem error while writing the output
    Io(io::Error),
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportError::FfmpegNotFound => {
                write!(
                    f,
                    "FFmpeg not found. MP4 export requires ffmpeg on PATH; install it with your package manager"
                )
            }
            ExportError::FfmpegFailed(msg) => write!(f, "FFmpeg failed: {}", msg),
            ExportError::EncodeFailed(msg) => write!(f, "GIF encoding failed: {}", msg),
            ExportError::Io(e) => write!(f, "Export I/O error: {}", e),
        }
    }
}

impl std::error::Error for ExportError {}

impl From<io::Error> for ExportError {
    fn from(e: io::Error) -> Self {
        ExportError::Io(e)
    }
}

/// Local time in ISO-8601 with fractional seconds, used for output file
/// names (screenshots and sequence exports).
pub(crate) fn iso_timestamp() -> String {
    chrono::Local::now()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}

/// Effective export frame rate: the caller's explicit FPS if given, else
/// the rate that reproduces real-time playback duration.
fn effective_fps(frame_count: usize, elapsed: Duration, requested: Option<f64>) -> f64 {
    match requested {
        Some(fps) => fps,
        None => frame_count as f64 / elapsed.as_secs_f64().max(1e-6),
    }
}

/// Per-frame GIF display time. The two paths mirror the encoder's two
/// calling conventions and are deliberately not unified: an explicit FPS
/// yields a fixed `1/fps` delay, while the derived path spreads the real
/// elapsed time evenly across the frames.
fn gif_frame_delay(frame_count: usize, elapsed: Duration, requested_fps: Option<f64>) -> Duration {
    if let Some(fps) = requested_fps {
        Duration::from_secs_f64(1.0 / fps.max(1e-6))
    } else {
        elapsed / frame_count as u32
    }
}

/// Build the ffmpeg invocation for a raw RGB frame stream on stdin.
pub(crate) fn ffmpeg_args(output: &Path, width: u32, height: u32, fps: f64) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pixel_format".to_string(),
        "rgb24".to_string(),
        "-video_size".to_string(),
        format!("{}x{}", width, height),
        "-framerate".to_string(),
        format!("{}", fps),
        "-i".to_string(),
        "-".to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        output.to_string_lossy().into_owned(),
    ]
}

/// Accumulates processed frames while the loop runs and renders them to a
/// GIF or MP4 file on finalize.
///
/// The recorder only buffers when export was actually requested: both an
/// output directory and a supported format must have been resolved at
/// construction. Otherwise `record` is a no-op and `finalize` returns
/// `Ok(None)` without touching the filesystem.
pub struct SequenceRecorder {
    frames: Vec<Frame>,
    dest: Option<(PathBuf, SequenceFormat)>,
}

impl SequenceRecorder {
    /// Create a recorder. Export is requested only when both arguments are
    /// present.
    pub fn new(output_dir: Option<&Path>, format: Option<SequenceFormat>) -> Self {
        let dest = match (output_dir, format) {
            (Some(dir), Some(fmt)) => Some((dir.to_path_buf(), fmt)),
            _ => None,
        };
        Self {
            frames: Vec::new(),
            dest,
        }
    }

    /// Whether export was requested at construction.
    pub fn is_recording(&self) -> bool {
        self.dest.is_some()
    }

    /// Number of buffered frames.
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Append a processed frame, in tick order. No-op unless export was
    /// requested.
    pub fn record(&mut self, frame: &Frame) {
        if self.dest.is_some() {
            self.frames.push(frame.clone());
        }
    }

    /// Render the buffered sequence, if any, and return the output path.
    ///
    /// `elapsed` is the wall-clock duration of the loop; `requested_fps`
    /// overrides the derived real-time rate. Failures are propagated, never
    /// retried; partially written files are left behind.
    pub fn finalize(
        self,
        elapsed: Duration,
        requested_fps: Option<f64>,
    ) -> Result<Option<PathBuf>, ExportError> {
        let (dir, format) = match self.dest {
            Some(dest) => dest,
            None => return Ok(None),
        };
        if self.frames.is_empty() {
            log::debug!("no frames recorded, skipping export");
            return Ok(None);
        }

        let path = dir.join(format!("{}.{}", iso_timestamp(), format.extension()));
        log::info!(
            "exporting {} frame(s) to {}",
            self.frames.len(),
            path.display()
        );

        match format {
            SequenceFormat::Gif => export_gif(&self.frames, &path, elapsed, requested_fps)?,
            SequenceFormat::Mp4 => export_mp4(&self.frames, &path, elapsed, requested_fps)?,
        }

        log::info!("export done: {}", path.display());
        Ok(Some(path))
    }
}

fn frame_to_rgba(frame: &Frame) -> RgbaImage {
    let rgb = frame.to_rgb_bytes();
    let mut rgba = Vec::with_capacity(rgb.len() / 3 * 4);
    for px in rgb.chunks_exact(3) {
        rgba.extend_from_slice(&[px[0], px[1], px[2], 0xFF]);
    }
    RgbaImage::from_raw(frame.width, frame.height, rgba)
        .expect("buffer sized from frame dimensions")
}

/// Encode the sequence as an animated GIF.
fn export_gif(
    frames: &[Frame],
    path: &Path,
    elapsed: Duration,
    requested_fps: Option<f64>,
) -> Result<(), ExportError> {
    let per_frame = gif_frame_delay(frames.len(), elapsed, requested_fps);
    let delay = Delay::from_saturating_duration(per_frame);

    let file = File::create(path)?;
    let mut encoder = GifEncoder::new(file);
    encoder
        .set_repeat(Repeat::Infinite)
        .map_err(|e| ExportError::EncodeFailed(e.to_string()))?;

    for frame in frames {
        let gif_frame = image::Frame::from_parts(frame_to_rgba(frame), 0, 0, delay);
        encoder
            .encode_frame(gif_frame)
            .map_err(|e| ExportError::EncodeFailed(e.to_string()))?;
    }

    Ok(())
}

/// Encode the sequence as MP4 by streaming raw frames to ffmpeg.
fn export_mp4(
    frames: &[Frame],
    path: &Path,
    elapsed: Duration,
    requested_fps: Option<f64>,
) -> Result<(), ExportError> {
    let fps = effective_fps(frames.len(), elapsed, requested_fps);
    let (width, height) = (frames[0].width, frames[0].height);

    let mut child = Command::new("ffmpeg")
        .args(ffmpeg_args(path, width, height, fps))
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                ExportError::FfmpegNotFound
            } else {
                ExportError::Io(e)
            }
        })?;

    {
        let stdin = child.stdin.as_mut().expect("stdin was piped");
        for frame in frames {
            if (frame.width, frame.height) != (width, height) {
                // The writer is sized from the first frame; skip mismatches.
                log::warn!(
                    "skipping {}x{} frame in a {}x{} export",
                    frame.width,
                    frame.height,
                    width,
                    height
                );
                continue;
            }
            stdin.write_all(&frame.to_rgb_bytes())?;
        }
    }
    // Closing stdin flushes the stream and lets ffmpeg finish the file.
    drop(child.stdin.take());

    let status = child.wait()?;
    if !status.success() {
        return Err(ExportError::FfmpegFailed(status.to_string()));
    }
    Ok(())
}
