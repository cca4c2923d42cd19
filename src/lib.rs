//! camloop: an annotated camera preview loop.
//!
//! Point it at a webcam, hand it a per-frame transform, and it runs a
//! synchronous capture/process/display loop with two keyboard actions:
//! screenshot (`s`) and exit (`q`). On exit the processed frames can be
//! rendered to an animated GIF or an MP4 file.
//!
//! ```no_run
//! use camloop::{CameraLoop, LoopConfig};
//!
//! let config = LoopConfig::new().with_mirror(true).with_sequence_format("gif");
//! let mut engine = CameraLoop::open(&config)?;
//! engine.run(Ok)?;
//! # Ok::<(), camloop::LoopError>(())
//! ```

pub mod camera;
pub mod config;
pub mod display;
pub mod engine;
pub mod overlay;
pub mod recorder;

pub use camera::{
    list_devices, mirror_horizontal, CameraError, CameraInfo, CameraSource, Frame, FrameFormat,
    FrameSource, Resolution, SourceId,
};
pub use config::{ConfigError, LoopConfig, ResolvedConfig};
pub use display::{DisplayError, DisplaySurface, TerminalDisplay};
pub use engine::{CameraLoop, LoopError, LoopState, TransformError};
pub use overlay::{draw_text, screenshot_caption, OverlayRegistry, TimedOverlay};
pub use recorder::{ExportError, SequenceFormat, SequenceRecorder};
