//! The camera processing loop.
//!
//! One `CameraLoop` drives one capture source through a synchronous tick:
//! acquire, mirror, apply timed overlays, run the caller's transform,
//! record, display, sample the keyboard. The screenshot key saves the
//! current frame and registers a fading caption; the exit key moves the
//! loop into export and shutdown. Whatever path the loop leaves by, the
//! source and display are released.

use crate::camera::{mirror_horizontal, CameraError, CameraSource, Frame, FrameFormat, FrameSource};
use crate::config::{LoopConfig, ResolvedConfig};
use crate::display::{DisplayError, DisplaySurface, TerminalDisplay};
use crate::overlay::{screenshot_caption, OverlayRegistry};
use crate::recorder::{iso_timestamp, SequenceRecorder};
use std::time::{Duration, Instant};

/// How long the "Screenshot saved at" caption stays on screen.
const SCREENSHOT_CAPTION_WINDOW: Duration = Duration::from_secs(3);

/// Lifecycle of a loop instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Initializing,
    Running,
    Exporting,
    Terminated,
}

/// Fatal loop failures surfaced to the caller.
///
/// Only acquisition and display failures propagate; configuration problems
/// degrade at construction, transform failures end the loop quietly, and
/// export failures are logged during shutdown.
#[derive(Debug, thiserror::Error)]
pub enum LoopError {
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("display error: {0}")]
    Display(#[from] DisplayError),
}

/// Error type callers return from their per-frame transform.
pub type TransformError = Box<dyn std::error::Error + Send + Sync>;

/// Why the tick loop stopped, short of a fatal error.
enum TickOutcome {
    ExitRequested,
    TransformFailed,
}

/// One capture source, one caller transform, one display: the whole loop.
///
/// Generic over its source and display so tests and embedders can inject
/// synthetic ones; `CameraLoop::open` wires up the webcam and terminal
/// preview for the common case.
pub struct CameraLoop<S: FrameSource, D: DisplaySurface> {
    source: S,
    display: D,
    config: ResolvedConfig,
    overlays: OverlayRegistry,
    recorder: SequenceRecorder,
    state: LoopState,
    started_at: Instant,
    ticks: u64,
}

impl CameraLoop<CameraSource, TerminalDisplay> {
    /// Open the configured camera and a terminal preview surface.
    ///
    /// # Errors
    /// Fails only when the capture source or the display cannot be opened;
    /// bad output directories and formats merely disable saving (logged).
    pub fn open(config: &LoopConfig) -> Result<Self, LoopError> {
        log::info!("initializing camera...");
        let source = CameraSource::open(&config.source, config.resolution)?;
        let resolved = config.resolve();
        let display = TerminalDisplay::open(&resolved.window_title)?;
        Ok(Self::assemble(source, display, resolved))
    }
}

impl<S: FrameSource, D: DisplaySurface> CameraLoop<S, D> {
    /// Build a loop from explicit parts. The source must already be open.
    pub fn with_parts(source: S, display: D, config: &LoopConfig) -> Self {
        Self::assemble(source, display, config.resolve())
    }

    fn assemble(source: S, display: D, config: ResolvedConfig) -> Self {
        let recorder = SequenceRecorder::new(config.output_dir.as_deref(), config.format);
        Self {
            source,
            display,
            config,
            overlays: OverlayRegistry::new(),
            recorder,
            state: LoopState::Initializing,
            started_at: Instant::now(),
            ticks: 0,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Ticks completed so far (frames that made it through the pipeline).
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Drive the loop until the exit key, a transform failure, or a fatal
    /// error.
    ///
    /// The caller transform runs once per tick on a pipeline-ready frame
    /// (mirrored, overlays applied). A transform error ends the loop
    /// without propagating; a read or display error propagates after
    /// cleanup. Resources are released on every path.
    pub fn run<F>(&mut self, mut transform: F) -> Result<(), LoopError>
    where
        F: FnMut(Frame) -> Result<Frame, TransformError>,
    {
        if self.state == LoopState::Terminated {
            log::warn!("loop already terminated, ignoring run()");
            return Ok(());
        }

        self.state = LoopState::Running;
        self.started_at = Instant::now();
        log::info!(
            "loop running (screenshot key: '{}', exit key: '{}')",
            self.config.screenshot_key,
            self.config.exit_key
        );

        match self.run_ticks(&mut transform) {
            Ok(TickOutcome::ExitRequested) => {
                self.state = LoopState::Exporting;
                let elapsed = self.started_at.elapsed();
                // Drop the UI before the potentially slow export.
                self.source.release();
                self.display.close();

                let recorder =
                    std::mem::replace(&mut self.recorder, SequenceRecorder::new(None, None));
                match recorder.finalize(elapsed, self.config.fps) {
                    Ok(Some(path)) => log::info!("sequence exported: {}", path.display()),
                    Ok(None) => {}
                    Err(e) => log::error!("sequence export failed: {}", e),
                }
                self.state = LoopState::Terminated;
                Ok(())
            }
            Ok(TickOutcome::TransformFailed) => {
                self.release_all();
                Ok(())
            }
            Err(e) => {
                self.release_all();
                Err(e)
            }
        }
    }

    fn release_all(&mut self) {
        self.source.release();
        self.display.close();
        self.state = LoopState::Terminated;
    }

    fn run_ticks<F>(&mut self, transform: &mut F) -> Result<TickOutcome, LoopError>
    where
        F: FnMut(Frame) -> Result<Frame, TransformError>,
    {
        loop {
            // 1. acquire: fatal on failure, never retried
            let mut frame = self.source.read()?;

            // 2. mirror before anything else sees the frame
            if self.config.mirror {
                mirror_horizontal(&mut frame);
            }

            // 3. expiring overlays (prune, then apply oldest-first)
            let frame = self.overlays.tick(frame, Instant::now());

            // 4. caller transform on the pipeline-ready frame
            let frame = match transform(frame) {
                Ok(f) => f,
                Err(e) => {
                    log::error!("frame transform failed: {}", e);
                    return Ok(TickOutcome::TransformFailed);
                }
            };

            // 5. buffer for export
            self.recorder.record(&frame);

            // 6. display
            self.display.show(&frame)?;
            self.ticks += 1;

            // 7. key sampling: screenshot first, exit second, at most one
            //    branch per tick
            if let Some(key) = self.display.poll_key(self.config.poll_wait)? {
                if key == self.config.screenshot_key && self.config.output_dir.is_some() {
                    self.capture_screenshot(&frame);
                } else if key == self.config.exit_key {
                    log::info!("exit key pressed after {} tick(s)", self.ticks);
                    return Ok(TickOutcome::ExitRequested);
                }
            }
        }
    }

    /// Write the current frame as a JPEG and register the caption overlay.
    /// A failed write is a warning; the loop keeps going.
    fn capture_screenshot(&mut self, frame: &Frame) {
        let dir = self
            .config
            .output_dir
            .as_ref()
            .expect("caller checked output_dir");
        let path = dir.join(format!("{}.jpg", iso_timestamp()));

        let color = match frame.format {
            FrameFormat::Rgb => image::ExtendedColorType::Rgb8,
            FrameFormat::Gray => image::ExtendedColorType::L8,
        };
        match image::save_buffer(&path, &frame.data, frame.width, frame.height, color) {
            Ok(()) => {
                log::info!("screenshot saved at {}", path.display());
                self.overlays.add(screenshot_caption(
                    &path,
                    Instant::now() + SCREENSHOT_CAPTION_WINDOW,
                ));
            }
            Err(e) => log::warn!("failed to save screenshot {}: {}", path.display(), e),
        }
    }
}
