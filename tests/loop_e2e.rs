//! End-to-end loop tests with scripted sources and displays.
//!
//! No hardware or terminal is touched: a `ScriptedSource` produces
//! synthetic frames and a `ScriptedDisplay` replays key presses, so the
//! whole Running -> Exporting -> Terminated cycle runs deterministically.

use camloop::{
    CameraError, CameraLoop, DisplayError, DisplaySurface, Frame, FrameFormat, FrameSource,
    LoopConfig, LoopState,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Frame with a red left half and a blue right half, so mirroring is
/// observable from any single pixel.
fn half_and_half(width: u32, height: u32) -> Frame {
    let mut data = Vec::with_capacity((width * height * 3) as usize);
    for _y in 0..height {
        for x in 0..width {
            if x < width / 2 {
                data.extend_from_slice(&[255, 0, 0]);
            } else {
                data.extend_from_slice(&[0, 0, 255]);
            }
        }
    }
    Frame {
        data,
        width,
        height,
        format: FrameFormat::Rgb,
    }
}

struct ScriptedSource {
    frame: Frame,
    reads: u64,
    released: Arc<AtomicBool>,
}

impl ScriptedSource {
    fn new(frame: Frame) -> (Self, Arc<AtomicBool>) {
        let released = Arc::new(AtomicBool::new(false));
        (
            Self {
                frame,
                reads: 0,
                released: released.clone(),
            },
            released,
        )
    }
}

impl FrameSource for ScriptedSource {
    fn read(&mut self) -> Result<Frame, CameraError> {
        self.reads += 1;
        Ok(self.frame.clone())
    }

    fn release(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

/// Replays one scripted key per tick (`None` = no press), then presses the
/// exit key forever so a misbehaving loop still terminates.
struct ScriptedDisplay {
    keys: Vec<Option<char>>,
    tick: usize,
    exit_key: char,
    shown: Arc<Mutex<Vec<Frame>>>,
    closed: Arc<AtomicBool>,
}

impl ScriptedDisplay {
    fn new(keys: Vec<Option<char>>) -> (Self, Arc<Mutex<Vec<Frame>>>, Arc<AtomicBool>) {
        let shown = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        (
            Self {
                keys,
                tick: 0,
                exit_key: 'q',
                shown: shown.clone(),
                closed: closed.clone(),
            },
            shown,
            closed,
        )
    }
}

impl DisplaySurface for ScriptedDisplay {
    fn show(&mut self, frame: &Frame) -> Result<(), DisplayError> {
        self.shown.lock().unwrap().push(frame.clone());
        Ok(())
    }

    fn poll_key(&mut self, _wait: Duration) -> Result<Option<char>, DisplayError> {
        let key = match self.keys.get(self.tick) {
            Some(k) => *k,
            None => Some(self.exit_key),
        };
        self.tick += 1;
        Ok(key)
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[test]
fn test_mirror_session_runs_to_completion() {
    let (source, released) = ScriptedSource::new(half_and_half(8, 4));
    let (display, shown, closed) =
        ScriptedDisplay::new(vec![None, None, None, None, Some('q')]);
    let config = LoopConfig::new().with_mirror(true);
    let mut engine = CameraLoop::with_parts(source, display, &config);

    engine.run(Ok).expect("loop should exit cleanly");

    assert_eq!(engine.state(), LoopState::Terminated);
    assert_eq!(engine.ticks(), 5);
    assert!(released.load(Ordering::SeqCst));
    assert!(closed.load(Ordering::SeqCst));

    let shown = shown.lock().unwrap();
    assert_eq!(shown.len(), 5);
    // The red half started on the left; mirrored frames show it on the right.
    for frame in shown.iter() {
        assert_eq!(frame.pixel(0, 0), (0, 0, 255));
        assert_eq!(frame.pixel(7, 0), (255, 0, 0));
    }
}

#[test]
fn test_screenshot_saves_jpeg_and_captions_later_frames() {
    let dir = tempfile::tempdir().unwrap();
    let (source, _released) = ScriptedSource::new(half_and_half(320, 240));
    // Screenshot on the second tick, exit on the fifth.
    let (display, shown, _closed) =
        ScriptedDisplay::new(vec![None, Some('s'), None, None, Some('q')]);
    let config = LoopConfig::new().with_output(dir.path());
    let mut engine = CameraLoop::with_parts(source, display, &config);

    engine.run(Ok).expect("loop should exit cleanly");

    let entries: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(entries.len(), 1, "exactly one screenshot expected");
    assert_eq!(entries[0].extension().unwrap(), "jpg");
    assert!(std::fs::metadata(&entries[0]).unwrap().len() > 0);

    let shown = shown.lock().unwrap();
    assert_eq!(shown.len(), 5);
    // Frames shown before the screenshot carry no caption.
    let caption_pixels = |frame: &Frame| {
        (0..40)
            .flat_map(|dy| (0..300).map(move |dx| (16 + dx, 16 + dy)))
            .map(|(x, y)| frame.pixel(x, y))
            .filter(|&px| px == (200, 120, 0))
            .count()
    };
    assert_eq!(caption_pixels(&shown[0]), 0);
    assert_eq!(caption_pixels(&shown[1]), 0);
    // Later frames show "Screenshot saved at: ..." in the caption color.
    assert!(caption_pixels(&shown[2]) > 0);
    assert!(caption_pixels(&shown[4]) > 0);
}

#[test]
fn test_screenshot_key_ignored_without_output_dir() {
    let (source, released) = ScriptedSource::new(half_and_half(8, 4));
    let (display, shown, _closed) = ScriptedDisplay::new(vec![Some('s'), Some('q')]);
    let config = LoopConfig {
        output: None,
        ..LoopConfig::default()
    };
    let mut engine = CameraLoop::with_parts(source, display, &config);

    engine.run(Ok).expect("loop should exit cleanly");

    // The press is a no-op: no caption appears, the loop keeps running.
    assert_eq!(engine.ticks(), 2);
    assert!(released.load(Ordering::SeqCst));
    let shown = shown.lock().unwrap();
    assert_eq!(shown[1].pixel(0, 0), (255, 0, 0));
}

#[test]
fn test_invalid_output_dir_degrades_but_completes() {
    let (source, released) = ScriptedSource::new(half_and_half(8, 4));
    let (display, _shown, closed) = ScriptedDisplay::new(vec![Some('s'), None, Some('q')]);
    let config = LoopConfig::new()
        .with_output("/definitely/not/a/real/directory")
        .with_sequence_format("gif");
    let mut engine = CameraLoop::with_parts(source, display, &config);

    // Saving is disabled, but the full lifecycle still runs.
    engine.run(Ok).expect("loop should exit cleanly");
    assert_eq!(engine.state(), LoopState::Terminated);
    assert_eq!(engine.ticks(), 3);
    assert!(released.load(Ordering::SeqCst));
    assert!(closed.load(Ordering::SeqCst));
}

#[test]
fn test_transform_failure_releases_everything() {
    let (source, released) = ScriptedSource::new(half_and_half(8, 4));
    let (display, _shown, closed) = ScriptedDisplay::new(vec![None; 100]);
    let config = LoopConfig {
        output: None,
        ..LoopConfig::default()
    };
    let mut engine = CameraLoop::with_parts(source, display, &config);

    let mut calls = 0u32;
    let result = engine.run(|frame| {
        calls += 1;
        if calls == 3 {
            Err("synthetic transform failure".into())
        } else {
            Ok(frame)
        }
    });

    assert!(result.is_ok(), "transform failure must not propagate");
    assert_eq!(engine.state(), LoopState::Terminated);
    assert!(released.load(Ordering::SeqCst));
    assert!(closed.load(Ordering::SeqCst));
}

#[test]
fn test_exit_exports_gif_sequence() {
    let dir = tempfile::tempdir().unwrap();
    let (source, released) = ScriptedSource::new(half_and_half(16, 8));
    let (display, _shown, _closed) =
        ScriptedDisplay::new(vec![None, None, Some('q')]);
    let config = LoopConfig::new()
        .with_output(dir.path())
        .with_sequence_format("gif")
        .with_fps(10.0);
    let mut engine = CameraLoop::with_parts(source, display, &config);

    engine.run(Ok).expect("loop should exit cleanly");
    assert!(released.load(Ordering::SeqCst));

    let entries: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].extension().unwrap(), "gif");
    // GIF magic bytes.
    let bytes = std::fs::read(&entries[0]).unwrap();
    assert_eq!(&bytes[..6], b"GIF89a");
}

#[test]
fn test_transform_output_is_what_gets_recorded_and_shown() {
    let dir = tempfile::tempdir().unwrap();
    let (source, _released) = ScriptedSource::new(half_and_half(8, 4));
    let (display, shown, _closed) = ScriptedDisplay::new(vec![Some('q')]);
    let config = LoopConfig::new().with_output(dir.path());
    let mut engine = CameraLoop::with_parts(source, display, &config);

    // Transform paints the whole frame green.
    engine
        .run(|mut frame| {
            for px in frame.data.chunks_exact_mut(3) {
                px.copy_from_slice(&[0, 255, 0]);
            }
            Ok(frame)
        })
        .expect("loop should exit cleanly");

    let shown = shown.lock().unwrap();
    assert_eq!(shown[0].pixel(0, 0), (0, 255, 0));
}
