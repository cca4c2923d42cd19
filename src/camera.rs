//! Camera capture module: frame types, the `FrameSource` seam, and the
//! nokhwa-backed webcam source.
//!
//! The loop engine only talks to `FrameSource`, so tests (and exotic
//! callers) can substitute a synthetic source without touching hardware.

use nokhwa::pixel_format::RgbFormat;
use nokhwa::query;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, FrameFormat as NokhwaFrameFormat, RequestedFormat,
    RequestedFormatType,
};
use nokhwa::Camera;
use std::fmt;

/// Information about an available camera device.
#[derive(Debug, Clone)]
pub struct CameraInfo {
    /// Device index for selection
    pub index: u32,
    /// Human-readable device name
    pub name: String,
    /// Device description
    pub description: String,
}

impl fmt::Display for CameraInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} ({})", self.index, self.name, self.description)
    }
}

/// Camera resolution in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Pixel format of a captured or processed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    /// RGB, 3 bytes per pixel
    Rgb,
    /// Single-channel grayscale, 1 byte per pixel
    Gray,
}

/// A frame passing through the processing pipeline.
///
/// Frames move by value: every pipeline stage consumes the previous stage's
/// output and produces the next stage's input.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw pixel data, row-major
    pub data: Vec<u8>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Pixel format
    pub format: FrameFormat,
}

impl Frame {
    /// Get the number of bytes per pixel (3 for RGB, 1 for grayscale).
    pub fn bytes_per_pixel(&self) -> usize {
        match self.format {
            FrameFormat::Rgb => 3,
            FrameFormat::Gray => 1,
        }
    }

    /// Read a pixel as (r, g, b). Grayscale pixels replicate their value.
    pub fn pixel(&self, x: u32, y: u32) -> (u8, u8, u8) {
        let idx = (y as usize * self.width as usize + x as usize) * self.bytes_per_pixel();
        match self.format {
            FrameFormat::Rgb => (self.data[idx], self.data[idx + 1], self.data[idx + 2]),
            FrameFormat::Gray => (self.data[idx], self.data[idx], self.data[idx]),
        }
    }

    /// Expand the frame to raw RGB bytes (plain copy for RGB frames).
    pub fn to_rgb_bytes(&self) -> Vec<u8> {
        match self.format {
            FrameFormat::Rgb => self.data.clone(),
            FrameFormat::Gray => {
                let mut rgb = Vec::with_capacity(self.data.len() * 3);
                for &v in &self.data {
                    rgb.extend_from_slice(&[v, v, v]);
                }
                rgb
            }
        }
    }
}

/// Errors that can occur during camera operations.
#[derive(Debug)]
pub enum CameraError {
    /// No cameras found on the system
    NoDevices,
    /// Failed to query camera devices
    QueryFailed(String),
    /// Failed to open camera
    OpenFailed(String),
    /// Camera permission denied (macOS)
    PermissionDenied,
    /// Camera device not found at specified index
    DeviceNotFound(u32),
    /// Failed to start video stream
    StreamFailed(String),
    /// No frame could be retrieved (stream ended, device disconnected)
    ReadFailed(String),
}

impl fmt::Display for CameraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraError::NoDevices => write!(f, "No cameras found"),
            CameraError::QueryFailed(msg) => write!(f, "Failed to query cameras: {}", msg),
            CameraError::OpenFailed(msg) => write!(f, "Failed to open camera: {}", msg),
            CameraError::PermissionDenied => {
                write!(f, "Camera permission denied. On macOS, grant access in System Settings > Privacy & Security > Camera")
            }
            CameraError::DeviceNotFound(index) => {
                write!(f, "Camera device {} not found. Run 'camloop list-cameras' to see available devices", index)
            }
            CameraError::StreamFailed(msg) => write!(f, "Failed to start camera stream: {}", msg),
            CameraError::ReadFailed(msg) => write!(f, "Failed to read frame from source: {}", msg),
        }
    }
}

impl std::error::Error for CameraError {}

/// List all available camera devices on the system.
///
/// Returns a vector of `CameraInfo` structs, or an error if querying fails.
/// If no cameras are found, returns an empty vector (not an error).
pub fn list_devices() -> Result<Vec<CameraInfo>, CameraError> {
    let devices = query(ApiBackend::Auto).map_err(|e| CameraError::QueryFailed(e.to_string()))?;

    Ok(devices
        .into_iter()
        .map(|d| CameraInfo {
            index: d.index().as_index().unwrap_or(0),
            name: d.human_name(),
            description: d.description().to_string(),
        })
        .collect())
}

/// Something the loop engine can pull frames from.
///
/// `release` must be idempotent: the engine calls it on every exit path and
/// implementations may also release from `Drop`.
pub trait FrameSource {
    /// Acquire the next frame. Failure is fatal to the loop; it is never
    /// retried.
    fn read(&mut self) -> Result<Frame, CameraError>;

    /// Release the underlying device. Safe to call more than once.
    fn release(&mut self);
}

/// Identifies a capture device or stream.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(untagged)]
pub enum SourceId {
    /// Local device index (e.g. 0 for the default webcam)
    Index(u32),
    /// Stream identifier / URI understood by the backend
    Uri(String),
}

impl Default for SourceId {
    fn default() -> Self {
        SourceId::Index(0)
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceId::Index(i) => write!(f, "{}", i),
            SourceId::Uri(s) => write!(f, "{}", s),
        }
    }
}

/// Webcam-backed frame source.
///
/// Wraps a nokhwa `Camera` and reads frames synchronously: `read()` blocks
/// until the driver delivers the next frame. The stream is released on
/// `release()` or drop, whichever comes first.
pub struct CameraSource {
    camera: Camera,
    released: bool,
}

impl CameraSource {
    /// Open a capture source, optionally requesting a specific resolution.
    ///
    /// Format negotiation tries, in order: the requested resolution with
    /// MJPEG, the requested resolution with YUYV, then whatever highest
    /// resolution the camera offers. The camera may still hand back a
    /// different resolution than requested.
    ///
    /// # Errors
    /// * `CameraError::OpenFailed` / `PermissionDenied` - device could not be opened
    /// * `CameraError::StreamFailed` - device opened but the stream did not start
    pub fn open(source: &SourceId, resolution: Option<Resolution>) -> Result<Self, CameraError> {
        let index = match source {
            SourceId::Index(i) => CameraIndex::Index(*i),
            SourceId::Uri(s) => CameraIndex::String(s.clone()),
        };

        let format_attempts: Vec<RequestedFormat> = match resolution {
            Some(res) => vec![
                RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(
                    CameraFormat::new(
                        nokhwa::utils::Resolution::new(res.width, res.height),
                        NokhwaFrameFormat::MJPEG,
                        30,
                    ),
                )),
                RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(
                    CameraFormat::new(
                        nokhwa::utils::Resolution::new(res.width, res.height),
                        NokhwaFrameFormat::YUYV,
                        30,
                    ),
                )),
                RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestResolution),
            ],
            None => vec![RequestedFormat::new::<RgbFormat>(
                RequestedFormatType::AbsoluteHighestResolution,
            )],
        };

        let mut camera = None;
        let mut last_error = None;
        for requested in format_attempts {
            match Camera::new(index.clone(), requested) {
                Ok(cam) => {
                    camera = Some(cam);
                    break;
                }
                Err(e) => {
                    last_error = Some(e);
                    continue;
                }
            }
        }

        let mut camera = match camera {
            Some(cam) => cam,
            None => {
                let e = last_error.expect("at least one format attempt");
                let msg = e.to_string().to_lowercase();
                return Err(
                    if msg.contains("permission")
                        || msg.contains("denied")
                        || msg.contains("authorization")
                    {
                        CameraError::PermissionDenied
                    } else {
                        CameraError::OpenFailed(e.to_string())
                    },
                );
            }
        };

        camera
            .open_stream()
            .map_err(|e| CameraError::StreamFailed(e.to_string()))?;

        let res = camera.resolution();
        log::info!(
            "camera {} opened at {}x{}",
            source,
            res.width(),
            res.height()
        );

        Ok(Self {
            camera,
            released: false,
        })
    }

    /// The resolution the camera actually negotiated.
    pub fn resolution(&self) -> Resolution {
        let res = self.camera.resolution();
        Resolution::new(res.width(), res.height())
    }
}

impl FrameSource for CameraSource {
    fn read(&mut self) -> Result<Frame, CameraError> {
        let buffer = self
            .camera
            .frame()
            .map_err(|e| CameraError::ReadFailed(e.to_string()))?;

        // decode_image handles MJPEG, YUYV, NV12 and friends
        let decoded = buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| CameraError::ReadFailed(e.to_string()))?;
        let resolution = buffer.resolution();

        Ok(Frame {
            data: decoded.into_raw(),
            width: resolution.width(),
            height: resolution.height(),
            format: FrameFormat::Rgb,
        })
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            if let Err(e) = self.camera.stop_stream() {
                log::debug!("stop_stream on release: {}", e);
            }
        }
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        self.release();
    }
}

/// Mirror a frame horizontally (flip left-right) in place.
pub fn mirror_horizontal(frame: &mut Frame) {
    let width = frame.width as usize;
    let height = frame.height as usize;
    let bpp = frame.bytes_per_pixel();

    for y in 0..height {
        let row_start = y * width * bpp;
        let row = &mut frame.data[row_start..row_start + width * bpp];

        // Swap pixels from left and right
        for x in 0..width / 2 {
            let left = x * bpp;
            let right = (width - 1 - x) * bpp;
            for i in 0..bpp {
                row.swap(left + i, right + i);
            }
        }
    }
}
