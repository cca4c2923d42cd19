//! Loop configuration and validation.
//!
//! Callers hand the engine a `LoopConfig`; validation happens once at loop
//! construction. Invalid output directories and unsupported export formats
//! degrade to "no saving / no export" with a warning - they are never
//! fatal.

use crate::camera::{Resolution, SourceId};
use crate::recorder::SequenceFormat;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Options recognized by the loop, with the same defaults a bare
/// construction gets.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Capture device index or stream identifier
    pub source: SourceId,
    /// Optional resolution override requested from the device
    pub resolution: Option<Resolution>,
    /// Flip frames horizontally before processing
    pub mirror: bool,
    /// Directory for screenshots and sequence exports
    pub output: Option<PathBuf>,
    /// Export format name ("gif" or "mp4"); invalid values disable export
    pub sequence_format: Option<String>,
    /// Explicit export frame rate; derived from elapsed time when absent
    pub fps: Option<f64>,
    /// Key that captures a screenshot
    pub screenshot_key: char,
    /// Key that ends the loop
    pub exit_key: char,
    /// How long the display blocks while sampling the keyboard, per tick
    pub poll_wait_ms: u64,
    /// Title of the preview window
    pub window_title: String,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            source: SourceId::default(),
            resolution: None,
            mirror: false,
            output: Some(PathBuf::from(".")),
            sequence_format: None,
            fps: None,
            screenshot_key: 's',
            exit_key: 'q',
            poll_wait_ms: 1,
            window_title: "camloop".to_string(),
        }
    }
}

impl LoopConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the capture source.
    pub fn with_source(mut self, source: SourceId) -> Self {
        self.source = source;
        self
    }

    /// Request a capture resolution (the device may not honor it exactly).
    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = Some(resolution);
        self
    }

    /// Enable or disable horizontal mirroring.
    pub fn with_mirror(mut self, mirror: bool) -> Self {
        self.mirror = mirror;
        self
    }

    /// Set the output directory for screenshots and exports.
    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }

    /// Request sequence export in the named format.
    pub fn with_sequence_format(mut self, format: impl Into<String>) -> Self {
        self.sequence_format = Some(format.into());
        self
    }

    /// Set an explicit export frame rate.
    pub fn with_fps(mut self, fps: f64) -> Self {
        self.fps = Some(fps);
        self
    }

    /// Override the screenshot and exit keys.
    pub fn with_keys(mut self, screenshot: char, exit: char) -> Self {
        self.screenshot_key = screenshot;
        self.exit_key = exit;
        self
    }

    /// Load configuration from a TOML file.
    ///
    /// Returns the default config when no path is given. A path that
    /// exists but cannot be read or parsed is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p,
            None => return Ok(Self::default()),
        };

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Validate the caller-facing options into what the engine uses.
    ///
    /// Problems are logged and degraded, never propagated: a missing
    /// output directory disables saving, an unsupported format disables
    /// export.
    pub fn resolve(&self) -> ResolvedConfig {
        ResolvedConfig {
            output_dir: validate_output_dir(self.output.as_deref()),
            format: resolve_format(self.sequence_format.as_deref()),
            mirror: self.mirror,
            fps: self.fps,
            screenshot_key: self.screenshot_key,
            exit_key: self.exit_key,
            poll_wait: Duration::from_millis(self.poll_wait_ms.max(1)),
            window_title: self.window_title.clone(),
        }
    }
}

/// Validated configuration the engine runs with.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Existing, absolute output directory; `None` disables saving
    pub output_dir: Option<PathBuf>,
    /// Supported export format; `None` disables export
    pub format: Option<SequenceFormat>,
    pub mirror: bool,
    pub fps: Option<f64>,
    pub screenshot_key: char,
    pub exit_key: char,
    pub poll_wait: Duration,
    pub window_title: String,
}

/// Resolve and check the output directory; warn and disable saving when it
/// does not exist.
fn validate_output_dir(path: Option<&Path>) -> Option<PathBuf> {
    let path = path?;
    match path.canonicalize() {
        Ok(abs) if abs.is_dir() => Some(abs),
        Ok(abs) => {
            log::warn!(
                "Specified output path is not a directory ({}). Files will not be saved",
                abs.display()
            );
            None
        }
        Err(_) => {
            log::warn!(
                "Specified output directory not found ({}). Files will not be saved",
                path.display()
            );
            None
        }
    }
}

/// Parse the export format; warn and disable export on unsupported values.
fn resolve_format(value: Option<&str>) -> Option<SequenceFormat> {
    let value = value?;
    match SequenceFormat::parse(value) {
        Some(fmt) => Some(fmt),
        None => {
            log::warn!(
                "Specified format '{}' not supported. Currently supported formats are: [gif, mp4]. Output sequence will not be saved",
                value
            );
            None
        }
    }
}

/// Errors loading a configuration file.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to parse the config file as TOML
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError { path, source } => {
                write!(f, "Failed to read config file {}: {}", path.display(), source)
            }
            ConfigError::ParseError { path, source } => {
                write!(f, "Failed to parse config file {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::IoError { source, .. } => Some(source),
            ConfigError::ParseError { source, .. } => Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = LoopConfig::default();
        assert_eq!(config.source, SourceId::Index(0));
        assert_eq!(config.output, Some(PathBuf::from(".")));
        assert!(!config.mirror);
        assert_eq!(config.screenshot_key, 's');
        assert_eq!(config.exit_key, 'q');
        assert_eq!(config.sequence_format, None);
        assert_eq!(config.fps, None);
    }

    #[test]
    fn test_builders() {
        let config = LoopConfig::new()
            .with_source(SourceId::Index(2))
            .with_mirror(true)
            .with_sequence_format("gif")
            .with_fps(24.0)
            .with_keys('c', 'x');
        assert_eq!(config.source, SourceId::Index(2));
        assert!(config.mirror);
        assert_eq!(config.sequence_format.as_deref(), Some("gif"));
        assert_eq!(config.fps, Some(24.0));
        assert_eq!(config.screenshot_key, 'c');
        assert_eq!(config.exit_key, 'x');
    }

    #[test]
    fn test_resolve_valid_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = LoopConfig::new().with_output(dir.path()).resolve();
        let out = resolved.output_dir.expect("dir should resolve");
        assert!(out.is_absolute());
        assert!(out.is_dir());
    }

    #[test]
    fn test_resolve_missing_output_dir_degrades() {
        let resolved = LoopConfig::new()
            .with_output("/definitely/not/a/real/directory")
            .resolve();
        assert_eq!(resolved.output_dir, None);
    }

    #[test]
    fn test_resolve_output_file_not_dir_degrades() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let resolved = LoopConfig::new().with_output(file.path()).resolve();
        assert_eq!(resolved.output_dir, None);
    }

    #[test]
    fn test_resolve_format_variants() {
        let resolved = LoopConfig::new().with_sequence_format("mp4").resolve();
        assert_eq!(resolved.format, Some(SequenceFormat::Mp4));

        let resolved = LoopConfig::new().with_sequence_format(".GIF").resolve();
        assert_eq!(resolved.format, Some(SequenceFormat::Gif));

        let resolved = LoopConfig::new().with_sequence_format("webm").resolve();
        assert_eq!(resolved.format, None);

        let resolved = LoopConfig::new().resolve();
        assert_eq!(resolved.format, None);
    }

    #[test]
    fn test_load_no_path_gives_defaults() {
        let config = LoopConfig::load(None).unwrap();
        assert_eq!(config.exit_key, 'q');
    }

    #[test]
    fn test_load_missing_file_errors() {
        let result = LoopConfig::load(Some(Path::new("/no/such/config.toml")));
        assert!(matches!(result, Err(ConfigError::IoError { .. })));
    }

    #[test]
    fn test_load_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
source = 1
mirror = true
sequence_format = "gif"
fps = 12.5
screenshot_key = "c"
exit_key = "x"

[resolution]
width = 640
height = 480
"#
        )
        .unwrap();

        let config = LoopConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.source, SourceId::Index(1));
        assert!(config.mirror);
        assert_eq!(config.resolution, Some(Resolution::new(640, 480)));
        assert_eq!(config.fps, Some(12.5));
        assert_eq!(config.screenshot_key, 'c');
        assert_eq!(config.exit_key, 'x');
    }

    #[test]
    fn test_load_bad_toml_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "mirror = maybe").unwrap();
        let result = LoopConfig::load(Some(file.path()));
        assert!(matches!(result, Err(ConfigError::ParseError { .. })));
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::IoError {
            path: PathBuf::from("/tmp/x.toml"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("/tmp/x.toml"));
        assert!(msg.contains("missing"));
    }
}
