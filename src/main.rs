use camloop::{draw_text, CameraLoop, Frame, FrameFormat, LoopConfig, Resolution, SourceId};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Parse and validate the export frame rate (0 < fps <= 120).
fn parse_fps(s: &str) -> Result<f64, String> {
    let fps: f64 = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid frame rate", s))?;
    if !(fps > 0.0 && fps <= 120.0) {
        return Err(format!("Frame rate must be in (0, 120], got {}", fps));
    }
    Ok(fps)
}

/// Parse and validate resolution (WIDTHxHEIGHT format).
fn parse_resolution(s: &str) -> Result<Resolution, String> {
    let parts: Vec<&str> = s.split('x').collect();
    if parts.len() != 2 {
        return Err(format!(
            "Invalid resolution format '{}'. Use WIDTHxHEIGHT (e.g., 1280x720)",
            s
        ));
    }
    let width: u32 = parts[0]
        .parse()
        .map_err(|_| format!("Invalid width '{}' in resolution", parts[0]))?;
    let height: u32 = parts[1]
        .parse()
        .map_err(|_| format!("Invalid height '{}' in resolution", parts[1]))?;
    if width == 0 || height == 0 {
        return Err("Resolution width and height must be greater than 0".to_string());
    }
    Ok(Resolution::new(width, height))
}

/// Parse a single-character key binding.
fn parse_key(s: &str) -> Result<char, String> {
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(format!("'{}' is not a single key", s)),
    }
}

/// Parse the capture source: a device index or a stream URI.
fn parse_source(s: &str) -> Result<SourceId, String> {
    if let Ok(index) = s.parse::<u32>() {
        Ok(SourceId::Index(index))
    } else if s.is_empty() {
        Err("Source must be a device index or a stream URI".to_string())
    } else {
        Ok(SourceId::Uri(s.to_string()))
    }
}

/// Built-in per-frame transforms for the demo binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
enum Demo {
    /// Pass frames through untouched
    #[default]
    None,
    /// Stamp the current time into the corner of each frame
    Timestamp,
    /// Convert frames to grayscale
    Grayscale,
}

/// camloop: annotated camera preview with screenshot and sequence export
#[derive(Parser, Debug)]
#[command(name = "camloop")]
#[command(version, about = "Annotated camera preview loop", long_about = None)]
#[command(after_help = "EXAMPLES:
    # Mirrored preview of the default webcam
    camloop --mirror

    # Record a GIF of the session into ./captures
    camloop -o captures --save-sequence gif

    # Timestamped MP4 at a fixed 24 fps
    camloop --demo timestamp --save-sequence mp4 --fps 24

    # List available cameras
    camloop list-cameras

KEYS:
    s    save a screenshot (JPEG, into the output directory)
    q    exit the loop (exports the sequence if requested)")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Capture source: device index or stream URI (default 0)
    #[arg(long, value_parser = parse_source)]
    source: Option<SourceId>,

    /// Requested capture resolution (WIDTHxHEIGHT)
    #[arg(long, value_parser = parse_resolution)]
    resolution: Option<Resolution>,

    /// Mirror frames horizontally
    #[arg(long)]
    mirror: bool,

    /// Output directory for screenshots and exports
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Export the session as a sequence in this format (gif, mp4)
    #[arg(long, value_name = "FORMAT")]
    save_sequence: Option<String>,

    /// Export frame rate; derived from elapsed time when omitted
    #[arg(long, value_parser = parse_fps)]
    fps: Option<f64>,

    /// Per-frame transform to apply
    #[arg(long, default_value = "none")]
    demo: Demo,

    /// Screenshot key (default 's')
    #[arg(long, value_parser = parse_key)]
    screenshot_key: Option<char>,

    /// Exit key (default 'q')
    #[arg(long, value_parser = parse_key)]
    exit_key: Option<char>,

    /// Config file path (TOML); CLI flags override file values
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List available cameras
    ListCameras,
}

/// Print available capture devices to stdout.
fn list_cameras() {
    match camloop::list_devices() {
        Ok(devices) => {
            if devices.is_empty() {
                println!("No cameras found.");
            } else {
                println!("Available cameras:");
                for device in devices {
                    println!("  {}", device);
                }
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn grayscale(frame: Frame) -> Frame {
    match frame.format {
        FrameFormat::Gray => frame,
        FrameFormat::Rgb => {
            let mut data = Vec::with_capacity(frame.data.len() / 3);
            for px in frame.data.chunks_exact(3) {
                let luma =
                    (px[0] as u32 * 299 + px[1] as u32 * 587 + px[2] as u32 * 114) / 1000;
                data.push(luma as u8);
            }
            Frame {
                data,
                width: frame.width,
                height: frame.height,
                format: FrameFormat::Gray,
            }
        }
    }
}

fn timestamp(mut frame: Frame) -> Frame {
    let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let y = frame.height.saturating_sub(16);
    draw_text(&mut frame, &now, 16, y, (255, 255, 255), 2);
    frame
}

fn build_config(args: &Args) -> Result<LoopConfig, camloop::ConfigError> {
    let mut config = LoopConfig::load(args.config.as_deref())?;

    if let Some(source) = &args.source {
        config = config.with_source(source.clone());
    }
    let screenshot = args.screenshot_key.unwrap_or(config.screenshot_key);
    let exit = args.exit_key.unwrap_or(config.exit_key);
    config = config.with_keys(screenshot, exit);

    if let Some(res) = args.resolution {
        config = config.with_resolution(res);
    }
    if args.mirror {
        config = config.with_mirror(true);
    }
    if let Some(out) = &args.out {
        config = config.with_output(out.clone());
    }
    if let Some(format) = &args.save_sequence {
        config = config.with_sequence_format(format.clone());
    }
    if let Some(fps) = args.fps {
        config = config.with_fps(fps);
    }
    Ok(config)
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = build_config(&args)?;
    let mut engine = CameraLoop::open(&config)?;
    match args.demo {
        Demo::None => engine.run(Ok)?,
        Demo::Timestamp => engine.run(|frame| Ok(timestamp(frame)))?,
        Demo::Grayscale => engine.run(|frame| Ok(grayscale(frame)))?,
    }
    Ok(())
}

fn main() {
    let args = Args::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(args.log_level.as_str()),
    )
    .init();

    if let Some(Command::ListCameras) = args.command {
        list_cameras();
        return;
    }

    if let Err(e) = run(args) {
        log::error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fps() {
        assert_eq!(parse_fps("24"), Ok(24.0));
        assert_eq!(parse_fps("12.5"), Ok(12.5));
        assert!(parse_fps("0").is_err());
        assert!(parse_fps("-5").is_err());
        assert!(parse_fps("fast").is_err());
    }

    #[test]
    fn test_parse_resolution() {
        assert_eq!(parse_resolution("1280x720"), Ok(Resolution::new(1280, 720)));
        assert!(parse_resolution("1280").is_err());
        assert!(parse_resolution("0x720").is_err());
        assert!(parse_resolution("wide x tall").is_err());
    }

    #[test]
    fn test_parse_key() {
        assert_eq!(parse_key("s"), Ok('s'));
        assert!(parse_key("").is_err());
        assert!(parse_key("sq").is_err());
    }

    #[test]
    fn test_parse_source() {
        assert_eq!(parse_source("2"), Ok(SourceId::Index(2)));
        assert_eq!(
            parse_source("rtsp://cam/stream"),
            Ok(SourceId::Uri("rtsp://cam/stream".to_string()))
        );
        assert!(parse_source("").is_err());
    }

    #[test]
    fn test_grayscale_demo() {
        let frame = Frame {
            data: vec![255, 255, 255, 0, 0, 0],
            width: 2,
            height: 1,
            format: FrameFormat::Rgb,
        };
        let gray = grayscale(frame);
        assert_eq!(gray.format, FrameFormat::Gray);
        assert_eq!(gray.data, vec![255, 0]);
    }

    #[test]
    fn test_cli_parses() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn test_config_file_values_survive_without_flags() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "source = 3\nscreenshot_key = \"c\"\nexit_key = \"x\"\nmirror = true"
        )
        .unwrap();

        let args = Args::parse_from(["camloop", "--config", file.path().to_str().unwrap()]);
        let config = build_config(&args).unwrap();
        assert_eq!(config.source, SourceId::Index(3));
        assert_eq!(config.screenshot_key, 'c');
        assert_eq!(config.exit_key, 'x');
        assert!(config.mirror);
    }

    #[test]
    fn test_cli_flags_override_config_file() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "source = 3\nscreenshot_key = \"c\"\nexit_key = \"x\"").unwrap();

        let args = Args::parse_from([
            "camloop",
            "--config",
            file.path().to_str().unwrap(),
            "--source",
            "1",
            "--screenshot-key",
            "p",
        ]);
        let config = build_config(&args).unwrap();
        assert_eq!(config.source, SourceId::Index(1));
        assert_eq!(config.screenshot_key, 'p');
        // Not overridden on the command line: the file value stands.
        assert_eq!(config.exit_key, 'x');
    }

    #[test]
    fn test_defaults_without_config_or_flags() {
        let args = Args::parse_from(["camloop"]);
        let config = build_config(&args).unwrap();
        assert_eq!(config.source, SourceId::Index(0));
        assert_eq!(config.screenshot_key, 's');
        assert_eq!(config.exit_key, 'q');
    }
}
