use crate::engine::NodeSettings;
use camnode_core::url;
use camnode_hw::DeviceSpec;
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("frame_rate must be a positive number, got {0}")]
    InvalidFrameRate(f64),
    #[error("capture size must be non-zero, got {0}x{1}")]
    InvalidSize(u32, u32),
}

/// Which message bus the service is exported on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BusKind {
    Session,
    System,
}

/// Command-line parameters. Every flag can also be set through its
/// `CAMNODE_*` environment variable.
#[derive(Parser, Debug)]
#[command(name = "camnoded", about = "USB camera node: publishes frames and stores calibration")]
pub struct Args {
    /// Video device index (0 for /dev/video0) or device path
    #[arg(long, env = "CAMNODE_DEVICE", default_value = "0")]
    pub device: String,

    /// Frame id stamped on every published message
    #[arg(long, env = "CAMNODE_FRAME_ID", default_value = "camera_link")]
    pub frame_id: String,

    /// Calibration file, as `file:///path.yaml` or a plain path.
    /// Empty picks ~/.ros/camera_info/<name>.yaml
    #[arg(long, env = "CAMNODE_CAMERA_INFO_URL", default_value = "")]
    pub camera_info_url: String,

    /// Publish rate in Hz
    #[arg(long, env = "CAMNODE_FRAME_RATE", default_value_t = 30.0)]
    pub frame_rate: f64,

    /// Namespace prefixed to topic names; also names the calibration file
    #[arg(long, env = "CAMNODE_NAMESPACE", default_value = "")]
    pub namespace: String,

    #[arg(long, env = "CAMNODE_NODE_NAME", default_value = "simple_camera_node")]
    pub node_name: String,

    /// Requested capture width
    #[arg(long, env = "CAMNODE_WIDTH", default_value_t = 640)]
    pub width: u32,

    /// Requested capture height
    #[arg(long, env = "CAMNODE_HEIGHT", default_value_t = 480)]
    pub height: u32,

    #[arg(long, env = "CAMNODE_BUS", value_enum, default_value_t = BusKind::Session)]
    pub bus: BusKind,
}

/// Validated daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub device: DeviceSpec,
    pub frame_id: String,
    /// Resolved calibration YAML location.
    pub camera_info_path: PathBuf,
    pub frame_rate: f64,
    pub namespace: String,
    pub node_name: String,
    pub width: u32,
    pub height: u32,
    pub bus: BusKind,
}

impl Config {
    pub fn from_args(args: Args, home: &Path) -> Result<Self, ConfigError> {
        if !args.frame_rate.is_finite() || args.frame_rate <= 0.0 {
            return Err(ConfigError::InvalidFrameRate(args.frame_rate));
        }
        if args.width == 0 || args.height == 0 {
            return Err(ConfigError::InvalidSize(args.width, args.height));
        }

        let camera_info_path = url::resolve_camera_info_path(
            &args.camera_info_url,
            &args.namespace,
            &args.node_name,
            home,
        );

        Ok(Self {
            device: DeviceSpec::parse(&args.device),
            frame_id: args.frame_id,
            camera_info_path,
            frame_rate: args.frame_rate,
            namespace: args.namespace,
            node_name: args.node_name,
            width: args.width,
            height: args.height,
            bus: args.bus,
        })
    }

    /// Timer period derived from the frame rate.
    pub fn frame_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_rate)
    }

    pub fn node_settings(&self) -> NodeSettings {
        NodeSettings {
            frame_id: self.frame_id.clone(),
            namespace: self.namespace.clone(),
            node_name: self.node_name.clone(),
            camera_info_path: self.camera_info_path.clone(),
            frame_period: self.frame_period(),
        }
    }
}

/// `$HOME`, or `/tmp` when unset.
pub fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("camnoded").chain(argv.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_args(parse(&[]), Path::new("/home/u")).unwrap();
        assert_eq!(config.device, DeviceSpec::Index(0));
        assert_eq!(config.frame_id, "camera_link");
        assert_eq!(config.frame_rate, 30.0);
        assert_eq!(config.bus, BusKind::Session);
        assert_eq!(
            config.camera_info_path,
            PathBuf::from("/home/u/.ros/camera_info/simple_camera_node.yaml")
        );
    }

    #[test]
    fn test_device_path_and_namespace() {
        let args = parse(&["--device", "/dev/video2", "--namespace", "/my_camera"]);
        let config = Config::from_args(args, Path::new("/home/u")).unwrap();
        assert_eq!(config.device, DeviceSpec::Path("/dev/video2".into()));
        assert_eq!(
            config.camera_info_path,
            PathBuf::from("/home/u/.ros/camera_info/my_camera.yaml")
        );
    }

    #[test]
    fn test_camera_info_url() {
        let args = parse(&["--camera-info-url", "file:///opt/calib/left.yaml"]);
        let config = Config::from_args(args, Path::new("/home/u")).unwrap();
        assert_eq!(config.camera_info_path, PathBuf::from("/opt/calib/left.yaml"));
    }

    #[test]
    fn test_frame_period() {
        let config = Config::from_args(parse(&["--frame-rate", "20"]), Path::new("/")).unwrap();
        assert_eq!(config.frame_period(), Duration::from_millis(50));
    }

    #[test]
    fn test_rejects_non_positive_frame_rate() {
        let err = Config::from_args(parse(&["--frame-rate", "0"]), Path::new("/")).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidFrameRate(_)));
        let err = Config::from_args(parse(&["--frame-rate=-5"]), Path::new("/")).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidFrameRate(_)));
    }

    #[test]
    fn test_rejects_zero_size() {
        let err = Config::from_args(parse(&["--width", "0"]), Path::new("/")).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSize(0, 480)));
    }
}
