//! camnode-core — Message types and calibration file handling.
//!
//! Defines the raw image and camera-info messages published by the camera
//! node, reads and writes the calibration YAML format produced by external
//! calibration tools, and resolves where that file lives.

pub mod bus;
pub mod camera_info;
pub mod types;
pub mod url;

pub use camera_info::{default_camera_info, load_camera_info, save_camera_info, CameraInfoError};
pub use types::{CameraInfo, Header, Image, Time};
