//! camnode-hw — Hardware abstraction for camera capture.
//!
//! Provides V4L2-based camera access and conversion of the negotiated
//! pixel format to packed bgr8.

pub mod camera;
pub mod frame;
pub mod source;

pub use camera::{Camera, CameraError, DeviceInfo, DeviceSpec, PixelFormat};
pub use frame::{Frame, FrameError};
pub use source::FrameSource;
