use crate::camera::CameraError;
use crate::frame::Frame;

/// Anything that yields bgr8 frames at a fixed resolution.
///
/// The capture engine only talks to this trait, so it can run against a
/// V4L2 [`Camera`](crate::Camera) or a scripted source in tests.
pub trait FrameSource: Send {
    /// Width and height of the frames this source produces.
    fn resolution(&self) -> (u32, u32);

    /// Block until the next frame is available.
    fn next_frame(&mut self) -> Result<Frame, CameraError>;
}
