//! V4L2 camera capture via the `v4l` crate.

use crate::frame::{self, Frame, FrameError};
use crate::source::FrameSource;
use std::fmt;
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::capture::Parameters;
use v4l::video::Capture;
use v4l::FourCC;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
    #[error("frame conversion failed: {0}")]
    Conversion(#[from] FrameError),
}

/// Which video device to open: `/dev/video<N>` by index, or an explicit path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSpec {
    Index(u32),
    Path(String),
}

impl DeviceSpec {
    /// All-digit strings are indices; anything else is a path.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(index) = s.parse() {
                return Self::Index(index);
            }
        }
        Self::Path(s.to_string())
    }

    pub fn path(&self) -> String {
        match self {
            Self::Index(i) => format!("/dev/video{i}"),
            Self::Path(p) => p.clone(),
        }
    }
}

impl fmt::Display for DeviceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel).
    Yuyv,
    /// Motion-JPEG, one JPEG image per buffer.
    Mjpeg,
    /// 8-bit grayscale.
    Grey,
    /// Packed 24-bit BGR.
    Bgr24,
    /// Packed 24-bit RGB.
    Rgb24,
}

impl PixelFormat {
    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        match &fourcc.repr {
            b"YUYV" => Some(Self::Yuyv),
            b"MJPG" => Some(Self::Mjpeg),
            b"GREY" => Some(Self::Grey),
            b"BGR3" => Some(Self::Bgr24),
            b"RGB3" => Some(Self::Rgb24),
            _ => None,
        }
    }
}

/// V4L2 camera device handle.
///
/// The mmap stream is started on the first capture and kept for the
/// lifetime of the handle.
pub struct Camera {
    stream: Option<MmapStream<'static>>,
    device: Device,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pub fourcc: FourCC,
    pixel_format: PixelFormat,
}

impl Camera {
    /// Open a V4L2 camera and request YUYV at `width`x`height`.
    ///
    /// Drivers may answer with a different size or one of the other
    /// supported formats; the negotiated values are reported on the handle.
    pub fn open(spec: &DeviceSpec, width: u32, height: u32) -> Result<Self, CameraError> {
        let device_path = spec.path();
        if !Path::new(&device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path));
        }

        let device = Device::with_path(&device_path).map_err(|e| {
            if e.to_string().contains("busy") || e.raw_os_error() == Some(libc::EBUSY) {
                CameraError::DeviceBusy
            } else {
                CameraError::DeviceNotFound(format!("{device_path}: {e}"))
            }
        })?;

        let caps = device.query_caps().map_err(|e| {
            CameraError::CaptureFailed(format!("failed to query capabilities: {e}"))
        })?;

        tracing::info!(
            device = %device_path,
            driver = %caps.driver,
            card = %caps.card,
            "opened camera"
        );

        if !caps
            .capabilities
            .contains(v4l::capability::Flags::VIDEO_CAPTURE)
        {
            return Err(CameraError::StreamingNotSupported);
        }

        let mut fmt = device.format().map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to get format: {e}"))
        })?;
        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = width;
        fmt.height = height;

        let negotiated = device.set_format(&fmt).map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to set format: {e}"))
        })?;

        let fourcc = negotiated.fourcc;
        let pixel_format = PixelFormat::from_fourcc(fourcc).ok_or_else(|| {
            CameraError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {fourcc:?} (need YUYV, MJPG, GREY, BGR3 or RGB3)"
            ))
        })?;

        tracing::info!(
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?fourcc,
            "negotiated format"
        );

        Ok(Self {
            stream: None,
            device,
            width: negotiated.width,
            height: negotiated.height,
            device_path,
            fourcc,
            pixel_format,
        })
    }

    /// Ask the driver for a capture rate. Not every driver honours this.
    pub fn set_frame_rate(&self, fps: u32) {
        match self.device.set_params(&Parameters::with_fps(fps)) {
            Ok(params) => tracing::debug!(interval = ?params.interval, "frame interval set"),
            Err(e) => tracing::warn!(fps, error = %e, "driver rejected frame rate"),
        }
    }

    /// Dequeue one frame and convert it to bgr8.
    pub fn capture_frame(&mut self) -> Result<Frame, CameraError> {
        if self.stream.is_none() {
            let stream = MmapStream::with_buffers(&self.device, BufType::VideoCapture, 4)
                .map_err(|e| {
                    CameraError::CaptureFailed(format!("failed to create mmap stream: {e}"))
                })?;
            self.stream = Some(stream);
        }
        let Some(stream) = self.stream.as_mut() else {
            return Err(CameraError::CaptureFailed("stream not started".into()));
        };

        let (buf, meta) = stream
            .next()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;

        let used = (meta.bytesused as usize).min(buf.len());
        let used = if used == 0 { buf.len() } else { used };
        let data = convert(self.pixel_format, &buf[..used], self.width, self.height)?;

        Ok(Frame {
            data,
            width: self.width,
            height: self.height,
            sequence: meta.sequence,
            timestamp: std::time::Instant::now(),
        })
    }

    /// List available V4L2 video capture devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        let mut devices = Vec::new();

        for i in 0..16 {
            let path = format!("/dev/video{i}");
            if !Path::new(&path).exists() {
                continue;
            }
            let Ok(dev) = Device::with_path(&path) else {
                continue;
            };
            let Ok(caps) = dev.query_caps() else {
                continue;
            };
            if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                continue;
            }
            devices.push(DeviceInfo {
                path,
                name: caps.card.clone(),
                driver: caps.driver.clone(),
                bus: caps.bus.clone(),
            });
        }

        devices
    }
}

impl FrameSource for Camera {
    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn next_frame(&mut self) -> Result<Frame, CameraError> {
        self.capture_frame()
    }
}

fn convert(format: PixelFormat, buf: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    match format {
        PixelFormat::Yuyv => frame::yuyv_to_bgr8(buf, width, height),
        PixelFormat::Mjpeg => frame::mjpeg_to_bgr8(buf, width, height),
        PixelFormat::Grey => frame::grey_to_bgr8(buf, width, height),
        PixelFormat::Rgb24 => frame::rgb_to_bgr8(buf, width, height),
        PixelFormat::Bgr24 => {
            let expected = (width * height * 3) as usize;
            if buf.len() < expected {
                return Err(FrameError::InvalidLength {
                    expected,
                    actual: buf.len(),
                });
            }
            Ok(buf[..expected].to_vec())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_spec_index() {
        assert_eq!(DeviceSpec::parse("0"), DeviceSpec::Index(0));
        assert_eq!(DeviceSpec::parse(" 2 "), DeviceSpec::Index(2));
        assert_eq!(DeviceSpec::parse("2").path(), "/dev/video2");
    }

    #[test]
    fn test_device_spec_path() {
        assert_eq!(
            DeviceSpec::parse("/dev/video0"),
            DeviceSpec::Path("/dev/video0".into())
        );
        assert_eq!(
            DeviceSpec::parse("/dev/v4l/by-id/usb-cam").to_string(),
            "/dev/v4l/by-id/usb-cam"
        );
    }

    #[test]
    fn test_open_missing_device() {
        let spec = DeviceSpec::Path("/dev/definitely-not-a-camera".into());
        assert!(matches!(
            Camera::open(&spec, 640, 480),
            Err(CameraError::DeviceNotFound(_))
        ));
    }

    #[test]
    fn test_pixel_format_from_fourcc() {
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"MJPG")), Some(PixelFormat::Mjpeg));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"YUYV")), Some(PixelFormat::Yuyv));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"H264")), None);
    }

    #[test]
    fn test_convert_bgr24_passthrough() {
        let out = convert(PixelFormat::Bgr24, &[1, 2, 3, 4, 5, 6, 9], 2, 1).unwrap();
        assert_eq!(out, vec![1, 2, 3, 4, 5, 6]);
    }
}
