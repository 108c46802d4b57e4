use serde::{Deserialize, Serialize};

/// Image encoding published by the camera node.
pub const BGR8: &str = "bgr8";

/// Default distortion model understood by calibration tools.
pub const PLUMB_BOB: &str = "plumb_bob";

/// 3x3 identity, row-major.
pub const IDENTITY_3X3: [f64; 9] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];

/// Wall-clock time stamp split into seconds and nanoseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Time {
    pub sec: i32,
    pub nanosec: u32,
}

impl Time {
    /// Current wall-clock time.
    pub fn now() -> Self {
        Self::from_datetime(chrono::Utc::now())
    }

    /// Seconds saturate at `i32::MAX` (January 2038); later instants all
    /// map to that stamp.
    pub fn from_datetime(dt: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            sec: i32::try_from(dt.timestamp()).unwrap_or(i32::MAX),
            nanosec: dt.timestamp_subsec_nanos(),
        }
    }
}

/// Per-message metadata: when it was captured and in which frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub stamp: Time,
    pub frame_id: String,
}

/// Raw, uncompressed image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub header: Header,
    pub height: u32,
    pub width: u32,
    pub encoding: String,
    pub is_bigendian: u8,
    /// Row length in bytes.
    pub step: u32,
    pub data: Vec<u8>,
}

impl Image {
    /// Wrap packed BGR pixels (3 bytes/pixel, row-major) as an image message.
    pub fn bgr8(header: Header, width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            header,
            height,
            width,
            encoding: BGR8.to_string(),
            is_bigendian: 0,
            step: width * 3,
            data,
        }
    }
}

/// Intrinsic calibration of a camera, published alongside every image.
///
/// `k` is the 3x3 camera matrix, `r` the 3x3 rectification matrix and
/// `p` the 3x4 projection matrix, all row-major. `d` holds as many
/// distortion coefficients as `distortion_model` needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraInfo {
    #[serde(default)]
    pub header: Header,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default = "default_distortion_model")]
    pub distortion_model: String,
    #[serde(default)]
    pub d: Vec<f64>,
    #[serde(default)]
    pub k: [f64; 9],
    #[serde(default = "identity")]
    pub r: [f64; 9],
    #[serde(default)]
    pub p: [f64; 12],
}

fn default_distortion_model() -> String {
    PLUMB_BOB.to_string()
}

fn identity() -> [f64; 9] {
    IDENTITY_3X3
}

impl Default for CameraInfo {
    fn default() -> Self {
        Self {
            header: Header::default(),
            width: 0,
            height: 0,
            distortion_model: default_distortion_model(),
            d: Vec::new(),
            k: [0.0; 9],
            r: [0.0; 9],
            p: [0.0; 12],
        }
    }
}

impl CameraInfo {
    /// Copy of this info carrying a fresh stamp and frame id.
    ///
    /// The stored calibration is never mutated by publishing.
    pub fn stamped(&self, stamp: Time, frame_id: &str) -> Self {
        let mut info = self.clone();
        info.header.stamp = stamp;
        info.header.frame_id = frame_id.to_string();
        info
    }

    /// Whether the camera matrix holds a real focal length rather than the
    /// unit placeholder of an uncalibrated camera.
    pub fn is_calibrated(&self) -> bool {
        self.k[0] > 1.0 && self.k[4] > 1.0
    }
}
