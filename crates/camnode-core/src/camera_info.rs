//! Calibration YAML — the on-disk format written by calibration tools.
//!
//! ```yaml
//! camera_name: left
//! image_width: 640
//! image_height: 480
//! camera_matrix: {rows: 3, cols: 3, data: [...]}
//! distortion_model: plumb_bob
//! distortion_coefficients: {rows: 1, cols: 5, data: [...]}
//! rectification_matrix: {rows: 3, cols: 3, data: [...]}
//! projection_matrix: {rows: 3, cols: 4, data: [...]}
//! ```

use crate::types::{CameraInfo, Header, IDENTITY_3X3, PLUMB_BOB};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Resolution assumed when the device does not report one.
pub const FALLBACK_WIDTH: u32 = 640;
pub const FALLBACK_HEIGHT: u32 = 480;

#[derive(Error, Debug)]
pub enum CameraInfoError {
    #[error("camera info file not found: {0}")]
    NotFound(String),
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid calibration YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("{name} must have {expected} values, got {actual}")]
    InvalidMatrix {
        name: &'static str,
        expected: usize,
        actual: usize,
    },
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Matrix {
    #[serde(default)]
    rows: u32,
    #[serde(default)]
    cols: u32,
    #[serde(default)]
    data: Vec<f64>,
}

impl Matrix {
    fn new(rows: u32, cols: u32, data: &[f64]) -> Self {
        Self {
            rows,
            cols,
            data: data.to_vec(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CalibrationFile {
    #[serde(default)]
    camera_name: String,
    #[serde(default)]
    image_width: u32,
    #[serde(default)]
    image_height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    camera_matrix: Option<Matrix>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    distortion_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    distortion_coefficients: Option<Matrix>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rectification_matrix: Option<Matrix>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    projection_matrix: Option<Matrix>,
}

/// Copy a matrix section into a fixed-size array. A missing section reads as zeros.
fn fixed<const N: usize>(
    name: &'static str,
    matrix: Option<&Matrix>,
) -> Result<[f64; N], CameraInfoError> {
    let Some(m) = matrix else {
        return Ok([0.0; N]);
    };
    m.data
        .as_slice()
        .try_into()
        .map_err(|_| CameraInfoError::InvalidMatrix {
            name,
            expected: N,
            actual: m.data.len(),
        })
}

/// Parse calibration YAML text into a `CameraInfo`.
///
/// `camera_name` lands in `header.frame_id`; the caller decides whether to
/// keep it.
pub fn parse_camera_info(yaml: &str) -> Result<CameraInfo, CameraInfoError> {
    let file: CalibrationFile = serde_yaml::from_str(yaml)?;

    Ok(CameraInfo {
        header: Header {
            frame_id: file.camera_name,
            ..Header::default()
        },
        width: file.image_width,
        height: file.image_height,
        distortion_model: file
            .distortion_model
            .unwrap_or_else(|| PLUMB_BOB.to_string()),
        d: file
            .distortion_coefficients
            .map(|m| m.data)
            .unwrap_or_default(),
        k: fixed("camera_matrix", file.camera_matrix.as_ref())?,
        r: fixed("rectification_matrix", file.rectification_matrix.as_ref())?,
        p: fixed("projection_matrix", file.projection_matrix.as_ref())?,
    })
}

/// Load a calibration YAML file.
pub fn load_camera_info(path: &Path) -> Result<CameraInfo, CameraInfoError> {
    if !path.exists() {
        return Err(CameraInfoError::NotFound(path.display().to_string()));
    }
    let text = std::fs::read_to_string(path).map_err(|source| CameraInfoError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_camera_info(&text)
}

/// Render a `CameraInfo` as calibration YAML.
///
/// The camera name falls back to the header frame id, then to `"camera"`.
/// An all-zero rectification matrix is written as identity.
pub fn render_camera_info(info: &CameraInfo, camera_name: &str) -> Result<String, CameraInfoError> {
    let camera_name = [camera_name, info.header.frame_id.as_str()]
        .into_iter()
        .find(|s| !s.is_empty())
        .unwrap_or("camera")
        .to_string();

    let r = if info.r.iter().all(|&v| v == 0.0) {
        IDENTITY_3X3
    } else {
        info.r
    };

    let file = CalibrationFile {
        camera_name,
        image_width: info.width,
        image_height: info.height,
        camera_matrix: Some(Matrix::new(3, 3, &info.k)),
        distortion_model: Some(info.distortion_model.clone()),
        distortion_coefficients: Some(Matrix::new(1, info.d.len() as u32, &info.d)),
        rectification_matrix: Some(Matrix::new(3, 3, &r)),
        projection_matrix: Some(Matrix::new(3, 4, &info.p)),
    };
    Ok(serde_yaml::to_string(&file)?)
}

/// Write a calibration YAML file, creating parent directories as needed.
///
/// Returns the path written.
pub fn save_camera_info(
    info: &CameraInfo,
    path: &Path,
    camera_name: &str,
) -> Result<PathBuf, CameraInfoError> {
    let io_err = |source| CameraInfoError::Io {
        path: path.display().to_string(),
        source,
    };

    let yaml = render_camera_info(info, camera_name)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    std::fs::write(path, yaml).map_err(io_err)?;

    tracing::debug!(path = %path.display(), "wrote calibration file");
    Ok(path.to_path_buf())
}

/// Placeholder calibration used until a calibration tool provides one.
///
/// Unit focal length with the principal point at the image centre, no
/// distortion, identity rectification. Zero dimensions fall back to 640x480.
pub fn default_camera_info(width: u32, height: u32, frame_id: &str) -> CameraInfo {
    let w = if width == 0 { FALLBACK_WIDTH } else { width };
    let h = if height == 0 { FALLBACK_HEIGHT } else { height };
    let cx = w as f64 / 2.0;
    let cy = h as f64 / 2.0;

    CameraInfo {
        header: Header {
            frame_id: frame_id.to_string(),
            ..Header::default()
        },
        width: w,
        height: h,
        distortion_model: PLUMB_BOB.to_string(),
        d: Vec::new(),
        k: [1.0, 0.0, cx, 0.0, 1.0, cy, 0.0, 0.0, 1.0],
        r: IDENTITY_3X3,
        p: [1.0, 0.0, cx, 0.0, 0.0, 1.0, cy, 0.0, 0.0, 0.0, 1.0, 0.0],
    }
}
