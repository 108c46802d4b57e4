//! Frame type and pixel conversion to packed BGR.

/// A captured camera frame in packed `bgr8` (3 bytes/pixel, row-major).
#[derive(Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub sequence: u32,
    pub timestamp: std::time::Instant,
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("decoded size {actual_width}x{actual_height} does not match {width}x{height}")]
    SizeMismatch {
        width: u32,
        height: u32,
        actual_width: u32,
        actual_height: u32,
    },
    #[error("decode failed: {0}")]
    Decode(#[from] image::ImageError),
}

fn check_len(buf: &[u8], expected: usize) -> Result<(), FrameError> {
    if buf.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: buf.len(),
        });
    }
    Ok(())
}

#[inline]
fn clamp_u8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

/// BT.601 studio-range YCbCr to BGR, fixed point.
#[inline]
fn ycbcr_to_bgr(y: u8, u: u8, v: u8, out: &mut Vec<u8>) {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    out.push(clamp_u8((298 * c + 516 * d + 128) >> 8));
    out.push(clamp_u8((298 * c - 100 * d - 208 * e + 128) >> 8));
    out.push(clamp_u8((298 * c + 409 * e + 128) >> 8));
}

/// Convert packed YUYV (4:2:2) to BGR.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; both pixels share
/// the chroma pair.
pub fn yuyv_to_bgr8(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let pixels = (width * height) as usize;
    check_len(yuyv, pixels * 2)?;

    let mut bgr = Vec::with_capacity(pixels * 3);
    for chunk in yuyv[..pixels * 2].chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        ycbcr_to_bgr(y0, u, v, &mut bgr);
        ycbcr_to_bgr(y1, u, v, &mut bgr);
    }
    // Odd pixel count: last half-macropixel has no V byte.
    if pixels % 2 == 1 {
        let tail = &yuyv[(pixels - 1) * 2..];
        ycbcr_to_bgr(tail[0], tail[1], 128, &mut bgr);
    }
    Ok(bgr)
}

/// Replicate 8-bit grayscale into three channels.
pub fn grey_to_bgr8(grey: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let pixels = (width * height) as usize;
    check_len(grey, pixels)?;
    Ok(grey[..pixels].iter().flat_map(|&g| [g, g, g]).collect())
}

/// Swap packed RGB to BGR.
pub fn rgb_to_bgr8(rgb: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 3) as usize;
    check_len(rgb, expected)?;
    Ok(rgb[..expected]
        .chunks_exact(3)
        .flat_map(|px| [px[2], px[1], px[0]])
        .collect())
}

/// Decode a Motion-JPEG buffer to BGR.
pub fn mjpeg_to_bgr8(jpeg: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let rgb = image::load_from_memory_with_format(jpeg, image::ImageFormat::Jpeg)?.to_rgb8();
    if rgb.width() != width || rgb.height() != height {
        return Err(FrameError::SizeMismatch {
            width,
            height,
            actual_width: rgb.width(),
            actual_height: rgb.height(),
        });
    }
    rgb_to_bgr8(rgb.as_raw(), width, height)
}
