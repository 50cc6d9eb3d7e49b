// SPDX-License-Identifier: GPL-3.0-only

//! QR decoding of luma frames
//!
//! Platforms hand this module an 8-bit luma plane. The scan region is cropped
//! out (removing stride padding), downscaled for speed, and searched with
//! rqrr. Decoding runs on the capture thread, never on the async runtime.

use crate::backends::camera::ScanRegion;
use crate::constants::DECODE_MAX_DIMENSION;
use tracing::{debug, trace};

/// Borrowed 8-bit luma plane
#[derive(Debug, Clone, Copy)]
pub struct LumaFrame<'a> {
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
    /// Bytes per row; at least `width`
    pub stride: u32,
}

impl<'a> LumaFrame<'a> {
    /// Tightly packed frame (stride == width)
    pub fn packed(data: &'a [u8], width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
            stride: width,
        }
    }
}

/// QR decoder
///
/// Optimized for real-time processing with region cropping and downscaling.
#[derive(Debug, Clone)]
pub struct QrDecoder {
    /// Maximum dimension for processing (regions are downscaled to this)
    max_dimension: u32,
    /// Region decoded out of each frame; `None` decodes the full frame
    region: Option<ScanRegion>,
}

impl Default for QrDecoder {
    fn default() -> Self {
        Self::new(None)
    }
}

impl QrDecoder {
    pub fn new(region: Option<ScanRegion>) -> Self {
        Self {
            max_dimension: DECODE_MAX_DIMENSION,
            region,
        }
    }

    /// Create a decoder with custom max dimension
    pub fn with_max_dimension(mut self, max_dimension: u32) -> Self {
        self.max_dimension = max_dimension.max(1);
        self
    }

    /// Decode every QR code found in the frame
    ///
    /// Returns decoded payloads; an empty list means nothing readable was in view.
    pub fn decode(&self, frame: &LumaFrame<'_>) -> Vec<String> {
        let start = std::time::Instant::now();

        let (x, y, width, height) = match self.region {
            Some(region) => region.centered_in(frame.width, frame.height),
            None => (0, 0, frame.width, frame.height),
        };
        if width == 0 || height == 0 {
            return Vec::new();
        }

        let cropped = crop_luma(frame, x, y, width, height);

        let (pixels, proc_width, proc_height) = if width > self.max_dimension || height > self.max_dimension {
            let scale = (width as f32 / self.max_dimension as f32)
                .max(height as f32 / self.max_dimension as f32);
            let new_width = ((width as f32 / scale) as u32).max(1);
            let new_height = ((height as f32 / scale) as u32).max(1);
            let packed = LumaFrame::packed(&cropped, width, height);
            (downscale_luma(&packed, new_width, new_height), new_width, new_height)
        } else {
            (cropped, width, height)
        };

        trace!(
            proc_width,
            proc_height,
            prepare_ms = start.elapsed().as_millis() as u64,
            "Prepared luma region for decoding"
        );

        let row = proc_width as usize;
        let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
            proc_width as usize,
            proc_height as usize,
            |px, py| pixels.get(py * row + px).copied().unwrap_or(0),
        );

        let mut payloads = Vec::new();
        for grid in prepared.detect_grids() {
            match grid.decode() {
                Ok((_meta, content)) => {
                    debug!(content = %content, "Decoded QR code");
                    payloads.push(content);
                }
                Err(e) => debug!(error = %e, "Failed to decode QR grid"),
            }
        }

        trace!(
            count = payloads.len(),
            total_ms = start.elapsed().as_millis() as u64,
            "QR decode pass complete"
        );

        payloads
    }
}

/// Copy a rectangle out of a luma plane without stride padding
pub fn crop_luma(frame: &LumaFrame<'_>, x: u32, y: u32, width: u32, height: u32) -> Vec<u8> {
    let stride = frame.stride as usize;
    let x = x as usize;
    let width = width as usize;

    let mut result = Vec::with_capacity(width * height as usize);

    for row in y as usize..(y + height) as usize {
        let row_start = row * stride + x;
        let row_end = row_start + width;
        if row_end <= frame.data.len() {
            result.extend_from_slice(&frame.data[row_start..row_end]);
        } else {
            result.resize(result.len() + width, 0);
        }
    }

    result
}

/// Downscale a luma plane using bilinear interpolation
pub fn downscale_luma(frame: &LumaFrame<'_>, dst_width: u32, dst_height: u32) -> Vec<u8> {
    let src_width = frame.width as usize;
    let src_height = frame.height as usize;
    let stride = frame.stride as usize;

    let mut result = Vec::with_capacity((dst_width * dst_height) as usize);

    let x_ratio = src_width as f32 / dst_width as f32;
    let y_ratio = src_height as f32 / dst_height as f32;

    let get_pixel = |px: usize, py: usize| -> f32 {
        frame.data.get(py * stride + px).copied().unwrap_or(0) as f32
    };

    for y in 0..dst_height {
        for x in 0..dst_width {
            let src_x = x as f32 * x_ratio;
            let src_y = y as f32 * y_ratio;

            let x0 = src_x as usize;
            let y0 = src_y as usize;
            let x1 = (x0 + 1).min(src_width - 1);
            let y1 = (y0 + 1).min(src_height - 1);

            let x_frac = src_x - x0 as f32;
            let y_frac = src_y - y0 as f32;

            let value = get_pixel(x0, y0) * (1.0 - x_frac) * (1.0 - y_frac)
                + get_pixel(x1, y0) * x_frac * (1.0 - y_frac)
                + get_pixel(x0, y1) * (1.0 - x_frac) * y_frac
                + get_pixel(x1, y1) * x_frac * y_frac;

            result.push(value as u8);
        }
    }

    result
}

/// Extract the luma channel from a packed YUYV (YUV 4:2:2) buffer
pub fn yuyv_to_luma(data: &[u8], width: u32, height: u32) -> Vec<u8> {
    let pixels = (width * height) as usize;
    data.iter().step_by(2).take(pixels).copied().collect()
}
