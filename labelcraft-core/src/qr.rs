//! QR code rasters placed on worksheets as in-memory PNG images

use qrcode::types::QrError;
use qrcode::{Color, EcLevel, QrCode};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::address::CellRef;
use crate::reader::ImageAsset;

const DARK: u8 = 0x00;
const LIGHT: u8 = 0xFF;

/// Largest raster side accepted, in pixels
pub const MAX_QR_PX: u32 = 4096;

#[derive(Debug, Error)]
pub enum QrImageError {
    #[error("payload of {len} bytes cannot be encoded as a QR code: {source}")]
    Encode {
        len: usize,
        #[source]
        source: QrError,
    },
    #[error("QR raster of {size}px cannot hold {modules} modules")]
    TooSmall { size: u32, modules: u32 },
    #[error("QR raster of {size}px exceeds the {max}px limit")]
    TooLarge { size: u32, max: u32 },
    #[error("failed to write QR PNG: {0}")]
    Png(#[from] png::EncodingError),
}

/// Error correction level of rendered codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ErrorCorrection {
    L,
    #[default]
    M,
    Q,
    H,
}

impl From<ErrorCorrection> for EcLevel {
    fn from(level: ErrorCorrection) -> Self {
        match level {
            ErrorCorrection::L => EcLevel::L,
            ErrorCorrection::M => EcLevel::M,
            ErrorCorrection::Q => EcLevel::Q,
            ErrorCorrection::H => EcLevel::H,
        }
    }
}

/// Turns payload text into square grayscale PNG rasters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QrRenderer {
    /// Side of the raster in pixels
    pub size_px: u32,
    /// Quiet zone in modules
    pub margin: u32,
    pub error_correction: ErrorCorrection,
}

impl Default for QrRenderer {
    fn default() -> Self {
        Self {
            size_px: 300,
            margin: 2,
            error_correction: ErrorCorrection::M,
        }
    }
}

impl QrRenderer {
    /// Render `payload` to PNG bytes
    pub fn render(&self, payload: &str) -> Result<Vec<u8>, QrImageError> {
        if self.size_px > MAX_QR_PX {
            return Err(QrImageError::TooLarge {
                size: self.size_px,
                max: MAX_QR_PX,
            });
        }
        let code = QrCode::with_error_correction_level(payload.as_bytes(), self.error_correction.into())
            .map_err(|source| QrImageError::Encode {
                len: payload.len(),
                source,
            })?;

        let width = code.width() as u32;
        let colors = code.to_colors();
        let modules = width + 2 * self.margin;
        if self.size_px < modules {
            return Err(QrImageError::TooSmall {
                size: self.size_px,
                modules,
            });
        }

        // Nearest-neighbour scaling of the module grid onto the raster
        let size = self.size_px;
        let side = size as usize;
        let mut pixels = vec![LIGHT; side * side];
        for y in 0..size {
            let my = (y as u64 * modules as u64 / size as u64) as u32;
            if my < self.margin || my >= self.margin + width {
                continue;
            }
            let row = (my - self.margin) * width;
            for x in 0..size {
                let mx = (x as u64 * modules as u64 / size as u64) as u32;
                if mx < self.margin || mx >= self.margin + width {
                    continue;
                }
                if colors[(row + mx - self.margin) as usize] == Color::Dark {
                    pixels[y as usize * side + x as usize] = DARK;
                }
            }
        }

        encode_grayscale_png(&pixels, size)
    }

    /// Render a batch of placements in parallel. Any failure fails the batch.
    pub fn render_all(&self, requests: &[QrRequest]) -> Result<Vec<ImageAsset>, QrImageError> {
        requests
            .par_iter()
            .map(|request| {
                let png = self.render(&request.payload)?;
                Ok(ImageAsset {
                    anchor: request.anchor,
                    width_px: request.display_px,
                    height_px: request.display_px,
                    png,
                    description: request.payload.clone(),
                })
            })
            .collect()
    }
}

fn encode_grayscale_png(pixels: &[u8], size: u32) -> Result<Vec<u8>, QrImageError> {
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, size, size);
        encoder.set_color(png::ColorType::Grayscale);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(pixels)?;
        writer.finish()?;
    }
    Ok(out)
}

/// A QR code to be placed at a cell with a square display size
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrRequest {
    pub anchor: CellRef,
    pub payload: String,
    pub display_px: u32,
}

impl QrRequest {
    pub fn new(anchor: CellRef, payload: impl Into<String>, display_px: u32) -> Self {
        Self {
            anchor,
            payload: payload.into(),
            display_px,
        }
    }
}
