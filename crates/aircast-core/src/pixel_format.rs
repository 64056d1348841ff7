// crates/aircast-core/src/pixel_format.rs
//
// Pixel format tags and plane layout descriptions.
//
// A `PixelFormatDesc` is the contract between a producer filling buffers
// and the image mixer reading them: one `Plane` per image buffer, with the
// byte layout fully determined by (width, height, stride).

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    Gray,
    Bgra,
    Rgba,
    Argb,
    Abgr,
    Ycbcr,
    Ycbcra,
    Luma,
    Bgr,
    Rgb,
    Uyvy,
    Invalid,
}

impl PixelFormat {
    /// True for formats that carry an alpha channel.
    pub fn has_alpha(self) -> bool {
        matches!(
            self,
            PixelFormat::Bgra | PixelFormat::Rgba | PixelFormat::Argb | PixelFormat::Abgr | PixelFormat::Ycbcra
        )
    }
}

/// One image plane: `stride` is bytes per pixel, `linesize` bytes per row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plane {
    pub width:    usize,
    pub height:   usize,
    pub stride:   usize,
    pub linesize: usize,
    pub size:     usize,
}

impl Plane {
    pub fn new(width: usize, height: usize, stride: usize) -> Self {
        Self {
            width,
            height,
            stride,
            linesize: width * stride,
            size: width * height * stride,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelFormatDesc {
    pub format: PixelFormat,
    pub planes: Vec<Plane>,
}

impl PixelFormatDesc {
    pub fn new(format: PixelFormat) -> Self {
        Self { format, planes: Vec::new() }
    }

    /// Single-plane BGRA descriptor — the mixer's output format.
    pub fn bgra(width: usize, height: usize) -> Self {
        let mut desc = Self::new(PixelFormat::Bgra);
        desc.planes.push(Plane::new(width, height, 4));
        desc
    }

    pub fn is_valid(&self) -> bool {
        self.format != PixelFormat::Invalid
    }
}

impl Default for PixelFormatDesc {
    fn default() -> Self {
        Self::new(PixelFormat::Invalid)
    }
}
