//! Texture and cube map loading

use crate::backend::types::*;
use glam::Vec3;
use image::{DynamicImage, GenericImageView};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TextureError {
    #[error("Failed to decode image '{name}': {reason}")]
    Decode { name: String, reason: String },
    #[error("Cube face {face:?} is {width}x{height}, expected {expected}x{expected}")]
    FaceSize {
        face: CubeFace,
        width: u32,
        height: u32,
        expected: u32,
    },
    #[error("Blur variance must be positive, got {0}")]
    InvalidVariance(f32),
}

/// Loaded texture data, tightly packed RGBA8
#[derive(Debug, Clone, PartialEq)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub data: Vec<u8>,
    pub name: String,
}

impl TextureData {
    /// Load texture from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, TextureError> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        let img = image::open(path).map_err(|e| TextureError::Decode {
            name: name.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self::from_image(img, &name))
    }

    /// Load texture from encoded bytes
    pub fn from_bytes(bytes: &[u8], name: &str) -> Result<Self, TextureError> {
        let img = image::load_from_memory(bytes).map_err(|e| TextureError::Decode {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::from_image(img, name))
    }

    fn from_image(img: DynamicImage, name: &str) -> Self {
        let (width, height) = img.dimensions();
        Self {
            width,
            height,
            format: TextureFormat::Rgba8UnormSrgb,
            data: img.to_rgba8().into_raw(),
            name: name.to_string(),
        }
    }

    /// Create a solid color texture
    pub fn solid_color(width: u32, height: u32, color: [u8; 4], name: &str) -> Self {
        Self {
            width,
            height,
            format: TextureFormat::Rgba8UnormSrgb,
            data: color.repeat((width * height) as usize),
            name: name.to_string(),
        }
    }

    pub fn white() -> Self {
        Self::solid_color(1, 1, [255, 255, 255, 255], "white")
    }

    /// Create a checkerboard texture with 8-pixel cells
    pub fn checkerboard(size: u32, color1: [u8; 4], color2: [u8; 4]) -> Self {
        let mut data = Vec::with_capacity((size * size * 4) as usize);
        for y in 0..size {
            for x in 0..size {
                let is_even = ((x / 8) + (y / 8)) % 2 == 0;
                data.extend_from_slice(if is_even { &color1 } else { &color2 });
            }
        }

        Self {
            width: size,
            height: size,
            format: TextureFormat::Rgba8UnormSrgb,
            data,
            name: "checkerboard".to_string(),
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let offset = ((y * self.width + x) * 4) as usize;
        [
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
            self.data[offset + 3],
        ]
    }

    /// One-dimensional Gaussian pass along x (`horizontal`) or y
    fn convolve(&self, weights: &[f32], horizontal: bool) -> Vec<u8> {
        let half = (weights.len() / 2) as i64;
        let (w, h) = (self.width as i64, self.height as i64);
        let mut out = vec![0u8; self.data.len()];

        for y in 0..h {
            for x in 0..w {
                let mut acc = [0.0f32; 4];
                for (k, weight) in weights.iter().enumerate() {
                    let offset = k as i64 - half;
                    let (sx, sy) = if horizontal {
                        ((x + offset).clamp(0, w - 1), y)
                    } else {
                        (x, (y + offset).clamp(0, h - 1))
                    };
                    let src = ((sy * w + sx) * 4) as usize;
                    for c in 0..4 {
                        acc[c] += self.data[src + c] as f32 * weight;
                    }
                }
                let dst = ((y * w + x) * 4) as usize;
                for c in 0..4 {
                    out[dst + c] = acc[c].round().clamp(0.0, 255.0) as u8;
                }
            }
        }
        out
    }
}

/// Cube map face, in GPU array-layer order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CubeFace {
    PositiveX,
    NegativeX,
    PositiveY,
    NegativeY,
    PositiveZ,
    NegativeZ,
}

impl CubeFace {
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PositiveX,
        CubeFace::NegativeX,
        CubeFace::PositiveY,
        CubeFace::NegativeY,
        CubeFace::PositiveZ,
        CubeFace::NegativeZ,
    ];

    pub fn layer(self) -> u32 {
        self as u32
    }

    /// Direction the face looks along, from the cube center
    pub fn direction(self) -> Vec3 {
        match self {
            CubeFace::PositiveX => Vec3::X,
            CubeFace::NegativeX => Vec3::NEG_X,
            CubeFace::PositiveY => Vec3::Y,
            CubeFace::NegativeY => Vec3::NEG_Y,
            CubeFace::PositiveZ => Vec3::Z,
            CubeFace::NegativeZ => Vec3::NEG_Z,
        }
    }

    /// Up vector of the face's camera in the standard cube map layout
    pub fn up(self) -> Vec3 {
        match self {
            CubeFace::PositiveY => Vec3::Z,
            CubeFace::NegativeY => Vec3::NEG_Z,
            _ => Vec3::NEG_Y,
        }
    }
}

/// Separable Gaussian kernel: `width` taps per axis with the given variance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlurKernel {
    pub width_x: u32,
    pub variance_x: f32,
    pub width_y: u32,
    pub variance_y: f32,
}

impl BlurKernel {
    pub fn uniform(width: u32, variance: f32) -> Self {
        Self {
            width_x: width,
            variance_x: variance,
            width_y: width,
            variance_y: variance,
        }
    }

    /// Normalized weights; even widths are rounded up to the next odd width
    fn weights(width: u32, variance: f32) -> Result<Vec<f32>, TextureError> {
        if variance <= 0.0 || !variance.is_finite() {
            return Err(TextureError::InvalidVariance(variance));
        }
        let half = (width / 2) as i32;
        let raw: Vec<f32> = (-half..=half)
            .map(|k| (-((k * k) as f32) / (2.0 * variance)).exp())
            .collect();
        let sum: f32 = raw.iter().sum();
        Ok(raw.into_iter().map(|w| w / sum).collect())
    }
}

/// Six square faces of equal size, in `CubeFace::ALL` order
#[derive(Debug, Clone, PartialEq)]
pub struct CubeMapData {
    faces: [TextureData; 6],
}

impl CubeMapData {
    pub fn from_faces(faces: [TextureData; 6]) -> Result<Self, TextureError> {
        let expected = faces[0].width;
        for (face, data) in CubeFace::ALL.iter().zip(faces.iter()) {
            if data.width != expected || data.height != expected {
                return Err(TextureError::FaceSize {
                    face: *face,
                    width: data.width,
                    height: data.height,
                    expected,
                });
            }
        }
        Ok(Self { faces })
    }

    /// Load six images in +X, -X, +Y, -Y, +Z, -Z order
    pub fn from_files<P: AsRef<Path>>(paths: [P; 6]) -> Result<Self, TextureError> {
        let [px, nx, py, ny, pz, nz] = paths;
        Self::from_faces([
            TextureData::from_file(px)?,
            TextureData::from_file(nx)?,
            TextureData::from_file(py)?,
            TextureData::from_file(ny)?,
            TextureData::from_file(pz)?,
            TextureData::from_file(nz)?,
        ])
    }

    /// Every face filled with one color
    pub fn solid(size: u32, color: [u8; 4]) -> Self {
        let face = TextureData::solid_color(size, size, color, "environment");
        Self {
            faces: std::array::from_fn(|_| face.clone()),
        }
    }

    pub fn size(&self) -> u32 {
        self.faces[0].width
    }

    pub fn face(&self, face: CubeFace) -> &TextureData {
        &self.faces[face.layer() as usize]
    }

    pub fn positive_x(&self) -> &TextureData {
        self.face(CubeFace::PositiveX)
    }

    pub fn negative_x(&self) -> &TextureData {
        self.face(CubeFace::NegativeX)
    }

    pub fn positive_y(&self) -> &TextureData {
        self.face(CubeFace::PositiveY)
    }

    pub fn negative_y(&self) -> &TextureData {
        self.face(CubeFace::NegativeY)
    }

    pub fn positive_z(&self) -> &TextureData {
        self.face(CubeFace::PositiveZ)
    }

    pub fn negative_z(&self) -> &TextureData {
        self.face(CubeFace::NegativeZ)
    }

    /// Blur every face with a separable Gaussian. Faces are filtered
    /// independently and clamp at their edges.
    pub fn blur(&mut self, kernel: BlurKernel) -> Result<(), TextureError> {
        let weights_x = BlurKernel::weights(kernel.width_x, kernel.variance_x)?;
        let weights_y = BlurKernel::weights(kernel.width_y, kernel.variance_y)?;

        for face in &mut self.faces {
            face.data = face.convolve(&weights_x, true);
            face.data = face.convolve(&weights_y, false);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_weights_are_normalized_and_symmetric() {
        let weights = BlurKernel::weights(5, 2.0).unwrap();
        assert_eq!(weights.len(), 5);
        assert!((weights.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert!((weights[0] - weights[4]).abs() < 1e-7);
        assert!(weights[2] > weights[1]);
    }

    #[test]
    fn test_blur_keeps_solid_faces_unchanged() {
        let mut cube = CubeMapData::solid(8, [40, 80, 120, 255]);
        cube.blur(BlurKernel::uniform(5, 1.5)).unwrap();
        assert_eq!(cube.positive_z().pixel(3, 3), [40, 80, 120, 255]);
        assert_eq!(cube.negative_x().pixel(0, 7), [40, 80, 120, 255]);
    }

    #[test]
    fn test_blur_spreads_a_single_bright_pixel() {
        let mut face = TextureData::solid_color(5, 5, [0, 0, 0, 255], "dot");
        let center = ((2 * 5 + 2) * 4) as usize;
        face.data[center..center + 3].copy_from_slice(&[255, 255, 255]);
        let mut cube = CubeMapData::from_faces(std::array::from_fn(|_| face.clone())).unwrap();

        cube.blur(BlurKernel::uniform(3, 1.0)).unwrap();

        let blurred = cube.positive_x();
        assert!(blurred.pixel(2, 2)[0] < 255);
        assert!(blurred.pixel(1, 2)[0] > 0);
        assert!(blurred.pixel(1, 1)[0] > 0);
        assert_eq!(blurred.pixel(0, 0)[0], 0);
    }

    #[test]
    fn test_mismatched_faces_are_rejected() {
        let mut faces: [TextureData; 6] = std::array::from_fn(|_| TextureData::white());
        faces[4] = TextureData::solid_color(2, 2, [0; 4], "big");
        assert!(matches!(
            CubeMapData::from_faces(faces),
            Err(TextureError::FaceSize {
                face: CubeFace::PositiveZ,
                ..
            })
        ));
    }

    #[test]
    fn test_invalid_variance_is_rejected() {
        let mut cube = CubeMapData::solid(2, [0; 4]);
        assert!(cube.blur(BlurKernel::uniform(3, 0.0)).is_err());
    }
}
