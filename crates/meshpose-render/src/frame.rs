use thiserror::Error;

/// Error types for frame and mask construction.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The pixel buffer length does not match the stated dimensions.
    #[error("buffer holds {len} pixels but dimensions are {width}x{height}")]
    BufferSizeMismatch {
        /// Length of the supplied buffer.
        len: usize,
        /// Stated width in pixels.
        width: usize,
        /// Stated height in pixels.
        height: usize,
    },
}

/// A floating-point RGB frame with channel values in `[0, 1]`.
///
/// Pixels are stored row-major; the background is black `(0, 0, 0)` so any
/// pixel with a non-zero channel belongs to a rendered surface.
#[derive(Debug, Clone)]
pub struct RgbFrame {
    width: usize,
    height: usize,
    data: Vec<[f32; 3]>,
}

impl RgbFrame {
    /// An all-background frame of the given dimensions.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![[0.0; 3]; width * height],
        }
    }

    /// Frame width in pixels.
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Frame height in pixels.
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Get as reference the row-major pixel buffer.
    pub fn data(&self) -> &[[f32; 3]] {
        &self.data
    }

    /// The color at `(col, row)`.
    #[inline]
    pub fn pixel(&self, col: usize, row: usize) -> [f32; 3] {
        self.data[row * self.width + col]
    }

    /// Overwrite the color at `(col, row)`.
    #[inline]
    pub fn put_pixel(&mut self, col: usize, row: usize, color: [f32; 3]) {
        self.data[row * self.width + col] = color;
    }

    /// Whether the pixel at `(col, row)` carries rendered surface color.
    #[inline]
    pub fn is_foreground(&self, col: usize, row: usize) -> bool {
        self.pixel(col, row).iter().any(|&c| c > 0.0)
    }

    /// Number of foreground pixels in the frame.
    pub fn num_foreground(&self) -> usize {
        self.data
            .iter()
            .filter(|p| p.iter().any(|&c| c > 0.0))
            .count()
    }
}

/// A per-pixel boolean mask over an image, stored row-major.
#[derive(Debug, Clone)]
pub struct BinaryMask {
    width: usize,
    height: usize,
    data: Vec<bool>,
}

impl BinaryMask {
    /// Create a mask from a row-major boolean buffer.
    pub fn new(width: usize, height: usize, data: Vec<bool>) -> Result<Self, FrameError> {
        if data.len() != width * height {
            return Err(FrameError::BufferSizeMismatch {
                len: data.len(),
                width,
                height,
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// An all-set mask covering the full image.
    pub fn full(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![true; width * height],
        }
    }

    /// Build a mask by evaluating a predicate at every `(col, row)`.
    pub fn from_fn(width: usize, height: usize, f: impl Fn(usize, usize) -> bool) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for row in 0..height {
            for col in 0..width {
                data.push(f(col, row));
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// Mask width in pixels.
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Mask height in pixels.
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// The mask value at `(col, row)`.
    #[inline]
    pub fn get(&self, col: usize, row: usize) -> bool {
        self.data[row * self.width + col]
    }

    /// Number of set pixels.
    pub fn num_set(&self) -> usize {
        self.data.iter().filter(|&&b| b).count()
    }

    /// Whether no pixel is set.
    pub fn is_blank(&self) -> bool {
        self.data.iter().all(|&b| !b)
    }
}
