//! 8-bit grayscale rasters and sampling helpers.

#[derive(Clone, Copy, Debug)]
pub struct GrayImageView<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [u8], // row-major, len = w*h
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrayImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl GrayImage {
    /// Black image of the given size.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0u8; width * height],
        }
    }

    /// Wrap a row-major buffer. Returns `None` if the length does not match.
    pub fn from_raw(width: usize, height: usize, data: Vec<u8>) -> Option<Self> {
        if width.checked_mul(height)? != data.len() {
            return None;
        }
        Some(Self {
            width,
            height,
            data,
        })
    }

    /// Build an image by evaluating `f(x, y)` for every pixel.
    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> u8) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    #[inline]
    pub fn view(&self) -> GrayImageView<'_> {
        GrayImageView {
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, v: u8) {
        self.data[y * self.width + x] = v;
    }

    #[inline]
    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }
}

impl GrayImageView<'_> {
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }

    /// Copy a sub-rectangle. Pixels falling outside the source are black.
    pub fn crop(&self, x0: i64, y0: i64, width: usize, height: usize) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            get_gray(self, (x0 + x as i64) as i32, (y0 + y as i64) as i32)
        })
    }

    pub fn to_owned_image(&self) -> GrayImage {
        GrayImage {
            width: self.width,
            height: self.height,
            data: self.data.to_vec(),
        }
    }
}

#[inline]
fn get_gray(src: &GrayImageView<'_>, x: i32, y: i32) -> u8 {
    if x < 0 || y < 0 || x >= src.width as i32 || y >= src.height as i32 {
        return 0;
    }
    src.data[y as usize * src.width + x as usize]
}

#[inline]
pub fn sample_bilinear(src: &GrayImageView<'_>, x: f32, y: f32) -> f32 {
    let x0 = x.floor() as i32;
    let y0 = y.floor() as i32;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = get_gray(src, x0, y0) as f32;
    let p10 = get_gray(src, x0 + 1, y0) as f32;
    let p01 = get_gray(src, x0, y0 + 1) as f32;
    let p11 = get_gray(src, x0 + 1, y0 + 1) as f32;

    let a = p00 + fx * (p10 - p00);
    let b = p01 + fx * (p11 - p01);
    a + fy * (b - a)
}

#[inline]
pub fn sample_bilinear_u8(src: &GrayImageView<'_>, x: f32, y: f32) -> u8 {
    sample_bilinear(src, x, y).clamp(0.0, 255.0).round() as u8
}

/// Bilinear sample that refuses to read outside the pixel grid.
///
/// Valid sample positions are `[0, width - 1] x [0, height - 1]`; anything
/// else is transparent and yields `None`.
#[inline]
pub fn sample_bilinear_inside(src: &GrayImageView<'_>, x: f32, y: f32) -> Option<u8> {
    let max_x = src.width.checked_sub(1)? as f32;
    let max_y = src.height.checked_sub(1)? as f32;
    if !(0.0..=max_x).contains(&x) || !(0.0..=max_y).contains(&y) {
        return None;
    }
    Some(sample_bilinear_u8(src, x, y))
}

/// Separable box blur with clamped borders; `radius == 0` copies the input.
pub fn box_blur(src: &GrayImageView<'_>, radius: usize) -> GrayImage {
    if radius == 0 || src.width == 0 || src.height == 0 {
        return src.to_owned_image();
    }
    let (w, h) = (src.width, src.height);
    let r = radius as i64;
    let norm = (2 * radius + 1) as u32;

    let mut tmp = vec![0u8; w * h];
    for y in 0..h {
        let row = &src.data[y * w..(y + 1) * w];
        for x in 0..w {
            let mut acc = 0u32;
            for k in -r..=r {
                let xi = (x as i64 + k).clamp(0, w as i64 - 1) as usize;
                acc += row[xi] as u32;
            }
            tmp[y * w + x] = ((acc + norm / 2) / norm) as u8;
        }
    }

    let mut out = vec![0u8; w * h];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0u32;
            for k in -r..=r {
                let yi = (y as i64 + k).clamp(0, h as i64 - 1) as usize;
                acc += tmp[yi * w + x] as u32;
            }
            out[y * w + x] = ((acc + norm / 2) / norm) as u8;
        }
    }

    GrayImage {
        width: w,
        height: h,
        data: out,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_raw_rejects_wrong_length() {
        assert!(GrayImage::from_raw(4, 4, vec![0; 15]).is_none());
        assert!(GrayImage::from_raw(4, 4, vec![0; 16]).is_some());
    }

    #[test]
    fn crop_pads_outside_with_black() {
        let img = GrayImage::from_fn(4, 4, |_, _| 200);
        let c = img.view().crop(-1, -1, 3, 3);
        assert_eq!(c.get(0, 0), 0);
        assert_eq!(c.get(1, 1), 200);
        assert_eq!(c.get(2, 2), 200);
    }

    #[test]
    fn sample_inside_rejects_out_of_grid_points() {
        let img = GrayImage::from_fn(3, 3, |x, _| (x * 100) as u8);
        let v = img.view();
        assert_eq!(sample_bilinear_inside(&v, 0.5, 1.0), Some(50));
        assert_eq!(sample_bilinear_inside(&v, 2.0, 2.0), Some(200));
        assert_eq!(sample_bilinear_inside(&v, 2.01, 0.0), None);
        assert_eq!(sample_bilinear_inside(&v, -0.1, 0.0), None);
    }

    #[test]
    fn box_blur_preserves_flat_images() {
        let img = GrayImage::from_fn(7, 5, |_, _| 42);
        let b = box_blur(&img.view(), 2);
        assert!(b.data.iter().all(|&v| v == 42));
    }
}
