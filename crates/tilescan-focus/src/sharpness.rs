use tilescan_core::GrayImageView;

/// Variance of the 4-neighbor Laplacian response.
///
/// Kernel `[0 1 0; 1 -4 1; 0 1 0]` with reflect-101 borders; the variance is
/// the population variance over every pixel. Higher means more high-frequency
/// detail. Empty images score 0.
pub fn laplacian_variance(img: &GrayImageView<'_>) -> f64 {
    let (w, h) = (img.width, img.height);
    if w == 0 || h == 0 {
        return 0.0;
    }

    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    for y in 0..h {
        let yu = reflect101(y as isize - 1, h);
        let yd = reflect101(y as isize + 1, h);
        for x in 0..w {
            let xl = reflect101(x as isize - 1, w);
            let xr = reflect101(x as isize + 1, w);
            let c = img.get(x, y) as f64;
            let v = img.get(xl, y) as f64
                + img.get(xr, y) as f64
                + img.get(x, yu) as f64
                + img.get(x, yd) as f64
                - 4.0 * c;
            sum += v;
            sum_sq += v * v;
        }
    }

    let n = (w * h) as f64;
    let mean = sum / n;
    (sum_sq / n - mean * mean).max(0.0)
}

/// Mirror an out-of-range index without repeating the edge pixel.
#[inline]
fn reflect101(i: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let last = len as isize - 1;
    let mut i = i;
    if i < 0 {
        i = -i;
    }
    if i > last {
        i = 2 * last - i;
    }
    i.clamp(0, last) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use tilescan_core::{box_blur, GrayImage};

    fn checker(w: usize, h: usize, cell: usize) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| {
            if ((x / cell) + (y / cell)) % 2 == 0 {
                230
            } else {
                20
            }
        })
    }

    #[test]
    fn flat_image_scores_zero() {
        let img = GrayImage::from_fn(16, 9, |_, _| 128);
        assert_eq!(laplacian_variance(&img.view()), 0.0);
    }

    #[test]
    fn sharp_beats_blurred() {
        let sharp = checker(64, 48, 4);
        let blurred = box_blur(&sharp.view(), 2);
        let s = laplacian_variance(&sharp.view());
        let b = laplacian_variance(&blurred.view());
        assert!(s > b, "sharp {s} should exceed blurred {b}");
        let more_blurred = box_blur(&blurred.view(), 2);
        assert!(b > laplacian_variance(&more_blurred.view()));
    }

    #[test]
    fn reflect101_mirrors_without_edge_repeat() {
        assert_eq!(reflect101(-1, 5), 1);
        assert_eq!(reflect101(5, 5), 3);
        assert_eq!(reflect101(2, 5), 2);
        assert_eq!(reflect101(-1, 1), 0);
    }
}
