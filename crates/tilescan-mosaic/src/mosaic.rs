use nalgebra::Vector3;
use tilescan_core::{sample_bilinear_inside, GrayImage, GrayImageView, Homography};

/// Fixed-size composite canvas laid out as a `columns x rows` grid of
/// `tile_width x tile_height` cells.
///
/// The canvas never grows; warped content that falls outside is clipped.
/// Every written pixel is marked in an occupancy mask.
#[derive(Clone, Debug)]
pub struct Mosaic {
    canvas: GrayImage,
    occupied: Vec<bool>,
    columns: usize,
    rows: usize,
    tile_width: usize,
    tile_height: usize,
}

impl Mosaic {
    pub fn new(columns: usize, rows: usize, tile_width: usize, tile_height: usize) -> Self {
        Self {
            canvas: GrayImage::new(columns * tile_width, rows * tile_height),
            occupied: vec![false; columns * tile_width * rows * tile_height],
            columns,
            rows,
            tile_width,
            tile_height,
        }
    }

    pub fn canvas(&self) -> &GrayImage {
        &self.canvas
    }

    pub fn into_canvas(self) -> GrayImage {
        self.canvas
    }

    pub fn grid_size(&self) -> (usize, usize) {
        (self.columns, self.rows)
    }

    pub fn tile_size(&self) -> (usize, usize) {
        (self.tile_width, self.tile_height)
    }

    pub fn is_occupied(&self, x: usize, y: usize) -> bool {
        x < self.canvas.width && y < self.canvas.height && self.occupied[y * self.canvas.width + x]
    }

    /// Fraction of canvas pixels written so far.
    pub fn coverage(&self) -> f64 {
        if self.occupied.is_empty() {
            return 0.0;
        }
        self.occupied.iter().filter(|&&o| o).count() as f64 / self.occupied.len() as f64
    }

    /// Top-left canvas pixel of a grid cell.
    pub fn cell_origin(&self, column: usize, row: usize) -> (usize, usize) {
        (column * self.tile_width, row * self.tile_height)
    }

    /// Copy a tile into its cell, overwriting whatever was there.
    pub(crate) fn paste(&mut self, tile: &GrayImageView<'_>, column: usize, row: usize) {
        let (x0, y0) = self.cell_origin(column, row);
        let cw = self.canvas.width;
        let w = tile.width.min(cw.saturating_sub(x0));
        let h = tile.height.min(self.canvas.height.saturating_sub(y0));
        for y in 0..h {
            let src = &tile.data[y * tile.width..y * tile.width + w];
            let dst_start = (y0 + y) * cw + x0;
            self.canvas.data[dst_start..dst_start + w].copy_from_slice(src);
            self.occupied[dst_start..dst_start + w].fill(true);
        }
    }

    /// Warp `tile` through `canvas_from_tile` and write every canvas pixel
    /// whose preimage lies inside the tile. Pixels outside the footprint keep
    /// their current value. Returns the number of pixels written.
    pub(crate) fn warp_into(
        &mut self,
        tile: &GrayImageView<'_>,
        canvas_from_tile: &Homography,
    ) -> usize {
        let Some(tile_from_canvas) = canvas_from_tile.inverse() else {
            return 0;
        };
        let Some((x0, y0, x1, y1)) = self.footprint((tile.width, tile.height), canvas_from_tile)
        else {
            return 0;
        };

        let m = tile_from_canvas.h;
        let cw = self.canvas.width;
        let mut written = 0;
        for y in y0..y1 {
            for x in x0..x1 {
                let v = m * Vector3::new(x as f64, y as f64, 1.0);
                if v[2].abs() < 1e-12 {
                    continue;
                }
                let (sx, sy) = ((v[0] / v[2]) as f32, (v[1] / v[2]) as f32);
                if let Some(px) = sample_bilinear_inside(tile, sx, sy) {
                    self.canvas.data[y * cw + x] = px;
                    self.occupied[y * cw + x] = true;
                    written += 1;
                }
            }
        }
        written
    }

    /// Whether a tile of `tile_size` warped through `canvas_from_tile` keeps
    /// all four corners in front of the projection (`w > 0`) and overlaps
    /// the canvas.
    pub fn lands_on_canvas(&self, tile_size: (usize, usize), canvas_from_tile: &Homography) -> bool {
        self.footprint(tile_size, canvas_from_tile).is_some()
    }

    /// Canvas bounding box `[x0, x1) x [y0, y1)` of the warped tile, clipped.
    fn footprint(
        &self,
        (width, height): (usize, usize),
        canvas_from_tile: &Homography,
    ) -> Option<(usize, usize, usize, usize)> {
        if width == 0 || height == 0 {
            return None;
        }
        let (tw, th) = (width as f64 - 1.0, height as f64 - 1.0);
        let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
        let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for (cx, cy) in [(0.0, 0.0), (tw, 0.0), (tw, th), (0.0, th)] {
            let v = canvas_from_tile.h * Vector3::new(cx, cy, 1.0);
            if v[2] <= 1e-12 {
                return None;
            }
            let (px, py) = (v[0] / v[2], v[1] / v[2]);
            min_x = min_x.min(px);
            min_y = min_y.min(py);
            max_x = max_x.max(px);
            max_y = max_y.max(py);
        }
        let clip = |v: f64, hi: usize| v.clamp(0.0, hi as f64) as usize;
        let x0 = clip(min_x.floor(), self.canvas.width);
        let y0 = clip(min_y.floor(), self.canvas.height);
        let x1 = clip(max_x.ceil() + 1.0, self.canvas.width);
        let y1 = clip(max_y.ceil() + 1.0, self.canvas.height);
        (x0 < x1 && y0 < y1).then_some((x0, y0, x1, y1))
    }
}
