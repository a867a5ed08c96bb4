// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Plane scaling for I420 images.
//!
//! The per-cell [`PreserveAspectScaler`] fits an arbitrary source image into
//! a fixed cell rectangle, preserving the aspect ratio and padding the rest
//! with black bars. One scaler instance lives as long as its cell and reuses
//! its canvas allocation across frames.

use serde::Deserialize;

use crate::{frame::YuvImage, types::Resolution};

/// Interpolation used when resizing planes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    /// Nearest neighbour; fastest, blocky.
    Nearest,
    /// Bilinear interpolation.
    Bilinear,
    /// Area average; best for downscaling.
    #[default]
    Box,
}

/// Fits source frames into one cell rectangle with black padding.
#[derive(Debug)]
pub struct PreserveAspectScaler {
    cell: Resolution,
    filter: FilterMode,
    canvas: YuvImage,
    fitted: Option<FittedRect>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FittedRect {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    source: Resolution,
}

impl PreserveAspectScaler {
    #[must_use]
    pub fn new(cell: Resolution, filter: FilterMode) -> Self {
        Self {
            cell,
            filter,
            canvas: YuvImage::black(cell.width, cell.height),
            fitted: None,
        }
    }

    /// Scale `src` into the cell canvas and return it.
    ///
    /// The canvas is re-blackened only when the fitted rectangle changes,
    /// which happens on the first frame and whenever the source resolution
    /// changes mid-stream.
    pub fn scale(&mut self, src: &YuvImage) -> &YuvImage {
        let rect = self.fit(src.resolution());
        if self.fitted != Some(rect) {
            self.canvas = YuvImage::black(self.cell.width, self.cell.height);
            self.fitted = Some(rect);
        }

        let filter = self.filter;
        let cell_w = self.cell.width;
        let (y, u, v) = self.canvas.planes_mut();
        scale_plane(
            src.y_plane(),
            src.width(),
            src.height(),
            y,
            cell_w,
            rect.x,
            rect.y,
            rect.width,
            rect.height,
            filter,
        );
        scale_plane(
            src.u_plane(),
            src.width() / 2,
            src.height() / 2,
            u,
            cell_w / 2,
            rect.x / 2,
            rect.y / 2,
            rect.width / 2,
            rect.height / 2,
            filter,
        );
        scale_plane(
            src.v_plane(),
            src.width() / 2,
            src.height() / 2,
            v,
            cell_w / 2,
            rect.x / 2,
            rect.y / 2,
            rect.width / 2,
            rect.height / 2,
            filter,
        );

        &self.canvas
    }

    /// Largest even-sized rectangle with the source's aspect ratio that fits
    /// the cell, centered on even offsets so chroma planes stay aligned.
    fn fit(&self, source: Resolution) -> FittedRect {
        let width_ratio = f64::from(self.cell.width) / f64::from(source.width.max(1));
        let height_ratio = f64::from(self.cell.height) / f64::from(source.height.max(1));
        let ratio = width_ratio.min(height_ratio);

        let width = (((f64::from(source.width) * ratio) as u32) & !1).max(2);
        let height = (((f64::from(source.height) * ratio) as u32) & !1).max(2);
        let width = width.min(self.cell.width);
        let height = height.min(self.cell.height);

        FittedRect {
            x: ((self.cell.width - width) / 2) & !1,
            y: ((self.cell.height - height) / 2) & !1,
            width,
            height,
            source,
        }
    }
}

/// Resize one plane into a sub-rectangle of a destination plane.
#[allow(clippy::too_many_arguments)]
fn scale_plane(
    src: &[u8],
    src_w: u32,
    src_h: u32,
    dst: &mut [u8],
    dst_stride: u32,
    dst_x: u32,
    dst_y: u32,
    dst_w: u32,
    dst_h: u32,
    filter: FilterMode,
) {
    if dst_w == 0 || dst_h == 0 || src_w == 0 || src_h == 0 {
        return;
    }
    match filter {
        FilterMode::Nearest => {
            scale_nearest(src, src_w, src_h, dst, dst_stride, dst_x, dst_y, dst_w, dst_h);
        }
        FilterMode::Bilinear => {
            scale_bilinear(src, src_w, src_h, dst, dst_stride, dst_x, dst_y, dst_w, dst_h);
        }
        FilterMode::Box => {
            if dst_w < src_w || dst_h < src_h {
                scale_box(src, src_w, src_h, dst, dst_stride, dst_x, dst_y, dst_w, dst_h);
            } else {
                // Area averaging degenerates when upscaling.
                scale_bilinear(src, src_w, src_h, dst, dst_stride, dst_x, dst_y, dst_w, dst_h);
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn scale_nearest(
    src: &[u8],
    src_w: u32,
    src_h: u32,
    dst: &mut [u8],
    dst_stride: u32,
    dst_x: u32,
    dst_y: u32,
    dst_w: u32,
    dst_h: u32,
) {
    for y in 0..dst_h {
        let sy = (u64::from(y) * u64::from(src_h) / u64::from(dst_h)) as u32;
        let src_row = (sy * src_w) as usize;
        let dst_row = ((dst_y + y) * dst_stride + dst_x) as usize;
        for x in 0..dst_w {
            let sx = (u64::from(x) * u64::from(src_w) / u64::from(dst_w)) as u32;
            dst[dst_row + x as usize] = src[src_row + sx as usize];
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn scale_bilinear(
    src: &[u8],
    src_w: u32,
    src_h: u32,
    dst: &mut [u8],
    dst_stride: u32,
    dst_x: u32,
    dst_y: u32,
    dst_w: u32,
    dst_h: u32,
) {
    // 16.16 fixed point sample positions, pixel centers aligned.
    let x_step = ((u64::from(src_w) << 16) / u64::from(dst_w)) as u32;
    let y_step = ((u64::from(src_h) << 16) / u64::from(dst_h)) as u32;

    for y in 0..dst_h {
        let sy_fp = (y * y_step + y_step / 2).saturating_sub(1 << 15);
        let sy = (sy_fp >> 16).min(src_h - 1);
        let sy1 = (sy + 1).min(src_h - 1);
        let fy = u32::from(sy_fp as u16);
        let row0 = (sy * src_w) as usize;
        let row1 = (sy1 * src_w) as usize;
        let dst_row = ((dst_y + y) * dst_stride + dst_x) as usize;

        for x in 0..dst_w {
            let sx_fp = (x * x_step + x_step / 2).saturating_sub(1 << 15);
            let sx = (sx_fp >> 16).min(src_w - 1);
            let sx1 = (sx + 1).min(src_w - 1);
            let fx = u32::from(sx_fp as u16);

            let p00 = u32::from(src[row0 + sx as usize]);
            let p01 = u32::from(src[row0 + sx1 as usize]);
            let p10 = u32::from(src[row1 + sx as usize]);
            let p11 = u32::from(src[row1 + sx1 as usize]);

            let top = (p00 * (0x1_0000 - fx) + p01 * fx) >> 16;
            let bottom = (p10 * (0x1_0000 - fx) + p11 * fx) >> 16;
            let value = (top * (0x1_0000 - fy) + bottom * fy) >> 16;
            dst[dst_row + x as usize] = value as u8;
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn scale_box(
    src: &[u8],
    src_w: u32,
    src_h: u32,
    dst: &mut [u8],
    dst_stride: u32,
    dst_x: u32,
    dst_y: u32,
    dst_w: u32,
    dst_h: u32,
) {
    for y in 0..dst_h {
        let sy0 = (u64::from(y) * u64::from(src_h) / u64::from(dst_h)) as u32;
        let mut sy1 = (u64::from(y + 1) * u64::from(src_h) / u64::from(dst_h)) as u32;
        if sy1 <= sy0 {
            sy1 = sy0 + 1;
        }
        let dst_row = ((dst_y + y) * dst_stride + dst_x) as usize;

        for x in 0..dst_w {
            let sx0 = (u64::from(x) * u64::from(src_w) / u64::from(dst_w)) as u32;
            let mut sx1 = (u64::from(x + 1) * u64::from(src_w) / u64::from(dst_w)) as u32;
            if sx1 <= sx0 {
                sx1 = sx0 + 1;
            }

            let mut acc = 0u32;
            for sy in sy0..sy1 {
                let row = (sy * src_w) as usize;
                for sx in sx0..sx1 {
                    acc += u32::from(src[row + sx as usize]);
                }
            }
            let count = (sy1 - sy0) * (sx1 - sx0);
            dst[dst_row + x as usize] = (acc / count) as u8;
        }
    }
}
