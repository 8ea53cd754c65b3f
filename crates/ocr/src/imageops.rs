//! Pure geometric transforms over `PixelBuffer`. Both the offload worker
//! and the same-thread fallback call these exact functions, so the two
//! paths produce bit-identical results.

use image::{imageops, imageops::FilterType, RgbaImage};
use ryoshu_core::{PixelBuffer, Rect};

use crate::infer::Tensor;

/// Fixed square side of the detection model input.
pub const DETECTION_SIDE: u32 = 640;
/// Recognition model input height and maximum width.
pub const RECOGNITION_HEIGHT: u32 = 32;
pub const RECOGNITION_MAX_WIDTH: u32 = 320;

fn to_rgba_image(buf: &PixelBuffer) -> RgbaImage {
    RgbaImage::from_raw(buf.width(), buf.height(), buf.data().to_vec())
        .expect("PixelBuffer guarantees len == w*h*4")
}

fn from_rgba_image(img: RgbaImage) -> PixelBuffer {
    let (w, h) = img.dimensions();
    PixelBuffer::new(w, h, img.into_raw()).expect("RgbaImage guarantees len == w*h*4")
}

/// Crop to `rect`, clamped to the buffer bounds. Degenerate rects collapse
/// to a 1x1 crop rather than failing.
pub fn crop(buf: &PixelBuffer, rect: Rect) -> PixelBuffer {
    let x0 = (rect.x.max(0.0) as u32).min(buf.width() - 1);
    let y0 = (rect.y.max(0.0) as u32).min(buf.height() - 1);
    let x1 = (rect.right().ceil() as u32).clamp(x0 + 1, buf.width());
    let y1 = (rect.bottom().ceil() as u32).clamp(y0 + 1, buf.height());

    let img = to_rgba_image(buf);
    let view = imageops::crop_imm(&img, x0, y0, x1 - x0, y1 - y0);
    from_rgba_image(view.to_image())
}

/// Bilinear resize to exactly `width` x `height`.
pub fn resize(buf: &PixelBuffer, width: u32, height: u32) -> PixelBuffer {
    let width = width.max(1);
    let height = height.max(1);
    let img = to_rgba_image(buf);
    from_rgba_image(imageops::resize(&img, width, height, FilterType::Triangle))
}

/// Bilinear sample at fractional coordinates, clamped to the image edge.
fn sample_bilinear(buf: &PixelBuffer, x: f32, y: f32) -> [u8; 4] {
    let max_x = (buf.width() - 1) as f32;
    let max_y = (buf.height() - 1) as f32;
    let x = x.clamp(0.0, max_x);
    let y = y.clamp(0.0, max_y);

    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(buf.width() - 1);
    let y1 = (y0 + 1).min(buf.height() - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = buf.pixel(x0, y0);
    let p10 = buf.pixel(x1, y0);
    let p01 = buf.pixel(x0, y1);
    let p11 = buf.pixel(x1, y1);

    let mut out = [0u8; 4];
    for c in 0..4 {
        let top = p00[c] as f32 * (1.0 - fx) + p10[c] as f32 * fx;
        let bottom = p01[c] as f32 * (1.0 - fx) + p11[c] as f32 * fx;
        out[c] = (top * (1.0 - fy) + bottom * fy).round() as u8;
    }
    out
}

/// Map a source quad (corners in order top-left, top-right, bottom-right,
/// bottom-left) onto an axis-aligned `out_w` x `out_h` output by inverse
/// bilinear sampling. Used to deskew receipt photos.
pub fn perspective_warp(
    buf: &PixelBuffer,
    quad: [(f32, f32); 4],
    out_w: u32,
    out_h: u32,
) -> PixelBuffer {
    let out_w = out_w.max(1);
    let out_h = out_h.max(1);
    let [tl, tr, br, bl] = quad;

    let mut data = Vec::with_capacity(out_w as usize * out_h as usize * 4);
    for oy in 0..out_h {
        let v = if out_h == 1 { 0.0 } else { oy as f32 / (out_h - 1) as f32 };
        for ox in 0..out_w {
            let u = if out_w == 1 { 0.0 } else { ox as f32 / (out_w - 1) as f32 };
            let top = (tl.0 + (tr.0 - tl.0) * u, tl.1 + (tr.1 - tl.1) * u);
            let bottom = (bl.0 + (br.0 - bl.0) * u, bl.1 + (br.1 - bl.1) * u);
            let sx = top.0 + (bottom.0 - top.0) * v;
            let sy = top.1 + (bottom.1 - top.1) * v;
            data.extend_from_slice(&sample_bilinear(buf, sx, sy));
        }
    }
    PixelBuffer::new(out_w, out_h, data).expect("constructed to size")
}

/// Convert RGBA bytes to a `[1, 3, height, width]` float tensor, dropping
/// alpha and scaling to `[0, 1]`.
fn to_nchw(buf: &PixelBuffer, width: u32, height: u32) -> Tensor {
    let plane = width as usize * height as usize;
    let mut data = vec![0.0f32; 3 * plane];
    for y in 0..height.min(buf.height()) {
        for x in 0..width.min(buf.width()) {
            let px = buf.pixel(x, y);
            let i = y as usize * width as usize + x as usize;
            data[i] = px[0] as f32 / 255.0;
            data[plane + i] = px[1] as f32 / 255.0;
            data[2 * plane + i] = px[2] as f32 / 255.0;
        }
    }
    Tensor::new(vec![1, 3, height as usize, width as usize], data)
}

/// Letterbox into the fixed detection square: scale the longer side to
/// `side`, place at the top-left, zero-pad the rest. Returns the tensor and
/// the scale applied, so detections map back as `coord / scale`.
pub fn detection_tensor(buf: &PixelBuffer, side: u32) -> (Tensor, f32) {
    let scale = side as f32 / buf.width().max(buf.height()) as f32;
    let new_w = ((buf.width() as f32 * scale).round() as u32).clamp(1, side);
    let new_h = ((buf.height() as f32 * scale).round() as u32).clamp(1, side);
    let resized = resize(buf, new_w, new_h);
    (to_nchw(&resized, side, side), scale)
}

/// Fixed-height recognition input: 32px tall, width proportional and capped.
pub fn recognition_tensor(buf: &PixelBuffer) -> Tensor {
    let width = ((buf.width() as f32 * RECOGNITION_HEIGHT as f32 / buf.height() as f32).round()
        as u32)
        .clamp(1, RECOGNITION_MAX_WIDTH);
    let resized = resize(buf, width, RECOGNITION_HEIGHT);
    to_nchw(&resized, width, RECOGNITION_HEIGHT)
}
