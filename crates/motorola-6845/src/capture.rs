//! PNG screenshots of the frame buffer.

use std::error::Error;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::Crtc;

/// Save the current frame buffer as a PNG file.
pub fn save_screenshot(crtc: &Crtc, path: &Path) -> Result<(), Box<dyn Error>> {
    let file = fs::File::create(path)?;
    write_png(crtc, BufWriter::new(file))
}

/// Encode the frame buffer as PNG into `out`.
///
/// The frame buffer is ARGB32; the image is written as 8-bit RGBA.
pub fn write_png<W: Write>(crtc: &Crtc, out: W) -> Result<(), Box<dyn Error>> {
    let width = crtc.framebuffer_width();
    let height = crtc.framebuffer_height();
    if width == 0 || height == 0 {
        return Err(format!("frame buffer is empty ({width}x{height})").into());
    }

    let mut encoder = png::Encoder::new(out, width, height);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;

    let mut rgba = Vec::with_capacity(crtc.framebuffer().len() * 4);
    for &pixel in crtc.framebuffer() {
        rgba.push((pixel >> 16) as u8);
        rgba.push((pixel >> 8) as u8);
        rgba.push(pixel as u8);
        rgba.push(0xFF);
    }

    writer.write_image_data(&rgba)?;
    Ok(())
}
