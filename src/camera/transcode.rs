//! Raw frame to JPEG conversion

use image::ExtendedColorType;
use image::codecs::jpeg::JpegEncoder;

use super::{Frame, PixelFormat};
use crate::{Error, Result};

/// Encode a raw frame as JPEG
///
/// The frame stays owned by the caller whether this succeeds or not.
///
/// # Errors
///
/// Returns [`Error::Transcode`] if the buffer length does not match the frame
/// geometry, the frame is already JPEG, or the encoder fails
pub fn transcode(frame: &Frame, quality: u8) -> Result<Vec<u8>> {
    let Some(bpp) = frame.format().bytes_per_pixel() else {
        return Err(Error::Transcode(format!(
            "{} frames are not transcodable",
            frame.format()
        )));
    };

    let pixels = frame.width() as usize * frame.height() as usize;
    if pixels == 0 {
        return Err(Error::Transcode("frame has zero area".to_string()));
    }
    if frame.len() != pixels * bpp {
        return Err(Error::Transcode(format!(
            "{} buffer is {} bytes, expected {} for {}x{}",
            frame.format(),
            frame.len(),
            pixels * bpp,
            frame.width(),
            frame.height()
        )));
    }
    if frame.format() == PixelFormat::Yuv422 && frame.width() % 2 != 0 {
        return Err(Error::Transcode("yuv422 frames need an even width".to_string()));
    }

    let (buf, color) = match frame.format() {
        PixelFormat::Grayscale => (frame.data().to_vec(), ExtendedColorType::L8),
        PixelFormat::Rgb888 => (frame.data().to_vec(), ExtendedColorType::Rgb8),
        PixelFormat::Rgb565 => (rgb565_to_rgb888(frame.data()), ExtendedColorType::Rgb8),
        PixelFormat::Yuv422 => (yuyv_to_rgb888(frame.data()), ExtendedColorType::Rgb8),
        PixelFormat::Jpeg => return Err(Error::Transcode("frame is already jpeg".to_string())),
    };

    let mut out = Vec::with_capacity(frame.len() / 8);
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
        .encode(&buf, frame.width(), frame.height(), color)
        .map_err(|e| Error::Transcode(e.to_string()))?;

    tracing::trace!(
        format = %frame.format(),
        raw = frame.len(),
        jpeg = out.len(),
        "transcoded frame"
    );
    Ok(out)
}

fn rgb565_to_rgb888(data: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(data.len() / 2 * 3);
    for px in data.chunks_exact(2) {
        let v = u16::from_be_bytes([px[0], px[1]]);
        let r = ((v >> 11) & 0x1f) as u8;
        let g = ((v >> 5) & 0x3f) as u8;
        let b = (v & 0x1f) as u8;
        rgb.extend_from_slice(&[(r << 3) | (r >> 2), (g << 2) | (g >> 4), (b << 3) | (b >> 2)]);
    }
    rgb
}

fn yuyv_to_rgb888(data: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(data.len() / 2 * 3);
    for quad in data.chunks_exact(4) {
        let (y0, u, y1, v) = (quad[0], quad[1], quad[2], quad[3]);
        rgb.extend_from_slice(&yuv_to_rgb(y0, u, v));
        rgb.extend_from_slice(&yuv_to_rgb(y1, u, v));
    }
    rgb
}

// BT.601 full range, integer fixed point
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = i32::from(y);
    let u = i32::from(u) - 128;
    let v = i32::from(v) - 128;
    let r = y + ((359 * v) >> 8);
    let g = y - ((88 * u + 183 * v) >> 8);
    let b = y + ((454 * u) >> 8);
    [r.clamp(0, 255) as u8, g.clamp(0, 255) as u8, b.clamp(0, 255) as u8]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> Vec<u8> {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8]);
            }
        }
        data
    }

    #[test]
    fn rgb888_round_trips_dimensions() {
        let frame = Frame::new(PixelFormat::Rgb888, 64, 48, gradient(64, 48));
        let jpeg = transcode(&frame, 80).unwrap();

        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 48));
    }

    #[test]
    fn grayscale_and_yuyv_encode() {
        let gray = Frame::new(PixelFormat::Grayscale, 16, 8, vec![128; 16 * 8]);
        let yuyv = Frame::new(PixelFormat::Yuv422, 16, 8, vec![128; 16 * 8 * 2]);

        for frame in [gray, yuyv] {
            let jpeg = transcode(&frame, 50).unwrap();
            let decoded = image::load_from_memory(&jpeg).unwrap();
            assert_eq!((decoded.width(), decoded.height()), (16, 8));
        }
    }

    #[test]
    fn rgb565_expands_full_scale() {
        assert_eq!(rgb565_to_rgb888(&[0xff, 0xff]), vec![255, 255, 255]);
        assert_eq!(rgb565_to_rgb888(&[0xf8, 0x00]), vec![255, 0, 0]);
        assert_eq!(rgb565_to_rgb888(&[0x00, 0x1f]), vec![0, 0, 255]);
    }

    #[test]
    fn short_buffer_is_rejected() {
        let frame = Frame::new(PixelFormat::Rgb565, 4, 4, vec![0; 31]);
        assert!(matches!(transcode(&frame, 80), Err(Error::Transcode(_))));
    }

    #[test]
    fn jpeg_input_is_rejected() {
        let frame = Frame::new(PixelFormat::Jpeg, 4, 4, vec![0xff, 0xd8]);
        assert!(transcode(&frame, 80).is_err());
    }
}
