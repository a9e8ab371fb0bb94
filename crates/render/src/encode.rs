//! Image encoding for rendered pages
//!
//! Full-quality output is PNG; previews are JPEG at a configurable quality.
//! Both are produced from the same pixel buffer, so they share dimensions.

use base64::{engine::general_purpose::STANDARD, Engine};
use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, ImageResult, Rgb, RgbImage};
use pdf_engine::RgbaImage;
use std::io::Cursor;

/// How an [`EncodedImage`] was encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageEncoding {
    /// Lossless, used for full-quality page images
    Png,

    /// Lossy, used for previews (quality 1-100)
    Jpeg { quality: u8 },
}

impl ImageEncoding {
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg { .. } => "image/jpeg",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg { .. } => "jpg",
        }
    }
}

/// An encoded page image ready for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub encoding: ImageEncoding,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl EncodedImage {
    pub fn png(pixels: &RgbaImage) -> ImageResult<Self> {
        let mut data = Vec::new();
        pixels.write_to(&mut Cursor::new(&mut data), ImageFormat::Png)?;

        Ok(Self { encoding: ImageEncoding::Png, width: pixels.width(), height: pixels.height(), data })
    }

    /// Encode as JPEG. Transparent pixels are composited over white.
    pub fn jpeg(pixels: &RgbaImage, quality: u8) -> ImageResult<Self> {
        let quality = quality.clamp(1, 100);
        let rgb = RgbImage::from_fn(pixels.width(), pixels.height(), |x, y| {
            let [r, g, b, a] = pixels.get_pixel(x, y).0;
            Rgb([over_white(r, a), over_white(g, a), over_white(b, a)])
        });

        let mut data = Vec::new();
        JpegEncoder::new_with_quality(&mut data, quality).encode_image(&rgb)?;

        Ok(Self {
            encoding: ImageEncoding::Jpeg { quality },
            width: pixels.width(),
            height: pixels.height(),
            data,
        })
    }

    pub fn mime_type(&self) -> &'static str {
        self.encoding.mime_type()
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// `data:` URL suitable for direct display in a web view
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type(), STANDARD.encode(&self.data))
    }
}

fn over_white(channel: u8, alpha: u8) -> u8 {
    let channel = channel as u32;
    let alpha = alpha as u32;
    ((channel * alpha + 255 * (255 - alpha)) / 255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn checkerboard(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            if (x / 4 + y / 4) % 2 == 0 {
                Rgba([0, 0, 0, 255])
            } else {
                Rgba([255, 255, 255, 255])
            }
        })
    }

    #[test]
    fn png_and_jpeg_share_dimensions() {
        let pixels = checkerboard(33, 17);

        let png = EncodedImage::png(&pixels).expect("png encodes");
        let jpeg = EncodedImage::jpeg(&pixels, 50).expect("jpeg encodes");

        let decoded_png = image::load_from_memory(&png.data).expect("png decodes");
        let decoded_jpeg = image::load_from_memory(&jpeg.data).expect("jpeg decodes");
        assert_eq!((decoded_png.width(), decoded_png.height()), (33, 17));
        assert_eq!((decoded_jpeg.width(), decoded_jpeg.height()), (33, 17));
        assert_eq!((png.width, png.height), (jpeg.width, jpeg.height));
    }

    #[test]
    fn jpeg_quality_is_clamped() {
        let pixels = checkerboard(8, 8);

        let jpeg = EncodedImage::jpeg(&pixels, 0).expect("jpeg encodes");
        assert_eq!(jpeg.encoding, ImageEncoding::Jpeg { quality: 1 });
    }

    #[test]
    fn data_url_carries_mime_type() {
        let pixels = checkerboard(4, 4);

        let png = EncodedImage::png(&pixels).unwrap();
        assert!(png.to_data_url().starts_with("data:image/png;base64,iVBORw0KGgo"));

        let jpeg = EncodedImage::jpeg(&pixels, 80).unwrap();
        assert!(jpeg.to_data_url().starts_with("data:image/jpeg;base64,/9j/"));
    }

    #[test]
    fn transparent_pixels_become_white() {
        assert_eq!(over_white(0, 0), 255);
        assert_eq!(over_white(0, 255), 0);
        assert_eq!(over_white(100, 255), 100);
    }
}
