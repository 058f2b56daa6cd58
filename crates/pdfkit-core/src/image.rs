//! Image XObjects for the create flow
//!
//! JPEG data is embedded untouched with `DCTDecode`; only the frame header is
//! read to learn the dimensions and component count. PNG data is decoded,
//! normalized to 8 bits per channel and re-compressed with `FlateDecode`,
//! with any alpha channel moved into a separate soft mask.

use std::io::{Cursor, Write};

use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::{Dictionary, Object, Stream};

use crate::builder::PageSize;
use crate::error::BuildError;

/// An image ready to be added to a document
#[derive(Debug)]
pub struct EmbeddedImage {
    pub width: u32,
    pub height: u32,
    pub stream: Stream,
    pub soft_mask: Option<Stream>,
}

/// Where an image is drawn on a page, in points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Scale the image to fit the page, preserving aspect ratio, and center it
pub fn fit_and_center(image_width: f32, image_height: f32, page: PageSize) -> Placement {
    let scale = (page.width / image_width).min(page.height / image_height);
    let width = image_width * scale;
    let height = image_height * scale;
    Placement {
        x: (page.width - width) / 2.0,
        y: (page.height - height) / 2.0,
        width,
        height,
    }
}

/// Frame header fields of a baseline or progressive JPEG
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JpegHeader {
    pub width: u32,
    pub height: u32,
    pub components: u8,
    /// An Adobe APP14 segment precedes the frame
    pub adobe: bool,
}

fn is_start_of_frame(marker: u8) -> bool {
    // C4 = DHT, C8 = JPG extension, CC = DAC
    matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC)
}

pub fn read_jpeg_header(bytes: &[u8]) -> Result<JpegHeader, BuildError> {
    if bytes.len() < 4 || bytes[0] != 0xFF || bytes[1] != 0xD8 {
        return Err(BuildError::UnsupportedImage(
            "missing JPEG start-of-image marker".into(),
        ));
    }

    let mut adobe = false;
    let mut pos = 2;
    while pos + 4 <= bytes.len() {
        if bytes[pos] != 0xFF {
            return Err(BuildError::UnsupportedImage(format!(
                "corrupt JPEG marker at offset {}",
                pos
            )));
        }

        let marker = bytes[pos + 1];
        match marker {
            0xFF => {
                pos += 1;
                continue;
            }
            // standalone markers carry no length
            0x01 | 0xD0..=0xD8 => {
                pos += 2;
                continue;
            }
            0xD9 | 0xDA => break,
            _ => {}
        }

        let segment_len = u16::from_be_bytes([bytes[pos + 2], bytes[pos + 3]]) as usize;
        if segment_len < 2 {
            return Err(BuildError::UnsupportedImage(
                "invalid JPEG segment length".into(),
            ));
        }

        if is_start_of_frame(marker) {
            // length(2) precision(1) height(2) width(2) components(1)
            if pos + 10 > bytes.len() {
                return Err(BuildError::UnsupportedImage(
                    "truncated JPEG frame header".into(),
                ));
            }
            let height = u16::from_be_bytes([bytes[pos + 5], bytes[pos + 6]]) as u32;
            let width = u16::from_be_bytes([bytes[pos + 7], bytes[pos + 8]]) as u32;
            let components = bytes[pos + 9];

            if width == 0 || height == 0 {
                return Err(BuildError::UnsupportedImage(
                    "JPEG has zero dimensions".into(),
                ));
            }
            return Ok(JpegHeader {
                width,
                height,
                components,
                adobe,
            });
        }

        if marker == 0xEE && bytes[pos + 4..].starts_with(b"Adobe") {
            adobe = true;
        }

        pos += 2 + segment_len;
    }

    Err(BuildError::UnsupportedImage(
        "no JPEG frame header found".into(),
    ))
}

fn image_dict(width: u32, height: u32, color_space: &str) -> Dictionary {
    let mut dict = Dictionary::new();
    dict.set("Type", Object::Name(b"XObject".to_vec()));
    dict.set("Subtype", Object::Name(b"Image".to_vec()));
    dict.set("Width", Object::Integer(width as i64));
    dict.set("Height", Object::Integer(height as i64));
    dict.set("ColorSpace", Object::Name(color_space.as_bytes().to_vec()));
    dict.set("BitsPerComponent", Object::Integer(8));
    dict
}

fn encoded_stream(mut dict: Dictionary, filter: &str, data: Vec<u8>) -> Stream {
    dict.set("Filter", Object::Name(filter.as_bytes().to_vec()));
    dict.set("Length", Object::Integer(data.len() as i64));
    let mut stream = Stream::new(dict, data);
    // already encoded
    stream.allows_compression = false;
    stream
}

pub fn embed_jpeg(bytes: &[u8]) -> Result<EmbeddedImage, BuildError> {
    let header = read_jpeg_header(bytes)?;

    let color_space = match header.components {
        1 => "DeviceGray",
        3 => "DeviceRGB",
        4 => "DeviceCMYK",
        n => {
            return Err(BuildError::UnsupportedImage(format!(
                "JPEG with {} color components",
                n
            )))
        }
    };

    let mut dict = image_dict(header.width, header.height, color_space);
    if header.components == 4 && header.adobe {
        // Photoshop writes APP14 CMYK with inverted samples
        dict.set(
            "Decode",
            Object::Array(
                [1, 0, 1, 0, 1, 0, 1, 0]
                    .iter()
                    .map(|v| Object::Integer(*v))
                    .collect(),
            ),
        );
    }

    Ok(EmbeddedImage {
        width: header.width,
        height: header.height,
        stream: encoded_stream(dict, "DCTDecode", bytes.to_vec()),
        soft_mask: None,
    })
}

fn deflate(data: &[u8]) -> Result<Vec<u8>, BuildError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| BuildError::OperationError(format!("Failed to compress image: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| BuildError::OperationError(format!("Failed to compress image: {}", e)))
}

pub fn embed_png(bytes: &[u8]) -> Result<EmbeddedImage, BuildError> {
    let mut decoder = png::Decoder::new(Cursor::new(bytes));
    decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);

    let mut reader = decoder
        .read_info()
        .map_err(|e| BuildError::UnsupportedImage(format!("Invalid PNG: {}", e)))?;
    let mut pixels = vec![0u8; reader.output_buffer_size()];
    let info = reader
        .next_frame(&mut pixels)
        .map_err(|e| BuildError::UnsupportedImage(format!("Invalid PNG: {}", e)))?;
    pixels.truncate(info.buffer_size());

    if info.bit_depth != png::BitDepth::Eight {
        return Err(BuildError::UnsupportedImage(format!(
            "PNG bit depth {:?} after normalization",
            info.bit_depth
        )));
    }

    let (color_channels, has_alpha, color_space) = match info.color_type {
        png::ColorType::Grayscale => (1, false, "DeviceGray"),
        png::ColorType::GrayscaleAlpha => (1, true, "DeviceGray"),
        png::ColorType::Rgb => (3, false, "DeviceRGB"),
        png::ColorType::Rgba => (3, true, "DeviceRGB"),
        png::ColorType::Indexed => {
            return Err(BuildError::UnsupportedImage(
                "indexed PNG was not expanded".into(),
            ))
        }
    };

    let (color, alpha) = if has_alpha {
        let stride = color_channels + 1;
        let pixel_count = pixels.len() / stride;
        let mut color = Vec::with_capacity(pixel_count * color_channels);
        let mut alpha = Vec::with_capacity(pixel_count);
        for pixel in pixels.chunks_exact(stride) {
            color.extend_from_slice(&pixel[..color_channels]);
            alpha.push(pixel[color_channels]);
        }
        (color, Some(alpha))
    } else {
        (pixels, None)
    };

    let stream = encoded_stream(
        image_dict(info.width, info.height, color_space),
        "FlateDecode",
        deflate(&color)?,
    );

    let soft_mask = match alpha {
        Some(alpha) => Some(encoded_stream(
            image_dict(info.width, info.height, "DeviceGray"),
            "FlateDecode",
            deflate(&alpha)?,
        )),
        None => None,
    };

    Ok(EmbeddedImage {
        width: info.width,
        height: info.height,
        stream,
        soft_mask,
    })
}
