//! Raster transcoding
//!
//! Decodes an embedded image from its PDF encoding, downscales it to the
//! maximum width and re-encodes it as a baseline JPEG.

use std::borrow::Cow;
use std::fmt;
use std::io::Read;

use flate2::read::ZlibDecoder;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};

use crate::document::ImageCandidate;
use crate::error::ImageError;

/// Colour model of the decoded samples
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColorModel {
    Gray,
    Rgb,
    Cmyk,
    /// Palette, separation, pattern and anything else we cannot expand
    Other(String),
}

impl ColorModel {
    pub(crate) fn from_name(name: &[u8]) -> Self {
        match name {
            b"DeviceGray" | b"CalGray" | b"G" => ColorModel::Gray,
            b"DeviceRGB" | b"CalRGB" | b"RGB" => ColorModel::Rgb,
            b"DeviceCMYK" | b"CMYK" => ColorModel::Cmyk,
            other => ColorModel::Other(String::from_utf8_lossy(other).to_string()),
        }
    }

    /// Map an ICC profile's component count onto a device colour model
    pub(crate) fn from_components(n: i64) -> Self {
        match n {
            1 => ColorModel::Gray,
            3 => ColorModel::Rgb,
            4 => ColorModel::Cmyk,
            n => ColorModel::Other(format!("ICCBased/{}", n)),
        }
    }

    pub fn components(&self) -> Option<usize> {
        match self {
            ColorModel::Gray => Some(1),
            ColorModel::Rgb => Some(3),
            ColorModel::Cmyk => Some(4),
            ColorModel::Other(_) => None,
        }
    }
}

impl fmt::Display for ColorModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColorModel::Gray => write!(f, "DeviceGray"),
            ColorModel::Rgb => write!(f, "DeviceRGB"),
            ColorModel::Cmyk => write!(f, "DeviceCMYK"),
            ColorModel::Other(name) => write!(f, "{}", name),
        }
    }
}

/// PNG/TIFF predictor parameters from a FlateDecode `/DecodeParms`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predictor {
    pub kind: i64,
    pub colors: usize,
    pub bits_per_component: usize,
    pub columns: usize,
}

impl Predictor {
    /// Bytes per pixel and per row of the predicted data
    fn row_layout(&self) -> Result<(usize, usize), ImageError> {
        if !(1..=32).contains(&self.colors)
            || ![1, 2, 4, 8, 16].contains(&self.bits_per_component)
        {
            return Err(ImageError::Decode(format!(
                "Invalid predictor parameters: {} colors, {} bits",
                self.colors, self.bits_per_component
            )));
        }
        let bits_per_pixel = self.colors * self.bits_per_component;
        let stride = self
            .columns
            .checked_mul(bits_per_pixel)
            .and_then(|bits| bits.checked_add(7))
            .map(|bits| bits / 8)
            .ok_or_else(|| {
                ImageError::Decode(format!("Predictor row of {} columns is too long", self.columns))
            })?;
        Ok((bits_per_pixel.div_ceil(8), stride))
    }
}

/// How an image XObject's payload is encoded
#[derive(Debug, Clone)]
pub struct SourceEncoding {
    /// Filter chain in decoding order
    pub filters: Vec<String>,
    pub color: ColorModel,
    pub bits_per_component: u32,
    pub predictor: Option<Predictor>,
    /// `/Decode` array as declared, one min/max pair per component
    pub decode: Option<Vec<f64>>,
    pub image_mask: bool,
}

impl SourceEncoding {
    /// Name of the outermost filter, or "raw"
    pub fn filter_label(&self) -> String {
        self.filters
            .last()
            .cloned()
            .unwrap_or_else(|| "raw".to_string())
    }

    fn has_identity_decode(&self) -> bool {
        self.decode
            .as_ref()
            .map_or(true, |d| d.chunks(2).all(|pair| pair == [0.0, 1.0]))
    }

    /// Per-component sample ranges, or `None` when samples map straight
    /// onto their colour values
    fn decode_ranges(&self, components: usize) -> Result<Option<Vec<(f64, f64)>>, ImageError> {
        if self.has_identity_decode() {
            return Ok(None);
        }
        match self.decode.as_deref() {
            Some(d) if d.len() == components * 2 => {
                Ok(Some(d.chunks(2).map(|pair| (pair[0], pair[1])).collect()))
            }
            _ => Err(ImageError::Decode(format!(
                "Decode array does not match {} components",
                components
            ))),
        }
    }
}

/// The raster codecs we know how to decode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceCodec {
    Jpeg,
    Raw,
}

/// Output of a successful transcode
#[derive(Debug, Clone)]
pub struct TranscodeResult {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Turns an image candidate into smaller replacement bytes.
///
/// `Ok(None)` means the image is not worth resizing and no transcode was
/// attempted.
pub trait Transcode {
    fn transcode(&self, candidate: &ImageCandidate<'_>)
        -> Result<Option<TranscodeResult>, ImageError>;
}

/// Downscales to a fixed maximum width and re-encodes as JPEG
#[derive(Debug, Clone)]
pub struct RasterTranscoder {
    max_width: u32,
    quality: u8,
}

impl RasterTranscoder {
    pub fn new(max_width: u32, quality: u8) -> Self {
        Self { max_width, quality }
    }

    /// Target pixel size, or `None` if the image is not wider than the limit
    pub fn target_dimensions(&self, width: u32, height: u32) -> Option<(u32, u32)> {
        if width <= self.max_width {
            return None;
        }
        let target_height = u64::from(height) * u64::from(self.max_width) / u64::from(width);
        Some((self.max_width, target_height as u32))
    }
}

impl Transcode for RasterTranscoder {
    fn transcode(
        &self,
        candidate: &ImageCandidate<'_>,
    ) -> Result<Option<TranscodeResult>, ImageError> {
        let Some((target_width, target_height)) =
            self.target_dimensions(candidate.width, candidate.height)
        else {
            return Ok(None);
        };

        if target_height == 0 || target_height > u32::from(u16::MAX) {
            return Err(ImageError::Decode(format!(
                "{}x{} cannot be scaled to {} px wide",
                candidate.width, candidate.height, target_width
            )));
        }

        let img = decode_image(candidate)?;
        let resampled = resample_image(&img, target_width, target_height);
        let bytes = encode_jpeg(&resampled, self.quality)?;

        Ok(Some(TranscodeResult {
            bytes,
            width: target_width,
            height: target_height,
        }))
    }
}

/// Decode an image XObject payload into pixels
pub fn decode_image(candidate: &ImageCandidate<'_>) -> Result<DynamicImage, ImageError> {
    let encoding = &candidate.encoding;
    if encoding.image_mask {
        return Err(ImageError::Decode("Image masks are not supported".to_string()));
    }

    let mut data = Cow::Borrowed(candidate.data);
    let mut codec = SourceCodec::Raw;

    for (i, filter) in encoding.filters.iter().enumerate() {
        match filter.as_str() {
            "FlateDecode" | "Fl" => data = Cow::Owned(inflate(&data)?),
            "DCTDecode" | "DCT" if i + 1 == encoding.filters.len() => codec = SourceCodec::Jpeg,
            other => {
                return Err(ImageError::Decode(format!("Unsupported filter: {}", other)));
            }
        }
    }

    match codec {
        SourceCodec::Jpeg if !encoding.has_identity_decode() => Err(ImageError::Decode(
            "Decode arrays on JPEG images are not supported".to_string(),
        )),
        SourceCodec::Jpeg => image::load_from_memory_with_format(&data, ImageFormat::Jpeg)
            .map_err(|e| ImageError::Decode(format!("Failed to decode JPEG image: {}", e))),
        SourceCodec::Raw => decode_raw(&data, candidate.width, candidate.height, encoding),
    }
}

fn inflate(data: &[u8]) -> Result<Vec<u8>, ImageError> {
    let mut decoder = ZlibDecoder::new(data);
    let mut decoded = Vec::new();
    decoder
        .read_to_end(&mut decoded)
        .map_err(|e| ImageError::Decode(format!("FlateDecode failed: {}", e)))?;
    Ok(decoded)
}

/// Build an image from unfiltered samples
fn decode_raw(
    data: &[u8],
    width: u32,
    height: u32,
    encoding: &SourceEncoding,
) -> Result<DynamicImage, ImageError> {
    let components = encoding.color.components().ok_or_else(|| {
        ImageError::Decode(format!("Unsupported color space: {}", encoding.color))
    })?;
    if encoding.bits_per_component != 8 {
        return Err(ImageError::Decode(format!(
            "Unsupported bits per component: {}",
            encoding.bits_per_component
        )));
    }

    let ranges = encoding.decode_ranges(components)?;

    let samples = match &encoding.predictor {
        Some(p) if p.kind >= 10 => {
            let (bpp, stride) = p.row_layout()?;
            Cow::Owned(undo_png_predictor(data, stride, bpp.max(1))?)
        }
        Some(p) if p.kind == 2 => {
            return Err(ImageError::Decode("TIFF predictor is not supported".to_string()));
        }
        _ => Cow::Borrowed(data),
    };

    let pixels = (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| ImageError::Decode(format!("{}x{} is too large", width, height)))?;
    let expected_size = pixels
        .checked_mul(components)
        .ok_or_else(|| ImageError::Decode(format!("{}x{} is too large", width, height)))?;
    if samples.len() < expected_size {
        return Err(ImageError::Decode(format!(
            "Sample data too short: {} bytes (expected {})",
            samples.len(),
            expected_size
        )));
    }
    let samples = match ranges {
        Some(ranges) => Cow::Owned(apply_decode(&samples[..expected_size], &ranges)),
        None => Cow::Borrowed(&samples[..expected_size]),
    };
    let samples = samples.as_ref();

    match encoding.color {
        ColorModel::Gray => GrayImage::from_raw(width, height, samples.to_vec())
            .map(DynamicImage::ImageLuma8)
            .ok_or_else(|| ImageError::Decode("Failed to create grayscale image".to_string())),
        ColorModel::Rgb => RgbImage::from_raw(width, height, samples.to_vec())
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(|| ImageError::Decode("Failed to create RGB image".to_string())),
        ColorModel::Cmyk => {
            let mut rgb_data = Vec::with_capacity(pixels * 3);
            for chunk in samples.chunks_exact(4) {
                let k = 255 - u32::from(chunk[3]);
                for &ink in &chunk[..3] {
                    rgb_data.push(((255 - u32::from(ink)) * k / 255) as u8);
                }
            }
            RgbImage::from_raw(width, height, rgb_data)
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(|| {
                    ImageError::Decode("Failed to create RGB image from CMYK".to_string())
                })
        }
        ColorModel::Other(ref name) => {
            Err(ImageError::Decode(format!("Unsupported color space: {}", name)))
        }
    }
}

/// Map 8-bit samples through per-component `[min max]` ranges
fn apply_decode(samples: &[u8], ranges: &[(f64, f64)]) -> Vec<u8> {
    samples
        .iter()
        .zip(ranges.iter().cycle())
        .map(|(&s, &(min, max))| {
            let value = min + f64::from(s) / 255.0 * (max - min);
            (value.clamp(0.0, 1.0) * 255.0).round() as u8
        })
        .collect()
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = i16::from(a) + i16::from(b) - i16::from(c);
    let pa = (p - i16::from(a)).abs();
    let pb = (p - i16::from(b)).abs();
    let pc = (p - i16::from(c)).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

/// Reverse PNG row filters (predictors 10-15). Each row carries its own
/// filter type byte.
fn undo_png_predictor(data: &[u8], stride: usize, bpp: usize) -> Result<Vec<u8>, ImageError> {
    let row_len = stride
        .checked_add(1)
        .ok_or_else(|| ImageError::Decode("Predictor row is too long".to_string()))?;
    let rows = data.len() / row_len;
    let mut out = vec![0u8; rows * stride];

    for y in 0..rows {
        let filter = data[y * row_len];
        let src = &data[y * row_len + 1..(y + 1) * row_len];
        let (done, rest) = out.split_at_mut(y * stride);
        let prev: &[u8] = if y > 0 { &done[(y - 1) * stride..] } else { &[] };
        let row = &mut rest[..stride];

        for x in 0..stride {
            let a = if x >= bpp { row[x - bpp] } else { 0 };
            let b = prev.get(x).copied().unwrap_or(0);
            let c = if x >= bpp {
                prev.get(x - bpp).copied().unwrap_or(0)
            } else {
                0
            };
            row[x] = match filter {
                0 => src[x],
                1 => src[x].wrapping_add(a),
                2 => src[x].wrapping_add(b),
                3 => src[x].wrapping_add(((u16::from(a) + u16::from(b)) / 2) as u8),
                4 => src[x].wrapping_add(paeth(a, b, c)),
                other => {
                    return Err(ImageError::Decode(format!(
                        "Unsupported PNG row filter: {}",
                        other
                    )));
                }
            };
        }
    }

    Ok(out)
}

/// Resample an image to target dimensions
fn resample_image(img: &DynamicImage, target_width: u32, target_height: u32) -> DynamicImage {
    img.resize_exact(target_width, target_height, FilterType::Lanczos3)
}

/// Encode as a 3-channel JPEG; alpha is dropped
fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, ImageError> {
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();
    let width =
        u16::try_from(width).map_err(|_| ImageError::Encode(format!("width {} too large", width)))?;
    let height = u16::try_from(height)
        .map_err(|_| ImageError::Encode(format!("height {} too large", height)))?;

    let mut jpeg_bytes = Vec::new();
    let mut encoder = jpeg_encoder::Encoder::new(&mut jpeg_bytes, quality);
    encoder.set_sampling_factor(jpeg_encoder::SamplingFactor::R_4_2_0);
    encoder.set_optimized_huffman_tables(true);
    encoder
        .encode(rgb.as_raw(), width, height, jpeg_encoder::ColorType::Rgb)
        .map_err(|e| ImageError::Encode(e.to_string()))?;

    Ok(jpeg_bytes)
}
