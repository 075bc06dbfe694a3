use std::io::Read;

use flate2::read::ZlibDecoder;
use serde::Serialize;

use crate::log_warn;
use crate::utils::error::{ApngError, ApngResult};
use crate::utils::traits::SafeAccess;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum ColorType {
    Grayscale = 0,
    RGB = 2,
    Indexed = 3,
    GrayscaleAlpha = 4,
    RGBA = 6,
}

#[derive(Debug, Clone)]
pub enum TransparencyData {
    Grayscale(u16),
    RGB(u16, u16, u16),
    Palette(Vec<u8>),
}

/// Validated IHDR contents. Animation frames inherit everything here except
/// the dimensions.
#[derive(Debug, Clone, Copy)]
pub struct Header {
    pub width: u32,
    pub height: u32,
    pub bit_depth: u8,
    pub color_type: ColorType,
    pub interlace: bool,
}

impl Header {
    pub fn parse(data: &[u8]) -> ApngResult<Header> {
        if data.len() != 13 {
            return Err(ApngError::Malformed(format!(
                "IHDR is {} bytes (expected 13)",
                data.len()
            )));
        }

        let width = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        let height = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        let bit_depth = data[8];
        let color_type = data[9];
        let compression_method = data[10];
        let filter_method = data[11];
        let interlace_method = data[12];

        if width == 0 || height == 0 {
            return Err(ApngError::Malformed(format!(
                "invalid image dimensions {}x{}",
                width, height
            )));
        }

        let color_type = match color_type {
            0 => ColorType::Grayscale,
            2 => ColorType::RGB,
            3 => ColorType::Indexed,
            4 => ColorType::GrayscaleAlpha,
            6 => ColorType::RGBA,
            n => return Err(ApngError::Malformed(format!("invalid color type {}", n))),
        };

        if !matches!(bit_depth, 1 | 2 | 4 | 8 | 16) {
            return Err(ApngError::Malformed(format!("invalid bit depth {}", bit_depth)));
        }

        let valid_combination = match color_type {
            ColorType::Grayscale => true,
            ColorType::Indexed => bit_depth <= 8,
            ColorType::RGB | ColorType::GrayscaleAlpha | ColorType::RGBA => bit_depth >= 8,
        };

        if !valid_combination {
            return Err(ApngError::UnsupportedFormat(format!(
                "color type {:?} at bit depth {}",
                color_type, bit_depth
            )));
        }

        if compression_method != 0 {
            return Err(ApngError::UnsupportedFormat(format!(
                "compression method {}",
                compression_method
            )));
        }

        if filter_method != 0 {
            return Err(ApngError::UnsupportedFormat(format!(
                "filter method {}",
                filter_method
            )));
        }

        let interlace = match interlace_method {
            0 => false,
            1 => true,
            n => return Err(ApngError::Malformed(format!("invalid interlace method {}", n))),
        };

        Ok(Header {
            width,
            height,
            bit_depth,
            color_type,
            interlace,
        })
    }

    fn bits_per_pixel(&self) -> usize {
        match self.color_type {
            ColorType::Grayscale => self.bit_depth as usize,
            ColorType::RGB => self.bit_depth as usize * 3,
            ColorType::Indexed => self.bit_depth as usize,
            ColorType::GrayscaleAlpha => self.bit_depth as usize * 2,
            ColorType::RGBA => self.bit_depth as usize * 4,
        }
    }

    fn bytes_per_pixel(&self) -> usize {
        (self.bits_per_pixel() + 7) / 8
    }

    fn row_bytes(&self, width: u32) -> usize {
        (width as usize * self.bits_per_pixel() + 7) / 8
    }
}

/// Turns compressed scanline data into normalized 8-bit RGBA rows: palette
/// expanded, grayscale promoted, tRNS applied, 16-bit stripped to 8, opaque
/// pixels padded with an opaque alpha channel. Adam7 passes are merged
/// before rows are handed out.
pub struct Pipeline {
    header: Header,
    palette: Option<Vec<[u8; 3]>>,
    transparency: Option<TransparencyData>,
}

impl Pipeline {
    pub fn new(header: Header) -> Pipeline {
        Pipeline {
            header,
            palette: None,
            transparency: None,
        }
    }

    pub fn set_palette(&mut self, palette: Vec<[u8; 3]>) {
        self.palette = Some(palette);
    }

    pub fn set_transparency(&mut self, transparency: TransparencyData) {
        self.transparency = Some(transparency);
    }

    /// Decodes one image's worth of compressed data at the given dimensions
    /// and hands every normalized RGBA row to `sink`, in increasing row
    /// order, each row exactly once.
    pub fn decode_image<F>(&self, data: &[u8], width: u32, height: u32, mut sink: F) -> ApngResult<()>
    where
        F: FnMut(u32, &[u8]) -> ApngResult<()>,
    {
        let mut decoder = ZlibDecoder::new(data);
        let mut decompressed = Vec::new();

        decoder
            .read_to_end(&mut decompressed)
            .map_err(|e| ApngError::Pipeline(format!("zlib inflate failed: {}", e)))?;

        let raw = if self.header.interlace {
            self.deinterlace(&decompressed, width, height)?
        } else {
            let expected = (1 + self.header.row_bytes(width)) * height as usize;

            if decompressed.len() < expected {
                return Err(ApngError::Malformed(format!(
                    "image data is {} bytes (expected {})",
                    decompressed.len(),
                    expected
                )));
            }

            self.unfilter(&decompressed, width, height)?
        };

        let row_bytes = self.header.row_bytes(width);
        let mut normalized = vec![0u8; width as usize * 4];

        for y in 0..height {
            let row = &raw[y as usize * row_bytes..(y as usize + 1) * row_bytes];
            self.normalize_row(row, width, &mut normalized)?;
            sink(y, &normalized)?;
        }

        Ok(())
    }

    fn unfilter(&self, data: &[u8], width: u32, height: u32) -> ApngResult<Vec<u8>> {
        let bytes_per_pixel = self.header.bytes_per_pixel();
        let row_bytes = self.header.row_bytes(width);
        let scanline_bytes = 1 + row_bytes;

        let mut unfiltered = Vec::with_capacity(row_bytes * height as usize);
        let mut prior = vec![0u8; row_bytes];

        for scanline in data.chunks(scanline_bytes).take(height as usize) {
            if scanline.len() < scanline_bytes {
                return Err(ApngError::Malformed(format!(
                    "scanline is {} bytes (expected {})",
                    scanline.len(),
                    scanline_bytes
                )));
            }

            let filtered = &scanline[1..];
            let mut decoded = vec![0u8; row_bytes];

            match scanline[0] {
                0 => decoded.copy_from_slice(filtered),
                1 => unfilter_sub(filtered, &mut decoded, bytes_per_pixel),
                2 => unfilter_up(filtered, &mut decoded, &prior),
                3 => unfilter_average(filtered, &mut decoded, &prior, bytes_per_pixel),
                4 => unfilter_paeth(filtered, &mut decoded, &prior, bytes_per_pixel),
                n => return Err(ApngError::Malformed(format!("invalid filter type {}", n))),
            }

            prior.copy_from_slice(&decoded);
            unfiltered.extend_from_slice(&decoded);
        }

        Ok(unfiltered)
    }

    fn deinterlace(&self, data: &[u8], width: u32, height: u32) -> ApngResult<Vec<u8>> {
        const ADAM7_COL_START: [usize; 7] = [0, 4, 0, 2, 0, 1, 0];
        const ADAM7_ROW_START: [usize; 7] = [0, 0, 4, 0, 2, 0, 1];
        const ADAM7_COL_DELTA: [usize; 7] = [8, 8, 4, 4, 2, 2, 1];
        const ADAM7_ROW_DELTA: [usize; 7] = [8, 8, 8, 4, 4, 2, 2];

        let bits_per_pixel = self.header.bits_per_pixel();
        let out_bytes = self.header.row_bytes(width);

        let mut output = vec![0u8; out_bytes * height as usize];
        let mut data_offset = 0;

        for pass in 0..7 {
            let pass_width = (width as usize + ADAM7_COL_DELTA[pass] - 1 - ADAM7_COL_START[pass])
                / ADAM7_COL_DELTA[pass];
            let pass_height = (height as usize + ADAM7_ROW_DELTA[pass] - 1 - ADAM7_ROW_START[pass])
                / ADAM7_ROW_DELTA[pass];

            if pass_width == 0 || pass_height == 0 {
                continue;
            }

            let pass_row_bytes = (bits_per_pixel * pass_width + 7) / 8;
            let pass_size = (pass_row_bytes + 1) * pass_height;

            if data_offset + pass_size > data.len() {
                return Err(ApngError::Malformed(format!(
                    "interlaced image data ends inside pass {}",
                    pass + 1
                )));
            }

            let pass_data = &data[data_offset..data_offset + pass_size];
            let unfiltered = self.unfilter(pass_data, pass_width as u32, pass_height as u32)?;
            let mut unfiltered_offset = 0;

            for row in 0..pass_height {
                let out_y = row * ADAM7_ROW_DELTA[pass] + ADAM7_ROW_START[pass];
                if out_y >= height as usize {
                    break;
                }

                if bits_per_pixel < 8 {
                    let pixels_per_byte = 8 / bits_per_pixel;
                    let bit_mask = (1u8 << bits_per_pixel) - 1;

                    for col in 0..pass_width {
                        let out_x = col * ADAM7_COL_DELTA[pass] + ADAM7_COL_START[pass];
                        if out_x >= width as usize {
                            break;
                        }

                        let in_byte = unfiltered[unfiltered_offset + col / pixels_per_byte];
                        let in_shift = (pixels_per_byte - 1 - (col % pixels_per_byte)) * bits_per_pixel;
                        let pixel = (in_byte >> in_shift) & bit_mask;

                        let out_index = out_y * out_bytes + out_x / pixels_per_byte;
                        let out_shift = (pixels_per_byte - 1 - (out_x % pixels_per_byte)) * bits_per_pixel;

                        output[out_index] &= !(bit_mask << out_shift);
                        output[out_index] |= pixel << out_shift;
                    }
                } else {
                    let bytes_per_pixel = bits_per_pixel / 8;

                    for col in 0..pass_width {
                        let out_x = col * ADAM7_COL_DELTA[pass] + ADAM7_COL_START[pass];
                        if out_x >= width as usize {
                            break;
                        }

                        let out_pos = out_y * out_bytes + out_x * bytes_per_pixel;
                        let in_pos = unfiltered_offset + col * bytes_per_pixel;

                        output[out_pos..out_pos + bytes_per_pixel]
                            .copy_from_slice(&unfiltered[in_pos..in_pos + bytes_per_pixel]);
                    }
                }

                unfiltered_offset += pass_row_bytes;
            }

            data_offset += pass_size;
        }

        Ok(output)
    }

    fn normalize_row(&self, row: &[u8], width: u32, out: &mut [u8]) -> ApngResult<()> {
        match self.header.color_type {
            ColorType::Indexed => self.normalize_indexed(row, width, out),
            ColorType::Grayscale => self.normalize_grayscale(row, width, out),
            ColorType::GrayscaleAlpha => self.normalize_grayscale_alpha(row, width, out),
            ColorType::RGB => self.normalize_rgb(row, width, out),
            ColorType::RGBA => self.normalize_rgba(row, width, out),
        }
    }

    fn normalize_indexed(&self, row: &[u8], width: u32, out: &mut [u8]) -> ApngResult<()> {
        let palette = self
            .palette
            .as_ref()
            .ok_or_else(|| ApngError::Malformed("indexed stream without a PLTE chunk".to_string()))?;

        let alpha_table = match &self.transparency {
            Some(TransparencyData::Palette(alpha)) => Some(alpha.as_slice()),
            _ => None,
        };

        for x in 0..width as usize {
            let index = unpack_sample(row, x, self.header.bit_depth);
            let color = palette.get(index as usize).copied().unwrap_or([0, 0, 0]);
            let alpha = match alpha_table {
                Some(table) => table.get(index as usize).copied().unwrap_or(255),
                None => 255,
            };

            out[x * 4..x * 4 + 4].copy_from_slice(&[color[0], color[1], color[2], alpha]);
        }

        Ok(())
    }

    fn normalize_grayscale(&self, row: &[u8], width: u32, out: &mut [u8]) -> ApngResult<()> {
        let key = match &self.transparency {
            Some(TransparencyData::Grayscale(key)) => Some(*key),
            _ => None,
        };

        match self.header.bit_depth {
            8 => {
                for x in 0..width as usize {
                    let gray = row[x];
                    let alpha = if key == Some(gray as u16) { 0 } else { 255 };
                    out[x * 4..x * 4 + 4].copy_from_slice(&[gray, gray, gray, alpha]);
                }
            }
            16 => {
                for x in 0..width as usize {
                    let sample = u16::from_be_bytes([row[x * 2], row[x * 2 + 1]]);
                    let gray = row[x * 2];
                    let alpha = if key == Some(sample) { 0 } else { 255 };
                    out[x * 4..x * 4 + 4].copy_from_slice(&[gray, gray, gray, alpha]);
                }
            }
            1 | 2 | 4 => {
                let max_value = (1u16 << self.header.bit_depth) - 1;

                for x in 0..width as usize {
                    let sample = unpack_sample(row, x, self.header.bit_depth);
                    let gray = (sample as u16 * 255 / max_value) as u8;
                    let alpha = if key == Some(sample as u16) { 0 } else { 255 };
                    out[x * 4..x * 4 + 4].copy_from_slice(&[gray, gray, gray, alpha]);
                }
            }
            _ => unreachable!(),
        }

        Ok(())
    }

    fn normalize_grayscale_alpha(&self, row: &[u8], width: u32, out: &mut [u8]) -> ApngResult<()> {
        match self.header.bit_depth {
            8 => {
                for x in 0..width as usize {
                    let gray = row[x * 2];
                    let alpha = row[x * 2 + 1];
                    out[x * 4..x * 4 + 4].copy_from_slice(&[gray, gray, gray, alpha]);
                }
            }
            16 => {
                for x in 0..width as usize {
                    let gray = row[x * 4];
                    let alpha = row[x * 4 + 2];
                    out[x * 4..x * 4 + 4].copy_from_slice(&[gray, gray, gray, alpha]);
                }
            }
            _ => unreachable!(),
        }

        Ok(())
    }

    fn normalize_rgb(&self, row: &[u8], width: u32, out: &mut [u8]) -> ApngResult<()> {
        let key = match &self.transparency {
            Some(TransparencyData::RGB(r, g, b)) => Some((*r, *g, *b)),
            _ => None,
        };

        match self.header.bit_depth {
            8 => {
                for x in 0..width as usize {
                    let (r, g, b) = (row[x * 3], row[x * 3 + 1], row[x * 3 + 2]);
                    let alpha = if key == Some((r as u16, g as u16, b as u16)) { 0 } else { 255 };
                    out[x * 4..x * 4 + 4].copy_from_slice(&[r, g, b, alpha]);
                }
            }
            16 => {
                for x in 0..width as usize {
                    let r = u16::from_be_bytes([row[x * 6], row[x * 6 + 1]]);
                    let g = u16::from_be_bytes([row[x * 6 + 2], row[x * 6 + 3]]);
                    let b = u16::from_be_bytes([row[x * 6 + 4], row[x * 6 + 5]]);
                    let alpha = if key == Some((r, g, b)) { 0 } else { 255 };
                    out[x * 4..x * 4 + 4].copy_from_slice(&[
                        (r >> 8) as u8,
                        (g >> 8) as u8,
                        (b >> 8) as u8,
                        alpha,
                    ]);
                }
            }
            _ => unreachable!(),
        }

        Ok(())
    }

    fn normalize_rgba(&self, row: &[u8], width: u32, out: &mut [u8]) -> ApngResult<()> {
        match self.header.bit_depth {
            8 => {
                out.copy_from_slice(&row[..width as usize * 4]);
            }
            16 => {
                for x in 0..width as usize {
                    out[x * 4..x * 4 + 4].copy_from_slice(&[
                        row[x * 8],
                        row[x * 8 + 2],
                        row[x * 8 + 4],
                        row[x * 8 + 6],
                    ]);
                }
            }
            _ => unreachable!(),
        }

        Ok(())
    }
}

/// Extracts the sample for pixel `x` from a packed row at bit depths below
/// a byte; at depth 8 it is a plain index.
fn unpack_sample(row: &[u8], x: usize, bit_depth: u8) -> u8 {
    if bit_depth == 8 {
        return row[x];
    }

    let bits = bit_depth as usize;
    let pixels_per_byte = 8 / bits;
    let byte = row[x / pixels_per_byte];
    let shift = (pixels_per_byte - 1 - (x % pixels_per_byte)) * bits;

    (byte >> shift) & ((1 << bits) - 1)
}

fn unfilter_sub(src: &[u8], dst: &mut [u8], bytes_per_pixel: usize) {
    if dst.check_range(0..bytes_per_pixel).is_err() || src.check_range(0..bytes_per_pixel).is_err() {
        log_warn!("Scanline shorter than one pixel, skipping sub filter");
        return;
    }

    dst[..bytes_per_pixel].copy_from_slice(&src[..bytes_per_pixel]);

    for i in bytes_per_pixel..src.len() {
        dst[i] = src[i].wrapping_add(dst[i - bytes_per_pixel]);
    }
}

fn unfilter_up(src: &[u8], dst: &mut [u8], prior: &[u8]) {
    for i in 0..src.len() {
        dst[i] = src[i].wrapping_add(prior[i]);
    }
}

fn unfilter_average(src: &[u8], dst: &mut [u8], prior: &[u8], bytes_per_pixel: usize) {
    if src.check_range(0..bytes_per_pixel).is_err() {
        log_warn!("Scanline shorter than one pixel, skipping average filter");
        return;
    }

    for i in 0..bytes_per_pixel {
        dst[i] = src[i].wrapping_add(prior[i] >> 1);
    }

    for i in bytes_per_pixel..src.len() {
        let left = dst[i - bytes_per_pixel] as u16;
        let above = prior[i] as u16;
        let average = ((left + above) >> 1) as u8;
        dst[i] = src[i].wrapping_add(average);
    }
}

fn unfilter_paeth(src: &[u8], dst: &mut [u8], prior: &[u8], bytes_per_pixel: usize) {
    if src.check_range(0..bytes_per_pixel).is_err() {
        log_warn!("Scanline shorter than one pixel, skipping paeth filter");
        return;
    }

    for i in 0..bytes_per_pixel {
        dst[i] = src[i].wrapping_add(prior[i]);
    }

    for i in bytes_per_pixel..src.len() {
        let left = dst[i - bytes_per_pixel];
        let above = prior[i];
        let upper_left = prior[i - bytes_per_pixel];

        dst[i] = src[i].wrapping_add(paeth_predictor(left, above, upper_left));
    }
}

fn paeth_predictor(a: u8, b: u8, c: u8) -> u8 {
    // a = left, b = above, c = upper left
    let a = a as i16;
    let b = b as i16;
    let c = c as i16;

    let p = a + b - c;
    let pa = (p - a).abs();
    let pb = (p - b).abs();
    let pc = (p - c).abs();

    if pa <= pb && pa <= pc {
        a as u8
    } else if pb <= pc {
        b as u8
    } else {
        c as u8
    }
}
