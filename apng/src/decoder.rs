use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use crate::animation::{AnimationControl, BlendOp, Compositor, DisposeOp, FrameControl};
use crate::chunks::{ChunkReader, ChunkType, RawChunk};
use crate::pipeline::{ColorType, Header, Pipeline, TransparencyData};
use crate::utils::error::{ApngError, ApngResult};
use crate::utils::info::{ApngInfo, ImageTime, PhysicalDimensions, PhysicalUnit, TextChunk};
use crate::utils::raster::DecodedSequence;
use crate::{log_debug, log_warn};

/// One animation frame as it appears in the chunk stream: its control
/// record plus the compressed scanline data accumulated for it.
#[derive(Debug, Clone)]
struct StreamFrame {
    control: FrameControl,
    data: Vec<u8>,
}

/// Decoder for PNG and APNG streams.
///
/// Pulls chunks from the source, feeds their contents through the pixel
/// pipeline and composes animation frames onto a persistent canvas. One
/// decoder handles one stream; `decode` runs the whole session and returns
/// every composed frame.
pub struct ApngDecoder<R: Read + Seek> {
    chunks: ChunkReader<R>,
    header: Option<Header>,
    palette: Option<Vec<[u8; 3]>>,
    transparency: Option<TransparencyData>,
    animation: Option<AnimationControl>,
    idat_data: Vec<u8>,
    frames: Vec<StreamFrame>,
    seen_idat: bool,
    fctl_before_idat: bool,
    next_sequence: u32,
    gamma: Option<f32>,
    physical_dimensions: Option<PhysicalDimensions>,
    modification_time: Option<ImageTime>,
    text_chunks: Vec<TextChunk>,
}

impl ApngDecoder<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> ApngResult<ApngDecoder<BufReader<File>>> {
        let file = File::open(path)?;
        Ok(ApngDecoder::new(BufReader::new(file)))
    }
}

impl<R: Read + Seek> ApngDecoder<R> {
    pub fn new(source: R) -> Self {
        Self {
            chunks: ChunkReader::new(source),
            header: None,
            palette: None,
            transparency: None,
            animation: None,
            idat_data: Vec::new(),
            frames: Vec::new(),
            seen_idat: false,
            fctl_before_idat: false,
            next_sequence: 0,
            gamma: None,
            physical_dimensions: None,
            modification_time: None,
            text_chunks: Vec::new(),
        }
    }

    pub fn width(&self) -> u32 {
        self.header.map(|h| h.width).unwrap_or(0)
    }

    pub fn height(&self) -> u32 {
        self.header.map(|h| h.height).unwrap_or(0)
    }

    pub fn info(&self) -> ApngInfo {
        ApngInfo {
            width: self.width(),
            height: self.height(),
            bit_depth: self.header.map(|h| h.bit_depth).unwrap_or(0),
            color_type: self.header.map(|h| h.color_type).unwrap_or(ColorType::RGB),
            interlace: self.header.map(|h| h.interlace).unwrap_or(false),
            palette_entries: self.palette.as_ref().map(|p| p.len()).unwrap_or(0),
            animation: self.animation,
            hidden_first_frame: self.animation.is_some() && !self.fctl_before_idat,
            frame_controls: self.frames.iter().map(|f| f.control).collect(),
            gamma: self.gamma,
            physical_dimensions: self.physical_dimensions,
            modification_time: self.modification_time.clone(),
            text_chunks: self.text_chunks.clone(),
        }
    }

    /// Decodes the whole stream into its composed frame sequence. A plain
    /// PNG comes back as a single frame with delay 0.
    pub fn decode(&mut self) -> ApngResult<DecodedSequence> {
        self.chunks.consume_signature()?;

        let mut first = true;

        loop {
            let chunk = match self.chunks.next_chunk()? {
                Some(chunk) => chunk,
                None => {
                    log_warn!("Stream ended without an IEND chunk");
                    break;
                }
            };

            if first && chunk.chunk_type != ChunkType::Ihdr {
                return Err(ApngError::Malformed("first chunk is not IHDR".to_string()));
            }
            first = false;

            match chunk.chunk_type {
                ChunkType::Ihdr => self.read_ihdr(&chunk)?,
                ChunkType::Plte => self.read_plte(&chunk)?,
                ChunkType::Trns => self.read_trns(&chunk)?,
                ChunkType::Actl => self.read_actl(&chunk)?,
                ChunkType::Fctl => self.read_fctl(&chunk)?,
                ChunkType::Idat => self.read_idat(chunk),
                ChunkType::Fdat => self.read_fdat(chunk)?,
                ChunkType::Gama => self.read_gama(&chunk),
                ChunkType::Phys => self.read_phys(&chunk),
                ChunkType::Time => self.read_time(&chunk),
                ChunkType::Text => self.read_text(&chunk),
                ChunkType::Iend => break,
                ChunkType::Other(name) => {
                    log_debug!("Skipping chunk {:?}", String::from_utf8_lossy(&name));
                }
            }
        }

        self.compose()
    }

    fn read_ihdr(&mut self, chunk: &RawChunk) -> ApngResult<()> {
        if self.header.is_some() {
            return Err(ApngError::Malformed("duplicate IHDR chunk".to_string()));
        }

        self.header = Some(Header::parse(&chunk.data)?);

        Ok(())
    }

    fn read_plte(&mut self, chunk: &RawChunk) -> ApngResult<()> {
        if chunk.data.len() % 3 != 0 {
            log_warn!("PLTE chunk length is not a multiple of 3");
        }

        let palette = chunk.data.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect();

        self.palette = Some(palette);

        Ok(())
    }

    fn read_trns(&mut self, chunk: &RawChunk) -> ApngResult<()> {
        let header = self.require_header()?;
        let data = &chunk.data;

        let transparency = match header.color_type {
            ColorType::Grayscale => {
                if data.len() != 2 {
                    log_warn!("Invalid tRNS length for grayscale: {}", data.len());
                    return Ok(());
                }

                TransparencyData::Grayscale(u16::from_be_bytes([data[0], data[1]]))
            }
            ColorType::RGB => {
                if data.len() != 6 {
                    log_warn!("Invalid tRNS length for RGB: {}", data.len());
                    return Ok(());
                }

                TransparencyData::RGB(
                    u16::from_be_bytes([data[0], data[1]]),
                    u16::from_be_bytes([data[2], data[3]]),
                    u16::from_be_bytes([data[4], data[5]]),
                )
            }
            ColorType::Indexed => {
                if self.palette.is_none() {
                    log_warn!("tRNS chunk before PLTE chunk");
                }

                TransparencyData::Palette(data.clone())
            }
            _ => {
                log_warn!("tRNS chunk not allowed for color type {:?}", header.color_type);
                return Ok(());
            }
        };

        self.transparency = Some(transparency);

        Ok(())
    }

    fn read_actl(&mut self, chunk: &RawChunk) -> ApngResult<()> {
        if self.seen_idat {
            log_warn!("acTL chunk after image data, treating stream as non-animated");
            return Ok(());
        }

        if chunk.data.len() != 8 {
            return Err(ApngError::Malformed(format!(
                "acTL is {} bytes (expected 8)",
                chunk.data.len()
            )));
        }

        let num_frames = u32::from_be_bytes([chunk.data[0], chunk.data[1], chunk.data[2], chunk.data[3]]);
        let num_plays = u32::from_be_bytes([chunk.data[4], chunk.data[5], chunk.data[6], chunk.data[7]]);

        if num_frames == 0 {
            log_warn!("acTL chunk with zero frames");
        }

        self.animation = Some(AnimationControl { num_frames, num_plays });

        Ok(())
    }

    fn read_fctl(&mut self, chunk: &RawChunk) -> ApngResult<()> {
        let header = self.require_header()?;
        let data = &chunk.data;

        if data.len() != 26 {
            return Err(ApngError::Malformed(format!(
                "fcTL is {} bytes (expected 26)",
                data.len()
            )));
        }

        let sequence_number = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        let width = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        let height = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);
        let x = u32::from_be_bytes([data[12], data[13], data[14], data[15]]);
        let y = u32::from_be_bytes([data[16], data[17], data[18], data[19]]);
        let delay_num = u16::from_be_bytes([data[20], data[21]]);
        let delay_den = u16::from_be_bytes([data[22], data[23]]);
        let dispose_op = DisposeOp::from_code(data[24]);
        let blend_op = BlendOp::from_code(data[25]);

        self.check_sequence(sequence_number);

        if width == 0 || height == 0 {
            return Err(ApngError::Malformed(format!(
                "invalid frame dimensions {}x{}",
                width, height
            )));
        }

        if x as u64 + width as u64 > header.width as u64
            || y as u64 + height as u64 > header.height as u64
        {
            return Err(ApngError::FrameOutOfBounds {
                x,
                y,
                width,
                height,
                canvas_width: header.width,
                canvas_height: header.height,
            });
        }

        if !self.seen_idat {
            if self.fctl_before_idat {
                log_warn!("Multiple fcTL chunks before image data");
            }

            // A frame that shares the default image's data covers the canvas
            if width != header.width || height != header.height || x != 0 || y != 0 {
                return Err(ApngError::Malformed(
                    "the frame sharing the default image must cover the canvas".to_string(),
                ));
            }

            self.fctl_before_idat = true;
        }

        self.frames.push(StreamFrame {
            control: FrameControl {
                x,
                y,
                width,
                height,
                delay_num,
                delay_den,
                dispose_op,
                blend_op,
            },
            data: Vec::new(),
        });

        Ok(())
    }

    fn read_idat(&mut self, chunk: RawChunk) {
        self.seen_idat = true;

        // A pre-IDAT fcTL makes the default image animation frame 0, so its
        // data feeds that frame as well
        if self.fctl_before_idat {
            if let Some(frame) = self.frames.last_mut() {
                frame.data.extend_from_slice(&chunk.data);
            }
        }

        self.idat_data.extend_from_slice(&chunk.data);
    }

    fn read_fdat(&mut self, chunk: RawChunk) -> ApngResult<()> {
        if chunk.data.len() < 4 {
            return Err(ApngError::Malformed(format!(
                "fdAT is {} bytes (expected at least 4)",
                chunk.data.len()
            )));
        }

        let sequence_number =
            u32::from_be_bytes([chunk.data[0], chunk.data[1], chunk.data[2], chunk.data[3]]);

        self.check_sequence(sequence_number);

        match self.frames.last_mut() {
            Some(frame) => frame.data.extend_from_slice(&chunk.data[4..]),
            None => log_warn!("fdAT chunk without preceding fcTL chunk"),
        }

        Ok(())
    }

    fn read_gama(&mut self, chunk: &RawChunk) {
        if chunk.data.len() != 4 {
            log_warn!("Invalid gAMA length: {}", chunk.data.len());
            return;
        }

        let gamma_int =
            u32::from_be_bytes([chunk.data[0], chunk.data[1], chunk.data[2], chunk.data[3]]);

        self.gamma = Some(gamma_int as f32 / 100000.0);
    }

    fn read_phys(&mut self, chunk: &RawChunk) {
        let data = &chunk.data;

        if data.len() != 9 {
            log_warn!("Invalid pHYs length: {}", data.len());
            return;
        }

        let unit = match data[8] {
            1 => PhysicalUnit::Meter,
            _ => PhysicalUnit::Unknown,
        };

        self.physical_dimensions = Some(PhysicalDimensions {
            pixels_per_unit_x: u32::from_be_bytes([data[0], data[1], data[2], data[3]]),
            pixels_per_unit_y: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            unit,
        });
    }

    fn read_time(&mut self, chunk: &RawChunk) {
        let data = &chunk.data;

        if data.len() != 7 {
            log_warn!("Invalid tIME length: {}", data.len());
            return;
        }

        let month = data[2];
        let day = data[3];

        if !(1..=12).contains(&month) {
            log_warn!("Invalid month in tIME chunk: {}", month);
        }

        if !(1..=31).contains(&day) {
            log_warn!("Invalid day in tIME chunk: {}", day);
        }

        self.modification_time = Some(ImageTime {
            year: u16::from_be_bytes([data[0], data[1]]),
            month,
            day,
            hour: data[4],
            minute: data[5],
            second: data[6],
        });
    }

    fn read_text(&mut self, chunk: &RawChunk) {
        let (keyword, text) = match chunk.data.iter().position(|&b| b == 0) {
            Some(split) => (&chunk.data[..split], &chunk.data[split + 1..]),
            None => {
                log_warn!("tEXt chunk without a keyword separator");
                return;
            }
        };

        self.text_chunks.push(TextChunk {
            keyword: String::from_utf8_lossy(keyword).to_string(),
            text: String::from_utf8_lossy(text).to_string(),
        });
    }

    fn check_sequence(&mut self, sequence_number: u32) {
        if sequence_number != self.next_sequence {
            log_warn!(
                "Out-of-order APNG sequence number {} (expected {})",
                sequence_number,
                self.next_sequence
            );
        }

        self.next_sequence = sequence_number.wrapping_add(1);
    }

    fn require_header(&self) -> ApngResult<Header> {
        self.header
            .ok_or_else(|| ApngError::Malformed("stream has no IHDR chunk".to_string()))
    }

    /// Replays the collected frames through the pixel pipeline into the
    /// compositor and closes the session.
    fn compose(&mut self) -> ApngResult<DecodedSequence> {
        let header = self.require_header()?;

        let mut pipeline = Pipeline::new(header);
        if let Some(palette) = &self.palette {
            pipeline.set_palette(palette.clone());
        }
        if let Some(transparency) = &self.transparency {
            pipeline.set_transparency(transparency.clone());
        }

        let skip_first = self.animation.is_some() && !self.fctl_before_idat;
        let mut compositor =
            Compositor::new(header.width, header.height, self.animation.as_ref(), skip_first);

        if self.animation.is_none() {
            if self.idat_data.is_empty() {
                return Err(ApngError::Malformed("stream has no image data".to_string()));
            }

            decode_frame(
                &pipeline,
                &mut compositor,
                FrameControl::full_canvas(header.width, header.height),
                &self.idat_data,
                0,
            )?;

            return compositor.finish_stream();
        }

        let mut index = 0;

        if skip_first {
            if self.idat_data.is_empty() {
                log_warn!("Animated stream without a default image");
            } else {
                decode_frame(
                    &pipeline,
                    &mut compositor,
                    FrameControl::full_canvas(header.width, header.height),
                    &self.idat_data,
                    index,
                )?;
            }

            index = 1;
        }

        for frame in &self.frames {
            if frame.data.is_empty() {
                log_warn!("Frame {} has no data, stopping", index);
                break;
            }

            decode_frame(&pipeline, &mut compositor, frame.control, &frame.data, index)?;
            index += 1;
        }

        compositor.finish_stream()
    }
}

fn decode_frame(
    pipeline: &Pipeline,
    compositor: &mut Compositor,
    control: FrameControl,
    data: &[u8],
    index: u32,
) -> ApngResult<()> {
    compositor.set_frame_info(control);

    pipeline.decode_image(data, control.width, control.height, |row, pixels| {
        compositor.set_row(row, pixels);
        Ok(())
    })?;

    compositor.finish_frame(index);

    Ok(())
}
