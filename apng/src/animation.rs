use serde::Serialize;

use crate::log_warn;
use crate::utils::error::{ApngError, ApngResult};
use crate::utils::raster::{DecodedSequence, Raster};

/// What happens to the frame's region of the canvas after the frame has
/// been presented.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum DisposeOp {
    None,
    Background,
    Previous,
}

impl DisposeOp {
    pub(crate) fn from_code(code: u8) -> DisposeOp {
        match code {
            0 => DisposeOp::None,
            1 => DisposeOp::Background,
            2 => DisposeOp::Previous,
            n => {
                log_warn!("Invalid dispose_op {}, assuming none", n);
                DisposeOp::None
            }
        }
    }
}

/// How the frame's pixels are applied to the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum BlendOp {
    Source,
    Over,
}

impl BlendOp {
    pub(crate) fn from_code(code: u8) -> BlendOp {
        match code {
            0 => BlendOp::Source,
            1 => BlendOp::Over,
            n => {
                log_warn!("Invalid blend_op {}, assuming source", n);
                BlendOp::Source
            }
        }
    }
}

/// Placement, timing and composition rules for one animation frame.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FrameControl {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub delay_num: u16,
    pub delay_den: u16,
    pub dispose_op: DisposeOp,
    pub blend_op: BlendOp,
}

impl FrameControl {
    /// Full-canvas placement with no delay, used for the default image.
    pub(crate) fn full_canvas(width: u32, height: u32) -> FrameControl {
        FrameControl {
            x: 0,
            y: 0,
            width,
            height,
            delay_num: 0,
            delay_den: 100,
            dispose_op: DisposeOp::None,
            blend_op: BlendOp::Source,
        }
    }

    /// Delay before advancing past this frame, in milliseconds, rounded to
    /// the nearest integer. A zero denominator stands for 100.
    pub fn delay_ms(&self) -> i32 {
        let den = if self.delay_den == 0 { 100 } else { self.delay_den as u32 };
        let num = 1000 * self.delay_num as u32;

        ((num + den / 2) / den) as i32
    }
}

/// Contents of the acTL chunk.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct AnimationControl {
    pub num_frames: u32,
    pub num_plays: u32,
}

impl AnimationControl {
    /// Number of replays beyond the first play; -1 for infinite.
    pub fn loop_count(&self) -> i32 {
        if self.num_plays == 0 {
            -1
        } else {
            (self.num_plays - 1).min(i32::MAX as u32) as i32
        }
    }
}

/// Composes normalized frame rasters onto the persistent canvas, honoring
/// the dispose and blend rules, and collects the output sequence.
///
/// Frames flow through four calls per frame: `set_frame_info` announces the
/// placement, `set_row` deposits each normalized row, `finish_frame`
/// composites and emits, and `finish_stream` closes the session.
pub struct Compositor {
    canvas: Raster,
    meta: FrameControl,
    frame_pixels: Raster,
    saved_canvas: Option<Raster>,
    is_animated: bool,
    skip_first: bool,
    expected_frames: u32,
    emitted: u32,
    sequence: DecodedSequence,
}

impl Compositor {
    /// Allocates the canvas and fixes the animation parameters for one
    /// decode session. `skip_first` marks the hidden default image of an
    /// animated stream.
    pub fn new(
        width: u32,
        height: u32,
        animation: Option<&AnimationControl>,
        skip_first: bool,
    ) -> Compositor {
        let loop_count = animation.map(|a| a.loop_count()).unwrap_or(0);

        Compositor {
            canvas: Raster::new(width, height),
            meta: FrameControl::full_canvas(width, height),
            frame_pixels: Raster::new(width, height),
            saved_canvas: None,
            is_animated: animation.is_some(),
            skip_first,
            expected_frames: animation.map(|a| a.num_frames).unwrap_or(1),
            emitted: 0,
            sequence: DecodedSequence::new(loop_count),
        }
    }

    /// Announces the next frame's placement. The caller has already
    /// validated the region against the canvas.
    pub fn set_frame_info(&mut self, meta: FrameControl) {
        if meta.width != self.frame_pixels.width() || meta.height != self.frame_pixels.height() {
            self.frame_pixels = Raster::new(meta.width, meta.height);
        } else {
            self.frame_pixels.clear();
        }

        self.meta = meta;
    }

    /// Deposits one normalized RGBA row of the current frame.
    pub fn set_row(&mut self, row: u32, pixels: &[u8]) {
        self.frame_pixels.row_mut(row).copy_from_slice(pixels);
    }

    /// Completes stream frame `index`: composites the scratch raster onto
    /// the canvas, emits a copy of the canvas, then applies disposal.
    ///
    /// The first displayed frame always replaces the canvas region
    /// outright, and a `Previous` disposal on it falls back to
    /// `Background`, so its output never depends on prior canvas content.
    pub fn finish_frame(&mut self, index: u32) {
        if index == 0 && self.skip_first {
            // hidden first frame: decoded, never emitted
            return;
        }

        let first_visible =
            (index == 0 && !self.skip_first) || (index == 1 && self.skip_first);

        if first_visible {
            self.meta.blend_op = BlendOp::Source;
            if self.meta.dispose_op == DisposeOp::Previous {
                self.meta.dispose_op = DisposeOp::Background;
            }
        }

        if self.meta.dispose_op == DisposeOp::Previous {
            self.saved_canvas = Some(self.canvas.clone());
        }

        match self.meta.blend_op {
            BlendOp::Source => self.blit_source(),
            BlendOp::Over => self.blend_over(),
        }

        self.sequence.push(self.canvas.clone(), self.meta.delay_ms());
        self.emitted += 1;

        match self.meta.dispose_op {
            DisposeOp::None => {}
            DisposeOp::Background => {
                self.canvas
                    .clear_region(self.meta.x, self.meta.y, self.meta.width, self.meta.height);
            }
            DisposeOp::Previous => {
                if let Some(saved) = self.saved_canvas.take() {
                    self.canvas = saved;
                }
            }
        }
    }

    /// Closes the session. An animated stream that announced more frames
    /// than it delivered still succeeds as long as something was emitted.
    pub fn finish_stream(self) -> ApngResult<DecodedSequence> {
        if self.is_animated {
            if self.emitted < self.expected_frames {
                log_warn!(
                    "Stream announced {} frames but contained {}",
                    self.expected_frames,
                    self.emitted
                );
            }

            if self.emitted == 0 {
                return Err(ApngError::EmptyResult);
            }
        }

        Ok(self.sequence)
    }

    fn blit_source(&mut self) {
        let stride = self.frame_pixels.stride();

        for y in 0..self.meta.height {
            let src = self.frame_pixels.row(y);
            let dst = self.canvas.row_mut(self.meta.y + y);
            let start = self.meta.x as usize * 4;

            dst[start..start + stride].copy_from_slice(src);
        }
    }

    // Straight-alpha source-over-destination, rounded to nearest
    fn blend_over(&mut self) {
        for y in 0..self.meta.height {
            for x in 0..self.meta.width {
                let src = self.frame_pixels.pixel(x, y);
                let sa = src[3] as u32;

                if sa == 0 {
                    continue;
                }

                let out_x = self.meta.x + x;
                let out_y = self.meta.y + y;

                if sa == 255 {
                    self.canvas.put_pixel(out_x, out_y, src);
                    continue;
                }

                let dst = self.canvas.pixel(out_x, out_y);
                let da = dst[3] as u32;

                // 255^2 times the resulting alpha fraction; nonzero since sa > 0
                let out_alpha_num = sa * 255 + da * (255 - sa);

                let mut out = [0u8; 4];
                for channel in 0..3 {
                    let num = 255 * src[channel] as u32 * sa + dst[channel] as u32 * da * (255 - sa);
                    out[channel] = ((num + out_alpha_num / 2) / out_alpha_num).min(255) as u8;
                }
                out[3] = ((out_alpha_num + 127) / 255) as u8;

                self.canvas.put_pixel(out_x, out_y, out);
            }
        }
    }
}
