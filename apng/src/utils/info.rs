use serde::Serialize;

use crate::animation::{AnimationControl, FrameControl};
use crate::pipeline::ColorType;

/// Everything the decoder learned about the stream, for reporting and
/// debugging. Populated during `decode`.
#[derive(Debug, Clone, Serialize)]
pub struct ApngInfo {
    pub width: u32,
    pub height: u32,
    pub bit_depth: u8,
    pub color_type: ColorType,
    pub interlace: bool,
    pub palette_entries: usize,
    pub animation: Option<AnimationControl>,
    pub hidden_first_frame: bool,
    pub frame_controls: Vec<FrameControl>,
    pub gamma: Option<f32>,
    pub physical_dimensions: Option<PhysicalDimensions>,
    pub modification_time: Option<ImageTime>,
    pub text_chunks: Vec<TextChunk>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct PhysicalDimensions {
    pub pixels_per_unit_x: u32,
    pub pixels_per_unit_y: u32,
    pub unit: PhysicalUnit,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum PhysicalUnit {
    Unknown,
    Meter,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct TextChunk {
    pub keyword: String,
    pub text: String,
}
