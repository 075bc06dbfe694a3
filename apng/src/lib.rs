mod animation;
mod chunks;
mod decoder;
mod pipeline;
mod playback;
mod utils;

pub use animation::{AnimationControl, BlendOp, DisposeOp, FrameControl};
pub use chunks::{recognize, PNG_SIGNATURE};
pub use decoder::ApngDecoder;
pub use pipeline::ColorType;
pub use playback::{
    capabilities, create_handler, ApngHandler, Capabilities, ImageOption, OptionValue, FORMAT,
};
pub use utils::error::{ApngError, ApngResult};
pub use utils::info::{ApngInfo, ImageTime, PhysicalDimensions, PhysicalUnit, TextChunk};
pub use utils::raster::{DecodedSequence, Raster};

use std::io::{Read, Seek};

/// Decodes a PNG or APNG stream into its composed frame sequence.
///
/// Reads from `source` without closing it. A plain PNG decodes to a single
/// frame with delay 0 and loop count 0; an animated stream decodes to one
/// canvas-sized frame per animation frame, in stream order.
pub fn decode<R: Read + Seek>(source: R) -> ApngResult<DecodedSequence> {
    let mut decoder = ApngDecoder::new(source);

    decoder.decode()
}
