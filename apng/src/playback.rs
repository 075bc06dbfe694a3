use std::io::{Read, Seek};

use crate::chunks;
use crate::decoder::ApngDecoder;
use crate::log_warn;
use crate::utils::raster::{DecodedSequence, Raster};

/// Format token the plugin answers to.
pub const FORMAT: &str = "apng";

/// What the plugin offers for a stream presented under a format token.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Capabilities {
    pub can_read: bool,
}

/// Queries a handler can be asked about its stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ImageOption {
    Animation,
    Size,
}

/// Answers to an [`ImageOption`] query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OptionValue {
    Animation(bool),
    Size { width: u32, height: u32 },
}

/// Reports read capability for the explicit format token only. Signature
/// sniffing stays out of capability detection; direct callers can still
/// probe a device through [`ApngHandler::can_read`].
pub fn capabilities(format: &str) -> Capabilities {
    Capabilities {
        can_read: format == FORMAT,
    }
}

/// Binds a byte source and returns a playback handler for it.
pub fn create_handler<R: Read + Seek>(device: R) -> ApngHandler<R> {
    ApngHandler::new(device)
}

enum HandlerState<R: Read + Seek> {
    Unparsed(R),
    Parsed(Option<DecodedSequence>),
}

/// Frame-by-frame view over a decoded sequence, driven by a cursor.
///
/// The bound device is decoded once, on the first query that needs frames.
/// After a failed decode the handler stays usable and empty: zero images,
/// no animation, `read` returns false.
pub struct ApngHandler<R: Read + Seek> {
    state: HandlerState<R>,
    current_frame: usize,
}

impl<R: Read + Seek> ApngHandler<R> {
    pub fn new(device: R) -> ApngHandler<R> {
        ApngHandler {
            state: HandlerState::Unparsed(device),
            current_frame: 0,
        }
    }

    /// Whether the bound device starts with a PNG signature. Leaves the
    /// device position unchanged and does not trigger a parse.
    pub fn can_read(&mut self) -> bool {
        match &mut self.state {
            HandlerState::Unparsed(device) => chunks::recognize(device),
            HandlerState::Parsed(sequence) => sequence.is_some(),
        }
    }

    fn ensure_parsed(&mut self) -> Option<&DecodedSequence> {
        if let HandlerState::Unparsed(_) = self.state {
            let device = match std::mem::replace(&mut self.state, HandlerState::Parsed(None)) {
                HandlerState::Unparsed(device) => device,
                HandlerState::Parsed(_) => unreachable!(),
            };

            let mut decoder = ApngDecoder::new(device);

            match decoder.decode() {
                Ok(sequence) => self.state = HandlerState::Parsed(Some(sequence)),
                Err(e) => log_warn!("Decode failed: {}", e),
            }
        }

        match &self.state {
            HandlerState::Parsed(sequence) => sequence.as_ref(),
            HandlerState::Unparsed(_) => unreachable!(),
        }
    }

    pub fn image_count(&mut self) -> usize {
        self.ensure_parsed().map(|s| s.len()).unwrap_or(0)
    }

    pub fn current_index(&self) -> usize {
        self.current_frame
    }

    /// Copies the current frame into `out` and advances the cursor. A
    /// cursor past the end wraps to the first frame before reading. Fails
    /// only when there are no frames.
    pub fn read(&mut self, out: &mut Raster) -> bool {
        let current = self.current_frame;

        let (frame, index) = match self.ensure_parsed() {
            Some(sequence) if !sequence.is_empty() => {
                let index = if current >= sequence.len() { 0 } else { current };
                (sequence.frames()[index].clone(), index)
            }
            _ => return false,
        };

        *out = frame;
        self.current_frame = index + 1;

        true
    }

    /// Moves the cursor to `index`. Returns whether the new position names
    /// an existing frame.
    pub fn jump_to(&mut self, index: usize) -> bool {
        let count = self.image_count();
        self.current_frame = index;

        index < count
    }

    pub fn jump_to_next(&mut self) -> bool {
        let count = self.image_count();
        self.current_frame += 1;

        self.current_frame < count
    }

    /// Delay in milliseconds to wait before showing the frame at the
    /// cursor; the delay of the frame just read.
    pub fn next_delay_ms(&mut self) -> i32 {
        let current = self.current_frame;

        match self.ensure_parsed() {
            Some(sequence) if !sequence.is_empty() => {
                if current > 0 && current <= sequence.len() {
                    sequence.delays_ms()[current - 1]
                } else {
                    sequence.delays_ms()[0]
                }
            }
            _ => 0,
        }
    }

    pub fn loop_count(&mut self) -> i32 {
        self.ensure_parsed().map(|s| s.loop_count()).unwrap_or(0)
    }

    pub fn supports_option(&self, option: ImageOption) -> bool {
        matches!(option, ImageOption::Animation | ImageOption::Size)
    }

    pub fn option(&mut self, option: ImageOption) -> Option<OptionValue> {
        let sequence = self.ensure_parsed();

        match option {
            ImageOption::Animation => {
                let animated = sequence.map(|s| !s.is_empty()).unwrap_or(false);
                Some(OptionValue::Animation(animated))
            }
            ImageOption::Size => {
                sequence.and_then(|s| s.frame(0)).map(|frame| OptionValue::Size {
                    width: frame.width(),
                    height: frame.height(),
                })
            }
        }
    }
}
