//! Coprocessor wire protocol.
//!
//! Every exchange is one fixed-shape [`Message`]. A request names the
//! primitive in `opcode`, the device address of its parameter block in
//! `arg1` and the block's length in 32-bit words in `arg2`. The reply echoes
//! the opcode, carries a [`Status`] in `arg1` and an opcode-specific scalar
//! in `arg2`.
//!
//! Parameter blocks and data buffers live in shared memory and are encoded
//! little-endian: sample arrays as Q15 `i16`, scalars as scale-15 `i32`,
//! pixels as bytes and integral tables as `u64`.

use crate::fixed::Fixed;
use crate::util::{CornerMatchError, CornerMatchResult};

/// Primitive requested from the coprocessor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Opens the capability session.
    Open,
    /// Closes the capability session.
    Close,
    /// One separable convolution pass.
    Convolve,
    /// Patch statistics.
    PatchStats,
    /// Best NCC window of a query.
    NccArea,
    /// Integral tables of a frame.
    ImageData,
}

impl Opcode {
    /// Wire encoding.
    pub fn code(self) -> u32 {
        match self {
            Opcode::Open => 1,
            Opcode::Close => 2,
            Opcode::Convolve => 3,
            Opcode::PatchStats => 4,
            Opcode::NccArea => 5,
            Opcode::ImageData => 6,
        }
    }

    /// Decodes the wire encoding.
    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            1 => Opcode::Open,
            2 => Opcode::Close,
            3 => Opcode::Convolve,
            4 => Opcode::PatchStats,
            5 => Opcode::NccArea,
            6 => Opcode::ImageData,
            _ => return None,
        })
    }
}

/// Completion status of a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    /// The primitive ran and its outputs are in shared memory.
    Finished,
    /// The primitive could not run.
    Failed,
}

impl Status {
    /// Wire encoding.
    pub fn code(self) -> u32 {
        match self {
            Status::Finished => 0,
            Status::Failed => 1,
        }
    }

    /// Decodes the wire encoding; unknown codes read as `Failed`.
    pub fn from_code(code: u32) -> Self {
        if code == 0 {
            Status::Finished
        } else {
            Status::Failed
        }
    }
}

/// One protocol message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Message {
    /// Opcode wire code.
    pub opcode: u32,
    /// Request: parameter block address. Reply: status.
    pub arg1: u32,
    /// Request: parameter block words. Reply: scalar result.
    pub arg2: u32,
}

impl Message {
    /// Builds a request.
    pub fn request(opcode: Opcode, params: u32, words: u32) -> Self {
        Self {
            opcode: opcode.code(),
            arg1: params,
            arg2: words,
        }
    }

    /// Builds a reply.
    pub fn reply(opcode: u32, status: Status, value: u32) -> Self {
        Self {
            opcode,
            arg1: status.code(),
            arg2: value,
        }
    }

    /// Decoded opcode, if known.
    pub fn kind(&self) -> Option<Opcode> {
        Opcode::from_code(self.opcode)
    }

    /// Reply status.
    pub fn status(&self) -> Status {
        Status::from_code(self.arg1)
    }
}

/// Words of a [`Opcode::Convolve`] block:
/// `[src, dst, width, height, taps, tap_count, axis]`.
pub const CONVOLVE_WORDS: usize = 7;
/// Words of a [`Opcode::PatchStats`] block: `[pixels, size, out]`.
pub const PATCH_STATS_WORDS: usize = 3;
/// Words of an [`Opcode::ImageData`] block: `[frame, width, height, tables]`.
pub const IMAGE_DATA_WORDS: usize = 4;
/// Words of an [`Opcode::NccArea`] block:
/// `[frame, width, height, tables | 0, patch, size, windows | 0, count, result]`.
///
/// A zero `tables` address selects direct statistics, a zero `windows`
/// address selects a dense scan.
pub const NCC_AREA_WORDS: usize = 9;
/// Words of an NCC result: `[found, row, col, score]`.
pub const NCC_RESULT_WORDS: usize = 4;
/// Scalar words leading a patch stats record:
/// `[average, square_sum, normalized_sum]`, followed by `size^2` Q15 samples.
pub const PATCH_HEADER_WORDS: usize = 3;

/// Bytes of a patch stats record for a `size x size` patch.
pub fn patch_record_len(size: usize) -> usize {
    PATCH_HEADER_WORDS * 4 + size * size * 2
}

/// Encodes `u32` words.
pub fn encode_u32s(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

/// Decodes `u32` words; trailing bytes are ignored.
pub fn decode_u32s(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Encodes samples as Q15 words.
pub fn encode_q15(samples: &[Fixed]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|s| s.to_q15().to_le_bytes())
        .collect()
}

/// Decodes Q15 words.
pub fn decode_q15(bytes: &[u8]) -> Vec<Fixed> {
    bytes
        .chunks_exact(2)
        .map(|c| Fixed::from_q15(i16::from_le_bytes([c[0], c[1]])))
        .collect()
}

/// Encodes a scale-15 scalar.
pub fn encode_scalar(value: Fixed) -> u32 {
    value.rescale(15).raw() as u32
}

/// Decodes a scale-15 scalar.
pub fn decode_scalar(word: u32) -> Fixed {
    Fixed::from_raw(word as i32, 15)
}

/// Encodes `u64` words.
pub fn encode_u64s(words: &[u64]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

/// Decodes `u64` words.
pub fn decode_u64s(bytes: &[u8]) -> Vec<u64> {
    bytes
        .chunks_exact(8)
        .map(|c| u64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
        .collect()
}

/// Reads word `index` of a decoded parameter block.
pub fn param(words: &[u32], index: usize) -> CornerMatchResult<u32> {
    words
        .get(index)
        .copied()
        .ok_or(CornerMatchError::InvalidInput("parameter block too short"))
}
