//! Error types for cornermatch.

use thiserror::Error;

/// Result alias for cornermatch operations.
pub type CornerMatchResult<T> = std::result::Result<T, CornerMatchError>;

/// Coarse classification of failures.
///
/// Allocation and protocol failures abort the enclosing operation and are
/// turned into a neutral result by the non-`try_` entry points. Misuse is a
/// programming error and is never retried.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid caller input (dimensions, parameters, file contents).
    Input,
    /// A local or backend buffer could not be obtained.
    Allocation,
    /// The coprocessor replied with an unexpected opcode or a failure status.
    Protocol,
    /// An API was used out of order or on an unknown buffer.
    Misuse,
}

/// Errors that can occur when running cornermatch algorithms.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CornerMatchError {
    /// The input data or parameters are invalid.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// Image dimensions are zero or overflow.
    #[error("invalid dimensions {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },
    /// Row stride is smaller than the row width.
    #[error("stride {stride} is smaller than width {width}")]
    InvalidStride { width: usize, stride: usize },
    /// The backing buffer is shorter than the declared image.
    #[error("buffer too small: needed {needed}, got {got}")]
    BufferTooSmall { needed: usize, got: usize },
    /// A region of interest does not fit inside the image.
    #[error("roi {width}x{height} at ({x}, {y}) exceeds image {img_width}x{img_height}")]
    RoiOutOfBounds {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
        img_width: usize,
        img_height: usize,
    },
    /// A local buffer allocation failed.
    #[error("failed to allocate {bytes} bytes")]
    Allocation { bytes: usize },
    /// The shared memory pool cannot satisfy a request.
    #[error("shared memory exhausted: requested {requested} bytes, {available} available")]
    PoolExhausted { requested: usize, available: usize },
    /// A host or device address is not registered with the pool.
    #[error("address {addr:#010x} is not a registered shared buffer")]
    UnregisteredBuffer { addr: u32 },
    /// A shared buffer was touched by the side that does not own it.
    #[error("buffer {addr:#010x} is owned by the {owner}")]
    BufferNotOwned { addr: u32, owner: &'static str },
    /// A shared buffer access runs past the end of the buffer.
    #[error("access of {len} bytes at offset {offset} exceeds buffer {addr:#010x} of {size} bytes")]
    BufferOverrun {
        addr: u32,
        offset: usize,
        len: usize,
        size: usize,
    },
    /// A session operation was issued in the wrong state.
    #[error("cannot {operation} while session is {state}")]
    InvalidSessionState {
        operation: &'static str,
        state: &'static str,
    },
    /// A reply carried a different opcode than the outstanding request.
    #[error("expected reply to opcode {expected}, got {got}")]
    UnexpectedOpcode { expected: u32, got: u32 },
    /// The coprocessor reported a FAILED status.
    #[error("coprocessor failed to execute opcode {opcode}")]
    RemoteFailure { opcode: u32 },
    /// The message link to the coprocessor is closed.
    #[error("coprocessor link closed")]
    LinkClosed,
    /// Integral statistics were requested before `image_data` ran.
    #[error("integral image data has not been computed for this frame")]
    MissingImageData,
    /// Image decoding failed.
    #[error("image io: {reason}")]
    ImageIo { reason: String },
}

impl CornerMatchError {
    /// Returns the failure class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_)
            | Self::InvalidDimensions { .. }
            | Self::InvalidStride { .. }
            | Self::BufferTooSmall { .. }
            | Self::RoiOutOfBounds { .. }
            | Self::ImageIo { .. } => ErrorKind::Input,
            Self::Allocation { .. } | Self::PoolExhausted { .. } => ErrorKind::Allocation,
            Self::UnexpectedOpcode { .. } | Self::RemoteFailure { .. } | Self::LinkClosed => {
                ErrorKind::Protocol
            }
            Self::UnregisteredBuffer { .. }
            | Self::BufferNotOwned { .. }
            | Self::BufferOverrun { .. }
            | Self::InvalidSessionState { .. }
            | Self::MissingImageData => ErrorKind::Misuse,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CornerMatchError, ErrorKind};

    #[test]
    fn errors_classify_into_taxonomy() {
        assert_eq!(
            CornerMatchError::PoolExhausted {
                requested: 8,
                available: 0
            }
            .kind(),
            ErrorKind::Allocation
        );
        assert_eq!(
            CornerMatchError::RemoteFailure { opcode: 3 }.kind(),
            ErrorKind::Protocol
        );
        assert_eq!(
            CornerMatchError::UnregisteredBuffer { addr: 0x40 }.kind(),
            ErrorKind::Misuse
        );
        assert_eq!(
            CornerMatchError::InvalidInput("k").kind(),
            ErrorKind::Input
        );
    }
}
