use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("stream update truncated: {needed} more bytes needed")]
    Truncated { needed: usize },
    #[error("unknown rle mode tag {0}")]
    UnknownMode(u8),
    #[error("malformed stream: runs cover {actual} cells, header declares {expected}")]
    MalformedStream { expected: usize, actual: usize },
    #[error("zero-length run at payload offset {0}")]
    ZeroRun(usize),
    #[error("continued run changes value at payload offset {0}")]
    BrokenContinuation(usize),
    #[error("{0} trailing bytes after stream payload")]
    TrailingBytes(usize),
    #[error("run count varint does not terminate")]
    VarintOverflow,
    #[error("frame of {0} bytes exceeds the frame limit")]
    FrameTooLarge(usize),
    #[error("frame i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("failed to encode or decode message: {0}")]
    Codec(#[from] bincode::Error),
}
