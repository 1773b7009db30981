use feed_proto::ProtoError;
use feed_schema::DefinitionError;
use thiserror::Error;

/// Why a single stream update was not applied. The grid it targeted keeps
/// its last good contents.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("stream {0} is not in the schema")]
    UnknownStream(u8),
    #[error("update for stream {stream} rejected: {source}")]
    Malformed {
        stream: u8,
        #[source]
        source: ProtoError,
    },
    #[error("update for stream {stream} is {width}x{height}, larger than its {cols}x{rows} buffer")]
    Oversized {
        stream: u8,
        width: u16,
        height: u16,
        cols: u16,
        rows: u16,
    },
    #[error("update header unreadable: {0}")]
    Header(#[source] ProtoError),
}

/// Failures that end a client session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("server schema rejected: {0}")]
    Schema(#[from] DefinitionError),
    #[error("failed to decode server message: {0}")]
    Message(#[from] bincode::Error),
}
