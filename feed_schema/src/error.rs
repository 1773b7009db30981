use std::{io, path::PathBuf};

use thiserror::Error;

/// A schema record that cannot be loaded. Always fatal: it is a build or
/// configuration defect, never a runtime condition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    #[error("stream id {0} exceeds the registry capacity")]
    StreamIdOutOfRange(u8),
    #[error("stream id {0} is declared twice")]
    DuplicateStream(u8),
    #[error("stream {id} has invalid dimensions {cols}x{rows} (max_rows {max_rows})")]
    StreamDimensions {
        id: u8,
        cols: u16,
        rows: u16,
        max_rows: u16,
    },
    #[error("stream {id} must target exactly one window kind, got {bits:#x}")]
    StreamWindow { id: u8, bits: u32 },
    #[error("indicator id {0} exceeds the table capacity")]
    IndicatorIdOutOfRange(u8),
    #[error("indicator id {0} is declared twice")]
    DuplicateIndicator(u8),
    #[error("indicator {indicator} reads coffers {first}..={last}, past the bank capacity")]
    CofferOutOfRange { indicator: u8, first: usize, last: usize },
    #[error("indicator {0} is not bound to any coffer")]
    EmptyCofferSequence(u8),
    #[error("indicator {indicator} carries unknown flag bits {bits:#010x}")]
    UnknownBits { indicator: u8, bits: u32 },
    #[error("indicator {0} declares more than one stride policy")]
    ConflictingStride(u8),
    #[error("indicator {0} inverts a stride test it does not declare")]
    InvertWithoutStride(u8),
    #[error("indicator {0} compares neighbouring coffers but is bound to a single coffer")]
    StrideNeedsSequence(u8),
    #[error("indicator {0} declares more than one stop policy")]
    ConflictingStop(u8),
    #[error("indicator {0} declares {1} text formats, expected exactly one")]
    TextFormatCount(u8, u32),
    #[error("indicator {0} declares contradictory control operations")]
    ConflictingControls(u8),
    #[error("indicator {0} declares control operations but its prompt has no trigger point")]
    UnusedControls(u8),
    #[error("indicator {indicator} references unknown label table {name:?}")]
    MissingLabelTable { indicator: u8, name: String },
    #[error("indicator {indicator} references unknown likert scale {name:?}")]
    MissingLikertScale { indicator: u8, name: String },
    #[error("likert scale {0:?} must have strictly ascending thresholds")]
    UnsortedLikert(String),
    #[error("indicator {0} mixes string display with a numeric text format")]
    StringDisplayMismatch(u8),
    #[error("indicator {indicator} has a malformed prompt: {reason}")]
    Template { indicator: u8, reason: String },
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to parse schema: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read schema from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid schema definition: {0}")]
    Definition(#[from] DefinitionError),
}
