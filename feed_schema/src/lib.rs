//! Shared data contracts for the tile feed.
//!
//! Both the server and the thin client load the same schema: the stream
//! registry describing every grid channel, and the indicator table that tells
//! the client how to turn coffer values into status text. Packed flag words
//! are decoded here, once, so nothing downstream ever tests raw bits.

mod coffer;
mod color;
mod config;
mod error;
mod indicator;
mod stream;
mod template;
mod window;

pub use coffer::{CofferBank, CofferValue, COFFER_EMPTY};
pub use color::{attr_from_letter, letter_for_attr, TERM_DARK, TERM_L_WHITE, TERM_WHITE};
pub use config::{
    load_schema_from_env, LikertBucket, Schema, SchemaFile, SchemaMetadata, BUILTIN_SCHEMA,
};
pub use error::{DefinitionError, SchemaError};
pub use indicator::{
    ControlOp, DisplayType, IndicatorBits, IndicatorConfig, IndicatorDef, IndicatorFilter,
    IndicatorRecord, IndicatorTable, StopPolicy, Stride, StrideTest, TextFormat,
};
pub use stream::{StreamDef, StreamFlags, StreamGroup, StreamRegistry};
pub use template::{Directive, DirectiveKind, Piece, Template, TriggerColor};
pub use window::WindowFlags;

/// Number of stream slots a registry can hold.
pub const MAX_STREAMS: usize = 20;

/// Number of indicator slots an indicator table can hold.
pub const MAX_INDICATORS: usize = 50;

/// Capacity of every coffer bank.
pub const MAX_COFFERS: usize = 255;

/// Number of client terminals a stream can be routed to.
pub const MAX_TERMS: usize = 8;

/// Largest magnitude a coffer can hold.
pub const MAX_SHORT: i16 = 32767;
