//! Thin client for the tile feed.
//!
//! Rebuilds stream grids from updates, composites them into terminal windows,
//! and interprets the indicator table against the mirrored coffers to produce
//! status text. Nothing here blocks on the network; callers feed it decoded
//! frames.

mod decoder;
mod error;
pub mod format;
mod handoff;
mod interpreter;
mod session;
mod window;

pub use decoder::StreamDecoder;
pub use error::{DecodeError, SessionError};
pub use handoff::{handoff, Publisher, Subscriber};
pub use interpreter::{render_all, render_indicator, RenderContext, Span};
pub use session::{ClientSession, SessionEvent, SessionStats};
pub use window::Window;
