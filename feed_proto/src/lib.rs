//! Wire format for the tile feed.
//!
//! Stream updates use a compact hand-rolled run-length encoding (see
//! [`rle`]); everything around them travels in a bincode envelope inside
//! length-prefixed frames.

mod cell;
mod error;
mod message;
pub mod rle;
mod update;

pub use cell::{Cell, Grid};
pub use error::ProtoError;
pub use message::{
    decode_client, decode_server, decode_server_json, encode_client, encode_server,
    encode_server_json, frame, read_frame, write_frame, ClientMessage, CofferWrite, ServerMessage,
    TickFrame, MAX_FRAME_LEN,
};
pub use rle::RleMode;
pub use update::{StreamUpdate, HEADER_LEN};
