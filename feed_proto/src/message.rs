use std::io::{self, Read, Write};

use feed_schema::{SchemaFile, StreamGroup};
use serde::{Deserialize, Serialize};

use crate::error::ProtoError;

/// Upper bound on a single frame. Anything larger is a corrupt prefix.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CofferWrite {
    pub index: u8,
    pub value: i16,
}

/// Everything one connection receives for one simulation tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickFrame {
    pub tick: u64,
    /// Coffers that changed since the previous frame.
    pub coffers: Vec<CofferWrite>,
    /// Encoded [`crate::StreamUpdate`] records.
    pub updates: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerMessage {
    /// Sent once on connect.
    Schema(SchemaFile),
    Listing(Vec<StreamGroup>),
    Tick(TickFrame),
    /// Externally supplied text for a string indicator.
    IndicatorText { indicator: u8, text: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientMessage {
    Subscribe(u8),
    Unsubscribe(u8),
    RequestListing,
}

pub fn encode_server(message: &ServerMessage) -> bincode::Result<Vec<u8>> {
    bincode::serialize(message)
}

pub fn decode_server(bytes: &[u8]) -> bincode::Result<ServerMessage> {
    bincode::deserialize(bytes)
}

pub fn encode_client(message: &ClientMessage) -> bincode::Result<Vec<u8>> {
    bincode::serialize(message)
}

pub fn decode_client(bytes: &[u8]) -> bincode::Result<ClientMessage> {
    bincode::deserialize(bytes)
}

pub fn encode_server_json(message: &ServerMessage) -> serde_json::Result<String> {
    serde_json::to_string(message)
}

pub fn decode_server_json(data: &str) -> serde_json::Result<ServerMessage> {
    serde_json::from_str(data)
}

/// Prefix `payload` with its `u32` little-endian length.
pub fn frame(payload: &[u8]) -> Vec<u8> {
    let mut buffer = Vec::with_capacity(4 + payload.len());
    buffer.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buffer.extend_from_slice(payload);
    buffer
}

pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    writer.write_all(&frame(payload))
}

/// Read one length-prefixed frame, blocking until it is complete.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Vec<u8>, ProtoError> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(ProtoError::FrameTooLarge(len));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    Ok(payload)
}
