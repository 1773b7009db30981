use std::fmt;

use bevy::prelude::*;
use feed_proto::{encode_server, CofferWrite, Grid, ServerMessage};
use feed_schema::{CofferBank, StreamRegistry, MAX_STREAMS};

/// Transport-assigned identity of one client connection.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// The connection's coffer bank plus a copy of what its client last saw.
#[derive(Component, Debug, Clone, Default)]
pub struct Coffers {
    pub bank: CofferBank,
    sent: CofferBank,
}

impl Coffers {
    /// Coffers written since the previous call, marking them as sent.
    pub fn take_changes(&mut self) -> Vec<CofferWrite> {
        let changes: Vec<CofferWrite> = self
            .bank
            .changed_since(&self.sent)
            .map(|(index, value)| CofferWrite { index, value })
            .collect();
        if !changes.is_empty() {
            self.sent.clone_from(&self.bank);
        }
        changes
    }
}

/// This tick's contents of every stream, as written by the simulation.
#[derive(Component, Debug, Clone)]
pub struct StreamGrids {
    grids: Vec<Option<Grid>>,
}

impl StreamGrids {
    pub fn for_registry(registry: &StreamRegistry) -> Self {
        let mut grids = vec![None; MAX_STREAMS];
        for def in registry.iter() {
            grids[def.id as usize] = Some(Grid::with_row_capacity(
                def.cols,
                def.rows,
                def.capacity_rows(),
            ));
        }
        Self { grids }
    }

    pub fn get(&self, stream: u8) -> Option<&Grid> {
        self.grids.get(stream as usize)?.as_ref()
    }

    pub fn get_mut(&mut self, stream: u8) -> Option<&mut Grid> {
        self.grids.get_mut(stream as usize)?.as_mut()
    }
}

/// Messages queued for the connection until the end of the tick.
#[derive(Component, Debug, Default)]
pub struct Outbox {
    messages: Vec<ServerMessage>,
}

impl Outbox {
    pub fn push(&mut self, message: ServerMessage) {
        self.messages.push(message);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Serialize and clear the queue. A message that fails to encode is
    /// logged and dropped.
    pub fn drain_encoded(&mut self, connection: ConnectionId) -> Vec<Vec<u8>> {
        self.messages
            .drain(..)
            .filter_map(|message| match encode_server(&message) {
                Ok(bytes) => Some(bytes),
                Err(err) => {
                    tracing::error!(
                        target: "tile_feed::server",
                        %connection,
                        error = %err,
                        "outbox.encode_failed"
                    );
                    None
                }
            })
            .collect()
    }
}
