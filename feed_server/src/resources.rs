use std::{collections::HashMap, sync::Arc};

use bevy::prelude::*;
use feed_schema::Schema;

use crate::components::ConnectionId;

/// The validated schema every connection is served from.
#[derive(Resource, Debug, Clone)]
pub struct FeedSchema(pub Arc<Schema>);

impl FeedSchema {
    pub fn schema(&self) -> &Schema {
        &self.0
    }
}

/// Simulation tick counter, stamped on every outgoing frame.
#[derive(Resource, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FeedTick(pub u64);

#[derive(Resource, Debug, Default)]
pub struct ConnectionIndex {
    entities: HashMap<ConnectionId, Entity>,
}

impl ConnectionIndex {
    pub fn insert(&mut self, id: ConnectionId, entity: Entity) -> Option<Entity> {
        self.entities.insert(id, entity)
    }

    pub fn remove(&mut self, id: ConnectionId) -> Option<Entity> {
        self.entities.remove(&id)
    }

    pub fn get(&self, id: ConnectionId) -> Option<Entity> {
        self.entities.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Serialized frames produced by the last tick, awaiting the transport.
#[derive(Resource, Debug, Default)]
pub struct OutboundFrames {
    frames: Vec<(ConnectionId, Vec<u8>)>,
}

impl OutboundFrames {
    pub fn push(&mut self, connection: ConnectionId, frame: Vec<u8>) {
        self.frames.push((connection, frame));
    }

    pub fn take(&mut self) -> Vec<(ConnectionId, Vec<u8>)> {
        std::mem::take(&mut self.frames)
    }
}
