//! Subscriptions and per-stream encoders for one connection.

use bevy::prelude::*;
use feed_proto::RleMode;
use feed_schema::{StreamRegistry, MAX_STREAMS};

use crate::{components::StreamGrids, encoder::StreamEncoder, metrics::EncodeStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    Subscribed,
    AlreadySubscribed,
    UnknownStream,
}

#[derive(Component, Debug)]
pub struct Session {
    encoders: Vec<Option<StreamEncoder>>,
}

impl Session {
    /// A fresh session, already subscribed to every AUTO stream.
    pub fn new(registry: &StreamRegistry) -> Self {
        let mut session = Self {
            encoders: vec![None; MAX_STREAMS],
        };
        for def in registry.auto_subscribed() {
            session.encoders[def.id as usize] = Some(StreamEncoder::new(def));
        }
        session
    }

    /// Hidden streams are never listed but may still be requested by id.
    pub fn subscribe(&mut self, registry: &StreamRegistry, stream: u8) -> SubscribeOutcome {
        let Some(def) = registry.get(stream) else {
            return SubscribeOutcome::UnknownStream;
        };
        let slot = &mut self.encoders[def.id as usize];
        if slot.is_some() {
            return SubscribeOutcome::AlreadySubscribed;
        }
        *slot = Some(StreamEncoder::new(def));
        SubscribeOutcome::Subscribed
    }

    /// Drop a subscription along with its baseline.
    pub fn unsubscribe(&mut self, stream: u8) -> bool {
        self.encoders
            .get_mut(stream as usize)
            .and_then(Option::take)
            .is_some()
    }

    pub fn is_subscribed(&self, stream: u8) -> bool {
        matches!(self.encoders.get(stream as usize), Some(Some(_)))
    }

    pub fn subscriptions(&self) -> impl Iterator<Item = u8> + '_ {
        self.encoders
            .iter()
            .flatten()
            .map(|encoder| encoder.stream())
    }

    /// Encode every subscribed stream in id order. Delta channels with no
    /// changes produce nothing.
    pub fn encode_tick(
        &mut self,
        grids: &StreamGrids,
        forced: Option<RleMode>,
        stats: &mut EncodeStats,
    ) -> Vec<Vec<u8>> {
        let mut updates = Vec::new();
        for encoder in self.encoders.iter_mut().flatten() {
            let Some(grid) = grids.get(encoder.stream()) else {
                continue;
            };
            match encoder.encode(grid, forced) {
                Some(update) => {
                    stats.record(&update);
                    updates.push(update.bytes);
                }
                None => stats.suppressed_updates += 1,
            }
        }
        updates
    }
}
