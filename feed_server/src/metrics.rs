use bevy::prelude::*;
use feed_proto::RleMode;
use serde::Serialize;

use crate::{encoder::EncodedUpdate, resources::FeedTick};

/// Counters one connection accumulates during a tick.
#[derive(Component, Debug, Default, Clone)]
pub struct EncodeStats {
    pub updates_by_mode: [u64; 4],
    pub bytes_by_mode: [u64; 4],
    pub full_updates: u64,
    pub suppressed_updates: u64,
    pub coffer_writes: u64,
}

impl EncodeStats {
    pub fn record(&mut self, update: &EncodedUpdate) {
        let slot = update.mode.as_u8() as usize;
        self.updates_by_mode[slot] += 1;
        self.bytes_by_mode[slot] += update.bytes.len() as u64;
        if update.full {
            self.full_updates += 1;
        }
    }
}

#[derive(Resource, Debug, Default, Clone, Serialize)]
pub struct FeedMetrics {
    pub tick: u64,
    pub connections: usize,
    pub updates_by_mode: [u64; 4],
    pub bytes_by_mode: [u64; 4],
    pub full_updates: u64,
    pub delta_updates: u64,
    pub suppressed_updates: u64,
    pub coffer_writes: u64,
}

impl FeedMetrics {
    pub fn updates(&self, mode: RleMode) -> u64 {
        self.updates_by_mode[mode.as_u8() as usize]
    }

    pub fn bytes(&self, mode: RleMode) -> u64 {
        self.bytes_by_mode[mode.as_u8() as usize]
    }

    pub fn total_updates(&self) -> u64 {
        self.updates_by_mode.iter().sum()
    }
}

/// Fold every connection's tick counters into the running totals.
pub fn collect_metrics(
    tick: Res<FeedTick>,
    mut metrics: ResMut<FeedMetrics>,
    mut stats: Query<&mut EncodeStats>,
) {
    let mut connections = 0;
    let mut tick_updates = 0u64;
    let mut tick_bytes = 0u64;
    for mut entry in stats.iter_mut() {
        connections += 1;
        let taken = std::mem::take(&mut *entry);
        for slot in 0..4 {
            metrics.updates_by_mode[slot] += taken.updates_by_mode[slot];
            metrics.bytes_by_mode[slot] += taken.bytes_by_mode[slot];
            tick_updates += taken.updates_by_mode[slot];
            tick_bytes += taken.bytes_by_mode[slot];
        }
        let total: u64 = taken.updates_by_mode.iter().sum();
        metrics.full_updates += taken.full_updates;
        metrics.delta_updates += total - taken.full_updates;
        metrics.suppressed_updates += taken.suppressed_updates;
        metrics.coffer_writes += taken.coffer_writes;
    }
    metrics.tick = tick.0;
    metrics.connections = connections;

    tracing::debug!(
        target: "tile_feed::metrics",
        tick = tick.0,
        connections,
        updates = tick_updates,
        bytes = tick_bytes,
        "tick.encoded"
    );
}
