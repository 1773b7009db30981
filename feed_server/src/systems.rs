use bevy::prelude::*;
use feed_proto::{ServerMessage, TickFrame};

use crate::{
    components::{Coffers, ConnectionId, Outbox, StreamGrids},
    config::ServerConfigHandle,
    metrics::EncodeStats,
    resources::{FeedTick, OutboundFrames},
    session::Session,
};

/// Encode every connection's coffers and subscribed streams.
///
/// Connections share nothing mutable, so they are encoded in parallel.
pub fn encode_sessions(
    config: Res<ServerConfigHandle>,
    tick: Res<FeedTick>,
    mut sessions: Query<(
        &ConnectionId,
        &mut Coffers,
        &StreamGrids,
        &mut Session,
        &mut Outbox,
        &mut EncodeStats,
    )>,
) {
    let forced = config.config().forced_mode;
    let tick = tick.0;
    sessions.par_iter_mut().for_each(
        |(connection, mut coffers, grids, mut session, mut outbox, mut stats)| {
            let coffers = coffers.take_changes();
            let updates = session.encode_tick(grids, forced, &mut stats);
            stats.coffer_writes += coffers.len() as u64;
            if coffers.is_empty() && updates.is_empty() {
                return;
            }
            tracing::trace!(
                target: "tile_feed::server",
                %connection,
                tick,
                coffers = coffers.len(),
                updates = updates.len(),
                "tick.frame_queued"
            );
            outbox.push(ServerMessage::Tick(TickFrame {
                tick,
                coffers,
                updates,
            }));
        },
    );
}

pub fn advance_tick(mut tick: ResMut<FeedTick>) {
    tick.0 += 1;
}

/// Serialize queued messages for the transport, in connection order.
pub fn flush_outbox(
    mut outboxes: Query<(&ConnectionId, &mut Outbox)>,
    mut outbound: ResMut<OutboundFrames>,
) {
    let mut pending: Vec<(ConnectionId, Mut<Outbox>)> = outboxes
        .iter_mut()
        .filter(|(_, outbox)| !outbox.is_empty())
        .map(|(connection, outbox)| (*connection, outbox))
        .collect();
    pending.sort_by_key(|(connection, _)| *connection);
    for (connection, mut outbox) in pending {
        for frame in outbox.drain_encoded(connection) {
            outbound.push(connection, frame);
        }
    }
}
