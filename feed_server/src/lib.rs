//! Server half of the tile feed.
//!
//! Each client connection is an entity carrying its own coffer bank, stream
//! grids, subscriptions and delta baselines. Simulation systems write grids
//! and coffers in [`FeedSet::Simulate`]; [`run_tick`] then encodes every
//! connection and leaves serialized frames in [`OutboundFrames`].

mod components;
pub mod config;
pub mod demo;
mod encoder;
pub mod metrics;
pub mod network;
mod resources;
mod session;
mod systems;

use std::sync::Arc;

use bevy::prelude::*;
use feed_proto::{ClientMessage, ServerMessage};
use feed_schema::Schema;

pub use components::{Coffers, ConnectionId, Outbox, StreamGrids};
pub use config::{
    load_server_config_from_env, DemoConfig, ServerConfig, ServerConfigError, ServerConfigHandle,
};
pub use encoder::{EncodedUpdate, StreamEncoder};
pub use metrics::{EncodeStats, FeedMetrics};
pub use network::{start_feed_listener, FeedListener, NetworkEvent};
pub use resources::{ConnectionIndex, FeedSchema, FeedTick, OutboundFrames};
pub use session::{Session, SubscribeOutcome};

/// Ordering of one tick: every write lands before any encoding starts.
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum FeedSet {
    Simulate,
    Encode,
    Flush,
}

/// Construct a Bevy [`App`] serving `schema`.
pub fn build_feed_app(schema: Arc<Schema>, config: Arc<ServerConfig>) -> App {
    let mut app = App::new();

    app.insert_resource(FeedSchema(schema))
        .insert_resource(ServerConfigHandle::new(config))
        .insert_resource(FeedTick::default())
        .insert_resource(FeedMetrics::default())
        .insert_resource(ConnectionIndex::default())
        .insert_resource(OutboundFrames::default())
        .add_plugins(MinimalPlugins)
        .configure_sets(
            Update,
            (FeedSet::Simulate, FeedSet::Encode, FeedSet::Flush).chain(),
        )
        .add_systems(
            Update,
            (
                systems::encode_sessions,
                metrics::collect_metrics,
                systems::advance_tick,
            )
                .chain()
                .in_set(FeedSet::Encode),
        )
        .add_systems(Update, systems::flush_outbox.in_set(FeedSet::Flush));

    app
}

/// Execute a single tick: simulate, encode, flush.
pub fn run_tick(app: &mut App) {
    app.update();
}

/// Spawn the connection's entity and queue the schema and stream listing.
pub fn connect(app: &mut App, connection: ConnectionId) -> Entity {
    let schema = Arc::clone(&app.world.resource::<FeedSchema>().0);
    if let Some(previous) = app.world.resource::<ConnectionIndex>().get(connection) {
        tracing::warn!(
            target: "tile_feed::server",
            %connection,
            "connection.replaced"
        );
        app.world.despawn(previous);
    }

    let mut outbox = Outbox::default();
    outbox.push(ServerMessage::Schema(schema.source().clone()));
    outbox.push(ServerMessage::Listing(schema.streams.listing()));

    let entity = app
        .world
        .spawn((
            connection,
            Coffers::default(),
            StreamGrids::for_registry(&schema.streams),
            Session::new(&schema.streams),
            outbox,
            EncodeStats::default(),
        ))
        .id();
    app.world
        .resource_mut::<ConnectionIndex>()
        .insert(connection, entity);
    tracing::info!(target: "tile_feed::server", %connection, "connection.opened");
    entity
}

/// Despawn the connection, discarding its bank, baselines and subscriptions
/// in one step.
pub fn disconnect(app: &mut App, connection: ConnectionId) -> bool {
    let Some(entity) = app
        .world
        .resource_mut::<ConnectionIndex>()
        .remove(connection)
    else {
        return false;
    };
    app.world.despawn(entity);
    tracing::info!(target: "tile_feed::server", %connection, "connection.closed");
    true
}

pub fn connection_entity(app: &App, connection: ConnectionId) -> Option<Entity> {
    app.world.resource::<ConnectionIndex>().get(connection)
}

pub fn handle_client_message(app: &mut App, connection: ConnectionId, message: ClientMessage) {
    let Some(entity) = connection_entity(app, connection) else {
        tracing::warn!(
            target: "tile_feed::server",
            %connection,
            ?message,
            "message.ignored=unknown_connection"
        );
        return;
    };
    let schema = Arc::clone(&app.world.resource::<FeedSchema>().0);
    let mut entry = app.world.entity_mut(entity);

    match message {
        ClientMessage::Subscribe(stream) => {
            let Some(mut session) = entry.get_mut::<Session>() else {
                return;
            };
            match session.subscribe(&schema.streams, stream) {
                SubscribeOutcome::Subscribed => tracing::info!(
                    target: "tile_feed::server",
                    %connection,
                    stream,
                    "stream.subscribed"
                ),
                SubscribeOutcome::AlreadySubscribed => {}
                SubscribeOutcome::UnknownStream => tracing::warn!(
                    target: "tile_feed::server",
                    %connection,
                    stream,
                    "stream.ignored=unknown_id"
                ),
            }
        }
        ClientMessage::Unsubscribe(stream) => {
            let Some(mut session) = entry.get_mut::<Session>() else {
                return;
            };
            if session.unsubscribe(stream) {
                tracing::info!(
                    target: "tile_feed::server",
                    %connection,
                    stream,
                    "stream.unsubscribed"
                );
            }
        }
        ClientMessage::RequestListing => {
            if let Some(mut outbox) = entry.get_mut::<Outbox>() {
                outbox.push(ServerMessage::Listing(schema.streams.listing()));
            }
        }
    }
}

/// Queue externally supplied text for a string indicator. Unknown
/// indicators are logged and ignored.
pub fn send_indicator_text(
    app: &mut App,
    connection: ConnectionId,
    indicator: u8,
    text: impl Into<String>,
) -> bool {
    let known = app
        .world
        .resource::<FeedSchema>()
        .schema()
        .indicators
        .get(indicator)
        .is_some();
    if !known {
        tracing::warn!(
            target: "tile_feed::server",
            %connection,
            indicator,
            "indicator.ignored=unknown_id"
        );
        return false;
    }
    let Some(entity) = connection_entity(app, connection) else {
        return false;
    };
    let Some(mut outbox) = app.world.get_mut::<Outbox>(entity) else {
        return false;
    };
    outbox.push(ServerMessage::IndicatorText {
        indicator,
        text: text.into(),
    });
    true
}

pub fn apply_network_event(app: &mut App, event: NetworkEvent) {
    match event {
        NetworkEvent::Connected(connection) => {
            connect(app, connection);
        }
        NetworkEvent::Disconnected(connection) => {
            disconnect(app, connection);
        }
        NetworkEvent::Message(connection, message) => {
            handle_client_message(app, connection, message);
        }
    }
}

/// Frames produced by the last tick, in connection order.
pub fn drain_outbound(app: &mut App) -> Vec<(ConnectionId, Vec<u8>)> {
    app.world.resource_mut::<OutboundFrames>().take()
}
