#![allow(dead_code)]

use std::sync::Arc;

use bevy::prelude::*;
use feed_client::{ClientSession, SessionEvent};
use feed_proto::{Cell, ClientMessage, Grid};
use feed_schema::{CofferBank, Schema};
use feed_server::demo::install_demo;
use feed_server::{
    build_feed_app, connect, connection_entity, drain_outbound, handle_client_message, run_tick,
    Coffers, ConnectionId, DemoConfig, ServerConfig, StreamGrids,
};

/// A feed server app with one connection whose frames are fed straight into
/// a client session, with no socket in between.
pub struct Harness {
    pub app: App,
    pub connection: ConnectionId,
    pub session: ClientSession,
}

impl Harness {
    pub fn builtin() -> Self {
        let schema = Arc::new(Schema::builtin().expect("builtin schema"));
        let app = build_feed_app(schema, Arc::new(ServerConfig::default()));
        Self::with_app(app)
    }

    pub fn demo(seed: u64) -> Self {
        let mut harness = Self::builtin();
        install_demo(
            &mut harness.app,
            &DemoConfig {
                enabled: true,
                seed,
                monsters: 6,
            },
        );
        harness
    }

    fn with_app(mut app: App) -> Self {
        let connection = ConnectionId(1);
        connect(&mut app, connection);
        Self {
            app,
            connection,
            session: ClientSession::new(),
        }
    }

    pub fn send(&mut self, message: ClientMessage) {
        handle_client_message(&mut self.app, self.connection, message);
    }

    /// Run one server tick and return the serialized frames it produced.
    pub fn tick_raw(&mut self) -> Vec<Vec<u8>> {
        run_tick(&mut self.app);
        drain_outbound(&mut self.app)
            .into_iter()
            .filter(|(connection, _)| *connection == self.connection)
            .map(|(_, bytes)| bytes)
            .collect()
    }

    /// Run one server tick and hand every frame to the client session.
    pub fn tick(&mut self) -> Vec<SessionEvent> {
        let frames = self.tick_raw();
        self.deliver(&frames)
    }

    pub fn deliver(&mut self, frames: &[Vec<u8>]) -> Vec<SessionEvent> {
        frames
            .iter()
            .map(|bytes| self.session.handle_bytes(bytes).expect("usable frame"))
            .collect()
    }

    pub fn server_grid(&self, stream: u8) -> Option<&Grid> {
        let entity = connection_entity(&self.app, self.connection)?;
        self.app.world.get::<StreamGrids>(entity)?.get(stream)
    }

    pub fn server_coffers(&self) -> &CofferBank {
        let entity = connection_entity(&self.app, self.connection).expect("connected");
        &self
            .app
            .world
            .get::<Coffers>(entity)
            .expect("coffers component")
            .bank
    }
}

/// What a client is expected to hold for a server grid: opaque streams send
/// their unset cells as blanks.
pub fn as_sent(grid: &Grid, transparent: bool) -> Vec<Cell> {
    grid.cells()
        .iter()
        .map(|cell| {
            if cell.is_unset() && !transparent {
                Cell::BLANK
            } else {
                *cell
            }
        })
        .collect()
}
