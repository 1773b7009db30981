use std::collections::BTreeMap;

use feed_proto::{decode_server, ServerMessage, TickFrame};
use feed_schema::{CofferBank, Schema, StreamGroup};

use crate::{
    decoder::StreamDecoder,
    error::{DecodeError, SessionError},
    interpreter::{render_all, RenderContext, Span},
    window::Window,
};

/// What a server message changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SchemaLoaded { streams: usize, indicators: usize },
    Listing,
    Tick {
        tick: u64,
        applied: usize,
        rejected: usize,
    },
    IndicatorText(u8),
    /// The message could not be used and was dropped.
    Ignored,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames: u64,
    pub updates_applied: u64,
    pub updates_rejected: u64,
    pub coffer_writes: u64,
}

struct Loaded {
    schema: Schema,
    decoder: StreamDecoder,
}

/// Client-side mirror of one connection: schema, stream grids, coffers and
/// indicator strings.
#[derive(Default)]
pub struct ClientSession {
    loaded: Option<Loaded>,
    coffers: CofferBank,
    strings: BTreeMap<u8, String>,
    listing: Vec<StreamGroup>,
    tick: Option<u64>,
    stats: SessionStats,
}

impl ClientSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode and apply one framed payload.
    pub fn handle_bytes(&mut self, payload: &[u8]) -> Result<SessionEvent, SessionError> {
        let message = decode_server(payload)?;
        self.handle(message)
    }

    /// Apply a server message. Only a schema the client cannot load is an
    /// error; anything else that does not fit is logged and dropped.
    pub fn handle(&mut self, message: ServerMessage) -> Result<SessionEvent, SessionError> {
        match message {
            ServerMessage::Schema(file) => {
                let schema = Schema::load(file)?;
                let event = SessionEvent::SchemaLoaded {
                    streams: schema.streams.len(),
                    indicators: schema.indicators.len(),
                };
                tracing::info!(
                    target: "tile_feed::client",
                    streams = schema.streams.len(),
                    indicators = schema.indicators.len(),
                    "schema.loaded=server"
                );
                self.loaded = Some(Loaded {
                    decoder: StreamDecoder::new(&schema.streams),
                    schema,
                });
                self.coffers = CofferBank::new();
                self.strings.clear();
                Ok(event)
            }
            ServerMessage::Listing(groups) => {
                self.listing = groups;
                Ok(SessionEvent::Listing)
            }
            ServerMessage::Tick(frame) => Ok(self.apply_tick(frame)),
            ServerMessage::IndicatorText { indicator, text } => {
                let known = self
                    .loaded
                    .as_ref()
                    .is_some_and(|loaded| loaded.schema.indicators.get(indicator).is_some());
                if !known {
                    tracing::warn!(
                        target: "tile_feed::client",
                        indicator,
                        "indicator.unknown"
                    );
                    return Ok(SessionEvent::Ignored);
                }
                self.strings.insert(indicator, text);
                Ok(SessionEvent::IndicatorText(indicator))
            }
        }
    }

    fn apply_tick(&mut self, frame: TickFrame) -> SessionEvent {
        let Some(loaded) = self.loaded.as_mut() else {
            tracing::warn!(
                target: "tile_feed::client",
                tick = frame.tick,
                "tick.before_schema"
            );
            return SessionEvent::Ignored;
        };

        for write in &frame.coffers {
            if !self.coffers.apply_remote(write.index as usize, write.value) {
                tracing::warn!(
                    target: "tile_feed::client",
                    index = write.index,
                    "coffer.unknown"
                );
            }
        }

        let mut applied = 0;
        let mut rejected = 0;
        for bytes in &frame.updates {
            match loaded.decoder.apply(bytes) {
                Ok(_) => applied += 1,
                Err(DecodeError::UnknownStream(stream)) => {
                    rejected += 1;
                    tracing::warn!(target: "tile_feed::client", stream, "stream.unknown");
                }
                Err(err) => {
                    rejected += 1;
                    tracing::warn!(
                        target: "tile_feed::client",
                        tick = frame.tick,
                        error = %err,
                        "stream.malformed"
                    );
                }
            }
        }

        self.tick = Some(frame.tick);
        self.stats.frames += 1;
        self.stats.updates_applied += applied as u64;
        self.stats.updates_rejected += rejected as u64;
        self.stats.coffer_writes += frame.coffers.len() as u64;
        tracing::trace!(
            target: "tile_feed::client",
            tick = frame.tick,
            applied,
            rejected,
            "tick.applied"
        );
        SessionEvent::Tick {
            tick: frame.tick,
            applied,
            rejected,
        }
    }

    /// Status text for every indicator. Coffer reset operations write into
    /// this session's coffer mirror.
    pub fn render_status(
        &mut self,
        term_width: u16,
        term_height: u16,
        can_cast: bool,
    ) -> Vec<Span> {
        let Some(loaded) = self.loaded.as_ref() else {
            return Vec::new();
        };
        let ctx = RenderContext {
            term_width,
            term_height,
            can_cast,
            strings: &self.strings,
        };
        render_all(&loaded.schema.indicators, &mut self.coffers, &ctx)
    }

    /// Redraw `window` from the current stream grids.
    pub fn compose(&self, window: &mut Window) {
        match &self.loaded {
            Some(loaded) => window.compose(&loaded.decoder),
            None => window.clear(),
        }
    }

    /// Drop a stream's grid, e.g. after unsubscribing from it.
    pub fn forget_stream(&mut self, stream: u8) {
        if let Some(loaded) = self.loaded.as_mut() {
            loaded.decoder.clear(stream);
        }
    }

    pub fn schema(&self) -> Option<&Schema> {
        self.loaded.as_ref().map(|loaded| &loaded.schema)
    }

    pub fn decoder(&self) -> Option<&StreamDecoder> {
        self.loaded.as_ref().map(|loaded| &loaded.decoder)
    }

    pub fn coffers(&self) -> &CofferBank {
        &self.coffers
    }

    pub fn strings(&self) -> &BTreeMap<u8, String> {
        &self.strings
    }

    pub fn listing(&self) -> &[StreamGroup] {
        &self.listing
    }

    /// Tick of the last applied frame.
    pub fn tick(&self) -> Option<u64> {
        self.tick
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use feed_proto::{Cell, CofferWrite, Grid, StreamUpdate};
    use feed_schema::{SchemaFile, WindowFlags};

    use super::*;

    fn loaded() -> ClientSession {
        let mut session = ClientSession::new();
        session
            .handle(ServerMessage::Schema(SchemaFile::builtin()))
            .unwrap();
        session
    }

    #[test]
    fn schema_then_tick_fills_mirrors() {
        let mut session = loaded();
        let mut map = Grid::filled(66, 22, Cell::BLANK);
        map.set(1, 0, Cell::new(b'@', 1));
        let event = session
            .handle(ServerMessage::Tick(TickFrame {
                tick: 3,
                coffers: vec![CofferWrite { index: 2, value: 7 }],
                updates: vec![StreamUpdate::encode(0, &map).to_bytes()],
            }))
            .unwrap();
        assert_eq!(
            event,
            SessionEvent::Tick {
                tick: 3,
                applied: 1,
                rejected: 0
            }
        );
        assert_eq!(session.coffers().get(2), 7);
        assert_eq!(session.tick(), Some(3));

        let mut window = Window::new(WindowFlags::MAP, 3, 1);
        session.compose(&mut window);
        assert_eq!(window.text(), " @");
    }

    #[test]
    fn bad_updates_do_not_stop_the_frame() {
        let mut session = loaded();
        let event = session
            .handle(ServerMessage::Tick(TickFrame {
                tick: 1,
                coffers: Vec::new(),
                updates: vec![
                    vec![0, 9, 1, 0, 1, 0],
                    StreamUpdate::encode(17, &Grid::new(1, 1)).to_bytes(),
                    StreamUpdate::encode(3, &Grid::filled(80, 24, Cell::BLANK)).to_bytes(),
                ],
            }))
            .unwrap();
        assert_eq!(
            event,
            SessionEvent::Tick {
                tick: 1,
                applied: 1,
                rejected: 2
            }
        );
        assert_eq!(session.stats().updates_rejected, 2);
    }

    #[test]
    fn ticks_before_schema_are_ignored() {
        let mut session = ClientSession::new();
        let event = session
            .handle(ServerMessage::Tick(TickFrame::default()))
            .unwrap();
        assert_eq!(event, SessionEvent::Ignored);
        assert!(session.render_status(80, 24, true).is_empty());
    }

    #[test]
    fn bad_schema_is_fatal() {
        let mut file = SchemaFile::builtin();
        file.indicators[0].coffer = 254;
        assert!(matches!(
            ClientSession::new().handle(ServerMessage::Schema(file)),
            Err(SessionError::Schema(_))
        ));
    }

    #[test]
    fn indicator_text_needs_a_known_indicator() {
        let mut session = loaded();
        assert_eq!(
            session
                .handle(ServerMessage::IndicatorText {
                    indicator: 7,
                    text: "a jackal".into()
                })
                .unwrap(),
            SessionEvent::IndicatorText(7)
        );
        assert_eq!(
            session
                .handle(ServerMessage::IndicatorText {
                    indicator: 40,
                    text: "nobody".into()
                })
                .unwrap(),
            SessionEvent::Ignored
        );
        assert_eq!(session.strings().len(), 1);
    }
}
