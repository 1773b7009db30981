//! Client-side copies of every stream grid, rebuilt from stream updates.

use feed_proto::{Grid, StreamUpdate};
use feed_schema::{StreamDef, StreamRegistry, MAX_STREAMS};

use crate::error::DecodeError;

#[derive(Debug, Clone)]
struct StreamState {
    def: StreamDef,
    grid: Grid,
    received: bool,
}

/// Retained grids for one connection.
///
/// Opaque streams accumulate: unset cells in an update leave what the client
/// already has. Transparent and overlay streams are replaced by every update.
#[derive(Debug, Clone)]
pub struct StreamDecoder {
    streams: Vec<Option<StreamState>>,
    order: Vec<u8>,
}

impl StreamDecoder {
    pub fn new(registry: &StreamRegistry) -> Self {
        let mut streams = vec![None; MAX_STREAMS];
        for def in registry.iter() {
            streams[def.id as usize] = Some(StreamState {
                def: def.clone(),
                grid: Grid::with_row_capacity(def.cols, def.rows, def.capacity_rows()),
                received: false,
            });
        }
        Self {
            streams,
            order: registry.iter().map(|def| def.id).collect(),
        }
    }

    /// Apply one encoded update. On error the targeted grid is untouched.
    pub fn apply(&mut self, bytes: &[u8]) -> Result<u8, DecodeError> {
        let update = StreamUpdate::parse(bytes).map_err(DecodeError::Header)?;
        let stream = update.stream;
        let state = self
            .streams
            .get_mut(stream as usize)
            .and_then(Option::as_mut)
            .ok_or(DecodeError::UnknownStream(stream))?;
        let (cols, rows) = (state.def.cols, state.def.capacity_rows());
        if update.width > cols || update.height > rows {
            return Err(DecodeError::Oversized {
                stream,
                width: update.width,
                height: update.height,
                cols,
                rows,
            });
        }
        let incoming = update
            .decode_grid()
            .map_err(|source| DecodeError::Malformed { stream, source })?;

        if state.def.keeps_baseline() {
            if state.grid.width() != incoming.width() || state.grid.height() != incoming.height() {
                state.grid.resize(incoming.width(), incoming.height());
            }
            state.grid.apply_set_cells(&incoming);
        } else {
            state.grid.copy_from(&incoming);
        }
        state.received = true;
        Ok(stream)
    }

    /// Grid for a stream that has received at least one update.
    pub fn grid(&self, stream: u8) -> Option<&Grid> {
        self.state(stream)
            .filter(|state| state.received)
            .map(|state| &state.grid)
    }

    pub fn def(&self, stream: u8) -> Option<&StreamDef> {
        self.state(stream).map(|state| &state.def)
    }

    /// Received streams in draw order.
    pub fn layers(&self) -> impl Iterator<Item = (&StreamDef, &Grid)> {
        self.order
            .iter()
            .filter_map(|id| self.state(*id))
            .filter(|state| state.received)
            .map(|state| (&state.def, &state.grid))
    }

    /// Forget a stream's contents, e.g. after unsubscribing.
    pub fn clear(&mut self, stream: u8) {
        if let Some(state) = self.streams.get_mut(stream as usize).and_then(Option::as_mut) {
            state.grid.resize(state.def.cols, state.def.rows);
            state.received = false;
        }
    }

    pub fn capacity(&self, stream: u8) -> Option<usize> {
        self.state(stream).map(|state| state.grid.capacity())
    }

    fn state(&self, stream: u8) -> Option<&StreamState> {
        self.streams.get(stream as usize)?.as_ref()
    }
}
