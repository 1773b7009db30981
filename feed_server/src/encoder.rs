//! Per-connection delta state for one subscribed stream.

use feed_proto::{Cell, Grid, RleMode, StreamUpdate};
use feed_schema::StreamDef;

/// One encoded update ready to go into a tick frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedUpdate {
    pub bytes: Vec<u8>,
    pub mode: RleMode,
    /// `false` when only changed cells were sent.
    pub full: bool,
}

#[derive(Debug, Clone)]
pub struct StreamEncoder {
    stream: u8,
    keeps_baseline: bool,
    capacity_rows: u16,
    baseline: Option<Grid>,
    working: Grid,
}

impl StreamEncoder {
    pub fn new(def: &StreamDef) -> Self {
        Self {
            stream: def.id,
            keeps_baseline: def.keeps_baseline(),
            capacity_rows: def.capacity_rows(),
            baseline: None,
            working: Grid::with_row_capacity(def.cols, def.rows, def.capacity_rows()),
        }
    }

    pub fn stream(&self) -> u8 {
        self.stream
    }

    pub fn has_baseline(&self) -> bool {
        self.baseline.is_some()
    }

    /// Forget what the client has, so the next update is sent in full.
    pub fn reset(&mut self) {
        self.baseline = None;
    }

    pub fn working_capacity(&self) -> usize {
        self.working.capacity()
    }

    /// Encode this tick's grid. Returns `None` when nothing changed since
    /// the last update sent on a delta channel.
    pub fn encode(&mut self, grid: &Grid, forced: Option<RleMode>) -> Option<EncodedUpdate> {
        if !self.keeps_baseline {
            return Some(emit_update(self.stream, grid, forced, true));
        }

        // Unset means "unchanged" in a delta, so opaque channels paint blanks.
        self.working.copy_from(grid);
        for cell in self.working.cells_mut() {
            if cell.is_unset() {
                *cell = Cell::BLANK;
            }
        }

        let update = match &self.baseline {
            Some(baseline)
                if baseline.width() == self.working.width()
                    && baseline.height() == self.working.height() =>
            {
                let delta = self.working.delta_from(baseline);
                if delta.is_all_unset() {
                    return None;
                }
                Some(emit_update(self.stream, &delta, forced, false))
            }
            _ => Some(emit_update(self.stream, &self.working, forced, true)),
        };

        match &mut self.baseline {
            Some(baseline) => baseline.copy_from(&self.working),
            None => {
                let mut baseline = Grid::with_row_capacity(
                    self.working.width(),
                    self.working.height(),
                    self.capacity_rows,
                );
                baseline.copy_from(&self.working);
                self.baseline = Some(baseline);
            }
        }
        update
    }
}

fn emit_update(stream: u8, grid: &Grid, forced: Option<RleMode>, full: bool) -> EncodedUpdate {
    let mut bytes = Vec::new();
    let mode = StreamUpdate::encode_into(stream, grid, forced, &mut bytes);
    EncodedUpdate { bytes, mode, full }
}

#[cfg(test)]
mod tests {
    use feed_schema::{StreamFlags, WindowFlags};

    use super::*;

    fn def(flags: StreamFlags) -> StreamDef {
        StreamDef {
            id: 4,
            name: "test".into(),
            flags,
            window: WindowFlags::MAP,
            cols: 10,
            rows: 2,
            max_rows: 6,
        }
    }

    fn decode(update: &EncodedUpdate) -> Grid {
        StreamUpdate::parse(&update.bytes)
            .unwrap()
            .decode_grid()
            .unwrap()
    }

    #[test]
    fn first_send_is_full_then_deltas() {
        let mut encoder = StreamEncoder::new(&def(StreamFlags::empty()));
        let mut grid = Grid::filled(10, 2, Cell::new(b'.', 1));

        let first = encoder.encode(&grid, None).unwrap();
        assert!(first.full);
        assert_eq!(decode(&first), grid);

        grid.set(3, 1, Cell::new(b'@', 2));
        let second = encoder.encode(&grid, None).unwrap();
        assert!(!second.full);
        let delta = decode(&second);
        assert_eq!(delta.get(3, 1), Some(Cell::new(b'@', 2)));
        assert_eq!(delta.cells().iter().filter(|c| !c.is_unset()).count(), 1);
    }

    #[test]
    fn unchanged_grid_sends_nothing() {
        let mut encoder = StreamEncoder::new(&def(StreamFlags::empty()));
        let grid = Grid::filled(10, 2, Cell::new(b'#', 3));
        assert!(encoder.encode(&grid, None).is_some());
        assert!(encoder.encode(&grid, None).is_none());
        encoder.reset();
        assert!(encoder.encode(&grid, None).unwrap().full);
    }

    #[test]
    fn overlay_channels_resend_every_tick() {
        let overlay = def(StreamFlags::TRANSPARENT | StreamFlags::OVERLAYED);
        let mut encoder = StreamEncoder::new(&overlay);
        let mut grid = Grid::new(10, 2);
        grid.set(2, 0, Cell::new(b'*', 4));
        for _ in 0..3 {
            let update = encoder.encode(&grid, None).unwrap();
            assert!(update.full);
            assert_eq!(decode(&update), grid);
        }
        assert!(!encoder.has_baseline());
    }

    #[test]
    fn opaque_channels_never_send_unset() {
        let mut encoder = StreamEncoder::new(&def(StreamFlags::empty()));
        let grid = Grid::new(10, 2);
        let update = encoder.encode(&grid, None).unwrap();
        assert!(decode(&update).cells().iter().all(|c| *c == Cell::BLANK));
    }

    #[test]
    fn resized_grid_is_sent_in_full() {
        let mut encoder = StreamEncoder::new(&def(StreamFlags::MAX_BUFFER));
        let reserved = encoder.working_capacity();
        assert!(reserved >= 60);
        encoder.encode(&Grid::filled(10, 2, Cell::BLANK), None);
        let taller = Grid::filled(10, 5, Cell::BLANK);
        let update = encoder.encode(&taller, None).unwrap();
        assert!(update.full);
        assert_eq!(encoder.working_capacity(), reserved);
    }

    #[test]
    fn forced_mode_is_honoured() {
        let mut encoder = StreamEncoder::new(&def(StreamFlags::empty()));
        let grid = Grid::filled(10, 2, Cell::new(b'x', 1));
        let update = encoder.encode(&grid, Some(RleMode::None)).unwrap();
        assert_eq!(update.mode, RleMode::None);
        assert_eq!(update.bytes.len(), feed_proto::HEADER_LEN + 40);
    }
}
