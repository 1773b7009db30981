//! Terminal windows that streams and status spans are composited into.

use feed_proto::{Cell, Grid};
use feed_schema::{StreamDef, StreamFlags, WindowFlags};

use crate::{decoder::StreamDecoder, interpreter::Span};

#[derive(Debug, Clone)]
pub struct Window {
    accepts: WindowFlags,
    scroll_x: u16,
    scroll_y: u16,
    screen: Grid,
}

impl Window {
    /// A blank window showing streams routed to any of `accepts`.
    pub fn new(accepts: WindowFlags, width: u16, height: u16) -> Self {
        Self {
            accepts,
            scroll_x: 0,
            scroll_y: 0,
            screen: Grid::filled(width, height, Cell::BLANK),
        }
    }

    pub fn accepts(&self, def: &StreamDef) -> bool {
        self.accepts.intersects(def.window)
    }

    /// Scroll offset applied to streams that follow the view.
    pub fn scroll_to(&mut self, x: u16, y: u16) {
        self.scroll_x = x;
        self.scroll_y = y;
    }

    pub fn scroll(&self) -> (u16, u16) {
        (self.scroll_x, self.scroll_y)
    }

    pub fn clear(&mut self) {
        self.screen.fill(Cell::BLANK);
    }

    /// Redraw from scratch: every received stream routed here, in draw order.
    pub fn compose(&mut self, decoder: &StreamDecoder) {
        self.clear();
        for (def, grid) in decoder.layers() {
            if self.accepts(def) {
                self.draw_stream(def, grid);
            }
        }
    }

    /// Paint one stream grid. Transparent streams leave the cells below
    /// their unset cells alone; cells falling outside the window are
    /// clipped.
    pub fn draw_stream(&mut self, def: &StreamDef, grid: &Grid) {
        let offset_x = if def.flags.contains(StreamFlags::KEEP_X) {
            self.scroll_x as i32
        } else {
            0
        };
        let offset_y = if def.flags.contains(StreamFlags::KEEP_Y) {
            self.scroll_y as i32
        } else {
            0
        };
        let transparent = def.is_transparent();

        for y in 0..grid.height() {
            let dest_y = y as i32 - offset_y;
            if dest_y < 0 || dest_y >= self.screen.height() as i32 {
                continue;
            }
            let Some(row) = grid.row(y) else {
                continue;
            };
            for (x, cell) in row.iter().enumerate() {
                let dest_x = x as i32 - offset_x;
                if dest_x < 0 || dest_x >= self.screen.width() as i32 {
                    continue;
                }
                let cell = match (cell.is_unset(), transparent) {
                    (true, true) => continue,
                    (true, false) => Cell::BLANK,
                    (false, _) => *cell,
                };
                self.screen.set(dest_x as u16, dest_y as u16, cell);
            }
        }
    }

    /// Paint status text. Characters past the right edge are clipped.
    pub fn draw_spans(&mut self, spans: &[Span]) {
        for span in spans {
            for (offset, ch) in span.text.chars().enumerate() {
                let Ok(x) = u16::try_from(span.col as usize + offset) else {
                    break;
                };
                let symbol = if ch.is_ascii() { ch as u8 } else { b'?' };
                if !self.screen.set(x, span.row, Cell::new(symbol, span.attr)) {
                    break;
                }
            }
        }
    }

    pub fn screen(&self) -> &Grid {
        &self.screen
    }

    /// Screen contents as text, one line per row, trailing blanks trimmed.
    pub fn lines(&self) -> Vec<String> {
        (0..self.screen.height())
            .filter_map(|y| self.screen.row(y))
            .map(|row| {
                let line: String = row
                    .iter()
                    .map(|cell| if cell.is_unset() { ' ' } else { cell.symbol as char })
                    .collect();
                line.trim_end().to_string()
            })
            .collect()
    }

    /// [`Window::lines`] joined with newlines, trailing empty lines dropped.
    pub fn text(&self) -> String {
        let lines = self.lines();
        let used = lines
            .iter()
            .rposition(|line| !line.is_empty())
            .map_or(0, |last| last + 1);
        lines[..used].join("\n")
    }
}

#[cfg(test)]
mod tests {
    use feed_proto::StreamUpdate;
    use feed_schema::Schema;

    use super::*;

    fn def(id: u8, flags: StreamFlags) -> StreamDef {
        StreamDef {
            id,
            name: String::new(),
            flags,
            window: WindowFlags::MAP,
            cols: 5,
            rows: 1,
            max_rows: 0,
        }
    }

    #[test]
    fn transparent_overlay_keeps_cells_below() {
        let mut window = Window::new(WindowFlags::MAP, 5, 1);
        window.draw_stream(
            &def(0, StreamFlags::empty()),
            &Grid::filled(5, 1, Cell::new(b'a', 1)),
        );
        let mut overlay = Grid::new(5, 1);
        overlay.set(2, 0, Cell::new(b'b', 1));
        window.draw_stream(
            &def(1, StreamFlags::TRANSPARENT | StreamFlags::OVERLAYED),
            &overlay,
        );
        insta::assert_snapshot!(window.text(), @"aabaa");
    }

    #[test]
    fn opaque_layers_blank_their_unset_cells() {
        let mut window = Window::new(WindowFlags::MAP, 5, 1);
        window.draw_stream(
            &def(0, StreamFlags::empty()),
            &Grid::filled(5, 1, Cell::new(b'a', 1)),
        );
        let mut upper = Grid::new(5, 1);
        upper.set(0, 0, Cell::new(b'z', 1));
        window.draw_stream(&def(1, StreamFlags::empty()), &upper);
        assert_eq!(window.lines(), vec!["z".to_string()]);
    }

    #[test]
    fn keep_flags_follow_the_scroll_offset() {
        let mut grid = Grid::new(10, 4);
        grid.set(6, 3, Cell::new(b'@', 1));
        let mut window = Window::new(WindowFlags::MAP, 5, 2);
        window.scroll_to(4, 2);

        window.draw_stream(&def(0, StreamFlags::KEEP_X | StreamFlags::KEEP_Y), &grid);
        assert_eq!(window.screen().get(2, 1), Some(Cell::new(b'@', 1)));

        window.clear();
        window.draw_stream(&def(0, StreamFlags::KEEP_X), &grid);
        // Row 3 falls below a two-row window when only x scrolls.
        assert!(window.screen().cells().iter().all(|cell| *cell == Cell::BLANK));
    }

    #[test]
    fn spans_clip_at_the_right_edge() {
        let mut window = Window::new(WindowFlags::STATUS, 6, 2);
        window.draw_spans(&[Span {
            row: 1,
            col: 3,
            text: "Study".into(),
            attr: 1,
        }]);
        window.draw_spans(&[Span {
            row: 7,
            col: 0,
            text: "gone".into(),
            attr: 1,
        }]);
        assert_eq!(window.lines(), vec!["".to_string(), "   Stu".to_string()]);
    }

    #[test]
    fn compose_routes_streams_by_window_kind() {
        let schema = Schema::builtin().unwrap();
        let mut decoder = StreamDecoder::new(&schema.streams);
        let mut map = Grid::filled(66, 22, Cell::new(b'.', 9));
        map.set(0, 0, Cell::new(b'#', 1));
        decoder
            .apply(&StreamUpdate::encode(0, &map).to_bytes())
            .unwrap();
        let mut monsters = Grid::filled(80, 24, Cell::BLANK);
        monsters.set(0, 0, Cell::new(b'k', 4));
        decoder
            .apply(&StreamUpdate::encode(3, &monsters).to_bytes())
            .unwrap();

        let mut map_window = Window::new(WindowFlags::MAP, 4, 1);
        map_window.compose(&decoder);
        assert_eq!(map_window.text(), "#...");

        let mut list_window = Window::new(WindowFlags::MONLIST, 4, 1);
        list_window.compose(&decoder);
        assert_eq!(list_window.text(), "k");
    }
}
