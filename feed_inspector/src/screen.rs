use feed_client::{ClientSession, Span, Window};
use feed_schema::WindowFlags;
use serde::Serialize;

/// Sizes of the panes the inspector renders into.
#[derive(Debug, Clone, Copy)]
pub struct ScreenLayout {
    pub map_width: u16,
    pub map_height: u16,
    pub side_width: u16,
    pub side_height: u16,
    pub term_width: u16,
    pub term_height: u16,
    pub can_cast: bool,
}

impl Default for ScreenLayout {
    fn default() -> Self {
        Self {
            map_width: 66,
            map_height: 22,
            side_width: 80,
            side_height: 24,
            term_width: 80,
            term_height: 24,
            can_cast: true,
        }
    }
}

/// Everything the redraw side shows for one frame.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Screen {
    pub tick: Option<u64>,
    pub map: Vec<String>,
    pub side: Vec<String>,
    pub status: Vec<String>,
    pub spans: Vec<Span>,
    pub listing: Vec<Vec<u8>>,
    pub frames: u64,
    pub updates_applied: u64,
    pub updates_rejected: u64,
}

/// Windows the pump composes into. Kept between frames so their buffers are
/// reused.
pub struct Panes {
    layout: ScreenLayout,
    map: Window,
    side: Window,
    status: Window,
}

impl Panes {
    pub fn new(layout: ScreenLayout, side_kind: WindowFlags) -> Self {
        Self {
            layout,
            map: Window::new(WindowFlags::MAP, layout.map_width, layout.map_height),
            side: Window::new(side_kind, layout.side_width, layout.side_height),
            status: Window::new(WindowFlags::STATUS, layout.term_width, layout.term_height),
        }
    }

    pub fn render(&mut self, session: &mut ClientSession) -> Screen {
        session.compose(&mut self.map);
        session.compose(&mut self.side);
        let spans = session.render_status(
            self.layout.term_width,
            self.layout.term_height,
            self.layout.can_cast,
        );
        self.status.clear();
        self.status.draw_spans(&spans);

        let stats = session.stats();
        Screen {
            tick: session.tick(),
            map: self.map.lines(),
            side: trim_trailing_blank(self.side.lines()),
            status: trim_trailing_blank(self.status.lines()),
            spans,
            listing: session
                .listing()
                .iter()
                .map(|group| group.streams.clone())
                .collect(),
            frames: stats.frames,
            updates_applied: stats.updates_applied,
            updates_rejected: stats.updates_rejected,
        }
    }
}

fn trim_trailing_blank(mut lines: Vec<String>) -> Vec<String> {
    while lines.last().is_some_and(|line| line.is_empty()) {
        lines.pop();
    }
    lines
}

/// Window kind from a flag name such as `monlist` or `SPECIAL_INFO`.
pub fn parse_window_kind(name: &str) -> Option<WindowFlags> {
    WindowFlags::from_name(&name.to_ascii_uppercase().replace('-', "_"))
}
