use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use ratatui::layout::{Constraint, Direction, Layout, Margin};
use ratatui::prelude::Rect;
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Frame;

use crate::screen::Screen;

pub struct UiState {
    pub screen: Arc<Screen>,
    /// Streams this inspector asked for, as toggled from the keyboard.
    pub subscribed: BTreeSet<u8>,
    pub logs: VecDeque<String>,
    pub max_logs: usize,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            screen: Arc::new(Screen::default()),
            subscribed: BTreeSet::new(),
            logs: VecDeque::new(),
            max_logs: 8,
        }
    }
}

impl UiState {
    pub fn set_screen(&mut self, screen: Arc<Screen>) {
        self.screen = screen;
    }

    pub fn push_log<S: Into<String>>(&mut self, line: S) {
        let mut text: String = line.into();
        while text.ends_with('\n') || text.ends_with('\r') {
            text.pop();
        }
        if text.is_empty() {
            return;
        }
        self.logs.push_front(text);
        while self.logs.len() > self.max_logs {
            self.logs.pop_back();
        }
    }

    /// Flip a stream's subscription. Returns true if it is now subscribed.
    pub fn toggle_subscription(&mut self, stream: u8) -> bool {
        if self.subscribed.remove(&stream) {
            false
        } else {
            self.subscribed.insert(stream);
            true
        }
    }
}

pub fn draw_ui(frame: &mut Frame, state: &UiState) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(10),
            Constraint::Length(10),
        ])
        .split(frame.size());
    let panes = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(rows[1]);
    let bottom = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(rows[2]);

    draw_header(frame, rows[0], state);
    draw_lines(frame, panes[0], "Map", &state.screen.map);
    draw_lines(frame, panes[1], "Side", &state.screen.side);
    draw_status(frame, bottom[0], state);
    draw_logs(frame, bottom[1], state);
}

fn framed(frame: &mut Frame, area: Rect, title: &str, body: Paragraph) {
    let block = Block::default().borders(Borders::ALL).title(title.to_string());
    frame.render_widget(block, area);
    frame.render_widget(
        body,
        area.inner(&Margin {
            vertical: 1,
            horizontal: 1,
        }),
    );
}

fn draw_header(frame: &mut Frame, area: Rect, state: &UiState) {
    let screen = &state.screen;
    let tick = screen
        .tick
        .map_or_else(|| "-".to_string(), |tick| tick.to_string());
    let listing = screen
        .listing
        .iter()
        .map(|group| format!("{:?}", group))
        .collect::<Vec<_>>()
        .join(" ");
    let line = Line::from(vec![
        Span::styled(format!("tick {tick}"), Style::default().fg(Color::Yellow)),
        Span::raw(" | frames "),
        Span::styled(
            format!("{:>5}", screen.frames),
            Style::default().fg(Color::Cyan),
        ),
        Span::raw(" | updates "),
        Span::styled(
            format!("{:>6}", screen.updates_applied),
            Style::default().fg(Color::Green),
        ),
        Span::raw(" | rejected "),
        Span::styled(
            format!("{:>4}", screen.updates_rejected),
            Style::default().fg(Color::Red),
        ),
        Span::raw(format!(" | streams {listing}")),
        Span::raw(" | 0-9 toggle stream, l listing, q exit"),
    ]);
    let text = Paragraph::new(line).wrap(Wrap { trim: true });
    framed(frame, area, "Tile Feed Inspector", text);
}

fn draw_lines(frame: &mut Frame, area: Rect, title: &str, lines: &[String]) {
    let lines: Vec<Line> = lines
        .iter()
        .map(|line| Line::from(Span::raw(line.as_str())))
        .collect();
    framed(frame, area, title, Paragraph::new(lines));
}

fn draw_status(frame: &mut Frame, area: Rect, state: &UiState) {
    let lines: Vec<Line> = state
        .screen
        .spans
        .iter()
        .map(|span| {
            Line::from(vec![
                Span::styled(
                    format!("{:>2},{:<2} ", span.row, span.col),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::styled(span.text.clone(), attr_style(span.attr)),
            ])
        })
        .collect();
    framed(frame, area, "Status", Paragraph::new(lines));
}

fn draw_logs(frame: &mut Frame, area: Rect, state: &UiState) {
    let lines: Vec<Line> = state
        .logs
        .iter()
        .map(|entry| Line::from(Span::raw(entry)))
        .collect();
    framed(
        frame,
        area,
        "Logs",
        Paragraph::new(lines).wrap(Wrap { trim: false }),
    );
}

/// Terminal colour for an attribute index (`dwsorgbuDWvyRGBU`).
pub fn attr_color(attr: u8) -> Color {
    match attr {
        0 => Color::Black,
        1 => Color::White,
        2 => Color::Gray,
        3 => Color::Rgb(0xff, 0x80, 0x00),
        4 => Color::Red,
        5 => Color::Green,
        6 => Color::Blue,
        7 => Color::Rgb(0x8f, 0x40, 0x00),
        8 => Color::DarkGray,
        9 => Color::White,
        10 => Color::Magenta,
        11 => Color::Yellow,
        12 => Color::LightRed,
        13 => Color::LightGreen,
        14 => Color::LightBlue,
        _ => Color::Rgb(0xc0, 0x80, 0x40),
    }
}

fn attr_style(attr: u8) -> Style {
    Style::default().fg(attr_color(attr))
}
