use std::collections::BTreeSet;
use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};

use color_eyre::Result;
use crossterm::event::{self, Event, KeyCode};
use feed_client::Subscriber;
use feed_proto::ClientMessage;
use ratatui::backend::CrosstermBackend;
use ratatui::prelude::*;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info};

use crate::screen::Screen;
use crate::ui::{draw_ui, UiState};
use crate::ClientCommand;

pub struct InspectorApp {
    terminal: Terminal<CrosstermBackend<std::io::Stdout>>,
    ui_state: UiState,
    screens: Subscriber<Screen>,
    command_sender: UnboundedSender<ClientCommand>,
    log_receiver: Receiver<String>,
}

impl InspectorApp {
    pub fn new(
        screens: Subscriber<Screen>,
        command_sender: UnboundedSender<ClientCommand>,
        log_receiver: Receiver<String>,
        subscribed: BTreeSet<u8>,
    ) -> Result<Self> {
        let stdout = std::io::stdout();
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        crossterm::terminal::enable_raw_mode()?;
        terminal.clear()?;
        terminal.hide_cursor()?;
        Ok(Self {
            terminal,
            ui_state: UiState {
                subscribed,
                ..UiState::default()
            },
            screens,
            command_sender,
            log_receiver,
        })
    }

    pub fn run(mut self) -> Result<()> {
        let mut last_draw = Instant::now();

        loop {
            if let Some(screen) = self.screens.latest() {
                self.ui_state.set_screen(screen);
            }

            while let Ok(line) = self.log_receiver.try_recv() {
                self.ui_state.push_log(line);
            }

            if last_draw.elapsed() >= Duration::from_millis(100) {
                self.terminal.draw(|frame| draw_ui(frame, &self.ui_state))?;
                last_draw = Instant::now();
            }

            if event::poll(Duration::from_millis(50))? {
                if let Event::Key(key) = event::read()? {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => break,
                        KeyCode::Char('l') => self.send(ClientMessage::RequestListing),
                        KeyCode::Char(digit @ '0'..='9') => {
                            let stream = digit as u8 - b'0';
                            self.toggle_stream(stream);
                        }
                        _ => {}
                    }
                }
            }
        }

        self.terminal.show_cursor()?;
        crossterm::terminal::disable_raw_mode()?;
        let _ = self.command_sender.send(ClientCommand::Quit);
        Ok(())
    }

    fn toggle_stream(&mut self, stream: u8) {
        let message = if self.ui_state.toggle_subscription(stream) {
            info!(stream, "Subscribing");
            ClientMessage::Subscribe(stream)
        } else {
            info!(stream, "Unsubscribing");
            ClientMessage::Unsubscribe(stream)
        };
        self.send(message);
    }

    fn send(&self, message: ClientMessage) {
        if let Err(err) = self.command_sender.send(ClientCommand::Send(message)) {
            error!("Failed to queue command: {}", err);
        }
    }
}
