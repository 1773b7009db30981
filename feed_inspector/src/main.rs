use std::collections::BTreeSet;
use std::sync::mpsc::{self, Sender};
use std::time::Duration;

use clap::Parser;
use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use feed_client::{handoff, ClientSession, Publisher, SessionEvent};
use feed_proto::{encode_client, ClientMessage, MAX_FRAME_LEN};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{info, trace, warn};

mod app;
mod screen;
mod ui;

use app::InspectorApp;
use screen::{parse_window_kind, Panes, Screen, ScreenLayout};

#[derive(Clone)]
struct ChannelWriter {
    sender: Sender<String>,
}

impl std::io::Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if let Ok(text) = String::from_utf8(buf.to_vec()) {
            let _ = self.sender.send(text);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Tile feed inspector", long_about = None)]
struct Cli {
    /// Address of the feed server.
    #[arg(long, default_value = "127.0.0.1:41100")]
    endpoint: String,
    /// Streams to subscribe to after connecting.
    #[arg(long, value_delimiter = ',', default_value = "3")]
    subscribe: Vec<u8>,
    /// Window kind shown in the side panel (e.g. monlist, special-info).
    #[arg(long, default_value = "monlist")]
    side_window: String,
    /// Print composed screens to stdout instead of running the terminal UI.
    #[arg(long)]
    dump: bool,
    /// With --dump, print screens as JSON.
    #[arg(long, requires = "dump")]
    json: bool,
    /// With --dump, exit after this many ticks.
    #[arg(long, requires = "dump")]
    frames: Option<u64>,
    /// Terminal size the status indicators are laid out for.
    #[arg(long, default_value_t = 80)]
    width: u16,
    #[arg(long, default_value_t = 24)]
    height: u16,
    /// Lay out status as a character that cannot cast spells.
    #[arg(long)]
    no_cast: bool,
}

/// Commands from the redraw side to the network pump.
#[derive(Debug, Clone)]
pub enum ClientCommand {
    Send(ClientMessage),
    Quit,
}

enum PumpExit {
    Disconnected,
    Quit,
}

/// Sink for composed screens in `--dump` mode.
struct Dump {
    json: bool,
    remaining: Option<u64>,
}

impl Dump {
    /// Returns false once enough frames have been printed.
    fn print(&mut self, screen: &Screen) -> Result<bool> {
        if self.json {
            println!("{}", serde_json::to_string(screen)?);
        } else {
            println!("== tick {} ==", screen.tick.unwrap_or_default());
            for line in screen.map.iter().chain(&screen.side).chain(&screen.status) {
                println!("{line}");
            }
        }
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining = remaining.saturating_sub(1);
            return Ok(*remaining > 0);
        }
        Ok(true)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let side_kind = parse_window_kind(&cli.side_window)
        .ok_or_else(|| eyre!("unknown window kind '{}'", cli.side_window))?;
    let layout = ScreenLayout {
        term_width: cli.width,
        term_height: cli.height,
        side_width: cli.width,
        side_height: cli.height,
        can_cast: !cli.no_cast,
        ..ScreenLayout::default()
    };

    let (command_tx, mut command_rx) = unbounded_channel::<ClientCommand>();
    let (mut publisher, subscriber) = handoff(Screen::default());
    let mut dump = None;

    if cli.dump {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .compact()
            .with_writer(std::io::stderr)
            .init();
        dump = Some(Dump {
            json: cli.json,
            remaining: cli.frames,
        });
    } else {
        let (log_tx, log_rx) = mpsc::channel::<String>();
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .compact()
            .with_ansi(false)
            .with_writer(move || ChannelWriter {
                sender: log_tx.clone(),
            })
            .init();
        let ui_commands = command_tx.clone();
        let subscribed = cli.subscribe.iter().copied().collect();
        let _ui_handle = std::thread::spawn(move || -> Result<()> {
            let app = InspectorApp::new(subscriber, ui_commands, log_rx, subscribed)?;
            app.run()
        });
    }

    let mut subscriptions: BTreeSet<u8> = cli.subscribe.iter().copied().collect();
    info!("Connecting to feed at {}", cli.endpoint);

    loop {
        match TcpStream::connect(&cli.endpoint).await {
            Ok(stream) => {
                info!("Connected. Press q to exit.");
                let mut pump = Pump {
                    session: ClientSession::new(),
                    panes: Panes::new(layout, side_kind),
                    latest: Screen::default(),
                    publisher: &mut publisher,
                    subscriptions: &mut subscriptions,
                    dump: dump.as_mut(),
                };
                match pump.run(stream, &mut command_rx).await {
                    Ok(PumpExit::Quit) => break,
                    Ok(PumpExit::Disconnected) => {
                        warn!("Server closed the connection");
                    }
                    Err(err) => warn!("Connection error: {:#}", err),
                }
                info!("Reconnecting in 2 seconds...");
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
            Err(err) => {
                warn!("Failed to connect: {}", err);
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
        if drain_offline(&mut command_rx, &mut subscriptions) {
            break;
        }
    }

    info!("Inspector requested shutdown");
    Ok(())
}

/// One connection's worth of state between the socket and the redraw side.
struct Pump<'a> {
    session: ClientSession,
    panes: Panes,
    latest: Screen,
    publisher: &'a mut Publisher<Screen>,
    subscriptions: &'a mut BTreeSet<u8>,
    dump: Option<&'a mut Dump>,
}

impl Pump<'_> {
    async fn run(
        &mut self,
        stream: TcpStream,
        commands: &mut UnboundedReceiver<ClientCommand>,
    ) -> Result<PumpExit> {
        let (reader, mut writer) = stream.into_split();
        let (frame_tx, mut frame_rx) = unbounded_channel::<Vec<u8>>();
        let reader_task = tokio::spawn(read_frames(reader, frame_tx));

        for stream in self.subscriptions.iter().copied() {
            send_message(&mut writer, &ClientMessage::Subscribe(stream)).await?;
        }

        let exit = loop {
            tokio::select! {
                frame = frame_rx.recv() => match frame {
                    Some(payload) => {
                        if !self.handle_frame(&payload)? {
                            break PumpExit::Quit;
                        }
                    }
                    None => break PumpExit::Disconnected,
                },
                command = commands.recv() => match command {
                    Some(ClientCommand::Send(message)) => {
                        self.track(&message);
                        send_message(&mut writer, &message).await?;
                    }
                    Some(ClientCommand::Quit) | None => break PumpExit::Quit,
                },
            }
        };

        reader_task.abort();
        if let PumpExit::Disconnected = exit {
            if let Ok(Err(err)) = reader_task.await {
                return Err(err);
            }
        }
        Ok(exit)
    }

    /// Returns false when dump mode has printed all requested frames.
    fn handle_frame(&mut self, payload: &[u8]) -> Result<bool> {
        let event = self
            .session
            .handle_bytes(payload)
            .wrap_err("server sent an unusable message")?;
        match event {
            SessionEvent::SchemaLoaded {
                streams,
                indicators,
            } => info!(streams, indicators, "schema.loaded"),
            SessionEvent::Tick {
                tick,
                applied,
                rejected,
            } => {
                trace!(tick, applied, rejected, "feed.tick");
                let screen = self.panes.render(&mut self.session);
                if let Some(dump) = self.dump.as_mut() {
                    if !dump.print(&screen)? {
                        return Ok(false);
                    }
                }
                self.latest = screen.clone();
                self.publisher.publish(screen);
            }
            SessionEvent::Listing => {
                self.latest.listing = self
                    .session
                    .listing()
                    .iter()
                    .map(|group| group.streams.clone())
                    .collect();
                self.publisher.publish(self.latest.clone());
            }
            SessionEvent::IndicatorText(_) | SessionEvent::Ignored => {}
        }
        Ok(true)
    }

    fn track(&mut self, message: &ClientMessage) {
        match *message {
            ClientMessage::Subscribe(stream) => {
                self.subscriptions.insert(stream);
            }
            ClientMessage::Unsubscribe(stream) => {
                self.subscriptions.remove(&stream);
                self.session.forget_stream(stream);
            }
            ClientMessage::RequestListing => {}
        }
    }
}

/// Commands issued while disconnected. Subscription changes are kept for the
/// next connection; returns true if the user asked to quit.
fn drain_offline(
    commands: &mut UnboundedReceiver<ClientCommand>,
    subscriptions: &mut BTreeSet<u8>,
) -> bool {
    while let Ok(command) = commands.try_recv() {
        match command {
            ClientCommand::Quit => return true,
            ClientCommand::Send(ClientMessage::Subscribe(stream)) => {
                subscriptions.insert(stream);
            }
            ClientCommand::Send(ClientMessage::Unsubscribe(stream)) => {
                subscriptions.remove(&stream);
            }
            ClientCommand::Send(ClientMessage::RequestListing) => {}
        }
    }
    false
}

async fn read_frames(mut reader: OwnedReadHalf, frames: UnboundedSender<Vec<u8>>) -> Result<()> {
    let mut len_buf = [0u8; 4];
    loop {
        match reader.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(err) => return Err(err.into()),
        }
        let len = u32::from_le_bytes(len_buf) as usize;
        if len > MAX_FRAME_LEN {
            return Err(eyre!("frame of {} bytes exceeds the {} byte limit", len, MAX_FRAME_LEN));
        }
        let mut payload = vec![0u8; len];
        reader.read_exact(&mut payload).await?;
        if frames.send(payload).is_err() {
            return Ok(());
        }
    }
}

async fn send_message(writer: &mut OwnedWriteHalf, message: &ClientMessage) -> Result<()> {
    let payload = encode_client(message)?;
    writer
        .write_all(&(payload.len() as u32).to_le_bytes())
        .await?;
    writer.write_all(&payload).await?;
    trace!(?message, "command.sent");
    Ok(())
}

#[cfg(test)]
mod tests {
    use feed_schema::WindowFlags;

    use super::*;

    #[test]
    fn cli_parses_subscriptions_and_window() {
        let cli = Cli::parse_from([
            "feed_inspector",
            "--subscribe",
            "1,3",
            "--side-window",
            "special-info",
            "--dump",
            "--frames",
            "2",
        ]);
        assert_eq!(cli.subscribe, vec![1, 3]);
        assert_eq!(
            parse_window_kind(&cli.side_window),
            Some(WindowFlags::SPECIAL_INFO)
        );
        assert_eq!(cli.frames, Some(2));
    }

    #[test]
    fn frame_limit_only_applies_with_dump() {
        assert!(Cli::try_parse_from(["feed_inspector", "--frames", "2"]).is_err());
    }

    #[test]
    fn offline_commands_update_subscriptions() {
        let (tx, mut rx) = unbounded_channel();
        tx.send(ClientCommand::Send(ClientMessage::Subscribe(4))).unwrap();
        tx.send(ClientCommand::Send(ClientMessage::Unsubscribe(3))).unwrap();
        let mut subscriptions = BTreeSet::from([3]);
        assert!(!drain_offline(&mut rx, &mut subscriptions));
        assert_eq!(subscriptions, BTreeSet::from([4]));

        tx.send(ClientCommand::Quit).unwrap();
        assert!(drain_offline(&mut rx, &mut subscriptions));
    }

    #[test]
    fn dump_stops_after_requested_frames() {
        let mut dump = Dump {
            json: true,
            remaining: Some(2),
        };
        let screen = Screen::default();
        assert!(dump.print(&screen).unwrap());
        assert!(!dump.print(&screen).unwrap());
    }
}
