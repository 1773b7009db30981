use std::collections::HashMap;
use std::io;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use feed_proto::{decode_client, read_frame, write_frame, ClientMessage, ProtoError};

use crate::components::ConnectionId;

/// Something the transport observed, handed to the tick loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    Connected(ConnectionId),
    Disconnected(ConnectionId),
    Message(ConnectionId, ClientMessage),
}

/// Outgoing half of a connection: its frame queue and a handle for cutting
/// the socket when the peer falls too far behind.
struct Writer {
    frames: Sender<Vec<u8>>,
    stream: TcpStream,
}

type Writers = Arc<Mutex<HashMap<ConnectionId, Writer>>>;

/// Accepts feed clients and moves frames between sockets and the tick loop.
///
/// Each connection gets a reader thread and a writer thread, so the tick
/// loop only ever touches channels and never waits on a slow peer.
pub struct FeedListener {
    events: Receiver<NetworkEvent>,
    writers: Writers,
    local_addr: SocketAddr,
}

impl FeedListener {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Events received since the last poll.
    pub fn poll(&self) -> Vec<NetworkEvent> {
        self.events.try_iter().collect()
    }

    /// Queue a serialized message for a connection. Frames for connections
    /// that have gone away are dropped.
    ///
    /// A connection whose queue is full is disconnected rather than left with
    /// a gap in its stream. Its reader thread then reports
    /// [`NetworkEvent::Disconnected`].
    pub fn send(&self, connection: ConnectionId, payload: Vec<u8>) {
        let mut writers = self.writers.lock().expect("feed writers mutex poisoned");
        let Some(writer) = writers.get(&connection) else {
            log::debug!("Dropping frame for departed {}", connection);
            return;
        };
        match writer.frames.try_send(payload) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                log::warn!(
                    "Feed client {} fell {} frames behind; disconnecting",
                    connection,
                    writer.frames.capacity().unwrap_or_default()
                );
                if let Some(writer) = writers.remove(&connection) {
                    let _ = writer.stream.shutdown(Shutdown::Both);
                }
            }
            Err(TrySendError::Disconnected(_)) => {
                log::debug!("Writer for {} already closed", connection);
            }
        }
    }
}

/// Bind and start accepting. Each connection may queue up to `queue_frames`
/// outgoing frames.
pub fn start_feed_listener(bind_addr: SocketAddr, queue_frames: usize) -> Option<FeedListener> {
    let listener = match TcpListener::bind(bind_addr) {
        Ok(listener) => listener,
        Err(err) => {
            log::warn!("Feed listener bind failed at {}: {}", bind_addr, err);
            return None;
        }
    };
    let local_addr = match listener.local_addr() {
        Ok(addr) => addr,
        Err(err) => {
            log::warn!("Feed listener has no local address: {}", err);
            return None;
        }
    };
    if let Err(err) = listener.set_nonblocking(true) {
        log::warn!("Feed listener could not be made nonblocking: {}", err);
        return None;
    }

    let (event_tx, event_rx) = unbounded::<NetworkEvent>();
    let writers: Writers = Arc::new(Mutex::new(HashMap::new()));
    let accept_writers = Arc::clone(&writers);
    let next_id = AtomicU64::new(1);

    thread::spawn(move || loop {
        match listener.accept() {
            Ok((stream, addr)) => {
                let connection = ConnectionId(next_id.fetch_add(1, Ordering::Relaxed));
                log::info!("Feed client {} connected from {}", connection, addr);
                if let Err(err) =
                    accept_client(stream, connection, queue_frames, &event_tx, &accept_writers)
                {
                    log::warn!("Failed to set up feed client {}: {}", connection, err);
                }
            }
            Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(20));
            }
            Err(err) => {
                log::error!("Error accepting feed client: {}", err);
                thread::sleep(Duration::from_millis(200));
            }
        }
    });

    Some(FeedListener {
        events: event_rx,
        writers,
        local_addr,
    })
}

fn accept_client(
    stream: TcpStream,
    connection: ConnectionId,
    queue_frames: usize,
    events: &Sender<NetworkEvent>,
    writers: &Writers,
) -> io::Result<()> {
    if let Err(err) = stream.set_nodelay(true) {
        log::warn!("Failed to set TCP_NODELAY: {}", err);
    }
    stream.set_nonblocking(false)?;
    let reader = stream.try_clone()?;
    let control = stream.try_clone()?;

    let (frame_tx, frame_rx) = bounded::<Vec<u8>>(queue_frames.max(1));
    writers.lock().expect("feed writers mutex poisoned").insert(
        connection,
        Writer {
            frames: frame_tx,
            stream: control,
        },
    );
    // Registration must be visible to the tick loop before any message.
    let _ = events.send(NetworkEvent::Connected(connection));

    thread::spawn(move || write_loop(stream, connection, frame_rx));

    let events = events.clone();
    let writers = Arc::clone(writers);
    thread::spawn(move || {
        read_loop(reader, connection, &events);
        writers
            .lock()
            .expect("feed writers mutex poisoned")
            .remove(&connection);
        let _ = events.send(NetworkEvent::Disconnected(connection));
        log::info!("Feed client {} disconnected", connection);
    });
    Ok(())
}

fn read_loop(mut stream: TcpStream, connection: ConnectionId, events: &Sender<NetworkEvent>) {
    loop {
        let payload = match read_frame(&mut stream) {
            Ok(payload) => payload,
            Err(ProtoError::Io(err)) if err.kind() == io::ErrorKind::UnexpectedEof => return,
            Err(err) => {
                log::warn!("Feed client {} read failed: {}", connection, err);
                return;
            }
        };
        match decode_client(&payload) {
            Ok(message) => {
                if events
                    .send(NetworkEvent::Message(connection, message))
                    .is_err()
                {
                    return;
                }
            }
            Err(err) => log::warn!("Ignoring undecodable message from {}: {}", connection, err),
        }
    }
}

fn write_loop(mut stream: TcpStream, connection: ConnectionId, frames: Receiver<Vec<u8>>) {
    for payload in frames {
        if let Err(err) = write_frame(&mut stream, &payload) {
            log::warn!("Dropping feed client {}: {}", connection, err);
            let _ = stream.shutdown(Shutdown::Both);
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;

    fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();
        (server, client)
    }

    #[test]
    fn full_queue_disconnects_the_peer() {
        let (server, mut client) = socket_pair();
        let (frames, queued) = bounded(2);
        let connection = ConnectionId(7);
        let writers: Writers = Arc::new(Mutex::new(HashMap::new()));
        writers.lock().unwrap().insert(
            connection,
            Writer {
                frames,
                stream: server,
            },
        );
        let (_events_tx, events) = unbounded();
        let listener = FeedListener {
            events,
            writers: Arc::clone(&writers),
            local_addr: client.local_addr().unwrap(),
        };

        listener.send(connection, vec![1]);
        listener.send(connection, vec![2]);
        assert!(writers.lock().unwrap().contains_key(&connection));

        listener.send(connection, vec![3]);
        assert!(!writers.lock().unwrap().contains_key(&connection));
        assert_eq!(queued.try_iter().collect::<Vec<_>>(), vec![vec![1], vec![2]]);

        client
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(client.read(&mut buf).unwrap(), 0);

        // Later frames for the dropped connection go nowhere.
        listener.send(connection, vec![4]);
        assert!(queued.is_empty());
    }

    #[test]
    fn stalled_reader_is_disconnected_over_tcp() {
        let listener = start_feed_listener("127.0.0.1:0".parse().unwrap(), 1).unwrap();
        let _client = TcpStream::connect(listener.local_addr()).unwrap();

        let mut connection = None;
        let mut disconnected = false;
        for _ in 0..500 {
            for event in listener.poll() {
                match event {
                    NetworkEvent::Connected(id) => connection = Some(id),
                    NetworkEvent::Disconnected(id) if Some(id) == connection => disconnected = true,
                    _ => {}
                }
            }
            if disconnected {
                break;
            }
            if let Some(id) = connection {
                // The client never reads, so the socket buffers fill and the
                // one-frame queue backs up.
                listener.send(id, vec![0xab; 256 * 1024]);
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert!(connection.is_some());
        assert!(disconnected);
    }
}
