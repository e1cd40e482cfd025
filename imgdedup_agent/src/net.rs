use crate::error::TransportError;
use crate::protocol::TransportEvent;
use crossbeam_channel::{Receiver, SendTimeoutError, Sender, TryRecvError};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tungstenite::protocol::Message;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::WebSocket;

const READ_TIMEOUT: Duration = Duration::from_millis(30);
const WRITE_TIMEOUT: Duration = Duration::from_millis(200);
const PUSH_RETRY: Duration = Duration::from_millis(50);

type ClientSocket = WebSocket<MaybeTlsStream<TcpStream>>;

/// Owns the one socket to the local service. Frames go out through `out_rx`
/// and everything that happens on the wire comes back through `in_tx`.
pub struct NetworkThread {
    shutdown: Arc<AtomicBool>,
    join_handle: Mutex<Option<JoinHandle<()>>>,
}

impl NetworkThread {
    pub fn spawn(
        url: &str,
        in_tx: Sender<TransportEvent>,
        out_rx: Receiver<String>,
    ) -> Result<Self, TransportError> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_for_thread = Arc::clone(&shutdown);
        let url = url.to_string();

        let join_handle = thread::Builder::new()
            .name("imgdedup-net".to_string())
            .spawn(move || run_client(&url, in_tx, out_rx, shutdown_for_thread))?;

        Ok(Self {
            shutdown,
            join_handle: Mutex::new(Some(join_handle)),
        })
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Ok(mut h) = self.join_handle.lock() {
            if let Some(h) = h.take() {
                let _ = h.join();
            }
        }
    }
}

impl Drop for NetworkThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_client(
    url: &str,
    in_tx: Sender<TransportEvent>,
    out_rx: Receiver<String>,
    shutdown: Arc<AtomicBool>,
) {
    let mut ws = match tungstenite::connect(url) {
        Ok((ws, _resp)) => ws,
        Err(e) => {
            error!(%url, "ws connect failed: {e}");
            let _ = in_tx.send(TransportEvent::Failed(e.to_string()));
            return;
        }
    };

    if let MaybeTlsStream::Plain(stream) = ws.get_ref() {
        let _ = stream.set_nodelay(true);
        let _ = stream.set_read_timeout(Some(READ_TIMEOUT));
        let _ = stream.set_write_timeout(Some(WRITE_TIMEOUT));
    }

    info!(%url, "ws connected");
    if in_tx.send(TransportEvent::Opened).is_err() {
        let _ = ws.close(None);
        return;
    }

    while !shutdown.load(Ordering::Relaxed) {
        // Outbound: drain queued frames.
        loop {
            match out_rx.try_recv() {
                Ok(payload) => {
                    debug!(bytes = payload.len(), "ws send");
                    if let Err(e) = ws.send(Message::Text(payload)) {
                        warn!("ws send failed: {e}");
                        let _ = ws.close(None);
                        let _ = push(&in_tx, TransportEvent::Closed, &shutdown);
                        return;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    let _ = ws.close(None);
                    return;
                }
            }
        }

        // Inbound: read at most one message per loop (timeouts keep the loop moving).
        match ws.read() {
            Ok(msg) => {
                if !handle_inbound(&in_tx, &mut ws, msg, &shutdown) {
                    let _ = push(&in_tx, TransportEvent::Closed, &shutdown);
                    return;
                }
            }
            Err(tungstenite::Error::Io(e))
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => {
                info!("ws closed by service");
                let _ = push(&in_tx, TransportEvent::Closed, &shutdown);
                return;
            }
            Err(e) => {
                warn!("ws read failed: {e}");
                let _ = push(&in_tx, TransportEvent::Closed, &shutdown);
                return;
            }
        }
    }

    let _ = ws.close(None);
    let _ = ws.flush();
    // The owner may already have stopped polling.
    let _ = in_tx.try_send(TransportEvent::Closed);
}

/// Returns false once the connection is over.
fn handle_inbound(
    in_tx: &Sender<TransportEvent>,
    ws: &mut ClientSocket,
    msg: Message,
    shutdown: &AtomicBool,
) -> bool {
    match msg {
        Message::Text(text) => push(in_tx, TransportEvent::Frame(text), shutdown),
        Message::Binary(_) => {
            debug!("ignoring binary frame");
            true
        }
        Message::Ping(payload) => {
            let _ = ws.send(Message::Pong(payload));
            true
        }
        Message::Pong(_) | Message::Frame(_) => true,
        Message::Close(_) => false,
    }
}

/// Waits for room in the inbound queue, giving up once shutdown is requested
/// or the owner is gone.
fn push(in_tx: &Sender<TransportEvent>, event: TransportEvent, shutdown: &AtomicBool) -> bool {
    let mut event = event;
    loop {
        match in_tx.send_timeout(event, PUSH_RETRY) {
            Ok(()) => return true,
            Err(SendTimeoutError::Timeout(back)) => {
                if shutdown.load(Ordering::Relaxed) {
                    debug!("inbound queue full at shutdown, dropping frame");
                    return false;
                }
                event = back;
            }
            Err(SendTimeoutError::Disconnected(_)) => return false,
        }
    }
}
