//! Stand-in for the local analysis service. It speaks the same protocol but
//! takes its duplicate pairs from a fixed map instead of looking at pixels.

use crate::protocol::{ClientCommand, DuplicateQuery, DuplicateReport, ServerMessage, VersionToken};
use imgdedup_protocol::{ClientFrame, CONNECTED};
use std::collections::{HashMap, HashSet};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};
use tungstenite::protocol::Message;
use tungstenite::WebSocket;

/// Image name to the names the service considers similar to it.
pub type DuplicateMap = HashMap<String, Vec<String>>;

#[derive(Debug, Clone)]
pub struct MockServiceConfig {
    pub version: i64,
    pub duplicates: DuplicateMap,
}

pub struct MockService {
    shutdown: Arc<AtomicBool>,
    join_handle: Mutex<Option<JoinHandle<()>>>,
    listen_addr: SocketAddr,
}

impl MockService {
    pub fn spawn(addr: &str, config: MockServiceConfig) -> Result<Self, String> {
        let listener =
            TcpListener::bind(addr).map_err(|e| format!("ws bind failed on {addr}: {e}"))?;
        let listen_addr = listener
            .local_addr()
            .map_err(|e| format!("ws local_addr failed: {e}"))?;
        listener
            .set_nonblocking(true)
            .map_err(|e| format!("ws set_nonblocking failed: {e}"))?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_for_thread = Arc::clone(&shutdown);
        let join_handle = thread::spawn(move || run_server(listener, config, shutdown_for_thread));

        Ok(Self {
            shutdown,
            join_handle: Mutex::new(Some(join_handle)),
            listen_addr,
        })
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
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

impl Drop for MockService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_server(listener: TcpListener, config: MockServiceConfig, shutdown: Arc<AtomicBool>) {
    let mut active: Option<WebSocket<TcpStream>> = None;

    while !shutdown.load(Ordering::Relaxed) {
        // Accept new connections (single-client policy).
        loop {
            match listener.accept() {
                Ok((stream, socket_addr)) => {
                    let _ = stream.set_nonblocking(false);
                    let _ = stream.set_nodelay(true);

                    let mut ws = match tungstenite::accept(stream) {
                        Ok(ws) => ws,
                        Err(e) => {
                            warn!("ws handshake failed: {e}");
                            continue;
                        }
                    };
                    // Short timeouts only once the handshake is done.
                    let _ = ws.get_ref().set_read_timeout(Some(Duration::from_millis(30)));
                    let _ = ws.get_ref().set_write_timeout(Some(Duration::from_millis(200)));

                    if let Some(mut prev) = active.take() {
                        let _ = prev.close(None);
                    }

                    if let Err(e) = ws.send(Message::Text(CONNECTED.to_string())) {
                        warn!("failed to greet client: {e}");
                        continue;
                    }
                    info!(%socket_addr, "client connected");
                    active = Some(ws);
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("ws accept failed: {e}");
                    break;
                }
            }
        }

        let Some(ws) = active.as_mut() else {
            // If no active client, avoid busy-looping.
            thread::sleep(Duration::from_millis(25));
            continue;
        };

        match ws.read() {
            Ok(Message::Text(text)) => {
                if let Err(e) = handle_client_frame(ws, &config, &text) {
                    warn!("reply failed: {e}");
                    active = None;
                }
            }
            Ok(Message::Close(_)) => {
                info!("client disconnected");
                active = None;
            }
            Ok(_) => {}
            Err(tungstenite::Error::Io(e))
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(_) => active = None,
        }
    }

    if let Some(mut ws) = active {
        let _ = ws.close(None);
        let _ = ws.flush();
    }
}

fn handle_client_frame(
    ws: &mut WebSocket<TcpStream>,
    config: &MockServiceConfig,
    text: &str,
) -> Result<(), tungstenite::Error> {
    match ClientFrame::parse(text) {
        ClientFrame::VersionRequest => send(
            ws,
            &ServerMessage::VersionResult(VersionToken(config.version.to_string().into())),
        ),
        ClientFrame::Command(ClientCommand::FindDuplicateImages(query)) => {
            info!(
                images = query.images.len(),
                image_type = %query.image_type,
                "duplicate check requested"
            );
            send(ws, &ServerMessage::Toast("📥 Fetching images...".to_string()))?;
            send(ws, &ServerMessage::Toast("🤖 Identifying duplicates...".to_string()))?;
            let report = build_report(&config.duplicates, &query);
            send(ws, &ServerMessage::FindDuplicateImagesResult(report))
        }
        ClientFrame::Unknown(frame) => {
            warn!(%frame, "unknown frame from client");
            Ok(())
        }
    }
}

fn send(ws: &mut WebSocket<TcpStream>, msg: &ServerMessage) -> Result<(), tungstenite::Error> {
    let payload = msg
        .to_frame()
        .map_err(|e| tungstenite::Error::Io(std::io::Error::other(e)))?;
    debug!(action = %msg.kind(), "ws send");
    ws.send(Message::Text(payload))
}

pub fn build_report(duplicates: &DuplicateMap, query: &DuplicateQuery) -> DuplicateReport {
    let groups = group_duplicates(duplicates, &query.images);
    let sorted_images = groups.iter().flatten().cloned().collect();
    let duplicate_images = groups
        .iter()
        .filter(|g| g.len() > 1)
        .flatten()
        .cloned()
        .collect();
    DuplicateReport {
        duplicate_images,
        sorted_images,
        duplicate_images_grouped: Some(groups),
        request_id: query.request_id,
    }
}

/// Groups images that are transitively similar. Groups are discovered in
/// request order; groups with more than one member come first, singletons
/// after, each keeping discovery order. Pairs naming images outside the
/// request are ignored.
pub fn group_duplicates(duplicates: &DuplicateMap, images: &[String]) -> Vec<Vec<String>> {
    let mut nodes: Vec<&str> = Vec::new();
    let mut known = HashSet::new();
    for image in images {
        if known.insert(image.as_str()) {
            nodes.push(image.as_str());
        }
    }

    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for &node in &nodes {
        let Some(others) = duplicates.get(node) else { continue };
        for other in others {
            let other = other.as_str();
            if other == node || !known.contains(other) {
                continue;
            }
            link(&mut adjacency, node, other);
            link(&mut adjacency, other, node);
        }
    }

    let mut visited = HashSet::new();
    let mut groups = Vec::new();
    for &start in &nodes {
        if !visited.insert(start) {
            continue;
        }
        let mut group = Vec::new();
        let mut stack = vec![start];
        while let Some(node) = stack.pop() {
            group.push(node.to_string());
            if let Some(neighbours) = adjacency.get(node) {
                for &next in neighbours.iter().rev() {
                    if visited.insert(next) {
                        stack.push(next);
                    }
                }
            }
        }
        groups.push(group);
    }

    let (multi, singles): (Vec<_>, Vec<_>) = groups.into_iter().partition(|g| g.len() > 1);
    multi.into_iter().chain(singles).collect()
}

fn link<'a>(adjacency: &mut HashMap<&'a str, Vec<&'a str>>, from: &'a str, to: &'a str) {
    let entry = adjacency.entry(from).or_default();
    if !entry.contains(&to) {
        entry.push(to);
    }
}
