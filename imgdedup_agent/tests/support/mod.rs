#![allow(dead_code)]

use crossbeam_channel::{bounded, Receiver, Sender};
use imgdedup_agent::{Agent, AgentConfig, Channel, Notifier, ToastLevel, TransportEvent};
use std::sync::Mutex;

pub const POSTERS_PAGE: &str = "https://www.themoviedb.org/movie/603/images/posters";

#[derive(Default)]
pub struct RecordingNotifier {
    toasts: Mutex<Vec<(ToastLevel, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toasts(&self) -> Vec<(ToastLevel, String)> {
        self.toasts.lock().expect("notifier lock").clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.toasts().into_iter().map(|(_, m)| m).collect()
    }
}

impl Notifier for RecordingNotifier {
    fn toast(&self, level: ToastLevel, message: &str) {
        self.toasts
            .lock()
            .expect("notifier lock")
            .push((level, message.to_string()));
    }
}

/// The socket thread's ends of a channel: push events in, read frames out.
pub struct FakeSocket {
    pub events: Sender<TransportEvent>,
    pub sent: Receiver<String>,
}

impl FakeSocket {
    pub fn open(&self) {
        self.events.send(TransportEvent::Opened).expect("push opened");
    }

    pub fn frame(&self, text: &str) {
        self.events
            .send(TransportEvent::Frame(text.to_string()))
            .expect("push frame");
    }

    pub fn close(&self) {
        self.events.send(TransportEvent::Closed).expect("push closed");
    }

    pub fn sent_frames(&self) -> Vec<String> {
        self.sent.try_iter().collect()
    }
}

pub fn fake_channel() -> (Channel, FakeSocket) {
    let (in_tx, in_rx) = bounded(imgdedup_agent::INBOUND_CAP);
    let (out_tx, out_rx) = bounded(imgdedup_agent::OUTBOUND_CAP);
    let channel = Channel::from_parts("ws://test", in_rx, out_tx);
    (
        channel,
        FakeSocket {
            events: in_tx,
            sent: out_rx,
        },
    )
}

pub fn posters_config() -> AgentConfig {
    AgentConfig::new("ws://test", POSTERS_PAGE, None).expect("config")
}

pub fn fake_agent() -> (Agent, FakeSocket) {
    let (channel, socket) = fake_channel();
    (Agent::new(posters_config(), channel), socket)
}

pub fn poster_hrefs(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| format!("/t/p/original/{n}")).collect()
}
