mod support;

use imgdedup_agent::mock_service::{DuplicateMap, MockService, MockServiceConfig};
use imgdedup_agent::{
    wait_until, Agent, AgentConfig, CancelToken, ConnectionState, HandshakeState, MemoryGallery,
    WaitPolicy,
};
use std::net::TcpListener;
use std::thread;
use std::time::Duration;
use support::{poster_hrefs, RecordingNotifier, POSTERS_PAGE};
use tungstenite::Message;

fn config_for(service: &MockService) -> AgentConfig {
    let url = format!("ws://{}", service.listen_addr());
    let mut config = AgentConfig::new(&url, POSTERS_PAGE, None).expect("config");
    config.wait = WaitPolicy {
        interval: Duration::from_millis(5),
        timeout: Some(Duration::from_secs(5)),
    };
    config
}

#[test]
fn ws_handshake_and_duplicate_check() {
    let mut duplicates = DuplicateMap::new();
    duplicates.insert("c.jpg".to_string(), vec!["a.jpg".to_string()]);
    let service = MockService::spawn(
        "127.0.0.1:0",
        MockServiceConfig {
            version: 3,
            duplicates,
        },
    )
    .expect("spawn mock service");

    let dom = MemoryGallery::from_hrefs(&poster_hrefs(&["a.jpg", "b.jpg", "c.jpg"]));
    let notifier = RecordingNotifier::new();
    let cancel = CancelToken::new();
    let mut agent = Agent::connect(config_for(&service)).expect("connect");

    agent.wait_until_open(&dom, &notifier, &cancel).expect("open");
    let state = agent.wait_until_settled(&dom, &notifier, &cancel).expect("settled");
    assert_eq!(state, HandshakeState::Compatible);

    agent.find_duplicates(&dom).expect("request");
    let policy = agent.config().wait;
    wait_until(policy, &cancel, || {
        agent.tick(&dom, &notifier);
        agent.results_applied() > 0
    })
    .expect("result applied");

    assert_eq!(dom.hrefs(), poster_hrefs(&["a.jpg", "c.jpg", "b.jpg"]));
    assert_eq!(dom.highlighted(), poster_hrefs(&["a.jpg", "c.jpg"]));
    let messages = notifier.messages();
    assert!(messages.iter().any(|m| m.contains("Fetching images")), "{messages:?}");
    assert!(messages.iter().any(|m| m.contains("Found 2 duplicate")), "{messages:?}");

    agent.shutdown();
    service.shutdown();
}

#[test]
fn version_mismatch_is_settled_not_fatal() {
    let service = MockService::spawn(
        "127.0.0.1:0",
        MockServiceConfig {
            version: 2,
            duplicates: DuplicateMap::new(),
        },
    )
    .expect("spawn mock service");

    let dom = MemoryGallery::from_hrefs(&poster_hrefs(&["a.jpg"]));
    let notifier = RecordingNotifier::new();
    let cancel = CancelToken::new();
    let mut agent = Agent::connect(config_for(&service)).expect("connect");

    agent.wait_until_open(&dom, &notifier, &cancel).expect("open");
    let state = agent.wait_until_settled(&dom, &notifier, &cancel).expect("settled");
    assert_eq!(state, HandshakeState::ServerOutdated);
    assert_eq!(agent.channel().state(), ConnectionState::Open);
    assert_eq!(notifier.toasts().len(), 1);

    service.shutdown();
}

#[test]
fn unreachable_service_closes_without_opening() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let mut config = AgentConfig::new(&format!("ws://{addr}"), POSTERS_PAGE, None).expect("config");
    config.wait = WaitPolicy {
        interval: Duration::from_millis(5),
        timeout: Some(Duration::from_secs(5)),
    };
    let dom = MemoryGallery::from_hrefs(&poster_hrefs(&["a.jpg"]));
    let notifier = RecordingNotifier::new();
    let mut agent = Agent::connect(config).expect("connect");

    assert!(agent.wait_until_open(&dom, &notifier, &CancelToken::new()).is_err());
    assert_eq!(agent.channel().state(), ConnectionState::Closed);
    assert!(notifier.toasts().is_empty());
}

#[test]
fn shutdown_returns_while_the_service_floods_frames() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    thread::spawn(move || {
        let Ok((stream, _)) = listener.accept() else { return };
        let Ok(mut ws) = tungstenite::accept(stream) else { return };
        thread::sleep(Duration::from_millis(200));
        for i in 0..2000 {
            if ws.send(Message::Text(format!("frame-{i}"))).is_err() {
                return;
            }
        }
    });

    let (done_tx, done_rx) = crossbeam_channel::bounded(1);
    thread::spawn(move || {
        let mut config =
            AgentConfig::new(&format!("ws://{addr}"), POSTERS_PAGE, None).expect("config");
        config.wait = WaitPolicy {
            interval: Duration::from_millis(5),
            timeout: Some(Duration::from_secs(5)),
        };
        let dom = MemoryGallery::from_hrefs(&poster_hrefs(&["a.jpg"]));
        let notifier = RecordingNotifier::new();
        let mut agent = Agent::connect(config).expect("connect");
        agent.wait_until_open(&dom, &notifier, &CancelToken::new()).expect("open");

        // Stop polling so the inbound queue fills up.
        thread::sleep(Duration::from_millis(600));
        agent.shutdown();
        let _ = done_tx.send(());
    });

    done_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("shutdown did not return");
}
