use anyhow::{bail, Context};
use clap::Parser;
use imgdedup_agent::{
    Agent, AgentConfig, CancelToken, ConfigOverrides, LogNotifier, MemoryGallery, UiEvent,
};
use imgdedup_protocol::ImageType;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Runs one duplicate check over a saved gallery page and prints the
/// resulting order. Highlighted images are marked with `*`. Flags win over
/// the `IMGDEDUP_*` environment.
#[derive(Debug, Parser)]
struct Args {
    #[arg(long)]
    page_url: Option<String>,
    #[arg(long)]
    ws_url: Option<String>,
    /// Overrides the type taken from the page path.
    #[arg(long)]
    image_type: Option<ImageType>,
    /// Similarity threshold in percent, typed as into the entry box.
    #[arg(long)]
    threshold: Option<String>,
    /// File with one image href per line, in page order.
    #[arg(long)]
    snapshot: PathBuf,
    #[arg(long, default_value_t = 10_000)]
    timeout_ms: u64,
}

fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();

    let text = fs::read_to_string(&args.snapshot)
        .with_context(|| format!("reading {}", args.snapshot.display()))?;
    let hrefs: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .collect();
    let dom = MemoryGallery::from_hrefs(&hrefs);

    let mut config = AgentConfig::from_env_with(ConfigOverrides {
        ws_url: args.ws_url,
        page_url: args.page_url,
        image_type: args.image_type,
        wait_ms: None,
    })?;
    config.wait.timeout = Some(Duration::from_millis(args.timeout_ms));
    let notifier = LogNotifier;
    let cancel = CancelToken::new();

    let mut agent = Agent::connect(config)?;
    agent.mount_controls(&dom)?;
    if let Some(threshold) = args.threshold {
        agent.handle_ui(&dom, &notifier, UiEvent::EntryInput(threshold));
    }
    info!(
        images = hrefs.len(),
        threshold = agent.threshold().percent(),
        image_type = %agent.config().image_type,
        "starting duplicate check"
    );

    agent.wait_until_open(&dom, &notifier, &cancel)?;
    agent.wait_for_gallery(&dom, &cancel)?;
    agent.wait_until_settled(&dom, &notifier, &cancel)?;

    let before = agent.results_applied();
    let sent = agent.find_duplicates(&dom)?;
    info!(sent, "request sent");

    let policy = agent.config().wait;
    imgdedup_agent::wait_until(policy, &cancel, || {
        agent.tick(&dom, &notifier);
        agent.results_applied() > before || !agent.channel().is_open()
    })?;
    if agent.results_applied() == before {
        bail!("connection closed before a result arrived");
    }

    let highlighted = dom.highlighted();
    for href in dom.hrefs() {
        let mark = if highlighted.contains(&href) { "*" } else { " " };
        println!("{mark} {href}");
    }

    agent.shutdown();
    Ok(())
}
