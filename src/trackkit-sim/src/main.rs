//! trackkit-sim — replay a scripted browsing session through the tracker.
//!
//! Builds a simulated page, installs a tracker with the loaded
//! configuration, replays the scenario and posts (or prints) every envelope.

mod scenario;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};
use trackkit_core::{capture_transport, HttpTransport, SystemClock, TrackerConfig, Transport, WallClock};
use trackkit_web::sim::SimPage;
use trackkit_web::Tracker;
use url::Url;

use crate::scenario::Scenario;

#[derive(Parser, Debug)]
#[command(name = "trackkit-sim")]
#[command(about = "Replay a scripted browsing session through the trackkit tracker")]
#[command(version)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Hostname of the simulated page (overrides the scenario)
    #[arg(long)]
    hostname: Option<String>,

    /// Collection endpoint (overrides config)
    #[arg(long, env = "TRACKKIT__REQUEST_URL")]
    request_url: Option<String>,

    /// API key sent with every report (overrides config)
    #[arg(long, env = "TRACKKIT__APIKEY")]
    apikey: Option<String>,

    /// Scenario file; the built-in demo session when omitted
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Print envelopes as JSON lines instead of sending them
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trackkit=info".into()),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = TrackerConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        TrackerConfig::default()
    });
    if let Some(url) = cli.request_url {
        config.request_url = url;
    }
    if let Some(apikey) = cli.apikey {
        config.apikey = apikey;
    }

    let mut scenario = match &cli.scenario {
        Some(path) => Scenario::from_path(path)?,
        None => Scenario::demo(),
    };
    if let Some(hostname) = &cli.hostname {
        let mut href = Url::parse(&scenario.href)?;
        href.set_host(Some(hostname))?;
        scenario.href = href.to_string();
    }

    info!(
        href = %scenario.href,
        appid = %config.appid,
        request_url = %config.request_url,
        allow_list = ?config.report_white_list,
        dry_run = cli.dry_run,
        "Configuration loaded"
    );

    let sim = SimPage::new(&scenario.href);
    sim.clock.set(SystemClock.now_millis());
    scenario.build(&sim)?;

    let capture = capture_transport();
    let transport: Arc<dyn Transport> = if cli.dry_run {
        capture.clone()
    } else {
        Arc::new(HttpTransport::new()?)
    };

    let tracker = Tracker::new(config, sim.page(), transport);
    scenario.replay(&sim, &tracker)?;

    if cli.dry_run {
        for body in capture.bodies() {
            println!("{}", serde_json::to_string(&body)?);
        }
    }

    info!(installed = tracker.is_installed(), "Session finished");
    Ok(())
}
