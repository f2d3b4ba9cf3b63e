//! Toolbird: send analytics beacons from a simulated page.
//!
//! Builds a page from the command line, initializes a tracker against it, and
//! runs one action (pageview, custom event, identify, or a sequence of
//! client-side navigations) before waiting for delivery.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use toolbird_core::{EventData, EventValue, IdentityData, TrackerOptions};
use toolbird_web_sdk::{
    BrowserContext, HttpTransport, ScreenSize, SimulatedBrowser, Tracker, PAGEVIEW_DELAY,
};

#[derive(Parser, Debug)]
#[command(name = "toolbird")]
#[command(about = "Send Toolbird analytics beacons from a simulated page")]
#[command(version)]
struct Cli {
    /// Collection endpoint (overrides config)
    #[arg(long, env = "TOOLBIRD__HOST")]
    host: Option<String>,

    /// Tracked hostname, repeatable (overrides config)
    #[arg(long = "domain")]
    domains: Vec<String>,

    /// Strip query strings from tracked URLs
    #[arg(long, default_value_t = false)]
    exclude_query: bool,

    /// Skip the initial pageview and history hooks
    #[arg(long, default_value_t = false)]
    no_auto_track: bool,

    /// Page URL the beacons appear to come from
    #[arg(long, default_value = "https://localhost/")]
    url: String,

    /// Document referrer
    #[arg(long, default_value = "")]
    referrer: String,

    /// Screen size as WIDTHxHEIGHT
    #[arg(long, default_value = "1920x1080", value_parser = parse_screen)]
    screen: ScreenSize,

    /// Browser language tag
    #[arg(long, default_value = "en-US")]
    language: String,

    /// Per-request timeout in milliseconds
    #[arg(long, default_value_t = 10_000)]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send a pageview for the page URL
    Pageview,

    /// Send a custom event
    Track {
        name: String,
        /// Event data as KEY=VALUE, repeatable
        #[arg(long = "data", value_parser = parse_pair)]
        data: Vec<(String, EventValue)>,
    },

    /// Identify the current visitor
    Identify {
        user_id: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        avatar: Option<String>,
        /// Extra identity data as KEY=VALUE, repeatable
        #[arg(long = "data", value_parser = parse_pair)]
        data: Vec<(String, EventValue)>,
    },

    /// Navigate client-side through each URL in turn
    Navigate {
        #[arg(required = true)]
        urls: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "toolbird=info,toolbird_web_sdk=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    let mut options = TrackerOptions::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        TrackerOptions::new()
    });

    // Apply CLI overrides
    if let Some(host) = cli.host {
        options.host = Some(host);
    }
    if !cli.domains.is_empty() {
        options.domains = Some(cli.domains);
    }
    if cli.exclude_query {
        options.exclude_query = true;
    }
    if cli.no_auto_track {
        options.auto_track = false;
    }

    let browser = Arc::new(
        SimulatedBrowser::new(cli.url)
            .with_referrer(cli.referrer)
            .with_screen(cli.screen.width, cli.screen.height)
            .with_language(cli.language),
    );
    let transport = Arc::new(HttpTransport::with_timeout(Duration::from_millis(
        cli.timeout_ms,
    ))?);
    let tracker = Tracker::new(browser.clone(), transport.clone());

    tracker.init(&options);
    if !tracker.tracking_enabled() {
        warn!(
            hostname = %browser.hostname(),
            domains = ?options.resolved_domains(),
            "hostname is not on the domain allowlist, nothing will be sent"
        );
    }

    match cli.command {
        Command::Pageview => {
            // Auto-tracking already sent it during init.
            if !options.auto_track {
                tracker.pageview();
            }
        }
        Command::Track { name, data } => {
            let data: EventData = data.into_iter().collect();
            tracker.track(Some(name.as_str()), (!data.is_empty()).then_some(data));
        }
        Command::Identify {
            user_id,
            email,
            name,
            avatar,
            data,
        } => {
            let identity = IdentityData {
                email,
                name,
                avatar,
                extra: data.into_iter().collect(),
            };
            tracker.identify(&user_id, Some(identity));
        }
        Command::Navigate { urls } => {
            for url in &urls {
                browser.push_state(Some(url.as_str()));
                tokio::time::sleep(PAGEVIEW_DELAY + Duration::from_millis(50)).await;
            }
        }
    }

    transport.drain().await;
    info!(history = ?browser.history(), "Beacons flushed");
    Ok(())
}

fn parse_screen(value: &str) -> Result<ScreenSize, String> {
    let (width, height) = value
        .split_once('x')
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {value:?}"))?;
    let width = width.trim().parse().map_err(|e| format!("bad width: {e}"))?;
    let height = height.trim().parse().map_err(|e| format!("bad height: {e}"))?;
    Ok(ScreenSize::new(width, height))
}

fn parse_pair(value: &str) -> Result<(String, EventValue), String> {
    let (key, raw) = value
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {value:?}"))?;
    if key.is_empty() {
        return Err("empty key".to_string());
    }
    Ok((key.to_string(), parse_value(raw)))
}

fn parse_value(raw: &str) -> EventValue {
    if let Ok(b) = raw.parse::<bool>() {
        return EventValue::Bool(b);
    }
    if let Ok(i) = raw.parse::<i64>() {
        return EventValue::Integer(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        if f.is_finite() {
            return EventValue::Float(f);
        }
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return EventValue::Timestamp(ts.with_timezone(&Utc));
    }
    EventValue::Text(raw.to_string())
}
