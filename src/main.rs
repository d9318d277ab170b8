//! ==============================================================================
//! main.rs - farm dashboard host entry point
//! ==============================================================================
//!
//! responsibilities:
//!     - load host.toml (or defaults) and set up logging
//!     - open the status store and the peripheral link
//!     - restore the last known snapshot
//!     - poll the controller on a fixed interval
//!     - serve the web dashboard and json api
//!
//! architecture:
//!
//! ```text
//!     ┌──────────────────────────────────────────────────────────┐
//!     │                    host (this file)                       │
//!     │  ┌─────────────┐              ┌─────────────────────┐    │
//!     │  │ poll loop   │              │ web server          │    │
//!     │  │ (10s cycle) │              │ (port 3000)         │    │
//!     │  └──────┬──────┘              └──────────┬──────────┘    │
//!     │         └──────────────┬─────────────────┘               │
//!     │                  ┌─────┴─────┐                           │
//!     │                  │  monitor  │ <- monitor.rs             │
//!     │                  └─────┬─────┘                           │
//!     │          ┌─────────────┼──────────────┐                  │
//!     │       decoder        store           link                │
//!     └────────────────────────────────────────┼─────────────────┘
//!                                              │ serial / mock
//!                                       ┌──────┴──────┐
//!                                       │ controller  │
//!                                       └─────────────┘
//! ```
//!
//! ==============================================================================

use anyhow::Result;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use farm_dashboard::config::{ConfigContext, HostConfig};
use farm_dashboard::link;
use farm_dashboard::monitor::StatusMonitor;
use farm_dashboard::server::{self, AppContext};
use farm_dashboard::store;
use farm_dashboard::weather::WeatherClient;

#[tokio::main]
async fn main() -> Result<()> {
    // startup banner
    println!("===========================================================");
    println!("  Farm Dashboard Host");
    println!("  Farm A / Farm B irrigation status");
    println!("===========================================================");

    // step 1: load configuration
    let config = HostConfig::load_or_default();
    config.print_summary();

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // step 2: store, link, monitor
    let farms = ConfigContext::new(config.farms.clone());
    let status_store = store::open_store(&config.store);
    let peripheral = match link::open_link(&config.link, &farms) {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Fatal: failed to open controller link: {:#}", e);
            return Err(e);
        }
    };
    let monitor = StatusMonitor::new(peripheral, status_store, &config.farms);

    // step 3: periodic refresh
    let poll_interval = Duration::from_secs(config.polling.interval_seconds.max(1));
    println!("\n[RUNTIME] Starting status polling ({}s interval)", poll_interval.as_secs());
    println!("────────────────────────────────────────────────────────────");
    let poller = monitor.spawn_poller(poll_interval, config.logging.show_status_data);

    // step 4: web server until ctrl-c
    let ctx = AppContext {
        monitor,
        config: farms,
        weather: WeatherClient::from_env(&config.weather.api_key_env),
        city: config.weather.city.clone(),
    };

    let outcome = tokio::select! {
        res = server::run_server(&config.server.bind, ctx) => res,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
            Ok(())
        }
    };

    poller.abort();
    outcome
}
