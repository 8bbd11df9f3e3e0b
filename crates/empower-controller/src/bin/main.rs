//! EmPOWER controller entry point.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use empower_controller::{ApConfig, Controller, ControllerConfig, GroupConfig};
use empower_core::Ssid;
use empower_sdnplay::DemoMode;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "empower-controller", version, about = "LVAPP controller with SDN@Play multicast rate adaptation")]
struct Args {
    /// JSON configuration file; flags below override it
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// LVAPP listen address
    #[arg(long, value_name = "ADDR")]
    listen: Option<SocketAddr>,

    /// Engine period in milliseconds
    #[arg(long, value_name = "MS")]
    every: Option<u64>,

    /// Probability a rate needs to count as valid
    #[arg(long, value_name = "P")]
    prob_threshold: Option<f64>,

    /// DMS slots per cycle
    #[arg(long, value_name = "N")]
    dms_slots: Option<u32>,

    /// LEGACY slots per cycle
    #[arg(long, value_name = "N")]
    legacy_slots: Option<u32>,

    /// sdn@play, DMS or LEGACY
    #[arg(long, value_name = "MODE")]
    demo_mode: Option<DemoMode>,

    /// SSID installed on every block
    #[arg(long)]
    ssid: Option<String>,

    /// AP allowed to connect, as ADDR or ADDR=label (repeatable)
    #[arg(long = "ap", value_name = "AP")]
    aps: Vec<ApConfig>,

    /// Multicast group as IP or IP=RECV1,RECV2 (repeatable)
    #[arg(long = "group", value_name = "GROUP")]
    groups: Vec<GroupConfig>,
}

impl Args {
    fn into_config(self) -> anyhow::Result<ControllerConfig> {
        let mut cfg = match &self.config {
            Some(path) => ControllerConfig::from_json(path)?,
            None => ControllerConfig::default(),
        };
        if let Some(listen) = self.listen {
            cfg.listen = listen;
        }
        if let Some(every) = self.every {
            cfg.engine.every = every;
        }
        if let Some(p) = self.prob_threshold {
            cfg.engine.prob_threshold = p;
        }
        if let Some(n) = self.dms_slots {
            cfg.engine.dms_slots = n;
        }
        if let Some(n) = self.legacy_slots {
            cfg.engine.legacy_slots = n;
        }
        if let Some(mode) = self.demo_mode {
            cfg.engine.demo_mode = mode;
        }
        if let Some(ssid) = self.ssid {
            cfg.session.default_ssid = Some(Ssid::new(ssid).context("invalid --ssid")?);
        }
        cfg.aps.extend(self.aps);
        cfg.groups.extend(self.groups);
        cfg.validate()?;
        Ok(cfg)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = Args::parse().into_config()?;
    info!("EmPOWER controller {}", env!("CARGO_PKG_VERSION"));
    info!("  LVAPP:     {}", config.listen);
    info!("  Engine:    every {} ms, {}", config.engine.every, config.engine.demo_mode);
    info!("  Schedule:  {} DMS + {} LEGACY", config.engine.dms_slots, config.engine.legacy_slots);

    let (controller, handle) = Controller::new(config)?;
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            if let Err(e) = handle.shutdown().await {
                warn!(error = %e, "shutdown request failed");
            }
        }
    });

    controller.serve().await.context("controller failed")?;
    Ok(())
}
