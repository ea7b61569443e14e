use br24_server::config::Config;
use br24_server::network::find_nic_addr;
use br24_server::{Cli, Session};
use clap::Parser;
use env_logger::Env;
use log::{info, warn};
use miette::{IntoDiagnostic, Result};
use std::time::Duration;
use tokio_graceful_shutdown::Toplevel;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let log_level = args.verbose.log_level_filter();
    env_logger::Builder::from_env(Env::default())
        .filter_level(log_level)
        .init();

    info!("BR24 receiver {} loglevel {}", br24_server::VERSION, log_level);

    let mut config = Config::load_or_default(args.config.as_deref()).into_diagnostic()?;
    args.apply(&mut config);
    let nic_addr = find_nic_addr(config.interface.as_deref()).into_diagnostic()?;

    if let Some(generation) = config.generation {
        info!("Radar generation fixed to {}", generation);
    }
    if config.keep_alive {
        warn!("Keep-alive mode activated, stay-alive commands are sent to the radar");
    }
    for (i, zone) in config.guard_zones.iter().enumerate() {
        info!(
            "Guard zone {}: {:?} {}..{} dm, {} bins",
            i + 1,
            zone.kind,
            zone.inner_range,
            zone.outer_range,
            zone.required_bins()
        );
    }

    Toplevel::new(move |s| async move {
        let session = Session::new(config, nic_addr);
        session.start(&s);
    })
    .catch_signals()
    .handle_shutdown_requests(Duration::from_millis(5000))
    .await
    .map_err(Into::into)
}
