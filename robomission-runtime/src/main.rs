// Copyright (C) 2024 Laixer Equipment B.V.
// All rights reserved.
//
// This software may be modified and distributed under the terms
// of the included license.  See the LICENSE file for details.

use std::path::PathBuf;

use clap::{Parser, ValueHint};
use robomission::{
    event::EventLatch,
    mission::{course, LogAnnouncer, Mission, Orchestrator},
    protocol::Channel,
    Configurable, MissionConfig,
};

#[derive(Parser)]
#[command(author = "Copyright (C) 2024 Laixer Equipment B.V.")]
#[command(version, propagate_version = true)]
#[command(about = "Robomission mission runner", long_about = None)]
struct Args {
    /// Bridge network address.
    #[arg(short = 'c', long = "connect")]
    address: Option<String>,
    /// Mission file, the built-in course is run if absent.
    #[arg(short, long, value_name = "FILE", value_hint = ValueHint::FilePath)]
    mission: Option<PathBuf>,
    /// Device the bridge forwards instructions to.
    #[arg(long)]
    target: Option<String>,
    /// Validate the mission and exit.
    #[arg(short, long)]
    test: bool,
    /// Quiet output.
    #[arg(long)]
    quiet: bool,
    /// Daemonize the service.
    #[arg(short = 'D', long)]
    daemon: bool,
    /// Level of verbosity.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let bin_name = env!("CARGO_BIN_NAME");

    let mut config: MissionConfig = match &args.mission {
        Some(path) => robomission::from_file(path)?,
        None => MissionConfig::default(),
    };

    config.global.bin_name = bin_name.to_string();
    config.global.daemon = args.daemon;

    if let Some(address) = args.address {
        config.bridge.address = address;
    }
    if let Some(target) = args.target {
        config.bridge.target = target;
    }

    let mut log_config = simplelog::ConfigBuilder::new();
    if args.daemon {
        log_config.set_time_level(log::LevelFilter::Off);
        log_config.set_thread_level(log::LevelFilter::Off);
    } else {
        log_config.set_time_offset_to_local().ok();
        log_config.set_time_format_rfc2822();
    }

    log_config.set_target_level(log::LevelFilter::Off);
    log_config.set_location_level(log::LevelFilter::Off);
    log_config.add_filter_ignore_str("mio");

    let log_level = if args.daemon {
        log::LevelFilter::Info
    } else if args.quiet {
        log::LevelFilter::Off
    } else {
        match args.verbose {
            0 => log::LevelFilter::Info,
            1 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    };

    let color_choice = if args.daemon {
        simplelog::ColorChoice::Never
    } else {
        simplelog::ColorChoice::Auto
    };

    simplelog::TermLogger::init(
        log_level,
        log_config.build(),
        simplelog::TerminalMode::Mixed,
        color_choice,
    )?;

    if args.daemon {
        log::debug!("Running service as daemon");
    }

    log::trace!("{:#?}", config);

    let mission = if config.stages.is_empty() {
        log::debug!("No mission stages configured, using the competition course");
        course::competition()
    } else {
        Mission::try_from(&config)?
    };

    let sensors = config.sensors.sensor_set();

    log::debug!("Controller sensors: {}", sensors);

    if let Err(e) = mission.validate(&sensors) {
        log::error!("Mission '{}' invalid in stage '{}'", mission.name, e.stage());
        return Err(e.into());
    }

    if args.test {
        println!(
            "Mission '{}' with {} stages is valid",
            mission.name,
            mission.stages.len()
        );
        return Ok(());
    }

    run(&config, &mission, sensors).await
}

async fn run(
    config: &MissionConfig,
    mission: &Mission,
    sensors: robomission::core::SensorSet,
) -> anyhow::Result<()> {
    let mut address = config.bridge.address.clone();

    if !address.contains(':') {
        address.push(':');
        address.push_str(&robomission::consts::DEFAULT_BRIDGE_PORT.to_string());
    }

    log::info!("{}", config);
    log::debug!("Waiting for connection to {}", address);

    let latch = EventLatch::new();
    let channel =
        Channel::connect(address.as_str(), &config.bridge.target, latch.clone()).await?;

    log::info!("Connected to {}", address);

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for interrupt: {}", e);
            return;
        }

        log::info!("Interrupted, aborting mission");
        latch.abort();
    });

    let mut orchestrator = Orchestrator::new(channel, sensors, LogAnnouncer);

    let report = match orchestrator.run(mission).await {
        Ok(report) => report,
        Err(e) => {
            log::error!(
                "{} stopped in stage '{}' ({})",
                config.global().bin_name,
                e.stage(),
                orchestrator.state()
            );
            return Err(e.into());
        }
    };

    if report.is_degraded() {
        log::warn!("{}", report);
    } else {
        log::info!("{}", report);
    }

    log::debug!("{} was shutdown gracefully", config.global().bin_name);

    Ok(())
}
