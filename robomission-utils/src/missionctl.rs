// Copyright (C) 2024 Laixer Equipment B.V.
// All rights reserved.
//
// This software may be modified and distributed under the terms
// of the included license.  See the LICENSE file for details.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use clap::{Parser, ValueHint};
use robomission::{
    core::{Program, ProgramBuilder, SensorSet},
    event::{EventLatch, WaitError},
    protocol::{parse_listing, Channel},
};
use tokio::net::TcpStream;

#[derive(Parser)]
#[command(author = "Copyright (C) 2024 Laixer Equipment B.V.")]
#[command(version, propagate_version = true)]
#[command(about = "Robomission controller utility", long_about = None)]
struct Args {
    /// Bridge network address.
    #[arg(short = 'c', long = "connect", default_value = "127.0.0.1")]
    address: String,
    /// Device the bridge forwards instructions to.
    #[arg(long, default_value = robomission::consts::DEFAULT_TARGET)]
    target: String,
    /// Additional sensor published by the controller.
    #[arg(long = "sensor")]
    sensors: Vec<String>,
    /// Level of verbosity.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    /// Commands.
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Validate a program file and print its canonical form.
    Check {
        /// Program file.
        #[arg(value_hint = ValueHint::FilePath)]
        file: PathBuf,
    },
    /// Upload and start a program file.
    Run {
        /// Program file.
        #[arg(value_hint = ValueHint::FilePath)]
        file: PathBuf,
        /// Wait for this event after start.
        #[arg(short, long)]
        event: Option<u8>,
        /// Wait timeout in seconds.
        #[arg(short, long, requires = "event")]
        timeout: Option<f64>,
    },
    /// Controller message commands.
    Mute {
        /// On or off.
        toggle: String,
    },
    /// Halt the controller.
    Stop,
    /// Watch for controller events.
    Watch,
}

fn string_to_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "on" => Some(true),
        "true" => Some(true),
        "off" => Some(false),
        "false" => Some(false),
        _ => None,
    }
}

/// Read and validate a program file.
fn load_program(path: &Path, sensors: &SensorSet) -> anyhow::Result<Program> {
    let text = std::fs::read_to_string(path)?;

    let segments = parse_listing(&text)
        .map_err(|e| anyhow::anyhow!("{}: {}", path.display(), e))?;

    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| "program".to_string());

    let mut builder = ProgramBuilder::new(name, sensors);
    builder.extend(segments)?;

    Ok(builder.finalize()?)
}

async fn connect(
    address: &str,
    target: &str,
    latch: &EventLatch,
) -> anyhow::Result<Channel<TcpStream>> {
    let mut address = address.to_string();

    if !address.contains(':') {
        address.push(':');
        address.push_str(&robomission::consts::DEFAULT_BRIDGE_PORT.to_string());
    }

    log::debug!("Waiting for connection to {}", address);

    let channel = Channel::connect(address.as_str(), target, latch.clone()).await?;

    println!("Connected to {}", address);

    Ok(channel)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use log::LevelFilter;

    let args = Args::parse();

    let mut log_config = simplelog::ConfigBuilder::new();
    log_config.set_time_level(log::LevelFilter::Off);
    log_config.set_thread_level(log::LevelFilter::Off);
    log_config.set_target_level(log::LevelFilter::Off);
    log_config.set_location_level(log::LevelFilter::Off);
    log_config.add_filter_ignore_str("mio");

    let log_level = match args.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    simplelog::TermLogger::init(
        log_level,
        log_config.build(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let mut sensors = SensorSet::regbot();
    sensors.extend(&args.sensors);

    let latch = EventLatch::new();

    match args.command {
        Command::Check { file } => {
            let program = load_program(&file, &sensors)?;

            println!("{}", program);
            for segment in program.segments() {
                println!("{} madd {}", args.target, segment);
            }
        }
        Command::Run {
            file,
            event,
            timeout,
        } => {
            let program = load_program(&file, &sensors)?;

            let mut channel = connect(&args.address, &args.target, &latch).await?;

            channel.clear().await?;
            channel.upload(program).await?;
            latch.clear();
            channel.start().await?;

            println!("Program started");

            if let Some(event) = event {
                let timeout = timeout.map(Duration::try_from_secs_f64).transpose()?;

                log::info!("Waiting for event {}", event);

                latch.wait_for(event, timeout).await?;

                println!("Event {} received", event);
            }
        }
        Command::Mute { toggle } => {
            let mute = string_to_bool(&toggle)
                .ok_or_else(|| anyhow::anyhow!("Invalid toggle: {}", toggle))?;

            log::info!("Turn controller messages {}", if mute { "off" } else { "on" });

            connect(&args.address, &args.target, &latch)
                .await?
                .mute(mute)
                .await?;
        }
        Command::Stop => {
            log::info!("Stop controller");

            connect(&args.address, &args.target, &latch)
                .await?
                .stop()
                .await?;
        }
        Command::Watch => {
            let _channel = connect(&args.address, &args.target, &latch).await?;

            let watch_latch = latch.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    watch_latch.abort();
                }
            });

            loop {
                match latch.wait_any(None).await {
                    Ok(index) => println!("event {}", index),
                    Err(WaitError::Cancelled) => break,
                    Err(WaitError::Disconnected) => {
                        println!("Controller disconnected");
                        break;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
    }

    Ok(())
}
