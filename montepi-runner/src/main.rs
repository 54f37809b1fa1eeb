//! Command line runner: loads a configuration, runs one estimation and
//! streams its progress through the configured transport.

mod stats;

use clap::Parser;
use crossbeam_channel::{bounded, select};
use log::{info, warn};
use montepi_config::{load_config, CliOverrides, Config, SenderType};
use montepi_core::observer::{ControllerState, EventDispatcher, RunEvent};
use montepi_core::RunController;
use montepi_transport::TransportObserver;
use stats::BatchLatency;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a JSON or TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: CliOverrides,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // RUST_LOG overrides the default filter.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("montepi=info")).init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => {
            info!("Using configuration from {}", path.display());
            load_config(path)?
        }
        None => Config::default(),
    };
    args.overrides.apply(&mut config);
    config.validate()?;

    let simulation = config.simulation_config();
    match config.transport.sender.sender_type {
        SenderType::WebSocket => {
            let options = config.transport.sender.get_websocket_options();
            info!("Streaming frames to ws://{}:{}", options.host, options.port);
        }
        SenderType::Stdio => info!("Sending frames to standard output"),
        SenderType::File => info!("Sending frames to a file"),
        SenderType::Null => info!("Frame output disabled"),
    }

    let mut observer = TransportObserver::from_config(&config.transport)?;
    let mut dispatcher = EventDispatcher::new();
    let mut latency = BatchLatency::new()?;

    let (interrupt_tx, interrupt_rx) = bounded(1);
    ctrlc::set_handler(move || {
        let _ = interrupt_tx.try_send(());
    })?;

    let (mut controller, events) = RunController::new(simulation);
    latency.start();
    controller.start()?;

    let mut aborted = None;
    let final_state = loop {
        select! {
            recv(events) -> event => {
                let event = match event {
                    Ok(event) => event,
                    Err(_) => break controller.wait(),
                };
                let finished = match &event {
                    RunEvent::Progress { .. } => {
                        latency.record_batch();
                        None
                    }
                    RunEvent::Diagnostic(message) => {
                        aborted = Some(message.clone());
                        None
                    }
                    RunEvent::StateChanged(
                        state @ (ControllerState::Completed | ControllerState::Cancelled),
                    ) => Some(*state),
                    RunEvent::StateChanged(_) => None,
                };

                dispatcher.dispatch(event, &mut observer);
                if let Some(err) = observer.take_error() {
                    controller.cancel();
                    controller.wait();
                    return Err(err.into());
                }
                if let Some(state) = finished {
                    break state;
                }
            }
            recv(interrupt_rx) -> _ => {
                warn!("Interrupted, cancelling run");
                controller.cancel();
            }
        }
    };

    controller.wait();
    observer.flush()?;
    latency.log_summary();
    info!("Sent {} frames", observer.frames_sent());

    if let Some(message) = aborted {
        return Err(message.into());
    }
    if final_state == ControllerState::Cancelled {
        warn!("Run cancelled before all points were processed");
    }
    Ok(())
}
