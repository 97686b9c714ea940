use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader, Stdin};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::LinesStream;
use tracing::{info, warn};
use vehicle_tracker::config::{AgentConfig, PositionBackend};
use vehicle_tracker::controller::{SessionRuntime, StartError, TrackingController};
use vehicle_tracker::permission::{ConsentFile, ConsentGate};
use vehicle_tracker::position::simulated::DEFAULT_ORIGIN;
use vehicle_tracker::position::{CapabilityCheck, GpsdSource, PositionSource, SimulatedSource};
use vehicle_tracker::status::{DashboardSink, LogSink, render_dashboard};
use vehicle_tracker::transmission::{HttpChannel, HttpChannelConfig};
use vehicle_tracker::unit::UnitId;
use vehicle_tracker::unit_store::{FileUnitStore, UnitStore};

type Input = LinesStream<BufReader<Stdin>>;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let config = AgentConfig::from_env()?;

    info!(
        position = ?config.position,
        period_ms = config.timing.sample_period.as_millis() as u64,
        "Vehicle tracker starting"
    );

    let channel = HttpChannel::new(
        HttpChannelConfig::builder()
            .endpoint(config.endpoint.clone())
            .timeout(config.request_timeout)
            .build(),
    )?;
    info!(endpoint = %channel.endpoint(), "Posting locations");

    match config.position.clone() {
        PositionBackend::Gpsd { addr } => {
            let source = Arc::new(GpsdSource::new(addr));
            info!(addr = %source.addr(), "Reading fixes from gpsd");
            run(source, channel, config).await
        }
        PositionBackend::Simulated => {
            run(Arc::new(SimulatedSource::new(DEFAULT_ORIGIN)), channel, config).await
        }
    }
}

async fn run<S>(source: Arc<S>, channel: HttpChannel, config: AgentConfig) -> Result<()>
where
    S: PositionSource + CapabilityCheck,
{
    let store = FileUnitStore::new(&config.unit_file);
    let mut input: Input = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());

    let mut unit_id = match config.vehicle_id.clone() {
        Some(unit_id) => {
            store.save(&unit_id)?;
            unit_id
        }
        None => match store.load()? {
            Some(unit_id) => unit_id,
            None => prompt_unit_id(&mut input, &store).await?,
        },
    };

    let consent = config
        .consent_file
        .clone()
        .map(ConsentFile::new)
        .unwrap_or_default();

    let (controller, task) = SessionRuntime::builder()
        .gate(ConsentGate::new(Arc::clone(&source), consent))
        .source(source)
        .channel(channel)
        .sink((DashboardSink, LogSink))
        .timing(config.timing)
        .build()
        .spawn();

    if config.autostart {
        start(&controller, &unit_id).await;
    }
    println!("Commands: start, stop, reset, status, quit");

    let mut stdin_open = true;
    loop {
        tokio::select! {
            line = input.next(), if stdin_open => {
                let Some(line) = line else {
                    info!("Standard input closed, tracking continues until interrupted");
                    stdin_open = false;
                    continue;
                };

                match line.context("failed to read standard input")?.trim() {
                    "" => {}
                    "start" => start(&controller, &unit_id).await,
                    "stop" => controller.stop().await?,
                    "reset" => {
                        controller.stop().await?;
                        store.clear()?;
                        unit_id = prompt_unit_id(&mut input, &store).await?;
                        if config.autostart {
                            start(&controller, &unit_id).await;
                        }
                    }
                    "status" => println!("{}", render_dashboard(&controller.snapshot())),
                    "quit" | "exit" => break,
                    other => println!("Unknown command {other:?}"),
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    controller.shutdown().await?;
    task.await?;
    info!("Vehicle tracker stopped");

    Ok(())
}

async fn start(controller: &TrackingController, unit_id: &UnitId) {
    match controller.start(unit_id.clone()).await {
        Ok(state) => info!(
            vehicle_id = %unit_id,
            session_id = ?state.session_id.map(|id| id.to_string()),
            started_at = state.started_at.map(|t| t.as_millis()),
            connectivity = ?state.connectivity(),
            "Tracking started"
        ),
        Err(StartError::AlreadyActive(e)) => println!("{e}"),
        Err(e) => warn!(vehicle_id = %unit_id, error = %e, "Could not start tracking"),
    }
}

/// Ask the operator for a vehicle id until a non-blank one is entered, then store it.
async fn prompt_unit_id(input: &mut Input, store: &FileUnitStore) -> Result<UnitId> {
    loop {
        print!("Vehicle ID: ");
        std::io::stdout().flush()?;

        let line = input
            .next()
            .await
            .context("standard input closed before a vehicle id was entered")??;

        match UnitId::parse(&line) {
            Ok(unit_id) => {
                store.save(&unit_id)?;
                return Ok(unit_id);
            }
            Err(e) => println!("{e}"),
        }
    }
}
