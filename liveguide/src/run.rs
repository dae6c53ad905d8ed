use std::sync::Arc;

use anyhow::Context as _;
use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;

use actlet::prelude::*;
use liveguide_core::config::Config;
use liveguide_core::dispatcher;
use liveguide_core::dispatcher::RefreshView;
use liveguide_core::engine::HttpEngine;
use liveguide_core::poll;
use liveguide_core::poll::QueryLiveStatus;
use liveguide_core::poll::QueryPollState;
use liveguide_core::push;
use liveguide_core::push::QueryConnectionState;
use liveguide_core::scheduler::QuerySchedulerState;
use liveguide_core::store::LiveStatusUpdated;
use liveguide_core::visibility::QueryVisibility;
use liveguide_core::visibility::Visibility;

use crate::command::Command;

pub async fn main(config: Arc<Config>) -> anyhow::Result<()> {
    let system = System::new();

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let engine = HttpEngine::spawn_http(&system, &config)
        .await
        .context("Failed to spawn the engine")?;

    let reporter = system.spawn_actor(Reporter).await;
    engine
        .poll_worker
        .call(poll::RegisterEmitter::LiveStatusUpdated(reporter.emitter()))
        .await?;
    engine
        .dispatcher
        .call(dispatcher::RegisterEmitter::RefreshView(reporter.emitter()))
        .await?;

    engine.push_listener.call(push::Connect).await?;
    engine.set_visibility(Visibility::Foreground).await?;

    tokio::select! {
        result = read_commands(&engine) => {
            match result {
                Ok(_) => tracing::info!("Quit"),
                Err(err) => tracing::error!(%err),
            }
        }
        _ = sigint.recv() => {
            tracing::info!("SIGINT received");
        }
        _ = sigterm.recv() => {
            tracing::info!("SIGTERM received");
        }
    }

    tracing::info!("Stopping...");
    if let Err(err) = engine.disconnect().await {
        tracing::warn!(%err, "Failed to disconnect");
    }
    system.stop();
    Ok(())
}

// Returns when `quit` is read.
async fn read_commands(engine: &HttpEngine) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match Command::parse(&line) {
            Some(Command::Show) => engine.set_visibility(Visibility::Foreground).await?,
            Some(Command::Hide) => engine.set_visibility(Visibility::Background).await?,
            Some(Command::Status) => print_status(engine).await?,
            Some(Command::Get(schedule_id)) => {
                let entry = engine
                    .poll_worker
                    .call(QueryLiveStatus { schedule_id })
                    .await?;
                match entry {
                    Some(entry) => println!("{}", serde_json::to_string(&entry)?),
                    None => println!("unknown"),
                }
            }
            Some(Command::Quit) => return Ok(()),
            None => tracing::warn!(%line, "Unknown command"),
        }
    }
    // Keep running without stdin until a signal is received.
    tracing::debug!("stdin closed");
    std::future::pending().await
}

async fn print_status(engine: &HttpEngine) -> anyhow::Result<()> {
    let visibility = engine.visibility_gate.call(QueryVisibility).await?;
    let scheduler = engine.scheduler.call(QuerySchedulerState).await?;
    let poll = engine.poll_worker.call(QueryPollState).await?;
    let connection = engine.push_listener.call(QueryConnectionState).await?;

    let visibility = visibility.map_or("-".to_string(), |v| v.to_string());
    let interval = scheduler
        .interval
        .map_or("-".to_string(), |d| humantime::format_duration(d).to_string());
    let connection = connection.map_or("-".to_string(), |s| s.to_string());
    println!("visibility: {visibility}");
    println!("scheduler: started={} interval={interval}", scheduler.started);
    println!(
        "poll: entries={} in-flight={} trailing={} suspended={}",
        poll.entries, poll.in_flight, poll.trailing, poll.suspended
    );
    println!("push: {connection}");
    Ok(())
}

// reporter

struct Reporter;

#[async_trait]
impl Actor for Reporter {}

#[async_trait]
impl Handler<LiveStatusUpdated> for Reporter {
    async fn handle(&mut self, msg: LiveStatusUpdated, _ctx: &mut Context<Self>) {
        let live = msg.snapshot.values().filter(|entry| entry.is_live).count();
        tracing::info!(entries = msg.snapshot.len(), live, "Live statuses updated");
    }
}

#[async_trait]
impl Handler<RefreshView> for Reporter {
    async fn handle(&mut self, _msg: RefreshView, _ctx: &mut Context<Self>) {
        tracing::info!("Refresh view");
    }
}
