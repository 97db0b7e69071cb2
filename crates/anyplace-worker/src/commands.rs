use std::io::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use anyplace_core::store::prune_except;
use anyplace_core::{
    CacheStorage, EventOutcome, Request, SyncReport, TimelineDocument, TimelineItem, WorkerConfig,
    WorkerEvent,
};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::Runtime;

pub async fn install(runtime: &Runtime) -> Result<()> {
    runtime
        .worker
        .dispatch(WorkerEvent::Install)
        .await
        .context("Install failed")?;
    println!(
        "Installed {} assets into {} (skip waiting: {})",
        runtime.config.manifest.len(),
        runtime.config.cache_name,
        runtime.host.skipped_waiting()
    );
    Ok(())
}

pub async fn activate(runtime: &Runtime) -> Result<()> {
    runtime.worker.dispatch(WorkerEvent::Activate).await?;
    println!("Activated (clients claimed: {})", runtime.host.claimed());
    Ok(())
}

pub async fn ready(runtime: &Runtime) -> Result<()> {
    if let EventOutcome::Ready { periodic_sync } = runtime.worker.dispatch(WorkerEvent::Ready).await? {
        println!("Periodic sync supported: {}", periodic_sync);
    }
    Ok(())
}

pub async fn fetch(runtime: &Runtime, url: &str, output: Option<&Path>) -> Result<()> {
    let request = Request::get(url)?;
    let response = match runtime.worker.dispatch(WorkerEvent::Fetch(request)).await? {
        EventOutcome::Response(Some(response)) => response,
        EventOutcome::Response(None) => bail!("{} is not cached and the network is unavailable", url),
        other => bail!("Unexpected worker outcome: {:?}", other),
    };

    let status = response.status();
    let body = response.bytes().await.context("Failed to read response body")?;
    info!(url, status, bytes = body.len(), "Fetched through worker");

    match output {
        Some(path) => {
            tokio::fs::write(path, &body)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("{} {} bytes -> {}", status, body.len(), path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&body)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

async fn run_sync(runtime: &Runtime, tag: String) -> Result<Option<SyncReport>> {
    match runtime.worker.dispatch(WorkerEvent::PeriodicSync(tag)).await? {
        EventOutcome::Synced(report) => Ok(Some(report)),
        EventOutcome::Ignored => Ok(None),
        other => bail!("Unexpected worker outcome: {:?}", other),
    }
}

fn print_report(report: &SyncReport) {
    let len = |n: Option<usize>| n.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string());
    println!(
        "cached: {}  live: {}  notified: {}",
        len(report.cached_len),
        len(report.live_len),
        report.notified
    );
}

pub async fn sync(runtime: &Runtime, tag: Option<String>) -> Result<()> {
    let tag = tag.unwrap_or_else(|| runtime.config.sync_tag.clone());
    match run_sync(runtime, tag.clone()).await? {
        Some(report) => print_report(&report),
        None => println!("Tag {} is not handled by this worker", tag),
    }
    Ok(())
}

pub async fn watch(runtime: &Runtime, interval_secs: Option<u64>) -> Result<()> {
    let period = interval_secs
        .map(Duration::from_secs)
        .unwrap_or_else(|| runtime.config.sync_interval());
    if period.is_zero() {
        bail!("Sync interval must be greater than zero");
    }

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(period_secs = period.as_secs(), "Watching for periodic sync");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // A failed run is only logged; the next tick tries again
                match run_sync(runtime, runtime.config.sync_tag.clone()).await {
                    Ok(Some(report)) => print_report(&report),
                    Ok(None) => {}
                    Err(e) => warn!(error = %e, "Periodic sync failed"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping watch");
                return Ok(());
            }
        }
    }
}

fn format_item(item: &TimelineItem) -> String {
    let TimelineItem(id, entry) = item;
    let when = entry
        .location
        .recorded_at()
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "unknown time".to_string());
    let place = entry
        .city
        .as_ref()
        .map(|c| c.title.clone())
        .unwrap_or_else(|| "somewhere".to_string());
    let mut line = format!(
        "{:>6}  {}  {:<20} ({:.4}, {:.4})",
        id.to_string(),
        when,
        place,
        entry.location.coords.latitude,
        entry.location.coords.longitude
    );
    if let Some(weather) = entry.weather.as_ref() {
        if let (Some(name), Some(temp)) = (&weather.weather_state_name, weather.the_temp) {
            line.push_str(&format!("  {} {:.0}°C", name, temp));
        }
    }
    if let Some(sms) = entry.sms.as_deref() {
        line.push_str(&format!("  \"{}\"", sms));
    }
    line
}

pub async fn timeline(runtime: &Runtime) -> Result<()> {
    let request = Request::get(&runtime.config.document_endpoint)?;
    let response = match runtime.worker.dispatch(WorkerEvent::Fetch(request)).await? {
        EventOutcome::Response(Some(response)) => response,
        EventOutcome::Response(None) => bail!("Timeline is not cached and the network is unavailable"),
        other => bail!("Unexpected worker outcome: {:?}", other),
    };
    if !response.is_ok() {
        bail!("HTTP error: {}", response.status());
    }

    let document = response
        .json::<TimelineDocument>()
        .await?
        .context("Failed to parse timeline document")?;
    for item in document.newest_first() {
        println!("{}", format_item(item));
    }
    Ok(())
}

pub async fn keys(runtime: &Runtime) -> Result<()> {
    let cache = runtime.storage.open(&runtime.config.cache_name).await?;
    let keys = cache.keys().await?;
    if keys.is_empty() {
        println!("{} is empty", runtime.config.cache_name);
        return Ok(());
    }
    for key in keys {
        if let Some(entry) = cache.get(&key).await? {
            println!(
                "{:>3}  {:>9}  {:>8}  {}",
                entry.meta.status,
                entry.body.len(),
                entry.age_display(),
                key
            );
        }
    }
    Ok(())
}

pub async fn prune(runtime: &Runtime) -> Result<()> {
    let removed = prune_except(runtime.storage.as_ref(), &runtime.config.cache_name).await?;
    if removed.is_empty() {
        println!("Nothing to prune");
    } else {
        for name in removed {
            println!("Deleted {}", name);
        }
    }
    Ok(())
}

pub fn config(runtime: &Runtime, save: bool) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&runtime.config)?);
    if save {
        runtime.config.save().context("Failed to save config")?;
        eprintln!("Saved to {}", WorkerConfig::config_path()?.display());
    }
    Ok(())
}
