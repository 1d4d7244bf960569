//! Simulate command - execute a plan against the in-memory engine.
//!
//! Useful to check ordering, token resolution and the final resource policy
//! without touching a cloud account. With `--outputs`, reported outputs are
//! saved so a later run resumes instead of starting over.

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use eyre::{Result, WrapErr};
use isthmus_topology::{
    ExecutionEvent, ExecutionReport, Executor, ResolvedTopology, SimulatedEngine,
};
use isthmus_topology_graph::{OutputSnapshot, ResolvedOutputs};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::cli::SimulateArgs;
use crate::config::IsthmusConfig;

pub async fn run(args: SimulateArgs, config: IsthmusConfig) -> Result<()> {
    let mut resolver = config.resolver;
    args.resolver.apply(&mut resolver);
    let mut executor_config = config.executor;
    args.apply(&mut executor_config);

    let topology = super::resolve(&args.topology, resolver)?;
    let outputs = match &args.outputs {
        Some(path) if path.exists() => ResolvedOutputs::from_snapshot(load_snapshot(path)?),
        _ => ResolvedOutputs::new(),
    };

    let engine = Arc::new(SimulatedEngine::new().accept_links_after(args.accept_after));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let executor = Executor::new(engine, executor_config).with_shutdown(shutdown_rx);

    let mut events = executor.events().subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ExecutionEvent::StepFailed { id, error } => warn!(step = %id, %error, "Step failed"),
                ExecutionEvent::LinkStateChanged {
                    link,
                    old_state,
                    new_state,
                } => info!(%link, %old_state, %new_state, "Link state changed"),
                event => debug!(?event, "Execution event"),
            }
        }
    });
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal, finishing in-flight steps");
            let _ = shutdown_tx.send(true);
        }
    });

    let report = executor.execute(&topology, &outputs).await;

    if let Some(path) = &args.outputs {
        save_snapshot(path, &report.outputs)?;
        info!(path = %path.display(), "Saved outputs");
    }

    print!("{}", summarize(&topology, &report));
    report.into_result().wrap_err("Simulation did not complete")?;
    Ok(())
}

fn load_snapshot(path: &Path) -> Result<OutputSnapshot> {
    let raw = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("Failed to read outputs from {}", path.display()))?;
    serde_json::from_str(&raw)
        .wrap_err_with(|| format!("Failed to parse outputs in {}", path.display()))
}

fn save_snapshot(path: &Path, snapshot: &OutputSnapshot) -> Result<()> {
    let json = serde_json::to_string_pretty(snapshot).wrap_err("Failed to encode outputs")?;
    std::fs::write(path, json)
        .wrap_err_with(|| format!("Failed to write outputs to {}", path.display()))
}

/// Bound identities, link states and the resulting resource policy.
pub fn summarize(topology: &ResolvedTopology, report: &ExecutionReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "completed {} reused {} reapplied {} failed {} skipped {} cancelled {}",
        report.completed.len(),
        report.reused.len(),
        report.reapplied.len(),
        report.failed.len(),
        report.skipped.len(),
        report.cancelled.len()
    );

    out.push_str("\nendpoints\n");
    for endpoint in topology.endpoints.endpoints() {
        let identity = endpoint
            .binding
            .id()
            .map_or_else(|| "pending".to_owned(), ToString::to_string);
        let _ = writeln!(
            out,
            "  {:<30} {:<18} {}",
            endpoint.key.to_string(),
            endpoint.dns_mode.to_string(),
            identity
        );
    }

    if !topology.ingress.is_empty() {
        out.push_str("\ningress\n");
        for rule in &topology.ingress {
            let _ = writeln!(
                out,
                "  {:<30} {} tcp/{}",
                rule.endpoint.to_string(),
                rule.source_cidr,
                rule.port
            );
        }
    }

    if !report.links.is_empty() {
        out.push_str("\nlinks\n");
        for link in &report.links {
            let _ = writeln!(out, "  {:<30} {}", link.id.to_string(), link.state);
        }
    }

    for (id, error) in &report.failed {
        let _ = writeln!(out, "\nfailed {id}: {error}");
    }

    if let Some(api) = &report.api {
        let current = api.current();
        let _ = writeln!(out, "\napi {} revision {}", current.id, current.revision);
        let _ = writeln!(out, "{}", current.policy.document());
    }
    out
}
