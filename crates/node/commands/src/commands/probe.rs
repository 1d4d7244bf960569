//! Probe command - call an API the way a consumer-side function would.

use std::time::Duration;

use eyre::{Result, WrapErr};
use isthmus_net_probe::Prober;
use tracing::{info, warn};

use crate::cli::ProbeArgs;

pub async fn run(args: ProbeArgs) -> Result<()> {
    let target = args.target().wrap_err("Invalid probe target")?;
    info!(url = %target.api_url, endpoint = ?target.endpoint_id, "Probing API");

    let response = Prober::with_timeout(Duration::from_secs(args.timeout))?
        .run(&target)
        .await
        .wrap_err_with(|| format!("Probe of {} failed", target.api_url))?;

    if !response.is_success() {
        warn!(status = response.status, "API answered with an error status");
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&response).wrap_err("Failed to encode probe response")?
    );
    Ok(())
}
