use anyhow::{Context, Result};
use url::Url;

pub fn check_endpoint(endpoint: &str) -> Result<()> {
    let url = Url::parse(endpoint).with_context(|| format!("stream.endpoint is not a url: {}", endpoint))?;
    anyhow::ensure!(
        url.scheme() == "ws",
        "stream.endpoint must use ws://, got {}://",
        url.scheme()
    );
    anyhow::ensure!(url.host_str().map(|h| !h.is_empty()).unwrap_or(false), "stream.endpoint has no host");
    Ok(())
}

pub fn check_timeouts(connect_timeout_ms: u64, channel_capacity: usize) -> Result<()> {
    anyhow::ensure!(connect_timeout_ms >= 100, "stream.connect_timeout_ms too small; set >= 100");
    anyhow::ensure!(channel_capacity >= 1, "stream.channel_capacity must be >= 1");
    Ok(())
}
