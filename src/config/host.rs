//! Host identity resolution
//!
//! Instance id and region may be left empty in the configuration record. They
//! are filled in once, before any orchestrator runs, by walking an explicit
//! fallback chain that ends in a named default.

use std::time::Duration;

use tracing::debug;

use super::settings::BackupConfig;

/// Instance id used when the host is not an EC2 instance
pub const DEFAULT_INSTANCE_ID: &str = "local-dev";

/// Region used when nothing else resolves
pub const DEFAULT_REGION: &str = "us-west-2";

const IMDS_BASE: &str = "http://169.254.169.254/latest";
const IMDS_TIMEOUT: Duration = Duration::from_secs(1);

/// Source of instance metadata
pub trait HostMetadata {
    fn instance_id(&self) -> Option<String>;
    fn availability_zone(&self) -> Option<String>;
}

/// EC2 instance metadata service (IMDSv2)
pub struct Ec2Metadata {
    client: Option<reqwest::blocking::Client>,
}

impl Ec2Metadata {
    pub fn new() -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(IMDS_TIMEOUT)
            .build()
            .ok();
        Self { client }
    }

    fn fetch(&self, item: &str) -> Option<String> {
        let client = self.client.as_ref()?;
        let token = client
            .put(format!("{}/api/token", IMDS_BASE))
            .header("X-aws-ec2-metadata-token-ttl-seconds", "60")
            .send()
            .ok()?
            .error_for_status()
            .ok()?
            .text()
            .ok()?;

        let value = client
            .get(format!("{}/meta-data/{}", IMDS_BASE, item))
            .header("X-aws-ec2-metadata-token", token)
            .send()
            .ok()?
            .error_for_status()
            .ok()?
            .text()
            .ok()?;

        let value = value.trim().to_string();
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    }
}

impl Default for Ec2Metadata {
    fn default() -> Self {
        Self::new()
    }
}

impl HostMetadata for Ec2Metadata {
    fn instance_id(&self) -> Option<String> {
        self.fetch("instance-id")
    }

    fn availability_zone(&self) -> Option<String> {
        self.fetch("placement/availability-zone")
    }
}

/// Instance id: configured → instance metadata → `local-dev`
pub fn resolve_instance_id(configured: &str, host: &dyn HostMetadata) -> String {
    non_empty(configured)
        .or_else(|| host.instance_id())
        .unwrap_or_else(|| DEFAULT_INSTANCE_ID.to_string())
}

/// Region: configured → `AWS_REGION` → `AWS_DEFAULT_REGION` → availability zone → `us-west-2`
pub fn resolve_region<E>(configured: &str, env: E, host: &dyn HostMetadata) -> String
where
    E: Fn(&str) -> Option<String>,
{
    non_empty(configured)
        .or_else(|| env("AWS_REGION").and_then(|v| non_empty(&v)))
        .or_else(|| env("AWS_DEFAULT_REGION").and_then(|v| non_empty(&v)))
        .or_else(|| host.availability_zone().and_then(|az| region_from_zone(&az)))
        .unwrap_or_else(|| DEFAULT_REGION.to_string())
}

/// Fill in instance id and region on a freshly loaded configuration
pub fn resolve_host_identity(config: &mut BackupConfig, host: &dyn HostMetadata) {
    config.instance_id = resolve_instance_id(&config.instance_id, host);
    config.region = resolve_region(&config.region, |k| std::env::var(k).ok(), host);
    debug!(instance_id = %config.instance_id, region = %config.region, "resolved host identity");
}

/// `us-west-2a` → `us-west-2`
fn region_from_zone(zone: &str) -> Option<String> {
    let zone = zone.trim();
    let last = zone.chars().last()?;
    if !last.is_ascii_alphabetic() || zone.len() < 2 {
        return None;
    }
    Some(zone[..zone.len() - 1].to_string())
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
