//! Fan out over (device, sensor) pairs, fetch readings upstream and forward them as samples.

use crate::error::CallError;
use crate::retry::{with_retry, RetryPolicy};
use crate::sink::{DeviceRef, FarmClient, Forwarded, SensorRef};
use crate::upstream::{Reading, UpstreamClient};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// What to ingest and how hard to push.
#[derive(Clone, Debug)]
pub struct IngestOptions {
    pub vendor: String,
    pub source: String,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub concurrency: usize,
    pub retry: RetryPolicy,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ItemFailure {
    /// `<tag>/<measurement>` or `<tag>/<measurement>/<timestamp>`.
    pub item: String,
    pub error: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct IngestReport {
    pub devices: usize,
    pub sensors: usize,
    pub fetched: usize,
    pub forwarded: usize,
    pub duplicates: usize,
    pub failures: Vec<ItemFailure>,
}

impl IngestReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    fn absorb(&mut self, other: IngestReport) {
        self.fetched += other.fetched;
        self.forwarded += other.forwarded;
        self.duplicates += other.duplicates;
        self.failures.extend(other.failures);
    }

    fn fail(&mut self, item: String, error: impl ToString) {
        self.failures.push(ItemFailure {
            item,
            error: error.to_string(),
        });
    }
}

/// `sourceId` identifying one upstream reading.
pub fn source_id(tag: &str, measurement: &str, timestamp: &str) -> String {
    format!("{}/{}/{}", tag, measurement, timestamp)
}

pub fn to_sample(device: &DeviceRef, sensor: &SensorRef, reading: &Reading, source: &str) -> Value {
    json!({
        "device": device.id,
        "sensor": sensor.id,
        "timestamp": reading.timestamp,
        "value": reading.value,
        "predicted": reading.predicted,
        "meta": {
            "source": source,
            "sourceId": source_id(&device.tag, &sensor.measurement, &reading.timestamp),
        }
    })
}

async fn ingest_pair(
    upstream: &UpstreamClient,
    farm: &FarmClient,
    opts: &IngestOptions,
    device: &DeviceRef,
    sensor: &SensorRef,
) -> IngestReport {
    let mut report = IngestReport::default();
    let pair = format!("{}/{}", device.tag, sensor.measurement);
    let readings = match with_retry(&opts.retry, "fetch readings", || {
        upstream.fetch(&device.tag, &sensor.measurement, opts.from, opts.to)
    })
    .await
    {
        Ok(r) => r,
        Err(e) => {
            tracing::error!(item = %pair, error = %e, "upstream fetch failed");
            report.fail(pair, e);
            return report;
        }
    };
    report.fetched = readings.len();
    for reading in &readings {
        let sample = to_sample(device, sensor, reading, &opts.source);
        match with_retry(&opts.retry, "forward sample", || farm.post_sample(&sample)).await {
            Ok(Forwarded::Created) => report.forwarded += 1,
            Ok(Forwarded::Duplicate) => report.duplicates += 1,
            Err(e) => {
                let item = source_id(&device.tag, &sensor.measurement, &reading.timestamp);
                tracing::warn!(item = %item, error = %e, "sample not forwarded");
                report.fail(item, e);
            }
        }
    }
    tracing::debug!(item = %pair, fetched = report.fetched, forwarded = report.forwarded, "pair done");
    report
}

/// Ingest every sensor of every device of the vendor. Listing failures abort; per-item failures are reported.
pub async fn run(upstream: UpstreamClient, farm: FarmClient, opts: IngestOptions) -> Result<IngestReport, CallError> {
    let devices = with_retry(&opts.retry, "list devices", || farm.devices(&opts.vendor)).await?;
    let mut report = IngestReport {
        devices: devices.len(),
        ..Default::default()
    };
    let mut pairs = Vec::new();
    for device in devices {
        match with_retry(&opts.retry, "list sensors", || farm.sensors(&device.id)).await {
            Ok(sensors) => {
                report.sensors += sensors.len();
                pairs.extend(sensors.into_iter().map(|s| (device.clone(), s)));
            }
            Err(e) => report.fail(device.tag.clone(), e),
        }
    }
    tracing::info!(devices = report.devices, sensors = report.sensors, "starting ingest");

    let permits = Arc::new(Semaphore::new(opts.concurrency.max(1)));
    let upstream = Arc::new(upstream);
    let farm = Arc::new(farm);
    let opts = Arc::new(opts);
    let mut tasks = JoinSet::new();
    for (device, sensor) in pairs {
        let permits = permits.clone();
        let upstream = upstream.clone();
        let farm = farm.clone();
        let opts = opts.clone();
        tasks.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return IngestReport::default();
            };
            ingest_pair(&upstream, &farm, &opts, &device, &sensor).await
        });
    }
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(r) => report.absorb(r),
            Err(e) => report.fail("task".into(), e),
        }
    }
    Ok(report)
}
