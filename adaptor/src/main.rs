use anyhow::Context;
use clap::Parser;
use farm_adaptor::pipeline::{run, IngestOptions};
use farm_adaptor::{Args, FarmClient, RetryPolicy, UpstreamClient};
use std::process::ExitCode;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("farm_adaptor=info")),
        )
        .init();

    let args = Args::parse();
    let (from, to) = args.window(chrono::Utc::now())?;
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(args.request_timeout_secs))
        .build()
        .context("building HTTP client")?;

    let farm = FarmClient::new(http.clone(), &args.api_url);
    farm.login(&args.username, &args.password)
        .await
        .context("logging in to farm-api")?;
    let upstream = UpstreamClient::new(http, &args.upstream_url, &args.upstream_api_key);

    let opts = IngestOptions {
        vendor: args.vendor.clone(),
        source: args.source.clone(),
        from,
        to,
        concurrency: args.concurrency,
        retry: RetryPolicy::new(args.max_retries),
    };
    let report = run(upstream, farm, opts).await.context("listing devices and sensors")?;

    tracing::info!(
        devices = report.devices,
        sensors = report.sensors,
        fetched = report.fetched,
        forwarded = report.forwarded,
        duplicates = report.duplicates,
        failures = report.failures.len(),
        "ingest finished"
    );
    for f in &report.failures {
        tracing::error!(item = %f.item, error = %f.error, "item failed");
    }
    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
