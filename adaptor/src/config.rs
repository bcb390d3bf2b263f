//! Command line and environment settings.

use chrono::{DateTime, Duration, Utc};
use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "farm-adaptor", version, about = "Copy upstream sensor readings into farm-api samples")]
pub struct Args {
    /// Base URL of farm-api.
    #[arg(long, env = "FARM_API_URL", default_value = "http://localhost:8000")]
    pub api_url: String,

    #[arg(long, env = "FARM_USERNAME")]
    pub username: String,

    #[arg(long, env = "FARM_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Base URL of the upstream time-series API.
    #[arg(long, env = "UPSTREAM_URL")]
    pub upstream_url: String,

    #[arg(long, env = "UPSTREAM_API_KEY", hide_env_values = true)]
    pub upstream_api_key: String,

    /// Only devices from this vendor are polled.
    #[arg(long, env = "VENDOR")]
    pub vendor: String,

    /// Tag written to `meta.source` on every sample.
    #[arg(long, env = "SOURCE", default_value = "farm-adaptor")]
    pub source: String,

    /// Window start (RFC 3339). Defaults to 24 hours before `--to`.
    #[arg(long)]
    pub from: Option<DateTime<Utc>>,

    /// Window end (RFC 3339). Defaults to now.
    #[arg(long)]
    pub to: Option<DateTime<Utc>>,

    #[arg(long, env = "CONCURRENCY", default_value_t = 8)]
    pub concurrency: usize,

    #[arg(long, env = "MAX_RETRIES", default_value_t = 3)]
    pub max_retries: u32,

    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,
}

impl Args {
    /// The polling window, resolving defaults against `now`.
    pub fn window(&self, now: DateTime<Utc>) -> anyhow::Result<(DateTime<Utc>, DateTime<Utc>)> {
        let to = self.to.unwrap_or(now);
        let from = self.from.unwrap_or(to - Duration::hours(24));
        anyhow::ensure!(from <= to, "--from {} is after --to {}", from, to);
        Ok((from, to))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec![
            "farm-adaptor",
            "--username",
            "feeder",
            "--password",
            "pw",
            "--upstream-url",
            "http://upstream",
            "--upstream-api-key",
            "key",
            "--vendor",
            "Acme",
        ];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults() {
        let args = parse(&[]);
        assert_eq!(args.concurrency, 8);
        assert_eq!(args.max_retries, 3);
        assert_eq!(args.source, "farm-adaptor");
    }

    #[test]
    fn window_defaults_to_last_day() {
        let now = Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap();
        let (from, to) = parse(&[]).window(now).unwrap();
        assert_eq!(to, now);
        assert_eq!(from, Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn inverted_window_is_rejected() {
        let args = parse(&["--from", "2024-05-02T00:00:00Z", "--to", "2024-05-01T00:00:00Z"]);
        assert!(args.window(Utc::now()).is_err());
    }
}
