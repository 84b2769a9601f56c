//! Engine traffic counters

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use sx_core::types::TrafficStats;

/// Where cumulative traffic of the running engine is read from
#[async_trait]
pub trait TrafficSource: Send + Sync {
    /// Totals since the engine process started, `None` when unavailable
    async fn sample(&self) -> Option<TrafficStats>;
}

/// Source for engines without a stats API
pub struct NoTraffic;

#[async_trait]
impl TrafficSource for NoTraffic {
    async fn sample(&self) -> Option<TrafficStats> {
        None
    }
}

/// Reads totals from the engine's Clash-compatible API
pub struct ClashApiTraffic {
    http: reqwest::Client,
    url: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Connections {
    #[serde(default)]
    upload_total: u64,
    #[serde(default)]
    download_total: u64,
}

impl ClashApiTraffic {
    /// Source for the controller listening on `address` (`host:port` or a URL)
    pub fn new(address: &str) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(1))
            .build()?;
        let base = if address.contains("://") {
            address.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", address.trim_end_matches('/'))
        };
        Ok(Self {
            http,
            url: format!("{}/connections", base),
        })
    }
}

#[async_trait]
impl TrafficSource for ClashApiTraffic {
    async fn sample(&self) -> Option<TrafficStats> {
        let response = match self.http.get(&self.url).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                tracing::debug!("Traffic API returned {}", r.status());
                return None;
            }
            Err(e) => {
                tracing::debug!("Traffic API unavailable: {}", e);
                return None;
            }
        };

        match response.json::<Connections>().await {
            Ok(c) => Some(TrafficStats {
                upload: c.upload_total,
                download: c.download_total,
            }),
            Err(e) => {
                tracing::debug!("Unexpected traffic API payload: {}", e);
                None
            }
        }
    }
}

/// Monotonic traffic totals across engine runs
///
/// The engine reports totals since its own start, so each restart begins at
/// zero again. Totals of finished runs are sealed and the current run's
/// highest sample is added on top. Nothing changes while the engine is not
/// running.
#[derive(Debug, Default)]
pub struct TrafficCounters {
    sealed: TrafficStats,
    run_id: Option<u64>,
    peak: TrafficStats,
}

impl TrafficCounters {
    /// Fold in one observation and return the totals
    ///
    /// Observations of a run older than the current one are ignored; that
    /// run was already sealed.
    pub fn observe(&mut self, run_id: u64, running: bool, sample: Option<TrafficStats>) -> TrafficStats {
        match self.run_id {
            Some(current) if run_id < current => return self.total(),
            Some(current) if run_id == current => {}
            _ => {
                self.seal();
                self.run_id = Some(run_id);
            }
        }

        if running {
            if let Some(sample) = sample {
                self.peak.upload = self.peak.upload.max(sample.upload);
                self.peak.download = self.peak.download.max(sample.download);
            }
        }

        self.total()
    }

    /// Current totals without a new sample
    pub fn total(&self) -> TrafficStats {
        TrafficStats {
            upload: self.sealed.upload.saturating_add(self.peak.upload),
            download: self.sealed.download.saturating_add(self.peak.download),
        }
    }

    fn seal(&mut self) {
        self.sealed = self.total();
        self.peak = TrafficStats::default();
    }
}
