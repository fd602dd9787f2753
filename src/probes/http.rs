// src/probes/http.rs
use crate::health::{Probe, ProbeOutcome};
use async_trait::async_trait;
use reqwest::Client;
use tokio::time::{timeout, Duration, Instant};
use url::Url;

/// Probes an upstream by issuing a GET and inspecting the response code.
pub struct HttpProbe {
    client: Client,
    url: Url,
    timeout: Duration,
    warn_latency: Option<Duration>,
}

impl HttpProbe {
    pub fn new(url: Url, request_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(request_timeout).build()?;

        Ok(Self {
            client,
            url,
            timeout: request_timeout,
            warn_latency: None,
        })
    }

    /// Report `Warn` when a successful response takes at least this long.
    pub fn with_warn_latency(mut self, threshold: Duration) -> Self {
        self.warn_latency = Some(threshold);
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn probe(&self) -> ProbeOutcome {
        let start = Instant::now();
        let result = timeout(self.timeout, self.client.get(self.url.as_str()).send()).await;
        let elapsed = start.elapsed();

        match result {
            Ok(Ok(response)) => {
                let status = response.status();
                if !status.is_success() {
                    return ProbeOutcome::fail(format!("HTTP {}", status));
                }

                match self.warn_latency {
                    Some(threshold) if elapsed >= threshold => ProbeOutcome::warn(format!(
                        "slow response: {}ms (threshold {}ms)",
                        elapsed.as_millis(),
                        threshold.as_millis()
                    )),
                    _ => ProbeOutcome::pass(),
                }
            }
            Ok(Err(e)) => ProbeOutcome::fail(e.to_string()),
            Err(_) => ProbeOutcome::fail("Request timeout"),
        }
    }
}
