use anyhow::{bail, Context, Result};
use log::info;

use super::classifier::Detection;

/// Client for the external object-detection service.
///
/// The service owns the model; this side only ships PNG frames and reads
/// back label/confidence pairs. Calls carry no deadline: a stalled
/// classification delays the next sample but never blocks the clock.
#[derive(Clone)]
pub struct DetectorClient {
    http: reqwest::Client,
    endpoint: String,
}

impl DetectorClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    /// One-time readiness probe, run before the sampler is enabled. The
    /// detector loads its model lazily; this forces the load up front so the
    /// first real sample is not charged for it.
    pub async fn warm_up(&self) -> Result<()> {
        let response = self
            .http
            .get(&self.endpoint)
            .send()
            .await
            .with_context(|| format!("detector at {} is unreachable", self.endpoint))?;

        if !response.status().is_success() {
            bail!(
                "detector at {} not ready (status {})",
                self.endpoint,
                response.status()
            );
        }
        info!("Detector ready at {}", self.endpoint);
        Ok(())
    }

    /// Classify one frame. Returns the raw detection list; mapping to an
    /// engagement status happens in [`super::classifier::classify`].
    pub async fn detect(&self, png_bytes: Vec<u8>) -> Result<Vec<Detection>> {
        let response = self
            .http
            .post(format!("{}/detect", self.endpoint))
            .header(reqwest::header::CONTENT_TYPE, "image/png")
            .body(png_bytes)
            .send()
            .await
            .context("detector request failed")?;

        if !response.status().is_success() {
            bail!("detector returned status {}", response.status());
        }

        response
            .json::<Vec<Detection>>()
            .await
            .context("detector returned malformed detections")
    }
}
