use anyhow::{bail, Context, Result};
use log::info;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::camera::FrameSource;
use super::classifier::DetectionStatus;
use super::detector::DetectorClient;
use super::loop_worker::sampling_loop;

/// Owns the sampling task and the channels it publishes on.
///
/// The status channel starts at `Loading` and only ever moves forward from
/// classifications; the camera-error channel carries the persistent capture
/// fault flag surfaced to the status line.
pub struct SensingController {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
    status_tx: watch::Sender<DetectionStatus>,
    status_rx: watch::Receiver<DetectionStatus>,
    camera_error_tx: watch::Sender<Option<String>>,
    camera_error_rx: watch::Receiver<Option<String>>,
}

impl SensingController {
    pub fn new() -> Self {
        let (status_tx, status_rx) = watch::channel(DetectionStatus::Loading);
        let (camera_error_tx, camera_error_rx) = watch::channel(None);
        Self {
            handle: None,
            cancel_token: None,
            status_tx,
            status_rx,
            camera_error_tx,
            camera_error_rx,
        }
    }

    pub fn status_rx(&self) -> watch::Receiver<DetectionStatus> {
        self.status_rx.clone()
    }

    pub fn camera_error_rx(&self) -> watch::Receiver<Option<String>> {
        self.camera_error_rx.clone()
    }

    pub fn start_sampling(
        &mut self,
        source: Box<dyn FrameSource>,
        detector: DetectorClient,
    ) -> Result<()> {
        if self.handle.is_some() {
            bail!("sampling already active");
        }

        let cancel_token = CancellationToken::new();
        let token_clone = cancel_token.clone();

        let handle = tokio::spawn(sampling_loop(
            source,
            detector,
            self.status_tx.clone(),
            self.camera_error_tx.clone(),
            token_clone,
        ));

        info!("Activity sampler enabled");
        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    pub async fn stop_sampling(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("sampling loop task failed to join")
                .map(|_| ())
        } else {
            Ok(())
        }
    }
}

impl Default for SensingController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn status_starts_at_loading() {
        let controller = SensingController::new();
        assert_eq!(*controller.status_rx().borrow(), DetectionStatus::Loading);
        assert!(controller.camera_error_rx().borrow().is_none());
    }

    #[tokio::test]
    async fn stop_without_start_is_a_no_op() {
        let mut controller = SensingController::new();
        controller.stop_sampling().await.unwrap();
    }
}
