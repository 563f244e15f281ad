use anyhow::{anyhow, Context, Result};
use tokio::sync::watch;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::camera::FrameSource;
use super::classifier::{classify, DetectionStatus};
use super::detector::DetectorClient;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

const SAMPLE_INTERVAL_SECS: u64 = 5;
const CAPTURE_TIMEOUT_SECS: u64 = 10;

/// Periodic capture-and-classify loop.
///
/// The first tokio interval tick fires immediately, so a sample runs as soon
/// as the sampler is enabled, then every `SAMPLE_INTERVAL_SECS`. Each cycle
/// awaits its classification before the next can start, so requests never
/// overlap; the clock keeps ticking against the last published status.
///
/// Error behavior per cycle: a capture failure publishes a persistent camera
/// error and leaves the status untouched (so it stays `Loading` until the
/// camera works); a classification failure is logged and the previous status
/// is retained.
pub async fn sampling_loop(
    mut source: Box<dyn FrameSource>,
    detector: DetectorClient,
    status_tx: watch::Sender<DetectionStatus>,
    camera_error_tx: watch::Sender<Option<String>>,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(SAMPLE_INTERVAL_SECS));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match perform_sample(&mut source, &detector, &camera_error_tx).await {
                    Ok(Some(status)) => {
                        if *status_tx.borrow() != status {
                            log_info!("detection status -> {}", status.as_str());
                        }
                        let _ = status_tx.send(status);
                    }
                    Ok(None) => {}
                    Err(err) => log_error!("sample cycle failed: {err:?}"),
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("sampling loop shutting down");
                break;
            }
        }
    }
    // Dropping the source here releases the capture resource on every exit path.
}

/// One capture+classify cycle. `Ok(None)` means no status update this cycle.
async fn perform_sample(
    source: &mut Box<dyn FrameSource>,
    detector: &DetectorClient,
    camera_error_tx: &watch::Sender<Option<String>>,
) -> Result<Option<DetectionStatus>> {
    let frame = {
        // The capture command runs on the blocking pool; a wedged camera is
        // cut off after CAPTURE_TIMEOUT_SECS. Box<dyn FrameSource> is not
        // clonable, so move it through the blocking task and back.
        let mut moved = std::mem::replace(source, Box::new(UnavailableSource));
        let grab = tokio::task::spawn_blocking(move || {
            let frame = moved.grab();
            (moved, frame)
        });

        match tokio::time::timeout(Duration::from_secs(CAPTURE_TIMEOUT_SECS), grab).await {
            Ok(joined) => {
                let (moved, frame) = joined.context("capture worker join failed")?;
                *source = moved;
                match frame {
                    Ok(frame) => {
                        if camera_error_tx.borrow().is_some() {
                            let _ = camera_error_tx.send(None);
                            log_info!("camera recovered");
                        }
                        frame
                    }
                    Err(err) => {
                        log_warn!("frame capture failed: {err:?}");
                        let _ = camera_error_tx.send(Some(err.to_string()));
                        return Ok(None);
                    }
                }
            }
            Err(_) => {
                let msg = format!("frame capture timed out (> {CAPTURE_TIMEOUT_SECS}s)");
                log_warn!("{msg}");
                let _ = camera_error_tx.send(Some(msg));
                // The timed-out grab still owns the real source and will
                // drop it (releasing the camera) whenever it finishes; the
                // loop keeps the placeholder from here on.
                return Ok(None);
            }
        }
    };

    // Deliberately no timeout here: a slow model delays the next sample, it
    // does not fail the cycle (the interval's Delay behavior absorbs it).
    let detections = match detector.detect(frame).await {
        Ok(detections) => detections,
        Err(err) => {
            log_warn!("classification failed, keeping previous status: {err}");
            return Ok(None);
        }
    };

    log_info!(
        "classified frame: {} detections [{}]",
        detections.len(),
        detections
            .iter()
            .map(|d| format!("{} {:.2}", d.label, d.confidence))
            .collect::<Vec<_>>()
            .join(", ")
    );

    Ok(Some(classify(&detections)))
}

/// Stand-in source after a capture timeout orphaned the real one.
struct UnavailableSource;

impl FrameSource for UnavailableSource {
    fn grab(&mut self) -> Result<Vec<u8>> {
        Err(anyhow!("capture source lost after timeout"))
    }
}
