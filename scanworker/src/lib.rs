/*!
# Scan Worker

Runs the decode engine on a dedicated background thread and exposes it to
async callers through a request router with correlation IDs, per-request
timeouts and a one-time readiness handshake.

```rust,no_run
# async fn demo() -> anyhow::Result<()> {
use scanworker::{config::AppConfig, ScanService};
use shared::{DecodeOptions, Frame};

let service = ScanService::start(&AppConfig::new())?;
service.router().initialize().await?;

let frame = Frame::new(vec![255u8; 640 * 480 * 4], 640, 480);
let outcome = service.router().decode(&frame, DecodeOptions::default()).await?;
println!("{:?}", outcome);

service.shutdown().await;
# Ok(())
# }
```
*/

pub mod config;
pub mod router;
pub mod worker;

pub use router::{RouterHandle, ScanEvent};
pub use worker::{ThreadLink, WorkerContext, WorkerLink, WorkerThread};

use config::AppConfig;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Background worker plus the router in front of it
pub struct ScanService {
    router: RouterHandle,
    worker: WorkerThread,
    task: JoinHandle<()>,
}

impl ScanService {
    /// Spawn the worker thread and the router task.
    ///
    /// Must be called inside a tokio runtime. The engine is not built until
    /// [`RouterHandle::initialize`] completes.
    pub fn start(config: &AppConfig) -> shared::Result<Self> {
        let (responses_tx, responses_rx) = mpsc::unbounded_channel();
        let worker = WorkerThread::spawn(
            config.engine.clone(),
            config.router.worker_inbox,
            responses_tx,
        )?;
        let (router, task) = router::spawn(worker.link(), responses_rx, config.router.clone());

        info!("🚀 Scan service started");
        Ok(Self {
            router,
            worker,
            task,
        })
    }

    pub fn router(&self) -> &RouterHandle {
        &self.router
    }

    /// Stop the router and wait for the worker thread to exit
    pub async fn shutdown(self) {
        let Self {
            router,
            mut worker,
            task,
        } = self;

        if let Err(e) = router.shutdown().await {
            warn!("⚠️ Router already stopped: {}", e);
        }
        if let Err(e) = task.await {
            warn!("⚠️ Router task ended abnormally: {}", e);
        }
        // Joining is blocking; the worker drains its inbox first
        if let Err(e) = tokio::task::spawn_blocking(move || worker.stop()).await {
            warn!("⚠️ Worker join failed: {}", e);
        }
        info!("✅ Scan service stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use code_decoder::testing;
    use shared::{DecodeOptions, DecodeOutcome, ScanPriority, ScanSettings, Symbology};
    use std::time::Instant;

    #[tokio::test]
    async fn test_end_to_end_decode_through_worker() {
        let service = ScanService::start(&AppConfig::new()).unwrap();
        let router = service.router().clone();
        let mut events = router.subscribe();

        let pong = router.ping().await.unwrap();
        assert!(!pong.ready);

        router.initialize().await.unwrap();
        assert!(router.is_ready());
        assert!(router.ping().await.unwrap().ready);

        let t0 = Instant::now();
        let frame = testing::linear_frame_at(&testing::ean8_modules("1234567"), 4, 640, 480, t0);
        let outcome = router
            .decode(&frame, DecodeOptions::with_priority(ScanPriority::Linear))
            .await
            .unwrap();
        let result = outcome.result().unwrap();
        assert_eq!(result.text, "12345670");
        assert_eq!(result.format, Symbology::Ean8);

        // The worker stamps each frame on receipt, so only the pixels travel
        assert_eq!(
            router.decode(&frame, DecodeOptions::default()).await.unwrap(),
            DecodeOutcome::Duplicate
        );
        assert_eq!(router.cache_stats().await.unwrap().cache_size, 1);

        assert_eq!(events.recv().await.unwrap(), ScanEvent::Ready);
        assert!(matches!(events.recv().await.unwrap(), ScanEvent::Decoded(_)));
        assert!(matches!(
            events.recv().await.unwrap(),
            ScanEvent::Duplicate { .. }
        ));

        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_validation_errors_and_settings_through_worker() {
        let service = ScanService::start(&AppConfig::new()).unwrap();
        let router = service.router().clone();
        router.initialize().await.unwrap();

        let bad = shared::Frame::new(vec![0u8; 12], 4, 4);
        let err = router
            .decode(&bad, DecodeOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), shared::ErrorCode::InvalidDimensions);

        let blank = testing::blank_frame(64, 64);
        assert_eq!(
            router.decode(&blank, DecodeOptions::default()).await.unwrap(),
            DecodeOutcome::NotFound
        );

        let capabilities = router
            .configure(ScanSettings {
                enabled_formats: Some(vec!["QR_CODE".into()]),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(capabilities.enabled_formats.len(), 1);

        let err = router
            .configure(ScanSettings {
                enabled_formats: Some(vec!["PDF_417".into()]),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), shared::ErrorCode::InvalidRequest);

        router.clear_cache().await.unwrap();
        service.shutdown().await;
    }
}
