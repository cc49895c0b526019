/*!
Background decode context.

A dedicated OS thread owns the [`ScanEngine`]. It drains a bounded inbox of
JSON request envelopes in submission order and posts one JSON response per
request back to the router. The engine is built on `init`; until then decode
requests are answered with `WASM_NOT_READY`.
*/

use code_decoder::engine::capabilities_for;
use code_decoder::{EngineConfig, ReaderRegistry, ScanEngine};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use shared::protocol::{
    salvage_request, CacheClearedResponse, CacheStatsResponse, CapabilitiesResponse,
    ConfiguredResponse, DecodeRequest, DecodeResponse, ErrorPayload, PongResponse,
};
use shared::{CacheStats, ErrorCode, Frame, Result, ScanError, WorkerRequest, WorkerResponse};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, warn};

/// Where the router posts serialized requests
pub trait WorkerLink: Send + 'static {
    /// Queue one message; fails when the worker is gone or saturated
    fn post(&self, message: String) -> Result<()>;
}

/// Link to a worker thread's inbox
#[derive(Debug, Clone)]
pub struct ThreadLink {
    inbox: Sender<String>,
}

impl ThreadLink {
    /// Queue one message, waiting while the inbox is full
    pub fn post_blocking(&self, message: String) -> Result<()> {
        self.inbox
            .send(message)
            .map_err(|_| ScanError::request_failed("worker has stopped"))
    }
}

impl WorkerLink for ThreadLink {
    fn post(&self, message: String) -> Result<()> {
        self.inbox.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => ScanError::request_failed("worker inbox full"),
            TrySendError::Disconnected(_) => ScanError::request_failed("worker has stopped"),
        })
    }
}

/// Engine state owned by the worker thread
pub struct WorkerContext {
    config: EngineConfig,
    engine: Option<ScanEngine>,
}

impl WorkerContext {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            engine: None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.engine.is_some()
    }

    /// Handle one raw message.
    ///
    /// Returns the response to post (if any) and whether to keep running.
    pub fn handle_message(&mut self, message: &str) -> (Option<WorkerResponse>, bool) {
        match WorkerRequest::from_json(message) {
            Ok(WorkerRequest::Shutdown) => {
                info!("🛑 Worker received shutdown");
                (None, false)
            }
            Ok(request) => (Some(self.handle(request)), true),
            Err(err) => {
                warn!("⚠️ Unparseable worker message: {}", err);
                let response = match salvage_request(message) {
                    Some(salvaged) if salvaged.is_decode() => {
                        WorkerResponse::DecodeResult(DecodeResponse::from_outcome(
                            salvaged.request_id,
                            Err(ScanError::invalid_request(err.to_string())),
                            0.0,
                        ))
                    }
                    // Other request types are failed by ID, whatever their response type
                    Some(salvaged) => WorkerResponse::Error(ErrorPayload {
                        request_id: Some(salvaged.request_id),
                        code: Some(ErrorCode::InvalidRequest),
                        message: err.to_string(),
                    }),
                    None => WorkerResponse::Error(ErrorPayload::uncorrelated(
                        Some(ErrorCode::InvalidRequest),
                        err.to_string(),
                    )),
                };
                (Some(response), true)
            }
        }
    }

    /// Handle one parsed request
    pub fn handle(&mut self, request: WorkerRequest) -> WorkerResponse {
        match request {
            WorkerRequest::Init => self.init(),
            WorkerRequest::Decode(req) => WorkerResponse::DecodeResult(self.decode(req)),
            WorkerRequest::GetCacheStats(req) => {
                let (success, stats) = match &self.engine {
                    Some(engine) => (true, engine.cache_stats()),
                    None => (
                        false,
                        CacheStats {
                            cache_size: 0,
                            cooldown_ms: self.config.cooldown_ms,
                        },
                    ),
                };
                WorkerResponse::CacheStats(CacheStatsResponse {
                    request_id: req.request_id,
                    success,
                    stats,
                })
            }
            WorkerRequest::ClearCache(req) => {
                if let Some(engine) = &self.engine {
                    engine.clear_cache();
                }
                WorkerResponse::CacheCleared(CacheClearedResponse {
                    request_id: req.request_id,
                    success: self.engine.is_some(),
                })
            }
            WorkerRequest::Ping(_) => WorkerResponse::Pong(PongResponse {
                ready: self.is_ready(),
                timestamp: chrono::Utc::now().timestamp_millis(),
            }),
            WorkerRequest::GetCapabilities(req) => {
                let capabilities = match &self.engine {
                    Some(engine) => engine.capabilities(),
                    None => capabilities_for(&self.config, &ReaderRegistry::standard()),
                };
                WorkerResponse::Capabilities(CapabilitiesResponse {
                    request_id: req.request_id,
                    success: true,
                    capabilities,
                })
            }
            WorkerRequest::Configure(req) => {
                let outcome = match self.engine.as_mut() {
                    Some(engine) => engine.configure(&req.settings).map(|capabilities| {
                        self.config = engine.config().clone();
                        capabilities
                    }),
                    None => Err(ScanError::NotReady),
                };
                let response = match outcome {
                    Ok(capabilities) => ConfiguredResponse {
                        request_id: req.request_id,
                        success: true,
                        capabilities: Some(capabilities),
                        error: None,
                        message: None,
                    },
                    Err(err) => {
                        warn!("⚠️ Configure {} rejected: {}", req.request_id, err);
                        ConfiguredResponse {
                            request_id: req.request_id,
                            success: false,
                            capabilities: None,
                            error: Some(err.code()),
                            message: Some(err.to_string()),
                        }
                    }
                };
                WorkerResponse::Configured(response)
            }
            WorkerRequest::Shutdown => WorkerResponse::Error(ErrorPayload::uncorrelated(
                None,
                "shutdown is not answered",
            )),
        }
    }

    fn init(&mut self) -> WorkerResponse {
        if self.engine.is_some() {
            debug!("Repeated init on a ready worker");
            return WorkerResponse::Ready;
        }
        match ScanEngine::new(self.config.clone()) {
            Ok(engine) => {
                self.engine = Some(engine);
                info!("✅ Worker ready");
                WorkerResponse::Ready
            }
            Err(err) => {
                error!("❌ Engine initialization failed: {}", err);
                WorkerResponse::Error(ErrorPayload::uncorrelated(
                    Some(err.code()),
                    err.to_string(),
                ))
            }
        }
    }

    fn decode(&self, req: DecodeRequest) -> DecodeResponse {
        let started = Instant::now();
        let outcome = match &self.engine {
            Some(engine) => {
                // Stamped on receipt; the request has no capture instant
                let frame = Frame::new(req.frame_data, req.width, req.height);
                engine.decode_frame(&frame, &req.options)
            }
            None => Err(ScanError::NotReady),
        };
        if let Err(err) = &outcome {
            debug!("Decode {} failed: {}", req.request_id, err);
        }

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        DecodeResponse::from_outcome(req.request_id, outcome, elapsed_ms)
    }
}

/// Handle to the worker thread
pub struct WorkerThread {
    link: ThreadLink,
    handle: Option<JoinHandle<()>>,
}

impl WorkerThread {
    /// Start the worker thread; responses are posted to `responses`
    pub fn spawn(
        config: EngineConfig,
        inbox_capacity: usize,
        responses: UnboundedSender<String>,
    ) -> Result<Self> {
        let (tx, rx) = bounded::<String>(inbox_capacity.max(1));
        let handle = thread::Builder::new()
            .name("scan-worker".to_string())
            .spawn(move || run_worker(WorkerContext::new(config), rx, responses))
            .map_err(|e| ScanError::request_failed(format!("failed to spawn worker: {}", e)))?;

        info!("🧵 Scan worker thread started");
        Ok(Self {
            link: ThreadLink { inbox: tx },
            handle: Some(handle),
        })
    }

    /// A link the router can post through
    pub fn link(&self) -> ThreadLink {
        self.link.clone()
    }

    /// Ask the worker to stop and wait for it
    pub fn stop(&mut self) {
        if let Ok(message) = WorkerRequest::Shutdown.to_json() {
            // A stopped worker has nothing to tell
            let _ = self.link.post_blocking(message);
        }
        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok(()) => info!("Scan worker thread finished successfully"),
                Err(_) => error!("Scan worker thread panicked"),
            }
        }
    }
}

impl Drop for WorkerThread {
    /// Asks the worker to stop without joining it; use [`WorkerThread::stop`]
    /// to wait. The thread also exits once every link is gone.
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        if let Ok(message) = WorkerRequest::Shutdown.to_json() {
            if let Err(e) = self.link.post(message) {
                debug!("Shutdown not queued on drop: {}", e);
            }
        }
        debug!("Detached scan worker thread {:?}", handle.thread().id());
    }
}

fn run_worker(mut context: WorkerContext, inbox: Receiver<String>, responses: UnboundedSender<String>) {
    let mut handled = 0u64;

    while let Ok(message) = inbox.recv() {
        let (response, keep_running) = context.handle_message(&message);
        handled += 1;

        if let Some(response) = response {
            match response.to_json() {
                Ok(json) => {
                    if responses.send(json).is_err() {
                        info!("Response channel closed - router has stopped");
                        break;
                    }
                }
                Err(e) => error!("❌ Failed to serialize {} response: {}", response.kind(), e),
            }
        }

        if !keep_running {
            break;
        }
    }

    info!("📊 Scan worker handled {} messages", handled);
}
