/*!
Worker request router.

A tokio task exclusively owns the pending-request table. Callers talk to it
through a cloneable [`RouterHandle`]; each correlated call gets a fresh
request ID, is posted to the background worker as JSON, and resolves when
the response with the same ID comes back or its deadline passes, whichever
happens first. Responses for unknown IDs (late arrivals after a timeout)
are logged and dropped.

`init` and `ping` carry no ID: the first `ready` resolves every initialize
waiter, and pongs are matched to pings in FIFO order.
*/

use crate::config::RouterConfig;
use crate::worker::WorkerLink;
use shared::protocol::{
    ConfigureRequest, DecodeRequest, DecodeResponse, ErrorPayload, PingRequest, PongResponse,
    RequestRef,
};
use shared::{
    CacheStats, DecodeOptions, DecodeOutcome, DecodeResult, EngineCapabilities, ErrorCode, Frame,
    Result, ScanError, ScanSettings, WorkerRequest, WorkerResponse,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

/// Notification for observers of the scan stream
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    /// The worker finished initializing
    Ready,
    /// A decode call produced a new result
    Decoded(DecodeResult),
    /// A decode call saw a code inside its cooldown window
    Duplicate { request_id: u64 },
    /// The worker reported an error outside any decode call
    WorkerError {
        code: Option<ErrorCode>,
        message: String,
    },
}

/// Correlated request body; the router assigns the ID
#[derive(Debug)]
enum Call {
    Decode { frame: Frame, options: DecodeOptions },
    CacheStats,
    ClearCache,
    Capabilities,
    Configure(ScanSettings),
}

impl Call {
    fn into_request(self, request_id: u64) -> WorkerRequest {
        match self {
            Call::Decode { frame, options } => WorkerRequest::Decode(DecodeRequest {
                request_id,
                frame_data: frame.bytes(),
                width: frame.width(),
                height: frame.height(),
                options,
            }),
            Call::CacheStats => WorkerRequest::GetCacheStats(RequestRef { request_id }),
            Call::ClearCache => WorkerRequest::ClearCache(RequestRef { request_id }),
            Call::Capabilities => WorkerRequest::GetCapabilities(RequestRef { request_id }),
            Call::Configure(settings) => {
                WorkerRequest::Configure(ConfigureRequest { request_id, settings })
            }
        }
    }

    fn is_decode(&self) -> bool {
        matches!(self, Call::Decode { .. })
    }
}

enum Command {
    Initialize {
        reply: oneshot::Sender<Result<()>>,
    },
    Call {
        call: Call,
        reply: oneshot::Sender<Result<WorkerResponse>>,
    },
    Ping {
        reply: oneshot::Sender<Result<PongResponse>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// A dispatched request awaiting its response
struct PendingRequest {
    kind: &'static str,
    submitted_at: Instant,
    deadline: Instant,
    timeout: Duration,
    reply: oneshot::Sender<Result<WorkerResponse>>,
}

struct PendingPing {
    deadline: Instant,
    reply: oneshot::Sender<Result<PongResponse>>,
}

/// Router task state
struct Router<L: WorkerLink> {
    link: L,
    config: RouterConfig,
    next_id: u64,
    pending: HashMap<u64, PendingRequest>,
    init_waiters: Vec<oneshot::Sender<Result<()>>>,
    init_deadline: Option<Instant>,
    pings: VecDeque<PendingPing>,
    ready: Arc<AtomicBool>,
    worker_alive: bool,
    events: broadcast::Sender<ScanEvent>,
}

impl<L: WorkerLink> Router<L> {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut responses: mpsc::UnboundedReceiver<String>,
    ) {
        info!("🔀 Request router started");

        loop {
            let next_deadline = self.next_deadline();
            let expiry = async move {
                match next_deadline {
                    Some(deadline) => sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => {
                        if !self.handle_command(command) {
                            break;
                        }
                    }
                    None => {
                        info!("All router handles dropped");
                        self.shutdown();
                        break;
                    }
                },
                message = responses.recv(), if self.worker_alive => match message {
                    Some(message) => self.handle_message(&message),
                    None => {
                        warn!("⚠️ Worker response channel closed");
                        self.worker_alive = false;
                        self.ready.store(false, Ordering::SeqCst);
                        self.fail_all("worker has stopped");
                    }
                },
                _ = expiry => self.expire(Instant::now()),
            }
        }

        info!("Request router stopped");
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.pending
            .values()
            .map(|p| p.deadline)
            .chain(self.init_deadline)
            .chain(self.pings.front().map(|p| p.deadline))
            .min()
    }

    fn post(&self, request: &WorkerRequest) -> Result<()> {
        if !self.worker_alive {
            return Err(ScanError::request_failed("worker has stopped"));
        }
        self.link.post(request.to_json()?)
    }

    /// Returns false once the router should stop
    fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Initialize { reply } => self.initialize(reply),
            Command::Call { call, reply } => self.dispatch(call, reply),
            Command::Ping { reply } => {
                match self.post(&WorkerRequest::Ping(PingRequest {})) {
                    Ok(()) => self.pings.push_back(PendingPing {
                        deadline: Instant::now() + self.config.request_timeout(),
                        reply,
                    }),
                    Err(err) => {
                        let _ = reply.send(Err(err));
                    }
                }
            }
            Command::Shutdown { reply } => {
                self.shutdown();
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    fn initialize(&mut self, reply: oneshot::Sender<Result<()>>) {
        if self.ready.load(Ordering::SeqCst) {
            let _ = reply.send(Ok(()));
            return;
        }

        if self.init_deadline.is_none() {
            if let Err(err) = self.post(&WorkerRequest::Init) {
                let _ = reply.send(Err(err));
                return;
            }
            self.init_deadline = Some(Instant::now() + self.config.init_timeout());
            info!("🤝 Sent init to worker");
        }
        self.init_waiters.push(reply);
    }

    fn dispatch(&mut self, call: Call, reply: oneshot::Sender<Result<WorkerResponse>>) {
        if call.is_decode() && !self.ready.load(Ordering::SeqCst) {
            let _ = reply.send(Err(ScanError::NotReady));
            return;
        }

        let timeout = if call.is_decode() {
            self.config.decode_timeout()
        } else {
            self.config.request_timeout()
        };

        self.next_id += 1;
        let request_id = self.next_id;
        let request = call.into_request(request_id);
        let kind = request.kind();

        if let Err(err) = self.post(&request) {
            warn!("⚠️ Failed to post {} {}: {}", kind, request_id, err);
            let _ = reply.send(Err(err));
            return;
        }

        let submitted_at = Instant::now();
        self.pending.insert(
            request_id,
            PendingRequest {
                kind,
                submitted_at,
                deadline: submitted_at + timeout,
                timeout,
                reply,
            },
        );
        debug!("Dispatched {} {}", kind, request_id);
    }

    fn handle_message(&mut self, message: &str) {
        let response = match WorkerResponse::from_json(message) {
            Ok(response) => response,
            Err(err) => {
                error!("❌ Unparseable worker response: {}", err);
                return;
            }
        };

        match response {
            WorkerResponse::Ready => self.on_ready(),
            WorkerResponse::Error(payload) => self.on_worker_error(payload),
            WorkerResponse::Pong(pong) => match self.pings.pop_front() {
                Some(ping) => {
                    let _ = ping.reply.send(Ok(pong));
                }
                None => debug!("Dropped pong with no waiting ping"),
            },
            response => self.resolve(response),
        }
    }

    fn on_ready(&mut self) {
        let was_ready = self.ready.swap(true, Ordering::SeqCst);
        self.init_deadline = None;

        for waiter in self.init_waiters.drain(..) {
            let _ = waiter.send(Ok(()));
        }
        if was_ready {
            debug!("Repeated ready from worker");
        } else {
            info!("✅ Worker is ready");
            let _ = self.events.send(ScanEvent::Ready);
        }
    }

    fn on_worker_error(&mut self, payload: ErrorPayload) {
        if let Some(request_id) = payload.request_id {
            self.fail_pending(request_id, payload);
            return;
        }
        warn!("⚠️ Worker error: {}", payload.message);

        if self.init_deadline.take().is_some() {
            let code = payload.code.unwrap_or(ErrorCode::RequestFailed);
            for waiter in self.init_waiters.drain(..) {
                let _ = waiter.send(Err(ScanError::Worker {
                    code,
                    message: payload.message.clone(),
                }));
            }
        }

        let _ = self.events.send(ScanEvent::WorkerError {
            code: payload.code,
            message: payload.message,
        });
    }

    /// Fail one caller with an error the worker tied to its request
    fn fail_pending(&mut self, request_id: u64, payload: ErrorPayload) {
        let Some(pending) = self.pending.remove(&request_id) else {
            warn!(
                "⚠️ Dropped error for unknown request {}: {}",
                request_id, payload.message
            );
            return;
        };
        warn!(
            "⚠️ Worker rejected {} {}: {}",
            pending.kind, request_id, payload.message
        );
        let _ = pending.reply.send(Err(ScanError::Worker {
            code: payload.code.unwrap_or(ErrorCode::RequestFailed),
            message: payload.message,
        }));
    }

    fn resolve(&mut self, response: WorkerResponse) {
        let Some(request_id) = response.request_id() else {
            debug!("Dropped uncorrelated {} response", response.kind());
            return;
        };
        let Some(pending) = self.pending.remove(&request_id) else {
            warn!(
                "⚠️ Dropped {} for unknown request {} (timed out or never sent)",
                response.kind(),
                request_id
            );
            return;
        };

        debug!(
            "Resolved {} {} in {:?}",
            pending.kind,
            request_id,
            pending.submitted_at.elapsed()
        );

        if let WorkerResponse::DecodeResult(decode) = &response {
            self.publish_decode(decode);
        }
        let _ = pending.reply.send(Ok(response));
    }

    fn publish_decode(&self, decode: &DecodeResponse) {
        let event = if let Some(result) = &decode.result {
            ScanEvent::Decoded(result.clone())
        } else if decode.duplicate.unwrap_or(false) {
            ScanEvent::Duplicate {
                request_id: decode.request_id,
            }
        } else {
            return;
        };
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn expire(&mut self, now: Instant) {
        let expired: Vec<u64> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(id, _)| *id)
            .collect();

        for request_id in expired {
            if let Some(pending) = self.pending.remove(&request_id) {
                let timeout_ms = pending.timeout.as_millis() as u64;
                warn!(
                    "⏱️ {} {} timed out after {} ms",
                    pending.kind, request_id, timeout_ms
                );
                let _ = pending.reply.send(Err(ScanError::Timeout {
                    request_id,
                    timeout_ms,
                }));
            }
        }

        if self.init_deadline.is_some_and(|deadline| deadline <= now) {
            self.init_deadline = None;
            let message = format!(
                "worker did not become ready within {} ms",
                self.config.init_timeout_ms
            );
            warn!("⏱️ {}", message);
            for waiter in self.init_waiters.drain(..) {
                let _ = waiter.send(Err(ScanError::request_failed(message.clone())));
            }
        }

        while self.pings.front().is_some_and(|ping| ping.deadline <= now) {
            if let Some(ping) = self.pings.pop_front() {
                let _ = ping
                    .reply
                    .send(Err(ScanError::request_failed("ping timed out")));
            }
        }
    }

    fn fail_all(&mut self, reason: &str) {
        for (_, pending) in self.pending.drain() {
            let _ = pending.reply.send(Err(ScanError::request_failed(reason)));
        }
        self.init_deadline = None;
        for waiter in self.init_waiters.drain(..) {
            let _ = waiter.send(Err(ScanError::request_failed(reason)));
        }
        for ping in self.pings.drain(..) {
            let _ = ping.reply.send(Err(ScanError::request_failed(reason)));
        }
    }

    fn shutdown(&mut self) {
        if self.worker_alive {
            if let Err(err) = self.post(&WorkerRequest::Shutdown) {
                debug!("Worker already gone at shutdown: {}", err);
            }
        }
        self.ready.store(false, Ordering::SeqCst);
        self.fail_all("router shut down");
        info!("🛑 Router shutting down");
    }
}

/// Cloneable handle to the router task
#[derive(Clone)]
pub struct RouterHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<ScanEvent>,
    ready: Arc<AtomicBool>,
}

impl std::fmt::Debug for RouterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterHandle")
            .field("ready", &self.is_ready())
            .finish()
    }
}

/// Start the router task.
///
/// `link` posts requests to the worker; `responses` carries its JSON replies.
/// Must be called inside a tokio runtime.
pub fn spawn<L: WorkerLink>(
    link: L,
    responses: mpsc::UnboundedReceiver<String>,
    config: RouterConfig,
) -> (RouterHandle, JoinHandle<()>) {
    let (command_tx, command_rx) = mpsc::channel(config.command_buffer.max(1));
    let (events, _) = broadcast::channel(config.event_buffer.max(1));
    let ready = Arc::new(AtomicBool::new(false));

    let router = Router {
        link,
        config,
        next_id: 0,
        pending: HashMap::new(),
        init_waiters: Vec::new(),
        init_deadline: None,
        pings: VecDeque::new(),
        ready: ready.clone(),
        worker_alive: true,
        events: events.clone(),
    };
    let task = tokio::spawn(router.run(command_rx, responses));

    (
        RouterHandle {
            commands: command_tx,
            events,
            ready,
        },
        task,
    )
}

fn unexpected(response: WorkerResponse) -> ScanError {
    ScanError::request_failed(format!("unexpected {} response", response.kind()))
}

impl RouterHandle {
    async fn send<T>(&self, command: Command, reply: oneshot::Receiver<Result<T>>) -> Result<T> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ScanError::request_failed("router has stopped"))?;
        reply
            .await
            .map_err(|_| ScanError::request_failed("router dropped the request"))?
    }

    async fn call(&self, call: Call) -> Result<WorkerResponse> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Call { call, reply }, rx).await
    }

    /// Run the readiness handshake; resolves once the worker reports `ready`
    pub async fn initialize(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Initialize { reply }, rx).await
    }

    /// Whether the handshake has completed
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Decode one frame in the worker
    pub async fn decode(&self, frame: &Frame, options: DecodeOptions) -> Result<DecodeOutcome> {
        if !self.is_ready() {
            return Err(ScanError::NotReady);
        }
        let call = Call::Decode {
            frame: frame.clone(),
            options,
        };
        match self.call(call).await? {
            WorkerResponse::DecodeResult(response) => response.into_outcome(),
            other => Err(unexpected(other)),
        }
    }

    pub async fn cache_stats(&self) -> Result<CacheStats> {
        match self.call(Call::CacheStats).await? {
            WorkerResponse::CacheStats(response) if response.success => Ok(response.stats),
            WorkerResponse::CacheStats(_) => Err(ScanError::NotReady),
            other => Err(unexpected(other)),
        }
    }

    pub async fn clear_cache(&self) -> Result<()> {
        match self.call(Call::ClearCache).await? {
            WorkerResponse::CacheCleared(response) if response.success => Ok(()),
            WorkerResponse::CacheCleared(_) => Err(ScanError::NotReady),
            other => Err(unexpected(other)),
        }
    }

    /// Symbologies the worker reads and the settings it runs with
    pub async fn capabilities(&self) -> Result<EngineCapabilities> {
        match self.call(Call::Capabilities).await? {
            WorkerResponse::Capabilities(response) => Ok(response.capabilities),
            other => Err(unexpected(other)),
        }
    }

    /// Negotiate new settings; the worker keeps its old ones on rejection
    pub async fn configure(&self, settings: ScanSettings) -> Result<EngineCapabilities> {
        match self.call(Call::Configure(settings)).await? {
            WorkerResponse::Configured(response) => match response.capabilities {
                Some(capabilities) if response.success => Ok(capabilities),
                _ => {
                    let code = response.error.unwrap_or(ErrorCode::InvalidRequest);
                    Err(ScanError::Worker {
                        code,
                        message: response.message.unwrap_or_else(|| code.to_string()),
                    })
                }
            },
            other => Err(unexpected(other)),
        }
    }

    /// Liveness probe, answered even while decodes are queued
    pub async fn ping(&self) -> Result<PongResponse> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Ping { reply }, rx).await
    }

    /// Observe decode results and worker state changes
    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.events.subscribe()
    }

    /// Stop the worker and the router; pending calls fail
    pub async fn shutdown(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Shutdown { reply })
            .await
            .map_err(|_| ScanError::request_failed("router has stopped"))?;
        // The router only drops the reply if it is already gone
        let _ = rx.await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::protocol::CacheClearedResponse;
    use shared::{Point, Symbology};
    use tokio::time::timeout;

    struct FakeLink {
        posted: mpsc::UnboundedSender<String>,
    }

    impl WorkerLink for FakeLink {
        fn post(&self, message: String) -> Result<()> {
            self.posted
                .send(message)
                .map_err(|_| ScanError::request_failed("fake worker gone"))
        }
    }

    struct Harness {
        router: RouterHandle,
        posted: mpsc::UnboundedReceiver<String>,
        worker: mpsc::UnboundedSender<String>,
    }

    impl Harness {
        fn new(config: RouterConfig) -> Self {
            let (posted_tx, posted) = mpsc::unbounded_channel();
            let (worker, responses) = mpsc::unbounded_channel();
            let (router, _task) = spawn(FakeLink { posted: posted_tx }, responses, config);
            Self {
                router,
                posted,
                worker,
            }
        }

        async fn next_request(&mut self) -> WorkerRequest {
            let message = timeout(Duration::from_secs(2), self.posted.recv())
                .await
                .expect("no request posted")
                .expect("router stopped");
            WorkerRequest::from_json(&message).unwrap()
        }

        fn reply(&self, response: WorkerResponse) {
            self.worker.send(response.to_json().unwrap()).unwrap();
        }

        /// Start a decode call and return its request ID once posted
        async fn dispatch_decode(&mut self) -> (u64, JoinHandle<Result<DecodeOutcome>>) {
            let router = self.router.clone();
            let call =
                tokio::spawn(async move { router.decode(&frame(), DecodeOptions::default()).await });
            (decode_id(&self.next_request().await), call)
        }

        async fn ready(&mut self) {
            let router = self.router.clone();
            let init = tokio::spawn(async move { router.initialize().await });
            assert_eq!(self.next_request().await, WorkerRequest::Init);
            self.reply(WorkerResponse::Ready);
            init.await.unwrap().unwrap();
        }
    }

    fn found(request_id: u64, text: &str) -> WorkerResponse {
        let result = DecodeResult::new(text, Symbology::Code128, vec![Point::new(1.0, 2.0)], 5);
        WorkerResponse::DecodeResult(DecodeResponse::from_outcome(
            request_id,
            Ok(DecodeOutcome::Found(result)),
            1.0,
        ))
    }

    fn decode_id(request: &WorkerRequest) -> u64 {
        match request {
            WorkerRequest::Decode(req) => req.request_id,
            other => panic!("expected decode, got {}", other.kind()),
        }
    }

    fn frame() -> Frame {
        Frame::new(vec![255u8; 4 * 4 * 4], 4, 4)
    }

    #[tokio::test]
    async fn test_decode_before_ready_fails_fast() {
        let mut harness = Harness::new(RouterConfig::default());

        let err = harness
            .router
            .decode(&frame(), DecodeOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::NotReady));
        assert_eq!(err.code().as_str(), "WASM_NOT_READY");
        assert!(harness.posted.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_concurrent_decodes_resolve_by_request_id() {
        let mut harness = Harness::new(RouterConfig {
            decode_timeout_ms: 600,
            ..RouterConfig::default()
        });
        harness.ready().await;

        let mut calls = Vec::new();
        for _ in 0..4 {
            calls.push(harness.dispatch_decode().await);
        }
        let (expiring_id, expiring) = harness.dispatch_decode().await;
        tokio::time::sleep(Duration::from_millis(300)).await;
        for _ in 0..4 {
            calls.push(harness.dispatch_decode().await);
        }

        let ids: std::collections::HashSet<u64> = calls
            .iter()
            .map(|(id, _)| *id)
            .chain([expiring_id])
            .collect();
        assert_eq!(ids.len(), 9);

        for i in [2, 0, 3, 1] {
            let id = calls[i].0;
            harness.reply(found(id, &format!("CALL-{}", id)));
        }

        match expiring.await.unwrap() {
            Err(ScanError::Timeout { request_id, .. }) => assert_eq!(request_id, expiring_id),
            other => panic!("expected timeout, got {:?}", other),
        }
        // Arrives between answers for live requests
        harness.reply(found(expiring_id, "LATE"));

        for i in [7, 4, 6, 5] {
            let id = calls[i].0;
            harness.reply(found(id, &format!("CALL-{}", id)));
        }

        for (id, call) in calls {
            let outcome = call.await.unwrap().unwrap();
            assert_eq!(outcome.result().unwrap().text, format!("CALL-{}", id));
        }
        assert!(harness.posted.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_timeout_only_affects_its_request() {
        let mut harness = Harness::new(RouterConfig {
            decode_timeout_ms: 100,
            ..RouterConfig::default()
        });
        harness.ready().await;

        let slow = {
            let router = harness.router.clone();
            tokio::spawn(async move { router.decode(&frame(), DecodeOptions::default()).await })
        };
        let slow_id = decode_id(&harness.next_request().await);

        let fast = {
            let router = harness.router.clone();
            tokio::spawn(async move { router.decode(&frame(), DecodeOptions::default()).await })
        };
        let fast_id = decode_id(&harness.next_request().await);
        harness.reply(found(fast_id, "FAST"));

        assert_eq!(fast.await.unwrap().unwrap().result().unwrap().text, "FAST");
        match slow.await.unwrap() {
            Err(ScanError::Timeout { request_id, timeout_ms }) => {
                assert_eq!(request_id, slow_id);
                assert_eq!(timeout_ms, 100);
            }
            other => panic!("expected timeout, got {:?}", other),
        }

        // Late response is dropped and the router keeps serving
        harness.reply(found(slow_id, "LATE"));
        let next = {
            let router = harness.router.clone();
            tokio::spawn(async move { router.clear_cache().await })
        };
        let WorkerRequest::ClearCache(req) = harness.next_request().await else {
            panic!("expected clear_cache");
        };
        harness.reply(WorkerResponse::CacheCleared(CacheClearedResponse {
            request_id: req.request_id,
            success: true,
        }));
        next.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_initialize_times_out_and_can_retry() {
        let mut harness = Harness::new(RouterConfig {
            init_timeout_ms: 50,
            ..RouterConfig::default()
        });

        let err = harness.router.initialize().await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(harness.next_request().await, WorkerRequest::Init);

        harness.ready().await;
        assert!(harness.router.is_ready());
        // Already ready: resolves without another handshake
        harness.router.initialize().await.unwrap();
        assert!(harness.posted.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_init_error_rejects_waiters() {
        let mut harness = Harness::new(RouterConfig::default());
        let mut events = harness.router.subscribe();

        let router = harness.router.clone();
        let init = tokio::spawn(async move { router.initialize().await });
        assert_eq!(harness.next_request().await, WorkerRequest::Init);
        harness.reply(WorkerResponse::Error(ErrorPayload::uncorrelated(
            Some(ErrorCode::InvalidRequest),
            "bad config",
        )));

        let err = init.await.unwrap().unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidRequest);
        assert!(!harness.router.is_ready());
        assert!(matches!(
            events.recv().await.unwrap(),
            ScanEvent::WorkerError { .. }
        ));
    }

    #[tokio::test]
    async fn test_ping_and_events() {
        let mut harness = Harness::new(RouterConfig::default());
        let mut events = harness.router.subscribe();
        harness.ready().await;
        assert_eq!(events.recv().await.unwrap(), ScanEvent::Ready);

        let router = harness.router.clone();
        let ping = tokio::spawn(async move { router.ping().await });
        assert!(matches!(harness.next_request().await, WorkerRequest::Ping(_)));
        harness.reply(WorkerResponse::Pong(PongResponse {
            ready: true,
            timestamp: 1,
        }));
        assert!(ping.await.unwrap().unwrap().ready);

        let router = harness.router.clone();
        let decode =
            tokio::spawn(async move { router.decode(&frame(), DecodeOptions::default()).await });
        let id = decode_id(&harness.next_request().await);
        harness.reply(found(id, "EVENT"));
        decode.await.unwrap().unwrap();

        match events.recv().await.unwrap() {
            ScanEvent::Decoded(result) => assert_eq!(result.text, "EVENT"),
            other => panic!("expected decoded event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_error_with_request_id_fails_only_that_call() {
        let mut harness = Harness::new(RouterConfig::default());
        let mut events = harness.router.subscribe();
        harness.ready().await;
        assert_eq!(events.recv().await.unwrap(), ScanEvent::Ready);

        let router = harness.router.clone();
        let stats = tokio::spawn(async move { router.cache_stats().await });
        let WorkerRequest::GetCacheStats(req) = harness.next_request().await else {
            panic!("expected get_cache_stats");
        };
        let (neighbour_id, decode) = harness.dispatch_decode().await;

        harness.reply(WorkerResponse::Error(ErrorPayload {
            request_id: Some(req.request_id),
            code: Some(ErrorCode::InvalidRequest),
            message: "unknown variant".to_string(),
        }));
        let err = timeout(Duration::from_secs(1), stats)
            .await
            .expect("failed by ID, not by timeout")
            .unwrap()
            .unwrap_err();
        assert!(matches!(
            err,
            ScanError::Worker {
                code: ErrorCode::InvalidRequest,
                ..
            }
        ));

        harness.reply(found(neighbour_id, "NEIGHBOUR"));
        assert_eq!(
            decode.await.unwrap().unwrap().result().unwrap().text,
            "NEIGHBOUR"
        );
        // Routed errors are not broadcast
        assert!(matches!(events.recv().await.unwrap(), ScanEvent::Decoded(_)));
    }

    #[tokio::test]
    async fn test_worker_gone_fails_pending() {
        let mut harness = Harness::new(RouterConfig::default());
        harness.ready().await;

        let router = harness.router.clone();
        let stats = tokio::spawn(async move { router.cache_stats().await });
        assert!(matches!(
            harness.next_request().await,
            WorkerRequest::GetCacheStats(_)
        ));

        let Harness { router, worker, .. } = harness;
        drop(worker);

        let err = stats.await.unwrap().unwrap_err();
        assert!(matches!(err, ScanError::RequestFailed(_)));
        assert!(matches!(
            router.cache_stats().await,
            Err(ScanError::RequestFailed(_))
        ));
    }
}
