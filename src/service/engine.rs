//! Asynchronous task engine behind the message protocol
//!
//! Each submitted request runs as its own tokio task and reports through a
//! [`TaskHandle`]: zero or more progress events, then exactly one terminal
//! event. Work happens chunk by chunk; between chunks the task yields to the
//! runtime and checks for cancellation and cache-clear requests.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, info, warn};
use tokio::sync::mpsc;

use super::messages::{
    CancelledEvent, CompareRequest, ComparisonReport, ErrorEvent, MonteCarloRequest, ProgressEvent, Request, RequestId,
    Response, ResponseKind, SensitivityRequest, Task, TaskKind,
};
use crate::monte_carlo::{MonteCarloConfig, MonteCarloResult, MonteCarloSession, SessionOutcome, DEFAULT_CHUNK_SIZE};
use crate::params::SimulationParameters;
use crate::scenario::{ScenarioRunner, ScenarioSummary, SensitivityPoint, SensitivityReport};

/// Engine-wide settings
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Chunk size for requests that do not name one
    pub chunk_size: u32,

    /// Buffered events per task before the task waits for the reader
    pub channel_capacity: usize,

    /// Entry limit for IRR caches created by tasks
    pub cache_limit: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            channel_capacity: 64,
            cache_limit: None,
        }
    }
}

/// Shared cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Receiving end for one request's events
#[derive(Debug)]
pub struct TaskHandle {
    id: RequestId,
    events: mpsc::Receiver<Response>,
    cancel: CancelToken,
}

impl TaskHandle {
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    /// Next event, or None once the task has finished
    pub async fn next_event(&mut self) -> Option<Response> {
        self.events.recv().await
    }

    /// Ask the task to stop at its next chunk boundary
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Drain events and return the terminal one
    pub async fn wait(mut self) -> Option<Response> {
        while let Some(event) = self.events.recv().await {
            if event.is_terminal() {
                return Some(event);
            }
        }
        None
    }
}

type Registry = Arc<Mutex<HashMap<RequestId, CancelToken>>>;

/// Accepts requests and runs them as tokio tasks
#[derive(Debug, Clone)]
pub struct Engine {
    config: EngineConfig,
    tasks: Registry,
    cache_epoch: Arc<AtomicU64>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            tasks: Arc::new(Mutex::new(HashMap::new())),
            cache_epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Start a request; must be called from within a tokio runtime
    pub fn submit(&self, request: Request) -> TaskHandle {
        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let cancel = CancelToken::new();
        let handle = TaskHandle {
            id: request.id.clone(),
            events: rx,
            cancel: cancel.clone(),
        };

        let task = match request.task() {
            Ok(task) => task,
            Err(e) => {
                warn!("rejecting request {}: {}", request.id, e);
                let _ = tx.try_send(Response::error(request.id, request.kind, e.to_string()));
                return handle;
            }
        };

        match task {
            Task::Cancel => {
                if !self.cancel(&request.id) {
                    let message = format!("no running task with id {}", request.id);
                    let _ = tx.try_send(Response::error(request.id, TaskKind::Cancel, message));
                }
            }
            Task::ClearCache => {
                self.clear_cache();
                let _ = tx.try_send(Response::new(request.id, ResponseKind::CacheCleared));
            }
            task => {
                let registered = {
                    let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
                    if tasks.contains_key(&request.id) {
                        false
                    } else {
                        tasks.insert(request.id.clone(), cancel.clone());
                        true
                    }
                };
                if !registered {
                    let message = format!("a task with id {} is already running", request.id);
                    let _ = tx.try_send(Response::error(request.id, request.kind, message));
                    return handle;
                }

                let ctx = TaskContext {
                    id: request.id,
                    kind: request.kind,
                    tx,
                    cancel,
                    cache_epoch: Arc::clone(&self.cache_epoch),
                    config: self.config.clone(),
                };
                let tasks = Arc::clone(&self.tasks);
                tokio::spawn(async move {
                    let id = ctx.id.clone();
                    run_task(ctx, task).await;
                    tasks.lock().unwrap_or_else(PoisonError::into_inner).remove(&id);
                });
            }
        }
        handle
    }

    /// Cancel a running task by id; false if no such task is running
    pub fn cancel(&self, id: &RequestId) -> bool {
        let tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        match tasks.get(id) {
            Some(token) => {
                info!("cancelling task {}", id);
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Ask every live session to drop its IRR cache at its next chunk boundary
    pub fn clear_cache(&self) {
        let epoch = self.cache_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("IRR cache epoch now {}", epoch);
    }

    /// Ids of tasks still running
    pub fn running(&self) -> Vec<RequestId> {
        let tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.keys().cloned().collect()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

/// Everything a running task needs
struct TaskContext {
    id: RequestId,
    kind: TaskKind,
    tx: mpsc::Sender<Response>,
    cancel: CancelToken,
    cache_epoch: Arc<AtomicU64>,
    config: EngineConfig,
}

/// Position of one session within a task that runs several
struct Stage {
    status: Option<String>,
    index: usize,
    count: usize,
}

impl Stage {
    fn single() -> Self {
        Self {
            status: None,
            index: 0,
            count: 1,
        }
    }

    fn new(index: usize, count: usize, status: String) -> Self {
        Self {
            status: Some(status),
            index,
            count,
        }
    }

    /// Percent of the whole task once the session reaches `percent`
    fn overall(&self, percent: f64) -> f64 {
        (self.index as f64 + percent / 100.0) / self.count.max(1) as f64 * 100.0
    }
}

/// Why a task stopped early
enum Interrupt {
    Cancelled { processed: u32 },
    Failed(String),
}

impl TaskContext {
    fn session_config(&self, chunk_size: Option<u32>, seed: Option<u64>) -> MonteCarloConfig {
        MonteCarloConfig {
            chunk_size: chunk_size.unwrap_or(self.config.chunk_size),
            seed,
            cache_limit: self.config.cache_limit,
        }
    }

    /// Send an event; a dropped handle counts as cancellation
    async fn send(&self, kind: ResponseKind) -> bool {
        let delivered = self.tx.send(Response::new(self.id.clone(), kind)).await.is_ok();
        if !delivered {
            self.cancel.cancel();
        }
        delivered
    }

    /// Run a session chunk by chunk, yielding between chunks
    async fn drive(&self, session: &mut MonteCarloSession, stage: Stage) -> Result<MonteCarloResult, Interrupt> {
        let mut epoch = self.cache_epoch.load(Ordering::SeqCst);

        while !session.is_finished() {
            if self.cancel.is_cancelled() {
                let processed = match session.cancelled() {
                    SessionOutcome::Cancelled { processed, .. } => processed,
                    SessionOutcome::Completed(_) => session.completed(),
                };
                return Err(Interrupt::Cancelled { processed });
            }

            let current = self.cache_epoch.load(Ordering::SeqCst);
            if current != epoch {
                session.clear_cache();
                epoch = current;
            }

            let progress = match panic::catch_unwind(AssertUnwindSafe(|| session.run_chunk())) {
                Ok(Ok(progress)) => progress,
                Ok(Err(e)) => return Err(Interrupt::Failed(e.to_string())),
                Err(payload) => return Err(Interrupt::Failed(panic_message(payload.as_ref()))),
            };

            let mut event = ProgressEvent::from_progress(self.kind, &progress, stage.status.clone());
            event.progress = stage.overall(progress.percent);
            self.send(ResponseKind::Progress(event)).await;
            tokio::task::yield_now().await;
        }

        Ok(session.finish())
    }

    async fn monte_carlo(&self, request: MonteCarloRequest) -> Result<ResponseKind, Interrupt> {
        let config = self.session_config(request.chunk_size, None);
        let mut session = MonteCarloSession::new(request.params, config).map_err(|e| Interrupt::Failed(e.to_string()))?;
        let result = self.drive(&mut session, Stage::single()).await?;
        Ok(ResponseKind::MonteCarloResults(Box::new(result)))
    }

    async fn projection(&self, params: SimulationParameters) -> Result<ResponseKind, Interrupt> {
        let run = panic::catch_unwind(AssertUnwindSafe(|| {
            ScenarioRunner::new(params).and_then(|runner| runner.project())
        }));
        match run {
            Ok(Ok(projection)) => Ok(ResponseKind::PortfolioProjections(Box::new(projection))),
            Ok(Err(e)) => Err(Interrupt::Failed(e.to_string())),
            Err(payload) => Err(Interrupt::Failed(panic_message(payload.as_ref()))),
        }
    }

    async fn sensitivity(&self, request: SensitivityRequest) -> Result<ResponseKind, Interrupt> {
        let config = self.session_config(request.chunk_size, None);
        let runner = ScenarioRunner::new(request.params)
            .map_err(|e| Interrupt::Failed(e.to_string()))?
            .with_config(config.clone());

        let cases = runner.sensitivity_cases(&request.parameters, &request.variations);
        let total = cases.len() + 1;

        let mut session =
            MonteCarloSession::new(runner.params().clone(), config.clone()).map_err(|e| Interrupt::Failed(e.to_string()))?;
        let base = self
            .drive(&mut session, Stage::new(0, total, format!("case 1/{}: base", total)))
            .await?;
        let mut cache = session.into_cache();

        let mut points = Vec::with_capacity(cases.len());
        for (i, case) in cases.into_iter().enumerate() {
            let value = case.value();
            let label = format!(
                "case {}/{}: {:?} {:+.0}%",
                i + 2,
                total,
                case.parameter,
                case.variation * 100.0
            );
            let mut session = match MonteCarloSession::new(case.params, config.clone()) {
                Ok(session) => session.with_cache(cache),
                Err(e) => {
                    points.push(SensitivityPoint::invalid(case.parameter, case.variation, value, e.to_string()));
                    continue;
                }
            };
            let result = self.drive(&mut session, Stage::new(i + 1, total, label)).await?;
            cache = session.into_cache();
            points.push(SensitivityPoint::from_result(Some(case.parameter), case.variation, Some(value), &result));
        }

        Ok(ResponseKind::SensitivityResults(SensitivityReport {
            base: SensitivityPoint::from_result(None, 0.0, None, &base),
            points,
        }))
    }

    async fn compare(&self, request: CompareRequest) -> Result<ResponseKind, Interrupt> {
        let seed = request.seed.unwrap_or_else(rand::random);
        let config = self.session_config(request.chunk_size, Some(seed));
        let total = request.scenarios.len();

        let mut summaries: Vec<ScenarioSummary> = Vec::with_capacity(total);
        for (i, scenario) in request.scenarios.into_iter().enumerate() {
            let mut session = MonteCarloSession::new(scenario.params, config.clone())
                .map_err(|e| Interrupt::Failed(format!("scenario `{}`: {}", scenario.name, e)))?;
            let label = format!("scenario {}/{}: {}", i + 1, total, scenario.name);
            let result = self.drive(&mut session, Stage::new(i, total, label)).await?;
            summaries.push(ScenarioSummary::from_result(scenario.name, &result));
        }

        Ok(ResponseKind::ComparisonResults(ComparisonReport {
            scenarios: summaries,
            seed,
        }))
    }
}

async fn run_task(ctx: TaskContext, task: Task) {
    info!("task {} ({:?}) started", ctx.id, ctx.kind);

    let outcome = match task {
        Task::MonteCarlo(request) => ctx.monte_carlo(request).await,
        Task::PortfolioProjections(params) => ctx.projection(params).await,
        Task::SensitivityAnalysis(request) => ctx.sensitivity(request).await,
        Task::CompareScenarios(request) => ctx.compare(request).await,
        Task::ClearCache | Task::Cancel => return,
    };

    let terminal = match outcome {
        Ok(kind) => kind,
        Err(Interrupt::Cancelled { processed }) => {
            warn!("task {} cancelled after {} simulations", ctx.id, processed);
            ResponseKind::Cancelled(CancelledEvent {
                task: ctx.kind,
                processed_simulations: processed,
            })
        }
        Err(Interrupt::Failed(message)) => {
            warn!("task {} failed: {}", ctx.id, message);
            ResponseKind::Error(ErrorEvent {
                message,
                task: ctx.kind,
            })
        }
    };

    ctx.send(terminal).await;
    info!("task {} finished", ctx.id);
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("internal fault: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("internal fault: {}", s)
    } else {
        "internal fault".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(kind: TaskKind, data: serde_json::Value, id: &str) -> Request {
        Request::new(kind, data, id)
    }

    #[tokio::test]
    async fn test_monte_carlo_progress_then_result() {
        let engine = Engine::default();
        let mut handle = engine.submit(request(
            TaskKind::MonteCarlo,
            json!({ "numSimulations": 30, "seed": 5, "chunkSize": 10 }),
            "mc",
        ));

        let mut progress = Vec::new();
        let terminal = loop {
            let event = handle.next_event().await.expect("terminal event");
            match event.kind {
                ResponseKind::Progress(p) => progress.push(p),
                _ => break event,
            }
        };

        assert_eq!(progress.len(), 3);
        assert_eq!(progress[0].current_chunk, Some(1));
        assert_eq!(progress[2].processed_simulations, Some(30));
        assert_eq!(terminal.id, RequestId::from("mc"));
        assert!(terminal.completed_at.is_some());
        match terminal.kind {
            ResponseKind::MonteCarloResults(result) => assert_eq!(result.num_simulations, 30),
            other => panic!("unexpected terminal event {:?}", other),
        }
        assert!(handle.next_event().await.is_none());
    }

    #[tokio::test]
    async fn test_cancel_after_first_chunk() {
        let engine = Engine::default();
        let mut handle = engine.submit(request(
            TaskKind::MonteCarlo,
            json!({ "numSimulations": 200, "seed": 1, "chunkSize": 10 }),
            "job",
        ));

        let first = handle.next_event().await.expect("progress");
        assert!(matches!(first.kind, ResponseKind::Progress(ref p) if p.current_chunk == Some(1)));
        handle.cancel();

        let mut saw_results = false;
        let mut cancelled = None;
        while let Some(event) = handle.next_event().await {
            match event.kind {
                ResponseKind::MonteCarloResults(_) => saw_results = true,
                ResponseKind::Cancelled(c) => cancelled = Some(c),
                _ => {}
            }
        }
        assert!(!saw_results);
        let cancelled = cancelled.expect("cancelled event");
        assert!(cancelled.processed_simulations < 200);
        assert_eq!(cancelled.processed_simulations % 10, 0);
    }

    #[tokio::test]
    async fn test_cancel_request_by_id() {
        let engine = Engine::default();
        let mut handle = engine.submit(request(
            TaskKind::MonteCarlo,
            json!({ "numSimulations": 200, "chunkSize": 10 }),
            "target",
        ));
        handle.next_event().await.expect("progress");

        let ack = engine.submit(request(TaskKind::Cancel, serde_json::Value::Null, "target"));
        assert!(ack.wait().await.is_none());

        let terminal = handle.wait().await.expect("terminal");
        assert!(matches!(terminal.kind, ResponseKind::Cancelled(_)));
    }

    #[tokio::test]
    async fn test_validation_error_event() {
        let engine = Engine::default();
        let handle = engine.submit(request(
            TaskKind::MonteCarlo,
            json!({ "zoneAllocation": { "green": 60, "orange": 30, "red": 11 } }),
            "bad",
        ));

        let terminal = handle.wait().await.expect("terminal");
        match terminal.kind {
            ResponseKind::Error(e) => {
                assert!(e.message.contains("zoneAllocation"), "{}", e.message);
                assert_eq!(e.task, TaskKind::MonteCarlo);
            }
            other => panic!("unexpected terminal event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_clear_cache_acknowledged() {
        let engine = Engine::default();
        let handle = engine.submit(request(TaskKind::ClearCache, serde_json::Value::Null, "cc"));
        let terminal = handle.wait().await.expect("terminal");
        assert!(matches!(terminal.kind, ResponseKind::CacheCleared));
        assert_eq!(engine.cache_epoch.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_cancel_target() {
        let engine = Engine::default();
        let handle = engine.submit(request(TaskKind::Cancel, serde_json::Value::Null, "nobody"));
        let terminal = handle.wait().await.expect("terminal");
        assert!(matches!(terminal.kind, ResponseKind::Error(_)));
    }

    #[tokio::test]
    async fn test_projection_and_comparison() {
        let engine = Engine::default();
        let projection = engine
            .submit(request(TaskKind::PortfolioProjections, json!({ "seed": 3 }), "p"))
            .wait()
            .await
            .expect("terminal");
        match projection.kind {
            ResponseKind::PortfolioProjections(p) => assert_eq!(p.series.len(), 11),
            other => panic!("unexpected terminal event {:?}", other),
        }

        let comparison = engine
            .submit(request(
                TaskKind::CompareScenarios,
                json!({
                    "seed": 9,
                    "chunkSize": 5,
                    "scenarios": [
                        { "name": "base", "params": { "numSimulations": 10 } },
                        { "name": "american", "params": { "numSimulations": 10, "waterfallType": "american" } }
                    ]
                }),
                "cmp",
            ))
            .wait()
            .await
            .expect("terminal");
        match comparison.kind {
            ResponseKind::ComparisonResults(report) => {
                assert_eq!(report.seed, 9);
                assert_eq!(report.scenarios.len(), 2);
                // same seed, same fund-level draws; only the fee split differs
                assert_eq!(
                    report.scenarios[0].statistics.final_value,
                    report.scenarios[1].statistics.final_value
                );
            }
            other => panic!("unexpected terminal event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sensitivity_progress_spans_all_cases() {
        let engine = Engine::default();
        let mut handle = engine.submit(request(
            TaskKind::SensitivityAnalysis,
            json!({
                "params": { "numSimulations": 10, "seed": 4 },
                "parameters": ["interestRate"],
                "variations": [-0.1, 0.1],
                "chunkSize": 5
            }),
            "sens",
        ));

        let mut percents = Vec::new();
        let terminal = loop {
            let event = handle.next_event().await.expect("terminal event");
            match event.kind {
                ResponseKind::Progress(p) => percents.push(p.progress),
                _ => break event,
            }
        };

        // base plus two variations, two chunks each
        assert_eq!(percents.len(), 6);
        assert!(percents.windows(2).all(|w| w[0] < w[1]), "{:?}", percents);
        assert!((percents[1] - 100.0 / 3.0).abs() < 1e-9);
        assert!((percents[5] - 100.0).abs() < 1e-9);
        match terminal.kind {
            ResponseKind::SensitivityResults(report) => assert_eq!(report.points.len(), 2),
            other => panic!("unexpected terminal event {:?}", other),
        }
    }
}
