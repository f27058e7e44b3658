//! JavaScript sandbox runtime
//!
//! Each scraper execution gets a brand new interpreter on a dedicated thread
//! (V8 isolates are single-threaded). The thread runs a current-thread tokio
//! runtime inside a `LocalSet` and reports back over a oneshot channel, which
//! bridges the multi-threaded orchestrator and the `!Send` `JsRuntime`.
//!
//! An execution never fails from the caller's point of view: every error path
//! ends in an [`ExecutionOutcome`] with an empty result list.

use async_trait::async_trait;
use deno_core::JsRuntime;
use serde_json::Value;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, info, info_span, warn, Instrument};

use super::crypto::CryptoLibrary;
use super::http::BridgeHttp;
use super::js_bindings::{create_js_runtime_with_bindings, invoke_script, settings_script, wrap_module, BridgeState};
use super::normalizer::normalize;
use super::sandbox::{CaptureSlot, Captured, ExecutionPhase, InFlightCalls, ResourceLimits, Watchdog};
use super::types::{ExecutionStatus, MediaRequest, ScraperResult};
use crate::core::config::ScraperConfig;
use crate::core::error::{Result, ScraperError};

/// Everything needed to run one scraper once
#[derive(Debug, Clone)]
pub struct ScriptInvocation {
    pub scraper_id: String,
    pub scraper_name: String,
    pub source: Arc<str>,
    pub settings: Value,
    pub request: MediaRequest,
}

/// Normalized outcome of one execution
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub status: ExecutionStatus,
    pub results: Vec<ScraperResult>,
    pub elapsed: Duration,
}

impl ExecutionOutcome {
    pub fn empty(status: ExecutionStatus, elapsed: Duration) -> Self {
        Self {
            status,
            results: Vec::new(),
            elapsed,
        }
    }
}

/// Executes scraper source code
///
/// The orchestrator depends on this seam rather than on the interpreter, so
/// it can be driven by a scripted runner in tests.
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    async fn run(&self, invocation: ScriptInvocation) -> ExecutionOutcome;
}

/// Interpreter-backed [`ScriptRunner`]
pub struct SandboxRuntime {
    http: BridgeHttp,
    crypto: Arc<CryptoLibrary>,
    limits: ResourceLimits,
}

impl SandboxRuntime {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let http = BridgeHttp::new(&config.user_agent, config.fetch_timeout(), config.max_response_size)?;
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ScraperError::Network(format!("Failed to build HTTP client: {}", e)))?;
        let crypto = CryptoLibrary::new(config.crypto_library.clone(), client);

        Ok(Self::with_parts(
            http,
            Arc::new(crypto),
            ResourceLimits::new(config.execution_timeout()),
        ))
    }

    pub fn with_parts(http: BridgeHttp, crypto: Arc<CryptoLibrary>, limits: ResourceLimits) -> Self {
        Self { http, crypto, limits }
    }

}

#[async_trait]
impl ScriptRunner for SandboxRuntime {
    async fn run(&self, invocation: ScriptInvocation) -> ExecutionOutcome {
        let start = Instant::now();
        let crypto_script = self.crypto.source().await.install_script();

        let job = SandboxJob {
            scraper_id: invocation.scraper_id.clone(),
            source: Arc::clone(&invocation.source),
            settings: invocation.settings.clone(),
            request: invocation.request.clone(),
            crypto_script,
            http: self.http.clone(),
            limits: self.limits.clone(),
        };

        let (tx, rx) = oneshot::channel();
        let spawned = thread::Builder::new()
            .name(format!("scraper-{}", invocation.scraper_id))
            .spawn(move || {
                let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                    Ok(rt) => rt,
                    Err(e) => {
                        warn!(error = %e, "Failed to create sandbox runtime");
                        let _ = tx.send(RawOutcome::failed());
                        return;
                    }
                };
                let local = tokio::task::LocalSet::new();
                let span = info_span!("scraper", scraper_id = %job.scraper_id);
                let outcome = local.block_on(&rt, execute(job).instrument(span));
                let _ = tx.send(outcome);
            });

        if let Err(e) = spawned {
            warn!(scraper_id = %invocation.scraper_id, error = %e, "Failed to spawn sandbox thread");
            return ExecutionOutcome::empty(ExecutionStatus::Failed, start.elapsed());
        }

        let raw = rx.await.unwrap_or_else(|_| {
            warn!(scraper_id = %invocation.scraper_id, "Sandbox thread exited without reporting");
            RawOutcome::failed()
        });

        let results = match raw.status {
            ExecutionStatus::Completed => normalize(&raw.payload, &invocation.scraper_id, &invocation.scraper_name),
            _ => Vec::new(),
        };
        let elapsed = start.elapsed();

        info!(
            scraper_id = %invocation.scraper_id,
            media_id = %invocation.request.media_id,
            status = ?raw.status,
            results = results.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Scraper execution finished"
        );

        ExecutionOutcome {
            status: raw.status,
            results,
            elapsed,
        }
    }
}

/// Work shipped to the sandbox thread
struct SandboxJob {
    scraper_id: String,
    source: Arc<str>,
    settings: Value,
    request: MediaRequest,
    crypto_script: String,
    http: BridgeHttp,
    limits: ResourceLimits,
}

/// Status plus the raw captured JSON
struct RawOutcome {
    status: ExecutionStatus,
    payload: String,
}

impl RawOutcome {
    fn failed() -> Self {
        Self {
            status: ExecutionStatus::Failed,
            payload: "[]".to_string(),
        }
    }
}

async fn execute(job: SandboxJob) -> RawOutcome {
    let mut phase = ExecutionPhase::Idle;

    let mut runtime = match create_js_runtime_with_bindings(&job.limits) {
        Ok(runtime) => runtime,
        Err(e) => {
            warn!(error = %e, "Failed to create interpreter");
            return RawOutcome::failed();
        }
    };

    // Fresh arena and call set; nothing carries over from earlier executions
    let bridge = BridgeState::new(&job.scraper_id, job.http.clone());
    let calls = bridge.calls.clone();
    let capture = bridge.capture.clone();
    runtime.op_state().borrow_mut().put(bridge);

    let watchdog = match Watchdog::arm(
        &job.scraper_id,
        job.limits.execution_timeout,
        runtime.v8_isolate().thread_safe_handle(),
        calls.clone(),
    ) {
        Ok(watchdog) => watchdog,
        Err(e) => {
            warn!(error = %e, "Failed to arm execution watchdog");
            return RawOutcome::failed();
        }
    };

    let driven = drive(&mut runtime, &job, &calls, &capture, &mut phase).await;
    let timed_out = watchdog.disarm();

    // Cleanup runs on every path
    capture.close();
    let cancelled = calls.cancel_all();
    if let Some(bridge) = runtime.op_state().borrow_mut().try_borrow_mut::<BridgeState>() {
        bridge.dom.reset();
    }
    if cancelled > 0 {
        debug!(cancelled_calls = cancelled, "Cancelled outstanding bridge calls");
    }
    let last_phase = phase;
    phase = ExecutionPhase::Terminated;
    debug!(phase = %phase, "Sandbox terminated");

    // A value captured before the deadline wins over the timeout
    match capture.take() {
        Some(Captured::Resolved(payload)) => RawOutcome {
            status: ExecutionStatus::Completed,
            payload,
        },
        Some(Captured::Missing) => {
            debug!("Scraper exposes no getStreams entry point");
            RawOutcome {
                status: ExecutionStatus::Completed,
                payload: "[]".to_string(),
            }
        }
        Some(Captured::Rejected(message)) => {
            let err = ScraperError::ExecutionFailure(message);
            warn!(error = %err, error_type = err.error_type(), "Scraper entry point failed");
            RawOutcome::failed()
        }
        None if timed_out => {
            warn!(phase = %last_phase, "Execution timed out");
            RawOutcome {
                status: ExecutionStatus::TimedOut,
                payload: "[]".to_string(),
            }
        }
        None => {
            let err = match driven {
                Err(e) => e,
                Ok(()) => ScraperError::ExecutionFailure("entry point never settled".to_string()),
            };
            warn!(phase = %last_phase, error = %err, error_type = err.error_type(), "Scraper execution failed");
            RawOutcome::failed()
        }
    }
}

/// Walk the execution through its phases up to capture
///
/// The entry point settling ends the execution; timers or fetches it left
/// behind are cancelled rather than awaited.
async fn drive(
    runtime: &mut JsRuntime,
    job: &SandboxJob,
    calls: &InFlightCalls,
    capture: &CaptureSlot,
    phase: &mut ExecutionPhase,
) -> Result<()> {
    let failure = |stage: &str, e: anyhow::Error| ScraperError::ExecutionFailure(format!("{}: {}", stage, e));

    *phase = ExecutionPhase::Initializing;
    debug!(phase = %phase, "Sandbox phase");
    runtime
        .execute_script("<crypto>", job.crypto_script.clone().into())
        .map_err(|e| failure("crypto library", e))?;
    runtime
        .execute_script("<settings>", settings_script(&job.scraper_id, &job.settings).into())
        .map_err(|e| failure("settings", e))?;

    *phase = ExecutionPhase::Loading;
    debug!(phase = %phase, bytes = job.source.len(), "Sandbox phase");
    runtime
        .execute_script("<scraper>", wrap_module(&job.source).into())
        .map_err(|e| failure("load", e))?;

    *phase = ExecutionPhase::Invoking;
    debug!(phase = %phase, media_id = %job.request.media_id, "Sandbox phase");
    let invoke = invoke_script(
        &job.request.media_id,
        job.request.media_type.as_str(),
        job.request.season,
        job.request.episode,
    );
    runtime
        .execute_script("<invoke>", invoke.into())
        .map_err(|e| failure("invoke", e))?;

    tokio::select! {
        biased;
        _ = capture.filled() => {
            let abandoned = calls.cancel_all();
            if abandoned > 0 {
                debug!(abandoned_calls = abandoned, "Entry point settled with calls still pending");
            }
        }
        _ = calls.cancelled() => {
            return Err(ScraperError::Timeout("execution deadline reached".to_string()));
        }
        result = runtime.run_event_loop(Default::default()) => {
            result.map_err(|e| failure("event loop", e))?;
        }
    }

    *phase = ExecutionPhase::Capturing;
    debug!(phase = %phase, "Sandbox phase");
    Ok(())
}
