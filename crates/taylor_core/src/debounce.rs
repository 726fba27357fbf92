//! Caller-facing request hook: dedup by request key, settle-window debouncing
//! and the latest result/error pair.

use crate::worker::{
    BuildRequest, BuildResult, EngineSettings, Envelope, TaylorWorker, WorkerCommand, WorkerReply,
};
use anyhow::{anyhow, Context};
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub const DEFAULT_DEBOUNCE_MS: u64 = 220;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HookSettings {
    /// Quiet time after the last parameter change before a build is posted.
    pub debounce_ms: u64,
    pub engine: EngineSettings,
}

impl Default for HookSettings {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            engine: EngineSettings::default(),
        }
    }
}

/// Collapses bursts of scheduled values into one delivery per settle window.
///
/// Every `schedule` restarts the window and replaces the pending value. When
/// the window passes quietly the pending value is handed to the delivery
/// callback on the debouncer's own thread. Pending values are discarded on
/// shutdown.
pub struct Debouncer<T: Send + 'static> {
    sender: Option<Sender<T>>,
    handle: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> Debouncer<T> {
    pub fn spawn<F>(window: Duration, mut deliver: F) -> anyhow::Result<Self>
    where
        F: FnMut(T) + Send + 'static,
    {
        let (sender, inbox) = mpsc::channel::<T>();
        let handle = thread::Builder::new()
            .name("taylor-debounce".to_string())
            .spawn(move || {
                let mut pending: Option<(T, Instant)> = None;
                loop {
                    let Some((value, deadline)) = pending.take() else {
                        match inbox.recv() {
                            Ok(value) => pending = Some((value, Instant::now() + window)),
                            Err(_) => break,
                        }
                        continue;
                    };
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    match inbox.recv_timeout(remaining) {
                        Ok(newer) => pending = Some((newer, Instant::now() + window)),
                        Err(RecvTimeoutError::Timeout) => deliver(value),
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })
            .context("Failed to spawn the debounce thread")?;
        Ok(Self {
            sender: Some(sender),
            handle: Some(handle),
        })
    }

    pub fn schedule(&self, value: T) -> anyhow::Result<()> {
        self.sender
            .as_ref()
            .ok_or_else(|| anyhow!("Debouncer has shut down"))?
            .send(value)
            .map_err(|_| anyhow!("Debounce thread is gone"))
    }

    pub fn shutdown(mut self) -> anyhow::Result<()> {
        self.stop()
    }

    fn stop(&mut self) -> anyhow::Result<()> {
        self.sender = None;
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| anyhow!("Debounce thread panicked")),
            None => Ok(()),
        }
    }
}

impl<T: Send + 'static> Drop for Debouncer<T> {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            warn!("{err:#}");
        }
    }
}

/// Latest outcome seen by the hook. An error keeps the previous data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HookState {
    pub data: Option<BuildResult>,
    pub error: Option<String>,
}

/// Fields drop in order: the debouncer (which posts to the worker) goes first.
struct Runtime {
    debouncer: Debouncer<BuildRequest>,
    worker: TaylorWorker,
}

impl Runtime {
    fn start(settings: &HookSettings) -> anyhow::Result<Self> {
        let worker = TaylorWorker::spawn(settings.engine.clone())?;
        let poster: Sender<WorkerCommand> = worker.poster();
        let mut seq = 0u64;
        let debouncer = Debouncer::spawn(
            Duration::from_millis(settings.debounce_ms),
            move |request: BuildRequest| {
                seq += 1;
                debug!("posting build #{seq}: {}", request.key());
                let envelope = Envelope::new(seq, request);
                if poster.send(WorkerCommand::Build(envelope)).is_err() {
                    warn!("Taylor worker is gone; build #{seq} dropped");
                }
            },
        )?;
        Ok(Self { debouncer, worker })
    }
}

/// Debounced façade over a [`TaylorWorker`].
///
/// The worker and the debounce thread start on the first
/// [`set_params`](Self::set_params) and stop on [`dispose`](Self::dispose) or
/// drop. Replies are applied only if their sequence number is newer than the
/// last applied one.
pub struct DebouncedTaylor {
    settings: HookSettings,
    runtime: Option<Runtime>,
    last_key: Option<String>,
    last_applied_seq: u64,
    state: HookState,
}

impl DebouncedTaylor {
    pub fn new(settings: HookSettings) -> Self {
        Self {
            settings,
            runtime: None,
            last_key: None,
            last_applied_seq: 0,
            state: HookState::default(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.runtime.is_some()
    }

    pub fn state(&self) -> &HookState {
        &self.state
    }

    pub fn data(&self) -> Option<&BuildResult> {
        self.state.data.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.state.error.as_deref()
    }

    /// Schedules a build for `request` unless it matches the last scheduled one.
    pub fn set_params(&mut self, request: BuildRequest) -> anyhow::Result<()> {
        let key = request.key();
        if self.last_key.as_deref() == Some(key.as_str()) {
            trace!("unchanged request {key}");
            return Ok(());
        }
        self.runtime()?.debouncer.schedule(request)?;
        self.last_key = Some(key);
        Ok(())
    }

    /// Applies every reply that has already arrived. True if the state changed.
    pub fn poll(&mut self) -> bool {
        let mut changed = false;
        while let Some(reply) = self.runtime.as_ref().and_then(|r| r.worker.try_recv()) {
            changed |= self.apply(reply);
        }
        changed
    }

    /// Blocks until a reply changes the state or `timeout` passes.
    pub fn wait_for_update(&mut self, timeout: Duration) -> bool {
        if self.poll() {
            return true;
        }
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            let Some(reply) = self
                .runtime
                .as_ref()
                .and_then(|r| r.worker.recv_timeout(remaining))
            else {
                return false;
            };
            if self.apply(reply) {
                return true;
            }
        }
    }

    /// Stops both threads. A pending, not yet posted request is discarded.
    pub fn dispose(&mut self) {
        if self.runtime.take().is_some() {
            debug!("debounced Taylor hook disposed");
        }
        self.last_key = None;
        self.last_applied_seq = 0;
    }

    fn runtime(&mut self) -> anyhow::Result<&Runtime> {
        let runtime = match self.runtime.take() {
            Some(runtime) => runtime,
            None => Runtime::start(&self.settings)?,
        };
        Ok(self.runtime.insert(runtime))
    }

    fn apply(&mut self, reply: WorkerReply) -> bool {
        let seq = reply.seq();
        if seq <= self.last_applied_seq {
            debug!("ignoring stale reply #{seq}");
            return false;
        }
        self.last_applied_seq = seq;
        match reply {
            WorkerReply::Result { result, .. } => {
                self.state.data = Some(result);
                self.state.error = None;
            }
            WorkerReply::Error { message, .. } => {
                self.state.error = Some(message);
            }
        }
        true
    }
}

impl Default for DebouncedTaylor {
    fn default() -> Self {
        Self::new(HookSettings::default())
    }
}
