//! Build orchestration: the message protocol, the staged build and the
//! background worker thread that runs builds off the caller's thread.

use crate::cancel::CancellationToken;
use crate::coefficients::{build_coefficients, MAX_ORDER};
use crate::equation_engine::NativeEngine;
use crate::error::{Result, TaylorError};
use crate::latex::format_latex;
use crate::pipeline::{checkpoint, differentiate};
use crate::sampler::{sample, MAX_SAMPLE_COUNT};
use crate::traits::SymbolicEngine;
use anyhow::{anyhow, Context};
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub const WORKER_THREAD_NAME: &str = "taylor-worker";

/// Stack reserved for the worker thread. The symbolic passes recurse over
/// trees up to [`crate::equation_engine::MAX_EXPRESSION_DEPTH`] deep and grow
/// them with every derivative.
pub const WORKER_STACK_SIZE: usize = 32 * 1024 * 1024;

/// Parameters of one Taylor build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildRequest {
    #[serde(alias = "expr")]
    pub expression: String,
    /// Expansion point.
    pub x0: f64,
    /// Polynomial order.
    pub n: usize,
    pub left: f64,
    pub right: f64,
    /// Number of samples over `[left, right]`.
    pub count: usize,
}

impl BuildRequest {
    /// Identity of the request. Two requests with equal keys produce equal results.
    pub fn key(&self) -> String {
        format!(
            "{}::{}::{}::{}::{}::{}",
            self.expression, self.x0, self.n, self.left, self.right, self.count
        )
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("x0", self.x0), ("left", self.left), ("right", self.right)] {
            if !value.is_finite() {
                return Err(TaylorError::InvalidRequest(format!(
                    "{name} must be finite, got {value}"
                )));
            }
        }
        if self.right <= self.left {
            return Err(TaylorError::InvalidRequest(format!(
                "right ({}) must be greater than left ({})",
                self.right, self.left
            )));
        }
        if self.count < 2 {
            return Err(TaylorError::InvalidRequest(format!(
                "count must be at least 2, got {}",
                self.count
            )));
        }
        if self.count > MAX_SAMPLE_COUNT {
            return Err(TaylorError::InvalidRequest(format!(
                "count {} exceeds the maximum of {MAX_SAMPLE_COUNT}",
                self.count
            )));
        }
        if self.n > MAX_ORDER {
            return Err(TaylorError::InvalidRequest(format!(
                "order {} exceeds the maximum of {MAX_ORDER}",
                self.n
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildResult {
    pub coeffs: Vec<f64>,
    pub xs: Vec<f64>,
    pub yf: Vec<f64>,
    pub yt: Vec<f64>,
    pub latex: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InboundMessage {
    Build(BuildRequest),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutboundMessage {
    Result(BuildResult),
    Error { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Simplify every derivative before differentiating it again.
    pub simplify: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self { simplify: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
    Received,
    Parsing,
    Differentiating,
    CoefficientBuilding,
    Sampling,
    Formatting,
    Delivering,
    Delivered,
    Failed,
}

fn enter(stage: &mut BuildStage, next: BuildStage) {
    trace!("{stage:?} -> {next:?}");
    *stage = next;
}

/// Runs one build on the calling thread.
pub fn run_build<E: SymbolicEngine>(
    engine: &E,
    request: &BuildRequest,
    settings: &EngineSettings,
    token: Option<&CancellationToken>,
) -> Result<BuildResult> {
    let mut stage = BuildStage::Received;
    let outcome = run_stages(engine, request, settings, token, &mut stage);
    if let Err(err) = &outcome {
        debug!("build failed during {stage:?}: {err}");
        enter(&mut stage, BuildStage::Failed);
    }
    outcome
}

fn run_stages<E: SymbolicEngine>(
    engine: &E,
    request: &BuildRequest,
    settings: &EngineSettings,
    token: Option<&CancellationToken>,
    stage: &mut BuildStage,
) -> Result<BuildResult> {
    request.validate()?;

    enter(stage, BuildStage::Parsing);
    let parsed = engine.parse(&request.expression)?;
    checkpoint(token)?;

    enter(stage, BuildStage::Differentiating);
    let chain = differentiate(engine, parsed, request.n, settings.simplify, token)?;

    enter(stage, BuildStage::CoefficientBuilding);
    let coeffs = build_coefficients(&chain, request.x0)?;
    checkpoint(token)?;

    enter(stage, BuildStage::Sampling);
    let samples = sample(
        &chain.original,
        &coeffs,
        request.x0,
        request.left,
        request.right,
        request.count,
    )?;
    checkpoint(token)?;

    enter(stage, BuildStage::Formatting);
    let latex = format_latex(&coeffs, request.x0);

    Ok(BuildResult {
        coeffs,
        xs: samples.xs,
        yf: samples.yf,
        yt: samples.yt,
        latex,
    })
}

/// A request tagged with its sequence number and an optional cancellation token.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub seq: u64,
    pub request: BuildRequest,
    pub token: Option<CancellationToken>,
}

impl Envelope {
    pub fn new(seq: u64, request: BuildRequest) -> Self {
        Self {
            seq,
            request,
            token: None,
        }
    }

    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = Some(token);
        self
    }
}

#[derive(Debug)]
pub enum WorkerCommand {
    Build(Envelope),
    Shutdown,
}

/// Exactly one reply is sent per envelope, carrying the envelope's `seq`.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerReply {
    Result { seq: u64, result: BuildResult },
    Error { seq: u64, message: String },
}

impl WorkerReply {
    pub fn seq(&self) -> u64 {
        match self {
            WorkerReply::Result { seq, .. } | WorkerReply::Error { seq, .. } => *seq,
        }
    }

    pub fn into_message(self) -> OutboundMessage {
        match self {
            WorkerReply::Result { result, .. } => OutboundMessage::Result(result),
            WorkerReply::Error { message, .. } => OutboundMessage::Error { message },
        }
    }
}

/// Runs the envelope's build and turns every outcome, panics included, into a reply.
pub fn process<E: SymbolicEngine>(
    engine: &E,
    settings: &EngineSettings,
    envelope: Envelope,
) -> WorkerReply {
    let Envelope {
        seq,
        request,
        token,
    } = envelope;
    trace!("build #{seq} received: {}", request.key());
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        run_build(engine, &request, settings, token.as_ref())
    }));
    match outcome {
        Ok(Ok(result)) => WorkerReply::Result { seq, result },
        Ok(Err(err)) => WorkerReply::Error {
            seq,
            message: err.to_string(),
        },
        Err(payload) => {
            let message = panic_payload_to_string(payload);
            warn!("build #{seq} panicked: {message}");
            WorkerReply::Error { seq, message }
        }
    }
}

/// Protocol entry point: one inbound message in, one outbound message out.
pub fn handle_message<E: SymbolicEngine>(
    engine: &E,
    message: InboundMessage,
    settings: &EngineSettings,
) -> OutboundMessage {
    match message {
        InboundMessage::Build(request) => {
            process(engine, settings, Envelope::new(0, request)).into_message()
        }
    }
}

fn panic_payload_to_string(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    "Build panicked.".to_string()
}

/// Owned handle to the background build thread.
///
/// Builds run one at a time in posting order. Dropping the handle shuts the
/// thread down and joins it.
pub struct TaylorWorker {
    commands: Sender<WorkerCommand>,
    replies: Receiver<WorkerReply>,
    handle: Option<JoinHandle<()>>,
}

impl TaylorWorker {
    pub fn spawn(settings: EngineSettings) -> anyhow::Result<Self> {
        Self::spawn_with_engine(NativeEngine, settings)
    }

    pub fn spawn_with_engine<E>(engine: E, settings: EngineSettings) -> anyhow::Result<Self>
    where
        E: SymbolicEngine + Send + 'static,
    {
        let (commands, command_rx) = mpsc::channel();
        let (reply_tx, replies) = mpsc::channel();
        let handle = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .stack_size(WORKER_STACK_SIZE)
            .spawn(move || worker_loop(engine, settings, command_rx, reply_tx))
            .context("Failed to spawn the Taylor worker thread")?;
        Ok(Self {
            commands,
            replies,
            handle: Some(handle),
        })
    }

    pub fn post(&self, envelope: Envelope) -> anyhow::Result<()> {
        self.commands
            .send(WorkerCommand::Build(envelope))
            .map_err(|_| anyhow!("Taylor worker has shut down"))
    }

    /// A sender other threads can post envelopes through.
    pub fn poster(&self) -> Sender<WorkerCommand> {
        self.commands.clone()
    }

    pub fn try_recv(&self) -> Option<WorkerReply> {
        self.replies.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<WorkerReply> {
        match self.replies.recv_timeout(timeout) {
            Ok(reply) => Some(reply),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn shutdown(mut self) -> anyhow::Result<()> {
        self.stop()
    }

    fn stop(&mut self) -> anyhow::Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        // The thread may already be gone; joining still reports how it ended.
        let _ = self.commands.send(WorkerCommand::Shutdown);
        handle.join().map_err(|payload| {
            anyhow!(
                "Taylor worker thread panicked: {}",
                panic_payload_to_string(payload)
            )
        })
    }
}

impl Drop for TaylorWorker {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            warn!("{err:#}");
        }
    }
}

fn worker_loop<E: SymbolicEngine>(
    engine: E,
    settings: EngineSettings,
    commands: Receiver<WorkerCommand>,
    replies: Sender<WorkerReply>,
) {
    debug!("{WORKER_THREAD_NAME} started");
    while let Ok(command) = commands.recv() {
        let envelope = match command {
            WorkerCommand::Build(envelope) => envelope,
            WorkerCommand::Shutdown => break,
        };
        let reply = process(&engine, &settings, envelope);
        let seq = reply.seq();
        let last = match reply {
            WorkerReply::Result { .. } => BuildStage::Delivered,
            WorkerReply::Error { .. } => BuildStage::Failed,
        };
        trace!("build #{seq}: {:?}", BuildStage::Delivering);
        if replies.send(reply).is_err() {
            debug!("reply receiver dropped; stopping {WORKER_THREAD_NAME}");
            break;
        }
        trace!("build #{seq}: {last:?}");
    }
    debug!("{WORKER_THREAD_NAME} stopped");
}
