use crate::concurrency::DeviceLock;
use crate::config::EngineConfig;
use crate::lifecycle::{validate_transition, RunState};
use crate::plan::{self, Preflight, Stage, StageWork};
use crate::workspace::RunWorkspace;
use crate::CoreError;
use spindle_runtime::{
    select_executor, CancelReason, CancelToken, ExecOutcome, RuntimeError, ToolExecutor,
    ToolInvocation,
};
use spindle_schema::{
    classify, generate_run_id, Failure, FailureKind, OperationRequest, OutputEvent, Phase,
    ProgressSnapshot, RunId, Tool, ValidationError,
};
use spindle_telemetry::{parser_for, tail_until, LineParser, LogTailer};
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Runs operations as pipelines of stages.
///
/// The engine itself is stateless between runs: each call to [`Engine::run`]
/// or [`Engine::start`] owns its own snapshot, workspace and device locks.
#[derive(Clone)]
pub struct Engine {
    config: EngineConfig,
    executor: Arc<dyn ToolExecutor>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("executor", &self.executor.name())
            .finish()
    }
}

impl Engine {
    /// Build an engine with the executor named in `config`.
    pub fn new(config: EngineConfig) -> Result<Self, CoreError> {
        let executor = select_executor(config.executor.name(), &config.executor_settings())?;
        Ok(Self {
            config,
            executor: Arc::from(executor),
        })
    }

    pub fn with_executor(config: EngineConfig, executor: Arc<dyn ToolExecutor>) -> Self {
        Self { config, executor }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn executor_name(&self) -> &str {
        self.executor.name()
    }

    /// Run `request` to completion on the calling thread.
    ///
    /// `observer` sees every intermediate snapshot in order, ending with the
    /// terminal one, which is also returned. Failures never surface as `Err`:
    /// the terminal phase is either `Completed` or `Failed`.
    pub fn run<F>(
        &self,
        request: &OperationRequest,
        cancel: &CancelToken,
        mut observer: F,
    ) -> ProgressSnapshot
    where
        F: FnMut(&ProgressSnapshot),
    {
        let snapshot = initial_snapshot(request);
        self.execute(request, snapshot, cancel, &mut observer)
    }

    /// Run `request` on its own thread.
    pub fn start(&self, request: OperationRequest, cancel: CancelToken) -> RunHandle {
        let initial = initial_snapshot(&request);
        let run_id = initial.run_id.clone();
        let latest = Arc::new(Mutex::new(initial.clone()));
        let (tx, rx) = mpsc::channel();

        let engine = self.clone();
        let shared = Arc::clone(&latest);
        let token = cancel.clone();
        let spawned = thread::Builder::new()
            .name(format!("spindle-{run_id}"))
            .spawn(move || {
                let mut publish = |snapshot: &ProgressSnapshot| {
                    if let Ok(mut latest) = shared.lock() {
                        *latest = snapshot.clone();
                    }
                    let _ = tx.send(snapshot.clone());
                };
                engine.execute(&request, initial, &token, &mut publish)
            });

        let thread = match spawned {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("run {run_id}: cannot start run thread: {e}");
                if let Ok(mut latest) = latest.lock() {
                    latest.phase = Phase::Failed(infrastructure(format!(
                        "cannot start run thread: {e}"
                    )));
                }
                None
            }
        };

        RunHandle {
            run_id,
            latest,
            updates: rx,
            cancel,
            thread,
        }
    }

    fn execute(
        &self,
        request: &OperationRequest,
        snapshot: ProgressSnapshot,
        cancel: &CancelToken,
        observer: &mut dyn FnMut(&ProgressSnapshot),
    ) -> ProgressSnapshot {
        info!(
            "run {}: {} on {}",
            snapshot.run_id,
            request.kind(),
            request.primary_device()
        );
        let mut run = Run {
            config: &self.config,
            executor: self.executor.as_ref(),
            cancel,
            state: RunState::new(snapshot),
            observer,
        };
        let outcome = run.drive(request);
        run.finish(outcome)
    }
}

fn initial_snapshot(request: &OperationRequest) -> ProgressSnapshot {
    let device = request.primary_device();
    let identity = generate_run_id(request.kind(), device);
    debug!("run {} digest {}", identity.run_id, identity.digest);
    ProgressSnapshot::new(identity.run_id, request.kind(), Some(device.clone()))
}

/// A run started with [`Engine::start`].
///
/// Dropping an unfinished handle cancels the run and waits for it to clean up.
#[derive(Debug)]
pub struct RunHandle {
    run_id: RunId,
    latest: Arc<Mutex<ProgressSnapshot>>,
    updates: mpsc::Receiver<ProgressSnapshot>,
    cancel: CancelToken,
    thread: Option<JoinHandle<ProgressSnapshot>>,
}

impl RunHandle {
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Most recent snapshot.
    pub fn latest(&self) -> ProgressSnapshot {
        self.latest
            .lock()
            .map(|snapshot| snapshot.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Every snapshot the run publishes, in order. Blocks between snapshots and
    /// ends after the terminal one.
    pub fn updates(&self) -> mpsc::Iter<'_, ProgressSnapshot> {
        self.updates.iter()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Block until the run ends and return its terminal snapshot.
    pub fn wait(mut self) -> ProgressSnapshot {
        let Some(thread) = self.thread.take() else {
            return self.latest();
        };
        match thread.join() {
            Ok(snapshot) => snapshot,
            Err(_) => {
                warn!("run {}: run thread panicked", self.run_id);
                let mut snapshot = self.latest();
                if !snapshot.is_terminal() {
                    snapshot.phase = Phase::Failed(infrastructure("run thread panicked"));
                }
                snapshot
            }
        }
    }
}

impl Drop for RunHandle {
    fn drop(&mut self) {
        if let Some(thread) = self.thread.take() {
            if !thread.is_finished() {
                debug!("run {}: handle dropped, cancelling", self.run_id);
                self.cancel.cancel();
            }
            let _ = thread.join();
        }
    }
}

/// What the stage threads report back to the run loop.
enum StageMessage {
    Lines(Vec<String>),
    Exited(Result<ExecOutcome, RuntimeError>),
}

/// Per-run context. Lives for exactly one call to `Engine::execute`.
struct Run<'a> {
    config: &'a EngineConfig,
    executor: &'a dyn ToolExecutor,
    cancel: &'a CancelToken,
    state: RunState,
    observer: &'a mut dyn FnMut(&ProgressSnapshot),
}

impl Run<'_> {
    fn run_id(&self) -> RunId {
        self.state.snapshot().run_id.clone()
    }

    fn emit(&mut self) {
        self.state.touch();
        (self.observer)(self.state.snapshot());
    }

    fn enter(&mut self, phase: Phase) -> Result<(), Failure> {
        self.state
            .transition(phase)
            .map_err(|e| infrastructure(e.to_string()))?;
        self.emit();
        Ok(())
    }

    /// Stop here if the caller cancelled or the deadline passed.
    fn checkpoint(&self) -> Result<(), Failure> {
        match self.cancel.reason() {
            Some(reason) => Err(cancellation(reason)),
            None => Ok(()),
        }
    }

    fn note_cancel(&mut self) {
        if self.cancel.is_cancelled()
            && self.state.phase().is_active()
            && *self.state.phase() != Phase::Cancelling
            && self.state.transition(Phase::Cancelling).is_ok()
        {
            info!("run {}: cancelling", self.run_id());
            self.emit();
        }
    }

    fn drive(&mut self, request: &OperationRequest) -> Result<(), Failure> {
        self.enter(Phase::Preparing)?;
        self.checkpoint()?;

        request.validate().map_err(rejected)?;
        let preflight = plan::preflight(request).map_err(rejected)?;
        for warning in &preflight.warnings {
            warn!("run {}: {warning}", self.run_id());
            self.state.warn(warning.as_str());
        }

        let _locks = self.lock_devices(request)?;
        self.checkpoint()?;

        let workspace = RunWorkspace::create(
            &self.run_id(),
            &self.config.temp_root,
            &self.config.log_dir,
        )
        .map_err(|e| infrastructure(format!("cannot create run workspace: {e}")))?;

        let result = self.run_stages(request, &workspace, &preflight);

        match (result, workspace.cleanup()) {
            (Ok(()), Ok(())) => Ok(()),
            (Ok(()), Err(e)) => Err(infrastructure(format!("cleanup failed: {e}"))),
            (Err(failure), Err(e)) => {
                warn!("run {}: cleanup after failure: {e}", self.run_id());
                Err(failure)
            }
            (Err(failure), Ok(())) => Err(failure),
        }
    }

    fn lock_devices(&self, request: &OperationRequest) -> Result<Vec<DeviceLock>, Failure> {
        let mut locks = Vec::new();
        for device in request.devices() {
            match DeviceLock::try_acquire(&self.config.lock_dir, device) {
                Ok(Some(lock)) => locks.push(lock),
                Ok(None) => {
                    return Err(Failure::new(
                        FailureKind::DeviceBusy,
                        format!("device {device} is in use by another run"),
                    ))
                }
                Err(e) => return Err(infrastructure(format!("cannot lock device {device}: {e}"))),
            }
        }
        Ok(locks)
    }

    fn run_stages(
        &mut self,
        request: &OperationRequest,
        workspace: &RunWorkspace,
        preflight: &Preflight,
    ) -> Result<(), Failure> {
        if let OperationRequest::Extract(extract) = request {
            std::fs::create_dir_all(&extract.destination).map_err(|e| {
                infrastructure(format!(
                    "cannot create {}: {e}",
                    extract.destination.display()
                ))
            })?;
        }

        let mut stages = plan::build_plan(request, workspace, preflight);
        let count = stages.len() as u32;
        for (index, stage) in stages.iter_mut().enumerate() {
            self.checkpoint()?;
            if let Some(warning) = stage.check_capacity().map_err(rejected)? {
                warn!("run {}: {warning}", self.run_id());
                self.state.warn(warning.as_str());
            }
            self.begin(index as u32 + 1, count, stage);
            match &stage.work {
                StageWork::CopyFiles(sources) => {
                    self.stage_files(sources, &workspace.staging_dir())?;
                }
                StageWork::RunTool {
                    tool,
                    args,
                    working_dir,
                } => self.run_tool(*tool, args, working_dir, workspace)?,
            }
        }
        Ok(())
    }

    fn begin(&mut self, index: u32, count: u32, stage: &Stage) {
        let expected = stage
            .sized_by
            .as_deref()
            .and_then(plan::file_megabytes)
            .or(stage.expected_total);
        info!(
            "run {}: stage {index}/{count} {}",
            self.run_id(),
            stage.name
        );
        self.state
            .begin_stage(index, count, stage.name, stage.unit, expected);
        // Parsed output may already have moved past this stage's entry phase.
        let snapshot = self.state.snapshot();
        if validate_transition(snapshot.operation, &snapshot.phase, &stage.entry).is_ok() {
            let _ = self.state.transition(stage.entry.clone());
        } else {
            debug!("stage {} starts in {}", stage.name, snapshot.phase);
        }
        self.emit();
    }

    fn stage_files(&mut self, sources: &[PathBuf], staging: &Path) -> Result<(), Failure> {
        let copies = staging_pairs(sources, staging)
            .map_err(|e| infrastructure(format!("cannot prepare staging directory: {e}")))?;
        let total: u64 = copies.iter().map(|(src, _)| plan::tree_size(src)).sum();
        let mut copied = 0u64;
        for (src, dst) in copies {
            self.checkpoint()?;
            copied += std::fs::copy(&src, &dst).map_err(|e| {
                infrastructure(format!("cannot stage {}: {e}", src.display()))
            })?;
            if self.state.apply(&OutputEvent::progress(copied, total)) {
                self.emit();
            }
        }
        debug!("run {}: staged {copied} bytes", self.run_id());
        Ok(())
    }

    /// One subprocess stage: the executor runs the tool on one scoped thread,
    /// the tailer follows the log on another, and this thread applies parsed
    /// lines in file order until both are done.
    fn run_tool(
        &mut self,
        tool: Tool,
        args: &[String],
        working_dir: &Path,
        workspace: &RunWorkspace,
    ) -> Result<(), Failure> {
        workspace
            .reset_log()
            .map_err(|e| infrastructure(format!("cannot create log file: {e}")))?;
        let tailer = LogTailer::start(workspace.log_path())
            .map_err(|e| infrastructure(e.to_string()))?;
        let invocation = ToolInvocation {
            tool,
            program: self.config.tools.program(tool).to_owned(),
            args: args.to_vec(),
            working_dir: working_dir.to_path_buf(),
            log_path: workspace.log_path().to_path_buf(),
        };
        info!("run {}: {}", self.run_id(), invocation.command_line());

        let parser = parser_for(tool);
        let poll = self.config.poll_interval();
        let executor = self.executor;
        let cancel = self.cancel;
        let stop = AtomicBool::new(false);
        let mut tail = VecDeque::with_capacity(self.config.tail_lines);

        let exited = thread::scope(|scope| {
            let (tx, rx) = mpsc::channel();
            let lines_tx = tx.clone();
            let stop = &stop;
            let invocation = &invocation;

            scope.spawn(move || {
                tail_until(tailer, poll, stop, |lines| {
                    let _ = lines_tx.send(StageMessage::Lines(lines));
                });
            });
            scope.spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    executor.invoke(invocation, cancel)
                }))
                .unwrap_or_else(|_| Err(RuntimeError::ExecFailed("executor panicked".to_owned())));
                stop.store(true, Ordering::SeqCst);
                let _ = tx.send(StageMessage::Exited(result));
            });

            let mut exited = None;
            loop {
                match rx.recv_timeout(poll) {
                    Ok(StageMessage::Lines(lines)) => self.consume(parser, lines, &mut tail),
                    Ok(StageMessage::Exited(result)) => exited = Some(result),
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }
                if exited.is_none() {
                    self.note_cancel();
                }
            }
            exited
        });

        let result = exited.unwrap_or_else(|| {
            Err(RuntimeError::ExecFailed("executor did not report".to_owned()))
        });

        if let Some(reason) = self.cancel.reason() {
            if let Ok(outcome) = &result {
                debug!(
                    "{tool} stopped with exit code {} (cancelled: {})",
                    outcome.exit_code, outcome.cancelled
                );
            }
            return Err(cancellation(reason));
        }

        let outcome = result.map_err(|e| infrastructure(format!("{tool} could not run: {e}")))?;
        if outcome.is_success() {
            debug!("{tool} finished");
            return Ok(());
        }

        let mut stderr = tail.iter().cloned().collect::<Vec<_>>().join("\n");
        if let Some(text) = &outcome.error_text {
            stderr.push('\n');
            stderr.push_str(text);
        }
        let error = classify(tool, outcome.exit_code, &stderr);
        warn!(
            "run {}: {tool} exited with code {}: {error}",
            self.run_id(),
            outcome.exit_code
        );
        for line in &tail {
            warn!("  {line}");
        }
        Err(Failure::tool(error))
    }

    /// Apply a batch in file order, publishing after every line that changed
    /// the snapshot so no intermediate phase is lost.
    fn consume(&mut self, parser: &dyn LineParser, lines: Vec<String>, tail: &mut VecDeque<String>) {
        for line in lines {
            let mut changed = false;
            for event in parser.parse_line(&line) {
                changed |= self.state.apply(&event);
            }
            if changed {
                self.emit();
            }
            if tail.len() >= self.config.tail_lines {
                tail.pop_front();
            }
            tail.push_back(line);
        }
    }

    /// Move to the terminal phase and publish it.
    fn finish(mut self, outcome: Result<(), Failure>) -> ProgressSnapshot {
        let run_id = self.run_id();
        let terminal = match outcome {
            Ok(()) if *self.state.phase() != Phase::Cancelling => Phase::Completed,
            Ok(()) => Phase::Failed(self.cancel.reason().map_or_else(Failure::cancelled, cancellation)),
            Err(failure) if *self.state.phase() == Phase::Cancelling && !failure.is_cancellation() => {
                warn!("run {run_id}: {failure} while cancelling");
                Phase::Failed(self.cancel.reason().map_or_else(Failure::cancelled, cancellation))
            }
            Err(failure) => {
                if failure.is_cancellation() {
                    self.note_cancel();
                }
                Phase::Failed(failure)
            }
        };

        match &terminal {
            Phase::Failed(failure) => info!("run {run_id}: failed: {failure}"),
            _ => info!("run {run_id}: completed"),
        }
        if let Err(e) = self.state.transition(terminal) {
            warn!("run {run_id}: {e}");
        }
        self.emit();
        self.state.into_snapshot()
    }
}

/// Source files paired with their place under `staging`. Directories are
/// created as they are found.
fn staging_pairs(sources: &[PathBuf], staging: &Path) -> std::io::Result<Vec<(PathBuf, PathBuf)>> {
    fn walk(src: &Path, dst: &Path, out: &mut Vec<(PathBuf, PathBuf)>) -> std::io::Result<()> {
        if src.is_dir() {
            std::fs::create_dir_all(dst)?;
            for entry in std::fs::read_dir(src)? {
                let entry = entry?;
                walk(&entry.path(), &dst.join(entry.file_name()), out)?;
            }
        } else {
            out.push((src.to_path_buf(), dst.to_path_buf()));
        }
        Ok(())
    }

    std::fs::create_dir_all(staging)?;
    let mut out = Vec::new();
    for source in sources {
        let name = source
            .file_name()
            .map_or_else(|| "source".into(), std::ffi::OsStr::to_os_string);
        walk(source, &staging.join(name), &mut out)?;
    }
    Ok(out)
}

fn infrastructure(message: impl Into<String>) -> Failure {
    Failure::new(FailureKind::Infrastructure, message)
}

fn rejected(error: ValidationError) -> Failure {
    Failure::new(FailureKind::Validation, error.to_string())
}

fn cancellation(reason: CancelReason) -> Failure {
    match reason {
        CancelReason::Requested => Failure::cancelled(),
        CancelReason::DeadlineExceeded => Failure::timed_out(),
    }
}
