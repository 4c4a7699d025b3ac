//! Supervisor event loop
//!
//! A single task owns the child and every piece of lifecycle state. It reacts
//! to child output, child exit, one scheduled action, one force-kill deadline
//! and commands from `SupervisorHandle`. No handler waits out a delay inline:
//! delays are deadlines that the loop selects on, so a shutdown that arrives
//! in the middle of a restart is seen immediately.

use chrono::Utc;
use std::future::pending;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{sleep_until, Instant};

use crate::config::SupervisorConfig;
use crate::core::{ExitReason, ManagedProcess, ProcessSnapshot, ProcessState, RestartDecision, RestartTracker, SignatureSet};
use crate::error::{SupervisorError, SupervisorResult};
use crate::services::{ChildProcess, FailureReport, LogSink, OutputLine, OutputStream};
use crate::traits::FailureReporter;
use shared::{process_debug, process_error, process_info, process_warn, ProcessRole};

const EVENT_CAPACITY: usize = 256;

/// Lifecycle notifications for observers
#[derive(Debug, Clone, PartialEq)]
pub enum SupervisorEvent {
    Started { pid: Option<u32>, generation: u64 },
    OutputMatched { pattern: String, fatal: bool },
    Exited { pid: Option<u32>, reason: ExitReason },
    RestartScheduled { delay: Duration, reason: String },
    BudgetExhausted { restart_count: u32, max_restarts: u32 },
    Terminating { reason: String, grace: Duration },
    Stopped { signal: String },
}

/// How `Supervisor::run` ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorExit {
    Shutdown(String),
}

enum Command {
    Restart { reason: String, reset_budget: bool },
    Shutdown { signal: String },
    Status(oneshot::Sender<ProcessSnapshot>),
}

/// Cloneable remote control for a running supervisor
#[derive(Clone)]
pub struct SupervisorHandle {
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<SupervisorEvent>,
}

impl SupervisorHandle {
    /// Operator restart: resets the restart budget and leaves `Failed`
    pub fn restart(&self, reason: impl Into<String>) -> SupervisorResult<()> {
        self.send(Command::Restart {
            reason: reason.into(),
            reset_budget: true,
        })
    }

    pub fn shutdown(&self, signal: impl Into<String>) -> SupervisorResult<()> {
        self.send(Command::Shutdown { signal: signal.into() })
    }

    pub async fn status(&self) -> SupervisorResult<ProcessSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Status(tx))?;
        rx.await.map_err(|_| SupervisorError::ChannelClosed)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.events.subscribe()
    }

    fn send(&self, command: Command) -> SupervisorResult<()> {
        self.commands.send(command).map_err(|_| SupervisorError::ChannelClosed)
    }
}

#[derive(Debug, Clone)]
enum Action {
    Start,
    Restart(String),
}

struct Scheduled {
    at: Instant,
    action: Action,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AfterExit {
    Restart,
    Exit,
}

/// Graceful-then-forced termination in progress
struct Termination {
    kill_at: Instant,
    then: AfterExit,
    killed: bool,
}

enum LoopEvent {
    Output(OutputLine),
    Exited(ExitReason),
    Due(Action),
    ForceKill,
    Command(Command),
    HandlesDropped,
}

pub struct Supervisor {
    config: SupervisorConfig,
    signatures: SignatureSet,
    reporter: Arc<dyn FailureReporter>,
    log_sink: Option<LogSink>,
    process: ManagedProcess,
    scheduled: Option<Scheduled>,
    termination: Option<Termination>,
    shutdown_signal: Option<String>,
    exit: Option<SupervisorExit>,
    output_tx: mpsc::UnboundedSender<OutputLine>,
    output_rx: mpsc::UnboundedReceiver<OutputLine>,
    commands: mpsc::UnboundedReceiver<Command>,
    commands_open: bool,
    events: broadcast::Sender<SupervisorEvent>,
}

impl Supervisor {
    pub fn new(
        config: SupervisorConfig,
        reporter: Arc<dyn FailureReporter>,
    ) -> SupervisorResult<(Self, SupervisorHandle)> {
        config.validate()?;

        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let handle = SupervisorHandle {
            commands: command_tx,
            events: events.clone(),
        };

        let supervisor = Self {
            signatures: SignatureSet::from_patterns(config.crash_patterns.iter().cloned()),
            process: ManagedProcess::new(RestartTracker::new(config.max_restarts, config.reset_window)),
            config,
            reporter,
            log_sink: None,
            scheduled: None,
            termination: None,
            shutdown_signal: None,
            exit: None,
            output_tx,
            output_rx,
            commands: command_rx,
            commands_open: true,
            events,
        };

        Ok((supervisor, handle))
    }

    /// Mirror child output into `sink` and flush it on shutdown (fluent API)
    pub fn with_log_sink(mut self, sink: LogSink) -> Self {
        self.log_sink = Some(sink);
        self
    }

    pub fn snapshot(&self) -> ProcessSnapshot {
        self.process.snapshot()
    }

    /// Start the child and supervise it until shut down
    pub async fn run(mut self) -> SupervisorResult<SupervisorExit> {
        process_info!(
            ProcessRole::current(),
            "🛡️ Supervising '{}' (auto-restart: {}, max restarts: {})",
            self.config.command_line(),
            self.config.auto_restart,
            self.config.max_restarts
        );

        let started = self.start().await;
        self.recover(started).await;

        loop {
            if let Some(exit) = self.exit.take() {
                self.flush_log_sink();
                return Ok(exit);
            }

            let event = tokio::select! {
                Some(line) = self.output_rx.recv() => LoopEvent::Output(line),
                reason = child_exit(&mut self.process.child) => LoopEvent::Exited(reason),
                action = scheduled_due(&self.scheduled) => LoopEvent::Due(action),
                _ = kill_due(&self.termination) => LoopEvent::ForceKill,
                command = self.commands.recv(), if self.commands_open => match command {
                    Some(command) => LoopEvent::Command(command),
                    None => LoopEvent::HandlesDropped,
                },
            };

            let result = self.handle_event(event).await;
            self.recover(result).await;
        }
    }

    async fn handle_event(&mut self, event: LoopEvent) -> SupervisorResult<()> {
        match event {
            LoopEvent::Output(line) => self.on_output(line),
            LoopEvent::Exited(reason) => self.on_exit(reason).await,
            LoopEvent::Due(action) => {
                self.scheduled = None;
                match action {
                    Action::Start => self.start().await,
                    Action::Restart(reason) => self.restart(reason).await,
                }
            }
            LoopEvent::ForceKill => {
                self.force_kill();
                Ok(())
            }
            LoopEvent::Command(command) => self.on_command(command).await,
            LoopEvent::HandlesDropped => {
                process_debug!(ProcessRole::current(), "📪 All supervisor handles dropped");
                self.commands_open = false;
                Ok(())
            }
        }
    }

    /// Internal faults never escape the loop; they restart the child instead
    async fn recover(&mut self, result: SupervisorResult<()>) {
        let Err(e) = result else {
            return;
        };

        process_error!(ProcessRole::current(), "❌ Supervisor fault: {}", e);

        // Only an operator restart leaves Failed
        if self.process.state == ProcessState::Failed {
            return;
        }
        if let Err(e) = self.restart(format!("internal supervisor fault: {e}")).await {
            process_error!(ProcessRole::current(), "❌ Recovery restart failed: {}", e);
        }
    }

    async fn on_command(&mut self, command: Command) -> SupervisorResult<()> {
        match command {
            Command::Restart { reason, reset_budget } => {
                if reset_budget && self.shutdown_signal.is_none() {
                    self.process.tracker.reset();
                    if self.process.state == ProcessState::Failed {
                        self.process.state = ProcessState::Stopped;
                    }
                }
                self.restart(reason).await
            }
            Command::Shutdown { signal } => self.shutdown(signal),
            Command::Status(reply) => {
                let _ = reply.send(self.process.snapshot());
                Ok(())
            }
        }
    }

    /// Launch the child unless one is already running
    async fn start(&mut self) -> SupervisorResult<()> {
        if self.process.child.is_some() {
            process_debug!(ProcessRole::current(), "⏭️ Start ignored: child already running");
            return Ok(());
        }
        if self.shutdown_signal.is_some() {
            return Ok(());
        }

        self.process.state = ProcessState::Starting;
        let generation = self.process.generation + 1;

        match ChildProcess::spawn(&self.config.command, &self.config.args, generation, self.output_tx.clone()) {
            Ok(child) => {
                let pid = child.pid();
                self.process.child = Some(child);
                self.process.generation = generation;
                self.process.state = ProcessState::Running;

                process_info!(ProcessRole::current(), "🚀 Started '{}' (pid {:?})", self.config.command, pid);
                self.emit(SupervisorEvent::Started { pid, generation });
                Ok(())
            }
            Err(e) => {
                process_error!(ProcessRole::current(), "❌ {}", e);
                self.on_unexpected_exit(e.to_string()).await
            }
        }
    }

    fn on_output(&mut self, line: OutputLine) -> SupervisorResult<()> {
        match line.stream {
            OutputStream::Stdout => println!("{}", line.text),
            OutputStream::Stderr => eprintln!("{}", line.text),
        }
        if let Some(sink) = &self.log_sink {
            sink.append_line(&line.stream.to_string(), &line.text)?;
        }
        self.process.output_tail.push(line.text.clone());

        // Late lines from a previous child are kept for diagnostics only
        if line.generation == self.process.generation && self.process.child.is_some() {
            self.analyze_output(&line.text);
        }
        Ok(())
    }

    /// Match a line against the crash signatures; fatal ones schedule a restart
    fn analyze_output(&mut self, text: &str) {
        let matched: Vec<(String, bool)> = self
            .signatures
            .matching(text)
            .map(|sig| (sig.pattern().to_string(), sig.is_fatal()))
            .collect();

        for (pattern, fatal) in matched {
            process_warn!(ProcessRole::current(), "⚠️ Crash signature detected: '{}'", pattern);
            self.emit(SupervisorEvent::OutputMatched {
                pattern: pattern.clone(),
                fatal,
            });

            if fatal && self.scheduled.is_none() && self.termination.is_none() && !self.process.is_shutting_down {
                let reason = format!("fatal output: {pattern}");
                self.schedule(self.config.fatal_restart_delay, Action::Restart(reason));
            }
        }
    }

    async fn on_exit(&mut self, reason: ExitReason) -> SupervisorResult<()> {
        let pid = self.process.pid();
        self.process.child = None;

        process_info!(ProcessRole::current(), "🔚 Child {:?} {}", pid, reason);
        self.emit(SupervisorEvent::Exited { pid, reason });

        if let Some(termination) = self.termination.take() {
            match termination.then {
                AfterExit::Restart => {
                    self.process.is_shutting_down = false;
                    self.process.state = ProcessState::Restarting;
                    self.schedule(self.config.settle_delay, Action::Start);
                }
                AfterExit::Exit => self.finish(),
            }
            return Ok(());
        }

        if self.shutdown_signal.is_some() {
            self.finish();
            return Ok(());
        }

        self.on_unexpected_exit(reason.description()).await
    }

    /// Crash path: consult the restart budget
    async fn on_unexpected_exit(&mut self, reason: String) -> SupervisorResult<()> {
        if !self.config.auto_restart {
            self.process.state = ProcessState::Stopped;
            process_info!(ProcessRole::current(), "⏹️ Auto-restart disabled; child stays down");
            return Ok(());
        }

        // The budget decision replaces anything already pending
        self.scheduled = None;

        match self.process.tracker.record_crash(Utc::now()) {
            RestartDecision::Restart { attempt } => {
                process_warn!(
                    ProcessRole::current(),
                    "🔁 Restarting in {:?} (attempt {}/{}): {}",
                    self.config.restart_delay,
                    attempt,
                    self.config.max_restarts,
                    reason
                );
                self.process.state = ProcessState::Restarting;
                self.schedule(self.config.restart_delay, Action::Start);
                Ok(())
            }
            RestartDecision::Exhausted { restart_count } => {
                process_error!(
                    ProcessRole::current(),
                    "💀 Restart budget exhausted after {} restarts: {}",
                    restart_count,
                    reason
                );
                self.process.state = ProcessState::Failed;
                self.emit(SupervisorEvent::BudgetExhausted {
                    restart_count,
                    max_restarts: self.config.max_restarts,
                });

                let report = FailureReport {
                    timestamp: Utc::now(),
                    restart_count,
                    max_restarts: self.config.max_restarts,
                    last_crash_time: self.process.tracker.last_crash_time(),
                    reason,
                    command: self.config.command_line(),
                    recent_output: self.process.output_tail.lines(),
                };

                // Exhaustion stays final even when the marker cannot be written
                if let Err(e) = self.reporter.report(report).await {
                    process_error!(ProcessRole::current(), "❌ Could not record restart failure: {}", e);
                }
                Ok(())
            }
        }
    }

    /// Stop the current child and start a fresh one once it is gone
    async fn restart(&mut self, reason: String) -> SupervisorResult<()> {
        if self.shutdown_signal.is_some() {
            process_debug!(ProcessRole::current(), "⏭️ Restart ignored during shutdown: {}", reason);
            return Ok(());
        }
        if self.termination.is_some() {
            process_debug!(ProcessRole::current(), "⏭️ Restart already in progress: {}", reason);
            return Ok(());
        }

        self.scheduled = None;
        process_info!(ProcessRole::current(), "🔄 Restarting: {}", reason);

        if self.process.child.is_none() {
            return self.start().await;
        }

        self.process.is_shutting_down = true;
        self.process.state = ProcessState::Restarting;

        let grace = self.config.restart_grace;
        self.termination = Some(Termination {
            kill_at: Instant::now() + grace,
            then: AfterExit::Restart,
            killed: false,
        });
        self.emit(SupervisorEvent::Terminating { reason, grace });

        match self.process.child.as_mut() {
            Some(child) => child.terminate(),
            None => Ok(()),
        }
    }

    /// Permanent stop: SIGTERM now, SIGKILL after the grace window
    fn shutdown(&mut self, signal: String) -> SupervisorResult<()> {
        if self.shutdown_signal.is_some() {
            return Ok(());
        }

        process_info!(ProcessRole::current(), "🛑 Shutdown requested ({})", signal);
        self.shutdown_signal = Some(signal);
        self.process.is_shutting_down = true;
        self.scheduled = None;

        if self.process.child.is_none() {
            self.termination = None;
            self.finish();
            return Ok(());
        }

        self.process.state = ProcessState::Terminating;

        // A restart is already stopping the child; keep its earlier deadline
        if let Some(termination) = self.termination.as_mut() {
            termination.then = AfterExit::Exit;
            let grace = termination.kill_at.saturating_duration_since(Instant::now());
            self.emit(SupervisorEvent::Terminating {
                reason: "shutdown".to_string(),
                grace,
            });
            return Ok(());
        }

        let grace = self.config.shutdown_grace;
        self.termination = Some(Termination {
            kill_at: Instant::now() + grace,
            then: AfterExit::Exit,
            killed: false,
        });
        self.emit(SupervisorEvent::Terminating {
            reason: "shutdown".to_string(),
            grace,
        });

        match self.process.child.as_mut() {
            Some(child) => child.terminate(),
            None => Ok(()),
        }
    }

    fn force_kill(&mut self) {
        if let Some(termination) = self.termination.as_mut() {
            termination.killed = true;
        }
        if let Some(child) = self.process.child.as_mut() {
            process_warn!(
                ProcessRole::current(),
                "🔨 Child {:?} did not stop within the grace window, sending SIGKILL",
                child.pid()
            );
            child.kill();
        }
    }

    fn finish(&mut self) {
        let signal = self.shutdown_signal.clone().unwrap_or_else(|| "shutdown".to_string());
        self.process.state = ProcessState::Stopped;
        self.scheduled = None;

        process_info!(ProcessRole::current(), "✅ Supervisor stopped ({})", signal);
        self.emit(SupervisorEvent::Stopped { signal: signal.clone() });
        self.exit = Some(SupervisorExit::Shutdown(signal));
    }

    fn schedule(&mut self, delay: Duration, action: Action) {
        let reason = match &action {
            Action::Start => "start".to_string(),
            Action::Restart(reason) => reason.clone(),
        };
        self.scheduled = Some(Scheduled {
            at: Instant::now() + delay,
            action,
        });
        self.emit(SupervisorEvent::RestartScheduled { delay, reason });
    }

    fn flush_log_sink(&self) {
        if let Some(sink) = &self.log_sink {
            if let Err(e) = sink.flush() {
                process_warn!(ProcessRole::current(), "⚠️ Failed to flush log file: {}", e);
            }
        }
    }

    fn emit(&self, event: SupervisorEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

async fn child_exit(child: &mut Option<ChildProcess>) -> ExitReason {
    match child {
        Some(child) => child.exited().await,
        None => pending().await,
    }
}

async fn scheduled_due(scheduled: &Option<Scheduled>) -> Action {
    match scheduled {
        Some(scheduled) => {
            sleep_until(scheduled.at).await;
            scheduled.action.clone()
        }
        None => pending().await,
    }
}

async fn kill_due(termination: &Option<Termination>) {
    match termination {
        Some(termination) if !termination.killed => sleep_until(termination.kill_at).await,
        _ => pending().await,
    }
}
