//! InstanceRouter - process supervision and message routing
//!
//! ```text
//!             outbound (fd 4)                       inbound (fd 3)
//!  instance i ──────────────▶ decode task i ──┐   ┌──▶ delivery task j ──▶ instance j
//!                                             ▼   │
//!                                      slot j: mailbox + clock
//! ```
//!
//! Every instance has one slot lock guarding its mailbox, pending receive,
//! clock and counters. No lock is held across an `.await` and no task ever
//! holds two slot locks at once.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use bytes::Bytes;
use contracts::protocol::MAX_INSTANCES;
use contracts::{
    ExitPolicy, InstanceExit, InstanceId, InstanceProcess, InstanceState, InstanceStats, Message,
    RemainingMessages, RunConfig, RunError, RunResult,
};
use output::MuxWriter;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::clock::InstanceClock;
use crate::codec::{write_delivery, Frame, FrameDecoder};
use crate::mailbox::{Mailbox, Source};
use crate::process::{ChildProcess, CommEndpoint, CommPipes, SpawnedInstance};
use crate::progress::Progress;
use crate::signal::{CompletionCounter, ShutdownListener, ShutdownSignal};

/// Router parameters
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Number of instances, `1..=MAX_INSTANCES`
    pub instances: usize,
    /// Non-zero exit handling
    pub exit_policy: ExitPolicy,
    /// Destination of `from -> to (size bytes)` records (None = disabled)
    pub trace: Option<MuxWriter>,
}

impl RouterConfig {
    pub fn new(instances: usize) -> Self {
        Self {
            instances,
            exit_policy: ExitPolicy::default(),
            trace: None,
        }
    }

    /// Router part of a run configuration; the trace sink is attached separately
    pub fn from_run_config(config: &RunConfig) -> Self {
        Self {
            instances: config.instances,
            exit_policy: config.nonzero_exit,
            trace: None,
        }
    }

    pub fn with_trace(mut self, sink: MuxWriter) -> Self {
        self.trace = Some(sink);
        self
    }
}

/// Mutable per-instance state
struct Slot {
    mailbox: Mailbox,
    clock: Option<InstanceClock>,
    pending: Option<Source>,
    deliver: Option<mpsc::UnboundedSender<Message>>,
    messages_sent: u64,
    bytes_sent: u64,
    exit: Option<InstanceExit>,
    exited: bool,
    drained: bool,
    finished: bool,
}

impl Slot {
    fn new(instances: usize) -> Self {
        Self {
            mailbox: Mailbox::new(instances),
            clock: None,
            pending: None,
            deliver: None,
            messages_sent: 0,
            bytes_sent: 0,
            exit: None,
            exited: false,
            drained: false,
            finished: false,
        }
    }

    /// Pass `message` to the delivery task; it stays queued as unreceived
    /// when the instance can no longer take deliveries
    fn hand_over(&mut self, id: InstanceId, message: Message) {
        let kept = match &self.deliver {
            Some(tx) => tx.send(message).err().map(|e| e.0),
            None => Some(message),
        };
        if let Some(message) = kept {
            debug!(instance = id, from = message.from, "Instance takes no deliveries, message kept");
            self.mailbox.push(message);
        }
    }

    fn stats(&self, id: InstanceId) -> InstanceStats {
        let mut stats = InstanceStats::new(id);
        stats.messages_sent = self.messages_sent;
        stats.bytes_sent = self.bytes_sent;
        stats.exit = self.exit;
        if let Some(clock) = &self.clock {
            stats.time_running = clock.time_running();
            stats.time_blocked = clock.time_blocked();
        }
        stats
    }
}

/// State shared by the router and all of its tasks
struct Shared {
    instances: usize,
    exit_policy: ExitPolicy,
    slots: Vec<Mutex<Slot>>,
    progress: Progress,
    completions: CompletionCounter,
    shutdown: ShutdownSignal,
    error: Mutex<Option<RunError>>,
    first_failure: Mutex<Option<(InstanceId, InstanceExit)>>,
    trace: Option<MuxWriter>,
}

impl Shared {
    fn slot(&self, id: InstanceId) -> MutexGuard<'_, Slot> {
        self.slots[id as usize]
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    /// Record a fatal error (the first one wins) and stop the run
    fn fail(&self, err: RunError) {
        {
            let mut slot = self.error.lock().unwrap_or_else(|e| e.into_inner());
            if slot.is_none() {
                error!(error = %err, "Run aborted");
                *slot = Some(err);
            } else {
                debug!(error = %err, "Further error after abort");
            }
        }
        self.shutdown.trigger();
    }

    /// A decoded send: hand the message to its destination
    fn route(&self, message: Message) {
        let (from, to, len) = (message.from, message.to, message.len());
        let now = Instant::now();

        {
            let mut slot = self.slot(to);
            let pending = slot.pending;
            match pending {
                Some(source) if source.matches(from) => {
                    slot.pending = None;
                    if slot.clock.as_mut().is_some_and(|clock| clock.unblock(now)) {
                        self.progress.unblock();
                    }
                    slot.hand_over(to, message);
                }
                _ => slot.mailbox.push(message),
            }
        }

        {
            let mut slot = self.slot(from);
            slot.messages_sent += 1;
            slot.bytes_sent += len as u64;
        }

        trace!(from, to, bytes = len, "Message routed");
        if let Some(sink) = &self.trace {
            let record = format!("{from} -> {to} ({len} bytes)\n");
            if let Err(e) = sink.send(Bytes::from(record)) {
                debug!(error = %e, "Trace sink closed");
            }
        }
        observability::record_message_routed(from, len);
    }

    /// A decoded receive request
    fn request(&self, id: InstanceId, source: Source) -> Result<(), RunError> {
        let now = Instant::now();

        let stalled = {
            let mut slot = self.slot(id);
            if slot.exited || slot.deliver.is_none() {
                // A leftover holder of the outbound fd; nobody can read the answer
                debug!(instance = id, %source, "Receive request after exit ignored");
                return Ok(());
            }
            if let Some(pending) = slot.pending {
                return Err(RunError::protocol(
                    id,
                    format!("receive from {source} requested while a receive from {pending} is pending"),
                ));
            }

            match slot.mailbox.take(source) {
                Some(message) => {
                    slot.hand_over(id, message);
                    false
                }
                None => {
                    slot.pending = Some(source);
                    trace!(instance = id, %source, "Instance blocked");
                    slot.clock.as_mut().is_some_and(|clock| clock.block(now))
                        && self.progress.block()
                }
            }
        };

        if stalled {
            self.report_deadlock();
        }
        Ok(())
    }

    fn process_exited(&self, id: InstanceId, exit: Option<InstanceExit>) {
        let now = Instant::now();

        let stalled = {
            let mut slot = self.slot(id);
            slot.exit = exit;
            slot.exited = true;
            slot.pending = None;
            if let Some(clock) = slot.clock.as_mut() {
                let was_blocked = clock.state() == InstanceState::Blocked;
                clock.terminate(now);
                if was_blocked {
                    self.progress.unblock();
                }
                observability::record_blocked_time(id, clock.time_blocked());
            }
            self.finish_if_done(&mut slot)
        };

        observability::record_instance_exit(exit.as_ref());
        if let Some(exit) = exit.filter(|exit| !exit.success()) {
            warn!(instance = id, %exit, "Instance terminated abnormally");
            let mut first = self.first_failure.lock().unwrap_or_else(|e| e.into_inner());
            if first.is_none() {
                *first = Some((id, exit));
            }
        }

        self.completions.complete();
        if stalled {
            self.report_deadlock();
        }
    }

    fn outbound_drained(&self, id: InstanceId) {
        let stalled = {
            let mut slot = self.slot(id);
            slot.drained = true;
            self.finish_if_done(&mut slot)
        };

        self.completions.complete();
        if stalled {
            self.report_deadlock();
        }
    }

    /// Mark the instance finished once it exited and drained; true if that
    /// leaves every other unfinished instance blocked
    fn finish_if_done(&self, slot: &mut Slot) -> bool {
        if slot.finished || !(slot.exited && slot.drained) {
            return false;
        }
        slot.finished = true;
        slot.deliver = None;
        self.progress.finish()
    }

    /// The instance stopped reading deliveries: `message` and everything
    /// queued behind it stay unreceived
    fn undeliverable(&self, id: InstanceId, message: Message, mut rx: mpsc::UnboundedReceiver<Message>) {
        let mut slot = self.slot(id);
        slot.deliver = None;
        slot.mailbox.push(message);
        rx.close();
        while let Ok(message) = rx.try_recv() {
            slot.mailbox.push(message);
        }
    }

    fn report_deadlock(&self) {
        let blocked: Vec<InstanceId> = (0..self.instances as InstanceId)
            .filter(|&id| {
                self.slot(id)
                    .clock
                    .as_ref()
                    .is_some_and(|clock| clock.state() == InstanceState::Blocked)
            })
            .collect();
        warn!(
            ?blocked,
            waiting = self.progress.blocked(),
            unfinished = self.progress.unfinished(),
            "Every live instance waits for a message"
        );
        self.fail(RunError::Deadlock { blocked });
    }

    fn close_deliveries(&self) {
        for id in 0..self.instances as InstanceId {
            self.slot(id).deliver = None;
        }
    }
}

/// Runs N instances to completion while routing their messages
pub struct InstanceRouter {
    shared: Arc<Shared>,
    registered: usize,
    tasks: JoinSet<()>,
    inputs: JoinSet<()>,
}

impl InstanceRouter {
    pub fn new(config: RouterConfig) -> Result<Self, RunError> {
        if config.instances == 0 || config.instances > MAX_INSTANCES {
            return Err(RunError::configuration(
                "instances",
                format!("must be between 1 and {MAX_INSTANCES}, got {}", config.instances),
            ));
        }

        let instances = config.instances;
        let shared = Shared {
            instances,
            exit_policy: config.exit_policy,
            slots: (0..instances).map(|_| Mutex::new(Slot::new(instances))).collect(),
            progress: Progress::new(instances),
            completions: CompletionCounter::new(),
            shutdown: ShutdownSignal::new(),
            error: Mutex::new(None),
            first_failure: Mutex::new(None),
            trace: config.trace,
        };

        Ok(Self {
            shared: Arc::new(shared),
            registered: 0,
            tasks: JoinSet::new(),
            inputs: JoinSet::new(),
        })
    }

    pub fn instances(&self) -> usize {
        self.shared.instances
    }

    fn next_id(&self) -> Result<InstanceId, RunError> {
        if self.registered >= self.shared.instances {
            return Err(RunError::configuration(
                "instances",
                format!("all {} instances are already registered", self.shared.instances),
            ));
        }
        Ok(self.registered as InstanceId)
    }

    /// Spawn `command` as the next instance with its comm channel wired up
    ///
    /// The caller configures stdin/stdout/stderr on `command` beforehand and
    /// gets the piped handles back.
    #[instrument(name = "router_launch", skip_all, fields(instance = self.registered))]
    pub fn launch(&mut self, mut command: Command) -> Result<SpawnedInstance, RunError> {
        let id = self.next_id()?;

        let pipes = CommPipes::new()
            .map_err(|e| RunError::system(format!("creating comm pipes for instance {id}"), e))?;
        pipes.configure(&mut command, id, self.shared.instances);

        let mut child = command
            .spawn()
            .map_err(|source| RunError::StartFailed { instance: id, source })?;

        let endpoint = pipes
            .into_endpoint()
            .map_err(|e| RunError::system(format!("registering comm pipes of instance {id}"), e))?;

        let spawned = SpawnedInstance {
            id,
            pid: child.id(),
            stdin: child.stdin.take(),
            stdout: child.stdout.take(),
            stderr: child.stderr.take(),
        };
        info!(instance = id, pid = ?spawned.pid, "Instance started");

        self.register(ChildProcess::new(child), endpoint);
        Ok(spawned)
    }

    /// Register an already-running instance with arbitrary comm channels
    pub fn attach<P>(&mut self, process: P, endpoint: CommEndpoint) -> Result<InstanceId, RunError>
    where
        P: InstanceProcess + Send + 'static,
    {
        let id = self.next_id()?;
        debug!(instance = id, "Instance attached");
        self.register(process, endpoint);
        Ok(id)
    }

    fn register<P>(&mut self, process: P, endpoint: CommEndpoint)
    where
        P: InstanceProcess + Send + 'static,
    {
        let id = self.registered as InstanceId;
        self.registered += 1;
        observability::record_instance_started();

        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut slot = self.shared.slot(id);
            slot.clock = Some(InstanceClock::start(Instant::now()));
            slot.deliver = Some(tx);
        }

        let CommEndpoint { inbound, outbound } = endpoint;
        let shared = Arc::clone(&self.shared);
        self.tasks.spawn(wait_process(id, process, shared));
        let shared = Arc::clone(&self.shared);
        self.tasks.spawn(decode_outbound(id, outbound, shared));
        let shared = Arc::clone(&self.shared);
        self.tasks.spawn(deliver_inbound(id, inbound, rx, shared));
    }

    /// Run an auxiliary task (output pump) alongside the instances
    ///
    /// An `Err` aborts the run. The router waits for these before returning.
    pub fn supervise<F>(&mut self, task: F)
    where
        F: Future<Output = Result<(), RunError>> + Send + 'static,
    {
        let shared = Arc::clone(&self.shared);
        self.tasks.spawn(async move {
            if let Err(e) = task.await {
                shared.fail(e);
            }
        });
    }

    /// Like [`Self::supervise`], but cancelled once every instance is done
    ///
    /// For input feeders, which may wait on a source that never ends.
    pub fn supervise_input<F>(&mut self, task: F)
    where
        F: Future<Output = Result<(), RunError>> + Send + 'static,
    {
        let shared = Arc::clone(&self.shared);
        self.inputs.spawn(async move {
            if let Err(e) = task.await {
                shared.fail(e);
            }
        });
    }

    /// Abort the run with `error`; already registered instances are killed
    /// once [`Self::run`] is awaited
    pub fn abort(&mut self, error: RunError) {
        self.shared.fail(error);
    }

    /// Wait until every instance exited and drained (or the run aborted),
    /// then collect stats and leftover messages
    #[instrument(name = "router_run", skip(self), fields(instances = self.shared.instances))]
    pub async fn run(mut self) -> RunResult {
        let shared = Arc::clone(&self.shared);

        if self.registered < shared.instances {
            shared.fail(RunError::configuration(
                "instances",
                format!(
                    "only {} of {} instances were started",
                    self.registered, shared.instances
                ),
            ));
        }

        let mut shutdown = shared.shutdown.subscribe();
        tokio::select! {
            _ = shared.completions.wait_for(2 * shared.instances) => {
                debug!("All instances exited and drained");
            }
            _ = shutdown.cancelled() => {
                debug!("Shutdown requested");
            }
        }

        self.inputs.shutdown().await;
        shared.close_deliveries();
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                if e.is_panic() {
                    shared.fail(RunError::system(
                        "router task panicked",
                        std::io::Error::other(e.to_string()),
                    ));
                }
            }
        }

        self.collect()
    }

    fn collect(&self) -> RunResult {
        let shared = &self.shared;
        let now = Instant::now();

        let mut instances = Vec::with_capacity(shared.instances);
        let mut remaining = Vec::new();
        for id in 0..shared.instances as InstanceId {
            let mut slot = shared.slot(id);
            if let Some(clock) = slot.clock.as_mut() {
                clock.terminate(now);
            }
            instances.push(slot.stats(id));
            remaining.extend(slot.mailbox.drain());
        }

        let remaining = RemainingMessages::new(remaining);
        observability::record_orphaned_messages(remaining.len());
        if !remaining.is_empty() {
            debug!(messages = remaining.len(), "Messages left undelivered");
        }

        let mut error = shared.error.lock().unwrap_or_else(|e| e.into_inner()).take();
        if error.is_none() && shared.exit_policy == ExitPolicy::Fail {
            let first = *shared.first_failure.lock().unwrap_or_else(|e| e.into_inner());
            error = first.map(|(instance, exit)| RunError::InstanceFailed { instance, exit });
        }

        RunResult {
            instances,
            remaining,
            error,
        }
    }
}

/// Wait for the process to exit, killing it first if the run is aborted
async fn wait_process<P: InstanceProcess>(id: InstanceId, mut process: P, shared: Arc<Shared>) {
    let mut shutdown = shared.shutdown.subscribe();

    let exited = tokio::select! {
        result = process.wait() => Some(result),
        _ = shutdown.cancelled() => None,
    };

    let result = match exited {
        Some(result) => result,
        None => {
            debug!(instance = id, "Killing instance");
            if let Err(e) = process.start_kill() {
                warn!(instance = id, error = %e, "Failed to kill instance");
            }
            process.wait().await
        }
    };

    let exit = match result {
        Ok(exit) => {
            debug!(instance = id, %exit, "Instance exited");
            Some(exit)
        }
        Err(e) => {
            shared.fail(RunError::system(format!("waiting for instance {id}"), e));
            None
        }
    };
    shared.process_exited(id, exit);
}

/// Decode frames until end-of-stream, a violation, or shutdown
async fn decode_outbound<R>(id: InstanceId, outbound: R, shared: Arc<Shared>)
where
    R: AsyncRead + Unpin,
{
    let mut shutdown: ShutdownListener = shared.shutdown.subscribe();
    let mut decoder = FrameDecoder::new(outbound, shared.instances);

    loop {
        let frame = tokio::select! {
            frame = decoder.next_frame() => frame,
            _ = shutdown.cancelled() => break,
        };

        match frame {
            Ok(Some(Frame::Send { to, payload })) => {
                shared.route(Message::new(id, to, payload));
            }
            Ok(Some(Frame::Receive { source })) => {
                if let Err(e) = shared.request(id, source) {
                    shared.fail(e);
                    break;
                }
            }
            Ok(None) => {
                debug!(instance = id, "Outbound channel drained");
                break;
            }
            Err(e) => {
                shared.fail(e.into_run_error(id));
                break;
            }
        }
    }

    shared.outbound_drained(id);
}

/// Write queued deliveries to the instance until the router closes the queue
async fn deliver_inbound<W>(
    id: InstanceId,
    mut inbound: W,
    mut rx: mpsc::UnboundedReceiver<Message>,
    shared: Arc<Shared>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = rx.recv().await {
        if let Err(e) = write_delivery(&mut inbound, &message).await {
            // The instance closed its end or exited
            debug!(instance = id, error = %e, "Delivery failed");
            shared.undeliverable(id, message, rx);
            return;
        }
    }
    let _ = inbound.shutdown().await;
}
