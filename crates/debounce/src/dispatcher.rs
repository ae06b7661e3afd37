//! Debounced, per-key serialized call dispatcher
//!
//! Producers call [`Dispatcher::submit`] from any thread; it never blocks.
//! A single worker task drains the inbound queue in submission order and,
//! for each call:
//!
//! 1. evicts cache entries decided at or before `submitted_at - delay`
//! 2. drops the call if its key was decided at or after `submitted_at`
//! 3. waits until `submitted_at + delay`, then drops the call if a later
//!    call for the same key, submitted inside that window, is queued
//! 4. records the decision and invokes the callee
//!
//! The worker is the only owner of the [`SuppressionCache`], so the cache
//! needs no locking. The delay wait in step 3 holds up every other key as
//! well: this dispatcher trades latency under heavy multi-key load for a
//! simple, strictly ordered loop.
//!
//! With a zero delay the dispatcher is a pass-through: every call is invoked
//! in order with its own arguments and the cache is never consulted.

use crate::cache::SuppressionCache;
use crate::clock::{Clock, TokioClock};
use crate::stats::{DispatchStats, StatsSnapshot};
use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, trace, warn};

/// Target of dispatched calls
#[async_trait]
pub trait Callee<A>: Send + Sync + 'static {
    type Error: fmt::Display + Send + 'static;

    async fn call(&self, args: A) -> Result<(), Self::Error>;
}

/// Dispatcher errors
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The worker has stopped; nothing further can be dispatched
    #[error("dispatcher worker has stopped")]
    Closed,

    #[error("dispatcher worker panicked: {0}")]
    WorkerPanicked(String),

    #[error("invalid debounce delay {0}: expected a finite, non-negative number of seconds")]
    InvalidDelay(f64),
}

/// Longest delay the worker honours; longer ones are clamped
pub const MAX_DELAY: Duration = Duration::from_secs(86400 * 365 * 30);

/// Debounce configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebounceConfig {
    /// Quiescence window; zero disables debouncing
    pub delay: Duration,
}

impl DebounceConfig {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Parse a delay given in (fractional) seconds, up to [`MAX_DELAY`]
    pub fn from_secs_f64(secs: f64) -> Result<Self, DispatchError> {
        match Duration::try_from_secs_f64(secs) {
            Ok(delay) if delay <= MAX_DELAY => Ok(Self::new(delay)),
            _ => Err(DispatchError::InvalidDelay(secs)),
        }
    }

    /// True when calls are forwarded without debouncing
    pub fn is_passthrough(&self) -> bool {
        self.delay.is_zero()
    }
}

/// How the worker should stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Refuse new submissions, deliver everything already queued
    Drain,
    /// Stop after the in-flight invocation; queued calls are discarded
    Abandon,
}

struct PendingCall<K, A> {
    key: K,
    args: A,
    submitted_at: Instant,
}

/// Submission side of the dispatcher
///
/// Cheap to clone; every clone feeds the same worker.
pub struct Dispatcher<K, A> {
    tx: mpsc::UnboundedSender<PendingCall<K, A>>,
    clock: Arc<dyn Clock>,
    stats: Arc<DispatchStats>,
    delay: Duration,
}

impl<K, A> Clone for Dispatcher<K, A> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            clock: Arc::clone(&self.clock),
            stats: Arc::clone(&self.stats),
            delay: self.delay,
        }
    }
}

impl<K, A> fmt::Debug for Dispatcher<K, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("delay", &self.delay)
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

impl<K, A> Dispatcher<K, A>
where
    K: Hash + Eq + Clone + fmt::Debug + Send + 'static,
    A: Send + 'static,
{
    /// Spawn the worker on the current tokio runtime
    pub fn spawn<C>(config: DebounceConfig, callee: C) -> (Self, DispatcherHandle)
    where
        C: Callee<A>,
    {
        Self::spawn_with_clock(config, callee, Arc::new(TokioClock))
    }

    /// Spawn the worker with an explicit clock
    pub fn spawn_with_clock<C>(
        config: DebounceConfig,
        callee: C,
        clock: Arc<dyn Clock>,
    ) -> (Self, DispatcherHandle)
    where
        C: Callee<A>,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(None);
        let stats = Arc::new(DispatchStats::default());
        let delay = config.delay.min(MAX_DELAY);

        let worker = Worker {
            rx,
            backlog: VecDeque::new(),
            cache: SuppressionCache::new(),
            callee,
            clock: Arc::clone(&clock),
            stats: Arc::clone(&stats),
            delay,
            shutdown: shutdown_rx,
            listening: true,
            abandoned: false,
        };
        let join = tokio::spawn(worker.run());

        let dispatcher = Self {
            tx,
            clock,
            stats: Arc::clone(&stats),
            delay,
        };
        let handle = DispatcherHandle {
            join,
            shutdown: shutdown_tx,
            stats,
        };
        (dispatcher, handle)
    }

    /// Queue a call; never blocks
    ///
    /// Fails only when the worker is gone.
    pub fn submit(&self, key: K, args: A) -> Result<(), DispatchError> {
        let call = PendingCall {
            key,
            args,
            submitted_at: self.clock.now(),
        };
        // Counted first so a snapshot never shows more invoked than submitted
        self.stats.record_submitted();
        if self.tx.send(call).is_err() {
            self.stats.unrecord_submitted();
            return Err(DispatchError::Closed);
        }
        Ok(())
    }
}

impl<K, A> Dispatcher<K, A> {
    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// True once the worker has stopped accepting calls
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Owner-side handle used to stop the worker
#[derive(Debug)]
pub struct DispatcherHandle {
    join: JoinHandle<()>,
    shutdown: watch::Sender<Option<ShutdownMode>>,
    stats: Arc<DispatchStats>,
}

impl DispatcherHandle {
    /// Stop the worker and wait for it to exit
    ///
    /// An invocation that is already running always completes.
    pub async fn shutdown(self, mode: ShutdownMode) -> Result<StatsSnapshot, DispatchError> {
        // Err only if the worker already dropped its receiver, i.e. it has exited
        let _ = self.shutdown.send(Some(mode));
        self.join().await
    }

    /// Wait for the worker to exit on its own (after every `Dispatcher` is dropped)
    pub async fn join(self) -> Result<StatsSnapshot, DispatchError> {
        match self.join.await {
            Ok(()) => Ok(self.stats.snapshot()),
            Err(e) if e.is_panic() => Err(DispatchError::WorkerPanicked(panic_message(
                e.into_panic().as_ref(),
            ))),
            Err(_) => Err(DispatchError::Closed),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

struct Worker<K, A, C> {
    rx: mpsc::UnboundedReceiver<PendingCall<K, A>>,
    /// Calls pulled off the channel while looking ahead, still in submission order
    backlog: VecDeque<PendingCall<K, A>>,
    cache: SuppressionCache<K>,
    callee: C,
    clock: Arc<dyn Clock>,
    stats: Arc<DispatchStats>,
    delay: Duration,
    shutdown: watch::Receiver<Option<ShutdownMode>>,
    /// False once the handle is gone; nobody can ask us to stop anymore
    listening: bool,
    abandoned: bool,
}

impl<K, A, C> Worker<K, A, C>
where
    K: Hash + Eq + Clone + fmt::Debug + Send + 'static,
    A: Send + 'static,
    C: Callee<A>,
{
    async fn run(mut self) {
        debug!(delay = ?self.delay, "Dispatcher worker started");

        while let Some(call) = self.next_call().await {
            self.process(call).await;
        }

        self.absorb();
        debug!(
            abandoned = self.abandoned,
            discarded = self.backlog.len(),
            "Dispatcher worker stopped"
        );
    }

    async fn next_call(&mut self) -> Option<PendingCall<K, A>> {
        loop {
            if self.abandon_requested() {
                return None;
            }
            if let Some(call) = self.backlog.pop_front() {
                return Some(call);
            }

            tokio::select! {
                biased;
                changed = self.shutdown.changed(), if self.listening => {
                    self.observe_shutdown(changed);
                }
                call = self.rx.recv() => return call,
            }
        }
    }

    async fn process(&mut self, call: PendingCall<K, A>) {
        if self.delay.is_zero() {
            if !self.abandon_requested() {
                Self::invoke(&self.callee, &self.stats, call).await;
            }
            return;
        }

        let evicted = self.cache.evict_expired(call.submitted_at, self.delay);
        if evicted > 0 {
            trace!(evicted, cached = self.cache.len(), "Evicted expired decisions");
        }

        if self.cache.is_stale(&call.key, call.submitted_at) {
            self.stats.record_suppressed();
            debug!(key = ?call.key, "Suppressed call already covered by a later decision");
            return;
        }

        let deadline = call.submitted_at + self.delay;
        if deadline > self.clock.now() && !self.wait_until(deadline).await {
            return;
        }

        self.absorb();
        if self.is_superseded(&call.key, deadline) {
            self.stats.record_superseded();
            debug!(key = ?call.key, "Dropped call superseded by a newer submission");
            return;
        }
        if self.abandon_requested() {
            return;
        }

        self.cache.commit(call.key.clone(), self.clock.now());
        Self::invoke(&self.callee, &self.stats, call).await;
    }

    /// Sleep until `deadline`; false if abandoned meanwhile
    async fn wait_until(&mut self, deadline: Instant) -> bool {
        loop {
            tokio::select! {
                biased;
                changed = self.shutdown.changed(), if self.listening => {
                    self.observe_shutdown(changed);
                    if self.abandoned {
                        return false;
                    }
                }
                _ = self.clock.sleep_until(deadline) => return true,
            }
        }
    }

    /// Move everything already sitting in the channel into the backlog
    fn absorb(&mut self) {
        while let Ok(call) = self.rx.try_recv() {
            self.backlog.push_back(call);
        }
    }

    /// A later call for `key`, submitted before `deadline`, is queued
    fn is_superseded(&self, key: &K, deadline: Instant) -> bool {
        self.backlog
            .iter()
            .any(|pending| pending.submitted_at < deadline && pending.key == *key)
    }

    /// Run the callee; errors and panics stop here
    async fn invoke(callee: &C, stats: &DispatchStats, call: PendingCall<K, A>) {
        let PendingCall { key, args, .. } = call;
        stats.record_invoked();

        match AssertUnwindSafe(callee.call(args)).catch_unwind().await {
            Ok(Ok(())) => trace!(?key, "Call completed"),
            Ok(Err(e)) => {
                stats.record_failed();
                warn!(?key, error = %e, "Call failed");
            }
            Err(panic) => {
                stats.record_failed();
                error!(
                    ?key,
                    panic = %panic_message(panic.as_ref()),
                    "Call panicked; dispatcher continues"
                );
            }
        }
    }

    /// Pick up an abandon request without waiting for a change notification
    fn abandon_requested(&mut self) -> bool {
        if !self.abandoned && *self.shutdown.borrow() == Some(ShutdownMode::Abandon) {
            debug!("Dispatcher abandoning queued calls");
            self.abandoned = true;
        }
        self.abandoned
    }

    fn observe_shutdown(&mut self, changed: Result<(), watch::error::RecvError>) {
        if changed.is_err() {
            // Handle dropped without asking for shutdown
            self.listening = false;
            return;
        }

        let mode = *self.shutdown.borrow_and_update();
        match mode {
            Some(ShutdownMode::Abandon) => {
                debug!("Dispatcher abandoning queued calls");
                self.abandoned = true;
            }
            Some(ShutdownMode::Drain) => {
                debug!("Dispatcher draining queued calls");
                self.rx.close();
            }
            None => {}
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
