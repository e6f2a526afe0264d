//! Progress reporting and cooperative cancellation.
//!
//! Every buffer operation follows the same lifecycle:
//!
//! ```text
//!   Idle ──start──► Running ──► Completed
//!                      │
//!                      └──cancel (checked per block)──► Cancelled
//! ```
//!
//! Notifications are optional. Leaving out the notifier or the
//! cancellation token never changes what an operation produces.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use strata_common::utils::hash::FxHashMap;

static NEXT_OPERATION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique operation identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationId(u64);

impl OperationId {
    /// Issues a fresh id.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_OPERATION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw id.
    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op-{}", self.0)
    }
}

/// Receiver of operation lifecycle events.
pub trait ProgressNotifier: Send + Sync {
    /// The operation started.
    fn on_start(&self, op: OperationId, message: Option<&str>);

    /// Fraction of items processed, in `0.0..=1.0`, never decreasing.
    fn on_progress(&self, op: OperationId, fraction: f64);

    /// The operation finished. Fires exactly once per operation.
    fn on_complete(&self, op: OperationId, cancelled: bool);
}

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Creates an unset token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Returns true once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Lifecycle state of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    /// Not started.
    Idle,
    /// Processing blocks.
    Running,
    /// Ran to the end of its inputs.
    Completed,
    /// Cancellation was requested before the run finished.
    Cancelled,
}

/// Summary of a finished operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationOutcome {
    /// Operation id.
    pub id: OperationId,
    /// Final state, `Completed` or `Cancelled`.
    pub state: OperationState,
    /// Input rows processed.
    pub rows: usize,
    /// Blocks processed.
    pub blocks: usize,
}

impl OperationOutcome {
    /// Returns true if the operation stopped early.
    #[must_use]
    pub fn was_cancelled(&self) -> bool {
        self.state == OperationState::Cancelled
    }
}

/// Optional notifier, cancellation token and start message.
#[derive(Clone, Default)]
pub struct OperationOptions {
    notifier: Option<Arc<dyn ProgressNotifier>>,
    cancellation: Option<CancellationToken>,
    message: Option<String>,
}

impl OperationOptions {
    /// Creates options with no notifier and no cancellation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the progress notifier.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn ProgressNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Sets the cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Sets the message sent with the start notification.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Returns true if cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }
}

impl fmt::Debug for OperationOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationOptions")
            .field("notifier", &self.notifier.is_some())
            .field("cancellation", &self.cancellation)
            .field("message", &self.message)
            .finish()
    }
}

/// Average block size across `inputs`, at least 1.
///
/// Used as the progress reporting cadence.
pub fn average_block_size(inputs: impl IntoIterator<Item = (usize, usize)>) -> usize {
    let (items, blocks) = inputs
        .into_iter()
        .fold((0usize, 0usize), |(i, b), (len, count)| (i + len, b + count));
    if blocks == 0 { 1 } else { (items / blocks).max(1) }
}

/// Per-run bookkeeping shared by every operation.
pub struct ProgressTracker {
    id: OperationId,
    options: OperationOptions,
    state: OperationState,
    total: usize,
    processed: usize,
    cadence: usize,
    since_report: usize,
    blocks: usize,
    last_fraction: f64,
}

impl ProgressTracker {
    /// Creates an idle tracker for `total` items reported every `cadence`.
    pub fn new(options: &OperationOptions, total: usize, cadence: usize) -> Self {
        Self {
            id: OperationId::next(),
            options: options.clone(),
            state: OperationState::Idle,
            total,
            processed: 0,
            cadence: cadence.max(1),
            since_report: 0,
            blocks: 0,
            last_fraction: 0.0,
        }
    }

    /// Returns the operation id.
    #[must_use]
    pub fn id(&self) -> OperationId {
        self.id
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> OperationState {
        self.state
    }

    /// Returns items processed so far.
    #[must_use]
    pub fn processed(&self) -> usize {
        self.processed
    }

    /// Moves to `Running` and sends the start notification.
    pub fn start(&mut self, name: &'static str) {
        if self.state != OperationState::Idle {
            return;
        }
        self.state = OperationState::Running;
        tracing::debug!(op = %self.id, operation = name, total = self.total, "operation started");
        if let Some(notifier) = &self.options.notifier {
            notifier.on_start(self.id, self.options.message.as_deref());
        }
    }

    /// Records one processed block of `items` items.
    pub fn advance(&mut self, items: usize) {
        self.processed += items;
        self.since_report += items;
        self.blocks += 1;

        if self.since_report < self.cadence && self.processed < self.total {
            return;
        }
        self.since_report = 0;

        let fraction = if self.total == 0 {
            1.0
        } else {
            (self.processed as f64 / self.total as f64).min(1.0)
        };
        if fraction <= self.last_fraction {
            return;
        }
        self.last_fraction = fraction;
        if let Some(notifier) = &self.options.notifier {
            notifier.on_progress(self.id, fraction);
        }
    }

    /// Returns true if the operation should stop at this block boundary.
    #[must_use]
    pub fn should_stop(&self) -> bool {
        self.options.is_cancelled()
    }

    /// Finishes the run and sends the completion notification.
    pub fn complete(mut self, name: &'static str) -> OperationOutcome {
        let cancelled = self.options.is_cancelled();
        self.state = if cancelled {
            OperationState::Cancelled
        } else {
            OperationState::Completed
        };

        if cancelled {
            tracing::warn!(op = %self.id, operation = name, rows = self.processed, "operation cancelled");
        } else {
            tracing::info!(op = %self.id, operation = name, rows = self.processed, blocks = self.blocks, "operation complete");
        }
        if let Some(notifier) = &self.options.notifier {
            notifier.on_complete(self.id, cancelled);
        }

        OperationOutcome {
            id: self.id,
            state: self.state,
            rows: self.processed,
            blocks: self.blocks,
        }
    }
}

#[derive(Debug, Default)]
struct AggregateState {
    /// Sub-operation progress, keyed by sub-operation id.
    subs: FxHashMap<OperationId, SubProgress>,
    started: bool,
    completed: bool,
    last_fraction: f64,
}

#[derive(Debug, Default, Clone, Copy)]
struct SubProgress {
    fraction: f64,
    done: bool,
    cancelled: bool,
}

/// Fan-in of several sub-operations into one outward event stream.
///
/// The outward start fires once `expected` sub-operations have started;
/// progress is their mean; completion fires once all of them completed and
/// reports cancellation if any sub-operation was cancelled. Outward events
/// are sent while holding an internal lock, so the outward notifier must
/// not call back into the aggregator.
pub struct ProgressAggregator {
    id: OperationId,
    expected: usize,
    message: Option<String>,
    outward: Arc<dyn ProgressNotifier>,
    state: Mutex<AggregateState>,
}

impl ProgressAggregator {
    /// Creates an aggregator for `expected` sub-operations.
    pub fn new(expected: usize, outward: Arc<dyn ProgressNotifier>) -> Arc<Self> {
        Arc::new(Self {
            id: OperationId::next(),
            expected: expected.max(1),
            message: None,
            outward,
            state: Mutex::new(AggregateState::default()),
        })
    }

    /// Creates an aggregator that forwards `message` with the outward start.
    pub fn with_message(
        expected: usize,
        outward: Arc<dyn ProgressNotifier>,
        message: impl Into<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: OperationId::next(),
            expected: expected.max(1),
            message: Some(message.into()),
            outward,
            state: Mutex::new(AggregateState::default()),
        })
    }

    /// Returns the id used for outward events.
    #[must_use]
    pub fn id(&self) -> OperationId {
        self.id
    }

    /// Returns options that route a sub-operation's events here.
    pub fn sub_options(self: &Arc<Self>) -> OperationOptions {
        OperationOptions::new().with_notifier(Arc::clone(self) as Arc<dyn ProgressNotifier>)
    }

    fn mean(&self, state: &AggregateState) -> f64 {
        let sum: f64 = state.subs.values().map(|s| s.fraction).sum();
        (sum / self.expected as f64).min(1.0)
    }

    fn maybe_complete(&self, state: &mut AggregateState) {
        if !state.started || state.completed {
            return;
        }
        let done = state.subs.values().filter(|s| s.done).count();
        if done < self.expected {
            return;
        }
        state.completed = true;
        let cancelled = state.subs.values().any(|s| s.cancelled);
        self.outward.on_complete(self.id, cancelled);
    }
}

impl ProgressNotifier for ProgressAggregator {
    fn on_start(&self, op: OperationId, _message: Option<&str>) {
        let mut state = self.state.lock();
        state.subs.entry(op).or_default();
        if !state.started && state.subs.len() >= self.expected {
            state.started = true;
            self.outward.on_start(self.id, self.message.as_deref());
            // Sub-operations that already finished are reported now.
            let fraction = self.mean(&state);
            if fraction > state.last_fraction {
                state.last_fraction = fraction;
                self.outward.on_progress(self.id, fraction);
            }
            self.maybe_complete(&mut state);
        }
    }

    fn on_progress(&self, op: OperationId, fraction: f64) {
        let mut state = self.state.lock();
        let sub = state.subs.entry(op).or_default();
        sub.fraction = sub.fraction.max(fraction);
        if !state.started {
            return;
        }
        let mean = self.mean(&state);
        if mean > state.last_fraction {
            state.last_fraction = mean;
            self.outward.on_progress(self.id, mean);
        }
    }

    fn on_complete(&self, op: OperationId, cancelled: bool) {
        let mut state = self.state.lock();
        let sub = state.subs.entry(op).or_default();
        sub.done = true;
        sub.cancelled = cancelled;
        if !cancelled {
            sub.fraction = 1.0;
        }
        if state.started {
            let mean = self.mean(&state);
            if mean > state.last_fraction {
                state.last_fraction = mean;
                self.outward.on_progress(self.id, mean);
            }
        }
        self.maybe_complete(&mut state);
    }
}
