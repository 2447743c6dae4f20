//! Run-state bookkeeping shared between the scheduler and worker threads.
//!
//! The coordinator is the only object touched from several threads during a
//! run: the scheduler claims and finishes runs, the run itself reports
//! progress, and anyone may request an interruption.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;
use strum_macros::{Display, EnumString};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::debug;

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString)]
pub enum RunState {
    Idle = 0,
    Running = 1,
    Completed = 2,
    Interrupted = 3,
}

impl RunState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => RunState::Running,
            2 => RunState::Completed,
            3 => RunState::Interrupted,
            _ => RunState::Idle,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum EvaluationEvent {
    RunStarted {
        run_id: u64,
        label: String,
        expected_nodes: usize,
    },
    Progress {
        run_id: u64,
        percent: f32,
    },
    RunCompleted {
        run_id: u64,
        state: RunState,
        executed_nodes: usize,
        node_errors: usize,
    },
    RequestDropped {
        reason: String,
    },
}

/// Fire-and-forget sender for [`EvaluationEvent`]s. A dropped receiver is
/// not an error.
#[derive(Clone, Debug, Default)]
pub struct NotificationBus {
    tx: Option<UnboundedSender<EvaluationEvent>>,
}

impl NotificationBus {
    pub fn channel() -> (Self, UnboundedReceiver<EvaluationEvent>) {
        let (tx, rx) = unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    pub fn disconnected() -> Self {
        Self::default()
    }

    pub fn send(&self, event: EvaluationEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

#[derive(Debug)]
pub struct ProgressCoordinator {
    state: AtomicU8,
    interrupted: AtomicBool,
    progress_bits: AtomicU32,
    parallel_progress: Mutex<f32>,
    expected_nodes: AtomicUsize,
    executed_nodes: AtomicUsize,
    runs_started: AtomicU64,
    bus: NotificationBus,
}

impl Default for ProgressCoordinator {
    fn default() -> Self {
        Self::new(NotificationBus::disconnected())
    }
}

impl ProgressCoordinator {
    pub fn new(bus: NotificationBus) -> Self {
        Self {
            state: AtomicU8::new(RunState::Idle as u8),
            interrupted: AtomicBool::new(false),
            progress_bits: AtomicU32::new(0.0_f32.to_bits()),
            parallel_progress: Mutex::new(0.0),
            expected_nodes: AtomicUsize::new(0),
            executed_nodes: AtomicUsize::new(0),
            runs_started: AtomicU64::new(0),
            bus,
        }
    }

    pub fn bus(&self) -> &NotificationBus {
        &self.bus
    }

    pub fn state(&self) -> RunState {
        RunState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_running(&self) -> bool {
        self.state() == RunState::Running
    }

    /// Claims the coordinator for a new run. Fails while another run is in
    /// flight. A finished state is reset, and so are the interruption flag
    /// and the expected-node count.
    pub fn try_claim(&self) -> bool {
        let mut current = self.state.load(Ordering::SeqCst);
        loop {
            if current == RunState::Running as u8 {
                return false;
            }
            match self.state.compare_exchange(
                current,
                RunState::Running as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        self.interrupted.store(false, Ordering::SeqCst);
        self.expected_nodes.store(0, Ordering::SeqCst);
        self.executed_nodes.store(0, Ordering::SeqCst);
        self.store_progress(0.0);
        *self.parallel_progress.lock() = 0.0;
        true
    }

    /// Returns a claim that never started a run back to `Idle`.
    pub fn release_claim(&self) {
        let _ = self.state.compare_exchange(
            RunState::Running as u8,
            RunState::Idle as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    pub fn count_expected_node(&self) {
        self.expected_nodes.fetch_add(1, Ordering::SeqCst);
    }

    pub fn count_expected_nodes(&self, count: usize) {
        self.expected_nodes.fetch_add(count, Ordering::SeqCst);
    }

    pub fn expected_nodes(&self) -> usize {
        self.expected_nodes.load(Ordering::SeqCst)
    }

    pub fn executed_nodes(&self) -> usize {
        self.executed_nodes.load(Ordering::SeqCst)
    }

    pub fn runs_started(&self) -> u64 {
        self.runs_started.load(Ordering::SeqCst)
    }

    /// Starts the claimed run and returns its id.
    pub fn begin_run(&self, label: &str) -> u64 {
        debug_assert!(self.is_running(), "begin_run without a claim");

        self.store_progress(0.0);
        *self.parallel_progress.lock() = 0.0;
        self.executed_nodes.store(0, Ordering::SeqCst);
        let run_id = self.runs_started.fetch_add(1, Ordering::SeqCst) + 1;

        let expected_nodes = self.expected_nodes();
        debug!(run_id, label, expected_nodes, "Run started");
        self.bus.send(EvaluationEvent::RunStarted {
            run_id,
            label: label.to_string(),
            expected_nodes,
        });

        run_id
    }

    /// Publishes the terminal state of the current run.
    pub fn finish_run(&self, executed_nodes: usize, node_errors: usize) -> RunState {
        let state = if self.interrupted() {
            RunState::Interrupted
        } else {
            RunState::Completed
        };
        self.state.store(state as u8, Ordering::SeqCst);

        let run_id = self.runs_started();
        debug!(run_id, %state, executed_nodes, node_errors, "Run finished");
        self.bus.send(EvaluationEvent::RunCompleted {
            run_id,
            state,
            executed_nodes,
            node_errors,
        });

        state
    }

    pub fn progress(&self) -> f32 {
        f32::from_bits(self.progress_bits.load(Ordering::SeqCst))
    }

    pub fn report_progress(&self, percent: f32) {
        self.store_progress(percent);
        self.bus.send(EvaluationEvent::Progress {
            run_id: self.runs_started(),
            percent,
        });
    }

    /// Adds a delta from one of several threads working on the same node.
    /// The published value is the plain sum of every delta since
    /// `begin_node`.
    pub fn report_parallel_progress(&self, delta: f32) {
        let mut total = self.parallel_progress.lock();
        *total += delta;
        self.report_progress(*total);
    }

    /// Resets the per-node parallel accumulator before an operator runs.
    pub fn begin_node(&self) {
        *self.parallel_progress.lock() = 0.0;
    }

    /// Counts a handled node and reports the run-level percentage.
    pub fn node_finished(&self) {
        let executed = self.executed_nodes.fetch_add(1, Ordering::SeqCst) + 1;
        let expected = self.expected_nodes().max(executed);
        self.report_progress(executed as f32 * 100.0 / expected as f32);
    }

    pub fn interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    fn store_progress(&self, percent: f32) {
        self.progress_bits
            .store(percent.to_bits(), Ordering::SeqCst);
    }
}
