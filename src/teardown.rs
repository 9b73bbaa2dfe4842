//! Teardown of everything a scenario started.
//!
//! Scenarios register what they launch (process ids) and which stale
//! process families to sweep (patterns) as they go. The run context owns the
//! list and drains it exactly once when the scenario exits, whether the body
//! finished, failed, or was cancelled by a termination signal.
//!
//! Draining groups actions per node: spawned processes are terminated by id
//! first, then the node receives a single kill-by-pattern covering every
//! registered pattern.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::node::{Node, ProcessId};

/// Teardown list state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownState {
    /// Nothing registered.
    Idle,
    /// Actions waiting to be drained.
    Armed,
    /// A drain is in progress.
    Draining,
}

/// What to stop on a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeardownTarget {
    Process(ProcessId),
    Pattern(String),
}

struct TeardownAction {
    node: Arc<dyn Node>,
    target: TeardownTarget,
}

/// Summary of one drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub nodes: usize,
    pub processes: usize,
    pub patterns: usize,
}

/// Explicit teardown list owned by the run context.
pub struct Teardown {
    actions: Mutex<Vec<TeardownAction>>,
    draining: AtomicBool,
}

impl Teardown {
    pub fn new() -> Self {
        Self {
            actions: Mutex::new(Vec::new()),
            draining: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> TeardownState {
        if self.draining.load(Ordering::SeqCst) {
            TeardownState::Draining
        } else if self.actions.lock().is_empty() {
            TeardownState::Idle
        } else {
            TeardownState::Armed
        }
    }

    /// Number of actions waiting to be drained.
    pub fn pending(&self) -> usize {
        self.actions.lock().len()
    }

    /// Stop `pid` on `node` at teardown.
    pub fn register_process(&self, node: &Arc<dyn Node>, pid: ProcessId) {
        debug!(node = node.label(), %pid, "teardown: track process");
        self.push(node, TeardownTarget::Process(pid));
    }

    /// Sweep processes matching `pattern` on `node` at teardown.
    pub fn register_pattern(&self, node: &Arc<dyn Node>, pattern: &str) {
        debug!(node = node.label(), pattern, "teardown: track pattern");
        self.push(node, TeardownTarget::Pattern(pattern.to_string()));
    }

    fn push(&self, node: &Arc<dyn Node>, target: TeardownTarget) {
        self.actions.lock().push(TeardownAction {
            node: Arc::clone(node),
            target,
        });
    }

    /// Execute and discard every registered action. A second call with
    /// nothing registered in between does nothing.
    pub async fn drain(&self) -> TeardownReport {
        let actions = std::mem::take(&mut *self.actions.lock());
        if actions.is_empty() {
            return TeardownReport::default();
        }
        self.draining.store(true, Ordering::SeqCst);

        let mut report = TeardownReport::default();
        for (node, targets) in group_by_node(actions) {
            report.nodes += 1;
            let mut patterns: Vec<String> = Vec::new();
            for target in targets {
                match target {
                    TeardownTarget::Process(pid) => {
                        node.terminate(pid).await;
                        report.processes += 1;
                    }
                    TeardownTarget::Pattern(p) => {
                        for alt in p.split('|').filter(|a| !a.is_empty()) {
                            if !patterns.iter().any(|known| known == alt) {
                                patterns.push(alt.to_string());
                            }
                        }
                    }
                }
            }
            if !patterns.is_empty() {
                report.patterns += patterns.len();
                node.kill(&patterns.join("|")).await;
            }
        }

        self.draining.store(false, Ordering::SeqCst);
        info!(
            nodes = report.nodes,
            processes = report.processes,
            patterns = report.patterns,
            "teardown complete"
        );
        report
    }
}

impl Default for Teardown {
    fn default() -> Self {
        Self::new()
    }
}

/// Group actions by node identity, preserving first-registration order.
fn group_by_node(actions: Vec<TeardownAction>) -> Vec<(Arc<dyn Node>, Vec<TeardownTarget>)> {
    let mut groups: Vec<(Arc<dyn Node>, Vec<TeardownTarget>)> = Vec::new();
    for action in actions {
        match groups
            .iter_mut()
            .find(|(node, _)| same_node(node, &action.node))
        {
            Some((_, targets)) => targets.push(action.target),
            None => groups.push((action.node, vec![action.target])),
        }
    }
    groups
}

fn same_node(a: &Arc<dyn Node>, b: &Arc<dyn Node>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
