//! Table/row S/X locking with FIFO wait queues and wait-for-graph deadlock
//! detection, in the style of `ConcurrentStatus`'s latch maps and
//! `WaitForGraph`'s cycle check — generalized from page ids to a
//! `LockTarget` that covers both whole-table and single-row granularity.

use std::collections::{HashMap, HashSet};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::common::{Oid, Rid, TxnId};
use crate::error::{DbResult, Status};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockTarget {
    Table(Oid),
    Row(Oid, Rid),
}

#[derive(Debug, Clone, Copy)]
struct LockRequest {
    txn_id: TxnId,
    mode: LockMode,
    granted: bool,
}

#[derive(Default)]
struct Queues {
    by_target: HashMap<LockTarget, Vec<LockRequest>>,
    held_by_txn: HashMap<TxnId, HashSet<LockTarget>>,
}

/// DFS cycle detection over "txn A waits for txn B" edges, same shape as
/// the teacher's `WaitForGraph`.
struct WaitForGraph {
    edges: HashMap<TxnId, HashSet<TxnId>>,
}

impl WaitForGraph {
    fn new() -> WaitForGraph {
        WaitForGraph { edges: HashMap::new() }
    }

    fn add_edge(&mut self, from: TxnId, to: TxnId) {
        self.edges.entry(from).or_default().insert(to);
    }

    fn remove_waiter(&mut self, txn_id: TxnId) {
        self.edges.remove(&txn_id);
    }

    fn has_cycle_from(&self, start: TxnId) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![start];
        let mut path = HashSet::new();
        path.insert(start);
        while let Some(node) = stack.pop() {
            if !visited.insert(node) {
                continue;
            }
            if let Some(next) = self.edges.get(&node) {
                for &n in next {
                    if n == start {
                        return true;
                    }
                    if path.insert(n) {
                        stack.push(n);
                    }
                }
            }
        }
        false
    }
}

pub struct LockManagerOptions {
    pub wait_timeout: Duration,
    pub enable_deadlock_detection: bool,
}

impl Default for LockManagerOptions {
    fn default() -> LockManagerOptions {
        LockManagerOptions {
            wait_timeout: Duration::from_millis(5000),
            enable_deadlock_detection: true,
        }
    }
}

pub struct LockManager {
    queues: Mutex<Queues>,
    wait_graph: Mutex<WaitForGraph>,
    condvar: Condvar,
    options: LockManagerOptions,
}

impl LockManager {
    pub fn new(options: LockManagerOptions) -> LockManager {
        LockManager {
            queues: Mutex::new(Queues::default()),
            wait_graph: Mutex::new(WaitForGraph::new()),
            condvar: Condvar::new(),
            options,
        }
    }

    pub fn lock_shared(&self, txn_id: TxnId, target: LockTarget) -> DbResult<()> {
        self.acquire(txn_id, target, LockMode::Shared)
    }

    pub fn lock_exclusive(&self, txn_id: TxnId, target: LockTarget) -> DbResult<()> {
        self.acquire(txn_id, target, LockMode::Exclusive)
    }

    /// Upgrades an already-held shared lock to exclusive. Must be atomic
    /// with respect to other waiters: the upgrade request keeps the
    /// txn's place rather than releasing and re-queuing.
    pub fn upgrade(&self, txn_id: TxnId, target: LockTarget) -> DbResult<()> {
        {
            let mut queues = self.queues.lock().unwrap();
            let requests = queues.by_target.entry(target).or_default();
            if let Some(req) = requests.iter_mut().find(|r| r.txn_id == txn_id) {
                req.mode = LockMode::Exclusive;
                req.granted = false;
            }
        }
        self.acquire(txn_id, target, LockMode::Exclusive)
    }

    fn acquire(&self, txn_id: TxnId, target: LockTarget, mode: LockMode) -> DbResult<()> {
        let deadline = Instant::now() + self.options.wait_timeout;
        let mut queues = self.queues.lock().unwrap();

        if !queues.by_target.entry(target).or_default().iter().any(|r| r.txn_id == txn_id) {
            queues.by_target.get_mut(&target).unwrap().push(LockRequest { txn_id, mode, granted: false });
        }

        loop {
            if Self::can_grant(&queues, target, txn_id, mode) {
                let req = queues.by_target.get_mut(&target).unwrap().iter_mut().find(|r| r.txn_id == txn_id).unwrap();
                req.granted = true;
                req.mode = mode;
                queues.held_by_txn.entry(txn_id).or_default().insert(target);
                self.wait_graph.lock().unwrap().remove_waiter(txn_id);
                return Ok(());
            }

            if self.options.enable_deadlock_detection {
                self.record_wait_edges(&queues, target, txn_id, mode);
                if self.wait_graph.lock().unwrap().has_cycle_from(txn_id) {
                    self.wait_graph.lock().unwrap().remove_waiter(txn_id);
                    queues.by_target.get_mut(&target).unwrap().retain(|r| r.txn_id != txn_id);
                    return Err(Status::aborted(format!("deadlock detected waiting on lock for txn {}", txn_id)));
                }
            }

            let now = Instant::now();
            if now >= deadline {
                queues.by_target.get_mut(&target).unwrap().retain(|r| r.txn_id != txn_id);
                return Err(Status::timeout(format!("lock wait timed out for txn {}", txn_id)));
            }
            let (guard, _) = self.condvar.wait_timeout(queues, deadline - now).unwrap();
            queues = guard;
        }
    }

    fn can_grant(queues: &Queues, target: LockTarget, txn_id: TxnId, mode: LockMode) -> bool {
        let requests = match queues.by_target.get(&target) {
            Some(r) => r,
            None => return true,
        };
        for other in requests {
            if other.txn_id == txn_id || !other.granted {
                continue;
            }
            match (mode, other.mode) {
                (LockMode::Shared, LockMode::Shared) => {}
                _ => return false,
            }
        }
        true
    }

    fn record_wait_edges(&self, queues: &Queues, target: LockTarget, txn_id: TxnId, mode: LockMode) {
        let mut graph = self.wait_graph.lock().unwrap();
        if let Some(requests) = queues.by_target.get(&target) {
            for other in requests {
                if other.txn_id == txn_id || !other.granted {
                    continue;
                }
                let conflicts = !matches!((mode, other.mode), (LockMode::Shared, LockMode::Shared));
                if conflicts {
                    graph.add_edge(txn_id, other.txn_id);
                }
            }
        }
    }

    /// Releases every lock `txn_id` holds (called on commit/abort).
    pub fn release_all(&self, txn_id: TxnId) {
        let mut queues = self.queues.lock().unwrap();
        if let Some(targets) = queues.held_by_txn.remove(&txn_id) {
            for target in targets {
                if let Some(requests) = queues.by_target.get_mut(&target) {
                    requests.retain(|r| r.txn_id != txn_id);
                }
            }
        }
        self.wait_graph.lock().unwrap().remove_waiter(txn_id);
        self.condvar.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_shared_locks_coexist() {
        let lm = LockManager::new(LockManagerOptions::default());
        let t = LockTarget::Table(1);
        lm.lock_shared(1, t).unwrap();
        lm.lock_shared(2, t).unwrap();
    }

    #[test]
    fn exclusive_blocks_and_times_out() {
        let lm = LockManager::new(LockManagerOptions {
            wait_timeout: Duration::from_millis(50),
            enable_deadlock_detection: true,
        });
        let t = LockTarget::Table(1);
        lm.lock_exclusive(1, t).unwrap();
        assert!(lm.lock_shared(2, t).is_err());
    }

    #[test]
    fn release_lets_waiter_in() {
        let lm = LockManager::new(LockManagerOptions::default());
        let t = LockTarget::Table(1);
        lm.lock_exclusive(1, t).unwrap();
        lm.release_all(1);
        lm.lock_exclusive(2, t).unwrap();
    }
}
