//! Transaction lifecycle: monotonic ids and timestamps, write-set tracking
//! for undo, lock bookkeeping, and WAL record emission around
//! BEGIN/COMMIT/ABORT.

pub mod lock_manager;
pub mod mvcc;
pub mod wal;

pub use lock_manager::{LockManager, LockManagerOptions, LockMode, LockTarget};
pub use mvcc::VersionMeta;
pub use wal::{RecordType, Wal, WalRecord};

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use log::{debug, info};

use crate::common::{Lsn, Oid, Rid, TxnId, INVALID_LSN, INVALID_TXN_ID};
use crate::error::{DbResult, Status};

/// Two-phase locking phase, plus the two terminal outcomes. A transaction
/// acquires locks only while `Growing`; the first release (which, in this
/// engine, happens in one shot at commit/abort time) moves it to
/// `Shrinking`, after which it may only release, never acquire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Growing,
    Shrinking,
    Committed,
    Aborted,
}

/// Snapshot isolation reads a consistent snapshot as of `start_ts`. Read
/// committed instead consults a live "is this txn committed" oracle on
/// every read, per spec §4.13's read-committed variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    Snapshot,
    ReadCommitted,
}

impl Default for IsolationLevel {
    fn default() -> IsolationLevel {
        IsolationLevel::Snapshot
    }
}

/// One entry in a transaction's write set, enough to undo the operation:
/// Insert undoes by deleting, Delete/Update undo by restoring `old_bytes`.
#[derive(Debug, Clone)]
pub enum WriteRecord {
    Insert { table_oid: Oid, rid: Rid },
    Delete { table_oid: Oid, rid: Rid, old_bytes: Vec<u8> },
    Update { table_oid: Oid, rid: Rid, old_bytes: Vec<u8> },
}

pub struct Transaction {
    pub id: TxnId,
    pub state: TransactionState,
    pub isolation: IsolationLevel,
    pub start_ts: u64,
    pub commit_ts: Option<u64>,
    pub write_set: Vec<WriteRecord>,
    pub prev_lsn: Lsn,
    pub page_locks: HashSet<Rid>,
    pub table_locks: HashSet<Oid>,
}

impl Transaction {
    fn new(id: TxnId, start_ts: u64) -> Transaction {
        Transaction {
            id,
            state: TransactionState::Growing,
            isolation: IsolationLevel::default(),
            start_ts,
            commit_ts: None,
            write_set: Vec::new(),
            prev_lsn: INVALID_LSN,
            page_locks: HashSet::new(),
            table_locks: HashSet::new(),
        }
    }
}

/// Owns the WAL and the table of currently-active transactions. The
/// txn/write-set bookkeeping lives here; actually applying storage-level
/// undo and version-metadata finalization is delegated to a caller-supplied
/// closure (`abort`/`commit`) since this type has no access to table heaps
/// or the catalog — that wiring happens in the database layer.
pub struct TransactionManager {
    wal: Wal,
    next_txn_id: AtomicU64,
    next_ts: AtomicU64,
    active: Mutex<HashMap<TxnId, Transaction>>,
}

impl TransactionManager {
    pub fn new(wal: Wal) -> TransactionManager {
        TransactionManager {
            wal,
            next_txn_id: AtomicU64::new(1),
            next_ts: AtomicU64::new(1),
            active: Mutex::new(HashMap::new()),
        }
    }

    pub fn wal(&self) -> &Wal {
        &self.wal
    }

    pub fn begin(&self) -> DbResult<TxnId> {
        let id = self.next_txn_id.fetch_add(1, Ordering::SeqCst);
        let start_ts = self.next_ts.fetch_add(1, Ordering::SeqCst);
        let lsn = self.wal.append(RecordType::Begin, id, INVALID_LSN, &[])?;
        let mut txn = Transaction::new(id, start_ts);
        txn.prev_lsn = lsn;
        self.active.lock().unwrap().insert(id, txn);
        debug!("txn {} began at lsn {}, start_ts {}", id, lsn, start_ts);
        Ok(id)
    }

    pub fn start_ts(&self, txn_id: TxnId) -> Option<u64> {
        self.active.lock().unwrap().get(&txn_id).map(|t| t.start_ts)
    }

    pub fn isolation(&self, txn_id: TxnId) -> Option<IsolationLevel> {
        self.active.lock().unwrap().get(&txn_id).map(|t| t.isolation)
    }

    /// Records that `txn_id` has acquired a table-level lock, for the
    /// `table_locks` bookkeeping spec §3 asks `Transaction` to carry.
    pub fn note_table_lock(&self, txn_id: TxnId, table_oid: Oid) {
        if let Some(txn) = self.active.lock().unwrap().get_mut(&txn_id) {
            txn.table_locks.insert(table_oid);
        }
    }

    /// Records that `txn_id` has acquired a row-level lock.
    pub fn note_page_lock(&self, txn_id: TxnId, rid: Rid) {
        if let Some(txn) = self.active.lock().unwrap().get_mut(&txn_id) {
            txn.page_locks.insert(rid);
        }
    }

    pub fn record_write(&self, txn_id: TxnId, record: WriteRecord) -> DbResult<()> {
        let mut active = self.active.lock().unwrap();
        let txn = active.get_mut(&txn_id).ok_or_else(|| Status::not_found(format!("no active txn {}", txn_id)))?;
        let (record_type, payload): (RecordType, Vec<u8>) = match &record {
            WriteRecord::Insert { .. } => (RecordType::Insert, Vec::new()),
            WriteRecord::Delete { old_bytes, .. } => (RecordType::Delete, old_bytes.clone()),
            WriteRecord::Update { old_bytes, .. } => (RecordType::Update, old_bytes.clone()),
        };
        let lsn = self.wal.append(record_type, txn_id, txn.prev_lsn, &payload)?;
        txn.prev_lsn = lsn;
        txn.write_set.push(record);
        Ok(())
    }

    /// Flushes the WAL, assigns `commit_ts`, runs `finalize` over the
    /// write set to fix up MVCC version metadata, appends the COMMIT
    /// record, and drops the transaction from the active set.
    pub fn commit(&self, txn_id: TxnId, mut finalize: impl FnMut(&WriteRecord, u64)) -> DbResult<()> {
        let commit_ts = self.next_ts.fetch_add(1, Ordering::SeqCst);
        let (write_set, prev_lsn) = {
            let mut active = self.active.lock().unwrap();
            let txn = active.get_mut(&txn_id).ok_or_else(|| Status::not_found(format!("no active txn {}", txn_id)))?;
            // First (and, in this engine, only) release point: growing
            // phase ends here.
            txn.state = TransactionState::Shrinking;
            txn.commit_ts = Some(commit_ts);
            let write_set = std::mem::take(&mut txn.write_set);
            let prev_lsn = txn.prev_lsn;
            txn.state = TransactionState::Committed;
            (write_set, prev_lsn)
        };
        for record in &write_set {
            finalize(record, commit_ts);
        }
        self.wal.flush()?;
        self.wal.append(RecordType::Commit, txn_id, prev_lsn, &[])?;
        self.wal.flush()?;
        self.active.lock().unwrap().remove(&txn_id);
        info!("txn {} committed at ts {}", txn_id, commit_ts);
        Ok(())
    }

    /// Undoes the write set in reverse via `apply_undo`, then appends the
    /// ABORT record and drops the transaction.
    pub fn abort(&self, txn_id: TxnId, mut apply_undo: impl FnMut(&WriteRecord)) -> DbResult<()> {
        let (write_set, prev_lsn) = {
            let mut active = self.active.lock().unwrap();
            let txn = active.get_mut(&txn_id).ok_or_else(|| Status::not_found(format!("no active txn {}", txn_id)))?;
            txn.state = TransactionState::Shrinking;
            let write_set = std::mem::take(&mut txn.write_set);
            let prev_lsn = txn.prev_lsn;
            txn.state = TransactionState::Aborted;
            (write_set, prev_lsn)
        };
        for record in write_set.iter().rev() {
            apply_undo(record);
        }
        self.active.lock().unwrap().remove(&txn_id);
        self.wal.append(RecordType::Abort, txn_id, prev_lsn, &[])?;
        self.wal.flush()?;
        info!("txn {} aborted, {} writes undone", txn_id, write_set.len());
        Ok(())
    }

    pub fn is_active(&self, txn_id: TxnId) -> bool {
        txn_id != INVALID_TXN_ID && self.active.lock().unwrap().contains_key(&txn_id)
    }

    /// Snapshot of every currently-active transaction id, for callers that
    /// need the read-committed oracle rather than timestamp comparisons.
    pub fn active_txn_ids(&self) -> std::collections::HashSet<TxnId> {
        self.active.lock().unwrap().keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wal() -> Wal {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("txn.wal");
        std::mem::forget(dir);
        Wal::open(path).unwrap()
    }

    #[test]
    fn begin_commit_round_trip() {
        let tm = TransactionManager::new(wal());
        let id = tm.begin().unwrap();
        assert!(tm.is_active(id));
        tm.commit(id, |_, _| {}).unwrap();
        assert!(!tm.is_active(id));
    }

    #[test]
    fn abort_undoes_writes_in_reverse() {
        let tm = TransactionManager::new(wal());
        let id = tm.begin().unwrap();
        tm.record_write(id, WriteRecord::Insert { table_oid: 1, rid: Rid::new(0, 0) }).unwrap();
        tm.record_write(id, WriteRecord::Insert { table_oid: 1, rid: Rid::new(0, 1) }).unwrap();
        let mut undone = Vec::new();
        tm.abort(id, |r| {
            if let WriteRecord::Insert { rid, .. } = r {
                undone.push(rid.slot_id);
            }
        })
        .unwrap();
        assert_eq!(undone, vec![1, 0]);
        assert!(!tm.is_active(id));
    }

    #[test]
    fn start_ts_strictly_increases_across_begins() {
        let tm = TransactionManager::new(wal());
        let a = tm.begin().unwrap();
        let b = tm.begin().unwrap();
        assert!(tm.start_ts(a).unwrap() < tm.start_ts(b).unwrap());
    }

    #[test]
    fn commit_finalizes_write_set_with_a_single_commit_ts() {
        let tm = TransactionManager::new(wal());
        let id = tm.begin().unwrap();
        tm.record_write(id, WriteRecord::Insert { table_oid: 1, rid: Rid::new(0, 0) }).unwrap();
        tm.record_write(id, WriteRecord::Insert { table_oid: 1, rid: Rid::new(0, 1) }).unwrap();
        let mut seen_ts = Vec::new();
        tm.commit(id, |_, commit_ts| seen_ts.push(commit_ts)).unwrap();
        assert_eq!(seen_ts.len(), 2);
        assert_eq!(seen_ts[0], seen_ts[1]);
    }

    #[test]
    fn lock_bookkeeping_records_table_and_row_locks() {
        let tm = TransactionManager::new(wal());
        let id = tm.begin().unwrap();
        tm.note_table_lock(id, 7);
        tm.note_page_lock(id, Rid::new(0, 0));
        tm.commit(id, |_, _| {}).unwrap();
    }
}
