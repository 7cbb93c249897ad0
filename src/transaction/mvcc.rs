//! Per-tuple MVCC version metadata and snapshot visibility.
//!
//! Fields and formulas follow the data model of a transaction manager that
//! tags every row version with the id of its creator and (if applicable)
//! its deleter, plus the commit timestamps at which each side became
//! effective. A version is visible to a reader iff it was created before
//! the reader's snapshot began and has not been deleted by a transaction
//! that committed before the snapshot began.

use crate::common::TxnId;

/// Sentinel meaning "not yet committed" for `begin_ts`, and "not deleted
/// (or deleter not yet committed)" for `end_ts`.
pub const TS_PENDING: u64 = 0;
pub const TS_MAX: u64 = u64::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionMeta {
    pub created_by: TxnId,
    pub deleted_by: Option<TxnId>,
    pub begin_ts: u64,
    pub end_ts: u64,
}

impl VersionMeta {
    /// A version nobody wrote transactionally: visible to any reader, never
    /// deleted. Used as the default for tuples built outside a tracked
    /// transaction (tests, internal bootstrapping).
    pub fn auto_committed() -> VersionMeta {
        VersionMeta {
            created_by: 0,
            deleted_by: None,
            begin_ts: 1,
            end_ts: TS_MAX,
        }
    }

    /// A fresh row just inserted by `creator`. Invisible to everyone but
    /// `creator` until `finalize_commit` fills in `begin_ts`.
    pub fn init_version(creator: TxnId) -> VersionMeta {
        VersionMeta {
            created_by: creator,
            deleted_by: None,
            begin_ts: TS_PENDING,
            end_ts: TS_MAX,
        }
    }

    /// Marks this version deleted by `deleter`. `end_ts` stays `TS_MAX`
    /// until `deleter` commits.
    pub fn mark_deleted(&mut self, deleter: TxnId) {
        self.deleted_by = Some(deleter);
        self.end_ts = TS_MAX;
    }

    /// Called once `txn` commits at `commit_ts`: fills in whichever of
    /// `begin_ts`/`end_ts` this transaction left pending.
    pub fn finalize_commit(&mut self, txn: TxnId, commit_ts: u64) {
        if self.created_by == txn && self.begin_ts == TS_PENDING {
            self.begin_ts = commit_ts;
        }
        if self.deleted_by == Some(txn) {
            self.end_ts = commit_ts;
        }
    }

    /// Called when the creating transaction aborts: this version must never
    /// be visible to anyone, present or future.
    pub fn rollback_version(&mut self) {
        self.begin_ts = TS_MAX;
        self.end_ts = 0;
    }

    /// Snapshot-isolation visibility: `reader` sees its own uncommitted
    /// writes, plus any version committed strictly before its snapshot
    /// (`reader_start_ts`) that it has not itself deleted and that isn't
    /// hidden by a deletion some other transaction already committed before
    /// the snapshot began.
    pub fn is_visible(&self, reader: TxnId, reader_start_ts: u64) -> bool {
        if self.created_by == reader {
            return self.deleted_by != Some(reader);
        }
        if self.begin_ts == TS_PENDING || self.begin_ts > reader_start_ts {
            return false;
        }
        match self.deleted_by {
            None => true,
            Some(deleter) if deleter == reader => false,
            Some(_) => self.end_ts == TS_MAX || self.end_ts > reader_start_ts,
        }
    }

    /// Read-committed visibility: consults a live "is this txn committed"
    /// oracle instead of comparing timestamps against a fixed snapshot.
    pub fn is_visible_read_committed(&self, reader: TxnId, is_committed: impl Fn(TxnId) -> bool) -> bool {
        if self.created_by == reader {
            return self.deleted_by != Some(reader);
        }
        if !is_committed(self.created_by) {
            return false;
        }
        match self.deleted_by {
            None => true,
            Some(deleter) if deleter == reader => false,
            Some(deleter) => !is_committed(deleter),
        }
    }
}

impl Default for VersionMeta {
    fn default() -> VersionMeta {
        VersionMeta::auto_committed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_uncommitted_insert_is_visible_to_creator() {
        let v = VersionMeta::init_version(1);
        assert!(v.is_visible(1, 0));
    }

    #[test]
    fn uncommitted_insert_invisible_to_others() {
        let v = VersionMeta::init_version(1);
        assert!(!v.is_visible(2, 100));
    }

    #[test]
    fn committed_insert_visible_once_snapshot_starts_after() {
        let mut v = VersionMeta::init_version(1);
        v.finalize_commit(1, 5);
        assert!(v.is_visible(2, 10));
        assert!(!v.is_visible(2, 4));
    }

    #[test]
    fn deleted_and_committed_is_invisible_past_end_ts() {
        let mut v = VersionMeta::init_version(1);
        v.finalize_commit(1, 1);
        v.mark_deleted(2);
        v.finalize_commit(2, 5);
        assert!(v.is_visible(3, 3));
        assert!(!v.is_visible(3, 10));
    }

    #[test]
    fn own_delete_is_invisible_to_self() {
        let mut v = VersionMeta::init_version(1);
        v.finalize_commit(1, 1);
        v.mark_deleted(2);
        assert!(!v.is_visible(2, 100));
    }

    #[test]
    fn uncommitted_delete_still_visible_to_others() {
        let mut v = VersionMeta::init_version(1);
        v.finalize_commit(1, 1);
        v.mark_deleted(2);
        assert!(v.is_visible(3, 100));
    }

    #[test]
    fn rollback_hides_forever() {
        let mut v = VersionMeta::init_version(1);
        v.rollback_version();
        assert!(!v.is_visible(1, u64::MAX));
        assert!(!v.is_visible(2, u64::MAX));
    }

    #[test]
    fn read_committed_sees_committed_creator_immediately() {
        let v = VersionMeta::init_version(1);
        assert!(v.is_visible_read_committed(2, |id| id == 1));
        assert!(!v.is_visible_read_committed(2, |_| false));
    }
}
