//! Write-ahead log: length-prefixed records with a fixed 32-byte header,
//! a bounded in-memory buffer, and a linear recovery scan.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use bytes::{Buf, BufMut, BytesMut};
use log::{debug, warn};

use crate::common::{Lsn, TxnId, INVALID_LSN};
use crate::error::{DbResult, Status};

pub const WAL_HEADER_SIZE: usize = 32;

/// Records larger than this bypass the in-memory buffer and are written
/// (and the buffer flushed first) directly.
const BUFFER_CAPACITY: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    Begin = 0,
    Commit = 1,
    Abort = 2,
    Insert = 3,
    Update = 4,
    Delete = 5,
}

impl RecordType {
    fn from_u8(v: u8) -> DbResult<RecordType> {
        Ok(match v {
            0 => RecordType::Begin,
            1 => RecordType::Commit,
            2 => RecordType::Abort,
            3 => RecordType::Insert,
            4 => RecordType::Update,
            5 => RecordType::Delete,
            other => return Err(Status::corruption(format!("unknown WAL record type {}", other))),
        })
    }
}

#[derive(Debug, Clone)]
pub struct WalRecord {
    pub record_type: RecordType,
    pub lsn: Lsn,
    pub txn_id: TxnId,
    pub prev_lsn: Lsn,
    pub payload: Vec<u8>,
}

struct WalState {
    file: File,
    /// Bytes appended but not yet `flush()`ed.
    buffer: BytesMut,
    next_lsn: Lsn,
    flushed_lsn: Lsn,
}

/// One log file per database, guarded by a single mutex — the teacher's
/// `LogManager` serializes all log access the same way.
pub struct Wal {
    path: PathBuf,
    state: Mutex<WalState>,
}

impl Wal {
    pub fn open(path: impl AsRef<Path>) -> DbResult<Wal> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).read(true).write(true).open(&path)?;
        let len = file.metadata()?.len();
        let next_lsn = if len == 0 { 1 } else { Self::scan_max_lsn(&path)? + 1 };
        debug!("wal opened at {:?}, next_lsn={}", path, next_lsn);
        Ok(Wal {
            path,
            state: Mutex::new(WalState {
                file,
                buffer: BytesMut::with_capacity(BUFFER_CAPACITY),
                next_lsn,
                flushed_lsn: INVALID_LSN,
            }),
        })
    }

    fn scan_max_lsn(path: &Path) -> DbResult<Lsn> {
        let mut max_lsn = INVALID_LSN;
        for record in Self::read_log_at(path)? {
            max_lsn = max_lsn.max(record.lsn);
        }
        Ok(max_lsn)
    }

    /// Appends one record to the in-memory buffer (or, if it alone exceeds
    /// the buffer's capacity, flushes first and writes it straight through)
    /// and returns its assigned LSN. Does not itself guarantee durability —
    /// call `flush()` for that.
    pub fn append(&self, record_type: RecordType, txn_id: TxnId, prev_lsn: Lsn, payload: &[u8]) -> DbResult<Lsn> {
        let mut state = self.state.lock().unwrap();
        let lsn = state.next_lsn;
        state.next_lsn += 1;

        let mut framed = BytesMut::with_capacity(WAL_HEADER_SIZE + payload.len());
        framed.put_u8(record_type as u8);
        framed.put_u8(0); // reserved
        framed.put_u16_le(0); // reserved
        framed.put_u32_le(payload.len() as u32);
        framed.put_u64_le(lsn);
        framed.put_u64_le(txn_id);
        framed.put_u64_le(prev_lsn);
        framed.put_slice(payload);
        debug_assert_eq!(framed.len() - payload.len(), WAL_HEADER_SIZE);

        if framed.len() > BUFFER_CAPACITY {
            Self::flush_locked(&mut state)?;
            state.file.write_all(&framed)?;
            state.file.sync_data()?;
            state.flushed_lsn = lsn;
        } else {
            if state.buffer.len() + framed.len() > BUFFER_CAPACITY {
                Self::flush_locked(&mut state)?;
            }
            state.buffer.extend_from_slice(&framed);
        }
        Ok(lsn)
    }

    /// Forces the in-memory buffer to disk and fsyncs, advancing
    /// `flushed_lsn` to the last LSN appended so far.
    pub fn flush(&self) -> DbResult<()> {
        let mut state = self.state.lock().unwrap();
        Self::flush_locked(&mut state)
    }

    fn flush_locked(state: &mut WalState) -> DbResult<()> {
        if state.buffer.is_empty() {
            return Ok(());
        }
        state.file.write_all(&state.buffer)?;
        state.file.sync_data()?;
        state.buffer.clear();
        state.flushed_lsn = state.next_lsn - 1;
        Ok(())
    }

    pub fn flushed_lsn(&self) -> Lsn {
        self.state.lock().unwrap().flushed_lsn
    }

    /// Linear scan of the on-disk log, for crash recovery. Only sees
    /// records that have actually been flushed.
    pub fn read_log(&self) -> DbResult<Vec<WalRecord>> {
        self.flush()?;
        Self::read_log_at(&self.path)
    }

    fn read_log_at(path: &Path) -> DbResult<Vec<WalRecord>> {
        let mut file = OpenOptions::new().read(true).open(path)?;
        file.seek(SeekFrom::Start(0))?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        let mut records = Vec::new();
        let mut cursor = &bytes[..];
        while cursor.len() >= WAL_HEADER_SIZE {
            let record_type = RecordType::from_u8(cursor.get_u8())?;
            cursor.get_u8();
            cursor.get_u16_le();
            let size = cursor.get_u32_le() as usize;
            let lsn = cursor.get_u64_le();
            let txn_id = cursor.get_u64_le();
            let prev_lsn = cursor.get_u64_le();
            if cursor.len() < size {
                warn!("wal truncated mid-record at lsn {}, stopping recovery scan", lsn);
                break;
            }
            let payload = cursor[..size].to_vec();
            cursor.advance(size);
            records.push(WalRecord { record_type, lsn, txn_id, prev_lsn, payload });
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_path(name: &str) -> PathBuf {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        std::mem::forget(dir);
        path
    }

    #[test]
    fn append_flush_and_read_back() {
        let wal = Wal::open(tmp_path("a.wal")).unwrap();
        let lsn1 = wal.append(RecordType::Begin, 1, INVALID_LSN, &[]).unwrap();
        let lsn2 = wal.append(RecordType::Commit, 1, lsn1, &[]).unwrap();
        wal.flush().unwrap();
        let records = wal.read_log().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].lsn, lsn1);
        assert_eq!(records[1].prev_lsn, lsn1);
        assert_eq!(records[1].lsn, lsn2);
    }

    #[test]
    fn lsns_are_monotonic_across_reopen() {
        let path = tmp_path("b.wal");
        {
            let wal = Wal::open(&path).unwrap();
            wal.append(RecordType::Begin, 1, INVALID_LSN, &[]).unwrap();
            wal.flush().unwrap();
        }
        let wal = Wal::open(&path).unwrap();
        let lsn = wal.append(RecordType::Begin, 2, INVALID_LSN, &[]).unwrap();
        assert!(lsn > 1);
    }

    #[test]
    fn large_record_bypasses_buffer() {
        let wal = Wal::open(tmp_path("c.wal")).unwrap();
        let payload = vec![7u8; BUFFER_CAPACITY + 10];
        wal.append(RecordType::Update, 1, INVALID_LSN, &payload).unwrap();
        let records = wal.read_log().unwrap();
        assert_eq!(records[0].payload.len(), payload.len());
    }
}
