//! Fixed-size page I/O over a single database file.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Mutex;

use log::{debug, trace};

use crate::common::PageId;
use crate::error::{DbResult, Status};

/// Owns the file handle exclusively; all methods serialize on an internal
/// mutex, matching the single-writer discipline the teacher applies to its
/// own `RefCell<File>` handle in `btree/file.rs`.
pub struct DiskManager {
    file: Mutex<File>,
    page_size: usize,
    num_pages: AtomicI32,
}

impl DiskManager {
    pub fn open(path: impl AsRef<Path>, page_size: usize) -> DbResult<DiskManager> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .map_err(|e| Status::io_error(format!("open {:?}: {}", path, e)))?;

        let len = file
            .metadata()
            .map_err(|e| Status::io_error(e.to_string()))?
            .len();
        let num_pages = (len as usize / page_size) as i32;
        debug!("disk manager opened {:?}, num_pages={}", path, num_pages);

        Ok(DiskManager {
            file: Mutex::new(file),
            page_size,
            num_pages: AtomicI32::new(num_pages),
        })
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn num_pages(&self) -> i32 {
        self.num_pages.load(Ordering::SeqCst)
    }

    /// Reads `page_id` into `out`. Reading past EOF zero-fills the buffer
    /// rather than erroring, matching the sparse-file allocation model.
    pub fn read_page(&self, page_id: PageId, out: &mut [u8]) -> DbResult<()> {
        if page_id < 0 {
            return Err(Status::invalid_argument("negative page id"));
        }
        if out.len() != self.page_size {
            return Err(Status::invalid_argument("buffer size mismatch"));
        }
        let offset = page_id as u64 * self.page_size as u64;
        let mut file = self.file.lock().unwrap();
        let file_len = file
            .metadata()
            .map_err(|e| Status::io_error(e.to_string()))?
            .len();
        if offset >= file_len {
            for b in out.iter_mut() {
                *b = 0;
            }
            return Ok(());
        }
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| Status::io_error(e.to_string()))?;
        let mut read = 0usize;
        while read < out.len() {
            match file.read(&mut out[read..]) {
                Ok(0) => break,
                Ok(n) => read += n,
                Err(e) => return Err(Status::io_error(e.to_string())),
            }
        }
        for b in out.iter_mut().skip(read) {
            *b = 0;
        }
        trace!("read_page {} ({} bytes)", page_id, read);
        Ok(())
    }

    /// Writes `in_` to `page_id`, flushing to the OS immediately.
    pub fn write_page(&self, page_id: PageId, in_: &[u8]) -> DbResult<()> {
        if page_id < 0 {
            return Err(Status::invalid_argument("negative page id"));
        }
        if in_.len() != self.page_size {
            return Err(Status::invalid_argument("buffer size mismatch"));
        }
        let offset = page_id as u64 * self.page_size as u64;
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| Status::io_error(e.to_string()))?;
        file.write_all(in_)
            .map_err(|e| Status::io_error(e.to_string()))?;
        file.flush().map_err(|e| Status::io_error(e.to_string()))?;
        trace!("write_page {} ({} bytes)", page_id, in_.len());
        Ok(())
    }

    /// Allocates a new page id and bumps the allocation counter. Does not
    /// touch the file; the caller is expected to write the page's contents.
    pub fn allocate_page(&self) -> PageId {
        self.num_pages.fetch_add(1, Ordering::SeqCst)
    }

    /// No page-id reuse in v1; documented limitation (spec §4.1).
    pub fn deallocate_page(&self, _page_id: PageId) -> DbResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let dm = DiskManager::open(&path, 4096).unwrap();
        let pid = dm.allocate_page();
        let mut buf = vec![7u8; 4096];
        dm.write_page(pid, &buf).unwrap();
        let mut out = vec![0u8; 4096];
        dm.read_page(pid, &mut out).unwrap();
        assert_eq!(buf, out);

        buf[0] = 9;
        dm.write_page(pid, &buf).unwrap();
        dm.read_page(pid, &mut out).unwrap();
        assert_eq!(out[0], 9);
    }

    #[test]
    fn read_past_eof_zero_fills() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let dm = DiskManager::open(&path, 4096).unwrap();
        let mut out = vec![0xffu8; 4096];
        dm.read_page(3, &mut out).unwrap();
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn negative_page_id_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let dm = DiskManager::open(&path, 4096).unwrap();
        let buf = vec![0u8; 4096];
        assert_eq!(
            dm.write_page(-1, &buf).unwrap_err().code(),
            crate::error::StatusCode::InvalidArgument
        );
    }
}
