//! Frame table + page table + pinning discipline over the disk manager.

use std::collections::HashMap;
use std::sync::Mutex;

use log::{debug, trace, warn};

use crate::common::{FrameId, PageId, INVALID_PAGE_ID};
use crate::disk::DiskManager;
use crate::page::Page;

use super::replacer::LruReplacer;

struct PoolState {
    frames: Vec<Page>,
    page_table: HashMap<PageId, FrameId>,
    free_list: Vec<FrameId>,
}

/// Owns every `Page` frame; hands out guarded references whose validity
/// lasts until the caller unpins. Thread-safe: every public method takes
/// the internal mutex.
pub struct BufferPool {
    disk: DiskManager,
    replacer: LruReplacer,
    state: Mutex<PoolState>,
    page_size: usize,
}

impl BufferPool {
    pub fn new(disk: DiskManager, pool_size: usize) -> BufferPool {
        let page_size = disk.page_size();
        let frames: Vec<Page> = (0..pool_size).map(|_| Page::new(page_size)).collect();
        let free_list: Vec<FrameId> = (0..pool_size as FrameId).rev().collect();
        BufferPool {
            disk,
            replacer: LruReplacer::new(pool_size),
            state: Mutex::new(PoolState {
                frames,
                page_table: HashMap::new(),
                free_list,
            }),
            page_size,
        }
    }

    pub fn pool_size(&self) -> usize {
        self.state.lock().unwrap().frames.len()
    }

    pub fn disk_manager(&self) -> &DiskManager {
        &self.disk
    }

    /// Finds a frame to reuse: prefers the free list, else asks the
    /// replacer for a victim. Writes the victim back to disk first if
    /// dirty. Returns `None` if every frame is pinned.
    fn find_victim(&self, state: &mut PoolState) -> Option<FrameId> {
        if let Some(frame) = state.free_list.pop() {
            return Some(frame);
        }
        let mut victim: FrameId = -1;
        if !self.replacer.evict(&mut victim) {
            return None;
        }
        let page = &state.frames[victim as usize];
        if page.is_dirty() {
            let pid = page.page_id();
            if let Err(e) = self.disk.write_page(pid, page.data()) {
                warn!("failed to flush victim page {} on evict: {}", pid, e);
            }
        }
        let old_pid = page.page_id();
        if old_pid != INVALID_PAGE_ID {
            state.page_table.remove(&old_pid);
        }
        Some(victim)
    }

    /// Fetches `page_id`, pinning it. Returns `None` only when no frame is
    /// evictable (every frame pinned).
    pub fn fetch_page(&self, page_id: PageId) -> Option<FetchGuard<'_>> {
        let mut state = self.state.lock().unwrap();
        if let Some(&frame_id) = state.page_table.get(&page_id) {
            state.frames[frame_id as usize].pin();
            self.replacer.pin(frame_id);
            trace!("fetch_page {} hit frame {}", page_id, frame_id);
            return Some(FetchGuard {
                pool: self,
                frame_id,
                page_id,
            });
        }

        let frame_id = self.find_victim(&mut state)?;
        state.frames[frame_id as usize].reset();
        {
            let page = &mut state.frames[frame_id as usize];
            let mut buf = vec![0u8; self.page_size];
            if let Err(e) = self.disk.read_page(page_id, &mut buf) {
                warn!("failed to read page {}: {}", page_id, e);
                state.free_list.push(frame_id);
                return None;
            }
            page.data_mut().copy_from_slice(&buf);
            page.set_page_id(page_id);
            page.pin();
        }
        state.page_table.insert(page_id, frame_id);
        self.replacer.pin(frame_id);
        debug!("fetch_page {} loaded into frame {}", page_id, frame_id);
        Some(FetchGuard {
            pool: self,
            frame_id,
            page_id,
        })
    }

    /// Decrements the pin count of `page_id`, marking it dirty if
    /// requested. Returns `false` if the page is absent or already
    /// unpinned.
    pub fn unpin_page(&self, page_id: PageId, dirty: bool) -> bool {
        let mut state = self.state.lock().unwrap();
        let frame_id = match state.page_table.get(&page_id) {
            Some(&f) => f,
            None => return false,
        };
        let page = &mut state.frames[frame_id as usize];
        if page.pin_count() == 0 {
            return false;
        }
        if dirty {
            page.set_dirty(true);
        }
        let remaining = page.unpin();
        if remaining == 0 {
            self.replacer.unpin(frame_id);
        }
        true
    }

    /// Allocates a new page, installs it in a fresh frame, and pins it.
    /// Returns `None` if no frame is evictable.
    pub fn new_page(&self) -> Option<FetchGuard<'_>> {
        let mut state = self.state.lock().unwrap();
        let frame_id = self.find_victim(&mut state)?;
        let page_id = self.disk.allocate_page();
        let page = &mut state.frames[frame_id as usize];
        page.reset();
        page.init_header(page_id);
        page.pin();
        state.page_table.insert(page_id, frame_id);
        self.replacer.pin(frame_id);
        debug!("new_page {} in frame {}", page_id, frame_id);
        Some(FetchGuard {
            pool: self,
            frame_id,
            page_id,
        })
    }

    /// Deletes `page_id` from the pool and the disk's allocation map.
    /// Succeeds trivially if the page is not resident. Fails if pinned.
    pub fn delete_page(&self, page_id: PageId) -> bool {
        let mut state = self.state.lock().unwrap();
        let frame_id = match state.page_table.get(&page_id) {
            Some(&f) => f,
            None => return true,
        };
        if state.frames[frame_id as usize].pin_count() > 0 {
            return false;
        }
        self.replacer.pin(frame_id);
        state.page_table.remove(&page_id);
        state.frames[frame_id as usize].reset();
        state.free_list.push(frame_id);
        let _ = self.disk.deallocate_page(page_id);
        true
    }

    pub fn flush_page(&self, page_id: PageId) -> bool {
        let mut state = self.state.lock().unwrap();
        let frame_id = match state.page_table.get(&page_id) {
            Some(&f) => f,
            None => return false,
        };
        let page = &mut state.frames[frame_id as usize];
        if self.disk.write_page(page_id, page.data()).is_err() {
            return false;
        }
        page.set_dirty(false);
        true
    }

    pub fn flush_all_pages(&self) {
        let page_ids: Vec<PageId> = {
            let state = self.state.lock().unwrap();
            state.page_table.keys().copied().collect()
        };
        for pid in page_ids {
            self.flush_page(pid);
        }
    }

    /// Number of frames currently unpinned and tracked by the replacer,
    /// plus free list + pinned frames, must equal pool size (spec §8
    /// buffer-pool conservation invariant). Exposed for tests.
    pub fn conservation_counts(&self) -> (usize, usize, usize) {
        let state = self.state.lock().unwrap();
        let pinned = state
            .page_table
            .values()
            .filter(|&&f| state.frames[f as usize].pin_count() > 0)
            .count();
        (state.free_list.len(), pinned, self.replacer.size())
    }

    fn with_page<R>(&self, frame_id: FrameId, f: impl FnOnce(&Page) -> R) -> R {
        let state = self.state.lock().unwrap();
        f(&state.frames[frame_id as usize])
    }

    fn with_page_mut<R>(&self, frame_id: FrameId, f: impl FnOnce(&mut Page) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state.frames[frame_id as usize])
    }
}

/// A pinned page, automatically unpinned (clean) when dropped if the
/// caller never explicitly unpins. Callers that mutate the page should call
/// [`FetchGuard::mark_dirty`] before drop, or use [`FetchGuard::unpin`]
/// explicitly to control the dirty bit.
pub struct FetchGuard<'a> {
    pool: &'a BufferPool,
    frame_id: FrameId,
    page_id: PageId,
}

impl<'a> FetchGuard<'a> {
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn read<R>(&self, f: impl FnOnce(&Page) -> R) -> R {
        self.pool.with_page(self.frame_id, f)
    }

    pub fn write<R>(&self, f: impl FnOnce(&mut Page) -> R) -> R {
        self.pool.with_page_mut(self.frame_id, f)
    }

    /// Explicit unpin with a caller-chosen dirty flag; consumes the guard so
    /// callers cannot use it afterward.
    pub fn unpin(self, dirty: bool) {
        self.pool.unpin_page(self.page_id, dirty);
        std::mem::forget(self);
    }
}

impl<'a> Drop for FetchGuard<'a> {
    fn drop(&mut self) {
        self.pool.unpin_page(self.page_id, false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(size: usize) -> BufferPool {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        std::mem::forget(dir);
        let disk = DiskManager::open(path, 4096).unwrap();
        BufferPool::new(disk, size)
    }

    #[test]
    fn eviction_flushes_dirty_victim() {
        let bp = pool(3);
        let p1 = bp.new_page().unwrap();
        let pid1 = p1.page_id();
        p1.write(|p| p.data_mut()[40] = 0xAB);
        p1.unpin(true);

        let p2 = bp.new_page().unwrap();
        p2.unpin(false);
        let p3 = bp.new_page().unwrap();
        p3.unpin(false);
        let p4 = bp.new_page().unwrap();
        p4.unpin(false);

        let fetched = bp.fetch_page(pid1).unwrap();
        let byte = fetched.read(|p| p.data()[40]);
        assert_eq!(byte, 0xAB);
    }

    #[test]
    fn conservation_holds() {
        let bp = pool(4);
        let p1 = bp.new_page().unwrap();
        p1.unpin(false);
        let (free, pinned, replacer) = bp.conservation_counts();
        assert_eq!(free, 3);
        assert_eq!(pinned, 0);
        assert_eq!(replacer, 1);
    }

    #[test]
    fn fetch_increments_pin_and_unpin_decrements() {
        let bp = pool(2);
        let p = bp.new_page().unwrap();
        let pid = p.page_id();
        p.unpin(false);

        let f1 = bp.fetch_page(pid).unwrap();
        let pin_count = f1.read(|p| p.pin_count());
        assert_eq!(pin_count, 1);
        drop(f1);

        // unpinning an already-unpinned page reports false, not a panic.
        assert!(!bp.unpin_page(pid, false));
    }

    #[test]
    fn all_pinned_fetch_returns_none() {
        let bp = pool(1);
        let p1 = bp.new_page().unwrap();
        let _pid1 = p1.page_id();
        // p1 stays pinned (guard alive); pool has 1 frame, so a second new_page must fail.
        assert!(bp.new_page().is_none());
    }
}
