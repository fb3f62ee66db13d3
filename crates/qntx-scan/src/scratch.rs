//! Grow-only scratch buffers
//!
//! Capacity only grows, to exactly the size requested on a miss. A buffer is
//! recycled only while no image handle still references it; otherwise a new
//! buffer replaces it and the old one lives on with whoever holds it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{FrameError, Result};

/// How scratch storage handed to the detector is reused across calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScratchPolicy {
    /// Recycle buffers once every handle to them has been dropped
    #[default]
    Reuse,
    /// Allocate a new buffer for every call
    FreshPerCall,
}

#[derive(Debug)]
pub(crate) struct Scratch<T> {
    buf: Arc<Vec<T>>,
    policy: ScratchPolicy,
    allocations: u64,
    /// Requests above this many elements fail as if the allocator refused them
    #[cfg(test)]
    limit: Option<usize>,
}

impl<T: Clone> Scratch<T> {
    pub(crate) fn new(policy: ScratchPolicy) -> Self {
        Self {
            buf: Arc::new(Vec::new()),
            policy,
            allocations: 0,
            #[cfg(test)]
            limit: None,
        }
    }

    #[cfg(test)]
    pub(crate) fn set_limit(&mut self, limit: Option<usize>) {
        self.limit = limit;
    }

    /// Return an empty buffer with capacity for at least `len` elements.
    /// The caller must fill it completely before sharing it.
    pub(crate) fn acquire(&mut self, len: usize) -> Result<&mut Vec<T>> {
        #[cfg(test)]
        if self.limit.is_some_and(|limit| len > limit) {
            return Err(FrameError::ScratchAllocation { requested: len });
        }

        let reusable =
            self.policy == ScratchPolicy::Reuse && Arc::get_mut(&mut self.buf).is_some();

        if !reusable {
            let capacity = match self.policy {
                ScratchPolicy::Reuse => len.max(self.buf.capacity()),
                ScratchPolicy::FreshPerCall => len,
            };
            let mut fresh = Vec::new();
            fresh
                .try_reserve_exact(capacity)
                .map_err(|_| FrameError::ScratchAllocation {
                    requested: capacity,
                })?;
            self.buf = Arc::new(fresh);
            self.allocations += 1;
        }

        // Unique at this point, so make_mut never clones.
        let buf = Arc::make_mut(&mut self.buf);
        buf.clear();
        if buf.capacity() < len {
            buf.try_reserve_exact(len)
                .map_err(|_| FrameError::ScratchAllocation { requested: len })?;
            self.allocations += 1;
        }
        Ok(buf)
    }

    /// A handle to the current buffer
    pub(crate) fn share(&self) -> Arc<Vec<T>> {
        Arc::clone(&self.buf)
    }

    pub(crate) fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    pub(crate) fn allocations(&self) -> u64 {
        self.allocations
    }

    /// Drop contents but keep capacity, when no handle still references them.
    pub(crate) fn clear(&mut self) {
        if let Some(buf) = Arc::get_mut(&mut self.buf) {
            buf.clear();
        }
    }
}
