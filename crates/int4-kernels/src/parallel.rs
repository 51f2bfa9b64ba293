//! Parallel-for executors.
//!
//! The packer and the tile scheduler only need "run `f` over sub-ranges of
//! `[begin, end)`, possibly in parallel". `grain_size = 0` leaves chunking
//! to the executor, which splits the range into one contiguous chunk per
//! worker thread.

use rayon::prelude::*;

use int4_core::{Int4Error, KernelConfig, Result};

/// Work partitioning contract consumed by the packer and the scheduler.
pub trait ParallelExecutor: Sync {
    /// Call `f(sub_begin, sub_end)` over disjoint sub-ranges covering
    /// `[begin, end)`. Returns once every call has finished.
    fn parallel_for<F>(&self, begin: usize, end: usize, grain_size: usize, f: F)
    where
        F: Fn(usize, usize) + Sync + Send;

    /// Worker threads available to `parallel_for`.
    fn num_threads(&self) -> usize;
}

/// Runs every range inline on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialExecutor;

impl ParallelExecutor for SerialExecutor {
    fn parallel_for<F>(&self, begin: usize, end: usize, _grain_size: usize, f: F)
    where
        F: Fn(usize, usize) + Sync + Send,
    {
        if begin < end {
            f(begin, end);
        }
    }

    fn num_threads(&self) -> usize {
        1
    }
}

/// Rayon-backed executor, on the global pool or on a dedicated one.
#[derive(Debug, Default)]
pub struct RayonExecutor {
    pool: Option<rayon::ThreadPool>,
}

impl RayonExecutor {
    /// Use the global rayon pool.
    pub fn global() -> Self {
        Self { pool: None }
    }

    /// Build a dedicated pool with `num_threads` workers.
    pub fn with_threads(num_threads: usize) -> Result<Self> {
        if num_threads == 0 {
            return Err(Int4Error::InvalidConfig("num_threads must be at least 1".into()));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("int4mm-{}", i))
            .build()
            .map_err(|e| Int4Error::InvalidConfig(format!("failed to build thread pool: {}", e)))?;
        Ok(Self { pool: Some(pool) })
    }

    /// Executor matching `config.num_threads`.
    pub fn from_config(config: &KernelConfig) -> Result<Self> {
        match config.num_threads {
            None => Ok(Self::global()),
            Some(n) => Self::with_threads(n),
        }
    }
}

impl ParallelExecutor for RayonExecutor {
    fn parallel_for<F>(&self, begin: usize, end: usize, grain_size: usize, f: F)
    where
        F: Fn(usize, usize) + Sync + Send,
    {
        if begin >= end {
            return;
        }
        let len = end - begin;
        let chunk = match grain_size {
            0 => len.div_ceil(self.num_threads().max(1)),
            g => g,
        };
        if len <= chunk {
            f(begin, end);
            return;
        }

        let f = &f;
        let run = || {
            (0..len.div_ceil(chunk)).into_par_iter().for_each(|i| {
                let start = begin + i * chunk;
                f(start, (start + chunk).min(end));
            })
        };
        match &self.pool {
            Some(pool) => pool.install(run),
            None => run(),
        }
    }

    fn num_threads(&self) -> usize {
        match &self.pool {
            Some(pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        }
    }
}

/// Raw view of an output buffer that many workers write disjoint ranges of.
///
/// Only the tile scheduler and the packer create these; each worker writes
/// a region no other worker touches, so handing out `&mut` sub-slices from
/// a shared reference does not alias.
#[derive(Clone, Copy)]
pub(crate) struct SharedMut<T> {
    ptr: *mut T,
    len: usize,
}

// Safety: access is restricted to disjoint ranges (see type docs).
unsafe impl<T: Send> Send for SharedMut<T> {}
unsafe impl<T: Send> Sync for SharedMut<T> {}

impl<T> SharedMut<T> {
    pub(crate) fn new(slice: &mut [T]) -> Self {
        Self {
            ptr: slice.as_mut_ptr(),
            len: slice.len(),
        }
    }

    /// # Safety
    /// `[start, start + len)` must be in bounds and not accessed by anyone
    /// else for the lifetime of the returned slice.
    pub(crate) unsafe fn slice_mut<'a>(&self, start: usize, len: usize) -> &'a mut [T] {
        debug_assert!(start + len <= self.len, "SharedMut range out of bounds");
        std::slice::from_raw_parts_mut(self.ptr.add(start), len)
    }

    /// # Safety
    /// `offset` must be in bounds.
    pub(crate) unsafe fn ptr_at(&self, offset: usize) -> *mut T {
        debug_assert!(offset < self.len, "SharedMut offset out of bounds");
        self.ptr.add(offset)
    }
}
