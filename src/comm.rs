//! Collective interface between worker ranks.
//!
//! Every parallel operation in this crate is written against [`Comm`]:
//! a fixed-size group of ranks offering barrier, broadcast, all-gather
//! (fixed and variable counts), inclusive prefix-sum scan, all-reduce, a
//! shared work pool for the dynamic copy engine, and shared progress
//! counters for the periodic reducer.
//!
//! Two implementations ship:
//!
//! - [`SoloComm`] — the single-rank group; every collective is the identity.
//! - [`ThreadComm`] — an R-rank group where each rank is one OS thread of
//!   this process. [`ThreadComm::run`] spawns the group, runs the same
//!   closure on every rank, and joins.
//!
//! The core only relies on the properties the collective contract gives it:
//! disjoint file regions plus barrier-established visibility. A
//! process-backed implementation can replace [`ThreadComm`] without touching
//! any caller.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Barrier, Mutex};

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};

// ─── Work items ──────────────────────────────────────────────────────────────

/// One unit of distributable data-copy work: a fixed-size slice of a user
/// file headed for (or coming from) a known archive offset.
///
/// A file of `S` bytes with chunk size `C` contributes `ceil(S / C)` tasks,
/// and at least one for zero-byte files.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CopyTask {
    /// Full path to the user file.
    pub path: PathBuf,
    /// Size of the user file in bytes.
    pub file_size: u64,
    /// Which chunk of the file this task covers.
    pub chunk_index: u64,
    /// Archive offset of the first byte of this file's data region.
    pub data_offset: u64,
}

/// Distributed pool of [`CopyTask`]s.
///
/// Usage is phased: every rank enqueues all of its tasks, every rank calls
/// [`WorkPool::seal`] (a collective), and then every rank drains with
/// [`WorkPool::dequeue`] until it returns `None`. After the seal, any rank
/// may execute any task.
pub trait WorkPool {
    fn enqueue(&mut self, task: CopyTask);
    /// Collective: marks the end of the enqueue phase on all ranks.
    fn seal(&mut self);
    fn dequeue(&mut self) -> Option<CopyTask>;
}

// ─── Progress counters ───────────────────────────────────────────────────────

/// Channels tracked by the progress reducer.
pub const PROGRESS_CHANNELS: usize = 2;

/// Per-rank counter cells shared across the group, summed by the reducer.
pub struct ProgressCells {
    cells: Vec<[AtomicU64; PROGRESS_CHANNELS]>,
}

impl ProgressCells {
    fn new(ranks: usize) -> Self {
        let cells = (0..ranks)
            .map(|_| [AtomicU64::new(0), AtomicU64::new(0)])
            .collect();
        ProgressCells { cells }
    }

    pub fn reset(&self, rank: usize) {
        for c in &self.cells[rank] {
            c.store(0, Ordering::Relaxed);
        }
    }

    pub fn add(&self, rank: usize, channel: usize, value: u64) {
        self.cells[rank][channel].fetch_add(value, Ordering::Relaxed);
    }

    /// Sum of one channel over all ranks.
    pub fn sum(&self, channel: usize) -> u64 {
        self.cells
            .iter()
            .map(|c| c[channel].load(Ordering::Relaxed))
            .sum()
    }
}

// ─── The collective interface ────────────────────────────────────────────────

pub trait Comm {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    /// Block until every rank has entered the barrier.
    fn barrier(&self);

    /// Root's bytes are delivered to every rank; non-roots pass anything.
    fn broadcast_bytes(&self, root: usize, bytes: Vec<u8>) -> Vec<u8>;

    /// Every rank contributes a byte slice; all ranks receive all slices
    /// in rank order.
    fn allgatherv_bytes(&self, bytes: &[u8]) -> Vec<Vec<u8>>;

    /// Shared pool for the dynamic copy engine.
    fn work_pool(&self) -> Box<dyn WorkPool>;

    /// Shared counters for the progress reducer.
    fn progress_cells(&self) -> Arc<ProgressCells>;

    // ── Derived collectives ──────────────────────────────────────────────────

    fn broadcast_u64(&self, root: usize, value: u64) -> u64 {
        let bytes = self.broadcast_bytes(root, value.to_le_bytes().to_vec());
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&bytes[..8]);
        u64::from_le_bytes(raw)
    }

    fn broadcast_bool(&self, root: usize, value: bool) -> bool {
        self.broadcast_u64(root, u64::from(value)) != 0
    }

    fn broadcast_u64s(&self, root: usize, values: Vec<u64>) -> Vec<u64> {
        let mut bytes = Vec::with_capacity(values.len() * 8);
        for v in &values {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        decode_u64s(&self.broadcast_bytes(root, bytes))
    }

    fn allgather_u64(&self, value: u64) -> Vec<u64> {
        self.allgatherv_u64(&[value])
    }

    /// Variable-count all-gather: the concatenation of every rank's values,
    /// in rank order.
    fn allgatherv_u64(&self, values: &[u64]) -> Vec<u64> {
        let mut bytes = Vec::with_capacity(values.len() * 8);
        for v in values {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let mut out = Vec::new();
        for part in self.allgatherv_bytes(&bytes) {
            out.extend(decode_u64s(&part));
        }
        out
    }

    /// Inclusive prefix sum: rank r receives the sum over ranks `0..=r`.
    fn scan_sum(&self, value: u64) -> u64 {
        let all = self.allgather_u64(value);
        all[..=self.rank()].iter().sum()
    }

    fn allreduce_sum(&self, value: u64) -> u64 {
        self.allgather_u64(value).iter().sum()
    }

    /// Logical-and all-reduce: true only when every rank passed true.
    fn alltrue(&self, value: bool) -> bool {
        self.allgather_u64(u64::from(value)).iter().all(|&v| v != 0)
    }
}

fn decode_u64s(bytes: &[u8]) -> Vec<u64> {
    bytes
        .chunks_exact(8)
        .map(|c| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(c);
            u64::from_le_bytes(raw)
        })
        .collect()
}

/// Contiguous block partition of `total` items over `ranks` ranks: the first
/// `total % ranks` ranks own one extra item. Returns `(start, count)`.
pub fn block_partition(total: u64, ranks: usize, rank: usize) -> (u64, u64) {
    let ranks = ranks as u64;
    let rank = rank as u64;
    let per = total / ranks;
    let rem = total - per * ranks;
    if rank < rem {
        let count = per + 1;
        (rank * count, count)
    } else {
        (rem * (per + 1) + (rank - rem) * per, per)
    }
}

// ─── Single-rank group ───────────────────────────────────────────────────────

/// The trivial one-rank group.
pub struct SoloComm {
    progress: Arc<ProgressCells>,
}

impl SoloComm {
    pub fn new() -> Self {
        SoloComm {
            progress: Arc::new(ProgressCells::new(1)),
        }
    }
}

impl Default for SoloComm {
    fn default() -> Self {
        SoloComm::new()
    }
}

struct LocalPool {
    queue: VecDeque<CopyTask>,
}

impl WorkPool for LocalPool {
    fn enqueue(&mut self, task: CopyTask) {
        self.queue.push_back(task);
    }
    fn seal(&mut self) {}
    fn dequeue(&mut self) -> Option<CopyTask> {
        self.queue.pop_front()
    }
}

impl Comm for SoloComm {
    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }
    fn barrier(&self) {}
    fn broadcast_bytes(&self, _root: usize, bytes: Vec<u8>) -> Vec<u8> {
        bytes
    }
    fn allgatherv_bytes(&self, bytes: &[u8]) -> Vec<Vec<u8>> {
        vec![bytes.to_vec()]
    }
    fn work_pool(&self) -> Box<dyn WorkPool> {
        Box::new(LocalPool {
            queue: VecDeque::new(),
        })
    }
    fn progress_cells(&self) -> Arc<ProgressCells> {
        Arc::clone(&self.progress)
    }
}

// ─── Thread-backed group ─────────────────────────────────────────────────────

struct GroupState {
    ranks: usize,
    barrier: Barrier,
    bcast_slot: Mutex<Option<Vec<u8>>>,
    gather_slots: Mutex<Vec<Option<Vec<u8>>>>,
    tasks: (Sender<CopyTask>, Receiver<CopyTask>),
    progress: Arc<ProgressCells>,
}

/// One rank's handle onto a thread-backed group.
///
/// Collectives exchange data through shared slots bracketed by two barrier
/// generations: all ranks deposit, barrier, all ranks read, barrier. The
/// trailing barrier keeps a fast rank's next deposit from clobbering a slot
/// a slow rank has not read yet.
pub struct ThreadComm {
    rank: usize,
    group: Arc<GroupState>,
}

impl ThreadComm {
    /// Spawn an `ranks`-wide group, run `f` on every rank, and join.
    /// Results are returned in rank order.
    pub fn run<T, F>(ranks: usize, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(&ThreadComm) -> T + Send + Sync,
    {
        assert!(ranks >= 1, "group must have at least one rank");
        let group = Arc::new(GroupState {
            ranks,
            barrier: Barrier::new(ranks),
            bcast_slot: Mutex::new(None),
            gather_slots: Mutex::new(vec![None; ranks]),
            tasks: unbounded(),
            progress: Arc::new(ProgressCells::new(ranks)),
        });

        std::thread::scope(|s| {
            let handles: Vec<_> = (0..ranks)
                .map(|rank| {
                    let comm = ThreadComm {
                        rank,
                        group: Arc::clone(&group),
                    };
                    let f = &f;
                    s.spawn(move || f(&comm))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
                .collect()
        })
    }
}

struct SharedPool {
    sender: Sender<CopyTask>,
    receiver: Receiver<CopyTask>,
    group: Arc<GroupState>,
    sealed: bool,
}

impl WorkPool for SharedPool {
    fn enqueue(&mut self, task: CopyTask) {
        // The channel is unbounded; send cannot fail while the group lives.
        let _ = self.sender.send(task);
    }

    fn seal(&mut self) {
        self.sealed = true;
        self.group.barrier.wait();
    }

    fn dequeue(&mut self) -> Option<CopyTask> {
        debug_assert!(self.sealed, "dequeue before seal");
        match self.receiver.try_recv() {
            Ok(task) => Some(task),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }
}

impl Comm for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.group.ranks
    }

    fn barrier(&self) {
        self.group.barrier.wait();
    }

    fn broadcast_bytes(&self, root: usize, bytes: Vec<u8>) -> Vec<u8> {
        if self.rank == root {
            *self.group.bcast_slot.lock().unwrap() = Some(bytes);
        }
        self.group.barrier.wait();
        let out = self
            .group
            .bcast_slot
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_default();
        self.group.barrier.wait();
        if self.rank == root {
            *self.group.bcast_slot.lock().unwrap() = None;
        }
        out
    }

    fn allgatherv_bytes(&self, bytes: &[u8]) -> Vec<Vec<u8>> {
        self.group.gather_slots.lock().unwrap()[self.rank] = Some(bytes.to_vec());
        self.group.barrier.wait();
        let out: Vec<Vec<u8>> = {
            let slots = self.group.gather_slots.lock().unwrap();
            slots
                .iter()
                .map(|s| s.clone().unwrap_or_default())
                .collect()
        };
        self.group.barrier.wait();
        self.group.gather_slots.lock().unwrap()[self.rank] = None;
        out
    }

    fn work_pool(&self) -> Box<dyn WorkPool> {
        Box::new(SharedPool {
            sender: self.group.tasks.0.clone(),
            receiver: self.group.tasks.1.clone(),
            group: Arc::clone(&self.group),
            sealed: false,
        })
    }

    fn progress_cells(&self) -> Arc<ProgressCells> {
        Arc::clone(&self.group.progress)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
