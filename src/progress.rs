//! Periodic progress reduction.
//!
//! Ranks add bytes (and optionally items) into shared counters as they go;
//! the leader sums them every `timeout` seconds and prints one status line
//! with humanized totals, percent done, bandwidth, and an ETA. Purely
//! informational — nothing here affects archive correctness.

use std::sync::Arc;
use std::time::Instant;

use crate::comm::{Comm, ProgressCells};
use crate::display::{format_bw, format_bytes};
use crate::displayln;

const BYTES: usize = 0;
const ITEMS: usize = 1;

pub struct Progress<'a> {
    comm: &'a dyn Comm,
    cells: Arc<ProgressCells>,
    label: &'static str,
    with_items: bool,
    total_bytes: u64,
    timeout: u64,
    started: Instant,
    last: Instant,
}

impl<'a> Progress<'a> {
    /// Begin a progress phase. Collective: resets this rank's counters and
    /// synchronizes the group so no stale counts leak between phases.
    pub fn start(
        comm: &'a dyn Comm,
        label: &'static str,
        with_items: bool,
        total_bytes: u64,
        timeout: u64,
    ) -> Self {
        let cells = comm.progress_cells();
        cells.reset(comm.rank());
        comm.barrier();
        let now = Instant::now();
        Progress {
            comm,
            cells,
            label,
            with_items,
            total_bytes,
            timeout,
            started: now,
            last: now,
        }
    }

    /// Record this rank's contribution; the leader may emit a status line.
    pub fn update(&mut self, bytes: u64, items: u64) {
        let rank = self.comm.rank();
        if bytes > 0 {
            self.cells.add(rank, BYTES, bytes);
        }
        if items > 0 {
            self.cells.add(rank, ITEMS, items);
        }
        if rank == 0 && self.timeout > 0 && self.last.elapsed().as_secs() >= self.timeout {
            self.print(false);
            self.last = Instant::now();
        }
    }

    /// Collective: wait for every rank's final counts, then the leader
    /// prints the closing line.
    pub fn complete(self) {
        self.comm.barrier();
        if self.comm.rank() == 0 && self.timeout > 0 {
            self.print(true);
        }
    }

    fn print(&self, done: bool) {
        let bytes = self.cells.sum(BYTES);
        let secs = self.started.elapsed().as_secs_f64();
        let rate = if secs > 0.0 { bytes as f64 / secs } else { 0.0 };
        let (bv, bu) = format_bytes(bytes);
        let (rv, ru) = format_bw(rate);
        let percent = if self.total_bytes > 0 {
            bytes as f64 * 100.0 / self.total_bytes as f64
        } else {
            0.0
        };
        let tail = if done {
            "done".to_string()
        } else {
            let remaining = if rate > 0.0 {
                (self.total_bytes.saturating_sub(bytes)) as f64 / rate
            } else {
                0.0
            };
            format!("{remaining:.0} secs left ...")
        };
        if self.with_items {
            let items = self.cells.sum(ITEMS);
            displayln!(
                3,
                "{} {items} items and {bv:.3} {bu} ({percent:.0}%) in {secs:.3} secs ({rv:.3} {ru}) {tail}",
                self.label
            );
        } else {
            displayln!(
                3,
                "{} {bv:.3} {bu} ({percent:.0}%) in {secs:.3} secs ({rv:.3} {ru}) {tail}",
                self.label
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::{SoloComm, ThreadComm};

    #[test]
    fn progress_counts_accumulate() {
        let comm = SoloComm::new();
        let mut prog = Progress::start(&comm, "Tarred", false, 1000, 0);
        prog.update(400, 1);
        prog.update(600, 1);
        assert_eq!(prog.cells.sum(0), 1000);
        assert_eq!(prog.cells.sum(1), 2);
        prog.complete();
    }

    #[test]
    fn progress_phases_reset_between_uses() {
        ThreadComm::run(2, |comm| {
            let mut p1 = Progress::start(comm, "Tarred", false, 100, 0);
            p1.update(50, 0);
            p1.complete();

            let p2 = Progress::start(comm, "Extracted", true, 100, 0);
            comm.barrier();
            assert_eq!(p2.cells.sum(0), 0);
            p2.complete();
        });
    }
}
