//! External sorter with background run generation and k-way merge.
//!
//! Input phase: values collect in a run buffer. A full buffer is handed to
//! the run worker over a rendezvous channel; the worker stable-sorts it and
//! spills it page by page while the caller fills the next buffer.
//!
//! Output phase: with no spilled runs the buffer is sorted in place and
//! streamed. Otherwise the final buffer stays in memory as the last run and
//! a merge worker streams merged blocks to the consumer.

use std::marker::PhantomData;
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tristore_core::budget::MemoryBudget;
use tristore_core::config::EngineConfig;
use tristore_core::error::Error;
use tristore_core::id::SpillId;
use tristore_mem::guard::BudgetGuardImpl;
use tristore_mem::spill::SpillReader;
use tristore_mem::tracking::PeakTracker;
use tristore_mem::{Codec, MemoryBudgetImpl, SpillManager, Storage};

use super::run::{spill_run, MergeHeap, RunCursor, RunMeta};
use super::SortComparator;
use crate::error::{OpError, Result};

/// Sizing knobs, usually derived from [`EngineConfig`].
#[derive(Debug, Clone, Copy)]
pub struct SorterOptions {
    /// Bytes for both run buffers together.
    pub memory_bytes: usize,
    /// Values per spilled page.
    pub page_rows: usize,
    /// Values per block handed from the merge worker to the consumer.
    pub merge_block_rows: usize,
    /// Merged blocks the merge worker may run ahead.
    pub merge_channel_capacity: usize,
}

impl SorterOptions {
    pub fn from_config(cfg: &EngineConfig) -> Self {
        Self {
            memory_bytes: cfg.sorter_memory_bytes,
            page_rows: cfg.sort_page_rows,
            merge_block_rows: cfg.sort_page_rows,
            merge_channel_capacity: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SorterStats {
    pub values_pushed: u64,
    pub runs_written: usize,
    pub peak_buffered: usize,
}

struct RunWorker<T> {
    tx: Option<Sender<Vec<T>>>,
    results: Receiver<Result<RunMeta>>,
    handle: Option<JoinHandle<()>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Input,
    Output,
}

pub struct BackgroundExternalSorter<T, C> {
    comparator: C,
    options: SorterOptions,
    run_capacity: usize,
    buffer: Vec<T>,
    budget: MemoryBudgetImpl,
    _reservation: BudgetGuardImpl,
    spill: Arc<Mutex<SpillManager>>,
    reader: SpillReader,
    spill_id: SpillId,
    worker: Option<RunWorker<T>>,
    runs: Vec<RunMeta>,
    phase: Phase,
    values_pushed: u64,
    peak: PeakTracker,
}

impl<T, C> BackgroundExternalSorter<T, C>
where
    T: Serialize + DeserializeOwned + Send + 'static,
    C: SortComparator<T>,
{
    pub fn new(
        comparator: C,
        options: SorterOptions,
        budget: &MemoryBudgetImpl,
        spill: Arc<Mutex<SpillManager>>,
    ) -> Result<Self> {
        let value_size = std::mem::size_of::<T>().max(1);
        let run_capacity = options.memory_bytes / (2 * value_size);
        if run_capacity == 0 {
            return Err(Error::Config(format!(
                "sorter memory of {} bytes cannot hold two values of {} bytes",
                options.memory_bytes, value_size
            ))
            .into());
        }
        if options.page_rows == 0 || options.merge_block_rows == 0 {
            return Err(Error::Config("sorter page and block sizes must be > 0".into()).into());
        }
        let reservation = budget.acquire(2 * run_capacity * value_size, "external_sorter")?;
        let reader = spill.lock().reader();
        Ok(Self {
            comparator,
            options,
            run_capacity,
            buffer: Vec::new(),
            budget: budget.clone(),
            _reservation: reservation,
            spill,
            reader,
            spill_id: SpillId::next(),
            worker: None,
            runs: Vec::new(),
            phase: Phase::Input,
            values_pushed: 0,
            peak: PeakTracker::new(),
        })
    }

    /// Sorter spilling to `cfg.spill_dir` on `storage` with `cfg.spill_codec`.
    pub fn from_config(
        comparator: C,
        cfg: &EngineConfig,
        budget: &MemoryBudgetImpl,
        storage: Arc<dyn Storage>,
    ) -> Result<Self> {
        let codec = Codec::parse(&cfg.spill_codec)?;
        let spill = SpillManager::new(storage, codec, cfg.spill_dir.clone());
        Self::new(
            comparator,
            SorterOptions::from_config(cfg),
            budget,
            Arc::new(Mutex::new(spill)),
        )
    }

    /// Values per run buffer.
    pub fn run_capacity(&self) -> usize {
        self.run_capacity
    }

    pub fn stats(&self) -> SorterStats {
        SorterStats {
            values_pushed: self.values_pushed,
            runs_written: self.runs.len(),
            peak_buffered: self.peak.peak(),
        }
    }

    pub fn push(&mut self, value: T) -> Result<()> {
        if self.phase != Phase::Input {
            return Err(OpError::Exec("push() after sort(); call clear() first".into()));
        }
        // Grows on demand; the budget already holds the full run size.
        self.buffer.push(value);
        self.values_pushed += 1;
        if self.buffer.len() >= self.run_capacity {
            self.peak.record(self.buffer.len());
            let full = std::mem::take(&mut self.buffer);
            self.hand_off(full)?;
        }
        Ok(())
    }

    fn hand_off(&mut self, run: Vec<T>) -> Result<()> {
        if self.worker.is_none() {
            self.worker = Some(self.spawn_run_worker()?);
        }
        let sent = match self.worker.as_ref().and_then(|w| w.tx.as_ref()) {
            Some(tx) => tx.send(run).is_ok(),
            None => false,
        };
        if !sent {
            return Err(self.stop_worker().err().unwrap_or_else(|| {
                OpError::Exec("sort run worker stopped accepting runs".into())
            }));
        }
        self.collect_finished_runs()
    }

    fn spawn_run_worker(&self) -> Result<RunWorker<T>> {
        let (tx, rx) = channel::bounded::<Vec<T>>(0);
        let (results_tx, results) = channel::unbounded();
        let comparator = self.comparator.clone();
        let spill = Arc::clone(&self.spill);
        let spill_id = self.spill_id;
        let page_rows = self.options.page_rows;
        let first_run = self.runs.len() as u32;
        let handle = std::thread::Builder::new()
            .name("tristore-sort-runs".into())
            .spawn(move || {
                for (i, mut run) in rx.iter().enumerate() {
                    run.sort_by(|a, b| comparator.compare(a, b));
                    let result = spill_run(&spill, spill_id, first_run + i as u32, &run, page_rows);
                    let failed = result.is_err();
                    if results_tx.send(result).is_err() || failed {
                        break;
                    }
                }
            })
            .map_err(|e| OpError::Exec(format!("spawn sort run worker: {e}")))?;
        Ok(RunWorker {
            tx: Some(tx),
            results,
            handle: Some(handle),
        })
    }

    fn collect_finished_runs(&mut self) -> Result<()> {
        if let Some(worker) = &self.worker {
            while let Ok(result) = worker.results.try_recv() {
                self.runs.push(result?);
            }
        }
        Ok(())
    }

    /// Close the worker's input, wait for it and collect every run it wrote.
    fn stop_worker(&mut self) -> Result<()> {
        let Some(mut worker) = self.worker.take() else {
            return Ok(());
        };
        drop(worker.tx.take());
        let panicked = worker.handle.take().map(|h| h.join().is_err()).unwrap_or(false);
        let mut first_err = None;
        for result in worker.results.try_iter() {
            match result {
                Ok(meta) => self.runs.push(meta),
                Err(e) => {
                    first_err.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_err {
            return Err(e);
        }
        if panicked {
            return Err(OpError::Exec("sort run worker panicked".into()));
        }
        Ok(())
    }

    /// Switch to the output phase. The stream borrows the sorter, so
    /// `clear()` can only run once it is gone.
    pub fn sort(&mut self) -> Result<SortedStream<'_, T>> {
        if self.phase == Phase::Output {
            return Err(Error::Invariant("sort() called twice without clear()".into()).into());
        }
        self.phase = Phase::Output;
        self.stop_worker()?;
        self.peak.record(self.buffer.len());

        let mut last = std::mem::take(&mut self.buffer);
        last.sort_by(|a, b| self.comparator.compare(a, b));

        if self.runs.is_empty() {
            return Ok(SortedStream {
                inner: StreamInner::Memory(last.into_iter()),
                _sorter: PhantomData,
            });
        }

        self.runs.sort_by_key(|r| r.run_index);
        #[cfg(feature = "tracing")]
        tracing::debug!(
            runs = self.runs.len() + 1,
            values = self.values_pushed,
            "merging sorted runs"
        );

        let mut cursors: Vec<RunCursor<T>> = self
            .runs
            .iter()
            .cloned()
            .map(|r| RunCursor::spilled(r, self.reader.clone(), self.budget.clone()))
            .collect();
        if !last.is_empty() {
            cursors.push(RunCursor::in_memory(
                last,
                self.reader.clone(),
                self.budget.clone(),
            ));
        }

        let (tx, rx) = channel::bounded(self.options.merge_channel_capacity);
        let comparator = self.comparator.clone();
        let block_rows = self.options.merge_block_rows;
        let handle = std::thread::Builder::new()
            .name("tristore-sort-merge".into())
            .spawn(move || merge_runs(comparator, cursors, block_rows, tx))
            .map_err(|e| OpError::Exec(format!("spawn sort merge worker: {e}")))?;

        Ok(SortedStream {
            inner: StreamInner::Merged {
                rx: Some(rx),
                block: Vec::new().into_iter(),
                handle: Some(handle),
            },
            _sorter: PhantomData,
        })
    }

    /// Drop all values and spilled runs and return to the input phase.
    pub fn clear(&mut self) -> Result<()> {
        let stopped = self.stop_worker();
        self.buffer.clear();
        self.runs.clear();
        self.phase = Phase::Input;
        self.values_pushed = 0;
        self.peak.reset();
        let deleted = self.spill.lock().delete_spill(self.spill_id)?;
        #[cfg(feature = "tracing")]
        tracing::trace!(pages = deleted, "sorter cleared");
        #[cfg(not(feature = "tracing"))]
        let _ = deleted;
        stopped
    }
}

impl<T, C> Drop for BackgroundExternalSorter<T, C> {
    fn drop(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            drop(worker.tx.take());
            if let Some(h) = worker.handle.take() {
                let _ = h.join();
            }
        }
        let _ = self.spill.lock().delete_spill(self.spill_id);
    }
}

fn merge_runs<T, C>(
    comparator: C,
    mut cursors: Vec<RunCursor<T>>,
    block_rows: usize,
    tx: Sender<Result<Vec<T>>>,
) where
    T: DeserializeOwned,
    C: SortComparator<T>,
{
    let mut heap = MergeHeap::with_capacity(comparator, cursors.len());
    for (run, cursor) in cursors.iter_mut().enumerate() {
        match cursor.next_value() {
            Ok(Some(v)) => heap.push(v, run),
            Ok(None) => {}
            Err(e) => {
                let _ = tx.send(Err(e));
                return;
            }
        }
    }

    let mut block = Vec::with_capacity(block_rows);
    while let Some((value, run)) = heap.pop() {
        block.push(value);
        match cursors[run].next_value() {
            Ok(Some(next)) => heap.push(next, run),
            Ok(None) => {}
            Err(e) => {
                let _ = tx.send(Err(e));
                return;
            }
        }
        if block.len() >= block_rows {
            let full = std::mem::replace(&mut block, Vec::with_capacity(block_rows));
            if tx.send(Ok(full)).is_err() {
                // Consumer dropped the stream.
                return;
            }
        }
    }
    if !block.is_empty() {
        let _ = tx.send(Ok(block));
    }
}

enum StreamInner<T> {
    Memory(std::vec::IntoIter<T>),
    Merged {
        rx: Option<Receiver<Result<Vec<T>>>>,
        block: std::vec::IntoIter<T>,
        handle: Option<JoinHandle<()>>,
    },
}

/// Sorted output of one [`BackgroundExternalSorter::sort`] call.
pub struct SortedStream<'a, T> {
    inner: StreamInner<T>,
    _sorter: PhantomData<&'a mut ()>,
}

impl<T> Iterator for SortedStream<'_, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.inner {
            StreamInner::Memory(values) => values.next().map(Ok),
            StreamInner::Merged { rx, block, handle } => loop {
                if let Some(v) = block.next() {
                    return Some(Ok(v));
                }
                let received = rx.as_ref()?.recv();
                match received {
                    Ok(Ok(next)) => *block = next.into_iter(),
                    Ok(Err(e)) => {
                        *rx = None;
                        return Some(Err(e));
                    }
                    Err(_) => {
                        *rx = None;
                        let panicked = handle.take().map(|h| h.join().is_err()).unwrap_or(false);
                        if panicked {
                            return Some(Err(OpError::Exec("sort merge worker panicked".into())));
                        }
                        return None;
                    }
                }
            },
        }
    }
}

impl<T> Drop for SortedStream<'_, T> {
    fn drop(&mut self) {
        if let StreamInner::Merged { rx, handle, .. } = &mut self.inner {
            drop(rx.take());
            if let Some(h) = handle.take() {
                let _ = h.join();
            }
        }
    }
}
