//! Bridges the callback-driven join core into eager or chunked results.
//!
//! Inputs arrive in the caller's column order and are brought into the
//! canonical "join columns first" layout block by block. Eagerly, the join
//! runs on the calling thread and the whole result is permuted back once.
//! Lazily, a worker thread runs the block-wise join and every chunk of
//! `join_chunk_size` rows is permuted and sent over a bounded channel, so
//! the worker never runs more than `lazy_channel_capacity` chunks ahead of
//! the consumer.

use std::any::Any;
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam::channel::{self, Receiver, Sender};
use serde::{Deserialize, Serialize};
use tristore_core::cancel::CancellationHandle;
use tristore_core::config::EngineConfig;
use tristore_core::error::Error;
use tristore_core::table::IdTable;
use tristore_core::vocab::LocalVocab;
use tristore_index::RelationBlocks;
use tristore_mem::MemoryBudgetImpl;
use tristore_operators::{
    block_join, galloping_join, zipper_join, CombinedRowAdder, JoinBlock, JoinColumnMapping,
    OpError, UndefPolicy,
};

use crate::error::{ExecError, Result};
use crate::progress::{ProgressSink, SendPriority};

type BlockStream = Box<dyn Iterator<Item = tristore_operators::Result<JoinBlock>> + Send>;

/// One side of a join. Every variant must be sorted on the side's join
/// columns in priority order.
pub enum JoinInput {
    Materialized(JoinBlock),
    Lazy(BlockStream),
    /// Tail rows of a permutation scan; reports progress per block.
    IndexScan {
        blocks: RelationBlocks,
        progress: Arc<dyn ProgressSink>,
    },
}

impl JoinInput {
    pub fn materialized(table: IdTable) -> Self {
        JoinInput::Materialized(JoinBlock::without_vocab(table))
    }

    pub fn lazy<I>(blocks: I) -> Self
    where
        I: IntoIterator<Item = tristore_operators::Result<JoinBlock>>,
        I::IntoIter: Send + 'static,
    {
        JoinInput::Lazy(Box::new(blocks.into_iter()))
    }

    pub fn index_scan(blocks: RelationBlocks, progress: Arc<dyn ProgressSink>) -> Self {
        JoinInput::IndexScan { blocks, progress }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRequest {
    /// `(left column, right column)` pairs in join priority order.
    pub join_columns: Vec<(usize, usize)>,
    pub num_left_columns: usize,
    pub num_right_columns: usize,
    pub keep_join_columns: bool,
    /// Left, then right.
    pub undef_policies: [UndefPolicy; 2],
}

impl JoinRequest {
    pub fn new(join_columns: Vec<(usize, usize)>, num_left: usize, num_right: usize) -> Self {
        Self {
            join_columns,
            num_left_columns: num_left,
            num_right_columns: num_right,
            keep_join_columns: true,
            undef_policies: [UndefPolicy::SkipUndefined; 2],
        }
    }

    pub fn with_keep_join_columns(mut self, keep: bool) -> Self {
        self.keep_join_columns = keep;
        self
    }

    pub fn with_undef_policies(mut self, left: UndefPolicy, right: UndefPolicy) -> Self {
        self.undef_policies = [left, right];
        self
    }

    pub fn mapping(&self) -> Result<JoinColumnMapping> {
        Ok(JoinColumnMapping::compute(
            &self.join_columns,
            self.num_left_columns,
            self.num_right_columns,
            self.keep_join_columns,
        )?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputMode {
    #[default]
    Eager,
    Lazy,
}

pub enum JoinOutput {
    Eager(JoinBlock),
    Lazy(LazyJoinResult),
}

enum BlockInput {
    Once(Option<JoinBlock>),
    Stream(BlockStream),
    Scan {
        blocks: RelationBlocks,
        progress: Arc<dyn ProgressSink>,
        reported: bool,
    },
}

/// A join input viewed in canonical column order.
struct CanonicalBlocks {
    source: BlockInput,
    permutation: Vec<usize>,
    num_columns: usize,
    side: &'static str,
}

impl CanonicalBlocks {
    fn new(input: JoinInput, permutation: &[usize], num_columns: usize, side: &'static str) -> Self {
        let source = match input {
            JoinInput::Materialized(block) => BlockInput::Once(Some(block)),
            JoinInput::Lazy(stream) => BlockInput::Stream(stream),
            JoinInput::IndexScan { blocks, progress } => BlockInput::Scan {
                blocks,
                progress,
                reported: false,
            },
        };
        Self {
            source,
            permutation: permutation.to_vec(),
            num_columns,
            side,
        }
    }

    fn next_raw(&mut self) -> Option<tristore_operators::Result<JoinBlock>> {
        match &mut self.source {
            BlockInput::Once(block) => block.take().map(Ok),
            BlockInput::Stream(stream) => stream.next(),
            BlockInput::Scan {
                blocks,
                progress,
                reported,
            } => {
                let item = blocks.next()?;
                let priority = if *reported {
                    SendPriority::IfDue
                } else {
                    SendPriority::Always
                };
                *reported = true;
                progress.report(&blocks.progress(), priority);
                Some(
                    item.map(|slice| JoinBlock::without_vocab(slice.tails))
                        .map_err(|e| OpError::Core(e.into())),
                )
            }
        }
    }

    fn canonical(&self, block: JoinBlock) -> tristore_operators::Result<JoinBlock> {
        to_canonical(block, &self.permutation, self.num_columns, self.side)
    }
}

fn to_canonical(
    block: JoinBlock,
    permutation: &[usize],
    num_columns: usize,
    side: &'static str,
) -> tristore_operators::Result<JoinBlock> {
    if block.table.num_columns() != num_columns {
        return Err(Error::Invariant(format!(
            "{side} join input block has {} columns, the request says {num_columns}",
            block.table.num_columns(),
        ))
        .into());
    }
    let table = block.table.select_columns(permutation)?;
    Ok(JoinBlock::new(table, block.vocab))
}

impl Iterator for CanonicalBlocks {
    type Item = tristore_operators::Result<JoinBlock>;

    fn next(&mut self) -> Option<Self::Item> {
        let block = self.next_raw()?;
        Some(block.and_then(|b| self.canonical(b)))
    }
}

pub struct LazyJoinOrchestrator {
    config: EngineConfig,
    budget: MemoryBudgetImpl,
}

impl LazyJoinOrchestrator {
    pub fn new(config: EngineConfig, budget: MemoryBudgetImpl) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, budget })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn join(
        &self,
        request: &JoinRequest,
        left: JoinInput,
        right: JoinInput,
        mode: OutputMode,
        cancel: CancellationHandle,
    ) -> Result<JoinOutput> {
        match mode {
            OutputMode::Eager => self
                .join_eager(request, left, right, &cancel)
                .map(JoinOutput::Eager),
            OutputMode::Lazy => self
                .join_lazy(request, left, right, cancel)
                .map(JoinOutput::Lazy),
        }
    }

    fn use_galloping(&self, request: &JoinRequest, left_rows: usize, right_rows: usize) -> bool {
        let never_undefined = request
            .undef_policies
            .iter()
            .all(|p| *p == UndefPolicy::NeverUndefined);
        let (small, large) = (left_rows.min(right_rows), left_rows.max(right_rows));
        never_undefined && large / small.max(1) > self.config.gallop_threshold
    }

    /// Run the whole join on the calling thread.
    pub fn join_eager(
        &self,
        request: &JoinRequest,
        left: JoinInput,
        right: JoinInput,
        cancel: &CancellationHandle,
    ) -> Result<JoinBlock> {
        let mapping = request.mapping()?;
        let k = mapping.num_join_columns();
        let mut adder = CombinedRowAdder::new(
            k,
            mapping.num_canonical_columns(),
            usize::MAX,
            &self.budget,
            cancel.clone(),
            |_: IdTable, _: LocalVocab| -> tristore_operators::Result<()> { Ok(()) },
        );
        #[cfg(feature = "tracing")]
        tracing::debug!(join_columns = k, "eager join started");

        match (left, right) {
            (JoinInput::Materialized(l), JoinInput::Materialized(r)) => {
                cancel.check("join")?;
                let l = to_canonical(l, mapping.permutation_left(), request.num_left_columns, "left")?;
                let r = to_canonical(
                    r,
                    mapping.permutation_right(),
                    request.num_right_columns,
                    "right",
                )?;
                adder.set_input_vocabs(&l.vocab, &r.vocab);
                if self.use_galloping(request, l.num_rows(), r.num_rows()) {
                    galloping_join(&l.table, &r.table, k, &mut adder)?;
                } else {
                    zipper_join(&l.table, &r.table, k, request.undef_policies, &mut adder)?;
                }
            }
            (left, right) => {
                let left = CanonicalBlocks::new(
                    left,
                    mapping.permutation_left(),
                    request.num_left_columns,
                    "left",
                );
                let right = CanonicalBlocks::new(
                    right,
                    mapping.permutation_right(),
                    request.num_right_columns,
                    "right",
                );
                block_join(left, right, k, request.undef_policies, cancel, &mut adder)?;
            }
        }

        let (table, vocab) = adder.into_parts();
        #[cfg(feature = "tracing")]
        tracing::debug!(rows = table.num_rows(), "eager join finished");
        Ok(JoinBlock::new(mapping.to_result(&table)?, vocab))
    }

    /// Start the join on a worker thread and return the chunk sequence.
    pub fn join_lazy(
        &self,
        request: &JoinRequest,
        left: JoinInput,
        right: JoinInput,
        cancel: CancellationHandle,
    ) -> Result<LazyJoinResult> {
        let mapping = request.mapping()?;
        let left = CanonicalBlocks::new(
            left,
            mapping.permutation_left(),
            request.num_left_columns,
            "left",
        );
        let right = CanonicalBlocks::new(
            right,
            mapping.permutation_right(),
            request.num_right_columns,
            "right",
        );
        let job = LazyJob {
            left,
            right,
            mapping,
            policies: request.undef_policies,
            chunk_size: self.config.join_chunk_size,
            budget: self.budget.clone(),
            cancel: cancel.clone(),
        };
        let (tx, rx) = channel::bounded(self.config.lazy_channel_capacity);
        let handle = std::thread::Builder::new()
            .name("tristore-lazy-join".into())
            .spawn(move || job.run(tx))
            .map_err(|e| ExecError::Worker(format!("spawn lazy join worker: {e}")))?;
        Ok(LazyJoinResult {
            rx: Some(rx),
            handle: Some(handle),
            cancel,
            chunks: 0,
            rows: 0,
        })
    }
}

struct LazyJob {
    left: CanonicalBlocks,
    right: CanonicalBlocks,
    mapping: JoinColumnMapping,
    policies: [UndefPolicy; 2],
    chunk_size: usize,
    budget: MemoryBudgetImpl,
    cancel: CancellationHandle,
}

impl LazyJob {
    fn run(self, tx: Sender<Result<JoinBlock>>) {
        crate::fail_point!("panic_lazy_join_worker");
        #[cfg(feature = "tracing")]
        tracing::debug!(
            join_columns = self.mapping.num_join_columns(),
            chunk_size = self.chunk_size,
            "lazy join started"
        );
        match self.drive(&tx) {
            Ok(rows) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(rows, "lazy join finished");
                #[cfg(not(feature = "tracing"))]
                let _ = rows;
            }
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(cancelled = e.is_cancelled(), error = %e, "lazy join stopped");
                // The consumer may be gone already.
                let _ = tx.send(Err(e.into()));
            }
        }
    }

    fn drive(self, tx: &Sender<Result<JoinBlock>>) -> tristore_operators::Result<u64> {
        let LazyJob {
            left,
            right,
            mapping,
            policies,
            chunk_size,
            budget,
            cancel,
        } = self;
        let k = mapping.num_join_columns();
        let mut adder = CombinedRowAdder::new(
            k,
            mapping.num_canonical_columns(),
            chunk_size,
            &budget,
            cancel.clone(),
            |chunk: IdTable, vocab: LocalVocab| -> tristore_operators::Result<()> {
                let table = mapping.to_result(&chunk)?;
                tx.send(Ok(JoinBlock::new(table, vocab)))
                    .map_err(|_| OpError::Exec("lazy join consumer went away".into()))
            },
        );
        block_join(left, right, k, policies, &cancel, &mut adder)?;
        adder.finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}

/// Chunks of a lazily computed join, in result order.
///
/// Dropping it before the end cancels the worker and waits for it.
pub struct LazyJoinResult {
    rx: Option<Receiver<Result<JoinBlock>>>,
    handle: Option<JoinHandle<()>>,
    cancel: CancellationHandle,
    chunks: u64,
    rows: u64,
}

impl LazyJoinResult {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn chunks_received(&self) -> u64 {
        self.chunks
    }

    pub fn rows_received(&self) -> u64 {
        self.rows
    }

    fn join_worker(&mut self) -> Result<()> {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|payload| ExecError::WorkerPanicked(panic_message(payload.as_ref()))),
            None => Ok(()),
        }
    }
}

impl Iterator for LazyJoinResult {
    type Item = Result<JoinBlock>;

    fn next(&mut self) -> Option<Self::Item> {
        let received = self.rx.as_ref()?.recv();
        match received {
            Ok(Ok(block)) => {
                self.chunks += 1;
                self.rows += block.num_rows() as u64;
                Some(Ok(block))
            }
            Ok(Err(e)) => {
                self.rx = None;
                // The worker sends at most one error and then returns.
                let _ = self.join_worker();
                Some(Err(e))
            }
            Err(_) => {
                self.rx = None;
                self.join_worker().err().map(Err)
            }
        }
    }
}

impl Drop for LazyJoinResult {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.cancel.cancel();
        }
        drop(self.rx.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
