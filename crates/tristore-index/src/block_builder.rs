//! Packs relation rows into size-bounded blocks.
//!
//! Small relations share blocks: their rows are appended to one shared
//! buffer that is written out once it reaches the block capacity, so a
//! shared block may overshoot the capacity by less than one relation. Large
//! relations get exclusive blocks holding only their own key. Before the
//! first exclusive block is written, whatever sits in the shared buffer is
//! flushed, which keeps the blocks ordered by key.

use tristore_core::block::BlockSink;
use tristore_core::error::Error;
use tristore_core::id::{RelationKey, ValueId};
use tristore_core::metadata::BlockMetadata;
use tristore_core::table::IdTable;
use tristore_mem::{MemoryBudgetImpl, Reservation};

use crate::error::Result;

pub struct BlockBuilder<S> {
    sink: S,
    tail_width: usize,
    capacity: usize,
    shared: IdTable,
    /// First and last key in the shared buffer.
    shared_keys: Option<(RelationKey, RelationKey)>,
    reservation: Reservation,
    blocks: Vec<BlockMetadata>,
    finished: bool,
}

impl<S: BlockSink> BlockBuilder<S> {
    /// `capacity` is in rows. One block worth of tails is reserved from
    /// `budget` immediately.
    pub fn new(
        sink: S,
        tail_width: usize,
        capacity: usize,
        budget: &MemoryBudgetImpl,
    ) -> Result<Self> {
        if tail_width == 0 || capacity == 0 {
            return Err(Error::Config(format!(
                "block builder needs a positive tail width and capacity (got {tail_width}, {capacity})"
            ))
            .into());
        }
        let bytes = capacity * tail_width * std::mem::size_of::<ValueId>();
        let reservation = Reservation::new(budget, bytes, "block_builder")?;
        Ok(Self {
            sink,
            tail_width,
            capacity,
            shared: IdTable::with_capacity(tail_width, capacity),
            shared_keys: None,
            reservation,
            blocks: Vec::new(),
            finished: false,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn tail_width(&self) -> usize {
        self.tail_width
    }

    /// Metadata of every block written so far, in write order.
    pub fn blocks(&self) -> &[BlockMetadata] {
        &self.blocks
    }

    pub fn pending_shared_rows(&self) -> usize {
        self.shared.num_rows()
    }

    fn check_input(&self, key: RelationKey, rows: &IdTable) -> Result<()> {
        if self.finished {
            return Err(Error::Invariant(format!(
                "relation {key} pushed after the block builder finished"
            ))
            .into());
        }
        if rows.num_columns() != self.tail_width {
            return Err(Error::Invariant(format!(
                "relation {key} has {} tail columns, blocks hold {}",
                rows.num_columns(),
                self.tail_width
            ))
            .into());
        }
        if rows.is_empty() {
            return Err(Error::Invariant(format!("relation {key} has no rows")).into());
        }
        Ok(())
    }

    /// Append a whole relation to the shared buffer. Returns the row
    /// offset of the relation inside the block it ends up in.
    pub fn push_shared(&mut self, key: RelationKey, rows: &IdTable) -> Result<u64> {
        self.check_input(key, rows)?;
        let offset = self.shared.num_rows() as u64;
        self.shared_keys = Some(match self.shared_keys {
            Some((first, _)) => (first, key),
            None => (key, key),
        });
        self.shared.extend_from(rows)?;
        self.reservation.ensure(self.shared.size_bytes())?;
        if self.shared.num_rows() >= self.capacity {
            self.flush_shared()?;
        }
        Ok(offset)
    }

    /// Write `rows` of one relation into blocks of its own, at most
    /// `capacity` rows each.
    pub fn push_exclusive(&mut self, key: RelationKey, rows: &IdTable) -> Result<()> {
        self.check_input(key, rows)?;
        self.flush_shared()?;
        if rows.num_rows() <= self.capacity {
            return self.emit(key, key, rows);
        }
        let mut start = 0;
        while start < rows.num_rows() {
            let end = (start + self.capacity).min(rows.num_rows());
            self.emit(key, key, &rows.slice(start, end))?;
            start = end;
        }
        Ok(())
    }

    fn flush_shared(&mut self) -> Result<()> {
        let Some((first, last)) = self.shared_keys.take() else {
            return Ok(());
        };
        let block = std::mem::replace(
            &mut self.shared,
            IdTable::with_capacity(self.tail_width, self.capacity),
        );
        self.emit(first, last, &block)?;
        self.reservation
            .shrink_to(self.capacity * self.tail_width * std::mem::size_of::<ValueId>());
        Ok(())
    }

    fn emit(&mut self, first: RelationKey, last: RelationKey, tails: &IdTable) -> Result<()> {
        let meta = self.sink.write_block(first, last, tails)?;
        #[cfg(feature = "tracing")]
        tracing::trace!(
            block = self.blocks.len(),
            first = %first,
            last = %last,
            rows = tails.num_rows(),
            bytes = meta.compressed_size,
            "block written"
        );
        self.blocks.push(meta);
        Ok(())
    }

    /// Flush the shared buffer. Calling it again does nothing.
    pub fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.flush_shared()?;
        self.finished = true;
        #[cfg(feature = "tracing")]
        tracing::debug!(blocks = self.blocks.len(), "block builder finished");
        Ok(())
    }

    pub fn into_parts(self) -> (Vec<BlockMetadata>, S) {
        (self.blocks, self.sink)
    }
}
