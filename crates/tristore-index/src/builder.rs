//! Bulk construction of a permutation pair from unsorted triples.

use std::sync::Arc;
use std::time::Instant;

use tristore_core::block::BlockSink;
use tristore_core::config::EngineConfig;
use tristore_core::id::ValueId;
use tristore_core::permutation::Permutation;
use tristore_mem::{MemoryBudgetImpl, Storage};
use tristore_operators::{BackgroundExternalSorter, NaturalOrder};

use crate::error::Result;
use crate::pair::{PermutationPair, PermutationPairWriter};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub input_triples: u64,
    /// Triples left after dropping duplicates.
    pub unique_triples: u64,
    /// Sorted runs the bulk sort spilled.
    pub runs_written: usize,
}

pub struct PermutationBuilder {
    config: EngineConfig,
    budget: MemoryBudgetImpl,
    spill_storage: Arc<dyn Storage>,
}

impl PermutationBuilder {
    pub fn new(
        config: EngineConfig,
        budget: MemoryBudgetImpl,
        spill_storage: Arc<dyn Storage>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            budget,
            spill_storage,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn sorter<T>(&self) -> Result<BackgroundExternalSorter<T, NaturalOrder>>
    where
        T: serde::Serialize + serde::de::DeserializeOwned + Ord + Send + 'static,
    {
        Ok(BackgroundExternalSorter::from_config(
            NaturalOrder,
            &self.config,
            &self.budget,
            Arc::clone(&self.spill_storage),
        )?)
    }

    /// Sort `triples` (given as subject, predicate, object) into
    /// `permutation` order and write it and its twin. Duplicate triples are
    /// stored once.
    pub fn build<I, A, B>(
        &self,
        triples: I,
        permutation: Permutation,
        primary_sink: A,
        twin_sink: B,
    ) -> Result<(PermutationPair<A, B>, BuildStats)>
    where
        I: IntoIterator<Item = [ValueId; 3]>,
        A: BlockSink,
        B: BlockSink,
    {
        let started = Instant::now();
        let capacity = self.config.block_capacity(2)?;
        let mut sorter = self.sorter::<[ValueId; 3]>()?;
        for triple in triples {
            sorter.push(permutation.apply(triple))?;
        }
        let input_triples = sorter.stats().values_pushed;

        let mut writer = PermutationPairWriter::new(
            permutation,
            primary_sink,
            twin_sink,
            capacity,
            self.sorter::<[ValueId; 2]>()?,
            &self.budget,
        )?;
        let mut unique_triples = 0u64;
        let mut previous = None;
        for triple in sorter.sort()? {
            let triple = triple?;
            if previous == Some(triple) {
                continue;
            }
            writer.push(triple)?;
            previous = Some(triple);
            unique_triples += 1;
        }
        let stats = BuildStats {
            input_triples,
            unique_triples,
            runs_written: sorter.stats().runs_written,
        };
        drop(sorter);
        let pair = writer.finish()?;

        #[cfg(feature = "tracing")]
        tracing::info!(
            permutation = %permutation,
            input = stats.input_triples,
            unique = stats.unique_triples,
            runs = stats.runs_written,
            blocks = pair.primary.blocks.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "permutation pair built"
        );
        #[cfg(not(feature = "tracing"))]
        let _ = started;
        Ok((pair, stats))
    }
}
