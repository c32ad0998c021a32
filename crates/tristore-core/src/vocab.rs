//! Local (auxiliary) vocabularies attached to result blocks.
//!
//! Values created during a query (not in the global dictionary) are kept in
//! word sets. A [`LocalVocabBuilder`] is owned by exactly one producer and is
//! mutable; [`LocalVocabBuilder::finalize`] consumes it into a
//! [`LocalVocab`], which is immutable and shared by `Arc`. Merging
//! vocabularies never copies words, it only unions the set handles.

use std::collections::BTreeSet;
use std::sync::Arc;

type WordSet = BTreeSet<String>;

/// Mutable, exclusively owned vocabulary under construction.
#[derive(Debug, Default)]
pub struct LocalVocabBuilder {
    words: WordSet,
}

impl LocalVocabBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the word was not present yet.
    pub fn add(&mut self, word: impl Into<String>) -> bool {
        self.words.insert(word.into())
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn finalize(self) -> LocalVocab {
        if self.words.is_empty() {
            return LocalVocab::empty();
        }
        LocalVocab {
            sets: vec![Arc::new(self.words)],
        }
    }
}

/// Read-only handle to a union of word sets. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct LocalVocab {
    // Deduplicated by pointer identity, never contains empty sets.
    sets: Vec<Arc<WordSet>>,
}

impl LocalVocab {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Number of distinct words across all sets.
    pub fn len(&self) -> usize {
        if self.sets.len() == 1 {
            return self.sets[0].len();
        }
        self.words().count()
    }

    pub fn num_sets(&self) -> usize {
        self.sets.len()
    }

    pub fn contains(&self, word: &str) -> bool {
        self.sets.iter().any(|s| s.contains(word))
    }

    /// Distinct words in lexical order.
    pub fn words(&self) -> impl Iterator<Item = &str> + '_ {
        let mut all: BTreeSet<&str> = BTreeSet::new();
        for set in &self.sets {
            all.extend(set.iter().map(String::as_str));
        }
        all.into_iter()
    }

    /// Add the sets of `other` that this vocab does not already hold.
    pub fn merge_from(&mut self, other: &LocalVocab) {
        for set in &other.sets {
            if !self.sets.iter().any(|s| Arc::ptr_eq(s, set)) {
                self.sets.push(Arc::clone(set));
            }
        }
    }

    /// Union of any number of vocabularies.
    pub fn merge_all<'a>(vocabs: impl IntoIterator<Item = &'a LocalVocab>) -> LocalVocab {
        let mut out = LocalVocab::empty();
        for v in vocabs {
            out.merge_from(v);
        }
        out
    }

    /// Whether both handles share exactly the same word sets, irrespective
    /// of the order they were merged in.
    pub fn same_sets(&self, other: &LocalVocab) -> bool {
        self.sets.len() == other.sets.len()
            && self
                .sets
                .iter()
                .all(|s| other.sets.iter().any(|o| Arc::ptr_eq(s, o)))
    }
}
