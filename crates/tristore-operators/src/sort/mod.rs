//! External sorting: run generation on a background worker and a k-way
//! merge on a second one.

use std::cmp::Ordering;

pub mod external;
pub mod run;

pub use external::{BackgroundExternalSorter, SortedStream, SorterOptions, SorterStats};

/// Total order used by the sorter. Cloned into the worker threads.
pub trait SortComparator<T>: Clone + Send + 'static {
    fn compare(&self, a: &T, b: &T) -> Ordering;
}

impl<T, F> SortComparator<T> for F
where
    F: Fn(&T, &T) -> Ordering + Clone + Send + 'static,
{
    fn compare(&self, a: &T, b: &T) -> Ordering {
        self(a, b)
    }
}

/// `Ord::cmp`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NaturalOrder;

impl<T: Ord> SortComparator<T> for NaturalOrder {
    fn compare(&self, a: &T, b: &T) -> Ordering {
        a.cmp(b)
    }
}
