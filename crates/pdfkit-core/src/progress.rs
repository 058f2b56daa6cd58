//! Batch-wide progress aggregation
//!
//! Files are loaded strictly in order, so when file `i` reports progress every
//! file before it is complete. The overall figure is the declared size of all
//! earlier files plus the bytes loaded so far for the current one.

use serde::Serialize;

use crate::input::InputFile;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProgressState {
    pub files_total: usize,
    pub bytes_total_across_batch: u64,
    pub bytes_loaded_across_batch: u64,
    pub percent: u8,
}

/// `floor(loaded / total * 100)` clamped to 100; 0 when `total` is 0
pub fn percent_of(loaded: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (loaded as u128 * 100) / total as u128;
    pct.min(100) as u8
}

#[derive(Debug, Default)]
pub struct AggregateProgressTracker {
    state: ProgressState,
    lengths: Vec<u64>,
    /// Sum of declared lengths of all files before each index
    offsets: Vec<u64>,
}

impl AggregateProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, files: &[InputFile]) {
        self.begin_with_lengths(files.iter().map(InputFile::byte_length));
    }

    /// Reset for a new run over files of the given declared lengths
    pub fn begin_with_lengths<I>(&mut self, lengths: I)
    where
        I: IntoIterator<Item = u64>,
    {
        self.lengths = lengths.into_iter().collect();
        self.offsets = Vec::with_capacity(self.lengths.len());

        let mut running = 0u64;
        for len in &self.lengths {
            self.offsets.push(running);
            running = running.saturating_add(*len);
        }

        self.state = ProgressState {
            files_total: self.lengths.len(),
            bytes_total_across_batch: running,
            bytes_loaded_across_batch: 0,
            percent: 0,
        };
    }

    /// Record bytes loaded so far for `file_index` and return the new percent
    pub fn record(&mut self, file_index: usize, loaded_bytes_for_file: u64) -> u8 {
        let (Some(offset), Some(len)) = (
            self.offsets.get(file_index),
            self.lengths.get(file_index),
        ) else {
            return self.state.percent;
        };

        let loaded = offset
            .saturating_add(loaded_bytes_for_file.min(*len))
            .min(self.state.bytes_total_across_batch);

        // never move backwards within a run
        if loaded > self.state.bytes_loaded_across_batch {
            self.state.bytes_loaded_across_batch = loaded;
            self.state.percent = percent_of(loaded, self.state.bytes_total_across_batch);
        }

        self.state.percent
    }

    pub fn percent(&self) -> u8 {
        self.state.percent
    }

    pub fn state(&self) -> &ProgressState {
        &self.state
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Property: percent never decreases for monotone per-file progress
        #[test]
        fn percent_is_non_decreasing(
            lengths in prop::collection::vec(0u64..10_000, 0..8),
            steps in prop::collection::vec(0u64..=100, 1..6)
        ) {
            let mut tracker = AggregateProgressTracker::new();
            tracker.begin_with_lengths(lengths.clone());

            let mut sorted = steps.clone();
            sorted.sort_unstable();

            let mut last = 0u8;
            for (index, len) in lengths.iter().enumerate() {
                for step in &sorted {
                    let pct = tracker.record(index, len * step / 100);
                    prop_assert!(pct >= last);
                    prop_assert!(pct <= 100);
                    last = pct;
                }
                let pct = tracker.record(index, *len);
                prop_assert!(pct >= last);
                last = pct;
            }

            let state = tracker.state();
            prop_assert!(state.bytes_loaded_across_batch <= state.bytes_total_across_batch);
            if state.bytes_total_across_batch > 0 {
                prop_assert_eq!(state.percent, 100);
            } else {
                prop_assert_eq!(state.percent, 0);
            }
        }

        /// Property: loaded bytes never exceed the batch total
        #[test]
        fn loaded_never_exceeds_total(
            lengths in prop::collection::vec(0u64..1_000, 1..6),
            records in prop::collection::vec((0usize..8, 0u64..5_000), 0..20)
        ) {
            let mut tracker = AggregateProgressTracker::new();
            tracker.begin_with_lengths(lengths);
            for (index, loaded) in records {
                tracker.record(index, loaded);
                let state = tracker.state();
                prop_assert!(state.bytes_loaded_across_batch <= state.bytes_total_across_batch);
            }
        }
    }
}
