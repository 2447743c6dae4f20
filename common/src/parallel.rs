//! Data-parallel fan-out over mutable chunks.
//!
//! Thin wrappers around rayon's work-stealing pool. Each sub-range gets a
//! disjoint slice, so callers never need cross-chunk synchronization for the
//! output itself.

use rayon::prelude::*;

/// Number of chunks `len` items split into with `chunk_size` items per chunk.
pub fn chunk_count(len: usize, chunk_size: usize) -> usize {
    assert!(chunk_size > 0, "chunk_size must be > 0");
    len.div_ceil(chunk_size)
}

/// Runs `f(offset, chunk)` over disjoint mutable chunks of `data` in parallel.
///
/// `f` returns `false` to stop the fan-out: chunks that have not started yet
/// are skipped, chunks already running finish normally. Returns `true` when
/// every chunk ran to completion.
///
/// # Panics
///
/// Panics if `chunk_size` is 0.
pub fn par_chunks_mut_while<T, F>(data: &mut [T], chunk_size: usize, f: F) -> bool
where
    T: Send,
    F: Fn(usize, &mut [T]) -> bool + Sync,
{
    assert!(chunk_size > 0, "chunk_size must be > 0");

    data.par_chunks_mut(chunk_size)
        .enumerate()
        .try_for_each(|(chunk_idx, chunk)| {
            if f(chunk_idx * chunk_size, chunk) {
                Ok(())
            } else {
                Err(())
            }
        })
        .is_ok()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn chunk_count_rounds_up() {
        assert_eq!(chunk_count(0, 4), 0);
        assert_eq!(chunk_count(8, 4), 2);
        assert_eq!(chunk_count(9, 4), 3);
    }

    #[test]
    #[should_panic(expected = "chunk_size must be > 0")]
    fn zero_chunk_size_panics() {
        chunk_count(10, 0);
    }

    #[test]
    fn chunks_cover_every_element_once() {
        let mut data = vec![1.0_f64; 1003];

        let completed = par_chunks_mut_while(&mut data, 64, |offset, chunk| {
            for (i, value) in chunk.iter_mut().enumerate() {
                *value *= (offset + i) as f64;
            }
            true
        });

        assert!(completed);
        for (i, value) in data.iter().enumerate() {
            assert_eq!(*value, i as f64);
        }
    }

    #[test]
    fn stop_request_reports_incomplete() {
        let started = AtomicUsize::new(0);
        let mut data = vec![0_u8; 10_000];

        let completed = par_chunks_mut_while(&mut data, 1, |_, _| {
            started.fetch_add(1, Ordering::SeqCst);
            false
        });

        assert!(!completed);
        assert!(started.load(Ordering::SeqCst) < 10_000);
    }
}
