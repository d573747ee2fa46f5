//! Splitting an axis into contiguous worker ranges and running a pure function per range.

use crate::error::{Result, ScaterError};
use anyhow::bail;
use log::debug;
use rayon::prelude::*;
use std::ops::Range;
use std::str::FromStr;
use std::time::Instant;

/// How worker ranges are executed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backend {
    /// one range after the other on the calling thread
    Serial,
    /// one task per range on the global rayon pool
    Rayon,
}

impl FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "serial" => Ok(Backend::Serial),
            "rayon" => Ok(Backend::Rayon),
            _ => bail!("Backend not recognized: {}", s),
        }
    }
}

/// Parallel execution settings passed explicitly into every aggregation call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParallelConfig {
    /// number of contiguous ranges the axis is split into
    pub num_workers: usize,
    /// how the ranges are executed
    pub backend: Backend,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        ParallelConfig::serial()
    }
}

impl ParallelConfig {
    /// Single worker on the calling thread
    pub fn serial() -> ParallelConfig {
        ParallelConfig {
            num_workers: 1,
            backend: Backend::Serial,
        }
    }

    /// `num_workers` ranges run on the global rayon pool. The number of threads is
    /// set by rayon, not by `num_workers`.
    pub fn rayon(num_workers: usize) -> ParallelConfig {
        ParallelConfig {
            num_workers,
            backend: Backend::Rayon,
        }
    }
}

/// Partition `0..len` into `num_workers` contiguous, non-overlapping ranges of
/// `len / num_workers` entries each; the last range absorbs the remainder.
pub fn split_ranges(len: usize, num_workers: usize) -> Result<Vec<Range<usize>>> {
    if num_workers < 1 {
        return Err(ScaterError::InvalidWorkerCount(num_workers));
    }
    let chunk = len / num_workers;
    let ranges = (0..num_workers)
        .map(|i| {
            let start = i * chunk;
            let end = if i + 1 == num_workers { len } else { start + chunk };
            start..end
        })
        .collect();
    Ok(ranges)
}

/// Split `0..len` into worker ranges and evaluate `f` on each non-empty range. Results
/// come back in worker order regardless of the backend. The first error aborts the
/// whole call.
pub fn fork_join<T, F>(config: &ParallelConfig, len: usize, f: F) -> Result<Vec<(Range<usize>, T)>>
where
    T: Send,
    F: Fn(Range<usize>) -> Result<T> + Send + Sync,
{
    let tick = Instant::now();
    // empty ranges contribute nothing to any reduction
    let ranges: Vec<Range<usize>> = split_ranges(len, config.num_workers)?
        .into_iter()
        .filter(|r| !r.is_empty())
        .collect();
    let run = |r: Range<usize>| f(r.clone()).map(|t| (r, t));

    let results = match config.backend {
        Backend::Serial => ranges.into_iter().map(run).collect::<Result<Vec<_>>>(),
        Backend::Rayon => ranges.into_par_iter().map(run).collect::<Result<Vec<_>>>(),
    }?;

    debug!(
        "fork_join over {} entries with {} workers took {:.3}s",
        len,
        config.num_workers,
        tick.elapsed().as_millis() as f64 / 1000.0
    );
    Ok(results)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_split_ranges() {
        assert_eq!(split_ranges(10, 1).unwrap(), vec![0..10]);
        assert_eq!(split_ranges(10, 3).unwrap(), vec![0..3, 3..6, 6..10]);
        assert_eq!(split_ranges(2, 3).unwrap(), vec![0..0, 0..0, 0..2]);
        assert_eq!(split_ranges(0, 2).unwrap(), vec![0..0, 0..0]);
        assert_eq!(split_ranges(5, 0), Err(ScaterError::InvalidWorkerCount(0)));
    }

    #[test]
    fn test_ranges_cover_axis() {
        for len in 0..20 {
            for workers in 1..6 {
                let ranges = split_ranges(len, workers).unwrap();
                assert_eq!(ranges.len(), workers);
                let flat: Vec<usize> = ranges.into_iter().flatten().collect();
                assert_eq!(flat, (0..len).collect::<Vec<_>>());
            }
        }
    }

    #[test]
    fn test_fork_join_keeps_order() {
        for config in [ParallelConfig::serial(), ParallelConfig::rayon(4)] {
            let res = fork_join(&config, 11, |r| Ok(r.sum::<usize>())).unwrap();
            let sums: Vec<usize> = res.iter().map(|(_, s)| *s).collect();
            assert_eq!(sums.iter().sum::<usize>(), 55);
            let starts: Vec<usize> = res.iter().map(|(r, _)| r.start).collect();
            let mut sorted = starts.clone();
            sorted.sort_unstable();
            assert_eq!(starts, sorted);
        }
    }

    #[test]
    fn test_fork_join_many_workers_short_axis() {
        for config in [ParallelConfig::serial(), ParallelConfig::rayon(20_000)] {
            let config = ParallelConfig {
                num_workers: 20_000,
                ..config
            };
            let res = fork_join(&config, 3, |r| Ok(r.len())).unwrap();
            assert_eq!(res, vec![(0..3, 3)]);
        }

        let empty = fork_join(&ParallelConfig::rayon(4), 0, |r| Ok(r.len())).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_fork_join_propagates_errors() {
        let config = ParallelConfig::rayon(3);
        let res: Result<Vec<(Range<usize>, ())>> = fork_join(&config, 9, |r| {
            if r.start == 3 {
                Err(ScaterError::InvalidParameter("boom".into()))
            } else {
                Ok(())
            }
        });
        assert_eq!(res.unwrap_err(), ScaterError::InvalidParameter("boom".into()));
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("rayon".parse::<Backend>().unwrap(), Backend::Rayon);
        assert!("threads".parse::<Backend>().is_err());
    }
}
