//! Worker-fan-out parsing for large inputs (§4.8).
//!
//! Ranges come from [`Splitter`]; each range is parsed independently by a
//! `BatchParser` on a `rayon` worker, then the per-worker `Store`s are
//! merged back in range order. No shared mutable state between workers —
//! each gets its own `Store` and the merge step is the only place field
//! bytes move between them, mirroring this codebase's join-based
//! concurrency elsewhere (no locks in the hot loop).

use rayon::prelude::*;

use crate::batch::BatchParser;
use crate::dialect::Dialect;
use crate::error::OcsvError;
use crate::splitter::Splitter;
use crate::store::Store;

/// Tuning for [`ParallelDriver`]. The crate's only other configuration
/// value type besides [`Dialect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParallelConfig {
    /// `None` ⇒ detect from available parallelism.
    pub num_threads: Option<usize>,
    /// Below this input size, parallelism is skipped even if requested.
    pub split_threshold_bytes: usize,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            num_threads: None,
            split_threshold_bytes: 1 << 20,
        }
    }
}

pub struct ParallelDriver {
    dialect: Dialect,
    config: ParallelConfig,
}

impl ParallelDriver {
    pub fn new(dialect: Dialect, config: ParallelConfig) -> Result<Self, OcsvError> {
        dialect.validate()?;
        Ok(Self { dialect, config })
    }

    /// Parses `input`, falling back to a single sequential `BatchParser`
    /// whenever the input is too small, only one worker would run, or the
    /// Splitter can't find more than one safe range.
    #[tracing::instrument(level = "debug", skip(self, input), fields(bytes = input.len()))]
    pub fn parse(&self, input: &[u8]) -> Result<Store, OcsvError> {
        let worker_count = self.worker_count(input.len());
        if worker_count <= 1 {
            tracing::debug!(worker_count, "falling back to sequential parse");
            return self.parse_sequential(input);
        }

        let ranges = Splitter::split(input, worker_count, self.dialect.quote);
        if ranges.len() <= 1 {
            tracing::debug!("splitter found no safe interior boundary, falling back");
            return self.parse_sequential(input);
        }

        tracing::debug!(workers = ranges.len(), "spawning parallel workers");
        // Workers parse with the line window stripped: `Cursor::row_index`
        // restarts at 0 per range, so a per-worker `from_line`/`to_line`
        // would filter against a row index local to that range rather than
        // the whole input. Every row is kept here and the window is
        // re-applied below against the running *global* row index, the
        // same quantity `BatchParser`'s own `in_window` check would see.
        let worker_dialect = Dialect {
            from_line: -1,
            to_line: -1,
            ..self.dialect
        };
        let results: Vec<Result<Store, OcsvError>> = ranges
            .par_iter()
            .map(|range| {
                let mut parser = BatchParser::new(worker_dialect)?;
                parser.parse(&input[range.start..range.end])?;
                Ok(parser.store().clone())
            })
            .collect();

        let mut merged = Store::new();
        let mut rows_so_far: u64 = 0;
        for result in results {
            match result {
                Ok(store) => {
                    for (local_idx, row) in store.rows().enumerate() {
                        let global_idx = rows_so_far + local_idx as u64;
                        if self.dialect.in_window(global_idx) {
                            for field in row.fields() {
                                merged.push_field(field);
                            }
                            merged.finish_row();
                        }
                    }
                    rows_so_far += store.row_count() as u64;
                    merged.source_byte_count += store.source_byte_count;
                }
                Err(e) => {
                    tracing::error!(kind = ?e.kind, "worker failed, annotating with global row");
                    return Err(OcsvError::new(
                        e.kind,
                        e.line + rows_so_far as u32,
                        e.column,
                        e.message,
                    ));
                }
            }
        }
        Ok(merged)
    }

    fn parse_sequential(&self, input: &[u8]) -> Result<Store, OcsvError> {
        let mut parser = BatchParser::new(self.dialect)?;
        parser.parse(input)?;
        Ok(parser.store().clone())
    }

    fn worker_count(&self, input_len: usize) -> usize {
        if input_len < self.config.split_threshold_bytes {
            return 1;
        }
        let cores = self
            .config
            .num_threads
            .unwrap_or_else(|| rayon::current_num_threads());
        let by_size = (input_len / self.config.split_threshold_bytes).max(1);
        cores.min(by_size).max(1)
    }
}
