use crate::normalize::ParseStats;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Summary of one pipeline run. Persisted under `last_stats` and replaced by
/// the next run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub lines_total: usize,
    pub parsed_by_scheme: BTreeMap<String, usize>,
    pub failed_by_scheme: BTreeMap<String, usize>,
    pub duplicates: usize,
    pub chunk_line_counts: Vec<usize>,
}

impl RunStats {
    pub fn new(parse: ParseStats, duplicates: usize, chunk_line_counts: Vec<usize>) -> Self {
        RunStats {
            lines_total: parse.lines_total,
            parsed_by_scheme: parse.parsed_by_scheme,
            failed_by_scheme: parse.failed_by_scheme,
            duplicates,
            chunk_line_counts,
        }
    }
}
