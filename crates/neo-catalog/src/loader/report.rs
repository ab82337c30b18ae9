//! Load summaries.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Samples kept per run.
pub const MAX_ERROR_SAMPLES: usize = 5;

/// Distinct messages listed in the summary.
pub const TOP_ERRORS: usize = 5;

/// How a load ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStatus {
    Completed,
    /// Stopped by a signal; rows read before it were committed.
    Cancelled,
}

/// A failed row, for the summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorSample {
    pub line: usize,
    pub id: Option<String>,
    pub spkid: Option<String>,
    pub orbit_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCount {
    pub message: String,
    pub count: usize,
}

/// Counts errors by message and keeps the first few samples.
#[derive(Debug, Default)]
pub struct ErrorTally {
    counts: HashMap<String, usize>,
    samples: Vec<ErrorSample>,
    total: usize,
}

impl ErrorTally {
    pub fn record(&mut self, sample: ErrorSample) {
        self.total += 1;
        *self.counts.entry(sample.message.clone()).or_insert(0) += 1;
        if self.samples.len() < MAX_ERROR_SAMPLES {
            self.samples.push(sample);
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn samples(&self) -> &[ErrorSample] {
        &self.samples
    }

    /// Most frequent messages, ties broken alphabetically.
    pub fn top(&self, n: usize) -> Vec<ErrorCount> {
        let mut counts: Vec<ErrorCount> = self
            .counts
            .iter()
            .map(|(message, &count)| ErrorCount {
                message: message.clone(),
                count,
            })
            .collect();
        counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.message.cmp(&b.message)));
        counts.truncate(n);
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(line: usize, message: &str) -> ErrorSample {
        ErrorSample {
            line,
            id: None,
            spkid: None,
            orbit_id: None,
            message: message.to_string(),
        }
    }

    #[test]
    fn test_tally_keeps_five_samples_and_ranks_messages() {
        let mut tally = ErrorTally::default();
        for line in 0..7 {
            tally.record(sample(line, "fk violation"));
        }
        tally.record(sample(8, "bad date"));
        tally.record(sample(9, "another"));
        tally.record(sample(10, "bad date"));

        assert_eq!(tally.total(), 10);
        assert_eq!(tally.samples().len(), MAX_ERROR_SAMPLES);
        let top = tally.top(2);
        assert_eq!(top[0].message, "fk violation");
        assert_eq!(top[0].count, 7);
        assert_eq!(top[1].message, "bad date");
    }
}
