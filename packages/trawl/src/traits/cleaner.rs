use crate::types::{ErrorSummary, RawRecord};

/// What cleaning one batch produced: surviving records plus accounting for
/// the ones it dropped.
#[derive(Debug, Default)]
pub struct CleanOutcome {
    pub records: Vec<RawRecord>,
    pub dropped: usize,
    pub errors: Vec<ErrorSummary>,
}

impl CleanOutcome {
    pub fn passthrough(records: Vec<RawRecord>) -> Self {
        Self {
            records,
            dropped: 0,
            errors: Vec::new(),
        }
    }
}

/// Normalizes and filters a batch of raw records. Synchronous and pure;
/// record-level problems drop the record, never fail the batch.
pub trait Cleaner: Send + Sync {
    fn clean(&self, records: Vec<RawRecord>) -> CleanOutcome;
}

/// Passes every record through untouched.
pub struct NoopCleaner;

impl Cleaner for NoopCleaner {
    fn clean(&self, records: Vec<RawRecord>) -> CleanOutcome {
        CleanOutcome::passthrough(records)
    }
}
