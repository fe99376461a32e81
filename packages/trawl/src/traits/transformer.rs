use crate::types::{ErrorSummary, RawRecord};

/// What transforming one batch produced.
#[derive(Debug, Default)]
pub struct TransformOutcome {
    pub records: Vec<RawRecord>,
    pub errors: Vec<ErrorSummary>,
}

impl TransformOutcome {
    pub fn passthrough(records: Vec<RawRecord>) -> Self {
        Self {
            records,
            errors: Vec::new(),
        }
    }
}

/// Reshapes cleaned records: renames, type conversions, derived fields.
/// A record a conversion cannot handle is dropped with an error summary.
pub trait Transformer: Send + Sync {
    fn transform(&self, records: Vec<RawRecord>) -> TransformOutcome;
}

/// Passes every record through untouched.
pub struct NoopTransformer;

impl Transformer for NoopTransformer {
    fn transform(&self, records: Vec<RawRecord>) -> TransformOutcome {
        TransformOutcome::passthrough(records)
    }
}
