// =============================================================================
// Typed engine errors
// =============================================================================
//
// The decision path never panics and degrades to a failsafe response rather
// than failing closed. These variants distinguish the failures that are
// surfaced to the caller (malformed input) from the ones that are absorbed
// internally and only show up in a response's `method`/`reasons` fields.
//
// =============================================================================

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("event timestamp is required")]
    BarTimestampRequired,

    #[error("required field missing: {name}")]
    FieldMissing { name: String },

    #[error("feature provider unavailable: {reason}")]
    FeatureProviderUnavailable { reason: String },

    #[error("pattern memory not ready for key {key}")]
    PatternMemoryUnready { key: String },

    #[error("internal computation failure: {reason}")]
    InternalComputation { reason: String },

    #[error("outcome record malformed: {reason}")]
    OutcomeMalformed { reason: String },
}

impl EngineError {
    /// Whether this error should be surfaced to the caller as a hard
    /// failure, as opposed to being absorbed into a degraded response.
    pub fn is_caller_visible(&self) -> bool {
        matches!(
            self,
            Self::BarTimestampRequired | Self::FieldMissing { .. } | Self::OutcomeMalformed { .. }
        )
    }
}
