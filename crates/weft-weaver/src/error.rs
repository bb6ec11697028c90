//! Internal weaver errors
//!
//! These are unexpected failures, not validation findings: validation runs
//! before any mutation and reports through [`crate::diag`]. A `WeaveError`
//! escaping the weaving core is caught at the top level, logged, and
//! downgraded to an unchanged outcome for the module.

use thiserror::Error;

/// Unexpected internal failures during planning or emission.
#[derive(Debug, Error)]
pub enum WeaveError {
    /// A planned advice call lost its generic instantiation
    #[error("missing generic instantiation for advice {advice} on {target}")]
    MissingInstantiation {
        /// Advice path
        advice: String,
        /// Target method path
        target: String,
    },

    /// A planned advice parameter has no argument source
    #[error("advice parameter {param} of {advice} has no argument source in {target}")]
    MissingArgSource {
        /// Parameter name
        param: String,
        /// Advice path
        advice: String,
        /// Target method path
        target: String,
    },

    /// A method scheduled for weaving has no body
    #[error("method {0} has no body to weave")]
    MissingBody(String),
}
