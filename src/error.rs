//! Error types shared by every stage of the analysis.
//!
//! Errors are never recovered inside the core: they abort the current
//! analysis step and bubble up to the caller, who may retry with relaxed
//! limits. Diagrams built by earlier successful steps stay valid.

use std::time::Duration;

/// Everything that can go wrong between the model and the results.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// The model or the derived graph is malformed: dangling references,
    /// cycles, bad substitutions, bad settings.
    #[error("validation error at '{node}': {reason}")]
    Validation { node: String, reason: String },

    /// A configured ceiling on diagram nodes or cut sets was exceeded.
    #[error("resource limit exceeded: {what} (limit {limit})")]
    ResourceLimit { what: &'static str, limit: usize },

    /// Enumeration ran out of its step budget or deadline.
    #[error("analysis timed out after {steps} steps ({elapsed:?})")]
    Timeout { steps: u64, elapsed: Duration },

    /// A probability fell outside `[0, 1]`, or a gate is numerically undefined.
    #[error("arithmetic error: {what}")]
    Arithmetic { what: String },
}

impl Error {
    pub fn validation(node: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Validation {
            node: node.into(),
            reason: reason.into(),
        }
    }

    pub fn arithmetic(what: impl Into<String>) -> Self {
        Error::Arithmetic { what: what.into() }
    }

    /// Returns `true` for errors that only abort the in-flight analysis step.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::ResourceLimit { .. } | Error::Timeout { .. })
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Checks that `p` is a finite probability.
pub(crate) fn check_probability(what: &str, p: f64) -> Result<f64> {
    if p.is_finite() && (0.0..=1.0).contains(&p) {
        Ok(p)
    } else {
        Err(Error::arithmetic(format!("{} = {} is outside [0, 1]", what, p)))
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_display() {
        let e = Error::validation("G1", "dangling argument 'X'");
        assert_eq!(e.to_string(), "validation error at 'G1': dangling argument 'X'");

        let e = Error::ResourceLimit {
            what: "BDD nodes",
            limit: 10,
        };
        assert_eq!(e.to_string(), "resource limit exceeded: BDD nodes (limit 10)");
    }

    #[test]
    fn test_retryable() {
        assert!(Error::ResourceLimit { what: "x", limit: 1 }.is_retryable());
        assert!(Error::Timeout {
            steps: 1,
            elapsed: Duration::ZERO
        }
        .is_retryable());
        assert!(!Error::arithmetic("p").is_retryable());
        assert!(!Error::validation("a", "b").is_retryable());
    }

    #[test]
    fn test_check_probability() {
        assert_eq!(check_probability("p", 0.5), Ok(0.5));
        assert_eq!(check_probability("p", 0.0), Ok(0.0));
        assert_eq!(check_probability("p", 1.0), Ok(1.0));
        assert!(check_probability("p", -0.1).is_err());
        assert!(check_probability("p", 1.5).is_err());
        assert!(check_probability("p", f64::NAN).is_err());
    }
}
