//! Analysis settings.
//!
//! A plain struct with a [`Default`] and validating setters. Every option
//! has a sensible default, so most callers only touch one or two fields:
//!
//! ```
//! use ftdd::settings::Settings;
//!
//! let mut settings = Settings::default();
//! settings.cut_set_order_limit(2).unwrap().probability_truncation(1e-9).unwrap();
//! assert_eq!(settings.order_limit(), Some(2));
//! ```

use std::time::Duration;

use crate::error::{Error, Result};

/// How basic events are mapped to diagram levels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum VariableOrdering {
    /// Order in which basic events were declared in the model.
    DeclarationOrder,
    /// Position of the first reference in a depth-first walk from the top gate.
    #[default]
    DepthFirst,
    /// Explicit list of basic-event ids. Unlisted events follow in depth-first order.
    Custom(Vec<String>),
}

/// Probability approximation over minimal cut sets.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum Approximation {
    /// Exact probability from the BDD.
    #[default]
    None,
    /// Sum of cut-set probabilities, capped at 1.
    RareEvent,
    /// Min-cut upper bound: `1 - Π(1 - P(cs))`.
    Mcub,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub variable_ordering: VariableOrdering,
    cut_set_order_limit: Option<usize>,
    probability_truncation: Option<f64>,
    /// Expand CCF groups into CCF events and apply substitutions.
    pub enable_ccf_substitutions: bool,
    pub gate_coalescing: bool,
    pub approximation: Approximation,
    pub node_limit: Option<usize>,
    pub cut_set_limit: Option<usize>,
    pub step_budget: Option<u64>,
    pub time_limit: Option<Duration>,
    /// Use the explicit-stack ITE, union and product instead of the
    /// recursive ones.
    pub explicit_stack: bool,
    cache_bits: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            variable_ordering: VariableOrdering::default(),
            cut_set_order_limit: None,
            probability_truncation: None,
            enable_ccf_substitutions: true,
            gate_coalescing: true,
            approximation: Approximation::None,
            node_limit: None,
            cut_set_limit: None,
            step_budget: None,
            time_limit: None,
            explicit_stack: false,
            cache_bits: 16,
        }
    }
}

impl Settings {
    pub fn order_limit(&self) -> Option<usize> {
        self.cut_set_order_limit
    }

    pub fn cut_off(&self) -> Option<f64> {
        self.probability_truncation
    }

    pub fn cache_bits(&self) -> usize {
        self.cache_bits
    }

    /// Limits the size of generated cut sets.
    pub fn cut_set_order_limit(&mut self, limit: usize) -> Result<&mut Self> {
        if limit == 0 {
            return Err(Error::validation(
                "settings",
                "cut set order limit must be at least 1",
            ));
        }
        self.cut_set_order_limit = Some(limit);
        Ok(self)
    }

    pub fn unbounded_order(&mut self) -> &mut Self {
        self.cut_set_order_limit = None;
        self
    }

    /// Discards cut sets whose probability is below `cut_off`.
    pub fn probability_truncation(&mut self, cut_off: f64) -> Result<&mut Self> {
        if !(0.0..=1.0).contains(&cut_off) {
            return Err(Error::validation(
                "settings",
                format!("cut-off probability {} is outside [0, 1]", cut_off),
            ));
        }
        self.probability_truncation = Some(cut_off);
        Ok(self)
    }

    pub fn no_truncation(&mut self) -> &mut Self {
        self.probability_truncation = None;
        self
    }

    /// Sets the computed-cache capacity to `2^bits` entries.
    pub fn set_cache_bits(&mut self, bits: usize) -> Result<&mut Self> {
        if bits > 31 {
            return Err(Error::validation(
                "settings",
                "cache bits should be in the range 0..=31",
            ));
        }
        self.cache_bits = bits;
        Ok(self)
    }

    pub fn with_ordering(mut self, ordering: VariableOrdering) -> Self {
        self.variable_ordering = ordering;
        self
    }

    pub fn with_order_limit(mut self, limit: usize) -> Result<Self> {
        self.cut_set_order_limit(limit)?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.variable_ordering, VariableOrdering::DepthFirst);
        assert_eq!(s.order_limit(), None);
        assert_eq!(s.cut_off(), None);
        assert!(s.enable_ccf_substitutions);
        assert!(s.gate_coalescing);
        assert!(!s.explicit_stack);
        assert_eq!(s.cache_bits(), 16);
    }

    #[test]
    fn test_incorrect_setup() {
        let mut s = Settings::default();
        assert!(s.cut_set_order_limit(0).is_err());
        assert!(s.probability_truncation(-1.0).is_err());
        assert!(s.probability_truncation(10.0).is_err());
        assert!(s.set_cache_bits(40).is_err());
        assert_eq!(s, Settings::default());
    }

    #[test]
    fn test_correct_setup() {
        let mut s = Settings::default();
        s.cut_set_order_limit(1).unwrap();
        s.cut_set_order_limit(32).unwrap();
        assert_eq!(s.order_limit(), Some(32));
        s.probability_truncation(0.0).unwrap();
        s.probability_truncation(1.0).unwrap();
        s.probability_truncation(0.5).unwrap();
        assert_eq!(s.cut_off(), Some(0.5));
        s.unbounded_order().no_truncation();
        assert_eq!(s.order_limit(), None);
        assert_eq!(s.cut_off(), None);
    }
}
