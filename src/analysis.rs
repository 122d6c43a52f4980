//! One fault-tree analysis: the reduced graph and the diagrams built from it.
//!
//! ```
//! use ftdd::analysis::Analysis;
//! use ftdd::model::{Formula, Model};
//! use ftdd::settings::Settings;
//!
//! let mut model = Model::new();
//! model
//!     .add_basic_event("A", 0.1)?
//!     .add_basic_event("B", 0.2)?
//!     .add_basic_event("C", 0.3)?
//!     .add_gate("G", Formula::and(["B", "C"]))?
//!     .add_gate("TOP", Formula::or(["A", "G"]))?;
//!
//! let mut analysis = Analysis::new(&model, "TOP", Settings::default())?;
//! assert!((analysis.probability()? - 0.154).abs() < 1e-12);
//!
//! let cut_sets: Vec<String> = analysis.cut_sets()?.iter().map(|cs| cs.to_string()).collect();
//! assert_eq!(cut_sets, ["{A}", "{B, C}"]);
//! # Ok::<(), ftdd::error::Error>(())
//! ```

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use log::{debug, info};
use num_bigint::BigUint;

use crate::bdd::{Bdd, Importance};
use crate::error::{Error, Result};
use crate::model::Model;
use crate::pdag::{Pdag, Stage};
use crate::reference::Ref;
use crate::settings::{Approximation, Settings};
use crate::zbdd::{is_complement_literal, literal_level, literal_probability, Extraction, Zbdd, ZbddId};

/// A basic event or its complement inside a cut set.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Literal {
    pub event: String,
    pub complement: bool,
}

impl Display for Literal {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.complement {
            write!(f, "¬{}", self.event)
        } else {
            write!(f, "{}", self.event)
        }
    }
}

/// A minimal cut set with its probability.
#[derive(Debug, Clone, PartialEq)]
pub struct CutSet {
    /// Literals in variable order.
    pub literals: Vec<Literal>,
    pub probability: f64,
}

impl CutSet {
    pub fn order(&self) -> usize {
        self.literals.len()
    }

    /// Event ids of the set, complements prefixed with `¬`.
    pub fn events(&self) -> Vec<String> {
        self.literals.iter().map(|l| l.to_string()).collect()
    }

    pub fn contains(&self, event: &str) -> bool {
        self.literals.iter().any(|l| l.event == event)
    }
}

impl Display for CutSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, l) in self.literals.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", l)?;
        }
        write!(f, "}}")
    }
}

/// Importance factors of one basic event.
#[derive(Debug, Clone, PartialEq)]
pub struct EventImportance {
    pub event: String,
    /// Number of minimal cut sets the event appears in.
    pub occurrence: usize,
    pub factors: Importance,
}

/// Sizes of the graph and the diagrams.
#[derive(Debug, Clone, PartialEq)]
pub struct Statistics {
    pub stage: Stage,
    pub gates: usize,
    pub variables: usize,
    pub bdd_nodes: usize,
    pub bdd_peak_nodes: usize,
    pub bdd_cache_hit_rate: f64,
    pub zbdd_nodes: usize,
    pub zbdd_peak_nodes: usize,
    pub zbdd_cache_hit_rate: f64,
    /// Number of minimal cut sets of the last ZBDD encoding.
    pub cut_sets: Option<BigUint>,
}

/// Analysis context for one top event.
///
/// Owns its diagram managers: a context is never shared between analyses,
/// and concurrent analyses each build their own.
pub struct Analysis {
    settings: Settings,
    pdag: Pdag,
    bdd: Bdd,
    zbdd: Zbdd,
    bdd_root: Option<Ref>,
    zbdd_root: Option<ZbddId>,
    cut_sets: Option<Vec<CutSet>>,
}

impl Analysis {
    /// Builds and reduces the graph of `top`.
    pub fn new(model: &Model, top: &str, settings: Settings) -> Result<Self> {
        debug!("Analysis::new(top = {})", top);
        let mut pdag = Pdag::build(model, top, &settings)?;
        pdag.reduce(&settings)?;
        let bdd = Bdd::from_settings(&settings);
        let zbdd = Zbdd::from_settings(&settings);
        info!(
            "{}: {} gates, {} variables after reduction",
            top,
            pdag.gate_count(),
            pdag.variables().len()
        );
        Ok(Self {
            settings,
            pdag,
            bdd,
            zbdd,
            bdd_root: None,
            zbdd_root: None,
            cut_sets: None,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn pdag(&self) -> &Pdag {
        &self.pdag
    }

    pub fn bdd(&self) -> &Bdd {
        &self.bdd
    }

    pub fn zbdd(&self) -> &Zbdd {
        &self.zbdd
    }

    fn probabilities(&self) -> Vec<f64> {
        self.pdag.variables().iter().map(|v| v.probability).collect()
    }

    /// BDD of the top event, encoded on first use.
    pub fn bdd_root(&mut self) -> Result<Ref> {
        if let Some(root) = self.bdd_root {
            return Ok(root);
        }
        let root = self.bdd.encode(&self.pdag)?;
        self.pdag.advance(Stage::Encoded);
        self.bdd_root = Some(root);
        Ok(root)
    }

    /// Exact top-event probability.
    pub fn probability(&mut self) -> Result<f64> {
        let root = self.bdd_root()?;
        let p = self.bdd.probability(root, &self.probabilities())?;
        info!("P(top) = {} ({} BDD nodes)", p, self.bdd.node_count());
        Ok(p)
    }

    /// Minimal cut sets under the configured order limit.
    ///
    /// Sorted by order, then by variable order.
    pub fn cut_sets(&mut self) -> Result<Vec<CutSet>> {
        if let Some(cut_sets) = &self.cut_sets {
            return Ok(cut_sets.clone());
        }
        let cut_sets = self.extract(self.settings.order_limit())?;
        self.cut_sets = Some(cut_sets.clone());
        Ok(cut_sets)
    }

    /// Minimal cut sets of at most `order` literals.
    ///
    /// Reuses the ZBDD manager of earlier runs; a failed run leaves their
    /// results intact.
    pub fn cut_sets_with_limit(&mut self, order: usize) -> Result<Vec<CutSet>> {
        if order == 0 {
            return Err(Error::validation("settings", "cut set order limit must be at least 1"));
        }
        self.extract(Some(order))
    }

    fn extract(&mut self, order: Option<usize>) -> Result<Vec<CutSet>> {
        let root = self.zbdd.encode(&self.pdag, order)?;
        self.pdag.advance(Stage::Encoded);
        self.zbdd_root = Some(root);

        let probabilities = self.probabilities();
        let extraction = Extraction::from_settings(&self.settings, &probabilities);
        let mut sets = self.zbdd.extract(root, &extraction)?;
        for set in &mut sets {
            set.sort_unstable();
        }
        sets.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));

        let cut_sets: Vec<CutSet> = sets
            .into_iter()
            .map(|set| {
                let probability = set.iter().map(|&var| literal_probability(&probabilities, var)).product();
                let literals = set
                    .into_iter()
                    .map(|var| Literal {
                        event: self.pdag.variables()[literal_level(var) as usize - 1].id.clone(),
                        complement: is_complement_literal(var),
                    })
                    .collect();
                CutSet { literals, probability }
            })
            .collect();
        self.pdag.advance(Stage::Extracted);
        info!(
            "{} minimal cut sets (order limit {:?}, {} ZBDD nodes)",
            cut_sets.len(),
            order,
            self.zbdd.node_count()
        );
        Ok(cut_sets)
    }

    /// Top-event probability from the cut sets.
    ///
    /// [`Approximation::None`] falls back to the exact BDD value.
    pub fn approximate_probability(&mut self, approximation: Approximation) -> Result<f64> {
        match approximation {
            Approximation::None => self.probability(),
            Approximation::RareEvent => {
                let sum: f64 = self.cut_sets()?.iter().map(|cs| cs.probability).sum();
                Ok(sum.min(1.0))
            }
            Approximation::Mcub => {
                let q: f64 = self.cut_sets()?.iter().map(|cs| 1.0 - cs.probability).product();
                Ok(1.0 - q)
            }
        }
    }

    /// Probability with the configured approximation.
    pub fn estimate(&mut self) -> Result<f64> {
        let approximation = self.settings.approximation;
        self.approximate_probability(approximation)
    }

    /// Number of minimal cut sets per order.
    pub fn product_distribution(&mut self) -> Result<BTreeMap<usize, usize>> {
        let mut distribution = BTreeMap::new();
        for cs in self.cut_sets()? {
            *distribution.entry(cs.order()).or_insert(0) += 1;
        }
        Ok(distribution)
    }

    /// Importance factors of every basic event in the graph.
    pub fn importance(&mut self) -> Result<Vec<EventImportance>> {
        let root = self.bdd_root()?;
        let factors = self.bdd.importance(root, &self.probabilities())?;
        let cut_sets = self.cut_sets()?;
        let res = self
            .pdag
            .variables()
            .iter()
            .zip(factors)
            .map(|(v, factors)| EventImportance {
                event: v.id.clone(),
                occurrence: cut_sets.iter().filter(|cs| cs.contains(&v.id)).count(),
                factors,
            })
            .collect();
        Ok(res)
    }

    pub fn statistics(&self) -> Statistics {
        Statistics {
            stage: self.pdag.stage(),
            gates: self.pdag.gate_count(),
            variables: self.pdag.variables().len(),
            bdd_nodes: self.bdd.node_count(),
            bdd_peak_nodes: self.bdd.peak_nodes(),
            bdd_cache_hit_rate: self.bdd.cache_hit_rate(),
            zbdd_nodes: self.zbdd.node_count(),
            zbdd_peak_nodes: self.zbdd.peak_nodes(),
            zbdd_cache_hit_rate: self.zbdd.cache_hit_rate(),
            cut_sets: self.zbdd_root.map(|root| self.zbdd.count(root)),
        }
    }
}
