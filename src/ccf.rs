//! Common-cause failure (CCF) groups.
//!
//! A group of `n` members with total failure probability `Q` is expanded into
//! CCF events, one per combination of members that can fail together. Each
//! member then fails if any CCF event containing it occurs. The models below
//! differ only in how `Q` is split between the levels (the number of members
//! failing together).
//!
//! ```
//! use ftdd::ccf::{CcfGroup, CcfModel};
//!
//! let group = CcfGroup::new("pumps", ["A", "B"], 0.01, CcfModel::BetaFactor(0.1));
//! let events = group.events()?;
//! let ids: Vec<&str> = events.iter().map(|e| e.id.as_str()).collect();
//! assert_eq!(ids, ["[A]", "[B]", "[A B]"]);
//! assert!((events[2].probability - 0.001).abs() < 1e-15);
//! # Ok::<(), ftdd::error::Error>(())
//! ```

use log::debug;

use crate::error::{check_probability, Error, Result};

const PHI_TOLERANCE: f64 = 1e-6;

/// How the group probability is split between the levels.
#[derive(Debug, Clone, PartialEq)]
pub enum CcfModel {
    /// Either one member fails alone or all of them fail together.
    BetaFactor(f64),
    /// Multiple Greek letters `ρ_2, ..., ρ_m`: the chance that `k` or more
    /// members fail given that `k - 1` did.
    Mgl(Vec<f64>),
    /// Fractions `α_1, ..., α_m` of failures that hit exactly `k` members.
    AlphaFactor(Vec<f64>),
    /// Direct fractions `φ_1, ..., φ_m` of `Q` per level, summing to 1.
    PhiFactor(Vec<f64>),
}

impl CcfModel {
    fn name(&self) -> &'static str {
        match self {
            CcfModel::BetaFactor(_) => "beta-factor",
            CcfModel::Mgl(_) => "MGL",
            CcfModel::AlphaFactor(_) => "alpha-factor",
            CcfModel::PhiFactor(_) => "phi-factor",
        }
    }

    fn factors(&self) -> &[f64] {
        match self {
            CcfModel::BetaFactor(beta) => std::slice::from_ref(beta),
            CcfModel::Mgl(f) | CcfModel::AlphaFactor(f) | CcfModel::PhiFactor(f) => f,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CcfGroup {
    pub id: String,
    /// Basic events of the group, in declaration order.
    pub members: Vec<String>,
    /// Total failure probability `Q` of one member.
    pub probability: f64,
    pub model: CcfModel,
}

/// A generated basic event: the members in `members` fail together.
#[derive(Debug, Clone, PartialEq)]
pub struct CcfEvent {
    /// `[A B C]`: the member ids in group order.
    pub id: String,
    pub members: Vec<String>,
    pub probability: f64,
}

impl CcfGroup {
    pub fn new<S: Into<String>>(
        id: impl Into<String>,
        members: impl IntoIterator<Item = S>,
        probability: f64,
        model: CcfModel,
    ) -> Self {
        Self {
            id: id.into(),
            members: members.into_iter().map(Into::into).collect(),
            probability,
            model,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let n = self.members.len();
        if n < 2 {
            return Err(Error::validation(
                &self.id,
                "CCF group must have at least 2 members",
            ));
        }
        for (i, m) in self.members.iter().enumerate() {
            if self.members[..i].contains(m) {
                return Err(Error::validation(&self.id, format!("duplicate member '{}'", m)));
            }
        }
        check_probability(&format!("Q({})", self.id), self.probability)?;

        let factors = self.model.factors();
        for (i, &f) in factors.iter().enumerate() {
            check_probability(&format!("{} factor {} of '{}'", self.model.name(), i + 1, self.id), f)?;
        }
        let max = match self.model {
            CcfModel::BetaFactor(_) => 1,
            CcfModel::Mgl(_) => n - 1,
            CcfModel::AlphaFactor(_) | CcfModel::PhiFactor(_) => n,
        };
        if factors.is_empty() || factors.len() > max {
            return Err(Error::validation(
                &self.id,
                format!(
                    "{} model of {} members takes 1 to {} factors, got {}",
                    self.model.name(),
                    n,
                    max,
                    factors.len()
                ),
            ));
        }
        match &self.model {
            CcfModel::PhiFactor(phi) => {
                let sum: f64 = phi.iter().sum();
                if (sum - 1.0).abs() > PHI_TOLERANCE {
                    return Err(Error::validation(
                        &self.id,
                        format!("phi factors must sum to 1, got {}", sum),
                    ));
                }
            }
            CcfModel::AlphaFactor(alpha) if alpha_total(alpha) == 0.0 => {
                return Err(Error::validation(&self.id, "alpha factors are all zero"));
            }
            _ => {}
        }
        Ok(())
    }

    /// Probability of one CCF event at each level, as `(level, Q_k)`.
    pub fn level_probabilities(&self) -> Result<Vec<(usize, f64)>> {
        self.validate()?;
        let n = self.members.len();
        let q = self.probability;
        let levels = match &self.model {
            CcfModel::BetaFactor(beta) => vec![(1, (1.0 - beta) * q), (n, beta * q)],
            CcfModel::Mgl(rho) => {
                let mut levels = Vec::with_capacity(rho.len() + 1);
                let mut prefix = 1.0;
                for k in 1..=rho.len() + 1 {
                    let stay = rho.get(k - 1).map_or(1.0, |r| 1.0 - r);
                    levels.push((k, prefix * stay * q / binomial(n - 1, k - 1)));
                    if let Some(r) = rho.get(k - 1) {
                        prefix *= r;
                    }
                }
                levels
            }
            CcfModel::AlphaFactor(alpha) => {
                let total = alpha_total(alpha);
                alpha
                    .iter()
                    .enumerate()
                    .map(|(i, a)| {
                        let k = i + 1;
                        (k, k as f64 / binomial(n - 1, k - 1) * a / total * q)
                    })
                    .collect()
            }
            CcfModel::PhiFactor(phi) => phi.iter().enumerate().map(|(i, f)| (i + 1, f * q)).collect(),
        };
        for &(k, p) in &levels {
            check_probability(&format!("Q{}({})", k, self.id), p)?;
        }
        Ok(levels)
    }

    /// The CCF events of every level, level by level, combinations in
    /// member order.
    pub fn events(&self) -> Result<Vec<CcfEvent>> {
        let mut events = Vec::new();
        for (k, probability) in self.level_probabilities()? {
            for combination in combinations(self.members.len(), k) {
                let members: Vec<String> = combination.iter().map(|&i| self.members[i].clone()).collect();
                events.push(CcfEvent {
                    id: format!("[{}]", members.join(" ")),
                    members,
                    probability,
                });
            }
        }
        debug!("CCF group '{}': {} events", self.id, events.len());
        Ok(events)
    }
}

/// `Σ k·α_k`
fn alpha_total(alpha: &[f64]) -> f64 {
    alpha.iter().enumerate().map(|(i, a)| (i + 1) as f64 * a).sum()
}

fn binomial(n: usize, k: usize) -> f64 {
    let k = k.min(n - k);
    (0..k).fold(1.0, |acc, i| acc * (n - i) as f64 / (i + 1) as f64)
}

/// All `k`-subsets of `0..n`, in lexicographic order.
fn combinations(n: usize, k: usize) -> Vec<Vec<usize>> {
    let mut res = Vec::new();
    if k == 0 || k > n {
        return res;
    }
    let mut current: Vec<usize> = (0..k).collect();
    loop {
        res.push(current.clone());
        // Rightmost position that can still move.
        let Some(i) = (0..k).rev().find(|&i| current[i] < n - k + i) else {
            return res;
        };
        current[i] += 1;
        for j in i + 1..k {
            current[j] = current[j - 1] + 1;
        }
    }
}
