//! Binary decision diagrams with complement edges.
//!
//! All operations go through the [`Bdd`] manager, which owns the node pool,
//! the unique table and the computed cache. Levels are 1-based positions in
//! the variable order fixed by the [`Pdag`]: level `i` is
//! `pdag.variables()[i - 1]`.
//!
//! There is a single terminal node `1`; the constant `0` is its complement.
//! Canonical form keeps the high edge of every node regular, so two equal
//! functions always get the same [`Ref`].
//!
//! ```
//! use ftdd::bdd::Bdd;
//!
//! let bdd = Bdd::default();
//! let x1 = bdd.mk_var(1).unwrap();
//! let x2 = bdd.mk_var(2).unwrap();
//! let f = bdd.apply_and(x1, x2).unwrap();
//! let g = bdd.apply_and(x2, x1).unwrap();
//! assert_eq!(f, g);
//!
//! let p = bdd.probability(f, &[0.5, 0.2]).unwrap();
//! assert!((p - 0.1).abs() < 1e-12);
//! ```

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt::Debug;

use log::{debug, trace};

use crate::cache::ComputedCache;
use crate::error::{check_probability, Result};
use crate::pdag::{Node as PdagNode, Operator, Pdag};
use crate::reference::Ref;
use crate::settings::Settings;
use crate::unique::UniqueTable;

/// Level of the terminal node: below every variable.
const TERMINAL: u32 = u32::MAX;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
struct Node {
    level: u32,
    low: Ref,
    high: Ref,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum OpKey {
    Ite(Ref, Ref, Ref),
}

/// Result of the ITE preprocessing step.
enum Prepared {
    Done(Ref),
    /// Normalized call: `f` and `g` regular, result negated if `negate`.
    Split { f: Ref, g: Ref, h: Ref, negate: bool },
}

enum Frame {
    Call(Ref, Ref, Ref),
    Join { key: OpKey, level: u32, negate: bool },
}

/// Importance factors of one variable.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Importance {
    /// Marginal (Birnbaum) importance.
    pub mif: f64,
    /// Critical importance.
    pub cif: f64,
    /// Diagnostic importance (Fussell-Vesely).
    pub dif: f64,
    /// Risk achievement worth.
    pub raw: f64,
    /// Risk reduction worth.
    pub rrw: f64,
}

pub struct Bdd {
    nodes: RefCell<Vec<Node>>,
    unique: RefCell<UniqueTable<(u32, Ref, Ref)>>,
    cache: RefCell<ComputedCache<OpKey, Ref>>,
    explicit_stack: bool,
    pub zero: Ref,
    pub one: Ref,
}

impl Bdd {
    pub fn new(cache_bits: usize, node_limit: Option<usize>) -> Self {
        let placeholder = Node {
            level: 0,
            low: Ref::positive(1),
            high: Ref::positive(1),
        };
        let terminal = Node {
            level: TERMINAL,
            low: Ref::positive(1),
            high: Ref::positive(1),
        };
        let one = Ref::positive(1);
        Self {
            nodes: RefCell::new(vec![placeholder, terminal]),
            unique: RefCell::new(UniqueTable::new("BDD nodes", node_limit)),
            cache: RefCell::new(ComputedCache::new(cache_bits)),
            explicit_stack: false,
            zero: -one,
            one,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        let mut bdd = Self::new(settings.cache_bits(), settings.node_limit);
        bdd.explicit_stack = settings.explicit_stack;
        bdd
    }
}

impl Default for Bdd {
    fn default() -> Self {
        Bdd::new(16, None)
    }
}

impl Debug for Bdd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bdd")
            .field("nodes", &self.node_count())
            .field("peak", &self.peak_nodes())
            .field("cache_hit_rate", &self.cache_hit_rate())
            .finish()
    }
}

impl Bdd {
    pub fn level(&self, node: Ref) -> u32 {
        self.nodes.borrow()[node.index() as usize].level
    }

    pub fn low_node(&self, node: Ref) -> Ref {
        let low = self.nodes.borrow()[node.index() as usize].low;
        low.negate_if(node.is_negated())
    }

    pub fn high_node(&self, node: Ref) -> Ref {
        let high = self.nodes.borrow()[node.index() as usize].high;
        high.negate_if(node.is_negated())
    }

    pub fn is_zero(&self, node: Ref) -> bool {
        node == self.zero
    }
    pub fn is_one(&self, node: Ref) -> bool {
        node == self.one
    }
    pub fn is_terminal(&self, node: Ref) -> bool {
        node.index() == 1
    }

    /// Number of interned (non-terminal) nodes.
    pub fn node_count(&self) -> usize {
        self.unique.borrow().len()
    }

    pub fn peak_nodes(&self) -> usize {
        self.unique.borrow().peak()
    }

    pub fn cache_hit_rate(&self) -> f64 {
        self.cache.borrow().hit_rate()
    }

    pub fn mk_node(&self, level: u32, low: Ref, high: Ref) -> Result<Ref> {
        assert_ne!(level, 0, "Level should not be zero");
        assert_ne!(level, TERMINAL);

        // Handle canonicity
        if high.is_negated() {
            return Ok(-self.mk_node(level, -low, -high)?);
        }

        // Handle duplicates
        if low == high {
            return Ok(low);
        }

        let mut nodes = self.nodes.borrow_mut();
        let index = self.unique.borrow_mut().intern((level, low, high), || {
            nodes.push(Node { level, low, high });
            (nodes.len() - 1) as u32
        })?;
        Ok(Ref::positive(index))
    }

    pub fn mk_var(&self, level: u32) -> Result<Ref> {
        self.mk_node(level, self.zero, self.one)
    }

    pub fn top_cofactors(&self, node: Ref, level: u32) -> (Ref, Ref) {
        if self.is_terminal(node) || level < self.level(node) {
            return (node, node);
        }
        assert_eq!(level, self.level(node));
        (self.low_node(node), self.high_node(node))
    }

    /// Terminal cases and standard triples of ITE.
    fn ite_prepare(&self, mut f: Ref, mut g: Ref, mut h: Ref) -> Prepared {
        loop {
            // ite(1,G,H) => G
            // ite(0,G,H) => H
            if self.is_one(f) {
                return Prepared::Done(g);
            }
            if self.is_zero(f) {
                return Prepared::Done(h);
            }

            // ite(F,G,G) => G
            // ite(F,1,0) => F
            // ite(F,0,1) => ~F
            if g == h {
                return Prepared::Done(g);
            }
            if self.is_one(g) && self.is_zero(h) {
                return Prepared::Done(f);
            }
            if self.is_zero(g) && self.is_one(h) {
                return Prepared::Done(-f);
            }

            // ite(F,F,H) => ite(F,1,H)
            // ite(F,G,F) => ite(F,G,0)
            // ite(F,~F,H) => ite(F,0,H)
            // ite(F,G,~F) => ite(F,G,1)
            if g == f {
                g = self.one;
                continue;
            }
            if h == f {
                h = self.zero;
                continue;
            }
            if g == -f {
                g = self.zero;
                continue;
            }
            if h == -f {
                h = self.one;
                continue;
            }

            let i = self.level(f);
            let j = self.level(g);
            let k = self.level(h);

            // Equivalent pairs, choosing the one with the lowest level:
            //   ite(F,1,H) == ite(H,1,F)
            //   ite(F,G,0) == ite(G,F,0)
            //   ite(F,G,1) == ite(~G,~F,1)
            //   ite(F,0,H) == ite(~H,0,~F)
            //   ite(F,G,~G) == ite(G,F,~F)
            if self.is_one(g) && k < i {
                (f, h) = (h, f);
                continue;
            }
            if self.is_zero(h) && j < i {
                (f, g) = (g, f);
                continue;
            }
            if self.is_one(h) && j < i {
                (f, g) = (-g, -f);
                continue;
            }
            if self.is_zero(g) && k < i {
                (f, h) = (-h, -f);
                continue;
            }
            if g == -h && j < i {
                (f, g, h) = (g, f, -f);
                continue;
            }
            break;
        }

        // ite(~F,G,H) => ite(F,H,G)
        if f.is_negated() {
            f = -f;
            std::mem::swap(&mut g, &mut h);
        }
        // ite(F,~G,H) => ~ite(F,G,~H)
        let negate = g.is_negated();
        if negate {
            g = -g;
            h = -h;
        }
        Prepared::Split { f, g, h, negate }
    }

    fn top_level(&self, f: Ref, g: Ref, h: Ref) -> u32 {
        self.level(f).min(self.level(g)).min(self.level(h))
    }

    /// Apply the ITE operation to the arguments.
    ///
    /// ```text
    /// ITE(x, y, z) = (x ∧ y) ∨ (¬x ∧ z)
    /// ```
    pub fn apply_ite(&self, f: Ref, g: Ref, h: Ref) -> Result<Ref> {
        trace!("apply_ite(f = {}, g = {}, h = {})", f, g, h);

        let (f, g, h, negate) = match self.ite_prepare(f, g, h) {
            Prepared::Done(res) => return Ok(res),
            Prepared::Split { f, g, h, negate } => (f, g, h, negate),
        };

        let key = OpKey::Ite(f, g, h);
        if let Some(res) = self.cache.borrow_mut().get(&key) {
            return Ok(res.negate_if(negate));
        }

        let m = self.top_level(f, g, h);
        let (f0, f1) = self.top_cofactors(f, m);
        let (g0, g1) = self.top_cofactors(g, m);
        let (h0, h1) = self.top_cofactors(h, m);

        let e = self.apply_ite(f0, g0, h0)?;
        let t = self.apply_ite(f1, g1, h1)?;

        let res = self.mk_node(m, e, t)?;
        trace!("computed: apply_ite(f = {}, g = {}, h = {}) -> {}", f, g, h, res);
        self.cache.borrow_mut().insert(key, res);

        Ok(res.negate_if(negate))
    }

    /// Same as [`Bdd::apply_ite`], with an explicit stack instead of recursion.
    pub fn apply_ite_iterative(&self, f: Ref, g: Ref, h: Ref) -> Result<Ref> {
        let mut stack = vec![Frame::Call(f, g, h)];
        let mut values: Vec<Ref> = Vec::new();

        while let Some(frame) = stack.pop() {
            match frame {
                Frame::Call(f, g, h) => {
                    let (f, g, h, negate) = match self.ite_prepare(f, g, h) {
                        Prepared::Done(res) => {
                            values.push(res);
                            continue;
                        }
                        Prepared::Split { f, g, h, negate } => (f, g, h, negate),
                    };
                    let key = OpKey::Ite(f, g, h);
                    if let Some(res) = self.cache.borrow_mut().get(&key) {
                        values.push(res.negate_if(negate));
                        continue;
                    }
                    let level = self.top_level(f, g, h);
                    let (f0, f1) = self.top_cofactors(f, level);
                    let (g0, g1) = self.top_cofactors(g, level);
                    let (h0, h1) = self.top_cofactors(h, level);
                    stack.push(Frame::Join { key, level, negate });
                    stack.push(Frame::Call(f1, g1, h1));
                    stack.push(Frame::Call(f0, g0, h0));
                }
                Frame::Join { key, level, negate } => {
                    // The else-branch was pushed first.
                    let t = values.pop();
                    let e = values.pop();
                    let (Some(e), Some(t)) = (e, t) else {
                        unreachable!("ITE stack underflow");
                    };
                    let res = self.mk_node(level, e, t)?;
                    self.cache.borrow_mut().insert(key, res);
                    values.push(res.negate_if(negate));
                }
            }
        }

        assert_eq!(values.len(), 1);
        Ok(values[0])
    }

    fn ite(&self, f: Ref, g: Ref, h: Ref) -> Result<Ref> {
        if self.explicit_stack {
            self.apply_ite_iterative(f, g, h)
        } else {
            self.apply_ite(f, g, h)
        }
    }

    pub fn apply_not(&self, f: Ref) -> Ref {
        -f
    }

    pub fn apply_and(&self, u: Ref, v: Ref) -> Result<Ref> {
        self.ite(u, v, self.zero)
    }

    pub fn apply_or(&self, u: Ref, v: Ref) -> Result<Ref> {
        self.ite(u, self.one, v)
    }

    pub fn apply_xor(&self, u: Ref, v: Ref) -> Result<Ref> {
        self.ite(u, -v, v)
    }

    pub fn apply_and_many(&self, nodes: impl IntoIterator<Item = Ref>) -> Result<Ref> {
        let mut res = self.one;
        for node in nodes {
            res = self.apply_and(res, node)?;
        }
        Ok(res)
    }

    pub fn apply_or_many(&self, nodes: impl IntoIterator<Item = Ref>) -> Result<Ref> {
        let mut res = self.zero;
        for node in nodes {
            res = self.apply_or(res, node)?;
        }
        Ok(res)
    }

    /// At least `k` of `nodes` hold.
    ///
    /// Built row by row: after processing `nodes[i..]`, `row[j]` is the
    /// function "at least `j` of `nodes[i..]`".
    pub fn apply_atleast(&self, k: usize, nodes: &[Ref]) -> Result<Ref> {
        debug!("apply_atleast(k = {}, n = {})", k, nodes.len());
        if k == 0 {
            return Ok(self.one);
        }
        if k > nodes.len() {
            return Ok(self.zero);
        }
        let mut row: Vec<Ref> = (0..=k).map(|j| if j == 0 { self.one } else { self.zero }).collect();
        for &x in nodes.iter().rev() {
            let mut next = Vec::with_capacity(k + 1);
            next.push(self.one);
            for j in 1..=k {
                next.push(self.ite(x, row[j - 1], row[j])?);
            }
            row = next;
        }
        Ok(row[k])
    }

    /// Drops every node created since `watermark` was taken.
    fn rollback(&self, watermark: usize) {
        let mut nodes = self.nodes.borrow_mut();
        if nodes.len() <= watermark {
            return;
        }
        nodes.truncate(watermark);
        self.unique.borrow_mut().rollback(watermark as u32);
        self.cache.borrow_mut().clear();
    }

    /// Encodes the graph rooted at `pdag.root()`.
    ///
    /// Every graph node is translated exactly once. On failure the nodes
    /// created by this call are released again.
    pub fn encode(&self, pdag: &Pdag) -> Result<Ref> {
        let watermark = self.nodes.borrow().len();
        self.encode_graph(pdag).map_err(|err| {
            self.rollback(watermark);
            err
        })
    }

    fn encode_graph(&self, pdag: &Pdag) -> Result<Ref> {
        debug!("encode(gates = {})", pdag.gate_count());
        let mut memo: HashMap<u32, Ref> = HashMap::new();
        for id in pdag.post_order()? {
            let f = match pdag.node(id) {
                PdagNode::Constant => self.one,
                PdagNode::Variable(v) => self.mk_var(v + 1)?,
                PdagNode::Gate(gate) => {
                    let args: Vec<Ref> = gate
                        .args
                        .iter()
                        .map(|a| memo[&a.node()].negate_if(a.is_complement()))
                        .collect();
                    match gate.op {
                        Operator::And => self.apply_and_many(args)?,
                        Operator::Or => self.apply_or_many(args)?,
                        Operator::AtLeast(k) => self.apply_atleast(k as usize, &args)?,
                        Operator::Xor => {
                            let mut res = self.zero;
                            for a in args {
                                res = self.apply_xor(res, a)?;
                            }
                            res
                        }
                        Operator::Not => -args[0],
                        Operator::Null => args[0],
                    }
                }
            };
            memo.insert(id, f);
        }
        let root = pdag.root();
        let res = memo[&root.node()].negate_if(root.is_complement());
        debug!("encoded: {} nodes, root = {}", self.size(res), res);
        Ok(res)
    }

    /// Evaluates `f` under `values[level - 1]`.
    pub fn evaluate(&self, f: Ref, values: &[bool]) -> bool {
        let mut node = f;
        while !self.is_terminal(node) {
            let level = self.level(node);
            node = if values[level as usize - 1] {
                self.high_node(node)
            } else {
                self.low_node(node)
            };
        }
        self.is_one(node)
    }

    /// Probability of `f` given `probabilities[level - 1]`.
    pub fn probability(&self, f: Ref, probabilities: &[f64]) -> Result<f64> {
        for (i, &p) in probabilities.iter().enumerate() {
            check_probability(&format!("P(x{})", i + 1), p)?;
        }
        let mut memo = HashMap::new();
        let p = self.probability_rec(f.regular(), probabilities, &mut memo);
        let p = if f.is_negated() { 1.0 - p } else { p };
        check_probability("P(top)", p)
    }

    fn probability_rec(&self, f: Ref, probabilities: &[f64], memo: &mut HashMap<u32, f64>) -> f64 {
        debug_assert!(!f.is_negated());
        if self.is_one(f) {
            return 1.0;
        }
        if let Some(&p) = memo.get(&f.index()) {
            return p;
        }
        let node = self.nodes.borrow()[f.index() as usize];
        let p = probabilities[node.level as usize - 1];
        let high = self.probability_rec(node.high, probabilities, memo);
        let low = self.probability_rec(node.low.regular(), probabilities, memo);
        let low = if node.low.is_negated() { 1.0 - low } else { low };
        let res = p * high + (1.0 - p) * low;
        memo.insert(f.index(), res);
        res
    }

    /// Importance factors of every level, computed from conditional
    /// probabilities `P(f | x = 1)` and `P(f | x = 0)`.
    pub fn importance(&self, f: Ref, probabilities: &[f64]) -> Result<Vec<Importance>> {
        let total = self.probability(f, probabilities)?;
        let mut conditional = probabilities.to_vec();
        let mut factors = Vec::with_capacity(probabilities.len());
        for i in 0..probabilities.len() {
            let p = probabilities[i];
            conditional[i] = 1.0;
            let p1 = self.probability(f, &conditional)?;
            conditional[i] = 0.0;
            let p0 = self.probability(f, &conditional)?;
            conditional[i] = p;

            let mif = p1 - p0;
            let (cif, dif, raw) = if total > 0.0 {
                (p * mif / total, p * p1 / total, p1 / total)
            } else {
                (0.0, 0.0, 0.0)
            };
            let rrw = if p0 > 0.0 { total / p0 } else { f64::INFINITY };
            factors.push(Importance { mif, cif, dif, raw, rrw });
        }
        Ok(factors)
    }

    /// Indices of all nodes reachable from `nodes`, terminal included.
    pub fn descendants(&self, nodes: impl IntoIterator<Item = Ref>) -> HashSet<u32> {
        let mut visited = HashSet::new();
        visited.insert(self.one.index());
        let mut stack: Vec<Ref> = nodes.into_iter().collect();
        while let Some(node) = stack.pop() {
            if visited.insert(node.index()) {
                stack.push(self.low_node(node));
                stack.push(self.high_node(node));
            }
        }
        visited
    }

    pub fn size(&self, f: Ref) -> usize {
        self.descendants([f]).len()
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::error::Error;
    use crate::model::{Formula, Model};

    #[test]
    fn test_var() {
        let bdd = Bdd::default();

        let x = bdd.mk_var(1).unwrap();

        assert_eq!(bdd.level(x), 1);
        assert_eq!(bdd.high_node(x), bdd.one);
        assert_eq!(bdd.low_node(x), bdd.zero);
        assert_eq!(bdd.high_node(-x), bdd.zero);
    }

    #[test]
    fn test_terminal() {
        let bdd = Bdd::default();
        assert_eq!(bdd.zero, -bdd.one);
        assert!(bdd.is_terminal(bdd.zero));
        assert!(bdd.is_terminal(bdd.one));
        assert_eq!(bdd.node_count(), 0);
    }

    #[test]
    fn test_de_morgan() {
        let bdd = Bdd::default();

        let x = bdd.mk_var(1).unwrap();
        let y = bdd.mk_var(2).unwrap();

        let f = -bdd.apply_and(x, y).unwrap();
        let g = bdd.apply_or(-x, -y).unwrap();
        assert_eq!(f, g);

        let f = -bdd.apply_or(x, y).unwrap();
        let g = bdd.apply_and(-x, -y).unwrap();
        assert_eq!(f, g);
    }

    #[test]
    fn test_xor_itself() {
        let bdd = Bdd::default();

        let x = bdd.mk_var(1).unwrap();
        let y = bdd.mk_var(2).unwrap();
        let f = bdd.apply_and(x, y).unwrap();

        assert_eq!(bdd.apply_xor(f, f).unwrap(), bdd.zero);
        assert_eq!(bdd.apply_xor(f, -f).unwrap(), bdd.one);
    }

    #[test]
    fn test_apply_ite() {
        let bdd = Bdd::default();

        let g = bdd.mk_var(2).unwrap();
        let h = bdd.mk_var(3).unwrap();
        assert_eq!(bdd.apply_ite(bdd.one, g, h).unwrap(), g);
        assert_eq!(bdd.apply_ite(bdd.zero, g, h).unwrap(), h);

        let f = bdd.mk_node(1, bdd.one, h).unwrap();
        assert_eq!(bdd.apply_ite(f, f, h).unwrap(), bdd.apply_or(f, h).unwrap());
        assert_eq!(bdd.apply_ite(f, g, f).unwrap(), bdd.apply_and(f, g).unwrap());
        assert_eq!(bdd.apply_ite(f, -g, bdd.one).unwrap(), -bdd.apply_and(f, g).unwrap());

        let f = bdd.mk_var(5).unwrap();
        assert_eq!(bdd.apply_ite(f, g, g).unwrap(), g);
        assert_eq!(bdd.apply_ite(f, bdd.one, bdd.zero).unwrap(), f);
        assert_eq!(bdd.apply_ite(f, bdd.zero, bdd.one).unwrap(), -f);

        let f = bdd.mk_var(6).unwrap();
        let g = bdd.mk_var(7).unwrap();
        let h = bdd.mk_var(8).unwrap();
        let expected = bdd.mk_node(6, -g, -h).unwrap();
        assert_eq!(bdd.apply_ite(-f, -g, -h).unwrap(), expected);
    }

    #[test]
    fn test_iterative_matches_recursive() {
        fn build(bdd: &Bdd, ite: fn(&Bdd, Ref, Ref, Ref) -> Result<Ref>) -> Ref {
            let mut f = bdd.zero;
            for i in 1..=8 {
                let x = bdd.mk_var(i).unwrap();
                let y = bdd.mk_var(i + 8).unwrap();
                let term = ite(bdd, x, -y, y).unwrap();
                f = ite(bdd, f, bdd.one, term).unwrap();
            }
            f
        }

        let recursive = Bdd::default();
        let iterative = Bdd::default();
        let a = build(&recursive, Bdd::apply_ite);
        let b = build(&iterative, Bdd::apply_ite_iterative);
        assert_eq!(a, b);
        assert_eq!(recursive.node_count(), iterative.node_count());
        assert_eq!(recursive.size(a), iterative.size(b));
    }

    #[test]
    fn test_atleast() {
        let bdd = Bdd::default();
        let xs: Vec<Ref> = (1..=3).map(|i| bdd.mk_var(i).unwrap()).collect();
        let f = bdd.apply_atleast(2, &xs).unwrap();

        let ab = bdd.apply_and(xs[0], xs[1]).unwrap();
        let ac = bdd.apply_and(xs[0], xs[2]).unwrap();
        let bc = bdd.apply_and(xs[1], xs[2]).unwrap();
        let g = bdd.apply_or_many([ab, ac, bc]).unwrap();
        assert_eq!(f, g);

        assert_eq!(bdd.apply_atleast(0, &xs).unwrap(), bdd.one);
        assert_eq!(bdd.apply_atleast(4, &xs).unwrap(), bdd.zero);
        assert_eq!(bdd.apply_atleast(1, &xs).unwrap(), bdd.apply_or_many(xs.clone()).unwrap());
    }

    #[test]
    fn test_probability() {
        let bdd = Bdd::default();
        let a = bdd.mk_var(1).unwrap();
        let b = bdd.mk_var(2).unwrap();
        let c = bdd.mk_var(3).unwrap();
        let f = bdd.apply_or(a, bdd.apply_and(b, c).unwrap()).unwrap();
        let p = bdd.probability(f, &[0.1, 0.2, 0.3]).unwrap();
        assert!((p - 0.154).abs() < 1e-12);
        let q = bdd.probability(-f, &[0.1, 0.2, 0.3]).unwrap();
        assert!((q - 0.846).abs() < 1e-12);

        let err = bdd.probability(f, &[0.1, 1.2, 0.3]).unwrap_err();
        assert!(matches!(err, Error::Arithmetic { .. }));
    }

    #[test]
    fn test_evaluate() {
        let bdd = Bdd::default();
        let a = bdd.mk_var(1).unwrap();
        let b = bdd.mk_var(2).unwrap();
        let f = bdd.apply_xor(a, b).unwrap();
        assert!(!bdd.evaluate(f, &[false, false]));
        assert!(bdd.evaluate(f, &[true, false]));
        assert!(bdd.evaluate(f, &[false, true]));
        assert!(!bdd.evaluate(f, &[true, true]));
    }

    #[test]
    fn test_importance() {
        let bdd = Bdd::default();
        let a = bdd.mk_var(1).unwrap();
        let b = bdd.mk_var(2).unwrap();
        let f = bdd.apply_and(a, b).unwrap();
        let factors = bdd.importance(f, &[0.5, 0.2]).unwrap();
        // P = 0.1, P(f | a) = 0.2, P(f | ~a) = 0
        assert!((factors[0].mif - 0.2).abs() < 1e-12);
        assert!((factors[0].cif - 1.0).abs() < 1e-12);
        assert!((factors[0].raw - 2.0).abs() < 1e-12);
        assert!(factors[0].rrw.is_infinite());
        assert!((factors[1].mif - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_node_limit() {
        let bdd = Bdd::new(8, Some(3));
        let xs: Vec<Ref> = (1..=3).map(|i| bdd.mk_var(i).unwrap()).collect();
        let err = bdd.apply_xor(xs[1], xs[2]).unwrap_err();
        assert_eq!(
            err,
            Error::ResourceLimit {
                what: "BDD nodes",
                limit: 3
            }
        );
        // Earlier nodes are still valid.
        assert_eq!(bdd.level(xs[2]), 3);
    }

    #[test]
    fn test_failed_encode_releases_nodes() {
        let mut model = Model::new();
        let ids: Vec<String> = (1..=6).map(|i| format!("E{}", i)).collect();
        for id in &ids {
            model.add_basic_event(id, 0.1).unwrap();
        }
        model.add_gate("TOP", Formula::atleast(3, ids.clone())).unwrap();
        let settings = Settings::default();
        let mut pdag = Pdag::build(&model, "TOP", &settings).unwrap();
        pdag.reduce(&settings).unwrap();

        let bdd = Bdd::new(8, Some(8));
        let x1 = bdd.mk_var(1).unwrap();
        let err = bdd.encode(&pdag).unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(bdd.node_count(), 1);
        assert_eq!(bdd.peak_nodes(), 8);
        assert_eq!(bdd.level(x1), 1);
        // The released room is usable again.
        let f = bdd.apply_and(x1, bdd.mk_var(2).unwrap()).unwrap();
        assert!((bdd.probability(f, &[0.5, 0.5]).unwrap() - 0.25).abs() < 1e-12);
    }
}
