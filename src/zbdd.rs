//! Zero-suppressed decision diagrams for minimal cut sets.
//!
//! A ZBDD node `(var, lo, hi)` stands for `lo ∪ {s ∪ {var} | s ∈ hi}`.
//! Nodes with `hi = ⊥` are never built, so sparse families of small sets
//! stay small. Terminals:
//!
//! - [`ZbddId::ZERO`] (⊥): the empty family;
//! - [`ZbddId::ONE`] (⊤): the family `{∅}`.
//!
//! Variables are *literals*: the basic event at level `i` appears positively
//! as `2i - 1` and negatively as `2i`, so both literals of an event are
//! adjacent in the order and a contradictory pair is easy to strip.
//!
//! ```
//! use ftdd::zbdd::{literal, Zbdd};
//! use num_bigint::BigUint;
//!
//! let zbdd = Zbdd::default();
//! let a = zbdd.base(literal(1, false)).unwrap();
//! let b = zbdd.base(literal(2, false)).unwrap();
//! let ab = zbdd.and(a, b, None).unwrap();
//! let f = zbdd.or(a, ab).unwrap();
//! // {A} absorbs {A, B}
//! assert_eq!(f, a);
//! assert_eq!(zbdd.count(f), BigUint::from(1u32));
//! ```

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt::{Display, Formatter};
use std::time::{Duration, Instant};

use log::{debug, trace};
use num_bigint::BigUint;

use crate::cache::ComputedCache;
use crate::error::{Error, Result};
use crate::pdag::{Arg, Node as PdagNode, NodeId, Operator, Pdag, Rewrite};
use crate::settings::Settings;
use crate::unique::UniqueTable;

/// How often extraction looks at the clock.
const CHECK_INTERVAL: u64 = 1024;

/// Literal variable of the event at `level` (1-based).
pub fn literal(level: u32, complement: bool) -> u32 {
    if complement {
        2 * level
    } else {
        2 * level - 1
    }
}

/// Level of the event behind a literal variable.
pub fn literal_level(var: u32) -> u32 {
    (var + 1) / 2
}

pub fn is_complement_literal(var: u32) -> bool {
    var % 2 == 0
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ZbddId(u32);

impl ZbddId {
    pub const ZERO: ZbddId = ZbddId(0);
    pub const ONE: ZbddId = ZbddId(1);

    pub fn is_zero(self) -> bool {
        self == Self::ZERO
    }
    pub fn is_one(self) -> bool {
        self == Self::ONE
    }
    pub fn is_terminal(self) -> bool {
        self.0 <= 1
    }
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl Display for ZbddId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            0 => write!(f, "⊥"),
            1 => write!(f, "⊤"),
            i => write!(f, "@{}", i),
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Node {
    pub var: u32,
    pub lo: ZbddId,
    pub hi: ZbddId,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
enum OpType {
    Union,
    Product,
    Without,
    Minimize,
    Restrict,
}

type CacheKey = (OpType, ZbddId, ZbddId, u32);

/// Pending work of the explicit-stack union and product.
enum Frame {
    Union(ZbddId, ZbddId),
    Product(ZbddId, ZbddId, u32),
    /// Pops `lo`, and `hi` unless it is already known, then builds the node.
    Join { key: CacheKey, var: u32, hi: Option<ZbddId> },
    /// Pops `lo` and the three partial products whose union is `hi`.
    JoinProduct { key: CacheKey, var: u32 },
}

fn pop(values: &mut Vec<ZbddId>) -> ZbddId {
    match values.pop() {
        Some(v) => v,
        None => unreachable!("ZBDD stack underflow"),
    }
}

fn union_terminal(f: ZbddId, g: ZbddId) -> Option<ZbddId> {
    if f.is_zero() {
        Some(g)
    } else if g.is_zero() || f == g {
        Some(f)
    } else {
        None
    }
}

/// Limits and pruning for cut-set extraction.
#[derive(Debug, Clone, Default)]
pub struct Extraction<'a> {
    /// Event probabilities by level, needed for `cut_off`.
    pub probabilities: &'a [f64],
    pub cut_off: Option<f64>,
    pub cut_set_limit: Option<usize>,
    pub step_budget: Option<u64>,
    pub time_limit: Option<Duration>,
}

impl<'a> Extraction<'a> {
    pub fn from_settings(settings: &Settings, probabilities: &'a [f64]) -> Self {
        Self {
            probabilities,
            cut_off: settings.cut_off(),
            cut_set_limit: settings.cut_set_limit,
            step_budget: settings.step_budget,
            time_limit: settings.time_limit,
        }
    }
}

pub struct Zbdd {
    /// Index 0 = ZERO terminal, index 1 = ONE terminal.
    nodes: RefCell<Vec<Node>>,
    unique: RefCell<UniqueTable<(u32, ZbddId, ZbddId)>>,
    cache: RefCell<ComputedCache<CacheKey, ZbddId>>,
    count_cache: RefCell<HashMap<ZbddId, BigUint>>,
    explicit_stack: bool,
}

impl Default for Zbdd {
    fn default() -> Self {
        Self::new(16, None)
    }
}

impl Zbdd {
    pub fn new(cache_bits: usize, node_limit: Option<usize>) -> Self {
        let terminal = Node {
            var: u32::MAX,
            lo: ZbddId::ZERO,
            hi: ZbddId::ZERO,
        };
        Self {
            nodes: RefCell::new(vec![terminal, terminal]),
            unique: RefCell::new(UniqueTable::new("ZBDD nodes", node_limit)),
            cache: RefCell::new(ComputedCache::new(cache_bits)),
            count_cache: RefCell::new(HashMap::new()),
            explicit_stack: false,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        let mut zbdd = Self::new(settings.cache_bits(), settings.node_limit);
        zbdd.explicit_stack = settings.explicit_stack;
        zbdd
    }

    pub fn node(&self, id: ZbddId) -> Node {
        self.nodes.borrow()[id.index()]
    }

    /// Top variable, `u32::MAX` for terminals.
    pub fn var(&self, id: ZbddId) -> u32 {
        self.nodes.borrow()[id.index()].var
    }

    pub fn node_count(&self) -> usize {
        self.unique.borrow().len()
    }

    pub fn peak_nodes(&self) -> usize {
        self.unique.borrow().peak()
    }

    pub fn cache_hit_rate(&self) -> f64 {
        self.cache.borrow().hit_rate()
    }

    /// Creates or retrieves a node, applying the zero-suppression rule.
    pub fn get_node(&self, var: u32, lo: ZbddId, hi: ZbddId) -> Result<ZbddId> {
        if hi.is_zero() {
            return Ok(lo);
        }
        debug_assert!(var < self.var(lo) && var < self.var(hi));
        let mut nodes = self.nodes.borrow_mut();
        let index = self.unique.borrow_mut().intern((var, lo, hi), || {
            nodes.push(Node { var, lo, hi });
            (nodes.len() - 1) as u32
        })?;
        Ok(ZbddId(index))
    }

    /// `{{var}}`
    pub fn base(&self, var: u32) -> Result<ZbddId> {
        self.get_node(var, ZbddId::ZERO, ZbddId::ONE)
    }

    fn cached(&self, key: &CacheKey) -> Option<ZbddId> {
        self.cache.borrow_mut().get(key)
    }

    fn remember(&self, key: CacheKey, res: ZbddId) -> ZbddId {
        self.cache.borrow_mut().insert(key, res);
        res
    }

    /// Returns `true` if the family contains the empty set.
    pub fn contains_empty(&self, f: ZbddId) -> bool {
        let mut current = f;
        while !current.is_terminal() {
            current = self.node(current).lo;
        }
        current.is_one()
    }

    /// Union: `F ∪ G`.
    pub fn union(&self, f: ZbddId, g: ZbddId) -> Result<ZbddId> {
        if self.explicit_stack {
            self.union_iterative(f, g)
        } else {
            self.union_recursive(f, g)
        }
    }

    pub fn union_recursive(&self, f: ZbddId, g: ZbddId) -> Result<ZbddId> {
        if let Some(res) = union_terminal(f, g) {
            return Ok(res);
        }
        let (f, g) = if f < g { (f, g) } else { (g, f) };
        let key = (OpType::Union, f, g, 0);
        if let Some(res) = self.cached(&key) {
            return Ok(res);
        }

        let (fv, gv) = (self.var(f), self.var(g));
        let res = match fv.cmp(&gv) {
            Ordering::Less => {
                let n = self.node(f);
                let lo = self.union_recursive(n.lo, g)?;
                self.get_node(fv, lo, n.hi)?
            }
            Ordering::Greater => {
                let n = self.node(g);
                let lo = self.union_recursive(f, n.lo)?;
                self.get_node(gv, lo, n.hi)?
            }
            Ordering::Equal => {
                let (fn_, gn) = (self.node(f), self.node(g));
                let lo = self.union_recursive(fn_.lo, gn.lo)?;
                let hi = self.union_recursive(fn_.hi, gn.hi)?;
                self.get_node(fv, lo, hi)?
            }
        };
        Ok(self.remember(key, res))
    }

    /// Same as [`Zbdd::union_recursive`], with an explicit stack.
    pub fn union_iterative(&self, f: ZbddId, g: ZbddId) -> Result<ZbddId> {
        self.run_frames(Frame::Union(f, g))
    }

    /// Sets of `f` with at most `limit` elements.
    pub fn restrict_order(&self, f: ZbddId, limit: u32) -> Result<ZbddId> {
        if f.is_terminal() {
            return Ok(f);
        }
        if limit == 0 {
            return Ok(if self.contains_empty(f) {
                ZbddId::ONE
            } else {
                ZbddId::ZERO
            });
        }
        let key = (OpType::Restrict, f, ZbddId::ZERO, limit);
        if let Some(res) = self.cached(&key) {
            return Ok(res);
        }
        let n = self.node(f);
        let lo = self.restrict_order(n.lo, limit)?;
        let hi = self.restrict_order(n.hi, limit - 1)?;
        let res = self.get_node(n.var, lo, hi)?;
        Ok(self.remember(key, res))
    }

    /// Drops the negative literal of `var` from the top of `hi` when `var` is
    /// a positive literal: sets holding both `x` and `¬x` are contradictory.
    fn strip_contradiction(&self, var: u32, hi: ZbddId) -> ZbddId {
        if !is_complement_literal(var) && self.var(hi) == var + 1 {
            self.node(hi).lo
        } else {
            hi
        }
    }

    /// Pairwise unions `{a ∪ b | a ∈ F, b ∈ G}` of at most `limit` elements,
    /// without contradictory sets.
    pub fn product(&self, f: ZbddId, g: ZbddId, limit: u32) -> Result<ZbddId> {
        if self.explicit_stack {
            self.product_iterative(f, g, limit)
        } else {
            self.product_recursive(f, g, limit)
        }
    }

    fn product_terminal(&self, f: ZbddId, g: ZbddId, limit: u32) -> Result<Option<ZbddId>> {
        if f.is_zero() || g.is_zero() {
            return Ok(Some(ZbddId::ZERO));
        }
        if limit == 0 {
            let both = self.contains_empty(f) && self.contains_empty(g);
            return Ok(Some(if both { ZbddId::ONE } else { ZbddId::ZERO }));
        }
        if f.is_one() {
            return self.restrict_order(g, limit).map(Some);
        }
        if g.is_one() {
            return self.restrict_order(f, limit).map(Some);
        }
        Ok(None)
    }

    pub fn product_recursive(&self, f: ZbddId, g: ZbddId, limit: u32) -> Result<ZbddId> {
        if let Some(res) = self.product_terminal(f, g, limit)? {
            return Ok(res);
        }
        let (f, g) = if f < g { (f, g) } else { (g, f) };
        let key = (OpType::Product, f, g, limit);
        if let Some(res) = self.cached(&key) {
            return Ok(res);
        }

        let (fv, gv) = (self.var(f), self.var(g));
        let (var, lo, hi) = match fv.cmp(&gv) {
            Ordering::Less => {
                let n = self.node(f);
                let lo = self.product_recursive(n.lo, g, limit)?;
                (fv, lo, self.product_recursive(n.hi, g, limit - 1)?)
            }
            Ordering::Greater => {
                let n = self.node(g);
                let lo = self.product_recursive(f, n.lo, limit)?;
                (gv, lo, self.product_recursive(f, n.hi, limit - 1)?)
            }
            Ordering::Equal => {
                let (fn_, gn) = (self.node(f), self.node(g));
                let lo = self.product_recursive(fn_.lo, gn.lo, limit)?;
                let hh = self.product_recursive(fn_.hi, gn.hi, limit - 1)?;
                let hl = self.product_recursive(fn_.hi, gn.lo, limit - 1)?;
                let lh = self.product_recursive(fn_.lo, gn.hi, limit - 1)?;
                let hi = self.union_recursive(self.union_recursive(hh, hl)?, lh)?;
                (fv, lo, hi)
            }
        };
        let hi = self.strip_contradiction(var, hi);
        let res = self.get_node(var, lo, hi)?;
        Ok(self.remember(key, res))
    }

    /// Same as [`Zbdd::product_recursive`], with an explicit stack.
    pub fn product_iterative(&self, f: ZbddId, g: ZbddId, limit: u32) -> Result<ZbddId> {
        self.run_frames(Frame::Product(f, g, limit))
    }

    /// Evaluates union and product frames without recursion.
    ///
    /// Sub-results go to `values` in the order their calls were pushed
    /// last-to-first, so every join pops them in reverse.
    fn run_frames(&self, first: Frame) -> Result<ZbddId> {
        let mut stack = vec![first];
        let mut values: Vec<ZbddId> = Vec::new();

        while let Some(frame) = stack.pop() {
            match frame {
                Frame::Union(f, g) => {
                    if let Some(res) = union_terminal(f, g) {
                        values.push(res);
                        continue;
                    }
                    let (f, g) = if f < g { (f, g) } else { (g, f) };
                    let key = (OpType::Union, f, g, 0);
                    if let Some(res) = self.cached(&key) {
                        values.push(res);
                        continue;
                    }
                    let (fv, gv) = (self.var(f), self.var(g));
                    match fv.cmp(&gv) {
                        Ordering::Less => {
                            let n = self.node(f);
                            stack.push(Frame::Join { key, var: fv, hi: Some(n.hi) });
                            stack.push(Frame::Union(n.lo, g));
                        }
                        Ordering::Greater => {
                            let n = self.node(g);
                            stack.push(Frame::Join { key, var: gv, hi: Some(n.hi) });
                            stack.push(Frame::Union(f, n.lo));
                        }
                        Ordering::Equal => {
                            let (fn_, gn) = (self.node(f), self.node(g));
                            stack.push(Frame::Join { key, var: fv, hi: None });
                            stack.push(Frame::Union(fn_.hi, gn.hi));
                            stack.push(Frame::Union(fn_.lo, gn.lo));
                        }
                    }
                }
                Frame::Product(f, g, limit) => {
                    if let Some(res) = self.product_terminal(f, g, limit)? {
                        values.push(res);
                        continue;
                    }
                    let (f, g) = if f < g { (f, g) } else { (g, f) };
                    let key = (OpType::Product, f, g, limit);
                    if let Some(res) = self.cached(&key) {
                        values.push(res);
                        continue;
                    }
                    let (fv, gv) = (self.var(f), self.var(g));
                    match fv.cmp(&gv) {
                        Ordering::Less => {
                            let n = self.node(f);
                            stack.push(Frame::Join { key, var: fv, hi: None });
                            stack.push(Frame::Product(n.hi, g, limit - 1));
                            stack.push(Frame::Product(n.lo, g, limit));
                        }
                        Ordering::Greater => {
                            let n = self.node(g);
                            stack.push(Frame::Join { key, var: gv, hi: None });
                            stack.push(Frame::Product(f, n.hi, limit - 1));
                            stack.push(Frame::Product(f, n.lo, limit));
                        }
                        Ordering::Equal => {
                            let (fn_, gn) = (self.node(f), self.node(g));
                            stack.push(Frame::JoinProduct { key, var: fv });
                            stack.push(Frame::Product(fn_.lo, gn.hi, limit - 1));
                            stack.push(Frame::Product(fn_.hi, gn.lo, limit - 1));
                            stack.push(Frame::Product(fn_.hi, gn.hi, limit - 1));
                            stack.push(Frame::Product(fn_.lo, gn.lo, limit));
                        }
                    }
                }
                Frame::Join { key, var, hi } => {
                    let hi = match hi {
                        Some(hi) => hi,
                        None => pop(&mut values),
                    };
                    let lo = pop(&mut values);
                    let hi = if key.0 == OpType::Product {
                        self.strip_contradiction(var, hi)
                    } else {
                        hi
                    };
                    let res = self.get_node(var, lo, hi)?;
                    values.push(self.remember(key, res));
                }
                Frame::JoinProduct { key, var } => {
                    let lh = pop(&mut values);
                    let hl = pop(&mut values);
                    let hh = pop(&mut values);
                    let lo = pop(&mut values);
                    let hi = self.union_iterative(self.union_iterative(hh, hl)?, lh)?;
                    let hi = self.strip_contradiction(var, hi);
                    let res = self.get_node(var, lo, hi)?;
                    values.push(self.remember(key, res));
                }
            }
        }

        assert_eq!(values.len(), 1);
        Ok(values[0])
    }

    /// Sets of `f` that contain no set of `g`.
    pub fn without(&self, f: ZbddId, g: ZbddId) -> Result<ZbddId> {
        if g.is_zero() || f.is_zero() {
            return Ok(f);
        }
        if f == g || self.contains_empty(g) {
            return Ok(ZbddId::ZERO);
        }
        if f.is_one() {
            return Ok(ZbddId::ONE);
        }
        let key = (OpType::Without, f, g, 0);
        if let Some(res) = self.cached(&key) {
            return Ok(res);
        }

        let (fv, gv) = (self.var(f), self.var(g));
        let res = match fv.cmp(&gv) {
            Ordering::Less => {
                let n = self.node(f);
                let lo = self.without(n.lo, g)?;
                let hi = self.without(n.hi, g)?;
                self.get_node(fv, lo, hi)?
            }
            // Sets of `g` holding `gv` cannot be contained in sets of `f`.
            Ordering::Greater => self.without(f, self.node(g).lo)?,
            Ordering::Equal => {
                let (fn_, gn) = (self.node(f), self.node(g));
                let lo = self.without(fn_.lo, gn.lo)?;
                let hi = self.without(fn_.hi, gn.hi)?;
                let hi = self.without(hi, gn.lo)?;
                self.get_node(fv, lo, hi)?
            }
        };
        Ok(self.remember(key, res))
    }

    /// Removes every set that is a proper superset of another set.
    pub fn minimize(&self, f: ZbddId) -> Result<ZbddId> {
        if f.is_terminal() {
            return Ok(f);
        }
        let key = (OpType::Minimize, f, ZbddId::ZERO, 0);
        if let Some(res) = self.cached(&key) {
            return Ok(res);
        }
        let n = self.node(f);
        let lo = self.minimize(n.lo)?;
        let hi = self.minimize(n.hi)?;
        let hi = self.without(hi, lo)?;
        let res = self.get_node(n.var, lo, hi)?;
        Ok(self.remember(key, res))
    }

    /// Minimal disjunction of two families.
    pub fn or(&self, f: ZbddId, g: ZbddId) -> Result<ZbddId> {
        let u = self.union(f, g)?;
        self.minimize(u)
    }

    /// Minimal conjunction of two families, limited to `limit` literals.
    pub fn and(&self, f: ZbddId, g: ZbddId, limit: Option<usize>) -> Result<ZbddId> {
        let limit = limit.map_or(u32::MAX, |l| l.min(u32::MAX as usize) as u32);
        let p = self.product(f, g, limit)?;
        self.minimize(p)
    }

    /// At least `k` of `args`, built like the BDD version.
    pub fn atleast(&self, k: usize, args: &[ZbddId], limit: Option<usize>) -> Result<ZbddId> {
        if k == 0 {
            return Ok(ZbddId::ONE);
        }
        if k > args.len() {
            return Ok(ZbddId::ZERO);
        }
        let mut row: Vec<ZbddId> = (0..=k)
            .map(|j| if j == 0 { ZbddId::ONE } else { ZbddId::ZERO })
            .collect();
        for &x in args.iter().rev() {
            let mut next = Vec::with_capacity(k + 1);
            next.push(ZbddId::ONE);
            for j in 1..=k {
                let with_x = self.and(x, row[j - 1], limit)?;
                next.push(self.or(with_x, row[j])?);
            }
            row = next;
        }
        Ok(row[k])
    }

    /// Drops every node created since `watermark` was taken.
    ///
    /// Only valid when no id at or above the watermark escaped to a caller.
    fn rollback(&self, watermark: usize) {
        let mut nodes = self.nodes.borrow_mut();
        if nodes.len() <= watermark {
            return;
        }
        nodes.truncate(watermark);
        self.unique.borrow_mut().rollback(watermark as u32);
        self.cache.borrow_mut().clear();
        self.count_cache.borrow_mut().retain(|id, _| id.index() < watermark);
    }

    /// Encodes the graph as its family of minimal cut sets.
    ///
    /// Complements are pushed down to the literals (De Morgan), each graph
    /// node is encoded at most once per polarity. Products matching a
    /// delete-terms substitution are removed from the result.
    ///
    /// A failed encoding releases the nodes it created, so a retry with a
    /// tighter order limit starts from the same node count as a fresh run.
    pub fn encode(&self, pdag: &Pdag, limit: Option<usize>) -> Result<ZbddId> {
        let watermark = self.nodes.borrow().len();
        self.encode_graph(pdag, limit).map_err(|err| {
            self.rollback(watermark);
            err
        })
    }

    fn encode_graph(&self, pdag: &Pdag, limit: Option<usize>) -> Result<ZbddId> {
        debug!("encode(limit = {:?})", limit);
        let order = pdag.post_order()?;
        let root = pdag.root();

        let mut needed: HashSet<(NodeId, bool)> = HashSet::new();
        needed.insert((root.node(), root.is_complement()));
        for &id in order.iter().rev() {
            let Some(gate) = pdag.gate(id) else {
                continue;
            };
            for negated in [false, true] {
                if !needed.contains(&(id, negated)) {
                    continue;
                }
                let flip = gate.op == Operator::Not;
                for a in &gate.args {
                    let polarity = negated ^ a.is_complement() ^ flip;
                    needed.insert((a.node(), polarity));
                    if gate.op == Operator::Xor {
                        needed.insert((a.node(), !polarity));
                    }
                }
            }
        }

        let mut memo: HashMap<(NodeId, bool), ZbddId> = HashMap::new();
        for &id in &order {
            for negated in [false, true] {
                if needed.contains(&(id, negated)) {
                    let f = self.encode_node(pdag, id, negated, &memo, limit)?;
                    memo.insert((id, negated), f);
                }
            }
        }
        let mut res = memo[&(root.node(), root.is_complement())];
        for rewrite in &pdag.exclusions {
            let terms = self.hypothesis_terms(pdag, rewrite)?;
            let kept = self.without(res, terms)?;
            if kept != res {
                debug!("substitution '{}' deleted products", rewrite.id);
            }
            res = kept;
        }
        debug!("encoded: {} nodes, root = {}", self.node_count(), res);
        Ok(res)
    }

    /// Smallest products that satisfy a substitution hypothesis.
    fn hypothesis_terms(&self, pdag: &Pdag, rewrite: &Rewrite) -> Result<ZbddId> {
        let mut events = Vec::with_capacity(rewrite.hypothesis.len());
        for h in &rewrite.hypothesis {
            match pdag.level(h.node()) {
                Some(level) => events.push(self.base(literal(level, false))?),
                None => return Ok(ZbddId::ZERO),
            }
        }
        match rewrite.op {
            Operator::And => events
                .into_iter()
                .try_fold(ZbddId::ONE, |acc, x| self.product(acc, x, u32::MAX)),
            Operator::AtLeast(k) => self.atleast(k as usize, &events, None),
            _ => events.into_iter().try_fold(ZbddId::ZERO, |acc, x| self.union(acc, x)),
        }
    }

    fn encode_node(
        &self,
        pdag: &Pdag,
        id: NodeId,
        negated: bool,
        memo: &HashMap<(NodeId, bool), ZbddId>,
        limit: Option<usize>,
    ) -> Result<ZbddId> {
        let gate = match pdag.node(id) {
            PdagNode::Constant => return Ok(if negated { ZbddId::ZERO } else { ZbddId::ONE }),
            PdagNode::Variable(v) => return self.base(literal(v + 1, negated)),
            PdagNode::Gate(gate) => gate,
        };
        let arg = |a: &Arg, negated: bool| memo[&(a.node(), negated ^ a.is_complement())];
        let args = |negated: bool| -> Vec<ZbddId> { gate.args.iter().map(|a| arg(a, negated)).collect() };
        trace!("encode {} ({}, negated = {})", pdag.name(id), gate.op, negated);

        match (gate.op, negated) {
            (Operator::And, false) | (Operator::Or, true) => {
                let mut res = ZbddId::ONE;
                for x in args(negated) {
                    res = self.and(res, x, limit)?;
                }
                Ok(res)
            }
            (Operator::Or, false) | (Operator::And, true) => {
                let mut res = ZbddId::ZERO;
                for x in args(negated) {
                    res = self.or(res, x)?;
                }
                Ok(res)
            }
            (Operator::AtLeast(k), false) => self.atleast(k as usize, &args(false), limit),
            (Operator::AtLeast(k), true) => {
                let n = gate.args.len();
                self.atleast(n + 1 - (k as usize).min(n + 1), &args(true), limit)
            }
            (Operator::Xor, _) => {
                let (mut pos, mut neg) = (arg(&gate.args[0], false), arg(&gate.args[0], true));
                for a in &gate.args[1..] {
                    let (b, nb) = (arg(a, false), arg(a, true));
                    let next_pos = self.or(self.and(pos, nb, limit)?, self.and(neg, b, limit)?)?;
                    let next_neg = self.or(self.and(pos, b, limit)?, self.and(neg, nb, limit)?)?;
                    pos = next_pos;
                    neg = next_neg;
                }
                Ok(if negated { neg } else { pos })
            }
            (Operator::Not, _) => Ok(arg(&gate.args[0], !negated)),
            (Operator::Null, _) => Ok(arg(&gate.args[0], negated)),
        }
    }

    /// Number of sets in the family.
    pub fn count(&self, f: ZbddId) -> BigUint {
        if f.is_zero() {
            return BigUint::from(0u32);
        }
        if f.is_one() {
            return BigUint::from(1u32);
        }
        if let Some(n) = self.count_cache.borrow().get(&f) {
            return n.clone();
        }
        let node = self.node(f);
        let n = self.count(node.lo) + self.count(node.hi);
        self.count_cache.borrow_mut().insert(f, n.clone());
        n
    }

    /// Iterator over all sets, in depth-first order (`lo` before `hi`).
    pub fn iter_sets(&self, f: ZbddId) -> SetIterator<'_> {
        SetIterator::new(self, f)
    }

    /// Collects the sets of `f` within the given limits.
    ///
    /// Sets whose probability falls below `cut_off` are pruned while walking
    /// down, since adding literals never raises a product's probability.
    pub fn extract(&self, f: ZbddId, extraction: &Extraction<'_>) -> Result<Vec<Vec<u32>>> {
        let start = Instant::now();
        let mut steps: u64 = 0;
        let mut sets = Vec::new();
        let mut pruned = 0usize;

        // (node, current set, current probability)
        let mut stack: Vec<(ZbddId, Vec<u32>, f64)> = Vec::new();
        if !f.is_zero() {
            stack.push((f, Vec::new(), 1.0));
        }
        while let Some((id, set, p)) = stack.pop() {
            steps += 1;
            let over_budget = extraction.step_budget.map_or(false, |b| steps > b);
            let over_time =
                steps % CHECK_INTERVAL == 0 && extraction.time_limit.map_or(false, |t| start.elapsed() > t);
            if over_budget || over_time {
                let elapsed = start.elapsed();
                debug!("extraction stopped after {} steps ({:?})", steps, elapsed);
                return Err(Error::Timeout { steps, elapsed });
            }
            if id.is_zero() {
                continue;
            }
            if id.is_one() {
                sets.push(set);
                if let Some(limit) = extraction.cut_set_limit {
                    if sets.len() > limit {
                        return Err(Error::ResourceLimit {
                            what: "cut sets",
                            limit,
                        });
                    }
                }
                continue;
            }
            let node = self.node(id);
            let mut hi_set = set.clone();
            hi_set.push(node.var);
            let hi_p = match extraction.cut_off {
                Some(_) => p * literal_probability(extraction.probabilities, node.var),
                None => p,
            };
            if extraction.cut_off.map_or(true, |c| hi_p >= c) {
                stack.push((node.hi, hi_set, hi_p));
            } else {
                pruned += 1;
            }
            stack.push((node.lo, set, p));
        }
        debug!(
            "extracted {} sets in {} steps, {} branches pruned",
            sets.len(),
            steps,
            pruned
        );
        Ok(sets)
    }
}

/// Probability of a literal given event probabilities by level.
pub fn literal_probability(probabilities: &[f64], var: u32) -> f64 {
    let p = probabilities[literal_level(var) as usize - 1];
    if is_complement_literal(var) {
        1.0 - p
    } else {
        p
    }
}

/// Iterator that yields all sets of a ZBDD family.
pub struct SetIterator<'a> {
    zbdd: &'a Zbdd,
    /// Stack of (node, current set, visited_hi)
    stack: Vec<(ZbddId, Vec<u32>, bool)>,
}

impl<'a> SetIterator<'a> {
    pub fn new(zbdd: &'a Zbdd, root: ZbddId) -> Self {
        let mut iter = Self {
            zbdd,
            stack: Vec::new(),
        };
        if !root.is_zero() {
            iter.stack.push((root, Vec::new(), false));
        }
        iter
    }
}

impl Iterator for SetIterator<'_> {
    type Item = Vec<u32>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((id, current, visited_hi)) = self.stack.pop() {
            if id.is_zero() {
                continue;
            }
            if id.is_one() {
                return Some(current);
            }
            let node = self.zbdd.node(id);
            if !visited_hi {
                self.stack.push((id, current.clone(), true));
                self.stack.push((node.lo, current, false));
            } else {
                let mut hi_set = current;
                hi_set.push(node.var);
                self.stack.push((node.hi, hi_set, false));
            }
        }
        None
    }
}
