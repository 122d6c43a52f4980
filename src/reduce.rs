//! Graph reduction to a fixed point.
//!
//! Passes run in a fixed order: normalization (removing NOT/NULL gates),
//! constant propagation with complement and duplicate elimination,
//! coalescing with structural merging, then substitutions followed by
//! another propagation and cleanup. Each pass is driven by a work-list: only
//! the parents of a changed gate are looked at again.

use std::collections::{HashMap, HashSet, VecDeque};

use log::{debug, trace};

use crate::error::Result;
use crate::pdag::{Arg, NodeId, Operator, Pdag, Stage};
use crate::settings::Settings;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
enum Pass {
    Normalize,
    Propagate,
    Cleanup,
}

#[derive(Debug, PartialEq)]
enum Simplified {
    /// The gate is equivalent to an edge.
    Edge(Arg),
    Gate(Operator, Vec<Arg>),
    /// `ATLEAST(k; x, x, rest...)` has to be expanded on `x`.
    Expand { x: Arg, k: i64, rest: Vec<Arg> },
}

/// Local rewrite rules for one gate over already resolved arguments.
fn simplify(op: Operator, mut args: Vec<Arg>, pass: Pass) -> Simplified {
    match op {
        Operator::Not => return Simplified::Edge(-args[0]),
        Operator::Null => return Simplified::Edge(args[0]),
        _ => {}
    }
    args.sort();
    let mut op = op;

    if pass >= Pass::Propagate {
        match op {
            Operator::And | Operator::Or => {
                let (absorbing, neutral) = if op == Operator::And {
                    (Arg::FALSE, Arg::TRUE)
                } else {
                    (Arg::TRUE, Arg::FALSE)
                };
                args.dedup();
                if args.contains(&absorbing) || args.windows(2).any(|w| w[0] == -w[1]) {
                    return Simplified::Edge(absorbing);
                }
                args.retain(|&a| a != neutral);
            }
            Operator::AtLeast(k) => {
                let mut k = k as i64;
                let mut rest = Vec::with_capacity(args.len());
                let mut i = 0;
                while i < args.len() {
                    let a = args[i];
                    if a == Arg::TRUE {
                        k -= 1;
                        i += 1;
                    } else if a == Arg::FALSE {
                        i += 1;
                    } else if i + 1 < args.len() && args[i + 1] == -a {
                        // Exactly one of x, ~x holds.
                        k -= 1;
                        i += 2;
                    } else {
                        rest.push(a);
                        i += 1;
                    }
                }
                args = rest;
                if let Some(pos) = args.windows(2).position(|w| w[0] == w[1]) {
                    let x = args[pos];
                    args.drain(pos..pos + 2);
                    return Simplified::Expand { x, k, rest: args };
                }
                let n = args.len() as i64;
                if k <= 0 {
                    return Simplified::Edge(Arg::TRUE);
                }
                if k > n {
                    return Simplified::Edge(Arg::FALSE);
                }
                op = if k == 1 {
                    Operator::Or
                } else if k == n {
                    Operator::And
                } else {
                    Operator::AtLeast(k as u32)
                };
            }
            Operator::Xor => {
                let mut flip = false;
                let mut rest: Vec<Arg> = Vec::with_capacity(args.len());
                for a in args {
                    match rest.last() {
                        Some(&b) if b == a => {
                            rest.pop();
                        }
                        Some(&b) if b == -a => {
                            rest.pop();
                            flip = !flip;
                        }
                        _ => rest.push(a),
                    }
                }
                rest.retain(|&a| {
                    if a == Arg::TRUE {
                        flip = !flip;
                    }
                    !a.is_constant()
                });
                match rest.len() {
                    0 => return Simplified::Edge(Arg::FALSE.negate_if(flip)),
                    1 => return Simplified::Edge(rest[0].negate_if(flip)),
                    _ => {}
                }
                if flip {
                    rest.insert(0, Arg::TRUE);
                }
                args = rest;
            }
            Operator::Not | Operator::Null => unreachable!(),
        }
    } else if let Operator::AtLeast(k) = op {
        if k == 1 {
            op = Operator::Or;
        } else if k as usize == args.len() {
            op = Operator::And;
        }
    }

    match op {
        Operator::And if args.is_empty() => Simplified::Edge(Arg::TRUE),
        Operator::Or if args.is_empty() => Simplified::Edge(Arg::FALSE),
        Operator::And | Operator::Or | Operator::Xor if args.len() == 1 => Simplified::Edge(args[0]),
        _ => Simplified::Gate(op, args),
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Outcome {
    Unchanged,
    Changed,
    Replaced,
}

struct Reducer<'a> {
    pdag: &'a mut Pdag,
    parents: HashMap<NodeId, HashSet<NodeId>>,
    forward: HashMap<NodeId, Arg>,
    coalescing: bool,
    /// Gates created during the current pass.
    fresh: Vec<NodeId>,
}

impl<'a> Reducer<'a> {
    fn new(pdag: &'a mut Pdag) -> Result<Self> {
        let mut reducer = Self {
            pdag,
            parents: HashMap::new(),
            forward: HashMap::new(),
            coalescing: false,
            fresh: Vec::new(),
        };
        reducer.parents = reducer.pdag.parents(&reducer.roots())?;
        Ok(reducer)
    }

    /// The top node plus the targets of pending substitutions.
    fn roots(&self) -> Vec<NodeId> {
        let mut roots = vec![self.pdag.root.node()];
        roots.extend(self.pdag.rewrites.iter().map(|r| r.target.node()));
        roots
    }

    fn resolve(&self, mut arg: Arg) -> Arg {
        while let Some(&to) = self.forward.get(&arg.node()) {
            arg = to.negate_if(arg.is_complement());
        }
        arg
    }

    /// Replaces the gate contents, keeping the parent map in sync.
    fn set_gate(&mut self, id: NodeId, op: Operator, args: Vec<Arg>) {
        let Some(gate) = self.pdag.gate_mut(id) else {
            return;
        };
        let old: HashSet<NodeId> = gate.args.iter().map(|a| a.node()).collect();
        let new: HashSet<NodeId> = args.iter().map(|a| a.node()).collect();
        gate.op = op;
        gate.args = args;
        for child in old.difference(&new) {
            if let Some(p) = self.parents.get_mut(child) {
                p.remove(&id);
            }
        }
        for &child in new.difference(&old) {
            self.parents.entry(child).or_default().insert(id);
        }
    }

    fn new_gate(&mut self, op: Operator, args: Vec<Arg>) -> Arg {
        let id = self.pdag.push_gate(op, args, None);
        if let Some(gate) = self.pdag.gate(id) {
            for a in &gate.args {
                self.parents.entry(a.node()).or_default().insert(id);
            }
        }
        self.fresh.push(id);
        Arg::new(id, false)
    }

    /// Splices single-parent children with the same associative operator.
    fn coalesce(&mut self, id: NodeId, op: Operator, args: &mut Vec<Arg>) -> bool {
        if !matches!(op, Operator::And | Operator::Or) {
            return false;
        }
        let mut spliced = false;
        let mut i = 0;
        while i < args.len() {
            let a = args[i];
            let child = a.node();
            let single_parent = self.parents.get(&child).map_or(false, |p| p.len() == 1 && p.contains(&id));
            let same_op = self.pdag.gate(child).map_or(false, |g| g.op == op);
            if a.is_complement() || !single_parent || !same_op || child == self.pdag.root.node() {
                i += 1;
                continue;
            }
            let grandchildren: Vec<Arg> = self
                .pdag
                .gate(child)
                .map(|g| g.args.iter().map(|&b| self.resolve(b)).collect())
                .unwrap_or_default();
            trace!("coalesce {} into {}", self.pdag.name(child), self.pdag.name(id));
            for b in &grandchildren {
                if let Some(p) = self.parents.get_mut(&b.node()) {
                    p.remove(&child);
                }
            }
            args.swap_remove(i);
            args.extend(grandchildren);
            spliced = true;
        }
        spliced
    }

    fn process(&mut self, id: NodeId, pass: Pass) -> Outcome {
        let Some(gate) = self.pdag.gate(id) else {
            return Outcome::Unchanged;
        };
        let (old_op, old_args) = (gate.op, gate.args.clone());
        let mut op = old_op;
        let mut args: Vec<Arg> = old_args.iter().map(|&a| self.resolve(a)).collect();

        loop {
            match simplify(op, args, pass) {
                Simplified::Edge(edge) => {
                    trace!("{} => {}", self.pdag.name(id), edge);
                    self.forward.insert(id, edge);
                    for a in &old_args {
                        if let Some(p) = self.parents.get_mut(&a.node()) {
                            p.remove(&id);
                        }
                    }
                    return Outcome::Replaced;
                }
                Simplified::Expand { x, k, rest } => {
                    trace!("{} expanded on {}", self.pdag.name(id), x);
                    let with_x = if k <= 2 {
                        x
                    } else {
                        let g = self.new_gate(Operator::AtLeast((k - 2) as u32), rest.clone());
                        self.new_gate(Operator::And, vec![x, g])
                    };
                    let without_x = self.new_gate(Operator::AtLeast(k.max(0) as u32), rest);
                    op = Operator::Or;
                    args = vec![with_x, without_x];
                    args.sort();
                    break;
                }
                Simplified::Gate(new_op, mut new_args) => {
                    if pass == Pass::Cleanup && self.coalescing && self.coalesce(id, new_op, &mut new_args) {
                        op = new_op;
                        args = new_args;
                        continue;
                    }
                    op = new_op;
                    args = new_args;
                    break;
                }
            }
        }

        if op == old_op && args == old_args {
            Outcome::Unchanged
        } else {
            self.set_gate(id, op, args);
            Outcome::Changed
        }
    }

    fn run(&mut self, pass: Pass) -> Result<usize> {
        let mut queue: VecDeque<NodeId> = VecDeque::new();
        let mut queued: HashSet<NodeId> = HashSet::new();
        for id in self.pdag.post_order_from(&self.roots())? {
            if self.pdag.gate(id).is_some() && !self.forward.contains_key(&id) {
                queue.push_back(id);
                queued.insert(id);
            }
        }

        let mut changes = 0;
        while let Some(id) = queue.pop_front() {
            queued.remove(&id);
            if self.forward.contains_key(&id) {
                continue;
            }
            let outcome = self.process(id, pass);
            for fresh in std::mem::take(&mut self.fresh) {
                if queued.insert(fresh) {
                    queue.push_back(fresh);
                }
            }
            if outcome == Outcome::Unchanged {
                continue;
            }
            changes += 1;
            if outcome == Outcome::Changed && queued.insert(id) {
                // Fresh children are simplified before their parent.
                queue.push_back(id);
            }
            let parents: Vec<NodeId> = self.parents.get(&id).map(|p| p.iter().copied().collect()).unwrap_or_default();
            for parent in parents {
                if queued.insert(parent) {
                    queue.push_back(parent);
                }
            }
        }

        self.pdag.root = self.resolve(self.pdag.root);
        for rewrite in &mut self.pdag.rewrites {
            let mut target = rewrite.target;
            while let Some(&to) = self.forward.get(&target.node()) {
                target = to.negate_if(target.is_complement());
            }
            rewrite.target = target;
        }
        debug!("pass {:?}: {} gate rewrites", pass, changes);
        Ok(changes)
    }

    /// Arguments of `id` with every non-complemented child gate of the same
    /// operator spliced in, however deep or shared.
    fn flat_args(&self, id: NodeId, op: Operator) -> Vec<Arg> {
        let mut args = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![id];
        while let Some(g) = stack.pop() {
            let Some(gate) = self.pdag.gate(g) else {
                continue;
            };
            for &a in &gate.args {
                let a = self.resolve(a);
                let nested = !a.is_complement() && self.pdag.gate(a.node()).map_or(false, |c| c.op == op);
                if !nested {
                    args.push(a);
                } else if seen.insert(a.node()) {
                    stack.push(a.node());
                }
            }
        }
        args.sort();
        args.dedup();
        args
    }

    /// Applies the pending substitutions in declaration order.
    ///
    /// An AND or OR gate matches when its arguments, flattened through
    /// nested gates of the same operator, cover the hypothesis. So a nested
    /// `AND(A, AND(B, C))` matches exactly like the flat `AND(A, B, C)`.
    fn substitute(&mut self) -> Result<()> {
        let rewrites = self.pdag.rewrites.clone();
        for rewrite in &rewrites {
            let target = self.resolve(rewrite.target);
            let roots = [self.pdag.root.node(), target.node()];
            let mut applied = 0;
            for id in self.pdag.post_order_from(&roots)? {
                if self.forward.contains_key(&id) || id == target.node() {
                    continue;
                }
                let Some(gate) = self.pdag.gate(id) else {
                    continue;
                };
                let covers = |args: &[Arg]| rewrite.hypothesis.iter().all(|h| args.contains(h));
                let op = gate.op;
                let (args, exact) = match (rewrite.op, op) {
                    (Operator::Null, _) => (gate.args.clone(), false),
                    (Operator::AtLeast(k), Operator::AtLeast(j)) if k == j => {
                        if gate.args != rewrite.hypothesis {
                            continue;
                        }
                        (gate.args.clone(), true)
                    }
                    (a, b) if a == b && covers(&gate.args) => (gate.args.clone(), false),
                    (a, b) if a == b && matches!(a, Operator::And | Operator::Or) => {
                        let flat = self.flat_args(id, op);
                        if !covers(&flat) {
                            continue;
                        }
                        (flat, false)
                    }
                    _ => continue,
                };
                let replaced = if rewrite.source.is_empty() {
                    &rewrite.hypothesis
                } else {
                    &rewrite.source
                };
                let mut kept: Vec<Arg> = args.iter().filter(|a| !replaced.contains(a)).copied().collect();
                if kept.len() == args.len() {
                    continue;
                }
                trace!("substitution '{}' applied to {}", rewrite.id, self.pdag.name(id));
                if exact && rewrite.source.is_empty() {
                    self.set_gate(id, Operator::Null, vec![target]);
                } else {
                    kept.push(target);
                    kept.sort();
                    self.set_gate(id, op, kept);
                }
                applied += 1;
            }
            debug!("substitution '{}' applied {} times", rewrite.id, applied);
            // A gate target may now reach one of its own ancestors.
            self.pdag.post_order()?;
        }
        Ok(())
    }

    /// Cleanup passes and structural merging until nothing merges.
    fn cleanup(&mut self) -> Result<()> {
        loop {
            self.run(Pass::Cleanup)?;
            if !self.merge()? {
                return Ok(());
            }
        }
    }

    /// Merges structurally equal gates. Returns `true` if anything merged.
    fn merge(&mut self) -> Result<bool> {
        let mut unique: HashMap<(Operator, Vec<Arg>), NodeId> = HashMap::new();
        let mut merged = false;
        for id in self.pdag.post_order()? {
            if self.forward.contains_key(&id) {
                continue;
            }
            let Some(gate) = self.pdag.gate(id) else {
                continue;
            };
            let op = gate.op;
            let mut args: Vec<Arg> = gate.args.iter().map(|&a| self.resolve(a)).collect();
            args.sort();
            match unique.get(&(op, args.clone())) {
                Some(&same) => {
                    trace!("merge {} into {}", self.pdag.name(id), self.pdag.name(same));
                    self.forward.insert(id, Arg::new(same, false));
                    for a in &args {
                        if let Some(p) = self.parents.get_mut(&a.node()) {
                            p.remove(&id);
                        }
                    }
                    merged = true;
                }
                None => {
                    unique.insert((op, args), id);
                }
            }
        }
        Ok(merged)
    }
}

impl Pdag {
    /// Reduces the graph in place.
    ///
    /// On error the graph is left half-reduced and should be rebuilt.
    pub fn reduce(&mut self, settings: &Settings) -> Result<()> {
        let before = self.gate_count();
        {
            let mut reducer = Reducer::new(self)?;
            reducer.run(Pass::Normalize)?;
            reducer.run(Pass::Propagate)?;
            reducer.pdag.advance(Stage::Normalized);

            reducer.coalescing = settings.gate_coalescing;
            reducer.cleanup()?;
            if settings.enable_ccf_substitutions && !reducer.pdag.rewrites.is_empty() {
                reducer.substitute()?;
                reducer.run(Pass::Propagate)?;
                reducer.cleanup()?;
            }
            let rewrites = std::mem::take(&mut reducer.pdag.rewrites);
            reducer.pdag.exclusions = rewrites
                .into_iter()
                .filter(|r| r.source.is_empty() && r.target == Arg::FALSE)
                .collect();
            reducer.pdag.advance(Stage::Coalesced);
        }
        debug!("reduced graph: {} -> {} gates", before, self.gate_count());
        Ok(())
    }
}
