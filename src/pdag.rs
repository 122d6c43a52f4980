//! Propositional directed acyclic graph (PDAG) built from a fault-tree model.
//!
//! Every node lives in one indexed pool. Node `0` is the constant `true`;
//! `false` is its complement. Edges are [`Arg`]s: a node index plus a
//! complement bit, so negation never needs a gate of its own once the graph
//! is normalized.
//!
//! ```
//! use ftdd::model::{Formula, Model};
//! use ftdd::pdag::Pdag;
//! use ftdd::settings::Settings;
//!
//! let mut model = Model::new();
//! model.add_basic_event("A", 0.1).unwrap();
//! model.add_basic_event("B", 0.2).unwrap();
//! model.add_gate("TOP", Formula::and(["A", "B"])).unwrap();
//!
//! let pdag = Pdag::build(&model, "TOP", &Settings::default()).unwrap();
//! assert_eq!(pdag.variables().len(), 2);
//! assert_eq!(pdag.gate_count(), 1);
//! ```

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt::{Display, Formatter};
use std::ops::Neg;

use log::debug;

use crate::error::{Error, Result};
use crate::model::{Connective, EventRef, Model, Operand, Substitution, Target};
use crate::settings::{Settings, VariableOrdering};

pub type NodeId = u32;

/// A possibly complemented edge to a PDAG node.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Arg(i32);

impl Arg {
    pub const TRUE: Arg = Arg(1);
    pub const FALSE: Arg = Arg(-1);

    pub const fn new(node: NodeId, complement: bool) -> Self {
        let value = node as i32 + 1;
        Self(if complement { -value } else { value })
    }

    pub const fn node(self) -> NodeId {
        self.0.unsigned_abs() - 1
    }

    pub const fn is_complement(self) -> bool {
        self.0 < 0
    }

    pub const fn is_constant(self) -> bool {
        self.node() == 0
    }

    pub const fn regular(self) -> Self {
        Self(self.0.abs())
    }

    /// Complements the edge if `flag` is set.
    pub fn negate_if(self, flag: bool) -> Self {
        if flag {
            -self
        } else {
            self
        }
    }
}

impl Neg for Arg {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

// Complementary edges sort next to each other.
impl Ord for Arg {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.node(), self.is_complement()).cmp(&(other.node(), other.is_complement()))
    }
}

impl PartialOrd for Arg {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Display for Arg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", if self.is_complement() { "~" } else { "" }, self.node())
    }
}

/// Gate operators of the graph.
///
/// `Not` and `Null` only exist before normalization.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Operator {
    And,
    Or,
    AtLeast(u32),
    Xor,
    Not,
    Null,
}

impl Operator {
    fn from_connective(connective: Connective) -> Self {
        match connective {
            Connective::And | Connective::Nand => Operator::And,
            Connective::Or | Connective::Nor => Operator::Or,
            Connective::AtLeast(k) => Operator::AtLeast(k as u32),
            Connective::Xor => Operator::Xor,
            Connective::Not => Operator::Not,
            Connective::Null => Operator::Null,
        }
    }
}

impl Display for Operator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Operator::And => write!(f, "and"),
            Operator::Or => write!(f, "or"),
            Operator::AtLeast(k) => write!(f, "atleast({})", k),
            Operator::Xor => write!(f, "xor"),
            Operator::Not => write!(f, "not"),
            Operator::Null => write!(f, "null"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Gate {
    pub op: Operator,
    /// Sorted arguments.
    pub args: Vec<Arg>,
    /// Model id of the first gate that produced this node.
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Constant,
    /// Index into [`Pdag::variables`].
    Variable(u32),
    Gate(Gate),
}

/// A basic event placed in the variable order.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub id: String,
    pub probability: f64,
    pub node: NodeId,
}

/// Lifecycle of the graph inside one analysis.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub enum Stage {
    Raw,
    Normalized,
    Coalesced,
    Encoded,
    Extracted,
}

/// A substitution resolved against the graph.
#[derive(Debug, Clone)]
pub(crate) struct Rewrite {
    pub id: String,
    pub op: Operator,
    pub hypothesis: Vec<Arg>,
    pub source: Vec<Arg>,
    pub target: Arg,
}

#[derive(Debug, Clone)]
pub struct Pdag {
    pub(crate) nodes: Vec<Node>,
    pub(crate) root: Arg,
    variables: Vec<Variable>,
    pub(crate) rewrites: Vec<Rewrite>,
    /// Declarative substitutions with a `false` target, kept after reduction
    /// to delete the matching products of the ZBDD.
    pub(crate) exclusions: Vec<Rewrite>,
    stage: Stage,
}

impl Pdag {
    /// Builds the graph rooted at gate `top`.
    pub fn build(model: &Model, top: &str, settings: &Settings) -> Result<Self> {
        debug!("build(top = {})", top);
        let top = match model.gate(top) {
            Some(gate) => gate.id.as_str(),
            None => return Err(Error::validation(top, "top event is not a gate")),
        };

        let mut order = variable_order(model, top, &settings.variable_ordering)?;
        let mut builder = Builder::new(model);
        if settings.enable_ccf_substitutions && !model.ccf_groups().is_empty() {
            order = expand_ccf_members(model, order);
            builder.ccf = true;
        }
        for id in &order {
            builder.variable(id);
        }

        let root = builder.gate(top)?;
        builder.pdag.root = root;

        if settings.enable_ccf_substitutions {
            for substitution in model.substitutions() {
                builder.rewrite(substitution)?;
            }
        }

        let pdag = builder.pdag;
        debug!(
            "built graph: {} nodes, {} variables, {} rewrites",
            pdag.nodes.len(),
            pdag.variables.len(),
            pdag.rewrites.len()
        );
        Ok(pdag)
    }

    pub fn root(&self) -> Arg {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id as usize]
    }

    pub fn gate(&self, id: NodeId) -> Option<&Gate> {
        match &self.nodes[id as usize] {
            Node::Gate(g) => Some(g),
            _ => None,
        }
    }

    pub(crate) fn gate_mut(&mut self, id: NodeId) -> Option<&mut Gate> {
        match &mut self.nodes[id as usize] {
            Node::Gate(g) => Some(g),
            _ => None,
        }
    }

    /// Variables in order: the variable at position `i` has level `i + 1`.
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn variable(&self, id: NodeId) -> Option<&Variable> {
        match self.nodes[id as usize] {
            Node::Variable(v) => Some(&self.variables[v as usize]),
            _ => None,
        }
    }

    /// Level (1-based position in the order) of the variable node `id`.
    pub fn level(&self, id: NodeId) -> Option<u32> {
        match self.nodes[id as usize] {
            Node::Variable(v) => Some(v + 1),
            _ => None,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub(crate) fn advance(&mut self, stage: Stage) {
        if stage > self.stage {
            debug!("stage {:?} -> {:?}", self.stage, stage);
            self.stage = stage;
        }
    }

    /// Human-readable name of a node for messages and exports.
    pub fn name(&self, id: NodeId) -> String {
        match &self.nodes[id as usize] {
            Node::Constant => "true".to_string(),
            Node::Variable(v) => self.variables[*v as usize].id.clone(),
            Node::Gate(Gate { name: Some(name), .. }) => name.clone(),
            Node::Gate(_) => format!("G{}", id),
        }
    }

    /// Number of gates reachable from the root.
    pub fn gate_count(&self) -> usize {
        self.post_order()
            .map(|order| order.iter().filter(|&&id| self.gate(id).is_some()).count())
            .unwrap_or(0)
    }

    /// Nodes reachable from the root, children before parents.
    ///
    /// Fails with a validation error naming a gate on a cycle.
    pub fn post_order(&self) -> Result<Vec<NodeId>> {
        self.post_order_from(&[self.root.node()])
    }

    pub(crate) fn post_order_from(&self, roots: &[NodeId]) -> Result<Vec<NodeId>> {
        #[derive(Copy, Clone, Eq, PartialEq)]
        enum Mark {
            Open,
            Done,
        }

        let mut marks: HashMap<NodeId, Mark> = HashMap::new();
        let mut order = Vec::new();
        for &root in roots {
            if marks.contains_key(&root) {
                continue;
            }
            // (node, next argument to visit)
            let mut stack = vec![(root, 0usize)];
            marks.insert(root, Mark::Open);
            while let Some(frame) = stack.last_mut() {
                let (id, next) = *frame;
                frame.1 += 1;
                let child = self.gate(id).and_then(|g| g.args.get(next)).map(|a| a.node());
                match child {
                    Some(child) => match marks.get(&child) {
                        None => {
                            marks.insert(child, Mark::Open);
                            stack.push((child, 0));
                        }
                        Some(Mark::Open) => {
                            return Err(Error::validation(self.name(child), "cycle detected"));
                        }
                        Some(Mark::Done) => {}
                    },
                    None => {
                        marks.insert(id, Mark::Done);
                        order.push(id);
                        stack.pop();
                    }
                }
            }
        }
        Ok(order)
    }

    /// Parents of every node reachable from `roots`.
    pub(crate) fn parents(&self, roots: &[NodeId]) -> Result<HashMap<NodeId, HashSet<NodeId>>> {
        let mut parents: HashMap<NodeId, HashSet<NodeId>> = HashMap::new();
        for id in self.post_order_from(roots)? {
            if let Some(gate) = self.gate(id) {
                for a in &gate.args {
                    parents.entry(a.node()).or_default().insert(id);
                }
            }
        }
        Ok(parents)
    }

    pub(crate) fn push_gate(&mut self, op: Operator, mut args: Vec<Arg>, name: Option<String>) -> NodeId {
        args.sort();
        let id = self.nodes.len() as NodeId;
        self.nodes.push(Node::Gate(Gate { op, args, name }));
        id
    }
}

/// Variable order for the events reachable from `top`.
fn variable_order(model: &Model, top: &str, ordering: &VariableOrdering) -> Result<Vec<String>> {
    let dfs = depth_first_events(model, top);
    let order = match ordering {
        VariableOrdering::DepthFirst => dfs,
        VariableOrdering::DeclarationOrder => {
            let reachable: HashSet<&str> = dfs.iter().map(String::as_str).collect();
            model
                .basic_events()
                .iter()
                .filter(|e| reachable.contains(e.id.as_str()))
                .map(|e| e.id.clone())
                .collect()
        }
        VariableOrdering::Custom(ids) => {
            let reachable: HashSet<&str> = dfs.iter().map(String::as_str).collect();
            let mut order = Vec::new();
            let mut seen = HashSet::new();
            for id in ids {
                if !matches!(model.lookup(id), Some(EventRef::Basic(_))) {
                    return Err(Error::validation(id, "unknown basic event in variable ordering"));
                }
                if reachable.contains(id.as_str()) && seen.insert(id.as_str()) {
                    order.push(id.clone());
                }
            }
            for id in &dfs {
                if seen.insert(id.as_str()) {
                    order.push(id.clone());
                }
            }
            order
        }
    };
    debug!("variable order: {:?}", order);
    Ok(order)
}

/// Replaces every CCF group member with the CCF events that fail it.
fn expand_ccf_members(model: &Model, order: Vec<String>) -> Vec<String> {
    let mut expanded = Vec::with_capacity(order.len());
    let mut seen = HashSet::new();
    for id in order {
        match model.ccf_events_of(&id) {
            Some(events) => {
                for event in events {
                    if seen.insert(event.id.clone()) {
                        expanded.push(event.id.clone());
                    }
                }
            }
            None => expanded.push(id),
        }
    }
    debug!("variable order with CCF events: {:?}", expanded);
    expanded
}

/// Basic events in the order of their first reference in a depth-first walk.
fn depth_first_events(model: &Model, top: &str) -> Vec<String> {
    let mut events = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    let Some(top) = model.gate(top) else {
        return events;
    };
    seen.insert(&top.id);
    let mut stack = vec![(top, 0usize)];
    while let Some(frame) = stack.last_mut() {
        let (gate, next) = *frame;
        frame.1 += 1;
        let Some(arg) = gate.formula.args.get(next) else {
            stack.pop();
            continue;
        };
        if !seen.insert(&arg.id) {
            continue;
        }
        match model.lookup(&arg.id) {
            Some(EventRef::Basic(_)) => events.push(arg.id.clone()),
            Some(EventRef::Gate(i)) => stack.push((&model.gates()[i], 0)),
            _ => {}
        }
    }
    events
}

struct Builder<'a> {
    model: &'a Model,
    pdag: Pdag,
    gates: HashMap<&'a str, Arg>,
    on_stack: HashSet<&'a str>,
    variables: HashMap<String, NodeId>,
    unique: HashMap<(Operator, Vec<Arg>), NodeId>,
    /// Expand CCF group members into their CCF events.
    ccf: bool,
    members: HashMap<&'a str, Arg>,
}

impl<'a> Builder<'a> {
    fn new(model: &'a Model) -> Self {
        Self {
            model,
            pdag: Pdag {
                nodes: vec![Node::Constant],
                root: Arg::TRUE,
                variables: Vec::new(),
                rewrites: Vec::new(),
                exclusions: Vec::new(),
                stage: Stage::Raw,
            },
            gates: HashMap::new(),
            on_stack: HashSet::new(),
            variables: HashMap::new(),
            unique: HashMap::new(),
            ccf: false,
            members: HashMap::new(),
        }
    }

    fn variable(&mut self, id: &str) -> NodeId {
        if let Some(&node) = self.variables.get(id) {
            return node;
        }
        let probability = match (self.model.lookup(id), self.model.ccf_event(id)) {
            (Some(EventRef::Basic(i)), _) => self.model.basic_events()[i].probability,
            (_, Some(event)) => event.probability,
            _ => unreachable!("'{}' is not a basic event", id),
        };
        let node = self.pdag.nodes.len() as NodeId;
        let index = self.pdag.variables.len() as u32;
        self.pdag.nodes.push(Node::Variable(index));
        self.pdag.variables.push(Variable {
            id: id.to_string(),
            probability,
            node,
        });
        self.variables.insert(id.to_string(), node);
        node
    }

    fn operand(&mut self, owner: &str, operand: &'a Operand) -> Result<Arg> {
        let arg = match self.model.lookup(&operand.id) {
            Some(EventRef::Basic(_)) if self.ccf => self.member(&operand.id),
            Some(EventRef::Basic(_)) => Arg::new(self.variable(&operand.id), false),
            Some(EventRef::House(i)) => {
                if self.model.house_events()[i].state {
                    Arg::TRUE
                } else {
                    Arg::FALSE
                }
            }
            Some(EventRef::Gate(_)) => self.gate(&operand.id)?,
            None => {
                return Err(Error::validation(
                    owner,
                    format!("dangling argument '{}'", operand.id),
                ))
            }
        };
        Ok(arg.negate_if(operand.complement))
    }

    /// A basic event, or the OR of the CCF events of a group member.
    fn member(&mut self, id: &'a str) -> Arg {
        if let Some(&arg) = self.members.get(id) {
            return arg;
        }
        let model = self.model;
        let Some(events) = model.ccf_events_of(id) else {
            return Arg::new(self.variable(id), false);
        };
        let events: Vec<&'a str> = events.map(|e| e.id.as_str()).collect();
        let args = events.into_iter().map(|e| Arg::new(self.variable(e), false)).collect();
        let arg = Arg::new(self.add_gate(Operator::Or, args, id), false);
        self.members.insert(id, arg);
        arg
    }

    fn gate(&mut self, id: &'a str) -> Result<Arg> {
        if let Some(&arg) = self.gates.get(id) {
            return Ok(arg);
        }
        if !self.on_stack.insert(id) {
            return Err(Error::validation(id, "cycle detected"));
        }
        let gate = match self.model.lookup(id) {
            Some(EventRef::Gate(i)) => &self.model.gates()[i],
            _ => return Err(Error::validation(id, "undefined gate")),
        };

        let mut args = Vec::with_capacity(gate.formula.args.len());
        for operand in &gate.formula.args {
            args.push(self.operand(id, operand)?);
        }

        let connective = gate.formula.connective;
        let node = self.add_gate(Operator::from_connective(connective), args, id);
        let complement = matches!(connective, Connective::Nand | Connective::Nor);
        let arg = Arg::new(node, complement);

        self.on_stack.remove(id);
        self.gates.insert(id, arg);
        Ok(arg)
    }

    /// Adds a gate unless a structurally identical one already exists.
    fn add_gate(&mut self, op: Operator, mut args: Vec<Arg>, name: &str) -> NodeId {
        args.sort();
        let key = (op, args);
        if let Some(&node) = self.unique.get(&key) {
            debug!("gate '{}' merged into {}", name, self.pdag.name(node));
            return node;
        }
        let node = self.pdag.push_gate(op, key.1.clone(), Some(name.to_string()));
        self.unique.insert(key, node);
        node
    }

    fn rewrite(&mut self, substitution: &'a Substitution) -> Result<()> {
        let mut hypothesis = Vec::new();
        for operand in &substitution.hypothesis.args {
            match self.variables.get(operand.id.as_str()) {
                Some(&node) => hypothesis.push(Arg::new(node, false)),
                None => {
                    debug!(
                        "substitution '{}' skipped: '{}' is not in the graph",
                        substitution.id, operand.id
                    );
                    return Ok(());
                }
            }
        }
        hypothesis.sort();
        let source = substitution
            .source
            .iter()
            .filter_map(|id| self.variables.get(id.as_str()))
            .map(|&node| Arg::new(node, false))
            .collect();
        let target = match &substitution.target {
            Target::Event(id) => Arg::new(self.variable(id), false),
            Target::Gate(id) => self.gate(id)?,
            Target::Constant(true) => Arg::TRUE,
            Target::Constant(false) => Arg::FALSE,
        };
        // Gates get the same treatment during normalization.
        let op = match Operator::from_connective(substitution.hypothesis.connective) {
            Operator::AtLeast(1) => Operator::Or,
            Operator::AtLeast(k) if k as usize == hypothesis.len() => Operator::And,
            op => op,
        };
        self.pdag.rewrites.push(Rewrite {
            id: substitution.id.clone(),
            op,
            hypothesis,
            source,
            target,
        });
        Ok(())
    }
}
