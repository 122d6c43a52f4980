//! Graphviz export of graphs and diagrams.
//!
//! - [`Pdag::to_dot`] draws the Boolean graph, one box per gate and one
//!   ellipse per basic event;
//! - [`Bdd::to_dot`] draws decision diagrams: solid high edges, dashed low
//!   edges, complemented edges dotted with a hollow head;
//! - [`Zbdd::to_dot`] draws a family of cut sets, labelled by literal.
//!
//! ```
//! use ftdd::bdd::Bdd;
//!
//! let bdd = Bdd::default();
//! let x1 = bdd.mk_var(1).unwrap();
//! let x2 = bdd.mk_var(2).unwrap();
//! let f = bdd.apply_and(x1, x2).unwrap();
//!
//! let dot = bdd.to_dot(&[f]).unwrap();
//! // Render with: dot -Tpng output.dot -o output.png
//! assert!(dot.starts_with("graph {"));
//! ```

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::bdd::Bdd;
use crate::pdag::{Node, Pdag};
use crate::reference::Ref;
use crate::zbdd::{is_complement_literal, literal_level, Zbdd, ZbddId};

/// Visual options for DOT output.
#[derive(Debug, Clone)]
pub struct DotConfig {
    /// Shape for decision nodes (default: "circle")
    pub node_shape: &'static str,
    /// Shape for terminal nodes (default: "square")
    pub terminal_shape: &'static str,
    /// Shape for root nodes (default: "rect")
    pub root_shape: &'static str,
    pub high_edge_style: &'static str,
    pub low_edge_style: &'static str,
    pub negated_edge_style: &'static str,
    /// Whether to use HTML labels for subscripts (default: true)
    pub use_html_labels: bool,
}

impl Default for DotConfig {
    fn default() -> Self {
        Self {
            node_shape: "circle",
            terminal_shape: "square",
            root_shape: "rect",
            high_edge_style: "solid",
            low_edge_style: "dashed",
            negated_edge_style: "dotted",
            use_html_labels: true,
        }
    }
}

impl Pdag {
    /// Converts the graph reachable from the root to DOT format.
    ///
    /// Complemented arguments are drawn with a hollow arrow head.
    pub fn to_dot(&self) -> Result<String, std::fmt::Error> {
        let order = self.post_order().map_err(|_| std::fmt::Error)?;

        let mut dot = String::new();
        writeln!(dot, "digraph {{")?;
        writeln!(dot, "node [shape=box];")?;
        for &id in &order {
            match self.node(id) {
                Node::Constant => writeln!(dot, "n{} [shape=square, label=\"1\"];", id)?,
                Node::Variable(_) => writeln!(dot, "n{} [shape=ellipse, label=\"{}\"];", id, self.name(id))?,
                Node::Gate(gate) => writeln!(dot, "n{} [label=\"{}\\n{}\"];", id, self.name(id), gate.op)?,
            }
        }
        for &id in &order {
            if let Some(gate) = self.gate(id) {
                for a in &gate.args {
                    if a.is_complement() {
                        writeln!(dot, "n{} -> n{} [arrowhead=odot];", id, a.node())?;
                    } else {
                        writeln!(dot, "n{} -> n{};", id, a.node())?;
                    }
                }
            }
        }
        let root = self.root();
        writeln!(dot, "top [shape=plaintext];")?;
        if root.is_complement() {
            writeln!(dot, "top -> n{} [arrowhead=odot];", root.node())?;
        } else {
            writeln!(dot, "top -> n{};", root.node())?;
        }
        writeln!(dot, "}}")?;
        Ok(dot)
    }
}

impl Bdd {
    /// Converts the diagrams rooted at `roots` to DOT format.
    pub fn to_dot(&self, roots: &[Ref]) -> Result<String, std::fmt::Error> {
        self.to_dot_with_config(roots, &DotConfig::default())
    }

    pub fn to_dot_with_config(&self, roots: &[Ref], config: &DotConfig) -> Result<String, std::fmt::Error> {
        let mut dot = String::new();
        writeln!(dot, "graph {{")?;
        writeln!(dot, "node [shape={}, fixedsize=true];", config.node_shape)?;

        writeln!(dot, "{{ rank=sink")?;
        writeln!(dot, "0 [shape={}, label=\"0\"];", config.terminal_shape)?;
        writeln!(dot, "1 [shape={}, label=\"1\"];", config.terminal_shape)?;
        writeln!(dot, "}}")?;

        let all_nodes = self.descendants(roots.iter().copied());

        // Same level, same rank.
        let mut levels = BTreeMap::<u32, Vec<u32>>::new();
        for &id in all_nodes.iter() {
            if id == 1 {
                continue;
            }
            levels.entry(self.level(Ref::positive(id))).or_default().push(id);
        }
        for (level, ids) in &levels {
            writeln!(dot, "{{ rank=same")?;
            for &id in ids {
                let label = if config.use_html_labels {
                    format!("<x<SUB>{}</SUB>>", level)
                } else {
                    format!("\"x{}\"", level)
                };
                writeln!(dot, "{} [label={}];", id, label)?;
            }
            writeln!(dot, "}}")?;
        }

        for &id in all_nodes.iter() {
            if id == 1 {
                continue;
            }
            let node = Ref::positive(id);
            let high = self.high_node(node);
            assert!(!high.is_negated());
            writeln!(dot, "{} -- {} [style={}];", id, high.index(), config.high_edge_style)?;

            let low = self.low_node(node);
            if low == self.zero {
                writeln!(dot, "{} -- 0 [style={}];", id, config.low_edge_style)?;
            } else if low.is_negated() {
                writeln!(
                    dot,
                    "{} -- {} [style={}, dir=forward, arrowhead=odot];",
                    id,
                    low.index(),
                    config.negated_edge_style
                )?;
            } else {
                writeln!(dot, "{} -- {} [style={}];", id, low.index(), config.low_edge_style)?;
            }
        }

        writeln!(dot, "{{ rank=source")?;
        for (i, root) in roots.iter().enumerate() {
            writeln!(dot, "r{} [shape={}, label=\"{}\"];", i, config.root_shape, root)?;
        }
        writeln!(dot, "}}")?;
        for (i, &root) in roots.iter().enumerate() {
            if root == self.zero {
                writeln!(dot, "r{} -- 0;", i)?;
            } else if root.is_negated() {
                writeln!(dot, "r{} -- {} [dir=forward, arrowhead=odot];", i, root.index())?;
            } else {
                writeln!(dot, "r{} -- {};", i, root.index())?;
            }
        }

        writeln!(dot, "}}")?;
        Ok(dot)
    }
}

impl Zbdd {
    /// Converts the family rooted at `root` to DOT format.
    ///
    /// Literal `2i - 1` is labelled `xi`, literal `2i` is labelled `¬xi`.
    pub fn to_dot(&self, root: ZbddId) -> Result<String, std::fmt::Error> {
        let config = DotConfig::default();
        let mut dot = String::new();
        writeln!(dot, "graph {{")?;
        writeln!(dot, "node [shape={}];", config.node_shape)?;
        writeln!(dot, "{{ rank=sink")?;
        writeln!(dot, "0 [shape={}, label=\"⊥\"];", config.terminal_shape)?;
        writeln!(dot, "1 [shape={}, label=\"⊤\"];", config.terminal_shape)?;
        writeln!(dot, "}}")?;

        let mut visited = std::collections::BTreeSet::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if id.is_terminal() || !visited.insert(id) {
                continue;
            }
            let node = self.node(id);
            let sign = if is_complement_literal(node.var) { "¬" } else { "" };
            writeln!(dot, "{} [label=\"{}x{}\"];", id.index(), sign, literal_level(node.var))?;
            writeln!(dot, "{} -- {} [style={}];", id.index(), node.hi.index(), config.high_edge_style)?;
            writeln!(dot, "{} -- {} [style={}];", id.index(), node.lo.index(), config.low_edge_style)?;
            stack.push(node.lo);
            stack.push(node.hi);
        }

        writeln!(dot, "r [shape={}, label=\"{}\"];", config.root_shape, root)?;
        writeln!(dot, "r -- {};", root.index())?;
        writeln!(dot, "}}")?;
        Ok(dot)
    }
}
