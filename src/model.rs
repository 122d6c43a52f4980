//! The validated fault-tree model consumed by the graph builder.
//!
//! Loading a model from a file is somebody else's job: this module only
//! holds the fully resolved events, gates and substitutions, and rejects
//! obviously broken input at insertion time.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use crate::ccf::{CcfEvent, CcfGroup};
use crate::error::{check_probability, Error, Result};

/// Gate connectives accepted in the model.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Connective {
    And,
    Or,
    /// At least `k` of the arguments.
    AtLeast(usize),
    /// Exclusive OR of exactly two arguments.
    Xor,
    Not,
    Nand,
    Nor,
    /// Single argument pass-through.
    Null,
}

impl Display for Connective {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Connective::And => write!(f, "and"),
            Connective::Or => write!(f, "or"),
            Connective::AtLeast(k) => write!(f, "atleast({})", k),
            Connective::Xor => write!(f, "xor"),
            Connective::Not => write!(f, "not"),
            Connective::Nand => write!(f, "nand"),
            Connective::Nor => write!(f, "nor"),
            Connective::Null => write!(f, "null"),
        }
    }
}

/// A reference to an event by id, possibly complemented.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Operand {
    pub id: String,
    pub complement: bool,
}

/// A flat Boolean formula over event ids.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    pub connective: Connective,
    pub args: Vec<Operand>,
}

impl Formula {
    pub fn new<S: Into<String>>(connective: Connective, args: impl IntoIterator<Item = S>) -> Self {
        let args = args
            .into_iter()
            .map(|id| Operand {
                id: id.into(),
                complement: false,
            })
            .collect();
        Self { connective, args }
    }

    pub fn and<S: Into<String>>(args: impl IntoIterator<Item = S>) -> Self {
        Self::new(Connective::And, args)
    }

    pub fn or<S: Into<String>>(args: impl IntoIterator<Item = S>) -> Self {
        Self::new(Connective::Or, args)
    }

    pub fn atleast<S: Into<String>>(k: usize, args: impl IntoIterator<Item = S>) -> Self {
        Self::new(Connective::AtLeast(k), args)
    }

    pub fn xor(a: impl Into<String>, b: impl Into<String>) -> Self {
        Self::new(Connective::Xor, [a.into(), b.into()])
    }

    pub fn not(a: impl Into<String>) -> Self {
        Self::new(Connective::Not, [a.into()])
    }

    pub fn null(a: impl Into<String>) -> Self {
        Self::new(Connective::Null, [a.into()])
    }

    /// Appends a complemented argument.
    pub fn arg_not(mut self, id: impl Into<String>) -> Self {
        self.args.push(Operand {
            id: id.into(),
            complement: true,
        });
        self
    }

    fn check_arity(&self, owner: &str) -> Result<()> {
        for (i, a) in self.args.iter().enumerate() {
            if self.args[..i].iter().any(|b| b.id == a.id) {
                return Err(Error::validation(
                    owner,
                    format!("duplicate argument '{}'", a.id),
                ));
            }
        }
        let n = self.args.len();
        match self.connective {
            Connective::Not | Connective::Null if n != 1 => Err(Error::validation(
                owner,
                format!("'{}' requires exactly one argument, got {}", self.connective, n),
            )),
            Connective::Xor if n != 2 => Err(Error::validation(
                owner,
                format!("'xor' requires exactly two arguments, got {}", n),
            )),
            Connective::AtLeast(k) if k < 1 || k > n => Err(Error::arithmetic(format!(
                "'{}' is undefined for {} arguments in '{}'",
                self.connective, n, owner
            ))),
            _ if n == 0 => Err(Error::validation(owner, "formula has no arguments")),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BasicEvent {
    pub id: String,
    pub probability: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HouseEvent {
    pub id: String,
    pub state: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Gate {
    pub id: String,
    pub formula: Formula,
}

/// What a substitution puts in place of its hypothesis (or source events).
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Event(String),
    Gate(String),
    Constant(bool),
}

/// Traditional substitution flavours.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SubstitutionKind {
    DeleteTerms,
    RecoveryRule,
    ExchangeEvent,
}

/// A declared replacement of a hypothesis sub-formula, used for common-cause
/// and recovery modelling.
#[derive(Debug, Clone, PartialEq)]
pub struct Substitution {
    pub id: String,
    pub hypothesis: Formula,
    pub source: Vec<String>,
    pub target: Target,
}

impl Substitution {
    pub fn new(id: impl Into<String>, hypothesis: Formula, target: Target) -> Self {
        Self {
            id: id.into(),
            hypothesis,
            source: Vec::new(),
            target,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source.push(source.into());
        self
    }

    /// A substitution without source events.
    pub fn is_declarative(&self) -> bool {
        self.source.is_empty()
    }

    /// Checks the substitution on its own, without looking at the model.
    pub fn validate(&self) -> Result<()> {
        self.hypothesis.check_arity(&self.id)?;
        if self.hypothesis.args.iter().any(|a| a.complement) {
            return Err(Error::validation(
                &self.id,
                "substitution hypothesis formula cannot be nested",
            ));
        }
        for (i, s) in self.source.iter().enumerate() {
            if self.source[..i].contains(s) {
                return Err(Error::validation(
                    &self.id,
                    format!("duplicate source event '{}'", s),
                ));
            }
        }
        let connective = self.hypothesis.connective;
        if self.is_declarative() {
            if !matches!(
                connective,
                Connective::Null | Connective::And | Connective::AtLeast(_) | Connective::Or
            ) {
                return Err(Error::validation(
                    &self.id,
                    "substitution hypotheses must be coherent",
                ));
            }
            if self.target == Target::Constant(true) {
                return Err(Error::validation(&self.id, "substitution has no effect"));
            }
        } else {
            if !matches!(connective, Connective::Null | Connective::And | Connective::Or) {
                return Err(Error::validation(
                    &self.id,
                    "non-declarative substitution hypotheses only allow and/or/null connectives",
                ));
            }
            if self.target == Target::Constant(false) {
                return Err(Error::validation(
                    &self.id,
                    "substitution source set is irrelevant",
                ));
            }
        }
        Ok(())
    }

    /// The equivalent traditional substitution type, if any.
    pub fn kind(&self) -> Option<SubstitutionKind> {
        let in_hypothesis = |id: &String| self.hypothesis.args.iter().any(|a| &a.id == id);
        let connective = self.hypothesis.connective;
        let n = self.hypothesis.args.len();

        if self.source.is_empty() {
            return match &self.target {
                Target::Constant(false) => match connective {
                    Connective::AtLeast(2) | Connective::And if n == 2 => {
                        Some(SubstitutionKind::DeleteTerms)
                    }
                    _ => None,
                },
                Target::Event(_) if connective == Connective::And => {
                    Some(SubstitutionKind::RecoveryRule)
                }
                _ => None,
            };
        }
        if !matches!(self.target, Target::Event(_)) {
            return None;
        }
        if !matches!(connective, Connective::And | Connective::Null) {
            return None;
        }
        if self.source.len() == n && self.source.iter().all(in_hypothesis) {
            Some(SubstitutionKind::RecoveryRule)
        } else if self.source.len() == 1 && in_hypothesis(&self.source[0]) {
            Some(SubstitutionKind::ExchangeEvent)
        } else {
            None
        }
    }
}

/// Where an id lives inside the model.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum EventRef {
    Basic(usize),
    House(usize),
    Gate(usize),
}

/// A fully resolved fault-tree model.
#[derive(Debug, Clone, Default)]
pub struct Model {
    basic_events: Vec<BasicEvent>,
    house_events: Vec<HouseEvent>,
    gates: Vec<Gate>,
    substitutions: Vec<Substitution>,
    index: HashMap<String, EventRef>,
    ccf_groups: Vec<CcfGroup>,
    ccf_events: Vec<CcfEvent>,
    /// CCF event id to its position in `ccf_events`.
    ccf_index: HashMap<String, usize>,
    /// Group member to the CCF events that fail it.
    ccf_members: HashMap<String, Vec<usize>>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn basic_events(&self) -> &[BasicEvent] {
        &self.basic_events
    }
    pub fn house_events(&self) -> &[HouseEvent] {
        &self.house_events
    }
    pub fn gates(&self) -> &[Gate] {
        &self.gates
    }
    pub fn substitutions(&self) -> &[Substitution] {
        &self.substitutions
    }

    pub fn ccf_groups(&self) -> &[CcfGroup] {
        &self.ccf_groups
    }

    /// CCF events containing `member`, or `None` if it is in no group.
    pub fn ccf_events_of(&self, member: &str) -> Option<impl Iterator<Item = &CcfEvent>> {
        let indices = self.ccf_members.get(member)?;
        Some(indices.iter().map(|&i| &self.ccf_events[i]))
    }

    pub fn ccf_event(&self, id: &str) -> Option<&CcfEvent> {
        self.ccf_index.get(id).map(|&i| &self.ccf_events[i])
    }

    pub fn lookup(&self, id: &str) -> Option<EventRef> {
        self.index.get(id).copied()
    }

    pub fn gate(&self, id: &str) -> Option<&Gate> {
        match self.lookup(id)? {
            EventRef::Gate(i) => Some(&self.gates[i]),
            _ => None,
        }
    }

    fn register(&mut self, id: &str, r: EventRef) -> Result<()> {
        if self.index.contains_key(id) {
            return Err(Error::validation(id, "duplicate event id"));
        }
        self.index.insert(id.to_string(), r);
        Ok(())
    }

    pub fn add_basic_event(&mut self, id: impl Into<String>, probability: f64) -> Result<&mut Self> {
        let id = id.into();
        check_probability(&format!("P({})", id), probability)?;
        self.register(&id, EventRef::Basic(self.basic_events.len()))?;
        self.basic_events.push(BasicEvent { id, probability });
        Ok(self)
    }

    pub fn add_house_event(&mut self, id: impl Into<String>, state: bool) -> Result<&mut Self> {
        let id = id.into();
        self.register(&id, EventRef::House(self.house_events.len()))?;
        self.house_events.push(HouseEvent { id, state });
        Ok(self)
    }

    /// Adds a gate. Arguments may refer to events declared later.
    pub fn add_gate(&mut self, id: impl Into<String>, formula: Formula) -> Result<&mut Self> {
        let id = id.into();
        formula.check_arity(&id)?;
        self.register(&id, EventRef::Gate(self.gates.len()))?;
        self.gates.push(Gate { id, formula });
        Ok(self)
    }

    /// Adds a substitution whose hypothesis and source events must already be
    /// declared basic events.
    pub fn add_substitution(&mut self, substitution: Substitution) -> Result<&mut Self> {
        substitution.validate()?;
        let events = substitution
            .hypothesis
            .args
            .iter()
            .map(|a| &a.id)
            .chain(substitution.source.iter());
        for id in events {
            match self.lookup(id) {
                Some(EventRef::Basic(_)) => {}
                Some(_) => {
                    return Err(Error::validation(
                        &substitution.id,
                        format!("'{}' is not a basic event", id),
                    ))
                }
                None => {
                    return Err(Error::validation(
                        &substitution.id,
                        format!("undefined event '{}'", id),
                    ))
                }
            }
        }
        if let Target::Event(id) = &substitution.target {
            if !matches!(self.lookup(id), Some(EventRef::Basic(_))) {
                return Err(Error::validation(
                    &substitution.id,
                    format!("target '{}' is not a basic event", id),
                ));
            }
        }
        if let Target::Gate(id) = &substitution.target {
            if self.gate(id).is_none() {
                return Err(Error::validation(
                    &substitution.id,
                    format!("target '{}' is not a gate", id),
                ));
            }
        }
        if !substitution.is_declarative() {
            self.check_non_declarative(&substitution)?;
        }
        self.substitutions.push(substitution);
        Ok(self)
    }

    /// Non-declarative substitutions must not feed each other and must stay
    /// away from CCF groups.
    fn check_non_declarative(&self, substitution: &Substitution) -> Result<()> {
        let target = match &substitution.target {
            Target::Event(id) => Some(id.as_str()),
            _ => None,
        };
        let in_ccf = |id: &str| self.ccf_members.contains_key(id);
        if substitution.hypothesis.args.iter().any(|a| in_ccf(a.id.as_str()))
            || substitution.source.iter().any(|id| in_ccf(id.as_str()))
            || target.map_or(false, in_ccf)
        {
            return Err(Error::validation(
                &substitution.id,
                "non-declarative substitution events cannot be in a CCF group",
            ));
        }
        if let Some(t) = target {
            if substitution.source.iter().any(|s| s == t) {
                return Err(Error::validation(&substitution.id, TARGET_IN_SOURCE));
            }
        }
        for other in self.substitutions.iter().filter(|s| !s.is_declarative()) {
            for (origin, other) in [(substitution, other), (other, substitution)] {
                if let Some(reason) = conflict(origin, other) {
                    return Err(Error::validation(&origin.id, reason));
                }
            }
        }
        Ok(())
    }

    /// Adds a CCF group, declaring its members as basic events with the
    /// group probability.
    pub fn add_ccf_group(&mut self, group: CcfGroup) -> Result<&mut Self> {
        if self.ccf_groups.iter().any(|g| g.id == group.id) {
            return Err(Error::validation(&group.id, "duplicate CCF group id"));
        }
        let events = group.events()?;
        for member in &group.members {
            if self.index.contains_key(member) {
                return Err(Error::validation(
                    &group.id,
                    format!("member '{}' is already declared", member),
                ));
            }
        }
        for member in &group.members {
            self.add_basic_event(member.as_str(), group.probability)?;
        }
        for event in events {
            let i = self.ccf_events.len();
            for member in &event.members {
                self.ccf_members.entry(member.clone()).or_default().push(i);
            }
            self.ccf_index.insert(event.id.clone(), i);
            self.ccf_events.push(event);
        }
        self.ccf_groups.push(group);
        Ok(self)
    }
}

const TARGET_IN_SOURCE: &str = "non-declarative substitution target event should not appear in any substitution source";

/// Why `origin` cannot coexist with another non-declarative substitution.
fn conflict(origin: &Substitution, other: &Substitution) -> Option<&'static str> {
    let in_hypothesis = |id: &String| other.hypothesis.args.iter().any(|a| &a.id == id);
    if let Target::Event(t) = &origin.target {
        if other.source.contains(t) {
            return Some(TARGET_IN_SOURCE);
        }
        if in_hypothesis(t) {
            return Some("non-declarative substitution target event should not appear in another substitution hypothesis");
        }
    }
    if origin.source.iter().any(in_hypothesis) {
        return Some("non-declarative substitution source event should not appear in another substitution hypothesis");
    }
    None
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::ccf::CcfModel;

    #[test]
    fn test_duplicate_ids() {
        let mut model = Model::new();
        model.add_basic_event("A", 0.1).unwrap();
        assert!(model.add_basic_event("A", 0.2).is_err());
        assert!(model.add_house_event("A", true).is_err());
        assert!(model.add_gate("A", Formula::null("B")).is_err());
    }

    #[test]
    fn test_bad_probability() {
        let mut model = Model::new();
        let err = model.add_basic_event("A", 1.5).unwrap_err();
        assert!(matches!(err, Error::Arithmetic { .. }));
    }

    #[test]
    fn test_arity() {
        let mut model = Model::new();
        assert!(model.add_gate("G1", Formula::new(Connective::Not, ["A", "B"])).is_err());
        assert!(model.add_gate("G2", Formula::new(Connective::Xor, ["A"])).is_err());
        assert!(model.add_gate("G3", Formula::or(Vec::<String>::new())).is_err());
        let err = model.add_gate("G4", Formula::atleast(3, ["A", "B"])).unwrap_err();
        assert!(matches!(err, Error::Arithmetic { .. }));
        assert!(model.add_gate("G5", Formula::atleast(2, ["A", "B", "C"])).is_ok());
        assert!(model.add_gate("G6", Formula::and(["A"]).arg_not("A")).is_err());
    }

    #[test]
    fn test_substitution_validation() {
        let declarative_true = Substitution::new("S", Formula::and(["A", "B"]), Target::Constant(true));
        assert!(declarative_true.validate().is_err());

        let non_coherent = Substitution::new("S", Formula::xor("A", "B"), Target::Constant(false));
        assert!(non_coherent.validate().is_err());

        let irrelevant =
            Substitution::new("S", Formula::and(["A", "B"]), Target::Constant(false)).with_source("A");
        assert!(irrelevant.validate().is_err());

        let duplicate = Substitution::new("S", Formula::and(["A", "B"]), Target::Event("R".into()))
            .with_source("A")
            .with_source("A");
        assert!(duplicate.validate().is_err());

        let nested = Substitution::new("S", Formula::and(["A"]).arg_not("B"), Target::Constant(false));
        assert!(nested.validate().is_err());
    }

    #[test]
    fn test_substitution_kind() {
        let delete = Substitution::new("S", Formula::and(["A", "B"]), Target::Constant(false));
        assert_eq!(delete.kind(), Some(SubstitutionKind::DeleteTerms));

        let recovery = Substitution::new("S", Formula::and(["A", "B"]), Target::Event("R".into()));
        assert_eq!(recovery.kind(), Some(SubstitutionKind::RecoveryRule));

        let recovery = Substitution::new("S", Formula::and(["A", "B"]), Target::Event("R".into()))
            .with_source("A")
            .with_source("B");
        assert_eq!(recovery.kind(), Some(SubstitutionKind::RecoveryRule));

        let exchange = Substitution::new("S", Formula::and(["A", "B"]), Target::Event("R".into()))
            .with_source("A");
        assert_eq!(exchange.kind(), Some(SubstitutionKind::ExchangeEvent));

        let other = Substitution::new("S", Formula::or(["A", "B"]), Target::Constant(false));
        assert_eq!(other.kind(), None);
    }

    #[test]
    fn test_add_substitution_checks_events() {
        let mut model = Model::new();
        model.add_basic_event("A", 0.1).unwrap();
        model.add_house_event("H", true).unwrap();
        let s = Substitution::new("S1", Formula::and(["A", "B"]), Target::Constant(false));
        assert!(model.add_substitution(s).is_err());
        let s = Substitution::new("S2", Formula::and(["A", "H"]), Target::Constant(false));
        assert!(model.add_substitution(s).is_err());
        model.add_basic_event("B", 0.1).unwrap();
        let s = Substitution::new("S3", Formula::and(["A", "B"]), Target::Constant(false));
        assert!(model.add_substitution(s).is_ok());
        assert_eq!(model.substitutions().len(), 1);
    }

    fn exchange(id: &str, hypothesis: [&str; 2], source: &str, target: &str) -> Substitution {
        Substitution::new(id, Formula::and(hypothesis), Target::Event(target.into())).with_source(source)
    }

    #[test]
    fn test_substitution_conflicts() {
        let mut model = Model::new();
        for id in ["A", "B", "C", "D", "R", "S"] {
            model.add_basic_event(id, 0.1).unwrap();
        }
        model.add_substitution(exchange("S1", ["A", "B"], "A", "R")).unwrap();

        // R is produced by S1, so it cannot be consumed by another rule.
        let err = model.add_substitution(exchange("S2", ["R", "C"], "C", "S")).unwrap_err();
        assert!(matches!(err, Error::Validation { ref node, ref reason }
            if node == "S1" && reason.contains("another substitution hypothesis")));

        let err = model.add_substitution(exchange("S3", ["C", "D"], "R", "S")).unwrap_err();
        assert!(matches!(err, Error::Validation { ref node, .. } if node == "S1"));

        // S4 replaces A, which S1 still has to match.
        let err = model.add_substitution(exchange("S4", ["A", "C"], "A", "S")).unwrap_err();
        assert!(matches!(err, Error::Validation { ref node, ref reason }
            if node == "S4" && reason.contains("source event")));

        let err = model.add_substitution(exchange("S5", ["C", "D"], "C", "C")).unwrap_err();
        assert!(matches!(err, Error::Validation { ref node, .. } if node == "S5"));

        // Independent rules and declarative ones are fine.
        model.add_substitution(exchange("S6", ["C", "D"], "C", "S")).unwrap();
        model
            .add_substitution(Substitution::new("S7", Formula::and(["R", "S"]), Target::Constant(false)))
            .unwrap();
        assert_eq!(model.substitutions().len(), 3);
    }

    #[test]
    fn test_ccf_group_members() {
        let mut model = Model::new();
        let group = CcfGroup::new("pumps", ["A", "B"], 0.01, CcfModel::BetaFactor(0.1));
        model.add_ccf_group(group.clone()).unwrap();
        assert_eq!(model.lookup("A"), Some(EventRef::Basic(0)));
        assert_eq!(model.basic_events()[1].probability, 0.01);
        let ids: Vec<&str> = model.ccf_events_of("B").unwrap().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["[B]", "[A B]"]);
        assert!(model.ccf_event("[A B]").is_some());
        assert!(model.ccf_events_of("C").is_none());

        // Members and group ids are unique.
        assert!(model.add_ccf_group(group).is_err());
        let overlap = CcfGroup::new("valves", ["B", "C"], 0.01, CcfModel::BetaFactor(0.1));
        assert!(model.add_ccf_group(overlap).is_err());

        model.add_basic_event("R", 0.1).unwrap();
        let err = model.add_substitution(exchange("S", ["A", "R"], "R", "R")).unwrap_err();
        assert!(matches!(err, Error::Validation { ref reason, .. } if reason.contains("CCF group")));
        let declarative = Substitution::new("D", Formula::and(["A", "B"]), Target::Constant(false));
        assert!(model.add_substitution(declarative).is_ok());
    }
}
