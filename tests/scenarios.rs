//! End-to-end tests: model in, probability and cut sets out.
//!
//! Tests cover small reference trees, encoding invariants and limits.

use ftdd::analysis::{Analysis, CutSet};
use ftdd::bdd::Bdd;
use ftdd::ccf::{CcfGroup, CcfModel};
use ftdd::error::Error;
use ftdd::model::{Formula, Model, Substitution, Target};
use ftdd::pdag::Pdag;
use ftdd::settings::{Settings, VariableOrdering};
use ftdd::zbdd::Zbdd;
use test_log::test;

fn events(cut_sets: &[CutSet]) -> Vec<Vec<String>> {
    cut_sets.iter().map(|cs| cs.events()).collect()
}

/// top = OR(A, AND(B, C))
fn or_and() -> Model {
    let mut model = Model::new();
    model
        .add_basic_event("A", 0.1)
        .unwrap()
        .add_basic_event("B", 0.2)
        .unwrap()
        .add_basic_event("C", 0.3)
        .unwrap()
        .add_gate("BC", Formula::and(["B", "C"]))
        .unwrap()
        .add_gate("TOP", Formula::or(["A", "BC"]))
        .unwrap();
    model
}

fn assert_minimal(cut_sets: &[CutSet]) {
    for (i, a) in cut_sets.iter().enumerate() {
        for (j, b) in cut_sets.iter().enumerate() {
            if i != j {
                let subset = a.literals.iter().all(|l| b.literals.contains(l));
                assert!(!subset, "{} is contained in {}", a, b);
            }
        }
    }
}

// ─── Reference trees ───────────────────────────────────────────────────────────

#[test]
fn or_of_and() {
    let mut analysis = Analysis::new(&or_and(), "TOP", Settings::default()).unwrap();
    let p = analysis.probability().unwrap();
    assert!((p - 0.154).abs() < 1e-12);
    assert_eq!(events(&analysis.cut_sets().unwrap()), vec![vec!["A"], vec!["B", "C"]]);
}

#[test]
fn order_limit_one() {
    let settings = Settings::default().with_order_limit(1).unwrap();
    let mut analysis = Analysis::new(&or_and(), "TOP", settings).unwrap();
    assert_eq!(events(&analysis.cut_sets().unwrap()), vec![vec!["A"]]);
    // The exact probability ignores the order limit.
    assert!((analysis.probability().unwrap() - 0.154).abs() < 1e-12);
}

#[test]
fn two_out_of_three() {
    let mut model = Model::new();
    for id in ["A", "B", "C"] {
        model.add_basic_event(id, 0.1).unwrap();
    }
    model.add_gate("TOP", Formula::atleast(2, ["A", "B", "C"])).unwrap();

    let mut analysis = Analysis::new(&model, "TOP", Settings::default()).unwrap();
    assert_eq!(
        events(&analysis.cut_sets().unwrap()),
        vec![vec!["A", "B"], vec!["A", "C"], vec!["B", "C"]]
    );
    // 3 p^2 (1 - p) + p^3
    let p = analysis.probability().unwrap();
    assert!((p - 0.028).abs() < 1e-12);
}

#[test]
fn non_coherent_tree() {
    // TOP = OR(AND(A, ¬B), AND(B, C))
    let mut model = Model::new();
    model
        .add_basic_event("A", 0.5)
        .unwrap()
        .add_basic_event("B", 0.5)
        .unwrap()
        .add_basic_event("C", 0.5)
        .unwrap()
        .add_gate("G1", Formula::and(["A"]).arg_not("B"))
        .unwrap()
        .add_gate("G2", Formula::and(["B", "C"]))
        .unwrap()
        .add_gate("TOP", Formula::or(["G1", "G2"]))
        .unwrap();

    let mut analysis = Analysis::new(&model, "TOP", Settings::default()).unwrap();
    let cut_sets = analysis.cut_sets().unwrap();
    assert_eq!(events(&cut_sets), vec![vec!["A", "¬B"], vec!["B", "C"]]);
    assert!((analysis.probability().unwrap() - 0.5).abs() < 1e-12);
}

#[test]
fn house_events_fold() {
    let mut model = or_and();
    model
        .add_house_event("Maintenance", false)
        .unwrap()
        .add_gate("ROOT", Formula::and(["TOP", "Maintenance"]))
        .unwrap();
    let mut analysis = Analysis::new(&model, "ROOT", Settings::default()).unwrap();
    assert_eq!(analysis.probability().unwrap(), 0.0);
    assert!(analysis.cut_sets().unwrap().is_empty());
}

#[test]
fn delete_terms_substitution() {
    // Pumps A and B cannot fail together.
    let mut model = Model::new();
    model
        .add_basic_event("A", 0.1)
        .unwrap()
        .add_basic_event("B", 0.2)
        .unwrap()
        .add_basic_event("C", 0.3)
        .unwrap()
        .add_gate("AB", Formula::and(["A", "B"]))
        .unwrap()
        .add_gate("TOP", Formula::or(["AB", "C"]))
        .unwrap()
        .add_substitution(Substitution::new(
            "exclusive",
            Formula::and(["A", "B"]),
            Target::Constant(false),
        ))
        .unwrap();

    let mut analysis = Analysis::new(&model, "TOP", Settings::default()).unwrap();
    assert_eq!(events(&analysis.cut_sets().unwrap()), vec![vec!["C"]]);

    let mut settings = Settings::default();
    settings.enable_ccf_substitutions = false;
    let mut analysis = Analysis::new(&model, "TOP", settings).unwrap();
    assert_eq!(analysis.cut_sets().unwrap().len(), 2);
}

#[test]
fn atleast_hypothesis_deletes_terms() {
    let mut model = Model::new();
    for id in ["A", "B", "C"] {
        model.add_basic_event(id, 0.1).unwrap();
    }
    model
        .add_gate("AB", Formula::and(["A", "B"]))
        .unwrap()
        .add_gate("TOP", Formula::or(["AB", "C"]))
        .unwrap()
        .add_substitution(Substitution::new(
            "exclusive",
            Formula::atleast(2, ["A", "B"]),
            Target::Constant(false),
        ))
        .unwrap();

    let mut analysis = Analysis::new(&model, "TOP", Settings::default()).unwrap();
    let cut_sets: Vec<String> = analysis.cut_sets().unwrap().iter().map(|cs| cs.to_string()).collect();
    assert_eq!(cut_sets, ["{C}"]);
}

/// TOP = OR(AND(A, B, C), AND(B, C, D)), with `B & C` either inlined or shared.
fn two_trains(shared: bool) -> Model {
    let mut model = Model::new();
    for id in ["A", "B", "C", "D"] {
        model.add_basic_event(id, 0.1).unwrap();
    }
    if shared {
        model
            .add_gate("BC", Formula::and(["B", "C"]))
            .unwrap()
            .add_gate("G1", Formula::and(["A", "BC"]))
            .unwrap()
            .add_gate("G2", Formula::and(["BC", "D"]))
            .unwrap();
    } else {
        model
            .add_gate("G1", Formula::and(["A", "B", "C"]))
            .unwrap()
            .add_gate("G2", Formula::and(["B", "C", "D"]))
            .unwrap();
    }
    model
        .add_gate("TOP", Formula::or(["G1", "G2"]))
        .unwrap()
        .add_substitution(Substitution::new(
            "exclusive",
            Formula::and(["A", "B"]),
            Target::Constant(false),
        ))
        .unwrap();
    model
}

#[test]
fn delete_terms_ignore_nesting() {
    for shared in [false, true] {
        let mut analysis = Analysis::new(&two_trains(shared), "TOP", Settings::default()).unwrap();
        assert_eq!(events(&analysis.cut_sets().unwrap()), vec![vec!["B", "C", "D"]], "shared = {}", shared);
        assert!((analysis.probability().unwrap() - 1e-3).abs() < 1e-12);
    }
}

#[test]
fn delete_terms_across_gates() {
    // {A, B} only appears once OR(B, C) is multiplied out.
    let mut model = Model::new();
    for id in ["A", "B", "C"] {
        model.add_basic_event(id, 0.1).unwrap();
    }
    model
        .add_gate("BC", Formula::or(["B", "C"]))
        .unwrap()
        .add_gate("TOP", Formula::and(["A", "BC"]))
        .unwrap()
        .add_substitution(Substitution::new(
            "exclusive",
            Formula::and(["A", "B"]),
            Target::Constant(false),
        ))
        .unwrap();

    let mut analysis = Analysis::new(&model, "TOP", Settings::default()).unwrap();
    assert_eq!(events(&analysis.cut_sets().unwrap()), vec![vec!["A", "C"]]);
}

#[test]
fn beta_factor_group() {
    let mut model = Model::new();
    model
        .add_ccf_group(CcfGroup::new("pumps", ["A", "B", "C"], 0.01, CcfModel::BetaFactor(0.1)))
        .unwrap()
        .add_gate("TOP", Formula::atleast(2, ["A", "B", "C"]))
        .unwrap();

    let mut analysis = Analysis::new(&model, "TOP", Settings::default()).unwrap();
    assert_eq!(
        events(&analysis.cut_sets().unwrap()),
        vec![
            vec!["[A B C]"],
            vec!["[A]", "[B]"],
            vec!["[A]", "[C]"],
            vec!["[B]", "[C]"],
        ]
    );
    let (q, c) = (0.009, 0.001);
    let independent = 3.0 * q * q * (1.0 - q) + q * q * q;
    let p = analysis.probability().unwrap();
    assert!((p - (c + (1.0 - c) * independent)).abs() < 1e-12);

    // Without expansion the members are plain events of probability Q.
    let mut settings = Settings::default();
    settings.enable_ccf_substitutions = false;
    let mut analysis = Analysis::new(&model, "TOP", settings).unwrap();
    assert_eq!(analysis.cut_sets().unwrap().len(), 3);
    assert!((analysis.probability().unwrap() - 0.000298).abs() < 1e-12);
}

// ─── Encoding invariants ───────────────────────────────────────────────────────

#[test]
fn encoding_is_canonical() {
    let model = or_and();
    let settings = Settings::default();
    let mut pdag = Pdag::build(&model, "TOP", &settings).unwrap();
    pdag.reduce(&settings).unwrap();

    let bdd = Bdd::default();
    assert_eq!(bdd.encode(&pdag).unwrap(), bdd.encode(&pdag).unwrap());
    let zbdd = Zbdd::default();
    assert_eq!(zbdd.encode(&pdag, None).unwrap(), zbdd.encode(&pdag, None).unwrap());
}

#[test]
fn and_commutes() {
    let mut model = Model::new();
    model
        .add_basic_event("A", 0.1)
        .unwrap()
        .add_basic_event("B", 0.2)
        .unwrap()
        .add_gate("AB", Formula::and(["A", "B"]))
        .unwrap()
        .add_gate("BA", Formula::and(["B", "A"]))
        .unwrap();
    let settings = Settings::default().with_ordering(VariableOrdering::DeclarationOrder);
    let ab = Pdag::build(&model, "AB", &settings).unwrap();
    let ba = Pdag::build(&model, "BA", &settings).unwrap();

    let bdd = Bdd::default();
    assert_eq!(bdd.encode(&ab).unwrap(), bdd.encode(&ba).unwrap());
    let zbdd = Zbdd::default();
    assert_eq!(zbdd.encode(&ab, None).unwrap(), zbdd.encode(&ba, None).unwrap());
}

#[test]
fn idempotence_and_double_negation() {
    let mut model = Model::new();
    model
        .add_basic_event("A", 0.25)
        .unwrap()
        .add_gate("AA", Formula::and(["A"]).arg_not("N"))
        .unwrap()
        .add_gate("N", Formula::not("A"))
        .unwrap()
        .add_gate("NN", Formula::not("N"))
        .unwrap()
        .add_gate("TOP", Formula::or(["NN"]))
        .unwrap();

    let mut analysis = Analysis::new(&model, "TOP", Settings::default()).unwrap();
    assert_eq!(events(&analysis.cut_sets().unwrap()), vec![vec!["A"]]);
    assert!((analysis.probability().unwrap() - 0.25).abs() < 1e-12);

    // AND(A, ¬¬A) is A
    let mut analysis = Analysis::new(&model, "AA", Settings::default()).unwrap();
    assert_eq!(events(&analysis.cut_sets().unwrap()), vec![vec!["A"]]);
}

#[test]
fn cut_sets_are_minimal() {
    // TOP = OR(A, AND(A, B), AND(B, C), AND(A, B, C))
    let mut model = Model::new();
    for (id, p) in [("A", 0.1), ("B", 0.2), ("C", 0.3)] {
        model.add_basic_event(id, p).unwrap();
    }
    model
        .add_gate("AB", Formula::and(["A", "B"]))
        .unwrap()
        .add_gate("BC", Formula::and(["B", "C"]))
        .unwrap()
        .add_gate("ABC", Formula::and(["A", "B", "C"]))
        .unwrap()
        .add_gate("TOP", Formula::or(["A", "AB", "BC", "ABC"]))
        .unwrap();

    let mut analysis = Analysis::new(&model, "TOP", Settings::default()).unwrap();
    let cut_sets = analysis.cut_sets().unwrap();
    assert_minimal(&cut_sets);
    assert_eq!(events(&cut_sets), vec![vec!["A"], vec!["B", "C"]]);
}

#[test]
fn probability_in_unit_interval() {
    let mut model = Model::new();
    let ids = ["E1", "E2", "E3", "E4", "E5"];
    for (i, id) in ids.iter().enumerate() {
        model.add_basic_event(*id, 0.15 * (i + 1) as f64).unwrap();
    }
    model
        .add_gate("G1", Formula::atleast(3, ids))
        .unwrap()
        .add_gate("G2", Formula::xor("E1", "E5"))
        .unwrap()
        .add_gate("G3", Formula::or(["G2", "E3"]).arg_not("G1"))
        .unwrap()
        .add_gate("TOP", Formula::and(["G1", "G3"]))
        .unwrap();

    let mut analysis = Analysis::new(&model, "TOP", Settings::default()).unwrap();
    let p = analysis.probability().unwrap();
    assert!((0.0..=1.0).contains(&p));
    assert_minimal(&analysis.cut_sets().unwrap());
}

// ─── Limits and errors ─────────────────────────────────────────────────────────

#[test]
fn node_limit_aborts() {
    let mut settings = Settings::default();
    settings.node_limit = Some(2);
    let mut analysis = Analysis::new(&or_and(), "TOP", settings).unwrap();
    let err = analysis.probability().unwrap_err();
    assert!(matches!(err, Error::ResourceLimit { what: "BDD nodes", limit: 2 }));
}

#[test]
fn explicit_stack_agrees() {
    let mut settings = Settings::default();
    settings.explicit_stack = true;
    let mut analysis = Analysis::new(&or_and(), "TOP", settings.clone()).unwrap();
    assert!((analysis.probability().unwrap() - 0.154).abs() < 1e-12);
    assert_eq!(events(&analysis.cut_sets().unwrap()), vec![vec!["A"], vec!["B", "C"]]);

    let model = voting(10, 4);
    let mut recursive = Analysis::new(&model, "TOP", Settings::default()).unwrap();
    let mut iterative = Analysis::new(&model, "TOP", settings).unwrap();
    assert_eq!(events(&recursive.cut_sets().unwrap()), events(&iterative.cut_sets().unwrap()));
    assert_eq!(recursive.zbdd().node_count(), iterative.zbdd().node_count());
}

/// TOP = OR(ATLEAST(k; B1..Bn), C1, C2)
fn voting(n: usize, k: usize) -> Model {
    let mut model = Model::new();
    let voters: Vec<String> = (1..=n).map(|i| format!("B{}", i)).collect();
    for id in &voters {
        model.add_basic_event(id, 0.01).unwrap();
    }
    model
        .add_basic_event("C1", 0.1)
        .unwrap()
        .add_basic_event("C2", 0.1)
        .unwrap()
        .add_gate("VOTE", Formula::atleast(k, voters))
        .unwrap()
        .add_gate("C", Formula::or(["C1", "C2"]))
        .unwrap()
        .add_gate("TOP", Formula::or(["VOTE", "C"]))
        .unwrap();
    model
}

#[test]
fn retry_after_node_limit() {
    let model = voting(10, 4);
    let mut fresh = Analysis::new(&model, "TOP", Settings::default()).unwrap();
    let singles = events(&fresh.cut_sets_with_limit(1).unwrap());
    assert_eq!(singles, vec![vec!["C1"], vec!["C2"]]);
    let nodes = fresh.zbdd().node_count();

    let mut settings = Settings::default();
    settings.node_limit = Some(nodes + 5);
    let mut analysis = Analysis::new(&model, "TOP", settings).unwrap();
    let err = analysis.cut_sets().unwrap_err();
    assert!(matches!(err, Error::ResourceLimit { what: "ZBDD nodes", .. }));
    assert!(err.is_retryable());

    // The failed run left nothing behind, so the smaller run fits.
    assert_eq!(events(&analysis.cut_sets_with_limit(1).unwrap()), singles);
    assert_eq!(analysis.zbdd().node_count(), nodes);
}

#[test]
fn truncation_drops_unlikely_sets() {
    let mut settings = Settings::default();
    settings.probability_truncation(0.07).unwrap();
    let mut analysis = Analysis::new(&or_and(), "TOP", settings).unwrap();
    assert_eq!(events(&analysis.cut_sets().unwrap()), vec![vec!["A"]]);
}

#[test]
fn cycle_is_rejected() {
    let mut model = Model::new();
    model
        .add_basic_event("A", 0.1)
        .unwrap()
        .add_gate("G1", Formula::or(["A", "G2"]))
        .unwrap()
        .add_gate("G2", Formula::and(["A", "G1"]))
        .unwrap();
    let err = Analysis::new(&model, "G1", Settings::default()).err().unwrap();
    assert!(matches!(err, Error::Validation { .. }));
}
