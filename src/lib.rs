//! # ftdd: fault-tree analysis with decision diagrams
//!
//! **`ftdd`** turns a fault tree into a propositional directed acyclic graph
//! (PDAG), simplifies it, and analyses it with two kinds of decision diagrams:
//!
//! - a **BDD** with complement edges for the exact top-event probability and
//!   importance factors;
//! - a **ZBDD** over signed literals for minimal cut sets.
//!
//! ## Pipeline
//!
//! 1. A [`Model`][crate::model::Model] declares basic events, house events,
//!    gates, common-cause failure groups and substitutions.
//! 2. [`Pdag::build`][crate::pdag::Pdag::build] resolves the tree below a top
//!    gate, fixes the variable order, folds house events and expands CCF
//!    group members into their CCF events.
//! 3. [`Pdag::reduce`][crate::pdag::Pdag::reduce] normalizes gates, propagates
//!    constants, applies substitutions, coalesces and merges gates.
//! 4. [`Bdd::encode`][crate::bdd::Bdd::encode] and
//!    [`Zbdd::encode`][crate::zbdd::Zbdd::encode] map every graph node once.
//!
//! The [`Analysis`][crate::analysis::Analysis] context runs all of it:
//!
//! ```rust
//! use ftdd::analysis::Analysis;
//! use ftdd::model::{Formula, Model};
//! use ftdd::settings::Settings;
//!
//! let mut model = Model::new();
//! model
//!     .add_basic_event("PumpA", 0.01)?
//!     .add_basic_event("PumpB", 0.01)?
//!     .add_basic_event("Valve", 0.001)?
//!     .add_gate("Pumps", Formula::and(["PumpA", "PumpB"]))?
//!     .add_gate("TOP", Formula::or(["Pumps", "Valve"]))?;
//!
//! let mut analysis = Analysis::new(&model, "TOP", Settings::default())?;
//! let p = analysis.probability()?;
//! assert!((p - (1.0 - 0.999 * (1.0 - 0.0001))).abs() < 1e-12);
//!
//! let cut_sets = analysis.cut_sets()?;
//! assert_eq!(cut_sets[0].to_string(), "{Valve}");
//! assert_eq!(cut_sets[1].to_string(), "{PumpA, PumpB}");
//! # Ok::<(), ftdd::error::Error>(())
//! ```
//!
//! ## Core Components
//!
//! - **[`model`]** and **[`ccf`]**: the fault-tree model and its CCF groups.
//! - **[`pdag`]** and **[`reduce`]**: the Boolean graph and its simplification.
//! - **[`bdd`]**: the BDD manager, ITE, probability and importance.
//! - **[`zbdd`]**: the ZBDD manager, minimal products and cut-set extraction.
//! - **[`analysis`]**: one analysis context owning both managers.
//! - **[`dot`]**: Graphviz export.
//!
//! Managers use interior mutability and are not `Sync`. Run concurrent
//! analyses on separate [`Analysis`][crate::analysis::Analysis] values.

pub mod analysis;
pub mod bdd;
pub mod cache;
pub mod ccf;
pub mod dot;
pub mod error;
pub mod model;
pub mod pdag;
pub mod reduce;
pub mod reference;
pub mod settings;
pub mod unique;
pub mod zbdd;
