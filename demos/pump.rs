use clap::Parser;
use log::info;

use ftdd::analysis::Analysis;
use ftdd::ccf::{CcfGroup, CcfModel};
use ftdd::model::{Formula, Model, Substitution, Target};
use ftdd::settings::{Approximation, Settings, VariableOrdering};

#[derive(Debug, Parser)]
#[command(author, version)]
struct Cli {
    /// Number of redundant pump trains.
    #[arg(value_name = "INT", default_value = "3")]
    trains: usize,

    /// Number of trains that must fail for the system to fail.
    #[clap(long, value_name = "INT", default_value = "2")]
    k: usize,

    /// Maximum cut-set order.
    #[clap(long, value_name = "INT")]
    order: Option<usize>,

    /// Cut-off probability for cut sets.
    #[clap(long, value_name = "FLOAT")]
    cut_off: Option<f64>,

    /// Beta factor of a common-cause failure group over the pumps.
    #[clap(long, value_name = "FLOAT")]
    pump_beta: Option<f64>,

    /// Valves 1 and 2 are never out for maintenance together.
    #[clap(long)]
    exclusive_maintenance: bool,

    /// Order variables by declaration instead of depth-first.
    #[clap(long)]
    declaration_order: bool,

    /// Print the reduced graph in DOT format.
    #[clap(long)]
    dot: bool,
}

/// `trains` parallel trains of pump + motor + valve, feeding one header.
///
/// Closing valves 1 and 2 together also fails the system.
fn build_model(args: &Cli) -> color_eyre::Result<Model> {
    let mut model = Model::new();
    model.add_basic_event("Header", 1e-5)?;
    let pumps: Vec<String> = (1..=args.trains).map(|i| format!("Pump{}", i)).collect();
    match args.pump_beta {
        Some(beta) => {
            model.add_ccf_group(CcfGroup::new("Pumps", pumps.clone(), 3e-3, CcfModel::BetaFactor(beta)))?;
        }
        None => {
            for pump in &pumps {
                model.add_basic_event(pump, 3e-3)?;
            }
        }
    }
    let mut trains = vec![];
    for (i, pump) in (1..=args.trains).zip(pumps) {
        let motor = format!("Motor{}", i);
        let valve = format!("Valve{}", i);
        model.add_basic_event(&motor, 1e-3)?.add_basic_event(&valve, 5e-4)?;
        let train = format!("Train{}", i);
        model.add_gate(&train, Formula::or([pump, motor, valve]))?;
        trains.push(train);
    }
    model
        .add_gate("Trains", Formula::atleast(args.k, trains))?
        .add_gate("Valves", Formula::and(["Valve1", "Valve2"]))?
        .add_gate("TOP", Formula::or(["Trains", "Header", "Valves"]))?;

    if args.exclusive_maintenance {
        model.add_substitution(Substitution::new(
            "exclusive-maintenance",
            Formula::and(["Valve1", "Valve2"]),
            Target::Constant(false),
        ))?;
    }
    Ok(model)
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    simplelog::TermLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let time_total = std::time::Instant::now();

    let args = Cli::parse();
    println!("args = {:?}", args);

    let mut settings = Settings::default();
    if let Some(order) = args.order {
        settings.cut_set_order_limit(order)?;
    }
    if let Some(cut_off) = args.cut_off {
        settings.probability_truncation(cut_off)?;
    }
    if args.declaration_order {
        settings.variable_ordering = VariableOrdering::DeclarationOrder;
    }

    let model = build_model(&args)?;
    let mut analysis = Analysis::new(&model, "TOP", settings)?;
    if args.dot {
        println!("{}", analysis.pdag().to_dot()?);
    }

    let p = analysis.probability()?;
    println!("P(TOP) = {:.6e}", p);
    for approximation in [Approximation::RareEvent, Approximation::Mcub] {
        let q = analysis.approximate_probability(approximation)?;
        println!("P(TOP) ~ {:.6e} ({:?})", q, approximation);
    }

    let cut_sets = analysis.cut_sets()?;
    println!("{} minimal cut sets:", cut_sets.len());
    for cs in &cut_sets {
        println!("  {:.3e}  {}", cs.probability, cs);
    }
    for (order, count) in analysis.product_distribution()? {
        println!("order {}: {}", order, count);
    }

    println!("importance:");
    for factor in analysis.importance()? {
        println!(
            "  {:<8} occ={} MIF={:.3e} CIF={:.3e} DIF={:.3e} RAW={:.3} RRW={:.3}",
            factor.event,
            factor.occurrence,
            factor.factors.mif,
            factor.factors.cif,
            factor.factors.dif,
            factor.factors.raw,
            factor.factors.rrw
        );
    }

    info!("statistics = {:?}", analysis.statistics());
    let time_total = time_total.elapsed();
    println!("All done in {:.3} s", time_total.as_secs_f64());

    Ok(())
}
