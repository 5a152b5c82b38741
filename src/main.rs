use anyhow::Result;
use bess_scheduler::{
    load_price_table, trace_writer, BatteryConfig, Formulation, RollingConfig, RollingScheduler,
    SolveSettings,
};
use clap::{Parser, ValueEnum};
use log::info;

#[derive(Parser)]
#[command(name = "bess_scheduler")]
#[command(about = "Optimal multi-market dispatch schedule for a grid-connected battery")]
struct Args {
    /// Price table CSV (timestamp plus one column per product)
    #[arg(short, long)]
    input: String,

    /// Trace output file (stdout when omitted)
    #[arg(short, long)]
    output: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "csv")]
    format: OutputFormat,

    /// Minimum state of charge (fraction of rated capacity)
    #[arg(long, default_value = "0.2")]
    soc_min: f64,

    /// Maximum state of charge (fraction of rated capacity)
    #[arg(long, default_value = "0.95")]
    soc_cap: f64,

    /// State of charge entering the first horizon
    #[arg(long, default_value = "0.25")]
    initial_soc: f64,

    /// Round-trip efficiency (0-1)
    #[arg(short, long, default_value = "0.85")]
    efficiency: f64,

    /// Battery duration rating in minutes
    #[arg(long, default_value = "360")]
    duration_minutes: u32,

    /// Base slot length in minutes
    #[arg(long, default_value = "5")]
    slot_minutes: u32,

    /// Aggregate slots into coarse evaluation intervals of this many minutes
    #[arg(long)]
    chunk_minutes: Option<u32>,

    /// MILP formulation
    #[arg(long, value_enum, default_value = "committed")]
    formulation: FormulationArg,

    /// Solver time budget per horizon, in seconds (CBC backend only)
    #[arg(long)]
    time_limit: Option<u64>,

    /// Acceptable relative optimality gap (CBC backend only)
    #[arg(long)]
    mip_gap: Option<f64>,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Csv,
    Json,
    Summary,
}

#[derive(Clone, ValueEnum)]
enum FormulationArg {
    /// Binary indicators only; a product always moves its full delta
    Committed,
    /// Charge amounts decoupled from the indicators
    Flow,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    info!("loading price table from {}", args.input);
    let table = load_price_table(&args.input)?;

    let config = RollingConfig {
        battery: BatteryConfig {
            soc_min: args.soc_min,
            soc_cap: args.soc_cap,
            initial_soc: args.initial_soc,
            round_trip_efficiency: args.efficiency,
            duration_minutes: args.duration_minutes,
            slot_minutes: args.slot_minutes,
        },
        formulation: match args.formulation {
            FormulationArg::Committed => Formulation::Committed,
            FormulationArg::Flow => Formulation::DecoupledFlow,
        },
        solve: SolveSettings {
            time_limit_secs: args.time_limit,
            mip_gap: args.mip_gap,
        },
        chunk_minutes: args.chunk_minutes,
    };

    let scheduler = RollingScheduler::new(config);
    let result = scheduler.run(&table)?;

    match args.format {
        OutputFormat::Csv => match &args.output {
            Some(path) => trace_writer::write_csv_file(path, &result.trace)?,
            None => trace_writer::write_csv(std::io::stdout().lock(), &result.trace)?,
        },
        OutputFormat::Json => match &args.output {
            Some(path) => {
                let file = std::fs::File::create(path)?;
                trace_writer::write_json(file, &result.trace)?;
            }
            None => trace_writer::write_json(std::io::stdout().lock(), &result.trace)?,
        },
        OutputFormat::Summary => {
            println!("Rolling dispatch summary");
            println!("========================");
            for report in &result.reports {
                let objective = report
                    .objective
                    .map(|v| format!("{:.2}", v))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "  {}: {} (objective {}, {} rows, terminal SoC {:.3})",
                    report.label, report.status, objective, report.rows_emitted, report.terminal_soc
                );
            }
            println!();
            println!("Trace rows: {}", result.trace.len());
            println!("Final SoC:  {:.3}", result.final_soc);
        }
    }

    Ok(())
}
