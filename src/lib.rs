pub mod aggregator;
pub mod data_loader;
pub mod extractor;
pub mod model_builder;
pub mod models;
pub mod orchestrator;
pub mod solver;
pub mod trace_writer;

pub use aggregator::aggregate_chunks;
pub use data_loader::load_price_table;
pub use extractor::extract_trace;
pub use model_builder::{build_model, DispatchModel, VariableGrid};
pub use models::{
    BatteryConfig, Formulation, HorizonData, Market, Mode, PriceRow, PriceTable, Product,
    TraceRow, ALL_PRODUCTS, N_PRODUCTS,
};
pub use orchestrator::{HorizonReport, RollingConfig, RollingResult, RollingScheduler};
pub use solver::{solve, HorizonSolve, SolveSettings, SolveStatus, SolvedAssignment};
