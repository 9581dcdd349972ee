mod assumptions;
mod conversion;
mod engine;
mod rmd;
mod solver;
mod tax;
mod types;

pub use assumptions::{Assumptions, TaperSchedule, TaxTable};
pub use conversion::ConversionPolicy;
pub use engine::{advance_one_year, conversion_policy, run, run_many, run_with_assumptions, summarize};
pub use rmd::{RmdTable, RmdTableEntry};
pub use solver::{SaleOutcome, SaleRequest, SaleSolveConfig, SaleStatus, solve_required_sale};
pub use tax::{
    Bracket, BracketLadder, CapitalGainsSchedule, brackets_for_year, inflation_multiplier,
    tax_owed,
};
pub use types::{
    AccountState, ConversionStrategy, MAX_AGE, ProjectionError, ProjectionSummary,
    SimulationInput, YearlyProjectionRecord,
};
