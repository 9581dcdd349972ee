use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::solver::SaleStatus;

pub const MAX_AGE: u32 = 120;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConversionStrategy {
    Steady,
    FrontLoaded,
}

impl ConversionStrategy {
    pub fn from_front_load_flag(front_load: bool) -> Self {
        if front_load {
            ConversionStrategy::FrontLoaded
        } else {
            ConversionStrategy::Steady
        }
    }
}

/// Immutable run configuration. Rates are fractions (0.09 for 9%).
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationInput {
    pub current_age: u32,
    pub taxable_balance: f64,
    pub taxable_cost_basis: f64,
    pub pretax_balance: f64,
    pub roth_balance: f64,
    pub conversion_target: f64,
    pub strategy: ConversionStrategy,
    pub convert_after_rmd_age: bool,
    pub growth_rate: f64,
    /// Informational; the ledger uses the tiered schedule.
    pub capital_gains_baseline_rate: f64,
    pub state_tax_rate: f64,
    /// Multiplier on reported tax only.
    pub conservative_buffer: f64,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProjectionError {
    #[error("current age must be at most 120, got {0}")]
    InvalidAge(u32),
    #[error("{field} must be a finite amount >= 0, got {value}")]
    InvalidAmount { field: &'static str, value: f64 },
    #[error("taxable cost basis must be between 0 and the taxable balance {balance}, got {basis}")]
    InvalidCostBasis { basis: f64, balance: f64 },
    #[error("growth rate must be finite and >= -100%, got {0}")]
    InvalidGrowthRate(f64),
    #[error("{field} must be between 0 and 1, got {value}")]
    RateOutOfRange { field: &'static str, value: f64 },
    #[error("conservative buffer must be >= 1.0, got {0}")]
    InvalidConservativeBuffer(f64),
}

impl SimulationInput {
    pub fn validate(&self) -> Result<(), ProjectionError> {
        if self.current_age > MAX_AGE {
            return Err(ProjectionError::InvalidAge(self.current_age));
        }
        for (field, value) in [
            ("taxable balance", self.taxable_balance),
            ("taxable cost basis", self.taxable_cost_basis),
            ("pre-tax balance", self.pretax_balance),
            ("roth balance", self.roth_balance),
            ("conversion amount", self.conversion_target),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ProjectionError::InvalidAmount { field, value });
            }
        }
        if self.taxable_cost_basis > self.taxable_balance {
            return Err(ProjectionError::InvalidCostBasis {
                basis: self.taxable_cost_basis,
                balance: self.taxable_balance,
            });
        }
        if !self.growth_rate.is_finite() || self.growth_rate < -1.0 {
            return Err(ProjectionError::InvalidGrowthRate(self.growth_rate));
        }
        for (field, value) in [
            ("state tax rate", self.state_tax_rate),
            ("capital gains rate", self.capital_gains_baseline_rate),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ProjectionError::RateOutOfRange { field, value });
            }
        }
        if !self.conservative_buffer.is_finite() || self.conservative_buffer < 1.0 {
            return Err(ProjectionError::InvalidConservativeBuffer(
                self.conservative_buffer,
            ));
        }
        Ok(())
    }
}

/// Balances threaded from one simulated year into the next.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccountState {
    pub taxable_balance: f64,
    pub cost_basis: f64,
    pub pretax_balance: f64,
    pub roth_balance: f64,
}

impl AccountState {
    pub fn from_input(input: &SimulationInput) -> Self {
        Self {
            taxable_balance: input.taxable_balance,
            cost_basis: input.taxable_cost_basis.min(input.taxable_balance),
            pretax_balance: input.pretax_balance,
            roth_balance: input.roth_balance,
        }
    }

    pub fn total(&self) -> f64 {
        self.taxable_balance + self.pretax_balance + self.roth_balance
    }

    /// Share of the taxable balance that is basis; 0 for an empty account.
    pub fn basis_fraction(&self) -> f64 {
        if self.taxable_balance <= 0.0 {
            0.0
        } else {
            (self.cost_basis / self.taxable_balance).clamp(0.0, 1.0)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearlyProjectionRecord {
    pub age: u32,
    pub year_index: u32,
    pub dividends: f64,
    pub qualified_dividends: f64,
    pub ordinary_dividends: f64,
    pub rmd: f64,
    pub social_security: f64,
    pub taxable_social_security: f64,
    pub conversion_amount: f64,
    pub ordinary_income: f64,
    pub living_expenses: f64,
    pub after_tax_cash: f64,
    pub shortfall: f64,
    pub stocks_sold: f64,
    pub capital_gains: f64,
    pub unmet_shortfall: f64,
    pub surplus_cash: f64,
    pub ordinary_tax: f64,
    pub dividend_tax: f64,
    #[serde(rename = "capGainsTax")]
    pub capital_gains_tax: f64,
    pub state_tax: f64,
    pub total_tax: f64,
    pub conservative_total_tax: f64,
    pub taxable_balance: f64,
    pub cost_basis: f64,
    pub pretax_balance: f64,
    pub roth_balance: f64,
    pub total_portfolio: f64,
    pub marginal_rate: f64,
    pub effective_rate: f64,
    pub solver_iterations: u32,
    pub sale_status: SaleStatus,
    pub irmaa_exposed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionSummary {
    pub years_simulated: u32,
    pub final_age: Option<u32>,
    pub total_tax: f64,
    pub conservative_total_tax: f64,
    pub total_conversions: f64,
    pub total_rmd: f64,
    pub total_stocks_sold: f64,
    pub unmet_shortfall: f64,
    pub ending_taxable: f64,
    pub ending_pretax: f64,
    pub ending_roth: f64,
    pub ending_total: f64,
    pub irmaa_years: u32,
}
