//! Household and statutory assumptions the engine reads instead of inline literals.
//!
//! Everything here is data. Swapping a tax year or tuning the conversion taper
//! means building a different [`Assumptions`] value (or loading one from JSON),
//! never editing the ledger.

use serde::{Deserialize, Serialize};

use super::rmd::RmdTable;
use super::tax::{Bracket, BracketLadder, CapitalGainsSchedule};

/// Base-year federal table for a married-filing-jointly household.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxTable {
    pub tax_year: i32,
    pub ladder: BracketLadder,
    pub standard_deduction: f64,
    pub capital_gains: CapitalGainsSchedule,
}

impl TaxTable {
    pub fn for_tax_year(tax_year: i32) -> Option<Self> {
        match tax_year {
            2024 => Some(Self::joint_2024()),
            2025 => Some(Self::joint_2025()),
            _ => None,
        }
    }

    pub fn joint_2024() -> Self {
        Self {
            tax_year: 2024,
            ladder: ladder(&[
                (Some(23_200.0), 0.10),
                (Some(94_300.0), 0.12),
                (Some(201_050.0), 0.22),
                (Some(383_900.0), 0.24),
                (Some(487_450.0), 0.32),
                (Some(731_200.0), 0.35),
                (None, 0.37),
            ]),
            standard_deduction: 29_200.0,
            capital_gains: CapitalGainsSchedule {
                zero_rate_ceiling: 94_050.0,
                mid_rate_ceiling: 583_750.0,
                mid_rate: 0.15,
                top_rate: 0.20,
                niit_threshold: 250_000.0,
                niit_rate: 0.038,
            },
        }
    }

    pub fn joint_2025() -> Self {
        Self {
            tax_year: 2025,
            ladder: ladder(&[
                (Some(23_850.0), 0.10),
                (Some(96_950.0), 0.12),
                (Some(206_700.0), 0.22),
                (Some(394_600.0), 0.24),
                (Some(501_050.0), 0.32),
                (Some(751_600.0), 0.35),
                (None, 0.37),
            ]),
            standard_deduction: 30_000.0,
            capital_gains: CapitalGainsSchedule {
                zero_rate_ceiling: 96_700.0,
                mid_rate_ceiling: 600_050.0,
                mid_rate: 0.15,
                top_rate: 0.20,
                // NIIT thresholds are not indexed.
                niit_threshold: 250_000.0,
                niit_rate: 0.038,
            },
        }
    }
}

fn ladder(rows: &[(Option<f64>, f64)]) -> BracketLadder {
    BracketLadder::new(
        rows.iter()
            .map(|&(upper_bound, rate)| Bracket { upper_bound, rate })
            .collect(),
    )
}

/// Front-load conversion multiplier: `max(floor, start - slope * years_elapsed)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaperSchedule {
    pub start_factor: f64,
    pub slope: f64,
    pub floor_factor: f64,
}

impl TaperSchedule {
    pub fn factor(&self, years_elapsed: u32) -> f64 {
        (self.start_factor - self.slope * years_elapsed as f64).max(self.floor_factor)
    }
}

impl Default for TaperSchedule {
    fn default() -> Self {
        Self {
            start_factor: 1.5,
            slope: 0.08,
            floor_factor: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Assumptions {
    pub tax_table: TaxTable,
    /// Indexes bracket bounds, the standard deduction and living expenses.
    pub bracket_inflation: f64,
    pub dividend_yield: f64,
    pub qualified_dividend_share: f64,
    pub social_security_annual: f64,
    pub social_security_start_age: u32,
    pub social_security_taxable_share: f64,
    /// Base-year household spending.
    pub living_expenses: f64,
    pub taper: TaperSchedule,
    pub rmd_table: RmdTable,
    pub solver_tolerance: f64,
    pub solver_max_iterations: u32,
    pub depletion_threshold: f64,
    pub horizon_age: u32,
    /// Reporting only; crossing it never changes account mechanics.
    pub irmaa_threshold: f64,
}

impl Default for Assumptions {
    fn default() -> Self {
        Self::with_table(TaxTable::joint_2024())
    }
}

impl Assumptions {
    pub fn for_tax_year(tax_year: i32) -> Option<Self> {
        TaxTable::for_tax_year(tax_year).map(Self::with_table)
    }

    pub fn with_table(tax_table: TaxTable) -> Self {
        Self {
            tax_table,
            bracket_inflation: 0.03,
            dividend_yield: 0.02,
            qualified_dividend_share: 0.90,
            social_security_annual: 60_000.0,
            social_security_start_age: 70,
            social_security_taxable_share: 0.85,
            living_expenses: 250_000.0,
            taper: TaperSchedule::default(),
            rmd_table: RmdTable::uniform_lifetime(),
            solver_tolerance: 10.0,
            solver_max_iterations: 10,
            depletion_threshold: 10_000.0,
            horizon_age: 90,
            irmaa_threshold: 206_000.0,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_assumptions_use_2024_table() {
        let assumptions = Assumptions::default();
        assert_eq!(assumptions.tax_table.tax_year, 2024);
        assert_eq!(assumptions.rmd_table.start_age(), Some(73));
        assert_eq!(assumptions.horizon_age, 90);
    }

    #[test]
    fn unknown_tax_year_has_no_table() {
        assert!(TaxTable::for_tax_year(1999).is_none());
        assert!(Assumptions::for_tax_year(2031).is_none());
    }

    #[test]
    fn built_in_ladders_have_increasing_bounds_and_rates() {
        for year in [2024, 2025] {
            let table = TaxTable::for_tax_year(year).expect("built-in year");
            let brackets = table.ladder.brackets();
            assert_eq!(brackets.last().and_then(|b| b.upper_bound), None);
            for pair in brackets.windows(2) {
                assert!(pair[1].rate >= pair[0].rate);
                if let (Some(a), Some(b)) = (pair[0].upper_bound, pair[1].upper_bound) {
                    assert!(b > a);
                }
            }
        }
    }

    #[test]
    fn taper_declines_linearly_to_floor() {
        let taper = TaperSchedule::default();
        assert!((taper.factor(0) - 1.5).abs() < 1e-12);
        assert!((taper.factor(5) - 1.1).abs() < 1e-12);
        assert!((taper.factor(12) - 0.54).abs() < 1e-12);
        assert!((taper.factor(13) - 0.5).abs() < 1e-12);
        assert!((taper.factor(40) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn assumptions_json_overrides_only_named_fields() {
        let json = r#"{ "livingExpenses": 120000, "dividendYield": 0.03 }"#;
        let assumptions = Assumptions::from_json(json).expect("partial json parses");
        assert_eq!(assumptions.living_expenses, 120_000.0);
        assert_eq!(assumptions.dividend_yield, 0.03);
        assert_eq!(assumptions.tax_table, Assumptions::default().tax_table);
    }

    #[test]
    fn assumptions_round_trip_through_json() {
        let assumptions = Assumptions::for_tax_year(2025).expect("built-in year");
        let json = serde_json::to_string(&assumptions).expect("serializes");
        assert_eq!(Assumptions::from_json(&json).expect("parses"), assumptions);
    }
}
