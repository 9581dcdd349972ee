use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bracket {
    /// `None` marks the unbounded top bracket.
    pub upper_bound: Option<f64>,
    pub rate: f64,
}

/// Ordered (upper bound, marginal rate) pairs over taxable income.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BracketLadder {
    brackets: Vec<Bracket>,
}

impl BracketLadder {
    pub fn new(brackets: Vec<Bracket>) -> Self {
        Self { brackets }
    }

    pub fn brackets(&self) -> &[Bracket] {
        &self.brackets
    }

    pub fn inflated(&self, multiplier: f64) -> Self {
        Self {
            brackets: self
                .brackets
                .iter()
                .map(|b| Bracket {
                    upper_bound: b.upper_bound.map(|bound| bound * multiplier),
                    rate: b.rate,
                })
                .collect(),
        }
    }

    /// Rate applied to the last dollar of `taxable_income`.
    pub fn marginal_rate(&self, taxable_income: f64) -> f64 {
        if taxable_income <= 0.0 {
            return 0.0;
        }
        for bracket in &self.brackets {
            match bracket.upper_bound {
                Some(bound) if taxable_income > bound => continue,
                _ => return bracket.rate,
            }
        }
        self.brackets.last().map(|b| b.rate).unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapitalGainsSchedule {
    pub zero_rate_ceiling: f64,
    pub mid_rate_ceiling: f64,
    pub mid_rate: f64,
    pub top_rate: f64,
    pub niit_threshold: f64,
    pub niit_rate: f64,
}

impl CapitalGainsSchedule {
    /// Long-term gains tier for the whole income stack. Step function, no phase-in.
    pub fn ltcg_rate(&self, total_income: f64) -> f64 {
        if total_income <= self.zero_rate_ceiling {
            0.0
        } else if total_income <= self.mid_rate_ceiling {
            self.mid_rate
        } else {
            self.top_rate
        }
    }

    pub fn niit_applies(&self, total_income: f64) -> bool {
        total_income > self.niit_threshold
    }

    /// Federal rate on investment income: tier plus surtax when it applies.
    pub fn investment_income_rate(&self, total_income: f64) -> f64 {
        let surtax = if self.niit_applies(total_income) {
            self.niit_rate
        } else {
            0.0
        };
        self.ltcg_rate(total_income) + surtax
    }
}

pub fn inflation_multiplier(annual_rate: f64, year_index: u32) -> f64 {
    (1.0 + annual_rate).powi(year_index.saturating_sub(1) as i32)
}

/// Base-year ladder with every bound indexed for `year_index` (year 1 is the base year).
pub fn brackets_for_year(base: &BracketLadder, annual_inflation: f64, year_index: u32) -> BracketLadder {
    base.inflated(inflation_multiplier(annual_inflation, year_index))
}

pub fn tax_owed(gross_ordinary_income: f64, standard_deduction: f64, ladder: &BracketLadder) -> f64 {
    let taxable_income = (gross_ordinary_income - standard_deduction.max(0.0)).max(0.0);
    if taxable_income <= 0.0 {
        return 0.0;
    }

    let mut tax = 0.0;
    let mut lower = 0.0;
    for bracket in ladder.brackets() {
        let upper = bracket.upper_bound.unwrap_or(f64::INFINITY);
        if taxable_income <= lower {
            break;
        }
        let band = taxable_income.min(upper) - lower;
        if band > 0.0 {
            tax += band * bracket.rate;
        }
        lower = upper;
    }
    tax
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::assumptions::TaxTable;
    use proptest::prelude::{prop_assert, proptest};

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= 1e-6,
            "expected {expected}, got {actual}"
        );
    }

    fn simple_ladder() -> BracketLadder {
        BracketLadder::new(vec![
            Bracket {
                upper_bound: Some(10_000.0),
                rate: 0.10,
            },
            Bracket {
                upper_bound: Some(40_000.0),
                rate: 0.12,
            },
            Bracket {
                upper_bound: Some(90_000.0),
                rate: 0.22,
            },
            Bracket {
                upper_bound: None,
                rate: 0.24,
            },
        ])
    }

    fn base_2024() -> TaxTable {
        TaxTable::for_tax_year(2024).expect("2024 table is built in")
    }

    #[test]
    fn tax_owed_stacks_marginal_bands() {
        // 10,000 @ 10% + 30,000 @ 12% + 10,000 @ 22%
        let tax = tax_owed(50_000.0, 0.0, &simple_ladder());
        assert_approx(tax, 6_800.0);
    }

    #[test]
    fn tax_owed_subtracts_standard_deduction_first() {
        let tax = tax_owed(20_000.0, 15_000.0, &simple_ladder());
        assert_approx(tax, 500.0);
    }

    #[test]
    fn tax_owed_is_zero_below_deduction() {
        assert_approx(tax_owed(14_999.0, 15_000.0, &simple_ladder()), 0.0);
        assert_approx(tax_owed(0.0, 0.0, &simple_ladder()), 0.0);
    }

    #[test]
    fn tax_owed_reaches_unbounded_top_bracket() {
        // 1,000 + 3,600 + 11,000 + 910,000 * 0.24
        let tax = tax_owed(1_000_000.0, 0.0, &simple_ladder());
        assert_approx(tax, 15_600.0 + 218_400.0);
    }

    #[test]
    fn tax_owed_matches_2024_joint_table() {
        let table = base_2024();
        // taxable 70,800: 23,200 @ 10% + 47,600 @ 12%
        let tax = tax_owed(100_000.0, table.standard_deduction, &table.ladder);
        assert_approx(tax, 8_032.0);
    }

    #[test]
    fn empty_ladder_owes_nothing() {
        assert_approx(tax_owed(50_000.0, 0.0, &BracketLadder::new(Vec::new())), 0.0);
    }

    #[test]
    fn marginal_rate_reports_bracket_hit() {
        let ladder = simple_ladder();
        assert_approx(ladder.marginal_rate(0.0), 0.0);
        assert_approx(ladder.marginal_rate(10_000.0), 0.10);
        assert_approx(ladder.marginal_rate(10_000.01), 0.12);
        assert_approx(ladder.marginal_rate(5_000_000.0), 0.24);
    }

    #[test]
    fn brackets_for_first_year_equal_base_table() {
        let base = base_2024().ladder;
        assert_eq!(brackets_for_year(&base, 0.03, 1), base);
        assert_eq!(brackets_for_year(&base, 0.03, 0), base);
    }

    #[test]
    fn brackets_for_later_years_inflate_bounds_not_rates() {
        let base = base_2024().ladder;
        let year3 = brackets_for_year(&base, 0.03, 3);
        for (b, y) in base.brackets().iter().zip(year3.brackets()) {
            assert_approx(y.rate, b.rate);
            match (b.upper_bound, y.upper_bound) {
                (Some(bb), Some(yb)) => assert_approx(yb, bb * 1.03 * 1.03),
                (None, None) => {}
                other => panic!("bound shape changed: {other:?}"),
            }
        }
    }

    #[test]
    fn ltcg_rate_steps_at_statutory_cliffs() {
        let schedule = base_2024().capital_gains;
        assert_approx(schedule.ltcg_rate(0.0), 0.0);
        assert_approx(schedule.ltcg_rate(94_050.0), 0.0);
        assert_approx(schedule.ltcg_rate(94_051.0), 0.15);
        assert_approx(schedule.ltcg_rate(583_750.0), 0.15);
        assert_approx(schedule.ltcg_rate(583_751.0), 0.20);
    }

    #[test]
    fn niit_applies_only_above_threshold() {
        let schedule = base_2024().capital_gains;
        assert!(!schedule.niit_applies(250_000.0));
        assert!(schedule.niit_applies(250_001.0));
        assert_approx(schedule.investment_income_rate(200_000.0), 0.15);
        assert_approx(schedule.investment_income_rate(300_000.0), 0.188);
        assert_approx(schedule.investment_income_rate(1_000_000.0), 0.238);
    }

    #[test]
    fn tax_owed_is_continuous_at_every_boundary() {
        let table = base_2024();
        for bracket in table.ladder.brackets() {
            let Some(bound) = bracket.upper_bound else {
                continue;
            };
            let income = bound + table.standard_deduction;
            let below = tax_owed(income - 0.01, table.standard_deduction, &table.ladder);
            let above = tax_owed(income + 0.01, table.standard_deduction, &table.ladder);
            assert!(
                above - below <= 0.02 * 0.37 + 1e-9,
                "jump at {bound}: {below} -> {above}"
            );
        }
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_tax_is_monotone_and_progressive(
            low in 1u32..2_000_000,
            delta in 0u32..2_000_000,
            year_index in 1u32..32
        ) {
            let table = base_2024();
            let ladder = brackets_for_year(&table.ladder, 0.03, year_index);
            let x = low as f64;
            let y = x + delta as f64;
            let tx = tax_owed(x, table.standard_deduction, &ladder);
            let ty = tax_owed(y, table.standard_deduction, &ladder);
            prop_assert!(ty + 1e-9 >= tx);
            prop_assert!(ty / y + 1e-12 >= tx / x);
            prop_assert!(tx >= 0.0 && tx <= x * 0.37);
        }
    }
}
