#[cfg(feature = "parallel")]
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use tracing::{debug, warn};

use super::assumptions::Assumptions;
use super::conversion::ConversionPolicy;
use super::solver::{SaleRequest, SaleSolveConfig, SaleStatus, solve_required_sale};
use super::tax::{brackets_for_year, inflation_multiplier, tax_owed};
use super::types::{
    AccountState, ProjectionError, ProjectionSummary, SimulationInput, YearlyProjectionRecord,
};

pub fn conversion_policy(input: &SimulationInput, assumptions: &Assumptions) -> ConversionPolicy {
    ConversionPolicy {
        strategy: input.strategy,
        target_amount: input.conversion_target,
        rmd_start_age: assumptions.rmd_table.start_age(),
        continue_after_rmd: input.convert_after_rmd_age,
        taper: assumptions.taper,
    }
}

/// Simulates one year for the household and returns the record together with
/// the balances the next year starts from. Year 1 is the base tax year.
pub fn advance_one_year(
    state: AccountState,
    input: &SimulationInput,
    assumptions: &Assumptions,
    age: u32,
    year_index: u32,
) -> (YearlyProjectionRecord, AccountState) {
    let table = &assumptions.tax_table;
    let gains = &table.capital_gains;
    let index = inflation_multiplier(assumptions.bracket_inflation, year_index);
    let ladder = brackets_for_year(&table.ladder, assumptions.bracket_inflation, year_index);
    let standard_deduction = table.standard_deduction * index;
    let living_expenses = assumptions.living_expenses * index;

    let dividends = state.taxable_balance.max(0.0) * assumptions.dividend_yield;
    let qualified_dividends = dividends * assumptions.qualified_dividend_share;
    let ordinary_dividends = dividends - qualified_dividends;

    let social_security = if age >= assumptions.social_security_start_age {
        assumptions.social_security_annual
    } else {
        0.0
    };
    let taxable_social_security = social_security * assumptions.social_security_taxable_share;

    let rmd = assumptions.rmd_table.rmd_amount(age, state.pretax_balance);
    let conversion = conversion_policy(input, assumptions).amount(
        age,
        year_index,
        (state.pretax_balance - rmd).max(0.0),
    );

    let ordinary_income = conversion + rmd + ordinary_dividends + taxable_social_security;
    let ordinary_tax = tax_owed(ordinary_income, standard_deduction, &ladder);

    // Qualified dividends stack on top of ordinary income for the gains tier.
    let income_base = ordinary_income + qualified_dividends;
    let mut dividend_tax = qualified_dividends * gains.ltcg_rate(income_base);
    if gains.niit_applies(income_base) {
        dividend_tax += dividends * gains.niit_rate;
    }

    let state_tax = income_base * input.state_tax_rate;

    // A conversion moves money between accounts; it is never spendable.
    let after_tax_cash =
        dividends + rmd + social_security - (ordinary_tax + dividend_tax + state_tax);
    let shortfall = (living_expenses - after_tax_cash).max(0.0);

    let sale = solve_required_sale(
        SaleRequest {
            shortfall,
            taxable_balance: state.taxable_balance,
            cost_basis: state.cost_basis,
            ordinary_income_before_sale: income_base,
            state_rate: input.state_tax_rate,
        },
        gains,
        SaleSolveConfig {
            tolerance: assumptions.solver_tolerance,
            max_iterations: assumptions.solver_max_iterations,
        },
    );

    let unmet_shortfall = match sale.status {
        SaleStatus::Exhausted | SaleStatus::IterationCap => {
            (shortfall - sale.net_proceeds()).max(0.0)
        }
        SaleStatus::NotNeeded | SaleStatus::Covered => 0.0,
    };
    let surplus_cash = (after_tax_cash - living_expenses).max(0.0);

    let basis_removed = sale.stocks_sold * state.basis_fraction();
    let mut next = AccountState {
        taxable_balance: (state.taxable_balance - sale.stocks_sold).max(0.0),
        cost_basis: (state.cost_basis - basis_removed).max(0.0),
        pretax_balance: (state.pretax_balance - conversion - rmd).max(0.0),
        roth_balance: state.roth_balance + conversion,
    };

    let growth = 1.0 + input.growth_rate;
    next.taxable_balance *= growth;
    next.pretax_balance *= growth;
    next.roth_balance *= growth;

    let total_tax = ordinary_tax + dividend_tax + sale.capital_gains_tax + state_tax;
    let gross_income = dividends + rmd + conversion + social_security + sale.capital_gains;
    let effective_rate = if gross_income > 0.0 {
        total_tax / gross_income
    } else {
        0.0
    };
    let magi = income_base + sale.capital_gains;
    let irmaa_exposed = magi > assumptions.irmaa_threshold * index;

    if unmet_shortfall > 0.0 {
        warn!(
            age,
            shortfall, unmet_shortfall, "living expenses not covered; taxable account exhausted"
        );
    }
    debug!(
        age,
        year_index,
        rmd,
        conversion,
        stocks_sold = sale.stocks_sold,
        total_tax,
        total_portfolio = next.total(),
        "projected year"
    );

    let record = YearlyProjectionRecord {
        age,
        year_index,
        dividends,
        qualified_dividends,
        ordinary_dividends,
        rmd,
        social_security,
        taxable_social_security,
        conversion_amount: conversion,
        ordinary_income,
        living_expenses,
        after_tax_cash,
        shortfall,
        stocks_sold: sale.stocks_sold,
        capital_gains: sale.capital_gains,
        unmet_shortfall,
        surplus_cash,
        ordinary_tax,
        dividend_tax,
        capital_gains_tax: sale.capital_gains_tax,
        state_tax,
        total_tax,
        conservative_total_tax: total_tax * input.conservative_buffer,
        taxable_balance: next.taxable_balance,
        cost_basis: next.cost_basis,
        pretax_balance: next.pretax_balance,
        roth_balance: next.roth_balance,
        total_portfolio: next.total(),
        marginal_rate: ladder.marginal_rate(ordinary_income - standard_deduction),
        effective_rate,
        solver_iterations: sale.iterations,
        sale_status: sale.status,
        irmaa_exposed,
    };
    (record, next)
}

pub fn run(input: &SimulationInput) -> Result<Vec<YearlyProjectionRecord>, ProjectionError> {
    run_with_assumptions(input, &Assumptions::default())
}

/// Projects `current_age..=horizon_age`, stopping after the first year whose
/// ending portfolio falls below the depletion threshold.
pub fn run_with_assumptions(
    input: &SimulationInput,
    assumptions: &Assumptions,
) -> Result<Vec<YearlyProjectionRecord>, ProjectionError> {
    input.validate()?;

    let mut state = AccountState::from_input(input);
    let mut records = Vec::new();
    for age in input.current_age..=assumptions.horizon_age {
        let year_index = age - input.current_age + 1;
        let (record, next) = advance_one_year(state, input, assumptions, age, year_index);
        let depleted = record.total_portfolio < assumptions.depletion_threshold;
        records.push(record);
        state = next;
        if depleted {
            debug!(age, "portfolio depleted; ending projection early");
            break;
        }
    }
    Ok(records)
}

/// Independent scenarios; each run owns its own state.
pub fn run_many(
    inputs: &[SimulationInput],
    assumptions: &Assumptions,
) -> Vec<Result<Vec<YearlyProjectionRecord>, ProjectionError>> {
    #[cfg(feature = "parallel")]
    {
        inputs
            .par_iter()
            .map(|input| run_with_assumptions(input, assumptions))
            .collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        inputs
            .iter()
            .map(|input| run_with_assumptions(input, assumptions))
            .collect()
    }
}

pub fn summarize(records: &[YearlyProjectionRecord]) -> ProjectionSummary {
    let last = records.last();
    ProjectionSummary {
        years_simulated: records.len() as u32,
        final_age: last.map(|r| r.age),
        total_tax: records.iter().map(|r| r.total_tax).sum(),
        conservative_total_tax: records.iter().map(|r| r.conservative_total_tax).sum(),
        total_conversions: records.iter().map(|r| r.conversion_amount).sum(),
        total_rmd: records.iter().map(|r| r.rmd).sum(),
        total_stocks_sold: records.iter().map(|r| r.stocks_sold).sum(),
        unmet_shortfall: records.iter().map(|r| r.unmet_shortfall).sum(),
        ending_taxable: last.map_or(0.0, |r| r.taxable_balance),
        ending_pretax: last.map_or(0.0, |r| r.pretax_balance),
        ending_roth: last.map_or(0.0, |r| r.roth_balance),
        ending_total: last.map_or(0.0, |r| r.total_portfolio),
        irmaa_years: records.iter().filter(|r| r.irmaa_exposed).count() as u32,
    }
}
