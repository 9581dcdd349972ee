use serde::Serialize;
use tracing::{debug, warn};

use super::tax::CapitalGainsSchedule;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SaleStatus {
    NotNeeded,
    Covered,
    /// The whole taxable balance was sold and the shortfall is still open.
    Exhausted,
    /// Best estimate after the iteration budget ran out.
    IterationCap,
}

#[derive(Debug, Clone, Copy)]
pub struct SaleSolveConfig {
    pub tolerance: f64,
    pub max_iterations: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct SaleRequest {
    /// Spendable cash still needed after every other source this year.
    pub shortfall: f64,
    pub taxable_balance: f64,
    pub cost_basis: f64,
    /// Income already stacked below the gain when picking the gains tier.
    pub ordinary_income_before_sale: f64,
    pub state_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SaleOutcome {
    pub stocks_sold: f64,
    pub capital_gains: f64,
    pub capital_gains_tax: f64,
    pub iterations: u32,
    pub status: SaleStatus,
}

impl SaleOutcome {
    fn nothing_sold(status: SaleStatus) -> Self {
        Self {
            stocks_sold: 0.0,
            capital_gains: 0.0,
            capital_gains_tax: 0.0,
            iterations: 0,
            status,
        }
    }

    pub fn net_proceeds(&self) -> f64 {
        self.stocks_sold - self.capital_gains_tax
    }
}

/// Gross sale whose after-tax proceeds cover `request.shortfall`.
///
/// Selling realizes gain, the gain is taxed, and the tax has to be sold for too.
/// Iterates `sold = shortfall + tax(sold)` until net proceeds land within the
/// tolerance, the account runs dry, or the iteration budget is spent.
pub fn solve_required_sale(
    request: SaleRequest,
    schedule: &CapitalGainsSchedule,
    config: SaleSolveConfig,
) -> SaleOutcome {
    if request.shortfall <= 0.0 {
        return SaleOutcome::nothing_sold(SaleStatus::NotNeeded);
    }
    if request.taxable_balance <= 0.0 {
        return SaleOutcome::nothing_sold(SaleStatus::Exhausted);
    }

    let gain_fraction = 1.0 - (request.cost_basis / request.taxable_balance).clamp(0.0, 1.0);
    let tax_on = |sold: f64| -> (f64, f64) {
        let gain = sold * gain_fraction;
        let rate = schedule.investment_income_rate(request.ordinary_income_before_sale + gain)
            + request.state_rate;
        (gain, gain * rate)
    };
    let finish = |sold: f64, iterations: u32, status: SaleStatus| -> SaleOutcome {
        let (capital_gains, capital_gains_tax) = tax_on(sold);
        SaleOutcome {
            stocks_sold: sold,
            capital_gains,
            capital_gains_tax,
            iterations,
            status,
        }
    };

    let mut sold = request.shortfall;
    let mut iteration = 0;
    while iteration < config.max_iterations {
        iteration += 1;
        if sold >= request.taxable_balance {
            debug!(
                shortfall = request.shortfall,
                taxable_balance = request.taxable_balance,
                "taxable account exhausted covering shortfall"
            );
            return finish(request.taxable_balance, iteration, SaleStatus::Exhausted);
        }

        let (_, tax) = tax_on(sold);
        if ((sold - tax) - request.shortfall).abs() < config.tolerance {
            return finish(sold, iteration, SaleStatus::Covered);
        }
        sold = request.shortfall + tax;
    }

    if sold >= request.taxable_balance {
        return finish(request.taxable_balance, iteration, SaleStatus::Exhausted);
    }
    warn!(
        shortfall = request.shortfall,
        sold,
        iterations = iteration,
        "sale solver hit its iteration cap; using best estimate"
    );
    finish(sold, iteration, SaleStatus::IterationCap)
}
