use super::assumptions::TaperSchedule;
use super::types::ConversionStrategy;

/// Yearly Roth conversion rule for one run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConversionPolicy {
    pub strategy: ConversionStrategy,
    pub target_amount: f64,
    /// `None` means RMDs never begin under the active table.
    pub rmd_start_age: Option<u32>,
    pub continue_after_rmd: bool,
    pub taper: TaperSchedule,
}

impl ConversionPolicy {
    /// Amount to move from pre-tax to Roth this year, never more than `pretax_balance`.
    pub fn amount(&self, age: u32, year_index: u32, pretax_balance: f64) -> f64 {
        if pretax_balance <= 0.0 || self.target_amount <= 0.0 {
            return 0.0;
        }
        if !self.continue_after_rmd && self.rmd_start_age.is_some_and(|start| age >= start) {
            return 0.0;
        }

        let computed = match self.strategy {
            ConversionStrategy::Steady => self.target_amount,
            ConversionStrategy::FrontLoaded => {
                self.target_amount * self.taper.factor(year_index.saturating_sub(1))
            }
        };
        computed.max(0.0).min(pretax_balance)
    }
}
