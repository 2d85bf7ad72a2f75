pub mod assemble;
pub mod select;
pub mod stitch;

pub use assemble::{assemble, Cell, CellValue, LineItem, Statement, ValueMode};
pub use select::{select_periods, PeriodCandidate, PeriodFilter, PeriodView, SelectorConfig};
pub use stitch::{stitch, SkipReason, SkippedFiling, StitchOptions, StitchOutcome, StitchedStatement};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use strum::{EnumIter, IntoEnumIterator};

/// Which financial statement a presentation role describes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter)]
#[serde(try_from = "String")]
pub enum StatementRole {
    IncomeStatement,
    BalanceSheet,
    CashFlow,
    Equity,
    Other(String),
}

impl StatementRole {
    /// Balance sheets report instants; everything else reports durations.
    pub fn uses_instant(&self) -> bool {
        matches!(self, StatementRole::BalanceSheet)
    }
}

impl TryFrom<String> for StatementRole {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        StatementRole::from_str(&s)
    }
}

impl fmt::Display for StatementRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatementRole::IncomeStatement => write!(f, "IncomeStatement"),
            StatementRole::BalanceSheet => write!(f, "BalanceSheet"),
            StatementRole::CashFlow => write!(f, "CashFlow"),
            StatementRole::Equity => write!(f, "Equity"),
            StatementRole::Other(s) => write!(f, "{}", s),
        }
    }
}

impl FromStr for StatementRole {
    type Err = String;

    fn from_str(s: &str) -> Result<StatementRole, String> {
        let normalized = s.to_lowercase().replace(['-', '_', ' '], "");
        match normalized.as_str() {
            "incomestatement" | "income" | "operations" | "statementsofincome" => {
                Ok(StatementRole::IncomeStatement)
            }
            "balancesheet" | "balancesheets" | "financialposition" => {
                Ok(StatementRole::BalanceSheet)
            }
            "cashflow" | "cashflows" | "statementsofcashflows" => Ok(StatementRole::CashFlow),
            "equity" | "stockholdersequity" | "shareholdersequity" => Ok(StatementRole::Equity),
            _ => Ok(StatementRole::Other(s.to_string())),
        }
    }
}

pub static STATEMENT_ROLES: Lazy<String> = Lazy::new(|| {
    StatementRole::iter()
        .filter(|r| !matches!(r, StatementRole::Other(_)))
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join(", ")
});

impl StatementRole {
    pub fn list_roles() -> &'static str {
        &STATEMENT_ROLES
    }
}
