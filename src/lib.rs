pub mod error;
pub mod filing;
pub mod statement;
pub mod xbrl;

// Re-exports
pub use error::{ContextError, RejectedContext, StatementError, StitchError};
pub use filing::{FilingSource, FilingXbrl, ReportType};
pub use statement::{
    assemble, select_periods, stitch, PeriodCandidate, PeriodFilter, PeriodView, SelectorConfig,
    SkippedFiling, Statement, StatementRole, StitchOptions, StitchedStatement, ValueMode,
};
pub use xbrl::{
    ingest, parse_instance, BucketConfig, ConceptRegistry, FactStore, FactStoreBuilder,
    FiscalBucket, FiscalYearEnd, Period,
};
