pub mod context;
pub mod facts;
pub mod instance;
pub mod linkbase;
pub mod period;

pub use context::{
    normalize_context, normalize_contexts, Dimension, Dimensions, NormalizedContext, RawContext,
    RawDimension, RawPeriod,
};
pub use facts::{
    ingest, DuplicateFactConflict, Fact, FactKey, FactStore, FactStoreBuilder, FactValue,
    NormalizedFiling, RawFact,
};
pub use instance::{parse_instance, InstanceDocument};
pub use linkbase::{
    BalanceType, CalculationArc, ConceptMetadata, ConceptRegistry, PreferredSign, PresentationArc,
};
pub use period::{BucketConfig, FiscalBucket, FiscalYearEnd, Period};
