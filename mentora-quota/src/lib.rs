pub mod features;
pub mod gate;
pub mod period;

pub use features::{FeatureKind, QuotaPolicy};
pub use gate::{QuotaExceededError, QuotaGrant, UsageQuotaGate};
pub use period::{Period, ResetPeriod};
