pub mod clock;
pub mod config;
pub mod events;
pub mod ledger;
pub mod payment;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BusinessRules, EngineConfig, QuotaRules};
pub use events::{EngineEvent, EventBus};
pub use ledger::{ActiveClaim, AdmissionPolicy, ClaimState, HoldTicket, LedgerError, ReservationLedger};
pub use payment::{IntentReceipt, MockPaymentGateway, PaymentGateway};
