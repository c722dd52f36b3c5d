pub mod lifecycle;
pub mod manager;
pub mod models;
pub mod reconcile;
pub mod reservation;

pub use lifecycle::{transition, BookingEvent, InvalidTransitionError};
pub use manager::{BookingError, BookingManager, BookingReceipt};
pub use models::{Booking, BookingStatus, PaymentMethod, PaymentTransaction, TransactionStatus};
pub use reconcile::{HoldExpiredError, PaymentReconciler, ReconcileError};
pub use reservation::{ReservationHold, SlotConflictError, SlotReservationCoordinator};
