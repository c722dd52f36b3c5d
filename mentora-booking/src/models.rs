use chrono::{DateTime, Utc};
use mentora_shared::TimeRange;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Booking status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Requested,
    PendingPayment,
    Confirmed,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }

    /// Statuses that occupy the mentor's calendar
    pub fn blocks_calendar(&self) -> bool {
        matches!(self, BookingStatus::PendingPayment | BookingStatus::Confirmed)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Payos,
    BankTransfer,
    CreditCard,
}

/// A learner's session with a mentor. Bookings are never deleted; they
/// reach a terminal status and stay for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub mentor_id: Uuid,
    pub learner_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: i64,
    pub price_amount: i32,
    pub currency: String,
    pub payment_method: PaymentMethod,
    pub status: BookingStatus,
    pub hold_id: Option<Uuid>,
    /// Gateway reference of the active payment transaction
    pub payment_reference: Option<String>,
    pub meeting_link: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn new(
        mentor_id: Uuid,
        learner_id: Uuid,
        range: TimeRange,
        price_amount: i32,
        currency: String,
        payment_method: PaymentMethod,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            mentor_id,
            learner_id,
            start_time: range.start,
            end_time: range.end,
            duration_minutes: range.duration_minutes(),
            price_amount,
            currency,
            payment_method,
            status: BookingStatus::Requested,
            hold_id: None,
            payment_reference: None,
            meeting_link: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn range(&self) -> TimeRange {
        TimeRange::new(self.start_time, self.end_time)
    }

    pub fn update_status(&mut self, new_status: BookingStatus, now: DateTime<Utc>) {
        self.status = new_status;
        self.updated_at = now;
    }
}

/// Payment transaction status lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Created,
    Completed,
    Failed,
    Expired,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Created)
    }
}

/// One payment attempt with the external gateway. A booking has at most
/// one non-terminal transaction at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentTransaction {
    /// Internal reference for invoices and support lookups
    pub internal_reference: String,
    /// The provider's reference; reconciliation signals are keyed by this
    pub gateway_ref: String,
    pub booking_id: Uuid,
    pub amount: i32,
    pub currency: String,
    pub status: TransactionStatus,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentTransaction {
    pub fn new(
        booking_id: Uuid,
        gateway_ref: String,
        amount: i32,
        currency: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            internal_reference: Self::generate_reference(booking_id, now),
            gateway_ref,
            booking_id,
            amount,
            currency,
            status: TransactionStatus::Created,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    // Format: TXN-{timestamp}-{short_booking_id}
    fn generate_reference(booking_id: Uuid, now: DateTime<Utc>) -> String {
        let short_id = &booking_id.to_string()[..8];
        format!("TXN-{}-{}", now.timestamp(), short_id.to_uppercase())
    }
}
