use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use mentora_availability::{covering_slot, AvailabilityWindow};
use mentora_core::{BusinessRules, Clock, EngineEvent, EventBus, PaymentGateway};
use mentora_shared::models::events::BookingCancelledEvent;
use mentora_shared::TimeRange;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::lifecycle::{transition, BookingEvent, InvalidTransitionError};
use crate::models::{Booking, BookingStatus, PaymentMethod, PaymentTransaction, TransactionStatus};
use crate::reservation::{SlotConflictError, SlotReservationCoordinator};

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("Booking {0} not found")]
    NotFound(Uuid),

    #[error("Requested range {range} is outside mentor {mentor_id}'s availability")]
    OutsideAvailability { mentor_id: Uuid, range: TimeRange },

    #[error(transparent)]
    SlotConflict(#[from] SlotConflictError),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransitionError),

    #[error("User {actor} is not a participant of booking {booking_id}")]
    NotParticipant { actor: Uuid, booking_id: Uuid },

    #[error("Booking {booking_id} could only be cancelled until {cutoff}")]
    CancellationTooLate {
        booking_id: Uuid,
        cutoff: DateTime<Utc>,
    },

    #[error("Payment gateway rejected intent for booking {booking_id}: {message}")]
    Gateway { booking_id: Uuid, message: String },
}

/// Handed to the learner after a successful booking request
#[derive(Debug, Clone)]
pub struct BookingReceipt {
    pub booking_id: Uuid,
    pub checkout_url: String,
    pub hold_expires_at: DateTime<Utc>,
}

/// Orchestrates the booking flow: availability check, slot hold, payment
/// intent, lifecycle transitions. Holds are taken before the gateway is
/// contacted and independently of its latency, so a slow gateway never
/// serializes unrelated bookings.
pub struct BookingManager {
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) rules: BusinessRules,
    pub(crate) gateway: Arc<dyn PaymentGateway>,
    pub(crate) events: EventBus,
    pub(crate) slots: SlotReservationCoordinator,
    pub(crate) bookings: DashMap<Uuid, Booking>,
    // Keyed by gateway reference; reconciliation signals arrive with it
    pub(crate) transactions: DashMap<String, PaymentTransaction>,
}

impl BookingManager {
    pub fn new(
        clock: Arc<dyn Clock>,
        rules: BusinessRules,
        gateway: Arc<dyn PaymentGateway>,
        events: EventBus,
    ) -> Self {
        let hold_ttl = Duration::seconds(rules.slot_hold_seconds as i64);
        Self {
            slots: SlotReservationCoordinator::new(clock.clone(), hold_ttl),
            clock,
            rules,
            gateway,
            events,
            bookings: DashMap::new(),
            transactions: DashMap::new(),
        }
    }

    /// A learner asks for a session. Validates the range against the
    /// mentor's expanded availability, takes the slot hold, then asks the
    /// gateway for a payment intent.
    pub async fn request_booking(
        &self,
        learner_id: Uuid,
        mentor_id: Uuid,
        windows: &[AvailabilityWindow],
        range: TimeRange,
        price_amount: i32,
        currency: &str,
        payment_method: PaymentMethod,
    ) -> Result<BookingReceipt, BookingError> {
        if covering_slot(windows, range).is_none() {
            return Err(BookingError::OutsideAvailability { mentor_id, range });
        }

        let now = self.clock.now();
        let mut booking = Booking::new(
            mentor_id,
            learner_id,
            range,
            price_amount,
            currency.to_string(),
            payment_method,
            now,
        );
        let booking_id = booking.id;

        let hold = self.slots.reserve(mentor_id, range, booking_id)?;
        booking.update_status(
            transition(booking.status, BookingEvent::ReservationSucceeded)?,
            now,
        );
        booking.hold_id = Some(hold.hold_id);
        self.bookings.insert(booking_id, booking);

        // Gateway I/O happens after the hold is taken, outside any keyed
        // critical section
        let metadata = json!({
            "booking_id": booking_id,
            "mentor_id": mentor_id,
            "start_time": range.start.to_rfc3339(),
            "duration_minutes": range.duration_minutes(),
        });
        let receipt = match self
            .gateway
            .create_intent(price_amount, currency, metadata)
            .await
        {
            Ok(receipt) => receipt,
            Err(err) => {
                self.abort_unpaid(booking_id, "Payment intent could not be created");
                return Err(BookingError::Gateway {
                    booking_id,
                    message: err.to_string(),
                });
            }
        };

        let transaction = PaymentTransaction::new(
            booking_id,
            receipt.gateway_ref.clone(),
            price_amount,
            currency.to_string(),
            now,
        );
        if let Some(mut entry) = self.bookings.get_mut(&booking_id) {
            entry.payment_reference = Some(receipt.gateway_ref.clone());
        }
        self.transactions
            .insert(receipt.gateway_ref.clone(), transaction);

        info!(
            "Booking {} pending payment for mentor {}, hold expires at {}",
            booking_id, mentor_id, hold.expires_at
        );
        Ok(BookingReceipt {
            booking_id,
            checkout_url: receipt.checkout_url,
            hold_expires_at: hold.expires_at,
        })
    }

    pub fn get_booking(&self, booking_id: Uuid) -> Option<Booking> {
        self.bookings
            .get(&booking_id)
            .map(|entry| entry.value().clone())
    }

    pub fn get_transaction(&self, gateway_ref: &str) -> Option<PaymentTransaction> {
        self.transactions
            .get(gateway_ref)
            .map(|entry| entry.value().clone())
    }

    /// Participant-initiated cancellation. Learners cancelling a CONFIRMED
    /// booking must stay ahead of the cutoff; the refund itself is the
    /// payment collaborator's job, flagged on the published event.
    pub fn cancel_booking(
        &self,
        actor_id: Uuid,
        booking_id: Uuid,
        reason: &str,
    ) -> Result<Booking, BookingError> {
        let now = self.clock.now();

        let (snapshot, event) = {
            let mut entry = self
                .bookings
                .get_mut(&booking_id)
                .ok_or(BookingError::NotFound(booking_id))?;
            let booking = entry.value_mut();

            if booking.learner_id != actor_id && booking.mentor_id != actor_id {
                return Err(BookingError::NotParticipant { actor: actor_id, booking_id });
            }
            if booking.status == BookingStatus::Confirmed && actor_id == booking.learner_id {
                let cutoff =
                    booking.start_time - Duration::hours(self.rules.cancellation_cutoff_hours);
                if now > cutoff {
                    return Err(BookingError::CancellationTooLate { booking_id, cutoff });
                }
            }

            let was = booking.status;
            booking.update_status(transition(booking.status, BookingEvent::Cancel)?, now);
            self.free_calendar(booking.hold_id, was);

            let event = BookingCancelledEvent {
                booking_id,
                mentor_id: booking.mentor_id,
                learner_id: booking.learner_id,
                reason: reason.to_string(),
                refund_due: was == BookingStatus::Confirmed,
                timestamp: now.timestamp(),
            };
            (booking.clone(), event)
        };

        self.expire_transaction(&snapshot, "Booking cancelled before payment resolved", now);
        self.events.publish(EngineEvent::BookingCancelled(event));
        info!("Booking {} cancelled by {}", booking_id, actor_id);
        Ok(snapshot)
    }

    /// Session time elapsed without cancellation. Driven by an external
    /// scheduler collaborator.
    pub fn complete_booking(&self, booking_id: Uuid) -> Result<Booking, BookingError> {
        let now = self.clock.now();
        let mut entry = self
            .bookings
            .get_mut(&booking_id)
            .ok_or(BookingError::NotFound(booking_id))?;
        let booking = entry.value_mut();

        booking.update_status(transition(booking.status, BookingEvent::SessionElapsed)?, now);
        if let Some(hold_id) = booking.hold_id {
            self.slots.vacate(hold_id);
        }

        info!(
            "Booking {} completed, mentor payout {} {}",
            booking_id,
            self.mentor_payout(booking.price_amount),
            booking.currency
        );
        Ok(booking.clone())
    }

    /// Share of the price owed to the mentor once a session completes
    pub fn mentor_payout(&self, price_amount: i32) -> i32 {
        (price_amount as f64 * self.rules.mentor_payout_rate).round() as i32
    }

    /// Cancel PENDING_PAYMENT bookings that outlived the auto-cancel
    /// deadline, freeing their holds. Invoked periodically by an external
    /// scheduler; doubles as the hold-expiry safety net.
    pub fn cancel_stale_pending(&self) -> usize {
        let now = self.clock.now();
        let deadline = now - Duration::hours(self.rules.pending_auto_cancel_hours);

        let stale: Vec<Uuid> = self
            .bookings
            .iter()
            .filter(|entry| {
                entry.status == BookingStatus::PendingPayment && entry.created_at < deadline
            })
            .map(|entry| entry.id)
            .collect();

        let mut cancelled = 0;
        for booking_id in stale {
            let (snapshot, event) = {
                let Some(mut entry) = self.bookings.get_mut(&booking_id) else {
                    continue;
                };
                let booking = entry.value_mut();
                // Re-check under the entry lock; a webhook may have won the race
                if booking.status != BookingStatus::PendingPayment {
                    continue;
                }
                let Ok(next) = transition(booking.status, BookingEvent::Cancel) else {
                    continue;
                };
                booking.update_status(next, now);
                self.free_calendar(booking.hold_id, BookingStatus::PendingPayment);
                let event = BookingCancelledEvent {
                    booking_id,
                    mentor_id: booking.mentor_id,
                    learner_id: booking.learner_id,
                    reason: "Payment was not completed in time".to_string(),
                    refund_due: false,
                    timestamp: now.timestamp(),
                };
                (booking.clone(), event)
            };

            self.expire_transaction(&snapshot, "Payment window elapsed", now);
            self.events.publish(EngineEvent::BookingCancelled(event));
            warn!("Booking {} auto-cancelled after payment window elapsed", booking_id);
            cancelled += 1;
        }

        self.slots.sweep_expired();
        cancelled
    }

    pub(crate) fn meeting_link(&self, booking: &Booking) -> String {
        let room = format!(
            "Mentora-{}-{}-{}",
            booking.id.simple(),
            booking.mentor_id.simple(),
            booking.learner_id.simple()
        );
        format!("{}/{}", self.rules.meeting_base_url, room)
    }

    pub(crate) fn mark_transaction(
        &self,
        gateway_ref: &str,
        status: TransactionStatus,
        failure_reason: Option<&str>,
        now: DateTime<Utc>,
    ) {
        if let Some(mut entry) = self.transactions.get_mut(gateway_ref) {
            if entry.status.is_terminal() {
                return;
            }
            entry.status = status;
            entry.failure_reason = failure_reason.map(str::to_string);
            entry.updated_at = now;
        }
    }

    fn free_calendar(&self, hold_id: Option<Uuid>, was: BookingStatus) {
        let Some(hold_id) = hold_id else { return };
        match was {
            BookingStatus::Confirmed => self.slots.vacate(hold_id),
            _ => self.slots.release(hold_id),
        }
    }

    /// Back out of a booking whose payment intent never materialized
    fn abort_unpaid(&self, booking_id: Uuid, reason: &str) {
        let now = self.clock.now();
        let event = {
            let Some(mut entry) = self.bookings.get_mut(&booking_id) else {
                return;
            };
            let booking = entry.value_mut();
            let Ok(next) = transition(booking.status, BookingEvent::Cancel) else {
                return;
            };
            booking.update_status(next, now);
            self.free_calendar(booking.hold_id, BookingStatus::PendingPayment);
            BookingCancelledEvent {
                booking_id,
                mentor_id: booking.mentor_id,
                learner_id: booking.learner_id,
                reason: reason.to_string(),
                refund_due: false,
                timestamp: now.timestamp(),
            }
        };
        self.events.publish(EngineEvent::BookingCancelled(event));
    }

    fn expire_transaction(&self, booking: &Booking, reason: &str, now: DateTime<Utc>) {
        if let Some(gateway_ref) = &booking.payment_reference {
            self.mark_transaction(gateway_ref, TransactionStatus::Expired, Some(reason), now);
        }
    }
}
