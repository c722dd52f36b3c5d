use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use mentora_core::EngineEvent;
use mentora_shared::models::events::{BookingCancelledEvent, BookingConfirmedEvent};

use crate::lifecycle::{transition, BookingEvent, InvalidTransitionError};
use crate::manager::BookingManager;
use crate::models::{BookingStatus, TransactionStatus};

#[derive(Debug, thiserror::Error)]
#[error("Payment for booking {booking_id} (ref {gateway_ref}) arrived after its hold expired")]
pub struct HoldExpiredError {
    pub booking_id: Uuid,
    pub gateway_ref: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("No transaction matches gateway reference {0}")]
    UnknownTransaction(String),

    #[error(transparent)]
    HoldExpired(#[from] HoldExpiredError),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransitionError),
}

enum SuccessOutcome {
    Confirmed(BookingConfirmedEvent),
    // Success landed after the hold was gone; the money needs refunding
    LateArrival {
        newly_cancelled: Option<BookingCancelledEvent>,
    },
}

/// Applies asynchronous gateway outcomes back onto bookings. Signals may
/// arrive redundantly and out of order; every one is validated against
/// the booking's current state before acting, so replays are no-ops and
/// a late success never re-reserves a slot someone else may now own.
pub struct PaymentReconciler {
    manager: Arc<BookingManager>,
}

impl PaymentReconciler {
    pub fn new(manager: Arc<BookingManager>) -> Self {
        Self { manager }
    }

    pub fn on_payment_succeeded(&self, gateway_ref: &str) -> Result<(), ReconcileError> {
        let m = &self.manager;
        let now = m.clock.now();
        let booking_id = self.booking_for(gateway_ref)?;

        let outcome = {
            let mut entry = m
                .bookings
                .get_mut(&booking_id)
                .ok_or_else(|| ReconcileError::UnknownTransaction(gateway_ref.to_string()))?;
            let booking = entry.value_mut();

            match booking.status {
                BookingStatus::Confirmed | BookingStatus::Completed => {
                    info!(
                        "Ignoring replayed success signal {} for booking {}",
                        gateway_ref, booking_id
                    );
                    return Ok(());
                }
                BookingStatus::Cancelled => SuccessOutcome::LateArrival {
                    newly_cancelled: None,
                },
                BookingStatus::PendingPayment => {
                    let committed = match booking.hold_id {
                        Some(hold_id) => m.slots.commit(hold_id).is_ok(),
                        None => false,
                    };
                    if committed {
                        booking.update_status(
                            transition(booking.status, BookingEvent::PaymentConfirmed)?,
                            now,
                        );
                        let link = m.meeting_link(booking);
                        booking.meeting_link = Some(link.clone());
                        SuccessOutcome::Confirmed(BookingConfirmedEvent {
                            booking_id,
                            mentor_id: booking.mentor_id,
                            learner_id: booking.learner_id,
                            session_start: booking.start_time.timestamp(),
                            meeting_link: link,
                            timestamp: now.timestamp(),
                        })
                    } else {
                        // The hold lapsed while the signal was in flight; the
                        // slot may already belong to someone else
                        booking.update_status(
                            transition(booking.status, BookingEvent::PaymentFailed)?,
                            now,
                        );
                        SuccessOutcome::LateArrival {
                            newly_cancelled: Some(BookingCancelledEvent {
                                booking_id,
                                mentor_id: booking.mentor_id,
                                learner_id: booking.learner_id,
                                reason: "Payment arrived after the hold expired".to_string(),
                                refund_due: true,
                                timestamp: now.timestamp(),
                            }),
                        }
                    }
                }
                BookingStatus::Requested => {
                    let err = InvalidTransitionError {
                        from: booking.status,
                        event: BookingEvent::PaymentConfirmed,
                    };
                    error!("Success signal {} hit an unreserved booking: {}", gateway_ref, err);
                    return Err(err.into());
                }
            }
        };

        match outcome {
            SuccessOutcome::Confirmed(event) => {
                m.mark_transaction(gateway_ref, TransactionStatus::Completed, None, now);
                m.events.publish(EngineEvent::BookingConfirmed(event));
                info!("Booking {} confirmed via gateway signal {}", booking_id, gateway_ref);
                Ok(())
            }
            SuccessOutcome::LateArrival { newly_cancelled } => {
                m.mark_transaction(
                    gateway_ref,
                    TransactionStatus::Expired,
                    Some("Success signal arrived after hold expiry"),
                    now,
                );
                if let Some(event) = newly_cancelled {
                    m.events.publish(EngineEvent::BookingCancelled(event));
                }
                warn!(
                    "Late success signal {} for booking {}; refund workflow required",
                    gateway_ref, booking_id
                );
                Err(HoldExpiredError {
                    booking_id,
                    gateway_ref: gateway_ref.to_string(),
                }
                .into())
            }
        }
    }

    pub fn on_payment_failed_or_expired(&self, gateway_ref: &str) -> Result<(), ReconcileError> {
        let m = &self.manager;
        let now = m.clock.now();
        let booking_id = self.booking_for(gateway_ref)?;

        let cancelled = {
            let mut entry = m
                .bookings
                .get_mut(&booking_id)
                .ok_or_else(|| ReconcileError::UnknownTransaction(gateway_ref.to_string()))?;
            let booking = entry.value_mut();

            match booking.status {
                BookingStatus::Cancelled => {
                    info!(
                        "Ignoring replayed failure signal {} for booking {}",
                        gateway_ref, booking_id
                    );
                    return Ok(());
                }
                BookingStatus::PendingPayment => {
                    if let Some(hold_id) = booking.hold_id {
                        m.slots.release(hold_id);
                    }
                    booking.update_status(
                        transition(booking.status, BookingEvent::PaymentFailed)?,
                        now,
                    );
                    BookingCancelledEvent {
                        booking_id,
                        mentor_id: booking.mentor_id,
                        learner_id: booking.learner_id,
                        reason: "Payment failed or expired".to_string(),
                        refund_due: false,
                        timestamp: now.timestamp(),
                    }
                }
                other => {
                    // Failure reported for a booking the gateway already
                    // confirmed (or that never reached payment): an
                    // integration defect, never coerced
                    let err = InvalidTransitionError {
                        from: other,
                        event: BookingEvent::PaymentFailed,
                    };
                    error!("Failure signal {} rejected: {}", gateway_ref, err);
                    return Err(err.into());
                }
            }
        };

        m.mark_transaction(
            gateway_ref,
            TransactionStatus::Failed,
            Some("Gateway reported failure or expiry"),
            now,
        );
        m.events.publish(EngineEvent::BookingCancelled(cancelled));
        info!("Booking {} cancelled via gateway signal {}", booking_id, gateway_ref);
        Ok(())
    }

    fn booking_for(&self, gateway_ref: &str) -> Result<Uuid, ReconcileError> {
        self.manager
            .transactions
            .get(gateway_ref)
            .map(|tx| tx.booking_id)
            .ok_or_else(|| ReconcileError::UnknownTransaction(gateway_ref.to_string()))
    }
}
