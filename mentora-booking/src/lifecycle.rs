use serde::{Deserialize, Serialize};

use crate::models::BookingStatus;

/// Everything that can happen to a booking
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingEvent {
    ReservationSucceeded,
    PaymentConfirmed,
    PaymentFailed,
    SessionElapsed,
    Cancel,
}

#[derive(Debug, thiserror::Error)]
#[error("Invalid booking transition: {event:?} is not allowed from {from:?}")]
pub struct InvalidTransitionError {
    pub from: BookingStatus,
    pub event: BookingEvent,
}

/// The transition table. Any (status, event) pair not listed here is
/// rejected and leaves the booking untouched; illegal events are never
/// coerced into a legal state.
pub fn transition(
    from: BookingStatus,
    event: BookingEvent,
) -> Result<BookingStatus, InvalidTransitionError> {
    use BookingEvent::*;
    use BookingStatus::*;

    match (from, event) {
        (Requested, ReservationSucceeded) => Ok(PendingPayment),
        (PendingPayment, PaymentConfirmed) => Ok(Confirmed),
        (PendingPayment, PaymentFailed) => Ok(Cancelled),
        (Confirmed, SessionElapsed) => Ok(Completed),
        (Requested, Cancel) | (PendingPayment, Cancel) | (Confirmed, Cancel) => Ok(Cancelled),
        (from, event) => Err(InvalidTransitionError { from, event }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATUSES: [BookingStatus; 5] = [
        BookingStatus::Requested,
        BookingStatus::PendingPayment,
        BookingStatus::Confirmed,
        BookingStatus::Completed,
        BookingStatus::Cancelled,
    ];

    const EVENTS: [BookingEvent; 5] = [
        BookingEvent::ReservationSucceeded,
        BookingEvent::PaymentConfirmed,
        BookingEvent::PaymentFailed,
        BookingEvent::SessionElapsed,
        BookingEvent::Cancel,
    ];

    fn allowed(from: BookingStatus, event: BookingEvent) -> Option<BookingStatus> {
        use BookingEvent::*;
        use BookingStatus::*;
        match (from, event) {
            (Requested, ReservationSucceeded) => Some(PendingPayment),
            (PendingPayment, PaymentConfirmed) => Some(Confirmed),
            (PendingPayment, PaymentFailed) => Some(Cancelled),
            (Confirmed, SessionElapsed) => Some(Completed),
            (Requested, Cancel) | (PendingPayment, Cancel) | (Confirmed, Cancel) => Some(Cancelled),
            _ => None,
        }
    }

    #[test]
    fn test_happy_path() {
        let mut status = BookingStatus::Requested;
        for (event, expected) in [
            (BookingEvent::ReservationSucceeded, BookingStatus::PendingPayment),
            (BookingEvent::PaymentConfirmed, BookingStatus::Confirmed),
            (BookingEvent::SessionElapsed, BookingStatus::Completed),
        ] {
            status = transition(status, event).unwrap();
            assert_eq!(status, expected);
        }
    }

    #[test]
    fn test_full_transition_matrix() {
        // Every (status, event) pair outside the table is rejected
        for from in STATUSES {
            for event in EVENTS {
                match allowed(from, event) {
                    Some(expected) => {
                        assert_eq!(transition(from, event).unwrap(), expected);
                    }
                    None => {
                        let err = transition(from, event).unwrap_err();
                        assert_eq!(err.from, from);
                        assert_eq!(err.event, event);
                    }
                }
            }
        }
    }

    #[test]
    fn test_terminal_states_accept_nothing() {
        for from in [BookingStatus::Completed, BookingStatus::Cancelled] {
            for event in EVENTS {
                assert!(transition(from, event).is_err());
            }
        }
    }
}
