use chrono::{DateTime, Duration, Utc};
use mentora_core::{
    ActiveClaim, AdmissionPolicy, Clock, ClaimState, LedgerError, ReservationLedger,
};
use mentora_shared::TimeRange;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// The claim one booking makes on a mentor's calendar
#[derive(Debug, Clone, Copy)]
pub struct SlotClaim {
    pub booking_id: Uuid,
    pub range: TimeRange,
}

/// Rejects a candidate that overlaps any active claim, naming the
/// colliding claim
struct OverlapPolicy;

impl AdmissionPolicy for OverlapPolicy {
    type Claim = SlotClaim;
    type Rejection = SlotClaim;

    fn admit(&self, active: &[ActiveClaim<SlotClaim>], candidate: &SlotClaim) -> Result<(), SlotClaim> {
        match active.iter().find(|c| c.claim.range.overlaps(&candidate.range)) {
            Some(colliding) => Err(colliding.claim),
            None => Ok(()),
        }
    }
}

/// An ephemeral claim on a slot, pending payment resolution
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReservationHold {
    pub hold_id: Uuid,
    pub mentor_id: Uuid,
    pub booking_id: Uuid,
    pub range: TimeRange,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
#[error("Mentor {mentor_id} has no room for {requested}: collides with {conflicting}")]
pub struct SlotConflictError {
    pub mentor_id: Uuid,
    pub requested: TimeRange,
    pub conflicting: TimeRange,
}

/// Guards mentors' calendars: at most one live claim for any overlapping
/// time range per mentor, even under concurrent requests. The check-and-
/// insert serializes per mentor only, so unrelated mentors never wait on
/// each other.
pub struct SlotReservationCoordinator {
    ledger: ReservationLedger<Uuid, OverlapPolicy>,
}

impl SlotReservationCoordinator {
    pub fn new(clock: Arc<dyn Clock>, hold_ttl: Duration) -> Self {
        Self {
            ledger: ReservationLedger::new(OverlapPolicy, clock, hold_ttl),
        }
    }

    /// Atomically claim `range` on the mentor's calendar for a booking.
    /// Expired holds on that calendar are swept as part of the check.
    pub fn reserve(
        &self,
        mentor_id: Uuid,
        range: TimeRange,
        booking_id: Uuid,
    ) -> Result<ReservationHold, SlotConflictError> {
        let claim = SlotClaim { booking_id, range };
        match self.ledger.hold(mentor_id, claim) {
            Ok(ticket) => Ok(ReservationHold {
                hold_id: ticket.hold_id,
                mentor_id,
                booking_id,
                range,
                expires_at: ticket.expires_at,
            }),
            Err(colliding) => Err(SlotConflictError {
                mentor_id,
                requested: range,
                conflicting: colliding.range,
            }),
        }
    }

    /// Turn a hold into a durable claim once payment confirmed
    pub fn commit(&self, hold_id: Uuid) -> Result<(), LedgerError> {
        self.ledger.commit(hold_id)
    }

    /// Give a hold back. Idempotent: releasing twice, or releasing a
    /// committed hold, is a no-op.
    pub fn release(&self, hold_id: Uuid) {
        self.ledger.release(hold_id);
    }

    /// Free a committed claim after the booking is cancelled or completed
    pub fn vacate(&self, hold_id: Uuid) {
        self.ledger.vacate(hold_id);
    }

    /// Safety-net sweep; the per-calendar sweep already runs on access
    pub fn sweep_expired(&self) -> usize {
        self.ledger.sweep_expired()
    }

    pub fn hold_state(&self, hold_id: Uuid) -> Option<ClaimState> {
        self.ledger.state_of(hold_id)
    }

    /// Live claims on one mentor's calendar
    pub fn active_claims(&self, mentor_id: Uuid) -> Vec<ActiveClaim<SlotClaim>> {
        self.ledger.active(&mentor_id)
    }
}
