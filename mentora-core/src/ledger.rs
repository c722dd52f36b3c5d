use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;
use uuid::Uuid;

use crate::clock::Clock;

/// State of a claim recorded in the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimState {
    Held { expires_at: DateTime<Utc> },
    Committed,
}

#[derive(Debug, Clone)]
pub struct ActiveClaim<C> {
    pub id: Uuid,
    pub claim: C,
    pub state: ClaimState,
}

impl<C> ActiveClaim<C> {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.state, ClaimState::Held { expires_at } if expires_at <= now)
    }
}

/// Decides whether a candidate claim may join a key's active claims.
/// Range-overlap for slot reservation, counting for quota.
pub trait AdmissionPolicy: Send + Sync {
    type Claim: Clone + Send + Sync + 'static;
    type Rejection;

    fn admit(
        &self,
        active: &[ActiveClaim<Self::Claim>],
        candidate: &Self::Claim,
    ) -> Result<(), Self::Rejection>;
}

/// Receipt for a successful hold
#[derive(Debug, Clone, Copy)]
pub struct HoldTicket {
    pub hold_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Hold {0} has expired or was never taken")]
    HoldExpired(Uuid),
}

/// Keyed two-phase reservation ledger: hold, then commit or release.
///
/// The check-and-insert for one key runs under that key's map entry, so
/// serialization is scoped to the key and unrelated keys stay concurrent.
/// Expired holds are swept on any access to their key; `sweep_expired`
/// is the periodic safety net.
pub struct ReservationLedger<K, P: AdmissionPolicy> {
    policy: P,
    clock: Arc<dyn Clock>,
    hold_ttl: Duration,
    claims: DashMap<K, Vec<ActiveClaim<P::Claim>>>,
    // claim id -> key, so commit/release don't need the caller to re-supply the key
    index: DashMap<Uuid, K>,
}

impl<K, P> ReservationLedger<K, P>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    P: AdmissionPolicy,
{
    pub fn new(policy: P, clock: Arc<dyn Clock>, hold_ttl: Duration) -> Self {
        Self {
            policy,
            clock,
            hold_ttl,
            claims: DashMap::new(),
            index: DashMap::new(),
        }
    }

    pub fn hold_ttl(&self) -> Duration {
        self.hold_ttl
    }

    /// Atomically check the candidate against the key's active claims and
    /// record a hold for it. Expired holds on the key are swept first.
    pub fn hold(&self, key: K, claim: P::Claim) -> Result<HoldTicket, P::Rejection> {
        let now = self.clock.now();
        let ticket = HoldTicket {
            hold_id: Uuid::new_v4(),
            expires_at: now + self.hold_ttl,
        };

        let swept;
        let outcome = {
            let mut bucket = self.claims.entry(key.clone()).or_default();
            swept = Self::sweep_bucket(&mut bucket, now);
            match self.policy.admit(&bucket, &claim) {
                Ok(()) => {
                    bucket.push(ActiveClaim {
                        id: ticket.hold_id,
                        claim,
                        state: ClaimState::Held {
                            expires_at: ticket.expires_at,
                        },
                    });
                    Ok(())
                }
                Err(rejection) => Err(rejection),
            }
        };
        self.unindex(&swept);

        outcome?;
        self.index.insert(ticket.hold_id, key);
        Ok(ticket)
    }

    /// Promote a held claim to committed. Re-committing is a no-op; a hold
    /// that lapsed (or never existed) fails with `HoldExpired`.
    pub fn commit(&self, hold_id: Uuid) -> Result<(), LedgerError> {
        let key = match self.index.get(&hold_id).map(|entry| entry.value().clone()) {
            Some(key) => key,
            None => return Err(LedgerError::HoldExpired(hold_id)),
        };
        let now = self.clock.now();

        let mut swept = Vec::new();
        let outcome = match self.claims.get_mut(&key) {
            Some(mut bucket) => {
                swept = Self::sweep_bucket(&mut bucket, now);
                match bucket.iter_mut().find(|c| c.id == hold_id) {
                    Some(claim) => {
                        claim.state = ClaimState::Committed;
                        Ok(())
                    }
                    None => Err(LedgerError::HoldExpired(hold_id)),
                }
            }
            None => Err(LedgerError::HoldExpired(hold_id)),
        };
        self.unindex(&swept);
        outcome
    }

    /// Drop a held claim. Idempotent: releasing an unknown, already
    /// released, or already committed claim is a no-op.
    pub fn release(&self, hold_id: Uuid) {
        let key = match self.index.get(&hold_id).map(|entry| entry.value().clone()) {
            Some(key) => key,
            None => return,
        };
        let now = self.clock.now();

        let mut swept = Vec::new();
        let mut removed = false;
        if let Some(mut bucket) = self.claims.get_mut(&key) {
            swept = Self::sweep_bucket(&mut bucket, now);
            if let Some(pos) = bucket
                .iter()
                .position(|c| c.id == hold_id && matches!(c.state, ClaimState::Held { .. }))
            {
                bucket.remove(pos);
                removed = true;
            }
        }
        self.unindex(&swept);
        if removed {
            self.index.remove(&hold_id);
        }
    }

    /// Remove a committed claim, freeing its capacity. No-op for claims
    /// that are unknown or still held.
    pub fn vacate(&self, claim_id: Uuid) {
        let key = match self.index.get(&claim_id).map(|entry| entry.value().clone()) {
            Some(key) => key,
            None => return,
        };

        let mut removed = false;
        if let Some(mut bucket) = self.claims.get_mut(&key) {
            if let Some(pos) = bucket
                .iter()
                .position(|c| c.id == claim_id && c.state == ClaimState::Committed)
            {
                bucket.remove(pos);
                removed = true;
            }
        }
        if removed {
            self.index.remove(&claim_id);
        }
    }

    /// Drop expired holds across every key, returning how many were freed
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut swept = Vec::new();
        for mut entry in self.claims.iter_mut() {
            swept.extend(Self::sweep_bucket(entry.value_mut(), now));
        }
        self.unindex(&swept);
        swept.len()
    }

    /// Drop every claim under keys the predicate rejects (e.g. elapsed
    /// quota periods). Returns how many claims were dropped.
    pub fn retain_keys<F>(&self, mut keep: F) -> usize
    where
        F: FnMut(&K) -> bool,
    {
        let mut dropped = Vec::new();
        self.claims.retain(|key, bucket| {
            if keep(key) {
                true
            } else {
                dropped.extend(bucket.iter().map(|c| c.id));
                false
            }
        });
        self.unindex(&dropped);
        dropped.len()
    }

    /// Snapshot of a key's live claims, after sweeping
    pub fn active(&self, key: &K) -> Vec<ActiveClaim<P::Claim>> {
        let now = self.clock.now();
        let mut swept = Vec::new();
        let snapshot = match self.claims.get_mut(key) {
            Some(mut bucket) => {
                swept = Self::sweep_bucket(&mut bucket, now);
                bucket.clone()
            }
            None => Vec::new(),
        };
        self.unindex(&swept);
        snapshot
    }

    pub fn state_of(&self, claim_id: Uuid) -> Option<ClaimState> {
        let key = self.index.get(&claim_id).map(|entry| entry.value().clone())?;
        let bucket = self.claims.get(&key)?;
        bucket.iter().find(|c| c.id == claim_id).map(|c| c.state)
    }

    fn sweep_bucket(bucket: &mut Vec<ActiveClaim<P::Claim>>, now: DateTime<Utc>) -> Vec<Uuid> {
        let mut removed = Vec::new();
        bucket.retain(|c| {
            if c.is_expired(now) {
                removed.push(c.id);
                false
            } else {
                true
            }
        });
        removed
    }

    fn unindex(&self, ids: &[Uuid]) {
        for id in ids {
            self.index.remove(id);
        }
    }
}
