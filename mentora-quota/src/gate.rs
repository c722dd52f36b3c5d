use chrono::{DateTime, Duration, Utc};
use mentora_core::{
    ActiveClaim, AdmissionPolicy, Clock, EngineEvent, EventBus, ReservationLedger,
};
use mentora_shared::models::events::QuotaDeniedEvent;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::features::{FeatureKind, QuotaPolicy};
use crate::period::Period;

/// One unit of usage, tagged with the ceiling that applied when it was taken
#[derive(Debug, Clone, Copy)]
struct UnitClaim {
    ceiling: u32,
}

/// Admits units while the key's active count stays under the ceiling
struct CeilingPolicy;

impl AdmissionPolicy for CeilingPolicy {
    type Claim = UnitClaim;
    type Rejection = u32;

    fn admit(&self, active: &[ActiveClaim<UnitClaim>], candidate: &UnitClaim) -> Result<(), u32> {
        let used = active.len() as u32;
        if used >= candidate.ceiling {
            Err(used)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct QuotaKey {
    user_id: Uuid,
    feature: FeatureKind,
    period_start: DateTime<Utc>,
}

/// Proof that one unit of quota was reserved
#[derive(Debug, Clone, Copy)]
pub enum QuotaGrant {
    /// The feature has no configured ceiling
    Unlimited,
    Held { hold_id: Uuid, period: Period },
}

#[derive(Debug, thiserror::Error)]
#[error("Quota exhausted for {feature:?}: {used}/{ceiling} used in period {period}")]
pub struct QuotaExceededError {
    pub user_id: Uuid,
    pub feature: FeatureKind,
    pub ceiling: u32,
    pub used: u32,
    pub period: Period,
}

/// Enforces per-period usage ceilings with the same hold/commit/release
/// shape as slot reservation. The check-and-increment serializes per
/// (user, feature, period); unrelated users stay concurrent.
pub struct UsageQuotaGate {
    clock: Arc<dyn Clock>,
    policies: HashMap<FeatureKind, QuotaPolicy>,
    events: EventBus,
    ledger: ReservationLedger<QuotaKey, CeilingPolicy>,
}

impl UsageQuotaGate {
    pub fn new(
        clock: Arc<dyn Clock>,
        policies: HashMap<FeatureKind, QuotaPolicy>,
        events: EventBus,
        hold_ttl: Duration,
    ) -> Self {
        Self {
            ledger: ReservationLedger::new(CeilingPolicy, clock.clone(), hold_ttl),
            clock,
            policies,
            events,
        }
    }

    /// Build the policy table from configured plan limits
    pub fn from_rules(
        clock: Arc<dyn Clock>,
        rules: &mentora_core::QuotaRules,
        events: EventBus,
        hold_ttl: Duration,
    ) -> Self {
        use crate::period::ResetPeriod;

        let policies = HashMap::from([
            (
                FeatureKind::AiChatbotRequests,
                QuotaPolicy {
                    ceiling: rules.ai_chat_daily,
                    reset: ResetPeriod::Daily,
                },
            ),
            (
                FeatureKind::AiRoadmapGeneration,
                QuotaPolicy {
                    ceiling: rules.ai_roadmap_monthly,
                    reset: ResetPeriod::Monthly,
                },
            ),
            (
                FeatureKind::MentorBooking,
                QuotaPolicy {
                    ceiling: rules.mentor_booking_monthly,
                    reset: ResetPeriod::Monthly,
                },
            ),
        ]);
        Self::new(clock, policies, events, hold_ttl)
    }

    /// Reserve one unit against the feature's current period. The hold is
    /// visible to concurrent checks, so two requests racing past the
    /// ceiling cannot both win.
    pub fn try_consume(
        &self,
        user_id: Uuid,
        feature: FeatureKind,
    ) -> Result<QuotaGrant, QuotaExceededError> {
        let Some(policy) = self.policies.get(&feature) else {
            return Ok(QuotaGrant::Unlimited);
        };

        let now = self.clock.now();
        let period = Period::containing(now, policy.reset);
        let key = QuotaKey {
            user_id,
            feature,
            period_start: period.start,
        };

        match self.ledger.hold(
            key,
            UnitClaim {
                ceiling: policy.ceiling,
            },
        ) {
            Ok(ticket) => Ok(QuotaGrant::Held {
                hold_id: ticket.hold_id,
                period,
            }),
            Err(used) => {
                let err = QuotaExceededError {
                    user_id,
                    feature,
                    ceiling: policy.ceiling,
                    used,
                    period,
                };
                warn!("{}", err);
                self.events.publish(EngineEvent::QuotaDenied(QuotaDeniedEvent {
                    user_id,
                    feature: feature.as_str().to_string(),
                    period_start: period.start.timestamp(),
                    period_end: period.end.timestamp(),
                    timestamp: now.timestamp(),
                }));
                Err(err)
            }
        }
    }

    /// Finalize a reservation once the gated action succeeded
    pub fn commit(&self, grant: &QuotaGrant) {
        if let QuotaGrant::Held { hold_id, .. } = grant {
            if self.ledger.commit(*hold_id).is_err() {
                warn!("Quota hold {} lapsed before commit", hold_id);
            }
        }
    }

    /// Compensate a reservation whose downstream action failed. Idempotent.
    pub fn release(&self, grant: &QuotaGrant) {
        if let QuotaGrant::Held { hold_id, .. } = grant {
            self.ledger.release(*hold_id);
        }
    }

    /// Units (held + committed) consumed in the feature's current period
    pub fn current_usage(&self, user_id: Uuid, feature: FeatureKind) -> u32 {
        let Some(policy) = self.policies.get(&feature) else {
            return 0;
        };
        let period = Period::containing(self.clock.now(), policy.reset);
        let key = QuotaKey {
            user_id,
            feature,
            period_start: period.start,
        };
        self.ledger.active(&key).len() as u32
    }

    pub fn sweep_expired(&self) -> usize {
        self.ledger.sweep_expired()
    }

    /// Drop accounting for periods that have fully elapsed
    pub fn purge_elapsed_periods(&self) -> usize {
        let now = self.clock.now();
        let policies = &self.policies;
        self.ledger.retain_keys(|key| match policies.get(&key.feature) {
            Some(policy) => Period::containing(key.period_start, policy.reset).end > now,
            None => false,
        })
    }
}
