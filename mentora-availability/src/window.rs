use chrono::{DateTime, Utc};
use mentora_shared::TimeRange;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recurrence {
    None,
    Daily,
    Weekly,
}

/// Mentor-declared availability, possibly recurring. Concrete slots are
/// computed on read, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityWindow {
    pub id: Uuid,
    pub mentor_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub recurrence: Recurrence,
    pub recurrence_end: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AvailabilityWindow {
    pub fn new(
        mentor_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        recurrence: Recurrence,
        recurrence_end: Option<DateTime<Utc>>,
    ) -> Result<Self, InvalidWindowError> {
        if start_time >= end_time {
            return Err(InvalidWindowError::EmptyRange {
                start: start_time,
                end: end_time,
            });
        }
        if let Some(recurrence_end) = recurrence_end {
            if recurrence_end < start_time {
                return Err(InvalidWindowError::RecurrenceEndsBeforeStart {
                    start: start_time,
                    recurrence_end,
                });
            }
        }

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            mentor_id,
            start_time,
            end_time,
            recurrence,
            recurrence_end,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn duration(&self) -> chrono::Duration {
        self.end_time - self.start_time
    }
}

/// One concrete bookable range derived from a window. Identity is
/// (mentor_id, start, end).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Slot {
    pub mentor_id: Uuid,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Slot {
    pub fn range(&self) -> TimeRange {
        TimeRange::new(self.start, self.end)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InvalidWindowError {
    #[error("Window must end after it starts: {start} >= {end}")]
    EmptyRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("Recurrence ends at {recurrence_end}, before the window starts at {start}")]
    RecurrenceEndsBeforeStart {
        start: DateTime<Utc>,
        recurrence_end: DateTime<Utc>,
    },
}
