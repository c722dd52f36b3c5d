use chrono::{DateTime, Datelike, Duration, Months, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResetPeriod {
    Daily,
    Monthly,
}

/// One quota accounting window `[start, end)`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Period {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Period {
    /// The period containing `now`. Boundaries always come from the
    /// gate's reference clock, never from caller-supplied time.
    pub fn containing(now: DateTime<Utc>, reset: ResetPeriod) -> Self {
        let today = now.date_naive();
        match reset {
            ResetPeriod::Daily => {
                let start = today.and_time(NaiveTime::MIN).and_utc();
                Period {
                    start,
                    end: start + Duration::days(1),
                }
            }
            ResetPeriod::Monthly => {
                let first = today.with_day(1).unwrap_or(today);
                let start = first.and_time(NaiveTime::MIN).and_utc();
                Period {
                    start,
                    end: start + Months::new(1),
                }
            }
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {})",
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d")
        )
    }
}
