use chrono::{DateTime, Duration, Months, Utc};
use mentora_shared::TimeRange;

use crate::window::{AvailabilityWindow, Recurrence, Slot};

/// Horizon for a recurring window the mentor gave no end date
const DEFAULT_RECURRENCE_MONTHS: u32 = 3;

/// Lazy expansion of one window into the concrete slots intersecting a
/// query range. Occurrences step from the window's original start; the
/// iterator ends at the recurrence end or the query's upper bound,
/// whichever comes sooner.
pub struct SlotIter<'a> {
    window: &'a AvailabilityWindow,
    cursor: Option<DateTime<Utc>>,
    step: Option<Duration>,
    until: Option<DateTime<Utc>>,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
}

/// Expand `window` into the slots intersecting `[from, to)`
pub fn expand<'a>(
    window: &'a AvailabilityWindow,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> SlotIter<'a> {
    let step = match window.recurrence {
        Recurrence::None => None,
        Recurrence::Daily => Some(Duration::days(1)),
        Recurrence::Weekly => Some(Duration::days(7)),
    };
    let until = step.map(|_| {
        window
            .recurrence_end
            .unwrap_or(window.start_time + Months::new(DEFAULT_RECURRENCE_MONTHS))
    });

    SlotIter {
        window,
        cursor: Some(window.start_time),
        step,
        until,
        from,
        to,
    }
}

impl Iterator for SlotIter<'_> {
    type Item = Slot;

    fn next(&mut self) -> Option<Slot> {
        let duration = self.window.duration();

        loop {
            let start = self.cursor?;
            if start >= self.to {
                self.cursor = None;
                return None;
            }
            if let Some(until) = self.until {
                if start >= until {
                    self.cursor = None;
                    return None;
                }
            }

            self.cursor = self.step.map(|step| start + step);

            let end = start + duration;
            if end > self.from {
                return Some(Slot {
                    mentor_id: self.window.mentor_id,
                    start,
                    end,
                });
            }
            // Occurrence lies entirely before the query range; keep stepping
        }
    }
}

/// All of a mentor's slots across several windows, ordered by start.
/// Overlapping windows are not merged here; that is the reservation
/// coordinator's concern.
pub fn mentor_slots(
    windows: &[AvailabilityWindow],
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Vec<Slot> {
    let mut slots: Vec<Slot> = windows
        .iter()
        .flat_map(|window| expand(window, from, to))
        .collect();
    slots.sort_by_key(|slot| slot.start);
    slots
}

/// Find the expanded slot that fully contains a requested booking range
pub fn covering_slot(windows: &[AvailabilityWindow], range: TimeRange) -> Option<Slot> {
    windows
        .iter()
        .flat_map(|window| expand(window, range.start, range.end))
        .find(|slot| slot.range().contains(&range))
}
