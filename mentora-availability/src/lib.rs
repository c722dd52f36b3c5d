pub mod expander;
pub mod window;

pub use expander::{covering_slot, expand, mentor_slots, SlotIter};
pub use window::{AvailabilityWindow, InvalidWindowError, Recurrence, Slot};
