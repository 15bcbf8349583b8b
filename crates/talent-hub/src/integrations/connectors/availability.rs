use chrono::{DateTime, Utc};

use crate::integrations::domain::TimeSlot;

/// Subtracts `busy` intervals from the `[start, end)` window.
///
/// Busy intervals may overlap, be unsorted, or spill past the window edges.
pub fn free_slots(start: DateTime<Utc>, end: DateTime<Utc>, busy: &[TimeSlot]) -> Vec<TimeSlot> {
    if end <= start {
        return Vec::new();
    }

    let mut busy: Vec<TimeSlot> = busy
        .iter()
        .filter(|slot| slot.end > start && slot.start < end && slot.end > slot.start)
        .copied()
        .collect();
    busy.sort_by_key(|slot| slot.start);

    let mut free = Vec::new();
    let mut cursor = start;
    for slot in busy {
        if slot.start > cursor {
            free.push(TimeSlot::new(cursor, slot.start));
        }
        cursor = cursor.max(slot.end);
        if cursor >= end {
            return free;
        }
    }
    free.push(TimeSlot::new(cursor, end));
    free
}
