// Traffic table: fixed directory of nearby aircraft with the slot-reuse
// policy, the derived-data refresh and the periodic alarm sweep.

use crate::alarm::{self, AlarmKind};
use crate::approxmath::{approx_hypot, atan2_approx, cos_lat};
use crate::constants::*;
use crate::track::{AlarmLevel, Track};

/// Refresh a target's derived fields against own aircraft: relative
/// geometry, adjusted vertical separation, alarm level and the alert
/// ratchet.
///
/// Distance and bearing use a flat-earth approximation, which is well
/// inside GNSS error at the ranges the radio covers.
pub fn update_derived(own: &Track, fop: &mut Track, kind: AlarmKind) {
    let y = fop.latitude - own.latitude; // degrees north
    let x = (fop.longitude - own.longitude) * cos_lat(own.latitude);
    fop.dy = METERS_PER_DEGREE * y;
    fop.dx = METERS_PER_DEGREE * x;
    fop.distance = approx_hypot(fop.dx, fop.dy);
    fop.bearing = atan2_approx(y, x);
    fop.alt_diff = fop.altitude - own.altitude;
    fop.adj_alt_diff = alarm::adj_alt_diff(own, fop);
    fop.adj_distance = fop.distance + VERTICAL_SLOPE * fop.adj_alt_diff.abs();

    fop.alarm_level = alarm::alarm_level(kind, own, fop);

    // If the target receded, lower the re-alert threshold one step above
    // where it now sits: it must come back one level higher than where it
    // dropped to before a new sound fires.
    if fop.alarm_level < fop.alert_level {
        fop.alert_level = fop.alarm_level.raised();
    }
}

/// Outcome of offering a decoded target to the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insert {
    /// An existing entry with the same address was refreshed.
    Refreshed(usize),
    /// The target took over a free, expired or displaced slot.
    Stored(usize),
    /// Table full and no policy admitted the target.
    Dropped,
}

/// Fixed-capacity traffic directory, keyed by 24-bit address.
pub struct TrafficTable {
    slots: [Track; MAX_TRACKING_OBJECTS],
}

impl Default for TrafficTable {
    fn default() -> Self {
        TrafficTable {
            slots: [Track::default(); MAX_TRACKING_OBJECTS],
        }
    }
}

impl TrafficTable {
    pub fn slots(&self) -> &[Track; MAX_TRACKING_OBJECTS] {
        &self.slots
    }

    pub fn slot_mut(&mut self, ndx: usize) -> &mut Track {
        &mut self.slots[ndx]
    }

    /// Number of occupied slots.
    pub fn count(&self) -> usize {
        self.slots.iter().filter(|t| !t.is_empty()).count()
    }

    /// Offer a freshly decoded target (derived fields already updated).
    ///
    /// Replacement preference when the address is new: an expired slot,
    /// then any entry of strictly lower alarm level, then the farthest
    /// entry by altitude-adjusted distance provided the newcomer is closer
    /// and at least as alarming.
    pub fn insert(&mut self, own: &Track, fo: Track, now: u32) -> Insert {
        // Already tracking this address: overwrite, but preserve the fields
        // that hold history across updates.
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if slot.addr == fo.addr {
                let alert_level = slot.alert_level;
                let prev_course = slot.course;
                let prev_gnsstime_ms = slot.gnsstime_ms;
                *slot = fo;
                slot.alert_level = alert_level;
                slot.prev_course = prev_course;
                slot.prev_gnsstime_ms = prev_gnsstime_ms;
                return Insert::Refreshed(i);
            }
        }

        // A free or expired slot (empty slots have timestamp 0).
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if now.saturating_sub(slot.timestamp) > ENTRY_EXPIRATION_TIME {
                *slot = fo;
                return Insert::Stored(i);
            }
        }

        // Displace the first entry of lower alarm level.
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if fo.alarm_level > slot.alarm_level {
                *slot = fo;
                return Insert::Stored(i);
            }
        }

        // Displace the farthest entry, distance adjusted for altitude gap.
        let mut max_ndx = 0;
        let mut adj_max_dist = 0.0f32;
        for (i, slot) in self.slots.iter().enumerate() {
            let adj = slot.distance + VERTICAL_SLOPE * alarm::adj_alt_diff(own, slot).abs();
            if adj > adj_max_dist {
                max_ndx = i;
                adj_max_dist = adj;
            }
        }
        let fo_adj = fo.distance + VERTICAL_SLOPE * alarm::adj_alt_diff(own, &fo).abs();
        if fo_adj < adj_max_dist && fo.alarm_level >= self.slots[max_ndx].alarm_level {
            self.slots[max_ndx] = fo;
            return Insert::Stored(max_ndx);
        }

        Insert::Dropped
    }

    /// One pass of the traffic loop: expire stale entries, rescore derived
    /// data older than the sweep granularity, and pick the loudest alarm
    /// above CLOSE that has not sounded yet.
    ///
    /// Time is snapshotted from `own.timestamp` at entry so one sweep never
    /// straddles a clock tick.
    pub fn sweep(&mut self, own: &Track, kind: AlarmKind) -> Option<(usize, AlarmLevel)> {
        let now = own.timestamp;
        let mut loudest: Option<(usize, AlarmLevel)> = None;

        for (i, fop) in self.slots.iter_mut().enumerate() {
            if fop.is_empty() {
                continue;
            }
            if now.saturating_sub(fop.timestamp) > ENTRY_EXPIRATION_TIME {
                fop.clear();
                continue;
            }
            if now.saturating_sub(fop.timestamp) >= TRAFFIC_VECTOR_UPDATE_INTERVAL {
                update_derived(own, fop, kind);
            }
            if fop.alarm_level > fop.alert_level && fop.alarm_level > AlarmLevel::Close {
                match loudest {
                    Some((_, lvl)) if fop.alarm_level <= lvl => {}
                    _ => loudest = Some((i, fop.alarm_level)),
                }
            }
        }
        loudest
    }

    /// Record that a sound fired for the given slot: a new sound needs the
    /// alarm to climb at least one level higher.
    pub fn mark_alerted(&mut self, ndx: usize) {
        let fop = &mut self.slots[ndx];
        fop.alert_level = fop.alarm_level.raised();
    }
}
