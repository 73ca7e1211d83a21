// Collision alarm engine: interchangeable threat scorers and the shared
// vertical-adjustment model.

use crate::approxmath::{approx_hypot, atan2_approx, cos_approx, sin_approx};
use crate::constants::*;
use crate::track::{AlarmLevel, Track};

/// Scorer selected once at startup from the alarm setting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AlarmKind {
    /// No alarms from the firmware; a flight computer downstream decides.
    None,
    #[default]
    Distance,
    Vector,
    /// Reserved: scoring from the four broadcast velocity samples.
    Legacy,
}

impl AlarmKind {
    pub fn from_setting(v: u8) -> Self {
        match v {
            0 => AlarmKind::None,
            2 => AlarmKind::Vector,
            3 => AlarmKind::Legacy,
            _ => AlarmKind::Distance,
        }
    }
}

/// Score one target against own aircraft. The target's derived fields
/// (`distance`, `bearing`, `alt_diff`) must be current.
pub fn alarm_level(kind: AlarmKind, own: &Track, fop: &Track) -> AlarmLevel {
    match kind {
        AlarmKind::None => AlarmLevel::None,
        AlarmKind::Distance => alarm_distance(own, fop),
        AlarmKind::Vector => alarm_vector(own, fop),
        AlarmKind::Legacy => alarm_legacy(own, fop),
    }
}

/// Altitude difference adjusted for relative vertical speed, with a
/// dead-band for fuzzy GNSS altitudes.
///
/// Positive input means the target is above us. The adjustment only ever
/// moves the difference towards zero (towards a higher alarm level), and
/// the magnitude of the result never exceeds `|fop.alt_diff|`.
pub fn adj_alt_diff(own: &Track, fop: &Track) -> f32 {
    let mut alt_diff = fop.alt_diff;
    let vsr = (fop.vs - own.vs).clamp(-1000.0, 1000.0);
    // expected change over the next 10 seconds, in metres
    let alt_change = vsr * 0.05;

    if alt_diff > 0.0 && alt_change < 0.0 {
        alt_diff += alt_change;
        if alt_diff < 0.0 {
            return 0.0;
        }
    } else if alt_diff < 0.0 && alt_change > 0.0 {
        alt_diff += alt_change;
        if alt_diff > 0.0 {
            return 0.0;
        }
    }

    if alt_diff > 0.0 {
        if alt_diff < VERTICAL_SLACK {
            return 0.0;
        }
        return alt_diff - VERTICAL_SLACK;
    }
    if -alt_diff < VERTICAL_SLACK {
        return 0.0;
    }
    alt_diff + VERTICAL_SLACK
}

/// Simple distance-based level assignment.
fn alarm_distance(own: &Track, fop: &Track) -> AlarmLevel {
    if own.prev_gnsstime_ms == 0 {
        return AlarmLevel::None;
    }

    let distance = fop.distance;
    if distance > 2.0 * ALARM_ZONE_CLOSE || fop.alt_diff.abs() > 2.0 * VERTICAL_SEPARATION {
        return AlarmLevel::None;
    }

    let abs_alt_diff = adj_alt_diff(own, fop).abs();
    if abs_alt_diff >= VERTICAL_SEPARATION {
        return AlarmLevel::None;
    }

    let eff_dist = VERTICAL_SLOPE * abs_alt_diff + distance;
    if eff_dist < ALARM_ZONE_URGENT {
        AlarmLevel::Urgent
    } else if eff_dist < ALARM_ZONE_IMPORTANT {
        AlarmLevel::Important
    } else if eff_dist < ALARM_ZONE_LOW {
        AlarmLevel::Low
    } else if eff_dist < ALARM_ZONE_CLOSE {
        AlarmLevel::Close
    } else {
        AlarmLevel::None
    }
}

/// Linear course-and-speed collision prediction.
fn alarm_vector(own: &Track, fop: &Track) -> AlarmLevel {
    if own.prev_gnsstime_ms == 0
        || fop.gnsstime_ms.saturating_sub(fop.prev_gnsstime_ms) > 3000
    {
        return AlarmLevel::None;
    }

    let distance = fop.distance;
    if distance > 2.0 * ALARM_ZONE_CLOSE || fop.alt_diff.abs() > 2.0 * VERTICAL_SEPARATION {
        return AlarmLevel::None;
    }

    // closing-time horizon; speeds are knots here
    if distance / (fop.speed + own.speed) > ALARM_TIME_CLOSE * MPS_PER_KNOT {
        return AlarmLevel::None;
    }

    // linear prediction is useless for circling traffic
    if own.turnrate.abs() > 3.0 || fop.turnrate.abs() > 3.0 {
        return alarm_distance(own, fop);
    }

    let abs_alt_diff = adj_alt_diff(own, fop).abs();
    if abs_alt_diff >= VERTICAL_SEPARATION {
        return AlarmLevel::None;
    }

    let v_rel_ns = own.speed * cos_approx(own.course) - fop.speed * cos_approx(fop.course);
    let v_rel_ew = own.speed * sin_approx(own.course) - fop.speed * sin_approx(fop.course);
    let v_rel_magnitude = approx_hypot(v_rel_ns, v_rel_ew) * MPS_PER_KNOT;
    // direction the target closes from
    let v_rel_direction = atan2_approx(v_rel_ns, v_rel_ew);

    if v_rel_magnitude <= ALARM_VECTOR_SPEED {
        return AlarmLevel::None;
    }

    // seconds to impact, altitude gap folded in
    let t = (distance + VERTICAL_SLOPE * abs_alt_diff) / v_rel_magnitude;
    let rel_angle = (v_rel_direction - fop.bearing).abs();

    if rel_angle < ALARM_VECTOR_ANGLE {
        if t < ALARM_TIME_URGENT {
            AlarmLevel::Urgent
        } else if t < ALARM_TIME_IMPORTANT {
            AlarmLevel::Important
        } else if t < ALARM_TIME_LOW {
            AlarmLevel::Low
        } else if t < ALARM_TIME_CLOSE {
            AlarmLevel::Close
        } else {
            AlarmLevel::None
        }
    } else if rel_angle < 2.0 * ALARM_VECTOR_ANGLE {
        // less direct approach, one tier down
        if t < ALARM_TIME_URGENT {
            AlarmLevel::Important
        } else if t < ALARM_TIME_IMPORTANT {
            AlarmLevel::Low
        } else if t < ALARM_TIME_LOW {
            AlarmLevel::Close
        } else {
            AlarmLevel::None
        }
    } else if rel_angle < 3.0 * ALARM_VECTOR_ANGLE {
        if t < ALARM_TIME_URGENT {
            AlarmLevel::Low
        } else if t < ALARM_TIME_IMPORTANT {
            AlarmLevel::Close
        } else {
            AlarmLevel::None
        }
    } else {
        AlarmLevel::None
    }
}

/// Reserved: meant to work from the four velocity samples each frame
/// carries, the way the weak early hardware presumably intended.
fn alarm_legacy(_own: &Track, _fop: &Track) -> AlarmLevel {
    AlarmLevel::None
}
