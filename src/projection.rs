// Velocity projection: the four time-sampled N/S and E/W components that
// go out in every frame.

use crate::approxmath::{cos_approx, sin_approx};
use crate::constants::{MPS_PER_KNOT, PROJECTION_CACHE_MS};
use crate::track::Track;

/// Relative sample times of the four broadcast velocity points, seconds.
/// Receivers treat the points as a 4-point spline around "now".
pub const SAMPLE_TIMES: [f32; 4] = [-1.5, 2.0, 5.5, 9.0];

/// Fill `own.ns`/`own.ew` with the four velocity samples in quarter-m/s,
/// stepping the heading by the current turn rate at each sample time.
///
/// The components are ground-referenced; the wind estimate is deliberately
/// not folded in, matching what deployed units broadcast.
///
/// Results are cached: recomputed only once the cache interval has passed
/// or a newer position has come in.
pub fn project(own: &mut Track, now_ms: u64) {
    if own.proj_time_ms != 0
        && now_ms.saturating_sub(own.proj_time_ms) < PROJECTION_CACHE_MS
        && own.gnsstime_ms <= own.proj_time_ms
    {
        return;
    }

    let speed_qmps = own.speed * MPS_PER_KNOT * 4.0;
    for i in 0..4 {
        let heading = own.course + own.turnrate * SAMPLE_TIMES[i];
        own.ns[i] = (speed_qmps * cos_approx(heading)).round() as i16;
        own.ew[i] = (speed_qmps * sin_approx(heading)).round() as i16;
    }
    own.proj_time_ms = now_ms;
}
