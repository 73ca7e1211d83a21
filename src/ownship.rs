// Own-aircraft state: GNSS fix intake, turn and climb estimation,
// airborne detection and address management.

use rand::Rng;

use crate::constants::*;
use crate::drivers::GnssFix;
use crate::track::{AddrType, Track};

/// Own aircraft plus the estimation state that does not belong in the
/// broadcastable record.
pub struct OwnShip {
    pub track: Track,
    /// Pressure altitude last seen while on the ground.
    ground_alt_baseline: Option<f32>,
    /// When the vertical speed first exceeded the airborne threshold.
    vs_exceed_since_ms: Option<u64>,
    /// Baro climb rate; preferred over the GNSS altitude derivative.
    baro_vs: Option<f32>,
}

impl OwnShip {
    pub fn new(track: Track) -> Self {
        OwnShip {
            track,
            ground_alt_baseline: None,
            vs_exceed_since_ms: None,
            baro_vs: None,
        }
    }

    /// Fold in a GNSS fix: position, course, speed, plus the derived turn
    /// rate and (without a baro) climb rate. Keeps a one-sample history
    /// for the alarm engine.
    pub fn update_fix(&mut self, fix: &GnssFix) {
        let t = &mut self.track;

        let dt_ms = fix.millis.saturating_sub(t.gnsstime_ms);
        if t.gnsstime_ms != 0 && dt_ms > 0 {
            let dt = dt_ms as f32 / 1000.0;
            let mut dc = fix.course - t.course;
            if dc > 180.0 {
                dc -= 360.0;
            } else if dc < -180.0 {
                dc += 360.0;
            }
            t.turnrate = dc / dt;
            if self.baro_vs.is_none() {
                t.vs = (fix.altitude - t.altitude) / dt * FEET_PER_METER * 60.0;
            }
        }
        if let Some(vs) = self.baro_vs {
            t.vs = vs;
        }

        t.prev_course = t.course;
        t.prev_gnsstime_ms = t.gnsstime_ms;
        t.latitude = fix.latitude;
        t.longitude = fix.longitude;
        t.altitude = fix.altitude;
        t.geoid_separation = fix.geoid_separation;
        t.course = fix.course;
        t.speed = fix.speed;
        t.timestamp = fix.utc_seconds;
        t.gnsstime_ms = fix.millis;

        self.update_airborne(fix.millis);
    }

    /// Latest baro readings, sampled every tick ahead of the GNSS update.
    pub fn update_baro(&mut self, vs_fpm: Option<f32>, pressure_alt: Option<f32>) {
        self.baro_vs = vs_fpm;
        if let Some(alt) = pressure_alt {
            self.track.pressure_altitude = alt;
        }
    }

    /// Airborne when moving over ground, or climbing/sinking hard for a
    /// sustained period, or well away from the ground pressure baseline.
    fn update_airborne(&mut self, now_ms: u64) {
        let t = &mut self.track;

        let vs_active = t.vs.abs() > AIRBORNE_VS_FPM;
        let vs_held = if vs_active {
            match self.vs_exceed_since_ms {
                Some(since) => now_ms.saturating_sub(since) >= AIRBORNE_VS_HOLD_MS,
                None => {
                    self.vs_exceed_since_ms = Some(now_ms);
                    false
                }
            }
        } else {
            self.vs_exceed_since_ms = None;
            false
        };

        let baro_lifted = match self.ground_alt_baseline {
            Some(base) if t.pressure_altitude != 0.0 => {
                (t.pressure_altitude - base).abs() > AIRBORNE_ALT_DELTA
            }
            _ => false,
        };

        let airborne = t.speed > AIRBORNE_SPEED_KTS || vs_held || baro_lifted;
        if !airborne && t.pressure_altitude != 0.0 {
            self.ground_alt_baseline = Some(t.pressure_altitude);
        }
        t.airborne = airborne;
    }

    /// Adopt a random address in the anonymous or random range; done when
    /// another transmitter shows up using our current address.
    pub fn adopt_random_address(&mut self, method: AddrType) {
        let id: u32 = rand::thread_rng().gen::<u32>() & 0x000F_FFFF;
        self.track.addr = match method {
            AddrType::Random => id | 0x00E0_0000,
            _ => id | 0x00F0_0000,
        };
        self.track.addr_type = method;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fix(millis: u64, lat: f32, alt: f32, course: f32, speed: f32) -> GnssFix {
        GnssFix {
            latitude: lat,
            longitude: 8.0,
            altitude: alt,
            geoid_separation: 48.0,
            course,
            speed,
            utc_seconds: 1_600_000_000 + (millis / 1000) as u32,
            millis,
        }
    }

    fn ownship() -> OwnShip {
        OwnShip::new(Track {
            addr: 0x3E5C21,
            addr_type: AddrType::Flarm,
            ..Track::default()
        })
    }

    #[test]
    fn test_turn_rate_estimation() {
        let mut own = ownship();
        own.update_fix(&fix(1000, 48.0, 1000.0, 355.0, 60.0));
        own.update_fix(&fix(2000, 48.0, 1000.0, 5.0, 60.0));
        // 355 -> 5 across north is +10 deg/s
        assert!((own.track.turnrate - 10.0).abs() < 0.1);
        assert_eq!(own.track.prev_course, 355.0);
        assert_eq!(own.track.prev_gnsstime_ms, 1000);
    }

    #[test]
    fn test_gnss_climb_estimation() {
        let mut own = ownship();
        own.update_fix(&fix(1000, 48.0, 1000.0, 90.0, 60.0));
        own.update_fix(&fix(2000, 48.0, 1002.0, 90.0, 60.0));
        // 2 m/s is roughly 394 fpm
        assert!((own.track.vs - 2.0 * FEET_PER_METER * 60.0).abs() < 1.0);
    }

    #[test]
    fn test_baro_overrides_gnss_climb() {
        let mut own = ownship();
        own.update_baro(Some(-300.0), Some(995.0));
        own.update_fix(&fix(1000, 48.0, 1000.0, 90.0, 60.0));
        own.update_fix(&fix(2000, 48.0, 1010.0, 90.0, 60.0));
        assert_eq!(own.track.vs, -300.0);
        assert_eq!(own.track.pressure_altitude, 995.0);
    }

    #[test]
    fn test_airborne_by_speed() {
        let mut own = ownship();
        own.update_fix(&fix(1000, 48.0, 1000.0, 90.0, 2.0));
        assert!(!own.track.airborne);
        own.update_fix(&fix(2000, 48.0, 1000.0, 90.0, 50.0));
        assert!(own.track.airborne);
    }

    #[test]
    fn test_airborne_by_sustained_climb() {
        let mut own = ownship();
        own.update_baro(Some(400.0), None);
        // climbing at 400 fpm but only airborne once held for 5 s
        own.update_fix(&fix(1000, 48.0, 1000.0, 90.0, 1.0));
        assert!(!own.track.airborne);
        own.update_fix(&fix(3000, 48.0, 1002.0, 90.0, 1.0));
        assert!(!own.track.airborne);
        own.update_fix(&fix(6100, 48.0, 1006.0, 90.0, 1.0));
        assert!(own.track.airborne);
    }

    #[test]
    fn test_airborne_by_baro_excursion() {
        let mut own = ownship();
        own.update_baro(None, Some(400.0));
        own.update_fix(&fix(1000, 48.0, 1000.0, 90.0, 1.0));
        assert!(!own.track.airborne); // baseline captured at 400 m

        own.update_baro(None, Some(450.0));
        own.update_fix(&fix(2000, 48.0, 1050.0, 90.0, 1.0));
        assert!(own.track.airborne);
    }

    #[test]
    fn test_adopt_random_address() {
        let mut own = ownship();
        let before = own.track.addr;
        own.adopt_random_address(AddrType::Anonymous);
        assert_ne!(own.track.addr, before);
        assert_eq!(own.track.addr & 0x00F0_0000, 0x00F0_0000);
        assert_eq!(own.track.addr_type, AddrType::Anonymous);

        own.adopt_random_address(AddrType::Random);
        assert_eq!(own.track.addr & 0x00F0_0000, 0x00E0_0000);
    }
}
