// Collaborator interfaces: the drivers and services the core consumes but
// does not own. Real hardware sits behind these on a device; the demo
// binary and the tests plug in simulated ones.

use thiserror::Error;

use crate::config::Settings;
use crate::protocol::LEGACY_PAYLOAD_SIZE;
use crate::track::AlarmLevel;

/// One GNSS solution.
#[derive(Debug, Clone, Copy)]
pub struct GnssFix {
    /// WGS84 degrees.
    pub latitude: f32,
    pub longitude: f32,
    /// Metres above mean sea level.
    pub altitude: f32,
    /// Geoid separation at this position, metres.
    pub geoid_separation: f32,
    /// Ground track, degrees true.
    pub course: f32,
    /// Ground speed, knots.
    pub speed: f32,
    /// UTC seconds.
    pub utc_seconds: u32,
    /// Monotonic milliseconds the fix was taken at.
    pub millis: u64,
}

pub trait Gnss {
    /// Current solution, or None without a valid fix.
    fn fix(&mut self) -> Option<GnssFix>;
}

/// One received radio frame.
#[derive(Debug, Clone, Copy)]
pub struct RxFrame {
    pub bytes: [u8; LEGACY_PAYLOAD_SIZE],
    pub rssi: i8,
}

#[derive(Debug, Error)]
pub enum RadioError {
    #[error("transmit failed: {0}")]
    Transmit(String),
    #[error("radio fault: {0}")]
    Fault(String),
}

/// Radio front end. Owns bit transport, whitening and the PPS-synchronised
/// time-slot schedule; the core only asks whether a slot is open.
pub trait Radio {
    /// True when the slot schedule permits a transmission now.
    fn tx_due(&mut self, now_ms: u64) -> bool;
    fn transmit(&mut self, payload: &[u8; LEGACY_PAYLOAD_SIZE]) -> Result<(), RadioError>;
    /// Next received frame, if any.
    fn receive(&mut self) -> Option<RxFrame>;
}

pub trait Clock {
    /// Monotonic milliseconds since boot.
    fn millis(&self) -> u64;
    /// UTC seconds.
    fn now(&self) -> u32;
}

pub trait Baro {
    /// Pressure-derived vertical speed, feet per minute.
    fn vertical_speed(&mut self) -> Option<f32>;
    /// Pressure altitude, metres.
    fn pressure_altitude(&mut self) -> Option<f32>;
}

/// Wind estimator. The estimate never feeds the broadcast velocity
/// projection (which stays ground-referenced); it is polled for
/// diagnostics.
pub trait Wind {
    /// Best-estimate wind as (northward, eastward) knots.
    fn best(&mut self) -> (f32, f32);
}

pub trait Sound {
    /// Sound the aggregated alert at the given level.
    fn notify(&mut self, level: AlarmLevel);
}

pub trait Battery {
    /// Supply voltage, volts.
    fn voltage(&self) -> f32;
}

/// Sink for generated NMEA sentences (already checksummed, CRLF included).
pub trait NmeaOut {
    fn send(&mut self, sentence: &str);
}

/// Persistent settings storage.
pub trait Eeprom {
    fn store(&mut self, settings: &Settings) -> std::io::Result<()>;
}
