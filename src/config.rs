use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::alarm::AlarmKind;
use crate::track::{AddrType, AircraftType};

/// Transmit power setting meaning "radio off".
pub const TX_POWER_OFF: u8 = 2;

/// Debug flag bit: dump decoded Legacy frames as $PSRFL.
pub const DEBUG_LEGACY: u8 = 0x01;

pub const PSRFC_VERSION: u32 = 1;
pub const PSRFD_VERSION: u32 = 1;
pub const PSRFS_VERSION: u32 = 1;

/// Command line of the demo binary.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Settings file (EEPROM stand-in); created with defaults when missing.
    #[arg(long, value_name = "FILE", default_value = "airwarden-settings.json")]
    pub settings_file: String,

    /// Send NMEA to host:port over UDP in addition to stdout.
    #[arg(long, value_name = "HOST:PORT")]
    pub nmea_udp: Option<String>,

    /// Traffic alarm algorithm: 0 none, 1 distance, 2 vector.
    #[arg(long)]
    pub alarm: Option<u8>,

    /// Own aircraft address, 24-bit hex.
    #[arg(long, value_name = "HEX6")]
    pub aircraft_id: Option<String>,

    /// Run the simulation for this many seconds (0 = until ctrl-c).
    #[arg(long, default_value_t = 0)]
    pub duration: u64,

    /// Verbose logging (DEBUG level)
    #[arg(long, short, default_value_t = false)]
    pub verbose: bool,
}

/// Persistent device settings. On hardware these live in EEPROM; here they
/// round-trip through the `Eeprom` collaborator and are rewritten by the
/// $PSRFC/$PSRFD/$PSRFS configuration sentences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub mode: u8,
    pub rf_protocol: u8,
    pub band: u8,
    pub aircraft_type: u8,
    /// Alarm scorer selection, see [`AlarmKind::from_setting`].
    pub alarm: u8,
    pub txpower: u8,
    pub volume: u8,
    pub pointer: u8,

    /// NMEA sentence class switches for the primary output.
    pub nmea_g: bool,
    pub nmea_p: bool,
    pub nmea_l: bool,
    pub nmea_s: bool,
    pub nmea_out: u8,
    pub gdl90: u8,
    pub d1090: u8,

    pub stealth: bool,
    pub no_track: bool,
    pub power_save: u8,

    /// Addressing scheme for our own transmissions.
    pub id_method: u8,
    pub aircraft_id: u32,
    /// Incoming packets from this address are silently dropped.
    pub ignore_id: u32,
    /// This address is always reported, alarms or not.
    pub follow_id: u32,
    pub baud_rate: u8,
    pub power_external: u8,

    pub nmea_d: bool,
    pub debug_flags: u8,

    /// Secondary output and its sentence class switches.
    pub nmea_out2: u8,
    pub nmea2_g: bool,
    pub nmea2_p: bool,
    pub nmea2_l: bool,
    pub nmea2_s: bool,
    pub nmea2_d: bool,
    pub relay: u8,

    /// Stored key material for the encrypted variant; carried, not used.
    pub igc_key: [u32; 4],
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            mode: 0,
            rf_protocol: 0,
            band: 1,
            aircraft_type: AircraftType::Glider as u8,
            alarm: 1,
            txpower: 0,
            volume: 0,
            pointer: 0,
            nmea_g: true,
            nmea_p: false,
            nmea_l: true,
            nmea_s: true,
            nmea_out: 0,
            gdl90: 0,
            d1090: 0,
            stealth: false,
            no_track: false,
            power_save: 0,
            id_method: AddrType::Icao as u8,
            aircraft_id: 0,
            ignore_id: 0,
            follow_id: 0,
            baud_rate: 0,
            power_external: 0,
            nmea_d: false,
            debug_flags: 0,
            nmea_out2: 0,
            nmea2_g: false,
            nmea2_p: false,
            nmea2_l: false,
            nmea2_s: false,
            nmea2_d: false,
            relay: 0,
            igc_key: [0; 4],
        }
    }
}

impl Settings {
    pub fn alarm_kind(&self) -> AlarmKind {
        AlarmKind::from_setting(self.alarm)
    }

    pub fn id_method(&self) -> AddrType {
        AddrType::from_bits(self.id_method)
    }

    pub fn aircraft_type(&self) -> AircraftType {
        AircraftType::from_bits(self.aircraft_type)
    }

    /// Load from a JSON settings file, falling back to defaults when the
    /// file does not exist yet.
    pub fn load(path: &str) -> std::io::Result<Settings> {
        match std::fs::read_to_string(path) {
            Ok(text) => serde_json::from_str(&text)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Settings::default()),
            Err(e) => Err(e),
        }
    }

    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.alarm_kind(), AlarmKind::Distance);
        assert_eq!(s.id_method(), AddrType::Icao);
        assert_eq!(s.aircraft_type(), AircraftType::Glider);
        assert!(s.nmea_l);
        assert!(!s.stealth);
    }

    #[test]
    fn test_settings_json_roundtrip() {
        let mut s = Settings::default();
        s.alarm = 2;
        s.aircraft_id = 0x3E5C21;
        s.stealth = true;
        s.igc_key = [1, 2, 3, 4];
        let text = serde_json::to_string(&s).unwrap();
        let back: Settings = serde_json::from_str(&text).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let s = Settings::load("/nonexistent/path/settings.json").unwrap();
        assert_eq!(s, Settings::default());
    }
}
