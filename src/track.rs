// Tracked-aircraft record and the enumerations it carries.

/// Threat tier computed by the alarm engine (`alarm_level`) and remembered
/// for hysteresis (`alert_level`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum AlarmLevel {
    #[default]
    None = 0,
    /// Within the outermost zone but not yet worth a sound.
    Close = 1,
    Low = 2,
    Important = 3,
    Urgent = 4,
}

impl AlarmLevel {
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => AlarmLevel::Close,
            2 => AlarmLevel::Low,
            3 => AlarmLevel::Important,
            4 => AlarmLevel::Urgent,
            _ => AlarmLevel::None,
        }
    }

    /// One tier louder, saturating at URGENT.
    pub fn raised(self) -> Self {
        AlarmLevel::from_u8((self as u8 + 1).min(AlarmLevel::Urgent as u8))
    }

    /// Alarm tier as exported over NMEA: the internal CLOSE tier between
    /// NONE and LOW is collapsed away.
    pub fn nmea_level(self) -> u8 {
        (self as u8).saturating_sub(1)
    }
}

/// Addressing scheme claimed by a transmitter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum AddrType {
    #[default]
    Random = 0,
    Icao = 1,
    Flarm = 2,
    Anonymous = 3,
    Ogn = 4,
}

impl AddrType {
    /// Decode the 3-bit wire field. Unassigned codes read as anonymous.
    pub fn from_bits(v: u8) -> Self {
        match v & 0x7 {
            0 => AddrType::Random,
            1 => AddrType::Icao,
            2 => AddrType::Flarm,
            3 => AddrType::Anonymous,
            4 => AddrType::Ogn,
            _ => AddrType::Anonymous,
        }
    }

    pub fn bits(self) -> u8 {
        self as u8
    }
}

/// Radio encoding a record was produced by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RfProtocol {
    #[default]
    Legacy,
}

impl RfProtocol {
    /// Callsign-substitute prefix used in $PFLAA when no callsign is known.
    pub fn callsign_prefix(self) -> &'static str {
        match self {
            RfProtocol::Legacy => "FLR",
        }
    }

    /// Numeric protocol id as reported in $PSRFH.
    pub fn id(self) -> u8 {
        match self {
            RfProtocol::Legacy => 0,
        }
    }
}

/// Aircraft category, 4 bits on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum AircraftType {
    #[default]
    Unknown = 0,
    Glider = 1,
    TowPlane = 2,
    Helicopter = 3,
    Parachute = 4,
    DropPlane = 5,
    HangGlider = 6,
    Paraglider = 7,
    Powered = 8,
    Jet = 9,
    Ufo = 10,
    Balloon = 11,
    Zeppelin = 12,
    Uav = 13,
    Reserved = 14,
    Static = 15,
}

impl AircraftType {
    pub fn from_bits(v: u8) -> Self {
        match v & 0xF {
            1 => AircraftType::Glider,
            2 => AircraftType::TowPlane,
            3 => AircraftType::Helicopter,
            4 => AircraftType::Parachute,
            5 => AircraftType::DropPlane,
            6 => AircraftType::HangGlider,
            7 => AircraftType::Paraglider,
            8 => AircraftType::Powered,
            9 => AircraftType::Jet,
            10 => AircraftType::Ufo,
            11 => AircraftType::Balloon,
            12 => AircraftType::Zeppelin,
            13 => AircraftType::Uav,
            14 => AircraftType::Reserved,
            15 => AircraftType::Static,
            _ => AircraftType::Unknown,
        }
    }

    pub fn bits(self) -> u8 {
        self as u8
    }
}

/// One aircraft as known to the system, own aircraft included.
///
/// An `addr` of 0 marks an empty slot; `Track::default()` is the empty
/// record used to clear slots.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Track {
    /// 24-bit transmitter address; 0 means empty slot.
    pub addr: u32,
    pub addr_type: AddrType,
    pub protocol: RfProtocol,

    /// WGS84 degrees.
    pub latitude: f32,
    pub longitude: f32,
    /// Metres above mean sea level.
    pub altitude: f32,
    /// Metres between the WGS84 ellipsoid and the geoid at this position.
    pub geoid_separation: f32,
    /// Barometric altitude in metres; 0 when no baro is attached.
    pub pressure_altitude: f32,

    /// Ground track, degrees true.
    pub course: f32,
    /// Ground speed, knots.
    pub speed: f32,
    /// Vertical speed, feet per minute.
    pub vs: f32,
    /// Signed turn rate, degrees per second.
    pub turnrate: f32,

    pub aircraft_type: AircraftType,
    pub airborne: bool,
    pub stealth: bool,
    pub no_track: bool,

    /// UTC seconds of the last update.
    pub timestamp: u32,
    /// Monotonic milliseconds of the last position update.
    pub gnsstime_ms: u64,
    /// Monotonic milliseconds of the update before that (0 = no history).
    pub prev_gnsstime_ms: u64,
    /// When the velocity projection was last computed.
    pub proj_time_ms: u64,
    /// Course at the previous update, for turn-rate estimation.
    pub prev_course: f32,

    /// Velocity projections north/south and east/west, quarter-m/s at full
    /// scale, sampled at roughly t-1.5s, t+2s, t+5.5s and t+9s.
    pub ns: [i16; 4],
    pub ew: [i16; 4],

    /// Signal strength of the last reception.
    pub rssi: i8,

    // Derived by the traffic sweep; all zero while the slot is empty.
    /// Horizontal distance from own aircraft, metres.
    pub distance: f32,
    /// Bearing from own aircraft, degrees.
    pub bearing: f32,
    /// Eastward offset from own aircraft, metres.
    pub dx: f32,
    /// Northward offset from own aircraft, metres.
    pub dy: f32,
    /// Altitude above own aircraft, metres (signed).
    pub alt_diff: f32,
    /// `alt_diff` adjusted for relative vertical speed and dead-band.
    pub adj_alt_diff: f32,
    /// Distance plus the slope-weighted adjusted altitude difference.
    pub adj_distance: f32,
    pub alarm_level: AlarmLevel,
    /// Tier at which a sound alert last fired, plus one; governs hysteresis.
    pub alert_level: AlarmLevel,
}

impl Track {
    pub fn is_empty(&self) -> bool {
        self.addr == 0
    }

    /// Reset to the empty record, zeroing all derived fields.
    pub fn clear(&mut self) {
        *self = Track::default();
    }
}
