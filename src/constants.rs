// Shared constants: unit conversions, alarm zones and time horizons,
// vertical model, table sizing and scheduler cadences.

/// Metres per second in one knot.
pub const MPS_PER_KNOT: f32 = 0.514444;

/// Feet in one metre.
pub const FEET_PER_METER: f32 = 3.2808399;

/// Metres of ground distance per degree of latitude.
pub const METERS_PER_DEGREE: f32 = 111300.0;

// --- Distance-based alarm zones (metres) ---

/// Outer radius for plain traffic visibility (no alarm).
pub const ALARM_ZONE_NONE: f32 = 10000.0;
pub const ALARM_ZONE_CLOSE: f32 = 1000.0;
pub const ALARM_ZONE_LOW: f32 = 700.0;
pub const ALARM_ZONE_IMPORTANT: f32 = 400.0;
pub const ALARM_ZONE_URGENT: f32 = 250.0;

// --- Vector-alarm time horizons (seconds to impact) ---

pub const ALARM_TIME_CLOSE: f32 = 30.0;
pub const ALARM_TIME_LOW: f32 = 19.0;
pub const ALARM_TIME_IMPORTANT: f32 = 9.0;
pub const ALARM_TIME_URGENT: f32 = 8.0;

/// Collision-course angular tolerance (degrees).
pub const ALARM_VECTOR_ANGLE: f32 = 10.0;

/// Minimum relative speed for the Vector scorer (m/s).
pub const ALARM_VECTOR_SPEED: f32 = 2.0;

// --- Vertical model (metres unless noted) ---

/// No alarms at all above this much (adjusted) altitude difference.
pub const VERTICAL_SEPARATION: f32 = 300.0;

/// Metres of effective horizontal distance added per metre of altitude gap.
pub const VERTICAL_SLOPE: f32 = 5.0;

/// GNSS altitude is fuzzy: ignore the first 60 m of altitude difference.
pub const VERTICAL_SLACK: f32 = 60.0;

/// Traffic beyond this altitude gap is not reported without an alarm.
pub const VERTICAL_VISIBILITY_RANGE: f32 = 500.0;

// --- Stealth masking ---

/// Stealth traffic outside this radius is suppressed while alarm <= CLOSE.
pub const STEALTH_DISTANCE: f32 = 2000.0;
pub const STEALTH_VERTICAL: f32 = 300.0;

// --- Table sizing and aging ---

/// Fixed capacity of the traffic table. Tunable up to ~60 on larger targets.
pub const MAX_TRACKING_OBJECTS: usize = 8;

/// Upper bound on $PFLAA sentences per export tick.
pub const MAX_NMEA_OBJECTS: usize = 12;

/// Seconds after which a tracked entry is dropped.
pub const ENTRY_EXPIRATION_TIME: u32 = 30;

/// Entries with data older than this are not exported over NMEA (seconds).
pub const EXPORT_EXPIRATION_TIME: u32 = 5;

/// Derived data (distance/bearing/alarm) older than this is rescored (seconds).
pub const TRAFFIC_VECTOR_UPDATE_INTERVAL: u32 = 2;

// --- Scheduler cadences (milliseconds) ---

pub const TRAFFIC_UPDATE_INTERVAL_MS: u64 = 2000;
pub const PROJECTION_CACHE_MS: u64 = 400;
pub const WIND_UPDATE_INTERVAL_MS: u64 = 666;
pub const PGRMZ_INTERVAL_MS: u64 = 1000;
/// First $PFLAE/$PFLAV handshake goes out this long after boot...
pub const PFLAV_FIRST_MS: u64 = 28000;
/// ...and then repeats on this period.
pub const PFLAV_INTERVAL_MS: u64 = 73000;
/// $PSRFH heartbeat once per this many PFLAU ticks.
pub const HEARTBEAT_PFLAU_TICKS: u32 = 10;

// --- Airborne detection thresholds ---

/// Ground speed above which we are considered moving (knots).
pub const AIRBORNE_SPEED_KTS: f32 = 4.0;
/// Sustained climb/sink magnitude that implies flight (fpm)...
pub const AIRBORNE_VS_FPM: f32 = 200.0;
/// ...when held for at least this long (milliseconds).
pub const AIRBORNE_VS_HOLD_MS: u64 = 5000;
/// Pressure-altitude excursion from the ground baseline that implies flight (m).
pub const AIRBORNE_ALT_DELTA: f32 = 30.0;

// --- Battery thresholds (volts) ---

/// Readings below this mean "no battery attached"; report as 0.
pub const BATTERY_THRESHOLD_INVALID: f32 = 1.8;
/// Below this the PFLAU power field reports bad.
pub const BATTERY_THRESHOLD_LOW: f32 = 3.5;
