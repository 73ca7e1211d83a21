
pub mod alarm;
pub mod approxmath;
pub mod config;
pub mod constants;
pub mod drivers;
pub mod engine;
pub mod nmea;
pub mod ownship;
pub mod projection;
pub mod protocol;
pub mod track;
pub mod traffic;
