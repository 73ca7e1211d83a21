// Engine: owns the self track, the traffic table and the settings
// snapshot, and drives the per-tick control flow in fixed order: baro,
// GNSS, transmit, receive, traffic sweep, sound, NMEA export.

use tracing::{debug, info, warn};

use crate::alarm::AlarmKind;
use crate::config::{Settings, DEBUG_LEGACY, TX_POWER_OFF};
use crate::constants::*;
use crate::drivers::{Baro, Battery, Clock, Eeprom, Gnss, NmeaOut, Radio, RxFrame, Sound, Wind};
use crate::nmea::{self, CfgAction};
use crate::ownship::OwnShip;
use crate::projection;
use crate::protocol::{legacy, LEGACY_PAYLOAD_SIZE};
use crate::track::{AddrType, Track};
use crate::traffic::{self, Insert, TrafficTable};

pub const FIRMWARE_IDENT: &str = "airwarden";
pub const FIRMWARE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Everything the engine talks to but does not own.
pub struct Peripherals<'a> {
    pub gnss: &'a mut dyn Gnss,
    pub radio: &'a mut dyn Radio,
    pub clock: &'a dyn Clock,
    pub baro: &'a mut dyn Baro,
    pub wind: &'a mut dyn Wind,
    pub sound: &'a mut dyn Sound,
    pub battery: &'a dyn Battery,
    pub nmea: &'a mut dyn NmeaOut,
    pub eeprom: &'a mut dyn Eeprom,
}

/// The traffic awareness core. Single-threaded; one `tick` per ~100 ms.
pub struct Engine {
    pub own: OwnShip,
    pub traffic: TrafficTable,
    pub settings: Settings,
    alarm: AlarmKind,

    has_fix: bool,
    rx_packets: u32,
    tx_packets: u32,
    last_tx: [u8; LEGACY_PAYLOAD_SIZE],
    tx_valid: bool,

    traffic_marker_ms: u64,
    wind_marker_ms: u64,
    pgrmz_marker_ms: u64,
    export_marker_ms: u64,
    pflav_due_ms: u64,
    pflau_ticks: u32,
    last_export_second: u32,
    wind_best: (f32, f32),
    reboot_requested: bool,
}

impl Engine {
    pub fn new(settings: Settings) -> Engine {
        let mut own = OwnShip::new(Track {
            addr_type: settings.id_method(),
            aircraft_type: settings.aircraft_type(),
            stealth: settings.stealth,
            no_track: settings.no_track,
            ..Track::default()
        });
        if settings.aircraft_id != 0 {
            own.track.addr = settings.aircraft_id & 0x00FF_FFFF;
        } else {
            own.adopt_random_address(settings.id_method());
        }

        let alarm = settings.alarm_kind();
        info!("engine up: address {:06X}, alarm {:?}", own.track.addr, alarm);

        Engine {
            own,
            traffic: TrafficTable::default(),
            settings,
            alarm,
            has_fix: false,
            rx_packets: 0,
            tx_packets: 0,
            last_tx: [0; LEGACY_PAYLOAD_SIZE],
            tx_valid: false,
            traffic_marker_ms: 0,
            wind_marker_ms: 0,
            pgrmz_marker_ms: 0,
            export_marker_ms: 0,
            pflav_due_ms: PFLAV_FIRST_MS,
            pflau_ticks: 0,
            last_export_second: 0,
            wind_best: (0.0, 0.0),
            reboot_requested: false,
        }
    }

    pub fn has_fix(&self) -> bool {
        self.has_fix
    }

    pub fn packet_counters(&self) -> (u32, u32) {
        (self.rx_packets, self.tx_packets)
    }

    pub fn wind_estimate(&self) -> (f32, f32) {
        self.wind_best
    }

    pub fn reboot_requested(&self) -> bool {
        self.reboot_requested
    }

    /// One pass of the main loop.
    pub fn tick(&mut self, p: &mut Peripherals<'_>) {
        let now_ms = p.clock.millis();

        // baro first so the fix intake sees fresh climb data
        let vs = p.baro.vertical_speed();
        let pressure_alt = p.baro.pressure_altitude();
        self.own.update_baro(vs, pressure_alt);

        match p.gnss.fix() {
            Some(fix) => {
                self.has_fix = true;
                self.own.update_fix(&fix);
            }
            None => self.has_fix = false,
        }

        if self.has_fix {
            if now_ms.saturating_sub(self.wind_marker_ms) >= WIND_UPDATE_INTERVAL_MS {
                self.wind_best = p.wind.best();
                self.wind_marker_ms = now_ms;
                debug!(
                    "wind estimate: {:.1} kt north, {:.1} kt east",
                    self.wind_best.0, self.wind_best.1
                );
            }
            self.transmit(p, now_ms);
        }

        self.receive(p, now_ms);

        if now_ms.saturating_sub(self.traffic_marker_ms) >= TRAFFIC_UPDATE_INTERVAL_MS {
            self.traffic_loop(p);
            self.traffic_marker_ms = now_ms;
        }

        self.export(p, now_ms);
    }

    /// Transmit pipeline: when the radio opens a slot, project, encode and
    /// hand over; remember the payload for the loopback guard.
    fn transmit(&mut self, p: &mut Peripherals<'_>, now_ms: u64) {
        if self.settings.txpower == TX_POWER_OFF {
            return;
        }
        if !p.radio.tx_due(now_ms) {
            return;
        }

        projection::project(&mut self.own.track, now_ms);
        let payload = legacy::encode(&self.own.track);
        match p.radio.transmit(&payload) {
            Ok(()) => {
                self.last_tx = payload;
                self.tx_valid = true;
                self.tx_packets += 1;
            }
            Err(e) => warn!("radio transmit failed: {}", e),
        }
    }

    fn receive(&mut self, p: &mut Peripherals<'_>, now_ms: u64) {
        while let Some(frame) = p.radio.receive() {
            self.parse_frame(p, &frame, now_ms);
        }
    }

    /// Receive pipeline: dump, loopback guard, decode, filter, insert.
    fn parse_frame(&mut self, p: &mut Peripherals<'_>, frame: &RxFrame, now_ms: u64) {
        self.rx_packets += 1;

        if self.settings.nmea_p {
            p.nmea
                .send(&nmea::psrfi(p.clock.now(), &frame.bytes, frame.rssi));
        }

        if self.tx_valid && frame.bytes == self.last_tx {
            if self.settings.nmea_p {
                p.nmea.send(&nmea::psrfe("RF loopback is detected"));
            }
            return;
        }

        let mut fop = match legacy::decode(&frame.bytes, &self.own.track) {
            Ok(t) => t,
            Err(legacy::DecodeError::Parity) => {
                if self.settings.nmea_p {
                    p.nmea.send(&nmea::psrfe("bad parity of decoded packet"));
                }
                return;
            }
            Err(e) => {
                debug!("decode failed: {}", e);
                return;
            }
        };

        if fop.addr == self.settings.ignore_id && self.settings.ignore_id != 0 {
            return;
        }
        if fop.addr == self.own.track.addr {
            // someone else is transmitting our address: go anonymous
            self.settings.id_method = AddrType::Anonymous as u8;
            self.own.adopt_random_address(AddrType::Anonymous);
            info!(
                "own address heard on the air, adopted {:06X}",
                self.own.track.addr
            );
            return;
        }

        fop.rssi = frame.rssi;
        fop.gnsstime_ms = now_ms;
        fop.proj_time_ms = now_ms;

        traffic::update_derived(&self.own.track, &mut fop, self.alarm);

        if self.settings.nmea_d && self.settings.debug_flags & DEBUG_LEGACY != 0 {
            p.nmea.send(&nmea::psrfl(&fop));
        }

        let addr = fop.addr;
        if let Insert::Dropped = self.traffic.insert(&self.own.track, fop, p.clock.now()) {
            debug!("traffic table full, dropped {:06X}", addr);
        }
    }

    /// The 2-second sweep: expire, rescore, sound the loudest new alert.
    fn traffic_loop(&mut self, p: &mut Peripherals<'_>) {
        if let Some((ndx, level)) = self.traffic.sweep(&self.own.track, self.alarm) {
            p.sound.notify(level);
            self.traffic.mark_alerted(ndx);
            info!("traffic alert, level {}", level as u8);
        }
    }

    fn export(&mut self, p: &mut Peripherals<'_>, now_ms: u64) {
        if self.settings.nmea_s
            && self.own.track.pressure_altitude != 0.0
            && now_ms.saturating_sub(self.pgrmz_marker_ms) >= PGRMZ_INTERVAL_MS
        {
            p.nmea
                .send(&nmea::pgrmz(self.own.track.pressure_altitude, self.has_fix));
            self.pgrmz_marker_ms = now_ms;
        }

        if self.settings.nmea_l && now_ms >= self.pflav_due_ms {
            p.nmea.send(&nmea::pflae());
            p.nmea.send(&nmea::pflav(FIRMWARE_IDENT, FIRMWARE_VERSION));
            self.pflav_due_ms = now_ms + PFLAV_INTERVAL_MS;
        }

        // traffic export once per GNSS second; the no-fix PFLAU keeps its
        // own one-second cadence
        let due = if self.has_fix {
            self.own.track.timestamp != self.last_export_second
        } else {
            now_ms.saturating_sub(self.export_marker_ms) >= 1000
        };
        if !due || !self.settings.nmea_l {
            return;
        }

        nmea::export_traffic(
            &self.own.track,
            &self.traffic,
            &self.settings,
            self.has_fix,
            p.battery.voltage(),
            p.nmea,
        );
        self.last_export_second = self.own.track.timestamp;
        self.export_marker_ms = now_ms;

        self.pflau_ticks += 1;
        if self.pflau_ticks >= HEARTBEAT_PFLAU_TICKS {
            self.pflau_ticks = 0;
            p.nmea.send(&nmea::psrfh(
                self.own.track.addr,
                self.own.track.protocol.id(),
                self.rx_packets,
                self.tx_packets,
                p.battery.voltage(),
            ));
        }
    }

    /// Feed one line of NMEA input (the $PSRF* configuration sentences).
    /// Returns true when the settings changed and a reboot is pending.
    pub fn handle_nmea_input(&mut self, line: &str, p: &mut Peripherals<'_>) -> bool {
        match nmea::handle_config_sentence(line, &mut self.settings) {
            CfgAction::Ignored => false,
            CfgAction::Reply(reply) => {
                p.nmea.send(&reply);
                false
            }
            CfgAction::Updated => {
                if let Err(e) = p.eeprom.store(&self.settings) {
                    warn!("settings store failed: {}", e);
                }
                info!("settings updated, restart pending");
                self.reboot_requested = true;
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::{GnssFix, RadioError};
    use crate::track::{AircraftType, AlarmLevel};
    use std::collections::VecDeque;

    const BASE_UTC: u32 = 1_600_000_000;

    struct TestClock {
        ms: u64,
    }
    impl Clock for TestClock {
        fn millis(&self) -> u64 {
            self.ms
        }
        fn now(&self) -> u32 {
            BASE_UTC + (self.ms / 1000) as u32
        }
    }

    struct TestGnss {
        fix: Option<GnssFix>,
    }
    impl Gnss for TestGnss {
        fn fix(&mut self) -> Option<GnssFix> {
            self.fix
        }
    }

    #[derive(Default)]
    struct TestRadio {
        rx: VecDeque<RxFrame>,
        tx: Vec<[u8; LEGACY_PAYLOAD_SIZE]>,
        slot_open: bool,
    }
    impl Radio for TestRadio {
        fn tx_due(&mut self, _now_ms: u64) -> bool {
            self.slot_open
        }
        fn transmit(&mut self, payload: &[u8; LEGACY_PAYLOAD_SIZE]) -> Result<(), RadioError> {
            self.tx.push(*payload);
            Ok(())
        }
        fn receive(&mut self) -> Option<RxFrame> {
            self.rx.pop_front()
        }
    }

    #[derive(Default)]
    struct TestBaro;
    impl Baro for TestBaro {
        fn vertical_speed(&mut self) -> Option<f32> {
            None
        }
        fn pressure_altitude(&mut self) -> Option<f32> {
            None
        }
    }

    struct TestWind;
    impl Wind for TestWind {
        fn best(&mut self) -> (f32, f32) {
            (0.0, 0.0)
        }
    }

    #[derive(Default)]
    struct TestSound {
        notified: Vec<AlarmLevel>,
    }
    impl Sound for TestSound {
        fn notify(&mut self, level: AlarmLevel) {
            self.notified.push(level);
        }
    }

    struct TestBattery;
    impl Battery for TestBattery {
        fn voltage(&self) -> f32 {
            4.0
        }
    }

    #[derive(Default)]
    struct TestNmea {
        lines: Vec<String>,
    }
    impl NmeaOut for TestNmea {
        fn send(&mut self, sentence: &str) {
            self.lines.push(sentence.to_string());
        }
    }

    #[derive(Default)]
    struct TestEeprom {
        stored: Option<Settings>,
    }
    impl Eeprom for TestEeprom {
        fn store(&mut self, settings: &Settings) -> std::io::Result<()> {
            self.stored = Some(settings.clone());
            Ok(())
        }
    }

    struct World {
        clock: TestClock,
        gnss: TestGnss,
        radio: TestRadio,
        baro: TestBaro,
        wind: TestWind,
        sound: TestSound,
        battery: TestBattery,
        nmea: TestNmea,
        eeprom: TestEeprom,
    }

    impl World {
        fn new() -> World {
            World {
                clock: TestClock { ms: 100 },
                gnss: TestGnss { fix: None },
                radio: TestRadio::default(),
                baro: TestBaro,
                wind: TestWind,
                sound: TestSound::default(),
                battery: TestBattery,
                nmea: TestNmea::default(),
                eeprom: TestEeprom::default(),
            }
        }

        fn fix_at(&self, lat: f32, lon: f32) -> GnssFix {
            GnssFix {
                latitude: lat,
                longitude: lon,
                altitude: 1000.0,
                geoid_separation: 48.0,
                course: 90.0,
                speed: 80.0,
                utc_seconds: BASE_UTC + (self.clock.ms / 1000) as u32,
                millis: self.clock.ms,
            }
        }

        fn tick(&mut self, engine: &mut Engine) {
            let mut p = Peripherals {
                gnss: &mut self.gnss,
                radio: &mut self.radio,
                clock: &self.clock,
                baro: &mut self.baro,
                wind: &mut self.wind,
                sound: &mut self.sound,
                battery: &self.battery,
                nmea: &mut self.nmea,
                eeprom: &mut self.eeprom,
            };
            engine.tick(&mut p);
        }
    }

    fn settings() -> Settings {
        Settings {
            aircraft_id: 0x3E5C21,
            ..Settings::default()
        }
    }

    /// A nearby intruder encoded the way another unit would transmit it.
    fn intruder_frame(addr: u32, utc: u32, lon: f32) -> RxFrame {
        let mut t = Track {
            addr,
            addr_type: crate::track::AddrType::Flarm,
            latitude: 48.0,
            longitude: lon,
            altitude: 1010.0,
            geoid_separation: 48.0,
            course: 270.0,
            speed: 80.0,
            aircraft_type: AircraftType::Glider,
            airborne: true,
            timestamp: utc,
            ..Track::default()
        };
        projection::project(&mut t, 1);
        RxFrame {
            bytes: legacy::encode(&t),
            rssi: -60,
        }
    }

    #[test]
    fn test_fix_drives_ownship_and_transmit() {
        let mut world = World::new();
        let mut engine = Engine::new(settings());

        world.gnss.fix = Some(world.fix_at(48.0, 8.0));
        world.radio.slot_open = true;
        world.tick(&mut engine);

        assert!(engine.has_fix());
        assert_eq!(engine.own.track.addr, 0x3E5C21);
        assert!(engine.own.track.airborne); // 80 kt over ground
        assert_eq!(world.radio.tx.len(), 1);
        assert_eq!(engine.packet_counters().1, 1);

        // without a fix the transmitter stays quiet
        world.gnss.fix = None;
        world.clock.ms += 1000;
        world.tick(&mut engine);
        assert_eq!(world.radio.tx.len(), 1);
    }

    #[test]
    fn test_receive_inserts_and_alarms() {
        let mut world = World::new();
        let mut engine = Engine::new(settings());

        world.gnss.fix = Some(world.fix_at(48.0, 8.0));
        world.tick(&mut engine);

        // a converging glider 372 m ahead
        let utc = BASE_UTC + (world.clock.ms / 1000) as u32;
        world.radio.rx.push_back(intruder_frame(0xDDA4B2, utc, 8.005));
        world.clock.ms += 100;
        world.gnss.fix = Some(world.fix_at(48.0, 8.0));
        world.tick(&mut engine);

        assert_eq!(engine.traffic.count(), 1);
        assert_eq!(engine.packet_counters().0, 1);
        let slot = engine
            .traffic
            .slots()
            .iter()
            .find(|t| t.addr == 0xDDA4B2)
            .expect("tracked");
        assert!((slot.distance - 372.0).abs() < 10.0);
        assert_eq!(slot.alarm_level, AlarmLevel::Important);

        // the 2-second sweep sounds the alert and the export reports it
        world.clock.ms += 2000;
        world.gnss.fix = Some(world.fix_at(48.0, 8.0));
        world.tick(&mut engine);
        assert!(!world.sound.notified.is_empty());
        assert!(world.nmea.lines.iter().any(|l| l.contains("DDA4B2")));
        assert!(world.nmea.lines.iter().any(|l| l.starts_with("$PFLAU,")));
    }

    #[test]
    fn test_loopback_rejected() {
        let mut world = World::new();
        let mut engine = Engine::new(settings());

        world.gnss.fix = Some(world.fix_at(48.0, 8.0));
        world.radio.slot_open = true;
        world.tick(&mut engine);
        let sent = world.radio.tx[0];

        // our own transmission comes right back
        world.radio.rx.push_back(RxFrame {
            bytes: sent,
            rssi: -10,
        });
        world.clock.ms += 100;
        world.gnss.fix = Some(world.fix_at(48.0, 8.0));
        world.tick(&mut engine);

        assert_eq!(engine.traffic.count(), 0);
        assert_eq!(engine.own.track.addr, 0x3E5C21); // no anonymisation
    }

    #[test]
    fn test_foreign_frame_with_own_address_anonymises() {
        let mut world = World::new();
        let mut engine = Engine::new(settings());

        world.gnss.fix = Some(world.fix_at(48.0, 8.0));
        world.tick(&mut engine);

        let utc = BASE_UTC + (world.clock.ms / 1000) as u32;
        world.radio.rx.push_back(intruder_frame(0x3E5C21, utc, 8.01));
        world.clock.ms += 100;
        world.gnss.fix = Some(world.fix_at(48.0, 8.0));
        world.tick(&mut engine);

        assert_eq!(engine.traffic.count(), 0);
        assert_ne!(engine.own.track.addr, 0x3E5C21);
        assert_eq!(engine.settings.id_method, AddrType::Anonymous as u8);
    }

    #[test]
    fn test_ignored_address_dropped() {
        let mut world = World::new();
        let mut engine = Engine::new(Settings {
            ignore_id: 0xDDA4B2,
            ..settings()
        });

        world.gnss.fix = Some(world.fix_at(48.0, 8.0));
        world.tick(&mut engine);

        let utc = BASE_UTC + (world.clock.ms / 1000) as u32;
        world.radio.rx.push_back(intruder_frame(0xDDA4B2, utc, 8.01));
        world.clock.ms += 100;
        world.gnss.fix = Some(world.fix_at(48.0, 8.0));
        world.tick(&mut engine);

        assert_eq!(engine.traffic.count(), 0);
    }

    #[test]
    fn test_no_fix_still_emits_pflau() {
        let mut world = World::new();
        let mut engine = Engine::new(settings());

        world.clock.ms += 1000;
        world.tick(&mut engine);
        assert!(
            world
                .nmea
                .lines
                .iter()
                .any(|l| l.starts_with("$PFLAU,0,0,0,")),
            "{:?}",
            world.nmea.lines
        );
    }

    #[test]
    fn test_config_input_stores_and_requests_reboot() {
        let mut world = World::new();
        let mut engine = Engine::new(settings());

        let line = nmea::seal("$PSRFC,1,,,,,2*");
        let mut p = Peripherals {
            gnss: &mut world.gnss,
            radio: &mut world.radio,
            clock: &world.clock,
            baro: &mut world.baro,
            wind: &mut world.wind,
            sound: &mut world.sound,
            battery: &world.battery,
            nmea: &mut world.nmea,
            eeprom: &mut world.eeprom,
        };
        assert!(engine.handle_nmea_input(&line, &mut p));
        assert!(engine.reboot_requested());
        assert_eq!(world.eeprom.stored.as_ref().map(|s| s.alarm), Some(2));
    }
}
