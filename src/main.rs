// airwarden - traffic awareness demo runner
//
// Drives the engine against simulated collaborators: own aircraft flying
// east, one intruder closing head-on, NMEA to stdout (and optionally UDP).

use std::time::{Duration, Instant};

use airwarden::config::{Config, Settings};
use airwarden::constants::MPS_PER_KNOT;
use airwarden::drivers::{
    Baro, Battery, Clock, Eeprom, Gnss, GnssFix, NmeaOut, Radio, RadioError, RxFrame, Sound, Wind,
};
use airwarden::engine::{Engine, Peripherals};
use airwarden::projection;
use airwarden::protocol::{legacy, LEGACY_PAYLOAD_SIZE};
use airwarden::track::{AddrType, AircraftType, AlarmLevel, Track};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};

struct SystemClock {
    start: Instant,
}

impl Clock for SystemClock {
    fn millis(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
    fn now(&self) -> u32 {
        chrono::Utc::now().timestamp() as u32
    }
}

/// Own aircraft: straight and level, eastbound at 80 kt from 48N 8E.
struct SimGnss {
    start: Instant,
}

impl Gnss for SimGnss {
    fn fix(&mut self) -> Option<GnssFix> {
        let t = self.start.elapsed().as_secs_f32();
        let east_m = 80.0 * MPS_PER_KNOT * t;
        Some(GnssFix {
            latitude: 48.0,
            longitude: 8.0 + east_m / (111300.0 * 0.669),
            altitude: 1000.0,
            geoid_separation: 48.0,
            course: 90.0,
            speed: 80.0,
            utc_seconds: chrono::Utc::now().timestamp() as u32,
            millis: self.start.elapsed().as_millis() as u64,
        })
    }
}

/// Simulated radio: opens one transmit slot per second and synthesizes an
/// intruder broadcast per second, closing head-on from 4 km ahead.
struct SimRadio {
    start: Instant,
    last_tx_second: u64,
    last_rx_second: u64,
}

impl SimRadio {
    fn new(start: Instant) -> SimRadio {
        SimRadio {
            start,
            last_tx_second: u64::MAX,
            last_rx_second: u64::MAX,
        }
    }
}

impl Radio for SimRadio {
    fn tx_due(&mut self, now_ms: u64) -> bool {
        let second = now_ms / 1000;
        let in_slot = (400..800).contains(&(now_ms % 1000));
        if in_slot && second != self.last_tx_second {
            self.last_tx_second = second;
            return true;
        }
        false
    }

    fn transmit(&mut self, _payload: &[u8; LEGACY_PAYLOAD_SIZE]) -> Result<(), RadioError> {
        Ok(())
    }

    fn receive(&mut self) -> Option<RxFrame> {
        let t = self.start.elapsed().as_secs_f32();
        let second = self.start.elapsed().as_secs();
        if second == self.last_rx_second {
            return None;
        }
        self.last_rx_second = second;

        // own ship runs east at 80 kt, the intruder west at 80 kt from
        // 4 km ahead of the starting point
        let own_east_m = 80.0 * MPS_PER_KNOT * t;
        let intruder_east_m = 4000.0 - 80.0 * MPS_PER_KNOT * t;
        if intruder_east_m < own_east_m {
            return None; // passed us
        }

        let mut intruder = Track {
            addr: 0xDDA4B2,
            addr_type: AddrType::Flarm,
            latitude: 48.0,
            longitude: 8.0 + intruder_east_m / (111300.0 * 0.669),
            altitude: 1010.0,
            geoid_separation: 48.0,
            course: 270.0,
            speed: 80.0,
            aircraft_type: AircraftType::Glider,
            airborne: true,
            timestamp: chrono::Utc::now().timestamp() as u32,
            ..Track::default()
        };
        projection::project(&mut intruder, self.start.elapsed().as_millis() as u64);
        Some(RxFrame {
            bytes: legacy::encode(&intruder),
            rssi: -55,
        })
    }
}

struct SimBaro;

impl Baro for SimBaro {
    fn vertical_speed(&mut self) -> Option<f32> {
        Some(0.0)
    }
    fn pressure_altitude(&mut self) -> Option<f32> {
        Some(1000.0)
    }
}

struct SimWind;

impl Wind for SimWind {
    fn best(&mut self) -> (f32, f32) {
        (5.0, -3.0)
    }
}

struct ConsoleSound;

impl Sound for ConsoleSound {
    fn notify(&mut self, level: AlarmLevel) {
        warn!("SOUND ALERT, level {}", level as u8);
    }
}

struct SimBattery;

impl Battery for SimBattery {
    fn voltage(&self) -> f32 {
        3.95
    }
}

/// NMEA to stdout, optionally mirrored to a UDP peer.
struct NmeaSink {
    udp: Option<(std::net::UdpSocket, String)>,
}

impl NmeaSink {
    fn new(target: Option<&str>) -> std::io::Result<NmeaSink> {
        let udp = match target {
            Some(addr) => {
                let socket = std::net::UdpSocket::bind("0.0.0.0:0")?;
                Some((socket, addr.to_string()))
            }
            None => None,
        };
        Ok(NmeaSink { udp })
    }
}

impl NmeaOut for NmeaSink {
    fn send(&mut self, sentence: &str) {
        print!("{}", sentence);
        if let Some((socket, addr)) = &self.udp {
            if let Err(e) = socket.send_to(sentence.as_bytes(), addr) {
                warn!("UDP NMEA send failed: {}", e);
            }
        }
    }
}

struct FileEeprom {
    path: String,
}

impl Eeprom for FileEeprom {
    fn store(&mut self, settings: &Settings) -> std::io::Result<()> {
        settings.save(&self.path)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();
    init_logging(config.verbose);

    let mut settings = Settings::load(&config.settings_file)?;
    if let Some(alarm) = config.alarm {
        settings.alarm = alarm;
    }
    if let Some(id) = &config.aircraft_id {
        settings.aircraft_id = u32::from_str_radix(id, 16)?;
    }

    info!("starting airwarden simulation");
    let mut engine = Engine::new(settings);

    let start = Instant::now();
    let clock = SystemClock { start };
    let mut gnss = SimGnss { start };
    let mut radio = SimRadio::new(start);
    let mut baro = SimBaro;
    let mut wind = SimWind;
    let mut sound = ConsoleSound;
    let battery = SimBattery;
    let mut nmea = NmeaSink::new(config.nmea_udp.as_deref())?;
    let mut eeprom = FileEeprom {
        path: config.settings_file.clone(),
    };

    let mut ticker = tokio::time::interval(Duration::from_millis(100));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let mut p = Peripherals {
                    gnss: &mut gnss,
                    radio: &mut radio,
                    clock: &clock,
                    baro: &mut baro,
                    wind: &mut wind,
                    sound: &mut sound,
                    battery: &battery,
                    nmea: &mut nmea,
                    eeprom: &mut eeprom,
                };
                engine.tick(&mut p);
                if engine.reboot_requested() {
                    info!("restart requested by configuration input");
                    break;
                }
                if config.duration > 0 && start.elapsed().as_secs() >= config.duration {
                    break;
                }
            }
            result = signal::ctrl_c() => {
                match result {
                    Ok(()) => info!("received shutdown signal"),
                    Err(e) => warn!("unable to listen for shutdown signal: {}", e),
                }
                break;
            }
        }
    }
    let (rx, tx) = engine.packet_counters();
    info!(
        "stopped after {:.1} s: {} packets received, {} transmitted, {} tracked",
        start.elapsed().as_secs_f32(),
        rx,
        tx,
        engine.traffic.count()
    );
    Ok(())
}

/// Initialize logging subsystem
fn init_logging(verbose: bool) {
    let subscriber = tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .with_writer(std::io::stderr);

    if verbose {
        subscriber.with_max_level(tracing::Level::DEBUG).init();
        info!("verbose logging enabled (DEBUG level)");
    } else {
        subscriber.with_max_level(tracing::Level::INFO).init();
    }
}
