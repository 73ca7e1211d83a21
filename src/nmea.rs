// NMEA data port: traffic export ($PFLAA/$PFLAU), sensor and heartbeat
// sentences, the FLARM-style self-test handshake, and the $PSRF*
// configuration input.

use crate::config::{
    Settings, PSRFC_VERSION, PSRFD_VERSION, PSRFS_VERSION, TX_POWER_OFF,
};
use crate::constants::*;
use crate::drivers::NmeaOut;
use crate::track::{AddrType, AlarmLevel, Track};
use crate::traffic::TrafficTable;

/// XOR of the sentence bytes between '$' and '*'.
pub fn checksum(body: &str) -> u8 {
    body.bytes()
        .skip(1)
        .take_while(|&b| b != b'*')
        .fold(0, |acc, b| acc ^ b)
}

/// Append checksum and line ending to a sentence ending in '*'.
pub fn seal(body: &str) -> String {
    format!("{}{:02X}\r\n", body, checksum(body))
}

/// Split an incoming line into comma fields, validating the checksum when
/// one is present. Returns None for lines that are not usable NMEA.
fn fields_of(line: &str) -> Option<Vec<&str>> {
    let line = line.trim();
    let rest = line.strip_prefix('$')?;
    let body = match rest.rsplit_once('*') {
        Some((body, given)) => {
            let want = u8::from_str_radix(given.trim(), 16).ok()?;
            let got = body.bytes().fold(0u8, |a, b| a ^ b);
            if want != got {
                return None;
            }
            body
        }
        None => rest,
    };
    Some(body.split(',').collect())
}

/// Relative bearing wrapped to [-180, 180] degrees.
fn rel_bearing(bearing: f32, course: f32) -> i32 {
    let mut rb = (bearing - course) as i32;
    if rb < -180 {
        rb += 360;
    } else if rb > 180 {
        rb -= 360;
    }
    rb
}

/// Stealth masking of a reported altitude difference: quantised to 256 m
/// with a 128 m offset.
fn fuzzify_alt(alt_diff: i32) -> i32 {
    (alt_diff & !0xFF) + 128
}

/// Emit the per-target $PFLAA list and the mandatory $PFLAU summary.
///
/// Selection: targets with an active alarm, targets inside the visibility
/// zone, and the followed address. Stealth entries (either side) are
/// suppressed outside the stealth radius while quiet, and have their data
/// fuzzified otherwise. Priority: followed target, then alarm tier, then
/// altitude-adjusted distance. The highest-priority target (follow aside)
/// also populates $PFLAU.
pub fn export_traffic(
    own: &Track,
    traffic: &TrafficTable,
    settings: &Settings,
    has_fix: bool,
    voltage: f32,
    out: &mut dyn NmeaOut,
) {
    if !settings.nmea_l {
        return;
    }

    let now = own.timestamp;
    let follow_id = settings.follow_id;

    let mut list: Vec<usize> = Vec::new();
    if has_fix {
        for (i, cip) in traffic.slots().iter().enumerate() {
            if cip.is_empty() || now.saturating_sub(cip.timestamp) > EXPORT_EXPIRATION_TIME {
                continue;
            }
            let stealth = cip.stealth || own.stealth; // reciprocal
            if stealth
                && cip.alarm_level <= AlarmLevel::Close
                && (cip.distance > STEALTH_DISTANCE || cip.alt_diff.abs() > STEALTH_VERTICAL)
            {
                continue;
            }
            let visible = cip.alarm_level > AlarmLevel::None
                || (cip.distance < ALARM_ZONE_NONE
                    && cip.adj_alt_diff.abs() < VERTICAL_VISIBILITY_RANGE)
                || cip.addr == follow_id;
            if visible {
                list.push(i);
            }
        }
    }

    list.sort_by(|&a, &b| {
        let (ta, tb) = (&traffic.slots()[a], &traffic.slots()[b]);
        (tb.addr == follow_id)
            .cmp(&(ta.addr == follow_id))
            .then(tb.alarm_level.cmp(&ta.alarm_level))
            .then(
                ta.adj_distance
                    .partial_cmp(&tb.adj_distance)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
    });

    // highest priority for $PFLAU: loudest alarm, then closest; the
    // followed target gets no special treatment here
    let mut hp: Option<usize> = None;
    for &i in &list {
        let cip = &traffic.slots()[i];
        match hp {
            Some(h) => {
                let ht = &traffic.slots()[h];
                if cip.alarm_level > ht.alarm_level
                    || (cip.alarm_level == ht.alarm_level && cip.adj_distance <= ht.adj_distance)
                {
                    hp = Some(i);
                }
            }
            None => hp = Some(i),
        }
    }

    let total = list.len();
    let mut emitted = 0;
    for (pos, &i) in list.iter().enumerate() {
        if emitted >= MAX_NMEA_OBJECTS {
            break;
        }
        // with a full list the highest-priority target rides in $PFLAU only
        if total >= MAX_NMEA_OBJECTS && Some(i) == hp {
            continue;
        }
        let cip = &traffic.slots()[i];
        let stealth = cip.stealth || own.stealth;

        let mut addr_type = if cip.addr_type.bits() > AddrType::Anonymous.bits() {
            AddrType::Anonymous
        } else {
            cip.addr_type
        };
        let mut id = cip.addr;
        let mut alt_diff = cip.alt_diff as i32;
        let mut course = cip.course as i32;
        let mut speed_mps = (cip.speed * MPS_PER_KNOT) as i32;
        let mut climb = format!("{:.1}", (cip.vs / (FEET_PER_METER * 60.0)).clamp(-32.7, 32.7));
        if stealth {
            id = 0x00FF_FFF0 + pos as u32;
            addr_type = AddrType::Anonymous;
            alt_diff = fuzzify_alt(alt_diff);
            course = 0;
            speed_mps = 0;
            climb.clear();
        }

        out.send(&seal(&format!(
            "$PFLAA,{},{},{},{},{},{:06X}!{}_{:06X},{},,{},{},{}*",
            cip.alarm_level.nmea_level(),
            cip.dy.round() as i32,
            cip.dx.round() as i32,
            alt_diff,
            addr_type.bits(),
            id,
            cip.protocol.callsign_prefix(),
            id,
            course,
            speed_mps,
            climb,
            cip.aircraft_type.bits(),
        )));
        emitted += 1;
    }

    // one $PFLAU regardless of traffic or fix state
    let voltage = if voltage < BATTERY_THRESHOLD_INVALID {
        0.0
    } else {
        voltage
    };
    let pwr = if voltage > 0.0 && voltage < BATTERY_THRESHOLD_LOW {
        0
    } else {
        1
    };
    let tx_on = settings.txpower != TX_POWER_OFF;

    let sentence = match hp {
        Some(h) => {
            let cip = &traffic.slots()[h];
            let stealth = cip.stealth || own.stealth;
            let hp_addr = if stealth {
                0x00FF_FFF0 + h as u32
            } else {
                cip.addr
            };
            let mut alt_diff = cip.alt_diff as i32;
            if stealth {
                alt_diff = fuzzify_alt(alt_diff);
            }
            seal(&format!(
                "$PFLAU,{},{},{},{},{},{},2,{},{},{:06X}*",
                total,
                tx_on as u8,
                if own.airborne { 2 } else { 1 },
                pwr,
                cip.alarm_level.nmea_level(),
                rel_bearing(cip.bearing, own.course),
                alt_diff,
                cip.distance.round() as u32,
                hp_addr,
            ))
        }
        None => seal(&format!(
            "$PFLAU,0,{},{},{},0,,0,,,*",
            (has_fix && tx_on) as u8,
            if has_fix { 2 } else { 0 },
            pwr,
        )),
    };
    out.send(&sentence);
}

/// Barometric altitude report, feet.
pub fn pgrmz(pressure_altitude: f32, valid_fix: bool) -> String {
    let ft = ((pressure_altitude * FEET_PER_METER) as i32).clamp(-1000, 60000);
    seal(&format!("$PGRMZ,{},f,{}*", ft, if valid_fix { '3' } else { '1' }))
}

/// Self-test result, imitating the unit the protocol came from.
pub fn pflae() -> String {
    seal("$PFLAE,A,0,0*")
}

/// Version handshake; our identity rides in the obstacle-database field.
pub fn pflav(ident: &str, version: &str) -> String {
    seal(&format!("$PFLAV,A,2.4,7.20,{}-{}*", ident, version))
}

/// Heartbeat with packet counters and battery centivolts.
pub fn psrfh(addr: u32, protocol: u8, rx: u32, tx: u32, voltage: f32) -> String {
    seal(&format!(
        "$PSRFH,{:06X},{},{},{},{}*",
        addr,
        protocol,
        rx,
        tx,
        (voltage * 100.0) as i32
    ))
}

/// Raw receive dump for debugging; plain text, no checksum.
pub fn psrfi(now: u32, raw: &[u8], rssi: i8) -> String {
    format!("$PSRFI,{},{},{}\r\n", now, hex::encode_upper(raw), rssi)
}

/// Diagnostic message, plain text.
pub fn psrfe(message: &str) -> String {
    format!("$PSRFE,{}\r\n", message)
}

/// Decoded receive dump for debugging.
pub fn psrfl(fop: &Track) -> String {
    format!(
        "$PSRFL,{:06X},{},{},{:.5},{:.5},{:.1},{:.1},{:.1}\r\n",
        fop.addr,
        fop.gnsstime_ms,
        fop.airborne as u8,
        fop.latitude,
        fop.longitude,
        fop.altitude,
        fop.course,
        fop.turnrate,
    )
}

/// Outcome of feeding one input line to the configuration parser.
#[derive(Debug, PartialEq, Eq)]
pub enum CfgAction {
    /// Not a configuration sentence, or one that failed its checksum.
    Ignored,
    /// A query; the reply goes back to the requesting port.
    Reply(String),
    /// Settings changed: the caller persists them and reboots.
    Updated,
}

fn set_u8(dst: &mut u8, field: Option<&&str>) -> bool {
    match field {
        Some(s) if !s.is_empty() => match s.parse() {
            Ok(v) => {
                *dst = v;
                true
            }
            Err(_) => false,
        },
        _ => false,
    }
}

fn set_bool(dst: &mut bool, field: Option<&&str>) -> bool {
    match field {
        Some(s) if !s.is_empty() => match s.parse::<u8>() {
            Ok(v) => {
                *dst = v != 0;
                true
            }
            Err(_) => false,
        },
        _ => false,
    }
}

fn set_hex(dst: &mut u32, field: Option<&&str>) -> bool {
    match field {
        Some(s) if !s.is_empty() => match u32::from_str_radix(s, 16) {
            Ok(v) => {
                *dst = v;
                true
            }
            Err(_) => false,
        },
        _ => false,
    }
}

/// Handle one configuration sentence ($PSRFC, $PSRFD, $PSRFS): a "?" in
/// the version field queries the current values, a matching version number
/// read-modify-writes the given fields.
pub fn handle_config_sentence(line: &str, settings: &mut Settings) -> CfgAction {
    let fields = match fields_of(line) {
        Some(f) => f,
        None => return CfgAction::Ignored,
    };
    match fields.first().copied() {
        Some("PSRFC") => handle_psrfc(&fields[1..], settings),
        Some("PSRFD") => handle_psrfd(&fields[1..], settings),
        Some("PSRFS") => handle_psrfs(&fields[1..], settings),
        _ => CfgAction::Ignored,
    }
}

fn handle_psrfc(f: &[&str], s: &mut Settings) -> CfgAction {
    match f.first().copied() {
        Some("?") => CfgAction::Reply(seal(&format!(
            "$PSRFC,{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{}*",
            PSRFC_VERSION,
            s.mode,
            s.rf_protocol,
            s.band,
            s.aircraft_type,
            s.alarm,
            s.txpower,
            s.volume,
            s.pointer,
            s.nmea_g as u8,
            s.nmea_p as u8,
            s.nmea_l as u8,
            s.nmea_s as u8,
            s.nmea_out,
            s.gdl90,
            s.d1090,
            s.stealth as u8,
            s.no_track as u8,
            s.power_save,
        ))),
        Some(v) if v.parse() == Ok(PSRFC_VERSION) => {
            let mut updated = false;
            updated |= set_u8(&mut s.mode, f.get(1));
            updated |= set_u8(&mut s.rf_protocol, f.get(2));
            updated |= set_u8(&mut s.band, f.get(3));
            updated |= set_u8(&mut s.aircraft_type, f.get(4));
            updated |= set_u8(&mut s.alarm, f.get(5));
            updated |= set_u8(&mut s.txpower, f.get(6));
            updated |= set_u8(&mut s.volume, f.get(7));
            updated |= set_u8(&mut s.pointer, f.get(8));
            updated |= set_bool(&mut s.nmea_g, f.get(9));
            updated |= set_bool(&mut s.nmea_p, f.get(10));
            updated |= set_bool(&mut s.nmea_l, f.get(11));
            updated |= set_bool(&mut s.nmea_s, f.get(12));
            updated |= set_u8(&mut s.nmea_out, f.get(13));
            updated |= set_u8(&mut s.gdl90, f.get(14));
            updated |= set_u8(&mut s.d1090, f.get(15));
            updated |= set_bool(&mut s.stealth, f.get(16));
            updated |= set_bool(&mut s.no_track, f.get(17));
            updated |= set_u8(&mut s.power_save, f.get(18));
            if updated {
                CfgAction::Updated
            } else {
                CfgAction::Ignored
            }
        }
        _ => CfgAction::Ignored,
    }
}

fn handle_psrfd(f: &[&str], s: &mut Settings) -> CfgAction {
    match f.first().copied() {
        Some("?") => CfgAction::Reply(seal(&format!(
            "$PSRFD,{},{},{:06X},{:06X},{:06X},{},{},{},{:02X},{},{},{},{},{},{}*",
            PSRFD_VERSION,
            s.id_method,
            s.aircraft_id,
            s.ignore_id,
            s.follow_id,
            s.baud_rate,
            s.power_external,
            s.nmea_d as u8,
            s.debug_flags,
            s.nmea_out2,
            s.nmea2_g as u8,
            s.nmea2_p as u8,
            s.nmea2_l as u8,
            s.nmea2_s as u8,
            s.nmea2_d as u8,
        ))),
        Some(v) if v.parse() == Ok(PSRFD_VERSION) => {
            let mut updated = false;
            updated |= set_u8(&mut s.id_method, f.get(1));
            updated |= set_hex(&mut s.aircraft_id, f.get(2));
            updated |= set_hex(&mut s.ignore_id, f.get(3));
            updated |= set_hex(&mut s.follow_id, f.get(4));
            updated |= set_u8(&mut s.baud_rate, f.get(5));
            updated |= set_u8(&mut s.power_external, f.get(6));
            updated |= set_bool(&mut s.nmea_d, f.get(7));
            updated |= set_u8(&mut s.debug_flags, f.get(8));
            updated |= set_u8(&mut s.nmea_out2, f.get(9));
            updated |= set_bool(&mut s.nmea2_g, f.get(10));
            updated |= set_bool(&mut s.nmea2_p, f.get(11));
            updated |= set_bool(&mut s.nmea2_l, f.get(12));
            updated |= set_bool(&mut s.nmea2_s, f.get(13));
            updated |= set_bool(&mut s.nmea2_d, f.get(14));
            updated |= set_u8(&mut s.relay, f.get(15));
            if updated {
                CfgAction::Updated
            } else {
                CfgAction::Ignored
            }
        }
        _ => CfgAction::Ignored,
    }
}

fn handle_psrfs(f: &[&str], s: &mut Settings) -> CfgAction {
    match f.first().copied() {
        Some("?") => {
            // mask the key from prying eyes
            let masked: Vec<u32> = s
                .igc_key
                .iter()
                .map(|&k| if k != 0 { 0x8888_8888 } else { 0 })
                .collect();
            CfgAction::Reply(seal(&format!(
                "$PSRFS,{},{:08X}{:08X}{:08X}{:08X}*",
                PSRFS_VERSION, masked[0], masked[1], masked[2], masked[3],
            )))
        }
        Some(v) if v.parse() == Ok(PSRFS_VERSION) => {
            let key_text = match f.get(1) {
                Some(t) if t.len() == 32 && t.is_ascii() => t,
                _ => return CfgAction::Ignored,
            };
            let mut key = [0u32; 4];
            for (i, k) in key.iter_mut().enumerate() {
                *k = match u32::from_str_radix(&key_text[8 * i..8 * i + 8], 16) {
                    Ok(v) => v,
                    Err(_) => return CfgAction::Ignored,
                };
            }
            s.igc_key = key;
            CfgAction::Updated
        }
        _ => CfgAction::Ignored,
    }
}
