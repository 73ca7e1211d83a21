// Legacy radio protocol: obfuscated, encrypted, parity-checked 24-byte
// frames, bit-exact with the packets deployed units broadcast.
//
// Frame layout, little-endian 32-bit words:
//   word 0: addr:24  unk0:4  addr_type:3  unk1:1        (plaintext)
//   word 1: vs:10  unk2:2  airborne:1  stealth:1  no_track:1  parity:1
//           gps:12  aircraft_type:4
//   word 2: lat:19  alt:13
//   word 3: lon:20  unk3:10  smult:2
//   words 4..5: ns[0..4], ew[0..4] as signed bytes
// Words 1..5 are encrypted with XXTEA under a key derived from the UTC
// second and the address.

use thiserror::Error;

use crate::approxmath::{approx_hypot, atan2_approx};
use crate::constants::{FEET_PER_METER, MPS_PER_KNOT};
use crate::protocol::xxtea;
use crate::track::{AddrType, AircraftType, RfProtocol, Track};

/// Frame length on the air after sync word removal.
pub const LEGACY_PAYLOAD_SIZE: usize = 24;

const KEY_TABLE: [u32; 8] = [
    0xe432_76df, 0xdca8_3759, 0x9802_b8ac, 0x4675_a56b,
    0xfc78_ea65, 0x804b_90ea, 0xb765_42cd, 0x329d_fa32,
];
const KEY_MULT: u32 = 0x045d_9f3b;
const KEY_FINAL: u32 = 0x87b5_62f4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("bad parity of decoded packet")]
    Parity,
    #[error("short packet: {0} bytes")]
    Truncated(usize),
}

/// Multiplicative hash used by the key schedule.
fn obscure(key: u32, seed: u32) -> u32 {
    let m1 = seed.wrapping_mul(key ^ (key >> 16));
    let m2 = seed.wrapping_mul(m1 ^ (m1 >> 16));
    m2 ^ (m2 >> 16)
}

/// Derive the per-packet cipher key. `address` is the 24-bit transmitter
/// address pre-shifted as `(addr << 8) & 0xffffff`. Bit 23 of the timestamp
/// selects which half of the table is mixed in; the low 6 timestamp bits do
/// not contribute, so the key rotates once per 64 seconds.
fn make_key(timestamp: u32, address: u32) -> [u32; 4] {
    let mut key = [0u32; 4];
    for (i, k) in key.iter_mut().enumerate() {
        let ndx = if (timestamp >> 23) & 1 != 0 { i + 4 } else { i };
        *k = obscure(KEY_TABLE[ndx] ^ ((timestamp >> 6) ^ address), KEY_MULT) ^ KEY_FINAL;
    }
    key
}

/// XOR parity of the whole frame: 1 when the total number of set bits is odd.
fn packet_parity(bytes: &[u8; LEGACY_PAYLOAD_SIZE]) -> u8 {
    (bytes.iter().map(|b| b.count_ones()).sum::<u32>() & 1) as u8
}

fn words_of(bytes: &[u8; LEGACY_PAYLOAD_SIZE]) -> [u32; 5] {
    let mut w = [0u32; 5];
    for (i, chunk) in bytes[4..].chunks_exact(4).enumerate() {
        w[i] = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    w
}

fn store_words(bytes: &mut [u8; LEGACY_PAYLOAD_SIZE], words: &[u32; 5]) {
    for (i, w) in words.iter().enumerate() {
        bytes[4 + 4 * i..8 + 4 * i].copy_from_slice(&w.to_le_bytes());
    }
}

/// Plaintext field image of one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameFields {
    pub addr: u32,
    pub addr_type: u8,
    /// Vertical speed, m/s x 10, right-shifted by `smult`; 10-bit signed.
    pub vs: i16,
    pub airborne: bool,
    pub stealth: bool,
    pub no_track: bool,
    pub parity: u8,
    pub gps: u16,
    pub aircraft_type: u8,
    /// Folded latitude, 19 bits.
    pub lat: u32,
    /// Ellipsoid altitude in metres, 13 bits unsigned.
    pub alt: u16,
    /// Folded longitude, 20 bits.
    pub lon: u32,
    /// Shared speed-scale exponent, 0..3.
    pub smult: u8,
    /// Velocity samples, quarter-m/s right-shifted by `smult`.
    pub ns: [i8; 4],
    pub ew: [i8; 4],
    // Observed-but-undocumented bits, preserved literally.
    pub unk0: u8,
    pub unk1: u8,
    pub unk2: u8,
    pub unk3: u16,
}

impl FrameFields {
    pub fn pack(&self) -> [u8; LEGACY_PAYLOAD_SIZE] {
        let w0 = (self.addr & 0x00FF_FFFF)
            | ((self.unk0 as u32 & 0xF) << 24)
            | ((self.addr_type as u32 & 0x7) << 28)
            | ((self.unk1 as u32 & 0x1) << 31);
        let w1 = (self.vs as u32 & 0x3FF)
            | ((self.unk2 as u32 & 0x3) << 10)
            | ((self.airborne as u32) << 12)
            | ((self.stealth as u32) << 13)
            | ((self.no_track as u32) << 14)
            | ((self.parity as u32 & 0x1) << 15)
            | ((self.gps as u32 & 0xFFF) << 16)
            | ((self.aircraft_type as u32 & 0xF) << 28);
        let w2 = (self.lat & 0x0007_FFFF) | ((self.alt as u32 & 0x1FFF) << 19);
        let w3 = (self.lon & 0x000F_FFFF)
            | ((self.unk3 as u32 & 0x3FF) << 20)
            | ((self.smult as u32 & 0x3) << 30);

        let mut out = [0u8; LEGACY_PAYLOAD_SIZE];
        out[0..4].copy_from_slice(&w0.to_le_bytes());
        out[4..8].copy_from_slice(&w1.to_le_bytes());
        out[8..12].copy_from_slice(&w2.to_le_bytes());
        out[12..16].copy_from_slice(&w3.to_le_bytes());
        for i in 0..4 {
            out[16 + i] = self.ns[i] as u8;
            out[20 + i] = self.ew[i] as u8;
        }
        out
    }

    pub fn unpack(bytes: &[u8; LEGACY_PAYLOAD_SIZE]) -> Self {
        let w0 = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let w1 = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        let w2 = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        let w3 = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);

        let vs_raw = (w1 & 0x3FF) as u16;
        let vs = if vs_raw & 0x200 != 0 {
            (vs_raw | 0xFC00) as i16
        } else {
            vs_raw as i16
        };

        let mut ns = [0i8; 4];
        let mut ew = [0i8; 4];
        for i in 0..4 {
            ns[i] = bytes[16 + i] as i8;
            ew[i] = bytes[20 + i] as i8;
        }

        FrameFields {
            addr: w0 & 0x00FF_FFFF,
            unk0: ((w0 >> 24) & 0xF) as u8,
            addr_type: ((w0 >> 28) & 0x7) as u8,
            unk1: ((w0 >> 31) & 0x1) as u8,
            vs,
            unk2: ((w1 >> 10) & 0x3) as u8,
            airborne: (w1 >> 12) & 1 != 0,
            stealth: (w1 >> 13) & 1 != 0,
            no_track: (w1 >> 14) & 1 != 0,
            parity: ((w1 >> 15) & 0x1) as u8,
            gps: ((w1 >> 16) & 0xFFF) as u16,
            aircraft_type: ((w1 >> 28) & 0xF) as u8,
            lat: w2 & 0x0007_FFFF,
            alt: ((w2 >> 19) & 0x1FFF) as u16,
            lon: w3 & 0x000F_FFFF,
            unk3: ((w3 >> 20) & 0x3FF) as u16,
            smult: ((w3 >> 30) & 0x3) as u8,
            ns,
            ew,
        }
    }
}

/// Fold a reference coordinate the same way the encoder folds positions:
/// degrees x 1e7, rounded to the nearest 128 units with sign restored.
fn fold_reference(degrees: f32) -> i32 {
    if degrees < 0.0 {
        -((((-degrees * 1e7) as i32) + 0x40) >> 7)
    } else {
        (((degrees * 1e7) as i32) + 0x40) >> 7
    }
}

/// Encode own state into one frame.
///
/// The caller must have run the velocity projection first so that
/// `own.ns`/`own.ew` hold the four full-scale samples; the encoder only
/// rescales them by `smult`.
pub fn encode(own: &Track) -> [u8; LEGACY_PAYLOAD_SIZE] {
    let timestamp = own.timestamp;

    let speed_mps = own.speed * MPS_PER_KNOT;
    let mut speed4 = (speed_mps * 4.0).round() as u32;
    if speed4 > 0x3FF {
        speed4 = 0x3FF;
    }
    let smult: u8 = if speed4 & 0x200 != 0 {
        3
    } else if speed4 & 0x100 != 0 {
        2
    } else if speed4 & 0x080 != 0 {
        1
    } else {
        0
    };

    let mut ns = [0i8; 4];
    let mut ew = [0i8; 4];
    for i in 0..4 {
        ns[i] = (own.ns[i] >> smult) as i8;
        ew[i] = (own.ew[i] >> smult) as i8;
    }

    let vs_mps = own.vs / (FEET_PER_METER * 60.0);
    let vs10 = (vs_mps * 10.0).round() as i16;

    let alt = (own.altitude + own.geoid_separation) as i16;

    let mut fields = FrameFields {
        addr: own.addr & 0x00FF_FFFF,
        addr_type: own.addr_type.bits(),
        vs: vs10 >> smult,
        airborne: own.airborne,
        stealth: own.stealth,
        no_track: own.no_track,
        parity: 0,
        gps: 323,
        aircraft_type: own.aircraft_type.bits(),
        lat: if own.latitude < 0.0 {
            (-((((-own.latitude * 1e7) as i32) + 0x40) >> 7)) as u32 & 0x0007_FFFF
        } else {
            ((((own.latitude * 1e7) as u32) + 0x40) >> 7) & 0x0007_FFFF
        },
        alt: (alt as u16) & 0x1FFF,
        lon: if own.longitude < 0.0 {
            (-((((-own.longitude * 1e7) as i32) + 0x40) >> 7)) as u32 & 0x000F_FFFF
        } else {
            ((((own.longitude * 1e7) as u32) + 0x40) >> 7) & 0x000F_FFFF
        },
        smult,
        ns,
        ew,
        unk0: 0,
        unk1: 0,
        // observed on transmissions from deployed units
        unk2: 1,
        unk3: 0,
    };

    fields.parity = packet_parity(&fields.pack());
    let mut bytes = fields.pack();

    let key = make_key(timestamp, (fields.addr << 8) & 0x00FF_FFFF);
    let mut words = words_of(&bytes);
    xxtea::encrypt(&mut words, &key);
    store_words(&mut bytes, &words);
    bytes
}

/// Decode one received frame.
///
/// `own` supplies the reference position resolving the 9.3 km coordinate
/// ambiguity, the geoid separation, and the UTC second used for the cipher
/// key. Filtering of ignored or own addresses is left to the receive
/// pipeline, which also stamps reception time and RSSI.
pub fn decode(payload: &[u8], own: &Track) -> Result<Track, DecodeError> {
    if payload.len() < LEGACY_PAYLOAD_SIZE {
        return Err(DecodeError::Truncated(payload.len()));
    }
    let mut bytes = [0u8; LEGACY_PAYLOAD_SIZE];
    bytes.copy_from_slice(&payload[..LEGACY_PAYLOAD_SIZE]);

    // the address word travels in the clear and seeds the key
    let addr = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) & 0x00FF_FFFF;
    let key = make_key(own.timestamp, (addr << 8) & 0x00FF_FFFF);
    let mut words = words_of(&bytes);
    xxtea::decrypt(&mut words, &key);
    store_words(&mut bytes, &words);

    if packet_parity(&bytes) != 0 {
        return Err(DecodeError::Parity);
    }

    let fields = FrameFields::unpack(&bytes);

    let round_lat = fold_reference(own.latitude);
    let mut ilat = (fields.lat as i32 - round_lat) & 0x0007_FFFF;
    if ilat >= 0x0004_0000 {
        ilat -= 0x0008_0000;
    }
    let latitude = ((ilat + round_lat) << 7) as f32 * 1e-7;

    let round_lon = fold_reference(own.longitude);
    let mut ilon = (fields.lon as i32 - round_lon) & 0x000F_FFFF;
    if ilon >= 0x0008_0000 {
        ilon -= 0x0010_0000;
    }
    let longitude = ((ilon + round_lon) << 7) as f32 * 1e-7;

    let smult = fields.smult;
    let mut ns = [0i16; 4];
    let mut ew = [0i16; 4];
    for i in 0..4 {
        ns[i] = (fields.ns[i] as i16) << smult;
        ew[i] = (fields.ew[i] as i16) << smult;
    }

    let nsf = ns[0] as f32;
    let ewf = ew[0] as f32;
    let course = atan2_approx(nsf, ewf);
    let speed4 = approx_hypot(nsf, ewf);
    let mut turnrate = 0.0;
    if speed4 > 0.0 {
        // direction is scale-invariant, so the raw stored bytes suffice
        let next_course = atan2_approx(fields.ns[1] as f32, fields.ew[1] as f32);
        let mut turn_angle = next_course - course;
        if turn_angle > 270.0 {
            turn_angle -= 360.0;
        }
        if turn_angle < -270.0 {
            turn_angle += 360.0;
        }
        // samples are roughly 3 seconds apart
        turnrate = 0.333 * turn_angle;
    }

    let vs10 = fields.vs << smult;

    Ok(Track {
        addr: fields.addr,
        addr_type: AddrType::from_bits(fields.addr_type),
        protocol: RfProtocol::Legacy,
        latitude,
        longitude,
        altitude: fields.alt as f32 - own.geoid_separation,
        course,
        speed: speed4 / (4.0 * MPS_PER_KNOT),
        vs: vs10 as f32 * (FEET_PER_METER * 6.0),
        turnrate,
        aircraft_type: AircraftType::from_bits(fields.aircraft_type),
        airborne: fields.airborne,
        stealth: fields.stealth,
        no_track: fields.no_track,
        timestamp: own.timestamp,
        ns,
        ew,
        ..Track::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approxmath::{cos_approx, sin_approx};
    use crate::track::Track;

    /// Build an own-state track with the four velocity samples filled the
    /// way the projection would for unaccelerated flight.
    fn own_track(addr: u32, speed_kt: f32, course: f32) -> Track {
        let mut t = Track {
            addr,
            addr_type: AddrType::Flarm,
            latitude: 48.1,
            longitude: 8.05,
            altitude: 800.0,
            geoid_separation: 48.0,
            course,
            speed: speed_kt,
            vs: 300.0,
            aircraft_type: AircraftType::Glider,
            airborne: true,
            timestamp: 1_600_000_000,
            ..Track::default()
        };
        let qmps = speed_kt * MPS_PER_KNOT * 4.0;
        for i in 0..4 {
            t.ns[i] = (qmps * cos_approx(course)).round() as i16;
            t.ew[i] = (qmps * sin_approx(course)).round() as i16;
        }
        t
    }

    #[test]
    fn test_field_layout_addr_word() {
        let f = FrameFields {
            addr: 0x123456,
            ..FrameFields::default()
        };
        let bytes = f.pack();
        assert_eq!(&bytes[0..4], &[0x56, 0x34, 0x12, 0x00]);

        let f = FrameFields {
            addr_type: 5,
            unk1: 1,
            ..FrameFields::default()
        };
        let bytes = f.pack();
        assert_eq!(&bytes[0..4], &[0x00, 0x00, 0x00, 0xD0]);
    }

    #[test]
    fn test_field_layout_status_word() {
        let f = FrameFields {
            vs: -2, // 10-bit two's complement 0x3FE
            parity: 1,
            gps: 323,
            aircraft_type: 9,
            ..FrameFields::default()
        };
        let bytes = f.pack();
        assert_eq!(&bytes[4..8], &[0xFE, 0x83, 0x43, 0x91]);
    }

    #[test]
    fn test_field_layout_position_words() {
        let f = FrameFields {
            lat: 0x7FFFF,
            alt: 0x1FFF,
            lon: 0x12345,
            unk3: 0x155,
            smult: 2,
            ns: [1, -1, 2, -2],
            ew: [127, -128, 0, 1],
            ..FrameFields::default()
        };
        let bytes = f.pack();
        assert_eq!(&bytes[8..12], &[0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(&bytes[12..16], &[0x45, 0x23, 0x51, 0x95]);
        assert_eq!(&bytes[16..20], &[0x01, 0xFF, 0x02, 0xFE]);
        assert_eq!(&bytes[20..24], &[0x7F, 0x80, 0x00, 0x01]);
    }

    #[test]
    fn test_pack_unpack_roundtrip() {
        let f = FrameFields {
            addr: 0xDDA4B2,
            addr_type: 2,
            vs: -17,
            airborne: true,
            stealth: true,
            no_track: false,
            parity: 1,
            gps: 323,
            aircraft_type: 8,
            lat: 0x3BEEF,
            alt: 1234,
            lon: 0xCAFE5,
            smult: 1,
            ns: [10, 11, 12, 13],
            ew: [-10, -11, -12, -13],
            unk0: 0,
            unk1: 0,
            unk2: 1,
            unk3: 0,
        };
        assert_eq!(FrameFields::unpack(&f.pack()), f);
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let own = own_track(0x3E5C21, 30.0, 77.0);
        let rx_ref = own_track(0x111111, 0.0, 0.0); // receiver at the same reference
        let bytes = encode(&own);
        let fop = decode(&bytes, &rx_ref).expect("decode");

        assert_eq!(fop.addr, 0x3E5C21);
        assert_eq!(fop.addr_type, AddrType::Flarm);
        assert_eq!(fop.aircraft_type, AircraftType::Glider);
        assert!(fop.airborne);
        assert!(!fop.stealth);

        // position error under 1.5 m
        assert!((fop.latitude - own.latitude).abs() < 1.5e-5);
        assert!((fop.longitude - own.longitude).abs() < 2.0e-5);
        // ellipsoid altitude minus receiver geoid separation
        assert!((fop.altitude - own.altitude).abs() < 1.5);
        // speed error under 0.25 m/s at smult 0
        assert!(((fop.speed - own.speed) * MPS_PER_KNOT).abs() < 0.25);
        // course within the quantisation of the velocity samples
        assert!((fop.course - own.course).abs() < 2.0);
        // vertical speed error under 0.05 m/s
        assert!(((fop.vs - own.vs) / (FEET_PER_METER * 60.0)).abs() < 0.05);
        assert!(fop.turnrate.abs() < 0.5);
    }

    #[test]
    fn test_roundtrip_southern_western_hemisphere() {
        let mut own = own_track(0xABCDEF, 60.0, 200.0);
        own.latitude = -33.95;
        own.longitude = -70.79;
        let mut rx_ref = own_track(0x222222, 0.0, 0.0);
        rx_ref.latitude = -33.96;
        rx_ref.longitude = -70.80;
        let fop = decode(&encode(&own), &rx_ref).expect("decode");
        assert!((fop.latitude - own.latitude).abs() < 1.5e-5);
        assert!((fop.longitude - own.longitude).abs() < 2.0e-5);
    }

    #[test]
    fn test_high_speed_uses_smult() {
        // 490 kt: quarter-m/s counts exceed 8 bits, exercising the scale
        let own = own_track(0x3E5C21, 490.0, 10.0);
        let rx_ref = own_track(0x111111, 0.0, 0.0);
        let fop = decode(&encode(&own), &rx_ref).expect("decode");
        // resolution at smult 3 is 8 quarter-m/s per component
        assert!(((fop.speed - own.speed) * MPS_PER_KNOT).abs() < 3.0);
    }

    #[test]
    fn test_same_window_key_is_stable() {
        // timestamps in the same 64-second window share a key
        let own = own_track(0x3E5C21, 30.0, 77.0);
        let bytes = encode(&own);
        let mut rx_ref = own_track(0x111111, 0.0, 0.0);
        rx_ref.timestamp = (own.timestamp & !63) + 63;
        assert!(decode(&bytes, &rx_ref).is_ok());
    }

    #[test]
    fn test_key_rotation_rejects_other_windows() {
        // decoding under another window's key must mostly fail parity
        let own = own_track(0x3E5C21, 30.0, 77.0);
        let bytes = encode(&own);
        let mut failures = 0;
        for k in 1..=64u32 {
            let mut rx_ref = own_track(0x111111, 0.0, 0.0);
            rx_ref.timestamp = own.timestamp + 64 * k;
            if decode(&bytes, &rx_ref).is_err() {
                failures += 1;
            }
        }
        assert!(failures >= 20, "only {} of 64 foreign keys rejected", failures);
    }

    #[test]
    fn test_truncated_payload() {
        let own = own_track(0x111111, 0.0, 0.0);
        assert_eq!(decode(&[0u8; 10], &own), Err(DecodeError::Truncated(10)));
    }

    #[test]
    fn test_key_depends_on_address() {
        let a = make_key(1_600_000_000, 0x345600);
        let b = make_key(1_600_000_000, 0x345700);
        assert_ne!(a, b);
    }
}
