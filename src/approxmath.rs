// Fast trigonometry in degrees, compass convention.
//
// All angles are degrees. Directions follow the compass: 0 = north,
// 90 = east, increasing clockwise. Accuracy is traded for speed but kept
// well inside what the quarter-m/s velocity quantisation of the radio
// format can resolve (~0.1% magnitude, ~0.05 degree direction).

use std::f32::consts::{FRAC_PI_2, PI};

/// Approximate sine of an angle in degrees.
///
/// Parabolic approximation with a correction pass; worst-case absolute
/// error is about 0.001.
pub fn sin_approx(degrees: f32) -> f32 {
    // wrap into [-180, 180)
    let mut x = degrees % 360.0;
    if x < -180.0 {
        x += 360.0;
    } else if x >= 180.0 {
        x -= 360.0;
    }

    const B: f32 = 4.0 / 180.0;
    const C: f32 = 4.0 / (180.0 * 180.0);
    let y = B * x - C * x * x.abs();

    // weighted mean of the parabola and its square restores precision
    const P: f32 = 0.225;
    P * (y * y.abs() - y) + y
}

/// Approximate cosine of an angle in degrees.
pub fn cos_approx(degrees: f32) -> f32 {
    sin_approx(degrees + 90.0)
}

/// Cosine of a latitude, used to scale longitude differences to metres.
pub fn cos_lat(latitude: f32) -> f32 {
    cos_approx(latitude)
}

/// Polynomial arctangent for |z| <= 1, in radians.
fn atan_poly(z: f32) -> f32 {
    let z2 = z * z;
    z * (0.999_977_26
        + z2 * (-0.332_623_47
            + z2 * (0.193_543_46
                + z2 * (-0.116_432_87 + z2 * (0.052_653_32 - z2 * 0.011_721_20)))))
}

/// Approximate direction of the vector (ns, ew) as a compass bearing.
///
/// `ns` is the northward component, `ew` the eastward component. Returns
/// degrees in [0, 360); (0, 0) maps to 0.
pub fn atan2_approx(ns: f32, ew: f32) -> f32 {
    let x = ns;
    let y = ew;
    if x == 0.0 && y == 0.0 {
        return 0.0;
    }

    let r = if x.abs() >= y.abs() {
        let a = atan_poly(y / x);
        if x > 0.0 {
            a
        } else if y >= 0.0 {
            a + PI
        } else {
            a - PI
        }
    } else {
        let a = atan_poly(x / y);
        if y > 0.0 {
            FRAC_PI_2 - a
        } else {
            -FRAC_PI_2 - a
        }
    };

    let mut degrees = r.to_degrees();
    if degrees < 0.0 {
        degrees += 360.0;
    }
    degrees
}

/// Approximate hypotenuse.
///
/// Truncated-series estimate polished by one Newton step, which keeps the
/// relative error below ~0.05% at any aspect ratio.
pub fn approx_hypot(x: f32, y: f32) -> f32 {
    let x = x.abs();
    let y = y.abs();
    let (hi, lo) = if x >= y { (x, y) } else { (y, x) };
    if hi == 0.0 {
        return 0.0;
    }
    if hi > 4096.0 * lo {
        return hi;
    }

    let h = lo / hi;
    let h2 = h * h;
    let guess = hi * (1.0 + 0.5 * h2 - 0.125 * h2 * h2);
    0.5 * (guess + (x * x + y * y) / guess)
}
