//! Psychrometric helpers shared by the risk engine and the manual estimate.
//!
//! Two kinds of temperature conversion live here and they are not
//! interchangeable:
//! - point conversions (`f_to_c`, `c_to_f`) carry the 32° freezing offset
//!   and apply to absolute readings;
//! - delta conversions (`delta_f_to_c`, `delta_c_to_f`) scale magnitudes only
//!   and apply to differences such as the assumed leaf-to-air gap or a margin.
//!
//! Converting a difference with a point conversion shifts every downstream
//! margin by roughly 17.8°C.

/// Magnus-Tetens coefficient `a` (dimensionless).
pub const MAGNUS_A: f64 = 17.62;

/// Magnus-Tetens coefficient `b` in °C.
pub const MAGNUS_B_C: f64 = 243.12;

/// Relative humidity is clamped into this range before taking its log.
pub const RH_MATH_MIN: f64 = 1.0;
pub const RH_MATH_MAX: f64 = 100.0;

// ---

/// Dew point in °C for an air temperature (°C) and relative humidity (%).
///
/// Returns `f64::NAN` when either input is non-finite. Callers must treat a
/// non-finite result as "undefined" and leave the sample out of any
/// aggregation.
pub fn dew_point_c(temp_c: f64, rh_percent: f64) -> f64 {
    // ---
    if !temp_c.is_finite() || !rh_percent.is_finite() {
        return f64::NAN;
    }

    let rh = rh_percent.clamp(RH_MATH_MIN, RH_MATH_MAX);
    let gamma = (rh / 100.0).ln() + (MAGNUS_A * temp_c) / (MAGNUS_B_C + temp_c);
    let dew_point = (MAGNUS_B_C * gamma) / (MAGNUS_A - gamma);

    if dew_point.is_finite() {
        dew_point
    } else {
        f64::NAN
    }
}

/// Fahrenheit reading to Celsius.
pub fn f_to_c(f: f64) -> f64 {
    (f - 32.0) * 5.0 / 9.0
}

/// Celsius reading to Fahrenheit.
pub fn c_to_f(c: f64) -> f64 {
    c * 9.0 / 5.0 + 32.0
}

/// Fahrenheit difference to Celsius difference. No offset.
pub fn delta_f_to_c(d: f64) -> f64 {
    d * 5.0 / 9.0
}

/// Celsius difference to Fahrenheit difference. No offset.
pub fn delta_c_to_f(d: f64) -> f64 {
    d * 9.0 / 5.0
}
