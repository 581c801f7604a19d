//! Gen2 Switch Component
//!
//! Plugs and relays with power metering (Plus Plug S, Plus 1PM, Pro 4PM ...)
//! report readings through `Switch.GetStatus` for the configured channel.
//!
//! # Metrics Produced
//! - `shelly_power_watts`, `shelly_voltage_volts`, `shelly_current_amperes`
//! - `shelly_frequency_hertz`, `shelly_energy_watt_hours_total`
//! - `shelly_temperature_celsius`, `shelly_output_on`
//!
//! `shelly_current_amperes` can be derived from power and voltage when the
//! device does not report it (see `derive_current`).

use super::FieldSpec;

pub const METHOD: &str = "Switch.GetStatus";

pub const CURRENT_METRIC: &str = "current_amperes";
pub const POWER_PATH: &str = "apower";
pub const VOLTAGE_PATH: &str = "voltage";

pub static FIELDS: &[FieldSpec] = &[
    FieldSpec::new(METHOD, "apower", "power_watts", "Instantaneous active power in watts"),
    FieldSpec::new(METHOD, "voltage", "voltage_volts", "Supply voltage in volts"),
    FieldSpec::new(METHOD, "current", CURRENT_METRIC, "Current in amperes"),
    FieldSpec::new(METHOD, "freq", "frequency_hertz", "Network frequency in hertz"),
    FieldSpec::new(
        METHOD,
        "aenergy.total",
        "energy_watt_hours_total",
        "Total active energy consumed in watt-hours",
    ),
    FieldSpec::new(
        METHOD,
        "temperature.tC",
        "temperature_celsius",
        "Internal device temperature in Celsius",
    ),
    FieldSpec::new(METHOD, "output", "output_on", "Relay output state (1=on, 0=off)"),
];

/// Current from power and voltage, omitted when voltage cannot divide.
pub fn derive_current(power: f64, voltage: f64) -> Option<f64> {
    if !power.is_finite() || !voltage.is_finite() || voltage == 0.0 {
        return None;
    }
    Some(power / voltage)
}
