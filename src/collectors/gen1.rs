//! Gen1 HTTP Devices
//!
//! Plug S, 1PM, 2.5 and similar report everything in one `GET /status`
//! document. Meter and relay arrays are indexed by the configured channel.
//!
//! # Metrics Produced
//! - `shelly_power_watts`, `shelly_energy_watt_minutes_total`
//! - `shelly_output_on`, `shelly_temperature_celsius`, `shelly_overtemperature`

use super::FieldSpec;
use crate::shelly::http::STATUS_PATH;

pub static FIELDS: &[FieldSpec] = &[
    FieldSpec::new(
        STATUS_PATH,
        "meters.#.power",
        "power_watts",
        "Instantaneous active power in watts",
    ),
    FieldSpec::new(
        STATUS_PATH,
        "meters.#.total",
        "energy_watt_minutes_total",
        "Total energy consumed in watt-minutes",
    ),
    FieldSpec::new(
        STATUS_PATH,
        "relays.#.ison",
        "output_on",
        "Relay output state (1=on, 0=off)",
    ),
    FieldSpec::new(
        STATUS_PATH,
        "temperature",
        "temperature_celsius",
        "Internal device temperature in Celsius",
    ),
    FieldSpec::new(
        STATUS_PATH,
        "overtemperature",
        "overtemperature",
        "Overtemperature protection active (1=yes, 0=no)",
    ),
];
