//! Gen2 Three-Phase Energy Meter
//!
//! The Pro 3EM needs two calls per refresh: `EM.GetStatus` for live per-phase
//! readings and `EMData.GetStatus` for the energy counters.
//!
//! # Metrics Produced
//! - `shelly_phase_*{phase="a|b|c"}` - Per-phase current, voltage, power, power factor, frequency, energy
//! - `shelly_total_*` - Sums over all phases
//! - `shelly_energy_watt_hours_total`, `shelly_returned_energy_watt_hours_total`

use super::FieldSpec;

pub const STATUS_METHOD: &str = "EM.GetStatus";
pub const DATA_METHOD: &str = "EMData.GetStatus";

macro_rules! phase_fields {
    ($phase:literal) => {
        [
            FieldSpec::phase(
                STATUS_METHOD,
                concat!($phase, "_current"),
                "phase_current_amperes",
                $phase,
                "Per-phase current in amperes",
            ),
            FieldSpec::phase(
                STATUS_METHOD,
                concat!($phase, "_voltage"),
                "phase_voltage_volts",
                $phase,
                "Per-phase voltage in volts",
            ),
            FieldSpec::phase(
                STATUS_METHOD,
                concat!($phase, "_act_power"),
                "phase_active_power_watts",
                $phase,
                "Per-phase active power in watts",
            ),
            FieldSpec::phase(
                STATUS_METHOD,
                concat!($phase, "_aprt_power"),
                "phase_apparent_power_voltamperes",
                $phase,
                "Per-phase apparent power in volt-amperes",
            ),
            FieldSpec::phase(
                STATUS_METHOD,
                concat!($phase, "_pf"),
                "phase_power_factor",
                $phase,
                "Per-phase power factor",
            ),
            FieldSpec::phase(
                STATUS_METHOD,
                concat!($phase, "_freq"),
                "phase_frequency_hertz",
                $phase,
                "Per-phase network frequency in hertz",
            ),
            FieldSpec::phase(
                DATA_METHOD,
                concat!($phase, "_total_act_energy"),
                "phase_energy_watt_hours_total",
                $phase,
                "Per-phase active energy consumed in watt-hours",
            ),
            FieldSpec::phase(
                DATA_METHOD,
                concat!($phase, "_total_act_ret_energy"),
                "phase_returned_energy_watt_hours_total",
                $phase,
                "Per-phase active energy returned to the grid in watt-hours",
            ),
        ]
    };
}

const PHASE_A: [FieldSpec; 8] = phase_fields!("a");
const PHASE_B: [FieldSpec; 8] = phase_fields!("b");
const PHASE_C: [FieldSpec; 8] = phase_fields!("c");

const TOTALS: [FieldSpec; 5] = [
    FieldSpec::new(
        STATUS_METHOD,
        "total_current",
        "total_current_amperes",
        "Current summed over all phases in amperes",
    ),
    FieldSpec::new(
        STATUS_METHOD,
        "total_act_power",
        "total_active_power_watts",
        "Active power summed over all phases in watts",
    ),
    FieldSpec::new(
        STATUS_METHOD,
        "total_aprt_power",
        "total_apparent_power_voltamperes",
        "Apparent power summed over all phases in volt-amperes",
    ),
    FieldSpec::new(
        DATA_METHOD,
        "total_act",
        "energy_watt_hours_total",
        "Total active energy consumed in watt-hours",
    ),
    FieldSpec::new(
        DATA_METHOD,
        "total_act_ret",
        "returned_energy_watt_hours_total",
        "Total active energy returned to the grid in watt-hours",
    ),
];

static ALL_FIELDS: [FieldSpec; 29] = concat_fields();

pub static FIELDS: &[FieldSpec] = &ALL_FIELDS;

const fn concat_fields() -> [FieldSpec; 29] {
    let groups: [&[FieldSpec]; 4] = [&PHASE_A, &PHASE_B, &PHASE_C, &TOTALS];
    let mut out = [TOTALS[0]; 29];
    let mut n = 0;
    let mut g = 0;
    while g < groups.len() {
        let mut i = 0;
        while i < groups[g].len() {
            out[n] = groups[g][i];
            n += 1;
            i += 1;
        }
        g += 1;
    }
    out
}
