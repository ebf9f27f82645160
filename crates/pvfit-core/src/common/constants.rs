//! Physical constants and reference conditions for the PVsyst model fit.
//!
//! The constants are carried as an explicit immutable value rather than
//! module-level mutable state so callers can override reference conditions
//! per estimation run.

use serde::{Deserialize, Serialize};

pub const CELSIUS_TO_KELVIN: f64 = 273.15;

/// PVsyst default exponent for the irradiance dependence of shunt
/// resistance. Fixed, not fitted.
pub const PVSYST_RSH_EXPONENT: f64 = 5.5;

pub const STC_IRRADIANCE: f64 = 1_000.0;
pub const STC_CELL_TEMPERATURE: f64 = 25.0;
pub const BOLTZMANN_J_PER_K: f64 = 1.38066e-23;
pub const ELEMENTARY_CHARGE_C: f64 = 1.60218e-19;

/// Reference conditions and physical constants used throughout the
/// estimation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicalConstants {
    /// Reference effective irradiance (W/m^2).
    #[serde(default = "default_e0")]
    pub e0: f64,
    /// Reference cell temperature (degrees C).
    #[serde(default = "default_t0")]
    pub t0: f64,
    /// Boltzmann constant (J/K).
    #[serde(default = "default_k")]
    pub k: f64,
    /// Elementary charge (C).
    #[serde(default = "default_q")]
    pub q: f64,
}

impl Default for PhysicalConstants {
    fn default() -> Self {
        Self {
            e0: STC_IRRADIANCE,
            t0: STC_CELL_TEMPERATURE,
            k: BOLTZMANN_J_PER_K,
            q: ELEMENTARY_CHARGE_C,
        }
    }
}

impl PhysicalConstants {
    /// Reference cell temperature in Kelvin.
    pub fn t0_kelvin(&self) -> f64 {
        self.t0 + CELSIUS_TO_KELVIN
    }

    /// Single-cell thermal voltage kT/q at the given cell temperature
    /// (degrees C).
    pub fn thermal_voltage(&self, cell_temperature: f64) -> f64 {
        self.k / self.q * (cell_temperature + CELSIUS_TO_KELVIN)
    }

    /// q/k, the inverse "thermal slope" used by the dark-current
    /// temperature regressions.
    pub fn charge_over_boltzmann(&self) -> f64 {
        self.q / self.k
    }
}

fn default_e0() -> f64 {
    STC_IRRADIANCE
}

fn default_t0() -> f64 {
    STC_CELL_TEMPERATURE
}

fn default_k() -> f64 {
    BOLTZMANN_J_PER_K
}

fn default_q() -> f64 {
    ELEMENTARY_CHARGE_C
}

#[cfg(test)]
mod tests {
    use super::{CELSIUS_TO_KELVIN, PVSYST_RSH_EXPONENT, PhysicalConstants};

    #[test]
    fn defaults_are_standard_test_conditions() {
        let constants = PhysicalConstants::default();
        assert_eq!(constants.e0, 1_000.0);
        assert_eq!(constants.t0, 25.0);
        assert!((constants.t0_kelvin() - 298.15).abs() <= 1.0e-12);
    }

    #[test]
    fn thermal_voltage_matches_kt_over_q() {
        let constants = PhysicalConstants::default();
        let vth = constants.thermal_voltage(25.0);
        let expected = 1.38066e-23 / 1.60218e-19 * (25.0 + CELSIUS_TO_KELVIN);
        assert!((vth - expected).abs() <= 1.0e-15);
        assert!(vth > 0.025 && vth < 0.027);
    }

    #[test]
    fn rsh_exponent_is_the_pvsyst_default() {
        assert_eq!(PVSYST_RSH_EXPONENT, 5.5);
    }
}
