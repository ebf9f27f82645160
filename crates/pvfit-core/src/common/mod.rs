pub mod constants;

pub use constants::{PhysicalConstants, CELSIUS_TO_KELVIN, PVSYST_RSH_EXPONENT};
