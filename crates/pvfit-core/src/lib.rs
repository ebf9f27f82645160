//! Estimation of PVsyst single-diode model parameters from measured IV
//! curves.
//!
//! The crate fits the five STC coefficients of the PVsyst module
//! performance model (light current, dark current, series and shunt
//! resistance, diode ideality factor with its temperature coefficient)
//! from a batch of IV curves taken across irradiance and temperature.
//! The pipeline rectifies each curve, extracts initial per-curve
//! single-diode parameters by the co-content integral method, regresses
//! the ideality factor from Isc-Voc data, refines the per-curve
//! parameters against the measured maximum-power points, and closes with
//! the temperature and irradiance regressions of the PVsyst
//! parameterization.
//!
//! Entry point: [`estimation::estimate_pvsyst_parameters`] (or the
//! `_default` convenience wrapper). Numerically indeterminate inputs
//! propagate as NaN and are contained by the per-curve usability mask;
//! only structural precondition violations return errors.

pub mod common;
pub mod dataset;
pub mod domain;
pub mod estimation;
pub mod numerics;
pub mod singlediode;

pub use common::constants::PhysicalConstants;
pub use dataset::{EstimationDataset, EstimationReport, dataset_from_json, report_to_json};
pub use domain::{
    EstimationError, EstimationOptions, EstimationResult, IvCurve, IvCurveSet,
    MaxPowerPrediction, ModuleSpecs, PvsystParameterSet,
};
pub use estimation::{
    estimate_pvsyst_parameters, estimate_pvsyst_parameters_default,
    estimate_pvsyst_parameters_with_diagnostics,
};
pub use singlediode::{ReferenceSingleDiodeSolver, SingleDiodeSolverApi};
