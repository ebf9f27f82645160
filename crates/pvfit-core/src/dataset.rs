//! JSON dataset and result serialization.
//!
//! The estimation itself is a library call; this module gives the CLI and
//! fixtures a concrete on-disk form: a dataset document bundling the
//! measured curves, the module specs and optional constants overrides, and
//! a report document wrapping the fitted parameter set.

use crate::common::constants::PhysicalConstants;
use crate::domain::{EstimationOptions, IvCurveSet, ModuleSpecs, PvsystParameterSet};
use crate::numerics::count_true;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimationDataset {
    #[serde(flatten)]
    pub curves: IvCurveSet,
    pub specs: ModuleSpecs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constants: Option<PhysicalConstants>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<EstimationOptions>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimationReport {
    pub parameters: PvsystParameterSet,
    pub curve_count: usize,
    pub usable_count: usize,
}

impl EstimationReport {
    pub fn from_parameters(parameters: PvsystParameterSet) -> Self {
        let curve_count = parameters.usable.len();
        let usable_count = count_true(&parameters.usable);
        Self {
            parameters,
            curve_count,
            usable_count,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("failed to parse estimation dataset: {source}")]
    Parse {
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize estimation report: {source}")]
    Serialize {
        #[source]
        source: serde_json::Error,
    },
}

pub fn dataset_from_json(source: &str) -> Result<EstimationDataset, DatasetError> {
    serde_json::from_str(source).map_err(|source| DatasetError::Parse { source })
}

pub fn report_to_json(report: &EstimationReport) -> Result<String, DatasetError> {
    serde_json::to_string_pretty(report).map_err(|source| DatasetError::Serialize { source })
}

pub fn report_from_json(source: &str) -> Result<EstimationReport, DatasetError> {
    serde_json::from_str(source).map_err(|source| DatasetError::Parse { source })
}

#[cfg(test)]
mod tests {
    use super::{dataset_from_json, report_from_json, report_to_json, EstimationReport};
    use crate::domain::PvsystParameterSet;

    const DATASET: &str = r#"{
        "curves": [
            {
                "current": [5.0, 4.9, 0.0],
                "voltage": [0.0, 5.0, 10.0],
                "isc": 5.0,
                "voc": 10.0,
                "imp": 4.5,
                "vmp": 8.0,
                "ee": 1000.0,
                "tc": 25.0
            }
        ],
        "specs": { "ns": 60, "aisc": 0.004 }
    }"#;

    #[test]
    fn dataset_parses_curves_and_specs() {
        let dataset = dataset_from_json(DATASET).expect("dataset");
        assert_eq!(dataset.curves.len(), 1);
        assert_eq!(dataset.specs.ns, 60);
        assert!(dataset.constants.is_none());
        assert!(dataset.options.is_none());
        let curve = &dataset.curves.curves[0];
        assert_eq!(curve.voltage.len(), 3);
        assert_eq!(curve.isc, 5.0);
    }

    #[test]
    fn dataset_accepts_constants_and_options_overrides() {
        let source = r#"{
            "curves": [],
            "specs": { "ns": 72, "aisc": 0.003 },
            "constants": { "e0": 1000.0, "t0": 25.0 },
            "options": { "max_iterations": 8, "tolerance": 1e-4 }
        }"#;
        let dataset = dataset_from_json(source).expect("dataset");
        let constants = dataset.constants.expect("constants");
        assert_eq!(constants.e0, 1_000.0);
        // Omitted physical constants fall back to their defaults.
        assert!(constants.k > 0.0);
        assert_eq!(dataset.options.expect("options").max_iterations, 8);
    }

    #[test]
    fn malformed_documents_produce_descriptive_errors() {
        let error = dataset_from_json("{\"curves\": 3}").expect_err("parse failure");
        assert!(error.to_string().contains("failed to parse"));
    }

    #[test]
    fn report_round_trips_through_json() {
        let parameters = PvsystParameterSet {
            il_ref: 6.0,
            io_ref: 4.0e-9,
            e_g: 1.12,
            rs_ref: 0.2,
            rsh_ref: 400.0,
            rsh0: 1_900.0,
            rsh_exp: 5.5,
            gamma_ref: 1.1,
            mu_gamma: -3.0e-4,
            ns: 60,
            iph: vec![6.0, 4.8],
            io: vec![4.0e-9, 3.1e-9],
            rs: vec![0.2, 0.21],
            rsh: vec![410.0, 520.0],
            usable: vec![true, true],
            success: true,
        };
        let report = EstimationReport::from_parameters(parameters.clone());
        assert_eq!(report.curve_count, 2);
        assert_eq!(report.usable_count, 2);

        let encoded = report_to_json(&report).expect("encode");
        let decoded = report_from_json(&encoded).expect("decode");
        assert_eq!(decoded.parameters, parameters);
    }

    #[test]
    fn failed_reports_serialize_nan_sentinels_as_null() {
        let report = EstimationReport::from_parameters(PvsystParameterSet::failed(2, 60));
        let encoded = report_to_json(&report).expect("encode");
        assert!(encoded.contains("null"));
        assert!(encoded.contains("\"success\": false"));
    }
}
