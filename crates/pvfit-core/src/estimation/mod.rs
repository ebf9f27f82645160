//! The PVsyst parameter-estimation pipeline.

pub mod converge;
pub mod driver;
pub mod filter;
pub mod rectify;
pub mod rsh_model;

pub use converge::{ConvergenceRecord, ErrorStats, StatChanges, check_converge};
pub use driver::{
    estimate_pvsyst_parameters, estimate_pvsyst_parameters_default,
    estimate_pvsyst_parameters_with_diagnostics,
};
pub use filter::{FilterInput, filter_params};
pub use rectify::{RectifiedCurve, rectify_iv_curve};
pub use rsh_model::{estrsh, fun_rsh};
