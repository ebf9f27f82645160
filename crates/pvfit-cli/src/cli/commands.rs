use super::{CliError, EXIT_ESTIMATION_FAILED, EXIT_OK};
use anyhow::Context;
use pvfit_core::dataset::{EstimationReport, dataset_from_json, report_to_json};
use pvfit_core::estimation::estimate_pvsyst_parameters;
use pvfit_core::singlediode::ReferenceSingleDiodeSolver;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(clap::Args)]
pub(super) struct EstimateArgs {
    /// IV-curve dataset (JSON)
    #[arg(long)]
    input: PathBuf,

    /// Fitted-parameter report output path (JSON); stdout when omitted
    #[arg(long)]
    output: Option<PathBuf>,

    /// Maximum refinement iterations (overrides the dataset's options)
    #[arg(long)]
    max_iterations: Option<usize>,

    /// Convergence tolerance (overrides the dataset's options)
    #[arg(long)]
    tolerance: Option<f64>,

    /// Exit non-zero when the diode-factor regression fails
    #[arg(long)]
    strict: bool,
}

#[derive(clap::Args)]
pub(super) struct InspectArgs {
    /// IV-curve dataset (JSON)
    #[arg(long)]
    input: PathBuf,
}

pub(super) fn run_estimate(args: EstimateArgs) -> Result<i32, CliError> {
    let dataset = load_dataset(&args.input)?;
    info!(
        curves = dataset.curves.len(),
        ns = dataset.specs.ns,
        "loaded dataset"
    );

    let constants = dataset.constants.unwrap_or_default();
    let mut options = dataset.options.unwrap_or_default();
    if let Some(max_iterations) = args.max_iterations {
        options.max_iterations = max_iterations;
    }
    if let Some(tolerance) = args.tolerance {
        options.tolerance = tolerance;
    }

    let parameters = estimate_pvsyst_parameters(
        &dataset.curves,
        &dataset.specs,
        &constants,
        &options,
        &ReferenceSingleDiodeSolver,
    )
    .context("estimation failed on structural grounds")?;

    let success = parameters.success;
    if success {
        info!(
            gamma_ref = parameters.gamma_ref,
            il_ref = parameters.il_ref,
            rs_ref = parameters.rs_ref,
            rsh_ref = parameters.rsh_ref,
            "estimation converged"
        );
    } else {
        warn!("diode-factor regression failed; report carries NaN sentinels");
    }

    let report = EstimationReport::from_parameters(parameters);
    let encoded = report_to_json(&report).context("could not serialize report")?;
    match &args.output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent).with_context(|| {
                        format!("could not create report directory '{}'", parent.display())
                    })?;
                }
            }
            fs::write(path, &encoded)
                .with_context(|| format!("could not write report '{}'", path.display()))?;
            info!(path = %path.display(), "wrote report");
        }
        None => println!("{encoded}"),
    }

    if !success && args.strict {
        return Ok(EXIT_ESTIMATION_FAILED);
    }
    Ok(EXIT_OK)
}

pub(super) fn run_inspect(args: InspectArgs) -> Result<i32, CliError> {
    let dataset = load_dataset(&args.input)?;

    println!("curves: {}", dataset.curves.len());
    println!("ns: {}", dataset.specs.ns);
    println!("aisc: {}", dataset.specs.aisc);
    for (index, curve) in dataset.curves.curves.iter().enumerate() {
        println!(
            "curve {index}: {} samples, ee={} W/m^2, tc={} C, isc={} A, voc={} V",
            curve.sample_count(),
            curve.ee,
            curve.tc,
            curve.isc,
            curve.voc
        );
    }

    Ok(EXIT_OK)
}

fn load_dataset(path: &Path) -> Result<pvfit_core::dataset::EstimationDataset, CliError> {
    let source = fs::read_to_string(path)
        .with_context(|| format!("could not read dataset '{}'", path.display()))?;
    let dataset =
        dataset_from_json(&source).with_context(|| format!("invalid dataset '{}'", path.display()))?;
    Ok(dataset)
}
