use anyhow::Context;
use clap::Parser;
use generator::profile::build_channel_pair;
use sarfiltcore::filter::FilterType;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use workflow::config::WorkflowConfig;
use workflow::runner::Runner;

mod generator;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Two-channel sub-band / common-band filtering driver")]
struct Args {
    /// Load a workflow config from YAML
    #[arg(long)]
    workflow: Option<PathBuf>,
    #[arg(long, default_value_t = 256)]
    rows: usize,
    #[arg(long, default_value_t = 512)]
    columns: usize,
    /// Range upsampling factor (1 disables the stage)
    #[arg(long, default_value_t = 1)]
    upsample: usize,
    /// Range filter shape: boxcar or cosine
    #[arg(long, default_value = "cosine")]
    filter_type: String,
    /// Write the range band-pass kernel to this file
    #[arg(long)]
    dump_filter: Option<PathBuf>,
    /// Override the generator seed
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long, default_value = "tools/data/filtersim_report.log")]
    report: PathBuf,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut workflow_config = if let Some(path) = args.workflow {
        WorkflowConfig::load(path)?
    } else {
        let filter_type: FilterType = args
            .filter_type
            .parse()
            .context("parsing --filter-type")?;
        let config = WorkflowConfig::from_args(args.rows, args.columns, args.upsample, filter_type);
        config.validate().context("validating command-line workflow")?;
        config
    };
    if let Some(seed) = args.seed {
        workflow_config.generator.seed = seed;
    }

    let channels = build_channel_pair(
        &workflow_config.generator,
        workflow_config.rows,
        workflow_config.columns,
        workflow_config.bandpass.sampling_frequency,
        &workflow_config.common_band,
        &workflow_config.reference_doppler,
        &workflow_config.secondary_doppler,
    )?;

    let (rows, columns) = channels.dim();
    let runner = Runner::new(workflow_config.clone());
    let result = runner.execute(&channels)?;
    log::debug!(
        "secondary output {:?}, {} device allocation(s) outstanding",
        result.secondary_block.dim(),
        runner.device().live_allocations()
    );

    println!(
        "Filtered {}x{} -> {}x{}: range pass band {:.1}%, azimuth pass band {:.1}%, zero lines {}",
        rows,
        columns,
        result.output_shape.0,
        result.output_shape.1,
        100.0 * result.range_passband,
        100.0 * result.azimuth_passband,
        result.zero_overlap_lines
    );
    println!(
        "reference RMS {:.4} -> {:.4}, secondary RMS {:.4} -> {:.4}",
        result.reference.input_rms,
        result.reference.commonband_rms,
        result.secondary.input_rms,
        result.secondary.commonband_rms
    );

    if let Some(path) = &args.dump_filter {
        runner.dump_filter(path)?;
        println!("range filter written to {}", path.display());
    }

    let report = serde_json::to_string(&result).context("serializing workflow report")?;
    if let Some(parent) = args.report.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating report directory {}", parent.display()))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&args.report)
        .with_context(|| format!("opening report {}", args.report.display()))?;
    writeln!(file, "{}", report)?;

    Ok(())
}
