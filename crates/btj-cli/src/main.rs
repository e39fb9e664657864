use anyhow::Result;
use btj_params::{Generator, GeneratorConfig, PlanCounts, RunSummary, Stage};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "btj-params",
    version = "0.3.0",
    about = "Parameter file generator for the partitioning/join pipeline"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Generate {
        config: PathBuf,
        #[arg(long)]
        skip_partition_matrix: bool,
        #[arg(long)]
        skip_rearrangement: bool,
        #[arg(long)]
        skip_partitioning: bool,
        #[arg(long)]
        downstream: bool,
        #[arg(long)]
        json: bool,
    },
    Describe {
        config: PathBuf,
        #[arg(long)]
        json: bool,
    },
    Init {
        #[arg(long, default_value = "experiment-params.yaml")]
        path: PathBuf,
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();
    let json_mode = command_json_mode(&cli.command);
    let result = run_command(cli.command);
    match result {
        Ok(Some(payload)) => {
            emit_json(&payload);
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(err) => {
            if json_mode {
                emit_json(&json_error("command_failed", format!("{:#}", err), json!({})));
                std::process::exit(1);
            }
            Err(err)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn run_command(command: Commands) -> Result<Option<Value>> {
    match command {
        Commands::Generate {
            config,
            skip_partition_matrix,
            skip_rearrangement,
            skip_partitioning,
            downstream,
            json,
        } => {
            let mut cfg = GeneratorConfig::load(&config)?;
            apply_stage_flags(
                &mut cfg,
                skip_partition_matrix,
                skip_rearrangement,
                skip_partitioning,
                downstream,
            );
            info!(config = %config.display(), stages = ?cfg.stages.enabled(), "loaded config");
            let generator = Generator::new(cfg, std::env::current_dir()?)?;
            let summary = generator.run()?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "generate",
                    "config": config.display().to_string(),
                    "parameters_dir": generator.parameters_directory().display().to_string(),
                    "summary": run_summary_to_json(&summary),
                })));
            }
            println!("parameters_dir: {}", generator.parameters_directory().display());
            print_run_summary(&summary);
        }
        Commands::Describe { config, json } => {
            let cfg = GeneratorConfig::load(&config)?;
            let generator = Generator::new(cfg, std::env::current_dir()?)?;
            let plan = generator.plan_counts();
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "describe",
                    "config": config.display().to_string(),
                    "summary": describe_to_json(&generator, &plan),
                })));
            }
            print_describe(&generator, &plan);
        }
        Commands::Init { path, force } => {
            write_template(&path, force)?;
            println!("wrote: {}", path.display());
            println!("next: edit {} to choose the dataset and dimensions", path.display());
            println!("next: btj-params describe {}", path.display());
        }
    }
    Ok(None)
}

fn apply_stage_flags(
    cfg: &mut GeneratorConfig,
    skip_partition_matrix: bool,
    skip_rearrangement: bool,
    skip_partitioning: bool,
    downstream: bool,
) {
    if skip_partition_matrix {
        cfg.stages.set(Stage::PartitionMatrix, false);
    }
    if skip_rearrangement {
        cfg.stages.set(Stage::Rearrangement, false);
    }
    if skip_partitioning {
        cfg.stages.set(Stage::Partitioning, false);
    }
    if downstream {
        cfg.stages.set(Stage::Downstream, true);
    }
}

fn emit_json(value: &Value) {
    match serde_json::to_string(value) {
        Ok(s) => println!("{}", s),
        Err(_) => println!(
            "{{\"ok\":false,\"error\":{{\"code\":\"serialization_error\",\"message\":\"failed to serialize JSON payload\",\"details\":{{}}}}}}"
        ),
    }
}

fn json_error(code: &str, message: String, details: Value) -> Value {
    json!({
        "ok": false,
        "error": {
            "code": code,
            "message": message,
            "details": details
        }
    })
}

fn command_json_mode(command: &Commands) -> bool {
    match command {
        Commands::Generate { json, .. } | Commands::Describe { json, .. } => *json,
        Commands::Init { .. } => false,
    }
}

fn run_summary_to_json(summary: &RunSummary) -> Value {
    let stages: serde_json::Map<String, Value> = summary
        .stages
        .iter()
        .map(|(stage, s)| {
            (
                stage.as_str().to_string(),
                json!({
                    "emitted": s.emitted,
                    "skipped": s.skipped,
                    "skipped_total": s.skipped_total(),
                    "path": s.path.as_ref().map(|p| p.display().to_string()),
                }),
            )
        })
        .collect();
    json!({
        "stages": stages,
        "leaves": summary.leaves,
        "pruned": summary.pruned,
    })
}

fn print_run_summary(summary: &RunSummary) {
    for (stage, s) in &summary.stages {
        println!("{}.emitted: {}", stage, s.emitted);
        for (reason, count) in &s.skipped {
            println!("{}.skipped.{}: {}", stage, reason, count);
        }
        if let Some(path) = &s.path {
            println!("{}.path: {}", stage, path.display());
        }
    }
    println!("leaves: {}", summary.leaves);
    for (predicate, count) in &summary.pruned {
        println!("pruned.{}: {}", predicate, count);
    }
}

fn dimension_sizes(cfg: &GeneratorConfig) -> Vec<(&'static str, usize)> {
    let dims = &cfg.dimensions;
    vec![
        ("num_partitions_modes", dims.num_partitions_modes.len()),
        ("search_policies", dims.search_policies.len()),
        ("buckets", dims.buckets.len()),
        ("sparsities", dims.sparsities.len()),
        ("bands", dims.bands.len()),
        ("bands_offset_seeds", dims.bands_offset_seeds.len()),
        ("rearrangement_policies", dims.rearrangement_policies.len()),
        ("partitioning_policies", dims.partitioning_policies.len()),
        ("num_partitions", dims.num_partitions.len()),
        ("range_search_weights", dims.range_search_weights.len()),
        ("binary_search_policies", dims.binary_search_policies.len()),
    ]
}

fn describe_to_json(generator: &Generator, plan: &PlanCounts) -> Value {
    let cfg = generator.config();
    let dimensions: serde_json::Map<String, Value> = dimension_sizes(cfg)
        .into_iter()
        .map(|(name, size)| (name.to_string(), json!(size)))
        .collect();
    json!({
        "dataset": cfg.dataset_directory().display().to_string(),
        "parameters_dir": generator.parameters_directory().display().to_string(),
        "stages": cfg.stages.enabled().iter().map(|s| s.as_str()).collect::<Vec<_>>(),
        "dimensions": dimensions,
        "weight_sets": generator.weight_sets(),
        "matrices": plan.matrices,
        "rearrangements": plan.rearrangements,
        "leaves": plan.leaves,
        "surviving_leaves": plan.surviving_leaves(),
        "pruned": plan.pruned,
    })
}

fn print_describe(generator: &Generator, plan: &PlanCounts) {
    let cfg = generator.config();
    println!("dataset: {}", cfg.dataset_directory().display());
    println!("parameters_dir: {}", generator.parameters_directory().display());
    let stages: Vec<&str> = cfg.stages.enabled().iter().map(|s| s.as_str()).collect();
    println!("stages: {}", stages.join(", "));
    for (name, size) in dimension_sizes(cfg) {
        println!("dimensions.{}: {}", name, size);
    }
    for weight_set in generator.weight_sets() {
        println!("weight_set: {}", weight_set);
    }
    println!("matrices: {}", plan.matrices);
    println!("rearrangements: {}", plan.rearrangements);
    println!("leaves: {}", plan.leaves);
    println!("surviving_leaves: {}", plan.surviving_leaves());
    for (predicate, count) in &plan.pruned {
        println!("pruned.{}: {}", predicate, count);
    }
}

const TEMPLATE: &str = "\
dataset:
  root: datasets
  name: solarAltitude_1m
output:
  parameters_dir: parameters
stages:
  partition_matrix: true
  rearrangement: true
  partitioning: true
  downstream: false
dimensions:
  num_partitions_modes: [actual]               # actual | likeDefault
  search_policies: [RANGE_SEARCH]              # BINARY_SEARCH | RANGE_SEARCH
  buckets: [100]
  sparsities: [1]
  bands: [1, 2, 3, 4, 5, 6]
  bands_offset_seeds: [0, 1, 2, 3, 4, 5, 6, 7, 8, 9]
  rearrangement_policies: [none, TSPk]         # none | BEA | BEARadius | TSP*
  partitioning_policies: [MBI, AICPM]
  num_partitions: [10, 20, 40, 80]
  range_search_weights:
    - BJrepIC_1.0-BJmaxIC_0.0-BJmaxCC_0.0
    - BJrepIC_0.0-BJmaxIC_1.0-BJmaxCC_0.0
    - BJrepIC_0.0-BJmaxIC_0.0-BJmaxCC_1.0
    - BJrepIC_0.5-BJmaxIC_0.0-BJmaxCC_0.5
    - BJrepIC_0.33-BJmaxIC_0.33-BJmaxCC_0.33
    - BJrepIC_0.25-BJmaxIC_0.25-BJmaxCC_0.5
  binary_search_policies: [MAX_PARTITION_INPUT, MAX_PARTITION_CANDIDATE_CELLS]
defaults:
  partitioning_policy: MBI
  search_policy: BINARY_SEARCH
  binary_search_policy: MAX_PARTITION_INPUT
  num_partitions_mode: actual
  range_search_upper_bound_granularity: '2.0_11'
  bea_radius: 3
  tspk_path: btj/tspk
  job_max_execution_hours: 30
";

fn write_template(path: &Path, force: bool) -> Result<()> {
    if !force && path.exists() {
        return Err(anyhow::anyhow!(format!(
            "init file already exists (use --force): {}",
            path.display()
        )));
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, TEMPLATE)?;
    Ok(())
}
