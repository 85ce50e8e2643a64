//! Entry point for the cmip-wrangler binary.
//! Handles CLI parsing, logging setup and configuration, then dispatches to pipeline stages.

use clap::Parser;
use cmip_wrangler::prelude::*;
use cmip_wrangler::metadata::describe_store;
use tracing::{info, warn};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod cli;

use cli::{Args, Command, LogLevel};

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(&args)?;

    let config = build_config(&args)?;
    ParallelConfig::new(config.threads).setup_global_pool()?;
    get_parallel_info().log();

    let pipeline = Pipeline::new(config)?;

    match &args.command {
        Command::Run => {
            let summary = pipeline.run()?;
            for report in &summary.reports {
                println!("{report}");
            }
            for timing in &summary.timings {
                println!("⏱ {}: {:.2} mins", timing.stage, timing.minutes());
            }
            for name in &summary.written {
                println!("✅ {name}");
            }
            if !summary.is_clean() {
                warn!("Some items failed; see the reports above");
            }
        }
        Command::Resolve => {
            let resolution = pipeline.resolve()?;
            println!("\n===== Datasets ({}) =====", resolution.datasets.len());
            for (key, dataset) in resolution.datasets.iter() {
                println!("- {key} ({} members)", dataset.members.len());
            }
            println!("\n===== Models ({}) =====", resolution.model_names.len());
            for model in &resolution.model_names {
                println!("- {model}");
            }
        }
        Command::Normalize => {
            let resolution = pipeline.resolve()?;
            let report = pipeline.normalize_models(&resolution)?;
            println!("{report}");
        }
        Command::Baseline { .. } => {
            let resolution = pipeline.resolve()?;
            let report = pipeline.normalize_baselines(&resolution.model_names)?;
            println!("{report}");
        }
        Command::Stats { normalized } => {
            let resolution = pipeline.resolve()?;
            let (report, written) = pipeline.compute_statistics(&resolution.model_names, *normalized)?;
            println!("{report}");
            for name in written {
                println!("✅ {name}");
            }
        }
        Command::GlobalMean => {
            let resolution = pipeline.resolve()?;
            let (report, written) = pipeline.compute_global_means(&resolution.model_names)?;
            println!("{report}");
            for name in written {
                println!("✅ {name}");
            }
        }
        Command::Observations { .. } => match pipeline.process_observations()? {
            Some(name) => println!("✅ Saved {name}"),
            None => println!("No observation file configured"),
        },
        Command::Clean { pattern } => {
            let removed = pipeline.store().delete_matching(pattern)?;
            println!("🧹 Removed {removed} store(s) matching '{pattern}'");
        }
        Command::Inspect { name } => {
            describe_store(pipeline.store(), name)?.print();
        }
        Command::List { prefix } => {
            for name in pipeline.store().list_names(prefix)? {
                println!("{name}");
            }
        }
    }

    info!("Done");
    Ok(())
}

fn init_logging(args: &Args) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let filter = log_filter(std::env::var("RUST_LOG").ok().as_deref(), args.log_level);
    if args.json_logs {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_target(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(())
}

/// RUST_LOG directives when set and valid, otherwise `--log-level`
fn log_filter(rust_log: Option<&str>, level: LogLevel) -> EnvFilter {
    rust_log
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| {
            EnvFilter::default().add_directive(LevelFilter::from_level(level.into()).into())
        })
}

/// Config file (or defaults) with command-line overrides applied
fn build_config(args: &Args) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };

    if let Some(dir) = &args.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(catalog) = &args.catalog {
        config.catalog = Some(catalog.clone());
    }
    if let Some(dir) = &args.store_dir {
        config.store_dir = Some(dir.clone());
    }
    if let Some(scenarios) = &args.scenarios {
        config.scenarios = scenarios.clone();
    }
    if let Some(variable) = &args.variable {
        config.variable = variable.clone();
    }
    if let Some(num_chunks) = args.num_chunks {
        config.num_chunks = num_chunks;
    }
    if args.threads.is_some() {
        config.threads = args.threads;
    }

    match &args.command {
        Command::Baseline { start_year, end_year } => {
            if let Some(start) = start_year {
                config.baseline.start_year = *start;
            }
            if let Some(end) = end_year {
                config.baseline.end_year = *end;
            }
        }
        Command::Observations { file, skip_months } => {
            if let Some(file) = file {
                config.observations_file = Some(file.clone());
            }
            if let Some(skip) = skip_months {
                config.skip_months = *skip;
            }
        }
        _ => {}
    }

    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_flag_sets_filter() {
        let filter = log_filter(None, LogLevel::Debug);
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));
    }

    #[test]
    fn rust_log_overrides_flag() {
        let filter = log_filter(Some("warn"), LogLevel::Trace);
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::WARN));
        let blank = log_filter(Some(" "), LogLevel::Error);
        assert_eq!(blank.max_level_hint(), Some(LevelFilter::ERROR));
    }
}
