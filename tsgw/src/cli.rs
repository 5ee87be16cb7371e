use std::io::{self, BufRead};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::ArgMatches;
use tsgw_config::{Config, OverridableConfig};
use tsgw_log::LogError;
use tsgw_publish::Publish;
use tsgw_schema::{MetricData, OrganizationId};

use crate::cliapp::make_app;
use crate::lines::parse_line;
use crate::setup;

/// Runs the command line application.
pub fn execute() -> Result<()> {
    let matches = make_app().get_matches();

    let config_path = matches
        .get_one::<PathBuf>("config")
        .map_or(Path::new("."), PathBuf::as_path);
    let mut config = Config::from_path(config_path)?;

    match matches.subcommand() {
        Some(("run", run_matches)) => {
            config.apply_override(extract_config_args(run_matches))?;
            run(config, run_matches)
        }
        Some(("config", config_matches)) => manage_config(&config, config_matches),
        _ => unreachable!(),
    }
}

/// Extract config arguments from a parsed command line arguments object.
pub fn extract_config_args(matches: &ArgMatches) -> OverridableConfig {
    OverridableConfig {
        kafka_url: matches.get_one("kafka_broker_url").cloned(),
        topic: matches.get_one("metrics_topic").cloned(),
        publish: matches.get_one("publish").cloned(),
        statsd: matches.get_one("statsd").cloned(),
    }
}

pub fn manage_config(config: &Config, matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("show", matches)) => {
            let output = match matches.get_one::<String>("format").map(String::as_str) {
                Some("debug") => format!("{config:#?}\n"),
                _ => config.to_yaml_string()?,
            };
            #[allow(clippy::print_stdout)]
            {
                print!("{output}");
            }
            Ok(())
        }
        Some(("check", matches)) => {
            setup::check_config(config)?;
            if !matches.get_flag("quiet") {
                #[allow(clippy::print_stdout)]
                {
                    println!("config is valid");
                }
            }
            Ok(())
        }
        _ => unreachable!(),
    }
}

pub fn run(config: Config, matches: &ArgMatches) -> Result<()> {
    setup::check_config(&config)?;
    tsgw_log::init(config.logging());
    setup::dump_spawn_infos(&config);
    setup::init_metrics(&config)?;

    let org = matches
        .get_one::<u32>("org")
        .copied()
        .map(OrganizationId::new)
        .context("missing organization")?;
    let batch_size = matches.get_one::<u64>("batch_size").copied().unwrap_or(1000) as usize;

    let pipeline = setup::init_pipeline(&config)?;
    let result = publish_lines(
        io::stdin().lock(),
        org,
        batch_size,
        pipeline.publisher.as_ref(),
    );
    pipeline.shutdown();

    let stats = result?;
    tsgw_log::info!(
        lines = stats.lines,
        invalid = stats.invalid,
        failed_batches = stats.failed_batches,
        "input closed, shutting down"
    );

    Ok(())
}

/// Counts of a [`publish_lines`] run.
#[derive(Debug, Default, PartialEq)]
pub struct LineStats {
    pub lines: usize,
    pub invalid: usize,
    pub failed_batches: usize,
}

/// Reads plaintext lines from `input` and publishes them in batches of up to `batch_size`.
///
/// Malformed lines are skipped. A failed batch is logged and does not stop the input.
pub fn publish_lines<R: BufRead>(
    input: R,
    org: OrganizationId,
    batch_size: usize,
    publisher: &dyn Publish,
) -> Result<LineStats> {
    let mut stats = LineStats::default();
    let mut batch: Vec<MetricData> = Vec::with_capacity(batch_size);

    for line in input.lines() {
        let line = line.context("failed to read input")?;
        if line.trim().is_empty() {
            continue;
        }

        stats.lines += 1;
        match parse_line(&line, org) {
            Ok(metric) => batch.push(metric),
            Err(error) => {
                tsgw_log::warn!(line = line.as_str(), "skipping invalid line: {error}");
                stats.invalid += 1;
                continue;
            }
        }

        if batch.len() >= batch_size {
            flush(publisher, &mut batch, &mut stats);
        }
    }

    if !batch.is_empty() {
        flush(publisher, &mut batch, &mut stats);
    }

    Ok(stats)
}

fn flush(publisher: &dyn Publish, batch: &mut Vec<MetricData>, stats: &mut LineStats) {
    if let Err(error) = tsgw_publish::publish(publisher, batch) {
        tsgw_log::error!(
            count = batch.len(),
            "failed to publish metrics: {}",
            LogError(&error)
        );
        stats.failed_batches += 1;
    }
    batch.clear();
}
