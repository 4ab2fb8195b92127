use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use colored::Colorize;

use torque_maui_capacity::api::config_dto::CapacityConfigDto;
use torque_maui_capacity::config::CapacityConfig;
use torque_maui_capacity::domain::capacity_model::CapacityReport;
use torque_maui_capacity::generate_capacity_model;
use torque_maui_capacity::loader::parser::parse_json_file;
use torque_maui_capacity::logger;

/// Job slot capacity of a Torque server and its MAUI standing reservations.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// PBS server to query
    #[arg(short, long)]
    server: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Read `diagnose -r` output from this file instead of running diagnose
    #[arg(long)]
    diag_output_file: Option<PathBuf>,

    /// Read nodes and queues from this JSON snapshot instead of querying the server
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Only report the standing reservation slots of this queue
    #[arg(short, long)]
    queue: Option<String>,

    /// JSON run configuration, overridden by the other options
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

impl Args {
    fn into_config(self) -> anyhow::Result<(CapacityConfig, bool)> {
        let mut dto = match &self.config {
            Some(path) => parse_json_file::<CapacityConfigDto>(path).with_context(|| format!("Failed to load configuration {}", path.display()))?,
            None => CapacityConfigDto::default(),
        };

        if self.server.is_some() {
            dto.server = self.server;
        }
        if self.verbose > 0 {
            dto.verbosity = Some(self.verbose);
        }
        if let Some(path) = self.diag_output_file {
            dto.diag_output_file = Some(path.to_string_lossy().into_owned());
        }
        if let Some(path) = self.snapshot {
            dto.snapshot_file = Some(path.to_string_lossy().into_owned());
        }
        if self.queue.is_some() {
            dto.queue = self.queue;
        }

        Ok((CapacityConfig::try_from(dto)?, self.json))
    }
}

fn print_report(report: &CapacityReport) {
    println!("{} {} (version {})", "Server".bold(), report.server, report.scheduler_version);
    println!("  nodes: {} (active={})", report.node_count, report.active_node_count);
    println!("  active procs: {}", report.active_procs);
    println!("  used slots: {}", report.total_used_slots);
    println!(
        "{} total={} used={} free={}",
        "Standing reservations".bold(),
        report.reservation_slots.total,
        report.reservation_slots.used,
        report.reservation_slots.free
    );
    for (queue, slots) in &report.queue_slots {
        println!("  queue {}: total={} used={} free={}", queue, slots.total, slots.used, slots.free);
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let (config, json) = args.into_config()?;
    logger::init(config.verbosity);

    let model = generate_capacity_model(&config).with_context(|| format!("Failed to build capacity model of {}", config.server))?;
    let report = model.report(config.queue.as_deref());

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    Ok(())
}

fn main() {
    let args = Args::parse();

    if let Err(e) = run(args) {
        // The logger may be silent or not installed yet.
        eprintln!("{} {:#}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}
