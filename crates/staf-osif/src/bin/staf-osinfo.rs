#![warn(missing_docs)]

//! Prints the host configuration as seen by the STAF OS interface.

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use staf_osif::config::{ConfigInfo, RuntimeConfig};
use staf_osif::fs::FsInfo;
use staf_osif::thread::DEFAULT_STACK_SIZE;
use staf_osif::trace::{init_tracing, TraceFormat};
use staf_osif::OsContext;

/// Host configuration report.
#[derive(Parser, Debug)]
#[command(name = "staf-osinfo", version, about = "Show STAF OS interface host configuration")]
struct Cli {
    /// Emit JSON instead of text
    #[arg(long)]
    json: bool,

    /// Trace filter directive, overriding STAF_TRACE
    #[arg(long, env = "STAF_TRACE")]
    trace: Option<String>,
}

#[derive(Serialize)]
struct Report<'a> {
    config_info: &'a ConfigInfo,
    fs_info: FsInfo,
    runtime: &'a RuntimeConfig,
    effective_stack_size: usize,
}

fn print_text(report: &Report<'_>) {
    let info = report.config_info;
    println!("OS Name            : {}", info.os_name);
    println!("OS Major Version   : {}", info.os_major_version);
    println!("OS Minor Version   : {}", info.os_minor_version);
    println!("OS Revision        : {}", info.os_revision);
    println!("Physical Memory    : {}", info.physical_memory);
    println!("Processors         : {}", info.num_processors);
    println!("Boot Drive         : {}", info.boot_drive);
    println!("File Separator     : {}", info.file_separator);
    println!("Path Separator     : {}", info.path_separator);
    println!("Command Separator  : {}", info.command_separator);
    println!("Case Sensitive     : {}", info.case_sensitive);
    println!(
        "Shared Library     : {}<name>{}",
        info.shared_lib_prefix, info.shared_lib_suffix
    );
    println!("Temp Directory     : {}", report.runtime.temp_dir.display());
    println!("Thread Stack Size  : {}", report.effective_stack_size);
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut runtime = RuntimeConfig::from_env();
    if cli.trace.is_some() {
        runtime.trace_filter = cli.trace;
    }
    init_tracing(&runtime, TraceFormat::Text).context("initializing tracing")?;
    tracing::debug!("staf-osinfo starting");

    let ctx = OsContext::new(runtime);
    let report = Report {
        config_info: ctx.config_info(),
        fs_info: FsInfo::native(),
        runtime: ctx.config(),
        effective_stack_size: ctx.config().thread_stack_size.unwrap_or(DEFAULT_STACK_SIZE),
    };

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("serializing report")?
        );
    } else {
        print_text(&report);
    }
    Ok(())
}
