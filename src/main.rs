//! Scheduler/driver and CLI front-end (spec.md §4.8, §6 "External
//! Interfaces"). Generalizes the teacher's `clap`-based subcommand
//! dispatch from three ad-hoc subcommands (`replicate`,
//! `apply-retention`, `comm`) down to `xync [configFile] [options]`'s
//! single-purpose surface, loads configuration, iterates the configured
//! pairs in order, and drives the engine per expanded dataset.

mod config;
mod dataset;
mod engine;
mod lock;
mod log;
mod machine;
mod pair;
mod progressbar;
mod report;
mod retention;

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;

/// Flipped by the SIGINT/SIGTERM/SIGQUIT handler, checked between dataset
/// iterations — never inside a suspension point (spec.md §5's ordering
/// guarantees; a subprocess already in flight is allowed to finish).
static SHOULD_STOP: AtomicBool = AtomicBool::new(false);

extern "C" fn request_stop(_signum: std::os::raw::c_int) {
    SHOULD_STOP.store(true, Ordering::SeqCst);
}

fn install_signal_handlers() {
    use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
    let action = SigAction::new(SigHandler::Handler(request_stop), SaFlags::empty(), SigSet::empty());
    // SAFETY: `request_stop` only stores to an `AtomicBool`, which is
    // async-signal-safe.
    unsafe {
        let _ = sigaction(Signal::SIGINT, &action);
        let _ = sigaction(Signal::SIGTERM, &action);
        let _ = sigaction(Signal::SIGQUIT, &action);
    }
}

/// `xync [configFile] [options]` (spec.md §6).
#[derive(Parser, Debug)]
#[command(name = "xync", about = "Automated ZFS-style replication engine.")]
struct Cli {
    /// Config file, accepted positionally for backward compatibility.
    config_positional: Option<String>,

    /// Path to a configuration file.
    #[arg(short = 'c', long = "config")]
    config: Option<String>,

    /// Print the last line of the most recent log file and exit.
    #[arg(short = 's', long = "status")]
    status: bool,
}

fn resolve_config_path(cli: &Cli) -> Option<PathBuf> {
    if let Some(p) = &cli.config {
        return Some(PathBuf::from(p));
    }
    if let Some(p) = &cli.config_positional {
        let path = PathBuf::from(p);
        if path.is_file() {
            return Some(path);
        }
    }
    let exe_dir = std::env::current_exe().ok()?.parent()?.to_path_buf();
    let fallback = exe_dir.join("config.toml");
    fallback.is_file().then_some(fallback)
}

fn print_status(cli: &Cli) -> i32 {
    let Some(config_path) = resolve_config_path(cli) else {
        eprintln!("no configuration file found; cannot determine LOG_BASE");
        return 1;
    };
    let cfg = match config::Config::from_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            return 1;
        }
    };
    if cfg.log_base.is_empty() {
        eprintln!("no LOG_BASE configured; nothing to report");
        return 1;
    }
    match log::last_status_line(Path::new(&cfg.log_base)) {
        Some(line) => {
            println!("{line}");
            0
        }
        None => {
            eprintln!("no log files found under {}", cfg.log_base);
            1
        }
    }
}

fn run() -> i32 {
    install_signal_handlers();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            use clap::error::ErrorKind;
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = e.print();
            return code;
        }
    };

    if cli.status {
        return print_status(&cli);
    }

    let Some(config_path) = resolve_config_path(&cli) else {
        eprintln!(
            "no configuration file found (use -c/--config, pass one positionally, \
             or place config.toml next to the xync executable)"
        );
        return 1;
    };
    let config = match config::Config::from_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            return 1;
        }
    };

    let now = chrono::Local::now();
    let tag = config::expand_tag(&config.tag, now);
    let log_file = if config.log_file.is_empty() {
        String::new()
    } else {
        config::expand_log_file(&config.log_file, &tag, now)
    };

    let mut logger = log::Logger::new(&config.log_base, &log_file, config.syslog, &config.syslog_facility);

    if !config.log_base.is_empty() && config.log_keep > 0 {
        let _ = log::rotate_log_files(Path::new(&config.log_base), config.log_keep);
    }

    let lock_dir = std::env::temp_dir();
    let _snapshot_guard = match lock::acquire(&lock_dir, "snapshot") {
        Ok(guard) => guard,
        Err(e) => {
            logger.info(&format!("ERROR: {e}"));
            return 128;
        }
    };

    let quiet = !std::io::stderr().is_terminal();
    let send_opts = config.send_opts();
    let mut report = report::RunReport::new();

    'pairs: for spec in config.pairs() {
        report.pair_attempted();
        let planned = match pair::plan(spec, config.allow_root_datasets, &config.host_check) {
            Ok(p) => p,
            Err(e) => {
                logger.info(&format!("WARNING: skipping pair '{spec}': {e}"));
                report.pair_skipped();
                continue;
            }
        };

        let mut datasets = vec![planned.src_set.clone()];
        if config.recurse_children {
            match machine::list_descendants(&planned.src_host, &planned.src_set) {
                Ok(children) => datasets.extend(children),
                Err(e) => {
                    logger.info(&format!(
                        "WARNING: skipping pair '{spec}': could not list descendants of '{}': {e}",
                        planned.src_set
                    ));
                    report.pair_skipped();
                    continue;
                }
            }
        }

        for dataset in datasets {
            if SHOULD_STOP.load(Ordering::SeqCst) {
                break 'pairs;
            }
            report.dataset_attempted();
            let dst_dataset = format!("{}/{}", planned.dst_set, dataset);
            let engine_opts = engine::EngineOpts {
                tag: &tag,
                snap_pattern: &config.snap_pattern,
                snap_keep: config.snap_keep,
                allow_reconciliation: config.allow_reconciliation,
                send_opts: send_opts.clone(),
                lock_dir: &lock_dir,
                quiet,
            };
            match engine::replicate_dataset(
                &planned.src_host,
                &dataset,
                &planned.dst_host,
                &dst_dataset,
                &engine_opts,
                &mut logger,
            ) {
                engine::Outcome::Replicated => {
                    logger.info(&format!(
                        "replicated '{dataset}' ({}) -> '{dst_dataset}' ({})",
                        planned.src_host, planned.dst_host
                    ));
                }
                engine::Outcome::Skipped(reason) => {
                    logger.info(&format!("WARNING: skipped dataset '{dataset}': {reason}"));
                    report.dataset_skipped();
                }
            }
        }
    }

    if SHOULD_STOP.load(Ordering::SeqCst) {
        logger.info("ERROR: operation exited unexpectedly");
        return 128;
    }

    logger.info(&report.summary_line());
    0
}

fn main() {
    process::exit(run());
}
