//! game-transfer CLI entry point.
//!
//! Copies games from a remote library folder to local storage, a few at a
//! time, keeping the machine awake while copies run.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

mod args;
mod interactive;
mod output;
mod progress;

use std::collections::{HashMap, HashSet};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use clap::Parser;
use console::Term;

use args::Args;
use game_transfer_config::{Config, load_config};
use game_transfer_engine::{
    EngineOptions, Game, JobId, ProgressSnapshot, ProgressStatus, Scheduler, discover_games,
};
use game_transfer_power::{NoopBackend, SleepBackend, default_backend};
use progress::ProgressManager;

fn main() {
    let args = Args::parse();

    // Set up logging
    if args.verbose {
        // SAFETY: We're setting this before any other threads are spawned
        unsafe {
            env::set_var("RUST_LOG", "debug");
        }
    }
    pretty_env_logger::init();

    match run(&args) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            output::print_error(&e.to_string());
            std::process::exit(1);
        }
    }
}

/// Main application logic.
///
/// Returns `false` if any selected game failed to copy or the run was
/// interrupted.
fn run(args: &Args) -> Result<bool, Box<dyn std::error::Error>> {
    let loaded = load_config(args.config.as_deref())?;
    if let Some(path) = &loaded.config_path {
        log::debug!("Using config {}", path.display());
    }
    let config = loaded.config;

    let interactive = !args.non_interactive && Term::stdout().is_term();

    let Some(remote) = resolve_folder(
        args.remote.clone(),
        config.library.remote_root.clone(),
        interactive,
        "Remote game library folder",
    )?
    else {
        output::print_error("A remote library folder is required in non-interactive mode.");
        return Ok(false);
    };

    let games = discover_games(&remote)?;

    output::print_header("Game Transfer");
    output::print_game_list(&games);

    if args.list {
        return Ok(true);
    }

    if games.is_empty() {
        println!("No games found in {}.", remote.display());
        return Ok(true);
    }

    let Some(local) = resolve_folder(
        args.local.clone(),
        config.library.local_root.clone(),
        interactive,
        "Local folder to copy games into",
    )?
    else {
        output::print_error("A local folder (--to) is required in non-interactive mode.");
        return Ok(false);
    };

    // Select games
    let selected: Vec<&Game> = if !args.games.is_empty() {
        games.iter().filter(|g| args.matches_game(&g.name)).collect()
    } else if interactive {
        interactive::select_games(&games)?
            .into_iter()
            .map(|i| &games[i])
            .collect()
    } else {
        // Use all games in non-interactive mode
        games.iter().collect()
    };

    if selected.is_empty() {
        println!("No games selected. Exiting.");
        return Ok(true);
    }

    output::print_library_info(&remote, &local);
    println!();

    let scheduler = Arc::new(Scheduler::local(
        sleep_backend(args, &config),
        engine_options(args, &config),
    )?);
    // Subscribe before submitting so no terminal snapshot is missed
    let updates = scheduler.subscribe_all();

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let scheduler = Arc::clone(&scheduler);
        let interrupted = Arc::clone(&interrupted);
        if let Err(e) = ctrlc::set_handler(move || {
            if !on_interrupt(&scheduler, &interrupted) {
                std::process::exit(130);
            }
        }) {
            log::warn!("Failed to set interrupt handler: {e}");
        }
    }

    let mut progress_mgr = ProgressManager::new(args.should_show_progress());
    let mut submit_failures = 0;
    let mut pending: HashSet<JobId> = HashSet::new();
    let mut terminals: HashMap<JobId, ProgressSnapshot> = HashMap::new();
    let mut ids = Vec::new();

    for game in &selected {
        match scheduler.submit(&game.path, &local) {
            Ok(id) => {
                progress_mgr.add_job(id, &game.name);
                pending.insert(id);
                ids.push(id);
            }
            Err(e) => {
                output::print_warning(&format!("Skipping {}: {e}", game.name));
                submit_failures += 1;
            }
        }
    }

    while !pending.is_empty() {
        let Ok(snapshot) = updates.recv() else {
            break;
        };
        if !pending.contains(&snapshot.job_id) {
            continue;
        }

        if args.json {
            println!("{}", serde_json::to_string(&snapshot)?);
        } else if args.should_show_progress() || snapshot.is_terminal() {
            progress_mgr.update(&snapshot);
        }

        if snapshot.is_terminal() {
            pending.remove(&snapshot.job_id);
            terminals.insert(snapshot.job_id, snapshot);
        }
    }

    progress_mgr.clear();
    scheduler.shutdown();
    println!();

    let finals: Vec<ProgressSnapshot> = ids
        .iter()
        .filter_map(|id| terminals.remove(id).or_else(|| scheduler.snapshot(*id)))
        .collect();
    let count = |status: ProgressStatus| finals.iter().filter(|s| s.status == status).count();
    let failed = count(ProgressStatus::Failed) + submit_failures;

    output::print_summary(
        count(ProgressStatus::Done),
        failed,
        count(ProgressStatus::Cancelled),
    );

    Ok(failed == 0 && !interrupted.load(Ordering::SeqCst))
}

/// React to Ctrl-C.
///
/// The first interrupt shuts the scheduler down on a separate thread, which
/// cancels every transfer and ends the update stream. Returns `false` for any
/// later interrupt, which should exit immediately.
fn on_interrupt(scheduler: &Arc<Scheduler>, interrupted: &AtomicBool) -> bool {
    if interrupted.swap(true, Ordering::SeqCst) {
        return false;
    }

    eprintln!("\nInterrupt received, cancelling transfers (press Ctrl-C again to quit)...");
    let scheduler = Arc::clone(scheduler);
    thread::spawn(move || scheduler.shutdown());
    true
}

/// Pick a folder from the command line, then config, then a prompt.
///
/// Returns `None` when nothing is configured and prompting is not allowed.
fn resolve_folder(
    from_args: Option<PathBuf>,
    from_config: Option<PathBuf>,
    interactive: bool,
    prompt: &str,
) -> std::io::Result<Option<PathBuf>> {
    if let Some(path) = from_args.or(from_config) {
        return Ok(Some(path));
    }

    if interactive {
        return interactive::prompt_folder(prompt).map(Some);
    }

    Ok(None)
}

fn sleep_backend(args: &Args, config: &Config) -> Box<dyn SleepBackend> {
    if args.no_sleep_prevention || !config.power.enabled {
        log::debug!("Sleep prevention disabled");
        return Box::new(NoopBackend);
    }

    default_backend(config.power.standby_timeout_minutes)
}

fn engine_options(args: &Args, config: &Config) -> EngineOptions {
    EngineOptions {
        workers: args.workers_override().unwrap_or(config.engine.workers),
        tick_interval: config.engine.tick_interval(),
        ..EngineOptions::default()
    }
}
