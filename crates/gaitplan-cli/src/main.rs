//! `gaitplan-cli` – operator front end for motion plans.
//!
//! - `gaitplan check <plan>` loads and validates a plan, reporting the first
//!   load error.
//! - `gaitplan status <plan>` prints the status dump of a freshly loaded plan.
//! - `gaitplan run <plan>` paces ticks at the configured period, retries
//!   `start()` until the plan is ready, prints supervisor events, and stops on
//!   finish, tick limit or **Ctrl-C**.
//! - `gaitplan config` shows (and with `--write` saves) the effective
//!   configuration.

mod config;

use clap::Parser;
use colored::Colorize;
use std::process::ExitCode;
use std::time::Instant;
use tracing::warn;

use config::Config;
use gaitplan_runtime::{
    LogFormat, MotionPlan, PlanPhase, StartOutcome, init_tracing, search_file,
};
use gaitplan_types::TaskEventKind;

#[derive(Parser)]
#[command(version, propagate_version = true)]
#[command(about = "Humanoid motion plan executor", long_about = None)]
struct Args {
    /// Log format, compact or json.  Overrides the configuration.
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Load and validate a plan.
    Check {
        /// Plan file, absolute or relative to the search path.
        plan: String,
    },
    /// Print the status dump of a loaded plan.
    Status {
        /// Plan file, absolute or relative to the search path.
        plan: String,
    },
    /// Execute a plan at the configured tick period.
    Run {
        /// Plan file, absolute or relative to the search path.
        plan: String,

        /// Stop after this many ticks.
        #[arg(long)]
        ticks: Option<u64>,

        /// Print the status dump every N ticks.
        #[arg(long)]
        status_every: Option<u64>,
    },
    /// Show the effective configuration.
    Config {
        /// Save it to ~/.gaitplan/config.toml.
        #[arg(long)]
        write: bool,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();

    let (cfg, cfg_error) = match config::load() {
        Ok(Some(cfg)) => (cfg, None),
        Ok(None) => (defaults(), None),
        Err(e) => (defaults(), Some(e)),
    };

    // ── Structured logging ────────────────────────────────────────────────
    // User-facing output still goes through println!.
    init_tracing(args.log_format.unwrap_or(cfg.log_format));
    if let Some(e) = cfg_error {
        warn!(error = %e, "using default configuration");
    }

    let result = match args.command {
        Command::Check { plan } => check(&plan, &cfg),
        Command::Status { plan } => status(&plan, &cfg),
        Command::Run {
            plan,
            ticks,
            status_every,
        } => run(&plan, ticks, status_every, &cfg),
        Command::Config { write } => show_config(&cfg, write),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn defaults() -> Config {
    let mut cfg = Config::default();
    config::apply_env_overrides(&mut cfg);
    cfg
}

fn load_plan(name: &str, cfg: &Config) -> Result<MotionPlan, String> {
    let path = search_file(name, &cfg.plan_search_path).map_err(|e| e.to_string())?;
    MotionPlan::load(&path, cfg.plan_settings()).map_err(|e| format!("{}: {}", path.display(), e))
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

fn check(name: &str, cfg: &Config) -> Result<ExitCode, String> {
    let plan = load_plan(name, cfg)?;
    println!(
        "  {} plan '{}' is valid: {} motion, {} control, {} tasks, {:.3} s",
        "✓".green().bold(),
        plan.name().bold(),
        plan.motion().len(),
        plan.controls().len(),
        plan.supervisor().len(),
        plan.duration()
    );
    Ok(ExitCode::SUCCESS)
}

fn status(name: &str, cfg: &Config) -> Result<ExitCode, String> {
    let plan = load_plan(name, cfg)?;
    print!("{plan}");
    Ok(ExitCode::SUCCESS)
}

fn run(
    name: &str,
    ticks: Option<u64>,
    status_every: Option<u64>,
    cfg: &Config,
) -> Result<ExitCode, String> {
    let mut plan = load_plan(name, cfg)?;

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let cancel = plan.cancel_token();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!(
            "{}",
            "⚠  Ctrl-C received – stopping at the next tick …".yellow().bold()
        );
        cancel.cancel();
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; the plan can only stop on its own");
    }

    println!(
        "  {} {} ({:?} period, {} stream input(s))",
        "Running".bold().cyan(),
        plan.name().bold(),
        plan.period(),
        plan.bridge_names().count()
    );

    let period = plan.period();
    let mut waited = 0u64;
    let mut executed = 0u64;
    let mut next = Instant::now();
    loop {
        if !plan.is_started() && !plan.phase().is_terminal() {
            let now = plan.now();
            match plan.start(now) {
                StartOutcome::Started => {
                    println!("  {} execution starts at tick {}", "▶".green().bold(), now);
                }
                StartOutcome::NotReady => {
                    waited += 1;
                    if waited > cfg.start_timeout_ticks {
                        return Err(format!(
                            "plan not ready after {} ticks",
                            cfg.start_timeout_ticks
                        ));
                    }
                }
                StartOutcome::AlreadyStarted => {}
            }
        }

        let report = plan.next_tick();
        executed += 1;
        for event in &report.events {
            match event.kind {
                TaskEventKind::Activated => println!("  {} {}", "+".green().bold(), event),
                TaskEventKind::Released => println!("  {} {}", "-".yellow().bold(), event),
            }
        }
        if let Some(n) = status_every.filter(|n| *n > 0)
            && executed % n == 0
        {
            print!("{plan}");
        }
        if report.phase.is_terminal() {
            break;
        }
        if ticks.is_some_and(|limit| executed >= limit) {
            println!("  {}", "tick limit reached".dimmed());
            break;
        }

        next += period;
        let now = Instant::now();
        if next > now {
            std::thread::sleep(next - now);
        } else {
            next = now;
        }
    }

    let stats = plan.deadline_stats();
    println!(
        "  {} after {} tick(s); {} deadline overrun(s), max {:?}",
        match plan.phase() {
            PlanPhase::Finished => "finished".green().bold(),
            PlanPhase::Cancelled => "cancelled".yellow().bold(),
            other => other.to_string().normal(),
        },
        executed,
        stats.overruns,
        stats.max.unwrap_or_default()
    );
    if let Some(follower) = plan.follower() {
        println!("  final {}", follower.correction());
    }

    Ok(if plan.phase() == PlanPhase::Cancelled {
        ExitCode::from(130)
    } else {
        ExitCode::SUCCESS
    })
}

fn show_config(cfg: &Config, write: bool) -> Result<ExitCode, String> {
    println!("  Config file: {}", config::config_path().display().to_string().bold());
    println!("  tick-period-ms      = {}", cfg.tick_period_ms);
    println!(
        "  deadline-budget-us  = {}",
        cfg.plan_settings().deadline_budget.as_micros()
    );
    println!(
        "  plan-search-path    = {}",
        cfg.plan_search_path
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(":")
    );
    println!("  log-format          = {}", cfg.log_format);
    println!("  start-timeout-ticks = {}", cfg.start_timeout_ticks);
    if write {
        config::save(cfg)?;
        println!(
            "\n  {} Config saved to {}",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        );
    }
    Ok(ExitCode::SUCCESS)
}
