//! Command-line entry point for the fixpoint scheduler.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};

use judges::engine::ProcessEngine;
use judges::exit_codes;
use judges::judges::OrderingPolicy;
use judges::logging;
use judges::update::{SummaryMode, UpdateConfig, run_update};

#[derive(Parser)]
#[command(
    name = "judges",
    version,
    about = "Deterministic fixpoint scheduler for judge rule units"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every judge in cycles until the fact store stops changing.
    Update(UpdateArgs),
}

#[derive(Args)]
struct UpdateArgs {
    /// Directory with one subdirectory per judge.
    judges_dir: PathBuf,
    /// Path of the fact-store checkpoint file.
    checkpoint: PathBuf,
    /// Option passed to every judge, like `--option token=a77`.
    #[arg(long = "option", value_name = "KEY=VALUE")]
    option: Vec<String>,
    /// File with one `key=value` option per line; overrides `--option`.
    #[arg(long, value_name = "PATH")]
    options_file: Option<PathBuf>,
    /// Run only the named judges.
    #[arg(long = "judge", value_name = "NAME")]
    judge: Vec<String>,
    /// Per-judge execution deadline, in seconds.
    #[arg(long, default_value_t = 30)]
    timeout: u64,
    /// Run-wide wall-clock budget, in seconds.
    #[arg(long, value_name = "SECONDS")]
    lifetime: Option<u64>,
    /// Stop after this many cycles even without convergence.
    #[arg(long, value_name = "N")]
    max_cycles: Option<u32>,
    /// Stop scheduling further judges after the first recorded error.
    #[arg(long)]
    fail_fast: bool,
    /// Do not fail the process when judges recorded errors.
    #[arg(long)]
    quiet: bool,
    /// Summary fact handling at the end of the run.
    #[arg(long, value_enum, default_value_t = SummaryArg::Off)]
    summary: SummaryArg,
    /// Fail unless at least one judge was actually executed.
    #[arg(long)]
    expect_judges: bool,
    /// Seed for the deterministic ordering shuffle.
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Name pattern (one `*` allowed) of judges to run first.
    #[arg(long = "boost", value_name = "PATTERN")]
    boost: Vec<String>,
    /// Name pattern (one `*` allowed) of judges to run last.
    #[arg(long = "demote", value_name = "PATTERN")]
    demote: Vec<String>,
    /// Judges whose name starts with this prefix keep their sorted slot.
    #[arg(long, default_value = "", value_name = "PREFIX")]
    shuffle: String,
    /// Shared-library directory exposed to every judge.
    #[arg(long, value_name = "DIR")]
    lib: Option<PathBuf>,
    /// Entry-script extension.
    #[arg(long, default_value = "sh")]
    ext: String,
    /// Interpreter argv prefix for entry scripts, like `--interpreter ruby`.
    #[arg(long = "interpreter", value_name = "ARG")]
    interpreter: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SummaryArg {
    Off,
    Add,
    Append,
}

impl From<SummaryArg> for SummaryMode {
    fn from(arg: SummaryArg) -> Self {
        match arg {
            SummaryArg::Off => SummaryMode::Off,
            SummaryArg::Add => SummaryMode::Add,
            SummaryArg::Append => SummaryMode::Append,
        }
    }
}

fn main() {
    logging::init();
    if let Err(err) = run() {
        eprintln!("{:#}", err);
        std::process::exit(exit_codes::FAILURE);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Update(args) => cmd_update(args),
    }
}

fn cmd_update(args: UpdateArgs) -> Result<()> {
    let config = UpdateConfig {
        lib: args.lib,
        ext: args.ext,
        option_pairs: args.option,
        options_file: args.options_file,
        include: args.judge,
        timeout: Duration::from_secs(args.timeout),
        lifetime: args.lifetime.map(Duration::from_secs),
        max_cycles: args.max_cycles,
        fail_fast: args.fail_fast,
        quiet: args.quiet,
        summary: args.summary.into(),
        expect_judges: args.expect_judges,
        policy: OrderingPolicy {
            shuffle_prefix: args.shuffle,
            boost: args.boost,
            demote: args.demote,
            seed: args.seed,
        },
        ..UpdateConfig::new(args.judges_dir, args.checkpoint)
    };
    let engine = ProcessEngine::new(args.interpreter);
    let outcome = run_update(&engine, &config)?;
    println!(
        "update finished in {} cycle(s), modified {} fact(s)",
        outcome.cycles, outcome.churn
    );
    Ok(())
}
