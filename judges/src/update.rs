//! The fixpoint update loop.
//!
//! Drives cycles over the ordered judge set until a cycle produces no net
//! change, a cycle limit is reached, or fail-fast stops the run. The
//! checkpoint is exported after every cycle, success or not, so partial
//! progress always survives.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Result, bail};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::churn::Churn;
use crate::engine::{DeadlineExceededError, Engine, StateMap};
use crate::fb::Factbase;
use crate::impex::Impex;
use crate::judges::{JudgeSet, OrderingPolicy};
use crate::options::Options;

/// The `what` property of the run-summary fact.
pub const SUMMARY_WHAT: &str = "judges-summary";

/// What to do with the summary record when the run finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SummaryMode {
    /// No summary fact.
    #[default]
    Off,
    /// Replace any prior summary fact with a fresh one.
    Add,
    /// Keep the prior summary fact and append the new errors to it.
    Append,
}

/// Everything one update run needs; the caller owns it.
#[derive(Debug, Clone)]
pub struct UpdateConfig {
    pub judges_dir: PathBuf,
    pub checkpoint: PathBuf,
    /// Shared-library directory exposed to every judge.
    pub lib: Option<PathBuf>,
    /// Entry-script extension.
    pub ext: String,
    /// `key=value` pairs from the command line.
    pub option_pairs: Vec<String>,
    /// Optional options file, merged over the pairs (the file wins).
    pub options_file: Option<PathBuf>,
    /// Inclusion filter: when non-empty, only listed judges run.
    pub include: Vec<String>,
    /// Per-judge execution deadline.
    pub timeout: Duration,
    /// Run-wide wall-clock allowance; judges not yet started when it is
    /// exhausted are skipped, not failed.
    pub lifetime: Option<Duration>,
    pub max_cycles: Option<u32>,
    pub fail_fast: bool,
    /// Log instead of raising when the run ends with errors.
    pub quiet: bool,
    pub summary: SummaryMode,
    /// Fail the run when zero judges were executed.
    pub expect_judges: bool,
    pub policy: OrderingPolicy,
}

impl UpdateConfig {
    pub fn new(judges_dir: impl Into<PathBuf>, checkpoint: impl Into<PathBuf>) -> Self {
        Self {
            judges_dir: judges_dir.into(),
            checkpoint: checkpoint.into(),
            lib: None,
            ext: "sh".to_string(),
            option_pairs: Vec::new(),
            options_file: None,
            include: Vec::new(),
            timeout: Duration::from_secs(30),
            lifetime: None,
            max_cycles: None,
            fail_fast: false,
            quiet: false,
            summary: SummaryMode::Off,
            expect_judges: false,
            policy: OrderingPolicy::default(),
        }
    }
}

/// Why the cycle loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStop {
    /// A full cycle produced zero churn.
    Converged,
    /// The configured maximum cycle count was reached.
    LimitReached,
    /// Fail-fast was enabled and the run had recorded errors.
    FailFastStopped,
}

/// Summary of one update run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub cycles: u32,
    pub churn: Churn,
    pub errors: Vec<String>,
    /// Judges actually started (successes and failures alike).
    pub executed: u32,
    /// Lifetime-budget skips; informational only.
    pub skipped: u32,
    pub stop: RunStop,
    pub elapsed: Duration,
}

/// Run the full fixpoint loop with the given engine.
///
/// Raises before the loop on configuration errors (absent judges
/// directory); raises at the end when errors were recorded and `quiet` is
/// unset, or when `expect_judges` is set and nothing ran. The checkpoint on
/// disk always reflects the last completed cycle.
pub fn run_update<E: Engine>(engine: &E, config: &UpdateConfig) -> Result<UpdateOutcome> {
    if !config.judges_dir.is_dir() {
        bail!(
            "the judges directory is absent: {}",
            config.judges_dir.display()
        );
    }
    let started = Instant::now();
    let impex = Impex::new(&config.checkpoint);
    let mut fb = impex.import(false)?;
    let options = effective_options(config)?;
    if options.is_empty() {
        debug!("no options provided");
    } else {
        debug!("options:\n{}", options.describe());
    }
    let set = JudgeSet::new(
        &config.judges_dir,
        config.lib.clone(),
        config.ext.clone(),
        config.policy.clone(),
    )?;

    let mut global = StateMap::new();
    let mut locals: BTreeMap<String, StateMap> = BTreeMap::new();
    let mut errors: Vec<String> = Vec::new();
    let mut churn = Churn::default();
    let mut executed = 0u32;
    let mut skipped = 0u32;
    let mut cycles = 0u32;

    let stop = loop {
        cycles += 1;
        info!(cycle = cycles, "starting cycle");
        let mut delta = Churn::default();
        for judge in set.enumerate() {
            let name = judge.name().to_string();
            if !config.include.is_empty() && !config.include.iter().any(|n| *n == name) {
                continue;
            }
            if config.fail_fast && !errors.is_empty() {
                info!(cycle = cycles, "fail-fast: skipping the rest of the cycle");
                break;
            }
            if let Some(budget) = config.lifetime {
                if started.elapsed() >= budget {
                    skipped += 1;
                    info!(
                        judge = %name,
                        cycle = cycles,
                        "lifetime budget exhausted, skipping"
                    );
                    continue;
                }
            }
            let local = locals.entry(name.clone()).or_default();
            executed += 1;
            match judge.run(
                engine,
                &mut fb,
                &mut global,
                local,
                &options,
                config.timeout,
            ) {
                Ok(c) => delta += c,
                Err(err) => {
                    if err.downcast_ref::<DeadlineExceededError>().is_some() {
                        warn!(judge = %name, cycle = cycles, "deadline exceeded");
                    } else {
                        warn!(judge = %name, cycle = cycles, "judge failed");
                    }
                    errors.push(format!("{name}: {err:#}"));
                }
            }
        }
        churn += delta;
        impex.export(&fb)?;
        if config.fail_fast && !errors.is_empty() {
            info!(cycle = cycles, "stopping: fail-fast with recorded errors");
            break RunStop::FailFastStopped;
        }
        if delta.is_zero() {
            info!(cycle = cycles, "no changes in this cycle, fixpoint reached");
            break RunStop::Converged;
        }
        if let Some(max) = config.max_cycles {
            if cycles >= max {
                info!(cycle = cycles, max_cycles = max, "cycle limit reached");
                break RunStop::LimitReached;
            }
        }
        info!(cycle = cycles, churn = %delta, "cycle finished");
    };

    if config.summary != SummaryMode::Off {
        write_summary(
            &mut fb,
            config.summary,
            started.elapsed(),
            cycles,
            churn,
            &errors,
        );
        impex.export(&fb)?;
    }
    let outcome = UpdateOutcome {
        cycles,
        churn,
        errors,
        executed,
        skipped,
        stop,
        elapsed: started.elapsed(),
    };
    info!(
        cycles = outcome.cycles,
        churn = %outcome.churn,
        executed = outcome.executed,
        "update finished"
    );
    if config.expect_judges && outcome.executed == 0 {
        bail!("no judges were executed, though at least one was expected");
    }
    if !outcome.errors.is_empty() {
        if config.quiet {
            info!(
                errors = outcome.errors.len(),
                "not failing because quiet mode is set"
            );
        } else {
            bail!(
                "failed to update correctly ({} errors)",
                outcome.errors.len()
            );
        }
    }
    Ok(outcome)
}

fn effective_options(config: &UpdateConfig) -> Result<Options> {
    let cli = Options::from_pairs(&config.option_pairs);
    match &config.options_file {
        Some(path) => Ok(cli.merge(&Options::from_file(path)?)),
        None => Ok(cli),
    }
}

fn write_summary(
    fb: &mut Factbase,
    mode: SummaryMode,
    elapsed: Duration,
    cycles: u32,
    churn: Churn,
    errors: &[String],
) {
    let existing = fb.query_eq("what", &json!(SUMMARY_WHAT));
    if mode == SummaryMode::Append {
        if let Some(id) = existing.first().copied() {
            if let Some(fact) = fb.fact_mut(id) {
                for error in errors {
                    fact.set("error", error.as_str());
                }
            }
            return;
        }
    } else {
        fb.delete(&existing);
    }
    let id = fb.insert();
    if let Some(fact) = fb.fact_mut(id) {
        fact.set("what", SUMMARY_WHAT);
        fact.set("when", epoch_seconds());
        fact.set("version", env!("CARGO_PKG_VERSION"));
        fact.set("seconds", elapsed.as_secs_f64());
        fact.set("cycles", cycles);
        fact.set("inserted", churn.inserted);
        fact.set("deleted", churn.deleted);
        fact.set("added", churn.added);
        for error in errors {
            fact.set("error", error.as_str());
        }
    }
}

fn epoch_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
