//! Execution backends for judge entry scripts.
//!
//! The [`Engine`] trait decouples the scheduler from how a judge's body
//! actually runs. The default [`ProcessEngine`] spawns the entry script as a
//! child process with a file-and-environment hand-off; tests use scripted
//! engines that mutate the store directly without spawning anything.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

use crate::fb::Factbase;
use crate::options::Options;

/// Mutable key/value state threaded through judge invocations.
///
/// The scheduler owns one global map per run (shared by every judge) and one
/// local map per judge name (persisted across cycles).
pub type StateMap = BTreeMap<String, serde_json::Value>;

/// Everything one judge invocation may see and mutate.
pub struct EngineContext<'a> {
    /// Judge name (directory base name).
    pub name: &'a str,
    /// Judge directory.
    pub dir: &'a Path,
    /// Entry script, `<name>.<ext>` inside the directory.
    pub script: &'a Path,
    /// Shared-library directory, if configured.
    pub lib: Option<&'a Path>,
    pub fb: &'a mut Factbase,
    pub global: &'a mut StateMap,
    pub local: &'a mut StateMap,
    pub options: &'a Options,
    /// Per-judge execution deadline; the engine enforces it.
    pub timeout: Duration,
}

/// Abstraction over judge execution backends.
pub trait Engine {
    /// Run one judge body. Deadline expiry must surface as
    /// [`DeadlineExceededError`] in the error chain; any other failure of
    /// the body is an ordinary error.
    fn execute(&self, ctx: EngineContext<'_>) -> Result<()>;
}

/// The distinguishable error for a judge that hit its deadline.
#[derive(Debug)]
pub struct DeadlineExceededError {
    pub judge: String,
    pub elapsed: Duration,
}

impl fmt::Display for DeadlineExceededError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "judge '{}' exceeded its deadline after {:.1}s",
            self.judge,
            self.elapsed.as_secs_f64()
        )
    }
}

impl std::error::Error for DeadlineExceededError {}

/// Runs the entry script as a child process.
///
/// Hand-off protocol: a fresh temp directory holds `fb.json` (store export),
/// `global.json`, and `local.json`; their paths are exposed as `JUDGES_FB`,
/// `JUDGES_GLOBAL`, and `JUDGES_LOCAL`, next to `JUDGES_JUDGE`, `JUDGES_LIB`
/// (when configured), and one uppercased variable per option. The script
/// runs with the judge directory as cwd. On exit 0 the store and both state
/// maps are re-imported from the hand-off files; a killed or failing script
/// leaves the in-process store untouched.
pub struct ProcessEngine {
    interpreter: Vec<String>,
    output_limit_bytes: usize,
}

impl ProcessEngine {
    /// `interpreter` is an argv prefix (e.g. `["ruby"]` or `["/bin/sh"]`);
    /// when empty the script is executed directly.
    pub fn new(interpreter: Vec<String>) -> Self {
        Self {
            interpreter,
            output_limit_bytes: 100_000,
        }
    }
}

impl Engine for ProcessEngine {
    #[instrument(skip_all, fields(judge = ctx.name, timeout_secs = ctx.timeout.as_secs()))]
    fn execute(&self, ctx: EngineContext<'_>) -> Result<()> {
        let work = tempfile::tempdir().context("create hand-off dir")?;
        let fb_path = work.path().join("fb.json");
        let global_path = work.path().join("global.json");
        let local_path = work.path().join("local.json");
        fs::write(&fb_path, ctx.fb.export()?).context("write fb hand-off")?;
        write_state(&global_path, ctx.global)?;
        write_state(&local_path, ctx.local)?;

        let mut cmd = match self.interpreter.split_first() {
            Some((program, rest)) => {
                let mut cmd = Command::new(program);
                cmd.args(rest);
                cmd.arg(ctx.script);
                cmd
            }
            None => Command::new(ctx.script),
        };
        cmd.current_dir(ctx.dir)
            .env("JUDGES_FB", &fb_path)
            .env("JUDGES_GLOBAL", &global_path)
            .env("JUDGES_LOCAL", &local_path)
            .env("JUDGES_JUDGE", ctx.name);
        if let Some(lib) = ctx.lib {
            cmd.env("JUDGES_LIB", lib);
        }
        for (key, value) in ctx.options.iter() {
            cmd.env(key.to_uppercase(), value.to_string());
        }

        let started = Instant::now();
        let output = run_with_timeout(cmd, ctx.timeout, self.output_limit_bytes)?;
        if output.timed_out {
            return Err(anyhow::Error::new(DeadlineExceededError {
                judge: ctx.name.to_string(),
                elapsed: started.elapsed(),
            }));
        }
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "script of judge '{}' failed with status {:?}: {}",
                ctx.name,
                output.status.code(),
                stderr.trim()
            );
        }

        let bytes = fs::read(&fb_path).context("read fb hand-off back")?;
        let mut fresh = Factbase::new();
        fresh
            .import(&bytes)
            .with_context(|| format!("judge '{}' corrupted the fb hand-off", ctx.name))?;
        *ctx.fb = fresh;
        *ctx.global = read_state(&global_path)?;
        *ctx.local = read_state(&local_path)?;
        debug!(facts = ctx.fb.size(), "hand-off re-imported");
        Ok(())
    }
}

fn write_state(path: &Path, state: &StateMap) -> Result<()> {
    let mut bytes = serde_json::to_vec_pretty(state).context("serialize state map")?;
    bytes.push(b'\n');
    fs::write(path, bytes).with_context(|| format!("write {}", path.display()))
}

fn read_state(path: &Path) -> Result<StateMap> {
    let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("parse {}", path.display()))
}

struct CapturedOutput {
    status: std::process::ExitStatus,
    stderr: Vec<u8>,
    timed_out: bool,
}

/// Run a command with a deadline, draining stdout/stderr on reader threads
/// so the child never blocks on a full pipe. An overdue child is killed.
fn run_with_timeout(mut cmd: Command, timeout: Duration, limit: usize) -> Result<CapturedOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn().context("spawn judge script")?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;
    let stdout_handle = thread::spawn(move || drain_limited(stdout, limit));
    let stderr_handle = thread::spawn(move || drain_limited(stderr, limit));

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for script")? {
        Some(status) => status,
        None => {
            warn!(timeout_secs = timeout.as_secs(), "script overdue, killing");
            timed_out = true;
            child.kill().context("kill script")?;
            child.wait().context("wait script after kill")?
        }
    };

    let stdout = join_reader(stdout_handle)?;
    let stderr = join_reader(stderr_handle)?;
    if !stdout.is_empty() {
        debug!(bytes = stdout.len(), "script stdout captured");
    }
    Ok(CapturedOutput {
        status,
        stderr,
        timed_out,
    })
}

fn join_reader(handle: thread::JoinHandle<Result<Vec<u8>>>) -> Result<Vec<u8>> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn drain_limited<R: Read>(mut reader: R, limit: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).context("read script output")?;
        if n == 0 {
            break;
        }
        let keep = n.min(limit.saturating_sub(buf.len()));
        buf.extend_from_slice(&chunk[..keep]);
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;

    fn sh_engine() -> ProcessEngine {
        ProcessEngine::new(vec!["/bin/sh".to_string()])
    }

    fn plant(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
        let judge_dir = dir.join(name);
        fs::create_dir_all(&judge_dir).expect("judge dir");
        let script = judge_dir.join(format!("{name}.sh"));
        fs::write(&script, body).expect("script");
        script
    }

    fn run(
        engine: &ProcessEngine,
        dir: &Path,
        script: &Path,
        fb: &mut Factbase,
        timeout: Duration,
    ) -> Result<()> {
        let mut global = StateMap::new();
        let mut local = StateMap::new();
        let options = Options::from_pairs(["foo=bar"]);
        engine.execute(EngineContext {
            name: "probe",
            dir,
            script,
            lib: None,
            fb,
            global: &mut global,
            local: &mut local,
            options: &options,
            timeout,
        })
    }

    #[test]
    fn quiet_script_produces_no_changes() {
        let temp = tempfile::tempdir().expect("tempdir");
        let script = plant(temp.path(), "probe", "exit 0\n");
        let mut fb = Factbase::new();
        run(
            &sh_engine(),
            &temp.path().join("probe"),
            &script,
            &mut fb,
            Duration::from_secs(5),
        )
        .expect("run");
        assert_eq!(fb.size(), 0);
    }

    #[test]
    fn script_mutations_are_imported_back() {
        let temp = tempfile::tempdir().expect("tempdir");
        let script = plant(
            temp.path(),
            "probe",
            "printf '{\"facts\":[{\"zzz\":[43]}]}' > \"$JUDGES_FB\"\n",
        );
        let mut fb = Factbase::new();
        run(
            &sh_engine(),
            &temp.path().join("probe"),
            &script,
            &mut fb,
            Duration::from_secs(5),
        )
        .expect("run");
        assert_eq!(fb.size(), 1);
        assert_eq!(fb.query_eq("zzz", &json!(43)).len(), 1);
    }

    #[test]
    fn options_are_visible_as_environment() {
        let temp = tempfile::tempdir().expect("tempdir");
        let script = plant(temp.path(), "probe", "test \"$FOO\" = \"bar\" || exit 7\n");
        let mut fb = Factbase::new();
        run(
            &sh_engine(),
            &temp.path().join("probe"),
            &script,
            &mut fb,
            Duration::from_secs(5),
        )
        .expect("run");
    }

    #[test]
    fn failing_script_reports_exit_code_and_stderr() {
        let temp = tempfile::tempdir().expect("tempdir");
        let script = plant(temp.path(), "probe", "echo broken >&2\nexit 3\n");
        let mut fb = Factbase::new();
        let err = run(
            &sh_engine(),
            &temp.path().join("probe"),
            &script,
            &mut fb,
            Duration::from_secs(5),
        )
        .unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("status Some(3)"), "{msg}");
        assert!(msg.contains("broken"), "{msg}");
    }

    #[test]
    fn overdue_script_is_killed_and_classified() {
        let temp = tempfile::tempdir().expect("tempdir");
        let script = plant(temp.path(), "probe", "sleep 5\n");
        let mut fb = Factbase::new();
        let err = run(
            &sh_engine(),
            &temp.path().join("probe"),
            &script,
            &mut fb,
            Duration::from_millis(200),
        )
        .unwrap_err();
        let deadline = err
            .downcast_ref::<DeadlineExceededError>()
            .expect("deadline error");
        assert_eq!(deadline.judge, "probe");
        assert!(deadline.elapsed >= Duration::from_millis(200));
        assert_eq!(fb.size(), 0);
    }

    #[test]
    fn state_maps_round_trip_through_the_hand_off() {
        let temp = tempfile::tempdir().expect("tempdir");
        let script = plant(
            temp.path(),
            "probe",
            "printf '{\"seen\":1}' > \"$JUDGES_LOCAL\"\n",
        );
        let mut fb = Factbase::new();
        let mut global = StateMap::new();
        global.insert("cache".to_string(), json!("warm"));
        let mut local = StateMap::new();
        let options = Options::default();
        sh_engine()
            .execute(EngineContext {
                name: "probe",
                dir: &temp.path().join("probe"),
                script: &script,
                lib: None,
                fb: &mut fb,
                global: &mut global,
                local: &mut local,
                options: &options,
                timeout: Duration::from_secs(5),
            })
            .expect("run");
        assert_eq!(global.get("cache"), Some(&json!("warm")));
        assert_eq!(local.get("seen"), Some(&json!(1)));
    }
}
