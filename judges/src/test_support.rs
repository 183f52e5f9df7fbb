//! Test-only engines and judge-tree fixtures.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};

use crate::engine::{Engine, EngineContext};

/// Create `root/<name>/<name>.<ext>` with the given body and return the
/// script path.
pub fn plant_judge(root: &Path, name: &str, ext: &str, body: &str) -> Result<PathBuf> {
    let dir = root.join(name);
    std::fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    let script = dir.join(format!("{name}.{ext}"));
    std::fs::write(&script, body).with_context(|| format!("write {}", script.display()))?;
    Ok(script)
}

/// Engine that runs one closure for every judge.
pub struct FnEngine<F> {
    body: F,
}

impl<F> FnEngine<F>
where
    F: Fn(EngineContext<'_>) -> Result<()>,
{
    pub fn new(body: F) -> Self {
        Self { body }
    }
}

impl<F> Engine for FnEngine<F>
where
    F: Fn(EngineContext<'_>) -> Result<()>,
{
    fn execute(&self, ctx: EngineContext<'_>) -> Result<()> {
        (self.body)(ctx)
    }
}

type ScriptFn = Box<dyn Fn(EngineContext<'_>) -> Result<()> + Send + Sync>;

/// Engine with a per-judge scripted body; judges without a script are
/// no-ops. Records the order of invocations.
#[derive(Default)]
pub struct ScriptedEngine {
    scripts: BTreeMap<String, ScriptFn>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(mut self, name: &str, body: F) -> Self
    where
        F: Fn(EngineContext<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.scripts.insert(name.to_string(), Box::new(body));
        self
    }

    /// Judge names in invocation order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }
}

impl Engine for ScriptedEngine {
    fn execute(&self, ctx: EngineContext<'_>) -> Result<()> {
        self.calls
            .lock()
            .expect("calls lock")
            .push(ctx.name.to_string());
        match self.scripts.get(ctx.name) {
            Some(body) => body(ctx),
            None => Ok(()),
        }
    }
}
