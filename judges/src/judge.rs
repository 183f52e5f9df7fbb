//! A single bound judge and its execution wrapper.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use tracing::{info, warn};

use crate::churn::Churn;
use crate::engine::{Engine, EngineContext, StateMap};
use crate::fb::Factbase;
use crate::options::Options;

/// One runnable rule unit: a directory plus its entry script.
///
/// Judges are discovered fresh on every enumeration and are immutable once
/// constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Judge {
    name: String,
    dir: PathBuf,
    script: PathBuf,
    lib: Option<PathBuf>,
}

impl Judge {
    pub(crate) fn new(dir: PathBuf, script: PathBuf, lib: Option<PathBuf>) -> Self {
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            name,
            dir,
            script,
            lib,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn script(&self) -> &Path {
        &self.script
    }

    /// Execute the judge body against the store and measure its churn.
    ///
    /// The churn is the store's size delta: growth counts as inserted facts,
    /// shrinkage as deleted ones. Engine errors are logged with their full
    /// chain and re-raised unchanged, so the caller can still classify
    /// deadline expiries.
    pub fn run<E: Engine>(
        &self,
        engine: &E,
        fb: &mut Factbase,
        global: &mut StateMap,
        local: &mut StateMap,
        options: &Options,
        timeout: Duration,
    ) -> Result<Churn> {
        if let Some(lib) = &self.lib {
            if !lib.exists() {
                bail!("lib dir {} is absent", lib.display());
            }
            if !lib.is_dir() {
                bail!("lib {} is not a directory", lib.display());
            }
        }
        let before = fb.size();
        let started = Instant::now();
        let result = engine.execute(EngineContext {
            name: &self.name,
            dir: &self.dir,
            script: &self.script,
            lib: self.lib.as_deref(),
            fb,
            global,
            local,
            options,
            timeout,
        });
        if let Err(err) = result {
            warn!(judge = %self.name, "judge failed: {err:#}");
            return Err(err);
        }
        let delta = fb.size() as i64 - before as i64;
        let churn = if delta >= 0 {
            Churn::new(delta as u64, 0, delta as u64)
        } else {
            Churn::new(0, (-delta) as u64, 0)
        };
        info!(
            judge = %self.name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            churn = %churn,
            facts = fb.size(),
            "judge finished"
        );
        Ok(churn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FnEngine, plant_judge};
    use anyhow::anyhow;

    fn fixture(dir: &Path) -> Judge {
        let script = plant_judge(dir, "sample", "sh", "").expect("plant");
        Judge::new(dir.join("sample"), script, None)
    }

    #[test]
    fn name_comes_from_directory_base_name() {
        let temp = tempfile::tempdir().expect("tempdir");
        let judge = fixture(temp.path());
        assert_eq!(judge.name(), "sample");
    }

    #[test]
    fn growth_is_reported_as_inserted_facts() {
        let temp = tempfile::tempdir().expect("tempdir");
        let judge = fixture(temp.path());
        let engine = FnEngine::new(|ctx| {
            ctx.fb.insert();
            ctx.fb.insert();
            Ok(())
        });
        let mut fb = Factbase::new();
        let churn = judge
            .run(
                &engine,
                &mut fb,
                &mut StateMap::new(),
                &mut StateMap::new(),
                &Options::default(),
                Duration::from_secs(1),
            )
            .expect("run");
        assert_eq!(churn, Churn::new(2, 0, 2));
    }

    #[test]
    fn shrinkage_is_reported_as_deleted_facts() {
        let temp = tempfile::tempdir().expect("tempdir");
        let judge = fixture(temp.path());
        let engine = FnEngine::new(|ctx| {
            let all: Vec<_> = ctx.fb.facts().map(|(id, _)| id).collect();
            ctx.fb.delete(&all);
            Ok(())
        });
        let mut fb = Factbase::new();
        fb.insert();
        fb.insert();
        fb.insert();
        let churn = judge
            .run(
                &engine,
                &mut fb,
                &mut StateMap::new(),
                &mut StateMap::new(),
                &Options::default(),
                Duration::from_secs(1),
            )
            .expect("run");
        assert_eq!(churn, Churn::new(0, 3, 0));
    }

    #[test]
    fn engine_errors_are_reraised() {
        let temp = tempfile::tempdir().expect("tempdir");
        let judge = fixture(temp.path());
        let engine = FnEngine::new(|_| Err(anyhow!("intentional")));
        let mut fb = Factbase::new();
        let err = judge
            .run(
                &engine,
                &mut fb,
                &mut StateMap::new(),
                &mut StateMap::new(),
                &Options::default(),
                Duration::from_secs(1),
            )
            .unwrap_err();
        assert!(err.to_string().contains("intentional"));
    }

    #[test]
    fn missing_lib_dir_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let script = plant_judge(temp.path(), "sample", "sh", "").expect("plant");
        let judge = Judge::new(
            temp.path().join("sample"),
            script,
            Some(temp.path().join("no-such-lib")),
        );
        let engine = FnEngine::new(|_| Ok(()));
        let mut fb = Factbase::new();
        let err = judge
            .run(
                &engine,
                &mut fb,
                &mut StateMap::new(),
                &mut StateMap::new(),
                &Options::default(),
                Duration::from_secs(1),
            )
            .unwrap_err();
        assert!(err.to_string().contains("absent"));
    }
}
