//! Checkpoint persistence for the fact store.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::info;

use crate::fb::Factbase;

/// Imports and exports fact-store checkpoints at a fixed path.
///
/// The blob format is opaque to this module; it just moves bytes between
/// the store and the filesystem, creating parent directories on export.
#[derive(Debug, Clone)]
pub struct Impex {
    path: PathBuf,
}

impl Impex {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the checkpoint. A missing file yields an empty store, unless
    /// `strict` is set, in which case it is an error.
    pub fn import(&self, strict: bool) -> Result<Factbase> {
        let mut fb = Factbase::new();
        if !self.path.exists() {
            if strict {
                bail!("the factbase is absent at {}", self.path.display());
            }
            info!(path = %self.path.display(), "nothing to import, starting empty");
            return Ok(fb);
        }
        let bytes = fs::read(&self.path)
            .with_context(|| format!("read checkpoint {}", self.path.display()))?;
        fb.import(&bytes)
            .with_context(|| format!("import checkpoint {}", self.path.display()))?;
        info!(
            path = %self.path.display(),
            bytes = bytes.len(),
            facts = fb.size(),
            "factbase imported"
        );
        Ok(fb)
    }

    /// Write the checkpoint, replacing any previous one.
    pub fn export(&self, fb: &Factbase) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create checkpoint dir {}", parent.display()))?;
        }
        let bytes = fb.export()?;
        fs::write(&self.path, &bytes)
            .with_context(|| format!("write checkpoint {}", self.path.display()))?;
        info!(
            path = %self.path.display(),
            bytes = bytes.len(),
            facts = fb.size(),
            "factbase exported"
        );
        Ok(())
    }
}
