//! Discovery and deterministic ordering of the judge set.
//!
//! Ordering is a pure function of the discovered directory names and the
//! policy (shuffle prefix, boost/demote patterns, seed): alphabetical sort,
//! then a seeded Fisher-Yates permutation of the shuffle-eligible slot
//! positions, then a stable boosted / normal / demoted partition.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regex::Regex;

use crate::judge::Judge;

/// The ordering knobs of a judge set.
///
/// Boost and demote patterns are literal names with at most one `*`
/// wildcard, matched against the whole judge name (anchored). Boost wins
/// when a name matches both lists.
#[derive(Debug, Clone, Default)]
pub struct OrderingPolicy {
    /// Judges whose name starts with this prefix keep their sorted slot;
    /// an empty prefix makes every judge shuffle-eligible.
    pub shuffle_prefix: String,
    pub boost: Vec<String>,
    pub demote: Vec<String>,
    pub seed: u64,
}

/// Discovers valid judge directories under a root and produces the
/// policy-ordered sequence. Discovery happens fresh on every enumeration.
pub struct JudgeSet {
    root: PathBuf,
    lib: Option<PathBuf>,
    ext: String,
    policy: OrderingPolicy,
    boost: Vec<Regex>,
    demote: Vec<Regex>,
}

impl JudgeSet {
    pub fn new(
        root: impl Into<PathBuf>,
        lib: Option<PathBuf>,
        ext: impl Into<String>,
        policy: OrderingPolicy,
    ) -> Result<Self> {
        let boost = compile_patterns(&policy.boost)?;
        let demote = compile_patterns(&policy.demote)?;
        Ok(Self {
            root: root.into(),
            lib,
            ext: ext.into(),
            policy,
            boost,
            demote,
        })
    }

    /// Look one judge up by name; the directory must exist.
    pub fn get(&self, name: &str) -> Result<Judge> {
        let dir = self.root.join(name);
        if !dir.is_dir() {
            bail!("judge '{}' doesn't exist in {}", name, self.root.display());
        }
        let script = dir.join(format!("{name}.{}", self.ext));
        Ok(Judge::new(dir, script, self.lib.clone()))
    }

    /// The full policy-ordered sequence. A missing or unreadable root
    /// yields an empty sequence; discovery is best-effort.
    pub fn enumerate(&self) -> Vec<Judge> {
        let mut judges = self.discover();
        self.shuffle(&mut judges);
        self.partition(judges)
    }

    /// All valid judge directories, sorted alphabetically by name. A
    /// directory qualifies only when it directly contains `<name>.<ext>`.
    fn discover(&self) -> Vec<Judge> {
        let Ok(entries) = fs::read_dir(&self.root) else {
            return Vec::new();
        };
        let mut judges = Vec::new();
        for entry in entries.flatten() {
            let dir = entry.path();
            if !dir.is_dir() {
                continue;
            }
            let Some(name) = dir.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            let script = dir.join(format!("{name}.{}", self.ext));
            if script.is_file() {
                judges.push(Judge::new(dir, script, self.lib.clone()));
            }
        }
        judges.sort_by(|a, b| a.name().cmp(b.name()));
        judges
    }

    /// Seeded Fisher-Yates over the eligible slot positions only; judges
    /// pinned by the shuffle prefix never leave their sorted index.
    fn shuffle(&self, judges: &mut [Judge]) {
        let prefix = &self.policy.shuffle_prefix;
        let slots: Vec<usize> = judges
            .iter()
            .enumerate()
            .filter(|(_, judge)| prefix.is_empty() || !judge.name().starts_with(prefix))
            .map(|(index, _)| index)
            .collect();
        if slots.len() < 2 {
            return;
        }
        let mut rng = StdRng::seed_from_u64(self.policy.seed);
        for i in (1..slots.len()).rev() {
            let j = rng.gen_range(0..=i);
            judges.swap(slots[i], slots[j]);
        }
    }

    /// Stable boosted / normal / demoted partition, boost winning overlap.
    fn partition(&self, judges: Vec<Judge>) -> Vec<Judge> {
        let mut boosted = Vec::new();
        let mut normal = Vec::new();
        let mut demoted = Vec::new();
        for judge in judges {
            if matches_any(&self.boost, judge.name()) {
                boosted.push(judge);
            } else if matches_any(&self.demote, judge.name()) {
                demoted.push(judge);
            } else {
                normal.push(judge);
            }
        }
        boosted.extend(normal);
        boosted.extend(demoted);
        boosted
    }
}

fn matches_any(patterns: &[Regex], name: &str) -> bool {
    patterns.iter().any(|pattern| pattern.is_match(name))
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns.iter().map(|p| compile_pattern(p)).collect()
}

/// Translate a name pattern with at most one `*` into an anchored regex.
fn compile_pattern(pattern: &str) -> Result<Regex> {
    let source = match pattern.split_once('*') {
        Some((head, tail)) => {
            format!("^{}.*{}$", regex::escape(head), regex::escape(tail))
        }
        None => format!("^{}$", regex::escape(pattern)),
    };
    Regex::new(&source).with_context(|| format!("compile name pattern '{pattern}'"))
}
