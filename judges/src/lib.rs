//! Deterministic fixpoint scheduler for directories of judge rule units.
//!
//! A "judge" is one independently runnable rule unit: a directory holding an
//! entry script that reads and mutates a shared fact store. The scheduler
//! discovers judges, orders them by a reproducible policy (alphabetical
//! sort, seeded shuffle, boost/demote patterns), and re-runs the whole set
//! in cycles until a cycle produces no net change or a configured limit is
//! hit. The architecture keeps a strict separation:
//!
//! - **Pure policy** ([`churn`], [`options`], the ordering in [`judges`]):
//!   deterministic, no I/O, testable in isolation.
//! - **Execution** ([`engine`], [`judge`]): side-effecting script runs
//!   behind the [`engine::Engine`] seam, mocked in tests.
//!
//! The [`update`] module coordinates both into the fixpoint loop behind the
//! `judges update` CLI command.

pub mod churn;
pub mod engine;
pub mod exit_codes;
pub mod fb;
pub mod impex;
pub mod judge;
pub mod judges;
pub mod logging;
pub mod options;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod update;
