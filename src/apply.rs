//! Sequential execution of an action list.
//!
//! Actions run strictly front to back. Every action is validated before the
//! first one touches the cluster; after that the first cluster failure stops
//! the run. Nothing already applied is rolled back.
use crate::action::{Action, Context, Outcome, ValidationError};
use crate::cluster::{Cluster, ClusterError};
use std::io::Write;

pub enum Mode<'a> {
    Live(&'a mut dyn Cluster),
    /// Walk and report without invoking any action.
    DryRun,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub total: usize,
    pub applied: usize,
    pub skipped: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    #[error("action #{index} of {total} ({description}) is invalid: {source}")]
    Invalid {
        index: usize,
        total: usize,
        description: String,
        #[source]
        source: ValidationError,
    },

    #[error("action #{index} of {total} ({description}) failed: {source}")]
    Cluster {
        index: usize,
        total: usize,
        description: String,
        #[source]
        source: ClusterError,
    },

    #[error("write progress: {0}")]
    Output(#[from] std::io::Error),
}

impl ApplyError {
    /// 1-based position of the action that stopped the run.
    pub fn index(&self) -> Option<usize> {
        match self {
            ApplyError::Invalid { index, .. } | ApplyError::Cluster { index, .. } => Some(*index),
            ApplyError::Output(_) => None,
        }
    }
}

/// Formats `" 2 of 10 - <description>"`, padding both numbers to the width
/// of the total.
pub fn progress_line(index: usize, total: usize, action: &dyn Action) -> String {
    let width = total.to_string().len();
    format!("{index:>width$} of {total:<width$} - {action}")
}

/// Check every action locally, reporting the first invalid one.
pub fn validate_actions(actions: &[Box<dyn Action>]) -> Result<(), ApplyError> {
    let total = actions.len();
    for (offset, action) in actions.iter().enumerate() {
        action.validate().map_err(|source| ApplyError::Invalid {
            index: offset + 1,
            total,
            description: action.to_string(),
            source,
        })?;
    }
    Ok(())
}

/// Run `actions` in order, writing one progress line per action to `out`.
pub fn apply_actions<W: Write>(
    mode: Mode<'_>,
    actions: &[Box<dyn Action>],
    out: &mut W,
) -> Result<ApplyReport, ApplyError> {
    validate_actions(actions)?;

    let total = actions.len();
    let mut report = ApplyReport {
        total,
        ..ApplyReport::default()
    };
    let mut cluster = match mode {
        Mode::Live(cluster) => Some(cluster),
        Mode::DryRun => None,
    };

    for (offset, action) in actions.iter().enumerate() {
        let index = offset + 1;
        let line = progress_line(index, total, action.as_ref());
        let Some(cluster) = cluster.as_deref_mut() else {
            writeln!(out, "{line}")?;
            continue;
        };
        write!(out, "{line}")?;
        out.flush()?;
        let outcome = action
            .apply(&mut Context::new(cluster))
            .map_err(|source| ApplyError::Cluster {
                index,
                total,
                description: action.to_string(),
                source,
            });
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(err) => {
                writeln!(out)?;
                return Err(err);
            }
        };
        match outcome {
            Outcome::Applied => {
                report.applied += 1;
                writeln!(out)?;
            }
            Outcome::Skipped(reason) => {
                report.skipped += 1;
                writeln!(out, " (skipped: {reason})")?;
            }
        }
        tracing::debug!(index, total, kind = action.kind(), "action done");
    }
    Ok(report)
}
