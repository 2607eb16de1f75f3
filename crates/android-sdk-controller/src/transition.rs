//! Phase transition table
//!
//! The reconciler gathers one observation for the current phase and asks
//! [`next_phase`] where to go. Side effects are the reconciler's business;
//! this table only says which phase follows.

use android_sdk_common::crd::SdkPhase;

use crate::lifecycle::JobState;

/// What the reconciler saw before deciding on a transition
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Observation {
    /// Nothing beyond the phase itself
    Nothing,
    /// State of the worker Pod belonging to the phase
    Job(JobState),
    /// Result of comparing the current fingerprint with the baseline
    Drift {
        /// True if the package list changed
        changed: bool,
    },
}

/// Phase that follows `phase` given `observation`
///
/// An absent worker while `Installing`/`Syncing` is read as "finished and
/// already cleaned up": the Pod is only ever deleted after it succeeded.
/// Combinations not in the table leave the phase unchanged.
pub fn next_phase(phase: SdkPhase, observation: Observation) -> SdkPhase {
    use JobState::{Absent, Succeeded};
    use Observation::{Drift, Job, Nothing};

    match (phase, observation) {
        (SdkPhase::Unset, Nothing) => SdkPhase::Install,
        (SdkPhase::Install, Nothing) => SdkPhase::Installing,
        (SdkPhase::Installing, Job(Succeeded | Absent)) => SdkPhase::Sync,
        (SdkPhase::Sync, Nothing) => SdkPhase::Syncing,
        (SdkPhase::Syncing, Job(Succeeded | Absent)) => SdkPhase::Done,
        (SdkPhase::Done, Drift { changed: true }) => SdkPhase::Sync,
        (unchanged, _) => unchanged,
    }
}
