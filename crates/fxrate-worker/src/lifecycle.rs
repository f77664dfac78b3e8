//! Retry-chain decisions for a single reserved job.
//!
//! A job is never changed in place: "retry" means enqueue a successor with
//! carried-forward counters and delete the original. A chain ends either
//! by reaching the success quota (delete, no successor) or by exceeding the
//! failure tolerance (bury).

use fxrate_models::RatePayload;

use crate::options::ConsumeOptions;

/// Result of one fetch-and-persist attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Succeeded,
    Failed,
}

/// What to do with a job after its attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Enqueue a successor with `payload` after `delay` seconds, then
    /// delete the original.
    Requeue {
        payload: RatePayload,
        delay: u32,
        after: AttemptOutcome,
    },
    /// Success quota reached: delete the original, no successor.
    Complete { payload: RatePayload },
    /// Failure tolerance exceeded: bury the original.
    Quarantine { payload: RatePayload },
}

impl Transition {
    /// Counters after the attempt.
    pub fn payload(&self) -> &RatePayload {
        match self {
            Transition::Requeue { payload, .. }
            | Transition::Complete { payload }
            | Transition::Quarantine { payload } => payload,
        }
    }
}

/// The chain already has all the successes it needs; no attempt is made.
pub fn quota_satisfied(payload: &RatePayload, options: &ConsumeOptions) -> bool {
    payload.success_count >= options.success_trials
}

/// Count the attempt and decide the job's fate.
pub fn next_transition(
    mut payload: RatePayload,
    outcome: AttemptOutcome,
    options: &ConsumeOptions,
) -> Transition {
    match outcome {
        AttemptOutcome::Succeeded => {
            if payload.record_success() < options.success_trials {
                Transition::Requeue {
                    payload,
                    delay: options.success_delay,
                    after: outcome,
                }
            } else {
                Transition::Complete { payload }
            }
        }
        AttemptOutcome::Failed => {
            if payload.record_failure() <= options.tolerance {
                Transition::Requeue {
                    payload,
                    delay: options.failure_delay,
                    after: outcome,
                }
            } else {
                Transition::Quarantine { payload }
            }
        }
    }
}
