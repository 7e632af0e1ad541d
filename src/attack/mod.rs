//! Adversarial workloads and the orchestrator that runs them against one device.

pub mod attack_combined;
pub mod attack_config;
pub mod attack_flood;
pub mod attack_overflow;
pub mod attack_reconnect;
pub mod runner;
pub mod state;

use tracing::info;

use crate::conn::Target;
use crate::stats::TestResult;
use crate::stop::StopToken;
use attack_config::{Attack, AttackKind, Tuning};

/// Everything a workload needs. Borrowed by scoped worker threads, so it must be `Sync`.
#[derive(Debug)]
pub struct AttackCtx {
    pub target: Target,
    pub tuning: Tuning,
    pub result: TestResult,
    pub stop: StopToken,
}

impl Attack {
    /// Run to completion. `checkpoint` is consulted by iteration-based attacks and returns
    /// true when the run must halt; the return value reports whether that happened.
    pub fn run(&self, ctx: &AttackCtx, checkpoint: &mut dyn FnMut(AttackKind) -> bool) -> bool {
        let kind = self.kind();
        info!(attack = kind.name(), hypothesis = kind.hypothesis(), "[attack] {:?}", self);
        match *self {
            Attack::ConcurrentFlood { duration, workers } => {
                attack_flood::run_concurrent_flood(ctx, duration, workers);
                false
            }
            Attack::ConnectionOverflow {
                iterations,
                checkpoint_every,
            } => attack_overflow::run_connection_overflow(
                ctx,
                iterations,
                checkpoint_every,
                checkpoint,
            ),
            Attack::RapidReconnect {
                iterations,
                checkpoint_every,
            } => attack_reconnect::run_rapid_reconnect(ctx, iterations, checkpoint_every, checkpoint),
            Attack::CombinedStress { duration } => {
                attack_combined::run_combined_stress(ctx, duration);
                false
            }
        }
    }
}

/// True on every `every`-th iteration after the first; `every == 0` disables checkpoints.
fn is_checkpoint(iteration: u32, every: u32) -> bool {
    every > 0 && iteration > 0 && iteration % every == 0
}
