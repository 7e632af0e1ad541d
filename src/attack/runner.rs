use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{info, warn};

use super::AttackCtx;
use super::attack_config::{Attack, AttackKind, Tuning};
use super::state::{RunEvent, RunMachine, RunState};
use crate::conn::Target;
use crate::liveness::{Probe, Recovery, RecoveryPolicy, wait_for_recovery};
use crate::stats::{TestRecord, TestResult};
use crate::stop::StopToken;

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub target: Target,
    /// Overall budget; attacks already running are allowed to finish.
    pub duration: Duration,
    pub recovery: RecoveryPolicy,
    pub tuning: Tuning,
    pub sequence: Vec<Attack>,
}

/// Terminal classification of one run. Set at most once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrashVerdict {
    pub detected: bool,
    pub method: String,
    pub recovered: bool,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub state: RunState,
    pub verdict: Option<CrashVerdict>,
    pub rounds: u32,
    pub result: TestRecord,
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("device {0} is not responding; refusing to start")]
    NotResponding(Target),
}

/// Liveness checks, the run state machine and the verdict.
pub struct CrashMonitor<P> {
    probe: P,
    policy: RecoveryPolicy,
    alive_timeout: Duration,
    machine: RunMachine,
    verdict: Option<CrashVerdict>,
}

impl<P: Probe> CrashMonitor<P> {
    pub fn new(probe: P, policy: RecoveryPolicy, alive_timeout: Duration) -> Self {
        Self {
            probe,
            policy,
            alive_timeout,
            machine: RunMachine::new(),
            verdict: None,
        }
    }

    pub fn state(&self) -> RunState {
        self.machine.state()
    }

    pub fn verdict(&self) -> Option<&CrashVerdict> {
        self.verdict.as_ref()
    }

    fn advance(&mut self, event: RunEvent) {
        if let Err(e) = self.machine.transition(event) {
            warn!(error = %e, "ignoring run state event");
        }
    }

    /// Crash-check protocol after an attack or one of its checkpoints. Returns true when the
    /// run is over (crash confirmed either way, or stopped).
    pub fn check(&mut self, kind: AttackKind, result: &TestResult, stop: &StopToken) -> bool {
        if self.state().is_terminal() {
            return true;
        }
        if stop.is_cancelled() {
            self.advance(RunEvent::Stop);
            return true;
        }
        self.advance(RunEvent::Check);

        if self.probe.is_alive(self.alive_timeout) {
            self.advance(RunEvent::Alive);
            return false;
        }

        warn!(attack = kind.name(), "device UNRESPONSIVE");
        result.inc_unresponsive();

        match wait_for_recovery(&self.probe, &self.policy, stop) {
            Recovery::Recovered { attempts } => {
                warn!(attack = kind.name(), attempts, "device recovered - CRASH CONFIRMED");
                result.inc_possible_crash();
                self.verdict = Some(CrashVerdict {
                    detected: true,
                    method: kind.name().to_string(),
                    recovered: true,
                });
                self.advance(RunEvent::Recovered);
            }
            Recovery::TimedOut => {
                warn!(attack = kind.name(), "device not recovering, may be stuck");
                result.inc_possible_crash();
                self.verdict = Some(CrashVerdict {
                    detected: true,
                    method: format!("{} (no recovery)", kind.name()),
                    recovered: false,
                });
                self.advance(RunEvent::Stuck);
            }
            Recovery::Cancelled => {
                info!("stopped while waiting for recovery");
                self.advance(RunEvent::Stop);
            }
        }
        true
    }
}

/// Runs rounds of the attack sequence until a crash is confirmed, the budget runs out, or
/// the run is stopped.
pub struct CrashTester<P> {
    ctx: AttackCtx,
    monitor: CrashMonitor<P>,
    duration: Duration,
    sequence: Vec<Attack>,
}

impl<P: Probe> CrashTester<P> {
    pub fn new(config: RunConfig, probe: P, stop: StopToken) -> Self {
        let monitor = CrashMonitor::new(probe, config.recovery, config.tuning.alive_timeout);
        Self {
            ctx: AttackCtx {
                target: config.target,
                tuning: config.tuning,
                result: TestResult::new("crash_test"),
                stop,
            },
            monitor,
            duration: config.duration,
            sequence: config.sequence,
        }
    }

    pub fn run(mut self) -> Result<RunReport, RunError> {
        if !self.monitor.probe.is_alive(self.ctx.tuning.alive_timeout) {
            return Err(RunError::NotResponding(self.ctx.target.clone()));
        }
        info!(target_addr = %self.ctx.target, "device responsive, starting attacks");

        let start = Instant::now();
        let mut rounds = 0u32;

        'rounds: loop {
            if self.ctx.stop.is_cancelled() {
                self.monitor.advance(RunEvent::Stop);
                break;
            }
            let elapsed = start.elapsed();
            if elapsed >= self.duration {
                self.monitor.advance(RunEvent::BudgetExhausted);
                break;
            }
            rounds += 1;
            let remaining_min = ((self.duration - elapsed).as_secs_f64() / 6.0).round() / 10.0;
            info!(
                round = rounds,
                remaining_min,
                success_rate = self.ctx.result.success_rate(),
                "[round] start"
            );

            let ctx = &self.ctx;
            let monitor = &mut self.monitor;
            for attack in &self.sequence {
                if ctx.stop.is_cancelled() || start.elapsed() >= self.duration {
                    continue 'rounds;
                }
                let halted =
                    attack.run(ctx, &mut |kind| monitor.check(kind, &ctx.result, &ctx.stop));
                if halted || monitor.check(attack.kind(), &ctx.result, &ctx.stop) {
                    break 'rounds;
                }
            }

            thread::sleep(self.ctx.tuning.round_pause);
        }

        self.ctx.result.finish();
        let report = RunReport {
            state: self.monitor.state(),
            verdict: self.monitor.verdict().cloned(),
            rounds,
            result: self.ctx.result.record(),
        };
        info!(state = ?report.state, rounds, "run finished");
        Ok(report)
    }
}
