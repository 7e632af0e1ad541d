//! Device health inferred purely from whether the controller answers a probe with any bytes.

use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::conn::{Target, connect};
use crate::proto::command::probe_frame;
use crate::stop::StopToken;

/// Anything that can answer "is the device responding right now?".
pub trait Probe {
    fn is_alive(&self, timeout: Duration) -> bool;
}

/// Liveness probe over a fresh TCP connection per check.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    target: Target,
}

impl TcpProbe {
    pub fn new(target: Target) -> Self {
        Self { target }
    }
}

impl Probe for TcpProbe {
    fn is_alive(&self, timeout: Duration) -> bool {
        is_alive(&self.target, timeout)
    }
}

/// True iff at least one byte comes back for a telemetry read. Content is not validated.
/// `timeout` bounds the whole check, connect included.
pub fn is_alive(target: &Target, timeout: Duration) -> bool {
    let start = Instant::now();
    let mut conn = match connect(target, timeout) {
        Ok(c) => c,
        Err(e) => {
            debug!(device = %target, error = %e, "probe connect failed");
            return false;
        }
    };
    let left = timeout.saturating_sub(start.elapsed());
    if left.is_zero() {
        return false;
    }
    let res = conn
        .set_read_timeout(left)
        .and_then(|_| conn.send(&probe_frame()))
        .and_then(|_| conn.recv());
    match res {
        Ok(bytes) => !bytes.is_empty(),
        Err(e) => {
            debug!(device = %target, error = %e, "probe got no response");
            false
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryPolicy {
    /// Overall wait budget.
    pub budget: Duration,
    /// Sleep between failed probes.
    pub poll_interval: Duration,
    /// Timeout for each individual probe.
    pub probe_timeout: Duration,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            budget: Duration::from_secs(60),
            poll_interval: Duration::from_secs(2),
            probe_timeout: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    Recovered { attempts: u32 },
    TimedOut,
    Cancelled,
}

/// Blocking poll until the probe succeeds, the budget runs out, or `stop` is cancelled.
/// Probe timeouts and the final sleep are clipped to the remaining budget.
pub fn wait_for_recovery<P: Probe + ?Sized>(
    probe: &P,
    policy: &RecoveryPolicy,
    stop: &StopToken,
) -> Recovery {
    info!(budget_s = policy.budget.as_secs_f64(), "waiting for device");
    let deadline = Instant::now() + policy.budget;
    let mut attempts = 0u32;

    loop {
        if stop.is_cancelled() {
            return Recovery::Cancelled;
        }
        if Instant::now() >= deadline {
            info!(attempts, "device not responsive within budget");
            return Recovery::TimedOut;
        }
        attempts += 1;
        let left = deadline.saturating_duration_since(Instant::now());
        if probe.is_alive(policy.probe_timeout.min(left)) {
            info!(attempts, "device responsive again");
            return Recovery::Recovered { attempts };
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        thread::sleep(policy.poll_interval.min(remaining));
    }
}

/// Wall-clock time for one frame round trip, if anything came back at all.
pub fn measure_latency(target: &Target, frame: &[u8], timeout: Duration) -> Option<Duration> {
    let mut conn = connect(target, timeout).ok()?;
    let start = Instant::now();
    conn.send(frame).ok()?;
    let bytes = conn.recv().ok()?;
    let elapsed = start.elapsed();
    (!bytes.is_empty()).then_some(elapsed)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::net::TcpStream;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::conn::tests::{closed_target, responder, sink, stub_server};

    /// Answers from `script` in order, then `then` forever. Clones share the call count.
    #[derive(Clone)]
    pub(crate) struct ScriptedProbe {
        script: Vec<bool>,
        then: bool,
        calls: Arc<AtomicU32>,
    }

    impl ScriptedProbe {
        pub(crate) fn new(script: Vec<bool>, then: bool) -> Self {
            Self {
                script,
                then,
                calls: Arc::new(AtomicU32::new(0)),
            }
        }

        pub(crate) fn dead() -> Self {
            Self::new(Vec::new(), false)
        }

        pub(crate) fn alive_after(k: usize) -> Self {
            Self::new(vec![false; k], true)
        }

        pub(crate) fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Probe for ScriptedProbe {
        fn is_alive(&self, _timeout: Duration) -> bool {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            self.script.get(n).copied().unwrap_or(self.then)
        }
    }

    fn policy(budget_ms: u64, poll_ms: u64) -> RecoveryPolicy {
        RecoveryPolicy {
            budget: Duration::from_millis(budget_ms),
            poll_interval: Duration::from_millis(poll_ms),
            probe_timeout: Duration::from_millis(10),
        }
    }

    #[test]
    fn alive_when_device_answers() {
        let target = stub_server(responder);
        assert!(is_alive(&target, Duration::from_secs(2)));
    }

    #[test]
    fn dead_when_silent_closed_or_refused() {
        let silent = stub_server(sink);
        assert!(!is_alive(&silent, Duration::from_millis(200)));

        let hangup = stub_server(|s: TcpStream| drop(s));
        assert!(!is_alive(&hangup, Duration::from_millis(500)));

        assert!(!is_alive(&closed_target(), Duration::from_millis(200)));
    }

    #[test]
    fn never_recovering_respects_budget() {
        let probe = ScriptedProbe::dead();
        let p = policy(300, 50);
        let start = Instant::now();
        let res = wait_for_recovery(&probe, &p, &StopToken::new());
        let elapsed = start.elapsed();
        assert_eq!(res, Recovery::TimedOut);
        assert!(elapsed >= p.budget, "{elapsed:?}");
        // one poll interval plus scheduling slack
        assert!(elapsed <= p.budget + p.poll_interval + Duration::from_millis(100), "{elapsed:?}");
        assert!(probe.calls() >= 2);
    }

    #[test]
    fn silent_device_does_not_overshoot_budget() {
        // accepts but never answers, so every probe runs into its read timeout
        let probe = TcpProbe::new(stub_server(sink));
        let p = RecoveryPolicy {
            budget: Duration::from_millis(300),
            poll_interval: Duration::from_millis(50),
            probe_timeout: Duration::from_secs(2),
        };
        let start = Instant::now();
        let res = wait_for_recovery(&probe, &p, &StopToken::new());
        let elapsed = start.elapsed();
        assert_eq!(res, Recovery::TimedOut);
        assert!(elapsed <= p.budget + p.poll_interval + Duration::from_millis(100), "{elapsed:?}");
    }

    #[test]
    fn is_alive_bounds_the_whole_check() {
        let silent = stub_server(sink);
        let start = Instant::now();
        assert!(!is_alive(&silent, Duration::from_millis(200)));
        assert!(start.elapsed() < Duration::from_millis(350), "{:?}", start.elapsed());
    }

    #[test]
    fn recovers_at_the_scripted_poll() {
        let probe = ScriptedProbe::alive_after(3);
        let p = policy(5_000, 50);
        let start = Instant::now();
        let res = wait_for_recovery(&probe, &p, &StopToken::new());
        assert_eq!(res, Recovery::Recovered { attempts: 4 });
        // three failed polls, each followed by one interval
        assert!(start.elapsed() < Duration::from_millis(150 + 50 + 100));
    }

    #[test]
    fn cancelled_wait_stops_polling() {
        let probe = ScriptedProbe::dead();
        let stop = StopToken::new();
        stop.cancel();
        let res = wait_for_recovery(&probe, &policy(5_000, 50), &stop);
        assert_eq!(res, Recovery::Cancelled);
        assert_eq!(probe.calls(), 0);
    }

    #[test]
    fn latency_only_with_response() {
        let frame = probe_frame();
        let up = stub_server(responder);
        assert!(measure_latency(&up, &frame, Duration::from_secs(2)).is_some());

        let silent = stub_server(sink);
        assert!(measure_latency(&silent, &frame, Duration::from_millis(200)).is_none());
    }
}
