use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use serde::Serialize;

use crate::conn::ConnError;

/// Only the most recent errors are kept.
pub const ERROR_LOG_CAP: usize = 20;

/// Counters and error tail for one test run.
///
/// Borrowed by every worker thread of an attack. Counters are atomic so concurrent
/// increments are never lost.
#[derive(Debug)]
pub struct TestResult {
    pub name: String,
    started: DateTime<Local>,
    ended: Mutex<Option<DateTime<Local>>>,
    requests_sent: AtomicU64,
    responses_received: AtomicU64,
    timeouts: AtomicU64,
    connection_failures: AtomicU64,
    unresponsive_events: AtomicU64,
    possible_crashes: AtomicU64,
    errors: Mutex<VecDeque<String>>,
}

/// Flat snapshot handed to persistence and display.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TestRecord {
    pub test_name: String,
    pub start_time: DateTime<Local>,
    pub end_time: Option<DateTime<Local>>,
    pub duration_seconds: f64,
    pub requests_sent: u64,
    pub responses_received: u64,
    pub success_rate_percent: f64,
    pub timeouts: u64,
    pub connection_failures: u64,
    pub device_unresponsive_events: u64,
    pub possible_crashes: u64,
    pub errors: Vec<String>,
}

impl TestResult {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            started: Local::now(),
            ended: Mutex::new(None),
            requests_sent: AtomicU64::new(0),
            responses_received: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            connection_failures: AtomicU64::new(0),
            unresponsive_events: AtomicU64::new(0),
            possible_crashes: AtomicU64::new(0),
            errors: Mutex::new(VecDeque::with_capacity(ERROR_LOG_CAP)),
        }
    }

    pub fn inc_sent(&self) {
        self.requests_sent.fetch_add(1, Ordering::SeqCst);
    }
    pub fn inc_received(&self) {
        self.add_received(1);
    }
    pub fn add_received(&self, n: u64) {
        self.responses_received.fetch_add(n, Ordering::SeqCst);
    }
    pub fn inc_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::SeqCst);
    }
    pub fn inc_conn_failure(&self) {
        self.connection_failures.fetch_add(1, Ordering::SeqCst);
    }
    pub fn inc_unresponsive(&self) {
        self.unresponsive_events.fetch_add(1, Ordering::SeqCst);
    }
    pub fn inc_possible_crash(&self) {
        self.possible_crashes.fetch_add(1, Ordering::SeqCst);
    }

    pub fn requests_sent(&self) -> u64 {
        self.requests_sent.load(Ordering::SeqCst)
    }
    pub fn responses_received(&self) -> u64 {
        self.responses_received.load(Ordering::SeqCst)
    }
    pub fn unresponsive_events(&self) -> u64 {
        self.unresponsive_events.load(Ordering::SeqCst)
    }
    pub fn possible_crashes(&self) -> u64 {
        self.possible_crashes.load(Ordering::SeqCst)
    }

    pub fn log_error(&self, msg: impl Into<String>) {
        let mut errors = self.errors.lock();
        if errors.len() == ERROR_LOG_CAP {
            errors.pop_front();
        }
        errors.push_back(msg.into());
    }

    /// Count a failed primitive by kind and keep its message in the error tail.
    pub fn record_failure(&self, context: &str, err: &ConnError) {
        match err {
            ConnError::Connect { .. } => self.inc_conn_failure(),
            ConnError::Timeout => self.inc_timeout(),
            _ => {}
        }
        self.log_error(format!("{context}: {err}"));
    }

    pub fn finish(&self) {
        let mut ended = self.ended.lock();
        if ended.is_none() {
            *ended = Some(Local::now());
        }
    }

    pub fn success_rate(&self) -> f64 {
        // responses first: every response is counted after its request
        let received = self.responses_received();
        let sent = self.requests_sent();
        rate(received, sent)
    }

    pub fn record(&self) -> TestRecord {
        let received = self.responses_received();
        let sent = self.requests_sent();
        let ended = *self.ended.lock();
        TestRecord {
            test_name: self.name.clone(),
            start_time: self.started,
            end_time: ended,
            duration_seconds: elapsed_secs(self.started, ended),
            requests_sent: sent,
            responses_received: received,
            success_rate_percent: rate(received, sent),
            timeouts: self.timeouts.load(Ordering::SeqCst),
            connection_failures: self.connection_failures.load(Ordering::SeqCst),
            device_unresponsive_events: self.unresponsive_events(),
            possible_crashes: self.possible_crashes(),
            errors: self.errors.lock().iter().cloned().collect(),
        }
    }
}

fn elapsed_secs(start: DateTime<Local>, end: Option<DateTime<Local>>) -> f64 {
    match end {
        Some(end) => (end - start).num_milliseconds() as f64 / 1000.0,
        None => 0.0,
    }
}

fn rate(received: u64, sent: u64) -> f64 {
    if sent == 0 {
        return 0.0;
    }
    (received as f64 / sent as f64 * 100.0).min(100.0)
}
