use std::time::Duration;

/// Failure hypotheses the harness knows how to provoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttackKind {
    ConcurrentFlood,
    ConnectionOverflow,
    RapidReconnect,
    CombinedStress,
}

impl AttackKind {
    pub fn name(self) -> &'static str {
        match self {
            AttackKind::ConcurrentFlood => "concurrent_flood",
            AttackKind::ConnectionOverflow => "connection_overflow",
            AttackKind::RapidReconnect => "rapid_reconnect",
            AttackKind::CombinedStress => "combined_stress",
        }
    }

    pub fn hypothesis(self) -> &'static str {
        match self {
            AttackKind::ConcurrentFlood => "parser spin-wait -> watchdog timeout",
            AttackKind::ConnectionOverflow => "client table corruption -> hard fault",
            AttackKind::RapidReconnect => "state corruption from partial cleanup",
            AttackKind::CombinedStress => "multiple vectors simultaneously",
        }
    }
}

/// A parameterized workload. Stateless; the orchestrator owns execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attack {
    ConcurrentFlood {
        duration: Duration,
        workers: usize,
    },
    ConnectionOverflow {
        iterations: u32,
        checkpoint_every: u32,
    },
    RapidReconnect {
        iterations: u32,
        checkpoint_every: u32,
    },
    CombinedStress {
        duration: Duration,
    },
}

impl Attack {
    pub fn kind(&self) -> AttackKind {
        match self {
            Attack::ConcurrentFlood { .. } => AttackKind::ConcurrentFlood,
            Attack::ConnectionOverflow { .. } => AttackKind::ConnectionOverflow,
            Attack::RapidReconnect { .. } => AttackKind::RapidReconnect,
            Attack::CombinedStress { .. } => AttackKind::CombinedStress,
        }
    }
}

/// The order every round walks through.
pub fn default_sequence() -> Vec<Attack> {
    vec![
        Attack::ConcurrentFlood {
            duration: Duration::from_secs(10),
            workers: 5,
        },
        Attack::ConnectionOverflow {
            iterations: 30,
            checkpoint_every: 10,
        },
        Attack::RapidReconnect {
            iterations: 50,
            checkpoint_every: 25,
        },
        Attack::CombinedStress {
            duration: Duration::from_secs(15),
        },
    ]
}

/// Socket timeouts, sizes and pauses used by the workloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tuning {
    /// Default per-call socket timeout.
    pub socket_timeout: Duration,
    /// Timeout of the crash-check probe.
    pub alive_timeout: Duration,
    /// Client slots the controller tracks.
    pub table_capacity: usize,
    pub round_pause: Duration,
    /// Blocking read timeout re-armed after each non-blocking flood read.
    pub flood_rearm_timeout: Duration,
    pub overflow_connect_timeout: Duration,
    pub reconnect_connect_timeout: Duration,
    pub combined_connect_timeout: Duration,
    pub oversized_payload_len: usize,
    pub oversized_fill: u8,
    pub oversized_pause: Duration,
    pub churn_connect_timeout: Duration,
    pub churn_pause: Duration,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            socket_timeout: Duration::from_secs(5),
            alive_timeout: Duration::from_secs(3),
            table_capacity: 5,
            round_pause: Duration::from_secs(2),
            flood_rearm_timeout: Duration::from_millis(100),
            overflow_connect_timeout: Duration::from_millis(500),
            reconnect_connect_timeout: Duration::from_millis(300),
            combined_connect_timeout: Duration::from_secs(1),
            oversized_payload_len: 1500,
            oversized_fill: 0xAA,
            oversized_pause: Duration::from_millis(50),
            churn_connect_timeout: Duration::from_millis(500),
            churn_pause: Duration::from_millis(100),
        }
    }
}
