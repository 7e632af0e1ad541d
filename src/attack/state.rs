use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Checking,
    CrashedRecovered,
    CrashedStuck,
    CompletedNoCrash,
    Aborted,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RunState::Running | RunState::Checking)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEvent {
    /// An attack finished or hit a checkpoint.
    Check,
    Alive,
    Recovered,
    Stuck,
    BudgetExhausted,
    Stop,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid transition from {from:?} on {event:?}")]
pub struct TransitionError {
    pub from: RunState,
    pub event: RunEvent,
}

#[derive(Debug)]
pub struct RunMachine {
    state: RunState,
}

impl Default for RunMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl RunMachine {
    pub fn new() -> Self {
        Self {
            state: RunState::Running,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn transition(&mut self, event: RunEvent) -> Result<RunState, TransitionError> {
        use RunEvent::*;
        use RunState::*;

        let next = match (self.state, event) {
            (Running, Check) => Checking,
            (Checking, Alive) => Running,
            (Checking, RunEvent::Recovered) => CrashedRecovered,
            (Checking, Stuck) => CrashedStuck,
            (Running, BudgetExhausted) => CompletedNoCrash,
            (Running | Checking, Stop) => Aborted,
            (from, event) => return Err(TransitionError { from, event }),
        };
        self.state = next;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alive_check_returns_to_running() {
        let mut m = RunMachine::new();
        assert_eq!(m.transition(RunEvent::Check), Ok(RunState::Checking));
        assert_eq!(m.transition(RunEvent::Alive), Ok(RunState::Running));
        assert!(!m.state().is_terminal());
    }

    #[test]
    fn crash_branches_are_terminal() {
        let mut m = RunMachine::new();
        m.transition(RunEvent::Check).unwrap();
        assert_eq!(m.transition(RunEvent::Recovered), Ok(RunState::CrashedRecovered));
        assert!(m.state().is_terminal());
        assert!(m.transition(RunEvent::Check).is_err());

        let mut m = RunMachine::new();
        m.transition(RunEvent::Check).unwrap();
        assert_eq!(m.transition(RunEvent::Stuck), Ok(RunState::CrashedStuck));
        assert!(m.transition(RunEvent::Stop).is_err());
    }

    #[test]
    fn stop_aborts_from_running_or_checking() {
        let mut m = RunMachine::new();
        assert_eq!(m.transition(RunEvent::Stop), Ok(RunState::Aborted));

        let mut m = RunMachine::new();
        m.transition(RunEvent::Check).unwrap();
        assert_eq!(m.transition(RunEvent::Stop), Ok(RunState::Aborted));
    }

    #[test]
    fn budget_only_ends_a_running_machine() {
        let mut m = RunMachine::new();
        m.transition(RunEvent::Check).unwrap();
        assert_eq!(
            m.transition(RunEvent::BudgetExhausted),
            Err(TransitionError {
                from: RunState::Checking,
                event: RunEvent::BudgetExhausted,
            })
        );
        m.transition(RunEvent::Alive).unwrap();
        assert_eq!(
            m.transition(RunEvent::BudgetExhausted),
            Ok(RunState::CompletedNoCrash)
        );
    }

    #[test]
    fn alive_outside_check_is_rejected() {
        let mut m = RunMachine::new();
        assert!(m.transition(RunEvent::Alive).is_err());
        assert_eq!(m.state(), RunState::Running);
    }
}
