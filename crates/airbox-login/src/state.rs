//! Login flow state machine
//!
//! Pure state machine: receives events, returns (new_state, action).
//! `AuthorizationCodeFlow` executes the I/O implied by each action.

/// Why a login attempt ended without credentials
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// Callback listener could not bind
    Listener,
    /// Callback carried a bad state, an error, or no code
    Callback,
    /// No callback before the deadline
    Timeout,
    /// Caller cancelled the attempt
    Cancelled,
    /// Token endpoint rejected the code or returned an unusable token
    Exchange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowState {
    /// Nothing started yet
    Idle,
    /// Callback server bound and serving
    ListenerStarted { port: u16 },
    /// Browser pointed at the authorization URL
    AuthRequestSent { port: u16 },
    /// Racing callback against timeout and cancellation
    AwaitingCallback { port: u16 },
    /// Code delivered by the callback
    CodeReceived,
    /// Code exchange in flight
    Exchanging,
    /// Terminal: credentials obtained
    Complete,
    /// Terminal: attempt failed
    Failed { reason: FailureReason },
}

impl FlowState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FlowState::Complete | FlowState::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowEvent {
    ListenerBound { port: u16 },
    ListenerFailed,
    AuthRequestSent,
    WaitStarted,
    CodeReceived,
    CallbackFailed,
    TimerElapsed,
    Cancelled,
    ExchangeStarted,
    ExchangeSucceeded,
    ExchangeFailed,
}

/// Actions the driver should execute after a state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowAction {
    /// Build the authorization URL and launch the browser
    SendAuthRequest,
    /// Wait for the callback
    AwaitCallback,
    /// Redeem the code at the token endpoint
    ExchangeCode,
    /// Close the listener; the attempt is over
    Close,
    /// No-op
    None,
}

/// Handle a state transition. Pure function: no I/O.
pub fn handle_event(state: FlowState, event: FlowEvent) -> (FlowState, FlowAction) {
    match (state, event) {
        // --- Terminal states absorb everything ---
        (state, _) if state.is_terminal() => (state, FlowAction::None),

        // --- Idle ---
        (FlowState::Idle, FlowEvent::ListenerBound { port }) => (
            FlowState::ListenerStarted { port },
            FlowAction::SendAuthRequest,
        ),
        (FlowState::Idle, FlowEvent::ListenerFailed) => failed(FailureReason::Listener),

        // --- ListenerStarted ---
        (FlowState::ListenerStarted { port }, FlowEvent::AuthRequestSent) => (
            FlowState::AuthRequestSent { port },
            FlowAction::AwaitCallback,
        ),
        // Caller launched the browser itself
        (FlowState::ListenerStarted { port }, FlowEvent::WaitStarted) => {
            (FlowState::AwaitingCallback { port }, FlowAction::None)
        }

        // --- AuthRequestSent ---
        (FlowState::AuthRequestSent { port }, FlowEvent::WaitStarted) => {
            (FlowState::AwaitingCallback { port }, FlowAction::None)
        }

        // --- AwaitingCallback ---
        (FlowState::AwaitingCallback { .. }, FlowEvent::CodeReceived) => {
            (FlowState::CodeReceived, FlowAction::ExchangeCode)
        }
        (FlowState::AwaitingCallback { .. }, FlowEvent::CallbackFailed) => {
            failed(FailureReason::Callback)
        }
        (FlowState::AwaitingCallback { .. }, FlowEvent::TimerElapsed) => {
            failed(FailureReason::Timeout)
        }

        // --- CodeReceived / Exchanging ---
        (FlowState::CodeReceived, FlowEvent::ExchangeStarted) => {
            (FlowState::Exchanging, FlowAction::None)
        }
        (FlowState::Exchanging, FlowEvent::ExchangeSucceeded) => {
            (FlowState::Complete, FlowAction::Close)
        }
        (FlowState::Exchanging, FlowEvent::ExchangeFailed) => failed(FailureReason::Exchange),

        // --- Any live state + cancel = fail ---
        (_, FlowEvent::Cancelled) => failed(FailureReason::Cancelled),

        // --- Invalid/unhandled transition: stay in current state ---
        (state, _event) => (state, FlowAction::None),
    }
}

fn failed(reason: FailureReason) -> (FlowState, FlowAction) {
    (FlowState::Failed { reason }, FlowAction::Close)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(events: Vec<FlowEvent>) -> FlowState {
        events
            .into_iter()
            .fold(FlowState::Idle, |state, event| handle_event(state, event).0)
    }

    #[test]
    fn idle_to_listener_started_on_bind() {
        let (state, action) = handle_event(FlowState::Idle, FlowEvent::ListenerBound { port: 8085 });
        assert_eq!(state, FlowState::ListenerStarted { port: 8085 });
        assert_eq!(action, FlowAction::SendAuthRequest);
    }

    #[test]
    fn bind_failure_fails_and_closes() {
        let (state, action) = handle_event(FlowState::Idle, FlowEvent::ListenerFailed);
        assert_eq!(
            state,
            FlowState::Failed {
                reason: FailureReason::Listener
            }
        );
        assert_eq!(action, FlowAction::Close);
    }

    #[test]
    fn happy_path_reaches_complete() {
        let state = run(vec![
            FlowEvent::ListenerBound { port: 1 },
            FlowEvent::AuthRequestSent,
            FlowEvent::WaitStarted,
            FlowEvent::CodeReceived,
            FlowEvent::ExchangeStarted,
            FlowEvent::ExchangeSucceeded,
        ]);
        assert_eq!(state, FlowState::Complete);
    }

    #[test]
    fn code_received_requests_exchange() {
        let (state, action) = handle_event(
            FlowState::AwaitingCallback { port: 1 },
            FlowEvent::CodeReceived,
        );
        assert_eq!(state, FlowState::CodeReceived);
        assert_eq!(action, FlowAction::ExchangeCode);
    }

    #[test]
    fn waiting_without_auth_request_is_allowed() {
        let (state, _) = handle_event(
            FlowState::ListenerStarted { port: 7 },
            FlowEvent::WaitStarted,
        );
        assert_eq!(state, FlowState::AwaitingCallback { port: 7 });
    }

    #[test]
    fn awaiting_callback_failures() {
        for (event, reason) in [
            (FlowEvent::CallbackFailed, FailureReason::Callback),
            (FlowEvent::TimerElapsed, FailureReason::Timeout),
            (FlowEvent::Cancelled, FailureReason::Cancelled),
        ] {
            let (state, action) = handle_event(FlowState::AwaitingCallback { port: 1 }, event);
            assert_eq!(state, FlowState::Failed { reason });
            assert_eq!(action, FlowAction::Close);
        }
    }

    #[test]
    fn exchange_failure_fails() {
        let (state, _) = handle_event(FlowState::Exchanging, FlowEvent::ExchangeFailed);
        assert_eq!(
            state,
            FlowState::Failed {
                reason: FailureReason::Exchange
            }
        );
    }

    #[test]
    fn cancel_during_exchange_fails() {
        let (state, _) = handle_event(FlowState::Exchanging, FlowEvent::Cancelled);
        assert_eq!(
            state,
            FlowState::Failed {
                reason: FailureReason::Cancelled
            }
        );
    }

    #[test]
    fn terminal_states_absorb_events() {
        let (state, action) = handle_event(FlowState::Complete, FlowEvent::Cancelled);
        assert_eq!(state, FlowState::Complete);
        assert_eq!(action, FlowAction::None);

        let failed = FlowState::Failed {
            reason: FailureReason::Timeout,
        };
        let (state, _) = handle_event(failed.clone(), FlowEvent::CodeReceived);
        assert_eq!(state, failed);
    }

    #[test]
    fn unexpected_event_keeps_state() {
        let (state, action) = handle_event(FlowState::Idle, FlowEvent::CodeReceived);
        assert_eq!(state, FlowState::Idle);
        assert_eq!(action, FlowAction::None);
    }
}
