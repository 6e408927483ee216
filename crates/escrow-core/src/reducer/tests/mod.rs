use pretty_assertions::assert_eq;

pub(super) use super::build_request;
pub(super) use super::reduce;
pub(super) use super::ConsoleEffect;
pub(super) use crate::actions::ConsoleAction;
pub(super) use crate::actions::RuntimeAction;
pub(super) use crate::actions::UserAction;
pub(super) use crate::call::CallRequest;
pub(super) use crate::error::ErrorKind;
pub(super) use crate::error::SessionError;
pub(super) use crate::projection::BalanceStatus;
pub(super) use crate::projection::Projected;
pub(super) use crate::projection::TaskRecord;
pub(super) use crate::registry::OperationId;
pub(super) use crate::state::ConsoleState;
pub(super) use crate::state::ConsoleTab;
pub(super) use crate::state::ContextKind;
pub(super) use crate::state::LogBuffer;
pub(super) use crate::state::LogLevel;
pub(super) use crate::state::Session;
pub(super) use crate::state::StatusLevel;
pub(super) use crate::state::TerminalOutcome;
pub(super) use crate::state::TxPhase;
pub(super) use crate::types::Address;
pub(super) use crate::types::AmountWei;
pub(super) use crate::types::RequestId;
pub(super) use crate::types::TaskId;
pub(super) use crate::types::TxHash;

mod forms;
mod session_flow;

fn state() -> ConsoleState {
    ConsoleState::new()
}

fn connected_state(account: u64) -> ConsoleState {
    let mut state = state();
    run_runtime(
        &mut state,
        RuntimeAction::SessionChanged(Session::connected(
            Address::from_low_u64(account),
            ContextKind::Write,
        )),
    );
    state
}

fn run_user(state: &mut ConsoleState, action: UserAction) -> Vec<ConsoleEffect> {
    reduce(state, ConsoleAction::User(action))
}

fn run_runtime(state: &mut ConsoleState, action: RuntimeAction) {
    let effects = reduce(state, ConsoleAction::Runtime(action));
    assert!(effects.is_empty());
}

fn type_text(state: &mut ConsoleState, text: &str) {
    for ch in text.chars() {
        run_user(state, UserAction::Input(ch));
    }
}

/// Submits the active form and returns the dispatched request.
fn submit_expecting_dispatch(state: &mut ConsoleState) -> CallRequest {
    let effects = run_user(state, UserAction::Submit);
    match effects.as_slice() {
        [ConsoleEffect::Dispatch(request), ConsoleEffect::RequestFrame] => request.clone(),
        other => panic!("expected dispatch, got {other:?}"),
    }
}

fn status_message(state: &ConsoleState) -> &str {
    state
        .status
        .as_ref()
        .map(|status| status.message.as_str())
        .unwrap_or_default()
}

fn address_text(value: u64) -> String {
    Address::from_low_u64(value).to_string()
}

#[test]
fn new_state_starts_disconnected_on_create_task() {
    let state = state();
    assert!(!state.session.is_connected());
    assert_eq!(state.tab, ConsoleTab::CreateTask);
    assert!(state.in_flight.is_empty());
    assert!(state.status.is_none());
}
