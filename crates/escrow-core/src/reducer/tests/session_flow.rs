use super::*;
use pretty_assertions::assert_eq;

#[test]
fn connect_emits_effect_once_while_pending() {
    let mut state = state();

    let effects = run_user(&mut state, UserAction::ConnectWallet);
    assert_eq!(
        effects,
        vec![ConsoleEffect::Connect, ConsoleEffect::RequestFrame]
    );
    assert!(state.connecting);

    let effects = run_user(&mut state, UserAction::ConnectWallet);
    assert!(effects.is_empty());
}

#[test]
fn session_change_reports_connection() {
    let mut state = state();
    run_user(&mut state, UserAction::ConnectWallet);
    run_runtime(
        &mut state,
        RuntimeAction::SessionChanged(Session::connected(
            Address::from_low_u64(0x123),
            ContextKind::Write,
        )),
    );

    assert!(!state.connecting);
    assert_eq!(state.session.account(), Some(Address::from_low_u64(0x123)));
    assert_eq!(status_message(&state), "Wallet connected successfully!");
}

#[test]
fn connect_failure_carries_error_kind() {
    let mut state = state();
    run_user(&mut state, UserAction::ConnectWallet);
    run_runtime(
        &mut state,
        RuntimeAction::ConnectFailed(SessionError::ProviderUnavailable),
    );

    let status = state.status.clone().expect("status");
    assert!(!state.connecting);
    assert_eq!(status.level, StatusLevel::Error);
    assert_eq!(status.error_kind, Some(ErrorKind::ProviderUnavailable));
    assert_eq!(
        status.message,
        "Error connecting wallet: no wallet provider is installed"
    );
}

#[test]
fn disconnect_is_delegated_and_cleared_session_is_reported() {
    let mut state = connected_state(0x123);

    let effects = run_user(&mut state, UserAction::DisconnectWallet);
    assert_eq!(
        effects,
        vec![ConsoleEffect::Disconnect, ConsoleEffect::RequestFrame]
    );

    run_runtime(
        &mut state,
        RuntimeAction::SessionChanged(Session::disconnected()),
    );
    assert_eq!(state.session, Session::disconnected());
    assert_eq!(status_message(&state), "Wallet disconnected");
}

#[test]
fn repeated_disconnect_keeps_cleared_session() {
    let mut state = connected_state(0x123);
    run_runtime(
        &mut state,
        RuntimeAction::SessionChanged(Session::disconnected()),
    );
    let first = state.session.clone();
    run_runtime(
        &mut state,
        RuntimeAction::SessionChanged(Session::disconnected()),
    );
    assert_eq!(state.session, first);
}
