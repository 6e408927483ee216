use super::*;
use pretty_assertions::assert_eq;

#[test]
fn create_task_form_builds_payable_request() {
    let mut state = connected_state(0x123);
    type_text(&mut state, &address_text(0x456));
    run_user(&mut state, UserAction::NextField);
    type_text(&mut state, "0.5");

    let request = submit_expecting_dispatch(&mut state);
    assert_eq!(request.operation, OperationId::CreateTask);
    assert_eq!(
        request.value_attached,
        Some(AmountWei(500_000_000_000_000_000))
    );
    assert!(state.in_flight.contains_key(&request.id));
    assert_eq!(state.in_flight[&request.id].phase, TxPhase::Submitting);
}

#[test]
fn bad_address_stays_local() {
    let mut state = connected_state(0x123);
    type_text(&mut state, "0x123");
    run_user(&mut state, UserAction::NextField);
    type_text(&mut state, "1");

    let effects = run_user(&mut state, UserAction::Submit);
    assert_eq!(effects, vec![ConsoleEffect::RequestFrame]);
    assert!(state.in_flight.is_empty());
    let status = state.status.clone().expect("status");
    assert_eq!(status.error_kind, Some(ErrorKind::InvalidArguments));
    assert!(status.message.starts_with("Error creating task:"));
}

#[test]
fn field_focus_wraps_within_tab() {
    let mut state = state();
    assert_eq!(state.tab.fields().len(), 2);
    run_user(&mut state, UserAction::NextField);
    run_user(&mut state, UserAction::NextField);
    assert_eq!(state.form.focus, 0);
    run_user(&mut state, UserAction::PrevField);
    assert_eq!(state.form.focus, 1);

    run_user(&mut state, UserAction::SelectTab(ConsoleTab::TaskDetails));
    assert_eq!(state.form.focus, 0);
}

#[test]
fn fields_are_shared_between_tabs() {
    let mut state = state();
    run_user(&mut state, UserAction::SelectTab(ConsoleTab::ReleaseTask));
    type_text(&mut state, "42");
    run_user(&mut state, UserAction::Backspace);
    run_user(&mut state, UserAction::SelectTab(ConsoleTab::CheckBalance));

    let request = build_request(&state).expect("request");
    assert_eq!(request, CallRequest {
        id: request.id,
        ..CallRequest::has_sufficient_balance(TaskId(4))
    });
}

#[test]
fn children_defaults_to_connected_account() {
    let mut state = connected_state(0x123);
    run_user(&mut state, UserAction::SelectTab(ConsoleTab::Children));

    let request = submit_expecting_dispatch(&mut state);
    assert_eq!(request.operation, OperationId::ListChildren);
    assert_eq!(request.subject_address(), Some(Address::from_low_u64(0x123)));
}

#[test]
fn children_without_account_or_input_needs_connection() {
    let mut state = state();
    run_user(&mut state, UserAction::SelectTab(ConsoleTab::Children));

    let effects = run_user(&mut state, UserAction::Submit);
    assert_eq!(effects, vec![ConsoleEffect::RequestFrame]);
    assert_eq!(status_message(&state), "Please connect your wallet first");
}

#[test]
fn add_child_requires_secret() {
    let mut state = connected_state(0x123);
    run_user(&mut state, UserAction::SelectTab(ConsoleTab::AddChild));
    run_user(
        &mut state,
        UserAction::Paste(format!("{}\n", address_text(0x456))),
    );

    let effects = run_user(&mut state, UserAction::Submit);
    assert_eq!(effects, vec![ConsoleEffect::RequestFrame]);

    run_user(&mut state, UserAction::NextField);
    type_text(&mut state, "hunter2");
    let request = submit_expecting_dispatch(&mut state);
    assert_eq!(
        request.arguments,
        CallRequest::register_child(Address::from_low_u64(0x456), "hunter2").arguments
    );
}

#[test]
fn reads_are_dispatched_without_a_session() {
    let mut state = state();
    run_user(&mut state, UserAction::SelectTab(ConsoleTab::TasksByChild));
    type_text(&mut state, &address_text(0x456));

    let request = submit_expecting_dispatch(&mut state);
    assert!(!request.is_write());
    assert!(state.in_flight.is_empty());
}
