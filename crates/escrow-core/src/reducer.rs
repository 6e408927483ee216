use crate::actions::ConsoleAction;
use crate::actions::RuntimeAction;
use crate::actions::UserAction;
use crate::call::CallRequest;
use crate::error::SessionError;
use crate::projection::Projected;
use crate::registry::OperationId;
use crate::registry::OperationRegistry;
use crate::state::ConsoleState;
use crate::state::ConsoleTab;
use crate::state::LogEntry;
use crate::state::LogLevel;
use crate::state::PendingTransaction;
use crate::state::StatusLine;
use crate::state::TerminalOutcome;
use crate::state::TxPhase;
use crate::types::Address;
use crate::types::AmountWei;
use crate::types::RequestId;
use crate::types::TaskId;
use crate::types::TxHash;

/// Work the reducer asks its host to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleEffect {
    Connect,
    Disconnect,
    Dispatch(CallRequest),
    Abandon(RequestId),
    RequestFrame,
}

pub fn reduce(state: &mut ConsoleState, action: ConsoleAction) -> Vec<ConsoleEffect> {
    match action {
        ConsoleAction::User(user) => reduce_user(state, user),
        ConsoleAction::Runtime(runtime) => {
            reduce_runtime(state, runtime);
            Vec::new()
        }
    }
}

fn reduce_user(state: &mut ConsoleState, action: UserAction) -> Vec<ConsoleEffect> {
    match action {
        UserAction::ConnectWallet => {
            if state.session.is_connected() || state.connecting {
                return Vec::new();
            }
            state.connecting = true;
            state.status = Some(StatusLine::info("Connecting wallet..."));
            vec![ConsoleEffect::Connect, ConsoleEffect::RequestFrame]
        }
        UserAction::DisconnectWallet => vec![ConsoleEffect::Disconnect, ConsoleEffect::RequestFrame],
        UserAction::NextTab => {
            let tab = state.tab.next();
            select_tab(state, tab)
        }
        UserAction::PrevTab => {
            let tab = state.tab.prev();
            select_tab(state, tab)
        }
        UserAction::SelectTab(tab) => select_tab(state, tab),
        UserAction::NextField => {
            let count = state.tab.fields().len();
            state.form.focus = (state.form.focus + 1) % count;
            vec![ConsoleEffect::RequestFrame]
        }
        UserAction::PrevField => {
            let count = state.tab.fields().len();
            state.form.focus = (state.form.focus + count - 1) % count;
            vec![ConsoleEffect::RequestFrame]
        }
        UserAction::Input(ch) => {
            let field = state.focused_field();
            state.form.value_mut(field).push(ch);
            vec![ConsoleEffect::RequestFrame]
        }
        UserAction::Backspace => {
            let field = state.focused_field();
            state.form.value_mut(field).pop();
            vec![ConsoleEffect::RequestFrame]
        }
        UserAction::Paste(text) => {
            let field = state.focused_field();
            state.form.value_mut(field).push_str(text.trim());
            vec![ConsoleEffect::RequestFrame]
        }
        UserAction::Submit => submit(state),
        UserAction::AbandonTracking(request_id) => {
            if !state.in_flight.contains_key(&request_id) {
                return Vec::new();
            }
            append_log(
                state,
                LogLevel::Warn,
                Some(request_id),
                "abandoning confirmation tracking",
            );
            vec![ConsoleEffect::Abandon(request_id), ConsoleEffect::RequestFrame]
        }
        UserAction::ClearStatus => {
            state.status = None;
            vec![ConsoleEffect::RequestFrame]
        }
    }
}

fn select_tab(state: &mut ConsoleState, tab: ConsoleTab) -> Vec<ConsoleEffect> {
    state.tab = tab;
    state.form.focus = 0;
    vec![ConsoleEffect::RequestFrame]
}

fn submit(state: &mut ConsoleState) -> Vec<ConsoleEffect> {
    let operation = state.tab.operation();
    let request = match build_request(state) {
        Ok(request) => request,
        Err(err) => {
            append_log(state, LogLevel::Warn, None, format!("{}: {err}", operation.as_str()));
            state.status = Some(error_status(operation, &err));
            return vec![ConsoleEffect::RequestFrame];
        }
    };

    let title = OperationRegistry::get(operation).title;
    if request.is_write() {
        state.in_flight.insert(
            request.id,
            PendingTransaction::submitting(request.id, operation),
        );
        state.status = Some(StatusLine::info(format!("Submitting: {title}...")));
    } else {
        state.status = Some(StatusLine::info(format!("Querying: {title}...")));
    }
    append_log(
        state,
        LogLevel::Info,
        Some(request.id),
        format!("dispatch {} ({})", operation.as_str(), request.mode.label()),
    );
    vec![ConsoleEffect::Dispatch(request), ConsoleEffect::RequestFrame]
}

fn parse_address(operation: OperationId, input: &str) -> Result<Address, SessionError> {
    input
        .parse()
        .map_err(|err| SessionError::invalid_arguments(operation.as_str(), format!("{err}")))
}

fn parse_task_id(operation: OperationId, input: &str) -> Result<TaskId, SessionError> {
    input
        .parse()
        .map_err(|err| SessionError::invalid_arguments(operation.as_str(), format!("{err}")))
}

/// Turns the form of the active tab into a request; parse failures never leave the reducer.
pub fn build_request(state: &ConsoleState) -> Result<CallRequest, SessionError> {
    let operation = state.tab.operation();
    let form = &state.form;
    let request = match state.tab {
        ConsoleTab::CreateTask => {
            let child = parse_address(operation, &form.address)?;
            let amount = AmountWei::parse_ether(&form.amount).map_err(|err| {
                SessionError::invalid_arguments(operation.as_str(), format!("{err}"))
            })?;
            CallRequest::create_task(child, amount)
        }
        ConsoleTab::ReleaseTask => CallRequest::release_task(parse_task_id(operation, &form.task_id)?),
        ConsoleTab::TasksByParent => {
            CallRequest::tasks_by_parent(parse_address(operation, &form.address)?)
        }
        ConsoleTab::TasksByChild => {
            CallRequest::tasks_by_child(parse_address(operation, &form.address)?)
        }
        ConsoleTab::TaskDetails => CallRequest::task_details(parse_task_id(operation, &form.task_id)?),
        ConsoleTab::CheckBalance => {
            CallRequest::has_sufficient_balance(parse_task_id(operation, &form.task_id)?)
        }
        ConsoleTab::AddChild => {
            let child = parse_address(operation, &form.address)?;
            if form.secret.trim().is_empty() {
                return Err(SessionError::invalid_arguments(
                    operation.as_str(),
                    "secret must not be empty",
                ));
            }
            CallRequest::register_child(child, form.secret.trim())
        }
        ConsoleTab::Children => {
            let parent = if form.address.trim().is_empty() {
                state.session.account().ok_or(SessionError::NotConnected)?
            } else {
                parse_address(operation, &form.address)?
            };
            CallRequest::list_children(parent)
        }
    };
    Ok(request)
}

fn reduce_runtime(state: &mut ConsoleState, action: RuntimeAction) {
    match action {
        RuntimeAction::SessionChanged(session) => {
            state.connecting = false;
            let was_connected = state.session.is_connected();
            let previous_account = state.session.account();
            state.session = session;
            match (was_connected, state.session.account()) {
                (_, Some(account)) if previous_account != Some(account) => {
                    state.status = Some(StatusLine::success("Wallet connected successfully!"));
                    append_log(state, LogLevel::Info, None, format!("connected as {account}"));
                }
                (true, None) => {
                    state.status = Some(StatusLine::info("Wallet disconnected"));
                    append_log(state, LogLevel::Info, None, "session cleared");
                }
                _ => {}
            }
        }
        RuntimeAction::ConnectFailed(err) => {
            state.connecting = false;
            state.status = Some(StatusLine::error(
                format!("Error connecting wallet: {err}"),
                err.kind(),
            ));
            append_log(state, LogLevel::Error, None, format!("connect failed: {err}"));
        }
        RuntimeAction::PhaseChanged {
            request_id,
            phase,
            tx_hash,
        } => record_phase(state, request_id, phase, tx_hash),
        RuntimeAction::WriteFinished { operation, outcome } => finish_write(state, operation, outcome),
        RuntimeAction::ReadFinished {
            request_id,
            operation,
            result,
        } => finish_read(state, request_id, operation, result),
        RuntimeAction::AppendLog { level, message } => append_log(state, level, None, message),
        RuntimeAction::ClearLogs => state.logs.clear(),
    }
}

fn record_phase(
    state: &mut ConsoleState,
    request_id: RequestId,
    phase: TxPhase,
    tx_hash: Option<TxHash>,
) {
    // Terminal phases arrive through WriteFinished.
    if phase != TxPhase::AwaitingConfirmation {
        return;
    }
    let Some(pending) = state.in_flight.get_mut(&request_id) else {
        return;
    };
    let Some(hash) = tx_hash else {
        return;
    };
    match pending.mark_broadcast(hash) {
        Ok(()) => {
            state.status = Some(StatusLine::info(format!(
                "Transaction {hash} sent, awaiting confirmation..."
            )));
            append_log(state, LogLevel::Info, Some(request_id), format!("broadcast {hash}"));
        }
        Err(err) => append_log(state, LogLevel::Warn, Some(request_id), err.to_string()),
    }
}

fn success_message(operation: OperationId, hash: TxHash) -> String {
    match operation {
        OperationId::RegisterChild => format!("Child added successfully! Transaction hash: {hash}"),
        OperationId::CreateTask => format!("Task created successfully! Transaction hash: {hash}"),
        OperationId::ReleaseTask => format!("Task released successfully! Transaction hash: {hash}"),
        other => format!("{} confirmed. Transaction hash: {hash}", other.as_str()),
    }
}

fn error_status(operation: OperationId, err: &SessionError) -> StatusLine {
    let message = match err {
        SessionError::NotConnected => "Please connect your wallet first".to_string(),
        other => format!("Error {}: {other}", OperationRegistry::get(operation).title),
    };
    StatusLine::error(message, err.kind())
}

fn finish_write(state: &mut ConsoleState, operation: OperationId, outcome: TerminalOutcome) {
    let request_id = outcome.request_id();
    state.in_flight.remove(&request_id);
    match &outcome {
        TerminalOutcome::Confirmed { tx_hash, .. } => {
            state.status = Some(StatusLine::success(success_message(operation, *tx_hash)));
            append_log(state, LogLevel::Info, Some(request_id), format!("confirmed {tx_hash}"));
        }
        TerminalOutcome::Failed { error, .. } => {
            state.status = Some(error_status(operation, error));
            append_log(
                state,
                LogLevel::Error,
                Some(request_id),
                format!("failed ({}): {error}", error.kind().label()),
            );
        }
    }
}

fn clear_result_slot(state: &mut ConsoleState, operation: OperationId) {
    let results = &mut state.results;
    match operation {
        OperationId::TasksByParent | OperationId::TasksByChild => results.tasks = None,
        OperationId::TaskDetails => results.task_details = None,
        OperationId::HasSufficientBalance => results.balance = None,
        OperationId::ListChildren => results.children = None,
        OperationId::CountChildren => results.child_count = None,
        OperationId::RegisterChild | OperationId::CreateTask | OperationId::ReleaseTask => {}
    }
}

fn finish_read(
    state: &mut ConsoleState,
    request_id: RequestId,
    operation: OperationId,
    result: Result<Projected, SessionError>,
) {
    let projected = match result {
        Ok(projected) => projected,
        Err(err) => {
            clear_result_slot(state, operation);
            state.status = Some(error_status(operation, &err));
            append_log(
                state,
                LogLevel::Error,
                Some(request_id),
                format!("read failed ({}): {err}", err.kind().label()),
            );
            return;
        }
    };

    let message = match projected {
        Projected::TaskIds(ids) => {
            state.results.tasks = Some(ids);
            "Tasks retrieved successfully!".to_string()
        }
        Projected::Task(record) => {
            state.results.task_details = Some(record);
            "Task details retrieved successfully!".to_string()
        }
        Projected::Balance(balance) => {
            state.results.balance = Some(balance);
            "Balance check completed!".to_string()
        }
        Projected::Children(children) => {
            let message = if children.is_empty() {
                "No children found for this address"
            } else {
                "Children retrieved successfully!"
            };
            state.results.children = Some(children);
            message.to_string()
        }
        Projected::ChildCount(count) => {
            state.results.child_count = Some(count);
            format!("Child count: {count}")
        }
        Projected::Unit => format!("{} completed", operation.as_str()),
    };
    state.status = Some(StatusLine::success(message));
    append_log(state, LogLevel::Debug, Some(request_id), format!("{} ok", operation.as_str()));
}

fn append_log(
    state: &mut ConsoleState,
    level: LogLevel,
    request_id: Option<RequestId>,
    message: impl Into<String>,
) {
    state.logs.append(LogEntry::new(level, request_id, message));
}

#[cfg(test)]
mod tests;
