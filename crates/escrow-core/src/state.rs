use std::collections::BTreeMap;
use std::collections::VecDeque;

use serde::Serialize;

use crate::error::ErrorKind;
use crate::error::SessionError;
use crate::projection::BalanceStatus;
use crate::projection::RelationshipEntry;
use crate::projection::TaskRecord;
use crate::registry::OperationId;
use crate::types::Address;
use crate::types::RequestId;
use crate::types::TaskId;
use crate::types::TxHash;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextKind {
    /// Queries only; no signer available.
    Read,
    /// Can produce signed, broadcastable transactions.
    Write,
}

/// Wallet session. `account` is present iff `connected`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    connected: bool,
    account: Option<Address>,
    context: Option<ContextKind>,
}

impl Default for Session {
    fn default() -> Self {
        Self::disconnected()
    }
}

impl Session {
    pub fn disconnected() -> Self {
        Self {
            connected: false,
            account: None,
            context: None,
        }
    }

    pub fn connected(account: Address, context: ContextKind) -> Self {
        Self {
            connected: true,
            account: Some(account),
            context: Some(context),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn account(&self) -> Option<Address> {
        self.account
    }

    pub fn context(&self) -> Option<ContextKind> {
        self.context
    }

    pub fn can_sign(&self) -> bool {
        self.context == Some(ContextKind::Write)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TxPhase {
    Submitting,
    AwaitingConfirmation,
    Confirmed,
    Failed,
}

impl TxPhase {
    pub fn label(self) -> &'static str {
        match self {
            Self::Submitting => "Submitting",
            Self::AwaitingConfirmation => "Awaiting confirmation",
            Self::Confirmed => "Confirmed",
            Self::Failed => "Failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Confirmed | Self::Failed)
    }

    pub fn can_advance_to(self, next: TxPhase) -> bool {
        matches!(
            (self, next),
            (Self::Submitting, Self::AwaitingConfirmation)
                | (Self::Submitting, Self::Failed)
                | (Self::AwaitingConfirmation, Self::Confirmed)
                | (Self::AwaitingConfirmation, Self::Failed)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal transaction phase transition: {} -> {}", .from.label(), .to.label())]
pub struct PhaseTransitionError {
    pub from: TxPhase,
    pub to: TxPhase,
}

/// Lifecycle record of one write request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingTransaction {
    pub request_id: RequestId,
    pub operation: OperationId,
    pub submitted_hash: Option<TxHash>,
    pub phase: TxPhase,
    pub error: Option<SessionError>,
    pub submitted_at_ms: i64,
}

impl PendingTransaction {
    pub fn submitting(request_id: RequestId, operation: OperationId) -> Self {
        Self {
            request_id,
            operation,
            submitted_hash: None,
            phase: TxPhase::Submitting,
            error: None,
            submitted_at_ms: chrono::Utc::now().timestamp_millis(),
        }
    }

    fn advance(&mut self, next: TxPhase) -> Result<(), PhaseTransitionError> {
        if !self.phase.can_advance_to(next) {
            return Err(PhaseTransitionError {
                from: self.phase,
                to: next,
            });
        }
        self.phase = next;
        Ok(())
    }

    pub fn mark_broadcast(&mut self, hash: TxHash) -> Result<(), PhaseTransitionError> {
        self.advance(TxPhase::AwaitingConfirmation)?;
        self.submitted_hash = Some(hash);
        Ok(())
    }

    pub fn confirm(&mut self) -> Result<(), PhaseTransitionError> {
        self.advance(TxPhase::Confirmed)
    }

    pub fn fail(&mut self, error: SessionError) -> Result<(), PhaseTransitionError> {
        self.advance(TxPhase::Failed)?;
        self.error = Some(error);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum TerminalOutcome {
    Confirmed {
        request_id: RequestId,
        tx_hash: TxHash,
    },
    Failed {
        request_id: RequestId,
        tx_hash: Option<TxHash>,
        error: SessionError,
    },
}

impl TerminalOutcome {
    pub fn request_id(&self) -> RequestId {
        match self {
            Self::Confirmed { request_id, .. } | Self::Failed { request_id, .. } => *request_id,
        }
    }

    pub fn phase(&self) -> TxPhase {
        match self {
            Self::Confirmed { .. } => TxPhase::Confirmed,
            Self::Failed { .. } => TxPhase::Failed,
        }
    }

    pub fn tx_hash(&self) -> Option<TxHash> {
        match self {
            Self::Confirmed { tx_hash, .. } => Some(*tx_hash),
            Self::Failed { tx_hash, .. } => *tx_hash,
        }
    }

    pub fn error(&self) -> Option<&SessionError> {
        match self {
            Self::Confirmed { .. } => None,
            Self::Failed { error, .. } => Some(error),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleTab {
    CreateTask,
    ReleaseTask,
    TasksByParent,
    TasksByChild,
    TaskDetails,
    CheckBalance,
    AddChild,
    Children,
}

const TAB_ORDER: [ConsoleTab; 8] = [
    ConsoleTab::CreateTask,
    ConsoleTab::ReleaseTask,
    ConsoleTab::TasksByParent,
    ConsoleTab::TasksByChild,
    ConsoleTab::TaskDetails,
    ConsoleTab::CheckBalance,
    ConsoleTab::AddChild,
    ConsoleTab::Children,
];

impl ConsoleTab {
    pub fn all() -> &'static [ConsoleTab] {
        &TAB_ORDER
    }

    fn index(self) -> usize {
        TAB_ORDER
            .iter()
            .position(|tab| *tab == self)
            .unwrap_or_default()
    }

    pub fn next(self) -> Self {
        TAB_ORDER[(self.index() + 1) % TAB_ORDER.len()]
    }

    pub fn prev(self) -> Self {
        TAB_ORDER[(self.index() + TAB_ORDER.len() - 1) % TAB_ORDER.len()]
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::CreateTask => "Create Task",
            Self::ReleaseTask => "Release Task",
            Self::TasksByParent => "Tasks by Parent",
            Self::TasksByChild => "Tasks by Child",
            Self::TaskDetails => "Task Details",
            Self::CheckBalance => "Check Balance",
            Self::AddChild => "Add Child",
            Self::Children => "Children",
        }
    }

    pub fn operation(self) -> OperationId {
        match self {
            Self::CreateTask => OperationId::CreateTask,
            Self::ReleaseTask => OperationId::ReleaseTask,
            Self::TasksByParent => OperationId::TasksByParent,
            Self::TasksByChild => OperationId::TasksByChild,
            Self::TaskDetails => OperationId::TaskDetails,
            Self::CheckBalance => OperationId::HasSufficientBalance,
            Self::AddChild => OperationId::RegisterChild,
            Self::Children => OperationId::ListChildren,
        }
    }

    pub fn fields(self) -> &'static [FormField] {
        match self {
            Self::CreateTask => &[FormField::Address, FormField::Amount],
            Self::ReleaseTask | Self::TaskDetails | Self::CheckBalance => &[FormField::TaskId],
            Self::TasksByParent | Self::TasksByChild | Self::Children => &[FormField::Address],
            Self::AddChild => &[FormField::Address, FormField::Secret],
        }
    }

    /// Label of the address field, which changes meaning per tab.
    pub fn address_label(self) -> &'static str {
        match self {
            Self::TasksByParent => "Parent Address",
            Self::Children => "Parent Address (blank = connected account)",
            _ => "Child Address",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    Address,
    Amount,
    TaskId,
    Secret,
}

impl FormField {
    pub fn placeholder(self) -> &'static str {
        match self {
            Self::Address => "0x...",
            Self::Amount => "0.1",
            Self::TaskId => "Enter task ID",
            Self::Secret => "Enter secret",
        }
    }
}

/// Form inputs, shared between tabs like a single page of fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormState {
    pub address: String,
    pub amount: String,
    pub task_id: String,
    pub secret: String,
    pub focus: usize,
}

impl FormState {
    pub fn value(&self, field: FormField) -> &str {
        match field {
            FormField::Address => &self.address,
            FormField::Amount => &self.amount,
            FormField::TaskId => &self.task_id,
            FormField::Secret => &self.secret,
        }
    }

    pub fn value_mut(&mut self, field: FormField) -> &mut String {
        match field {
            FormField::Address => &mut self.address,
            FormField::Amount => &mut self.amount,
            FormField::TaskId => &mut self.task_id,
            FormField::Secret => &mut self.secret,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub level: StatusLevel,
    pub message: String,
    pub error_kind: Option<ErrorKind>,
}

impl StatusLine {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: StatusLevel::Info,
            message: message.into(),
            error_kind: None,
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: StatusLevel::Success,
            message: message.into(),
            error_kind: None,
        }
    }

    pub fn error(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            level: StatusLevel::Error,
            message: message.into(),
            error_kind: Some(kind),
        }
    }
}

/// Latest projected results; every read replaces its own slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsoleResults {
    pub tasks: Option<Vec<TaskId>>,
    pub task_details: Option<TaskRecord>,
    pub children: Option<Vec<RelationshipEntry>>,
    pub child_count: Option<u64>,
    pub balance: Option<BalanceStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn label(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub seq: u64,
    pub level: LogLevel,
    pub ts_ms: i64,
    pub request_id: Option<RequestId>,
    pub message: String,
}

impl LogEntry {
    pub fn new(level: LogLevel, request_id: Option<RequestId>, message: impl Into<String>) -> Self {
        Self {
            seq: 0,
            level,
            ts_ms: chrono::Utc::now().timestamp_millis(),
            request_id,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogBuffer {
    cap: usize,
    next_seq: u64,
    buf: VecDeque<LogEntry>,
}

impl LogBuffer {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            next_seq: 1,
            buf: VecDeque::with_capacity(cap),
        }
    }

    pub fn append(&mut self, mut entry: LogEntry) {
        entry.seq = self.next_seq;
        self.next_seq += 1;

        if self.buf.len() == self.cap {
            self.buf.pop_front();
        }
        self.buf.push_back(entry);
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.next_seq = 1;
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &LogEntry> {
        self.buf.iter()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// Everything a presentation layer renders.
#[derive(Debug, Clone)]
pub struct ConsoleState {
    pub session: Session,
    pub connecting: bool,
    pub tab: ConsoleTab,
    pub form: FormState,
    pub status: Option<StatusLine>,
    pub in_flight: BTreeMap<RequestId, PendingTransaction>,
    pub results: ConsoleResults,
    pub logs: LogBuffer,
}

impl Default for ConsoleState {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleState {
    pub fn new() -> Self {
        Self {
            session: Session::disconnected(),
            connecting: false,
            tab: ConsoleTab::CreateTask,
            form: FormState::default(),
            status: None,
            in_flight: BTreeMap::new(),
            results: ConsoleResults::default(),
            logs: LogBuffer::new(500),
        }
    }

    pub fn focused_field(&self) -> FormField {
        let fields = self.tab.fields();
        fields[self.form.focus.min(fields.len() - 1)]
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn session_invariant_holds_for_constructors() {
        let off = Session::disconnected();
        assert!(!off.is_connected());
        assert_eq!(off.account(), None);
        assert_eq!(off.context(), None);

        let on = Session::connected(Address::from_low_u64(0x123), ContextKind::Read);
        assert!(on.is_connected());
        assert_eq!(on.account(), Some(Address::from_low_u64(0x123)));
        assert!(!on.can_sign());
    }

    #[test]
    fn pending_transaction_walks_success_path() {
        let mut pending = PendingTransaction::submitting(RequestId(1), OperationId::CreateTask);
        pending.mark_broadcast(TxHash::from_low_u64(9)).expect("broadcast");
        assert_eq!(pending.phase, TxPhase::AwaitingConfirmation);

        pending.confirm().expect("confirm");
        assert_eq!(pending.phase, TxPhase::Confirmed);
        assert_eq!(pending.submitted_hash, Some(TxHash::from_low_u64(9)));
        assert!(pending.phase.is_terminal());
    }

    #[test]
    fn terminal_phases_reject_further_transitions() {
        let mut pending = PendingTransaction::submitting(RequestId(2), OperationId::ReleaseTask);
        pending
            .fail(SessionError::SubmissionRejected("declined".to_string()))
            .expect("fail");

        let before = pending.clone();
        let err = pending.mark_broadcast(TxHash::from_low_u64(1)).unwrap_err();
        assert_eq!(
            err,
            PhaseTransitionError {
                from: TxPhase::Failed,
                to: TxPhase::AwaitingConfirmation,
            }
        );
        assert!(pending.confirm().is_err());
        assert_eq!(pending, before);
    }

    #[test]
    fn confirm_requires_a_broadcast_first() {
        let mut pending = PendingTransaction::submitting(RequestId(3), OperationId::CreateTask);
        assert!(pending.confirm().is_err());
        assert_eq!(pending.phase, TxPhase::Submitting);
    }

    #[test]
    fn tab_cycle_wraps_both_ways() {
        assert_eq!(ConsoleTab::Children.next(), ConsoleTab::CreateTask);
        assert_eq!(ConsoleTab::CreateTask.prev(), ConsoleTab::Children);
        let mut tab = ConsoleTab::CreateTask;
        for _ in 0..ConsoleTab::all().len() {
            tab = tab.next();
        }
        assert_eq!(tab, ConsoleTab::CreateTask);
    }
}
