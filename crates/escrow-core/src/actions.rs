use crate::error::SessionError;
use crate::projection::Projected;
use crate::registry::OperationId;
use crate::state::ConsoleTab;
use crate::state::LogLevel;
use crate::state::Session;
use crate::state::TerminalOutcome;
use crate::state::TxPhase;
use crate::types::RequestId;
use crate::types::TxHash;

#[derive(Debug, Clone)]
pub enum ConsoleAction {
    User(UserAction),
    Runtime(RuntimeAction),
}

#[derive(Debug, Clone)]
pub enum UserAction {
    ConnectWallet,
    DisconnectWallet,
    NextTab,
    PrevTab,
    SelectTab(ConsoleTab),
    NextField,
    PrevField,
    Input(char),
    Backspace,
    Paste(String),
    Submit,
    AbandonTracking(RequestId),
    ClearStatus,
}

/// Results fed back by the runtime that executes `ConsoleEffect`s.
#[derive(Debug, Clone)]
pub enum RuntimeAction {
    SessionChanged(Session),
    ConnectFailed(SessionError),
    PhaseChanged {
        request_id: RequestId,
        phase: TxPhase,
        tx_hash: Option<TxHash>,
    },
    WriteFinished {
        operation: OperationId,
        outcome: TerminalOutcome,
    },
    ReadFinished {
        request_id: RequestId,
        operation: OperationId,
        result: Result<Projected, SessionError>,
    },
    AppendLog {
        level: LogLevel,
        message: String,
    },
    ClearLogs,
}
