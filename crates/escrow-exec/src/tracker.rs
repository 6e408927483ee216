//! Lifecycle of write requests: `Submitting -> AwaitingConfirmation ->
//! Confirmed | Failed`. Every tracked request ends in exactly one terminal
//! outcome within the configured submission and confirmation timeouts.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use escrow_core::CallRequest;
use escrow_core::OperationId;
use escrow_core::PendingTransaction;
use escrow_core::PhaseTransitionError;
use escrow_core::RequestId;
use escrow_core::SessionError;
use escrow_core::TerminalOutcome;
use escrow_core::TrackerConfig;
use escrow_core::TxHash;
use escrow_core::TxPhase;
use tokio::sync::mpsc;
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::contracts::Receipt;
use crate::contracts::ReceiptStatus;
use crate::contracts::Signer;
use crate::gateway::CallOutcome;
use crate::gateway::PreparedWrite;
use crate::gateway::RegistryGateway;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseUpdate {
    pub request_id: RequestId,
    pub operation: OperationId,
    pub phase: TxPhase,
    pub tx_hash: Option<TxHash>,
}

struct Tracked {
    record: PendingTransaction,
    abandon: Arc<Notify>,
}

pub struct TransactionTracker {
    gateway: Arc<RegistryGateway>,
    settings: TrackerConfig,
    tracked: Mutex<HashMap<RequestId, Tracked>>,
    updates: Option<mpsc::UnboundedSender<PhaseUpdate>>,
}

impl TransactionTracker {
    pub fn new(gateway: Arc<RegistryGateway>, settings: TrackerConfig) -> Self {
        Self {
            gateway,
            settings,
            tracked: Mutex::new(HashMap::new()),
            updates: None,
        }
    }

    pub fn with_updates(mut self, updates: mpsc::UnboundedSender<PhaseUpdate>) -> Self {
        self.updates = Some(updates);
        self
    }

    pub fn gateway(&self) -> &Arc<RegistryGateway> {
        &self.gateway
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RequestId, Tracked>> {
        self.tracked.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn current_phase(&self, request_id: RequestId) -> Option<TxPhase> {
        self.lock().get(&request_id).map(|tracked| tracked.record.phase)
    }

    pub fn in_flight(&self) -> usize {
        self.lock().len()
    }

    /// Stops waiting on `request_id`. The transaction itself may still be
    /// mined. Returns false if the request is not tracked.
    pub fn abandon(&self, request_id: RequestId) -> bool {
        match self.lock().get(&request_id) {
            Some(tracked) => {
                tracked.abandon.notify_one();
                info!(%request_id, "tracking abandoned by caller");
                true
            }
            None => false,
        }
    }

    /// Dispatches a write and follows it to its terminal phase.
    pub async fn submit_and_track(&self, request: CallRequest) -> TerminalOutcome {
        let request_id = request.id;
        let operation = request.operation;
        let abandon = match self.register(request_id, operation) {
            Ok(abandon) => abandon,
            Err(error) => return duplicate(request_id, error),
        };

        let outcome = if !request.is_write() {
            let err = SessionError::invalid_arguments(
                operation.as_str(),
                "read operations are not tracked",
            );
            self.failed(request_id, None, err)
        } else {
            match self.gateway.dispatch(request).await {
                Ok(CallOutcome::Pending(prepared)) => self.follow(&prepared, &abandon).await,
                Ok(CallOutcome::Value(_)) => self.failed(
                    request_id,
                    None,
                    SessionError::invalid_arguments(operation.as_str(), "not a transaction"),
                ),
                Err(err) => self.failed(request_id, None, err),
            }
        };
        self.lock().remove(&request_id);
        outcome
    }

    /// Follows a write already prepared by the gateway.
    pub async fn track(&self, prepared: PreparedWrite) -> TerminalOutcome {
        let request_id = prepared.request().id;
        let abandon = match self.register(request_id, prepared.request().operation) {
            Ok(abandon) => abandon,
            Err(error) => return duplicate(request_id, error),
        };
        let outcome = self.follow(&prepared, &abandon).await;
        self.lock().remove(&request_id);
        outcome
    }

    /// A request id is tracked at most once at a time.
    fn register(
        &self,
        request_id: RequestId,
        operation: OperationId,
    ) -> Result<Arc<Notify>, SessionError> {
        let mut tracked = self.lock();
        if tracked.contains_key(&request_id) {
            return Err(SessionError::invalid_arguments(
                operation.as_str(),
                format!("request {request_id} is already being tracked"),
            ));
        }
        let abandon = Arc::new(Notify::new());
        tracked.insert(
            request_id,
            Tracked {
                record: PendingTransaction::submitting(request_id, operation),
                abandon: abandon.clone(),
            },
        );
        drop(tracked);
        self.publish(request_id, operation, TxPhase::Submitting, None);
        Ok(abandon)
    }

    async fn follow(&self, prepared: &PreparedWrite, abandon: &Notify) -> TerminalOutcome {
        let request_id = prepared.request().id;

        let signing = self.settings.submission_timeout();
        let submitted = tokio::select! {
            result = tokio::time::timeout(signing, prepared.submit()) => result,
            _ = abandon.notified() => return self.failed(request_id, None, abandoned(None)),
        };
        let tx_hash = match submitted {
            Ok(Ok(tx_hash)) => tx_hash,
            Ok(Err(err)) => return self.failed(request_id, None, err),
            Err(_) => {
                warn!(%request_id, "wallet returned no transaction hash in time");
                let message = format!("no transaction hash within {}ms", signing.as_millis());
                return self.failed(request_id, None, SessionError::NetworkError(message));
            }
        };
        self.advance(request_id, Some(tx_hash), |record| record.mark_broadcast(tx_hash));
        info!(%request_id, %tx_hash, "transaction broadcast; awaiting confirmation");

        let timeout = self.settings.confirmation_timeout();
        let mut last_error = None;
        let waited = tokio::select! {
            result = tokio::time::timeout(
                timeout,
                self.poll_receipt(prepared.signer(), tx_hash, &mut last_error),
            ) => result,
            _ = abandon.notified() => {
                return self.failed(request_id, Some(tx_hash), abandoned(Some(tx_hash)));
            }
        };

        match waited {
            Ok(Receipt {
                status: ReceiptStatus::Success,
                block_number,
                ..
            }) => {
                debug!(%request_id, block_number, "receipt reports success");
                self.confirmed(request_id, tx_hash)
            }
            Ok(Receipt {
                status: ReceiptStatus::Reverted { reason },
                ..
            }) => self.failed(
                request_id,
                Some(tx_hash),
                SessionError::TransactionReverted(reason),
            ),
            Err(_) => {
                let mut message = format!(
                    "no receipt for {tx_hash} within {}ms",
                    timeout.as_millis()
                );
                if let Some(last_error) = last_error {
                    message.push_str(&format!(" (last error: {last_error})"));
                }
                warn!(%request_id, %tx_hash, "confirmation timed out");
                self.failed(request_id, Some(tx_hash), SessionError::NetworkError(message))
            }
        }
    }

    async fn poll_receipt(
        &self,
        signer: &dyn Signer,
        tx_hash: TxHash,
        last_error: &mut Option<String>,
    ) -> Receipt {
        let mut interval = tokio::time::interval(self.settings.poll_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            match signer.transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) => return receipt,
                Ok(None) => {}
                Err(err) => {
                    debug!(%tx_hash, error = %err, "receipt lookup failed; retrying");
                    *last_error = Some(err.to_string());
                }
            }
        }
    }

    fn advance(
        &self,
        request_id: RequestId,
        tx_hash: Option<TxHash>,
        step: impl FnOnce(&mut PendingTransaction) -> Result<(), PhaseTransitionError>,
    ) {
        let update = {
            let mut tracked = self.lock();
            let Some(entry) = tracked.get_mut(&request_id) else {
                return;
            };
            if let Err(err) = step(&mut entry.record) {
                warn!(%request_id, error = %err, "ignored phase transition");
                return;
            }
            (entry.record.operation, entry.record.phase)
        };
        self.publish(request_id, update.0, update.1, tx_hash);
    }

    fn confirmed(&self, request_id: RequestId, tx_hash: TxHash) -> TerminalOutcome {
        self.advance(request_id, Some(tx_hash), PendingTransaction::confirm);
        info!(%request_id, %tx_hash, "transaction confirmed");
        TerminalOutcome::Confirmed {
            request_id,
            tx_hash,
        }
    }

    fn failed(
        &self,
        request_id: RequestId,
        tx_hash: Option<TxHash>,
        error: SessionError,
    ) -> TerminalOutcome {
        let recorded = error.clone();
        self.advance(request_id, tx_hash, |record| record.fail(recorded));
        warn!(%request_id, kind = error.kind().label(), %error, "transaction failed");
        TerminalOutcome::Failed {
            request_id,
            tx_hash,
            error,
        }
    }

    fn publish(
        &self,
        request_id: RequestId,
        operation: OperationId,
        phase: TxPhase,
        tx_hash: Option<TxHash>,
    ) {
        if let Some(updates) = &self.updates {
            let _ = updates.send(PhaseUpdate {
                request_id,
                operation,
                phase,
                tx_hash,
            });
        }
    }
}

/// Rejects a request whose id is already in flight without touching the
/// tracked entry or publishing updates for it.
fn duplicate(request_id: RequestId, error: SessionError) -> TerminalOutcome {
    warn!(%request_id, %error, "request id already tracked");
    TerminalOutcome::Failed {
        request_id,
        tx_hash: None,
        error,
    }
}

fn abandoned(tx_hash: Option<TxHash>) -> SessionError {
    let message = match tx_hash {
        Some(tx_hash) => format!("stopped tracking {tx_hash}; it may still be mined"),
        None => "stopped tracking before broadcast; it may still be mined".to_string(),
    };
    SessionError::NetworkError(message)
}
