use std::sync::Arc;
use std::time::Duration;

use escrow_core::project;
use escrow_core::validate_request;
use escrow_core::AbiValue;
use escrow_core::CallRequest;
use escrow_core::Projected;
use escrow_core::RegistryAddresses;
use escrow_core::SessionError;
use escrow_core::TxHash;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::contracts::ContractCall;
use crate::contracts::ReadTransport;
use crate::contracts::Signer;
use crate::session::WalletSession;

pub enum CallOutcome {
    Value(AbiValue),
    Pending(PreparedWrite),
}

/// A validated write bound to the signer that was active when it was validated.
/// A later disconnect does not affect it.
pub struct PreparedWrite {
    request: Arc<CallRequest>,
    call: ContractCall,
    signer: Arc<dyn Signer>,
}

impl PreparedWrite {
    pub fn request(&self) -> &CallRequest {
        &self.request
    }

    pub fn call(&self) -> &ContractCall {
        &self.call
    }

    pub(crate) fn signer(&self) -> &dyn Signer {
        self.signer.as_ref()
    }

    /// Hands the transaction to the signer. Any failure here happened before
    /// broadcast.
    pub async fn submit(&self) -> Result<TxHash, SessionError> {
        self.signer
            .send_transaction(self.call.clone())
            .await
            .map_err(|err| err.into_submission_error())
    }
}

pub struct RegistryGateway {
    session: Arc<WalletSession>,
    transport: Arc<dyn ReadTransport>,
    registries: RegistryAddresses,
    read_timeout: Duration,
}

impl RegistryGateway {
    pub fn new(
        session: Arc<WalletSession>,
        transport: Arc<dyn ReadTransport>,
        registries: RegistryAddresses,
        read_timeout: Duration,
    ) -> Self {
        Self {
            session,
            transport,
            registries,
            read_timeout,
        }
    }

    pub fn session(&self) -> &Arc<WalletSession> {
        &self.session
    }

    pub fn registries(&self) -> RegistryAddresses {
        self.registries
    }

    /// Validates locally, then runs a read or prepares a write. Writes are
    /// not submitted here.
    pub async fn dispatch(&self, request: CallRequest) -> Result<CallOutcome, SessionError> {
        let request = Arc::new(request);
        let operation = request.operation.as_str();

        // Taken once; the signer below stays valid for this request even if
        // the session is cleared while it is in flight.
        let signer = if request.is_write() {
            match self.session.snapshot().signer() {
                Some(signer) => Some(signer),
                None => {
                    debug!(request_id = %request.id, operation, "write rejected: not connected");
                    return Err(SessionError::NotConnected);
                }
            }
        } else {
            None
        };
        validate_request(&request)?;

        let call = ContractCall::for_request(&request, &self.registries);
        match signer {
            Some(signer) => {
                info!(request_id = %request.id, operation, to = %call.to, "write prepared");
                Ok(CallOutcome::Pending(PreparedWrite {
                    request,
                    call,
                    signer,
                }))
            }
            None => self.read(&request, call).await.map(CallOutcome::Value),
        }
    }

    async fn read(&self, request: &CallRequest, call: ContractCall) -> Result<AbiValue, SessionError> {
        debug!(request_id = %request.id, function = call.function, "read");
        match tokio::time::timeout(self.read_timeout, self.transport.call(call)).await {
            Ok(result) => result.map_err(|err| err.into_read_error()),
            Err(_) => {
                warn!(
                    request_id = %request.id,
                    timeout_ms = self.read_timeout.as_millis() as u64,
                    "read timed out"
                );
                Err(SessionError::NetworkError(format!(
                    "read timed out after {}ms",
                    self.read_timeout.as_millis()
                )))
            }
        }
    }

    /// Dispatches a read and projects the raw response.
    pub async fn read_projected(&self, request: CallRequest) -> Result<Projected, SessionError> {
        let operation = request.operation;
        let subject = request.subject_address();
        match self.dispatch(request).await? {
            CallOutcome::Value(raw) => project(operation, subject, &raw),
            CallOutcome::Pending(_) => Err(SessionError::invalid_arguments(
                operation.as_str(),
                "write operations resolve through the transaction tracker",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use escrow_core::AbiValue;
    use escrow_core::Address;
    use escrow_core::AmountWei;
    use escrow_core::BalanceStatus;
    use escrow_core::ErrorKind;
    use escrow_core::OperationId;
    use escrow_core::TaskId;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::simulated::SimulatedChain;
    use crate::simulated::SimulatedWallet;

    struct Fixture {
        chain: SimulatedChain,
        session: Arc<WalletSession>,
        gateway: RegistryGateway,
    }

    fn fixture() -> Fixture {
        let chain = SimulatedChain::default();
        let wallet = SimulatedWallet::new(chain.clone(), Address::from_low_u64(0x123));
        let session = Arc::new(WalletSession::new(Arc::new(wallet)));
        let gateway = RegistryGateway::new(
            session.clone(),
            Arc::new(chain.clone()),
            chain.registries(),
            Duration::from_secs(30),
        );
        Fixture {
            chain,
            session,
            gateway,
        }
    }

    fn expect_err(outcome: Result<CallOutcome, SessionError>) -> SessionError {
        match outcome {
            Ok(_) => panic!("expected dispatch to fail"),
            Err(err) => err,
        }
    }

    #[tokio::test]
    async fn reads_succeed_without_session() {
        let fx = fixture();
        let outcome = fx
            .gateway
            .dispatch(CallRequest::tasks_by_child(Address::from_low_u64(0x456)))
            .await
            .expect("read");
        assert!(matches!(outcome, CallOutcome::Value(AbiValue::Array(ref ids)) if ids.is_empty()));
        assert_eq!(fx.chain.read_calls(), 1);
    }

    #[tokio::test]
    async fn writes_without_session_fail_locally() {
        let fx = fixture();
        let err = expect_err(fx.gateway.dispatch(CallRequest::release_task(TaskId(1))).await);
        assert_eq!(err, SessionError::NotConnected);
        assert_eq!(fx.chain.network_calls(), 0);
    }

    #[tokio::test]
    async fn arity_mismatch_fails_without_network() {
        let fx = fixture();
        fx.session.connect().await.expect("connect");

        let read = CallRequest::new(OperationId::TaskDetails, Vec::new());
        let err = expect_err(fx.gateway.dispatch(read).await);
        assert_eq!(err.kind(), ErrorKind::InvalidArguments);

        let write = CallRequest::new(
            OperationId::ReleaseTask,
            vec![TaskId(1).into(), TaskId(2).into()],
        );
        let err = expect_err(fx.gateway.dispatch(write).await);
        assert_eq!(err.kind(), ErrorKind::InvalidArguments);

        assert_eq!(fx.chain.network_calls(), 0);
    }

    #[tokio::test]
    async fn write_dispatch_prepares_without_submitting() {
        let fx = fixture();
        fx.session.connect().await.expect("connect");

        let outcome = fx
            .gateway
            .dispatch(CallRequest::create_task(Address::from_low_u64(0x456), AmountWei(10)))
            .await
            .expect("dispatch");
        let CallOutcome::Pending(prepared) = outcome else {
            panic!("expected pending write");
        };
        assert_eq!(prepared.call().function, "createTask");
        assert_eq!(prepared.call().value, Some(AmountWei(10)));
        assert_eq!(fx.chain.submissions(), 0);
    }

    #[tokio::test]
    async fn prepared_write_survives_disconnect() {
        let fx = fixture();
        fx.session.connect().await.expect("connect");
        let outcome = fx
            .gateway
            .dispatch(CallRequest::create_task(Address::from_low_u64(0x456), AmountWei(10)))
            .await
            .expect("dispatch");
        let CallOutcome::Pending(prepared) = outcome else {
            panic!("expected pending write");
        };

        fx.session.disconnect();
        assert!(prepared.submit().await.is_ok());

        let err = expect_err(fx.gateway.dispatch(CallRequest::release_task(TaskId(1))).await);
        assert_eq!(err, SessionError::NotConnected);
    }

    #[tokio::test]
    async fn registry_revert_is_reported_for_reads() {
        let fx = fixture();
        let err = fx
            .gateway
            .read_projected(CallRequest::task_details(TaskId(999)))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            SessionError::RegistryReverted("task does not exist".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_read_times_out_as_network_error() {
        let fx = fixture();
        fx.chain.stall_reads(true);
        let err = fx
            .gateway
            .read_projected(CallRequest::has_sufficient_balance(TaskId(1)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NetworkError);
        assert_eq!(err.to_string(), "network error: read timed out after 30000ms");
    }

    #[tokio::test]
    async fn read_projected_maps_balance() {
        let fx = fixture();
        fx.session.connect().await.expect("connect");
        let CallOutcome::Pending(prepared) = fx
            .gateway
            .dispatch(CallRequest::create_task(Address::from_low_u64(0x456), AmountWei(10)))
            .await
            .expect("dispatch")
        else {
            panic!("expected pending write");
        };
        prepared.submit().await.expect("submit");

        let balance = fx
            .gateway
            .read_projected(CallRequest::has_sufficient_balance(TaskId(1)))
            .await
            .expect("read");
        assert_eq!(balance, Projected::Balance(BalanceStatus::Sufficient));
    }
}
