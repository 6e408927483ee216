use std::sync::Arc;

use escrow_core::Address;
use escrow_core::Config;
use escrow_core::ConsoleEffect;
use escrow_core::RuntimeAction;
use escrow_exec::PhaseUpdate;
use escrow_exec::RegistryGateway;
use escrow_exec::SimulatedChain;
use escrow_exec::SimulatedWallet;
use escrow_exec::TransactionTracker;
use escrow_exec::WalletSession;
use tokio::sync::mpsc;

/// Account the simulated wallet hands out on connect.
pub const DEMO_ACCOUNT: u64 = 0x123;

/// Session, gateway and tracker wired against one in-memory chain.
pub struct Services {
    pub chain: SimulatedChain,
    pub wallet: Arc<SimulatedWallet>,
    pub session: Arc<WalletSession>,
    pub tracker: Arc<TransactionTracker>,
}

impl Services {
    pub fn simulated(config: &Config, updates: mpsc::UnboundedSender<PhaseUpdate>) -> Self {
        let chain = SimulatedChain::new(config.registries);
        let wallet = Arc::new(SimulatedWallet::new(
            chain.clone(),
            Address::from_low_u64(DEMO_ACCOUNT),
        ));
        let session = Arc::new(WalletSession::new(wallet.clone()));
        let gateway = Arc::new(RegistryGateway::new(
            session.clone(),
            Arc::new(chain.clone()),
            config.registries,
            config.tracker.read_timeout(),
        ));
        let tracker =
            Arc::new(TransactionTracker::new(gateway, config.tracker).with_updates(updates));
        Self {
            chain,
            wallet,
            session,
            tracker,
        }
    }

    pub fn gateway(&self) -> &Arc<RegistryGateway> {
        self.tracker.gateway()
    }

    /// Performs one reducer effect and returns the action that reports its result.
    pub async fn execute(&self, effect: ConsoleEffect) -> Option<RuntimeAction> {
        match effect {
            ConsoleEffect::Connect => Some(match self.session.connect().await {
                Ok(session) => RuntimeAction::SessionChanged(session),
                Err(err) => RuntimeAction::ConnectFailed(err),
            }),
            ConsoleEffect::Disconnect => {
                self.session.disconnect();
                Some(RuntimeAction::SessionChanged(self.session.current_session()))
            }
            ConsoleEffect::Dispatch(request) if request.is_write() => {
                let operation = request.operation;
                let outcome = self.tracker.submit_and_track(request).await;
                Some(RuntimeAction::WriteFinished { operation, outcome })
            }
            ConsoleEffect::Dispatch(request) => {
                let request_id = request.id;
                let operation = request.operation;
                let result = self.gateway().read_projected(request).await;
                Some(RuntimeAction::ReadFinished {
                    request_id,
                    operation,
                    result,
                })
            }
            ConsoleEffect::Abandon(request_id) => {
                self.tracker.abandon(request_id);
                None
            }
            ConsoleEffect::RequestFrame => None,
        }
    }
}

pub fn phase_action(update: PhaseUpdate) -> RuntimeAction {
    RuntimeAction::PhaseChanged {
        request_id: update.request_id,
        phase: update.phase,
        tx_hash: update.tx_hash,
    }
}
