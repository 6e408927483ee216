use std::sync::Arc;

use escrow_core::ContextKind;
use escrow_core::Session;
use escrow_core::SessionError;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;
use tracing::warn;

use crate::contracts::AccountEvent;
use crate::contracts::ProviderError;
use crate::contracts::Signer;
use crate::contracts::WalletProvider;

/// Session together with the signer captured at connect time. Both change in
/// one `send_replace`, so a reader never sees one without the other.
#[derive(Clone)]
pub struct SessionSnapshot {
    pub session: Session,
    signer: Option<Arc<dyn Signer>>,
}

impl SessionSnapshot {
    fn cleared() -> Self {
        Self {
            session: Session::disconnected(),
            signer: None,
        }
    }

    /// Present only for a connected session with a write context.
    pub fn signer(&self) -> Option<Arc<dyn Signer>> {
        if self.session.can_sign() {
            self.signer.clone()
        } else {
            None
        }
    }
}

pub struct WalletSession {
    provider: Arc<dyn WalletProvider>,
    state: watch::Sender<SessionSnapshot>,
}

impl WalletSession {
    pub fn new(provider: Arc<dyn WalletProvider>) -> Self {
        let (state, _) = watch::channel(SessionSnapshot::cleared());
        Self { provider, state }
    }

    pub async fn connect(&self) -> Result<Session, SessionError> {
        let accounts = self
            .provider
            .request_accounts()
            .await
            .map_err(ProviderError::into_connect_error)?;
        let Some(account) = accounts.first().copied() else {
            return Err(SessionError::ConnectionError(
                "provider returned no accounts".to_string(),
            ));
        };
        let signer = self
            .provider
            .signer()
            .await
            .map_err(ProviderError::into_connect_error)?;

        let context = if signer.is_some() {
            ContextKind::Write
        } else {
            ContextKind::Read
        };
        let session = Session::connected(account, context);
        self.state.send_replace(SessionSnapshot {
            session: session.clone(),
            signer,
        });
        info!(%account, ?context, "wallet connected");
        Ok(session)
    }

    /// Always leaves the session cleared, whatever it was before.
    pub fn disconnect(&self) {
        let previous = self.state.send_replace(SessionSnapshot::cleared());
        if let Some(account) = previous.session.account() {
            info!(%account, "wallet disconnected");
        }
    }

    pub fn current_session(&self) -> Session {
        self.state.borrow().session.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    /// Clears the session whenever the provider reports an account change or
    /// a disconnect. `None` if the provider has no notifications.
    pub fn watch_account_changes(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let mut events = self.provider.account_events()?;
        let session = Arc::downgrade(self);
        Some(tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "account notifications lagged");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                let Some(session) = session.upgrade() else {
                    break;
                };
                match event {
                    AccountEvent::Changed(account) => {
                        info!(%account, "provider switched account; session cleared");
                    }
                    AccountEvent::Disconnected => info!("provider disconnected"),
                }
                session.disconnect();
            }
        }))
    }
}
