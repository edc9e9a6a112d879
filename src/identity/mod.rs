mod provider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::Config;

pub use self::provider::DeviceAccountProvider;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub uid: String,
    pub display_name: String,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Identity provider is not configured")]
    ProviderUnavailable,

    #[error("Identity provider rejected the request: {0}")]
    ProviderError(String),
}

/// An external identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in(&self) -> Result<Identity, IdentityError>;

    async fn sign_out(&self) -> Result<(), IdentityError>;

    /// Identity changes pushed by the provider. Dropping the receiver
    /// unsubscribes.
    fn subscribe(&self) -> watch::Receiver<Option<Identity>>;
}

#[derive(Clone)]
pub enum IdentityClient {
    Configured(Arc<dyn IdentityProvider>),
    Unconfigured,
}

impl IdentityClient {
    /// Uses the `[identity]` section when present.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        match &config.identity {
            Some(account) => {
                let provider = DeviceAccountProvider::from_config(account)?;
                Ok(IdentityClient::Configured(Arc::new(provider)))
            }
            None => {
                tracing::warn!("No identity provider configured; sign-in is unavailable");
                Ok(IdentityClient::Unconfigured)
            }
        }
    }

    fn provider(&self) -> Result<&Arc<dyn IdentityProvider>, IdentityError> {
        match self {
            IdentityClient::Configured(provider) => Ok(provider),
            IdentityClient::Unconfigured => Err(IdentityError::ProviderUnavailable),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionState {
    pub identity: Option<Identity>,
    pub loading: bool,
    /// Set once the initial identity has been resolved.
    #[serde(skip)]
    pub resolved: bool,
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            identity: None,
            loading: true,
            resolved: false,
        }
    }
}

/// The signed-in user on this device and the sign-in/out lifecycle.
///
/// Constructed once with [`IdentitySession::start`], shared by `Arc`, and torn
/// down with [`IdentitySession::shutdown`], which deregisters the provider
/// listener.
pub struct IdentitySession {
    client: IdentityClient,
    state: Arc<watch::Sender<SessionState>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl IdentitySession {
    /// Registers the provider listener. Must be called inside a Tokio runtime.
    pub fn start(client: IdentityClient) -> Arc<Self> {
        let (state, _) = watch::channel(SessionState::default());
        let state = Arc::new(state);

        let listener = match &client {
            IdentityClient::Configured(provider) => {
                let mut changes = provider.subscribe();
                let state = state.clone();
                Some(tokio::spawn(async move {
                    loop {
                        let identity = changes.borrow_and_update().clone();
                        tracing::debug!(
                            "Identity changed: {:?}",
                            identity.as_ref().map(|i| &i.uid)
                        );
                        state.send_modify(|s| {
                            s.identity = identity;
                            s.loading = false;
                            s.resolved = true;
                        });
                        if changes.changed().await.is_err() {
                            break;
                        }
                    }
                }))
            }
            IdentityClient::Unconfigured => {
                // Nothing will ever push an identity
                state.send_modify(|s| {
                    s.loading = false;
                    s.resolved = true;
                });
                None
            }
        };

        Arc::new(Self {
            client,
            state,
            listener: Mutex::new(listener),
        })
    }

    /// Waits for the initial identity resolution.
    pub async fn ready(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|s| s.resolved).await;
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn current_user_id(&self) -> Option<String> {
        self.state.borrow().identity.as_ref().map(|i| i.uid.clone())
    }

    pub async fn sign_in(&self) -> Result<Identity, IdentityError> {
        let provider = self.client.provider()?;

        self.set_loading(true);
        let result = provider.sign_in().await;
        match &result {
            Ok(identity) => {
                tracing::info!("Signed in as {}", identity.uid);
                let identity = identity.clone();
                self.state.send_modify(|s| s.identity = Some(identity));
            }
            Err(e) => tracing::error!("Sign in error: {}", e),
        }
        self.set_loading(false);

        result
    }

    pub async fn sign_out(&self) -> Result<(), IdentityError> {
        let provider = self.client.provider()?;

        self.set_loading(true);
        let result = provider.sign_out().await;
        match &result {
            Ok(()) => {
                tracing::info!("Signed out");
                self.state.send_modify(|s| s.identity = None);
            }
            Err(e) => tracing::error!("Sign out error: {}", e),
        }
        self.set_loading(false);

        result
    }

    /// Deregisters the provider listener. Later provider pushes are ignored.
    pub fn shutdown(&self) {
        if let Ok(mut listener) = self.listener.lock() {
            if let Some(handle) = listener.take() {
                handle.abort();
                tracing::info!("Identity listener deregistered");
            }
        }
    }

    fn set_loading(&self, loading: bool) {
        self.state.send_modify(|s| s.loading = loading);
    }
}

impl Drop for IdentitySession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IdentityConfig;
    use std::time::Duration;

    fn account(disabled: bool) -> IdentityConfig {
        IdentityConfig {
            uid: "u-jordan".to_string(),
            display_name: "Jordan Lee".to_string(),
            email: Some("jordan@example.com".to_string()),
            avatar_url: None,
            disabled,
        }
    }

    fn provider(disabled: bool) -> Arc<DeviceAccountProvider> {
        Arc::new(DeviceAccountProvider::from_config(&account(disabled)).unwrap())
    }

    #[tokio::test]
    async fn test_session_resolves_signed_out() {
        let session = IdentitySession::start(IdentityClient::Configured(provider(false)));
        session.ready().await;

        let state = session.snapshot();
        assert!(!state.loading);
        assert!(!state.is_authenticated());
        assert_eq!(session.current_user_id(), None);
    }

    #[tokio::test]
    async fn test_sign_in_and_out() {
        let session = IdentitySession::start(IdentityClient::Configured(provider(false)));
        session.ready().await;

        let identity = session.sign_in().await.unwrap();
        assert_eq!(identity.uid, "u-jordan");
        let state = session.snapshot();
        assert!(state.is_authenticated());
        assert!(!state.loading);

        session.sign_out().await.unwrap();
        let state = session.snapshot();
        assert!(!state.is_authenticated());
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn test_provider_rejection_propagates_and_clears_loading() {
        let session = IdentitySession::start(IdentityClient::Configured(provider(true)));
        session.ready().await;

        let err = session.sign_in().await.unwrap_err();
        assert!(matches!(err, IdentityError::ProviderError(_)));
        assert!(!session.snapshot().loading);
        assert!(!session.snapshot().is_authenticated());
    }

    #[tokio::test]
    async fn test_unconfigured_provider_is_unavailable() {
        let session = IdentitySession::start(IdentityClient::Unconfigured);
        session.ready().await;
        assert!(!session.snapshot().loading);

        assert!(matches!(
            session.sign_in().await,
            Err(IdentityError::ProviderUnavailable)
        ));
        assert!(matches!(
            session.sign_out().await,
            Err(IdentityError::ProviderUnavailable)
        ));
    }

    #[tokio::test]
    async fn test_session_follows_provider_pushes() {
        let provider = provider(false);
        let session = IdentitySession::start(IdentityClient::Configured(provider.clone()));
        session.ready().await;

        // Signed in elsewhere
        provider.sign_in().await.unwrap();

        let mut rx = session.watch();
        let state = tokio::time::timeout(
            Duration::from_secs(1),
            rx.wait_for(|s| s.identity.is_some()),
        )
        .await
        .unwrap()
        .unwrap()
        .clone();
        assert_eq!(state.identity.unwrap().display_name, "Jordan Lee");
    }

    #[tokio::test]
    async fn test_shutdown_deregisters_listener() {
        let provider = provider(false);
        let session = IdentitySession::start(IdentityClient::Configured(provider.clone()));
        session.ready().await;

        session.shutdown();
        provider.sign_in().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(!session.snapshot().is_authenticated());
    }

    #[test]
    fn client_from_config_checks_presence() {
        let mut config = Config::default();
        assert!(matches!(
            IdentityClient::from_config(&config).unwrap(),
            IdentityClient::Unconfigured
        ));

        config.identity = Some(account(false));
        assert!(matches!(
            IdentityClient::from_config(&config).unwrap(),
            IdentityClient::Configured(_)
        ));
    }
}
