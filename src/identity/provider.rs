use async_trait::async_trait;
use tokio::sync::watch;

use super::{Identity, IdentityError, IdentityProvider};
use crate::config::IdentityConfig;

/// Provider for the single account configured on this device.
///
/// Sign-in hands out the configured identity and pushes it to subscribers;
/// sign-out pushes `None`. A `disabled` account is rejected the way a hosted
/// provider rejects a cancelled or blocked sign-in.
pub struct DeviceAccountProvider {
    account: Identity,
    disabled: bool,
    current: watch::Sender<Option<Identity>>,
}

impl DeviceAccountProvider {
    pub fn from_config(config: &IdentityConfig) -> anyhow::Result<Self> {
        if config.uid.trim().is_empty() {
            anyhow::bail!("identity.uid must not be empty");
        }
        if let Some(avatar) = &config.avatar_url {
            // Relative locators are served by us; anything else must be a URL
            if !avatar.starts_with('/') {
                url::Url::parse(avatar)
                    .map_err(|e| anyhow::anyhow!("identity.avatar_url is invalid: {}", e))?;
            }
        }

        let (current, _) = watch::channel(None);
        Ok(Self {
            account: Identity {
                uid: config.uid.clone(),
                display_name: config.display_name.clone(),
                email: config.email.clone(),
                avatar_url: config.avatar_url.clone(),
            },
            disabled: config.disabled,
            current,
        })
    }
}

#[async_trait]
impl IdentityProvider for DeviceAccountProvider {
    async fn sign_in(&self) -> Result<Identity, IdentityError> {
        if self.disabled {
            return Err(IdentityError::ProviderError(format!(
                "account {} is disabled",
                self.account.uid
            )));
        }
        self.current.send_replace(Some(self.account.clone()));
        Ok(self.account.clone())
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        self.current.send_replace(None);
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.current.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> IdentityConfig {
        IdentityConfig {
            uid: "u-ava".to_string(),
            display_name: "Ava Chen".to_string(),
            email: None,
            avatar_url: Some("https://cdn.example.com/ava.png".to_string()),
            disabled: false,
        }
    }

    #[test]
    fn rejects_blank_uid() {
        let mut cfg = config();
        cfg.uid = "  ".to_string();
        assert!(DeviceAccountProvider::from_config(&cfg).is_err());
    }

    #[test]
    fn rejects_malformed_avatar_url() {
        let mut cfg = config();
        cfg.avatar_url = Some("not a url".to_string());
        assert!(DeviceAccountProvider::from_config(&cfg).is_err());

        cfg.avatar_url = Some("/portrait-avatar.png".to_string());
        assert!(DeviceAccountProvider::from_config(&cfg).is_ok());
    }

    #[tokio::test]
    async fn pushes_identity_changes_to_subscribers() {
        let provider = DeviceAccountProvider::from_config(&config()).unwrap();
        let mut rx = provider.subscribe();
        assert_eq!(*rx.borrow_and_update(), None);

        provider.sign_in().await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().as_ref().unwrap().uid, "u-ava");

        provider.sign_out().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), None);
    }
}
