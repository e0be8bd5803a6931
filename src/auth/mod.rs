//! OAuth credential storage and acquisition
//!
//! A working access credential comes from, in order of precedence:
//!
//! 1. a credential injected by the deployment (config or `DISCOGS_CREDS`)
//! 2. the credential store
//! 3. the interactive handshake, when a prompt is available
//!
//! Unattended runs pass no prompt, so a missing credential surfaces as an
//! [`AuthStage::Acquire`] error instead of blocking on stdin.

mod oauth;
mod store;

pub use oauth::{
    authorize, percent_encode, OAuthConsumer, OAuthEndpoints, StdinPrompt, VerifierPrompt,
};
pub use store::{CredentialStore, FileCredentialStore, MemoryCredentialStore};

use crate::config::OAuthConfig;
use crate::{AuthStage, DiggerError, Result};
use serde::{Deserialize, Serialize};

/// OAuth access token and its secret
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(rename = "token")]
    pub access_token: String,

    #[serde(rename = "secret")]
    pub token_secret: String,
}

impl Credential {
    pub fn new(access_token: impl Into<String>, token_secret: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_secret: token_secret.into(),
        }
    }

    /// The credential injected through configuration, if any
    pub fn from_config(config: &OAuthConfig) -> Option<Self> {
        match (&config.access_token, &config.token_secret) {
            (Some(token), Some(secret)) => Some(Self::new(token.clone(), secret.clone())),
            _ => None,
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("token_secret", &"<redacted>")
            .finish()
    }
}

/// Where an acquired credential came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Injected,
    Stored,
    Authorized,
}

/// Finds a working credential, authorizing interactively as a last resort
///
/// A store that cannot be read is treated as empty. A freshly authorized
/// credential is saved; failing to save it is logged and otherwise ignored.
pub async fn acquire_credential(
    injected: Option<Credential>,
    store: &dyn CredentialStore,
    consumer: &OAuthConsumer,
    client: &reqwest::Client,
    prompt: Option<&dyn VerifierPrompt>,
) -> Result<(Credential, CredentialSource)> {
    if let Some(credential) = injected {
        tracing::debug!("Using injected access token");
        return Ok((credential, CredentialSource::Injected));
    }

    match store.load() {
        Ok(Some(credential)) => {
            tracing::debug!("Using stored access token");
            return Ok((credential, CredentialSource::Stored));
        }
        Ok(None) => {}
        Err(e) => {
            tracing::warn!("Stored access token unusable, re-authorizing: {}", e);
        }
    }

    let prompt = prompt.ok_or_else(|| {
        DiggerError::auth(
            AuthStage::Acquire,
            "no access token available; run with --authorize or set DISCOGS_CREDS",
        )
    })?;

    let credential = authorize(consumer, client, prompt).await?;
    if let Err(e) = store.save(&credential) {
        tracing::warn!("Failed to save access token: {}", e);
    }

    Ok((credential, CredentialSource::Authorized))
}
