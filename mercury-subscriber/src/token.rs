//! Per-call access-token acquisition.

use crate::types::{Action, Error, TokenProvider};

/// Either calls the configured provider or, with none configured, lets
/// subscribe connect anonymously.
pub(crate) enum TokenGate {
    Authenticated(TokenProvider),
    Anonymous,
}

impl TokenGate {
    pub(crate) fn new(provider: Option<TokenProvider>) -> Self {
        match provider {
            Some(get_token) => TokenGate::Authenticated(get_token),
            None => TokenGate::Anonymous,
        }
    }

    pub(crate) fn is_authenticated(&self) -> bool {
        matches!(self, TokenGate::Authenticated(_))
    }

    /// Fetch a token if a provider is configured.
    pub(crate) async fn acquire(
        &self,
        action: Action,
        channel_id: &str,
    ) -> Result<Option<String>, Error> {
        match self {
            TokenGate::Authenticated(get_token) => {
                let token = get_token(action, channel_id.to_string())
                    .await
                    .map_err(Error::TokenFetch)?;
                Ok(Some(token))
            }
            TokenGate::Anonymous => Ok(None),
        }
    }

    /// Fetch a token, failing before any I/O when no provider is configured.
    pub(crate) async fn require(&self, action: Action, channel_id: &str) -> Result<String, Error> {
        match self.acquire(action, channel_id).await? {
            Some(token) => Ok(token),
            None => Err(Error::MissingTokenProvider),
        }
    }
}
