//! Public entry point: [`Subscriber`].

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::address::AddressResolver;
use crate::config::SubscriberConfig;
use crate::session::{Dispatcher, ErrorSink, Session, establish};
use crate::token::TokenGate;
use crate::transport::{PushStreamClient, SseClient};
use crate::types::{Action, Error, SubscriberError};

pub(crate) const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Action label the token provider receives for publish calls.
const PUBLISH_TOKEN_ACTION: Action = Action::Sub;

/// Client for publishing to and subscribing on channels.
///
/// Every call fetches its own token and opens its own request or stream;
/// nothing is shared between calls except the immutable configuration.
pub struct Subscriber {
    resolver: AddressResolver,
    tokens: TokenGate,
    http: reqwest::Client,
    push: Box<dyn PushStreamClient>,
}

impl Subscriber {
    /// Build a subscriber with the default HTTP and SSE transports.
    pub fn new(config: SubscriberConfig) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        let push = SseClient::new(http.clone());
        Self::with_transport(config, http, push)
    }

    /// Build a subscriber with caller-supplied transports.
    pub fn with_transport(
        config: SubscriberConfig,
        http: reqwest::Client,
        push: impl PushStreamClient + 'static,
    ) -> Result<Self, Error> {
        let resolver = AddressResolver::new(config.base_url.as_deref(), &config.tenancy)?;
        let tokens = TokenGate::new(config.get_access_token);

        tracing::debug!(
            base_url = %resolver.base(),
            tenancy = ?config.tenancy,
            authenticated = tokens.is_authenticated(),
            "Subscriber initialized"
        );

        Ok(Self {
            resolver,
            tokens,
            http,
            push: Box::new(push),
        })
    }

    /// Endpoint for `channel_id`.
    pub fn address(&self, channel_id: &str) -> Result<Url, Error> {
        self.resolver.resolve(channel_id)
    }

    /// Publish `body` to `channel_id`.
    ///
    /// Fails with [`Error::MissingTokenProvider`] before any I/O when no
    /// token provider is configured, and with [`Error::Remote`] carrying the
    /// status and response text on a non-success response. Not retried.
    pub async fn publish<B>(&self, channel_id: &str, body: &B) -> Result<(), Error>
    where
        B: Serialize + ?Sized,
    {
        let token = self.tokens.require(PUBLISH_TOKEN_ACTION, channel_id).await?;
        let url = self.resolver.resolve(channel_id)?;
        let authorization = bearer(&token)?;
        let payload = serde_json::to_vec(body)?;

        tracing::debug!(channel = %channel_id, %url, "Publishing");
        let response = self
            .http
            .post(url)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .header(AUTHORIZATION, authorization)
            .body(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await?;
            tracing::warn!(channel = %channel_id, status = status.as_u16(), "Publish rejected");
            return Err(SubscriberError::new(Some(status.as_u16()), Some(text)).into());
        }
        Ok(())
    }

    /// Subscribe to `channel_id`, delivering each decoded frame to
    /// `on_message`.
    ///
    /// Resolves once the stream reports it is open. Stream-level errors are
    /// not surfaced; use [`subscribe_with_errors`](Self::subscribe_with_errors)
    /// to observe them.
    ///
    /// Frames that do not decode as `T` stop delivery; see [`Session::join`].
    /// Subscribe with [`serde_json::Value`] to accept any JSON.
    pub async fn subscribe<T, M>(&self, channel_id: &str, on_message: M) -> Result<Session, Error>
    where
        T: DeserializeOwned + 'static,
        M: FnMut(T) + Send + 'static,
    {
        self.open_session(channel_id, on_message, ErrorSink::Silent)
            .await
    }

    /// Like [`subscribe`](Self::subscribe), also passing stream-level errors
    /// to `on_error`. Errors do not close the stream; call
    /// [`Session::close`] to stop.
    pub async fn subscribe_with_errors<T, M, E>(
        &self,
        channel_id: &str,
        on_message: M,
        on_error: E,
    ) -> Result<Session, Error>
    where
        T: DeserializeOwned + 'static,
        M: FnMut(T) + Send + 'static,
        E: FnMut(SubscriberError) + Send + 'static,
    {
        self.open_session(channel_id, on_message, ErrorSink::Surfaced(Box::new(on_error)))
            .await
    }

    async fn open_session<T, M>(
        &self,
        channel_id: &str,
        on_message: M,
        on_error: ErrorSink,
    ) -> Result<Session, Error>
    where
        T: DeserializeOwned + 'static,
        M: FnMut(T) + Send + 'static,
    {
        let token = self.tokens.acquire(Action::Sub, channel_id).await?;
        let url = self.resolver.resolve(channel_id)?;
        let headers = stream_headers(token.as_deref())?;

        tracing::debug!(channel = %channel_id, %url, "Subscribing");
        let connection = self.push.connect(url, headers);
        let dispatcher = Dispatcher::new(channel_id.to_string(), on_message, on_error);
        establish(connection, dispatcher).await
    }
}

fn stream_headers(token: Option<&str>) -> Result<HeaderMap, Error> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Some(token) = token {
        headers.insert(AUTHORIZATION, bearer(token)?);
    }
    Ok(headers)
}

fn bearer(token: &str) -> Result<HeaderValue, Error> {
    let mut value = HeaderValue::from_str(&format!("Bearer {token}"))?;
    value.set_sensitive(true);
    Ok(value)
}
