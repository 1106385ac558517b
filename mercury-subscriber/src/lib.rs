//! Mercury Pub/Sub client.
//!
//! Publishes JSON messages to channels over HTTP and subscribes to channels
//! over Server-Sent Events.
//!
//! # Features
//! - Per-call bearer tokens from a caller-supplied async callback
//! - Channel addressing with optional region and project tenancy
//! - Subscribe resolves only once the stream is open
//! - Explicit, idempotent session teardown
//!
//! No reconnection, retry, or cross-channel ordering is provided.
//!
//! # Example
//! ```no_run
//! # async fn example() -> Result<(), mercury_subscriber::Error> {
//! use mercury_subscriber::{Subscriber, SubscriberConfig};
//!
//! let config = SubscriberConfig::from_env()?
//!     .with_token_provider(|action, channel| async move {
//!         Ok::<_, mercury_subscriber::BoxError>(format!("token-for-{action}-{channel}"))
//!     });
//! let subscriber = Subscriber::new(config)?;
//!
//! let mut session = subscriber
//!     .subscribe("orders", |order: serde_json::Value| println!("got: {order}"))
//!     .await?;
//!
//! subscriber.publish("orders", &serde_json::json!({ "id": 1 })).await?;
//! session.close();
//! # Ok(())
//! # }
//! ```

mod address;
mod config;
mod session;
mod subscriber;
mod token;
mod transport;
mod types;

pub use address::AddressResolver;
pub use config::{
    BASE_URL_ENV, PROJECT_ID_ENV, REGION_ENV, REGION_PLACEHOLDER, SubscriberConfig, Tenancy,
};
pub use session::Session;
pub use subscriber::Subscriber;
pub use transport::{
    PushConnection, PushStreamClient, STREAM_ENDED, SseClient, StreamCloser, StreamEvent,
};
pub use types::{Action, BoxError, Error, SubscriberError, TokenFuture, TokenProvider};
