//! Client configuration: base address, tenancy shape, and token provider.

use std::fmt;
use std::future::Future;

use crate::types::{Action, BoxError, Error, TokenFuture, TokenProvider};

/// Environment variable holding the service base address.
pub const BASE_URL_ENV: &str = "BASE_URL";
/// Environment variable selecting the region (requires a project id).
pub const REGION_ENV: &str = "MERCURY_REGION";
/// Environment variable selecting the project id.
pub const PROJECT_ID_ENV: &str = "MERCURY_PROJECT_ID";
/// Placeholder in the base address replaced with the region.
pub const REGION_PLACEHOLDER: &str = "{region}";

/// How channels are scoped within a multi-tenant deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Tenancy {
    /// `{base}/{channel}`
    #[default]
    None,
    /// `{base}/{project_id}/{channel}`
    Project { project_id: String },
    /// Base address with `{region}` substituted, then `/{project_id}/{channel}`.
    RegionProject { region: String, project_id: String },
}

/// Configuration for [`Subscriber`](crate::Subscriber).
///
/// Read once at startup and handed to the constructor; a subscriber never
/// consults the process environment afterwards.
#[derive(Default)]
pub struct SubscriberConfig {
    /// Service base address, e.g. `https://pubsub.example.com/`. May contain
    /// [`REGION_PLACEHOLDER`] when the tenancy shape carries a region.
    pub base_url: Option<String>,
    /// Tenancy shape, fixed for the lifetime of the client.
    pub tenancy: Tenancy,
    /// Optional callback returning a bearer token for each call. Without
    /// one, publish fails and subscribe connects anonymously.
    pub get_access_token: Option<TokenProvider>,
}

impl SubscriberConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: Some(base_url.into()),
            ..Default::default()
        }
    }

    /// Build a config from `BASE_URL`, `MERCURY_REGION` and `MERCURY_PROJECT_ID`.
    ///
    /// Empty values count as unset. A missing `BASE_URL` is reported when the
    /// subscriber is constructed.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let tenancy = match (get(REGION_ENV), get(PROJECT_ID_ENV)) {
            (None, None) => Tenancy::None,
            (None, Some(project_id)) => Tenancy::Project { project_id },
            (Some(region), Some(project_id)) => Tenancy::RegionProject { region, project_id },
            (Some(_), None) => {
                return Err(Error::Config(format!(
                    "{REGION_ENV} is set but {PROJECT_ID_ENV} is not"
                )));
            }
        };

        Ok(Self {
            base_url: get(BASE_URL_ENV),
            tenancy,
            get_access_token: None,
        })
    }

    pub fn with_tenancy(mut self, tenancy: Tenancy) -> Self {
        self.tenancy = tenancy;
        self
    }

    /// Install the access-token callback.
    ///
    /// The callback runs once per publish and once per subscribe; its result
    /// is never cached.
    pub fn with_token_provider<F, Fut>(mut self, get_token: F) -> Self
    where
        F: Fn(Action, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, BoxError>> + Send + 'static,
    {
        let provider: TokenProvider =
            Box::new(move |action: Action, channel_id: String| -> TokenFuture {
                Box::pin(get_token(action, channel_id))
            });
        self.get_access_token = Some(provider);
        self
    }
}

impl fmt::Debug for SubscriberConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberConfig")
            .field("base_url", &self.base_url)
            .field("tenancy", &self.tenancy)
            .field("get_access_token", &self.get_access_token.is_some())
            .finish()
    }
}
