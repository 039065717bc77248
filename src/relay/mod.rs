//! Upstream mail-relay registration API
//!
//! The relay owns the actual address claiming and forwarding; this engine
//! only calls its registration surface. Every call is bounded by the
//! configured timeout — a timed-out call is a failed call, and retrying is
//! the caller's decision, never ours.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::types::error::{MaskboxError, Result};

/// Claim a namespace (`alias_name@domain`) with its derived public key.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterNamespaceRequest {
    pub alias_name: String,
    pub domain: String,
    pub key: String,
}

/// Relay acknowledgement of a namespace claim.
#[derive(Debug, Clone, Deserialize)]
pub struct NamespaceRegistration {
    pub registered: bool,
    /// The public key the relay actually recorded.
    pub key: String,
}

/// Register or re-register forwarding for a full alias address.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterAddressRequest {
    /// Full `"<namespace>#<address>@<domain>"` form.
    pub alias_address: String,
    pub forwards_to: Vec<String>,
    pub whitelisted: bool,
    pub disabled: bool,
}

/// The relay registration surface this engine consumes.
#[async_trait]
pub trait MailRelay: Send + Sync {
    async fn register_alias_name(
        &self,
        req: RegisterNamespaceRequest,
    ) -> Result<NamespaceRegistration>;

    async fn register_alias_address(&self, req: RegisterAddressRequest) -> Result<()>;

    async fn update_alias_address(&self, req: RegisterAddressRequest) -> Result<()>;

    async fn remove_alias_address(&self, alias_address: &str) -> Result<()>;
}

/// HTTP implementation of [`MailRelay`].
pub struct HttpMailRelay {
    client: reqwest::Client,
    base_url: Url,
    timeout: Duration,
}

impl HttpMailRelay {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| MaskboxError::Config(format!("Invalid relay base URL: {}", e)))?;

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| MaskboxError::UpstreamRegistration(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| MaskboxError::Config(format!("Invalid relay endpoint: {}", e)))
    }

    /// Run a relay call under the configured timeout, folding transport
    /// errors, timeouts and non-2xx statuses into `UpstreamRegistration`.
    async fn send<T: Serialize>(&self, method: reqwest::Method, path: &str, body: &T) -> Result<reqwest::Response> {
        let url = self.endpoint(path)?;
        debug!("Relay call: {} {}", method, url);

        let fut = self.client.request(method, url).json(body).send();
        let response = tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| {
                MaskboxError::UpstreamRegistration(format!(
                    "relay call '{path}' timed out after {:?}",
                    self.timeout
                ))
            })?
            .map_err(|e| MaskboxError::UpstreamRegistration(e.to_string()))?;

        if !response.status().is_success() {
            return Err(MaskboxError::UpstreamRegistration(format!(
                "relay call '{path}' returned {}",
                response.status()
            )));
        }

        Ok(response)
    }
}

#[async_trait]
impl MailRelay for HttpMailRelay {
    async fn register_alias_name(
        &self,
        req: RegisterNamespaceRequest,
    ) -> Result<NamespaceRegistration> {
        let response = self
            .send(reqwest::Method::POST, "alias/names", &req)
            .await?;

        response
            .json()
            .await
            .map_err(|e| MaskboxError::UpstreamRegistration(e.to_string()))
    }

    async fn register_alias_address(&self, req: RegisterAddressRequest) -> Result<()> {
        self.send(reqwest::Method::POST, "alias/addresses", &req)
            .await?;
        Ok(())
    }

    async fn update_alias_address(&self, req: RegisterAddressRequest) -> Result<()> {
        self.send(reqwest::Method::PUT, "alias/addresses", &req)
            .await?;
        Ok(())
    }

    async fn remove_alias_address(&self, alias_address: &str) -> Result<()> {
        #[derive(Serialize)]
        struct RemoveAddressRequest<'a> {
            alias_address: &'a str,
        }

        self.send(
            reqwest::Method::DELETE,
            "alias/addresses",
            &RemoveAddressRequest { alias_address },
        )
        .await?;
        Ok(())
    }
}

/// In-memory relay used by tests: records calls and fails on demand.
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MockRelay {
        fail_next: AtomicBool,
        calls: Mutex<Vec<String>>,
    }

    impl MockRelay {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make the next call fail with `UpstreamRegistration`.
        pub fn fail_next(&self) {
            self.fail_next.store(true, Ordering::SeqCst);
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) -> Result<()> {
            self.calls.lock().unwrap().push(call);
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(MaskboxError::UpstreamRegistration(
                    "mock relay rejected the call".to_string(),
                ));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl MailRelay for MockRelay {
        async fn register_alias_name(
            &self,
            req: RegisterNamespaceRequest,
        ) -> Result<NamespaceRegistration> {
            self.record(format!("registerAliasName:{}@{}", req.alias_name, req.domain))?;
            Ok(NamespaceRegistration {
                registered: true,
                key: req.key,
            })
        }

        async fn register_alias_address(&self, req: RegisterAddressRequest) -> Result<()> {
            self.record(format!("registerAliasAddress:{}", req.alias_address))
        }

        async fn update_alias_address(&self, req: RegisterAddressRequest) -> Result<()> {
            self.record(format!("updateAliasAddress:{}", req.alias_address))
        }

        async fn remove_alias_address(&self, alias_address: &str) -> Result<()> {
            self.record(format!("removeAliasAddress:{alias_address}"))
        }
    }
}
