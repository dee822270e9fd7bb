//! Service descriptors and the active check mechanisms they can carry.

use crate::resilience::{CircuitBreaker, CircuitState};
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Why a health check failed. Absorbed into the health record; never
/// returned to business code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HealthCheckError {
    #[error("health check timed out after {0:?}")]
    Timeout(Duration),

    #[error("health check failed: {0}")]
    Failed(String),

    #[error("health endpoint returned HTTP {status}")]
    HttpStatus { status: u16 },

    #[error("health endpoint unreachable: {0}")]
    Transport(String),

    #[error("circuit breaker is {0}")]
    CircuitNotClosed(CircuitState),
}

impl HealthCheckError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// A custom async health probe
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check(&self) -> Result<(), HealthCheckError>;
}

/// Adapts an async closure into a [`HealthProbe`]
pub struct FnProbe<F>(F);

#[async_trait]
impl<F, Fut> HealthProbe for FnProbe<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HealthCheckError>> + Send,
{
    async fn check(&self) -> Result<(), HealthCheckError> {
        (self.0)().await
    }
}

/// Plain GET against a dependency's health endpoint; any 2xx is healthy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpCheck {
    pub url: String,
}

impl HttpCheck {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub async fn probe(&self, client: &reqwest::Client) -> Result<(), HealthCheckError> {
        let response = client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| HealthCheckError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(HealthCheckError::HttpStatus {
                status: status.as_u16(),
            })
        }
    }
}

/// Active check mechanism of a service
#[derive(Clone)]
pub enum HealthCheck {
    Probe(Arc<dyn HealthProbe>),
    Http(HttpCheck),
}

impl HealthCheck {
    pub fn probe<F, Fut>(probe: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HealthCheckError>> + Send + 'static,
    {
        HealthCheck::Probe(Arc::new(FnProbe(probe)))
    }

    pub fn http(url: impl Into<String>) -> Self {
        HealthCheck::Http(HttpCheck::new(url))
    }
}

impl fmt::Debug for HealthCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthCheck::Probe(_) => f.write_str("HealthCheck::Probe"),
            HealthCheck::Http(http) => f.debug_tuple("HealthCheck::Http").field(&http.url).finish(),
        }
    }
}

/// Identity and probing configuration of a monitored dependency.
///
/// Checks run in priority order: the active `check` if present, otherwise the
/// attached breaker's state. A breaker, when attached, is also mirrored
/// passively on every transition.
#[derive(Debug, Clone)]
pub struct ServiceDescriptor {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    /// Ids of services this one depends on (informational)
    pub dependencies: Vec<String>,
    pub tags: Vec<String>,
    pub check: Option<HealthCheck>,
    pub circuit_breaker: Option<Arc<CircuitBreaker>>,
}

impl ServiceDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            category: "general".to_string(),
            dependencies: Vec::new(),
            tags: Vec::new(),
            check: None,
            circuit_breaker: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_dependency(mut self, service_id: impl Into<String>) -> Self {
        self.dependencies.push(service_id.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_check(mut self, check: HealthCheck) -> Self {
        self.check = Some(check);
        self
    }

    pub fn with_probe<F, Fut>(self, probe: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HealthCheckError>> + Send + 'static,
    {
        self.with_check(HealthCheck::probe(probe))
    }

    pub fn with_http_check(self, url: impl Into<String>) -> Self {
        self.with_check(HealthCheck::http(url))
    }

    pub fn with_circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.circuit_breaker = Some(breaker);
        self
    }
}
