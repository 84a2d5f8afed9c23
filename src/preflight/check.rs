//! Advisory readiness checks run before a provider session is created.

use std::collections::HashMap;
use std::fmt;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::process::Command;

use super::CredentialStore;
use crate::provider::{resolve_binary, AuthRequirement, ProviderCatalog, ProviderConfig, ProviderId};
use crate::terminal::{build_environment, HostEnvironment, AGENT_MARKER_VARS};

/// Default upper bound for a version probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors surfaced to callers that want readiness as a `Result`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PreflightError {
    #[error("{provider} is not ready: {reason}")]
    ProviderNotReady { provider: ProviderId, reason: String },
}

/// Outcome of a readiness check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Readiness {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Readiness {
    #[must_use]
    pub fn ready() -> Self {
        Self {
            ready: true,
            reason: None,
        }
    }

    #[must_use]
    pub fn not_ready(reason: impl Into<String>) -> Self {
        Self {
            ready: false,
            reason: Some(reason.into()),
        }
    }

    /// Convert into a `Result` for `?`-style callers.
    ///
    /// # Errors
    ///
    /// Returns `PreflightError::ProviderNotReady` when not ready.
    pub fn into_result(self, provider: ProviderId) -> Result<(), PreflightError> {
        if self.ready {
            Ok(())
        } else {
            Err(PreflightError::ProviderNotReady {
                provider,
                reason: self.reason.unwrap_or_else(|| "unknown reason".to_string()),
            })
        }
    }
}

impl fmt::Display for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.reason, self.ready) {
            (_, true) => f.write_str("ready"),
            (Some(reason), false) => write!(f, "not ready: {reason}"),
            (None, false) => f.write_str("not ready"),
        }
    }
}

/// Checks whether a provider can start.
///
/// Credential providers are ready when a key is in the environment or the
/// credential store. Installed-binary providers must answer a version probe
/// within the timeout.
pub struct AuthPreflight {
    catalog: Arc<ProviderCatalog>,
    credentials: Arc<dyn CredentialStore>,
    env: HostEnvironment,
    timeout: Duration,
}

impl fmt::Debug for AuthPreflight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthPreflight")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl AuthPreflight {
    #[must_use]
    pub fn new(
        catalog: Arc<ProviderCatalog>,
        credentials: Arc<dyn CredentialStore>,
        env: HostEnvironment,
    ) -> Self {
        Self {
            catalog,
            credentials,
            env,
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Check one provider. Never fails; problems become a not-ready reason.
    pub async fn check(&self, id: ProviderId) -> Readiness {
        let provider = self.catalog.get(id);
        let readiness = match &provider.auth {
            AuthRequirement::Credential { env_keys } => self.check_credential(provider, env_keys),
            AuthRequirement::VersionProbe { args } => self.probe_version(provider, args).await,
        };

        if readiness.ready {
            tracing::info!(provider = %id, "Provider ready");
        } else {
            tracing::info!(provider = %id, reason = ?readiness.reason, "Provider not ready");
        }
        readiness
    }

    fn check_credential(&self, provider: &ProviderConfig, env_keys: &[String]) -> Readiness {
        if let Some(key) = env_keys.iter().find(|k| self.env.var(k).is_some()) {
            tracing::debug!(provider = %provider.id, env = %key, "Credential found in environment");
            return Readiness::ready();
        }
        if self.credentials.lookup(provider.id).is_some() {
            tracing::debug!(provider = %provider.id, "Credential found in store");
            return Readiness::ready();
        }

        Readiness::not_ready(format!(
            "no {} credential: set {} or save a key in the credentials file",
            provider.display_name,
            env_keys.join(" or "),
        ))
    }

    async fn probe_version(&self, provider: &ProviderConfig, args: &[String]) -> Readiness {
        let Some(binary) = resolve_binary(provider, &self.env) else {
            return Readiness::not_ready(format!(
                "{} not found; install with `{}`",
                provider.binary_name, provider.install_command
            ));
        };

        let env = build_environment(self.env.vars(), &provider.extra_env, AGENT_MARKER_VARS);
        let mut cmd = Command::new(&binary);
        cmd.args(args)
            .env_clear()
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        tracing::debug!(provider = %provider.id, binary = %binary.display(), "Running version probe");
        match tokio::time::timeout(self.timeout, cmd.status()).await {
            Ok(Ok(status)) if status.success() => Readiness::ready(),
            Ok(Ok(status)) => Readiness::not_ready(format!(
                "`{} {}` exited with {status}",
                binary.display(),
                args.join(" ")
            )),
            Ok(Err(e)) => Readiness::not_ready(format!("failed to run {}: {e}", binary.display())),
            Err(_) => Readiness::not_ready(format!(
                "`{}` did not respond within {}s",
                binary.display(),
                self.timeout.as_secs_f32()
            )),
        }
    }

    /// Environment overlay for a session running `id`.
    ///
    /// Holds the provider's configured extra variables plus the stored
    /// credential under its first credential variable. Pass it as the
    /// `env` of a create request; host values still take precedence.
    #[must_use]
    pub fn provider_env(&self, id: ProviderId) -> HashMap<String, String> {
        let provider = self.catalog.get(id);
        let mut env = provider.extra_env.clone();
        if let (Some(key), Some(secret)) = (
            provider.credential_env_keys().first(),
            self.credentials.lookup(id),
        ) {
            env.insert(key.clone(), secret);
        }
        env
    }
}
