//! Builder for NETCONF sessions.

use std::path::PathBuf;
use std::time::Duration;

use log::{debug, warn};
use secrecy::SecretString;

use super::{Session, SessionOptions};
use crate::error::{Error, Result, SessionError};
use crate::transport::{
    AuthMethod, Connector, DEFAULT_CONNECT_TIMEOUT, HostKeyVerification, NETCONF_PORT,
    SshConfig, SshConnector,
};
use crate::tree::ListRule;

/// Builder for constructing sessions.
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use ferrisconf::SessionBuilder;
///
/// # async fn example() -> Result<(), ferrisconf::Error> {
/// let session = SessionBuilder::new("192.0.2.1")
///     .username("admin")
///     .password("secret")
///     .idle_timeout(Duration::from_secs(120))
///     .connect()
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct SessionBuilder {
    host: String,
    port: u16,
    username: Option<String>,
    auth: Option<AuthMethod>,
    timeout: Duration,
    host_key_verification: HostKeyVerification,
    known_hosts_path: Option<PathBuf>,
    options: SessionOptions,
}

impl SessionBuilder {
    /// Create a new session builder for the specified host.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: NETCONF_PORT,
            username: None,
            auth: None,
            timeout: DEFAULT_CONNECT_TIMEOUT,
            host_key_verification: HostKeyVerification::default(),
            known_hosts_path: None,
            options: SessionOptions::default(),
        }
    }

    /// Set the SSH port (default: 830).
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the username for authentication.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set password authentication.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.auth = Some(AuthMethod::password(password));
        self
    }

    /// Set private key authentication.
    pub fn private_key(mut self, key_path: impl Into<PathBuf>) -> Self {
        self.auth = Some(AuthMethod::PrivateKey {
            path: key_path.into(),
            passphrase: None,
        });
        self
    }

    /// Set private key authentication with passphrase.
    pub fn private_key_with_passphrase(
        mut self,
        key_path: impl Into<PathBuf>,
        passphrase: impl Into<String>,
    ) -> Self {
        self.auth = Some(AuthMethod::PrivateKey {
            path: key_path.into(),
            passphrase: Some(SecretString::from(passphrase.into())),
        });
        self
    }

    /// Set the connection timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the host key verification mode (default: `AcceptNew`).
    pub fn host_key_verification(mut self, mode: HostKeyVerification) -> Self {
        self.host_key_verification = mode;
        self
    }

    /// Use a known_hosts file other than `~/.ssh/known_hosts`.
    pub fn known_hosts_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_hosts_path = Some(path.into());
        self
    }

    /// Close the session after `idle` without requests (default: 30s).
    pub fn idle_timeout(mut self, idle: Duration) -> Self {
        self.options.idle_timeout = Some(idle);
        self
    }

    /// Keep the session open until it is closed explicitly.
    pub fn no_idle_timeout(mut self) -> Self {
        self.options.idle_timeout = None;
        self
    }

    /// Limit the wait for reply data (default: 60s).
    pub fn reply_timeout(mut self, timeout: Duration) -> Self {
        self.options.reply_timeout = Some(timeout);
        self
    }

    /// Reconnect and retry once when the channel drops (default: on).
    pub fn reconnect(mut self, reconnect: bool) -> Self {
        self.options.reconnect = reconnect;
        self
    }

    /// How list wrappers in reply data are recognized.
    pub fn list_rule(mut self, rule: impl ListRule + 'static) -> Self {
        self.options.decode.list_rule = std::sync::Arc::new(rule);
        self
    }

    /// Keep namespace declarations of reply data as tree metadata.
    pub fn keep_namespaces(mut self, keep: bool) -> Self {
        self.options.decode.keep_namespaces = keep;
        self
    }

    fn invalid(message: &str) -> Error {
        SessionError::InvalidConfig {
            message: message.to_string(),
        }
        .into()
    }

    /// Validate the settings and split them into connector and options.
    pub fn build_parts(self) -> Result<(SshConnector, SessionOptions)> {
        if self.host.trim().is_empty() {
            return Err(Self::invalid("Host must not be empty"));
        }
        let username = self
            .username
            .ok_or_else(|| Self::invalid("Username is required"))?;
        let auth = self
            .auth
            .ok_or_else(|| Self::invalid("A password or private key is required"))?;
        if self.options.idle_timeout == Some(Duration::ZERO) {
            return Err(Self::invalid(
                "Idle timeout must be positive, use no_idle_timeout() to disable it",
            ));
        }

        let mut config = SshConfig::new(self.host, username, auth);
        config.port = self.port;
        config.timeout = self.timeout;
        config.host_key_verification = self.host_key_verification;
        config.known_hosts_path = self.known_hosts_path;

        Ok((SshConnector::new(config), self.options))
    }

    /// Build the session.
    ///
    /// This does not connect; the first request opens the channel.
    pub fn build(self) -> Result<Session> {
        let (connector, options) = self.build_parts()?;
        Ok(Session::new(connector, options))
    }

    /// Build the session and connect it right away.
    pub async fn connect(self) -> Result<Session> {
        let session = self.build()?;
        session.connect().await?;
        Ok(session)
    }
}

/// Connect to the first candidate that accepts a session.
///
/// Candidates are tried in order. When all of them fail, the failures are
/// combined with [`Error::aggregate`].
pub async fn connect_first<C, I>(candidates: I) -> Result<Session<C>>
where
    C: Connector,
    I: IntoIterator<Item = Result<(C, SessionOptions)>>,
{
    let mut failures = Vec::new();
    for candidate in candidates {
        let (connector, options) = match candidate {
            Ok(parts) => parts,
            Err(e) => {
                warn!("skipping connection candidate: {}", e);
                failures.push(e);
                continue;
            }
        };

        let target = connector.target();
        let session = Session::new(connector, options);
        match session.connect().await {
            Ok(()) => {
                debug!("{}: selected", target);
                return Ok(session);
            }
            Err(e) => {
                warn!("{}: connection failed: {}", target, e);
                failures.push(e);
            }
        }
    }
    Err(Error::aggregate(failures))
}

/// [`connect_first`] over SSH builders, e.g. one per management address.
pub async fn connect_any(
    builders: impl IntoIterator<Item = SessionBuilder>,
) -> Result<Session> {
    connect_first(builders.into_iter().map(SessionBuilder::build_parts)).await
}
