//! Immutable SSH tunnel settings.
//!
//! [`SshSettings`] is only obtainable through [`SshSettingsBuilder`]:
//!
//! - [`SshSettingsBuilder::build`] validates every field and fails on the
//!   first violation, so a built instance always passes its own validation.
//! - [`SshSettingsBuilder::build_without_check`] skips validation. It exists
//!   for property adapters (see [`SshSettingsMapper`](super::mapper::SshSettingsMapper))
//!   that set fields one at a time and defer validation.
//!
//! Ports and timeouts are signed so that an unchecked instance can carry an
//! out-of-range value back to whoever validates it.
//!
//! # Example
//!
//! ```ignore
//! let settings = SshSettings::builder()
//!     .with_route("bastion -> db-gateway")
//!     .with_private_keys("/home/me/.ssh/id_ed25519")
//!     .with_known_hosts("/home/me/.ssh/known_hosts")
//!     .build()?;
//! ```

use std::time::Duration;

use super::error::{Result, SshError};
use super::route::Route;

/// Default SSH port
pub const DEFAULT_SSH_PORT: i32 = 22;

/// Sessions never time out by default
pub const DEFAULT_SESSION_TIMEOUT: i64 = 0;

/// Host keys are checked against known hosts by default
pub const DEFAULT_STRICT_HOST_KEY_CHECKING: bool = true;

/// Default bind address for the local end of a tunnel
pub const DEFAULT_LOCALHOST: &str = "localhost";

/// Validated, immutable tunnel configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshSettings {
    ssh_port: i32,
    route: Option<String>,
    private_keys: Vec<String>,
    known_hosts: Option<String>,
    local_host: String,
    session_timeout: i64,
    strict_host_key_checking: bool,
}

impl SshSettings {
    pub fn builder() -> SshSettingsBuilder {
        SshSettingsBuilder::new()
    }

    pub fn ssh_port(&self) -> i32 {
        self.ssh_port
    }

    /// The route as configured, whitespace included.
    pub fn route(&self) -> Option<&str> {
        self.route.as_deref()
    }

    /// Whether the route is missing or blank, i.e. the tunnel goes straight
    /// to the remote host.
    pub fn is_direct(&self) -> bool {
        self.route.as_deref().is_none_or(|route| route.trim().is_empty())
    }

    /// Identity file paths, split on `,` and trimmed. Never empty.
    pub fn private_keys(&self) -> &[String] {
        &self.private_keys
    }

    /// Identity file paths joined back with `,`.
    pub fn private_keys_joined(&self) -> String {
        self.private_keys.join(",")
    }

    pub fn known_hosts(&self) -> Option<&str> {
        self.known_hosts.as_deref()
    }

    pub fn local_host(&self) -> &str {
        &self.local_host
    }

    /// Session timeout in milliseconds; `0` means sessions never expire.
    pub fn session_timeout(&self) -> i64 {
        self.session_timeout
    }

    /// Session timeout as a duration, `None` when sessions never expire.
    pub fn session_timeout_duration(&self) -> Option<Duration> {
        u64::try_from(self.session_timeout)
            .ok()
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    pub fn is_strict_host_key_checking(&self) -> bool {
        self.strict_host_key_checking
    }

    /// The strict host key checking flag as `"yes"` or `"no"`.
    pub fn strict_host_key_checking_value(&self) -> &'static str {
        if self.strict_host_key_checking {
            "yes"
        } else {
            "no"
        }
    }
}

/// Builder for [`SshSettings`].
#[derive(Debug, Clone)]
pub struct SshSettingsBuilder {
    ssh_port: i32,
    route: Option<String>,
    private_keys: Option<String>,
    known_hosts: Option<String>,
    local_host: String,
    session_timeout: i64,
    strict_host_key_checking: bool,
}

impl SshSettingsBuilder {
    pub fn new() -> Self {
        Self {
            ssh_port: DEFAULT_SSH_PORT,
            route: None,
            private_keys: None,
            known_hosts: None,
            local_host: DEFAULT_LOCALHOST.to_string(),
            session_timeout: DEFAULT_SESSION_TIMEOUT,
            strict_host_key_checking: DEFAULT_STRICT_HOST_KEY_CHECKING,
        }
    }

    pub fn with_ssh_port(mut self, ssh_port: i32) -> Self {
        self.ssh_port = ssh_port;
        self
    }

    pub fn with_route(mut self, route: impl Into<Option<String>>) -> Self {
        self.route = route.into();
        self
    }

    /// Comma-separated identity file paths.
    pub fn with_private_keys(mut self, private_keys: impl Into<Option<String>>) -> Self {
        self.private_keys = private_keys.into();
        self
    }

    pub fn with_known_hosts(mut self, known_hosts: impl Into<Option<String>>) -> Self {
        self.known_hosts = known_hosts.into();
        self
    }

    pub fn with_local_host(mut self, local_host: impl Into<String>) -> Self {
        self.local_host = local_host.into();
        self
    }

    /// Session timeout in milliseconds.
    pub fn with_session_timeout(mut self, session_timeout: i64) -> Self {
        self.session_timeout = session_timeout;
        self
    }

    pub fn with_strict_host_key_checking(mut self, strict_host_key_checking: bool) -> Self {
        self.strict_host_key_checking = strict_host_key_checking;
        self
    }

    /// Validate and build. Fails with [`SshError::Configuration`] naming the
    /// first violated field.
    pub fn build(&self) -> Result<SshSettings> {
        if !(1..=65535).contains(&self.ssh_port) {
            return Err(SshError::configuration(
                "ssh_port",
                format!("Invalid SSH port number: {}", self.ssh_port),
            ));
        }
        if !Route::is_valid(self.route.as_deref()) {
            return Err(SshError::configuration(
                "route",
                format!("Invalid SSH tunnel route: '{}'", display(&self.route)),
            ));
        }
        if is_blank(&self.private_keys) {
            return Err(SshError::configuration(
                "private_keys",
                format!("Invalid SSH private keys: '{}'", display(&self.private_keys)),
            ));
        }
        if is_blank(&self.known_hosts) {
            return Err(SshError::configuration(
                "known_hosts",
                format!("Invalid SSH known hosts: '{}'", display(&self.known_hosts)),
            ));
        }
        if self.session_timeout < 0 {
            return Err(SshError::configuration(
                "session_timeout",
                format!("Invalid SSH session timeout: {}", self.session_timeout),
            ));
        }
        Ok(self.build_without_check())
    }

    /// Build without validating. Private keys are still split and trimmed;
    /// missing keys yield a single empty entry.
    pub fn build_without_check(&self) -> SshSettings {
        let private_keys = match &self.private_keys {
            Some(keys) => keys.split(',').map(|key| key.trim().to_string()).collect(),
            None => vec![String::new()],
        };

        SshSettings {
            ssh_port: self.ssh_port,
            route: self.route.clone(),
            private_keys,
            known_hosts: self.known_hosts.clone(),
            local_host: self.local_host.clone(),
            session_timeout: self.session_timeout,
            strict_host_key_checking: self.strict_host_key_checking,
        }
    }
}

impl Default for SshSettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(|v| v.trim().is_empty())
}

fn display(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("null")
}
