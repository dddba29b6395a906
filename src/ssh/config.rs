//! Configuration resolution for SSH tunnels.
//!
//! Values are resolved with a three-tier priority system:
//!
//! 1. **Parameter** - Explicitly provided function parameter (highest priority)
//! 2. **Environment Variable** - Value from environment variable
//! 3. **Default** - Built-in default value (lowest priority)
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `SSH_TUNNEL_ROUTE` | direct | Hops, e.g. `bastion -> gateway` |
//! | `SSH_TUNNEL_PORT` | 22 | SSH port used by hops without an explicit port |
//! | `SSH_TUNNEL_PRIVATE_KEYS` | - | Comma-separated identity files |
//! | `SSH_TUNNEL_KNOWN_HOSTS` | - | Known hosts file |
//! | `SSH_TUNNEL_LOCAL_HOST` | localhost | Bind address of the local end |
//! | `SSH_TUNNEL_TIMEOUT` | 0 | Session timeout in milliseconds, 0 never expires |
//! | `SSH_TUNNEL_STRICT_HOST_KEY_CHECKING` | yes | `yes` or `no` |
//! | `SSH_TUNNEL_USER` | `$USER` | Login user for hops without `user@` |
//! | `SSH_TUNNEL_REMOTE` | - | Destination `host:port` (binary only) |
//! | `SSH_TUNNEL_LOCAL_PORT` | 0 | Local port, 0 picks a free one (binary only) |
//! | `SSH_CONNECT_TIMEOUT` | 30s | Per-hop connection timeout in seconds |

use std::env;

use super::error::{Result, SshError};
use super::mapper::SshSettingsMapper;

/// Default SSH connection timeout in seconds
pub(crate) const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Environment variable name for SSH connection timeout
pub(crate) const CONNECT_TIMEOUT_ENV_VAR: &str = "SSH_CONNECT_TIMEOUT";

/// Environment variable name for the login user
pub(crate) const USER_ENV_VAR: &str = "SSH_TUNNEL_USER";

pub(crate) const ROUTE_ENV_VAR: &str = "SSH_TUNNEL_ROUTE";
pub(crate) const PORT_ENV_VAR: &str = "SSH_TUNNEL_PORT";
pub(crate) const PRIVATE_KEYS_ENV_VAR: &str = "SSH_TUNNEL_PRIVATE_KEYS";
pub(crate) const KNOWN_HOSTS_ENV_VAR: &str = "SSH_TUNNEL_KNOWN_HOSTS";
pub(crate) const LOCAL_HOST_ENV_VAR: &str = "SSH_TUNNEL_LOCAL_HOST";
pub(crate) const TIMEOUT_ENV_VAR: &str = "SSH_TUNNEL_TIMEOUT";
pub(crate) const STRICT_HOST_KEY_CHECKING_ENV_VAR: &str = "SSH_TUNNEL_STRICT_HOST_KEY_CHECKING";
pub(crate) const REMOTE_ENV_VAR: &str = "SSH_TUNNEL_REMOTE";
pub(crate) const LOCAL_PORT_ENV_VAR: &str = "SSH_TUNNEL_LOCAL_PORT";

/// Resolve the connection timeout value with priority: parameter -> env var -> default
pub fn resolve_connect_timeout(timeout_param: Option<u64>) -> u64 {
    // Priority 1: Use parameter if provided
    if let Some(timeout) = timeout_param {
        return timeout;
    }

    // Priority 2: Use environment variable if set
    if let Ok(env_timeout) = env::var(CONNECT_TIMEOUT_ENV_VAR)
        && let Ok(timeout) = env_timeout.parse::<u64>()
    {
        return timeout;
    }

    // Priority 3: Default value
    DEFAULT_CONNECT_TIMEOUT_SECS
}

/// Resolve the login user with priority: parameter -> `SSH_TUNNEL_USER` -> `USER` -> `USERNAME`
pub fn resolve_username(user_param: Option<&str>) -> Option<String> {
    if let Some(user) = user_param.filter(|u| !u.trim().is_empty()) {
        return Some(user.to_string());
    }

    [USER_ENV_VAR, "USER", "USERNAME"]
        .iter()
        .filter_map(|var| env::var(var).ok())
        .find(|user| !user.trim().is_empty())
}

/// Resolve the local tunnel port with priority: parameter -> env var -> 0 (auto)
pub fn resolve_local_port(port_param: Option<u16>) -> u16 {
    if let Some(port) = port_param {
        return port;
    }

    if let Ok(env_port) = env::var(LOCAL_PORT_ENV_VAR)
        && let Ok(port) = env_port.parse::<u16>()
    {
        return port;
    }

    0
}

/// Resolve the tunnel destination from a parameter or `SSH_TUNNEL_REMOTE`.
pub fn resolve_remote(remote_param: Option<&str>) -> Result<(String, u16)> {
    let remote = match remote_param {
        Some(remote) => remote.to_string(),
        None => env::var(REMOTE_ENV_VAR).map_err(|_| {
            SshError::invalid_endpoint("remote_host", format!("{} is not set", REMOTE_ENV_VAR))
        })?,
    };
    parse_address(&remote)
}

/// Parse `host:port`. Unlike SSH hosts, a destination has no default port.
///
/// Uses `rsplit_once` so that bracketed IPv6 addresses keep their colons.
pub(crate) fn parse_address(address: &str) -> Result<(String, u16)> {
    let (host, port_str) = address.rsplit_once(':').ok_or_else(|| {
        SshError::invalid_endpoint(
            "remote_port",
            format!("Expected host:port, got '{}'", address),
        )
    })?;
    let port = port_str.parse::<u16>().map_err(|e| {
        SshError::invalid_endpoint("remote_port", format!("Invalid port number: {}", e))
    })?;
    Ok((host.to_string(), port))
}

/// Build a settings mapper from `SSH_TUNNEL_*` variables.
///
/// Unset variables keep their defaults. Numeric variables that do not parse
/// are reported instead of being ignored.
pub fn mapper_from_env() -> Result<SshSettingsMapper> {
    let mut mapper = SshSettingsMapper::new();

    mapper.set_route(env::var(ROUTE_ENV_VAR).ok());
    mapper.set_private_keys(env::var(PRIVATE_KEYS_ENV_VAR).ok());
    mapper.set_known_hosts(env::var(KNOWN_HOSTS_ENV_VAR).ok());

    if let Some(port) = parse_env::<i32>(PORT_ENV_VAR, "ssh_port")? {
        mapper.set_port(port);
    }
    if let Ok(local_host) = env::var(LOCAL_HOST_ENV_VAR) {
        mapper.set_local_host(local_host);
    }
    if let Some(timeout) = parse_env::<i64>(TIMEOUT_ENV_VAR, "session_timeout")? {
        mapper.set_timeout(timeout);
    }
    if let Ok(strict) = env::var(STRICT_HOST_KEY_CHECKING_ENV_VAR) {
        mapper.set_strict_host_key_checking(&strict);
    }

    Ok(mapper)
}

fn parse_env<T: std::str::FromStr>(var: &str, field: &'static str) -> Result<Option<T>> {
    match env::var(var) {
        Ok(value) => value.trim().parse::<T>().map(Some).map_err(|_| {
            SshError::configuration(field, format!("Invalid {}: '{}'", var, value))
        }),
        Err(_) => Ok(None),
    }
}
