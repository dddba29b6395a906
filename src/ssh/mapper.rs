//! Property-style adapter over [`SshSettingsBuilder`].
//!
//! Configuration sources (environment, JSON/TOML property files) set fields
//! one at a time as strings and integers, and report every problem at once
//! instead of failing on the first one. [`SshSettingsMapper`] keeps partial,
//! possibly invalid state, reads back through
//! [`SshSettingsBuilder::build_without_check`], and exposes:
//!
//! - [`SshSettingsMapper::validate`] listing every violation
//! - [`SshSettingsMapper::to_settings`] doing the validating build
//!
//! A strict host key checking value other than `yes`/`no` (any case) is kept
//! verbatim and returned by the getter until a valid value replaces it.
//!
//! Deserializes from kebab-case, snake_case or camelCase property names:
//!
//! ```json
//! { "route": "bastion -> gateway", "private-keys": "/k1,/k2", "knownHosts": "/kh" }
//! ```

use std::fmt;

use serde::Deserialize;

use super::error::{Result, SshError};
use super::route::Route;
use super::settings::{SshSettings, SshSettingsBuilder};

/// A single failed constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub field: &'static str,
    pub message: String,
}

impl Violation {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Mutable, string-typed view of [`SshSettings`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(from = "MapperProperties")]
pub struct SshSettingsMapper {
    builder: SshSettingsBuilder,
    invalid_strict_host_key_checking: Option<String>,
}

impl SshSettingsMapper {
    pub fn new() -> Self {
        Self::default()
    }

    fn current(&self) -> SshSettings {
        self.builder.build_without_check()
    }

    fn update(&mut self, f: impl FnOnce(SshSettingsBuilder) -> SshSettingsBuilder) {
        self.builder = f(std::mem::take(&mut self.builder));
    }

    pub fn route(&self) -> Option<String> {
        self.current().route().map(str::to_string)
    }

    pub fn set_route(&mut self, route: impl Into<Option<String>>) {
        let route = route.into();
        self.update(|b| b.with_route(route));
    }

    pub fn port(&self) -> i32 {
        self.current().ssh_port()
    }

    pub fn set_port(&mut self, port: i32) {
        self.update(|b| b.with_ssh_port(port));
    }

    pub fn local_host(&self) -> String {
        self.current().local_host().to_string()
    }

    pub fn set_local_host(&mut self, local_host: impl Into<String>) {
        let local_host = local_host.into();
        self.update(|b| b.with_local_host(local_host));
    }

    /// Identity files joined with `,`, each entry trimmed.
    pub fn private_keys(&self) -> String {
        self.current().private_keys_joined()
    }

    pub fn set_private_keys(&mut self, private_keys: impl Into<Option<String>>) {
        let private_keys = private_keys.into();
        self.update(|b| b.with_private_keys(private_keys));
    }

    pub fn known_hosts(&self) -> Option<String> {
        self.current().known_hosts().map(str::to_string)
    }

    pub fn set_known_hosts(&mut self, known_hosts: impl Into<Option<String>>) {
        let known_hosts = known_hosts.into();
        self.update(|b| b.with_known_hosts(known_hosts));
    }

    /// Session timeout in milliseconds.
    pub fn timeout(&self) -> i64 {
        self.current().session_timeout()
    }

    pub fn set_timeout(&mut self, timeout: i64) {
        self.update(|b| b.with_session_timeout(timeout));
    }

    /// `"yes"`/`"no"`, or the last rejected input verbatim.
    pub fn strict_host_key_checking(&self) -> String {
        match &self.invalid_strict_host_key_checking {
            Some(invalid) => invalid.clone(),
            None => self.current().strict_host_key_checking_value().to_string(),
        }
    }

    pub fn set_strict_host_key_checking(&mut self, value: &str) {
        let strict = if value.eq_ignore_ascii_case("yes") {
            true
        } else if value.eq_ignore_ascii_case("no") {
            false
        } else {
            self.invalid_strict_host_key_checking = Some(value.to_string());
            return;
        };
        self.invalid_strict_host_key_checking = None;
        self.update(|b| b.with_strict_host_key_checking(strict));
    }

    /// Every constraint the current values violate, in field order.
    pub fn validate(&self) -> Vec<Violation> {
        let settings = self.current();
        let mut violations = Vec::new();

        match settings.route() {
            Some(route) if !route.trim().is_empty() => {
                if !Route::is_valid(Some(route)) {
                    violations.push(Violation::new(
                        "route",
                        format!("Invalid SSH tunnel route: '{}'", route),
                    ));
                }
            }
            _ => violations.push(Violation::new("route", "must not be blank")),
        }

        if !(1..=65535).contains(&settings.ssh_port()) {
            violations.push(Violation::new("port", "must be between 1 and 65535"));
        }

        if settings.private_keys_joined().trim().is_empty() {
            violations.push(Violation::new("private_keys", "must not be blank"));
        }

        if settings
            .known_hosts()
            .is_none_or(|known_hosts| known_hosts.trim().is_empty())
        {
            violations.push(Violation::new("known_hosts", "must not be blank"));
        }

        if settings.session_timeout() < 0 {
            violations.push(Violation::new(
                "timeout",
                "must be greater than or equal to 0",
            ));
        }

        if let Some(invalid) = &self.invalid_strict_host_key_checking {
            violations.push(Violation::new(
                "strict_host_key_checking",
                format!("must be 'yes' or 'no', got '{}'", invalid),
            ));
        }

        violations
    }

    /// Validating build of the current values.
    pub fn to_settings(&self) -> Result<SshSettings> {
        if let Some(invalid) = &self.invalid_strict_host_key_checking {
            return Err(SshError::configuration(
                "strict_host_key_checking",
                format!("Invalid SSH strict host key checking: '{}'", invalid),
            ));
        }
        self.builder.build()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct MapperProperties {
    route: Option<String>,
    port: Option<i32>,
    #[serde(alias = "localHost", alias = "local_host")]
    local_host: Option<String>,
    #[serde(alias = "privateKeys", alias = "private_keys")]
    private_keys: Option<String>,
    #[serde(alias = "knownHosts", alias = "known_hosts")]
    known_hosts: Option<String>,
    timeout: Option<i64>,
    #[serde(alias = "strictHostKeyChecking", alias = "strict_host_key_checking")]
    strict_host_key_checking: Option<String>,
}

impl From<MapperProperties> for SshSettingsMapper {
    fn from(props: MapperProperties) -> Self {
        let mut mapper = SshSettingsMapper::new();
        mapper.set_route(props.route);
        mapper.set_private_keys(props.private_keys);
        mapper.set_known_hosts(props.known_hosts);
        if let Some(port) = props.port {
            mapper.set_port(port);
        }
        if let Some(local_host) = props.local_host {
            mapper.set_local_host(local_host);
        }
        if let Some(timeout) = props.timeout {
            mapper.set_timeout(timeout);
        }
        if let Some(strict) = props.strict_host_key_checking {
            mapper.set_strict_host_key_checking(&strict);
        }
        mapper
    }
}
