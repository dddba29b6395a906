//! Multi-hop route syntax.
//!
//! A route lists the SSH hosts a tunnel travels through, in order:
//!
//! ```text
//! bastion -> deploy@inner.example.com:2222 -> db-gateway
//! ```
//!
//! Each hop is `[user@]host[:port]`. Hosts and users are non-empty tokens of
//! ASCII letters, digits, `.`, `_` and `-`. Whitespace around `->` is
//! insignificant; whitespace inside a hop is not allowed. Hops without a
//! port use the configured SSH port, hops without a user use the login user.

use std::fmt;
use std::str::FromStr;

use super::error::{Result, SshError};

/// Separator between hops.
pub const HOP_SEPARATOR: &str = "->";

/// One SSH host in a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hop {
    user: Option<String>,
    host: String,
    port: Option<u16>,
}

impl Hop {
    /// Create a hop for `host` with no explicit user or port.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            user: None,
            host: host.into(),
            port: None,
        }
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// The hop's port, falling back to `default`.
    pub fn port_or(&self, default: u16) -> u16 {
        self.port.unwrap_or(default)
    }
}

impl FromStr for Hop {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (user, rest) = match s.split_once('@') {
            Some((user, rest)) => {
                if !is_token(user) {
                    return Err(format!("Invalid user in hop '{}'", s));
                }
                (Some(user.to_string()), rest)
            }
            None => (None, s),
        };

        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port_str)) => {
                let port = port_str
                    .parse::<u16>()
                    .ok()
                    .filter(|port| *port != 0)
                    .ok_or_else(|| format!("Invalid port in hop '{}'", s))?;
                (host, Some(port))
            }
            None => (rest, None),
        };

        if !is_token(host) {
            return Err(format!("Invalid host in hop '{}'", s));
        }

        Ok(Self {
            user,
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for Hop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(user) = &self.user {
            write!(f, "{}@", user)?;
        }
        write!(f, "{}", self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        Ok(())
    }
}

/// An ordered, non-empty list of hops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    hops: Vec<Hop>,
}

impl Route {
    /// Parse a non-blank route expression.
    pub fn parse(route: &str) -> Result<Self> {
        let invalid = || SshError::configuration("route", format!("Invalid SSH tunnel route: '{}'", route));

        let hops = route
            .split(HOP_SEPARATOR)
            .map(|hop| {
                let hop = hop.trim();
                if hop.chars().any(char::is_whitespace) {
                    return Err(invalid());
                }
                hop.parse::<Hop>().map_err(|_| invalid())
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { hops })
    }

    /// Whether `route` is acceptable in settings. Missing or blank routes
    /// are accepted and mean a direct tunnel.
    pub fn is_valid(route: Option<&str>) -> bool {
        match route {
            Some(route) if !route.trim().is_empty() => Self::parse(route).is_ok(),
            _ => true,
        }
    }

    /// A single-hop route straight to `host`.
    pub fn direct(host: impl Into<String>) -> Self {
        Self {
            hops: vec![Hop::new(host)],
        }
    }

    pub fn hops(&self) -> &[Hop] {
        &self.hops
    }

    /// The last hop, which opens the forwarded channel to the destination.
    pub fn last(&self) -> &Hop {
        // A parsed route always holds at least one hop.
        &self.hops[self.hops.len() - 1]
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, hop) in self.hops.iter().enumerate() {
            if i > 0 {
                f.write_str(HOP_SEPARATOR)?;
            }
            write!(f, "{}", hop)?;
        }
        Ok(())
    }
}

/// Remove every whitespace character from a route expression.
pub fn strip_whitespace(route: &str) -> String {
    route.chars().filter(|c| !c.is_whitespace()).collect()
}

fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}
