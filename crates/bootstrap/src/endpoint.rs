//! The database's network endpoint.

use crate::settings::{SettingsError, POSTGRES_DATABASE_URL};
use std::fmt;
use url::{Host, Url};

/// Port PostgreSQL listens on when the URL does not name one.
pub const DEFAULT_POSTGRES_PORT: u16 = 5432;

/// Host and port the dependency-wait loop probes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbEndpoint {
    pub host: String,
    pub port: u16,
}

impl DbEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Extract the endpoint from a connection URL such as
    /// `postgresql://user:pass@db:5432/poi` or `postgresql+psycopg2://db/poi`.
    pub fn from_database_url(database_url: &str) -> Result<Self, SettingsError> {
        let invalid = |reason: String| SettingsError::Invalid {
            name: POSTGRES_DATABASE_URL,
            reason,
        };

        let url = Url::parse(database_url).map_err(|e| invalid(e.to_string()))?;
        if !url.scheme().starts_with("postgres") {
            return Err(invalid(format!("unsupported scheme `{}`", url.scheme())));
        }

        let host = match url.host() {
            Some(Host::Domain(domain)) if !domain.is_empty() => domain.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            _ => return Err(invalid("no host to connect to".to_string())),
        };

        Ok(Self {
            host,
            port: url.port().unwrap_or(DEFAULT_POSTGRES_PORT),
        })
    }
}

impl fmt::Display for DbEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_style_url() {
        let endpoint = DbEndpoint::from_database_url("postgresql://poi:secret@db:5432/poi").unwrap();
        assert_eq!(endpoint, DbEndpoint::new("db", 5432));
        assert_eq!(endpoint.to_string(), "db:5432");
    }

    #[test]
    fn port_defaults_to_postgres() {
        let endpoint = DbEndpoint::from_database_url("postgres://localhost/poi").unwrap();
        assert_eq!(endpoint.port, DEFAULT_POSTGRES_PORT);
    }

    #[test]
    fn driver_qualified_scheme_is_accepted() {
        let endpoint =
            DbEndpoint::from_database_url("postgresql+psycopg2://app@10.0.0.7:6543/poi").unwrap();
        assert_eq!(endpoint, DbEndpoint::new("10.0.0.7", 6543));
    }

    #[test]
    fn ipv6_hosts_are_bracketed_for_display() {
        let endpoint = DbEndpoint::from_database_url("postgresql://[::1]:5433/poi").unwrap();
        assert_eq!(endpoint.host, "::1");
        assert_eq!(endpoint.to_string(), "[::1]:5433");
    }

    #[test]
    fn urls_without_a_host_are_rejected() {
        assert!(DbEndpoint::from_database_url("postgresql:///poi").is_err());
        assert!(DbEndpoint::from_database_url("mysql://db/poi").is_err());
        assert!(DbEndpoint::from_database_url("db:5432").is_err());
    }
}
