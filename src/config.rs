use crate::core::{OdmError, Result};

const SCHEME: &str = "memodoc://";

/// Configuration for the bundled in-memory gateway.
///
/// Built explicitly and handed to the gateway; there is no process-wide
/// connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Database name
    pub database: String,

    /// Capacity of each collection's change stream. Subscribers that fall
    /// further behind than this skip the oldest records.
    pub tail_buffer: usize,
}

impl GatewayConfig {
    pub fn new(database: &str) -> Self {
        Self {
            database: database.to_string(),
            tail_buffer: 64,
        }
    }

    pub fn database(mut self, database: &str) -> Self {
        self.database = database.to_string();
        self
    }

    pub fn tail_buffer(mut self, capacity: usize) -> Self {
        self.tail_buffer = capacity;
        self
    }

    /// Parse from connection string
    ///
    /// Format: "memodoc://memory/<database>[?tail_buffer=<n>]"
    pub fn from_url(url: &str) -> Result<Self> {
        let rest = url
            .strip_prefix(SCHEME)
            .ok_or_else(|| invalid(format!("URL must start with '{}'", SCHEME)))?;

        let (path, query) = match rest.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (rest, None),
        };

        let database = match path.split_once('/') {
            Some(("memory", database)) if !database.is_empty() && !database.contains('/') => {
                database
            }
            Some((backend, _)) if backend != "memory" => {
                return Err(invalid(format!("unsupported backend '{}'", backend)));
            }
            _ => return Err(invalid("expected memodoc://memory/<database>")),
        };

        let mut config = Self::new(database);
        for pair in query.into_iter().flat_map(|q| q.split('&')).filter(|p| !p.is_empty()) {
            match pair.split_once('=') {
                Some(("tail_buffer", value)) => {
                    config.tail_buffer = value
                        .parse()
                        .map_err(|_| invalid(format!("invalid tail_buffer '{}'", value)))?;
                }
                _ => return Err(invalid(format!("unknown option '{}'", pair))),
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn to_url(&self) -> String {
        format!(
            "{}memory/{}?tail_buffer={}",
            SCHEME, self.database, self.tail_buffer
        )
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.is_empty() {
            return Err(invalid("database cannot be empty"));
        }
        if self.tail_buffer == 0 {
            return Err(invalid("tail_buffer must be > 0"));
        }
        Ok(())
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::new("memodoc")
    }
}

fn invalid(message: impl Into<String>) -> OdmError {
    OdmError::Configuration(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_pattern() {
        let config = GatewayConfig::new("assets").tail_buffer(8);
        assert_eq!(config.database, "assets");
        assert_eq!(config.tail_buffer, 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_url() {
        let config = GatewayConfig::from_url("memodoc://memory/pipeline?tail_buffer=16").unwrap();
        assert_eq!(config.database, "pipeline");
        assert_eq!(config.tail_buffer, 16);
        assert_eq!(GatewayConfig::from_url(&config.to_url()).unwrap(), config);

        let config = GatewayConfig::from_url("memodoc://memory/pipeline").unwrap();
        assert_eq!(config.tail_buffer, 64);
    }

    #[test]
    fn test_invalid_url() {
        assert!(GatewayConfig::from_url("mongodb://localhost/db").is_err());
        assert!(GatewayConfig::from_url("memodoc://disk/db").is_err());
        assert!(GatewayConfig::from_url("memodoc://memory/").is_err());
        assert!(GatewayConfig::from_url("memodoc://memory/db?tail_buffer=0").is_err());
        assert!(GatewayConfig::from_url("memodoc://memory/db?retries=3").is_err());
    }
}
