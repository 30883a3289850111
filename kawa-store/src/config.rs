//! Backend Configuration
//!
//! Sensible defaults, builder pattern, all fields public.

// =============================================================================
// ObjectConfig
// =============================================================================

/// Configuration for the object-store backend.
///
/// # Example
///
/// ```
/// use kawa_store::config::ObjectConfig;
///
/// let config = ObjectConfig::default().with_prefix("tenants/acme");
/// assert_eq!(config.prefix.as_deref(), Some("tenants/acme"));
/// ```
#[derive(Debug, Clone)]
pub struct ObjectConfig {
    /// Path prefix prepended to every generated address.
    ///
    /// Default: none
    pub prefix: Option<String>,

    /// Content type for JSON-serialized objects.
    ///
    /// Default: `application/json`
    pub json_content_type: String,

    /// Content type for raw byte objects.
    ///
    /// Default: `application/octet-stream`
    pub bytes_content_type: String,
}

impl Default for ObjectConfig {
    fn default() -> Self {
        Self {
            prefix: None,
            json_content_type: "application/json".to_string(),
            bytes_content_type: "application/octet-stream".to_string(),
        }
    }
}

impl ObjectConfig {
    /// Create a config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the path prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }
}

// =============================================================================
// PostgresConfig
// =============================================================================

/// Configuration for the Postgres backend.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Connection URL (`postgres://...`).
    pub url: String,

    /// Maximum pool connections.
    ///
    /// Default: 10
    pub max_connections: u32,
}

impl PostgresConfig {
    /// Create a config for a connection URL.
    ///
    /// # Panics
    /// Panics if the URL is not a postgres URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        // Preconditions
        assert!(
            url.starts_with("postgres://") || url.starts_with("postgresql://"),
            "connection string must be a postgres URL"
        );
        Self {
            url,
            max_connections: 10,
        }
    }

    /// Set the maximum pool connections.
    ///
    /// # Panics
    /// Panics if `max_connections` is zero.
    #[must_use]
    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        assert!(max_connections > 0, "pool must allow at least one connection");
        self.max_connections = max_connections;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_config_defaults() {
        let config = ObjectConfig::default();
        assert!(config.prefix.is_none());
        assert_eq!(config.json_content_type, "application/json");
    }

    #[test]
    #[should_panic(expected = "postgres URL")]
    fn test_postgres_config_rejects_non_postgres_url() {
        let _ = PostgresConfig::new("mysql://localhost/db");
    }
}
