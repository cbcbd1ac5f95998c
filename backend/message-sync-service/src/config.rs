use crate::error::AppError;
use dotenvy::dotenv;
use std::env;
use std::time::Duration;
use uuid::Uuid;

/// Longest recall window accepted, one week.
pub const MAX_RECALL_WINDOW_SECS: i64 = 7 * 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationBackend {
    Redis,
    Memory,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub port: u16,
    pub outbound_queue_capacity: usize,
    pub heartbeat_interval: Duration,
    pub idle_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub default_limit: usize,
    pub max_limit: usize,
    pub domain_timeout: Duration,
}

/// Base URLs of the collaborating domains. An unset domain is omitted from sync.
#[derive(Debug, Clone, Default)]
pub struct DomainEndpoints {
    pub relationship_url: Option<String>,
    pub group_url: Option<String>,
    pub session_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub redis_url: Option<String>,
    pub http_port: u16,
    pub jwt_secret: String,
    pub storage: StorageBackend,
    pub notifications: NotificationBackend,
    pub recall_window_secs: i64,
    pub max_content_length: usize,
    pub gateway: GatewayConfig,
    pub sync: SyncConfig,
    pub domains: DomainEndpoints,
    /// Conversations preloaded into the in-memory membership directory
    pub memory_conversations: Vec<(Uuid, Vec<Uuid>)>,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_vars<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(
            lookup: &dyn Fn(&str) -> Option<String>,
            key: &str,
            default: T,
        ) -> Result<T, AppError> {
            match lookup(key) {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .map_err(|_| AppError::Config(format!("{key} has an invalid value: {raw}"))),
                None => Ok(default),
            }
        }
        let lookup: &dyn Fn(&str) -> Option<String> = &lookup;
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let jwt_secret = non_empty("JWT_SECRET")
            .ok_or_else(|| AppError::Config("JWT_SECRET missing".into()))?;

        let storage = match non_empty("STORAGE_BACKEND").as_deref() {
            None | Some("postgres") => StorageBackend::Postgres,
            Some("memory") => StorageBackend::Memory,
            Some(other) => {
                return Err(AppError::Config(format!(
                    "STORAGE_BACKEND must be postgres or memory, got {other}"
                )))
            }
        };

        let notifications = match non_empty("NOTIFICATION_BACKEND").as_deref() {
            None | Some("redis") => NotificationBackend::Redis,
            Some("memory") => NotificationBackend::Memory,
            Some(other) => {
                return Err(AppError::Config(format!(
                    "NOTIFICATION_BACKEND must be redis or memory, got {other}"
                )))
            }
        };

        let database_url = non_empty("DATABASE_URL");
        if storage == StorageBackend::Postgres && database_url.is_none() {
            return Err(AppError::Config(
                "DATABASE_URL missing (required for postgres storage)".into(),
            ));
        }

        let db_max_connections: u32 = parsed(lookup, "DB_MAX_CONNECTIONS", 20)?;
        if db_max_connections == 0 {
            return Err(AppError::Config("DB_MAX_CONNECTIONS must be positive".into()));
        }

        let redis_url = non_empty("REDIS_URL");
        if notifications == NotificationBackend::Redis && redis_url.is_none() {
            return Err(AppError::Config(
                "REDIS_URL missing (required for redis notifications)".into(),
            ));
        }

        let heartbeat_secs: u64 = parsed(lookup, "WS_HEARTBEAT_INTERVAL_SECS", 25)?;
        let idle_secs: u64 = parsed(lookup, "WS_IDLE_TIMEOUT_SECS", 60)?;
        if heartbeat_secs == 0 || heartbeat_secs >= idle_secs {
            return Err(AppError::Config(format!(
                "WS_HEARTBEAT_INTERVAL_SECS ({heartbeat_secs}) must be positive and shorter than WS_IDLE_TIMEOUT_SECS ({idle_secs})"
            )));
        }

        let default_limit: usize = parsed(lookup, "SYNC_DEFAULT_LIMIT", 100)?;
        let max_limit: usize = parsed(lookup, "SYNC_MAX_LIMIT", 500)?;
        if default_limit == 0 || default_limit > max_limit {
            return Err(AppError::Config(
                "SYNC_DEFAULT_LIMIT must be between 1 and SYNC_MAX_LIMIT".into(),
            ));
        }

        let recall_window_secs: i64 = parsed(lookup, "RECALL_WINDOW_SECS", 120)?;
        if !(0..=MAX_RECALL_WINDOW_SECS).contains(&recall_window_secs) {
            return Err(AppError::Config(format!(
                "RECALL_WINDOW_SECS must be between 0 and {MAX_RECALL_WINDOW_SECS}"
            )));
        }

        let memory_conversations = match non_empty("MEMORY_CONVERSATIONS") {
            Some(raw) if storage == StorageBackend::Memory => parse_conversation_seed(&raw)?,
            Some(_) => {
                return Err(AppError::Config(
                    "MEMORY_CONVERSATIONS only applies to memory storage".into(),
                ))
            }
            None => Vec::new(),
        };

        Ok(Self {
            database_url,
            db_max_connections,
            redis_url,
            http_port: parsed(lookup, "HTTP_PORT", 8080)?,
            jwt_secret,
            storage,
            notifications,
            recall_window_secs,
            max_content_length: parsed(lookup, "MAX_CONTENT_LENGTH", 16 * 1024)?,
            gateway: GatewayConfig {
                port: parsed(lookup, "WS_PORT", 8081)?,
                outbound_queue_capacity: parsed::<usize>(lookup, "OUTBOUND_QUEUE_CAPACITY", 64)?
                    .max(1),
                heartbeat_interval: Duration::from_secs(heartbeat_secs),
                idle_timeout: Duration::from_secs(idle_secs),
            },
            sync: SyncConfig {
                default_limit,
                max_limit,
                domain_timeout: Duration::from_millis(parsed(
                    lookup,
                    "SYNC_DOMAIN_TIMEOUT_MS",
                    3000,
                )?),
            },
            domains: DomainEndpoints {
                relationship_url: non_empty("RELATIONSHIP_SERVICE_URL"),
                group_url: non_empty("GROUP_SERVICE_URL"),
                session_url: non_empty("SESSION_SERVICE_URL"),
            },
            memory_conversations,
        })
    }
}

/// Parses `conversation=member,member;conversation=member`.
fn parse_conversation_seed(raw: &str) -> Result<Vec<(Uuid, Vec<Uuid>)>, AppError> {
    let invalid = |entry: &str| {
        AppError::Config(format!("MEMORY_CONVERSATIONS has an invalid entry: {entry}"))
    };

    raw.split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (conversation, members) = entry.split_once('=').ok_or_else(|| invalid(entry))?;
            let conversation = Uuid::parse_str(conversation.trim()).map_err(|_| invalid(entry))?;
            let members = members
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(|m| Uuid::parse_str(m).map_err(|_| invalid(entry)))
                .collect::<Result<Vec<_>, _>>()?;
            Ok((conversation, members))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, AppError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_vars(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_with_memory_backends() {
        let config = config_from(&[
            ("JWT_SECRET", "secret"),
            ("STORAGE_BACKEND", "memory"),
            ("NOTIFICATION_BACKEND", "memory"),
        ])
        .unwrap();

        assert_eq!(config.http_port, 8080);
        assert_eq!(config.gateway.port, 8081);
        assert_eq!(config.recall_window_secs, 120);
        assert_eq!(config.gateway.outbound_queue_capacity, 64);
        assert_eq!(config.sync.default_limit, 100);
        assert_eq!(config.sync.max_limit, 500);
        assert!(config.domains.relationship_url.is_none());
        assert_eq!(config.db_max_connections, 20);
        assert!(config.memory_conversations.is_empty());
    }

    #[test]
    fn test_db_max_connections() {
        let config = config_from(&[
            ("JWT_SECRET", "secret"),
            ("DATABASE_URL", "postgres://localhost/im"),
            ("NOTIFICATION_BACKEND", "memory"),
            ("DB_MAX_CONNECTIONS", "5"),
        ])
        .unwrap();
        assert_eq!(config.db_max_connections, 5);

        let err = config_from(&[
            ("JWT_SECRET", "secret"),
            ("DATABASE_URL", "postgres://localhost/im"),
            ("NOTIFICATION_BACKEND", "memory"),
            ("DB_MAX_CONNECTIONS", "0"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("DB_MAX_CONNECTIONS"));
    }

    #[test]
    fn test_recall_window_is_bounded() {
        for value in ["-1", "604801", "9223372036854775807"] {
            let err = config_from(&[
                ("JWT_SECRET", "secret"),
                ("STORAGE_BACKEND", "memory"),
                ("NOTIFICATION_BACKEND", "memory"),
                ("RECALL_WINDOW_SECS", value),
            ])
            .unwrap_err();
            assert!(err.to_string().contains("RECALL_WINDOW_SECS"), "{value}");
        }

        let config = config_from(&[
            ("JWT_SECRET", "secret"),
            ("STORAGE_BACKEND", "memory"),
            ("NOTIFICATION_BACKEND", "memory"),
            ("RECALL_WINDOW_SECS", "604800"),
        ])
        .unwrap();
        assert_eq!(config.recall_window_secs, MAX_RECALL_WINDOW_SECS);
    }

    #[test]
    fn test_memory_conversation_seed() {
        let (conversation, alice, bob) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let seed = format!("{conversation}={alice}, {bob};");
        let config = config_from(&[
            ("JWT_SECRET", "secret"),
            ("STORAGE_BACKEND", "memory"),
            ("NOTIFICATION_BACKEND", "memory"),
            ("MEMORY_CONVERSATIONS", seed.as_str()),
        ])
        .unwrap();
        assert_eq!(config.memory_conversations, vec![(conversation, vec![alice, bob])]);

        let err = config_from(&[
            ("JWT_SECRET", "secret"),
            ("STORAGE_BACKEND", "memory"),
            ("NOTIFICATION_BACKEND", "memory"),
            ("MEMORY_CONVERSATIONS", "not-a-uuid=also-not"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("MEMORY_CONVERSATIONS"));

        let err = config_from(&[
            ("JWT_SECRET", "secret"),
            ("DATABASE_URL", "postgres://localhost/im"),
            ("NOTIFICATION_BACKEND", "memory"),
            ("MEMORY_CONVERSATIONS", seed.as_str()),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("memory storage"));
    }

    #[test]
    fn test_postgres_requires_database_url() {
        let err = config_from(&[("JWT_SECRET", "secret"), ("NOTIFICATION_BACKEND", "memory")])
            .unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn test_missing_jwt_secret() {
        let err = config_from(&[
            ("STORAGE_BACKEND", "memory"),
            ("NOTIFICATION_BACKEND", "memory"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("JWT_SECRET"));
    }

    #[test]
    fn test_heartbeat_must_be_shorter_than_idle_timeout() {
        let err = config_from(&[
            ("JWT_SECRET", "secret"),
            ("STORAGE_BACKEND", "memory"),
            ("NOTIFICATION_BACKEND", "memory"),
            ("WS_HEARTBEAT_INTERVAL_SECS", "60"),
            ("WS_IDLE_TIMEOUT_SECS", "60"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("WS_HEARTBEAT_INTERVAL_SECS"));
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let err = config_from(&[
            ("JWT_SECRET", "secret"),
            ("STORAGE_BACKEND", "memory"),
            ("NOTIFICATION_BACKEND", "memory"),
            ("RECALL_WINDOW_SECS", "two minutes"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("RECALL_WINDOW_SECS"));
    }
}
