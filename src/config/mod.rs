// db-backup/src/config/mod.rs
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::BackupError;

pub const DEFAULT_KEY_PREFIX: &str = "backups/";
pub const DEFAULT_CRON: &str = "0 3 * * *";
pub const DEFAULT_RETENTION_DAYS: u32 = 7;

/// Env fallbacks for secrets left out of config.json.
pub const ENV_DATABASE_PASSWORD: &str = "DB_BACKUP_DATABASE_PASSWORD";
pub const ENV_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
pub const ENV_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";

// Structs for deserializing config.json
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawJsonConfig {
    pub enabled: Option<bool>,
    pub cron: Option<String>,
    pub retention_days: Option<u32>,
    pub work_dir: Option<PathBuf>,
    pub database: Option<BackupConfig>,
    pub aws: Option<StoreConfig>,
}

/// Connection parameters handed to `pg_dump`.
///
/// Fields stay optional so a partially filled section can still be loaded;
/// [`BackupConfig::validate`] decides whether a cycle may start.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupConfig {
    pub host: Option<String>,
    /// Accepts `5432` or `"5432"`; a blank string counts as unset.
    #[serde(default, deserialize_with = "port_from_number_or_string")]
    pub port: Option<u16>,
    #[serde(alias = "name")]
    pub database_name: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Explicit pg_dump binary; resolved from PATH when absent.
    pub pg_dump_path: Option<PathBuf>,
}

fn port_from_number_or_string<'de, D>(deserializer: D) -> std::result::Result<Option<u16>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PortValue {
        Number(u16),
        Text(String),
    }

    match Option::<PortValue>::deserialize(deserializer)? {
        None => Ok(None),
        Some(PortValue::Number(port)) => Ok(Some(port)),
        Some(PortValue::Text(text)) => {
            let text = text.trim();
            if text.is_empty() {
                return Ok(None);
            }
            text.parse::<u16>().map(Some).map_err(|_| {
                serde::de::Error::custom(format!("invalid port `{text}`: expected 0-65535"))
            })
        }
    }
}

/// Borrowed view of a [`BackupConfig`] with every required field present.
#[derive(Clone, Copy)]
pub struct ConnectionParams<'a> {
    pub host: &'a str,
    pub port: u16,
    pub database_name: &'a str,
    pub user: &'a str,
    pub password: &'a str,
}

#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    pub bucket: Option<String>,
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    #[serde(alias = "prefix")]
    pub key_prefix: Option<String>,
    /// Custom endpoint for S3-compatible providers (Spaces, MinIO).
    pub endpoint_url: Option<String>,
}

/// Validated object store settings.
#[derive(Clone)]
pub struct StoreSettings {
    pub bucket: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub key_prefix: String,
    pub endpoint_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub retention_days: u32,
}

// Application's internal configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub enabled: bool,
    pub cron: String,
    pub retention: RetentionPolicy,
    pub work_dir: PathBuf,
    pub database: BackupConfig,
    pub aws: StoreConfig,
}

fn required<'a>(value: &'a Option<String>, field: &str, section: &str) -> crate::errors::Result<&'a str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| BackupError::config(format!("{section}.{field} is missing or empty")))
}

impl BackupConfig {
    pub fn validate(&self) -> crate::errors::Result<ConnectionParams<'_>> {
        let host = required(&self.host, "host", "database")?;
        let port = self
            .port
            .filter(|p| *p != 0)
            .ok_or_else(|| BackupError::config("database.port is missing or zero"))?;
        let database_name = required(&self.database_name, "databaseName", "database")?;
        let user = required(&self.user, "user", "database")?;
        // Passwords are taken verbatim; only absence is an error.
        let password = self
            .password
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| BackupError::config("database.password is missing or empty"))?;

        Ok(ConnectionParams {
            host,
            port,
            database_name,
            user,
            password,
        })
    }
}

impl StoreConfig {
    pub fn validate(&self) -> crate::errors::Result<StoreSettings> {
        let bucket = required(&self.bucket, "bucket", "aws")?;
        let region = required(&self.region, "region", "aws")?;
        let access_key_id = required(&self.access_key_id, "accessKeyId", "aws")?;
        let secret_access_key = self
            .secret_access_key
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| BackupError::config("aws.secretAccessKey is missing or empty"))?;

        Ok(StoreSettings {
            bucket: bucket.to_string(),
            region: region.to_string(),
            access_key_id: access_key_id.to_string(),
            secret_access_key: secret_access_key.to_string(),
            key_prefix: self
                .key_prefix
                .clone()
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| DEFAULT_KEY_PREFIX.to_string()),
            endpoint_url: self.endpoint_url.clone().filter(|u| !u.trim().is_empty()),
        })
    }
}

impl RetentionPolicy {
    pub fn new(retention_days: u32) -> Self {
        Self { retention_days }
    }

    /// Maximum object age; pure elapsed time, no calendar arithmetic.
    pub fn max_age(&self) -> crate::errors::Result<chrono::Duration> {
        if self.retention_days == 0 {
            return Err(BackupError::config("retentionDays must be a positive integer"));
        }
        Ok(chrono::Duration::days(i64::from(self.retention_days)))
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION_DAYS)
    }
}

impl fmt::Debug for BackupConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackupConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database_name", &self.database_name)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("pg_dump_path", &self.pg_dump_path)
            .finish()
    }
}

impl fmt::Debug for ConnectionParams<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database_name", &self.database_name)
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &self.secret_access_key.as_ref().map(|_| "***"))
            .field("key_prefix", &self.key_prefix)
            .field("endpoint_url", &self.endpoint_url)
            .finish()
    }
}

impl fmt::Debug for StoreSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreSettings")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("key_prefix", &self.key_prefix)
            .field("endpoint_url", &self.endpoint_url)
            .finish_non_exhaustive()
    }
}

impl AppConfig {
    pub fn load_from_json(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file at {}", config_path.display()))?;
        let raw_json_config: RawJsonConfig = serde_json::from_str(&config_content)
            .with_context(|| {
                format!(
                    "Failed to parse JSON from config file at {}",
                    config_path.display()
                )
            })?;

        Self::from_raw(raw_json_config, |name| std::env::var(name).ok())
    }

    /// Resolves defaults and env fallbacks. `env` is injected so callers
    /// (and tests) control where secrets come from.
    pub fn from_raw<F>(raw: RawJsonConfig, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut database = raw
            .database
            .context("`database` section must be set in config.json")?;
        let mut aws = raw.aws.context("`aws` section must be set in config.json")?;

        if database.password.as_deref().is_none_or(str::is_empty) {
            database.password = env(ENV_DATABASE_PASSWORD);
        }
        if aws.access_key_id.as_deref().is_none_or(str::is_empty) {
            aws.access_key_id = env(ENV_ACCESS_KEY_ID);
        }
        if aws.secret_access_key.as_deref().is_none_or(str::is_empty) {
            aws.secret_access_key = env(ENV_SECRET_ACCESS_KEY);
        }

        let work_dir = raw
            .work_dir
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| std::env::temp_dir().join("db-backup"));

        Ok(AppConfig {
            enabled: raw.enabled.unwrap_or(true),
            cron: raw.cron.unwrap_or_else(|| DEFAULT_CRON.to_string()),
            retention: RetentionPolicy::new(raw.retention_days.unwrap_or(DEFAULT_RETENTION_DAYS)),
            work_dir,
            database,
            aws,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn full_database() -> BackupConfig {
        BackupConfig {
            host: Some("db.internal".into()),
            port: Some(5432),
            database_name: Some("app".into()),
            user: Some("backup".into()),
            password: Some("s3cret".into()),
            pg_dump_path: None,
        }
    }

    fn full_store() -> StoreConfig {
        StoreConfig {
            bucket: Some("mybucket".into()),
            region: Some("eu-west-1".into()),
            access_key_id: Some("AKIA".into()),
            secret_access_key: Some("secret".into()),
            key_prefix: None,
            endpoint_url: None,
        }
    }

    #[test]
    fn test_load_full_config() -> anyhow::Result<()> {
        let raw: RawJsonConfig = serde_json::from_value(json!({
            "enabled": false,
            "cron": "*/5 * * * *",
            "retentionDays": 14,
            "workDir": "/var/tmp/dumps",
            "database": {
                "host": "localhost",
                "port": 5433,
                "name": "strapi",
                "user": "postgres",
                "password": "pw"
            },
            "aws": {
                "bucket": "mybucket",
                "region": "us-east-1",
                "accessKeyId": "key",
                "secretAccessKey": "secret",
                "prefix": "nightly/",
                "endpointUrl": "https://fra1.digitaloceanspaces.com"
            }
        }))?;
        let config = AppConfig::from_raw(raw, no_env)?;

        assert!(!config.enabled);
        assert_eq!(config.cron, "*/5 * * * *");
        assert_eq!(config.retention.retention_days, 14);
        assert_eq!(config.work_dir, PathBuf::from("/var/tmp/dumps"));
        assert_eq!(config.database.database_name.as_deref(), Some("strapi"));
        assert_eq!(config.database.port, Some(5433));

        let store = config.aws.validate()?;
        assert_eq!(store.key_prefix, "nightly/");
        assert_eq!(store.endpoint_url.as_deref(), Some("https://fra1.digitaloceanspaces.com"));
        Ok(())
    }

    #[test]
    fn test_defaults_applied() -> anyhow::Result<()> {
        let raw: RawJsonConfig = serde_json::from_value(json!({
            "database": { "host": "h", "port": 5432, "databaseName": "d", "user": "u", "password": "p" },
            "aws": { "bucket": "b", "region": "r", "accessKeyId": "a", "secretAccessKey": "s" }
        }))?;
        let config = AppConfig::from_raw(raw, no_env)?;

        assert!(config.enabled);
        assert_eq!(config.cron, DEFAULT_CRON);
        assert_eq!(config.retention, RetentionPolicy::new(7));
        assert_eq!(config.aws.validate()?.key_prefix, DEFAULT_KEY_PREFIX);
        Ok(())
    }

    #[test]
    fn test_secrets_fall_back_to_env() -> anyhow::Result<()> {
        let raw: RawJsonConfig = serde_json::from_value(json!({
            "database": { "host": "h", "port": 5432, "databaseName": "d", "user": "u" },
            "aws": { "bucket": "b", "region": "r" }
        }))?;
        let config = AppConfig::from_raw(raw, |name| match name {
            ENV_DATABASE_PASSWORD => Some("from-env".to_string()),
            ENV_ACCESS_KEY_ID => Some("env-key".to_string()),
            ENV_SECRET_ACCESS_KEY => Some("env-secret".to_string()),
            _ => None,
        })?;

        assert_eq!(config.database.validate()?.password, "from-env");
        let store = config.aws.validate()?;
        assert_eq!(store.access_key_id, "env-key");
        assert_eq!(store.secret_access_key, "env-secret");
        Ok(())
    }

    #[test]
    fn test_missing_sections_rejected() -> anyhow::Result<()> {
        let raw: RawJsonConfig = serde_json::from_value(json!({ "aws": {} }))?;
        assert!(AppConfig::from_raw(raw, no_env).is_err());

        let raw: RawJsonConfig = serde_json::from_value(json!({ "database": {} }))?;
        assert!(AppConfig::from_raw(raw, no_env).is_err());
        Ok(())
    }

    #[test]
    fn test_each_missing_database_field_is_config_error() {
        let strip: [fn(&mut BackupConfig); 5] = [
            |c| c.host = None,
            |c| c.port = None,
            |c| c.database_name = Some("  ".into()),
            |c| c.user = None,
            |c| c.password = Some(String::new()),
        ];
        for f in strip {
            let mut config = full_database();
            f(&mut config);
            assert!(matches!(config.validate(), Err(BackupError::Configuration(_))));
        }
        assert!(full_database().validate().is_ok());
    }

    #[test]
    fn test_each_missing_store_field_is_config_error() {
        let strip: [fn(&mut StoreConfig); 4] = [
            |c| c.bucket = None,
            |c| c.region = Some(String::new()),
            |c| c.access_key_id = None,
            |c| c.secret_access_key = None,
        ];
        for f in strip {
            let mut config = full_store();
            f(&mut config);
            assert!(matches!(config.validate(), Err(BackupError::Configuration(_))));
        }
    }

    #[test]
    fn test_zero_retention_rejected() {
        assert!(matches!(
            RetentionPolicy::new(0).max_age(),
            Err(BackupError::Configuration(_))
        ));
        assert_eq!(
            RetentionPolicy::new(7).max_age().ok(),
            Some(chrono::Duration::days(7))
        );
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let rendered = format!("{:?} {:?}", full_database(), full_store());
        assert!(!rendered.contains("s3cret"));
        assert!(!rendered.contains("\"secret\""));
        assert!(rendered.contains("***"));
    }

    #[test]
    fn test_connection_params_debug_hides_password() {
        let db = full_database();
        let rendered = format!("{:?}", db.validate().unwrap());
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("password: \"***\""));
        assert!(rendered.contains("db.internal"));
    }

    #[test]
    fn test_port_accepts_number_or_string() {
        let parse = |port: serde_json::Value| {
            serde_json::from_value::<BackupConfig>(json!({ "host": "h", "port": port }))
        };

        assert_eq!(parse(json!(5432)).unwrap().port, Some(5432));
        assert_eq!(parse(json!("5433")).unwrap().port, Some(5433));
        assert_eq!(parse(json!(" 5434 ")).unwrap().port, Some(5434));
        assert_eq!(parse(json!("  ")).unwrap().port, None);
        assert_eq!(parse(serde_json::Value::Null).unwrap().port, None);
        assert!(parse(json!("postgres")).is_err());
        assert!(parse(json!(70000)).is_err());
    }

    #[test]
    fn test_port_omitted_defaults_to_none() {
        let db: BackupConfig = serde_json::from_value(json!({ "host": "h" })).unwrap();
        assert_eq!(db.port, None);
    }
}
