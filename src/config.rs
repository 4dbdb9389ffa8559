use std::env;
use std::str::FromStr;

use crate::errors::ConfigError;

/// The default resume ceiling: 5 MiB.
pub const DEFAULT_MAX_RESUME_SIZE: usize = 5 * 1024 * 1024;

/// The default chunk size for chunked blob stores: 255 KiB.
pub const DEFAULT_CHUNK_SIZE: usize = 255 * 1024;

/// Where candidate records are kept.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DatabaseBackend {
    Postgres,
    Memory,
}

/// Where blob content is kept.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BlobStoreBackend {
    Postgres,
    S3,
    Memory,
}

impl FromStr for DatabaseBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "postgres" => Ok(DatabaseBackend::Postgres),
            "memory" => Ok(DatabaseBackend::Memory),
            _ => Err(()),
        }
    }
}

impl FromStr for BlobStoreBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "postgres" => Ok(BlobStoreBackend::Postgres),
            "s3" => Ok(BlobStoreBackend::S3),
            "memory" => Ok(BlobStoreBackend::Memory),
            _ => Err(()),
        }
    }
}

/// Process settings read from the environment.
#[derive(Clone, Debug)]
pub struct Settings {
    pub port: u16,
    pub admin_port: u16,
    pub base_url: String,
    pub candidates_path: String,
    pub cors_origin: String,
    pub database: DatabaseBackend,
    pub blob_store: BlobStoreBackend,
    pub db_connection_string: Option<String>,
    pub max_resume_size: usize,
    pub chunk_size: usize,
}

impl Settings {
    /// Reads settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Reads settings through `lookup`, which returns the value of the
    /// named variable if it's set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database: DatabaseBackend = parse_or(&lookup, "BACKEND_DB", DatabaseBackend::Postgres)?;
        let blob_store: BlobStoreBackend =
            parse_or(&lookup, "BACKEND_BLOB_STORE", BlobStoreBackend::Postgres)?;

        let db_connection_string = lookup("BACKEND_DB_CONNECTION_STRING");
        let needs_postgres =
            database == DatabaseBackend::Postgres || blob_store == BlobStoreBackend::Postgres;

        if needs_postgres && db_connection_string.is_none() {
            return Err(ConfigError::Missing("BACKEND_DB_CONNECTION_STRING"));
        }

        let chunk_size = parse_or(&lookup, "BACKEND_CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?;

        if chunk_size == 0 {
            return Err(ConfigError::Invalid {
                name: "BACKEND_CHUNK_SIZE",
                value: chunk_size.to_string(),
            });
        }

        let candidates_path =
            lookup("BACKEND_CANDIDATES_PATH").unwrap_or_else(|| "candidates".to_owned());

        // routes match it as a single path segment
        if candidates_path.is_empty() || candidates_path.contains('/') {
            return Err(ConfigError::Invalid {
                name: "BACKEND_CANDIDATES_PATH",
                value: candidates_path,
            });
        }

        let cors_origin =
            lookup("BACKEND_CORS_ORIGIN").unwrap_or_else(|| "http://localhost:3000".to_owned());

        // a bare scheme, host and port, as browsers send it
        let valid_origin = url::Url::parse(&cors_origin)
            .map(|url| url.origin().is_tuple() && url.path() == "/")
            .unwrap_or(false);

        if !valid_origin {
            return Err(ConfigError::Invalid {
                name: "BACKEND_CORS_ORIGIN",
                value: cors_origin,
            });
        }

        Ok(Settings {
            port: parse_or(&lookup, "BACKEND_PORT", 5000)?,
            admin_port: parse_or(&lookup, "BACKEND_ADMIN_PORT", 5001)?,
            base_url: lookup("BACKEND_BASE_URL")
                .unwrap_or_else(|| "http://localhost:5000/".to_owned()),
            candidates_path,
            cors_origin,
            database,
            blob_store,
            db_connection_string,
            max_resume_size: parse_or(&lookup, "BACKEND_MAX_RESUME_SIZE", DEFAULT_MAX_RESUME_SIZE)?,
            chunk_size,
        })
    }
}

/// Returns the value of the named environment variable if it exists.
pub fn get_variable(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();

        Settings::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn memory_backends_need_no_database() {
        let settings = settings(&[("BACKEND_DB", "memory"), ("BACKEND_BLOB_STORE", "memory")])
            .expect("read settings");

        assert_eq!(settings.port, 5000);
        assert_eq!(settings.admin_port, 5001);
        assert_eq!(settings.candidates_path, "candidates");
        assert_eq!(settings.max_resume_size, 5 * 1024 * 1024);
        assert_eq!(settings.chunk_size, 255 * 1024);
        assert!(settings.db_connection_string.is_none());
    }

    #[test]
    fn postgres_requires_connection_string() {
        let result = settings(&[("BACKEND_DB", "memory")]);

        assert!(matches!(
            result,
            Err(ConfigError::Missing("BACKEND_DB_CONNECTION_STRING"))
        ));
    }

    #[test]
    fn rejects_unknown_backends_and_bad_numbers() {
        assert!(matches!(
            settings(&[("BACKEND_DB", "mongo")]),
            Err(ConfigError::Invalid { name: "BACKEND_DB", .. })
        ));

        assert!(matches!(
            settings(&[
                ("BACKEND_DB", "memory"),
                ("BACKEND_BLOB_STORE", "memory"),
                ("BACKEND_PORT", "eighty")
            ]),
            Err(ConfigError::Invalid { name: "BACKEND_PORT", .. })
        ));

        assert!(matches!(
            settings(&[
                ("BACKEND_DB", "memory"),
                ("BACKEND_BLOB_STORE", "memory"),
                ("BACKEND_CHUNK_SIZE", "0")
            ]),
            Err(ConfigError::Invalid { name: "BACKEND_CHUNK_SIZE", .. })
        ));

        assert!(matches!(
            settings(&[
                ("BACKEND_DB", "memory"),
                ("BACKEND_BLOB_STORE", "memory"),
                ("BACKEND_CORS_ORIGIN", "http://localhost:3000/app")
            ]),
            Err(ConfigError::Invalid { name: "BACKEND_CORS_ORIGIN", .. })
        ));

        assert!(matches!(
            settings(&[
                ("BACKEND_DB", "memory"),
                ("BACKEND_BLOB_STORE", "memory"),
                ("BACKEND_CANDIDATES_PATH", "api/candidates")
            ]),
            Err(ConfigError::Invalid { name: "BACKEND_CANDIDATES_PATH", .. })
        ));
    }
}
