//! Layered runtime configuration: INI file first, environment variables on top.
//!
//! The resolver never fails. A missing or malformed file simply contributes
//! nothing, and the `server`, `secret` and `database` sections are always
//! present in the resulting [`ConfigSnapshot`] (possibly empty).
//!
//! # File
//!
//! ```ini
//! [server]
//! name = meteostat-eu-1
//!
//! [secret]
//! name = X-Api-Key
//! value = s3cr3t
//! disable = false
//!
//! [database]
//! host = db.internal
//! port = 3306
//! user = meteostat
//! password = p@ss
//! name = meteostat
//! ```
//!
//! # Environment
//!
//! | Variable | Key |
//! |----------|-----|
//! | `METEOSTAT_SERVER_NAME` | `server.name` |
//! | `METEOSTAT_SECRET_NAME` | `secret.name` |
//! | `METEOSTAT_SECRET_VALUE` | `secret.value` |
//! | `METEOSTAT_SECRET_DISABLE` | `secret.disable` |
//! | `DATABASE_URL` | `database.url` |
//! | `METEOSTAT_DB_{HOST,PORT,USER,PASSWORD,NAME}` | `database.{host,port,user,password,name}` |
//!
//! When `DATABASE_URL` is set, the `METEOSTAT_DB_*` variables are not read.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use ini::{Ini, ParseOption};

/// Sections that always exist in a snapshot.
pub const SECTIONS: [&str; 3] = ["server", "secret", "database"];

/// Directory (under the user's home) holding the config file.
pub const CONFIG_DIR: &str = ".meteostat-server";

/// Config file name inside [`CONFIG_DIR`].
pub const CONFIG_FILE: &str = "config.ini";

/// Server name reported when `server.name` is not configured.
pub const DEFAULT_SERVER_NAME: &str = "meteostat-server";

/// Environment overrides that map one variable to one key.
const ENV_OVERRIDES: &[(&str, &str, &str)] = &[
    ("server", "name", "METEOSTAT_SERVER_NAME"),
    ("secret", "name", "METEOSTAT_SECRET_NAME"),
    ("secret", "value", "METEOSTAT_SECRET_VALUE"),
    ("secret", "disable", "METEOSTAT_SECRET_DISABLE"),
];

/// Individual database overrides, consulted only without `DATABASE_URL`.
const DB_ENV_OVERRIDES: &[(&str, &str)] = &[
    ("host", "METEOSTAT_DB_HOST"),
    ("port", "METEOSTAT_DB_PORT"),
    ("user", "METEOSTAT_DB_USER"),
    ("password", "METEOSTAT_DB_PASSWORD"),
    ("name", "METEOSTAT_DB_NAME"),
];

/// Errors raised while reading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file exists but could not be read or parsed.
    #[error("failed to load config file {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: ini::Error,
    },

    /// A value expected to be a boolean is not one.
    #[error("invalid boolean for {section}.{key}: '{value}'")]
    InvalidBool {
        section: String,
        key: String,
        value: String,
    },
}

/// Resolved configuration: section name -> (key -> value).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSnapshot {
    sections: BTreeMap<String, BTreeMap<String, String>>,
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        let sections = SECTIONS
            .iter()
            .map(|name| (name.to_string(), BTreeMap::new()))
            .collect();
        Self { sections }
    }
}

impl ConfigSnapshot {
    /// Look up a value. Section and key are matched case-insensitively.
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(&section.to_lowercase())?
            .get(&key.to_lowercase())
            .map(String::as_str)
    }

    /// Look up a value, falling back when absent.
    pub fn get_or<'a>(&'a self, section: &str, key: &str, fallback: &'a str) -> &'a str {
        self.get(section, key).unwrap_or(fallback)
    }

    /// Look up a non-empty value.
    pub fn get_non_empty(&self, section: &str, key: &str) -> Option<&str> {
        self.get(section, key).filter(|v| !v.is_empty())
    }

    /// Parse a value as an INI-style boolean. Absent keys are `false`.
    pub fn get_bool(&self, section: &str, key: &str) -> Result<bool, ConfigError> {
        let Some(raw) = self.get(section, key) else {
            return Ok(false);
        };
        match raw.trim().to_lowercase().as_str() {
            "1" | "yes" | "true" | "on" => Ok(true),
            "0" | "no" | "false" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidBool {
                section: section.to_string(),
                key: key.to_string(),
                value: raw.to_string(),
            }),
        }
    }

    /// All keys of one section, if it exists.
    pub fn section(&self, name: &str) -> Option<&BTreeMap<String, String>> {
        self.sections.get(&name.to_lowercase())
    }

    /// Name reported in the `X-Meteostat-Server` header.
    pub fn server_name(&self) -> &str {
        self.get_or("server", "name", DEFAULT_SERVER_NAME)
    }

    /// Set a value, creating the section if needed.
    pub fn set(&mut self, section: &str, key: &str, value: impl Into<String>) {
        self.sections
            .entry(section.to_lowercase())
            .or_default()
            .insert(key.to_lowercase(), value.into());
    }
}

/// Builds a [`ConfigSnapshot`] from an optional INI file and the environment.
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    path: Option<PathBuf>,
}

impl Default for ConfigResolver {
    fn default() -> Self {
        Self::new(default_config_path())
    }
}

impl ConfigResolver {
    /// Resolver reading `path` (if any) as the config file.
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    /// Path of the config file this resolver reads.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Resolve against the process environment.
    pub fn resolve(&self) -> ConfigSnapshot {
        self.resolve_with(|name| std::env::var(name).ok())
    }

    /// Resolve with a caller-supplied environment lookup.
    pub fn resolve_with<F>(&self, lookup: F) -> ConfigSnapshot
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut snapshot = ConfigSnapshot::default();

        if let Some(path) = self.path.as_deref().filter(|p| p.exists()) {
            match read_file(path) {
                Ok(sections) => {
                    for (section, values) in sections {
                        for (key, value) in values {
                            snapshot.set(&section, &key, value);
                        }
                    }
                    tracing::debug!(path = %path.display(), "config file loaded");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "ignoring unreadable config file");
                }
            }
        }

        for (section, key, var) in ENV_OVERRIDES {
            if let Some(value) = lookup(var) {
                snapshot.set(section, key, value);
            }
        }

        match lookup("DATABASE_URL").filter(|url| !url.is_empty()) {
            Some(url) => snapshot.set("database", "url", url),
            None => {
                for (key, var) in DB_ENV_OVERRIDES {
                    if let Some(value) = lookup(var) {
                        snapshot.set("database", key, value);
                    }
                }
            }
        }

        snapshot
    }
}

/// `~/.meteostat-server/config.ini`, or `None` without a home directory.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_DIR).join(CONFIG_FILE))
}

/// Resolve with the default file path and the process environment.
pub fn resolve() -> ConfigSnapshot {
    ConfigResolver::default().resolve()
}

/// Parse an INI file into sections of string values.
///
/// Values are kept literally: quotes and backslashes are not interpreted.
/// Keys outside of any section are dropped.
fn read_file(path: &Path) -> Result<HashMap<String, HashMap<String, String>>, ConfigError> {
    let options = ParseOption {
        enabled_quote: false,
        enabled_escape: false,
    };
    let ini = Ini::load_from_file_opt(path, options).map_err(|source| ConfigError::File {
        path: path.to_path_buf(),
        source,
    })?;

    let sections = ini
        .iter()
        .filter_map(|(section, properties)| {
            let values = properties
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect();
            section.map(|name| (name.to_string(), values))
        })
        .collect();

    Ok(sections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    /// Mutex to serialize config tests that manipulate env vars.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const ENV_KEYS: &[&str] = &[
        "METEOSTAT_SERVER_NAME",
        "METEOSTAT_SECRET_NAME",
        "METEOSTAT_SECRET_VALUE",
        "METEOSTAT_SECRET_DISABLE",
        "DATABASE_URL",
        "METEOSTAT_DB_HOST",
        "METEOSTAT_DB_PORT",
        "METEOSTAT_DB_USER",
        "METEOSTAT_DB_PASSWORD",
        "METEOSTAT_DB_NAME",
    ];

    /// Helper to run config tests with isolated env vars.
    /// Uses a mutex to prevent concurrent env var races.
    fn with_env_vars<F: FnOnce()>(vars: &[(&str, &str)], f: F) {
        let _guard = ENV_MUTEX.lock().unwrap();

        let saved: Vec<_> = ENV_KEYS
            .iter()
            .map(|k| (*k, std::env::var(k).ok()))
            .collect();

        // SAFETY: Serialized by mutex; only test code touches these vars.
        unsafe {
            for k in ENV_KEYS {
                std::env::remove_var(k);
            }
            for (k, v) in vars {
                std::env::set_var(k, v);
            }
        }

        f();

        // SAFETY: Restoring previous env state.
        unsafe {
            for (k, v) in &saved {
                match v {
                    Some(val) => std::env::set_var(k, val),
                    None => std::env::remove_var(k),
                }
            }
        }
    }

    fn write_ini(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn env_of(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn sections_exist_without_file_or_env() {
        let snapshot = ConfigResolver::new(None).resolve_with(env_of(&[]));
        for name in SECTIONS {
            assert!(snapshot.section(name).unwrap().is_empty());
        }
        assert_eq!(snapshot.server_name(), DEFAULT_SERVER_NAME);
    }

    #[test]
    fn missing_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = ConfigResolver::new(Some(dir.path().join("nope.ini")));
        let snapshot = resolver.resolve_with(env_of(&[("METEOSTAT_SERVER_NAME", "edge")]));
        assert_eq!(snapshot.get("server", "name"), Some("edge"));
    }

    #[test]
    fn file_values_are_loaded() {
        let file = write_ini(
            "[server]\nname = from-file\n\n[database]\nhost = db.internal\nport = 3307\n",
        );
        let snapshot =
            ConfigResolver::new(Some(file.path().to_path_buf())).resolve_with(env_of(&[]));
        assert_eq!(snapshot.get("server", "name"), Some("from-file"));
        assert_eq!(snapshot.get("database", "host"), Some("db.internal"));
        assert_eq!(snapshot.get("database", "port"), Some("3307"));
        assert!(snapshot.section("secret").unwrap().is_empty());
    }

    #[test]
    fn env_overrides_file() {
        let file = write_ini(
            "[server]\nname = from-file\n\n[secret]\nname = X-File\nvalue = file-secret\n",
        );
        let snapshot = ConfigResolver::new(Some(file.path().to_path_buf())).resolve_with(env_of(
            &[
                ("METEOSTAT_SERVER_NAME", "from-env"),
                ("METEOSTAT_SECRET_VALUE", "env-secret"),
            ],
        ));
        assert_eq!(snapshot.get("server", "name"), Some("from-env"));
        assert_eq!(snapshot.get("secret", "value"), Some("env-secret"));
        // Not overridden
        assert_eq!(snapshot.get("secret", "name"), Some("X-File"));
    }

    #[test]
    fn file_values_are_kept_literally() {
        let file = write_ini(
            r#"[database]
user = dom\user
password = "p@ss'w"
host = a\nb

[secret]
value = 'single' and "double"
"#,
        );
        let snapshot =
            ConfigResolver::new(Some(file.path().to_path_buf())).resolve_with(env_of(&[]));
        assert_eq!(snapshot.get("database", "user"), Some(r"dom\user"));
        assert_eq!(snapshot.get("database", "password"), Some(r#""p@ss'w""#));
        assert_eq!(snapshot.get("database", "host"), Some(r"a\nb"));
        assert_eq!(
            snapshot.get("secret", "value"),
            Some(r#"'single' and "double""#)
        );
    }

    #[test]
    fn set_but_empty_env_still_overrides() {
        let file = write_ini("[secret]\nname = X-File\n");
        let snapshot = ConfigResolver::new(Some(file.path().to_path_buf()))
            .resolve_with(env_of(&[("METEOSTAT_SECRET_NAME", "")]));
        assert_eq!(snapshot.get("secret", "name"), Some(""));
    }

    #[test]
    fn malformed_file_yields_empty_sections() {
        let file = write_ini("[server\nname = = =\n[[[\n");
        let snapshot = ConfigResolver::new(Some(file.path().to_path_buf()))
            .resolve_with(env_of(&[("METEOSTAT_SECRET_NAME", "X-Key")]));
        assert!(snapshot.section("server").unwrap().is_empty());
        assert!(snapshot.section("database").unwrap().is_empty());
        assert_eq!(snapshot.get("secret", "name"), Some("X-Key"));
    }

    #[test]
    fn database_url_suppresses_individual_vars() {
        let snapshot = ConfigResolver::new(None).resolve_with(env_of(&[
            ("DATABASE_URL", "postgres://u:p@pg/db"),
            ("METEOSTAT_DB_HOST", "ignored"),
            ("METEOSTAT_DB_USER", "ignored"),
        ]));
        assert_eq!(snapshot.get("database", "url"), Some("postgres://u:p@pg/db"));
        assert_eq!(snapshot.get("database", "host"), None);
        assert_eq!(snapshot.get("database", "user"), None);
    }

    #[test]
    fn empty_database_url_falls_back_to_individual_vars() {
        let snapshot = ConfigResolver::new(None).resolve_with(env_of(&[
            ("DATABASE_URL", ""),
            ("METEOSTAT_DB_HOST", "db"),
        ]));
        assert_eq!(snapshot.get("database", "url"), None);
        assert_eq!(snapshot.get("database", "host"), Some("db"));
    }

    #[test]
    fn individual_db_vars_overlay_file_independently() {
        let file = write_ini("[database]\nhost = file-host\nuser = file-user\n");
        let snapshot = ConfigResolver::new(Some(file.path().to_path_buf()))
            .resolve_with(env_of(&[("METEOSTAT_DB_USER", "env-user")]));
        assert_eq!(snapshot.get("database", "host"), Some("file-host"));
        assert_eq!(snapshot.get("database", "user"), Some("env-user"));
    }

    #[test]
    fn get_bool_parses_ini_booleans() {
        let mut snapshot = ConfigSnapshot::default();
        assert!(!snapshot.get_bool("secret", "disable").unwrap());

        for (raw, expected) in [("1", true), ("Yes", true), (" on ", true), ("off", false)] {
            snapshot.set("secret", "disable", raw);
            assert_eq!(snapshot.get_bool("secret", "disable").unwrap(), expected);
        }

        snapshot.set("secret", "disable", "maybe");
        let err = snapshot.get_bool("secret", "disable").unwrap_err();
        assert!(err.to_string().contains("secret.disable"));
    }

    #[test]
    fn lookups_are_case_insensitive() {
        let mut snapshot = ConfigSnapshot::default();
        snapshot.set("Server", "Name", "mixed");
        assert_eq!(snapshot.get("server", "name"), Some("mixed"));
        assert_eq!(snapshot.get("SERVER", "NAME"), Some("mixed"));
    }

    #[test]
    fn resolve_reads_process_env() {
        with_env_vars(
            &[
                ("METEOSTAT_SECRET_NAME", "X-Key"),
                ("METEOSTAT_SECRET_VALUE", "abc123"),
                ("METEOSTAT_DB_PORT", "3310"),
            ],
            || {
                let snapshot = ConfigResolver::new(None).resolve();
                assert_eq!(snapshot.get("secret", "name"), Some("X-Key"));
                assert_eq!(snapshot.get("secret", "value"), Some("abc123"));
                assert_eq!(snapshot.get("database", "port"), Some("3310"));
            },
        );
    }

    #[test]
    fn resolve_is_not_cached_between_calls() {
        let resolver = ConfigResolver::new(None);
        with_env_vars(&[("METEOSTAT_SERVER_NAME", "first")], || {
            assert_eq!(resolver.resolve().server_name(), "first");
        });
        with_env_vars(&[("METEOSTAT_SERVER_NAME", "second")], || {
            assert_eq!(resolver.resolve().server_name(), "second");
        });
    }
}
