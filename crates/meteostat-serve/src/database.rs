//! Database engine built lazily from the resolved configuration.
//!
//! The connection target is either `database.url` (used verbatim) or a MySQL
//! URL assembled from `database.{user,password,host,port,name}`. The URL
//! scheme selects a MySQL, Postgres or SQLite pool. The pool is created on
//! first use and shared by all handlers; each query acquires its own
//! connection for the duration of the call.
//!
//! Queries use named placeholders (`:station`, `:start`) which are rewritten
//! to the positional style of the target backend before execution. Values
//! are bound and decoded with the backend's native types, so `DATE`,
//! `DATETIME`, `TIMESTAMP` and `DECIMAL` columns come back as JSON strings
//! and numbers.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::{Map, Number, Value};
use sqlx::encode::Encode;
use sqlx::mysql::MySqlRow;
use sqlx::pool::PoolOptions;
use sqlx::postgres::PgRow;
use sqlx::query::Query;
use sqlx::sqlite::SqliteRow;
use sqlx::types::Decimal;
use sqlx::{
    Column, Database, MySql, MySqlPool, PgPool, Pool, Postgres, Row, Sqlite, SqlitePool, Type,
};
use tokio::sync::OnceCell;

use crate::config::ConfigSnapshot;
use crate::params::ParamValue;

/// Host used when `database.host` is not configured.
pub const DEFAULT_HOST: &str = "localhost";

/// Port used when `database.port` is not configured.
pub const DEFAULT_PORT: &str = "3306";

/// Result rows as column name -> JSON value.
pub type Rows = Vec<Map<String, Value>>;

/// Errors from building the engine or executing queries.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// The pool could not be created from the descriptor.
    #[error("failed to connect to {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: sqlx::Error,
    },

    /// Query preparation or execution failed.
    #[error("query failed: {0}")]
    Query(#[from] sqlx::Error),

    /// The query references a placeholder with no bound value.
    #[error("missing value for parameter ':{0}'")]
    MissingParameter(String),

    /// The URL scheme names no supported backend.
    #[error("unsupported database backend: {0}")]
    UnsupportedBackend(String),
}

impl DbError {
    /// Whether the database could not be reached, as opposed to a failing
    /// query.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. } | Self::Query(sqlx::Error::PoolTimedOut | sqlx::Error::Io(_))
        )
    }
}

/// Database backend, selected by URL scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    MySql,
    Postgres,
    Sqlite,
}

impl Backend {
    pub fn from_url(url: &str) -> Option<Self> {
        let (scheme, _) = url.split_once(':')?;
        match scheme.to_ascii_lowercase().as_str() {
            "mysql" => Some(Self::MySql),
            "postgres" | "postgresql" => Some(Self::Postgres),
            "sqlite" => Some(Self::Sqlite),
            _ => None,
        }
    }

    /// Placeholder syntax expected by the backend.
    pub fn placeholder_style(self) -> PlaceholderStyle {
        match self {
            Self::Postgres => PlaceholderStyle::Dollar,
            Self::MySql | Self::Sqlite => PlaceholderStyle::Question,
        }
    }
}

/// Where the database lives.
#[derive(Clone, PartialEq, Eq)]
pub enum ConnectionDescriptor {
    /// A full connection URL, used verbatim.
    Url(String),
    /// Individual fields assembled into a MySQL URL.
    Parts {
        user: String,
        password: String,
        host: String,
        port: String,
        name: String,
    },
}

impl ConnectionDescriptor {
    /// Build a descriptor from the `database` section.
    ///
    /// A non-empty `url` wins outright; the individual fields are then
    /// ignored entirely.
    pub fn from_snapshot(config: &ConfigSnapshot) -> Self {
        if let Some(url) = config.get_non_empty("database", "url") {
            return Self::Url(url.to_string());
        }

        Self::Parts {
            user: config.get_or("database", "user", "").to_string(),
            password: config.get_or("database", "password", "").to_string(),
            host: config.get_or("database", "host", DEFAULT_HOST).to_string(),
            port: config.get_or("database", "port", DEFAULT_PORT).to_string(),
            name: config.get_or("database", "name", "").to_string(),
        }
    }

    /// The connection URL, with the password percent-encoded for assembled
    /// descriptors.
    pub fn url(&self) -> String {
        match self {
            Self::Url(url) => url.clone(),
            Self::Parts {
                user,
                password,
                host,
                port,
                name,
            } => format!(
                "mysql://{user}:{}@{host}:{port}/{name}?charset=utf8mb4",
                urlencoding::encode(password)
            ),
        }
    }

    /// Whether connections are validated before each use.
    ///
    /// Only the assembled path opts in; a direct URL keeps the pool defaults.
    pub fn validates_before_use(&self) -> bool {
        matches!(self, Self::Parts { .. })
    }

    /// Backend the descriptor points at; `None` for an unknown URL scheme.
    pub fn backend(&self) -> Option<Backend> {
        match self {
            Self::Url(url) => Backend::from_url(url),
            Self::Parts { .. } => Some(Backend::MySql),
        }
    }

    /// Placeholder syntax expected by the backend.
    pub fn placeholder_style(&self) -> PlaceholderStyle {
        self.backend()
            .map_or(PlaceholderStyle::Question, Backend::placeholder_style)
    }

    /// URL with any password replaced, for logs and errors.
    fn redacted(&self) -> String {
        match self {
            Self::Url(url) => match (url.find("://"), url.rfind('@')) {
                (Some(scheme_end), Some(at)) if at > scheme_end => {
                    let userinfo = &url[scheme_end + 3..at];
                    let user = userinfo.split(':').next().unwrap_or_default();
                    format!("{}{user}:***{}", &url[..scheme_end + 3], &url[at..])
                }
                _ => url.clone(),
            },
            Self::Parts {
                user,
                host,
                port,
                name,
                ..
            } => format!("mysql://{user}:***@{host}:{port}/{name}"),
        }
    }
}

impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ConnectionDescriptor")
            .field(&self.redacted())
            .finish()
    }
}

/// Positional placeholder syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `?` (MySQL, SQLite).
    Question,
    /// `$1`, `$2`, ... (Postgres).
    Dollar,
}

/// Rewrite `:name` placeholders to positional ones.
///
/// Returns the rewritten text and the parameter names in binding order.
/// Quoted literals, `--` and `/* */` comments and `::` casts are copied
/// unchanged.
pub fn rewrite_named(text: &str, style: PlaceholderStyle) -> (String, Vec<String>) {
    let mut out = String::with_capacity(text.len());
    let mut names = Vec::new();
    let mut chars = text.chars().peekable();
    let mut quote: Option<char> = None;

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            out.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }

        match c {
            '\'' | '"' | '`' => {
                quote = Some(c);
                out.push(c);
            }
            '-' if chars.peek() == Some(&'-') => {
                out.push(c);
                for n in chars.by_ref() {
                    out.push(n);
                    if n == '\n' {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                out.push(c);
                out.extend(chars.next());
                let mut prev = None;
                for n in chars.by_ref() {
                    out.push(n);
                    if prev == Some('*') && n == '/' {
                        break;
                    }
                    prev = Some(n);
                }
            }
            ':' if chars.peek() == Some(&':') => {
                out.push_str("::");
                chars.next();
            }
            ':' if chars
                .peek()
                .is_some_and(|n| n.is_ascii_alphabetic() || *n == '_') =>
            {
                let mut name = String::new();
                while let Some(&n) = chars.peek() {
                    if n.is_ascii_alphanumeric() || n == '_' {
                        name.push(n);
                        chars.next();
                    } else {
                        break;
                    }
                }
                names.push(name);
                match style {
                    PlaceholderStyle::Question => out.push('?'),
                    PlaceholderStyle::Dollar => {
                        out.push('$');
                        out.push_str(&names.len().to_string());
                    }
                }
            }
            _ => out.push(c),
        }
    }

    (out, names)
}

/// Connection pool for the configured backend.
enum BackendPool {
    MySql(MySqlPool),
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

impl BackendPool {
    async fn close(&self) {
        match self {
            Self::MySql(pool) => pool.close().await,
            Self::Postgres(pool) => pool.close().await,
            Self::Sqlite(pool) => pool.close().await,
        }
    }
}

fn lazy_pool<DB: Database>(url: &str, validate: bool) -> Result<Pool<DB>, sqlx::Error> {
    PoolOptions::<DB>::new()
        .test_before_acquire(validate)
        .connect_lazy(url)
}

/// Lazily-connected, shared database engine.
pub struct Engine {
    descriptor: ConnectionDescriptor,
    pool: OnceCell<BackendPool>,
}

impl Engine {
    /// Create an engine. No connection is made until the first query.
    pub fn new(descriptor: ConnectionDescriptor) -> Self {
        Self {
            descriptor,
            pool: OnceCell::new(),
        }
    }

    /// Create an engine from the `database` section of a snapshot.
    pub fn from_snapshot(config: &ConfigSnapshot) -> Self {
        Self::new(ConnectionDescriptor::from_snapshot(config))
    }

    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    async fn pool(&self) -> Result<&BackendPool, DbError> {
        self.pool
            .get_or_try_init(|| async {
                let backend = self
                    .descriptor
                    .backend()
                    .ok_or_else(|| DbError::UnsupportedBackend(self.descriptor.to_string()))?;
                let url = self.descriptor.url();
                let validate = self.descriptor.validates_before_use();
                let connect_err = |source| DbError::Connect {
                    target: self.descriptor.to_string(),
                    source,
                };

                let pool = match backend {
                    Backend::MySql => {
                        BackendPool::MySql(lazy_pool(&url, validate).map_err(connect_err)?)
                    }
                    Backend::Postgres => {
                        BackendPool::Postgres(lazy_pool(&url, validate).map_err(connect_err)?)
                    }
                    Backend::Sqlite => {
                        BackendPool::Sqlite(lazy_pool(&url, validate).map_err(connect_err)?)
                    }
                };
                tracing::info!(database = %self.descriptor, backend = ?backend, "database pool created");
                Ok::<_, DbError>(pool)
            })
            .await
    }

    /// Execute `text` with named parameters and return all rows.
    pub async fn query(
        &self,
        text: &str,
        params: &HashMap<String, ParamValue>,
    ) -> Result<Rows, DbError> {
        let (sql, names) = rewrite_named(text, self.descriptor.placeholder_style());
        let values = names
            .iter()
            .map(|name| {
                params
                    .get(name)
                    .ok_or_else(|| DbError::MissingParameter(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let rows: Rows = match self.pool().await? {
            BackendPool::MySql(pool) => bind_values(sqlx::query::<MySql>(&sql), &values)
                .fetch_all(pool)
                .await?
                .iter()
                .map(|row| row_to_json(row, mysql_value))
                .collect(),
            BackendPool::Postgres(pool) => bind_values(sqlx::query::<Postgres>(&sql), &values)
                .fetch_all(pool)
                .await?
                .iter()
                .map(|row| row_to_json(row, postgres_value))
                .collect(),
            BackendPool::Sqlite(pool) => bind_values(sqlx::query::<Sqlite>(&sql), &values)
                .fetch_all(pool)
                .await?
                .iter()
                .map(|row| row_to_json(row, sqlite_value))
                .collect(),
        };
        tracing::debug!(rows = rows.len(), params = names.len(), "query executed");

        Ok(rows)
    }

    /// Close the pool, if it was ever created.
    pub async fn close(&self) {
        if let Some(pool) = self.pool.get() {
            pool.close().await;
            tracing::info!("database pool closed");
        }
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("descriptor", &self.descriptor)
            .field("connected", &self.pool.initialized())
            .finish()
    }
}

type BoundQuery<'q, DB> = Query<'q, DB, <DB as Database>::Arguments<'q>>;

/// Bind values in placeholder order, using the backend's native types.
fn bind_values<'q, DB>(mut query: BoundQuery<'q, DB>, values: &[&ParamValue]) -> BoundQuery<'q, DB>
where
    DB: Database,
    Option<String>: Encode<'q, DB> + Type<DB>,
    bool: Encode<'q, DB> + Type<DB>,
    i64: Encode<'q, DB> + Type<DB>,
    f64: Encode<'q, DB> + Type<DB>,
    String: Encode<'q, DB> + Type<DB>,
    NaiveDate: Encode<'q, DB> + Type<DB>,
    NaiveDateTime: Encode<'q, DB> + Type<DB>,
{
    for value in values {
        query = match value {
            ParamValue::Null => query.bind(None::<String>),
            ParamValue::Bool(v) => query.bind(*v),
            ParamValue::Int(v) => query.bind(*v),
            ParamValue::Float(v) => query.bind(*v),
            ParamValue::Str(v) => query.bind(v.clone()),
            ParamValue::Date(v) => query.bind(*v),
            ParamValue::DateTime(v) => query.bind(*v),
        };
    }
    query
}

fn row_to_json<R: Row>(row: &R, value_at: fn(&R, usize) -> Value) -> Map<String, Value> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, column)| (column.name().to_string(), value_at(row, i)))
        .collect()
}

/// Return the JSON form of the first listed type the column decodes as.
/// NULL decodes as the first type and becomes `null`.
macro_rules! decode_column {
    ($row:expr, $index:expr, { $($ty:ty => $to_json:expr),+ $(,)? }) => {{
        $(
            if let Ok(value) = $row.try_get::<Option<$ty>, _>($index) {
                return value.map($to_json).unwrap_or(Value::Null);
            }
        )+
        Value::Null
    }};
}

fn mysql_value(row: &MySqlRow, index: usize) -> Value {
    decode_column!(row, index, {
        i64 => Value::from,
        u64 => Value::from,
        f64 => Value::from,
        Decimal => decimal_json,
        NaiveDate => date_json,
        NaiveDateTime => datetime_json,
        NaiveTime => time_json,
        String => Value::from,
    })
}

fn postgres_value(row: &PgRow, index: usize) -> Value {
    decode_column!(row, index, {
        i64 => Value::from,
        i32 => Value::from,
        i16 => Value::from,
        f64 => Value::from,
        f32 => Value::from,
        Decimal => decimal_json,
        bool => Value::from,
        NaiveDate => date_json,
        NaiveDateTime => datetime_json,
        DateTime<Utc> => |v: DateTime<Utc>| datetime_json(v.naive_utc()),
        NaiveTime => time_json,
        String => Value::from,
    })
}

// SQLite has no date or decimal storage class; those arrive as text or real.
fn sqlite_value(row: &SqliteRow, index: usize) -> Value {
    decode_column!(row, index, {
        i64 => Value::from,
        f64 => Value::from,
        String => Value::from,
    })
}

fn decimal_json(value: Decimal) -> Value {
    value
        .to_string()
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map_or(Value::Null, Value::Number)
}

fn date_json(value: NaiveDate) -> Value {
    Value::String(value.format("%Y-%m-%d").to_string())
}

fn datetime_json(value: NaiveDateTime) -> Value {
    Value::String(value.format("%Y-%m-%d %H:%M:%S").to_string())
}

fn time_json(value: NaiveTime) -> Value {
    Value::String(value.format("%H:%M:%S").to_string())
}
