//! PostgreSQL gateway.
//!
//! Every call opens its own connection, runs exactly one statement and
//! closes the connection again before returning. Nothing is pooled.

use crate::{
    config::{DatabaseConfig, SslMode},
    models::{AffectedRows, ExecutionOutcome, RowRecord, RowSet},
    validator::is_read_only,
};
use anyhow::Context;
use async_trait::async_trait;
use rustls::pki_types::CertificateDer;
use rustls::{crypto::ring, ClientConfig, RootCertStore};
use rustls_pemfile::certs;
use serde_json::{Number, Value};
use std::{fmt, fs::File, io::BufReader, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    task::JoinHandle,
};
use tokio_postgres::{
    config::SslMode as PgSslMode, types::Type, Client, Config as PgConfig, Connection, NoTls,
    SimpleQueryMessage,
};
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::{debug, warn};

const PROBE_STATEMENT: &str = "SELECT 1 AS test";

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Failed to connect to database: {0}")]
    Connect(String),

    #[error("Database error: {0}")]
    Execute(String),
}

impl DbError {
    fn connect(err: &tokio_postgres::Error) -> Self {
        Self::Connect(describe(err))
    }

    fn execute(err: &tokio_postgres::Error) -> Self {
        Self::Execute(describe(err))
    }
}

/// Prefers the server's own severity and message over the driver's generic "db error".
fn describe(err: &tokio_postgres::Error) -> String {
    match err.as_db_error() {
        Some(db) => format!("{}: {}", db.severity(), db.message()),
        None => err.to_string(),
    }
}

/// Runs statements on behalf of the HTTP layer.
#[async_trait]
pub trait SqlGateway: Send + Sync {
    async fn execute(&self, statement: &str) -> Result<ExecutionOutcome, DbError>;

    /// Opens a connection, runs a trivial read and closes it again.
    async fn probe(&self) -> Result<(), DbError>;
}

/// Everything needed to open one connection. Built fresh for every call.
#[derive(Clone)]
pub struct ConnectionDescriptor {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: Option<String>,
    pub ssl_mode: SslMode,
    pub root_cert: Option<String>,
    pub connect_timeout: Duration,
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("ssl_mode", &self.ssl_mode)
            .field("root_cert", &self.root_cert)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl ConnectionDescriptor {
    pub fn from_config(config: &DatabaseConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            database: config.name.clone(),
            user: config.user.clone(),
            password: config.password.clone(),
            ssl_mode: config.ssl_mode,
            root_cert: config.root_cert.clone(),
            connect_timeout: config.connect_timeout,
        }
    }

    fn pg_config(&self) -> PgConfig {
        let mut config = PgConfig::new();
        config
            .host(&self.host)
            .port(self.port)
            .dbname(&self.database)
            .user(&self.user)
            .connect_timeout(self.connect_timeout)
            .application_name("textsql")
            .ssl_mode(match self.ssl_mode {
                SslMode::Disable => PgSslMode::Disable,
                SslMode::Prefer => PgSslMode::Prefer,
                SslMode::Require => PgSslMode::Require,
            });
        if let Some(password) = &self.password {
            config.password(password);
        }
        config
    }
}

#[derive(Debug, Clone)]
pub struct PostgresGateway {
    config: DatabaseConfig,
}

impl PostgresGateway {
    pub fn new(config: DatabaseConfig) -> Self {
        Self { config }
    }

    pub async fn connect(&self) -> Result<PgSession, DbError> {
        let descriptor = ConnectionDescriptor::from_config(&self.config);
        debug!(
            host = %descriptor.host,
            port = descriptor.port,
            database = %descriptor.database,
            "opening database connection"
        );
        let config = descriptor.pg_config();

        match descriptor.ssl_mode {
            SslMode::Disable => {
                let (client, connection) = config
                    .connect(NoTls)
                    .await
                    .map_err(|err| DbError::connect(&err))?;
                Ok(PgSession::spawn(client, connection))
            }
            SslMode::Prefer | SslMode::Require => {
                let tls = build_tls_connector(descriptor.root_cert.as_deref())
                    .map_err(|err| DbError::Connect(format!("{err:#}")))?;
                let (client, connection) = config
                    .connect(tls)
                    .await
                    .map_err(|err| DbError::connect(&err))?;
                Ok(PgSession::spawn(client, connection))
            }
        }
    }
}

#[async_trait]
impl SqlGateway for PostgresGateway {
    async fn execute(&self, statement: &str) -> Result<ExecutionOutcome, DbError> {
        self.connect().await?.execute(statement).await
    }

    async fn probe(&self) -> Result<(), DbError> {
        self.connect().await?.probe().await
    }
}

/// One open connection. Consumed by whichever operation runs on it.
pub struct PgSession {
    client: Client,
    driver: JoinHandle<()>,
}

impl PgSession {
    fn spawn<S, T>(client: Client, connection: Connection<S, T>) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let driver = tokio::spawn(async move {
            if let Err(err) = connection.await {
                warn!(error = %err, "database connection closed with error");
            }
        });
        Self { client, driver }
    }

    pub async fn execute(mut self, statement: &str) -> Result<ExecutionOutcome, DbError> {
        let read_only = is_read_only(statement);
        debug!(read_only, "executing statement");

        let result = if read_only {
            self.fetch_rows(statement).await.map(ExecutionOutcome::Rows)
        } else {
            self.apply(statement).await.map(ExecutionOutcome::Affected)
        };

        self.close().await;
        result
    }

    pub async fn probe(self) -> Result<(), DbError> {
        let result = self
            .client
            .query_one(PROBE_STATEMENT, &[])
            .await
            .map(|_| ())
            .map_err(|err| DbError::execute(&err));
        self.close().await;
        result
    }

    /// Runs a read inside a transaction that is always rolled back, so a
    /// `SELECT`-prefixed statement with side effects (`SELECT ... INTO`)
    /// leaves nothing behind.
    async fn fetch_rows(&mut self, statement: &str) -> Result<RowSet, DbError> {
        let transaction = self
            .client
            .transaction()
            .await
            .map_err(|err| DbError::execute(&err))?;
        let prepared = transaction
            .prepare(statement)
            .await
            .map_err(|err| DbError::execute(&err))?;
        let columns: Vec<(String, Type)> = prepared
            .columns()
            .iter()
            .map(|column| (column.name().to_string(), column.type_().clone()))
            .collect();

        let messages = transaction
            .simple_query(statement)
            .await
            .map_err(|err| DbError::execute(&err))?;

        let mut data = Vec::new();
        for message in messages {
            let SimpleQueryMessage::Row(row) = message else {
                continue;
            };
            let mut record = RowRecord::new();
            for (idx, (name, ty)) in columns.iter().enumerate() {
                let text = row.try_get(idx).map_err(|err| DbError::execute(&err))?;
                record.insert(name.clone(), interpret_cell(ty, text));
            }
            data.push(record);
        }
        transaction
            .rollback()
            .await
            .map_err(|err| DbError::execute(&err))?;

        let names = columns.into_iter().map(|(name, _)| name).collect();
        Ok(RowSet::new(names, data))
    }

    async fn apply(&mut self, statement: &str) -> Result<AffectedRows, DbError> {
        let transaction = self
            .client
            .transaction()
            .await
            .map_err(|err| DbError::execute(&err))?;
        let affected = transaction
            .execute(statement, &[])
            .await
            .map_err(|err| DbError::execute(&err))?;
        transaction
            .commit()
            .await
            .map_err(|err| DbError::execute(&err))?;
        Ok(AffectedRows::new(affected))
    }

    async fn close(self) {
        let Self { client, driver } = self;
        drop(client);
        if let Err(err) = driver.await {
            warn!(error = %err, "database connection task failed");
        }
    }
}

/// Maps a cell from PostgreSQL's text format onto a JSON scalar.
///
/// Booleans, integers and floats become native JSON values; every other
/// type keeps its text form. Non-finite floats also stay text since JSON
/// cannot carry them.
fn interpret_cell(ty: &Type, text: Option<&str>) -> Value {
    let Some(text) = text else {
        return Value::Null;
    };

    let interpreted = match *ty {
        Type::BOOL => match text {
            "t" => Some(Value::Bool(true)),
            "f" => Some(Value::Bool(false)),
            _ => None,
        },
        Type::INT2 | Type::INT4 | Type::INT8 | Type::OID => {
            text.parse::<i64>().ok().map(Value::from)
        }
        Type::FLOAT4 | Type::FLOAT8 => text
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number),
        _ => None,
    };

    interpreted.unwrap_or_else(|| Value::String(text.to_string()))
}

fn build_tls_connector(root_cert: Option<&str>) -> anyhow::Result<MakeRustlsConnect> {
    let root_store = match root_cert {
        Some(path) => load_root_store(path)?,
        None => system_root_store(),
    };

    // No process-wide default provider exists once aws-lc-rs is compiled in too.
    let config = ClientConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()
        .context("failed to select TLS protocol versions")?
        .with_root_certificates(root_store)
        .with_no_client_auth();
    Ok(MakeRustlsConnect::new(config))
}

fn load_root_store(path: &str) -> anyhow::Result<RootCertStore> {
    let mut reader = BufReader::new(
        File::open(path).with_context(|| format!("failed to open TEXTSQL_DB_ROOT_CERT '{path}'"))?,
    );
    let mut root_store = RootCertStore::empty();
    for cert in certs(&mut reader) {
        let cert: CertificateDer<'static> = cert.context("failed to parse TEXTSQL_DB_ROOT_CERT")?;
        root_store
            .add(cert)
            .map_err(|_| anyhow::anyhow!("invalid certificate in TEXTSQL_DB_ROOT_CERT"))?;
    }
    if root_store.is_empty() {
        anyhow::bail!("TEXTSQL_DB_ROOT_CERT contained no certificates");
    }
    Ok(root_store)
}

/// OS trust store, with the bundled Mozilla roots when none load.
fn system_root_store() -> RootCertStore {
    let mut root_store = RootCertStore::empty();
    let native = rustls_native_certs::load_native_certs();
    let (loaded, _) = root_store.add_parsable_certificates(native.certs);
    if loaded == 0 {
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }
    root_store
}
