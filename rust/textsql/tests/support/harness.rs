use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{self, Request, StatusCode},
    response::Response,
    Router,
};
use serde_json::Value;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex, Once,
};
use textsql::{
    config::AppConfig,
    db::{DbError, SqlGateway},
    generator::{GenerationError, SqlGenerator},
    models::{AffectedRows, ExecutionOutcome, RowRecord, RowSet},
    server::Server,
};
use tower::ServiceExt;

static TRACING_INIT: Once = Once::new();

/// Generator double that records every request it receives.
pub struct FakeGenerator {
    reply: Option<String>,
    requests: Mutex<Vec<String>>,
}

impl FakeGenerator {
    pub fn replying(sql: &str) -> Self {
        Self {
            reply: Some(sql.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Fails every call as if no API key were configured.
    pub fn failing() -> Self {
        Self {
            reply: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SqlGenerator for FakeGenerator {
    async fn generate(&self, request: &str) -> Result<String, GenerationError> {
        self.requests.lock().unwrap().push(request.to_string());
        self.reply.clone().ok_or(GenerationError::MissingApiKey)
    }
}

#[derive(Clone)]
pub enum FakeDatabase {
    Rows(RowSet),
    Affected(u64),
    Fails(String),
    Unreachable,
}

/// Gateway double that records executed statements and probe calls.
pub struct FakeGateway {
    behaviour: FakeDatabase,
    statements: Mutex<Vec<String>>,
    probes: AtomicUsize,
}

impl FakeGateway {
    pub fn new(behaviour: FakeDatabase) -> Self {
        Self {
            behaviour,
            statements: Mutex::new(Vec::new()),
            probes: AtomicUsize::new(0),
        }
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SqlGateway for FakeGateway {
    async fn execute(&self, statement: &str) -> Result<ExecutionOutcome, DbError> {
        self.statements.lock().unwrap().push(statement.to_string());
        match &self.behaviour {
            FakeDatabase::Rows(rows) => Ok(ExecutionOutcome::Rows(rows.clone())),
            FakeDatabase::Affected(count) => {
                Ok(ExecutionOutcome::Affected(AffectedRows::new(*count)))
            }
            FakeDatabase::Fails(message) => Err(DbError::Execute(message.clone())),
            FakeDatabase::Unreachable => Err(DbError::Connect("connection refused".into())),
        }
    }

    async fn probe(&self) -> Result<(), DbError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        match &self.behaviour {
            FakeDatabase::Unreachable => Err(DbError::Connect("connection refused".into())),
            _ => Ok(()),
        }
    }
}

pub fn customers(count: usize) -> RowSet {
    let data = (1..=count)
        .map(|id| {
            let mut row = RowRecord::new();
            row.insert("CustomerId".into(), Value::from(id as i64));
            row.insert("Name".into(), Value::from(format!("customer-{id}")));
            row.insert("Balance".into(), Value::from("10.00"));
            row
        })
        .collect();
    RowSet::new(
        vec!["CustomerId".into(), "Name".into(), "Balance".into()],
        data,
    )
}

pub struct TestHarness {
    router: Router,
    pub generator: Arc<FakeGenerator>,
    pub gateway: Arc<FakeGateway>,
}

impl TestHarness {
    pub fn new(generator: FakeGenerator, gateway: FakeGateway) -> Self {
        TRACING_INIT.call_once(|| {
            let _ = tracing_subscriber::fmt::try_init();
        });

        let generator = Arc::new(generator);
        let gateway = Arc::new(gateway);
        let config = AppConfig::from_vars(Vec::new()).expect("default config should parse");
        let server = Server::with_components(
            config,
            Arc::clone(&generator) as Arc<dyn SqlGenerator>,
            Arc::clone(&gateway) as Arc<dyn SqlGateway>,
        );

        Self {
            router: server.router(),
            generator,
            gateway,
        }
    }

    pub async fn post_json(&self, path: &str, body: Value) -> Response {
        self.post_raw(path, &body.to_string()).await
    }

    pub async fn post_raw(&self, path: &str, body: &str) -> Response {
        let request = Request::builder()
            .method(http::Method::POST)
            .uri(path)
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("failed to build request");
        self.send(request).await
    }

    pub async fn get(&self, path: &str) -> Response {
        let request = Request::builder()
            .method(http::Method::GET)
            .uri(path)
            .body(Body::empty())
            .expect("failed to build request");
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router should respond")
    }
}

pub async fn read_body(response: Response) -> (StatusCode, String) {
    let status = response.status();
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read body");
    (status, String::from_utf8_lossy(&bytes).into_owned())
}

pub async fn read_json(response: Response) -> (StatusCode, Value) {
    let (status, text) = read_body(response).await;
    let value = serde_json::from_str(&text)
        .unwrap_or_else(|err| panic!("response is not JSON ({err}): {text}"));
    (status, value)
}
