//! In-process stand-ins for the classifier services.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use futures::{future::BoxFuture, FutureExt};
use parking_lot::Mutex;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::Semaphore,
    task::JoinHandle,
};
use url::Url;

use crate::config::ClassifierConfig;

use super::{ClassifierError, FallbackClassifier, FallbackResponse, ScoringService};

enum Outcome {
    Prob(f64),
    Fail(fn() -> ClassifierError),
}

pub struct FakeScorer {
    healthy: bool,
    outcome: Outcome,
    per_url: HashMap<String, f64>,
    gate: Option<Semaphore>,
    active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub health_calls: AtomicUsize,
    pub score_calls: AtomicUsize,
}

impl FakeScorer {
    pub fn answering(prob: f64) -> Self {
        Self {
            healthy: true,
            outcome: Outcome::Prob(prob),
            per_url: HashMap::new(),
            gate: None,
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            health_calls: AtomicUsize::new(0),
            score_calls: AtomicUsize::new(0),
        }
    }

    /// Like [`FakeScorer::answering`] but holds every request until
    /// [`FakeScorer::release`] is called.
    pub fn gated(prob: f64) -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::answering(prob)
        }
    }

    pub fn unhealthy() -> Self {
        Self {
            healthy: false,
            ..Self::answering(0.0)
        }
    }

    pub fn failing(error: fn() -> ClassifierError) -> Self {
        Self {
            outcome: Outcome::Fail(error),
            ..Self::answering(0.0)
        }
    }

    pub fn with(mut self, url: &str, prob: f64) -> Self {
        self.per_url.insert(url.to_string(), prob);
        self
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }
}

impl ScoringService for FakeScorer {
    fn health(&self) -> BoxFuture<'_, bool> {
        self.health_calls.fetch_add(1, Ordering::SeqCst);
        let healthy = self.healthy;
        async move { healthy }.boxed()
    }

    fn score<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<f64, ClassifierError>> {
        async move {
            self.score_calls.fetch_add(1, Ordering::SeqCst);
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(active, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                let _permit = gate.acquire().await;
            }
            self.active.fetch_sub(1, Ordering::SeqCst);

            if let Some(prob) = self.per_url.get(url) {
                return Ok(*prob);
            }
            match &self.outcome {
                Outcome::Prob(prob) => Ok(*prob),
                Outcome::Fail(error) => Err(error()),
            }
        }
        .boxed()
    }
}

pub struct FakeFallback {
    answer: Option<FallbackResponse>,
    pub calls: AtomicUsize,
}

impl FakeFallback {
    pub fn answering(answer: FallbackResponse) -> Self {
        Self {
            answer: Some(answer),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            answer: None,
            calls: AtomicUsize::new(0),
        }
    }
}

impl FallbackClassifier for FakeFallback {
    fn classify<'a>(
        &'a self,
        _url: &'a str,
    ) -> BoxFuture<'a, Result<FallbackResponse, ClassifierError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let answer = self.answer.clone();
        async move {
            answer.ok_or_else(|| ClassifierError::Protocol("background worker disconnected".into()))
        }
        .boxed()
    }
}

/// A request as it reached a [`CannedServer`].
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub method: String,
    pub path: String,
    pub body: Vec<u8>,
}

/// Local HTTP/1.1 server answering a fixed status and body per path.
/// Paths without a route answer 404.
pub struct CannedServer {
    base: Url,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
    task: JoinHandle<()>,
}

impl CannedServer {
    pub async fn start(routes: &[(&str, u16, &str)]) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind local listener");
        let addr = listener.local_addr().expect("listener address");
        let routes: Arc<HashMap<String, (u16, Vec<u8>)>> = Arc::new(
            routes
                .iter()
                .map(|(path, status, body)| (path.to_string(), (*status, body.as_bytes().to_vec())))
                .collect(),
        );
        let seen = Arc::new(Mutex::new(Vec::new()));

        let task = tokio::spawn({
            let seen = seen.clone();
            async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let routes = routes.clone();
                    let seen = seen.clone();
                    tokio::spawn(async move {
                        let _ = answer(stream, &routes, &seen).await;
                    });
                }
            }
        });

        Self {
            base: Url::parse(&format!("http://{addr}/")).expect("local server url"),
            seen,
            task,
        }
    }

    pub fn url(&self, path: &str) -> String {
        self.base.join(path).expect("joinable path").to_string()
    }

    /// Classifier settings pointing every endpoint at this server.
    pub fn config(&self) -> ClassifierConfig {
        ClassifierConfig {
            server_url: self.base.clone(),
            ..ClassifierConfig::default()
        }
    }

    pub fn requests(&self) -> Vec<SeenRequest> {
        self.seen.lock().clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.requests().into_iter().map(|request| request.path).collect()
    }
}

impl Drop for CannedServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Client that ignores proxy settings from the environment.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .build()
        .expect("http client")
}

async fn answer(
    mut stream: TcpStream,
    routes: &HashMap<String, (u16, Vec<u8>)>,
    seen: &Mutex<Vec<SeenRequest>>,
) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|window| window == b"\r\n\r\n") {
            break pos + 4;
        }
        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..read]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < head_end + length {
        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..read]);
    }

    let mut request_line = head.split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let path = request_line.next().unwrap_or("/").to_string();
    let body_end = buf.len().min(head_end + length);
    let (status, body) = routes
        .get(&path)
        .cloned()
        .unwrap_or_else(|| (404, b"not found".to_vec()));
    seen.lock().push(SeenRequest {
        method,
        path,
        body: buf[head_end..body_end].to_vec(),
    });

    let reason = match status {
        200 => "OK",
        404 => "Not Found",
        503 => "Service Unavailable",
        _ => "Status",
    };
    let head = format!(
        "HTTP/1.1 {status} {reason}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
        body.len()
    );
    stream.write_all(head.as_bytes()).await?;
    stream.write_all(&body).await?;
    stream.shutdown().await
}
