#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use content_pipeline::{
    Article, GeneratorError, InMemoryQuotaLedger, PipelineError, Profile, QuotaBalance,
    QuotaLedger, Result, Source,
};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

static INIT: Once = Once::new();

pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .try_init()
            .ok();
    });
}

pub fn article(source: &str, slug: &str, title: &str, summary: &str, hours_old: i64) -> Article {
    article_at(Utc::now(), source, slug, title, summary, hours_old)
}

pub fn article_at(
    now: DateTime<Utc>,
    source: &str,
    slug: &str,
    title: &str,
    summary: &str,
    hours_old: i64,
) -> Article {
    Article {
        title: title.to_string(),
        summary: summary.to_string(),
        url: format!("https://{}.example.com/{}", source, slug),
        source: source.to_string(),
        published_at: now - Duration::hours(hours_old),
        image_url: None,
        tags: Vec::new(),
    }
}

pub fn robotics_profile() -> Profile {
    Profile {
        main_topic: "robotics".to_string(),
        keywords: vec!["robot".to_string(), "automation".to_string()],
        ..Default::default()
    }
}

/// Returns a fixed batch, an error, or nothing after a delay
pub struct ScriptedSource {
    name: String,
    articles: Vec<Article>,
    fail: bool,
    delay: Option<std::time::Duration>,
    pub calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn ok(name: &str, articles: Vec<Article>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            articles,
            fail: false,
            delay: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            articles: Vec::new(),
            fail: true,
            delay: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn slow(name: &str, articles: Vec<Article>, delay: std::time::Duration) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            articles,
            fail: false,
            delay: Some(delay),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Source for ScriptedSource {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn fetch_articles(&self) -> Result<Vec<Article>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(PipelineError::General(format!("{} is down", self.name)));
        }
        Ok(self.articles.clone())
    }
}

pub type Reply = std::result::Result<String, GeneratorError>;

/// Answers generator calls from a script; once the script runs out, the
/// fallback reply is used. Records the URL (or page title) of every call.
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<Reply>>,
    fallback: Reply,
    delay: Option<std::time::Duration>,
    pub calls: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(replies: Vec<Reply>, fallback: Reply) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            fallback,
            delay: None,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn always(text: &str) -> Arc<Self> {
        Self::new(Vec::new(), Ok(text.to_string()))
    }

    pub fn slow(text: &str, delay: std::time::Duration) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: Ok(text.to_string()),
            delay: Some(delay),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub async fn call_log(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }

    async fn reply(&self, key: String) -> Reply {
        self.calls.lock().await.push(key);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.replies.lock().await.pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl content_pipeline::Generator for ScriptedGenerator {
    fn generator_name(&self) -> String {
        "scripted".to_string()
    }

    async fn generate(&self, _profile: &Profile, article: &Article) -> Reply {
        self.reply(article.url.clone()).await
    }

    async fn generate_from_content(&self, title: &str, _body: &str) -> Reply {
        self.reply(title.to_string()).await
    }
}

/// In-memory ledger that counts calls and can be told to fail debits
pub struct CountingLedger {
    inner: InMemoryQuotaLedger,
    pub debits: AtomicUsize,
    fail_debits: bool,
}

impl CountingLedger {
    pub async fn with_balance(user_id: &str, amount: u32) -> Arc<Self> {
        let inner = InMemoryQuotaLedger::new();
        inner.credit(user_id, amount).await.unwrap();
        Arc::new(Self {
            inner,
            debits: AtomicUsize::new(0),
            fail_debits: false,
        })
    }

    pub async fn broken(user_id: &str, amount: u32) -> Arc<Self> {
        let inner = InMemoryQuotaLedger::new();
        inner.credit(user_id, amount).await.unwrap();
        Arc::new(Self {
            inner,
            debits: AtomicUsize::new(0),
            fail_debits: true,
        })
    }

    pub fn debit_calls(&self) -> usize {
        self.debits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuotaLedger for CountingLedger {
    async fn balance(&self, user_id: &str) -> Result<QuotaBalance> {
        self.inner.balance(user_id).await
    }

    async fn debit(&self, user_id: &str) -> Result<bool> {
        self.debits.fetch_add(1, Ordering::SeqCst);
        if self.fail_debits {
            return Err(PipelineError::Ledger("store unavailable".to_string()));
        }
        self.inner.debit(user_id).await
    }

    async fn credit(&self, user_id: &str, amount: u32) -> Result<QuotaBalance> {
        self.inner.credit(user_id, amount).await
    }
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                request.extend_from_slice(&buf[..n]);
                if request.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
        }
    }
    String::from_utf8_lossy(&request).to_lowercase()
}

/// Minimal HTTP server answering every request with `body`
pub async fn serve(body: &'static str, content_type: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                read_request(&mut socket).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    content_type,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

/// Serves `body` with an ETag and answers 304 once the client presents it.
/// The counter tracks how many 304s were sent.
pub async fn serve_conditional(
    body: String,
    content_type: &'static str,
    etag: &'static str,
) -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let not_modified = Arc::new(AtomicUsize::new(0));
    let body = Arc::new(body);

    let counter = not_modified.clone();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let counter = counter.clone();
            let body = body.clone();
            tokio::spawn(async move {
                let request = read_request(&mut socket).await;
                let presented = format!("if-none-match: {}", etag.to_lowercase());
                let response = if request.contains(&presented) {
                    counter.fetch_add(1, Ordering::SeqCst);
                    format!(
                        "HTTP/1.1 304 Not Modified\r\nETag: {}\r\nConnection: close\r\n\r\n",
                        etag
                    )
                } else {
                    format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nETag: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        content_type,
                        etag,
                        body.len(),
                        body
                    )
                };
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (addr, not_modified)
}
