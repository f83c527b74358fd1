//! Scripted fakes shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use jobqueue::channels::{CursorToken, FetchPage, MailSource, MessageSummary};
use jobqueue::config::IngestConfig;
use jobqueue::error::{ChannelError, LlmError};
use jobqueue::jobs::JobService;
use jobqueue::llm::Classifier;
use jobqueue::pipeline::{Ingestor, ItemPipeline, RateLimiter};
use jobqueue::store::InMemoryJobStore;

/// Tracks how many calls are inside a section at once.
#[derive(Default)]
pub struct Concurrency {
    current: AtomicUsize,
    max: AtomicUsize,
}

impl Concurrency {
    pub fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
    }

    pub fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }
}

/// Paginated source with one item per page. Tokens are page indexes.
pub struct ScriptedSource {
    items: Vec<String>,
    endless: bool,
    fail_at: Option<usize>,
    fetch_delay: Duration,
    bodies: HashMap<String, Option<String>>,
    pub fetches: AtomicUsize,
    pub fetching: Concurrency,
}

impl ScriptedSource {
    /// Finite source whose item bodies default to `"body of <id>"`.
    pub fn new(items: &[&str]) -> Self {
        Self {
            items: items.iter().map(|s| s.to_string()).collect(),
            endless: false,
            fail_at: None,
            fetch_delay: Duration::ZERO,
            bodies: HashMap::new(),
            fetches: AtomicUsize::new(0),
            fetching: Concurrency::default(),
        }
    }

    /// Source that never runs out; ids are `m0`, `m1`, ...
    pub fn endless() -> Self {
        Self {
            endless: true,
            ..Self::new(&[])
        }
    }

    /// `n` items `m0..m{n-1}`.
    pub fn numbered(n: usize) -> Self {
        let ids: Vec<String> = (0..n).map(|i| format!("m{i}")).collect();
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        Self::new(&refs)
    }

    pub fn with_body(mut self, id: &str, body: Option<&str>) -> Self {
        self.bodies.insert(id.to_string(), body.map(str::to_string));
        self
    }

    /// Fetching page `index` fails.
    pub fn failing_at(mut self, index: usize) -> Self {
        self.fail_at = Some(index);
        self
    }

    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MailSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn fetch_page(&self, token: Option<&CursorToken>) -> Result<FetchPage, ChannelError> {
        self.fetching.enter();
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.fetch_delay.is_zero() {
            tokio::time::sleep(self.fetch_delay).await;
        }
        self.fetching.exit();

        let index: usize = token.map(|t| t.as_str().parse().unwrap()).unwrap_or(0);
        if self.fail_at == Some(index) {
            return Err(ChannelError::Http("503 Service Unavailable".into()));
        }

        if self.endless {
            return Ok(FetchPage {
                summary: Some(MessageSummary::new(format!("m{index}"))),
                next_token: Some(CursorToken::new((index + 1).to_string())),
            });
        }

        Ok(FetchPage {
            summary: self.items.get(index).map(MessageSummary::new),
            next_token: (index + 1 < self.items.len())
                .then(|| CursorToken::new((index + 1).to_string())),
        })
    }

    async fn read_body(&self, id: &str) -> Result<Option<String>, ChannelError> {
        Ok(self
            .bodies
            .get(id)
            .cloned()
            .unwrap_or_else(|| Some(format!("body of {id}"))))
    }
}

/// What the fake classifier does for a given email body.
#[derive(Clone)]
pub enum Reply {
    /// Answer with this text after the delay.
    After(Duration, String),
    /// Never answer.
    Hang,
    Panic,
    Fail,
}

impl Reply {
    pub fn now(text: &str) -> Self {
        Self::After(Duration::ZERO, text.to_string())
    }

    pub fn after(delay: Duration, text: &str) -> Self {
        Self::After(delay, text.to_string())
    }
}

pub struct ScriptedClassifier {
    replies: HashMap<String, Reply>,
    default: Reply,
    pub calls: Mutex<Vec<Instant>>,
    pub classifying: Concurrency,
}

impl ScriptedClassifier {
    /// Every body gets `default` unless scripted otherwise.
    pub fn new(default: Reply) -> Self {
        Self {
            replies: HashMap::new(),
            default,
            calls: Mutex::new(Vec::new()),
            classifying: Concurrency::default(),
        }
    }

    pub fn on(mut self, body: &str, reply: Reply) -> Self {
        self.replies.insert(body.to_string(), reply);
        self
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn classify(&self, content: &str) -> Result<String, LlmError> {
        self.calls.lock().unwrap().push(Instant::now());
        let reply = self
            .replies
            .get(content)
            .cloned()
            .unwrap_or_else(|| self.default.clone());

        self.classifying.enter();
        let result = match reply {
            Reply::After(delay, text) => {
                tokio::time::sleep(delay).await;
                Ok(text)
            }
            Reply::Hang => std::future::pending().await,
            Reply::Panic => panic!("classifier blew up on {content:?}"),
            Reply::Fail => Err(LlmError::RequestFailed {
                provider: "scripted".into(),
                reason: "scripted failure".into(),
            }),
        };
        self.classifying.exit();
        result
    }
}

/// Config with a limiter loose enough not to matter.
pub fn fast_config() -> IngestConfig {
    IngestConfig {
        classify_permits: 1000,
        classify_window: Duration::from_secs(1),
        classify_burst: 1000,
        ..IngestConfig::default()
    }
}

pub struct Harness {
    pub jobs: Arc<JobService>,
    pub source: Arc<ScriptedSource>,
    pub classifier: Arc<ScriptedClassifier>,
}

impl Harness {
    pub fn new(source: ScriptedSource, classifier: ScriptedClassifier) -> Self {
        Self {
            jobs: Arc::new(JobService::new(Arc::new(InMemoryJobStore::new()))),
            source: Arc::new(source),
            classifier: Arc::new(classifier),
        }
    }

    pub fn ingestor(&self, config: IngestConfig) -> Ingestor {
        let limiter = Arc::new(RateLimiter::new(
            config.classify_permits,
            config.classify_window,
            config.classify_burst,
        ));
        let pipeline = Arc::new(ItemPipeline::new(
            self.source.clone(),
            self.classifier.clone(),
            Arc::clone(&self.jobs),
            limiter,
        ));
        Ingestor::new(config, self.source.clone(), pipeline)
    }
}
