//! Live related-report search while the user types.
//!
//! [`LiveSearch::spawn`] runs the core [`Debouncer`] on a tokio task. Text
//! changes go in through [`LiveSearchHandle::update`]; each debounced query
//! is sent to a [`SearchBackend`] on its own task, and only the response for
//! the latest generation is published on the handle's `watch` channel.
//! Superseded requests are never aborted, their results are just dropped.
//!
//! Blank text still takes a generation (so an older in-flight query cannot
//! resurface) but is answered with an empty list without calling the backend.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use draftdesk_core::debounce::Debouncer;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::Config;
use crate::corpus::FsCorpus;
use crate::models::RelatedReport;
use crate::search::{SearchService, SearchSettings};

/// Where debounced queries are answered.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<RelatedReport>>;
}

/// In-process search against a [`SearchService`].
pub struct LocalBackend {
    service: Arc<SearchService>,
}

impl LocalBackend {
    pub fn new(service: Arc<SearchService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl SearchBackend for LocalBackend {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<RelatedReport>> {
        self.service.related(query, top_k).await
    }
}

/// Search through a running server's `POST /api/search`.
pub struct HttpBackend {
    client: reqwest::Client,
    url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: format!("{}/api/search", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl SearchBackend for HttpBackend {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<RelatedReport>> {
        let response = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "query": query, "top_k": top_k }))
            .send()
            .await
            .with_context(|| format!("search request to {} failed", self.url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("search API error {}: {}", status, body);
        }
        Ok(response.json().await?)
    }
}

/// The latest accepted search result.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LiveUpdate {
    /// Generation of the dispatch that produced this update; 0 before any.
    pub generation: u64,
    pub query: String,
    pub results: Vec<RelatedReport>,
    /// Backend failure for this generation, if any.
    pub error: Option<String>,
}

type Response = (u64, String, std::result::Result<Vec<RelatedReport>, String>);

pub struct LiveSearch;

impl LiveSearch {
    /// Start the driver task. It stops once the handle is dropped.
    pub fn spawn(backend: Arc<dyn SearchBackend>, window: Duration, top_k: usize) -> LiveSearchHandle {
        let (text_tx, text_rx) = mpsc::unbounded_channel();
        let (update_tx, update_rx) = watch::channel(LiveUpdate::default());
        let task = tokio::spawn(drive(backend, window, top_k, text_rx, update_tx));
        LiveSearchHandle {
            text_tx,
            updates: update_rx,
            task,
        }
    }
}

pub struct LiveSearchHandle {
    text_tx: mpsc::UnboundedSender<String>,
    updates: watch::Receiver<LiveUpdate>,
    task: JoinHandle<()>,
}

impl LiveSearchHandle {
    /// Report the current document text.
    pub fn update(&self, text: impl Into<String>) -> Result<()> {
        self.text_tx
            .send(text.into())
            .map_err(|_| anyhow::anyhow!("live search driver has stopped"))
    }

    pub fn subscribe(&self) -> watch::Receiver<LiveUpdate> {
        self.updates.clone()
    }

    pub fn latest(&self) -> LiveUpdate {
        self.updates.borrow().clone()
    }

    /// Stop accepting text and wait for the driver to exit.
    pub async fn shutdown(self) {
        drop(self.text_tx);
        let _ = self.task.await;
    }
}

async fn drive(
    backend: Arc<dyn SearchBackend>,
    window: Duration,
    top_k: usize,
    mut text_rx: mpsc::UnboundedReceiver<String>,
    update_tx: watch::Sender<LiveUpdate>,
) {
    let mut debouncer = Debouncer::new(window);
    let (resp_tx, mut resp_rx) = mpsc::unbounded_channel::<Response>();

    loop {
        let deadline = debouncer.deadline();
        let timer = async move {
            match deadline {
                Some(at) => tokio::time::sleep_until(Instant::from_std(at)).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            changed = text_rx.recv() => match changed {
                Some(text) => debouncer.on_change(text, Instant::now().into_std()),
                None => break,
            },
            _ = timer => {
                if let Some(dispatch) = debouncer.poll(Instant::now().into_std()) {
                    tracing::debug!(generation = dispatch.generation, "dispatching live search");
                    if dispatch.text.trim().is_empty() {
                        let _ = resp_tx.send((dispatch.generation, dispatch.text, Ok(Vec::new())));
                    } else {
                        let backend = backend.clone();
                        let resp_tx = resp_tx.clone();
                        tokio::spawn(async move {
                            let result = backend
                                .search(&dispatch.text, top_k)
                                .await
                                .map_err(|e| format!("{:#}", e));
                            let _ = resp_tx.send((dispatch.generation, dispatch.text, result));
                        });
                    }
                }
            },
            Some((generation, query, result)) = resp_rx.recv() => {
                if let Some(result) = debouncer.on_response(generation, result) {
                    let update = match result {
                        Ok(results) => LiveUpdate { generation, query, results, error: None },
                        Err(error) => {
                            tracing::warn!(generation, "live search failed: {}", error);
                            LiveUpdate { generation, query, results: Vec::new(), error: Some(error) }
                        }
                    };
                    let _ = update_tx.send(update);
                }
            },
        }
    }
}

/// `draftdesk live`: treat each stdin line as the current document text and
/// print related reports as the debounced searches land.
pub async fn run_live(config: &Config, server: Option<&str>) -> Result<()> {
    let backend: Arc<dyn SearchBackend> = match server {
        Some(url) => Arc::new(HttpBackend::new(
            url,
            Duration::from_secs(config.llm.timeout_secs),
        )?),
        None => {
            let corpus = Arc::new(FsCorpus::new(&config.corpus)?);
            let service = SearchService::new(corpus, SearchSettings::from(&config.retrieval));
            Arc::new(LocalBackend::new(Arc::new(service)))
        }
    };

    let live = LiveSearch::spawn(backend, config.live.window(), config.retrieval.top_k);
    let mut updates = live.subscribe();
    let printer = tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let update = updates.borrow_and_update().clone();
            print_update(&update);
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut last = None;
    while let Some(line) = lines.next_line().await? {
        live.update(line.clone())?;
        last = Some(line);
    }

    // Give the final edit a chance to be answered before exiting.
    if let Some(last) = last {
        let mut rx = live.subscribe();
        let settle = config.live.window() + Duration::from_secs(config.llm.timeout_secs);
        let _ = tokio::time::timeout(settle, rx.wait_for(|u| u.query == last)).await;
    }
    live.shutdown().await;
    let _ = printer.await;
    Ok(())
}

fn print_update(update: &LiveUpdate) {
    if let Some(error) = &update.error {
        println!("#{} search failed: {}", update.generation, error);
        return;
    }
    println!("#{} {} result(s)", update.generation, update.results.len());
    for result in &update.results {
        println!("  [{:.4}] {} ({})", result.score, result.title, result.document_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const WINDOW: Duration = Duration::from_millis(300);

    #[derive(Default)]
    struct ScriptedBackend {
        calls: Mutex<Vec<String>>,
        delays: HashMap<String, Duration>,
    }

    impl ScriptedBackend {
        fn with_delay(mut self, query: &str, delay: Duration) -> Self {
            self.delays.insert(query.to_string(), delay);
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SearchBackend for ScriptedBackend {
        async fn search(&self, query: &str, _top_k: usize) -> Result<Vec<RelatedReport>> {
            self.calls.lock().unwrap().push(query.to_string());
            if let Some(delay) = self.delays.get(query) {
                tokio::time::sleep(*delay).await;
            }
            if query == "fail" {
                bail!("backend unavailable");
            }
            Ok(vec![RelatedReport {
                document_id: query.to_string(),
                title: query.to_string(),
                score: 1.0,
                snippet: String::new(),
            }])
        }
    }

    #[tokio::test]
    async fn test_burst_dispatches_once_with_last_text() {
        tokio::time::pause();
        let backend = Arc::new(ScriptedBackend::default());
        let live = LiveSearch::spawn(backend.clone(), WINDOW, 5);
        let mut rx = live.subscribe();

        live.update("a").unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        live.update("ab").unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        live.update("abc").unwrap();

        rx.changed().await.unwrap();
        let update = rx.borrow().clone();
        assert_eq!(update.generation, 1);
        assert_eq!(update.query, "abc");
        assert_eq!(update.results[0].document_id, "abc");

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(backend.calls(), vec!["abc"]);
    }

    #[tokio::test]
    async fn test_blank_text_publishes_empty_without_backend_call() {
        tokio::time::pause();
        let backend = Arc::new(ScriptedBackend::default());
        let live = LiveSearch::spawn(backend.clone(), WINDOW, 5);
        let mut rx = live.subscribe();

        live.update("   ").unwrap();
        rx.changed().await.unwrap();
        let update = live.latest();
        assert_eq!(update.generation, 1);
        assert!(update.results.is_empty());
        assert!(update.error.is_none());
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_stale_response_is_never_published() {
        tokio::time::pause();
        let backend = Arc::new(
            ScriptedBackend::default()
                .with_delay("slow", Duration::from_secs(2))
                .with_delay("fast", Duration::from_millis(10)),
        );
        let live = LiveSearch::spawn(backend.clone(), WINDOW, 5);
        let mut rx = live.subscribe();

        live.update("slow").unwrap();
        tokio::time::sleep(WINDOW + Duration::from_millis(100)).await;
        live.update("fast").unwrap();

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().query, "fast");
        assert_eq!(rx.borrow().generation, 2);

        // Let the slow request finish; it must be dropped.
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!rx.has_changed().unwrap());
        assert_eq!(live.latest().query, "fast");
        assert_eq!(backend.calls(), vec!["slow", "fast"]);
    }

    #[tokio::test]
    async fn test_backend_failure_is_published_for_latest_generation() {
        tokio::time::pause();
        let backend = Arc::new(ScriptedBackend::default());
        let live = LiveSearch::spawn(backend, WINDOW, 5);
        let mut rx = live.subscribe();

        live.update("fail").unwrap();
        rx.changed().await.unwrap();
        let update = live.latest();
        assert!(update.results.is_empty());
        assert!(update.error.unwrap().contains("backend unavailable"));
    }

    #[tokio::test]
    async fn test_shutdown_stops_driver() {
        let live = LiveSearch::spawn(Arc::new(ScriptedBackend::default()), WINDOW, 5);
        let rx = live.subscribe();
        live.shutdown().await;
        assert!(rx.has_changed().is_err());
    }
}
