//! Fuzz Session - Orchestrates a fuzzing run
//!
//! Normalizes the definition, compiles templates, builds the model graph
//! and then drives every template through a bounded worker pool:
//!
//! 1. wait for the baselines of producers earlier in the traversal order
//! 2. send the template's own baseline and publish its response
//! 3. send every mutation candidate, classify, record findings
//!
//! Cancellation is cooperative: the token is checked right before each
//! send, so an in-flight request always completes and nothing new starts.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use tokio::sync::{watch, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::client::{ExecutionResult, TargetClient};
use crate::errors::ApiFuzzError;
use crate::reporter::junit;
use crate::schema::SchemaNormalizer;
use crate::template::{FieldLocation, FuzzTemplate, HttpRequest, RequestBuilder, TemplateCompiler};
use crate::transport::Transport;

use super::config::FuzzConfig;
use super::detection::AnomalyDetector;
use super::findings::{Finding, FindingStore};
use super::graph::{extract_live_value, positions, ModelGraph, NodeId};
use super::mutation::MutationRegistry;
use super::{EdgeSummary, FuzzResults, RunState};

/// A fuzzing run against one target
pub struct FuzzSession {
    config: FuzzConfig,
    transport: Arc<dyn Transport>,
    registry: MutationRegistry,
    detector: AnomalyDetector,
    cancel: CancellationToken,
    state: RunState,
}

impl FuzzSession {
    /// Create a new fuzzing session
    pub fn new(config: FuzzConfig, transport: Arc<dyn Transport>) -> Self {
        let registry = MutationRegistry::new(config.seed);
        let detector = AnomalyDetector::new(config.policy.clone());
        Self {
            config,
            transport,
            registry,
            detector,
            cancel: CancellationToken::new(),
            state: RunState::Idle,
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn config(&self) -> &FuzzConfig {
        &self.config
    }

    fn transition(&mut self, next: RunState) {
        debug!("Run state: {} -> {}", self.state, next);
        self.state = next;
    }

    /// Run the fuzzing session over a parsed API definition.
    ///
    /// Schema errors and an unresolvable base URL fail before any request
    /// is sent. Everything after that ends in `Ok`, with the outcome set to
    /// `Done` or `Aborted`.
    pub async fn run(&mut self, definition: &Value) -> Result<FuzzResults, ApiFuzzError> {
        let started = Instant::now();
        self.transition(RunState::Preparing);

        let prepared = self.prepare(definition);
        let (compiler_base, graph, store, compile_failures) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                self.transition(RunState::Aborted);
                return Err(e);
            }
        };

        let order = graph.traversal_order();
        let level = self.config.effective_level();
        let client = TargetClient::new(Arc::clone(&self.transport))
            .with_headers(self.config.headers.clone())
            .with_timeout(self.config.request_timeout());
        info!(
            "Fuzzing {} templates against {} over {} (level {}, {} workers)",
            graph.len(),
            compiler_base,
            client.transport_type(),
            level,
            self.config.workers
        );

        self.transition(RunState::Running);
        let progress = self.create_progress_bar(graph.len() as u64);

        let (requests, candidates, skipped) = {
            let run = RunContext::new(
                &graph,
                &order,
                &client,
                &self.registry,
                &self.detector,
                &store,
                &self.cancel,
                &progress,
                level,
                self.config.workers,
            );
            run.execute().await;
            run.counts()
        };

        self.transition(RunState::Draining);
        progress.finish_and_clear();
        debug!("Client logged {} requests", client.request_count());

        let outcome = if self.cancel.is_cancelled() {
            info!("Run cancelled after {} requests", requests);
            RunState::Aborted
        } else {
            RunState::Done
        };

        let results = FuzzResults {
            outcome,
            base_url: compiler_base,
            level,
            seed: self.config.seed,
            templates: order.iter().map(|id| graph.node(*id).identity()).collect(),
            compile_failures,
            edges: graph
                .edges()
                .iter()
                .map(|edge| EdgeSummary {
                    producer: graph.node(edge.producer).identity(),
                    consumer: graph.node(edge.consumer).identity(),
                    field: edge.field.clone(),
                })
                .collect(),
            requests,
            candidates,
            skipped,
            findings: store.findings(),
            duration_ms: started.elapsed().as_millis() as u64,
        };

        self.flush(&store, &results);
        self.transition(outcome);
        Ok(results)
    }

    /// Normalize, compile and connect. Compile failures become Info
    /// findings in the returned store.
    fn prepare(
        &self,
        definition: &Value,
    ) -> Result<(String, ModelGraph, FindingStore, usize), ApiFuzzError> {
        let api = SchemaNormalizer::normalize(definition)?;
        let compiler = TemplateCompiler::new(&api, self.config.base_url.as_deref())?;
        let report = compiler.compile_all(&api.operations);

        let store = match &self.config.report_dir {
            Some(dir) => FindingStore::with_report_dir(dir.clone()),
            None => FindingStore::new(),
        };
        let compile_failures = report.failures.len();
        for failure in &report.failures {
            store.record(Finding::compile_failure(failure));
        }

        let graph = ModelGraph::from_templates(report.templates);
        debug!("Model graph: {} nodes, {} edges", graph.len(), graph.edges().len());
        Ok((compiler.base_url().to_string(), graph, store, compile_failures))
    }

    fn flush(&self, store: &FindingStore, results: &FuzzResults) {
        if let Err(e) = store.persist(results) {
            error!("Failed to write findings: {:#}", e);
        }
        if let Some(path) = &self.config.junit_report {
            match junit::write_junit(results, path) {
                Ok(()) => info!("JUnit report written to {}", path.display()),
                Err(e) => error!("Failed to write JUnit report: {:#}", e),
            }
        }
    }

    fn create_progress_bar(&self, templates: u64) -> ProgressBar {
        if !self.config.progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(templates);
        if let Ok(style) = ProgressStyle::default_bar().template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({msg})",
        ) {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb.set_message("starting...");
        pb
    }
}

/// Everything a template worker shares for one run
struct RunContext<'a> {
    graph: &'a ModelGraph,
    order: &'a [NodeId],
    position: HashMap<NodeId, usize>,
    /// Published baseline body per node, `Null` when none is usable
    baselines: Vec<watch::Sender<Option<Value>>>,
    client: &'a TargetClient,
    registry: &'a MutationRegistry,
    detector: &'a AnomalyDetector,
    store: &'a FindingStore,
    cancel: &'a CancellationToken,
    progress: &'a ProgressBar,
    permits: Semaphore,
    level: u32,
    workers: usize,
    requests: AtomicU64,
    candidates: AtomicU64,
    /// Requests that could not be built
    skipped: AtomicU64,
}

impl<'a> RunContext<'a> {
    #[allow(clippy::too_many_arguments)]
    fn new(
        graph: &'a ModelGraph,
        order: &'a [NodeId],
        client: &'a TargetClient,
        registry: &'a MutationRegistry,
        detector: &'a AnomalyDetector,
        store: &'a FindingStore,
        cancel: &'a CancellationToken,
        progress: &'a ProgressBar,
        level: u32,
        workers: usize,
    ) -> Self {
        Self {
            graph,
            order,
            position: positions(order),
            baselines: (0..graph.len()).map(|_| watch::channel(None).0).collect(),
            client,
            registry,
            detector,
            store,
            cancel,
            progress,
            permits: Semaphore::new(workers),
            level,
            workers,
            requests: AtomicU64::new(0),
            candidates: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        }
    }

    fn counts(&self) -> (u64, u64, u64) {
        (
            self.requests.load(Ordering::SeqCst),
            self.candidates.load(Ordering::SeqCst),
            self.skipped.load(Ordering::SeqCst),
        )
    }

    async fn execute(&self) {
        stream::iter(self.order.iter().copied())
            .map(|id| self.fuzz_template(id))
            .buffer_unordered(self.workers)
            .for_each(|_| async {})
            .await;
    }

    async fn fuzz_template(&self, id: NodeId) {
        let template = self.graph.node(id);

        let Some(live) = self.live_values(id).await else {
            self.publish(id, Value::Null);
            return;
        };

        let baseline = self.run_baseline(template, &live).await;
        self.publish(id, baseline.unwrap_or(Value::Null));

        if !self.cancel.is_cancelled() {
            self.run_mutations(template, &live).await;
        }
        self.progress.inc(1);
        self.progress
            .set_message(format!("findings: {}", self.store.len()));
    }

    /// Values bound from producers earlier in the order. `None` when the
    /// run was cancelled while waiting.
    async fn live_values(&self, id: NodeId) -> Option<HashMap<String, Value>> {
        let mut live = HashMap::new();
        let own = self.position[&id];

        for edge in self.graph.incoming(id) {
            if self.position[&edge.producer] > own {
                // Closes a cycle; the field keeps its placeholder baseline
                continue;
            }
            let mut rx = self.baselines[edge.producer].subscribe();
            let body = tokio::select! {
                _ = self.cancel.cancelled() => return None,
                published = rx.wait_for(Option::is_some) => match published {
                    Ok(body) => body.clone().unwrap_or(Value::Null),
                    Err(_) => Value::Null,
                },
            };

            match extract_live_value(&body, &edge.field) {
                Some(value) => {
                    debug!(
                        "{}: bound '{}' = {} from {}",
                        self.graph.node(id).identity(),
                        edge.field,
                        value,
                        self.graph.node(edge.producer).identity()
                    );
                    live.insert(edge.field.clone(), value);
                }
                None => debug!(
                    "{}: no live value for '{}', using baseline",
                    self.graph.node(id).identity(),
                    edge.field
                ),
            }
        }
        Some(live)
    }

    fn publish(&self, id: NodeId, body: Value) {
        self.baselines[id].send_replace(Some(body));
    }

    /// Send the unmutated request; returns the JSON body of a 2xx answer
    async fn run_baseline(
        &self,
        template: &FuzzTemplate,
        live: &HashMap<String, Value>,
    ) -> Option<Value> {
        let request = match RequestBuilder::new(template).with_live_values(live).build() {
            Ok(request) => request,
            Err(e) => {
                warn!("Baseline for {} not sendable: {}", template.identity(), e);
                self.skipped.fetch_add(1, Ordering::SeqCst);
                return None;
            }
        };
        let result = self.dispatch(request).await?;

        if let Some(classification) = self.detector.classify(template, None, &result.outcome) {
            self.store
                .record(Finding::from_execution(template, None, &result, classification));
        }

        result
            .outcome
            .response()
            .filter(|response| response.is_success())
            .and_then(|response| response.json())
    }

    async fn run_mutations(&self, template: &FuzzTemplate, live: &HashMap<String, Value>) {
        // Path segments bound to a live value are not mutated
        let bound: Vec<usize> = template
            .fields
            .iter()
            .enumerate()
            .filter(|(_, f)| {
                f.descriptor.location == FieldLocation::Path
                    && live.contains_key(&f.descriptor.name)
            })
            .map(|(i, _)| i)
            .collect();

        let candidates = self
            .registry
            .template_candidates(template, self.level)
            .filter(move |c| !bound.contains(&c.field));

        stream::iter(candidates)
            .take_while(|_| futures::future::ready(!self.cancel.is_cancelled()))
            .inspect(|_| {
                self.candidates.fetch_add(1, Ordering::SeqCst);
            })
            .map(|candidate| async move {
                let request = match RequestBuilder::new(template)
                    .with_live_values(live)
                    .with_mutation(candidate.field, &candidate.value)
                    .build()
                {
                    Ok(request) => request,
                    Err(e) => {
                        debug!(
                            "Skipping {} on {} '{}': {}",
                            candidate.kind,
                            template.identity(),
                            candidate.name,
                            e
                        );
                        self.skipped.fetch_add(1, Ordering::SeqCst);
                        return;
                    }
                };
                let Some(result) = self.dispatch(request).await else {
                    return;
                };
                if let Some(classification) =
                    self.detector
                        .classify(template, Some(candidate.kind), &result.outcome)
                {
                    self.store.record(Finding::from_execution(
                        template,
                        Some(&candidate),
                        &result,
                        classification,
                    ));
                }
            })
            .buffer_unordered(self.workers)
            .for_each(|_| async {})
            .await;
    }

    /// Send under a worker permit. `None` once the run is cancelled.
    async fn dispatch(&self, request: HttpRequest) -> Option<ExecutionResult> {
        let _permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return None,
            permit = self.permits.acquire() => permit.ok()?,
        };
        if self.cancel.is_cancelled() {
            return None;
        }
        self.requests.fetch_add(1, Ordering::SeqCst);
        Some(self.client.send(request).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SchemaError;
    use crate::transport::{MockResponse, MockTransport};
    use serde_json::json;

    fn definition() -> Value {
        json!({
            "swagger": "2.0",
            "info": {"title": "items", "version": "1"},
            "host": "localhost:8080",
            "paths": {
                "/items/{id}": {
                    "get": {
                        "parameters": [
                            {"name": "id", "in": "path", "required": true, "type": "integer"}
                        ],
                        "responses": {"200": {"description": "ok"}}
                    }
                }
            }
        })
    }

    fn session(mock: &MockTransport) -> FuzzSession {
        FuzzSession::new(FuzzConfig::default().with_workers(1), Arc::new(mock.clone()))
    }

    #[tokio::test]
    async fn run_reaches_done() {
        let mock = MockTransport::always(MockResponse::status(200));
        let mut session = session(&mock);
        assert_eq!(session.state(), RunState::Idle);

        let results = session.run(&definition()).await.unwrap();
        assert_eq!(session.state(), RunState::Done);
        assert_eq!(results.outcome, RunState::Done);
        assert_eq!(results.templates, vec!["GET /items/{id}".to_string()]);
        assert!(results.findings.is_empty());
        // Baseline plus every candidate
        assert_eq!(results.requests, results.candidates + 1);
        assert_eq!(mock.request_count().await as u64, results.requests);
    }

    #[tokio::test]
    async fn levels_past_the_deepest_report_the_level_run() {
        let mock = MockTransport::always(MockResponse::status(200));
        let deepest = FuzzSession::new(FuzzConfig::default().with_level(3), Arc::new(mock.clone()))
            .run(&definition())
            .await
            .unwrap();
        let past = FuzzSession::new(FuzzConfig::default().with_level(9), Arc::new(mock.clone()))
            .run(&definition())
            .await
            .unwrap();
        assert_eq!(past.level, 3);
        assert_eq!(past.candidates, deepest.candidates);
    }

    #[tokio::test]
    async fn unencodable_header_candidates_are_skipped() {
        let mut def = definition();
        def["paths"]["/items/{id}"]["get"]["parameters"]
            .as_array_mut()
            .unwrap()
            .push(json!({"name": "X-Tenant", "in": "header", "type": "string"}));
        let mock = MockTransport::always(MockResponse::status(200));
        let results = FuzzSession::new(
            FuzzConfig::default().with_workers(1).with_level(2),
            Arc::new(mock.clone()),
        )
        .run(&def)
        .await
        .unwrap();

        assert!(results.skipped >= 1);
        assert_eq!(results.requests + results.skipped, results.candidates + 1);
        assert_eq!(mock.request_count().await as u64, results.requests);
        assert!(mock
            .sent_requests()
            .await
            .iter()
            .filter_map(|r| r.header("x-tenant"))
            .all(|v| !v.contains('\u{fffd}')));
    }

    #[tokio::test]
    async fn schema_error_sends_nothing() {
        let mock = MockTransport::always(MockResponse::status(200));
        let mut session = session(&mock);
        let err = session
            .run(&json!({"swagger": "2.0", "host": "localhost"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiFuzzError::Schema(SchemaError::MissingKey { .. })));
        assert!(err.is_run_fatal());
        assert_eq!(mock.request_count().await, 0);
        assert_eq!(session.state(), RunState::Aborted);
    }

    #[tokio::test]
    async fn cancelled_before_start_sends_nothing() {
        let mock = MockTransport::always(MockResponse::status(200));
        let mut session = session(&mock);
        session.cancellation_token().cancel();
        let results = session.run(&definition()).await.unwrap();
        assert_eq!(results.outcome, RunState::Aborted);
        assert_eq!(results.requests, 0);
        assert_eq!(mock.request_count().await, 0);
    }

    #[tokio::test]
    async fn compile_failures_are_counted() {
        let mut def = definition();
        def["paths"]["/other"] = json!({
            "get": {
                "parameters": [{"name": "sid", "in": "cookie", "type": "string"}],
                "responses": {"200": {"description": "ok"}}
            }
        });
        let mock = MockTransport::always(MockResponse::status(200));
        let results = session(&mock).run(&def).await.unwrap();
        assert_eq!(results.templates.len(), 1);
        assert_eq!(results.compile_failures, 1);
        assert_eq!(results.findings.len(), 1);
        assert_eq!(results.findings[0].template, "GET /other");
    }

    #[test]
    fn hidden_progress_bar_when_disabled() {
        let mock = MockTransport::always(MockResponse::status(200));
        let session = session(&mock);
        assert!(session.create_progress_bar(3).is_hidden());
    }
}
