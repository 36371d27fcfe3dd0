//! Integration tests for the full correlation pipeline.
//!
//! Tests: JobSubmitter → CorrelationStore → NotificationBus → Dispatcher →
//! ResultHandler → ResultPersister
//!
//! Verifies:
//! - A completed job's results reach the document store exactly once
//! - Duplicate and unknown notifications are harmless orphans
//! - Submission retries leave exactly one entry under the final job id
//! - Teardown stops new work

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier, Mutex};
    use std::thread;
    use std::time::{Duration, Instant};

    use serde_json::{Value as JsonValue, json};

    use jobrelay_analysis::{HandlerRegistry, LabelDetectionHandler, RawPage, ResultSource};
    use jobrelay_core::{JobId, JobKind, TargetRef};
    use jobrelay_events::{CompletionNotification, InMemoryNotificationBus, NotificationBus};

    use crate::archive::InMemoryPayloadArchive;
    use crate::correlation::{CorrelationStore, EntryState, InMemoryCorrelationStore};
    use crate::dispatch::{DispatchOutcome, NotificationDispatcher, ReleaseMode};
    use crate::engine::{Engine, SharedPersister, SharedStore};
    use crate::persist::{DownstreamPersister, InMemoryDocumentStore};
    use crate::submit::{
        ExternalJobService, JobSubmitter, ProviderError, RetryPolicy, StartJobRequest,
        SubmissionPolicy, WorkUnit,
    };
    use crate::EngineConfig;

    /// Provider result API serving canned pages per job, tokens `p1`, `p2`, ...
    #[derive(Default)]
    struct CannedResults {
        pages: Mutex<HashMap<String, Vec<JsonValue>>>,
        fetches: AtomicUsize,
    }

    impl CannedResults {
        fn set(&self, job_id: &str, pages: Vec<JsonValue>) {
            self.pages.lock().unwrap().insert(job_id.to_string(), pages);
        }

        fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    impl ResultSource for CannedResults {
        fn fetch_page(&self, job_id: &JobId, next_token: Option<&str>) -> anyhow::Result<RawPage> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let pages = self.pages.lock().unwrap();
            let pages = pages
                .get(job_id.as_str())
                .ok_or_else(|| anyhow::anyhow!("no results for {job_id}"))?;

            let index = match next_token {
                None => 0,
                Some(t) => t.trim_start_matches('p').parse::<usize>()?,
            };
            let next = (index + 1 < pages.len()).then(|| format!("p{}", index + 1));
            Ok(RawPage::new(pages[index].clone(), next))
        }
    }

    /// Provider start API: scripted failures, then sequential job ids.
    #[derive(Default)]
    struct FakeProvider {
        failures: Mutex<Vec<ProviderError>>,
        started: AtomicUsize,
    }

    impl FakeProvider {
        fn failing_first(failures: Vec<ProviderError>) -> Self {
            Self {
                failures: Mutex::new(failures),
                ..Default::default()
            }
        }
    }

    impl ExternalJobService for FakeProvider {
        fn start_job(&self, _request: &StartJobRequest) -> Result<JobId, ProviderError> {
            {
                let mut failures = self.failures.lock().unwrap();
                if !failures.is_empty() {
                    return Err(failures.remove(0));
                }
            }
            let n = self.started.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(JobId::new(format!("job-{n}")).unwrap())
        }
    }

    struct Harness {
        store: Arc<InMemoryCorrelationStore>,
        results: Arc<CannedResults>,
        documents: Arc<InMemoryDocumentStore>,
        dispatcher: Arc<NotificationDispatcher<Arc<InMemoryCorrelationStore>, SharedPersister>>,
    }

    fn harness(mode: ReleaseMode) -> Harness {
        let store = InMemoryCorrelationStore::arc();
        let results = Arc::new(CannedResults::default());
        let documents = Arc::new(InMemoryDocumentStore::with_targets(["doc-1", "doc-2"]));

        let mut registry = HandlerRegistry::new();
        registry
            .register(LabelDetectionHandler::new(
                results.clone(),
                Arc::new(InMemoryPayloadArchive::new()),
            ))
            .unwrap();

        let persister: SharedPersister = Arc::new(DownstreamPersister::new(documents.clone()));
        let dispatcher = Arc::new(
            NotificationDispatcher::new(store.clone(), Arc::new(registry), persister)
                .with_release_mode(mode),
        );

        Harness {
            store,
            results,
            documents,
            dispatcher,
        }
    }

    fn label(ts: u64, name: &str, confidence: f64) -> JsonValue {
        json!({"Timestamp": ts, "Label": {"Name": name, "Confidence": confidence}})
    }

    fn doc(id: &str) -> TargetRef {
        TargetRef::new(id).unwrap()
    }

    fn submitter(
        h: &Harness,
        provider: Arc<FakeProvider>,
    ) -> JobSubmitter<Arc<FakeProvider>, Arc<InMemoryCorrelationStore>> {
        JobSubmitter::new(JobKind::label_detection(), provider, h.store.clone())
            .with_policy(SubmissionPolicy::new(RetryPolicy::fixed(3, Duration::ZERO)))
    }

    fn success(job_id: &JobId) -> CompletionNotification {
        CompletionNotification::success(job_id.clone(), "StartLabelDetection")
    }

    #[test]
    fn completed_job_persists_every_result_and_releases_entry() {
        let h = harness(ReleaseMode::AtomicClaim);
        let job = submitter(&h, Arc::new(FakeProvider::default()))
            .submit(WorkUnit::new(doc("doc-1"), "content", "s3://bucket/video.mp4"))
            .unwrap();

        h.results.set(
            job.job_id.as_str(),
            vec![
                json!({"Labels": [label(0, "Dog", 92.0)]}),
                json!({"Labels": [label(1000, "Ball", 81.0)]}),
            ],
        );

        let outcome = h.dispatcher.dispatch(&success(&job.job_id));

        assert_eq!(
            outcome,
            DispatchOutcome::Resolved {
                kind: JobKind::label_detection(),
                persisted: 2,
                failed: 0
            }
        );
        assert_eq!(h.documents.results_for(&doc("doc-1")).len(), 2);
        assert_eq!(h.store.get(&job.job_id).unwrap(), None);
        assert_eq!(h.store.state(&job.job_id), Some(EntryState::Released));
    }

    #[test]
    fn duplicate_notification_is_an_orphan_and_persists_nothing() {
        let h = harness(ReleaseMode::AtomicClaim);
        let job = submitter(&h, Arc::new(FakeProvider::default()))
            .submit(WorkUnit::new(doc("doc-1"), "content", "s3://bucket/a.mp4"))
            .unwrap();
        h.results.set(job.job_id.as_str(), vec![json!({"Labels": [label(0, "Dog", 92.0)]})]);

        h.dispatcher.dispatch(&success(&job.job_id));
        let fetches_after_first = h.results.fetches();

        assert_eq!(h.dispatcher.dispatch(&success(&job.job_id)), DispatchOutcome::Orphan);
        assert_eq!(h.results.fetches(), fetches_after_first);
        assert_eq!(h.documents.saved_count(), 1);
    }

    #[test]
    fn transient_failures_then_success_store_one_entry_under_final_id() {
        let h = harness(ReleaseMode::AtomicClaim);
        let provider = Arc::new(FakeProvider::failing_first(vec![
            ProviderError::Transient("throttled".into()),
            ProviderError::Transient("timeout".into()),
        ]));

        let job = submitter(&h, provider)
            .submit(WorkUnit::new(doc("doc-1"), "content", "s3://bucket/a.mp4"))
            .unwrap();

        assert_eq!(job.attempts, 3);
        assert_eq!(job.job_id.as_str(), "job-1");
        assert_eq!(h.store.len(), 1);
        assert_eq!(h.store.state(&job.job_id), Some(EntryState::Pending));
    }

    #[test]
    fn failure_notification_releases_entry_without_fetching_results() {
        let h = harness(ReleaseMode::AtomicClaim);
        let job = submitter(&h, Arc::new(FakeProvider::default()))
            .submit(WorkUnit::new(doc("doc-1"), "content", "s3://bucket/a.mp4"))
            .unwrap();

        let outcome = h.dispatcher.dispatch(&CompletionNotification::failure(
            job.job_id.clone(),
            "StartLabelDetection",
            Some("Unsupported codec".into()),
        ));

        assert_eq!(outcome, DispatchOutcome::FailureAcknowledged);
        assert_eq!(h.results.fetches(), 0);
        assert_eq!(h.store.state(&job.job_id), Some(EntryState::Released));

        // A late success for the same job must not resurrect it.
        assert_eq!(h.dispatcher.dispatch(&success(&job.job_id)), DispatchOutcome::Orphan);
    }

    #[test]
    fn unknown_and_expired_jobs_are_orphans() {
        let h = harness(ReleaseMode::GetThenRelease);
        h.store
            .put(&JobId::new("short-lived").unwrap(), b"{}", Duration::from_millis(1))
            .unwrap();
        thread::sleep(Duration::from_millis(5));

        for id in ["never-submitted", "short-lived"] {
            let outcome = h.dispatcher.dispatch(&success(&JobId::new(id).unwrap()));
            assert_eq!(outcome, DispatchOutcome::Orphan);
        }
        assert_eq!(h.dispatcher.stats().orphans, 2);
    }

    #[test]
    fn concurrent_duplicates_decode_exactly_once() {
        let h = harness(ReleaseMode::AtomicClaim);
        let job = submitter(&h, Arc::new(FakeProvider::default()))
            .submit(WorkUnit::new(doc("doc-1"), "content", "s3://bucket/a.mp4"))
            .unwrap();
        h.results.set(job.job_id.as_str(), vec![json!({"Labels": [label(0, "Dog", 92.0)]})]);

        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let dispatcher = h.dispatcher.clone();
                let barrier = barrier.clone();
                let notification = success(&job.job_id);
                thread::spawn(move || {
                    barrier.wait();
                    dispatcher.dispatch(&notification)
                })
            })
            .collect();

        let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let resolved = outcomes
            .iter()
            .filter(|o| matches!(o, DispatchOutcome::Resolved { .. }))
            .count();

        assert_eq!(resolved, 1);
        assert_eq!(h.results.fetches(), 1);
        assert_eq!(h.documents.saved_count(), 1);
        assert_eq!(h.dispatcher.stats().orphans, 7);
    }

    #[test]
    fn one_rejected_result_does_not_block_its_siblings() {
        let h = harness(ReleaseMode::AtomicClaim);
        let job = submitter(&h, Arc::new(FakeProvider::default()))
            .submit(WorkUnit::new(doc("doc-2"), "content", "s3://bucket/a.mp4"))
            .unwrap();
        h.results.set(
            job.job_id.as_str(),
            vec![json!({"Labels": [label(0, "Dog", 90.0), label(500, " ", 90.0), label(900, "Cat", 90.0)]})],
        );

        let outcome = h.dispatcher.dispatch(&success(&job.job_id));

        assert_eq!(
            outcome,
            DispatchOutcome::Resolved {
                kind: JobKind::label_detection(),
                persisted: 2,
                failed: 1
            }
        );
        assert_eq!(h.documents.results_for(&doc("doc-2")).len(), 2);
    }

    #[test]
    fn target_deleted_while_job_ran_is_skipped() {
        let h = harness(ReleaseMode::AtomicClaim);
        let job = submitter(&h, Arc::new(FakeProvider::default()))
            .submit(WorkUnit::new(doc("doc-1"), "content", "s3://bucket/a.mp4"))
            .unwrap();
        h.results.set(job.job_id.as_str(), vec![json!({"Labels": [label(0, "Dog", 90.0)]})]);
        h.documents.remove_target(&doc("doc-1"));

        let outcome = h.dispatcher.dispatch(&success(&job.job_id));

        assert_eq!(
            outcome,
            DispatchOutcome::Resolved {
                kind: JobKind::label_detection(),
                persisted: 0,
                failed: 1
            }
        );
    }

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn engine_runs_end_to_end_over_the_bus_and_stops_on_shutdown() {
        jobrelay_observability::init();

        let results = Arc::new(CannedResults::default());
        let documents = Arc::new(InMemoryDocumentStore::with_targets(["doc-1"]));
        let store: SharedStore = InMemoryCorrelationStore::arc();
        let persister: SharedPersister = Arc::new(DownstreamPersister::new(documents.clone()));

        let engine = Engine::builder(EngineConfig::default().with_dispatch_concurrency(2))
            .with_store(store)
            .with_persister(persister)
            .register(LabelDetectionHandler::new(
                results.clone(),
                Arc::new(InMemoryPayloadArchive::new()),
            ))
            .unwrap()
            .build()
            .unwrap();

        let bus = InMemoryNotificationBus::new();
        engine.start_workers(&bus).unwrap();

        let submitter = engine.submitter(JobKind::label_detection(), Arc::new(FakeProvider::default()));
        let job = submitter
            .submit(WorkUnit::new(doc("doc-1"), "content", "s3://bucket/a.mp4"))
            .unwrap();
        results.set(job.job_id.as_str(), vec![json!({"Labels": [label(0, "Dog", 90.0)]})]);

        bus.publish(success(&job.job_id)).unwrap();
        bus.publish(success(&job.job_id)).unwrap();

        let dispatcher = engine.dispatcher();
        assert!(wait_until(|| {
            let stats = dispatcher.stats();
            stats.resolved == 1 && stats.orphans == 1
        }));
        assert_eq!(documents.saved_count(), 1);

        engine.shutdown();

        assert!(submitter
            .submit(WorkUnit::new(doc("doc-1"), "content", "s3://bucket/b.mp4"))
            .is_err());
        assert_eq!(
            dispatcher.dispatch(&success(&job.job_id)),
            DispatchOutcome::Rejected
        );
    }
}
