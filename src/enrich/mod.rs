// src/enrich/mod.rs

//! Bounded, order-preserving enrichment of a table.
//!
//! Every data row becomes one [`EnrichmentTask`]. Tasks are admitted in row
//! order through a semaphore of `concurrency` permits, run fetch-then-extract
//! on the runtime, and hand back `(row, result)`. Results land in a slot vector
//! indexed by row, so completion order never affects the output. The call
//! returns only once every spawned task has finished.

pub mod task;

pub use task::{EnrichmentTask, TaskOutcome, TaskState};

use chrono::{Local, NaiveDate};
use std::sync::Arc;
use tokio::{
    sync::{OwnedSemaphorePermit, Semaphore},
    task::JoinSet,
};
use tracing::{error, info, instrument, warn};

use crate::config::{Config, DEFAULT_CONCURRENCY};
use crate::error::EnrichError;
use crate::extract::Extractor;
use crate::fetch::Fetcher;
use crate::table::{entity_name, Table};

/// Format of the date written into the header.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// What a failed row does to the run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Log the failure and leave the row's new field empty.
    #[default]
    Skip,
    /// Cancel outstanding tasks and fail the run, discarding all results.
    Abort,
}

impl FailurePolicy {
    pub fn from_abort_flag(abort_on_error: bool) -> Self {
        if abort_on_error {
            FailurePolicy::Abort
        } else {
            FailurePolicy::Skip
        }
    }
}

/// Row counts for a finished run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EnrichSummary {
    pub merged: usize,
    pub failed: usize,
}

pub struct Enricher<F> {
    fetcher: Arc<F>,
    extractor: Arc<Extractor>,
    concurrency: usize,
    policy: FailurePolicy,
    run_date: Option<NaiveDate>,
}

impl<F: Fetcher> Enricher<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            extractor: Arc::new(Extractor::default()),
            concurrency: DEFAULT_CONCURRENCY,
            policy: FailurePolicy::default(),
            run_date: None,
        }
    }

    pub fn from_config(fetcher: F, cfg: &Config) -> Self {
        Self::new(fetcher)
            .with_extractor(Extractor::new(&cfg.label))
            .with_concurrency(cfg.concurrency)
            .with_policy(FailurePolicy::from_abort_flag(cfg.abort_on_error))
    }

    /// Maximum number of tasks in their fetch/extract phase at once (at least 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_extractor(mut self, extractor: Extractor) -> Self {
        self.extractor = Arc::new(extractor);
        self
    }

    /// Pin the header date instead of using today's local date.
    pub fn with_run_date(mut self, date: NaiveDate) -> Self {
        self.run_date = Some(date);
        self
    }

    pub async fn enrich(&self, table: Table) -> Result<Table, EnrichError> {
        self.enrich_with_summary(table).await.map(|(t, _)| t)
    }

    /// Append the run date to the header and one metric field to every data row.
    #[instrument(level = "info", skip_all, fields(rows = table.len(), concurrency = self.concurrency))]
    pub async fn enrich_with_summary(
        &self,
        table: Table,
    ) -> Result<(Table, EnrichSummary), EnrichError> {
        let mut summary = EnrichSummary::default();
        let mut rows = table.into_rows();
        let Some(header) = rows.first_mut() else {
            warn!("table has no header row; nothing to enrich");
            return Ok((Table::default(), summary));
        };

        let date = self.run_date.unwrap_or_else(|| Local::now().date_naive());
        header.push(date.format(DATE_FORMAT).to_string());

        // slot 0 belongs to the header and stays empty
        let mut slots: Vec<Option<String>> = vec![None; rows.len()];
        let gate = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks: JoinSet<(TaskOutcome, OwnedSemaphorePermit)> = JoinSet::new();

        for (row, fields) in rows.iter().enumerate().skip(1) {
            let task = EnrichmentTask::new(row, entity_name(fields));

            // A permit travels back with its task's outcome and returns to the
            // gate only once that outcome is merged, so under Abort a failure
            // is always seen before another row is admitted.
            let permit = loop {
                tokio::select! {
                    biased;
                    Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                        let (outcome, _permit) = joined?;
                        self.merge(outcome, &mut slots, &mut summary)?;
                    }
                    acquired = Arc::clone(&gate).acquire_owned() => break acquired?,
                }
            };

            let fetcher = Arc::clone(&self.fetcher);
            let extractor = Arc::clone(&self.extractor);
            tasks.spawn(async move {
                let outcome = task.run(fetcher.as_ref(), &extractor).await;
                (outcome, permit)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (outcome, _permit) = joined?;
            self.merge(outcome, &mut slots, &mut summary)?;
        }

        for (fields, slot) in rows.iter_mut().zip(slots).skip(1) {
            fields.push(slot.unwrap_or_default());
        }

        info!(
            merged = summary.merged,
            failed = summary.failed,
            date = %date,
            "enrichment finished"
        );
        Ok((Table::new(rows), summary))
    }

    /// Record one finished task. Under [`FailurePolicy::Abort`] a failure is
    /// returned, which drops the `JoinSet` and cancels the remaining tasks.
    fn merge(
        &self,
        outcome: TaskOutcome,
        slots: &mut [Option<String>],
        summary: &mut EnrichSummary,
    ) -> Result<(), EnrichError> {
        let TaskOutcome { mut task, result } = outcome;
        match result {
            Ok(metric) => {
                info!(row = task.row, entity = %task.entity, metric = %metric, "merged");
                slots[task.row] = Some(metric);
                task.advance(TaskState::Merged);
                summary.merged += 1;
                Ok(())
            }
            Err(err) => match self.policy {
                FailurePolicy::Skip => {
                    warn!(
                        row = task.row,
                        entity = %task.entity,
                        kind = err.kind(),
                        error = %err,
                        "row left empty"
                    );
                    summary.failed += 1;
                    Ok(())
                }
                FailurePolicy::Abort => {
                    error!(
                        row = task.row,
                        entity = %task.entity,
                        kind = err.kind(),
                        error = %err,
                        "aborting run"
                    );
                    Err(EnrichError::Aborted {
                        row: task.row,
                        entity: task.entity,
                        source: err,
                    })
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::extract::DEFAULT_LABEL as LABEL;

    fn init_test_logging() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new("debug"))
            .with_test_writer()
            .try_init();
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn table(rows: &[&[&str]]) -> Table {
        rows.iter().map(|r| r.to_vec()).collect()
    }

    /// Canned pages with per-entity latency. Tracks how many fetches are in
    /// flight and the order they started in.
    #[derive(Default)]
    struct Stub {
        pages: HashMap<String, Result<String, String>>,
        delays_ms: HashMap<String, u64>,
        active: AtomicUsize,
        peak: AtomicUsize,
        started: Mutex<Vec<String>>,
    }

    impl Stub {
        fn page(mut self, entity: &str, body: &str) -> Self {
            self.pages.insert(entity.into(), Ok(body.into()));
            self
        }

        fn count(self, entity: &str, n: u64) -> Self {
            self.page(entity, &format!("<p>{}{}</p>", LABEL, n))
        }

        fn broken(mut self, entity: &str) -> Self {
            self.pages.insert(entity.into(), Err("connection refused".into()));
            self
        }

        fn delay(mut self, entity: &str, ms: u64) -> Self {
            self.delays_ms.insert(entity.into(), ms);
            self
        }
    }

    impl Fetcher for Stub {
        async fn fetch(&self, entity: &str) -> Result<Vec<u8>, FetchError> {
            self.started.lock().unwrap().push(entity.to_string());
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let ms = self.delays_ms.get(entity).copied().unwrap_or(1);
            tokio::time::sleep(Duration::from_millis(ms)).await;

            self.active.fetch_sub(1, Ordering::SeqCst);
            match self.pages.get(entity) {
                Some(Ok(body)) => Ok(body.clone().into_bytes()),
                Some(Err(msg)) => Err(FetchError::Other {
                    entity: entity.into(),
                    message: msg.clone(),
                }),
                None => Ok(b"<html>empty</html>".to_vec()),
            }
        }
    }

    #[tokio::test]
    async fn alice_and_bob_partial_success() {
        init_test_logging();
        let stub = Stub::default().count("alice", 42).page("bob", "no count");
        let enricher = Enricher::new(stub).with_run_date(date());

        let (out, summary) = enricher
            .enrich_with_summary(table(&[&["name"], &["alice"], &["bob"]]))
            .await
            .unwrap();

        assert_eq!(
            out,
            table(&[&["name", "2024-01-01"], &["alice", "42"], &["bob", ""]])
        );
        assert_eq!(summary, EnrichSummary { merged: 1, failed: 1 });
    }

    #[tokio::test]
    async fn alice_and_bob_abort() {
        init_test_logging();
        let stub = Stub::default().count("alice", 42).page("bob", "no count");
        let enricher = Enricher::new(stub)
            .with_run_date(date())
            .with_policy(FailurePolicy::Abort);

        let err = enricher
            .enrich(table(&[&["name"], &["alice"], &["bob"]]))
            .await
            .unwrap_err();

        match err {
            EnrichError::Aborted { row, entity, source } => {
                assert_eq!(row, 2);
                assert_eq!(entity, "bob");
                assert_eq!(source.kind(), "no-match");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn abort_stops_dispatching() {
        // repeated: the interleaving differs between runs
        for _ in 0..30 {
            let mut stub = Stub::default().broken("bad");
            let mut rows: Vec<Vec<String>> = vec![vec!["name".into()], vec!["bad".into()]];
            for i in 0..3 {
                let name = format!("tag{i}");
                stub = stub.count(&name, i);
                rows.push(vec![name]);
            }
            let enricher = Enricher::new(stub)
                .with_concurrency(1)
                .with_policy(FailurePolicy::Abort);

            let err = enricher.enrich(Table::new(rows)).await.unwrap_err();
            assert!(matches!(err, EnrichError::Aborted { row: 1, .. }));
            let started = enricher.fetcher.started.lock().unwrap().clone();
            assert_eq!(started, vec!["bad".to_string()], "rows dispatched after the failing one");
        }
    }

    #[tokio::test]
    async fn fetch_failure_leaves_row_empty() {
        let stub = Stub::default().broken("alice").count("bob", 7);
        let out = Enricher::new(stub)
            .with_run_date(date())
            .enrich(table(&[&["name"], &["alice"], &["bob"]]))
            .await
            .unwrap();
        assert_eq!(out.rows()[1], vec!["alice".to_string(), String::new()]);
        assert_eq!(out.rows()[2], vec!["bob".to_string(), "7".to_string()]);
    }

    #[tokio::test]
    async fn every_row_gains_one_field_in_place() {
        let stub = Stub::default().count("a", 1).count("b", 2).count("c", 3);
        let input = table(&[
            &["name", "2023-12-01", "2023-12-15"],
            &["a", "1", "1"],
            &["b", "", "2"],
            &["c", "3", ""],
        ]);

        let out = Enricher::new(stub)
            .with_run_date(date())
            .enrich(input.clone())
            .await
            .unwrap();

        assert_eq!(out.len(), input.len());
        for (before, after) in input.rows().iter().zip(out.rows()) {
            assert_eq!(after.len(), before.len() + 1);
            assert_eq!(&after[..before.len()], &before[..]);
        }
        assert_eq!(out.rows()[0][3], "2024-01-01");
        assert_eq!(out.rows()[3][3], "3");
    }

    #[tokio::test]
    async fn header_only_table_gets_date() {
        let stub = Stub::default();
        let enricher = Enricher::new(stub).with_run_date(date());
        let out = enricher.enrich(table(&[&["name"]])).await.unwrap();
        assert_eq!(out, table(&[&["name", "2024-01-01"]]));
        assert!(enricher.fetcher.started.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn default_date_is_today() {
        let out = Enricher::new(Stub::default())
            .enrich(table(&[&["name"]]))
            .await
            .unwrap();
        let today = Local::now().date_naive().format(DATE_FORMAT).to_string();
        assert_eq!(out.rows()[0][1], today);
    }

    #[tokio::test]
    async fn empty_table_is_returned_unchanged() {
        let out = Enricher::new(Stub::default())
            .enrich(Table::default())
            .await
            .unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn completion_order_does_not_matter() {
        let names: Vec<String> = (0..8).map(|i| format!("tag{i}")).collect();
        let mut rows = vec![vec!["name".to_string()]];
        rows.extend(names.iter().map(|n| vec![n.clone()]));
        let input = Table::new(rows);

        // first rows slowest in one run, fastest in the other
        let mut slow_first = Stub::default();
        let mut fast_first = Stub::default();
        for (i, name) in names.iter().enumerate() {
            let i = i as u64;
            slow_first = slow_first.count(name, i * 10).delay(name, 5 * (8 - i));
            fast_first = fast_first.count(name, i * 10).delay(name, 5 * i + 1);
        }

        let a = Enricher::new(slow_first)
            .with_concurrency(8)
            .with_run_date(date())
            .enrich(input.clone())
            .await
            .unwrap();
        let b = Enricher::new(fast_first)
            .with_concurrency(8)
            .with_run_date(date())
            .enrich(input)
            .await
            .unwrap();

        assert_eq!(a, b);
        for (i, name) in names.iter().enumerate() {
            assert_eq!(a.rows()[i + 1], vec![name.clone(), (i * 10).to_string()]);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrency_bound_is_respected() {
        let mut stub = Stub::default();
        let mut rows = vec![vec!["name".to_string()]];
        for i in 0..20 {
            let name = format!("tag{i}");
            stub = stub.count(&name, i).delay(&name, 10);
            rows.push(vec![name]);
        }

        let enricher = Enricher::new(stub).with_concurrency(3);
        let out = enricher.enrich(Table::new(rows)).await.unwrap();

        assert_eq!(out.len(), 21);
        let peak = enricher.fetcher.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak concurrency {peak}");
        assert!(peak >= 2, "tasks never overlapped");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn single_permit_runs_rows_one_at_a_time_in_order() {
        let mut stub = Stub::default();
        let mut rows = vec![vec!["name".to_string()]];
        let mut names = Vec::new();
        for i in 0..6 {
            let name = format!("tag{i}");
            // later rows are faster; with one permit that must not matter
            stub = stub.count(&name, i).delay(&name, 12 - 2 * i);
            rows.push(vec![name.clone()]);
            names.push(name);
        }

        let enricher = Enricher::new(stub).with_concurrency(1);
        enricher.enrich(Table::new(rows)).await.unwrap();

        assert_eq!(enricher.fetcher.peak.load(Ordering::SeqCst), 1);
        assert_eq!(*enricher.fetcher.started.lock().unwrap(), names);
    }

    #[tokio::test]
    async fn zero_concurrency_is_clamped() {
        let stub = Stub::default().count("a", 1);
        let out = Enricher::new(stub)
            .with_concurrency(0)
            .with_run_date(date())
            .enrich(table(&[&["name"], &["a"]]))
            .await
            .unwrap();
        assert_eq!(out.rows()[1][1], "1");
    }

    #[tokio::test]
    async fn from_config_uses_label_and_policy() {
        let cfg = Config {
            label: "count: ".into(),
            abort_on_error: true,
            concurrency: 2,
            ..Config::default()
        };
        let stub = Stub::default().page("a", "count: 9");
        let enricher = Enricher::from_config(stub, &cfg).with_run_date(date());
        assert_eq!(enricher.policy, FailurePolicy::Abort);
        assert_eq!(enricher.concurrency, 2);

        let out = enricher.enrich(table(&[&["name"], &["a"]])).await.unwrap();
        assert_eq!(out.rows()[1][1], "9");
    }
}
