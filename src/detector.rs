use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::config::EmailConfig;
use crate::error::{CycleError, FetchError, NotifyError};
use crate::fetcher::{check_page, Fetcher};
use crate::fingerprint::fingerprint;
use crate::models::{FieldChange, FingerprintKey, ManuscriptStatus};
use crate::notifications::{MessageTemplate, NotificationKind, Notifier};
use crate::parser;
use crate::store::StateStore;

/// Which detected transitions produce a notification.
///
/// Store writes do not depend on this; only delivery does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotifyPolicy {
    pub on_first_run: bool,
    pub on_change: bool,
}

impl Default for NotifyPolicy {
    fn default() -> Self {
        Self {
            on_first_run: true,
            on_change: true,
        }
    }
}

impl NotifyPolicy {
    pub fn from_config(email: &EmailConfig) -> Self {
        Self {
            on_first_run: email.send_on_first_run,
            on_change: email.send_on_change,
        }
    }
}

/// What happened to the notification of a cycle
#[derive(Debug)]
pub enum Delivery {
    Sent,
    /// Disabled by policy or no notifier configured
    Skipped,
    /// The snapshot is already saved; the message has to be resent by hand
    Failed(NotifyError),
}

/// Result of a completed check cycle
#[derive(Debug)]
pub enum CycleOutcome {
    /// Nothing was stored before; the current status is now the baseline
    Baseline {
        fingerprint: FingerprintKey,
        delivery: Delivery,
    },
    Changed {
        previous: FingerprintKey,
        fingerprint: FingerprintKey,
        changes: Vec<FieldChange>,
        delivery: Delivery,
    },
    Unchanged { fingerprint: FingerprintKey },
}

impl CycleOutcome {
    pub fn fingerprint(&self) -> &FingerprintKey {
        match self {
            CycleOutcome::Baseline { fingerprint, .. }
            | CycleOutcome::Changed { fingerprint, .. }
            | CycleOutcome::Unchanged { fingerprint } => fingerprint,
        }
    }

    pub fn delivery(&self) -> Option<&Delivery> {
        match self {
            CycleOutcome::Baseline { delivery, .. } | CycleOutcome::Changed { delivery, .. } => {
                Some(delivery)
            }
            CycleOutcome::Unchanged { .. } => None,
        }
    }

    pub fn notification_failed(&self) -> bool {
        matches!(self.delivery(), Some(Delivery::Failed(_)))
    }
}

/// Runs fetch → parse → fingerprint → compare → persist → notify
pub struct ChangeDetector<F, S, N> {
    fetcher: F,
    store: S,
    notifier: Option<N>,
    template: MessageTemplate,
    policy: NotifyPolicy,
    debug_dir: Option<PathBuf>,
}

impl<F: Fetcher, S: StateStore, N: Notifier> ChangeDetector<F, S, N> {
    pub fn new(fetcher: F, store: S, notifier: Option<N>, template: MessageTemplate) -> Self {
        Self {
            fetcher,
            store,
            notifier,
            template,
            policy: NotifyPolicy::default(),
            debug_dir: None,
        }
    }

    pub fn with_policy(mut self, policy: NotifyPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Keep raw pages that are rejected or fail to parse in `dir`
    pub fn with_debug_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.debug_dir = dir;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run one check cycle
    pub async fn run_cycle(&self) -> Result<CycleOutcome, CycleError> {
        self.run_cycle_at(Utc::now()).await
    }

    /// Run one check cycle, recording `now` as the observation time
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> Result<CycleOutcome, CycleError> {
        let raw = self.fetcher.fetch().await?;

        if let Err(e) = check_page(&raw) {
            warn!(error = %e, "Status page rejected");
            self.dump_failed_page(rejection_tag(&e), &raw);
            return Err(e.into());
        }

        let status = match parser::parse(&raw) {
            Ok(status) => status,
            Err(e) => {
                self.dump_failed_page("parse", &raw);
                return Err(e.into());
            }
        };

        let fp = fingerprint(&status);

        match self.store.load()? {
            None => {
                self.store.save(&status, &fp, now)?;
                info!(
                    manuscript = %status.manuscript_number,
                    progress = %status.progress_status,
                    fingerprint = %fp,
                    "Baseline captured"
                );

                let delivery = self
                    .deliver(self.policy.on_first_run, NotificationKind::Baseline, None, &status)
                    .await;

                Ok(CycleOutcome::Baseline {
                    fingerprint: fp,
                    delivery,
                })
            }
            Some(prior) if prior.fingerprint != fp => {
                if prior.status.manuscript_number != status.manuscript_number {
                    warn!(
                        previous = %prior.status.manuscript_number,
                        current = %status.manuscript_number,
                        "Manuscript number differs from the stored snapshot"
                    );
                }

                self.store.save(&status, &fp, now)?;

                let changes = status.changes_from(&prior.status);
                info!(
                    previous = %prior.fingerprint,
                    current = %fp,
                    changed_fields = changes.len(),
                    progress = %status.progress_status,
                    "Status changed"
                );
                for change in &changes {
                    debug!(field = %change.field, before = %change.before, after = %change.after, "Field changed");
                }

                let delivery = self
                    .deliver(
                        self.policy.on_change,
                        NotificationKind::Changed,
                        Some(&prior.status),
                        &status,
                    )
                    .await;

                Ok(CycleOutcome::Changed {
                    previous: prior.fingerprint,
                    fingerprint: fp,
                    changes,
                    delivery,
                })
            }
            Some(_) => {
                info!(fingerprint = %fp, "No change");
                Ok(CycleOutcome::Unchanged { fingerprint: fp })
            }
        }
    }

    async fn deliver(
        &self,
        allowed: bool,
        kind: NotificationKind,
        prior: Option<&ManuscriptStatus>,
        status: &ManuscriptStatus,
    ) -> Delivery {
        let Some(notifier) = self.notifier.as_ref() else {
            debug!("No notifier configured");
            return Delivery::Skipped;
        };

        if !allowed {
            debug!(kind = ?kind, "Notification disabled by policy");
            return Delivery::Skipped;
        }

        let notification = self.template.render(kind, prior, status);
        match notifier.send(&notification).await {
            Ok(()) => Delivery::Sent,
            Err(e) => {
                error!(
                    error = %e,
                    subject = %notification.subject,
                    "Notification failed; snapshot was saved, resend manually"
                );
                Delivery::Failed(e)
            }
        }
    }

    fn dump_failed_page(&self, tag: &str, raw: &str) {
        let Some(dir) = self.debug_dir.as_ref() else {
            return;
        };

        let path = dir.join(format!("fail_{}_{}.html", tag, Utc::now().timestamp()));
        let result = fs::create_dir_all(dir).and_then(|_| fs::write(&path, raw));
        match result {
            Ok(()) => info!(path = %path.display(), "Saved failed page"),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to save failed page"),
        }
    }
}

fn rejection_tag(error: &FetchError) -> &'static str {
    match error {
        FetchError::EmptyBody => "empty_body",
        FetchError::Blocked => "blocked",
        FetchError::NoResult => "noresult",
        _ => "fetch",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use crate::error::StoreError;
    use crate::models::Snapshot;
    use crate::notifications::Notification;
    use crate::store::MemoryStateStore;
    use tempfile::tempdir;
    use tokio_test::block_on;

    fn page(completed: u32, invited: &str) -> String {
        format!(
            "同行评审进度
Adaptive mesh refinement for coupled flow problems in porous media
更新时间：2024年5月20日
当前进度
Under Review
评审完成
{completed}
接受评审邀请
2
发出评审邀请
{invited}
期刊
Journal of Computational Physics
Manuscript Number
MS-001
提交日期
2024年3月5日
"
        )
    }

    #[derive(Clone, Default)]
    struct FakeFetcher {
        page: Arc<Mutex<String>>,
    }

    impl FakeFetcher {
        fn serving(content: String) -> Self {
            Self {
                page: Arc::new(Mutex::new(content)),
            }
        }

        fn set(&self, content: String) {
            *self.page.lock().unwrap() = content;
        }
    }

    impl Fetcher for FakeFetcher {
        async fn fetch(&self) -> Result<String, FetchError> {
            Ok(self.page.lock().unwrap().clone())
        }
    }

    #[derive(Clone, Default)]
    struct FakeNotifier {
        sent: Arc<Mutex<Vec<Notification>>>,
        fail: bool,
    }

    impl FakeNotifier {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        fn count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    impl Notifier for FakeNotifier {
        async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
            if self.fail {
                return Err(NotifyError::Smtp("connection refused".to_string()));
            }
            self.sent.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }

    struct BrokenStore;

    impl StateStore for BrokenStore {
        fn load(&self) -> Result<Option<Snapshot>, StoreError> {
            Err(StoreError::Unavailable("disk gone".to_string()))
        }

        fn save(
            &self,
            _status: &ManuscriptStatus,
            _fingerprint: &FingerprintKey,
            _observed_at: DateTime<Utc>,
        ) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("disk gone".to_string()))
        }
    }

    fn detector(
        fetcher: &FakeFetcher,
        notifier: &FakeNotifier,
    ) -> ChangeDetector<FakeFetcher, MemoryStateStore, FakeNotifier> {
        ChangeDetector::new(
            fetcher.clone(),
            MemoryStateStore::new(),
            Some(notifier.clone()),
            MessageTemplate::new("Paper A", "[Elsevier]"),
        )
    }

    #[test]
    fn test_first_run_captures_baseline() {
        let fetcher = FakeFetcher::serving(page(2, "4"));
        let notifier = FakeNotifier::default();
        let detector = detector(&fetcher, &notifier);

        let outcome = block_on(detector.run_cycle()).unwrap();

        assert!(matches!(
            outcome,
            CycleOutcome::Baseline { delivery: Delivery::Sent, .. }
        ));
        assert_eq!(detector.store().save_count(), 1);
        assert_eq!(notifier.count(), 1);
        assert!(notifier.sent.lock().unwrap()[0].html.contains("Baseline captured"));
    }

    #[test]
    fn test_first_run_saves_regardless_of_policy() {
        let fetcher = FakeFetcher::serving(page(2, "4"));
        let notifier = FakeNotifier::default();
        let detector = detector(&fetcher, &notifier).with_policy(NotifyPolicy {
            on_first_run: false,
            on_change: true,
        });

        let outcome = block_on(detector.run_cycle()).unwrap();

        assert!(matches!(
            outcome,
            CycleOutcome::Baseline { delivery: Delivery::Skipped, .. }
        ));
        assert_eq!(detector.store().save_count(), 1);
        assert_eq!(notifier.count(), 0);
    }

    #[test]
    fn test_identical_content_is_idempotent() {
        let fetcher = FakeFetcher::serving(page(2, "4"));
        let notifier = FakeNotifier::default();
        let detector = detector(&fetcher, &notifier);

        let first = block_on(detector.run_cycle()).unwrap();
        let second = block_on(detector.run_cycle()).unwrap();

        assert_eq!(first.fingerprint(), second.fingerprint());
        assert!(matches!(second, CycleOutcome::Unchanged { .. }));
        assert_eq!(detector.store().save_count(), 1);
        assert_eq!(notifier.count(), 1);
    }

    #[test]
    fn test_change_scenario() {
        let fetcher = FakeFetcher::serving(page(2, "4"));
        let notifier = FakeNotifier::default();
        let detector = detector(&fetcher, &notifier);

        let f1 = block_on(detector.run_cycle()).unwrap().fingerprint().clone();
        assert_eq!(detector.store().load().unwrap().unwrap().fingerprint, f1);

        let outcome = block_on(detector.run_cycle()).unwrap();
        assert!(matches!(outcome, CycleOutcome::Unchanged { .. }));
        assert_eq!(detector.store().save_count(), 1);
        assert_eq!(notifier.count(), 1);

        fetcher.set(page(3, "4"));
        let outcome = block_on(detector.run_cycle()).unwrap();

        match outcome {
            CycleOutcome::Changed {
                previous,
                fingerprint,
                changes,
                delivery,
            } => {
                assert_eq!(previous, f1);
                assert_ne!(fingerprint, f1);
                assert_eq!(changes.len(), 1);
                assert_eq!(changes[0].before, "2");
                assert_eq!(changes[0].after, "3");
                assert!(matches!(delivery, Delivery::Sent));
                assert_eq!(detector.store().load().unwrap().unwrap().fingerprint, fingerprint);
            }
            other => panic!("expected a change, got {:?}", other),
        }

        assert_eq!(detector.store().save_count(), 2);
        assert_eq!(notifier.count(), 2);
        let last = notifier.sent.lock().unwrap()[1].clone();
        assert!(last.text.contains("* Reviews completed: 2 -> 3"));
    }

    #[test]
    fn test_masked_count_change_is_detected() {
        let fetcher = FakeFetcher::serving(page(2, "2"));
        let notifier = FakeNotifier::default();
        let detector = detector(&fetcher, &notifier);

        block_on(detector.run_cycle()).unwrap();
        fetcher.set(page(2, "2+**"));
        let outcome = block_on(detector.run_cycle()).unwrap();

        assert!(matches!(outcome, CycleOutcome::Changed { .. }));
        assert_eq!(notifier.count(), 2);
    }

    #[test]
    fn test_change_without_notification_by_policy() {
        let fetcher = FakeFetcher::serving(page(2, "4"));
        let notifier = FakeNotifier::default();
        let detector = detector(&fetcher, &notifier).with_policy(NotifyPolicy {
            on_first_run: true,
            on_change: false,
        });

        block_on(detector.run_cycle()).unwrap();
        fetcher.set(page(3, "4"));
        let outcome = block_on(detector.run_cycle()).unwrap();

        assert!(matches!(
            outcome,
            CycleOutcome::Changed { delivery: Delivery::Skipped, .. }
        ));
        assert_eq!(detector.store().save_count(), 2);
        assert_eq!(notifier.count(), 1);
    }

    #[test]
    fn test_parse_error_leaves_store_untouched() {
        let dir = tempdir().unwrap();
        let fetcher = FakeFetcher::serving(page(2, "4"));
        let notifier = FakeNotifier::default();
        let detector =
            detector(&fetcher, &notifier).with_debug_dir(Some(dir.path().join("debug")));

        block_on(detector.run_cycle()).unwrap();
        let before = detector.store().load().unwrap().unwrap();

        fetcher.set(page(2, "4").replace("Manuscript Number\nMS-001\n", ""));
        let err = block_on(detector.run_cycle()).unwrap_err();

        assert!(matches!(err, CycleError::Parse(_)));
        assert_eq!(detector.store().load().unwrap().unwrap(), before);
        assert_eq!(detector.store().save_count(), 1);
        assert_eq!(notifier.count(), 1);

        let dumps: Vec<_> = fs::read_dir(dir.path().join("debug")).unwrap().collect();
        assert_eq!(dumps.len(), 1);
    }

    #[test]
    fn test_fetch_error_aborts_cycle() {
        let fetcher = FakeFetcher::serving(String::new());
        let notifier = FakeNotifier::default();
        let detector = detector(&fetcher, &notifier);

        let err = block_on(detector.run_cycle()).unwrap_err();

        assert!(matches!(err, CycleError::Fetch(FetchError::EmptyBody)));
        assert!(detector.store().load().unwrap().is_none());
        assert_eq!(notifier.count(), 0);
    }

    #[test]
    fn test_rejected_pages_are_dumped() {
        let dir = tempdir().unwrap();
        let debug_dir = dir.path().join("debug");
        let fetcher = FakeFetcher::serving("<p>访问过于频繁，请稍后再试</p>".to_string());
        let notifier = FakeNotifier::default();
        let detector = detector(&fetcher, &notifier).with_debug_dir(Some(debug_dir.clone()));

        let err = block_on(detector.run_cycle()).unwrap_err();
        assert!(matches!(err, CycleError::Fetch(FetchError::Blocked)));

        fetcher.set("Manuscript Number\nLast Name\nFirst Name\n我已阅读并同意条款".to_string());
        let err = block_on(detector.run_cycle()).unwrap_err();
        assert!(matches!(err, CycleError::Fetch(FetchError::NoResult)));

        let mut names: Vec<String> = fs::read_dir(&debug_dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names.len(), 2);
        assert!(names[0].starts_with("fail_blocked_"));
        assert!(names[1].starts_with("fail_noresult_"));

        let blocked = fs::read_to_string(debug_dir.join(&names[0])).unwrap();
        assert!(blocked.contains("访问过于频繁"));
        assert!(detector.store().load().unwrap().is_none());
        assert_eq!(notifier.count(), 0);
    }

    #[test]
    fn test_notify_failure_keeps_store_write() {
        let fetcher = FakeFetcher::serving(page(2, "4"));
        let notifier = FakeNotifier::failing();
        let detector = detector(&fetcher, &notifier);

        let outcome = block_on(detector.run_cycle()).unwrap();

        assert!(outcome.notification_failed());
        assert_eq!(detector.store().save_count(), 1);

        // The state was recorded, so the next identical poll stays quiet
        let outcome = block_on(detector.run_cycle()).unwrap();
        assert!(matches!(outcome, CycleOutcome::Unchanged { .. }));
    }

    #[test]
    fn test_store_failure_aborts_cycle() {
        let fetcher = FakeFetcher::serving(page(2, "4"));
        let notifier = FakeNotifier::default();
        let detector = ChangeDetector::new(
            fetcher,
            BrokenStore,
            Some(notifier.clone()),
            MessageTemplate::new("Paper A", "[Elsevier]"),
        );

        let err = block_on(detector.run_cycle()).unwrap_err();

        assert!(matches!(err, CycleError::Store(_)));
        assert_eq!(notifier.count(), 0);
    }

    #[test]
    fn test_without_notifier() {
        let fetcher = FakeFetcher::serving(page(2, "4"));
        let detector: ChangeDetector<_, _, FakeNotifier> = ChangeDetector::new(
            fetcher,
            MemoryStateStore::new(),
            None,
            MessageTemplate::new("Paper A", "[Elsevier]"),
        );

        let outcome = block_on(detector.run_cycle()).unwrap();
        assert!(matches!(
            outcome,
            CycleOutcome::Baseline { delivery: Delivery::Skipped, .. }
        ));
        assert_eq!(detector.store().save_count(), 1);
    }
}
