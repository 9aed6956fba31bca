use chrono::{DateTime, Utc};
use opencti_client::{ClientError, Observable, OpenCtiApi, OpenCtiClient};
use prometheus::Opts;
use prometheus::core::Desc;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{Instrument, Span, debug, error, info_span};

pub const NAMESPACE: &str = "opencti";
pub const ENTITY_TYPE_LABEL: &str = "entity_type";

/// Stand-in deadline for timeouts too large to add to `Instant::now()`.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// The three series the collector knows about, in exposition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Series {
    Up,
    LastCreated,
    LastUpdated,
}

impl Series {
    pub const ALL: [Series; 3] = [Series::Up, Series::LastCreated, Series::LastUpdated];
}

/// One gauge value produced by a scrape.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub series: Series,
    pub label_values: Vec<String>,
    pub value: f64,
}

impl Sample {
    fn up(value: f64) -> Self {
        Self {
            series: Series::Up,
            label_values: Vec::new(),
            value,
        }
    }

    fn freshness(series: Series, freshness: &Freshness) -> Self {
        Self {
            series,
            label_values: vec![freshness.entity_type.clone()],
            value: freshness.timestamp.timestamp() as f64,
        }
    }
}

/// Entity kind and update time of the newest record for one ordering.
#[derive(Debug, Clone, PartialEq)]
pub struct Freshness {
    pub entity_type: String,
    pub timestamp: DateTime<Utc>,
}

impl From<&Observable> for Freshness {
    /// Both freshness gauges report the record's `updated_at`.
    fn from(observable: &Observable) -> Self {
        Self {
            entity_type: observable.entity_type.clone(),
            timestamp: observable.updated_at,
        }
    }
}

/// Outcome of one probe sequence.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProbeResult {
    pub healthy: bool,
    pub last_created: Option<Freshness>,
    pub last_updated: Option<Freshness>,
}

impl ProbeResult {
    pub fn is_up(&self) -> bool {
        self.healthy && self.last_created.is_some() && self.last_updated.is_some()
    }

    /// Freshness samples followed by `up`; only `up 0` unless fully up.
    pub fn samples(&self) -> Vec<Sample> {
        match (&self.last_created, &self.last_updated) {
            (Some(created), Some(updated)) if self.healthy => vec![
                Sample::freshness(Series::LastCreated, created),
                Sample::freshness(Series::LastUpdated, updated),
                Sample::up(1.0),
            ],
            _ => vec![Sample::up(0.0)],
        }
    }
}

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("scrape deadline exceeded")]
    DeadlineExceeded,
}

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("creating OpenCTI client: {0}")]
    Client(#[from] ClientError),

    #[error("building metric descriptors: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Probes OpenCTI on every scrape and reports liveness and data freshness.
pub struct OpenCtiCollector {
    api: Arc<dyn OpenCtiApi>,
    up: Desc,
    last_created: Desc,
    last_updated: Desc,
    span: Span,
}

impl OpenCtiCollector {
    /// Build the collector around an existing API handle.
    ///
    /// Fails only when `subsystem` makes the metric names invalid.
    pub fn new(api: Arc<dyn OpenCtiApi>, subsystem: &str) -> Result<Self, prometheus::Error> {
        let span = info_span!("opencti_collector", url = %api.endpoint());
        Ok(Self {
            up: build_desc(subsystem, "up", "Whether OpenCTI is up.", &[])?,
            last_created: build_desc(
                subsystem,
                "last_created_timestamp_seconds",
                "Timestamp of the last creation in OpenCTI by entity type.",
                &[ENTITY_TYPE_LABEL],
            )?,
            last_updated: build_desc(
                subsystem,
                "last_updated_timestamp_seconds",
                "Timestamp of the last update in OpenCTI by entity type.",
                &[ENTITY_TYPE_LABEL],
            )?,
            api,
            span,
        })
    }

    /// Build the HTTP client from `url` and `token`, then the collector.
    pub fn connect(
        url: &str,
        token: &str,
        request_timeout: Duration,
        subsystem: &str,
    ) -> Result<Self, BuildError> {
        let client = OpenCtiClient::new(url, token, request_timeout)?;
        Ok(Self::new(Arc::new(client), subsystem)?)
    }

    /// The three descriptors, always in the order up, last created, last updated.
    pub fn describe(&self) -> Vec<&Desc> {
        Series::ALL.iter().map(|s| self.descriptor(*s)).collect()
    }

    pub fn descriptor(&self, series: Series) -> &Desc {
        match series {
            Series::Up => &self.up,
            Series::LastCreated => &self.last_created,
            Series::LastUpdated => &self.last_updated,
        }
    }

    /// Run one probe sequence bounded by `timeout` and return its samples.
    ///
    /// Never fails: every remote error ends the sequence and yields `up 0`.
    pub async fn collect(&self, timeout: Duration) -> Vec<Sample> {
        self.probe(deadline_after(timeout))
            .instrument(self.span.clone())
            .await
            .samples()
    }

    /// Health check, then newest-by-creation, then newest-by-update.
    pub async fn probe(&self, deadline: Instant) -> ProbeResult {
        let mut result = ProbeResult::default();

        if let Err(e) = bounded(deadline, self.api.health_check()).await {
            error!(error = %e, "Health check failed");
            return result;
        }
        result.healthy = true;
        debug!("Health check successful");

        let created = match bounded(deadline, self.api.most_recently_created()).await {
            Ok(Some(observable)) => observable,
            Ok(None) => {
                error!("No last created StixCyberObservable retrieved");
                return result;
            }
            Err(e) => {
                error!(error = %e, "Retrieving last created StixCyberObservables");
                return result;
            }
        };
        debug!(object = ?created, "Last StixCyberObservable created");

        let updated = match bounded(deadline, self.api.most_recently_updated()).await {
            Ok(Some(observable)) => observable,
            Ok(None) => {
                error!("No last updated StixCyberObservable retrieved");
                return result;
            }
            Err(e) => {
                error!(error = %e, "Retrieving last updated StixCyberObservables");
                return result;
            }
        };
        debug!(object = ?updated, "Last StixCyberObservable updated");

        result.last_created = Some(Freshness::from(&created));
        result.last_updated = Some(Freshness::from(&updated));
        result
    }
}

fn build_desc(
    subsystem: &str,
    name: &str,
    help: &str,
    labels: &[&str],
) -> Result<Desc, prometheus::Error> {
    let fq_name = Opts::new(name, help)
        .namespace(NAMESPACE)
        .subsystem(subsystem)
        .fq_name();
    Desc::new(
        fq_name,
        help.to_string(),
        labels.iter().map(|l| l.to_string()).collect(),
        HashMap::new(),
    )
}

fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout).unwrap_or(now + FAR_FUTURE)
}

async fn bounded<T>(
    deadline: Instant,
    call: impl Future<Output = Result<T, ClientError>>,
) -> Result<T, ProbeError> {
    match tokio::time::timeout_at(deadline, call).await {
        Ok(result) => result.map_err(ProbeError::from),
        Err(_) => Err(ProbeError::DeadlineExceeded),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use opencti_client::ListOptions;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone)]
    enum Reply {
        Found(Observable),
        Empty,
        Fail,
        Hang,
    }

    struct MockApi {
        health: Reply,
        created: Reply,
        updated: Reply,
        calls: AtomicUsize,
    }

    impl MockApi {
        fn new(health: Reply, created: Reply, updated: Reply) -> Arc<Self> {
            Arc::new(Self {
                health,
                created,
                updated,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        async fn answer(&self, reply: &Reply) -> Result<Option<Observable>, ClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match reply {
                Reply::Found(o) => Ok(Some(o.clone())),
                Reply::Empty => Ok(None),
                Reply::Fail => Err(ClientError::Status {
                    endpoint: "graphql",
                    status: 502,
                }),
                Reply::Hang => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(None)
                }
            }
        }
    }

    #[async_trait]
    impl OpenCtiApi for MockApi {
        fn endpoint(&self) -> &str {
            "https://opencti:8080"
        }

        async fn health_check(&self) -> Result<(), ClientError> {
            self.answer(&self.health).await.map(|_| ())
        }

        async fn list_observables(
            &self,
            _options: &ListOptions,
        ) -> Result<Vec<Observable>, ClientError> {
            unreachable!("collector only uses the most-recent helpers")
        }

        async fn most_recently_created(&self) -> Result<Option<Observable>, ClientError> {
            self.answer(&self.created).await
        }

        async fn most_recently_updated(&self) -> Result<Option<Observable>, ClientError> {
            self.answer(&self.updated).await
        }
    }

    fn observable(kind: &str, updated_at: &str) -> Observable {
        Observable {
            id: format!("{kind}--id"),
            entity_type: kind.to_string(),
            observable_value: None,
            created_at: "2025-01-15T16:17:05.211Z".parse().unwrap(),
            updated_at: updated_at.parse().unwrap(),
        }
    }

    fn email_addr() -> Reply {
        Reply::Found(observable("Email-Addr", "2025-01-16T15:45:55.316Z"))
    }

    fn hostname() -> Reply {
        Reply::Found(observable("Hostname", "2025-01-16T15:47:03.324Z"))
    }

    fn healthy() -> Reply {
        Reply::Empty
    }

    const TIMEOUT: Duration = Duration::from_secs(5);

    // ── Descriptors ──────────────────────────────────────────────

    #[test]
    fn descriptors_without_subsystem_collapse_name() {
        let api = MockApi::new(healthy(), Reply::Empty, Reply::Empty);
        let collector = OpenCtiCollector::new(api, "").unwrap();
        let names: Vec<&str> = collector.describe().into_iter().map(|d| d.fq_name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "opencti_up",
                "opencti_last_created_timestamp_seconds",
                "opencti_last_updated_timestamp_seconds",
            ]
        );
    }

    #[test]
    fn descriptors_include_subsystem_and_labels() {
        let api = MockApi::new(healthy(), Reply::Empty, Reply::Empty);
        let collector = OpenCtiCollector::new(api, "prod").unwrap();
        let up = collector.descriptor(Series::Up);
        assert_eq!(up.fq_name, "opencti_prod_up");
        assert!(up.variable_labels.is_empty());
        let created = collector.descriptor(Series::LastCreated);
        assert_eq!(created.fq_name, "opencti_prod_last_created_timestamp_seconds");
        assert_eq!(created.variable_labels, vec!["entity_type".to_string()]);
    }

    #[test]
    fn invalid_subsystem_fails_construction() {
        let api = MockApi::new(healthy(), Reply::Empty, Reply::Empty);
        assert!(OpenCtiCollector::new(api, "not-valid").is_err());
    }

    #[test]
    fn connect_with_malformed_url_fails() {
        let err = OpenCtiCollector::connect("::not a url::", "t", TIMEOUT, "")
            .err()
            .expect("construction must fail");
        assert!(matches!(err, BuildError::Client(_)));
    }

    #[tokio::test]
    async fn describe_is_stable_across_collections() {
        let api = MockApi::new(healthy(), email_addr(), hostname());
        let collector = OpenCtiCollector::new(api, "").unwrap();
        let before: Vec<String> = collector.describe().iter().map(|d| d.fq_name.clone()).collect();
        collector.collect(TIMEOUT).await;
        let after: Vec<String> = collector.describe().iter().map(|d| d.fq_name.clone()).collect();
        assert_eq!(before, after);
    }

    // ── Probe sequence ───────────────────────────────────────────

    #[tokio::test]
    async fn health_failure_reports_only_down() {
        let api = MockApi::new(Reply::Fail, email_addr(), hostname());
        let collector = OpenCtiCollector::new(api.clone(), "").unwrap();

        let samples = collector.collect(TIMEOUT).await;

        assert_eq!(samples, vec![Sample::up(0.0)]);
        assert_eq!(api.calls(), 1, "no query may follow a failed health check");
    }

    #[tokio::test]
    async fn empty_creation_query_reports_only_down() {
        let api = MockApi::new(healthy(), Reply::Empty, hostname());
        let collector = OpenCtiCollector::new(api.clone(), "").unwrap();

        assert_eq!(collector.collect(TIMEOUT).await, vec![Sample::up(0.0)]);
        assert_eq!(api.calls(), 2);
    }

    #[tokio::test]
    async fn failed_creation_query_reports_only_down() {
        let api = MockApi::new(healthy(), Reply::Fail, hostname());
        let collector = OpenCtiCollector::new(api.clone(), "").unwrap();

        assert_eq!(collector.collect(TIMEOUT).await, vec![Sample::up(0.0)]);
        assert_eq!(api.calls(), 2);
    }

    #[tokio::test]
    async fn empty_update_query_discards_creation_data() {
        let api = MockApi::new(healthy(), email_addr(), Reply::Empty);
        let collector = OpenCtiCollector::new(api.clone(), "").unwrap();

        let result = collector.probe(Instant::now() + TIMEOUT).await;
        assert!(result.healthy);
        assert!(result.last_created.is_none());
        assert_eq!(result.samples(), vec![Sample::up(0.0)]);
        assert_eq!(api.calls(), 3);
    }

    #[tokio::test]
    async fn failed_update_query_reports_only_down() {
        let api = MockApi::new(healthy(), email_addr(), Reply::Fail);
        let collector = OpenCtiCollector::new(api, "").unwrap();

        assert_eq!(collector.collect(TIMEOUT).await, vec![Sample::up(0.0)]);
    }

    #[tokio::test]
    async fn both_records_report_freshness_and_up() {
        let api = MockApi::new(healthy(), email_addr(), hostname());
        let collector = OpenCtiCollector::new(api, "").unwrap();

        let samples = collector.collect(TIMEOUT).await;

        assert_eq!(
            samples,
            vec![
                Sample {
                    series: Series::LastCreated,
                    label_values: vec!["Email-Addr".into()],
                    value: 1737042355.0,
                },
                Sample {
                    series: Series::LastUpdated,
                    label_values: vec!["Hostname".into()],
                    value: 1737042423.0,
                },
                Sample::up(1.0),
            ]
        );
    }

    #[tokio::test]
    async fn repeated_collections_are_identical() {
        let api = MockApi::new(healthy(), email_addr(), hostname());
        let collector = OpenCtiCollector::new(api, "").unwrap();

        let first = collector.collect(TIMEOUT).await;
        let second = collector.collect(TIMEOUT).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn deadline_exceeded_reports_down() {
        let api = MockApi::new(healthy(), Reply::Hang, hostname());
        let collector = OpenCtiCollector::new(api.clone(), "").unwrap();

        let samples = collector.collect(Duration::from_millis(50)).await;

        assert_eq!(samples, vec![Sample::up(0.0)]);
        assert_eq!(api.calls(), 2, "update query must be skipped after a timeout");
    }

    #[tokio::test]
    async fn unbounded_timeout_still_collects() {
        let api = MockApi::new(healthy(), email_addr(), hostname());
        let collector = OpenCtiCollector::new(api, "").unwrap();

        let samples = collector.collect(Duration::from_secs(u64::MAX)).await;
        assert_eq!(samples.last(), Some(&Sample::up(1.0)));
    }

    #[test]
    fn deadline_saturates_on_overflow() {
        let before = Instant::now();
        let deadline = deadline_after(Duration::MAX);
        assert!(deadline >= before + FAR_FUTURE);
    }

    #[test]
    fn unhealthy_result_never_emits_freshness() {
        let result = ProbeResult {
            healthy: false,
            last_created: Some(Freshness {
                entity_type: "Hostname".into(),
                timestamp: Utc::now(),
            }),
            last_updated: Some(Freshness {
                entity_type: "Hostname".into(),
                timestamp: Utc::now(),
            }),
        };
        assert!(!result.is_up());
        assert_eq!(result.samples(), vec![Sample::up(0.0)]);
    }

    #[test]
    fn sub_second_precision_is_truncated() {
        let freshness = Freshness::from(&observable("Hostname", "2025-01-16T15:47:03.999Z"));
        let sample = Sample::freshness(Series::LastUpdated, &freshness);
        assert_eq!(sample.value, 1737042423.0);
    }
}
