use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use lettre::Message;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::outbox::transport::{build_message, DeliveryError, MailTransport};
use crate::outbox::{EmailClass, OutboxRepo};

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub class: EmailClass,
    pub interval: Duration,
    /// Deliveries attempted per tick. Malformed rows do not count.
    pub batch_size: i64,
    /// Rows not started before this much of the tick has elapsed wait for the next tick.
    pub tick_deadline: Duration,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub fetched: usize,
    pub delivered: usize,
    pub malformed: usize,
    pub failed: usize,
    /// Delivered but the PROCESSED write did not land; will be re-sent.
    pub unmarked: usize,
    /// Claimed by another dispatcher, or processed since the page was read.
    pub busy: usize,
    pub deferred: usize,
}

/// Drains one class of outbox rows through a [`MailTransport`].
///
/// At-least-once: a row is only marked PROCESSED after the transport
/// acknowledged it, and anything else leaves it PENDING for the next tick.
/// Each row is claimed with `SKIP LOCKED` while it is sent, so replicas
/// draining the same class do not send it twice.
///
/// Rows that can never become a message stay PENDING for an operator to
/// inspect; the dispatcher remembers their keys and stops fetching them.
#[derive(Clone)]
pub struct Dispatcher {
    outbox: OutboxRepo,
    transport: Arc<dyn MailTransport>,
    cfg: DispatcherConfig,
    malformed: Arc<Mutex<HashSet<Uuid>>>,
}

impl Dispatcher {
    pub fn new(outbox: OutboxRepo, transport: Arc<dyn MailTransport>, cfg: DispatcherConfig) -> Self {
        Self {
            outbox,
            transport,
            cfg,
            malformed: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Page through pending rows until `batch_size` deliveries were attempted,
    /// the class is drained, or the tick deadline passes.
    pub async fn tick(&self) -> anyhow::Result<TickReport> {
        let started = Instant::now();
        let budget = self.cfg.batch_size.max(1) as usize;
        let skip: Vec<Uuid> = self.malformed.lock().await.iter().copied().collect();

        let mut report = TickReport::default();
        let mut cursor: Option<(DateTime<Utc>, Uuid)> = None;
        let mut attempted = 0usize;

        'pages: while attempted < budget {
            let page = self
                .outbox
                .fetch_pending(self.cfg.class, cursor, &skip, (budget - attempted) as i64)
                .await?;
            if page.is_empty() {
                break;
            }
            report.fetched += page.len();

            for (i, email) in page.iter().enumerate() {
                if started.elapsed() >= self.cfg.tick_deadline {
                    report.deferred += page.len() - i;
                    tracing::warn!(
                        class = self.cfg.class.as_str(),
                        deferred = report.deferred,
                        "tick deadline reached"
                    );
                    break 'pages;
                }
                cursor = Some((email.created_at, email.email_key));

                let message = match build_message(email) {
                    Ok(message) => message,
                    Err(e) => {
                        tracing::error!(email_key = %email.email_key, reason = %e, "skipping undeliverable email");
                        self.malformed.lock().await.insert(email.email_key);
                        report.malformed += 1;
                        continue;
                    }
                };

                attempted += 1;
                self.deliver(email.email_key, message, &mut report).await;
            }
        }

        Ok(report)
    }

    async fn deliver(&self, email_key: Uuid, message: Message, report: &mut TickReport) {
        let claim = match self.outbox.claim(email_key).await {
            Ok(Some(claim)) => claim,
            Ok(None) => {
                tracing::debug!(%email_key, "email claimed elsewhere or already processed");
                report.busy += 1;
                return;
            }
            Err(e) => {
                tracing::error!(%email_key, error = %e, "failed to claim email");
                report.failed += 1;
                return;
            }
        };

        if let Err(e) = self.transport.send(message).await {
            match e {
                DeliveryError::Malformed(reason) => {
                    tracing::error!(%email_key, %reason, "transport refused email");
                    self.malformed.lock().await.insert(email_key);
                    report.malformed += 1;
                }
                DeliveryError::Transport(reason) => {
                    tracing::warn!(
                        %email_key,
                        transport = self.transport.name(),
                        %reason,
                        "delivery failed, will retry next tick"
                    );
                    report.failed += 1;
                }
            }
            return;
        }
        tracing::info!(%email_key, to = ?claim.email.email_to, "email sent");

        match claim.mark_processed().await {
            Ok(()) => report.delivered += 1,
            Err(e) => {
                tracing::error!(%email_key, error = %e, "failed to mark email processed");
                report.unmarked += 1;
            }
        }
    }

    /// Tick on the configured interval until `cancel` fires.
    ///
    /// Cancellation is only observed between ticks; a tick in progress always
    /// finishes its current row.
    pub async fn run(self, cancel: CancellationToken) -> anyhow::Result<()> {
        let class = self.cfg.class.as_str();
        tracing::info!(
            class,
            interval_ms = self.cfg.interval.as_millis() as u64,
            batch_size = self.cfg.batch_size,
            transport = self.transport.name(),
            "dispatcher starting"
        );

        let mut ticker = tokio::time::interval(self.cfg.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(class, "dispatcher stopping");
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }

            match self.tick().await {
                Ok(report) if report.fetched > 0 => tracing::info!(
                    class,
                    fetched = report.fetched,
                    delivered = report.delivered,
                    failed = report.failed,
                    malformed = report.malformed,
                    unmarked = report.unmarked,
                    busy = report.busy,
                    deferred = report.deferred,
                    "dispatch tick"
                ),
                Ok(_) => {}
                Err(e) => tracing::error!(class, error = %e, "dispatch tick failed"),
            }
        }
    }
}
