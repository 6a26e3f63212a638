mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use common::{insert_employer, setup_db, world};
use lettre::Message;
use recruitflow::outbox::dispatcher::{Dispatcher, DispatcherConfig, TickReport};
use recruitflow::outbox::onboarding::{OnboardingConfig, OnboardingInviter};
use recruitflow::outbox::transport::{DeliveryError, MailTransport};
use recruitflow::outbox::{EmailClass, OutboxRepo};
use serial_test::serial;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Fails the first `failures` sends, then records every recipient list it accepts.
struct FlakyTransport {
    failures: AtomicUsize,
    delay: Duration,
    sent: Mutex<Vec<Vec<String>>>,
}

impl FlakyTransport {
    fn new(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            failures: AtomicUsize::new(failures),
            delay: Duration::ZERO,
            sent: Mutex::new(Vec::new()),
        })
    }

    fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            failures: AtomicUsize::new(0),
            delay,
            sent: Mutex::new(Vec::new()),
        })
    }

    fn sent(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl MailTransport for FlakyTransport {
    async fn send(&self, message: Message) -> Result<(), DeliveryError> {
        tokio::time::sleep(self.delay).await;
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            return Err(DeliveryError::Transport("connection reset".into()));
        }
        let to = message
            .envelope()
            .to()
            .iter()
            .map(|a| a.to_string())
            .collect();
        self.sent.lock().unwrap().push(to);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "flaky"
    }
}

fn dispatcher(pool: &PgPool, transport: Arc<FlakyTransport>, class: EmailClass) -> Dispatcher {
    Dispatcher::new(
        OutboxRepo::new(pool.clone()),
        transport,
        DispatcherConfig {
            class,
            interval: Duration::from_millis(20),
            batch_size: 10,
            tick_deadline: Duration::from_secs(30),
        },
    )
}

async fn email_state(pool: &PgPool) -> Vec<(String, bool)> {
    sqlx::query_as::<_, (String, bool)>(
        "SELECT email_state, processed_at IS NOT NULL FROM emails ORDER BY created_at, email_key",
    )
    .fetch_all(pool)
    .await
    .unwrap()
}

async fn insert_raw_email(pool: &PgPool, class: &str, to: &[&str]) -> Uuid {
    sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO emails (
            email_class, email_from, email_to, email_subject, email_html_body, email_text_body
        )
        VALUES ($1, 'no-reply@recruitflow.test', $2, 'hello', '<p>hi</p>', 'hi')
        RETURNING email_key
        "#,
    )
    .bind(class)
    .bind(to.iter().map(|s| s.to_string()).collect::<Vec<_>>())
    .fetch_one(pool)
    .await
    .unwrap()
}

#[tokio::test]
#[serial]
async fn failed_send_is_retried_and_processed_exactly_once() {
    let w = world().await;
    w.candidacy().await;
    assert_eq!(w.pending_emails().await, 1);

    let transport = FlakyTransport::new(1);
    let d = dispatcher(&w.pool, transport.clone(), EmailClass::Transactional);

    let first = d.tick().await.unwrap();
    assert_eq!((first.fetched, first.failed, first.delivered), (1, 1, 0));
    assert_eq!(email_state(&w.pool).await, vec![("PENDING".to_string(), false)]);

    let second = d.tick().await.unwrap();
    assert_eq!((second.fetched, second.delivered), (1, 1));
    assert_eq!(email_state(&w.pool).await, vec![("PROCESSED".to_string(), true)]);

    let third = d.tick().await.unwrap();
    assert_eq!(third.fetched, 0);
    assert_eq!(transport.sent(), 1);
}

#[tokio::test]
#[serial]
async fn malformed_row_does_not_block_the_batch() {
    let pool = setup_db().await;
    let bad = insert_raw_email(&pool, "TRANSACTIONAL", &["not an address"]).await;
    let good = insert_raw_email(&pool, "TRANSACTIONAL", &["sam@example.com"]).await;

    let transport = FlakyTransport::new(0);
    let report = dispatcher(&pool, transport.clone(), EmailClass::Transactional)
        .tick()
        .await
        .unwrap();
    assert_eq!((report.malformed, report.delivered), (1, 1));

    let outbox = OutboxRepo::new(pool.clone());
    assert_eq!(outbox.get(bad).await.unwrap().unwrap().email_state, "PENDING");
    assert_eq!(outbox.get(good).await.unwrap().unwrap().email_state, "PROCESSED");
    assert_eq!(transport.sent(), 1);
}

#[tokio::test]
#[serial]
async fn full_batch_of_malformed_rows_does_not_starve_newer_mail() {
    let pool = setup_db().await;
    let mut bad = Vec::new();
    for _ in 0..10 {
        bad.push(insert_raw_email(&pool, "TRANSACTIONAL", &["not an address"]).await);
    }
    let good = insert_raw_email(&pool, "TRANSACTIONAL", &["sam@example.com"]).await;

    let transport = FlakyTransport::new(0);
    let d = dispatcher(&pool, transport.clone(), EmailClass::Transactional);

    let first = d.tick().await.unwrap();
    assert_eq!((first.fetched, first.malformed, first.delivered), (11, 10, 1));

    let outbox = OutboxRepo::new(pool.clone());
    assert_eq!(outbox.get(good).await.unwrap().unwrap().email_state, "PROCESSED");
    assert_eq!(transport.sent(), 1);

    // known-bad rows are not fetched again, but stay visible as pending
    let later = d.tick().await.unwrap();
    assert_eq!(later, TickReport::default());
    assert_eq!(common::pending_emails(&pool).await, 10);
    for key in bad {
        assert_eq!(outbox.get(key).await.unwrap().unwrap().email_state, "PENDING");
    }

    // mail queued after the bad rows still goes out
    let newer = insert_raw_email(&pool, "TRANSACTIONAL", &["mo@acme.test"]).await;
    let report = d.tick().await.unwrap();
    assert_eq!((report.fetched, report.delivered), (1, 1));
    assert_eq!(outbox.get(newer).await.unwrap().unwrap().email_state, "PROCESSED");
}

#[tokio::test]
#[serial]
async fn concurrent_dispatchers_send_each_row_once() {
    let pool = setup_db().await;
    for i in 0..6 {
        let to = format!("user{i}@example.com");
        insert_raw_email(&pool, "TRANSACTIONAL", &[to.as_str()]).await;
    }

    let transport = FlakyTransport::slow(Duration::from_millis(25));
    let a = dispatcher(&pool, transport.clone(), EmailClass::Transactional);
    let b = dispatcher(&pool, transport.clone(), EmailClass::Transactional);

    let (ra, rb) = tokio::join!(a.tick(), b.tick());
    let (ra, rb) = (ra.unwrap(), rb.unwrap());

    assert_eq!(ra.delivered + rb.delivered, 6);
    assert_eq!(ra.failed + rb.failed, 0);
    assert_eq!(transport.sent(), 6);
    assert_eq!(common::pending_emails(&pool).await, 0);

    let mut recipients: Vec<String> = transport
        .sent
        .lock()
        .unwrap()
        .iter()
        .flatten()
        .cloned()
        .collect();
    recipients.sort();
    recipients.dedup();
    assert_eq!(recipients.len(), 6);
}

#[tokio::test]
#[serial]
async fn dispatchers_only_drain_their_own_class() {
    let pool = setup_db().await;
    insert_raw_email(&pool, "ONBOARDING", &["admin@globex.test"]).await;
    insert_raw_email(&pool, "TRANSACTIONAL", &["sam@example.com"]).await;

    let transport = FlakyTransport::new(0);
    let report = dispatcher(&pool, transport.clone(), EmailClass::Onboarding)
        .tick()
        .await
        .unwrap();
    assert_eq!(report.delivered, 1);
    assert_eq!(
        transport.sent.lock().unwrap().clone(),
        vec![vec!["admin@globex.test".to_string()]]
    );

    let stats = OutboxRepo::new(pool.clone()).stats().await.unwrap();
    assert_eq!(stats.pending_transactional, 1);
    assert_eq!(stats.pending_onboarding, 0);
    assert_eq!(stats.processed_last_hour, 1);
    assert!(stats.oldest_pending_age_secs.is_some());
}

#[tokio::test]
#[serial]
async fn expired_tick_deadline_defers_everything() {
    let pool = setup_db().await;
    for _ in 0..3 {
        insert_raw_email(&pool, "TRANSACTIONAL", &["sam@example.com"]).await;
    }

    let transport = FlakyTransport::new(0);
    let d = Dispatcher::new(
        OutboxRepo::new(pool.clone()),
        transport.clone(),
        DispatcherConfig {
            class: EmailClass::Transactional,
            interval: Duration::from_secs(1),
            batch_size: 2,
            tick_deadline: Duration::ZERO,
        },
    );
    let report = d.tick().await.unwrap();
    assert_eq!((report.fetched, report.deferred, report.delivered), (2, 2, 0));
    assert_eq!(transport.sent(), 0);
    assert_eq!(common::pending_emails(&pool).await, 3);
}

#[tokio::test]
#[serial]
async fn run_loop_drains_and_stops_on_cancel() {
    let w = world().await;
    w.candidacy().await;

    let transport = FlakyTransport::new(2);
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(
        dispatcher(&w.pool, transport.clone(), EmailClass::Transactional).run(cancel.clone()),
    );

    let mut drained = false;
    for _ in 0..200 {
        if w.pending_emails().await == 0 {
            drained = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cancel.cancel();
    handle.await.unwrap().unwrap();

    assert!(drained, "dispatcher never delivered the email");
    assert_eq!(transport.sent(), 1);
}

#[tokio::test]
#[serial]
async fn failed_transition_enqueues_nothing() {
    let w = world().await;
    let application_id = w.apply(&w.candidate).await;
    w.hiring
        .applications
        .reject_application(&w.recruiter, application_id)
        .await
        .unwrap();
    assert_eq!(w.pending_emails().await, 1);

    for _ in 0..3 {
        assert!(w
            .hiring
            .applications
            .reject_application(&w.recruiter, application_id)
            .await
            .is_err());
        assert!(w
            .hiring
            .applications
            .shortlist_application(&w.recruiter, application_id)
            .await
            .is_err());
    }
    assert_eq!(common::count_rows(&w.pool, "emails").await, 1);
}

#[tokio::test]
#[serial]
async fn onboarding_invite_records_token_and_email_together() {
    let pool = setup_db().await;
    let pending = insert_employer(&pool, "Globex", "ONBOARD_PENDING").await;
    insert_employer(&pool, "Acme", "ONBOARDED").await;

    let inviter = OnboardingInviter::new(
        pool.clone(),
        OnboardingConfig {
            interval: Duration::from_secs(180),
            token_valid_mins: 60,
            base_url: "https://employer.recruitflow.test".into(),
            email_from: "no-reply@recruitflow.test".into(),
        },
    )
    .unwrap();

    let invite = inviter.invite_next().await.unwrap().expect("one pending employer");
    assert_eq!(invite.employer_id, pending);

    let (token, email_id) = sqlx::query_as::<_, (Option<String>, Option<Uuid>)>(
        "SELECT onboard_secret_token, onboard_email_id FROM employers WHERE id = $1",
    )
    .bind(pending)
    .fetch_one(&pool)
    .await
    .unwrap();
    let token = token.expect("token recorded");
    assert_eq!(token.len(), 32);
    assert_eq!(email_id, Some(invite.email_key));

    let email = OutboxRepo::new(pool.clone())
        .get(invite.email_key)
        .await
        .unwrap()
        .expect("invite email");
    assert_eq!(email.email_class, "ONBOARDING");
    assert_eq!(email.email_state, "PENDING");
    assert_eq!(email.email_to, vec!["admin@globex.test".to_string()]);
    assert!(email.email_text_body.contains(&format!("/onboard/{token}")));

    // nobody left to invite
    assert!(inviter.invite_next().await.unwrap().is_none());
    assert_eq!(common::count_rows(&pool, "emails").await, 1);
}
