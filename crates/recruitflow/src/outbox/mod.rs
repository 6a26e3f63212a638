//! Transactional outbox.
//!
//! Business writes and the emails they cause commit together through a
//! [`UnitOfWork`]; the [`dispatcher`] drains committed rows later.

pub mod dispatcher;
pub mod onboarding;
pub mod templates;
pub mod transport;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::HiringError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EmailClass {
    Transactional,
    Onboarding,
}

impl EmailClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailClass::Transactional => "TRANSACTIONAL",
            EmailClass::Onboarding => "ONBOARDING",
        }
    }
}

pub enum EmailState {
    Pending,
    Processed,
}

impl EmailState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailState::Pending => "PENDING",
            EmailState::Processed => "PROCESSED",
        }
    }
}

/// An email not yet written to the outbox.
#[derive(Debug, Clone)]
pub struct NewEmail {
    pub class: EmailClass,
    pub from: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
}

impl NewEmail {
    pub fn has_recipients(&self) -> bool {
        !(self.to.is_empty() && self.cc.is_empty() && self.bcc.is_empty())
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Email {
    pub email_key: Uuid,
    pub email_class: String,
    pub email_from: String,
    pub email_to: Vec<String>,
    pub email_cc: Vec<String>,
    pub email_bcc: Vec<String>,
    pub email_subject: String,
    pub email_html_body: String,
    pub email_text_body: String,
    pub email_state: String,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// One transaction plus the emails that must commit with it.
///
/// Emails handed to [`UnitOfWork::notify`] are written inside the transaction
/// right before COMMIT. Dropping the unit without committing rolls back the
/// business writes and discards the emails together.
pub struct UnitOfWork {
    tx: Transaction<'static, Postgres>,
    pending: Vec<(Uuid, NewEmail)>,
}

impl UnitOfWork {
    pub(crate) async fn begin(pool: &PgPool) -> Result<Self, HiringError> {
        let tx = pool.begin().await?;
        Ok(Self {
            tx,
            pending: Vec::new(),
        })
    }

    pub fn conn(&mut self) -> &mut PgConnection {
        &mut self.tx
    }

    /// Queue an email for this transaction and return the key it will be stored under.
    pub fn notify(&mut self, email: NewEmail) -> Uuid {
        let key = Uuid::new_v4();
        self.pending.push((key, email));
        key
    }

    pub fn pending_emails(&self) -> usize {
        self.pending.len()
    }

    pub async fn commit(mut self) -> Result<Vec<Uuid>, HiringError> {
        let pending = std::mem::take(&mut self.pending);
        let mut keys = Vec::with_capacity(pending.len());
        for (key, email) in &pending {
            insert_email(&mut self.tx, *key, email).await?;
            keys.push(*key);
        }
        self.tx.commit().await?;
        if !keys.is_empty() {
            tracing::debug!(emails = keys.len(), "committed with outbox rows");
        }
        Ok(keys)
    }
}

async fn insert_email(
    conn: &mut PgConnection,
    key: Uuid,
    email: &NewEmail,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO emails (
            email_key, email_class, email_from, email_to, email_cc, email_bcc,
            email_subject, email_html_body, email_text_body, email_state
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(key)
    .bind(email.class.as_str())
    .bind(&email.from)
    .bind(&email.to)
    .bind(&email.cc)
    .bind(&email.bcc)
    .bind(&email.subject)
    .bind(&email.html_body)
    .bind(&email.text_body)
    .bind(EmailState::Pending.as_str())
    .execute(conn)
    .await?;
    Ok(())
}

/// A pending row locked by this dispatcher. Dropping it releases the row
/// unchanged.
pub struct Claim {
    tx: Transaction<'static, Postgres>,
    pub email: Email,
}

impl Claim {
    /// PENDING -> PROCESSED, then release the lock.
    pub async fn mark_processed(mut self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE emails
            SET email_state = 'PROCESSED',
                processed_at = now()
            WHERE email_key = $1
              AND email_state = 'PENDING'
            "#,
        )
        .bind(self.email.email_key)
        .execute(&mut *self.tx)
        .await?;
        self.tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OutboxStats {
    pub pending_transactional: i64,
    pub pending_onboarding: i64,
    pub processed_last_hour: i64,
    pub oldest_pending_age_secs: Option<i64>,
}

#[derive(Clone)]
pub struct OutboxRepo {
    pool: PgPool,
}

impl OutboxRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Pending rows of one class, oldest first, strictly after `after` in
    /// `(created_at, email_key)` order and not in `skip`. Takes no locks;
    /// see [`OutboxRepo::claim`].
    pub async fn fetch_pending(
        &self,
        class: EmailClass,
        after: Option<(DateTime<Utc>, Uuid)>,
        skip: &[Uuid],
        limit: i64,
    ) -> anyhow::Result<Vec<Email>> {
        let (after_ts, after_key) = after.unzip();
        let rows = sqlx::query_as::<_, Email>(
            r#"
            SELECT *
            FROM emails
            WHERE email_class = $1
              AND email_state = 'PENDING'
              AND ($2::timestamptz IS NULL OR (created_at, email_key) > ($2, $3))
              AND NOT (email_key = ANY($4))
            ORDER BY created_at ASC, email_key ASC
            LIMIT $5
            "#,
        )
        .bind(class.as_str())
        .bind(after_ts)
        .bind(after_key)
        .bind(skip)
        .bind(limit.clamp(1, 500))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Lock one pending row for delivery.
    ///
    /// `Ok(None)` if another dispatcher holds it or it is no longer pending.
    /// The lock lasts until the returned claim is completed or dropped.
    pub async fn claim(&self, email_key: Uuid) -> anyhow::Result<Option<Claim>> {
        let mut tx = self.pool.begin().await?;
        let email = sqlx::query_as::<_, Email>(
            r#"
            SELECT *
            FROM emails
            WHERE email_key = $1
              AND email_state = 'PENDING'
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(email_key)
        .fetch_optional(&mut *tx)
        .await?;

        Ok(email.map(|email| Claim { tx, email }))
    }

    pub async fn get(&self, email_key: Uuid) -> anyhow::Result<Option<Email>> {
        let row = sqlx::query_as::<_, Email>("SELECT * FROM emails WHERE email_key = $1")
            .bind(email_key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn stats(&self) -> anyhow::Result<OutboxStats> {
        let (pending_transactional, pending_onboarding, processed_last_hour, oldest_pending_age_secs) =
            sqlx::query_as::<_, (i64, i64, i64, Option<i64>)>(
                r#"
                SELECT
                    COUNT(*) FILTER (WHERE email_state = 'PENDING' AND email_class = 'TRANSACTIONAL'),
                    COUNT(*) FILTER (WHERE email_state = 'PENDING' AND email_class = 'ONBOARDING'),
                    COUNT(*) FILTER (WHERE email_state = 'PROCESSED'
                                       AND processed_at >= now() - interval '1 hour'),
                    EXTRACT(EPOCH FROM now() - MIN(created_at) FILTER (WHERE email_state = 'PENDING'))::bigint
                FROM emails
                "#,
            )
            .fetch_one(&self.pool)
            .await?;

        Ok(OutboxStats {
            pending_transactional,
            pending_onboarding,
            processed_last_hour,
            oldest_pending_age_secs,
        })
    }
}
