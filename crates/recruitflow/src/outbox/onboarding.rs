//! Turns pending employers into onboarding invites.
//!
//! Each pass claims one `ONBOARD_PENDING` employer that has no token yet,
//! mints a token, queues the invite email and records the token on the
//! employer, all in one transaction.

use std::time::Duration;

use chrono::{DateTime, Utc};
use minijinja::context;
use rand::RngCore;
use sqlx::PgPool;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::HiringError;
use crate::outbox::templates::Templates;
use crate::outbox::{EmailClass, NewEmail, UnitOfWork};

#[derive(Debug, Clone)]
pub struct OnboardingConfig {
    pub interval: Duration,
    pub token_valid_mins: i64,
    pub base_url: String,
    pub email_from: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invite {
    pub employer_id: Uuid,
    pub email_key: Uuid,
    pub token_valid_till: DateTime<Utc>,
}

#[derive(Clone)]
pub struct OnboardingInviter {
    pool: PgPool,
    cfg: OnboardingConfig,
    templates: Templates,
}

impl OnboardingInviter {
    pub fn new(pool: PgPool, cfg: OnboardingConfig) -> Result<Self, HiringError> {
        Ok(Self {
            pool,
            cfg,
            templates: Templates::load()?,
        })
    }

    /// Invite at most one employer. `Ok(None)` when nobody is waiting.
    pub async fn invite_next(&self) -> Result<Option<Invite>, HiringError> {
        let mut uow = UnitOfWork::begin(&self.pool).await?;

        let pending = sqlx::query_as::<_, (Uuid, String, String)>(
            r#"
            SELECT id, company_name, onboard_admin_email
            FROM employers
            WHERE employer_state = 'ONBOARD_PENDING'
              AND onboard_secret_token IS NULL
            ORDER BY created_at ASC, id ASC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .fetch_optional(uow.conn())
        .await?;

        let Some((employer_id, company_name, admin_email)) = pending else {
            return Ok(None);
        };

        let token = new_token();
        let invite = invite_email(&self.templates, &self.cfg, &company_name, &admin_email, &token)?;
        let email_key = uow.notify(invite);

        // onboard_email_id is checked at commit, after the email row is flushed
        let token_valid_till = sqlx::query_scalar::<_, DateTime<Utc>>(
            r#"
            UPDATE employers
            SET onboard_secret_token = $2,
                token_valid_till = now() + make_interval(mins => $3),
                onboard_email_id = $4
            WHERE id = $1
            RETURNING token_valid_till
            "#,
        )
        .bind(employer_id)
        .bind(&token)
        .bind(self.cfg.token_valid_mins as i32)
        .bind(email_key)
        .fetch_one(uow.conn())
        .await?;

        uow.commit().await?;

        tracing::info!(%employer_id, %email_key, "onboarding invite queued");
        Ok(Some(Invite {
            employer_id,
            email_key,
            token_valid_till,
        }))
    }

    pub async fn run(self, cancel: CancellationToken) -> anyhow::Result<()> {
        tracing::info!(
            interval_ms = self.cfg.interval.as_millis() as u64,
            "onboarding inviter starting"
        );

        let mut ticker = tokio::time::interval(self.cfg.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("onboarding inviter stopping");
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }

            if let Err(e) = self.invite_next().await {
                tracing::error!(error = %e, "onboarding invite failed");
            }
        }
    }
}

fn new_token() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn invite_email(
    templates: &Templates,
    cfg: &OnboardingConfig,
    company: &str,
    admin_email: &str,
    token: &str,
) -> Result<NewEmail, HiringError> {
    let link = format!("{}/onboard/{}", cfg.base_url.trim_end_matches('/'), token);
    let rendered = templates.render(
        "onboarding_invite",
        context! { company => company, link => link, hours => cfg.token_valid_mins / 60 },
    )?;

    Ok(NewEmail {
        class: EmailClass::Onboarding,
        from: cfg.email_from.clone(),
        to: vec![admin_email.to_string()],
        cc: vec![],
        bcc: vec![],
        subject: rendered.subject,
        html_body: rendered.html_body,
        text_body: rendered.text_body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> OnboardingConfig {
        OnboardingConfig {
            interval: Duration::from_secs(180),
            token_valid_mins: 1440,
            base_url: "https://employer.example.com/".into(),
            email_from: "no-reply@recruitflow.local".into(),
        }
    }

    #[test]
    fn tokens_are_32_hex_chars_and_differ() {
        let a = new_token();
        let b = new_token();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn invite_links_to_token_without_double_slash() {
        let templates = Templates::load().unwrap();
        let email =
            invite_email(&templates, &cfg(), "Acme & Sons", "admin@acme.test", "abc123").unwrap();
        assert_eq!(email.class, EmailClass::Onboarding);
        assert_eq!(email.to, vec!["admin@acme.test".to_string()]);
        assert!(email
            .text_body
            .contains("https://employer.example.com/onboard/abc123"));
        assert!(email.html_body.contains("Acme &amp; Sons"));
        assert!(email.text_body.contains("24 hours"));
        assert_eq!(email.subject, "Welcome to RecruitFlow, Acme & Sons");
    }
}
