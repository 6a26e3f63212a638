//! Who hears about a transition, resolved inside the transition's own
//! transaction so the addresses match the rows being changed.

use serde::Serialize;
use sqlx::{FromRow, PgConnection};
use uuid::Uuid;

use crate::error::{Entity, HiringError};
use crate::hiring::states::{state_names, OrgUserState};

/// Everyone and everything an email about one application needs.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CandidacyContext {
    pub application_id: Uuid,
    pub candidacy_id: Option<Uuid>,
    pub employer_id: Uuid,
    pub opening_id: String,
    pub opening_title: String,
    pub company_name: String,
    pub candidate_name: String,
    pub candidate_email: String,
    pub recruiter_email: String,
    pub hiring_manager_email: String,
    pub watcher_emails: Vec<String>,
}

impl CandidacyContext {
    /// Recruiter, hiring manager and watchers, without duplicates.
    pub fn employer_side(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(2 + self.watcher_emails.len());
        for e in [&self.recruiter_email, &self.hiring_manager_email]
            .into_iter()
            .chain(self.watcher_emails.iter())
        {
            if !out.contains(e) {
                out.push(e.clone());
            }
        }
        out
    }
}

const CONTEXT_SELECT: &str = r#"
    SELECT
        a.id AS application_id,
        a.candidacy_id,
        a.employer_id,
        a.opening_id,
        o.title AS opening_title,
        e.company_name,
        h.full_name AS candidate_name,
        h.email AS candidate_email,
        r.email AS recruiter_email,
        m.email AS hiring_manager_email,
        ARRAY(
            SELECT u.email
            FROM opening_watchers w
            JOIN org_users u ON u.id = w.watcher_id
            WHERE w.employer_id = a.employer_id
              AND w.opening_id = a.opening_id
            ORDER BY u.email
        ) AS watcher_emails
    FROM applications a
    JOIN openings o ON o.employer_id = a.employer_id AND o.id = a.opening_id
    JOIN employers e ON e.id = a.employer_id
    JOIN hub_users h ON h.id = a.hub_user_id
    JOIN org_users r ON r.id = o.recruiter
    JOIN org_users m ON m.id = o.hiring_manager
"#;

pub async fn for_application(
    conn: &mut PgConnection,
    application_id: Uuid,
) -> Result<CandidacyContext, HiringError> {
    let sql = format!("{CONTEXT_SELECT} WHERE a.id = $1");
    sqlx::query_as::<_, CandidacyContext>(&sql)
        .bind(application_id)
        .fetch_optional(conn)
        .await?
        .ok_or(HiringError::NotFound(Entity::Application))
}

pub async fn for_candidacy(
    conn: &mut PgConnection,
    candidacy_id: Uuid,
) -> Result<CandidacyContext, HiringError> {
    let sql = format!("{CONTEXT_SELECT} WHERE a.candidacy_id = $1");
    sqlx::query_as::<_, CandidacyContext>(&sql)
        .bind(candidacy_id)
        .fetch_optional(conn)
        .await?
        .ok_or(HiringError::NotFound(Entity::Candidacy))
}

#[derive(Debug, Clone, FromRow)]
pub struct OrgUserRef {
    pub id: Uuid,
    pub email: String,
    pub name: String,
}

/// Resolve emails to assignable org-users of one employer.
///
/// All or nothing: any address that is unknown, belongs to another employer
/// or to a disabled user fails the whole call with `InvalidInput`.
pub async fn resolve_org_users(
    conn: &mut PgConnection,
    employer_id: Uuid,
    emails: &[String],
) -> Result<Vec<OrgUserRef>, HiringError> {
    let mut wanted: Vec<String> = emails.iter().map(|e| e.trim().to_string()).collect();
    wanted.sort();
    wanted.dedup();
    if wanted.iter().any(|e| e.is_empty()) {
        return Err(HiringError::InvalidInput("empty email address".into()));
    }
    if wanted.is_empty() {
        return Ok(Vec::new());
    }

    let found = sqlx::query_as::<_, OrgUserRef>(
        r#"
        SELECT id, email, name
        FROM org_users
        WHERE employer_id = $1
          AND email = ANY($2)
          AND org_user_state = ANY($3)
        ORDER BY email
        "#,
    )
    .bind(employer_id)
    .bind(&wanted)
    .bind(state_names(&OrgUserState::ASSIGNABLE))
    .fetch_all(conn)
    .await?;

    if found.len() != wanted.len() {
        let missing: Vec<&str> = wanted
            .iter()
            .filter(|w| !found.iter().any(|f| &f.email == *w))
            .map(String::as_str)
            .collect();
        return Err(HiringError::InvalidInput(format!(
            "not active org users of this employer: {}",
            missing.join(", ")
        )));
    }

    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn employer_side_deduplicates_overlapping_roles() {
        let ctx = CandidacyContext {
            application_id: Uuid::new_v4(),
            candidacy_id: None,
            employer_id: Uuid::new_v4(),
            opening_id: "2026-Oct-17-1".into(),
            opening_title: "Backend Engineer".into(),
            company_name: "Acme".into(),
            candidate_name: "Sam".into(),
            candidate_email: "sam@example.com".into(),
            recruiter_email: "rita@acme.test".into(),
            hiring_manager_email: "rita@acme.test".into(),
            watcher_emails: vec!["hank@acme.test".into(), "rita@acme.test".into()],
        };
        assert_eq!(
            ctx.employer_side(),
            vec!["rita@acme.test".to_string(), "hank@acme.test".to_string()]
        );
    }
}
