use sqlx::PgConnection;
use uuid::Uuid;

use crate::db::Store;
use crate::error::{Entity, HiringError};
use crate::hiring::guard::{Scope, Target, Transition};
use crate::hiring::model::{Candidacy, CandidacyComment, HubUserActor, OrgUserActor};
use crate::hiring::notices::Notices;
use crate::hiring::stakeholders;
use crate::hiring::states::{CandidacyState, InterviewState, LifecycleState};

pub(crate) enum Author {
    OrgUser(Uuid),
    HubUser(Uuid),
}

/// Append a comment to a candidacy the caller has already guarded.
pub(crate) async fn insert_comment(
    conn: &mut PgConnection,
    candidacy_id: Uuid,
    author: Author,
    text: &str,
) -> Result<Uuid, HiringError> {
    let (author_type, org_user_id, hub_user_id) = match author {
        Author::OrgUser(id) => ("ORG_USER", Some(id), None),
        Author::HubUser(id) => ("HUB_USER", None, Some(id)),
    };

    let id = sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO candidacy_comments (
            candidacy_id, employer_id, author_type, org_user_id, hub_user_id, comment_text
        )
        SELECT id, employer_id, $2, $3, $4, $5
        FROM candidacies
        WHERE id = $1
        RETURNING id
        "#,
    )
    .bind(candidacy_id)
    .bind(author_type)
    .bind(org_user_id)
    .bind(hub_user_id)
    .bind(text)
    .fetch_one(conn)
    .await?;

    Ok(id)
}

fn comment_text(text: &str) -> Result<&str, HiringError> {
    let t = text.trim();
    if t.is_empty() {
        return Err(HiringError::InvalidInput("comment is empty".into()));
    }
    if t.chars().count() > 2048 {
        return Err(HiringError::InvalidInput("comment is longer than 2048 characters".into()));
    }
    Ok(t)
}

#[derive(Clone)]
pub struct CandidaciesRepo {
    store: Store,
    notices: Notices,
}

impl CandidaciesRepo {
    pub fn new(store: Store, notices: Notices) -> Self {
        Self { store, notices }
    }

    /// INTERVIEWING -> OFFERED. Every interview still SCHEDULED under the
    /// candidacy is cancelled in the same transaction.
    pub async fn offer_to_candidate(
        &self,
        actor: &OrgUserActor,
        candidacy_id: Uuid,
        comment: Option<&str>,
    ) -> Result<(), HiringError> {
        let comment = comment.map(comment_text).transpose()?;

        self.store
            .bounded("offer_to_candidate", async {
                let mut uow = self.store.begin().await?;
                let target = Target::Candidacy {
                    id: candidacy_id,
                    scope: actor.scope(),
                };
                Transition::change(target, &[CandidacyState::Interviewing], CandidacyState::Offered)
                    .apply(uow.conn())
                    .await?;

                let cancelled = sqlx::query(
                    r#"
                    UPDATE interviews
                    SET interview_state = $2,
                        updated_at = now()
                    WHERE candidacy_id = $1
                      AND interview_state = $3
                    "#,
                )
                .bind(candidacy_id)
                .bind(InterviewState::Cancelled.as_str())
                .bind(InterviewState::Scheduled.as_str())
                .execute(uow.conn())
                .await?
                .rows_affected();

                if let Some(text) = comment {
                    insert_comment(uow.conn(), candidacy_id, Author::OrgUser(actor.id), text).await?;
                }

                let ctx = stakeholders::for_candidacy(uow.conn(), candidacy_id).await?;
                uow.notify(self.notices.offered(&ctx)?);
                uow.commit().await?;

                tracing::info!(%candidacy_id, cancelled_interviews = cancelled, "offer made");
                Ok(())
            })
            .await
    }

    /// Close an INTERVIEWING candidacy from the employer side.
    pub async fn mark_candidacy(
        &self,
        actor: &OrgUserActor,
        candidacy_id: Uuid,
        outcome: CandidacyState,
    ) -> Result<(), HiringError> {
        if !outcome.is_employer_closure() {
            return Err(HiringError::InvalidInput(format!(
                "{outcome} is not an employer outcome"
            )));
        }

        self.store
            .bounded("mark_candidacy", async {
                let mut uow = self.store.begin().await?;
                let target = Target::Candidacy {
                    id: candidacy_id,
                    scope: actor.scope(),
                };
                Transition::change(target, &[CandidacyState::Interviewing], outcome)
                    .apply(uow.conn())
                    .await?;

                let ctx = stakeholders::for_candidacy(uow.conn(), candidacy_id).await?;
                uow.notify(self.notices.candidacy_closed(&ctx, outcome)?);
                uow.commit().await?;

                tracing::info!(%candidacy_id, %outcome, "candidacy closed");
                Ok(())
            })
            .await
    }

    pub async fn accept_offer(&self, actor: &HubUserActor, candidacy_id: Uuid) -> Result<(), HiringError> {
        self.store
            .bounded("accept_offer", self.answer_offer(actor, candidacy_id, true))
            .await
    }

    pub async fn decline_offer(&self, actor: &HubUserActor, candidacy_id: Uuid) -> Result<(), HiringError> {
        self.store
            .bounded("decline_offer", self.answer_offer(actor, candidacy_id, false))
            .await
    }

    async fn answer_offer(
        &self,
        actor: &HubUserActor,
        candidacy_id: Uuid,
        accepted: bool,
    ) -> Result<(), HiringError> {
        let to = if accepted {
            CandidacyState::OfferAccepted
        } else {
            CandidacyState::OfferDeclined
        };

        let mut uow = self.store.begin().await?;
        let target = Target::Candidacy {
            id: candidacy_id,
            scope: actor.scope(),
        };
        Transition::change(target, &[CandidacyState::Offered], to)
            .apply(uow.conn())
            .await?;

        let ctx = stakeholders::for_candidacy(uow.conn(), candidacy_id).await?;
        uow.notify(self.notices.offer_answered(&ctx, accepted)?);
        uow.commit().await?;

        tracing::info!(%candidacy_id, %to, "offer answered");
        Ok(())
    }

    pub async fn add_employer_comment(
        &self,
        actor: &OrgUserActor,
        candidacy_id: Uuid,
        text: &str,
    ) -> Result<Uuid, HiringError> {
        let text = comment_text(text)?;
        self.store
            .bounded(
                "add_employer_comment",
                self.comment(actor.scope(), candidacy_id, Author::OrgUser(actor.id), text),
            )
            .await
    }

    pub async fn add_hub_comment(
        &self,
        actor: &HubUserActor,
        candidacy_id: Uuid,
        text: &str,
    ) -> Result<Uuid, HiringError> {
        let text = comment_text(text)?;
        self.store
            .bounded(
                "add_hub_comment",
                self.comment(actor.scope(), candidacy_id, Author::HubUser(actor.id), text),
            )
            .await
    }

    async fn comment(
        &self,
        scope: Scope,
        candidacy_id: Uuid,
        author: Author,
        text: &str,
    ) -> Result<Uuid, HiringError> {
        let mut uow = self.store.begin().await?;
        let target = Target::Candidacy {
            id: candidacy_id,
            scope,
        };
        Transition::require(target, &CandidacyState::COMMENTABLE)
            .apply(uow.conn())
            .await?;

        let id = insert_comment(uow.conn(), candidacy_id, author, text).await?;
        uow.commit().await?;
        Ok(id)
    }

    pub async fn get(&self, actor: &OrgUserActor, candidacy_id: Uuid) -> Result<Candidacy, HiringError> {
        sqlx::query_as::<_, Candidacy>("SELECT * FROM candidacies WHERE id = $1 AND employer_id = $2")
            .bind(candidacy_id)
            .bind(actor.employer_id)
            .fetch_optional(self.store.pool())
            .await?
            .ok_or(HiringError::NotFound(Entity::Candidacy))
    }

    pub async fn comments(
        &self,
        actor: &OrgUserActor,
        candidacy_id: Uuid,
    ) -> Result<Vec<CandidacyComment>, HiringError> {
        let rows = sqlx::query_as::<_, CandidacyComment>(
            r#"
            SELECT *
            FROM candidacy_comments
            WHERE candidacy_id = $1
              AND employer_id = $2
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(candidacy_id)
        .bind(actor.employer_id)
        .fetch_all(self.store.pool())
        .await?;
        Ok(rows)
    }
}
