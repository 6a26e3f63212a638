use uuid::Uuid;

use crate::db::Store;
use crate::error::{Entity, HiringError};
use crate::hiring::candidacies::{insert_comment, Author};
use crate::hiring::guard::{Target, Transition};
use crate::hiring::model::{Assessment, HubUserActor, Interview, Interviewer, NewInterview, OrgUserActor};
use crate::hiring::notices::Notices;
use crate::hiring::stakeholders::{self, resolve_org_users};
use crate::hiring::states::{
    ApplicationState, CandidacyState, InterviewState, LifecycleState, OpeningState, RsvpStatus,
};
use crate::outbox::UnitOfWork;

#[derive(Clone)]
pub struct InterviewsRepo {
    store: Store,
    notices: Notices,
}

impl InterviewsRepo {
    pub fn new(store: Store, notices: Notices) -> Self {
        Self { store, notices }
    }

    /// Schedule an interview on an INTERVIEWING candidacy.
    ///
    /// Locks, in order, the candidacy, its application (must be SHORTLISTED)
    /// and its opening (must be ACTIVE).
    pub async fn add_interview(
        &self,
        actor: &OrgUserActor,
        req: NewInterview,
    ) -> Result<Uuid, HiringError> {
        if req.end_time <= req.start_time {
            return Err(HiringError::InvalidInput("interview must end after it starts".into()));
        }
        let comment = match req.comment.as_deref().map(str::trim) {
            Some("") | None => None,
            Some(c) => Some(c.to_string()),
        };

        self.store
            .bounded("add_interview", async {
                let mut uow = self.store.begin().await?;

                let candidacy = Target::Candidacy {
                    id: req.candidacy_id,
                    scope: actor.scope(),
                };
                Transition::require(candidacy, &[CandidacyState::Interviewing])
                    .apply(uow.conn())
                    .await?;

                let (application_id, opening_id) = sqlx::query_as::<_, (Uuid, String)>(
                    "SELECT application_id, opening_id FROM candidacies WHERE id = $1",
                )
                .bind(req.candidacy_id)
                .fetch_one(uow.conn())
                .await?;

                let application = Target::Application {
                    id: application_id,
                    scope: actor.scope(),
                };
                Transition::require(application, &[ApplicationState::Shortlisted])
                    .apply(uow.conn())
                    .await?;

                let opening = Target::Opening {
                    employer_id: actor.employer_id,
                    id: &opening_id,
                };
                Transition::require(opening, &[OpeningState::Active])
                    .apply(uow.conn())
                    .await?;

                let interviewers =
                    resolve_org_users(uow.conn(), actor.employer_id, &req.interviewer_emails).await?;

                let interview_id = sqlx::query_scalar::<_, Uuid>(
                    r#"
                    INSERT INTO interviews (
                        candidacy_id, employer_id, interview_type, interview_state,
                        start_time, end_time, description, created_by
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                    RETURNING id
                    "#,
                )
                .bind(req.candidacy_id)
                .bind(actor.employer_id)
                .bind(req.interview_type.as_str())
                .bind(InterviewState::Scheduled.as_str())
                .bind(req.start_time)
                .bind(req.end_time)
                .bind(&req.description)
                .bind(actor.id)
                .fetch_one(uow.conn())
                .await?;

                if !interviewers.is_empty() {
                    let ids: Vec<Uuid> = interviewers.iter().map(|u| u.id).collect();
                    sqlx::query(
                        r#"
                        INSERT INTO interview_interviewers (interview_id, interviewer_id, employer_id)
                        SELECT $1, i, $3
                        FROM unnest($2::uuid[]) AS i
                        "#,
                    )
                    .bind(interview_id)
                    .bind(&ids)
                    .bind(actor.employer_id)
                    .execute(uow.conn())
                    .await?;
                }

                if let Some(text) = &comment {
                    insert_comment(uow.conn(), req.candidacy_id, Author::OrgUser(actor.id), text).await?;
                }

                let ctx = stakeholders::for_candidacy(uow.conn(), req.candidacy_id).await?;
                uow.notify(self.notices.interview_scheduled_for_candidate(
                    &ctx,
                    req.start_time,
                    req.end_time,
                )?);
                if !interviewers.is_empty() {
                    let to = interviewers.iter().map(|u| u.email.clone()).collect();
                    uow.notify(self.notices.interview_scheduled_for_interviewers(
                        &ctx,
                        to,
                        req.start_time,
                        req.end_time,
                    )?);
                }
                uow.commit().await?;

                tracing::info!(
                    candidacy_id = %req.candidacy_id,
                    %interview_id,
                    interviewers = interviewers.len(),
                    "interview scheduled"
                );
                Ok(interview_id)
            })
            .await
    }

    pub async fn add_interviewer(
        &self,
        actor: &OrgUserActor,
        interview_id: Uuid,
        email: &str,
    ) -> Result<(), HiringError> {
        self.store
            .bounded("add_interviewer", async {
                let mut uow = self.store.begin().await?;
                self.require_scheduled(&mut uow, actor, interview_id).await?;

                let user = resolve_org_users(uow.conn(), actor.employer_id, &[email.to_string()])
                    .await?
                    .into_iter()
                    .next()
                    .ok_or_else(|| HiringError::InvalidInput("interviewer email is required".into()))?;

                let inserted = sqlx::query(
                    r#"
                    INSERT INTO interview_interviewers (interview_id, interviewer_id, employer_id)
                    VALUES ($1, $2, $3)
                    ON CONFLICT DO NOTHING
                    "#,
                )
                .bind(interview_id)
                .bind(user.id)
                .bind(actor.employer_id)
                .execute(uow.conn())
                .await?
                .rows_affected();

                if inserted == 0 {
                    return Err(HiringError::InvalidInput(format!(
                        "{} is already an interviewer",
                        user.email
                    )));
                }

                let candidacy_id = candidacy_of(&mut uow, interview_id).await?;
                insert_comment(
                    uow.conn(),
                    candidacy_id,
                    Author::OrgUser(actor.id),
                    &format!("Added {} as an interviewer", user.name),
                )
                .await?;
                let ctx = stakeholders::for_candidacy(uow.conn(), candidacy_id).await?;
                uow.notify(self.notices.interviewer_added(&ctx, &user.email)?);
                uow.commit().await?;

                tracing::info!(%interview_id, interviewer = %user.email, "interviewer added");
                Ok(())
            })
            .await
    }

    pub async fn remove_interviewer(
        &self,
        actor: &OrgUserActor,
        interview_id: Uuid,
        email: &str,
    ) -> Result<(), HiringError> {
        self.store
            .bounded("remove_interviewer", async {
                let mut uow = self.store.begin().await?;
                self.require_scheduled(&mut uow, actor, interview_id).await?;

                let user = resolve_org_users(uow.conn(), actor.employer_id, &[email.to_string()])
                    .await?
                    .into_iter()
                    .next()
                    .ok_or_else(|| HiringError::InvalidInput("interviewer email is required".into()))?;

                let removed = sqlx::query(
                    "DELETE FROM interview_interviewers WHERE interview_id = $1 AND interviewer_id = $2",
                )
                .bind(interview_id)
                .bind(user.id)
                .execute(uow.conn())
                .await?
                .rows_affected();
                if removed == 0 {
                    return Err(HiringError::NotFound(Entity::Interviewer));
                }

                let candidacy_id = candidacy_of(&mut uow, interview_id).await?;
                insert_comment(
                    uow.conn(),
                    candidacy_id,
                    Author::OrgUser(actor.id),
                    &format!("Removed {} as an interviewer", user.name),
                )
                .await?;
                let ctx = stakeholders::for_candidacy(uow.conn(), candidacy_id).await?;
                uow.notify(self.notices.interviewer_removed(&ctx, &user.email)?);
                uow.commit().await?;

                tracing::info!(%interview_id, interviewer = %user.email, "interviewer removed");
                Ok(())
            })
            .await
    }

    pub async fn rsvp_as_candidate(
        &self,
        actor: &HubUserActor,
        interview_id: Uuid,
        rsvp: RsvpStatus,
    ) -> Result<(), HiringError> {
        if rsvp == RsvpStatus::NotSet {
            return Err(HiringError::InvalidInput("rsvp must be YES or NO".into()));
        }

        self.store
            .bounded("rsvp_as_candidate", async {
                let mut uow = self.store.begin().await?;
                let target = Target::Interview {
                    id: interview_id,
                    scope: actor.scope(),
                };
                Transition::require(target, &[InterviewState::Scheduled])
                    .apply(uow.conn())
                    .await?;

                sqlx::query(
                    r#"
                    UPDATE interviews
                    SET candidate_rsvp = $2,
                        updated_at = now()
                    WHERE id = $1
                    "#,
                )
                .bind(interview_id)
                .bind(rsvp.as_str())
                .execute(uow.conn())
                .await?;

                uow.commit().await?;
                tracing::info!(%interview_id, %rsvp, "candidate rsvp");
                Ok(())
            })
            .await
    }

    pub async fn rsvp_as_interviewer(
        &self,
        actor: &OrgUserActor,
        interview_id: Uuid,
        rsvp: RsvpStatus,
    ) -> Result<(), HiringError> {
        if rsvp == RsvpStatus::NotSet {
            return Err(HiringError::InvalidInput("rsvp must be YES or NO".into()));
        }

        self.store
            .bounded("rsvp_as_interviewer", async {
                let mut uow = self.store.begin().await?;
                self.require_scheduled(&mut uow, actor, interview_id).await?;

                let updated = sqlx::query(
                    r#"
                    UPDATE interview_interviewers
                    SET rsvp_status = $3
                    WHERE interview_id = $1
                      AND interviewer_id = $2
                    "#,
                )
                .bind(interview_id)
                .bind(actor.id)
                .bind(rsvp.as_str())
                .execute(uow.conn())
                .await?
                .rows_affected();
                if updated == 0 {
                    return Err(HiringError::NotFound(Entity::Interviewer));
                }

                uow.commit().await?;
                tracing::info!(%interview_id, interviewer_id = %actor.id, %rsvp, "interviewer rsvp");
                Ok(())
            })
            .await
    }

    /// Record the panel's assessment. Only an interviewer on the interview may
    /// submit, and only while it is SCHEDULED. A later submission replaces an
    /// earlier one.
    pub async fn put_assessment(
        &self,
        actor: &OrgUserActor,
        interview_id: Uuid,
        assessment: Assessment,
    ) -> Result<(), HiringError> {
        self.store
            .bounded("put_assessment", async {
                let mut uow = self.store.begin().await?;
                self.require_scheduled(&mut uow, actor, interview_id).await?;

                let is_interviewer = sqlx::query_scalar::<_, bool>(
                    r#"
                    SELECT EXISTS (
                        SELECT 1
                        FROM interview_interviewers
                        WHERE interview_id = $1
                          AND interviewer_id = $2
                    )
                    "#,
                )
                .bind(interview_id)
                .bind(actor.id)
                .fetch_one(uow.conn())
                .await?;
                if !is_interviewer {
                    return Err(HiringError::NotFound(Entity::Interviewer));
                }

                sqlx::query(
                    r#"
                    UPDATE interviews
                    SET interviewers_decision = $2,
                        positives = $3,
                        negatives = $4,
                        overall_assessment = $5,
                        feedback_to_candidate = $6,
                        feedback_submitted_by = $7,
                        feedback_submitted_at = now(),
                        updated_at = now()
                    WHERE id = $1
                    "#,
                )
                .bind(interview_id)
                .bind(assessment.decision.map(|d| d.as_str()))
                .bind(&assessment.positives)
                .bind(&assessment.negatives)
                .bind(&assessment.overall_assessment)
                .bind(&assessment.feedback_to_candidate)
                .bind(actor.id)
                .execute(uow.conn())
                .await?;

                uow.commit().await?;
                tracing::info!(%interview_id, submitted_by = %actor.id, "assessment recorded");
                Ok(())
            })
            .await
    }

    pub async fn complete_interview(&self, actor: &OrgUserActor, interview_id: Uuid) -> Result<(), HiringError> {
        self.store
            .bounded("complete_interview", async {
                let mut uow = self.store.begin().await?;
                let target = Target::Interview {
                    id: interview_id,
                    scope: actor.scope(),
                };
                Transition::change(target, &[InterviewState::Scheduled], InterviewState::Completed)
                    .apply(uow.conn())
                    .await?;
                uow.commit().await?;
                tracing::info!(%interview_id, "interview completed");
                Ok(())
            })
            .await
    }

    pub async fn cancel_interview(&self, actor: &OrgUserActor, interview_id: Uuid) -> Result<(), HiringError> {
        self.store
            .bounded("cancel_interview", async {
                let mut uow = self.store.begin().await?;
                let target = Target::Interview {
                    id: interview_id,
                    scope: actor.scope(),
                };
                Transition::change(target, &[InterviewState::Scheduled], InterviewState::Cancelled)
                    .apply(uow.conn())
                    .await?;

                let candidacy_id = candidacy_of(&mut uow, interview_id).await?;
                let panel = sqlx::query_scalar::<_, String>(
                    r#"
                    SELECT u.email
                    FROM interview_interviewers ii
                    JOIN org_users u ON u.id = ii.interviewer_id
                    WHERE ii.interview_id = $1
                    ORDER BY u.email
                    "#,
                )
                .bind(interview_id)
                .fetch_all(uow.conn())
                .await?;

                let ctx = stakeholders::for_candidacy(uow.conn(), candidacy_id).await?;
                uow.notify(self.notices.interview_cancelled(&ctx, panel)?);
                uow.commit().await?;

                tracing::info!(%interview_id, "interview cancelled");
                Ok(())
            })
            .await
    }

    pub async fn get(&self, actor: &OrgUserActor, interview_id: Uuid) -> Result<Interview, HiringError> {
        sqlx::query_as::<_, Interview>("SELECT * FROM interviews WHERE id = $1 AND employer_id = $2")
            .bind(interview_id)
            .bind(actor.employer_id)
            .fetch_optional(self.store.pool())
            .await?
            .ok_or(HiringError::NotFound(Entity::Interview))
    }

    pub async fn interviewers(
        &self,
        actor: &OrgUserActor,
        interview_id: Uuid,
    ) -> Result<Vec<Interviewer>, HiringError> {
        let rows = sqlx::query_as::<_, Interviewer>(
            r#"
            SELECT ii.interviewer_id, u.email, u.name, ii.rsvp_status
            FROM interview_interviewers ii
            JOIN org_users u ON u.id = ii.interviewer_id
            WHERE ii.interview_id = $1
              AND ii.employer_id = $2
            ORDER BY u.email
            "#,
        )
        .bind(interview_id)
        .bind(actor.employer_id)
        .fetch_all(self.store.pool())
        .await?;
        Ok(rows)
    }

    async fn require_scheduled(
        &self,
        uow: &mut UnitOfWork,
        actor: &OrgUserActor,
        interview_id: Uuid,
    ) -> Result<(), HiringError> {
        let target = Target::Interview {
            id: interview_id,
            scope: actor.scope(),
        };
        Transition::require(target, &[InterviewState::Scheduled])
            .apply(uow.conn())
            .await
    }
}

async fn candidacy_of(
    uow: &mut UnitOfWork,
    interview_id: Uuid,
) -> Result<Uuid, HiringError> {
    let id = sqlx::query_scalar::<_, Uuid>("SELECT candidacy_id FROM interviews WHERE id = $1")
        .bind(interview_id)
        .fetch_one(uow.conn())
        .await?;
    Ok(id)
}
