use uuid::Uuid;

use crate::db::Store;
use crate::error::{Entity, HiringError};
use crate::hiring::guard::{Scope, Target, Transition};
use crate::hiring::model::{Application, CandidacyId, HubUserActor, NewApplication, OrgUserActor};
use crate::hiring::notices::Notices;
use crate::hiring::stakeholders;
use crate::hiring::states::{ApplicationState, CandidacyState, ColorTag, LifecycleState, OpeningState};

#[derive(Clone)]
pub struct ApplicationsRepo {
    store: Store,
    notices: Notices,
}

impl ApplicationsRepo {
    pub fn new(store: Store, notices: Notices) -> Self {
        Self { store, notices }
    }

    /// A hub-user applies for an ACTIVE opening.
    pub async fn apply_for_opening(
        &self,
        actor: &HubUserActor,
        req: NewApplication,
    ) -> Result<Uuid, HiringError> {
        if req.resume_sha.trim().is_empty() {
            return Err(HiringError::InvalidInput("resume is required".into()));
        }

        self.store
            .bounded("apply_for_opening", async {
                let mut uow = self.store.begin().await?;

                // the opening lock also serializes duplicate applies by one user
                let opening = Target::Opening {
                    employer_id: req.employer_id,
                    id: &req.opening_id,
                };
                Transition::require(opening, &[OpeningState::Active])
                    .apply(uow.conn())
                    .await?;

                let already = sqlx::query_scalar::<_, bool>(
                    r#"
                    SELECT EXISTS (
                        SELECT 1
                        FROM applications
                        WHERE employer_id = $1
                          AND opening_id = $2
                          AND hub_user_id = $3
                          AND application_state = $4
                    )
                    "#,
                )
                .bind(req.employer_id)
                .bind(&req.opening_id)
                .bind(actor.id)
                .bind(ApplicationState::Applied.as_str())
                .fetch_one(uow.conn())
                .await?;
                if already {
                    return Err(HiringError::InvalidInput(
                        "an application for this opening is already pending".into(),
                    ));
                }

                let id = sqlx::query_scalar::<_, Uuid>(
                    r#"
                    INSERT INTO applications (
                        employer_id, opening_id, hub_user_id, cover_letter, resume_sha, application_state
                    )
                    VALUES ($1, $2, $3, $4, $5, $6)
                    RETURNING id
                    "#,
                )
                .bind(req.employer_id)
                .bind(&req.opening_id)
                .bind(actor.id)
                .bind(&req.cover_letter)
                .bind(req.resume_sha.trim())
                .bind(ApplicationState::Applied.as_str())
                .fetch_one(uow.conn())
                .await?;

                uow.commit().await?;
                tracing::info!(application_id = %id, opening_id = %req.opening_id, "application received");
                Ok(id)
            })
            .await
    }

    /// APPLIED -> SHORTLISTED, opening a candidacy in INTERVIEWING.
    pub async fn shortlist_application(
        &self,
        actor: &OrgUserActor,
        application_id: Uuid,
    ) -> Result<CandidacyId, HiringError> {
        self.store
            .bounded("shortlist_application", async {
                let mut uow = self.store.begin().await?;
                let target = Target::Application {
                    id: application_id,
                    scope: actor.scope(),
                };
                Transition::change(target, &[ApplicationState::Applied], ApplicationState::Shortlisted)
                    .apply(uow.conn())
                    .await?;

                let candidacy_id = sqlx::query_scalar::<_, Uuid>(
                    r#"
                    INSERT INTO candidacies (application_id, employer_id, opening_id, candidacy_state, created_by)
                    SELECT id, employer_id, opening_id, $2, $3
                    FROM applications
                    WHERE id = $1
                    RETURNING id
                    "#,
                )
                .bind(application_id)
                .bind(CandidacyState::Interviewing.as_str())
                .bind(actor.id)
                .fetch_one(uow.conn())
                .await?;

                sqlx::query("UPDATE applications SET candidacy_id = $2 WHERE id = $1")
                    .bind(application_id)
                    .bind(candidacy_id)
                    .execute(uow.conn())
                    .await?;

                let ctx = stakeholders::for_application(uow.conn(), application_id).await?;
                uow.notify(self.notices.shortlisted(&ctx)?);
                uow.commit().await?;

                tracing::info!(%application_id, %candidacy_id, "application shortlisted");
                Ok(candidacy_id)
            })
            .await
    }

    pub async fn reject_application(
        &self,
        actor: &OrgUserActor,
        application_id: Uuid,
    ) -> Result<(), HiringError> {
        self.store
            .bounded("reject_application", async {
                let mut uow = self.store.begin().await?;
                let target = Target::Application {
                    id: application_id,
                    scope: actor.scope(),
                };
                Transition::change(target, &[ApplicationState::Applied], ApplicationState::Rejected)
                    .apply(uow.conn())
                    .await?;

                let ctx = stakeholders::for_application(uow.conn(), application_id).await?;
                uow.notify(self.notices.rejected(&ctx)?);
                uow.commit().await?;

                tracing::info!(%application_id, "application rejected");
                Ok(())
            })
            .await
    }

    /// The candidate takes back an application that nobody has acted on yet.
    pub async fn withdraw_application(
        &self,
        actor: &HubUserActor,
        application_id: Uuid,
    ) -> Result<(), HiringError> {
        self.store
            .bounded("withdraw_application", async {
                let mut uow = self.store.begin().await?;
                let target = Target::Application {
                    id: application_id,
                    scope: actor.scope(),
                };
                Transition::change(target, &[ApplicationState::Applied], ApplicationState::Withdrawn)
                    .apply(uow.conn())
                    .await?;
                uow.commit().await?;

                tracing::info!(%application_id, "application withdrawn");
                Ok(())
            })
            .await
    }

    pub async fn set_color_tag(
        &self,
        actor: &OrgUserActor,
        application_id: Uuid,
        tag: ColorTag,
    ) -> Result<(), HiringError> {
        self.store
            .bounded("set_color_tag", self.write_color_tag(actor, application_id, Some(tag)))
            .await
    }

    pub async fn remove_color_tag(
        &self,
        actor: &OrgUserActor,
        application_id: Uuid,
    ) -> Result<(), HiringError> {
        self.store
            .bounded("remove_color_tag", self.write_color_tag(actor, application_id, None))
            .await
    }

    async fn write_color_tag(
        &self,
        actor: &OrgUserActor,
        application_id: Uuid,
        tag: Option<ColorTag>,
    ) -> Result<(), HiringError> {
        let mut uow = self.store.begin().await?;
        let target = Target::Application {
            id: application_id,
            scope: actor.scope(),
        };
        Transition::require(target, &[ApplicationState::Applied])
            .apply(uow.conn())
            .await?;

        sqlx::query(
            r#"
            UPDATE applications
            SET color_tag = $2,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(application_id)
        .bind(tag.map(|t| t.as_str()))
        .execute(uow.conn())
        .await?;

        uow.commit().await?;
        Ok(())
    }

    pub async fn get(&self, scope: Scope, application_id: Uuid) -> Result<Application, HiringError> {
        let sql = match scope {
            Scope::Employer(_) => "SELECT * FROM applications WHERE id = $1 AND employer_id = $2",
            Scope::HubUser(_) => "SELECT * FROM applications WHERE id = $1 AND hub_user_id = $2",
        };
        let scope_id = match scope {
            Scope::Employer(id) | Scope::HubUser(id) => id,
        };
        sqlx::query_as::<_, Application>(sql)
            .bind(application_id)
            .bind(scope_id)
            .fetch_optional(self.store.pool())
            .await?
            .ok_or(HiringError::NotFound(Entity::Application))
    }
}
