use chrono::{Datelike, NaiveDate};
use uuid::Uuid;

use crate::db::Store;
use crate::error::{Entity, HiringError};
use crate::hiring::guard::{Target, Transition};
use crate::hiring::model::{NewOpening, Opening, OrgUserActor};
use crate::hiring::states::{state_names, LifecycleState, OpeningState, OrgUserState};

#[derive(Clone)]
pub struct OpeningsRepo {
    store: Store,
}

/// `2026-Oct-7-3`: the third opening an employer created on that UTC day.
pub fn opening_id(day: NaiveDate, seq: i64) -> String {
    format!("{}-{}-{}-{}", day.year(), day.format("%b"), day.day(), seq)
}

impl OpeningsRepo {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Create an opening in DRAFT and return its id.
    pub async fn create_opening(
        &self,
        actor: &OrgUserActor,
        req: NewOpening,
    ) -> Result<String, HiringError> {
        let title = req.title.trim().to_string();
        if title.is_empty() {
            return Err(HiringError::InvalidInput("title is required".into()));
        }
        if req.positions < 1 {
            return Err(HiringError::InvalidInput("positions must be > 0".into()));
        }

        self.store
            .bounded("create_opening", async {
                let mut uow = self.store.begin().await?;

                // serializes id allocation per employer
                let employer = sqlx::query_scalar::<_, Uuid>(
                    "SELECT id FROM employers WHERE id = $1 FOR NO KEY UPDATE",
                )
                .bind(actor.employer_id)
                .fetch_optional(uow.conn())
                .await?;
                if employer.is_none() {
                    return Err(HiringError::InvalidInput("unknown employer".into()));
                }

                let staff = sqlx::query_scalar::<_, i64>(
                    r#"
                    SELECT COUNT(DISTINCT id)
                    FROM org_users
                    WHERE employer_id = $1
                      AND id = ANY($2)
                      AND org_user_state = ANY($3)
                    "#,
                )
                .bind(actor.employer_id)
                .bind(vec![req.recruiter, req.hiring_manager])
                .bind(state_names(&OrgUserState::ASSIGNABLE))
                .fetch_one(uow.conn())
                .await?;
                let expected = if req.recruiter == req.hiring_manager { 1 } else { 2 };
                if staff != expected {
                    return Err(HiringError::InvalidInput(
                        "recruiter and hiring manager must be active org users".into(),
                    ));
                }

                let (today, created_today) = sqlx::query_as::<_, (NaiveDate, i64)>(
                    r#"
                    SELECT (now() AT TIME ZONE 'UTC')::date, COUNT(*)
                    FROM openings
                    WHERE employer_id = $1
                      AND (created_at AT TIME ZONE 'UTC')::date = (now() AT TIME ZONE 'UTC')::date
                    "#,
                )
                .bind(actor.employer_id)
                .fetch_one(uow.conn())
                .await?;

                let id = opening_id(today, created_today + 1);

                sqlx::query(
                    r#"
                    INSERT INTO openings (
                        id, employer_id, title, positions, recruiter, hiring_manager, state, created_by
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                    "#,
                )
                .bind(&id)
                .bind(actor.employer_id)
                .bind(&title)
                .bind(req.positions)
                .bind(req.recruiter)
                .bind(req.hiring_manager)
                .bind(OpeningState::Draft.as_str())
                .bind(actor.id)
                .execute(uow.conn())
                .await?;

                uow.commit().await?;
                tracing::info!(employer_id = %actor.employer_id, opening_id = %id, "opening created");
                Ok(id)
            })
            .await
    }

    /// Move an opening along its lifecycle.
    ///
    /// `(from, to)` must be an edge of the opening lifecycle; anything else is
    /// rejected before the store is touched. The row must currently be `from`.
    pub async fn change_opening_state(
        &self,
        actor: &OrgUserActor,
        opening_id: &str,
        from: OpeningState,
        to: OpeningState,
    ) -> Result<(), HiringError> {
        if !OpeningState::can_transition(from, to) {
            return Err(HiringError::InvalidInput(format!(
                "opening cannot move from {from} to {to}"
            )));
        }

        self.store
            .bounded("change_opening_state", async {
                let mut uow = self.store.begin().await?;
                let target = Target::Opening {
                    employer_id: actor.employer_id,
                    id: opening_id,
                };
                Transition::change(target, &[from], to)
                    .apply(uow.conn())
                    .await?;
                uow.commit().await?;
                tracing::info!(opening_id, %from, %to, "opening state changed");
                Ok(())
            })
            .await
    }

    pub async fn get(&self, actor: &OrgUserActor, opening_id: &str) -> Result<Opening, HiringError> {
        sqlx::query_as::<_, Opening>("SELECT * FROM openings WHERE employer_id = $1 AND id = $2")
            .bind(actor.employer_id)
            .bind(opening_id)
            .fetch_optional(self.store.pool())
            .await?
            .ok_or(HiringError::NotFound(Entity::Opening))
    }
}
