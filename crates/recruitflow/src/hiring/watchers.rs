use uuid::Uuid;

use crate::db::Store;
use crate::error::{Entity, HiringError};
use crate::hiring::guard::{Target, Transition};
use crate::hiring::model::{OrgUserActor, Watcher};
use crate::hiring::stakeholders::resolve_org_users;
use crate::hiring::states::OpeningState;

pub const MAX_WATCHERS_PER_OPENING: i64 = 25;

const ANY_OPENING_STATE: [OpeningState; 4] = [
    OpeningState::Draft,
    OpeningState::Active,
    OpeningState::Suspended,
    OpeningState::Closed,
];

#[derive(Clone)]
pub struct WatchersRepo {
    store: Store,
}

impl WatchersRepo {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Add org-users (by email) as watchers. Returns how many were newly added.
    ///
    /// The opening row is locked before counting, so concurrent adds on one
    /// opening run one after another and the cap holds across them.
    pub async fn add_watchers(
        &self,
        actor: &OrgUserActor,
        opening_id: &str,
        emails: &[String],
    ) -> Result<u64, HiringError> {
        if emails.is_empty() {
            return Err(HiringError::InvalidInput("no watcher emails given".into()));
        }

        self.store
            .bounded("add_watchers", async {
                let mut uow = self.store.begin().await?;
                let target = Target::Opening {
                    employer_id: actor.employer_id,
                    id: opening_id,
                };
                Transition::require(target, &ANY_OPENING_STATE)
                    .apply(uow.conn())
                    .await?;

                let users = resolve_org_users(uow.conn(), actor.employer_id, emails).await?;

                let existing = sqlx::query_scalar::<_, Uuid>(
                    r#"
                    SELECT watcher_id
                    FROM opening_watchers
                    WHERE employer_id = $1
                      AND opening_id = $2
                    "#,
                )
                .bind(actor.employer_id)
                .bind(opening_id)
                .fetch_all(uow.conn())
                .await?;

                let fresh: Vec<Uuid> = users
                    .iter()
                    .map(|u| u.id)
                    .filter(|id| !existing.contains(id))
                    .collect();

                if (existing.len() + fresh.len()) as i64 > MAX_WATCHERS_PER_OPENING {
                    tracing::debug!(
                        opening_id,
                        existing = existing.len(),
                        requested = fresh.len(),
                        "watcher cap reached"
                    );
                    return Err(HiringError::CapacityExceeded {
                        limit: MAX_WATCHERS_PER_OPENING,
                    });
                }

                let added = sqlx::query(
                    r#"
                    INSERT INTO opening_watchers (employer_id, opening_id, watcher_id, added_by)
                    SELECT $1, $2, w, $4
                    FROM unnest($3::uuid[]) AS w
                    ON CONFLICT DO NOTHING
                    "#,
                )
                .bind(actor.employer_id)
                .bind(opening_id)
                .bind(&fresh)
                .bind(actor.id)
                .execute(uow.conn())
                .await?
                .rows_affected();

                uow.commit().await?;
                tracing::info!(opening_id, added, "watchers added");
                Ok(added)
            })
            .await
    }

    /// Stop `email` watching the opening. Returns false if they were not watching.
    pub async fn remove_watcher(
        &self,
        actor: &OrgUserActor,
        opening_id: &str,
        email: &str,
    ) -> Result<bool, HiringError> {
        self.store
            .bounded("remove_watcher", async {
                let mut uow = self.store.begin().await?;
                let target = Target::Opening {
                    employer_id: actor.employer_id,
                    id: opening_id,
                };
                Transition::require(target, &ANY_OPENING_STATE)
                    .apply(uow.conn())
                    .await?;

                let removed = sqlx::query(
                    r#"
                    DELETE FROM opening_watchers w
                    USING org_users u
                    WHERE w.watcher_id = u.id
                      AND w.employer_id = $1
                      AND w.opening_id = $2
                      AND u.email = $3
                    "#,
                )
                .bind(actor.employer_id)
                .bind(opening_id)
                .bind(email.trim())
                .execute(uow.conn())
                .await?
                .rows_affected();

                uow.commit().await?;
                Ok(removed == 1)
            })
            .await
    }

    /// Current watchers, oldest first. Takes no row locks.
    pub async fn list_watchers(
        &self,
        actor: &OrgUserActor,
        opening_id: &str,
    ) -> Result<Vec<Watcher>, HiringError> {
        self.store
            .bounded("list_watchers", async {
                let exists = sqlx::query_scalar::<_, bool>(
                    "SELECT EXISTS (SELECT 1 FROM openings WHERE employer_id = $1 AND id = $2)",
                )
                .bind(actor.employer_id)
                .bind(opening_id)
                .fetch_one(self.store.pool())
                .await?;
                if !exists {
                    return Err(HiringError::NotFound(Entity::Opening));
                }

                let watchers = sqlx::query_as::<_, Watcher>(
                    r#"
                    SELECT w.watcher_id, u.email, u.name, w.added_by, w.created_at
                    FROM opening_watchers w
                    JOIN org_users u ON u.id = w.watcher_id
                    WHERE w.employer_id = $1
                      AND w.opening_id = $2
                    ORDER BY w.created_at ASC, u.email ASC
                    "#,
                )
                .bind(actor.employer_id)
                .bind(opening_id)
                .fetch_all(self.store.pool())
                .await?;

                Ok(watchers)
            })
            .await
    }
}
