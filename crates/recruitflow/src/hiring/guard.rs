//! The one primitive every lifecycle transition is built from.
//!
//! A [`Transition`] names a row (entity + key + caller scope), the states it may
//! currently be in, and optionally the state to move it to. [`Transition::run`]
//! issues a single statement that locks the scoped row, reads its state and,
//! when the state is allowed, writes the new one. The verdict is derived from
//! the locked row, not from whether the write happened, so NOT_FOUND and
//! INVALID_STATE stay distinguishable even when nothing was written.
//!
//! The row is locked FOR NO KEY UPDATE, the same strength a plain UPDATE
//! takes, so inserts whose foreign keys point at the row are not blocked.
//! The lock lives until the surrounding transaction ends. Dependent writes
//! issued afterwards on the same connection see the row exactly as guarded.

use sqlx::PgConnection;
use uuid::Uuid;

use crate::error::{Entity, HiringError};
use crate::hiring::states::{state_names, LifecycleState};

/// Whose rows the caller may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Employer(Uuid),
    HubUser(Uuid),
}

impl Scope {
    fn id(&self) -> Uuid {
        match self {
            Scope::Employer(id) | Scope::HubUser(id) => *id,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    Opening { employer_id: Uuid, id: &'a str },
    Application { id: Uuid, scope: Scope },
    Candidacy { id: Uuid, scope: Scope },
    Interview { id: Uuid, scope: Scope },
}

enum Key<'a> {
    Text(&'a str),
    Uuid(Uuid),
}

impl<'a> Target<'a> {
    pub fn entity(&self) -> Entity {
        match self {
            Target::Opening { .. } => Entity::Opening,
            Target::Application { .. } => Entity::Application,
            Target::Candidacy { .. } => Entity::Candidacy,
            Target::Interview { .. } => Entity::Interview,
        }
    }

    fn table(&self) -> &'static str {
        match self {
            Target::Opening { .. } => "openings",
            Target::Application { .. } => "applications",
            Target::Candidacy { .. } => "candidacies",
            Target::Interview { .. } => "interviews",
        }
    }

    fn state_column(&self) -> &'static str {
        match self {
            Target::Opening { .. } => "state",
            Target::Application { .. } => "application_state",
            Target::Candidacy { .. } => "candidacy_state",
            Target::Interview { .. } => "interview_state",
        }
    }

    // $1 is the row key, $2 the scope id.
    fn predicate(&self) -> &'static str {
        match self {
            Target::Opening { .. } => "id = $1 AND employer_id = $2",
            Target::Application {
                scope: Scope::Employer(_),
                ..
            }
            | Target::Candidacy {
                scope: Scope::Employer(_),
                ..
            }
            | Target::Interview {
                scope: Scope::Employer(_),
                ..
            } => "id = $1 AND employer_id = $2",
            Target::Application {
                scope: Scope::HubUser(_),
                ..
            } => "id = $1 AND hub_user_id = $2",
            Target::Candidacy {
                scope: Scope::HubUser(_),
                ..
            } => {
                "id = $1 AND application_id IN (
                    SELECT a.id FROM applications a WHERE a.hub_user_id = $2
                )"
            }
            Target::Interview {
                scope: Scope::HubUser(_),
                ..
            } => {
                "id = $1 AND candidacy_id IN (
                    SELECT c.id
                    FROM candidacies c
                    JOIN applications a ON a.id = c.application_id
                    WHERE a.hub_user_id = $2
                )"
            }
        }
    }

    fn key(&self) -> Key<'a> {
        match *self {
            Target::Opening { id, .. } => Key::Text(id),
            Target::Application { id, .. }
            | Target::Candidacy { id, .. }
            | Target::Interview { id, .. } => Key::Uuid(id),
        }
    }

    fn scope_id(&self) -> Uuid {
        match self {
            Target::Opening { employer_id, .. } => *employer_id,
            Target::Application { scope, .. }
            | Target::Candidacy { scope, .. }
            | Target::Interview { scope, .. } => scope.id(),
        }
    }
}

/// What the guard saw on the locked row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guarded {
    NotFound,
    WrongState(String),
    Passed,
}

pub struct Transition<'a, S: LifecycleState> {
    target: Target<'a>,
    from: &'a [S],
    to: Option<S>,
}

impl<'a, S: LifecycleState> Transition<'a, S> {
    /// A guard that only locks and checks the row.
    pub fn require(target: Target<'a>, from: &'a [S]) -> Self {
        Self {
            target,
            from,
            to: None,
        }
    }

    /// A guard that also moves the row to `to` when it passes.
    pub fn change(target: Target<'a>, from: &'a [S], to: S) -> Self {
        Self {
            target,
            from,
            to: Some(to),
        }
    }

    pub fn entity(&self) -> Entity {
        self.target.entity()
    }

    pub async fn run(&self, conn: &mut PgConnection) -> Result<Guarded, sqlx::Error> {
        let table = self.target.table();
        let state = self.target.state_column();
        let predicate = self.target.predicate();
        let allowed = state_names(self.from);

        let (current, applied): (Option<String>, bool) = match self.to {
            None => {
                let sql = format!(
                    r#"
                    SELECT {state}
                    FROM {table}
                    WHERE {predicate}
                    FOR NO KEY UPDATE
                    "#
                );
                let q = sqlx::query_scalar::<_, String>(&sql);
                let q = match self.target.key() {
                    Key::Text(k) => q.bind(k),
                    Key::Uuid(k) => q.bind(k),
                };
                let current = q.bind(self.target.scope_id()).fetch_optional(&mut *conn).await?;
                let passed = current
                    .as_deref()
                    .map(|c| allowed.iter().any(|a| a == c))
                    .unwrap_or(false);
                (current, passed)
            }
            Some(to) => {
                let sql = format!(
                    r#"
                    WITH target AS (
                        SELECT id, employer_id, {state} AS current_state
                        FROM {table}
                        WHERE {predicate}
                        FOR NO KEY UPDATE
                    ),
                    applied AS (
                        UPDATE {table} AS t
                        SET {state} = $4,
                            updated_at = now()
                        FROM target
                        WHERE t.id = target.id
                          AND t.employer_id = target.employer_id
                          AND target.current_state = ANY($3)
                        RETURNING t.id
                    )
                    SELECT
                        (SELECT current_state FROM target) AS current_state,
                        EXISTS (SELECT 1 FROM applied) AS applied
                    "#
                );
                let q = sqlx::query_as::<_, (Option<String>, bool)>(&sql);
                let q = match self.target.key() {
                    Key::Text(k) => q.bind(k),
                    Key::Uuid(k) => q.bind(k),
                };
                q.bind(self.target.scope_id())
                    .bind(&allowed)
                    .bind(to.as_str())
                    .fetch_one(&mut *conn)
                    .await?
            }
        };

        Ok(match current {
            None => Guarded::NotFound,
            Some(_) if applied => Guarded::Passed,
            Some(c) => Guarded::WrongState(c),
        })
    }

    /// Run the guard and turn a refusal into the matching [`HiringError`].
    pub async fn apply(&self, conn: &mut PgConnection) -> Result<(), HiringError> {
        let verdict = self.run(conn).await?;
        let entity = self.entity();
        match verdict {
            Guarded::Passed => Ok(()),
            Guarded::NotFound => {
                tracing::debug!(entity = %entity, "guard: not found in scope");
                Err(HiringError::NotFound(entity))
            }
            Guarded::WrongState(current) => {
                tracing::debug!(entity = %entity, current = %current, "guard: wrong state");
                Err(HiringError::invalid_state(entity, current))
            }
        }
    }
}
