use std::fmt;
use std::time::Duration;

/// The aggregates a transition can be refused for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Opening,
    Application,
    Candidacy,
    Interview,
    Interviewer,
}

impl Entity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Entity::Opening => "opening",
            Entity::Application => "application",
            Entity::Candidacy => "candidacy",
            Entity::Interview => "interview",
            Entity::Interviewer => "interviewer",
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HiringError {
    /// Absent, or outside the caller's employer / hub-user scope.
    #[error("{0} not found")]
    NotFound(Entity),

    #[error("{entity} is {current}, which does not permit this transition")]
    InvalidState { entity: Entity, current: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("capacity exceeded: at most {limit} allowed")]
    CapacityExceeded { limit: i64 },

    /// The deadline fired; the transaction may or may not have committed.
    #[error("{op} did not finish within {after:?}; outcome unknown")]
    OutcomeUnknown { op: &'static str, after: Duration },

    #[error("internal store error")]
    Internal(#[from] sqlx::Error),

    #[error("email template failed: {0}")]
    Template(#[from] minijinja::Error),
}

impl HiringError {
    pub fn code(&self) -> &'static str {
        match self {
            HiringError::NotFound(_) => "NOT_FOUND",
            HiringError::InvalidState { .. } => "INVALID_STATE",
            HiringError::InvalidInput(_) => "INVALID_INPUT",
            HiringError::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
            HiringError::OutcomeUnknown { .. } => "OUTCOME_UNKNOWN",
            HiringError::Internal(_) | HiringError::Template(_) => "INTERNAL",
        }
    }

    /// Expected conditions are stable facts about the data, not transient failures.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            HiringError::NotFound(_)
                | HiringError::InvalidState { .. }
                | HiringError::InvalidInput(_)
                | HiringError::CapacityExceeded { .. }
        )
    }

    pub fn invalid_state(entity: Entity, current: impl Into<String>) -> Self {
        HiringError::InvalidState {
            entity,
            current: current.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(HiringError::NotFound(Entity::Opening).code(), "NOT_FOUND");
        assert_eq!(
            HiringError::invalid_state(Entity::Application, "REJECTED").code(),
            "INVALID_STATE"
        );
        assert_eq!(HiringError::InvalidInput("x".into()).code(), "INVALID_INPUT");
        assert_eq!(
            HiringError::CapacityExceeded { limit: 25 }.code(),
            "CAPACITY_EXCEEDED"
        );
        assert_eq!(
            HiringError::OutcomeUnknown {
                op: "shortlist_application",
                after: Duration::from_secs(1)
            }
            .code(),
            "OUTCOME_UNKNOWN"
        );
        assert_eq!(
            HiringError::Internal(sqlx::Error::RowNotFound).code(),
            "INTERNAL"
        );
    }

    #[test]
    fn only_data_conditions_are_expected() {
        assert!(HiringError::NotFound(Entity::Interview).is_expected());
        assert!(HiringError::CapacityExceeded { limit: 25 }.is_expected());
        assert!(!HiringError::Internal(sqlx::Error::PoolTimedOut).is_expected());
        assert!(!HiringError::OutcomeUnknown {
            op: "offer_to_candidate",
            after: Duration::from_millis(5)
        }
        .is_expected());
    }

    #[test]
    fn messages_name_the_entity() {
        let err = HiringError::invalid_state(Entity::Candidacy, "OFFERED");
        assert_eq!(
            err.to_string(),
            "candidacy is OFFERED, which does not permit this transition"
        );
    }
}
