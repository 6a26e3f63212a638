use serde::{Deserialize, Serialize};

/// A state column value. Every lifecycle enum round-trips through the TEXT
/// column of its table via these two functions.
pub trait LifecycleState: Copy + Sized + 'static {
    fn as_str(&self) -> &'static str;
    fn parse(s: &str) -> Option<Self>;
}

macro_rules! lifecycle_state {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl LifecycleState for $name {
            fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }

            fn parse(s: &str) -> Option<Self> {
                match s {
                    $($text => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

lifecycle_state!(OpeningState {
    Draft => "DRAFT",
    Active => "ACTIVE",
    Suspended => "SUSPENDED",
    Closed => "CLOSED",
});

lifecycle_state!(ApplicationState {
    Applied => "APPLIED",
    Shortlisted => "SHORTLISTED",
    Rejected => "REJECTED",
    Withdrawn => "WITHDRAWN",
});

lifecycle_state!(CandidacyState {
    Interviewing => "INTERVIEWING",
    Offered => "OFFERED",
    OfferAccepted => "OFFER_ACCEPTED",
    OfferDeclined => "OFFER_DECLINED",
    CandidateUnsuitable => "CANDIDATE_UNSUITABLE",
    CandidateNotResponding => "CANDIDATE_NOT_RESPONDING",
    EmployerDefunct => "EMPLOYER_DEFUNCT",
});

lifecycle_state!(InterviewState {
    Scheduled => "SCHEDULED",
    Completed => "COMPLETED",
    Cancelled => "CANCELLED",
});

lifecycle_state!(RsvpStatus {
    Yes => "YES",
    No => "NO",
    NotSet => "NOT_SET",
});

lifecycle_state!(ColorTag {
    Green => "GREEN",
    Yellow => "YELLOW",
    Red => "RED",
});

lifecycle_state!(InterviewType {
    InPerson => "IN_PERSON",
    VideoCall => "VIDEO_CALL",
    TakeHome => "TAKE_HOME",
    Other => "OTHER_INTERVIEW",
});

lifecycle_state!(InterviewersDecision {
    StrongYes => "STRONG_YES",
    Yes => "YES",
    No => "NO",
    StrongNo => "STRONG_NO",
});

lifecycle_state!(OrgUserState {
    Active => "ACTIVE_ORG_USER",
    Added => "ADDED_ORG_USER",
    Disabled => "DISABLED_ORG_USER",
    Replicated => "REPLICATED_ORG_USER",
});

impl OpeningState {
    /// The fixed opening lifecycle. Nothing goes back to DRAFT and CLOSED is final.
    pub fn can_transition(from: OpeningState, to: OpeningState) -> bool {
        use OpeningState::*;
        matches!(
            (from, to),
            (Draft, Active)
                | (Draft, Closed)
                | (Active, Suspended)
                | (Active, Closed)
                | (Suspended, Active)
                | (Suspended, Closed)
        )
    }
}

impl CandidacyState {
    /// Outcomes an employer may record on a candidacy that is still interviewing.
    pub fn is_employer_closure(&self) -> bool {
        matches!(
            self,
            CandidacyState::CandidateUnsuitable
                | CandidacyState::CandidateNotResponding
                | CandidacyState::EmployerDefunct
        )
    }

    /// Comments are accepted while the candidacy is still open.
    pub const COMMENTABLE: [CandidacyState; 2] =
        [CandidacyState::Interviewing, CandidacyState::Offered];
}

impl OrgUserState {
    /// States in which an org-user can be assigned work (interviews, watching).
    pub const ASSIGNABLE: [OrgUserState; 3] = [
        OrgUserState::Active,
        OrgUserState::Added,
        OrgUserState::Replicated,
    ];
}

pub fn state_names<S: LifecycleState>(states: &[S]) -> Vec<String> {
    states.iter().map(|s| s.as_str().to_string()).collect()
}
