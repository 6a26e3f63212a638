use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::hiring::guard::Scope;
use crate::hiring::states::{
    ApplicationState, CandidacyState, ColorTag, InterviewState, InterviewType,
    InterviewersDecision, LifecycleState, OpeningState, RsvpStatus,
};

pub type CandidacyId = Uuid;

/// An authenticated employer-side user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrgUserActor {
    pub id: Uuid,
    pub employer_id: Uuid,
}

impl OrgUserActor {
    pub fn scope(&self) -> Scope {
        Scope::Employer(self.employer_id)
    }
}

/// An authenticated candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubUserActor {
    pub id: Uuid,
}

impl HubUserActor {
    pub fn scope(&self) -> Scope {
        Scope::HubUser(self.id)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewOpening {
    pub title: String,
    pub positions: i32,
    pub recruiter: Uuid,
    pub hiring_manager: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewApplication {
    pub employer_id: Uuid,
    pub opening_id: String,
    pub cover_letter: Option<String>,
    pub resume_sha: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewInterview {
    pub candidacy_id: CandidacyId,
    pub interview_type: InterviewType,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub description: Option<String>,
    pub interviewer_emails: Vec<String>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Assessment {
    pub decision: Option<InterviewersDecision>,
    pub positives: Option<String>,
    pub negatives: Option<String>,
    pub overall_assessment: Option<String>,
    pub feedback_to_candidate: Option<String>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Opening {
    pub id: String,
    pub employer_id: Uuid,
    pub title: String,
    pub positions: i32,
    pub recruiter: Uuid,
    pub hiring_manager: Uuid,
    pub state: String,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Opening {
    pub fn state(&self) -> Option<OpeningState> {
        OpeningState::parse(&self.state)
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Watcher {
    pub watcher_id: Uuid,
    pub email: String,
    pub name: String,
    pub added_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Application {
    pub id: Uuid,
    pub employer_id: Uuid,
    pub opening_id: String,
    pub hub_user_id: Uuid,
    pub cover_letter: Option<String>,
    pub resume_sha: String,
    pub application_state: String,
    pub color_tag: Option<String>,
    pub candidacy_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Application {
    pub fn state(&self) -> Option<ApplicationState> {
        ApplicationState::parse(&self.application_state)
    }

    pub fn color_tag(&self) -> Option<ColorTag> {
        self.color_tag.as_deref().and_then(ColorTag::parse)
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Candidacy {
    pub id: Uuid,
    pub application_id: Uuid,
    pub employer_id: Uuid,
    pub opening_id: String,
    pub candidacy_state: String,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Candidacy {
    pub fn state(&self) -> Option<CandidacyState> {
        CandidacyState::parse(&self.candidacy_state)
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CandidacyComment {
    pub id: Uuid,
    pub candidacy_id: Uuid,
    pub author_type: String,
    pub org_user_id: Option<Uuid>,
    pub hub_user_id: Option<Uuid>,
    pub comment_text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Interview {
    pub id: Uuid,
    pub candidacy_id: Uuid,
    pub employer_id: Uuid,
    pub interview_type: String,
    pub interview_state: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub description: Option<String>,
    pub candidate_rsvp: String,
    pub interviewers_decision: Option<String>,
    pub positives: Option<String>,
    pub negatives: Option<String>,
    pub overall_assessment: Option<String>,
    pub feedback_to_candidate: Option<String>,
    pub feedback_submitted_by: Option<Uuid>,
    pub feedback_submitted_at: Option<DateTime<Utc>>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Interview {
    pub fn state(&self) -> Option<InterviewState> {
        InterviewState::parse(&self.interview_state)
    }

    pub fn candidate_rsvp(&self) -> Option<RsvpStatus> {
        RsvpStatus::parse(&self.candidate_rsvp)
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Interviewer {
    pub interviewer_id: Uuid,
    pub email: String,
    pub name: String,
    pub rsvp_status: String,
}
