//! Email bodies for every transition that tells someone something.

use chrono::{DateTime, Utc};
use minijinja::{context, Value};

use crate::error::HiringError;
use crate::hiring::stakeholders::CandidacyContext;
use crate::hiring::states::{CandidacyState, LifecycleState};
use crate::outbox::templates::Templates;
use crate::outbox::{EmailClass, NewEmail};

/// Builds outbox rows from the email templates.
#[derive(Debug, Clone)]
pub struct Notices {
    from: String,
    templates: Templates,
}

impl Notices {
    pub fn new(from: impl Into<String>) -> Result<Self, HiringError> {
        Ok(Self {
            from: from.into(),
            templates: Templates::load()?,
        })
    }

    fn email(
        &self,
        template: &str,
        to: Vec<String>,
        cc: Vec<String>,
        ctx: Value,
    ) -> Result<NewEmail, HiringError> {
        let rendered = self.templates.render(template, ctx)?;
        // someone on both lists gets it once
        let cc = cc.into_iter().filter(|c| !to.contains(c)).collect();
        Ok(NewEmail {
            class: EmailClass::Transactional,
            from: self.from.clone(),
            to,
            cc,
            bcc: vec![],
            subject: rendered.subject,
            html_body: rendered.html_body,
            text_body: rendered.text_body,
        })
    }

    pub fn shortlisted(&self, ctx: &CandidacyContext) -> Result<NewEmail, HiringError> {
        self.email(
            "shortlisted",
            vec![ctx.candidate_email.clone()],
            vec![],
            context! { c => ctx },
        )
    }

    pub fn rejected(&self, ctx: &CandidacyContext) -> Result<NewEmail, HiringError> {
        self.email(
            "rejected",
            vec![ctx.candidate_email.clone()],
            vec![],
            context! { c => ctx },
        )
    }

    pub fn interview_scheduled_for_candidate(
        &self,
        ctx: &CandidacyContext,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<NewEmail, HiringError> {
        self.email(
            "interview_candidate",
            vec![ctx.candidate_email.clone()],
            vec![],
            context! {
                c => ctx,
                start => format_start(start),
                end => format_end(end),
            },
        )
    }

    pub fn interview_scheduled_for_interviewers(
        &self,
        ctx: &CandidacyContext,
        interviewers: Vec<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<NewEmail, HiringError> {
        self.email(
            "interview_panel",
            interviewers,
            ctx.watcher_emails.clone(),
            context! {
                c => ctx,
                start => format_start(start),
                end => format_end(end),
            },
        )
    }

    pub fn interviewer_added(
        &self,
        ctx: &CandidacyContext,
        interviewer: &str,
    ) -> Result<NewEmail, HiringError> {
        self.email(
            "interviewer_added",
            vec![interviewer.to_string()],
            vec![],
            context! { c => ctx },
        )
    }

    pub fn interviewer_removed(
        &self,
        ctx: &CandidacyContext,
        interviewer: &str,
    ) -> Result<NewEmail, HiringError> {
        self.email(
            "interviewer_removed",
            vec![interviewer.to_string()],
            vec![],
            context! { c => ctx },
        )
    }

    pub fn interview_cancelled(
        &self,
        ctx: &CandidacyContext,
        interviewers: Vec<String>,
    ) -> Result<NewEmail, HiringError> {
        self.email(
            "interview_cancelled",
            vec![ctx.candidate_email.clone()],
            interviewers,
            context! { c => ctx },
        )
    }

    pub fn offered(&self, ctx: &CandidacyContext) -> Result<NewEmail, HiringError> {
        self.email(
            "offered",
            vec![ctx.candidate_email.clone()],
            ctx.employer_side(),
            context! { c => ctx },
        )
    }

    pub fn candidacy_closed(
        &self,
        ctx: &CandidacyContext,
        outcome: CandidacyState,
    ) -> Result<NewEmail, HiringError> {
        self.email(
            "candidacy_closed",
            vec![ctx.candidate_email.clone()],
            vec![],
            context! { c => ctx, outcome => outcome.as_str() },
        )
    }

    pub fn offer_answered(
        &self,
        ctx: &CandidacyContext,
        accepted: bool,
    ) -> Result<NewEmail, HiringError> {
        let mut to = vec![ctx.recruiter_email.clone()];
        if ctx.hiring_manager_email != ctx.recruiter_email {
            to.push(ctx.hiring_manager_email.clone());
        }
        self.email(
            "offer_answered",
            to,
            ctx.watcher_emails.clone(),
            context! { c => ctx, verb => if accepted { "accepted" } else { "declined" } },
        )
    }
}

fn format_start(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%d %H:%M").to_string()
}

fn format_end(t: DateTime<Utc>) -> String {
    t.format("%H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn notices() -> Notices {
        Notices::new("no-reply@recruitflow.local").unwrap()
    }

    fn ctx() -> CandidacyContext {
        CandidacyContext {
            application_id: Uuid::new_v4(),
            candidacy_id: Some(Uuid::new_v4()),
            employer_id: Uuid::new_v4(),
            opening_id: "2026-Oct-17-2".into(),
            opening_title: "Platform <Engineer>".into(),
            company_name: "Acme".into(),
            candidate_name: "Sam".into(),
            candidate_email: "sam@example.com".into(),
            recruiter_email: "rita@acme.test".into(),
            hiring_manager_email: "mo@acme.test".into(),
            watcher_emails: vec!["hank@acme.test".into()],
        }
    }

    #[test]
    fn html_is_escaped_text_is_not() {
        let email = notices().shortlisted(&ctx()).unwrap();
        assert_eq!(email.subject, "Acme: your application was shortlisted");
        assert!(email.text_body.starts_with("Hello Sam,"));
        assert!(email.text_body.contains("Platform <Engineer>"));
        assert!(email.html_body.contains("Platform &lt;Engineer&gt;"));
        assert_eq!(email.class, EmailClass::Transactional);
    }

    #[test]
    fn offer_copies_employer_side() {
        let email = notices().offered(&ctx()).unwrap();
        assert_eq!(email.to, vec!["sam@example.com".to_string()]);
        assert_eq!(
            email.cc,
            vec![
                "rita@acme.test".to_string(),
                "mo@acme.test".to_string(),
                "hank@acme.test".to_string()
            ]
        );
    }

    #[test]
    fn cc_never_repeats_a_direct_recipient() {
        let mut c = ctx();
        c.watcher_emails.push("rita@acme.test".into());
        let email = notices().offer_answered(&c, true).unwrap();
        assert_eq!(email.to, vec!["rita@acme.test".to_string(), "mo@acme.test".to_string()]);
        assert_eq!(email.cc, vec!["hank@acme.test".to_string()]);
        assert_eq!(email.subject, "Sam accepted the offer for Platform <Engineer>");
    }

    #[test]
    fn closure_reason_follows_outcome() {
        let email = notices()
            .candidacy_closed(&ctx(), CandidacyState::CandidateNotResponding)
            .unwrap();
        assert!(email.text_body.contains("did not hear back from you"));

        let email = notices()
            .candidacy_closed(&ctx(), CandidacyState::CandidateUnsuitable)
            .unwrap();
        assert!(email.text_body.contains("decided not to proceed"));
    }

    #[test]
    fn interview_times_are_rendered_in_utc() {
        let start = "2026-10-20T09:00:00Z".parse().unwrap();
        let end = "2026-10-20T10:30:00Z".parse().unwrap();
        let email = notices()
            .interview_scheduled_for_candidate(&ctx(), start, end)
            .unwrap();
        assert!(email
            .text_body
            .contains("from 2026-10-20 09:00 to 10:30 (UTC)"));
    }
}
