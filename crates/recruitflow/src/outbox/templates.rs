//! Email templates.
//!
//! Every email is three templates sharing one name: `<name>.subject`,
//! `<name>.txt` and `<name>.html`. HTML templates are auto-escaped by
//! extension; subjects and text bodies are not.

use std::sync::Arc;

use minijinja::{Environment, Value};

const SOURCES: &[(&str, &str)] = &[
    ("layout.html", include_str!("../../templates/layout.html")),
    ("_closed_reason.txt", include_str!("../../templates/_closed_reason.txt")),
    // candidate
    ("shortlisted.subject", "{{ c.company_name }}: your application was shortlisted"),
    ("shortlisted.txt", include_str!("../../templates/shortlisted.txt")),
    ("shortlisted.html", include_str!("../../templates/shortlisted.html")),
    ("rejected.subject", "{{ c.company_name }}: update on your application"),
    ("rejected.txt", include_str!("../../templates/rejected.txt")),
    ("rejected.html", include_str!("../../templates/rejected.html")),
    (
        "interview_candidate.subject",
        "{{ c.company_name }}: interview scheduled for {{ c.opening_title }}",
    ),
    ("interview_candidate.txt", include_str!("../../templates/interview_candidate.txt")),
    ("interview_candidate.html", include_str!("../../templates/interview_candidate.html")),
    ("interview_cancelled.subject", "{{ c.company_name }}: interview cancelled"),
    ("interview_cancelled.txt", include_str!("../../templates/interview_cancelled.txt")),
    ("interview_cancelled.html", include_str!("../../templates/interview_cancelled.html")),
    ("offered.subject", "{{ c.company_name }}: offer for {{ c.opening_title }}"),
    ("offered.txt", include_str!("../../templates/offered.txt")),
    ("offered.html", include_str!("../../templates/offered.html")),
    ("candidacy_closed.subject", "{{ c.company_name }}: update on {{ c.opening_title }}"),
    ("candidacy_closed.txt", include_str!("../../templates/candidacy_closed.txt")),
    ("candidacy_closed.html", include_str!("../../templates/candidacy_closed.html")),
    // employer side
    (
        "interview_panel.subject",
        "Interview: {{ c.candidate_name }} for {{ c.opening_title }}",
    ),
    ("interview_panel.txt", include_str!("../../templates/interview_panel.txt")),
    ("interview_panel.html", include_str!("../../templates/interview_panel.html")),
    (
        "interviewer_added.subject",
        "Interview: {{ c.candidate_name }} for {{ c.opening_title }}",
    ),
    ("interviewer_added.txt", include_str!("../../templates/interviewer_added.txt")),
    ("interviewer_added.html", include_str!("../../templates/interviewer_added.html")),
    ("interviewer_removed.subject", "Removed from interview: {{ c.candidate_name }}"),
    ("interviewer_removed.txt", include_str!("../../templates/interviewer_removed.txt")),
    ("interviewer_removed.html", include_str!("../../templates/interviewer_removed.html")),
    (
        "offer_answered.subject",
        "{{ c.candidate_name }} {{ verb }} the offer for {{ c.opening_title }}",
    ),
    ("offer_answered.txt", include_str!("../../templates/offer_answered.txt")),
    ("offer_answered.html", include_str!("../../templates/offer_answered.html")),
    // onboarding
    ("onboarding_invite.subject", "Welcome to RecruitFlow, {{ company }}"),
    ("onboarding_invite.txt", include_str!("../../templates/onboarding_invite.txt")),
    ("onboarding_invite.html", include_str!("../../templates/onboarding_invite.html")),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub subject: String,
    pub text_body: String,
    pub html_body: String,
}

/// Parsed once, shared by every clone.
#[derive(Debug, Clone)]
pub struct Templates {
    env: Arc<Environment<'static>>,
}

impl Templates {
    pub fn load() -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        for &(name, source) in SOURCES {
            env.add_template(name, source)?;
        }
        Ok(Self { env: Arc::new(env) })
    }

    pub fn render(&self, name: &str, ctx: Value) -> Result<Rendered, minijinja::Error> {
        let subject = self.part(name, "subject", &ctx)?;
        Ok(Rendered {
            // subjects are header values; a stray newline would break the header
            subject: subject.split_whitespace().collect::<Vec<_>>().join(" "),
            text_body: self.part(name, "txt", &ctx)?,
            html_body: self.part(name, "html", &ctx)?,
        })
    }

    fn part(&self, name: &str, ext: &str, ctx: &Value) -> Result<String, minijinja::Error> {
        self.env
            .get_template(&format!("{name}.{ext}"))?
            .render(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minijinja::context;

    #[test]
    fn every_email_has_all_three_parts() {
        let templates = Templates::load().unwrap();
        let names: Vec<&str> = SOURCES
            .iter()
            .filter_map(|(n, _)| n.strip_suffix(".subject"))
            .collect();
        assert_eq!(names.len(), 11);
        let ctx = context! {
            c => context! {
                candidate_name => "Sam",
                company_name => "Acme",
                opening_title => "Platform Engineer",
                opening_id => "2026-Oct-17-1",
            },
            start => "2026-10-20 09:00",
            end => "10:00",
            verb => "accepted",
            outcome => "EMPLOYER_DEFUNCT",
            company => "Acme",
            link => "https://x.test/onboard/t",
            hours => 24,
        };
        for name in names {
            let out = templates
                .render(name, ctx.clone())
                .unwrap_or_else(|e| panic!("{name}: {e}"));
            assert!(!out.subject.is_empty(), "{name}");
            assert!(out.html_body.contains("RecruitFlow"), "{name}");
        }
    }

    #[test]
    fn html_is_escaped_text_and_subject_are_not() {
        let templates = Templates::load().unwrap();
        let out = templates
            .render(
                "onboarding_invite",
                context! { company => "Smith & <Sons>", link => "https://x.test/onboard/t", hours => 24 },
            )
            .unwrap();
        assert_eq!(out.subject, "Welcome to RecruitFlow, Smith & <Sons>");
        assert!(out.text_body.contains("Smith & <Sons> has been registered"));
        assert!(out.html_body.contains("Smith &amp; &lt;Sons&gt;"));
        assert!(!out.html_body.contains("<Sons>"));
    }

    #[test]
    fn unknown_email_is_an_error() {
        let templates = Templates::load().unwrap();
        assert!(templates.render("nope", context! {}).is_err());
    }
}
