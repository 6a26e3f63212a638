use std::env;
use std::sync::Arc;
use std::time::Duration;

use recruitflow::db::{make_pool, run_migrations, Store};
use recruitflow::hiring::model::{NewApplication, NewOpening, OrgUserActor};
use recruitflow::hiring::states::OpeningState;
use recruitflow::hiring::{Hiring, HubUserActor, Notices};
use recruitflow::outbox::dispatcher::{Dispatcher, DispatcherConfig};
use recruitflow::outbox::transport::LogMailTransport;
use recruitflow::outbox::{EmailClass, OutboxRepo};
use sqlx::PgPool;
use uuid::Uuid;

const USAGE: &str = "recruitctl <command>\n\
Commands:\n\
- migrate\n\
- reset\n\
- seed\n\
- demo\n\
- outbox\n\
- drain [transactional|onboarding]\n\
- email <email_key>\n\
\n\
Uses DATABASE_URL or TEST_DATABASE_URL.\n";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("{USAGE}");
        std::process::exit(2);
    }

    dotenvy::dotenv().ok();
    let url = env::var("DATABASE_URL")
        .or_else(|_| env::var("TEST_DATABASE_URL"))
        .map_err(|_| anyhow::anyhow!("DATABASE_URL or TEST_DATABASE_URL must be set"))?;

    let pool = make_pool(&url).await?;

    match args[1].as_str() {
        "migrate" => {
            run_migrations(&pool).await?;
            println!("migrations OK");
        }
        "reset" => reset(&pool).await?,
        "seed" => {
            let seeded = seed(&pool).await?;
            seeded.print();
        }
        "demo" => {
            reset(&pool).await?;
            let seeded = seed(&pool).await?;
            seeded.print();
            demo(&pool, &seeded).await?;
            show_outbox(&pool).await?;
        }
        "outbox" => show_outbox(&pool).await?,
        "drain" => {
            let class = match args.get(2).map(String::as_str) {
                None | Some("transactional") => EmailClass::Transactional,
                Some("onboarding") => EmailClass::Onboarding,
                Some(other) => anyhow::bail!("unknown email class {other:?}"),
            };
            drain(&pool, class).await?;
        }
        "email" => {
            let key: Uuid = args
                .get(2)
                .ok_or_else(|| anyhow::anyhow!("usage: recruitctl email <email_key>"))?
                .parse()?;
            match OutboxRepo::new(pool.clone()).get(key).await? {
                Some(e) => {
                    println!(
                        "EMAIL: key={} class={} state={} to={:?} cc={:?} created_at={} processed_at={:?}",
                        e.email_key,
                        e.email_class,
                        e.email_state,
                        e.email_to,
                        e.email_cc,
                        e.created_at,
                        e.processed_at
                    );
                    println!("subject: {}\n\n{}", e.email_subject, e.email_text_body);
                }
                None => println!("email {key} not found"),
            }
        }
        other => {
            eprintln!("Unknown command: {other}\n\n{USAGE}");
            std::process::exit(2);
        }
    }

    Ok(())
}

async fn reset(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        TRUNCATE TABLE
            interview_interviewers,
            interviews,
            candidacy_comments,
            candidacies,
            applications,
            opening_watchers,
            openings,
            hub_users,
            org_users,
            employers,
            emails
        CASCADE
        "#,
    )
    .execute(pool)
    .await?;

    println!("reset OK");
    Ok(())
}

struct Seeded {
    employer_id: Uuid,
    recruiter: Uuid,
    hiring_manager: Uuid,
    hub_user: Uuid,
    opening_id: String,
    application_id: Uuid,
}

impl Seeded {
    fn print(&self) {
        println!("+ employer       {}", self.employer_id);
        println!("+ recruiter      {}", self.recruiter);
        println!("+ hiring manager {}", self.hiring_manager);
        println!("+ hub user       {}", self.hub_user);
        println!("+ opening        {}", self.opening_id);
        println!("+ application    {}", self.application_id);
    }
}

async fn seed(pool: &PgPool) -> anyhow::Result<Seeded> {
    let employer_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO employers (company_name, employer_state, onboard_admin_email)
        VALUES ('Demo Corp', 'ONBOARDED', 'admin@demo.test')
        RETURNING id
        "#,
    )
    .fetch_one(pool)
    .await?;

    // a second employer waiting for its onboarding invite
    sqlx::query(
        r#"
        INSERT INTO employers (company_name, employer_state, onboard_admin_email)
        VALUES ('Pending Corp', 'ONBOARD_PENDING', 'admin@pending.test')
        "#,
    )
    .execute(pool)
    .await?;

    let mut staff = Vec::new();
    for (email, name) in [
        ("rita@demo.test", "Rita Recruiter"),
        ("mo@demo.test", "Mo Manager"),
        ("ian@demo.test", "Ian Interviewer"),
    ] {
        let id: Uuid = sqlx::query_scalar(
            "INSERT INTO org_users (employer_id, email, name) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(employer_id)
        .bind(email)
        .bind(name)
        .fetch_one(pool)
        .await?;
        staff.push(id);
    }

    let hub_user: Uuid = sqlx::query_scalar(
        "INSERT INTO hub_users (full_name, email) VALUES ('Sam Candidate', 'sam@candidate.test') RETURNING id",
    )
    .fetch_one(pool)
    .await?;

    let hiring = hiring(pool)?;
    let recruiter = OrgUserActor {
        id: staff[0],
        employer_id,
    };

    let opening_id = hiring
        .openings
        .create_opening(
            &recruiter,
            NewOpening {
                title: "Backend Engineer".into(),
                positions: 1,
                recruiter: staff[0],
                hiring_manager: staff[1],
            },
        )
        .await?;
    hiring
        .openings
        .change_opening_state(&recruiter, &opening_id, OpeningState::Draft, OpeningState::Active)
        .await?;

    let application_id = hiring
        .applications
        .apply_for_opening(
            &HubUserActor { id: hub_user },
            NewApplication {
                employer_id,
                opening_id: opening_id.clone(),
                cover_letter: Some("Hello!".into()),
                resume_sha: "demo-resume".into(),
            },
        )
        .await?;

    Ok(Seeded {
        employer_id,
        recruiter: staff[0],
        hiring_manager: staff[1],
        hub_user,
        opening_id,
        application_id,
    })
}

async fn demo(pool: &PgPool, seeded: &Seeded) -> anyhow::Result<()> {
    let hiring = hiring(pool)?;
    let recruiter = OrgUserActor {
        id: seeded.recruiter,
        employer_id: seeded.employer_id,
    };

    hiring
        .watchers
        .add_watchers(&recruiter, &seeded.opening_id, &["mo@demo.test".to_string()])
        .await?;

    let candidacy_id = hiring
        .applications
        .shortlist_application(&recruiter, seeded.application_id)
        .await?;
    println!("+ candidacy      {candidacy_id}");

    // second shortlist must be refused
    match hiring
        .applications
        .shortlist_application(&recruiter, seeded.application_id)
        .await
    {
        Ok(_) => println!("! second shortlist unexpectedly succeeded"),
        Err(e) => println!("second shortlist refused: {} ({e})", e.code()),
    }

    hiring
        .candidacies
        .offer_to_candidate(&recruiter, candidacy_id, Some("Great panel feedback"))
        .await?;
    println!("offer made");
    Ok(())
}

async fn show_outbox(pool: &PgPool) -> anyhow::Result<()> {
    let s = OutboxRepo::new(pool.clone()).stats().await?;
    println!(
        "outbox: pending_transactional={} pending_onboarding={} processed_last_hour={} oldest_pending_age_secs={:?}",
        s.pending_transactional, s.pending_onboarding, s.processed_last_hour, s.oldest_pending_age_secs
    );
    Ok(())
}

async fn drain(pool: &PgPool, class: EmailClass) -> anyhow::Result<()> {
    let dispatcher = Dispatcher::new(
        OutboxRepo::new(pool.clone()),
        Arc::new(LogMailTransport),
        DispatcherConfig {
            class,
            interval: Duration::from_secs(1),
            batch_size: 100,
            tick_deadline: Duration::from_secs(30),
        },
    );
    let report = dispatcher.tick().await?;
    println!("{report:?}");
    Ok(())
}

fn hiring(pool: &PgPool) -> anyhow::Result<Hiring> {
    Ok(Hiring::new(
        Store::new(pool.clone(), Duration::from_secs(10)),
        Notices::new("no-reply@recruitflow.local")?,
    ))
}
