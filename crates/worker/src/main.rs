use recruitflow::api;
use recruitflow::cache::TtlCache;
use recruitflow::config;
use recruitflow::db;
use recruitflow::outbox::dispatcher::{Dispatcher, DispatcherConfig};
use recruitflow::outbox::onboarding::{OnboardingConfig, OnboardingInviter};
use recruitflow::outbox::transport::transport_from_config;
use recruitflow::outbox::{EmailClass, OutboxRepo};

use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cfg = config::Config::from_env()?;
    let api_addr = cfg.admin_addr.clone();

    tracing::info!(
        worker_id = %cfg.worker_id,
        api = %api_addr.clone().unwrap_or_else(|| "disabled".to_string()),
        migrate_on_startup = cfg.migrate_on_startup,
        mail_mode = ?cfg.mail.mode,
        dispatch_interval_ms = cfg.dispatch_interval.as_millis() as u64,
        dispatch_batch_size = cfg.dispatch_batch_size,
        onboarding_invite_interval_ms = cfg.onboarding_invite_interval.as_millis() as u64,
        "recruitflow worker starting"
    );

    let pool = db::make_pool(&cfg.database_url).await?;
    if cfg.migrate_on_startup {
        db::run_migrations(&pool).await?;
    }

    // ---- Onboarding invite producer ----
    let inviter = OnboardingInviter::new(
        pool.clone(),
        OnboardingConfig {
            interval: cfg.onboarding_invite_interval,
            token_valid_mins: cfg.onboarding_token_valid_mins,
            base_url: cfg.employer_base_url.clone(),
            email_from: cfg.mail.email_from.clone(),
        },
    )?;

    let outbox = OutboxRepo::new(pool.clone());
    let transport = transport_from_config(&cfg.mail)?;
    let cancel = CancellationToken::new();

    // ---- Dispatcher tasks ----
    let transactional = Dispatcher::new(
        outbox.clone(),
        transport.clone(),
        DispatcherConfig {
            class: EmailClass::Transactional,
            interval: cfg.dispatch_interval,
            batch_size: cfg.dispatch_batch_size,
            tick_deadline: cfg.dispatch_tick_deadline,
        },
    );
    let transactional_handle = tokio::spawn(transactional.run(cancel.clone()));

    let onboarding = Dispatcher::new(
        outbox.clone(),
        transport.clone(),
        DispatcherConfig {
            class: EmailClass::Onboarding,
            interval: cfg.onboarding_dispatch_interval,
            batch_size: cfg.dispatch_batch_size,
            tick_deadline: cfg.dispatch_tick_deadline,
        },
    );
    let onboarding_handle = tokio::spawn(onboarding.run(cancel.clone()));
    let inviter_handle = tokio::spawn(inviter.run(cancel.clone()));

    // ---- API task ----
    let api_state = api::ApiState {
        worker_id: cfg.worker_id.clone(),
        outbox: outbox.clone(),
        stats_cache: TtlCache::new(cfg.metrics_cache_ttl),
    };
    let app = api::router(api_state);
    let api_cancel = cancel.clone();

    let api_handle = tokio::spawn(async move {
        let served = async {
            if let Some(addr) = api_addr {
                let listener = tokio::net::TcpListener::bind(&addr).await?;
                tracing::info!(%addr, "admin api listening");
                let shutdown = api_cancel.clone();
                axum::serve(listener, app)
                    .with_graceful_shutdown(async move { shutdown.cancelled().await })
                    .await?;
            } else {
                api_cancel.cancelled().await;
            }
            Ok::<(), anyhow::Error>(())
        }
        .await;

        // a dead admin api takes the whole worker down with it
        if let Err(e) = &served {
            tracing::error!(error = %e, "admin api failed");
            api_cancel.cancel();
        }
        served
    });

    // ---- Shutdown ----
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("ctrl-c received, shutting down");
        }
        signal_cancel.cancel();
    });

    let (transactional_res, onboarding_res, inviter_res, api_res) = tokio::join!(
        transactional_handle,
        onboarding_handle,
        inviter_handle,
        api_handle
    );
    transactional_res??;
    onboarding_res??;
    inviter_res??;
    api_res??;

    tracing::info!("recruitflow worker stopped");
    Ok(())
}
