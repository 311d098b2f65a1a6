use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use alumnet::{
    api,
    config::Settings,
    payments::{CheckoutService, StatsService, StripeGateway, WebhookReconciler},
    repository::{
        PaymentRepository, SqlitePaymentRepository, SqlitePaymentSettingsRepository,
        SqliteTenantRepository,
    },
    service::PaymentSettingsService,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "alumnet=debug,tower_http=debug,axum=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let settings = Settings::new().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config: {}. Using defaults.", e);
        Settings::default()
    });

    tracing::info!(
        "Starting Alumnet payments server on {}:{}",
        settings.server.host,
        settings.server.port
    );

    // Initialize database
    let db_pool = SqlitePoolOptions::new()
        .max_connections(settings.database.max_connections)
        .connect(&settings.database.url)
        .await?;

    // Run migrations
    sqlx::migrate!("./migrations").run(&db_pool).await?;

    // Initialize repositories
    let payment_repo: Arc<dyn PaymentRepository> =
        Arc::new(SqlitePaymentRepository::new(db_pool.clone()));
    let settings_repo = Arc::new(SqlitePaymentSettingsRepository::new(db_pool.clone()));
    let tenant_repo = Arc::new(SqliteTenantRepository::new(db_pool.clone()));

    // Initialize Stripe-backed services if configured
    let (checkout, webhooks) = if settings.stripe.enabled {
        if let (Some(api_key), Some(webhook_secret)) = (
            settings.stripe.secret_key.clone(),
            settings.stripe.webhook_secret.clone(),
        ) {
            tracing::info!("Stripe payment processing enabled");
            let gateway = Arc::new(StripeGateway::new(api_key));
            let checkout = Arc::new(CheckoutService::new(
                gateway,
                payment_repo.clone(),
                tenant_repo.clone(),
                settings_repo.clone(),
            ));
            let webhooks = Arc::new(WebhookReconciler::new(payment_repo.clone(), webhook_secret));
            (Some(checkout), Some(webhooks))
        } else {
            tracing::warn!("Stripe enabled but missing configuration");
            (None, None)
        }
    } else {
        tracing::info!("Stripe payment processing disabled");
        (None, None)
    };

    let payment_settings = Arc::new(PaymentSettingsService::new(settings_repo));
    let stats = Arc::new(StatsService::new(payment_repo));

    let app = api::create_app(
        checkout,
        webhooks,
        payment_settings,
        stats,
        tenant_repo,
        Arc::new(settings.clone()),
    );

    let listener = tokio::net::TcpListener::bind(format!(
        "{}:{}",
        settings.server.host, settings.server.port
    ))
    .await?;

    tracing::info!(
        "Server listening on http://{}:{}",
        settings.server.host,
        settings.server.port
    );

    axum::serve(listener, app).await?;

    Ok(())
}
