use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use mealhub_api::{app, AppState};
use mealhub_catalog::PricingEngine;
use mealhub_core::geolocation::MockGeolocationGateway;
use mealhub_core::payment::MockPaymentGateway;
use mealhub_core::{GeolocationGateway, PaymentGateway};
use mealhub_order::{Collaborators, OrchestratorConfig, OrderOrchestrator};
use mealhub_store::app_config::{Config, ProviderMode};
use mealhub_store::{
    DbClient, HttpGeolocationGateway, PgCatalog, PgMerchantRepository, PgOrderRepository,
    StripePaymentGateway,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mealhub_api=debug,mealhub_order=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("failed to load config")?;
    tracing::info!("Starting MealHub API on port {}", config.server.port);

    let db = DbClient::new(&config.database)
        .await
        .context("failed to connect to Postgres")?;
    db.migrate().await.context("failed to run migrations")?;

    let merchants = Arc::new(PgMerchantRepository::new(
        db.pool.clone(),
        config.business_rules.default_order_capacity_window,
    ));

    let payments: Arc<dyn PaymentGateway> = match config.payment.mode {
        ProviderMode::Live => Arc::new(
            StripePaymentGateway::new(&config.payment).context("failed to build payment client")?,
        ),
        ProviderMode::Mock => {
            tracing::warn!("Payment provider is mocked; no money will move");
            Arc::new(MockPaymentGateway::new(config.payment.webhook_secret.expose()))
        }
    };

    let geolocation: Arc<dyn GeolocationGateway> = match config.geolocation.mode {
        ProviderMode::Live => Arc::new(
            HttpGeolocationGateway::new(&config.geolocation)
                .context("failed to build geolocation client")?,
        ),
        ProviderMode::Mock => {
            tracing::warn!("Geolocation provider is mocked; unknown routes will not quote");
            Arc::new(MockGeolocationGateway::new())
        }
    };

    let collaborators = Collaborators {
        orders: Arc::new(PgOrderRepository::new(db.pool.clone())),
        merchants: merchants.clone(),
        addresses: merchants,
        catalog: Arc::new(PgCatalog::new(db.pool.clone())),
        geolocation,
        payments,
    };

    let pricing = PricingEngine::new(config.pricing.clone()).context("invalid pricing config")?;
    let orchestrator_config = OrchestratorConfig {
        currency: config.payment.currency.clone(),
        min_schedule_lead: chrono::Duration::minutes(
            config.business_rules.min_schedule_lead_minutes,
        ),
        discovery_radius_km: config.business_rules.discovery_radius_km,
    };

    let state = AppState::new(OrderOrchestrator::new(collaborators, pricing, orchestrator_config));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}
