use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use dotenv::dotenv;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use wallet_engine::{
    auth_handlers,
    config::Config,
    database::Database,
    handlers, metrics,
    reconciliation::ReconciliationService,
    reconciliation_handlers,
    security_middleware::JwtAuth,
    services::WalletService,
    users::UserService,
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();

    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    let config = Config::from_env().expect("Failed to load configuration");
    config.validate().expect("Invalid configuration");

    metrics::register_metrics();

    info!("Starting Wallet Engine on port {}", config.server.port);

    let db = Arc::new(
        Database::new(&config.database.url, config.database.max_connections)
            .await
            .expect("Failed to connect to database"),
    );

    db.run_migrations()
        .await
        .expect("Failed to run database migrations");

    let seed_balance = config
        .ledger
        .seed_balance()
        .expect("Invalid system seed balance");
    db.bootstrap_system_account(seed_balance, &config.ledger.default_currency)
        .await
        .expect("Failed to bootstrap system account");

    let reconciliation_service = Arc::new(ReconciliationService::new(db.clone()));
    let wallet_service = Arc::new(WalletService::new(
        db.clone(),
        reconciliation_service.clone(),
    ));
    let user_service = Arc::new(UserService::new(
        db.clone(),
        config.auth.jwt_secret.clone(),
        config.auth.token_ttl_hours,
        config.ledger.default_currency.clone(),
    ));

    let jwt_secret = config.auth.jwt_secret.clone();

    HttpServer::new(move || {
        let cors = Cors::permissive();

        // Registration order matters: the bearer check must run after path
        // normalization, and CORS outermost.
        App::new()
            .wrap(JwtAuth::new(jwt_secret.clone()))
            .wrap(middleware::NormalizePath::trim())
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(web::Data::new(wallet_service.clone()))
            .app_data(web::Data::new(reconciliation_service.clone()))
            .app_data(web::Data::new(user_service.clone()))
            .configure(handlers::configure_routes)
            .configure(auth_handlers::configure_auth_routes)
            .configure(reconciliation_handlers::configure_reconciliation_routes)
    })
    .workers(config.server.workers)
    .bind((config.server.host.as_str(), config.server.port))?
    .run()
    .await
}
