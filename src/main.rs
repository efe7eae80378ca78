use directorio::{
    AppState,
    auth::hash_password,
    config::{AppConfig, Env},
    create_router,
    error::AppResult,
    models::NewAccount,
    repository::{PostgresRepository, Repository, RepositoryState},
    validation::{AccountStatus, Role},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Loads configuration, initializes logging, connects and migrates the database, then
/// serves the API.
#[tokio::main]
async fn main() {
    // 1. Configuration (fails fast on missing production secrets)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging: RUST_LOG wins, otherwise verbose defaults for local work.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "directorio=debug,tower_http=info,sqlx=warn".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 3. Database pool and schema
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.db_url)
        .await
        .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("FATAL: Failed to run database migrations.");

    let repo = Arc::new(PostgresRepository::new(pool)) as RepositoryState;

    // 4. Optional first administrator
    if let Some((usuario, password)) = config.bootstrap_admin.clone() {
        if let Err(e) = ensure_admin(repo.as_ref(), &usuario, &password).await {
            tracing::error!("bootstrap administrator could not be created: {}", e);
        }
    }

    // 5. Router and server
    let bind_addr = config.bind_addr.clone();
    let app = create_router(AppState { repo, config });

    let listener = TcpListener::bind(&bind_addr)
        .await
        .expect("FATAL: Failed to bind the HTTP listener. Check APP_ADDR.");

    tracing::info!("Listening on {}", bind_addr);
    tracing::info!("API Documentation (Swagger UI) available at: http://{}/swagger-ui", bind_addr);

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("server terminated: {}", e);
    }
}

/// Creates an `Administrador` account named `usuario` unless that login already exists.
async fn ensure_admin(repo: &dyn Repository, usuario: &str, password: &str) -> AppResult<()> {
    if repo.find_credentials(usuario).await?.is_some() {
        tracing::debug!(usuario, "bootstrap administrator already present");
        return Ok(());
    }

    let created = repo
        .create_account(NewAccount {
            usuario: usuario.to_string(),
            nombre: "Administrador".to_string(),
            email: format!("{}@directorio.local", usuario),
            rol: Role::Administrador.as_str().to_string(),
            estado: AccountStatus::Activa.as_str().to_string(),
            rut: format!("admin-{}", usuario),
            id_direccion: None,
            id_area: None,
            password_hash: hash_password(password)?,
        })
        .await?;

    tracing::info!(account_id = %created.id, usuario, "bootstrap administrator created");
    Ok(())
}
