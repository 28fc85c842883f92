use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};
use log::{info, warn};
use std::io;
use std::sync::Arc;

use bookforge::auth::{bootstrap_admin, AuthMiddleware};
use bookforge::config::Config;
use bookforge::routes::{self, health};
use bookforge::store::{MemoryStore, PgStore};
use bookforge::AppState;

fn to_io(error: impl std::fmt::Display) -> io::Error {
    io::Error::new(io::ErrorKind::Other, error.to_string())
}

fn cors(allowed_origin: Option<&str>) -> Cors {
    let cors = match allowed_origin {
        Some(origin) => Cors::default().allowed_origin(origin),
        None => Cors::default().allow_any_origin(),
    };
    cors.allow_any_method().allow_any_header().max_age(3600)
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = Config::from_env().map_err(to_io)?;

    let state = match &config.database_url {
        Some(url) => {
            let store = PgStore::connect(url, config.max_db_connections)
                .await
                .map_err(to_io)?;
            store.migrate().await.map_err(to_io)?;
            info!("Connected to PostgreSQL");
            AppState::new(Arc::new(store), config.auth.clone(), config.policy.clone())
        }
        None => {
            warn!("DATABASE_URL is not set; using the in-memory store, data will not survive a restart");
            AppState::new(Arc::new(MemoryStore::new()), config.auth.clone(), config.policy.clone())
        }
    };

    if let Some(admin) = &config.admin {
        bootstrap_admin(state.users.as_ref(), &state.auth, admin)
            .await
            .map_err(to_io)?;
    }

    info!(
        "Starting bookforge at {} (loan period {} days, fine {}/day)",
        config.server_url(),
        config.policy.loan_period_days,
        config.policy.daily_fine_rate
    );

    let allowed_origin = config.cors_allowed_origin.clone();
    let data = web::Data::new(state);
    HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .wrap(cors(allowed_origin.as_deref()))
            .wrap(Logger::default())
            .service(health::health)
            .service(
                web::scope("/api")
                    .wrap(AuthMiddleware)
                    .configure(routes::config),
            )
    })
    .bind((config.server_host.as_str(), config.server_port))?
    .run()
    .await
}
