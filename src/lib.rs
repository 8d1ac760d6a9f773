#[macro_use]
extern crate rocket;

pub mod auth;
pub mod db;
pub mod error;
pub mod models;
pub mod request_logger;
pub mod routes;
pub mod sync;

#[cfg_attr(not(test), allow(dead_code))]
pub mod test_support;

use crate::auth::AuthState;
use crate::db::MailSyncDb;
use crate::request_logger::RequestLogger;
use crate::sync::{
    ImapMailboxClient, PgAccountRegistry, PgSyncStore, SyncConfig, SyncOrchestrator,
    SyncScheduler,
};
use env_logger::Env;
use rocket::fairing::AdHoc;
use rocket::http::Method;
use rocket::{Build, Rocket, Route};
use rocket_cors::{AllowedOrigins, CorsOptions};
use rocket_db_pools::Database;
use rocket_okapi::{
    openapi_get_routes,
    rapidoc::{GeneralConfig, HideShowConfig, RapiDocConfig, make_rapidoc},
    settings::UrlObject,
    swagger_ui::{SwaggerUIConfig, make_swagger_ui},
};
use std::sync::{Arc, Once};

static LOGGER: Once = Once::new();

fn init_logger() {
    LOGGER.call_once(|| {
        env_logger::Builder::from_env(
            Env::default().default_filter_or("info,rocket::server=warn,rocket::request=warn"),
        )
        .init();
    });
}

/// Every API route plus the generated `openapi.json`, for mounting under `/api/v1`.
pub fn api_routes() -> Vec<Route> {
    openapi_get_routes![
        // Health routes
        routes::health::health_check,
        // Sync routes
        routes::sync::cron_sync,
        routes::sync::run_account_sync,
        routes::sync::list_sync_logs,
        routes::sync::get_account_cursor,
    ]
}

pub fn rocket() -> Rocket<Build> {
    init_logger();

    let cors = CorsOptions::default()
        .allowed_origins(AllowedOrigins::all())
        .allowed_methods(
            vec![Method::Get, Method::Post]
                .into_iter()
                .map(From::from)
                .collect(),
        )
        .allow_credentials(true)
        .to_cors();

    let rocket = rocket::build()
        .attach(RequestLogger)
        .attach(MailSyncDb::init());

    let rocket = match cors {
        Ok(cors) => rocket.attach(cors),
        Err(e) => {
            log::error!("invalid CORS configuration, continuing without CORS: {}", e);
            rocket
        }
    };

    rocket
        // Run database migrations on startup
        .attach(AdHoc::try_on_ignite(
            "Run Migrations",
            |rocket| async move {
                match MailSyncDb::fetch(&rocket) {
                    Some(db) => {
                        let pool = (**db).clone();
                        match sync::run_migrations(&pool).await {
                            Ok(_) => {
                                log::info!("database migrations successful");
                                Ok(rocket)
                            }
                            Err(e) => {
                                log::error!("database migrations failed: {}", e);
                                Err(rocket)
                            }
                        }
                    }
                    None => {
                        log::error!("database pool not available for migrations");
                        Err(rocket)
                    }
                }
            },
        ))
        // Wire the sync engine to Postgres and IMAP
        .attach(AdHoc::try_on_ignite("Sync Engine", |rocket| async move {
            match MailSyncDb::fetch(&rocket) {
                Some(db) => {
                    let pool = (**db).clone();
                    let config = SyncConfig::from_env();
                    log::info!(
                        "sync engine: scheduled limit {}, run budget {}s, scheduler {}",
                        config.scheduled_limit,
                        config.run_budget.as_secs(),
                        if config.scheduler_enabled { "on" } else { "off" }
                    );

                    let orchestrator = Arc::new(SyncOrchestrator::new(
                        Arc::new(PgAccountRegistry::new(pool.clone())),
                        Arc::new(PgSyncStore::new(pool)),
                        Arc::new(ImapMailboxClient::new()),
                        config,
                    ));

                    Ok(rocket.manage(orchestrator).manage(AuthState::from_env()))
                }
                None => {
                    log::error!("database pool not available for sync engine");
                    Err(rocket)
                }
            }
        }))
        // Spawn the in-process scheduler when enabled
        .attach(AdHoc::on_liftoff("Spawn Sync Scheduler", |rocket| {
            Box::pin(async move {
                let Some(orchestrator) = rocket.state::<Arc<SyncOrchestrator>>() else {
                    log::error!("failed to spawn sync scheduler: orchestrator not found");
                    return;
                };
                let config = orchestrator.config();
                if !config.scheduler_enabled {
                    return;
                }

                let scheduler = SyncScheduler::new(orchestrator.clone(), config.scheduler_interval);
                tokio::spawn(scheduler.run());
            })
        }))
        .register("/", routes::catchers::all())
        .mount("/api/v1", api_routes())
        .mount(
            "/api/docs/swagger/",
            make_swagger_ui(&SwaggerUIConfig {
                url: "../../v1/openapi.json".to_owned(),
                ..Default::default()
            }),
        )
        .mount(
            "/api/docs/rapidoc/",
            make_rapidoc(&RapiDocConfig {
                general: GeneralConfig {
                    spec_urls: vec![UrlObject::new("Mail Sync API", "../../v1/openapi.json")],
                    ..Default::default()
                },
                hide_show: HideShowConfig {
                    allow_spec_url_load: false,
                    allow_spec_file_load: false,
                    ..Default::default()
                },
                ..Default::default()
            }),
        )
}
