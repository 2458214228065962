//! REST server: shared state, router assembly, and startup
//!
//! - [`api`] - Routes and handlers for jobs, comments, and exports
//! - [`auth`] - Accounts, session tokens, and the verification mailer

pub mod api;
pub mod auth;

pub use api::{ApiError, ApiResponse};
pub use auth::{CurrentUser, JwtService, Mailer};

use crate::config::Config;
use crate::crawler::{AcquisitionEngine, BiliFetcher};
use crate::error::Result;
use crate::storage::{Database, ADMIN_LEVEL};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Persistent store
    pub db: Arc<Database>,

    /// Remote comment API client
    pub fetcher: Arc<BiliFetcher>,

    /// Acquisition engine for spawned runs
    pub engine: Arc<AcquisitionEngine>,

    /// Session token service
    pub jwt: Arc<JwtService>,

    /// Verification mailer
    pub mailer: Arc<Mailer>,
}

/// The REST server, wiring configuration into shared state
pub struct ApiServer {
    config: Config,
    state: AppState,
}

impl ApiServer {
    /// Create the server: open the store, build the engine, and seed the
    /// administrator account when none exists
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let db = Arc::new(Database::open(&config.database.sqlite_path)?);
        let fetcher = Arc::new(BiliFetcher::new(&config.crawler)?);
        let engine = Arc::new(AcquisitionEngine::new(
            fetcher.clone(),
            db.clone(),
            &config.crawler,
        ));
        let jwt = Arc::new(JwtService::new(&config.auth.jwt_secret));
        let mailer = Arc::new(Mailer::new(config.email.clone()));

        if !db.has_admin()? {
            let hash = auth::hash_password(&config.auth.admin_password)?;
            db.create_user(
                &config.auth.admin_username,
                &format!("{}@localhost", config.auth.admin_username),
                &hash,
                ADMIN_LEVEL,
            )?;
            info!(username = %config.auth.admin_username, "administrator account seeded");
        }

        let state = AppState {
            db,
            fetcher,
            engine,
            jwt,
            mailer,
        };

        Ok(Self { config, state })
    }

    /// Get the application state
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Build the router with all routes and configured layers
    pub fn build_router(&self) -> Router {
        let mut router = api::create_router(self.state.clone());

        if self.config.server.enable_cors {
            router = router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            );
        }

        if self.config.server.enable_request_logging {
            router = router.layer(TraceLayer::new_for_http());
        }

        router
    }

    /// Bind and serve until the process is stopped
    pub async fn start(&self) -> Result<()> {
        let router = self.build_router();
        let addr = &self.config.server.bind;

        info!(%addr, "starting API server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router)
            .await
            .map_err(crate::error::Error::Io)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn test_config(dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.database.sqlite_path = dir.join("test.db");
        config
    }

    #[test]
    fn test_server_seeds_admin_once() {
        let dir = tempfile::tempdir().unwrap();
        let server = ApiServer::new(test_config(dir.path())).unwrap();
        assert!(server.state().db.has_admin().unwrap());

        let admin = server
            .state()
            .db
            .get_user_by_username("admin")
            .unwrap()
            .unwrap();
        assert!(admin.is_admin());
        assert!(auth::verify_password("admin123", &admin.password_hash));

        // A second startup must not fail on the unique username
        let server = ApiServer::new(test_config(dir.path())).unwrap();
        assert!(server.state().db.has_admin().unwrap());
    }

    #[test]
    fn test_router_builds() {
        let dir = tempfile::tempdir().unwrap();
        let server = ApiServer::new(test_config(dir.path())).unwrap();
        let _router = server.build_router();
    }
}
