use actix_web::dev::Server;
use actix_web::{error::InternalError, web, App, HttpResponse, HttpServer};
use std::net::TcpListener;
use std::sync::Arc;

use crate::auth::SessionManager;
use crate::configuration::AuthSettings;
use crate::middleware::{JwtMiddleware, LoggerMiddleware};
use crate::routes::{
    change_password, get_current_user, health_check, login, logout, refresh, register,
};
use crate::store::CredentialStore;

/// Largest JSON body accepted by any route
const JSON_BODY_LIMIT: usize = 16 * 1024;

pub fn run(
    listener: TcpListener,
    store: Arc<dyn CredentialStore>,
    auth_settings: AuthSettings,
) -> Result<Server, std::io::Error> {
    let sessions = Arc::new(SessionManager::new(store, &auth_settings));
    let sessions_data = web::Data::from(sessions.clone());

    let server = HttpServer::new(move || {
        let json_config = web::JsonConfig::default()
            .limit(JSON_BODY_LIMIT)
            .error_handler(|err, _req| {
                let response = HttpResponse::BadRequest().json(serde_json::json!({
                    "message": err.to_string(),
                    "code": "VALIDATION_ERROR"
                }));
                InternalError::from_response(err, response).into()
            });

        App::new()
            .wrap(LoggerMiddleware)
            .app_data(json_config)
            .app_data(sessions_data.clone())
            .route("/health_check", web::get().to(health_check))
            .service(
                web::scope("/api/v1/users")
                    .route("/register", web::post().to(register))
                    .route("/login", web::post().to(login))
                    .route("/refresh-token", web::post().to(refresh))
                    .service(
                        web::scope("")
                            .wrap(JwtMiddleware::new(sessions.clone()))
                            .route("/logout", web::post().to(logout))
                            .route("/change-password", web::post().to(change_password))
                            .route("/current-user", web::get().to(get_current_user)),
                    ),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
