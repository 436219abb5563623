use actix_web::web;

use crate::error::PlannerError;
use crate::middleware::auth::AuthMiddleware;
use crate::middleware::auth_context::JwtSecret;

pub mod account;
pub mod expenses;
pub mod health;
pub mod plans;

/// Registers every route. Plan and expense routes require a bearer token.
pub fn configure(cfg: &mut web::ServiceConfig, jwt_secret: &str) {
    cfg.app_data(web::Data::new(JwtSecret(jwt_secret.to_string())))
        .app_data(web::JsonConfig::default().error_handler(|err, _| {
            PlannerError::validation(format!("invalid request body: {}", err)).into()
        }))
        .route("/health", web::get().to(health::health_check))
        .service(
            web::scope("/api")
                .service(
                    web::scope("/auth")
                        .route("/register", web::post().to(account::register))
                        .route("/login", web::post().to(account::login))
                        .route("/confirm", web::post().to(account::confirm))
                        .route("/logout", web::post().to(account::logout))
                        .route("/session", web::get().to(account::session)),
                )
                // Protected routes
                .service(
                    web::scope("/plans")
                        .wrap(AuthMiddleware::new(jwt_secret))
                        .route("", web::get().to(plans::list))
                        .route("/generate", web::post().to(plans::generate))
                        .route("/state", web::get().to(plans::state))
                        .route("/state/error", web::delete().to(plans::clear_error))
                        .route("/current", web::delete().to(plans::deselect))
                        .route("/debug/last-response", web::get().to(plans::last_response))
                        .route("/{id}/select", web::post().to(plans::select))
                        .route("/{id}", web::patch().to(plans::update))
                        .route("/{id}", web::delete().to(plans::delete))
                        .route("/{plan_id}/expenses", web::get().to(expenses::list))
                        .route("/{plan_id}/expenses", web::post().to(expenses::create))
                        .route("/{plan_id}/expenses/total", web::get().to(expenses::total)),
                )
                .service(
                    web::scope("/expenses")
                        .wrap(AuthMiddleware::new(jwt_secret))
                        .route("/{id}", web::put().to(expenses::update))
                        .route("/{id}", web::delete().to(expenses::delete)),
                ),
        );
}
