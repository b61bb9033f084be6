use crate::errors::{Result, WalletEngineError};
use crate::handlers::validate;
use crate::models::{LoginRequest, RegisterRequest, UserResponse};
use crate::security_middleware::auth::Claims;
use crate::users::UserService;
use actix_web::{web, HttpMessage, HttpRequest, HttpResponse};
use serde_json::json;
use std::sync::Arc;

/// Register a new user. The user's wallet is created alongside the account.
pub async fn register(
    service: web::Data<Arc<UserService>>,
    request: web::Json<RegisterRequest>,
) -> Result<HttpResponse> {
    let request = request.into_inner();
    validate(&request)?;

    let user = service
        .register(&request.name, &request.email, &request.password)
        .await?;

    Ok(HttpResponse::Created().json(UserResponse::from(&user)))
}

/// Authenticate and return a bearer token
pub async fn login(
    service: web::Data<Arc<UserService>>,
    request: web::Json<LoginRequest>,
) -> Result<HttpResponse> {
    let request = request.into_inner();
    validate(&request)?;

    let (user, token) = service.login(&request.email, &request.password).await?;

    Ok(HttpResponse::Ok().json(json!({
        "user": UserResponse::from(&user),
        "token": token
    })))
}

/// Issue a fresh token for the authenticated caller
pub async fn refresh(
    service: web::Data<Arc<UserService>>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let claims = req
        .extensions()
        .get::<Claims>()
        .cloned()
        .ok_or(WalletEngineError::Unauthorized)?;

    let token = service.refresh(&claims)?;

    Ok(HttpResponse::Ok().json(json!({ "token": token })))
}

/// Configure routes
pub fn configure_auth_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1/auth")
            .route("/register", web::post().to(register))
            .route("/login", web::post().to(login))
            .route("/refresh", web::post().to(refresh)),
    );
}
