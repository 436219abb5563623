use std::future::{ready, Ready};

use actix_web::{dev::Payload, Error, FromRequest, HttpMessage, HttpRequest};

use crate::error::PlannerError;
use crate::middleware::auth::{bearer_token, decode_token, Claims};

/// Caller identity placed in the request by [`AuthMiddleware`](super::auth::AuthMiddleware).
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub email: String,
}

impl From<&Claims> for AuthenticatedUser {
    fn from(claims: &Claims) -> Self {
        Self {
            user_id: claims.user_id.clone(),
            email: claims.sub.clone(),
        }
    }
}

impl FromRequest for AuthenticatedUser {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        match req.extensions().get::<Claims>() {
            Some(claims) => ready(Ok(AuthenticatedUser::from(claims))),
            None => ready(Err(PlannerError::Auth {
                endpoint: "account",
                detail: "user not authenticated".to_string(),
            }
            .into())),
        }
    }
}

/// Identity on routes outside the protected scope; `None` when the request
/// carries no valid token.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<AuthenticatedUser>);

/// Signing secret made available to extractors as app data.
#[derive(Debug, Clone)]
pub struct JwtSecret(pub String);

impl FromRequest for MaybeUser {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        if let Some(claims) = req.extensions().get::<Claims>() {
            return ready(Ok(MaybeUser(Some(AuthenticatedUser::from(claims)))));
        }

        let user = req
            .app_data::<actix_web::web::Data<JwtSecret>>()
            .zip(
                req.headers()
                    .get("Authorization")
                    .and_then(|value| value.to_str().ok())
                    .and_then(bearer_token),
            )
            .and_then(|(secret, token)| decode_token(&secret.0, token).ok())
            .map(|claims| AuthenticatedUser::from(&claims));

        ready(Ok(MaybeUser(user)))
    }
}
