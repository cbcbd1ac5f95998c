//! JWT authentication for the HTTP API and the websocket handshake

use crate::error::{AppError, AppResult};
use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage,
};
use futures_util::future::LocalBoxFuture;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::future::{ready, Ready};
use std::sync::Arc;
use uuid::Uuid;

/// JWT claims issued by the identity service
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: usize,
    #[serde(default)]
    pub iat: usize,
    #[serde(default, rename = "deviceId", skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

/// Authenticated user id placed in request extensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserId(pub Uuid);

/// HS256 token validation shared by the middleware and the gateway
#[derive(Clone)]
pub struct JwtValidator {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtValidator {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn validate(&self, token: &str) -> AppResult<Claims> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "token rejected");
                AppError::Unauthorized
            })
    }
}

/// Token from an `Authorization: Bearer <token>` header value
pub fn bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

const PUBLIC_PATHS: [&str; 2] = ["/health", "/metrics"];

pub struct JwtAuth {
    validator: Arc<JwtValidator>,
}

impl JwtAuth {
    pub fn new(validator: Arc<JwtValidator>) -> Self {
        Self { validator }
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = JwtAuthService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(JwtAuthService {
            service,
            validator: self.validator.clone(),
        }))
    }
}

pub struct JwtAuthService<S> {
    service: S,
    validator: Arc<JwtValidator>,
}

impl<S, B> Service<ServiceRequest> for JwtAuthService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if PUBLIC_PATHS.contains(&req.path()) {
            let fut = self.service.call(req);
            return Box::pin(fut);
        }

        let claims = req
            .headers()
            .get("Authorization")
            .and_then(|value| value.to_str().ok())
            .and_then(bearer_token)
            .ok_or(AppError::Unauthorized)
            .and_then(|token| self.validator.validate(token));

        let claims = match claims {
            Ok(claims) => claims,
            Err(e) => return Box::pin(async move { Err(e.into()) }),
        };

        req.extensions_mut().insert(UserId(claims.sub));
        req.extensions_mut().insert(claims);

        let fut = self.service.call(req);
        Box::pin(fut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, web, App, HttpResponse};
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn create_test_jwt(user_id: Uuid, expires_in_seconds: i64, secret: &str) -> String {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: user_id,
            exp: (now + expires_in_seconds) as usize,
            iat: now as usize,
            device_id: None,
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    async fn whoami(req: actix_web::HttpRequest) -> HttpResponse {
        let user = req.extensions().get::<UserId>().map(|u| u.0.to_string());
        HttpResponse::Ok().body(user.unwrap_or_default())
    }

    #[::core::prelude::v1::test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("Basic abc"), None);
    }

    #[::core::prelude::v1::test]
    fn test_validator_rejects_wrong_secret() {
        let token = create_test_jwt(Uuid::new_v4(), 3600, "other-secret");
        let validator = JwtValidator::new("test-secret");
        assert!(matches!(
            validator.validate(&token),
            Err(AppError::Unauthorized)
        ));
    }

    #[actix_web::test]
    async fn test_valid_jwt_sets_user_id() {
        let user = Uuid::new_v4();
        let app = test::init_service(
            App::new()
                .wrap(JwtAuth::new(Arc::new(JwtValidator::new("test-secret"))))
                .route("/whoami", web::get().to(whoami)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/whoami")
            .insert_header((
                "Authorization",
                format!("Bearer {}", create_test_jwt(user, 3600, "test-secret")),
            ))
            .to_request();

        let body = test::call_and_read_body(&app, req).await;
        assert_eq!(body, user.to_string());
    }

    #[actix_web::test]
    async fn test_expired_jwt_rejected() {
        let app = test::init_service(
            App::new()
                .wrap(JwtAuth::new(Arc::new(JwtValidator::new("test-secret"))))
                .route("/whoami", web::get().to(whoami)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/whoami")
            .insert_header((
                "Authorization",
                format!("Bearer {}", create_test_jwt(Uuid::new_v4(), -3600, "test-secret")),
            ))
            .to_request();

        let resp = test::try_call_service(&app, req).await;
        let status = match resp {
            Ok(resp) => resp.status(),
            Err(e) => e.as_response_error().status_code(),
        };
        assert_eq!(status, 401);
    }

    #[actix_web::test]
    async fn test_health_skips_auth() {
        let app = test::init_service(
            App::new()
                .wrap(JwtAuth::new(Arc::new(JwtValidator::new("test-secret"))))
                .route("/health", web::get().to(|| async { HttpResponse::Ok().finish() })),
        )
        .await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
    }
}
