use crate::error::AppError;
use crate::middleware::auth::UserId;
use actix_web::{dev::Payload, Error, FromRequest, HttpMessage, HttpRequest};
use std::future::{ready, Ready};
use uuid::Uuid;

/// Authenticated caller, taken from the claims the JWT middleware verified
#[derive(Debug, Clone, Copy)]
pub struct User {
    pub id: Uuid,
}

impl FromRequest for User {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let user_id = req.extensions().get::<UserId>().map(|u| u.0);
        ready(
            user_id
                .map(|id| User { id })
                .ok_or_else(|| AppError::Unauthorized.into()),
        )
    }
}
