//! JWT 认证
//!
//! 身份由上游签发的 token 提供，这里只负责校验并取出用户 ID。

use axum::http::HeaderMap;
use config::JwtConfig;
use domain::UserId;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: Uuid,
    pub exp: i64, // Unix timestamp
}

#[derive(Clone)]
pub struct JwtService {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtService {
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_ref());
        let decoding_key = DecodingKey::from_secret(config.secret.as_ref());

        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    pub fn generate_token(&self, user_id: UserId) -> Result<String, ApiError> {
        let exp = chrono::Utc::now() + chrono::Duration::hours(self.config.expiration_hours);
        let claims = Claims {
            user_id: user_id.into(),
            exp: exp.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(|err| {
            ApiError::internal_server_error(format!("token generation failed: {err}"))
        })
    }

    pub fn verify_token(&self, token: &str) -> Result<UserId, ApiError> {
        decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map(|data| UserId::from(data.claims.user_id))
            .map_err(|err| ApiError::unauthorized(format!("invalid token: {err}")))
    }

    /// 从 `Authorization: Bearer <token>` 中取出用户
    pub fn extract_user_from_headers(&self, headers: &HeaderMap) -> Result<UserId, ApiError> {
        let auth_header = headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|header| header.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized("missing authorization header"))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::unauthorized("invalid authorization header format"))?;

        self.verify_token(token)
    }
}
