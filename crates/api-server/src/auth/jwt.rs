//! User bearer tokens

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserClaims {
    /// User id.
    pub sub: String,
    pub email: String,
    pub exp: usize,
}

pub fn issue_user_token(
    user_id: &str,
    email: &str,
    secret: &str,
    ttl_hours: i64,
) -> Result<String, String> {
    let exp = (Utc::now() + Duration::hours(ttl_hours)).timestamp() as usize;
    let claims = UserClaims {
        sub: user_id.to_string(),
        email: email.to_string(),
        exp,
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|err| format!("Failed to sign user token: {}", err))
}

pub fn verify_user_token(token: &str, secret: &str) -> Result<UserClaims, String> {
    decode::<UserClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map(|decoded| decoded.claims)
    .map_err(|err| format!("Invalid user token: {}", err))
}
