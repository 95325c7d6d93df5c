//! Middleware de autenticación JWT
//!
//! Este módulo verifica el token `Bearer`, resuelve `{ user_id, role }` y lo
//! inyecta en la request como `Caller`. El motor nunca ve credenciales.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::models::auth::{Caller, JwtClaims, UserRole};
use crate::utils::errors::{AppError, AppResult};

/// Claves HS256 derivadas de `JWT_SECRET`
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl JwtKeys {
    pub fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Decodificar un token y resolver el `Caller`
    pub fn verify(&self, token: &str) -> AppResult<Caller> {
        let token_data = decode::<JwtClaims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map_err(|_| AppError::Unauthorized("Token inválido".to_string()))?;
        let claims = token_data.claims;

        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| AppError::Unauthorized("ID de usuario inválido".to_string()))?;
        let role: UserRole = claims.role.parse().map_err(AppError::Unauthorized)?;
        Ok(Caller::new(user_id, role))
    }
}

/// Middleware de autenticación JWT
pub async fn auth_middleware(
    State(keys): State<JwtKeys>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|auth_str| auth_str.to_str().ok())
        .and_then(|auth_str| auth_str.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Unauthorized("Token de autorización requerido".to_string()))?;

    let caller = keys.verify(token)?;
    request.extensions_mut().insert(caller);

    Ok(next.run(request).await)
}

/// Función para generar JWT token
pub fn generate_jwt_token(
    keys: &JwtKeys,
    user_id: Uuid,
    role: UserRole,
    ttl: chrono::Duration,
) -> AppResult<String> {
    let now = chrono::Utc::now();
    let expires_at = now + ttl;

    let claims = JwtClaims {
        sub: user_id.to_string(),
        role: role.as_str().to_string(),
        exp: expires_at.timestamp() as usize,
        iat: now.timestamp() as usize,
    };

    encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding)
        .map_err(|e| AppError::Internal(format!("Error generando JWT: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_round_trip_resolves_caller() {
        let keys = JwtKeys::from_secret("test-secret");
        let user_id = Uuid::new_v4();
        let token = generate_jwt_token(&keys, user_id, UserRole::Operator, chrono::Duration::hours(1)).unwrap();
        let caller = keys.verify(&token).unwrap();
        assert_eq!(caller, Caller::new(user_id, UserRole::Operator));
    }

    #[test]
    fn test_token_signed_with_other_secret_is_rejected() {
        let token = generate_jwt_token(
            &JwtKeys::from_secret("other"),
            Uuid::new_v4(),
            UserRole::Admin,
            chrono::Duration::hours(1),
        )
        .unwrap();
        assert!(matches!(
            JwtKeys::from_secret("test-secret").verify(&token),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let keys = JwtKeys::from_secret("test-secret");
        let token = generate_jwt_token(&keys, Uuid::new_v4(), UserRole::Admin, chrono::Duration::hours(-2)).unwrap();
        assert!(keys.verify(&token).is_err());
    }
}
