use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{TimeZone, Utc};
use tracing::debug;

use shared_models::auth::{JwtClaims, SessionStatus, User};

/// Reads the claims of an access token without checking its signature. The
/// client has no signing secret; this is only for display and expiry hints.
pub fn decode_claims(token: &str) -> Result<JwtClaims, String> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err("Invalid token format".to_string());
    }

    let claims_json = match URL_SAFE_NO_PAD.decode(parts[1].trim_end_matches('=')) {
        Ok(bytes) => match String::from_utf8(bytes) {
            Ok(json_str) => json_str,
            Err(_) => return Err("Invalid claims encoding".to_string()),
        },
        Err(_) => return Err("Invalid claims encoding".to_string()),
    };

    match serde_json::from_str(&claims_json) {
        Ok(claims) => Ok(claims),
        Err(e) => {
            debug!("Failed to parse claims: {}", e);
            Err("Invalid claims format".to_string())
        }
    }
}

/// Combines the stored access token and cached profile into a status report.
pub fn session_status(access_token: Option<&str>, cached_user: Option<&User>) -> SessionStatus {
    let Some(token) = access_token else {
        return SessionStatus::anonymous();
    };

    let mut status = SessionStatus {
        authenticated: true,
        user_id: cached_user.map(|u| u.id.clone()),
        email: cached_user.and_then(|u| u.email.clone()),
        role: cached_user.and_then(|u| u.role.clone()),
        expires_at: None,
        expired: false,
    };

    match decode_claims(token) {
        Ok(claims) => {
            status.user_id = status.user_id.or(Some(claims.sub));
            status.email = status.email.or(claims.email);
            status.role = status.role.or(claims.role);
            if let Some(exp) = claims.exp {
                status.expires_at = Utc.timestamp_opt(exp, 0).single();
                status.expired = exp < Utc::now().timestamp();
            }
        }
        Err(e) => debug!("Access token is opaque to the client: {}", e),
    }

    status
}
