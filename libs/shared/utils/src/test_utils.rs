use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use base64::{Engine as _, engine::general_purpose};
use serde_json::json;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;

pub struct TestConfig {
    pub jwt_secret: String,
    pub api_base_url: String,
    pub api_timeout_ms: u64,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-signing-must-be-long-enough".to_string(),
            api_base_url: "http://localhost:3000/api".to_string(),
            api_timeout_ms: 2_000,
        }
    }
}

impl TestConfig {
    /// Config pointing at a mock server, e.g. `MockServer::uri()`.
    pub fn for_server(uri: &str) -> Self {
        Self {
            api_base_url: uri.to_string(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            api_base_url: self.api_base_url.clone(),
            api_timeout_ms: self.api_timeout_ms,
            session_file: None,
        }
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: String,
}

impl Default for TestUser {
    fn default() -> Self {
        Self::new("test@example.com", "admin")
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            name: "Test User".to_string(),
            role: role.to_string(),
        }
    }

    pub fn doctor(email: &str) -> Self {
        Self::new(email, "doctor")
    }

    pub fn admin(email: &str) -> Self {
        Self::new(email, "admin")
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            name: Some(self.name.clone()),
            role: Some(self.role.clone()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "id": self.id,
            "email": self.email,
            "name": self.name,
            "role": self.role
        })
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": user.role,
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_malformed_token() -> String {
        "invalid.token.format".to_string()
    }
}

/// Canned backend bodies, shaped like the clinic API's `{ success, data, message }` envelope.
pub struct MockBackendResponses;

impl MockBackendResponses {
    pub fn login_response(user: &TestUser, access_token: &str, refresh_token: &str) -> serde_json::Value {
        json!({
            "success": true,
            "data": {
                "accessToken": access_token,
                "refreshToken": refresh_token,
                "user": user.to_json()
            }
        })
    }

    pub fn refresh_response(access_token: &str) -> serde_json::Value {
        json!({
            "success": true,
            "data": {
                "accessToken": access_token
            }
        })
    }

    pub fn success(data: serde_json::Value) -> serde_json::Value {
        json!({
            "success": true,
            "data": data
        })
    }

    pub fn message(message: &str) -> serde_json::Value {
        json!({
            "success": true,
            "message": message
        })
    }

    pub fn schedule_entry(id: u32, doctor_id: &str, day_of_week: i32, start: &str, end: &str) -> serde_json::Value {
        json!({
            "id": id,
            "doctorId": doctor_id,
            "dayOfWeek": day_of_week,
            "startTime": start,
            "endTime": end,
            "breakStart": null,
            "breakEnd": null,
            "isAvailable": true
        })
    }

    pub fn error_response(message: &str) -> serde_json::Value {
        json!({
            "success": false,
            "message": message
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_creation() {
        let config = TestConfig::for_server("http://127.0.0.1:4010");
        let app_config = config.to_app_config();

        assert_eq!(app_config.api_base_url, "http://127.0.0.1:4010");
        assert_eq!(app_config.api_timeout_ms, 2_000);
        assert!(app_config.session_file.is_none());
    }

    #[test]
    fn test_user_creation() {
        let user = TestUser::doctor("doc@example.com");
        assert_eq!(user.email, "doc@example.com");
        assert_eq!(user.role, "doctor");

        let user_model = user.to_user();
        assert_eq!(user_model.email, Some(user.email.clone()));
        assert_eq!(user_model.role, Some(user.role.clone()));
        assert_eq!(user_model.id, user.id);
    }

    #[test]
    fn test_jwt_token_creation() {
        let user = TestUser::default();
        let token = JwtTestUtils::create_test_token(&user, "test-secret", Some(1));

        assert_eq!(token.split('.').count(), 3);
    }

    #[test]
    fn test_login_response_shape() {
        let user = TestUser::admin("admin@example.com");
        let body = MockBackendResponses::login_response(&user, "a", "r");
        assert_eq!(body["data"]["accessToken"], "a");
        assert_eq!(body["data"]["user"]["email"], "admin@example.com");
    }
}
