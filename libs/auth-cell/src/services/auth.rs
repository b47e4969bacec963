use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use shared_http::ApiClient;
use shared_models::auth::{
    AuthPayload, ChangePasswordRequest, LoginRequest, RefreshRequest, RegisterRequest,
    ResetPasswordRequest, SessionStatus, User,
};
use shared_models::envelope::{unwrap_data, ApiEnvelope};
use shared_models::error::ClientError;
use shared_utils::jwt::session_status;

use crate::error::AuthError;

pub const MIN_PASSWORD_LENGTH: usize = 8;

fn validate_email(email: &str) -> Result<&str, AuthError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(AuthError::Validation("Email is required".to_string()));
    }
    if !email.contains('@') {
        return Err(AuthError::Validation("Email address is not valid".to_string()));
    }
    Ok(email)
}

fn validate_new_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

fn require(value: &str, what: &str) -> Result<(), AuthError> {
    if value.trim().is_empty() {
        return Err(AuthError::Validation(format!("{} is required", what)));
    }
    Ok(())
}

/// Login, registration and password flows over `/auth/*`, keeping the
/// shared [`Session`](shared_http::Session) in step with the backend.
pub struct AuthService {
    client: Arc<ApiClient>,
}

impl AuthService {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<Option<User>, AuthError> {
        let email = validate_email(email)?;
        if password.is_empty() {
            return Err(AuthError::Validation("Password is required".to_string()));
        }

        let request = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };

        let payload: Value = match self.client.post("/auth/login", &request).await {
            Ok(payload) => payload,
            // No session to refresh yet, so a 401 here is a rejected password.
            Err(ClientError::SessionExpired(reason)) => {
                warn!("Login rejected for {}: {}", email, reason);
                return Err(AuthError::InvalidCredentials);
            }
            Err(e) => return Err(e.into()),
        };

        let auth: AuthPayload = unwrap_data(payload).map_err(ClientError::from)?;
        self.store_credentials(&auth)?;

        info!("Logged in as {}", email);
        Ok(auth.user)
    }

    /// Creates an account. Credentials are stored only when the backend
    /// signs the new user in straight away.
    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn register(&self, request: &RegisterRequest) -> Result<Option<User>, AuthError> {
        require(&request.name, "Name")?;
        validate_email(&request.email)?;
        validate_new_password(&request.password)?;

        let payload: Value = self.client.post("/auth/register", request).await?;
        let auth: AuthPayload = unwrap_data(payload).map_err(ClientError::from)?;

        if auth.access_token.as_deref().is_some_and(|t| !t.is_empty()) {
            self.store_credentials(&auth)?;
        } else {
            debug!("Registration for {} returned no tokens", request.email);
        }

        Ok(auth.user)
    }

    /// Tells the backend, then drops local credentials whatever it answered.
    #[instrument(skip(self))]
    pub async fn logout(&self) {
        let notified = match self.client.session().refresh_token() {
            Some(refresh_token) => {
                self.client
                    .post::<Value, _>("/auth/logout", &RefreshRequest { refresh_token })
                    .await
            }
            None => self.client.post::<Value, _>("/auth/logout", &json!({})).await,
        };

        if let Err(e) = notified {
            warn!("Logout notification failed: {}", e);
        }

        self.client.session().clear();
        info!("Logged out");
    }

    #[instrument(skip(self))]
    pub async fn forgot_password(&self, email: &str) -> Result<Option<String>, AuthError> {
        let email = validate_email(email)?;
        self.post_for_message("/auth/forgot-password", &json!({ "email": email }))
            .await
    }

    #[instrument(skip_all)]
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<Option<String>, AuthError> {
        require(token, "Reset token")?;
        validate_new_password(new_password)?;

        let request = ResetPasswordRequest {
            token: token.trim().to_string(),
            new_password: new_password.to_string(),
        };
        self.post_for_message("/auth/reset-password", &request).await
    }

    #[instrument(skip_all)]
    pub async fn change_password(
        &self,
        current_password: &str,
        new_password: &str,
    ) -> Result<Option<String>, AuthError> {
        if current_password.is_empty() {
            return Err(AuthError::Validation("Current password is required".to_string()));
        }
        validate_new_password(new_password)?;
        if new_password == current_password {
            return Err(AuthError::Validation(
                "New password must be different from the current one".to_string(),
            ));
        }

        let request = ChangePasswordRequest {
            current_password: current_password.to_string(),
            new_password: new_password.to_string(),
        };
        self.post_for_message("/auth/change-password", &request).await
    }

    /// Asks the backend who the stored token belongs to and refreshes the
    /// cached profile with the answer.
    #[instrument(skip(self))]
    pub async fn verify(&self) -> Result<User, AuthError> {
        let payload: Value = self.client.get("/auth/verify").await?;
        let data: Value = unwrap_data(payload).map_err(ClientError::from)?;

        let user = match data.get("user") {
            Some(user) => serde_json::from_value::<User>(user.clone()),
            None => serde_json::from_value::<User>(data),
        }
        .map_err(ClientError::from)?;

        self.client.session().store_user(&user)?;
        debug!("Verified session for user {}", user.id);
        Ok(user)
    }

    pub fn current_user(&self) -> Option<User> {
        self.client.session().user()
    }

    pub fn is_authenticated(&self) -> bool {
        self.client.session().is_authenticated()
    }

    /// Decoded from the stored token only; no request is made.
    pub fn session_status(&self) -> SessionStatus {
        let session = self.client.session();
        session_status(session.access_token().as_deref(), session.user().as_ref())
    }

    fn store_credentials(&self, auth: &AuthPayload) -> Result<(), AuthError> {
        let access_token = auth
            .access_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                ClientError::Decode("Authentication response did not include an access token".to_string())
            })?;

        let session = self.client.session();
        session.store_tokens(access_token, auth.refresh_token.as_deref())?;
        if let Some(user) = &auth.user {
            session.store_user(user)?;
        }
        Ok(())
    }

    async fn post_for_message<B>(&self, path: &str, body: &B) -> Result<Option<String>, AuthError>
    where
        B: Serialize + ?Sized,
    {
        let payload: Value = self.client.post(path, body).await?;
        let envelope: Option<ApiEnvelope<Value>> = serde_json::from_value(payload).ok();
        Ok(envelope.and_then(|e| e.message))
    }
}
