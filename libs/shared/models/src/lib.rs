pub mod auth;
pub mod envelope;
pub mod error;
pub mod ids;

pub use envelope::{unwrap_data, ApiEnvelope};
pub use error::{AuthFailureReason, ClientError, ErrorBody};
