pub mod client;
pub mod pipeline;
pub mod session;
pub mod transport;

pub use client::{ApiClient, ApiClientBuilder, AuthFailureHandler};
pub use pipeline::{BearerAuth, Pipeline, RefreshOnUnauthorized, RequestIdStage, RequestStage, ResponseStage, StageOutcome};
pub use session::{FileSessionStore, MemorySessionStore, Session, SessionStore, StorageKey};
pub use transport::{ApiRequest, ApiResponse, ReqwestTransport, Transport, TransportError};
