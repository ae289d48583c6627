pub mod auth_flow;
pub mod metrics;
pub mod poster;
pub mod provider_client;
pub mod scheduler;
pub mod session_store;

pub use auth_flow::{AuthFlow, CallbackParams};
pub use poster::Poster;
pub use provider_client::{ProviderClient, TokenResponse};
pub use scheduler::{MemoryPostQueue, PostQueue, Scheduler, SweepReport};
pub use session_store::{MemorySessionStore, SessionStore};
