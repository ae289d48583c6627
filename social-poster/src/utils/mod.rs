pub mod authorize_url;
pub mod clock;
pub mod pkce;

pub use authorize_url::AuthorizationRequest;
pub use clock::{Clock, SystemClock};
pub use pkce::{generate_code_challenge, generate_code_verifier, generate_state, CodeVerifier};
