pub mod auth_traits;
pub mod repository_traits;

pub use auth_traits::{AuthorizationCodeProvider, TokenExchange};
pub use repository_traits::CredentialStore;
