mod auth;
mod state;

pub use auth::TokenStore;
pub use auth::token_from_response;
pub use state::CacheSnapshot;
pub use state::StateCache;
