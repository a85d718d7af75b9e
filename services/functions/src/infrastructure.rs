// Infrastructure layer modules
pub mod auth_admin;
pub mod config;
pub mod fcm;
pub mod http_client;
pub mod logging;
pub mod profile_repository;
pub mod realtime;

#[cfg(test)]
mod test_server;

// Re-exports
pub use auth_admin::{AuthAdminError, IdentityAdmin, SupabaseAuthAdmin};
pub use config::{SupabaseConfig, SupabaseConfigError};
pub use fcm::{
    AccessTokenError, AccessTokenProvider, FcmConfig, FcmConfigError, FcmPushGateway,
    PushGateway, PushGatewayError, ServiceAccountKey, ServiceAccountTokenProvider,
    TokenCachePolicy,
};
pub use http_client::build_http_client;
pub use logging::init_logging;
pub use profile_repository::{PostgrestProfileRepository, ProfileRepository, ProfileRepositoryError};
pub use realtime::{
    ChangeFeed, RealtimeChannel, RealtimeConfigError, RealtimeError, RealtimeSubscriptionConfig,
};
