pub mod common;
pub mod config;
pub mod credential;
pub mod handlers;
pub mod mappers;
pub mod server;
pub mod upstream;
pub mod usage;

pub use config::GatewayConfig;
pub use credential::pool::CredentialPool;
pub use usage::UsageStats;

#[cfg(test)]
pub mod tests;
