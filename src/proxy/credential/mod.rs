pub mod pool;
pub mod types;

pub use pool::CredentialPool;
pub use types::{Credential, CredentialSnapshot, Lease};
