//! Services layer for the account core.
//!
//! Verification codes, permission resolution, token issuance and
//! notification delivery, plus the collaborator traits they run on.

pub mod cache;
pub mod error;
pub mod memory_store;
pub mod metrics;
pub mod notifications;
pub mod rbac;
pub mod scope;
pub mod store;
pub mod tokens;
pub mod verification;

pub use cache::{CacheStore, MemoryCache, RedisCache, SecureCache};
pub use error::{AccountError, ParamError};
pub use memory_store::MemoryStore;
pub use rbac::RbacService;
pub use scope::{ScopeRegistry, ScopeResolver, StaticScopeResolver};
pub use store::AccountStore;
pub use tokens::TokenIssuer;
pub use verification::{matches_tester_pattern, CodePolicy, VerificationEngine};
