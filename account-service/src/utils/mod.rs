pub mod mime;
pub mod secret;
pub mod tokens;

pub use secret::{hash_secret, verify_secret, Secret, SecretHash};
pub use tokens::{bearer_from_header, generate_code, generate_token};
