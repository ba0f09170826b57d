pub mod client;
pub mod device;
pub mod field_change;
pub mod notification;
pub mod principal;
pub mod role;
pub mod scope;
pub mod token;
pub mod verification_code;

pub use client::OAuthClient;
pub use device::Device;
pub use field_change::FieldChange;
pub use notification::{EmailOutcome, PushNotificationRecord};
pub use principal::Principal;
pub use role::{Permission, Role, RolePermission, UserRole};
pub use scope::{Project, ProjectMembership, ScopeRef};
pub use token::{AccessToken, IssuedTokens, RefreshToken};
pub use verification_code::VerificationCode;
