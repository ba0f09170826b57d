//! Entry points of the account core and the request gate they share.

pub mod account;
pub mod gate;
pub mod http;
pub mod request;

pub use account::{delete_account, exchange_code, login_start, logout, profile, update_profile};
pub use gate::{prepare, HandlerOptions, RequestContext};
pub use request::{client_ip, extract_data, RawRequest};
