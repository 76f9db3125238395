pub mod claims;
pub mod store;

pub use claims::{decode_claims, Claims, Role};
pub use store::{Session, SessionStore};
