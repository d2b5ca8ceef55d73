//! Ambient helpers shared across the workspace: content hashing, UUID
//! generation, and identifier-style conversion. No specified behavior lives
//! here; it exists so call sites that only need these primitives don't have
//! to depend on the rest of `relay-core`.

pub mod hash;
pub mod ident;
pub mod id;

pub mod prelude {
    pub use crate::hash::{digest_hex, short_fingerprint};
    pub use crate::id::{new_id, parse_id};
    pub use crate::ident::{to_camel_case, to_pascal_case, to_snake_case};
}
