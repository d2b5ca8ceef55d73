//! relay — a dispatch-kernel framework for service-oriented applications.
//!
//! This facade crate re-exports the relay sub-crates through a single
//! dependency with feature flags. Pull the whole surface in with:
//!
//! ```ignore
//! use relay::prelude::*;
//! ```
//!
//! # Feature flags
//!
//! | Feature       | Default | Crate                  |
//! |---------------|---------|-------------------------|
//! | `cache`       | **yes** | `relay-cache`           |
//! | `rate-limit`  | **yes** | `relay-rate-limit`      |
//! | `observability` | no   | `relay-observability`   |
//! | `utils`       | no      | `relay-utils`           |
//! | `ws`          | no      | `relay-core/ws`         |
//! | `full`        | no      | All of the above        |

// Re-exported as a public module so generated code can address it as
// `relay::relay_core` — `relay_core_path()` in relay-macros resolves to
// this path whenever the caller depends on the facade crate.
pub extern crate relay_core;
pub extern crate relay_macros;

pub use relay_core::*;

#[cfg(feature = "cache")]
pub use relay_cache;

#[cfg(feature = "rate-limit")]
pub use relay_rate_limit;

#[cfg(feature = "observability")]
pub use relay_observability;

#[cfg(feature = "utils")]
pub use relay_utils;

/// Attribute and derive macros: `#[relay::service]`, `#[relay::slot]`,
/// `#[derive(relay::SlotRequest)]`.
pub use relay_macros::{service, slot, SlotRequest};

/// Unified prelude — `use relay::prelude::*` pulls in the entity, gateway,
/// router, service, and connector surfaces plus the macros above.
pub mod prelude {
    pub use relay_core::prelude::*;
    pub use relay_macros::{service, slot, SlotRequest};

    #[cfg(feature = "cache")]
    pub use relay_cache::{CacheStore, TtlCache};

    #[cfg(feature = "rate-limit")]
    pub use relay_rate_limit::{InMemoryRateLimiter, RateLimiter};
}
