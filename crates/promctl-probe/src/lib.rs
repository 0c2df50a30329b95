//! promctl-probe — managed-server identity probe and readiness tracking.
//!
//! ```text
//! ReadinessTracker
//!   ├── IdentityProbe (trait)
//!   │   └── HttpIdentityProbe: GET /api/v1/status/buildinfo → BuildInfo
//!   └── ReadinessLatch: false until the first successful probe, then true forever
//! ```
//!
//! An unreachable server is an absent identity, never an error. Every probe
//! runs under a bounded timeout; expiry counts as unreachable.

pub mod identity;
pub mod readiness;

pub use identity::{BuildInfo, HttpIdentityProbe, IdentityProbe, parse_build_info};
pub use readiness::{ReadinessLatch, ReadinessTracker};
