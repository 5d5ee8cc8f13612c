//! ascore — an in-process access security core for control-system runtimes.
//!
//! Hosts load a textual policy (either the classic brace-form syntax or a
//! structured YAML form), bind long-lived *members* to an access security
//! group, attach *clients* (one per connection) to a member, and then ask
//! the registry three questions on the hot path: `check_get`, `check_put`,
//! `check_rpc`. A client's effective access is recomputed whenever the
//! policy is reloaded, a member changes group, a client's identity changes,
//! or an ASG's bound process inputs change — and the client's registered
//! callback fires exactly when that recomputation changes the answer.
//!
//! # Example
//!
//! ```
//! use ascore::prelude::*;
//!
//! let registry = AccessRegistry::new();
//! registry
//!     .initialize(
//!         "ASG(DEFAULT){RULE(0,NONE)} ASG(ro){RULE(0,NONE) RULE(1,READ)}",
//!         &Default::default(),
//!     )
//!     .unwrap();
//! let member = registry.add_member("ro").unwrap();
//! let client = registry
//!     .add_client(member, ClientIdentity::legacy("alice", "localhost", 1))
//!     .unwrap();
//! assert!(registry.check_get(client));
//! assert!(!registry.check_put(client));
//! ```
//!
//! See [`prelude`] for the names most callers need, and each module's docs
//! for the component it implements.

pub mod arena;
pub mod calc;
pub mod dump;
pub mod error;
pub mod evaluator;
pub mod grammar;
pub mod host_match;
pub mod identity;
pub mod metrics;
pub mod model;
pub mod notify;
pub mod prelude;
pub mod registry;
pub mod trap;

pub use error::{Error, Result};
pub use identity::ClientIdentity;
pub use registry::{AccessRegistry, ClientHandle, MemberHandle, RegistryConfig};
