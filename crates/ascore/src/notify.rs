//! Component G: change-of-access-rights notification.
//!
//! Delivery is synchronous with the operation that triggered it and runs on
//! the caller's thread, with the policy lock held — see the concurrency
//! model's ordering guarantees.

use ascore_shared::{AccessRight, TrapMask};

use crate::registry::ClientHandle;

/// A client's access state at the moment a [`ClientCallback`] fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChangeOfAccessRights {
    pub access: AccessRight,
    pub trap_mask: TrapMask,
}

/// Mirrors the original `ASCLIENTCALLBACK(ASCLIENTPVT, asClientStatus)`
/// signature. `Send` so a registry holding one stays `Send` itself.
pub type ClientCallback = Box<dyn FnMut(ClientHandle, ChangeOfAccessRights) + Send>;
