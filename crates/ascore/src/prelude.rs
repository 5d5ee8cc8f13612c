//! The small set of names most callers need in scope.

pub use crate::{
    dump::dump,
    error::{Error, Result},
    identity::ClientIdentity,
    notify::{ChangeOfAccessRights, ClientCallback},
    registry::{AccessRegistry, ClientHandle, MemberHandle, RegistryConfig},
    trap::{TrapObserver, WriteEvent, WriteToken},
};
