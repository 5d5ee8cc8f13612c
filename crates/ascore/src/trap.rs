//! Component H: trap-write dispatch.
//!
//! `before_write`/`after_write` elide all work when the client's trap mask
//! is clear, matching the original contract of returning a null token and
//! doing nothing else.

use ascore_shared::Tristate;

/// A write the registry decided is worth auditing, handed to every
/// registered [`TrapObserver`].
#[derive(Clone, Debug)]
pub struct WriteEvent {
    pub sequence: u64,
    pub user: String,
    pub method: String,
    pub authority: String,
    pub host: String,
    pub is_tls: Tristate,
    pub resource: String,
    pub type_tag: String,
    pub element_count: usize,
    pub data: Vec<u8>,
}

/// Returned by `before_write`, passed back to `after_write` to mark the
/// write as complete. `sequence` is a per-registry monotonic counter, not
/// wall-clock time, so evaluation stays deterministic under test.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WriteToken {
    pub sequence: u64,
}

/// An audit sink. Multiple independent observers (a test probe, a real
/// logger) can be registered at once; none of them can veto the write.
pub trait TrapObserver: Send {
    fn before_write(&mut self, event: &WriteEvent);
    fn after_write(&mut self, token: WriteToken);
}
