use ascore_shared::Tristate;

/// A client's identity, as established by the caller before it ever reaches
/// this core. Strings are owned copies rather than borrows: the source
/// contract requires the caller's memory to outlive the client record, which
/// is not expressible in safe Rust without `unsafe` lifetime games, so the
/// registry clones these small strings once at registration time instead.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClientIdentity {
    pub user: String,
    pub host: String,
    pub method: String,
    pub authority: String,
    pub is_tls: Tristate,
    pub access_level: u32,
}

impl ClientIdentity {
    /// The legacy two-field overload (`user`, `host`). Method and authority
    /// default to the empty string, which — per the open question this is
    /// grounded on — never matches a non-empty METHOD/AUTHORITY clause.
    pub fn legacy(user: impl Into<String>, host: impl Into<String>, access_level: u32) -> Self {
        Self {
            user: user.into(),
            host: host.into(),
            method: String::new(),
            authority: String::new(),
            is_tls: Tristate::Unset,
            access_level,
        }
    }

    /// The extended overload carrying method, authority, and a TLS flag.
    #[allow(clippy::too_many_arguments)]
    pub fn extended(
        user: impl Into<String>,
        host: impl Into<String>,
        method: impl Into<String>,
        authority: impl Into<String>,
        is_tls: Tristate,
        access_level: u32,
    ) -> Self {
        Self {
            user: user.into(),
            host: host.into(),
            method: method.into(),
            authority: authority.into(),
            is_tls,
            access_level,
        }
    }
}
