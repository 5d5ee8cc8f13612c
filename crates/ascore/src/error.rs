use ascore_shared::ParsingError;
use snafu::Snafu;

/// The error taxonomy returned by every fallible `AccessRegistry` operation.
///
/// Derived using [`snafu::Snafu`], mirroring the source library's symbolic
/// `S_asLib_*` status codes one variant at a time.
#[derive(Debug, Snafu, PartialEq, Eq)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("failed to convert string to type: {source}"), context(false))]
    Parsing { source: ParsingError },

    #[snafu(display("cannot mutate the policy while clients are attached"))]
    ClientsExist,

    #[snafu(display("reference to undefined user access group `{name}`"))]
    NoUag { name: String },

    #[snafu(display("reference to undefined host access group `{name}`"))]
    NoHag { name: String },

    #[snafu(display("access denied"))]
    NoAccess,

    #[snafu(display("modification not permitted"))]
    NoModify,

    #[snafu(display("bad configuration at {location}: {message}"))]
    BadConfig { location: String, message: String },

    #[snafu(display("calculator failed to compile `{expr}`: {message}"))]
    BadCalc { expr: String, message: String },

    #[snafu(display("duplicate group definition `{name}` (UAG, HAG, and ASG names share one namespace)"))]
    DupAsg { name: String },

    #[snafu(display("duplicate authority `{name}` within one rule body"))]
    DupAuthority { name: String },

    #[snafu(display("duplicate method `{name}` within one rule body"))]
    DupMethod { name: String },

    #[snafu(display("policy load failed: {message}"))]
    InitFailed { message: String },

    #[snafu(display("operation requires the access security subsystem to be active"))]
    NotActive,

    #[snafu(display("handle does not refer to a live member"))]
    BadMember,

    #[snafu(display("handle does not refer to a live client"))]
    BadClient,

    #[snafu(display("handle does not refer to a live access security group"))]
    BadAsg,

    #[snafu(display("allocation failed"))]
    NoMemory,
}

/// A default specialized Result type for ascore.
pub type Result<T, E = Error> = std::result::Result<T, E>;
