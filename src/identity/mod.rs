//! Identity resolution: ephemeral container ids to stable node names.
//!
//! Raw proxy logs name the next hop by pod UID. Those UIDs change on every
//! restart, so they are translated through a membership snapshot before a
//! hop is recorded.

mod resolver;
mod source;

use thiserror::Error;

use crate::ids::ContainerId;

pub use resolver::{IdentityResolver, MembershipSnapshot, PodHandle};
pub use source::{
    parse_rows, KubectlMembership, MembershipRow, MembershipSource, PodPhase, StaticMembership,
};

#[derive(Error, Debug)]
pub enum IdentityError {
    /// Not in the current snapshot. Callers drop the event.
    #[error("Unknown identity: {0}")]
    UnknownIdentity(ContainerId),

    #[error("Membership source unavailable: {0}")]
    SourceUnavailable(String),
}
