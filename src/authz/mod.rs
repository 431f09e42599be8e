//! Authorization decisions.
//!
//! [`policy`] holds the pure checks over session claims; [`guard`] refreshes
//! the claims from the store and runs a [`Policy`] for a request.

pub mod bootstrap;
pub mod guard;
pub mod policy;

pub use bootstrap::{BootstrapState, Standing};
pub use guard::authorize;
pub use policy::{
    forbid_self_action, AccountStatus, Denial, Gate, Grant, Identity, OwnerAccess, Policy,
};
