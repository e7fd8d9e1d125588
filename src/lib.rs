//! # Acctrail (account management with audit trails)
//!
//! `acctrail` is the account front end for an external identity provider and an
//! external relational record store. It handles sign-up, sign-in, sign-out,
//! profile editing, and the two append-only audit trails: login history and
//! profile change history.
//!
//! ## Audit contract
//!
//! - **Profile edits:** a submission that changes K fields writes K independent
//!   profile change records, in `first_name`, `last_name`, `phone_number`
//!   order, strictly before the single profile update is issued.
//! - **Sign-in attempts:** every attempt writes exactly one login history row,
//!   success or failure. Failed attempts carry the submitted identifier, not a
//!   verified identity.
//! - **Best effort:** audit writes are at-most-once. A failed audit insert is
//!   logged and dropped; it never blocks the sign-in or the profile save.
//!
//! ## Scoping
//!
//! Every record store call carries an explicit [`store::Caller`]. Rows are
//! readable and insertable only by the identity they describe, and profiles are
//! updatable only by their owner. The store enforces this; the coordinator does
//! not re-check authorization.

pub mod account;
pub mod api;
pub mod audit;
pub mod cli;
pub mod coordinator;
pub mod error;
pub mod identity;
pub mod memory;
pub mod model;
pub mod store;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
