//! Shared domain types for the fair-ordering bundler.
//!
//! Every other crate in the workspace speaks in terms of these types: swap
//! intents and their lifecycle, closed bundles, fair-ordering proofs, the
//! collaborator payloads for quoting and delivery, and the events broadcast
//! between services.

pub mod api;
pub mod bundle;
pub mod common;
pub mod delivery;
pub mod events;
pub mod intent;
pub mod proof;
pub mod quote;
pub mod validation;

pub use api::*;
pub use bundle::*;
pub use common::*;
pub use delivery::*;
pub use events::*;
pub use intent::*;
pub use proof::*;
pub use quote::*;
pub use validation::*;
