//! Tally Common Types
//!
//! Shared types for the tally ledger: account identifiers, exact decimal
//! amount handling, and the error taxonomy.

pub mod identifiers;
pub mod monetary;
pub mod error;

pub use identifiers::*;
pub use monetary::*;
pub use error::*;
