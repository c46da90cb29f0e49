//! `coderoom_utils` is a library containing general utilities for the coderoom project.
//!
//! It holds the pieces shared by every coderoom crate:
//! - Default tunables and environment variable names
//! - Typed environment variable readers with default fallback
//! - The injectable clock used for recency bookkeeping and eviction timing

#![warn(missing_docs)]

mod clock;
mod defaults;
mod env;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use clock::*;
pub use defaults::*;
pub use env::*;
