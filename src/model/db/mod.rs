//! DB-compatible (e.g. de/serialisable) types.
//!
//! The types in this module are serialised in an DB-friendly way, e.g.:
//!
//! - IDs are stored in the `_id` field.
//! - Datetimes are serialised in MongoDB's own format.

pub mod choice;
pub use choice::{Choice, NewChoice};

pub mod question;
pub use question::{NewQuestion, Question};
