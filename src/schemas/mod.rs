//! Schemas for the Guru connector
//!
//! `GuruCard` is the wire shape received from the Guru API; `Document`,
//! `Section` and `Batch` are the canonical output handed downstream.

pub mod document;
pub mod guru_card;

pub use document::*;
pub use guru_card::*;
