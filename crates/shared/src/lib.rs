//! Types shared between the view core and whatever renders it.

pub mod domain;
pub mod error;
pub mod protocol;
