//! Phase implementations

pub mod build;
pub mod document;
pub mod patch;
pub mod plan;
pub mod review;
pub mod ship;
pub mod test;

pub(crate) mod entry;
