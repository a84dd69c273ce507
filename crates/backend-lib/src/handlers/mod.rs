//! HTTP handlers for the REST boundary.
pub mod meeting;
