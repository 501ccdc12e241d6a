//! Domain types and text handling shared by storage and search

pub mod chunker;
pub mod config;
pub mod normalize;
pub mod note;
pub mod paths;
