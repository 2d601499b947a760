//! ocidist CLI - inspect, list and copy OCI images and manage SOCI bundles.

pub mod commands;
pub mod output;
