//! # skiff-cli
//!
//! Command-line helper for containers managed by Skiff.
//!
//! Intended for the shutdown path of a test run, or for cleaning up by hand:
//! - `skiff purge` removes orphans left by crashed runs
//! - `skiff rm` removes explicit containers, tolerating auto-remove races
//! - `skiff ps` lists managed containers

#![warn(missing_docs)]

pub mod cli;
