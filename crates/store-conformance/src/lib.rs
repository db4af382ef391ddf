//! foursight object store conformance suite (S1-S8).
//!
//! Provides the `object_store_conformance_tests!` macro, which generates one
//! test per storage obligation for any [`ObjectStore`] expression. The result
//! history layer assumes exactly these behaviours of whatever bucket sits
//! beneath it.
//!
//! [`ObjectStore`]: foursight_storage::ObjectStore

pub mod fixtures;
pub mod obligations;
pub mod suite;
