//! One module per storage obligation. Each entry point returns
//! `Err(description)` on the first violation it finds.

pub mod s01_read_after_write;
pub mod s02_overwrite;
pub mod s03_prefix_listing;
pub mod s04_pagination;
pub mod s05_empty_objects;
pub mod s06_result_layout;
pub mod s07_lexicographic_order;
pub mod s08_concurrent_writes;
