//! The `object_store_conformance_tests!` macro.
//!
//! Generates one `#[tokio::test]` per storage obligation (S1 through S8)
//! for any expression that evaluates to an `ObjectStore`.
//!
//! # Usage
//!
//! ```rust,ignore
//! use foursight_store_conformance::object_store_conformance_tests;
//!
//! object_store_conformance_tests!(foursight_storage::MemoryObjectStore::new());
//! ```
//!
//! Generated tests are named `conformance_sNN_<description>` and run with
//! `cargo test conformance_`.

/// Generate conformance tests for an object store backend.
///
/// `$store_expr` is evaluated fresh for each test, so every obligation
/// starts from an empty store.
#[macro_export]
macro_rules! object_store_conformance_tests {
    ($store_expr:expr) => {
        fn conformance_store() -> std::sync::Arc<dyn foursight_storage::ObjectStore> {
            std::sync::Arc::new($store_expr)
        }

        #[tokio::test]
        async fn conformance_s01_read_after_write() {
            let store = conformance_store();
            $crate::obligations::s01_read_after_write::test_s01_read_after_write(store.as_ref())
                .await
                .expect("S1: read-after-write conformance failed");
        }

        #[tokio::test]
        async fn conformance_s02_overwrite() {
            let store = conformance_store();
            $crate::obligations::s02_overwrite::test_s02_overwrite(store.as_ref())
                .await
                .expect("S2: overwrite conformance failed");
        }

        #[tokio::test]
        async fn conformance_s03_prefix_listing() {
            let store = conformance_store();
            $crate::obligations::s03_prefix_listing::test_s03_prefix_listing(store.as_ref())
                .await
                .expect("S3: prefix listing conformance failed");
        }

        #[tokio::test]
        async fn conformance_s04_pagination() {
            let store = conformance_store();
            $crate::obligations::s04_pagination::test_s04_pagination(store.as_ref())
                .await
                .expect("S4: pagination conformance failed");
        }

        #[tokio::test]
        async fn conformance_s05_empty_objects() {
            let store = conformance_store();
            $crate::obligations::s05_empty_objects::test_s05_empty_objects(store.as_ref())
                .await
                .expect("S5: empty object conformance failed");
        }

        #[tokio::test]
        async fn conformance_s06_result_layout() {
            $crate::obligations::s06_result_layout::test_s06_result_layout(conformance_store())
                .await
                .expect("S6: result layout conformance failed");
        }

        #[tokio::test]
        async fn conformance_s07_lexicographic_order() {
            $crate::obligations::s07_lexicographic_order::test_s07_lexicographic_order(
                conformance_store(),
            )
            .await
            .expect("S7: lexicographic order conformance failed");
        }

        #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
        async fn conformance_s08_concurrent_writes() {
            $crate::obligations::s08_concurrent_writes::test_s08_concurrent_writes(
                conformance_store(),
            )
            .await
            .expect("S8: concurrent write conformance failed");
        }
    };
}
