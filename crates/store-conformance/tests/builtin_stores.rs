//! Run the conformance suite against both built-in backends.

mod memory {
    foursight_store_conformance::object_store_conformance_tests!(
        foursight_storage::MemoryObjectStore::new()
    );
}

mod filesystem {
    foursight_store_conformance::object_store_conformance_tests!(
        foursight_storage::FsObjectStore::new(tempfile::tempdir().unwrap().keep())
    );
}
