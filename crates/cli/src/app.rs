//! Wiring shared by every subcommand: buckets on disk, the registry and the
//! runner for one environment.

use std::path::PathBuf;
use std::sync::Arc;

use foursight_checks::{register_builtin, CloudClients};
use foursight_core::{
    BucketNames, HandlerKind, IdMinter, ManifestConnectionFactory, Registry, ResultStore, Runner,
    Scheduler,
};
use foursight_storage::{FsObjectStore, ObjectStore};

use crate::config::FoursightConfig;

pub struct App {
    pub config: FoursightConfig,
    pub buckets: BucketNames,
    pub registry: Arc<Registry>,
}

impl App {
    pub fn new(config: FoursightConfig) -> Result<Self, String> {
        let buckets = BucketNames::new(config.foursight.bucket_prefix.clone())
            .with_region(config.foursight.region.clone());
        let mut registry = Registry::new();
        register_builtin(&mut registry, CloudClients::search_only())
            .map_err(|e| format!("could not register checks: {e}"))?;
        Ok(App {
            config,
            buckets,
            registry: Arc::new(registry),
        })
    }

    pub fn env(&self) -> &str {
        &self.config.foursight.env
    }

    fn bucket_dir(&self, bucket: &str) -> PathBuf {
        self.config.storage.root.join(bucket)
    }

    /// The bucket holding environment manifests and portal keys.
    pub fn envs_store(&self) -> Arc<dyn ObjectStore> {
        Arc::new(FsObjectStore::new(self.bucket_dir(&self.buckets.envs())))
    }

    /// Result history for the configured environment and stage. Keys are
    /// `<name>/<uuid>.json` at the bucket root.
    pub fn results(&self) -> ResultStore {
        let bucket = self
            .buckets
            .results(self.config.foursight.stage, self.env());
        ResultStore::new(Arc::new(FsObjectStore::new(self.bucket_dir(&bucket))), "")
    }

    /// Whether `name` is a registered action. Unregistered names are read
    /// as check history.
    pub fn is_action(&self, name: &str) -> bool {
        matches!(
            self.registry.get(name).map(|r| r.kind()),
            Ok(HandlerKind::Action)
        )
    }

    pub fn runner(&self) -> Runner {
        let worker = &self.config.worker;
        let scheduler = Scheduler::in_memory().with_unit_ttl(worker.unit_ttl());
        let connections = ManifestConnectionFactory::new(self.envs_store());
        Runner::new(
            Arc::clone(&self.registry),
            scheduler,
            Arc::new(connections),
            self.results(),
            Arc::new(IdMinter::system()),
            self.env(),
        )
        .with_config(worker.runner_config())
    }
}
