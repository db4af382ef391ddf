use std::sync::Arc;

use time::OffsetDateTime;

use foursight_storage::ResultStore;

use crate::clock::IdMinter;
use crate::connection::Connection;

/// What a handler runs against: the environment connection, the result
/// history, and the process-wide identity source.
#[derive(Clone)]
pub struct RunContext {
    connection: Arc<dyn Connection>,
    results: ResultStore,
    ids: Arc<IdMinter>,
}

impl RunContext {
    pub fn new(connection: Arc<dyn Connection>, results: ResultStore, ids: Arc<IdMinter>) -> Self {
        RunContext {
            connection,
            results,
            ids,
        }
    }

    pub fn connection(&self) -> &dyn Connection {
        self.connection.as_ref()
    }

    pub fn results(&self) -> &ResultStore {
        &self.results
    }

    pub fn ids(&self) -> &IdMinter {
        &self.ids
    }

    /// The current time according to the run's clock.
    pub fn now(&self) -> OffsetDateTime {
        self.ids.now()
    }
}
