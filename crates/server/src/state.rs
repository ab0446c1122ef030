use crate::{
    ai::CheckpointGenerator, config::Config, db::Database, rooms::RoomRegistry,
    storage::FileStorage,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Config,
    pub rooms: Arc<RoomRegistry>,
    pub storage: FileStorage,
    pub ai: Arc<CheckpointGenerator>,
}

impl AppState {
    pub fn new(db: Database, config: Config) -> Self {
        let storage = FileStorage::new(&config.storage.data_dir);
        let ai = Arc::new(CheckpointGenerator::new(config.ai.clone()));

        Self {
            db,
            config,
            rooms: Arc::new(RoomRegistry::new()),
            storage,
            ai,
        }
    }
}
