//! Persistence of entity states across restarts
//!
//! The last published state of every entity is written to a JSON file on
//! unload and read back during setup so entities can restore values the
//! vendor only reports once a vehicle is awake.

use crate::entity::EntityState;
use crate::error::Result;
use crate::hub::Hub;
use crate::logging::get_logger;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// On-disk layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistentState {
    /// Last state by entity unique id
    #[serde(default)]
    pub entities: BTreeMap<String, EntityState>,
}

/// JSON file of last entity states
pub struct StateStore {
    file_path: String,
    state: PersistentState,
    logger: crate::logging::StructuredLogger,
}

impl StateStore {
    pub fn new(file_path: &str) -> Self {
        Self {
            file_path: file_path.to_string(),
            state: PersistentState::default(),
            logger: get_logger("persistence"),
        }
    }

    /// Load states from disk; a missing file leaves the store empty
    pub fn load(&mut self) -> Result<()> {
        let path = Path::new(&self.file_path);

        if !path.exists() {
            self.logger.info("No saved entity states found");
            return Ok(());
        }

        let contents = std::fs::read_to_string(path)?;
        self.state = serde_json::from_str(&contents)?;
        self.logger.info(&format!(
            "Loaded {} saved entity states",
            self.state.entities.len()
        ));

        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        let contents = serde_json::to_string_pretty(&self.state)?;
        std::fs::write(&self.file_path, contents)?;
        self.logger.debug("Saved entity states to disk");

        Ok(())
    }

    pub fn get(&self, unique_id: &str) -> Option<&EntityState> {
        self.state.entities.get(unique_id)
    }

    pub fn set(&mut self, unique_id: &str, state: EntityState) {
        self.state.entities.insert(unique_id.to_string(), state);
    }

    pub fn len(&self) -> usize {
        self.state.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.entities.is_empty()
    }

    /// Take every state currently published on the hub
    pub fn capture(&mut self, hub: &Hub) -> usize {
        let states = hub.states();
        let count = states.len();
        self.state.entities.extend(states);
        count
    }
}
