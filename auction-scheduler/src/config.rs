//! The data shapes loaded from TOML (§3, "Configuration (expanded)").
//!
//! Parsing itself (file + environment-variable layering via the `config`
//! crate) lives in `auction-ctl`, which is where the CLI's configuration
//! concerns belong; this module only owns the shape every layer
//! deserializes into, since the scheduler and coordinator are what actually
//! consume it.

use std::collections::HashMap;

use auction_shared::{SessionId, TaskId};
use serde::Deserialize;
use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("task {id} has unknown type {type_name:?}")]
    UnknownTaskType { id: TaskId, type_name: String },

    #[error("task {0} is defined more than once")]
    DuplicateTaskId(TaskId),

    #[error("the start-dependency graph contains a cycle")]
    CyclicScheduleGraph,
}

fn default_max_wait_time_secs() -> u64 {
    10
}

fn default_session_id() -> SessionId {
    1
}

fn default_pre_start_grace_secs() -> u64 {
    5
}

fn default_bind_addr() -> String {
    "127.0.0.1:7878".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoordinatorConfig {
    pub max_clients: usize,
    #[serde(default = "default_max_wait_time_secs")]
    pub max_wait_time_secs: u64,
    #[serde(default = "default_session_id")]
    pub session_id: SessionId,
    #[serde(default = "default_pre_start_grace_secs")]
    pub pre_start_grace_secs: u64,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    pub id: TaskId,
    #[serde(rename = "type")]
    pub task_type: String,
    #[serde(default)]
    pub start_deps: Vec<TaskId>,
    #[serde(default)]
    pub end_deps: Vec<TaskId>,
    #[serde(default)]
    pub params: HashMap<String, String>,
}

/// The full deserialized configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfig {
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub tasks: Vec<TaskConfig>,
}

impl RawConfig {
    /// Checks for duplicate task ids. Unknown-type and cycle checks happen
    /// once the coordinator has a task-type registry and a built
    /// [`crate::scheduler::Scheduler`] to consult, respectively.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut seen = std::collections::HashSet::new();
        for task in &self.tasks {
            if !seen.insert(task.id) {
                return Err(ConfigError::DuplicateTaskId(task.id));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_documented_shape() {
        let toml = r#"
            [coordinator]
            max_clients = 1
            max_wait_time_secs = 10
            session_id = 1
            pre_start_grace_secs = 5

            [[tasks]]
            id = 1
            type = "ascending"
            [tasks.params]
            item = "vintage_lamp"

            [[tasks]]
            id = 2
            type = "ascending"
            start_deps = [1]
            [tasks.params]
            item = "desk"
        "#;

        let config: RawConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.coordinator.max_clients, 1);
        assert_eq!(config.coordinator.session_id, 1);
        assert_eq!(config.tasks.len(), 2);
        assert_eq!(config.tasks[1].start_deps, vec![1]);
        assert_eq!(config.tasks[0].params.get("item"), Some(&"vintage_lamp".to_string()));
        config.validate().unwrap();
    }

    #[test]
    fn duplicate_task_ids_are_rejected() {
        let toml = r#"
            [coordinator]
            max_clients = 1

            [[tasks]]
            id = 1
            type = "ascending"

            [[tasks]]
            id = 1
            type = "ascending"
        "#;

        let config: RawConfig = toml::from_str(toml).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::DuplicateTaskId(1))));
    }

    #[test]
    fn coordinator_defaults_fill_in_when_omitted() {
        let toml = r#"
            [coordinator]
            max_clients = 2
        "#;
        let config: RawConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.coordinator.max_wait_time_secs, 10);
        assert_eq!(config.coordinator.session_id, 1);
        assert_eq!(config.coordinator.pre_start_grace_secs, 5);
        assert_eq!(config.coordinator.bind_addr, "127.0.0.1:7878");
    }
}
