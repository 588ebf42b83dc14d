use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::env;
use std::path::PathBuf;

pub mod client;
pub mod context;
pub mod document;
pub mod error;
pub mod macros;
pub mod model;
pub mod refresh;
pub mod store;

pub use context::AppContext;
pub use error::{ErrorCode, LoadError, ModelError};
pub use model::{Model, DEFAULT_WORKSPACE};

pub const METHOD_PING: &str = "ping";
pub const METHOD_SHUTDOWN: &str = "shutdown";
pub const METHOD_RELOAD: &str = "reload";
pub const METHOD_STATUS: &str = "status";
pub const METHOD_LIST_PROJECTS: &str = "list_projects";
pub const METHOD_ADD_PROJECT: &str = "add_project";
pub const METHOD_REMOVE_PROJECT: &str = "remove_project";
pub const METHOD_MOVE_PROJECT_UP: &str = "move_project_up";
pub const METHOD_LIST_WORKSPACES: &str = "list_workspaces";
pub const METHOD_ADD_WORKSPACE: &str = "add_workspace";
pub const METHOD_REMOVE_WORKSPACE: &str = "remove_workspace";
pub const METHOD_SWITCH_WORKSPACE: &str = "switch_workspace";
pub const METHOD_SET_STATUS_FORMAT: &str = "set_status_format";

/// Status display command hint when the config loaded cleanly.
pub const COMMAND_SWITCH_PROJECT: &str = "switch_project";

pub const CONFIG_FILE_NAME: &str = ".quick-switch";
pub const DEFAULT_REFRESH_SECS: u64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
}

impl Response {
    pub fn ok(id: u64, result: Value) -> Self {
        Self {
            id,
            ok: true,
            result: Some(result),
            error: None,
            code: None,
        }
    }

    pub fn err(id: u64, message: impl Into<String>) -> Self {
        Self {
            id,
            ok: false,
            result: None,
            error: Some(message.into()),
            code: None,
        }
    }

    pub fn err_with_code(id: u64, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            ..Self::err(id, message)
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusParams {
    #[serde(default)]
    pub project: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListProjectsParams {
    #[serde(default)]
    pub workspace: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddProjectParams {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectIndexParams {
    pub workspace: String,
    pub index: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddWorkspaceParams {
    pub name: String,
    #[serde(default)]
    pub replace: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NameParams {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetStatusFormatParams {
    pub format: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectsResult {
    pub workspace: String,
    pub projects: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceSummary {
    pub name: String,
    pub projects: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspacesResult {
    pub current: String,
    pub workspaces: Vec<WorkspaceSummary>,
    pub status_text: String,
}

/// What a status bar shows for the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusDisplay {
    pub text: String,
    pub tooltip: String,
    /// Command a click on the status item should run.
    pub command: String,
    pub error: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub changed: bool,
    pub display: StatusDisplay,
}

pub fn default_socket_path() -> PathBuf {
    if let Ok(runtime_dir) = env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime_dir).join("quick-switch.sock");
    }

    default_data_dir().join("quick-switch.sock")
}

pub fn default_data_dir() -> PathBuf {
    if let Some(data_dir) = dirs::data_local_dir() {
        return data_dir.join("quick-switch");
    }

    PathBuf::from(".quick-switch.d")
}

/// Name of the environment variable holding the profile home directory.
pub const fn home_env_var() -> &'static str {
    if cfg!(windows) {
        "USERPROFILE"
    } else {
        "HOME"
    }
}

pub fn profile_home_dir() -> PathBuf {
    if let Some(home) = env::var_os(home_env_var()).filter(|value| !value.is_empty()) {
        return PathBuf::from(home);
    }

    dirs::home_dir().unwrap_or_default()
}

pub fn default_config_path() -> PathBuf {
    profile_home_dir().join(CONFIG_FILE_NAME)
}
