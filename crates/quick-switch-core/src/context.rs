use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{ErrorCode, ModelError};
use crate::macros::{self, MacroContext};
use crate::model::Model;
use crate::store::{ConfigStore, Loaded};
use crate::{
    AddProjectParams, AddWorkspaceParams, CommandResult, ListProjectsParams, NameParams,
    ProjectIndexParams, ProjectsResult, Request, Response, SetStatusFormatParams, StatusDisplay,
    StatusParams, WorkspaceSummary, WorkspacesResult, COMMAND_SWITCH_PROJECT,
    METHOD_ADD_PROJECT, METHOD_ADD_WORKSPACE, METHOD_LIST_PROJECTS, METHOD_LIST_WORKSPACES,
    METHOD_MOVE_PROJECT_UP, METHOD_PING, METHOD_RELOAD, METHOD_REMOVE_PROJECT,
    METHOD_REMOVE_WORKSPACE, METHOD_SET_STATUS_FORMAT, METHOD_SHUTDOWN, METHOD_STATUS,
    METHOD_SWITCH_WORKSPACE,
};

pub const STATUS_ICON: &str = "⇄";
pub const ERROR_ICON: &str = "✖";
pub const DEFAULT_TOOLTIP: &str = "Project: <project>\nWorkspace: <workspace>";
pub const ERROR_TOOLTIP: &str = "Loading Error. Click to retry.";

/// Everything one session owns: the model, its backing store and the
/// state of the status display.
#[derive(Debug)]
pub struct AppContext {
    model: Model,
    store: ConfigStore,
    load_error: Option<String>,
    open_project: Option<String>,
    pending_saves: Vec<JoinHandle<()>>,
}

impl AppContext {
    pub fn new(store: ConfigStore) -> Self {
        Self {
            model: Model::default(),
            store,
            load_error: None,
            open_project: None,
            pending_saves: Vec::new(),
        }
    }

    /// Builds a context and loads the store once. Never fails; a broken
    /// config leaves defaults in place.
    pub fn load(store: ConfigStore) -> Self {
        let mut context = Self::new(store);
        context.reload();
        context
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    /// Re-reads the config file and overlays it on the model. Returns
    /// false while the status display should show the error indicator.
    pub fn reload(&mut self) -> bool {
        // An in-flight save would otherwise be read back stale.
        self.flush();
        match self.store.load() {
            Ok(Loaded::Absent) => {
                debug!(
                    "no config at {}, using defaults",
                    self.store.path().display()
                );
                self.model = Model::default();
                self.load_error = None;
            }
            Ok(Loaded::Document(doc)) => {
                let schema = doc.schema();
                self.model.apply(doc.into_latest());
                self.load_error = None;
                debug!(
                    "loaded schema {schema} config from {}",
                    self.store.path().display()
                );
            }
            Err(err) if err.is_persistent() => {
                warn!("{err}");
                self.load_error = Some(err.to_string());
            }
            Err(err) => {
                warn!("{err}; resetting to defaults");
                self.model = Model::default();
                self.load_error = None;
            }
        }
        self.load_error.is_none()
    }

    /// Starts a background save of the current model without waiting for
    /// earlier ones; the store drops saves a newer one has overtaken.
    fn persist(&mut self) {
        self.pending_saves.retain(|handle| !handle.is_finished());
        self.pending_saves
            .push(self.store.save(self.model.to_document()));
    }

    /// Waits for every background save started so far.
    pub fn flush(&mut self) {
        for handle in self.pending_saves.drain(..) {
            if handle.join().is_err() {
                warn!("config save thread panicked");
            }
        }
    }

    fn note_open_project(&mut self, project: Option<&str>) {
        if let Some(project) = project.filter(|path| !path.is_empty()) {
            self.open_project = Some(project.to_string());
        }
    }

    pub fn add_project(&mut self, path: Option<&str>, force: bool) -> Result<(), ModelError> {
        self.note_open_project(path);
        self.model.add_project(path, force)?;
        info!(
            "added project {} to workspace {}",
            path.unwrap_or_default(),
            self.model.current_workspace()
        );
        self.persist();
        Ok(())
    }

    pub fn remove_project(&mut self, workspace: &str, index: usize) -> Option<String> {
        let removed = self.model.remove_project(workspace, index);
        if let Some(path) = &removed {
            info!("removed project {path} from workspace {workspace}");
        }
        self.persist();
        removed
    }

    pub fn move_project_up(&mut self, workspace: &str, index: usize) -> bool {
        let moved = self.model.move_project_up(workspace, index);
        self.persist();
        moved
    }

    pub fn add_workspace(&mut self, name: &str, replace: bool) -> Result<(), ModelError> {
        self.model.add_workspace(name, replace)?;
        info!("created workspace {name}");
        self.persist();
        Ok(())
    }

    pub fn remove_workspace(&mut self, name: &str) -> Option<Vec<String>> {
        let removed = self.model.remove_workspace(name);
        if removed.is_some() {
            info!("removed workspace {name}");
        }
        self.persist();
        removed
    }

    pub fn switch_workspace(&mut self, name: &str) {
        self.model.switch_workspace(name);
        info!("switched to workspace {name}");
        self.persist();
    }

    pub fn set_status_format(&mut self, format: &str) {
        self.model.set_status_text(format);
        self.persist();
    }

    pub fn projects(&self, workspace: Option<&str>) -> ProjectsResult {
        let workspace = workspace.unwrap_or(self.model.current_workspace());
        ProjectsResult {
            workspace: workspace.to_string(),
            projects: self.model.list_projects(workspace).to_vec(),
        }
    }

    pub fn workspaces(&mut self) -> WorkspacesResult {
        self.model.materialize_default();
        WorkspacesResult {
            current: self.model.current_workspace().to_string(),
            workspaces: self
                .model
                .workspaces()
                .iter()
                .map(|(name, projects)| WorkspaceSummary {
                    name: name.clone(),
                    projects: projects.len(),
                })
                .collect(),
            status_text: self.model.status_text().to_string(),
        }
    }

    pub fn status_display(&self, project: Option<&str>) -> StatusDisplay {
        if self.load_error.is_some() {
            return StatusDisplay {
                text: ERROR_ICON.to_string(),
                tooltip: ERROR_TOOLTIP.to_string(),
                command: METHOD_RELOAD.to_string(),
                error: true,
            };
        }

        let context = MacroContext {
            project: project.or(self.open_project.as_deref()),
            workspace: Some(self.model.current_workspace()),
        };
        let label = macros::expand(self.model.status_text(), &context);
        let text = if label.is_empty() {
            STATUS_ICON.to_string()
        } else {
            format!("{STATUS_ICON} {label}")
        };
        StatusDisplay {
            text,
            tooltip: macros::expand(DEFAULT_TOOLTIP, &context),
            command: COMMAND_SWITCH_PROJECT.to_string(),
            error: false,
        }
    }

    fn command_result(&self, changed: bool) -> CommandResult {
        CommandResult {
            changed,
            display: self.status_display(None),
        }
    }

    /// Runs one wire request. The flag asks the caller to end the session.
    pub fn handle_request(&mut self, request: &Request) -> (Response, bool) {
        let id = request.id;
        let response = match request.method.as_str() {
            METHOD_PING => Response::ok(
                id,
                json!({
                    "pong": true,
                    "daemon": "quick-switchd",
                    "version": env!("CARGO_PKG_VERSION")
                }),
            ),
            METHOD_SHUTDOWN => {
                self.flush();
                return (Response::ok(id, json!({"stopping": true})), true);
            }
            METHOD_RELOAD => {
                self.reload();
                reply(id, Ok(self.status_display(None)))
            }
            METHOD_STATUS => match parse_params_or_default::<StatusParams>(&request.params) {
                Ok(params) => {
                    self.note_open_project(params.project.as_deref());
                    reply(id, Ok(self.status_display(params.project.as_deref())))
                }
                Err(response) => response.with_id(id),
            },
            METHOD_LIST_PROJECTS => {
                match parse_params_or_default::<ListProjectsParams>(&request.params) {
                    Ok(params) => reply(id, Ok(self.projects(params.workspace.as_deref()))),
                    Err(response) => response.with_id(id),
                }
            }
            METHOD_ADD_PROJECT => match parse_params_or_default::<AddProjectParams>(&request.params)
            {
                Ok(params) => {
                    let result = self
                        .add_project(params.path.as_deref(), params.force)
                        .map(|()| self.command_result(true));
                    reply(id, result)
                }
                Err(response) => response.with_id(id),
            },
            METHOD_REMOVE_PROJECT => match parse_params::<ProjectIndexParams>(&request.params) {
                Ok(params) => {
                    let removed = self.remove_project(&params.workspace, params.index);
                    reply(id, Ok(self.command_result(removed.is_some())))
                }
                Err(response) => response.with_id(id),
            },
            METHOD_MOVE_PROJECT_UP => match parse_params::<ProjectIndexParams>(&request.params) {
                Ok(params) => {
                    let moved = self.move_project_up(&params.workspace, params.index);
                    reply(id, Ok(self.command_result(moved)))
                }
                Err(response) => response.with_id(id),
            },
            METHOD_LIST_WORKSPACES => reply(id, Ok(self.workspaces())),
            METHOD_ADD_WORKSPACE => match parse_params::<AddWorkspaceParams>(&request.params) {
                Ok(params) => {
                    let result = self
                        .add_workspace(&params.name, params.replace)
                        .map(|()| self.command_result(true));
                    reply(id, result)
                }
                Err(response) => response.with_id(id),
            },
            METHOD_REMOVE_WORKSPACE => match parse_params::<NameParams>(&request.params) {
                Ok(params) => {
                    let removed = self.remove_workspace(&params.name);
                    reply(id, Ok(self.command_result(removed.is_some())))
                }
                Err(response) => response.with_id(id),
            },
            METHOD_SWITCH_WORKSPACE => match parse_params::<NameParams>(&request.params) {
                Ok(params) => {
                    self.switch_workspace(&params.name);
                    reply(id, Ok(self.command_result(true)))
                }
                Err(response) => response.with_id(id),
            },
            METHOD_SET_STATUS_FORMAT => {
                match parse_params::<SetStatusFormatParams>(&request.params) {
                    Ok(params) => {
                        self.set_status_format(&params.format);
                        reply(id, Ok(self.command_result(true)))
                    }
                    Err(response) => response.with_id(id),
                }
            }
            method => Response::err_with_code(
                id,
                ErrorCode::UnknownMethod,
                format!("unknown method: {method}"),
            ),
        };
        (response, false)
    }
}

impl Drop for AppContext {
    fn drop(&mut self) {
        self.flush();
    }
}

impl Response {
    fn with_id(mut self, id: u64) -> Self {
        self.id = id;
        self
    }
}

fn reply<T: Serialize>(id: u64, result: Result<T, ModelError>) -> Response {
    match result {
        Ok(value) => match serde_json::to_value(value) {
            Ok(value) => Response::ok(id, value),
            Err(err) => Response::err(id, format!("failed to serialize result: {err}")),
        },
        Err(err) => Response::err_with_code(id, err.code(), err.to_string()),
    }
}

fn parse_params<T: DeserializeOwned>(params: &Value) -> Result<T, Response> {
    serde_json::from_value(params.clone()).map_err(|err| {
        Response::err_with_code(
            0,
            ErrorCode::InvalidParams,
            format!("invalid request params: {err}"),
        )
    })
}

fn parse_params_or_default<T: DeserializeOwned + Default>(params: &Value) -> Result<T, Response> {
    if params.is_null() {
        return Ok(T::default());
    }
    parse_params(params)
}
