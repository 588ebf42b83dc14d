use anyhow::{bail, Context, Result};
use quick_switch_core::client;
use quick_switch_core::model::validate_workspace_name;
use quick_switch_core::{
    AddProjectParams, AddWorkspaceParams, CommandResult, ErrorCode, ListProjectsParams,
    ModelError, NameParams, ProjectIndexParams, ProjectsResult, Response, SetStatusFormatParams,
    WorkspacesResult, METHOD_ADD_PROJECT, METHOD_ADD_WORKSPACE, METHOD_LIST_PROJECTS,
    METHOD_LIST_WORKSPACES, METHOD_MOVE_PROJECT_UP, METHOD_REMOVE_PROJECT,
    METHOD_REMOVE_WORKSPACE, METHOD_SET_STATUS_FORMAT, METHOD_SWITCH_WORKSPACE,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

const ADD_CURRENT_PROJECT_LABEL: &str = "Add Current Project...";
const ADD_WORKSPACE_LABEL: &str = "Add Workspace...";
const WORKSPACE_NAME_HINT: &str = "Workspace names use lowercase letters, digits and '-' only.";

/// One entry of a picker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickItem {
    pub label: String,
    pub description: String,
}

impl PickItem {
    fn new(label: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            description: description.into(),
        }
    }
}

/// The interactive surface the flows talk to. Dismissing any prompt is
/// reported as `None`/`false`, never as an error.
pub trait Prompter {
    fn pick(&mut self, placeholder: &str, items: &[PickItem]) -> Result<Option<usize>>;
    fn confirm(&mut self, message: &str, action: &str) -> Result<bool>;
    fn input(
        &mut self,
        prompt: &str,
        initial: &str,
        validate: &dyn Fn(&str) -> Result<(), String>,
    ) -> Result<Option<String>>;
    fn notify(&mut self, message: &str);
}

/// Performs one request against the session.
pub trait Backend {
    fn call(&mut self, method: &str, params: Value) -> Result<Response>;
}

pub struct SocketBackend {
    socket_path: PathBuf,
    autostart: bool,
    daemon_args: Vec<String>,
}

impl SocketBackend {
    pub fn new(socket_path: &Path, autostart: bool, daemon_args: Vec<String>) -> Self {
        Self {
            socket_path: socket_path.to_path_buf(),
            autostart,
            daemon_args,
        }
    }
}

impl Backend for SocketBackend {
    fn call(&mut self, method: &str, params: Value) -> Result<Response> {
        client::request_with_autostart(
            &self.socket_path,
            method,
            params,
            self.autostart,
            &self.daemon_args,
        )
    }
}

/// A request the session refused with a machine-readable code.
#[derive(Debug)]
pub struct Rejection {
    pub code: ErrorCode,
    pub message: String,
}

pub fn rpc<P: Serialize, R: DeserializeOwned>(
    backend: &mut dyn Backend,
    method: &str,
    params: &P,
) -> Result<R> {
    client::parse_ok_response(send(backend, method, params)?)
}

/// Like [`rpc`], but hands coded refusals back to the caller instead of
/// failing.
pub fn rpc_checked<P: Serialize, R: DeserializeOwned>(
    backend: &mut dyn Backend,
    method: &str,
    params: &P,
) -> Result<Result<R, Rejection>> {
    let response = send(backend, method, params)?;
    match response.code {
        Some(code) if !response.ok => Ok(Err(Rejection {
            code,
            message: response.error.unwrap_or_default(),
        })),
        _ => client::parse_ok_response(response).map(Ok),
    }
}

fn send<P: Serialize>(backend: &mut dyn Backend, method: &str, params: &P) -> Result<Response> {
    let value = serde_json::to_value(params)
        .with_context(|| format!("failed to serialize {method} params"))?;
    backend.call(method, value)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListMode {
    Remove,
    Reorder,
}

pub struct Flows<'a> {
    backend: &'a mut dyn Backend,
    prompter: &'a mut dyn Prompter,
    open_project: Option<String>,
}

impl<'a> Flows<'a> {
    pub fn new(
        backend: &'a mut dyn Backend,
        prompter: &'a mut dyn Prompter,
        open_project: Option<String>,
    ) -> Self {
        Self {
            backend,
            prompter,
            open_project,
        }
    }

    /// Adds the open folder to the current workspace. Returns the project
    /// picked from the follow-up "Show Projects" list, if any.
    pub fn add_project(&mut self, force: bool) -> Result<Option<String>> {
        let params = AddProjectParams {
            path: self.open_project.clone(),
            force,
        };
        match rpc_checked::<_, CommandResult>(self.backend, METHOD_ADD_PROJECT, &params)? {
            Ok(_) => {
                if self
                    .prompter
                    .confirm("Quick Switch: Project added.", "Show Projects")?
                {
                    return self.switch_project();
                }
                Ok(None)
            }
            Err(rejection) => match rejection.code {
                ErrorCode::NoActiveProject => {
                    self.prompter.notify("Quick Switch: No project opened.");
                    Ok(None)
                }
                ErrorCode::DuplicateProject => {
                    if self
                        .prompter
                        .confirm("Quick Switch: Project already exists.", "Add Anyway")?
                    {
                        return self.add_project(true);
                    }
                    Ok(None)
                }
                _ => bail!("add project failed: {}", rejection.message),
            },
        }
    }

    /// Returns the path of the picked project.
    pub fn switch_project(&mut self) -> Result<Option<String>> {
        let listed: ProjectsResult = rpc(
            self.backend,
            METHOD_LIST_PROJECTS,
            &ListProjectsParams::default(),
        )?;
        let mut items: Vec<PickItem> = listed.projects.iter().map(|p| project_item(p)).collect();
        items.push(PickItem::new(
            ADD_CURRENT_PROJECT_LABEL,
            "Add current project to the list",
        ));

        match self
            .prompter
            .pick("Select a project to switch to...", &items)?
        {
            Some(index) if index < listed.projects.len() => {
                Ok(Some(listed.projects[index].clone()))
            }
            Some(_) => self.add_project(false),
            None => Ok(None),
        }
    }

    pub fn list_projects(&mut self, mode: ListMode) -> Result<Option<String>> {
        let (placeholder, method) = match mode {
            ListMode::Remove => ("Select a project to remove...", METHOD_REMOVE_PROJECT),
            ListMode::Reorder => ("Select a project to move up...", METHOD_MOVE_PROJECT_UP),
        };

        loop {
            let listed: ProjectsResult = rpc(
                self.backend,
                METHOD_LIST_PROJECTS,
                &ListProjectsParams::default(),
            )?;
            if listed.projects.is_empty() {
                if self
                    .prompter
                    .confirm("Quick Switch: No project available.", "Add Current Project")?
                {
                    return self.add_project(false);
                }
                return Ok(None);
            }

            let items: Vec<PickItem> = listed.projects.iter().map(|p| project_item(p)).collect();
            let Some(index) = self.prompter.pick(placeholder, &items)? else {
                return Ok(None);
            };
            let _: CommandResult = rpc(
                self.backend,
                method,
                &ProjectIndexParams {
                    workspace: listed.workspace.clone(),
                    index,
                },
            )?;

            let remaining = match mode {
                ListMode::Remove => listed.projects.len() - 1,
                ListMode::Reorder => listed.projects.len(),
            };
            if remaining == 0 {
                return Ok(None);
            }
        }
    }

    pub fn add_workspace(&mut self, name: Option<String>) -> Result<()> {
        let name = match name {
            Some(name) => match validate_workspace_name(&name) {
                Ok(()) => name,
                Err(ModelError::WorkspaceNameInvalid(_)) => {
                    self.prompter
                        .notify(&format!("Quick Switch: {WORKSPACE_NAME_HINT}"));
                    return Ok(());
                }
                Err(err) => return Err(err.into()),
            },
            None => {
                let validate = |value: &str| {
                    validate_workspace_name(value).map_err(|err| match err {
                        ModelError::WorkspaceNameInvalid(_) => WORKSPACE_NAME_HINT.to_string(),
                        other => other.to_string(),
                    })
                };
                match self.prompter.input("Workspace name", "", &validate)? {
                    Some(name) => name,
                    None => return Ok(()),
                }
            }
        };

        let mut replace = false;
        loop {
            let params = AddWorkspaceParams {
                name: name.clone(),
                replace,
            };
            match rpc_checked::<_, CommandResult>(self.backend, METHOD_ADD_WORKSPACE, &params)? {
                Ok(_) => {
                    self.prompter
                        .notify(&format!("Quick Switch: Workspace {name} created."));
                    return Ok(());
                }
                Err(rejection) if rejection.code == ErrorCode::WorkspaceExists && !replace => {
                    let message = format!("Quick Switch: Workspace {name} already exists.");
                    if !self.prompter.confirm(&message, "Replace")? {
                        return Ok(());
                    }
                    replace = true;
                }
                Err(rejection) => bail!("add workspace failed: {}", rejection.message),
            }
        }
    }

    pub fn switch_workspace(&mut self) -> Result<()> {
        let listed: WorkspacesResult = rpc(self.backend, METHOD_LIST_WORKSPACES, &Value::Null)?;
        let mut items: Vec<PickItem> = listed
            .workspaces
            .iter()
            .map(|workspace| {
                let marker = if workspace.name == listed.current {
                    " (current)"
                } else {
                    ""
                };
                PickItem::new(
                    workspace.name.clone(),
                    format!("{} projects{marker}", workspace.projects),
                )
            })
            .collect();
        items.push(PickItem::new(ADD_WORKSPACE_LABEL, "Create a new workspace"));

        match self
            .prompter
            .pick("Select a workspace to switch to...", &items)?
        {
            Some(index) if index < listed.workspaces.len() => {
                let name = listed.workspaces[index].name.clone();
                let _: CommandResult = rpc(
                    self.backend,
                    METHOD_SWITCH_WORKSPACE,
                    &NameParams { name: name.clone() },
                )?;
                self.prompter
                    .notify(&format!("Quick Switch: Switched to workspace {name}."));
                Ok(())
            }
            Some(_) => self.add_workspace(None),
            None => Ok(()),
        }
    }

    /// Picks a workspace and removes it after confirmation.
    pub fn list_workspaces(&mut self) -> Result<()> {
        let listed: WorkspacesResult = rpc(self.backend, METHOD_LIST_WORKSPACES, &Value::Null)?;
        let items: Vec<PickItem> = listed
            .workspaces
            .iter()
            .map(|workspace| {
                PickItem::new(
                    workspace.name.clone(),
                    format!("{} projects", workspace.projects),
                )
            })
            .collect();

        let Some(index) = self
            .prompter
            .pick("Select a workspace to remove...", &items)?
        else {
            return Ok(());
        };
        let Some(workspace) = listed.workspaces.get(index) else {
            return Ok(());
        };
        let message = format!(
            "Quick Switch: Remove workspace {} and its {} projects?",
            workspace.name, workspace.projects
        );
        if !self.prompter.confirm(&message, "Remove")? {
            return Ok(());
        }
        let _: CommandResult = rpc(
            self.backend,
            METHOD_REMOVE_WORKSPACE,
            &NameParams {
                name: workspace.name.clone(),
            },
        )?;
        Ok(())
    }

    pub fn set_status_format(&mut self, format: Option<String>) -> Result<()> {
        let format = match format {
            Some(format) => format,
            None => {
                let listed: WorkspacesResult =
                    rpc(self.backend, METHOD_LIST_WORKSPACES, &Value::Null)?;
                let accept_any = |_: &str| Ok(());
                match self.prompter.input(
                    "Status format (<project>, <workspace>, <basename:..>, <lower:..>, <upper:..>)",
                    &listed.status_text,
                    &accept_any,
                )? {
                    Some(format) => format,
                    None => return Ok(()),
                }
            }
        };

        let result: CommandResult = rpc(
            self.backend,
            METHOD_SET_STATUS_FORMAT,
            &SetStatusFormatParams { format },
        )?;
        self.prompter
            .notify(&format!("Quick Switch: Status is now \"{}\".", result.display.text));
        Ok(())
    }
}

fn project_item(path: &str) -> PickItem {
    let label = Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string());
    PickItem::new(label, path)
}
