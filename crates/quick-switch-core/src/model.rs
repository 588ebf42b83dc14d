use regex::Regex;
use std::sync::OnceLock;

use crate::document::{DocumentV3, WorkspaceCollection};
use crate::error::ModelError;

pub const DEFAULT_WORKSPACE: &str = "default";

/// In-memory workspace/project state of one session.
///
/// Mutations never touch the disk; [`crate::AppContext`] persists after
/// each one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    workspaces: WorkspaceCollection,
    current_workspace: String,
    status_text: String,
}

impl Default for Model {
    fn default() -> Self {
        Self {
            workspaces: WorkspaceCollection::new(),
            current_workspace: DEFAULT_WORKSPACE.to_string(),
            status_text: String::new(),
        }
    }
}

impl Model {
    pub fn workspaces(&self) -> &WorkspaceCollection {
        &self.workspaces
    }

    pub fn current_workspace(&self) -> &str {
        &self.current_workspace
    }

    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    /// Projects of `workspace` in user order. A missing workspace reads as
    /// empty and is not created.
    pub fn list_projects(&self, workspace: &str) -> &[String] {
        self.workspaces
            .get(workspace)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn current_projects(&self) -> &[String] {
        self.list_projects(&self.current_workspace)
    }

    /// Inserts an empty `default` workspace when the collection is empty so
    /// pickers always have something to offer.
    pub fn materialize_default(&mut self) -> bool {
        if !self.workspaces.is_empty() {
            return false;
        }
        self.workspaces
            .insert(DEFAULT_WORKSPACE.to_string(), Vec::new());
        true
    }

    pub fn add_workspace(&mut self, name: &str, replace: bool) -> Result<(), ModelError> {
        if !replace && self.workspaces.contains_key(name) {
            return Err(ModelError::WorkspaceAlreadyExists(name.to_string()));
        }
        self.workspaces.insert(name.to_string(), Vec::new());
        self.current_workspace = name.to_string();
        Ok(())
    }

    /// Drops the workspace and its projects. The current workspace is left
    /// pointing at `name` even when it was the one removed.
    pub fn remove_workspace(&mut self, name: &str) -> Option<Vec<String>> {
        self.workspaces.shift_remove(name)
    }

    pub fn switch_workspace(&mut self, name: &str) {
        self.current_workspace = name.to_string();
    }

    pub fn add_project(&mut self, path: Option<&str>, force: bool) -> Result<(), ModelError> {
        let path = match path {
            Some(path) if !path.is_empty() => path,
            _ => return Err(ModelError::NoActiveProjectOpen),
        };
        let projects = self
            .workspaces
            .entry(self.current_workspace.clone())
            .or_default();
        if !force && projects.iter().any(|existing| existing == path) {
            return Err(ModelError::DuplicateProject(path.to_string()));
        }
        projects.push(path.to_string());
        Ok(())
    }

    pub fn remove_project(&mut self, workspace: &str, index: usize) -> Option<String> {
        let projects = self.workspaces.get_mut(workspace)?;
        if index >= projects.len() {
            return None;
        }
        Some(projects.remove(index))
    }

    /// Moves the entry at `index` one slot earlier. Index 0 and out of range
    /// indices leave the list unchanged.
    pub fn move_project_up(&mut self, workspace: &str, index: usize) -> bool {
        let Some(projects) = self.workspaces.get_mut(workspace) else {
            return false;
        };
        if index == 0 || index >= projects.len() {
            return false;
        }
        let project = projects.remove(index);
        projects.insert(index - 1, project);
        true
    }

    pub fn set_status_text(&mut self, text: &str) {
        self.status_text = text.to_string();
    }

    /// Overlays a loaded document. Fields the document leaves out keep their
    /// current value.
    pub fn apply(&mut self, doc: DocumentV3) {
        if let Some(name) = doc.use_workspace {
            self.current_workspace = name;
        }
        if let Some(workspaces) = doc.workspaces {
            self.workspaces = workspaces;
        }
        if let Some(text) = doc.status_text {
            self.status_text = text;
        }
    }

    pub fn to_document(&self) -> DocumentV3 {
        DocumentV3 {
            use_workspace: Some(self.current_workspace.clone()),
            workspaces: Some(self.workspaces.clone()),
            status_text: Some(self.status_text.clone()),
        }
    }
}

const WORKSPACE_NAME_PATTERN: &str = "^[a-z0-9-]+$";

/// Interactive workspace-name rule. Loads and programmatic calls skip it.
pub fn validate_workspace_name(name: &str) -> Result<(), ModelError> {
    static PATTERN: OnceLock<Result<Regex, ModelError>> = OnceLock::new();
    let pattern = PATTERN
        .get_or_init(|| compile_name_pattern(WORKSPACE_NAME_PATTERN))
        .as_ref()
        .map_err(Clone::clone)?;
    if pattern.is_match(name) {
        Ok(())
    } else {
        Err(ModelError::WorkspaceNameInvalid(name.to_string()))
    }
}

fn compile_name_pattern(raw: &str) -> Result<Regex, ModelError> {
    Regex::new(raw).map_err(|err| ModelError::NamePattern(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn model_with(workspace: &str, projects: &[&str]) -> Model {
        let mut model = Model::default();
        model
            .add_workspace(workspace, false)
            .expect("fresh workspace");
        for project in projects {
            model.add_project(Some(project), true).unwrap();
        }
        model
    }

    #[test]
    fn add_project_requires_an_open_folder() {
        let mut model = Model::default();
        assert_eq!(
            model.add_project(None, false),
            Err(ModelError::NoActiveProjectOpen)
        );
        assert_eq!(
            model.add_project(Some(""), true),
            Err(ModelError::NoActiveProjectOpen)
        );
        assert!(model.workspaces().is_empty());
    }

    #[test]
    fn add_project_appends_to_current_workspace() {
        let mut model = Model::default();
        model.add_project(Some("/a"), false).unwrap();
        model.add_project(Some("/b"), false).unwrap();
        assert_eq!(model.list_projects(DEFAULT_WORKSPACE), ["/a", "/b"]);
    }

    #[test]
    fn duplicate_project_is_rejected_unless_forced() {
        let mut model = model_with("work", &["/a"]);
        assert_eq!(
            model.add_project(Some("/a"), false),
            Err(ModelError::DuplicateProject("/a".to_string()))
        );
        assert_eq!(model.list_projects("work"), ["/a"]);

        model.add_project(Some("/a"), true).unwrap();
        assert_eq!(model.list_projects("work"), ["/a", "/a"]);
    }

    #[test]
    fn move_project_up_at_head_is_noop() {
        let mut model = model_with("work", &["/a", "/b", "/c"]);
        assert!(!model.move_project_up("work", 0));
        assert_eq!(model.list_projects("work"), ["/a", "/b", "/c"]);
    }

    #[test]
    fn move_project_up_swaps_with_previous() {
        let mut model = model_with("work", &["/a", "/b", "/c"]);
        assert!(model.move_project_up("work", 2));
        assert_eq!(model.list_projects("work"), ["/a", "/c", "/b"]);
        assert!(!model.move_project_up("work", 3));
        assert!(!model.move_project_up("missing", 1));
    }

    #[test]
    fn remove_project_ignores_out_of_range_index() {
        let mut model = model_with("work", &["/a", "/b"]);
        assert_eq!(model.remove_project("work", 2), None);
        assert_eq!(model.remove_project("work", 0).as_deref(), Some("/a"));
        assert_eq!(model.list_projects("work"), ["/b"]);
    }

    #[test]
    fn add_workspace_conflicts_unless_replacing() {
        let mut model = model_with("work", &["/a"]);
        model.switch_workspace(DEFAULT_WORKSPACE);
        assert_eq!(
            model.add_workspace("work", false),
            Err(ModelError::WorkspaceAlreadyExists("work".to_string()))
        );
        assert_eq!(model.current_workspace(), DEFAULT_WORKSPACE);

        model.add_workspace("work", true).unwrap();
        assert_eq!(model.current_workspace(), "work");
        assert!(model.list_projects("work").is_empty());
    }

    #[test]
    fn removing_current_workspace_keeps_it_selected() {
        let mut model = model_with("work", &["/a"]);
        let removed = model.remove_workspace("work").unwrap();
        assert_eq!(removed, ["/a"]);
        assert_eq!(model.current_workspace(), "work");
        assert!(model.current_projects().is_empty());
        assert!(model.workspaces().is_empty());
    }

    #[test]
    fn reads_do_not_create_workspaces() {
        let model = Model::default();
        assert!(model.list_projects("ghost").is_empty());
        assert!(model.workspaces().is_empty());
    }

    #[test]
    fn materialize_default_only_fills_an_empty_collection() {
        let mut model = Model::default();
        assert!(model.materialize_default());
        assert_eq!(model.workspaces().len(), 1);
        assert!(model.workspaces().contains_key(DEFAULT_WORKSPACE));

        let mut model = model_with("work", &[]);
        assert!(!model.materialize_default());
        assert!(!model.workspaces().contains_key(DEFAULT_WORKSPACE));
    }

    #[test]
    fn apply_keeps_fields_missing_from_document() {
        let mut model = model_with("work", &["/a"]);
        model.set_status_text("<workspace>");
        model.apply(DocumentV3 {
            use_workspace: None,
            workspaces: None,
            status_text: Some(String::new()),
        });
        assert_eq!(model.current_workspace(), "work");
        assert_eq!(model.list_projects("work"), ["/a"]);
        assert_eq!(model.status_text(), "");
    }

    #[test]
    fn document_round_trip_restores_model() {
        let mut model = model_with("work", &["/a", "/b"]);
        model.add_workspace("play", false).unwrap();
        model.add_project(Some("/c"), false).unwrap();
        model.set_status_text("<lower:<workspace>>");

        let mut restored = Model::default();
        restored.apply(model.to_document());
        assert_eq!(restored, model);
    }

    #[test]
    fn workspace_name_validation() {
        assert!(validate_workspace_name("team-a1").is_ok());
        for bad in ["", "Team", "a b", "a_b", "ä"] {
            assert_eq!(
                validate_workspace_name(bad),
                Err(ModelError::WorkspaceNameInvalid(bad.to_string()))
            );
        }
    }

    #[test]
    fn broken_name_pattern_is_reported() {
        assert!(compile_name_pattern(WORKSPACE_NAME_PATTERN).is_ok());
        let err = compile_name_pattern("[a-z").unwrap_err();
        assert!(matches!(err, ModelError::NamePattern(_)));
        assert_eq!(err.code(), ErrorCode::InvalidParams);
    }
}
