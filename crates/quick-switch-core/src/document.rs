//! On-disk config document and its schema generations.
//!
//! Loading dispatches on the integer `schema` tag into a [`ConfigDocument`]
//! variant; each older variant is lifted one generation at a time by a
//! `migrate_*` function until it reaches [`DocumentV3`]. Saving always
//! renders the latest generation.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::model::DEFAULT_WORKSPACE;

pub const LATEST_SCHEMA: u64 = 3;

/// Status template a legacy `minimalStatus: false` document maps to.
pub const LEGACY_FULL_STATUS_TEXT: &str = "<basename:project>";

pub type WorkspaceCollection = IndexMap<String, Vec<String>>;

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct DocumentV1 {
    #[serde(default)]
    pub projects: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DocumentV2 {
    #[serde(default)]
    pub projects: Vec<String>,
    #[serde(rename = "minimalStatus", default = "default_true")]
    pub minimal_status: bool,
}

/// Latest generation. Every field is optional on load: an absent field
/// leaves the matching in-memory value untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DocumentV3 {
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub use_workspace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspaces: Option<WorkspaceCollection>,
    #[serde(rename = "statusText", default, skip_serializing_if = "Option::is_none")]
    pub status_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigDocument {
    V1(DocumentV1),
    V2(DocumentV2),
    V3(DocumentV3),
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error("unrecognized schema: {0}")]
    UnknownSchema(String),
    #[error("invalid schema {schema} document: {source}")]
    InvalidFields {
        schema: u64,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Serialize)]
struct Tagged<'a> {
    schema: u64,
    #[serde(flatten)]
    body: &'a DocumentV3,
}

fn default_true() -> bool {
    true
}

impl ConfigDocument {
    pub fn parse(raw: &str) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_str(raw).map_err(DecodeError::InvalidJson)?;
        Self::decode(value)
    }

    pub fn decode(value: Value) -> Result<Self, DecodeError> {
        let schema = match value.get("schema") {
            Some(tag) => tag
                .as_u64()
                .ok_or_else(|| DecodeError::UnknownSchema(tag.to_string()))?,
            None => return Err(DecodeError::UnknownSchema("missing".to_string())),
        };
        let invalid = |source| DecodeError::InvalidFields { schema, source };

        match schema {
            // Later revisions of the flat format kept writing `schema: 1`
            // but added the status toggle.
            1 if value.get("minimalStatus").is_some() => {
                serde_json::from_value(value).map(Self::V2).map_err(invalid)
            }
            1 => serde_json::from_value(value).map(Self::V1).map_err(invalid),
            2 => serde_json::from_value(value).map(Self::V2).map_err(invalid),
            3 => serde_json::from_value(value).map(Self::V3).map_err(invalid),
            other => Err(DecodeError::UnknownSchema(other.to_string())),
        }
    }

    pub fn schema(&self) -> u64 {
        match self {
            Self::V1(_) => 1,
            Self::V2(_) => 2,
            Self::V3(_) => 3,
        }
    }

    pub fn into_latest(self) -> DocumentV3 {
        match self {
            Self::V1(doc) => migrate_v2_to_v3(migrate_v1_to_v2(doc)),
            Self::V2(doc) => migrate_v2_to_v3(doc),
            Self::V3(doc) => doc,
        }
    }
}

pub fn migrate_v1_to_v2(doc: DocumentV1) -> DocumentV2 {
    DocumentV2 {
        projects: doc.projects,
        minimal_status: true,
    }
}

pub fn migrate_v2_to_v3(doc: DocumentV2) -> DocumentV3 {
    let mut workspaces = WorkspaceCollection::new();
    workspaces.insert(DEFAULT_WORKSPACE.to_string(), doc.projects);
    let status_text = if doc.minimal_status {
        String::new()
    } else {
        LEGACY_FULL_STATUS_TEXT.to_string()
    };
    DocumentV3 {
        use_workspace: None,
        workspaces: Some(workspaces),
        status_text: Some(status_text),
    }
}

/// Renders `doc` as a schema-3 file body with two-space indentation.
pub fn render(doc: &DocumentV3) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&Tagged {
        schema: LATEST_SCHEMA,
        body: doc,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_dispatches_on_schema_tag() {
        let v1 = ConfigDocument::decode(json!({"schema": 1, "projects": ["/a"]})).unwrap();
        assert_eq!(v1.schema(), 1);

        let v2 = ConfigDocument::decode(json!({"schema": 2, "projects": [], "minimalStatus": false}))
            .unwrap();
        assert_eq!(v2.schema(), 2);

        let v3 = ConfigDocument::decode(json!({"schema": 3, "use": "work"})).unwrap();
        assert_eq!(
            v3,
            ConfigDocument::V3(DocumentV3 {
                use_workspace: Some("work".to_string()),
                workspaces: None,
                status_text: None,
            })
        );
    }

    #[test]
    fn schema_one_with_status_toggle_reads_as_v2() {
        let doc = ConfigDocument::decode(json!({
            "schema": 1,
            "projects": ["/a"],
            "minimalStatus": false
        }))
        .unwrap();
        assert!(matches!(doc, ConfigDocument::V2(ref v2) if !v2.minimal_status));
    }

    #[test]
    fn decode_rejects_unknown_or_missing_schema() {
        for value in [
            json!({"schema": 4, "projects": []}),
            json!({"projects": ["/a"]}),
            json!({"schema": "3"}),
            json!([1, 2, 3]),
        ] {
            let err = ConfigDocument::decode(value).unwrap_err();
            assert!(matches!(err, DecodeError::UnknownSchema(_)), "{err}");
        }
    }

    #[test]
    fn decode_reports_field_type_errors() {
        let err = ConfigDocument::decode(json!({"schema": 3, "workspaces": {"a": 5}})).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidFields { schema: 3, .. }));
    }

    #[test]
    fn parse_reports_invalid_json() {
        let err = ConfigDocument::parse("{ not json").unwrap_err();
        assert!(matches!(err, DecodeError::InvalidJson(_)));
    }

    #[test]
    fn v1_migrates_to_minimal_default_workspace() {
        let latest = ConfigDocument::V1(DocumentV1 {
            projects: vec!["/a".to_string(), "/b".to_string()],
        })
        .into_latest();
        let workspaces = latest.workspaces.unwrap();
        assert_eq!(workspaces.len(), 1);
        assert_eq!(workspaces[DEFAULT_WORKSPACE], vec!["/a", "/b"]);
        assert_eq!(latest.status_text.as_deref(), Some(""));
        assert_eq!(latest.use_workspace, None);
    }

    #[test]
    fn v2_full_status_migrates_to_basename_template() {
        let latest = migrate_v2_to_v3(DocumentV2 {
            projects: vec![],
            minimal_status: false,
        });
        assert_eq!(latest.status_text.as_deref(), Some(LEGACY_FULL_STATUS_TEXT));
    }

    #[test]
    fn render_emits_latest_schema_first_with_two_space_indent() {
        let mut workspaces = WorkspaceCollection::new();
        workspaces.insert("zeta".to_string(), vec!["/z".to_string()]);
        workspaces.insert("alpha".to_string(), vec![]);
        let rendered = render(&DocumentV3 {
            use_workspace: Some("zeta".to_string()),
            workspaces: Some(workspaces),
            status_text: Some(String::new()),
        })
        .unwrap();

        assert!(rendered.starts_with("{\n  \"schema\": 3,\n  \"use\": \"zeta\","));
        let zeta = rendered.find("\"zeta\": [").unwrap();
        let alpha = rendered.find("\"alpha\": []").unwrap();
        assert!(zeta < alpha, "workspace insertion order must survive: {rendered}");
    }
}
