//! Decoding the design tool's file payload into a [`DesignDocument`].
//!
//! The same decoder serves HTTP responses and local JSON exports, so
//! `figsync generate --input` sees exactly what `figsync sync` would.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use figsync_core::types::{DesignDocument, DesignNode, DocumentMetadata, SharedStyle};
use figsync_core::DocumentId;

use crate::error::{io_err, FetchError};

/// `GET /v1/files/{key}` response body. Fields we do not use are ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileResponse {
    #[serde(default)]
    name: String,
    #[serde(default)]
    last_modified: Option<String>,
    #[serde(default)]
    version: Option<String>,
    document: Option<DesignNode>,
    #[serde(default)]
    styles: BTreeMap<String, SharedStyle>,
}

/// Decode a file payload. A body without a `document` root is malformed.
pub fn decode_document(id: &DocumentId, body: &[u8]) -> Result<DesignDocument, FetchError> {
    let response: FileResponse =
        serde_json::from_slice(body).map_err(|e| FetchError::MalformedResponse {
            reason: e.to_string(),
        })?;
    let root = response.document.ok_or_else(|| FetchError::MalformedResponse {
        reason: "response has no `document` root".to_string(),
    })?;
    let name = if response.name.trim().is_empty() {
        id.to_string()
    } else {
        response.name
    };
    Ok(DesignDocument {
        id: id.clone(),
        name,
        root,
        metadata: DocumentMetadata {
            styles: response.styles,
            last_modified: response.last_modified,
            version: response.version,
        },
    })
}

/// Read a locally exported payload. The id defaults to the file stem.
pub fn read_document_file(
    path: &Path,
    id: Option<DocumentId>,
) -> Result<DesignDocument, FetchError> {
    let bytes = std::fs::read(path).map_err(|e| io_err(path, e))?;
    let id = id.unwrap_or_else(|| {
        DocumentId::from(
            path.file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "local".to_string()),
        )
    });
    decode_document(&id, &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use figsync_core::NodeKind;

    const BODY: &str = r#"{
        "name": "Mobile App",
        "lastModified": "2024-05-01T10:00:00Z",
        "version": "123",
        "document": {
            "id": "0:0", "name": "Document", "type": "DOCUMENT",
            "children": [{"id": "0:1", "name": "Page 1", "type": "CANVAS", "children": []}]
        },
        "styles": {
            "S:1": {"key": "abc", "name": "Brand/Primary", "styleType": "FILL", "description": ""}
        },
        "components": {}
    }"#;

    #[test]
    fn decodes_rest_payload() {
        let doc = decode_document(&DocumentId::from("KEY"), BODY.as_bytes()).expect("decode");
        assert_eq!(doc.name, "Mobile App");
        assert_eq!(doc.root.kind, NodeKind::Document);
        assert_eq!(doc.root.children[0].kind, NodeKind::Canvas);
        assert_eq!(doc.metadata.styles["S:1"].name, "Brand/Primary");
        assert_eq!(doc.metadata.version.as_deref(), Some("123"));
    }

    #[test]
    fn missing_document_root_is_malformed() {
        let err = decode_document(&DocumentId::from("KEY"), br#"{"name": "x"}"#).unwrap_err();
        assert!(matches!(err, FetchError::MalformedResponse { .. }), "got {err}");
    }

    #[test]
    fn non_json_is_malformed() {
        let err = decode_document(&DocumentId::from("KEY"), b"<html>").unwrap_err();
        assert!(matches!(err, FetchError::MalformedResponse { .. }));
    }

    #[test]
    fn local_file_id_defaults_to_stem() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("AbC123.json");
        std::fs::write(&path, BODY).unwrap();
        let doc = read_document_file(&path, None).expect("read");
        assert_eq!(doc.id, DocumentId::from("AbC123"));
    }

    #[test]
    fn missing_local_file_reports_path() {
        let err = read_document_file(Path::new("/nonexistent/doc.json"), None).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/doc.json"));
    }
}
