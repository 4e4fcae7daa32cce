use std::path::Path;

use reqwest::multipart::{Form, Part};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{ApiClient, ApiError, FileUploadResponse, Result};

pub const UPLOAD_TEXT_PATH: &str = "api/v1/rag/upload-text";

/// Extensions the client offers for attachment.
pub const ACCEPTED_EXTENSIONS: &[&str] = &[
    ".txt", ".js", ".ts", ".jsx", ".tsx", ".py", ".java", ".cpp", ".c", ".html", ".css", ".json",
    ".md",
];

const UNPARSEABLE_ERROR: &str = "Upload failed";
const MISSING_DETAIL_ERROR: &str = "Failed to upload file";

/// Lowercased dotted extension of `file_name`, if it has one.
pub fn file_extension(file_name: &str) -> Option<String> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    if ext.is_empty() || (stem.is_empty() && !file_name.starts_with('.')) {
        return None;
    }
    Some(format!(".{}", ext.to_ascii_lowercase()))
}

pub fn is_accepted_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .and_then(file_extension)
        .map(|ext| ACCEPTED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Message carried by an error body's `detail`, for any JSON shape.
fn detail_message(body: &Value) -> String {
    let Some(detail) = body.get("detail") else {
        return MISSING_DETAIL_ERROR.to_string();
    };
    match detail {
        Value::String(text) if !text.trim().is_empty() => text.clone(),
        Value::Bool(true) | Value::Array(_) | Value::Object(_) => detail.to_string(),
        Value::Number(n) if n.as_f64() != Some(0.0) => detail.to_string(),
        _ => MISSING_DETAIL_ERROR.to_string(),
    }
}

impl ApiClient {
    /// Reads a local text file and uploads it so its content can be attached
    /// to the next message.
    pub async fn upload_text_file(&self, path: &Path) -> Result<FileUploadResponse> {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        if !is_accepted_file(path) {
            let ext = file_extension(&file_name).unwrap_or(file_name);
            return Err(ApiError::UnsupportedFileType(ext));
        }

        let content = tokio::fs::read(path).await?;
        self.upload_text(content, &file_name).await
    }

    pub async fn upload_text(&self, content: Vec<u8>, file_name: &str) -> Result<FileUploadResponse> {
        let url = self.endpoint(UPLOAD_TEXT_PATH)?;
        debug!("Uploading '{file_name}' ({} bytes)", content.len());

        let part = Part::bytes(content).file_name(file_name.to_string());
        let form = Form::new().part("file", part);

        let response = self.http.post(url).multipart(form).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let detail = match response.json::<Value>().await {
            Ok(body) => detail_message(&body),
            Err(_) => UNPARSEABLE_ERROR.to_string(),
        };
        warn!("Upload of '{file_name}' rejected: status = {status}, detail = {detail}");
        Err(ApiError::Upload(detail))
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use reqwest::StatusCode;
    use test_log::test;

    use super::*;
    use crate::mock::{ChatBehavior, MockBackend, UploadBehavior};

    fn temp_file(name: &str, content: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("friend_api_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn extracts_lowercase_extension() {
        assert_eq!(Some(".py".to_string()), file_extension("Main.PY"));
        assert_eq!(Some(".gz".to_string()), file_extension("notes.tar.gz"));
        assert_eq!(None, file_extension("Makefile"));
        assert_eq!(None, file_extension("trailing."));
    }

    #[test]
    fn accepts_only_listed_extensions() {
        assert!(is_accepted_file(Path::new("/tmp/readme.md")));
        assert!(is_accepted_file(Path::new("component.TSX")));
        assert!(!is_accepted_file(Path::new("archive.zip")));
        assert!(!is_accepted_file(Path::new("script.sh")));
        assert!(!is_accepted_file(Path::new("LICENSE")));
    }

    #[test(tokio::test)]
    async fn uploads_text_file_content() {
        let backend = MockBackend::start(ChatBehavior::json("", None)).unwrap();
        let client = backend.client().unwrap();
        let path = temp_file("upload_ok.py", "print('hi')");

        let result = client.upload_text_file(&path).await.unwrap();

        assert_eq!("upload_ok.py", result.filename);
        assert_eq!("print('hi')", result.content);
        assert_eq!(11, result.size);
        assert_eq!(".py", result.file_type);
    }

    #[test(tokio::test)]
    async fn rejects_unsupported_extension_locally() {
        let backend = MockBackend::start(ChatBehavior::json("", None)).unwrap();
        let client = backend.client().unwrap();

        let err = client
            .upload_text_file(Path::new("photo.png"))
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::UnsupportedFileType(ref ext) if ext == ".png"));
        assert!(backend.uploads().is_empty());
    }

    #[test(tokio::test)]
    async fn surfaces_server_detail() {
        let backend = MockBackend::start(ChatBehavior::json("", None)).unwrap();
        backend.set_upload(UploadBehavior::Reject {
            status: StatusCode::BAD_REQUEST,
            body: r#"{"detail":"File must be text-based and UTF-8 encoded"}"#.to_string(),
        });
        let client = backend.client().unwrap();

        let err = client.upload_text(vec![0xFF], "bad.txt").await.unwrap_err();

        assert_eq!("File must be text-based and UTF-8 encoded", err.to_string());
    }

    #[test(tokio::test)]
    async fn falls_back_when_detail_missing() {
        let backend = MockBackend::start(ChatBehavior::json("", None)).unwrap();
        backend.set_upload(UploadBehavior::Reject {
            status: StatusCode::BAD_REQUEST,
            body: r#"{"error":"invalid_file_type"}"#.to_string(),
        });
        let client = backend.client().unwrap();

        let err = client.upload_text(vec![], "a.txt").await.unwrap_err();

        assert_eq!("Failed to upload file", err.to_string());
    }

    #[test]
    fn non_object_bodies_have_no_detail() {
        assert_eq!("Failed to upload file", detail_message(&serde_json::json!("oops")));
        assert_eq!("Failed to upload file", detail_message(&serde_json::json!([])));
        assert_eq!("Failed to upload file", detail_message(&serde_json::json!(null)));
        assert_eq!("Failed to upload file", detail_message(&serde_json::json!({"detail": 0})));
        assert_eq!(
            r#"[{"msg":"field required"}]"#,
            detail_message(&serde_json::json!({"detail": [{"msg": "field required"}]}))
        );
    }

    #[test(tokio::test)]
    async fn json_string_body_uses_missing_detail_message() {
        let backend = MockBackend::start(ChatBehavior::json("", None)).unwrap();
        backend.set_upload(UploadBehavior::Reject {
            status: StatusCode::BAD_REQUEST,
            body: r#""oops""#.to_string(),
        });
        let client = backend.client().unwrap();

        let err = client.upload_text(vec![], "a.txt").await.unwrap_err();

        assert_eq!("Failed to upload file", err.to_string());
    }

    #[test(tokio::test)]
    async fn falls_back_when_body_unparseable() {
        let backend = MockBackend::start(ChatBehavior::json("", None)).unwrap();
        backend.set_upload(UploadBehavior::Reject {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: "<html>oops</html>".to_string(),
        });
        let client = backend.client().unwrap();

        let err = client.upload_text(vec![], "a.txt").await.unwrap_err();

        assert_eq!("Upload failed", err.to_string());
    }
}
