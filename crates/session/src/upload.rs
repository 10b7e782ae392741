use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use snafu::{OptionExt, ResultExt, Snafu, ensure};
use url::Url;

use super::error::{FileTooLargeSnafu, NotPdfSnafu, ReadFileSnafu, SessionError, SessionResult};
use super::ids::SessionId;

pub const PDF_MIME_TYPE: &str = "application/pdf";
/// Multipart field repeated once per uploaded file.
pub const UPLOAD_FIELD_NAME: &str = "files";

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
pub type UploadResult<T> = Result<T, UploadError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum UploadError {
    #[snafu(display("failed to attach '{file_name}' on `{stage}`: {source}"))]
    BuildPart {
        stage: &'static str,
        file_name: String,
        source: reqwest::Error,
    },
    #[snafu(display("{source}"))]
    Request {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("failed to read upload response: {source}"))]
    ReadBody {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("upload response (status {status}) is not valid JSON: {source}"))]
    DecodeBody {
        stage: &'static str,
        status: u16,
        source: serde_json::Error,
    },
    #[snafu(display("No session ID returned from server"))]
    MissingSessionId { stage: &'static str },
}

/// One PDF selected for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl PdfFile {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    /// Loads a file from disk after checking its extension and size.
    pub async fn read(path: &Path, limit_bytes: u64) -> SessionResult<Self> {
        ensure!(
            is_pdf_path(path),
            NotPdfSnafu {
                stage: "check-pdf-extension",
                path: path.to_path_buf(),
            }
        );

        let metadata = tokio::fs::metadata(path).await.context(ReadFileSnafu {
            stage: "stat-pdf-file",
            path: path.to_path_buf(),
        })?;
        ensure!(
            metadata.len() <= limit_bytes,
            FileTooLargeSnafu {
                stage: "check-pdf-size",
                path: path.to_path_buf(),
                size_bytes: metadata.len(),
                limit_bytes,
            }
        );

        let bytes = tokio::fs::read(path).await.context(ReadFileSnafu {
            stage: "read-pdf-file",
            path: path.to_path_buf(),
        })?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.pdf".to_string());

        Ok(Self::new(file_name, bytes))
    }
}

pub fn is_pdf_path(path: &Path) -> bool {
    path.extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| extension.eq_ignore_ascii_case("pdf"))
}

/// Result of reading a picker selection: accepted files plus per-path rejections.
#[derive(Debug, Default)]
pub struct Selection {
    pub files: Vec<PdfFile>,
    pub rejected: Vec<SessionError>,
}

pub async fn read_selection(paths: &[PathBuf], limit_bytes: u64) -> Selection {
    let mut selection = Selection::default();
    for path in paths {
        match PdfFile::read(path, limit_bytes).await {
            Ok(file) => selection.files.push(file),
            Err(error) => {
                tracing::warn!(path = ?path, error = %error, "skipping selected file");
                selection.rejected.push(error);
            }
        }
    }
    selection
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SavedFile {
    pub original_name: String,
    pub saved_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RejectedFile {
    #[serde(default)]
    pub filename: Option<String>,
    pub error: String,
}

/// Body of the upload endpoint's reply.
///
/// Failed uploads come back as `{"detail": ...}` without a session id, which the client
/// treats the same as any other response lacking one. The id is kept as raw JSON so an
/// id of the wrong type ends up in the same place.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub session_id: Option<serde_json::Value>,
    #[serde(default)]
    pub files: Vec<SavedFile>,
    #[serde(default)]
    pub errors: Vec<RejectedFile>,
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
}

/// A response that carried a usable session id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedUpload {
    pub session_id: SessionId,
    pub saved: Vec<SavedFile>,
    pub rejected: Vec<RejectedFile>,
}

impl UploadResponse {
    pub fn from_json(status: u16, body: &str) -> UploadResult<Self> {
        serde_json::from_str(body).context(DecodeBodySnafu {
            stage: "decode-upload-response",
            status,
        })
    }

    pub fn into_accepted(self) -> UploadResult<AcceptedUpload> {
        let session_id = self
            .session_id
            .as_ref()
            .and_then(serde_json::Value::as_str)
            .and_then(|raw| SessionId::parse(raw).ok())
            .context(MissingSessionIdSnafu {
                stage: "extract-session-id",
            })?;

        Ok(AcceptedUpload {
            session_id,
            saved: self.files,
            rejected: self.errors,
        })
    }
}

pub trait Uploader: Send + Sync {
    fn upload<'a>(&'a self, files: Vec<PdfFile>) -> BoxFuture<'a, UploadResult<UploadResponse>>;
}

/// Multipart uploader talking to the real backend.
pub struct HttpUploader {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpUploader {
    pub fn new(endpoint: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }

    fn build_form(files: Vec<PdfFile>) -> UploadResult<Form> {
        let mut form = Form::new();
        for file in files {
            let part = Part::bytes(file.bytes)
                .file_name(file.file_name.clone())
                .mime_str(PDF_MIME_TYPE)
                .context(BuildPartSnafu {
                    stage: "build-multipart-part",
                    file_name: file.file_name,
                })?;
            form = form.part(UPLOAD_FIELD_NAME, part);
        }
        Ok(form)
    }

    async fn send(&self, files: Vec<PdfFile>) -> UploadResult<UploadResponse> {
        let file_count = files.len();
        let form = Self::build_form(files)?;

        tracing::debug!(endpoint = %self.endpoint, file_count, "posting upload");
        let response = self
            .client
            .post(self.endpoint.clone())
            .multipart(form)
            .send()
            .await
            .context(RequestSnafu {
                stage: "send-upload-request",
            })?;

        let status = response.status();
        let body = response.text().await.context(ReadBodySnafu {
            stage: "read-upload-response",
        })?;
        tracing::info!(status = status.as_u16(), "upload response received");

        UploadResponse::from_json(status.as_u16(), &body)
    }
}

impl Uploader for HttpUploader {
    fn upload<'a>(&'a self, files: Vec<PdfFile>) -> BoxFuture<'a, UploadResult<UploadResponse>> {
        Box::pin(self.send(files))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdf_extension_check_is_case_insensitive() {
        assert!(is_pdf_path(Path::new("report.pdf")));
        assert!(is_pdf_path(Path::new("/tmp/REPORT.PDF")));
        assert!(!is_pdf_path(Path::new("notes.txt")));
        assert!(!is_pdf_path(Path::new("pdf")));
    }

    #[test]
    fn successful_response_yields_session() {
        let body = r#"{
            "files": [{"original_name": "a.pdf", "saved_name": "a_1.pdf"}],
            "errors": [{"filename": "b.txt", "error": "Invalid file type"}],
            "session_id": "9d1c"
        }"#;
        let accepted = UploadResponse::from_json(200, body)
            .unwrap()
            .into_accepted()
            .unwrap();

        assert_eq!(accepted.session_id.as_str(), "9d1c");
        assert_eq!(accepted.saved.len(), 1);
        assert_eq!(accepted.rejected[0].filename.as_deref(), Some("b.txt"));
    }

    #[test]
    fn rejected_upload_reports_missing_session() {
        let body = r#"{"detail": {"message": "No files were successfully uploaded", "errors": []}}"#;
        let error = UploadResponse::from_json(400, body)
            .unwrap()
            .into_accepted()
            .unwrap_err();

        assert!(matches!(error, UploadError::MissingSessionId { .. }));
        assert_eq!(error.to_string(), "No session ID returned from server");
    }

    #[test]
    fn empty_session_id_counts_as_missing() {
        let response = UploadResponse::from_json(200, r#"{"session_id": ""}"#).unwrap();
        assert!(matches!(
            response.into_accepted(),
            Err(UploadError::MissingSessionId { .. })
        ));
    }

    #[test]
    fn non_string_session_id_counts_as_missing() {
        for body in [
            r#"{"session_id": 42}"#,
            r#"{"session_id": null}"#,
            r#"{"session_id": {"id": "abc"}}"#,
        ] {
            let error = UploadResponse::from_json(200, body)
                .unwrap()
                .into_accepted()
                .unwrap_err();
            assert!(matches!(error, UploadError::MissingSessionId { .. }), "{body}");
        }
    }

    #[test]
    fn non_json_body_is_a_decode_error() {
        let error = UploadResponse::from_json(502, "<html>Bad Gateway</html>").unwrap_err();
        assert!(matches!(error, UploadError::DecodeBody { status: 502, .. }));
    }

    #[tokio::test]
    async fn selection_keeps_pdfs_and_reports_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("paper.pdf");
        let text = dir.path().join("notes.txt");
        let large = dir.path().join("large.pdf");
        std::fs::write(&pdf, b"%PDF-1.7 small").unwrap();
        std::fs::write(&text, b"plain").unwrap();
        std::fs::write(&large, vec![0_u8; 64]).unwrap();

        let selection = read_selection(&[pdf, text, large], 32).await;

        assert_eq!(selection.files.len(), 1);
        assert_eq!(selection.files[0].file_name, "paper.pdf");
        assert_eq!(selection.files[0].bytes, b"%PDF-1.7 small");
        assert_eq!(selection.rejected.len(), 2);
        assert!(matches!(selection.rejected[0], SessionError::NotPdf { .. }));
        assert!(matches!(
            selection.rejected[1],
            SessionError::FileTooLarge { size_bytes: 64, .. }
        ));
    }
}
