use std::path::PathBuf;

use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SessionError {
    #[snafu(display("server URL '{raw}' is invalid on `{stage}`: {source}"))]
    InvalidServerUrl {
        stage: &'static str,
        raw: String,
        source: url::ParseError,
    },
    #[snafu(display("server URL scheme '{scheme}' is not http or https"))]
    UnsupportedScheme {
        stage: &'static str,
        scheme: String,
    },
    #[snafu(display("server URL '{raw}' cannot carry a path"))]
    OpaqueServerUrl { stage: &'static str, raw: String },
    #[snafu(display("endpoint path '{path}' is invalid on `{stage}`: {source}"))]
    JoinEndpoint {
        stage: &'static str,
        path: String,
        source: url::ParseError,
    },
    #[snafu(display("session id must not be empty"))]
    EmptySessionId { stage: &'static str },
    #[snafu(display("{path:?} is not a PDF file"))]
    NotPdf { stage: &'static str, path: PathBuf },
    #[snafu(display("{path:?} is {size_bytes} bytes, above the {limit_bytes} byte limit"))]
    FileTooLarge {
        stage: &'static str,
        path: PathBuf,
        size_bytes: u64,
        limit_bytes: u64,
    },
    #[snafu(display("failed to read {path:?} on `{stage}`: {source}"))]
    ReadFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
}

pub type SessionResult<T> = Result<T, SessionError>;
