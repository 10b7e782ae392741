use snafu::{ResultExt, ensure};
use url::Url;

use super::error::{
    InvalidServerUrlSnafu, JoinEndpointSnafu, OpaqueServerUrlSnafu, SessionResult,
    UnsupportedSchemeSnafu,
};
use super::ids::SessionId;
use super::settings::ClientSettings;

/// Resolved addresses of the two backend endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    server: Url,
    upload: Url,
    channel_base: Url,
}

impl Endpoints {
    pub fn new(server_url: &str, upload_path: &str, channel_path: &str) -> SessionResult<Self> {
        let server = Url::parse(server_url).context(InvalidServerUrlSnafu {
            stage: "parse-server-url",
            raw: server_url.to_string(),
        })?;
        ensure!(
            !server.cannot_be_a_base(),
            OpaqueServerUrlSnafu {
                stage: "check-server-url",
                raw: server_url.to_string(),
            }
        );
        let scheme = channel_scheme(&server)?;

        let upload = server.join(upload_path).context(JoinEndpointSnafu {
            stage: "join-upload-path",
            path: upload_path.to_string(),
        })?;

        let mut channel_base = server.join(channel_path).context(JoinEndpointSnafu {
            stage: "join-channel-path",
            path: channel_path.to_string(),
        })?;
        // http <-> ws and https <-> wss are all special schemes, so the swap is accepted.
        if channel_base.set_scheme(scheme).is_err() {
            return UnsupportedSchemeSnafu {
                stage: "set-channel-scheme",
                scheme: server.scheme().to_string(),
            }
            .fail();
        }
        channel_base.set_query(None);
        channel_base.set_fragment(None);

        Ok(Self {
            server,
            upload,
            channel_base,
        })
    }

    pub fn from_settings(settings: &ClientSettings) -> SessionResult<Self> {
        Self::new(
            &settings.server_url,
            &settings.upload_path,
            &settings.channel_path,
        )
    }

    pub fn server(&self) -> &Url {
        &self.server
    }

    pub fn upload_url(&self) -> &Url {
        &self.upload
    }

    pub fn is_secure(&self) -> bool {
        self.server.scheme() == "https"
    }

    /// Channel address for one session: `ws(s)://<host>:<port>/ws/<session_id>`.
    ///
    /// The session id is pushed as a single percent-encoded path segment.
    pub fn channel_address(&self, session_id: &SessionId) -> SessionResult<Url> {
        let mut address = self.channel_base.clone();
        {
            let Ok(mut segments) = address.path_segments_mut() else {
                return OpaqueServerUrlSnafu {
                    stage: "channel-address-segments",
                    raw: self.channel_base.to_string(),
                }
                .fail();
            };
            segments.pop_if_empty().push(session_id.as_str());
        }
        Ok(address)
    }
}

/// Picks the channel scheme matching the server's transport security.
pub fn channel_scheme(server: &Url) -> SessionResult<&'static str> {
    match server.scheme() {
        "https" => Ok("wss"),
        "http" => Ok("ws"),
        other => UnsupportedSchemeSnafu {
            stage: "channel-scheme",
            scheme: other.to_string(),
        }
        .fail(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{DEFAULT_CHANNEL_PATH, DEFAULT_UPLOAD_PATH};

    fn endpoints(server: &str) -> Endpoints {
        Endpoints::new(server, DEFAULT_UPLOAD_PATH, DEFAULT_CHANNEL_PATH).unwrap()
    }

    #[test]
    fn default_settings_resolve_local_backend() {
        let endpoints = Endpoints::from_settings(&ClientSettings::default()).unwrap();
        assert_eq!(
            endpoints.upload_url().as_str(),
            "http://localhost:8000/uploadfiles/"
        );
        assert!(!endpoints.is_secure());

        let session = SessionId::parse("abc-123").unwrap();
        assert_eq!(
            endpoints.channel_address(&session).unwrap().as_str(),
            "ws://localhost:8000/ws/abc-123"
        );
    }

    #[test]
    fn secure_server_gets_secure_channel() {
        let endpoints = endpoints("https://docs.example.com:8000");
        let session = SessionId::parse("s1").unwrap();
        assert_eq!(
            endpoints.channel_address(&session).unwrap().as_str(),
            "wss://docs.example.com:8000/ws/s1"
        );
    }

    #[test]
    fn session_id_is_one_encoded_segment() {
        let endpoints = endpoints("http://localhost:8000");
        let session = SessionId::parse("a/b c").unwrap();
        assert_eq!(
            endpoints.channel_address(&session).unwrap().as_str(),
            "ws://localhost:8000/ws/a%2Fb%20c"
        );
    }

    #[test]
    fn non_http_scheme_is_rejected() {
        let error = Endpoints::new("ftp://localhost", DEFAULT_UPLOAD_PATH, DEFAULT_CHANNEL_PATH)
            .unwrap_err();
        assert!(error.to_string().contains("ftp"));
    }

    #[test]
    fn garbage_server_url_is_rejected() {
        assert!(Endpoints::new("not a url", DEFAULT_UPLOAD_PATH, DEFAULT_CHANNEL_PATH).is_err());
    }
}
