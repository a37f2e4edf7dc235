//! Daemon command classification.
//!
//! Extracts the image reference from the three daemon commands that can
//! bring an image onto the host: container create, image pull and service
//! create. Everything else is not an image command.

use percent_encoding::percent_decode_str;
use serde::Deserialize;
use url::Url;

/// Base used to parse origin-form request URIs.
const URI_BASE: &str = "http://daemon.local/";

/// One daemon API request, as seen by the plugin.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Command {
    pub method: String,
    /// Request path, including any API version prefix
    pub path: String,
    /// Decoded query parameters in request order
    pub query: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Command {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Build a command from a request URI such as
    /// `/v1.41/images/create?fromImage=ubuntu&tag=latest`.
    ///
    /// The path is stored percent-decoded, the way the daemon routes it, so
    /// `/images%2Fcreate` classifies as a pull. An unparseable URI is kept
    /// whole (decoded) as the path, with no query.
    pub fn from_request_uri(method: &str, uri: &str, body: Vec<u8>) -> Self {
        match Url::parse(URI_BASE).and_then(|base| base.join(uri)) {
            Ok(url) => Self {
                method: method.to_string(),
                path: decode_path(url.path()),
                query: url
                    .query_pairs()
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect(),
                body,
            },
            Err(e) => {
                tracing::debug!(uri = %uri, error = %e, "Unparseable request URI");
                Self {
                    method: method.to_string(),
                    path: decode_path(uri),
                    query: Vec::new(),
                    body,
                }
            }
        }
    }

    /// First value of a query parameter.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn kind(&self) -> CommandKind {
        CommandKind::from_path(&self.path)
    }

    /// Path with query string, for logs.
    pub fn uri(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        let query = self
            .query
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{}", self.path, query)
    }
}

/// Daemon commands that reference an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// `POST /containers/create` (docker run / create)
    ContainerCreate,
    /// `POST /images/create` (docker pull)
    ImagePull,
    /// `POST /services/create` (docker service create)
    ServiceCreate,
    Other,
}

impl CommandKind {
    pub fn from_path(path: &str) -> Self {
        let path = path.trim_end_matches('/');
        if path.ends_with("/containers/create") {
            Self::ContainerCreate
        } else if path.ends_with("/images/create") {
            Self::ImagePull
        } else if path.ends_with("/services/create") {
            Self::ServiceCreate
        } else {
            Self::Other
        }
    }
}

/// Result of classifying a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Raw image reference, empty when none was found
    pub image: String,
    pub is_image_command: bool,
}

impl Classification {
    fn from_image(image: Option<String>) -> Self {
        let image = image.map(|i| i.trim().to_string()).unwrap_or_default();
        Self {
            is_image_command: !image.is_empty(),
            image,
        }
    }
}

/// Extract the image reference from a command.
///
/// Malformed bodies yield no reference rather than an error, so that
/// non-image traffic on shared endpoints passes through untouched.
pub fn classify(command: &Command) -> Classification {
    let image = match command.kind() {
        CommandKind::ContainerCreate => container_image(command),
        CommandKind::ImagePull => pull_image(command),
        CommandKind::ServiceCreate => service_image(command),
        CommandKind::Other => None,
    };
    Classification::from_image(image)
}

#[derive(Deserialize)]
struct ContainerConfig {
    #[serde(rename = "Image", default)]
    image: Option<String>,
}

#[derive(Deserialize)]
struct ServiceSpec {
    #[serde(rename = "TaskTemplate", default)]
    task_template: Option<TaskSpec>,
}

#[derive(Deserialize)]
struct TaskSpec {
    #[serde(rename = "ContainerSpec", default)]
    container_spec: Option<ContainerConfig>,
}

fn decode_body<T: for<'de> Deserialize<'de>>(command: &Command) -> Option<T> {
    match serde_json::from_slice(&command.body) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::debug!(
                path = %command.path,
                error = %e,
                "Ignoring malformed request body"
            );
            None
        }
    }
}

fn container_image(command: &Command) -> Option<String> {
    decode_body::<ContainerConfig>(command)?.image
}

fn service_image(command: &Command) -> Option<String> {
    let image = decode_body::<ServiceSpec>(command)?
        .task_template?
        .container_spec?
        .image?;
    // Services pin images by digest; trust is checked on the name and tag.
    Some(image.split('@').next().unwrap_or_default().to_string())
}

fn pull_image(command: &Command) -> Option<String> {
    let from_image = command.query_param("fromImage")?.trim();
    if from_image.is_empty() {
        return None;
    }
    let tag = command.query_param("tag").map(str::trim).unwrap_or("");
    if tag.is_empty() || has_tag_or_digest(from_image) {
        return Some(from_image.to_string());
    }
    // Digest pulls arrive as `tag=sha256:...`
    let separator = if tag.contains(':') { '@' } else { ':' };
    Some(format!("{}{}{}", from_image, separator, tag))
}

fn decode_path(path: &str) -> String {
    percent_decode_str(path).decode_utf8_lossy().into_owned()
}

fn has_tag_or_digest(image: &str) -> bool {
    let last = image.rsplit('/').next().unwrap_or(image);
    image.contains('@') || last.contains(':')
}
