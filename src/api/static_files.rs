//! Static file function-map entries.
//!
//! A [`StaticFiles`] entry serves files from a directory through
//! `tower-http`'s [`ServeDir`]. The part of the request path below the
//! group's mount point selects the file, so with
//! `register("site", ..., FunctionMap::new().static_files("*", ...))` the
//! request `/site/css/main.css` serves `<root>/css/main.css`.

use std::path::{Path, PathBuf};

use axum::body::Body;
use axum::http::{Request, Uri};
use axum::response::Response;
use tower::ServiceExt;
use tower_http::services::ServeDir;

use crate::domain::RequestHead;
use crate::error::DispatchError;

/// A directory served over HTTP.
#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: PathBuf,
    default_page: Option<String>,
}

impl StaticFiles {
    /// Serves files below `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            default_page: None,
        }
    }

    /// Page served when the request names no file.
    #[must_use]
    pub fn default_page(mut self, page: impl Into<String>) -> Self {
        self.default_page = Some(page.into());
        self
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Serves `remainder` (a path relative to the root).
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Protocol`] if `remainder` is not a valid
    /// URI path.
    pub async fn serve(
        &self,
        request: &RequestHead,
        remainder: &str,
    ) -> Result<Response, DispatchError> {
        let target = match (remainder.is_empty(), &self.default_page) {
            (true, Some(page)) => page.as_str(),
            _ => remainder,
        };
        let uri: Uri = format!("/{target}")
            .parse()
            .map_err(|e| DispatchError::Protocol(format!("invalid file path {target}: {e}")))?;
        let file_request = Request::builder()
            .method(request.method.clone())
            .uri(uri)
            .body(Body::empty())
            .map_err(|e| DispatchError::Protocol(e.to_string()))?;

        match ServeDir::new(&self.root).oneshot(file_request).await {
            Ok(response) => Ok(response.map(Body::new)),
            Err(never) => match never {},
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use axum::http::StatusCode;

    use super::*;

    fn site() -> (PathBuf, StaticFiles) {
        let root = std::env::temp_dir().join(format!("switchyard-static-{}", uuid::Uuid::new_v4()));
        let Ok(()) = std::fs::create_dir_all(root.join("css")) else {
            panic!("temp dir");
        };
        let Ok(()) = std::fs::write(root.join("index.html"), "<h1>home</h1>") else {
            panic!("write index");
        };
        let Ok(()) = std::fs::write(root.join("css/main.css"), "body{}") else {
            panic!("write css");
        };
        let files = StaticFiles::new(&root).default_page("index.html");
        (root, files)
    }

    async fn body_text(response: Response) -> String {
        let Ok(bytes) = axum::body::to_bytes(response.into_body(), 1 << 20).await else {
            panic!("body readable");
        };
        String::from_utf8_lossy(&bytes).into_owned()
    }

    #[tokio::test]
    async fn serves_nested_file() {
        let (root, files) = site();
        let Ok(response) = files.serve(&RequestHead::default(), "css/main.css").await else {
            panic!("served");
        };
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "body{}");
        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn empty_remainder_uses_default_page() {
        let (root, files) = site();
        let Ok(response) = files.serve(&RequestHead::default(), "").await else {
            panic!("served");
        };
        assert_eq!(body_text(response).await, "<h1>home</h1>");
        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let (root, files) = site();
        let Ok(response) = files.serve(&RequestHead::default(), "nope.txt").await else {
            panic!("served");
        };
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let _ = std::fs::remove_dir_all(root);
    }
}
