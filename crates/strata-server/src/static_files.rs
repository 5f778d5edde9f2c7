//! Static file serving middleware.
//!
//! Serves files from a configured root directory. When the request path
//! maps to an existing file the stage writes the response and does not
//! delegate; when nothing matches it delegates unconditionally so the
//! rest of the chain (body decoding, routing) can handle the request.
//!
//! Traversal attempts (`..` components) and hidden paths are refused with
//! a forbidden error rather than falling through, so probing requests
//! never reach route handlers.
//!
//! # Example
//!
//! ```rust
//! use strata_server::StaticFiles;
//!
//! let assets = StaticFiles::new("./public")
//!     .index("index.html")
//!     .cache_control("max-age=3600");
//! ```

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use bytes::Bytes;
use http::{header, HeaderValue, Method, StatusCode};

use strata_core::{StrataError, StrataResult};
use strata_pipeline::{BoxFuture, Context, Middleware, Next};

/// Static file serving stage.
#[derive(Debug, Clone)]
pub struct StaticFiles {
    /// Root directory for static files
    root: PathBuf,

    /// Index file name served for directory requests (e.g., "index.html")
    index_file: Option<String>,

    /// Cache-Control header value for served files
    cache_control: Option<String>,

    /// Whether to include `ETag` headers
    etag_enabled: bool,

    /// Whether to include Last-Modified headers
    last_modified_enabled: bool,

    /// Whether to serve hidden files (starting with `.`)
    serve_hidden: bool,

    /// Custom MIME type mappings by extension
    mime_types: HashMap<String, String>,
}

impl StaticFiles {
    /// Creates a static file stage rooted at the given directory.
    #[must_use]
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            index_file: None,
            cache_control: None,
            etag_enabled: true,
            last_modified_enabled: true,
            serve_hidden: false,
            mime_types: HashMap::new(),
        }
    }

    /// Sets the index file served for directory requests.
    #[must_use]
    pub fn index<S: Into<String>>(mut self, index: S) -> Self {
        self.index_file = Some(index.into());
        self
    }

    /// Sets the Cache-Control header value for served files.
    #[must_use]
    pub fn cache_control<S: Into<String>>(mut self, value: S) -> Self {
        self.cache_control = Some(value.into());
        self
    }

    /// Enables or disables `ETag` headers.
    #[must_use]
    pub fn etag(mut self, enabled: bool) -> Self {
        self.etag_enabled = enabled;
        self
    }

    /// Enables or disables Last-Modified headers.
    #[must_use]
    pub fn last_modified(mut self, enabled: bool) -> Self {
        self.last_modified_enabled = enabled;
        self
    }

    /// Enables or disables serving hidden files (off by default).
    #[must_use]
    pub fn serve_hidden(mut self, enabled: bool) -> Self {
        self.serve_hidden = enabled;
        self
    }

    /// Adds a custom MIME type mapping.
    #[must_use]
    pub fn mime_type<S1: Into<String>, S2: Into<String>>(
        mut self,
        extension: S1,
        mime_type: S2,
    ) -> Self {
        self.mime_types.insert(extension.into(), mime_type.into());
        self
    }

    /// Returns the root directory path.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a request path to a file under the root, or `None` when
    /// nothing matches.
    ///
    /// Traversal and hidden-path attempts fail with a forbidden error
    /// instead of resolving to `None`.
    async fn resolve(&self, request_path: &str) -> StrataResult<Option<PathBuf>> {
        let rel = request_path.trim_start_matches('/');

        for component in Path::new(rel).components() {
            match component {
                Component::ParentDir => {
                    return Err(StrataError::forbidden("path traversal is not allowed"));
                }
                Component::Normal(name) => {
                    if !self.serve_hidden
                        && name.to_str().is_some_and(|n| n.starts_with('.'))
                    {
                        return Err(StrataError::forbidden("hidden paths are not allowed"));
                    }
                }
                _ => {}
            }
        }

        let full = self.root.join(rel);
        let Ok(canonical) = tokio::fs::canonicalize(&full).await else {
            return Ok(None);
        };

        let canonical_root = tokio::fs::canonicalize(&self.root)
            .await
            .map_err(|e| StrataError::internal_with("static root is not accessible", e))?;
        if !canonical.starts_with(&canonical_root) {
            return Err(StrataError::forbidden("path escapes the static root"));
        }

        let metadata = tokio::fs::metadata(&canonical).await?;
        if metadata.is_dir() {
            if let Some(index) = &self.index_file {
                let index_path = canonical.join(index);
                if tokio::fs::metadata(&index_path)
                    .await
                    .map(|m| m.is_file())
                    .unwrap_or(false)
                {
                    return Ok(Some(index_path));
                }
            }
            return Ok(None);
        }

        Ok(Some(canonical))
    }

    /// Writes the file response onto the context.
    async fn serve(&self, ctx: &mut Context, path: &Path) -> StrataResult<()> {
        let metadata = tokio::fs::metadata(path).await?;
        let modified = metadata.modified().ok();

        let etag = if self.etag_enabled {
            Self::generate_etag(&metadata, path)
        } else {
            None
        };

        if self.is_fresh(ctx, etag.as_deref(), modified.as_ref()) {
            let response = ctx.response_mut();
            response.set_status(StatusCode::NOT_MODIFIED);
            if let Some(etag) = &etag {
                if let Ok(value) = HeaderValue::from_str(etag) {
                    response.insert_header(header::ETAG, value);
                }
            }
            self.apply_cache_control(ctx);
            return Ok(());
        }

        let body = if ctx.method() == Method::HEAD {
            Bytes::new()
        } else {
            Bytes::from(tokio::fs::read(path).await?)
        };

        let mime = self.detect_mime_type(path);
        let content_length = metadata.len();

        let response = ctx.response_mut();
        response.set_status(StatusCode::OK);
        if let Ok(value) = HeaderValue::from_str(&mime) {
            response.insert_header(header::CONTENT_TYPE, value);
        }
        if let Ok(value) = HeaderValue::from_str(&content_length.to_string()) {
            response.insert_header(header::CONTENT_LENGTH, value);
        }
        if let Some(etag) = &etag {
            if let Ok(value) = HeaderValue::from_str(etag) {
                response.insert_header(header::ETAG, value);
            }
        }
        if self.last_modified_enabled {
            if let Some(modified) = modified {
                let formatted = httpdate::fmt_http_date(modified);
                if let Ok(value) = HeaderValue::from_str(&formatted) {
                    response.insert_header(header::LAST_MODIFIED, value);
                }
            }
        }
        self.apply_cache_control(ctx);
        ctx.response_mut().set_body(body);

        tracing::debug!(
            request_id = %ctx.request_id(),
            path = %path.display(),
            bytes = content_length,
            "served static file"
        );
        Ok(())
    }

    /// Checks conditional request headers for a 304 Not Modified.
    fn is_fresh(
        &self,
        ctx: &Context,
        etag: Option<&str>,
        modified: Option<&SystemTime>,
    ) -> bool {
        if let Some(etag) = etag {
            if let Some(if_none_match) = ctx.request_header(header::IF_NONE_MATCH) {
                if if_none_match == etag || if_none_match == "*" {
                    return true;
                }
            }
        }

        if self.last_modified_enabled {
            if let (Some(modified), Some(value)) =
                (modified, ctx.request_header(header::IF_MODIFIED_SINCE))
            {
                if let Ok(since) = httpdate::parse_http_date(value) {
                    let to_secs = |t: &SystemTime| {
                        t.duration_since(SystemTime::UNIX_EPOCH)
                            .map(|d| d.as_secs())
                            .ok()
                    };
                    if let (Some(modified), Some(since)) = (to_secs(modified), to_secs(&since)) {
                        if modified <= since {
                            return true;
                        }
                    }
                }
            }
        }

        false
    }

    fn apply_cache_control(&self, ctx: &mut Context) {
        if let Some(cache_control) = &self.cache_control {
            if let Ok(value) = HeaderValue::from_str(cache_control) {
                ctx.response_mut()
                    .insert_header(header::CACHE_CONTROL, value);
            }
        }
    }

    /// Builds a weak validator from mtime, size, and the path.
    fn generate_etag(metadata: &std::fs::Metadata, path: &Path) -> Option<String> {
        let modified = metadata.modified().ok()?;
        let secs = modified
            .duration_since(SystemTime::UNIX_EPOCH)
            .ok()?
            .as_secs();
        let size = metadata.len();

        let path_hash = {
            use std::collections::hash_map::DefaultHasher;
            use std::hash::{Hash, Hasher};
            let mut hasher = DefaultHasher::new();
            path.hash(&mut hasher);
            hasher.finish()
        };

        Some(format!("\"{secs}-{size}-{}\"", path_hash % 10000))
    }

    /// Detects the MIME type for a file from its extension.
    fn detect_mime_type(&self, path: &Path) -> String {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        if let Some(mime) = self.mime_types.get(&extension) {
            return mime.clone();
        }

        match extension.as_str() {
            "html" | "htm" => "text/html; charset=utf-8",
            "css" => "text/css; charset=utf-8",
            "js" | "mjs" => "text/javascript; charset=utf-8",
            "json" | "map" => "application/json",
            "xml" => "application/xml",
            "txt" => "text/plain; charset=utf-8",
            "md" => "text/markdown; charset=utf-8",
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "gif" => "image/gif",
            "svg" => "image/svg+xml",
            "webp" => "image/webp",
            "ico" => "image/x-icon",
            "woff" => "font/woff",
            "woff2" => "font/woff2",
            "ttf" => "font/ttf",
            "otf" => "font/otf",
            "pdf" => "application/pdf",
            "wasm" => "application/wasm",
            _ => "application/octet-stream",
        }
        .to_string()
    }
}

impl Middleware for StaticFiles {
    fn name(&self) -> &'static str {
        "static_files"
    }

    fn handle<'a>(
        &'a self,
        ctx: &'a mut Context,
        mut next: Next<'a>,
    ) -> BoxFuture<'a, StrataResult<()>> {
        Box::pin(async move {
            if ctx.method() != Method::GET && ctx.method() != Method::HEAD {
                return next.run(ctx).await;
            }

            let request_path = ctx.path().to_string();
            match self.resolve(&request_path).await? {
                Some(file) => self.serve(ctx, &file).await,
                None => next.run(ctx).await,
            }
        })
    }
}
