//! Translator limits and environment.

use std::net::IpAddr;
use std::path::PathBuf;

/// Default maximum body size (8 MB).
pub const DEFAULT_MAX_BODY_SIZE: usize = 8 * 1024 * 1024;

/// Default maximum number of header values.
pub const DEFAULT_MAX_HEADERS: usize = 100;

/// Default maximum size per uploaded file (2 MB).
pub const DEFAULT_MAX_FILE_SIZE: usize = 2 * 1024 * 1024;

/// Limits applied to `multipart/form-data` bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartLimits {
    /// Maximum number of text fields.
    pub max_fields: usize,
    /// Maximum number of file parts.
    pub max_files: usize,
    /// Maximum size of a single file part in bytes.
    pub max_file_size: usize,
}

impl Default for MultipartLimits {
    fn default() -> Self {
        Self {
            max_fields: 1000,
            max_files: 20,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

/// Translator configuration.
///
/// Built once at startup and shared by every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatorConfig {
    /// Maximum number of header values per request.
    pub max_headers: usize,
    /// Maximum request body size in bytes.
    pub max_body_size: usize,
    /// Multipart limits.
    pub multipart: MultipartLimits,
    /// Directory for spooled uploads; the system temp dir when `None`.
    pub upload_dir: Option<PathBuf>,
    /// Content types kept as raw bodies. `type/*` matches any subtype.
    pub raw_body_types: Vec<String>,
    /// Peers whose `X-Forwarded-*` headers are honoured.
    pub trusted_proxies: Vec<IpAddr>,
    /// Value of `DOCUMENT_ROOT`.
    pub document_root: String,
    /// Value of `SCRIPT_NAME`.
    pub script_name: String,
    /// Value of `SERVER_SOFTWARE`.
    pub server_software: String,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            max_headers: DEFAULT_MAX_HEADERS,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            multipart: MultipartLimits::default(),
            upload_dir: None,
            raw_body_types: vec![
                "text/*".to_string(),
                "application/xml".to_string(),
                "application/octet-stream".to_string(),
            ],
            trusted_proxies: Vec::new(),
            document_root: "public".to_string(),
            script_name: "/index.php".to_string(),
            server_software: concat!("portico/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl TranslatorConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum body size.
    #[must_use]
    pub fn max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    /// Sets the maximum number of header values.
    #[must_use]
    pub fn max_headers(mut self, count: usize) -> Self {
        self.max_headers = count;
        self
    }

    /// Sets the multipart limits.
    #[must_use]
    pub fn multipart(mut self, limits: MultipartLimits) -> Self {
        self.multipart = limits;
        self
    }

    /// Sets the upload directory.
    #[must_use]
    pub fn upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.upload_dir = Some(dir.into());
        self
    }

    /// Adds a trusted proxy address.
    #[must_use]
    pub fn trust_proxy(mut self, addr: IpAddr) -> Self {
        self.trusted_proxies.push(addr);
        self
    }

    /// `true` if `peer` may set forwarding headers.
    #[must_use]
    pub fn is_trusted_proxy(&self, peer: IpAddr) -> bool {
        self.trusted_proxies.contains(&peer)
    }

    /// `true` if `essence` (e.g. `text/csv`) is kept as a raw body.
    #[must_use]
    pub fn accepts_raw(&self, essence: &str) -> bool {
        self.raw_body_types.iter().any(|allowed| {
            match allowed.strip_suffix("/*") {
                Some(top) => essence
                    .split_once('/')
                    .is_some_and(|(t, _)| t.eq_ignore_ascii_case(top)),
                None => allowed.eq_ignore_ascii_case(essence),
            }
        })
    }

    /// Directory where uploads are spooled.
    #[must_use]
    pub fn upload_dir_or_temp(&self) -> PathBuf {
        self.upload_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}
