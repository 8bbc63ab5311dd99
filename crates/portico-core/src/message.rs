//! The framework-side request value.
//!
//! An [`InboundMessage`] is built exactly once per request by the translator
//! and is read-only afterwards. It owns every uploaded temp file, so dropping
//! the message at the end of the request removes them from disk.

use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::Version;
use indexmap::IndexMap;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::SystemTime;
use tempfile::TempPath;

use crate::method::Method;
use crate::negotiate;

/// Ordered multimap of string pairs.
///
/// Used for query parameters and form fields, where the same key may appear
/// several times and the order of appearance matters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamBag {
    pairs: Vec<(String, String)>,
}

impl ParamBag {
    /// Creates an empty bag.
    #[must_use]
    pub const fn new() -> Self {
        Self { pairs: Vec::new() }
    }

    /// Appends a pair, keeping earlier values of the same key.
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((key.into(), value.into()));
    }

    /// Returns the first value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Returns every value for `key` in order of appearance.
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.pairs
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Returns `true` if `key` appears at least once.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.pairs.iter().any(|(k, _)| k == key)
    }

    /// Iterates over all pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of pairs, counting repeated keys separately.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Returns `true` if the bag holds no pairs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl From<Vec<(String, String)>> for ParamBag {
    fn from(pairs: Vec<(String, String)>) -> Self {
        Self { pairs }
    }
}

impl FromIterator<(String, String)> for ParamBag {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            pairs: iter.into_iter().collect(),
        }
    }
}

/// Cookies sent with the request, keyed by name.
///
/// When a name repeats, the first occurrence wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieJar {
    cookies: IndexMap<String, String>,
}

impl CookieJar {
    /// Creates an empty jar.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a cookie unless the name is already present.
    ///
    /// Returns `true` if the cookie was stored.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> bool {
        match self.cookies.entry(name.into()) {
            indexmap::map::Entry::Occupied(_) => false,
            indexmap::map::Entry::Vacant(slot) => {
                slot.insert(value.into());
                true
            }
        }
    }

    /// Returns the value of the named cookie.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// Iterates in the order the cookies were received.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.cookies.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of distinct cookies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    /// Returns `true` if no cookies were sent.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

/// CGI-style server variables (`REQUEST_METHOD`, `HTTP_HOST`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerVars {
    vars: IndexMap<String, String>,
}

impl ServerVars {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a variable, replacing any previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    /// Returns a variable by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// Returns `true` if the variable is set.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// Iterates in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Returns `true` if no variables are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// URL scheme the client used to reach the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Scheme {
    /// Plain HTTP.
    #[default]
    Http,
    /// HTTP over TLS.
    Https,
}

impl Scheme {
    /// `"http"` or `"https"`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }

    /// 80 or 443.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::Http => 80,
            Self::Https => 443,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An uploaded file part, spooled to a temp file.
///
/// The temp file is removed when this value is dropped.
#[derive(Debug)]
pub struct UploadedFile {
    field_name: String,
    original_name: Option<String>,
    mime: Option<String>,
    size: u64,
    temp: TempPath,
}

impl UploadedFile {
    /// Wraps a spooled upload.
    #[must_use]
    pub fn new(
        field_name: impl Into<String>,
        original_name: Option<String>,
        mime: Option<String>,
        size: u64,
        temp: TempPath,
    ) -> Self {
        Self {
            field_name: field_name.into(),
            original_name,
            mime,
            size,
            temp,
        }
    }

    /// The form field the file was sent under.
    #[must_use]
    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    /// The file name reported by the client, if any.
    #[must_use]
    pub fn original_name(&self) -> Option<&str> {
        self.original_name.as_deref()
    }

    /// The part's declared content type.
    #[must_use]
    pub fn mime(&self) -> Option<&str> {
        self.mime.as_deref()
    }

    /// Size in bytes.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Location of the spooled content.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.temp
    }

    /// Extension of the client file name, lower-cased.
    #[must_use]
    pub fn extension(&self) -> Option<String> {
        self.original_name
            .as_deref()
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
    }

    /// Copies the spooled content to `dest`, leaving the temp file in place.
    pub fn copy_to(&self, dest: impl AsRef<Path>) -> std::io::Result<u64> {
        std::fs::copy(&self.temp, dest)
    }
}

/// Framework-side view of one HTTP request.
///
/// Constructed through [`InboundMessage::builder`] and read-only afterwards.
#[derive(Debug)]
pub struct InboundMessage {
    method: Method,
    path: String,
    query_string: Option<String>,
    query: ParamBag,
    version: Version,
    headers: HeaderMap,
    cookies: CookieJar,
    body: Bytes,
    form: ParamBag,
    json: Option<serde_json::Value>,
    files: Vec<UploadedFile>,
    client_addr: Option<SocketAddr>,
    scheme: Scheme,
    host: Option<String>,
    server_vars: ServerVars,
    received_at: SystemTime,
}

impl InboundMessage {
    /// Starts building a message for `method` and `path`.
    #[must_use]
    pub fn builder(method: Method, path: impl Into<String>) -> InboundMessageBuilder {
        InboundMessageBuilder {
            message: Self {
                method,
                path: path.into(),
                query_string: None,
                query: ParamBag::new(),
                version: Version::HTTP_11,
                headers: HeaderMap::new(),
                cookies: CookieJar::new(),
                body: Bytes::new(),
                form: ParamBag::new(),
                json: None,
                files: Vec::new(),
                client_addr: None,
                scheme: Scheme::Http,
                host: None,
                server_vars: ServerVars::new(),
                received_at: SystemTime::now(),
            },
        }
    }

    /// Request method.
    #[must_use]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// Request path, without the query string.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Raw query string, without the leading `?`.
    #[must_use]
    pub fn query_string(&self) -> Option<&str> {
        self.query_string.as_deref()
    }

    /// Path plus query string, as it appeared on the request line.
    #[must_use]
    pub fn request_uri(&self) -> String {
        match &self.query_string {
            Some(q) if !q.is_empty() => format!("{}?{q}", self.path),
            _ => self.path.clone(),
        }
    }

    /// Decoded query parameters.
    #[must_use]
    pub const fn query(&self) -> &ParamBag {
        &self.query
    }

    /// Protocol version.
    #[must_use]
    pub const fn version(&self) -> Version {
        self.version
    }

    /// All request headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of the named header.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Every value of the named header, in the order received.
    pub fn header_values<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
    }

    /// The `Content-Type` header.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.header(http::header::CONTENT_TYPE.as_str())
    }

    /// Cookies sent with the request.
    #[must_use]
    pub const fn cookies(&self) -> &CookieJar {
        &self.cookies
    }

    /// Value of the named cookie.
    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name)
    }

    /// Raw request body.
    #[must_use]
    pub const fn body(&self) -> &Bytes {
        &self.body
    }

    /// Decoded form fields (urlencoded or multipart text parts).
    #[must_use]
    pub const fn form(&self) -> &ParamBag {
        &self.form
    }

    /// Parsed JSON body, when the request declared a JSON content type.
    #[must_use]
    pub const fn json(&self) -> Option<&serde_json::Value> {
        self.json.as_ref()
    }

    /// Uploaded files in the order their parts arrived.
    #[must_use]
    pub fn files(&self) -> &[UploadedFile] {
        &self.files
    }

    /// First uploaded file sent under `field`.
    #[must_use]
    pub fn file(&self, field: &str) -> Option<&UploadedFile> {
        self.files.iter().find(|f| f.field_name == field)
    }

    /// Looks up an input value across JSON body, form fields and query.
    ///
    /// Body input takes precedence over the query string. JSON scalars are
    /// rendered as strings; objects and arrays are not returned.
    #[must_use]
    pub fn input(&self, name: &str) -> Option<String> {
        if let Some(value) = self.json.as_ref().and_then(|j| j.get(name)) {
            return match value {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                serde_json::Value::Bool(b) => Some(b.to_string()),
                _ => None,
            };
        }
        self.form
            .get(name)
            .or_else(|| self.query.get(name))
            .map(str::to_string)
    }

    /// Address of the client (after trusted proxy resolution).
    #[must_use]
    pub const fn client_addr(&self) -> Option<SocketAddr> {
        self.client_addr
    }

    /// IP of the client.
    #[must_use]
    pub fn client_ip(&self) -> Option<IpAddr> {
        self.client_addr.map(|addr| addr.ip())
    }

    /// Scheme the client used.
    #[must_use]
    pub const fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// `true` for HTTPS requests.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.scheme == Scheme::Https
    }

    /// Host the client addressed, without port.
    #[must_use]
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// CGI-style server variables.
    #[must_use]
    pub const fn server_vars(&self) -> &ServerVars {
        &self.server_vars
    }

    /// A single server variable.
    #[must_use]
    pub fn server_var(&self, name: &str) -> Option<&str> {
        self.server_vars.get(name)
    }

    /// When the runtime received the request.
    #[must_use]
    pub const fn received_at(&self) -> SystemTime {
        self.received_at
    }

    /// `true` if errors for this request should be rendered as JSON.
    #[must_use]
    pub fn expects_json(&self) -> bool {
        negotiate::expects_json(&self.headers)
    }

    /// `true` for `X-Requested-With: XMLHttpRequest`.
    #[must_use]
    pub fn is_ajax(&self) -> bool {
        negotiate::is_ajax(&self.headers)
    }
}

/// Builder for [`InboundMessage`].
#[derive(Debug)]
pub struct InboundMessageBuilder {
    message: InboundMessage,
}

impl InboundMessageBuilder {
    /// Sets the raw query string.
    pub fn query_string(mut self, query: impl Into<String>) -> Self {
        self.message.query_string = Some(query.into());
        self
    }

    /// Sets the decoded query parameters.
    pub fn query(mut self, query: ParamBag) -> Self {
        self.message.query = query;
        self
    }

    /// Sets the protocol version.
    pub fn version(mut self, version: Version) -> Self {
        self.message.version = version;
        self
    }

    /// Appends a header value.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.message.headers.append(name, value);
        self
    }

    /// Replaces the header map.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.message.headers = headers;
        self
    }

    /// Sets the cookie jar.
    pub fn cookies(mut self, cookies: CookieJar) -> Self {
        self.message.cookies = cookies;
        self
    }

    /// Sets the raw body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.message.body = body.into();
        self
    }

    /// Sets the decoded form fields.
    pub fn form(mut self, form: ParamBag) -> Self {
        self.message.form = form;
        self
    }

    /// Sets the parsed JSON body.
    pub fn json(mut self, json: serde_json::Value) -> Self {
        self.message.json = Some(json);
        self
    }

    /// Adds an uploaded file.
    pub fn file(mut self, file: UploadedFile) -> Self {
        self.message.files.push(file);
        self
    }

    /// Sets the client address.
    pub fn client_addr(mut self, addr: SocketAddr) -> Self {
        self.message.client_addr = Some(addr);
        self
    }

    /// Sets the scheme.
    pub fn scheme(mut self, scheme: Scheme) -> Self {
        self.message.scheme = scheme;
        self
    }

    /// Sets the host name.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.message.host = Some(host.into());
        self
    }

    /// Sets the server variables.
    pub fn server_vars(mut self, vars: ServerVars) -> Self {
        self.message.server_vars = vars;
        self
    }

    /// Sets the receive timestamp.
    pub fn received_at(mut self, at: SystemTime) -> Self {
        self.message.received_at = at;
        self
    }

    /// Finishes the message.
    #[must_use]
    pub fn build(self) -> InboundMessage {
        self.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_param_bag_keeps_repeats_in_order() {
        let mut bag = ParamBag::new();
        bag.push("tag", "a");
        bag.push("page", "2");
        bag.push("tag", "b");

        assert_eq!(bag.get("tag"), Some("a"));
        assert_eq!(bag.get_all("tag").collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(bag.len(), 3);
        assert!(!bag.contains("missing"));
    }

    #[test]
    fn test_cookie_jar_first_wins() {
        let mut jar = CookieJar::new();
        assert!(jar.insert("session", "one"));
        assert!(!jar.insert("session", "two"));
        assert_eq!(jar.get("session"), Some("one"));
    }

    #[test]
    fn test_input_precedence() {
        let mut query = ParamBag::new();
        query.push("q", "from-query");
        query.push("page", "3");
        let mut form = ParamBag::new();
        form.push("q", "from-form");

        let msg = InboundMessage::builder(Method::Post, "/search")
            .query(query)
            .form(form)
            .build();
        assert_eq!(msg.input("q").as_deref(), Some("from-form"));
        assert_eq!(msg.input("page").as_deref(), Some("3"));

        let msg = InboundMessage::builder(Method::Post, "/search")
            .json(serde_json::json!({"q": "from-json", "n": 4, "nested": {}}))
            .build();
        assert_eq!(msg.input("q").as_deref(), Some("from-json"));
        assert_eq!(msg.input("n").as_deref(), Some("4"));
        assert_eq!(msg.input("nested"), None);
    }

    #[test]
    fn test_request_uri() {
        let msg = InboundMessage::builder(Method::Get, "/admin/users")
            .query_string("page=2")
            .build();
        assert_eq!(msg.request_uri(), "/admin/users?page=2");

        let msg = InboundMessage::builder(Method::Get, "/admin").build();
        assert_eq!(msg.request_uri(), "/admin");
    }

    #[test]
    fn test_uploaded_file_removed_on_drop() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"hello").unwrap();
        let path = tmp.into_temp_path();
        let location = path.to_path_buf();

        let file = UploadedFile::new(
            "avatar",
            Some("Me.PNG".to_string()),
            Some("image/png".to_string()),
            5,
            path,
        );
        let msg = InboundMessage::builder(Method::Post, "/upload")
            .file(file)
            .build();

        let uploaded = msg.file("avatar").unwrap();
        assert_eq!(uploaded.extension().as_deref(), Some("png"));
        assert!(location.exists());

        drop(msg);
        assert!(!location.exists());
    }
}
