//! Runtime request → [`InboundMessage`].

use bytes::Bytes;
use http::header::{HeaderMap, CONTENT_LENGTH, CONTENT_TYPE, COOKIE, HOST};
use http::uri::{Authority, Uri};
use http::Version;
use portico_core::{
    InboundMessage, Method, ParamBag, Scheme, ServerVars, TranslationError, TranslationErrorKind,
    UploadedFile,
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use crate::config::TranslatorConfig;
use crate::cookie::parse_cookies;
use crate::multipart::read_multipart;
use crate::raw::RawRequest;
use crate::urlencoded::parse_pairs;

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_FORWARDED_PROTO: &str = "x-forwarded-proto";
const X_FORWARDED_HOST: &str = "x-forwarded-host";
const X_FORWARDED_PORT: &str = "x-forwarded-port";

/// Converts messages between the runtime and the framework.
///
/// A translator is built once from a [`TranslatorConfig`] and shared by every
/// request. It holds no per-request state.
#[derive(Debug, Clone, Default)]
pub struct Translator {
    config: Arc<TranslatorConfig>,
}

/// Body decoded according to its content type.
#[derive(Debug, Default)]
struct DecodedBody {
    form: ParamBag,
    json: Option<serde_json::Value>,
    files: Vec<UploadedFile>,
}

/// Where the client says it is, after trusted proxy resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Origin {
    client: SocketAddr,
    scheme: Scheme,
    host: String,
    port: u16,
}

impl Translator {
    /// Creates a translator.
    #[must_use]
    pub fn new(config: TranslatorConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &TranslatorConfig {
        &self.config
    }

    /// Builds the framework view of a runtime request.
    ///
    /// # Errors
    ///
    /// Returns a [`TranslationError`] when the request violates a limit or
    /// its body does not match its declared content type.
    pub async fn inbound(&self, raw: &RawRequest) -> Result<InboundMessage, TranslationError> {
        let request = &raw.request;
        let headers = request.headers();
        self.check_headers(headers)?;

        let method = Method::try_from(request.method())
            .map_err(|e| TranslationError::new(TranslationErrorKind::UnsupportedMethod, e.to_string()))?;

        let path = match request.uri().path() {
            "" => "/",
            p => p,
        };
        let query_string = request.uri().query();
        let query = match query_string {
            Some(q) => parse_pairs(q, TranslationErrorKind::MalformedQuery)?,
            None => ParamBag::new(),
        };

        let body = request.body().clone();
        let decoded = self.decode_body(method, headers, &body).await?;
        let origin = self.resolve_origin(raw);
        let server_vars = self.server_vars(raw, method, &origin);

        let mut builder = InboundMessage::builder(method, path)
            .query(query)
            .version(request.version())
            .headers(headers.clone())
            .cookies(parse_cookies(headers))
            .body(body)
            .form(decoded.form)
            .client_addr(origin.client)
            .scheme(origin.scheme)
            .host(origin.host)
            .server_vars(server_vars)
            .received_at(raw.conn.received_at);
        if let Some(q) = query_string {
            builder = builder.query_string(q);
        }
        if let Some(json) = decoded.json {
            builder = builder.json(json);
        }
        for file in decoded.files {
            builder = builder.file(file);
        }

        Ok(builder.build())
    }

    /// Rebuilds a runtime request from a framework message.
    ///
    /// Method, URI, version, headers (every value, in order) and raw body
    /// are carried over. Decoded fields are not re-encoded.
    #[must_use]
    pub fn to_runtime_request(&self, msg: &InboundMessage) -> http::Request<Bytes> {
        let uri = msg.request_uri().parse::<Uri>().unwrap_or_else(|e| {
            tracing::warn!(error = %e, path = msg.path(), "request uri does not round-trip");
            Uri::from_static("/")
        });

        let mut request = http::Request::new(msg.body().clone());
        *request.method_mut() = msg.method().to_http();
        *request.uri_mut() = uri;
        *request.version_mut() = msg.version();
        *request.headers_mut() = msg.headers().clone();
        request
    }

    fn check_headers(&self, headers: &HeaderMap) -> Result<(), TranslationError> {
        if headers.len() > self.config.max_headers {
            return Err(TranslationError::new(
                TranslationErrorKind::TooManyHeaders,
                format!(
                    "{} header values exceed the limit of {}",
                    headers.len(),
                    self.config.max_headers
                ),
            ));
        }
        for (name, value) in headers {
            if value.to_str().is_err() {
                return Err(TranslationError::new(
                    TranslationErrorKind::MalformedHeader,
                    format!("header '{name}' is not visible ASCII"),
                ));
            }
        }
        Ok(())
    }

    async fn decode_body(
        &self,
        method: Method,
        headers: &HeaderMap,
        body: &Bytes,
    ) -> Result<DecodedBody, TranslationError> {
        if body.len() > self.config.max_body_size {
            return Err(TranslationError::new(
                TranslationErrorKind::PayloadTooLarge,
                format!(
                    "body of {} bytes exceeds the limit of {}",
                    body.len(),
                    self.config.max_body_size
                ),
            ));
        }
        if body.is_empty() {
            return Ok(DecodedBody::default());
        }
        if !method.permits_body() {
            return Err(TranslationError::new(
                TranslationErrorKind::UnexpectedBody,
                format!("{method} request carried a {} byte body", body.len()),
            ));
        }
        if !method.decodes_body() {
            return Ok(DecodedBody::default());
        }

        let unsupported = |detail: String| {
            TranslationError::new(TranslationErrorKind::UnsupportedMediaType, detail)
        };
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| unsupported("body sent without a Content-Type".to_string()))?;
        let mime: mime::Mime = content_type
            .parse()
            .map_err(|_| unsupported(format!("unparseable Content-Type '{content_type}'")))?;

        let mut decoded = DecodedBody::default();
        if mime.type_() == mime::APPLICATION && mime.subtype() == mime::WWW_FORM_URLENCODED {
            let text = std::str::from_utf8(body).map_err(|_| {
                TranslationError::new(TranslationErrorKind::MalformedBody, "form body is not UTF-8")
            })?;
            decoded.form = parse_pairs(text, TranslationErrorKind::MalformedBody)?;
        } else if mime.type_() == mime::MULTIPART && mime.subtype() == mime::FORM_DATA {
            let upload_dir = self.config.upload_dir_or_temp();
            let multipart = read_multipart(
                content_type,
                body.clone(),
                &self.config.multipart,
                &upload_dir,
            )
            .await?;
            decoded.form = multipart.fields;
            decoded.files = multipart.files;
        } else if mime.subtype() == mime::JSON || mime.suffix() == Some(mime::JSON) {
            let value = serde_json::from_slice(body).map_err(|e| {
                TranslationError::new(TranslationErrorKind::MalformedBody, format!("invalid JSON: {e}"))
            })?;
            decoded.json = Some(value);
        } else if !self.config.accepts_raw(mime.essence_str()) {
            return Err(unsupported(format!(
                "Content-Type '{}' is not accepted",
                mime.essence_str()
            )));
        }
        Ok(decoded)
    }

    fn resolve_origin(&self, raw: &RawRequest) -> Origin {
        let headers = raw.request.headers();
        let conn = &raw.conn;

        let mut origin = Origin {
            client: conn.remote_addr,
            scheme: if conn.secure { Scheme::Https } else { Scheme::Http },
            host: conn.local_addr.ip().to_string(),
            port: conn.local_addr.port(),
        };
        let authority = headers
            .get(HOST)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<Authority>().ok())
            .or_else(|| raw.request.uri().authority().cloned());
        if let Some(authority) = authority {
            origin.host = authority.host().to_string();
            if let Some(port) = authority.port_u16() {
                origin.port = port;
            }
        }

        if !self.config.is_trusted_proxy(conn.remote_addr.ip()) {
            return origin;
        }

        if let Some(ip) = self.forwarded_client(headers) {
            origin.client = SocketAddr::new(ip, conn.remote_addr.port());
        }
        let mut port_implied = false;
        if let Some(proto) = first_forwarded(headers, X_FORWARDED_PROTO) {
            if proto.eq_ignore_ascii_case("https") {
                origin.scheme = Scheme::Https;
                port_implied = true;
            } else if proto.eq_ignore_ascii_case("http") {
                origin.scheme = Scheme::Http;
                port_implied = true;
            }
        }
        if let Some(authority) =
            first_forwarded(headers, X_FORWARDED_HOST).and_then(|h| h.parse::<Authority>().ok())
        {
            origin.host = authority.host().to_string();
            match authority.port_u16() {
                Some(port) => origin.port = port,
                None => port_implied = true,
            }
        }
        if let Some(port) = first_forwarded(headers, X_FORWARDED_PORT).and_then(|p| p.parse().ok()) {
            origin.port = port;
        } else if port_implied {
            origin.port = origin.scheme.default_port();
        }
        origin
    }

    /// Rightmost `X-Forwarded-For` entry that is not itself a trusted proxy.
    fn forwarded_client(&self, headers: &HeaderMap) -> Option<IpAddr> {
        let hops: Vec<IpAddr> = headers
            .get_all(X_FORWARDED_FOR)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .filter_map(|hop| hop.trim().parse().ok())
            .collect();
        hops.iter()
            .rev()
            .find(|ip| !self.config.is_trusted_proxy(**ip))
            .or_else(|| hops.first())
            .copied()
    }

    fn server_vars(&self, raw: &RawRequest, method: Method, origin: &Origin) -> ServerVars {
        let request = &raw.request;
        let conn = &raw.conn;
        let headers = request.headers();
        let uri = request.uri();
        let mut vars = ServerVars::new();

        vars.insert("REQUEST_METHOD", method.as_str());
        vars.insert(
            "REQUEST_URI",
            uri.path_and_query().map_or("/", |pq| pq.as_str()),
        );
        vars.insert("QUERY_STRING", uri.query().unwrap_or(""));
        vars.insert("PATH_INFO", uri.path());
        vars.insert("SCRIPT_NAME", self.config.script_name.as_str());
        vars.insert(
            "SCRIPT_FILENAME",
            format!(
                "{}{}",
                self.config.document_root.trim_end_matches('/'),
                self.config.script_name
            ),
        );
        vars.insert("SERVER_PROTOCOL", protocol(request.version()));
        vars.insert("SERVER_NAME", origin.host.as_str());
        vars.insert("SERVER_PORT", origin.port.to_string());
        vars.insert("SERVER_ADDR", conn.local_addr.ip().to_string());
        vars.insert("SERVER_SOFTWARE", self.config.server_software.as_str());
        vars.insert("REMOTE_ADDR", origin.client.ip().to_string());
        vars.insert("REMOTE_PORT", origin.client.port().to_string());
        vars.insert("REQUEST_SCHEME", origin.scheme.as_str());
        if origin.scheme == Scheme::Https {
            vars.insert("HTTPS", "on");
        }
        if let Some(ct) = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()) {
            vars.insert("CONTENT_TYPE", ct);
        }
        if headers.contains_key(CONTENT_LENGTH) || !request.body().is_empty() {
            vars.insert("CONTENT_LENGTH", request.body().len().to_string());
        }

        let since_epoch = conn.received_at.duration_since(UNIX_EPOCH).unwrap_or_default();
        vars.insert("REQUEST_TIME", since_epoch.as_secs().to_string());
        vars.insert(
            "REQUEST_TIME_FLOAT",
            format!("{}.{:06}", since_epoch.as_secs(), since_epoch.subsec_micros()),
        );
        vars.insert("DOCUMENT_ROOT", self.config.document_root.as_str());
        vars.insert("GATEWAY_INTERFACE", "CGI/1.1");

        for name in headers.keys() {
            if name == CONTENT_TYPE || name == CONTENT_LENGTH {
                continue;
            }
            let separator = if name == COOKIE { "; " } else { ", " };
            let joined = headers
                .get_all(name)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .collect::<Vec<_>>()
                .join(separator);
            let key = format!("HTTP_{}", name.as_str().to_ascii_uppercase().replace('-', "_"));
            vars.insert(key, joined);
        }
        vars
    }
}

fn first_forwarded<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn protocol(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_2 => "HTTP/2.0",
        Version::HTTP_3 => "HTTP/3.0",
        _ => "HTTP/1.1",
    }
}
