//! # Portico Translate
//!
//! Converts HTTP messages between the hyper runtime and the Portico value
//! model.
//!
//! | Direction | Entry point |
//! |-----------|-------------|
//! | runtime → framework | [`Translator::inbound`] |
//! | framework → runtime | [`Translator::outbound`] |
//! | framework → runtime request | [`Translator::to_runtime_request`] |
//!
//! Inbound translation validates headers, decodes the query string, cookies
//! and the body according to its content type, spools multipart uploads to
//! temp files and synthesizes CGI-style server variables. Every failure is a
//! [`TranslationError`](portico_core::TranslationError) carrying the status
//! the kernel responds with.
//!
//! ## Example
//!
//! ```rust
//! use bytes::Bytes;
//! use portico_translate::{ConnectionInfo, RawRequest, Translator, TranslatorConfig};
//!
//! # tokio_test::block_on(async {
//! let translator = Translator::new(TranslatorConfig::default());
//! let request = http::Request::builder()
//!     .uri("/admin/users?page=2")
//!     .header("Accept", "application/json")
//!     .body(Bytes::new())
//!     .unwrap();
//!
//! let msg = translator
//!     .inbound(&RawRequest::new(request, ConnectionInfo::default()))
//!     .await
//!     .unwrap();
//! assert_eq!(msg.query().get("page"), Some("2"));
//! assert!(msg.expects_json());
//! # });
//! ```

#![doc(html_root_url = "https://docs.rs/portico-translate/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod cookie;
mod inbound;
pub mod multipart;
mod outbound;
mod raw;
mod urlencoded;

pub use config::{MultipartLimits, TranslatorConfig};
pub use cookie::{parse_cookies, SameSite, SetCookie};
pub use inbound::Translator;
pub use multipart::{read_multipart, MultipartBody};
pub use outbound::{empty_body, full_body, ResponseBody};
pub use raw::{ConnectionInfo, RawRequest};
pub use urlencoded::{form_as, json_as, parse_pairs, query_as};
