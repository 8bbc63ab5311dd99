//! # Portico Core
//!
//! Shared value model for the Portico bridge.
//!
//! Every other crate in the workspace speaks in terms of these types:
//!
//! - [`InboundMessage`] - Immutable framework-side view of a request
//! - [`OutboundMessage`] - Mutable framework-side response under construction
//! - [`Method`] - The closed set of HTTP methods the bridge routes
//! - [`TranslationError`], [`MiddlewareFault`], [`PipelineError`], [`Fault`] - Error taxonomy
//! - [`Container`] / [`RequestScope`] - Process singletons and per-request bindings
//! - [`RequestId`] - UUID v7 request identifier
//! - [`AuthUser`] - The authenticated principal bound by the `auth` middleware

#![doc(html_root_url = "https://docs.rs/portico-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod context;
mod error;
mod identity;
mod message;
mod method;
pub mod negotiate;
mod outbound;
pub mod scope;

pub use context::RequestId;
pub use error::{
    ChainResult, Fault, FaultCategory, MiddlewareFault, PipelineError, TranslationError,
    TranslationErrorKind,
};
pub use identity::AuthUser;
pub use message::{
    CookieJar, InboundMessage, InboundMessageBuilder, ParamBag, Scheme, ServerVars, UploadedFile,
};
pub use method::{Method, UnsupportedMethod};
pub use outbound::{escape_html, header_value_lossy, Body, BodyStream, OutboundMessage};
pub use scope::{Container, InjectionError, RequestScope};
