//! # Portico Middleware
//!
//! The middleware onion for the Portico bridge.
//!
//! Every routed request runs through a chain of middleware ending in the
//! route's handler. A middleware can act before delegating, after the rest
//! of the chain has produced a response, or instead of it:
//!
//! ```text
//! Request → global → group → route → Handler
//!                                       ↓
//! Response ← global ← group ← route ←───┘
//! ```
//!
//! ## Execution Order
//!
//! | Stage | Priority | Contents |
//! |-------|----------|----------|
//! | global-before | 1 | Global middleware, by configured priority |
//! | group | 2 | Members of groups the route names |
//! | route | 3 | Middleware named directly by the route |
//! | handler | 4 | The route handler |
//! | route-after | 5 | `terminate` of route and group middleware |
//! | global-after | 6 | `terminate` of global middleware |
//!
//! ## Key Features
//!
//! - **Explicit registration**: middleware are registered under an
//!   identifier in a [`MiddlewareRegistry`]; unknown identifiers fail the build
//! - **Groups and aliases**: nested groups expand in declaration order,
//!   cycles are rejected
//! - **Parameters**: `throttle:60,1` style arguments
//! - **Isolation**: a fresh [`PipelineContext`] and request scope per
//!   request; per-request factories for stateful middleware
//! - **Disconnects**: a [`DisconnectSignal`] abandons the rest of the chain
//!
//! ## Example
//!
//! ```
//! use portico_middleware::Stage;
//!
//! let stages = Stage::ALL;
//! assert_eq!(stages.len(), 6);
//! assert_eq!(stages[0].name(), "global-before");
//! assert_eq!(stages[3].priority(), 4);
//! ```

#![doc(html_root_url = "https://docs.rs/portico-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod context;
mod executor;
pub mod middleware;
pub mod pipeline;
mod registry;
pub mod render;
mod signal;
pub mod stages;

pub use context::{ExecutionState, PipelineContext};
pub use executor::Executor;
pub use middleware::{handler_fn, BoxFuture, FnHandler, Handler, Middleware, Next};
pub use pipeline::{MiddlewareFactory, MiddlewareSpec, Pipeline, Stage};
pub use registry::MiddlewareRegistry;
pub use render::ErrorRenderer;
pub use signal::{DisconnectGuard, DisconnectSignal};
pub use stages::Builtins;
