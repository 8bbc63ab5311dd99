//! Route registry and matcher for Portico.
//!
//! Routes are kept in registration order and matched linearly: the first
//! route whose method filter and pattern accept a request wins. This is the
//! precedence admin panels are written against (a `{record}` route declared
//! before a literal sibling captures it), so the table never reorders by
//! specificity.
//!
//! # Features
//!
//! - **Ordered matching**: first full match in registration order
//! - **Path parameters**: `{name}` segments, percent-decoded into [`Params`]
//! - **Fallback**: the `*` pattern is tried after every other route
//! - **Groups**: shared path prefix, name prefix and middleware
//! - **Named URLs**: [`RouteTable::url`] renders a path from a route name
//!
//! The table is generic over the handler type so it can be tested and
//! benchmarked without the pipeline.

mod error;
mod params;
mod pattern;
mod route;
mod table;

pub use error::{RouteError, RouteNotFoundError, UrlError};
pub use params::Params;
pub use pattern::PathPattern;
pub use route::{MethodFilter, RouteDescriptor, RouteSnapshot};
pub use table::{RouteGroup, RouteMatch, RouteTable};
