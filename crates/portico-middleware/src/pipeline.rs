//! Resolved middleware pipelines.
//!
//! A [`Pipeline`] is the flat, ordered list of middleware a route runs,
//! plus its handler. It is built once per route by the
//! [`MiddlewareRegistry`](crate::MiddlewareRegistry) and instantiated into a
//! fresh chain for every request.
//!
//! ## Execution order
//!
//! | Stage | Priority | Holds |
//! |---|---|---|
//! | `GlobalBefore` | 1 | global middleware, sorted by their own priority |
//! | `Group` | 2 | members of groups the route names |
//! | `Route` | 3 | middleware the route names directly |
//! | `Handler` | 4 | the route handler |
//! | `RouteAfter` | 5 | `terminate` hooks of group and route middleware |
//! | `GlobalAfter` | 6 | `terminate` hooks of global middleware |

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use portico_core::PipelineError;

use crate::middleware::{Chain, Handler, Layer, Middleware};

/// Position of an entry in the execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Stage {
    /// Global middleware, before the handler.
    GlobalBefore = 1,
    /// Middleware expanded from a named group.
    Group = 2,
    /// Middleware named directly by the route.
    Route = 3,
    /// The route handler.
    Handler = 4,
    /// Terminate hooks of route and group middleware.
    RouteAfter = 5,
    /// Terminate hooks of global middleware.
    GlobalAfter = 6,
}

impl Stage {
    /// Every stage, in execution order.
    pub const ALL: [Self; 6] = [
        Self::GlobalBefore,
        Self::Group,
        Self::Route,
        Self::Handler,
        Self::RouteAfter,
        Self::GlobalAfter,
    ];

    /// Fixed numeric priority; lower runs earlier.
    #[must_use]
    pub const fn priority(self) -> u8 {
        self as u8
    }

    /// Stage name as used in logs and diagnostics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::GlobalBefore => "global-before",
            Self::Group => "group",
            Self::Route => "route",
            Self::Handler => "handler",
            Self::RouteAfter => "route-after",
            Self::GlobalAfter => "global-after",
        }
    }

    /// The stage that runs the `terminate` hook of an entry in `self`.
    #[must_use]
    pub const fn after(self) -> Self {
        match self {
            Self::GlobalBefore | Self::GlobalAfter => Self::GlobalAfter,
            _ => Self::RouteAfter,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A middleware reference as written in route and group lists:
/// `name` or `name:arg,arg`.
///
/// ```rust
/// use portico_middleware::MiddlewareSpec;
///
/// let spec: MiddlewareSpec = "throttle:60,1".parse().unwrap();
/// assert_eq!(spec.id, "throttle");
/// assert_eq!(spec.args, ["60", "1"]);
/// assert_eq!(spec.to_string(), "throttle:60,1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MiddlewareSpec {
    /// Registered identifier, group name or alias.
    pub id: String,
    /// Arguments after the colon.
    pub args: Vec<String>,
}

impl MiddlewareSpec {
    /// A spec without arguments.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            args: Vec::new(),
        }
    }

    /// Parses `name` or `name:arg,arg`.
    pub fn parse(raw: &str) -> Result<Self, PipelineError> {
        let raw = raw.trim();
        let (id, args) = match raw.split_once(':') {
            Some((id, args)) => {
                let args: Vec<String> = args.split(',').map(|a| a.trim().to_string()).collect();
                if args.iter().any(String::is_empty) {
                    return Err(PipelineError::InvalidArguments {
                        id: id.trim().to_string(),
                        reason: format!("empty argument in '{raw}'"),
                    });
                }
                (id.trim(), args)
            }
            None => (raw, Vec::new()),
        };
        if id.is_empty() {
            return Err(PipelineError::UnknownMiddleware(raw.to_string()));
        }
        Ok(Self {
            id: id.to_string(),
            args,
        })
    }
}

impl FromStr for MiddlewareSpec {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for MiddlewareSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)?;
        if !self.args.is_empty() {
            write!(f, ":{}", self.args.join(","))?;
        }
        Ok(())
    }
}

/// Builds a middleware instance for one request.
pub type MiddlewareFactory = Arc<dyn Fn() -> Box<dyn Middleware> + Send + Sync>;

/// How a planned entry obtains its instance.
#[derive(Clone)]
pub(crate) enum Slot {
    /// One instance serves every request.
    Shared(Arc<dyn Middleware>),
    /// A fresh instance per request.
    PerRequest(MiddlewareFactory),
}

/// One resolved middleware in a pipeline.
#[derive(Clone)]
pub(crate) struct PlannedEntry {
    pub(crate) spec: MiddlewareSpec,
    pub(crate) stage: Stage,
    pub(crate) slot: Slot,
}

/// The resolved chain for a route: middleware in execution order, then
/// the handler.
///
/// Immutable and shared by every request to the route. Each request gets
/// its own chain from [`Pipeline::instantiate`], so per-request middleware
/// are constructed fresh every time.
#[derive(Clone)]
pub struct Pipeline {
    entries: Vec<PlannedEntry>,
    handler: Arc<dyn Handler>,
}

impl Pipeline {
    pub(crate) fn new(entries: Vec<PlannedEntry>, handler: Arc<dyn Handler>) -> Self {
        Self { entries, handler }
    }

    /// Builds the chain one request runs through.
    pub(crate) fn instantiate(&self) -> Chain<'_> {
        let layers = self
            .entries
            .iter()
            .map(|entry| {
                let layer = match &entry.slot {
                    Slot::Shared(instance) => Layer::Shared(instance.as_ref()),
                    Slot::PerRequest(factory) => Layer::Owned(factory()),
                };
                (entry.stage, layer)
            })
            .collect();
        Chain {
            layers,
            handler: self.handler.as_ref(),
        }
    }

    /// Resolved middleware, in execution order.
    pub fn middleware(&self) -> impl Iterator<Item = &MiddlewareSpec> {
        self.entries.iter().map(|e| &e.spec)
    }

    /// Resolved middleware as `name:args` strings.
    #[must_use]
    pub fn middleware_ids(&self) -> Vec<String> {
        self.middleware().map(ToString::to_string).collect()
    }

    /// Stage of each middleware entry, in execution order.
    #[must_use]
    pub fn stages(&self) -> Vec<Stage> {
        self.entries.iter().map(|e| e.stage).collect()
    }

    /// Number of chain positions, handler included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len() + 1
    }

    /// Always `false`: a pipeline has at least its handler.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("middleware", &self.middleware_ids())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_priorities() {
        let priorities: Vec<u8> = Stage::ALL.iter().map(|s| s.priority()).collect();
        assert_eq!(priorities, [1, 2, 3, 4, 5, 6]);
        assert!(Stage::Group < Stage::Route);
        assert_eq!(Stage::GlobalBefore.after(), Stage::GlobalAfter);
        assert_eq!(Stage::Group.after(), Stage::RouteAfter);
        assert_eq!(Stage::Route.after(), Stage::RouteAfter);
    }

    #[test]
    fn test_spec_parse() {
        assert_eq!(MiddlewareSpec::parse("auth").unwrap(), MiddlewareSpec::new("auth"));
        let spec = MiddlewareSpec::parse(" throttle:10, 5 ").unwrap();
        assert_eq!(spec.args, ["10", "5"]);
        assert!(matches!(
            MiddlewareSpec::parse("throttle:10,"),
            Err(PipelineError::InvalidArguments { .. })
        ));
        assert!(matches!(
            MiddlewareSpec::parse(":x"),
            Err(PipelineError::UnknownMiddleware(_))
        ));
    }
}
