//! Middleware registration and pipeline building.
//!
//! Middleware are registered explicitly under an identifier; routes, groups
//! and the global list refer to them by that identifier. Nothing is looked
//! up by reflection: an identifier that was never registered fails the
//! build with [`PipelineError::UnknownMiddleware`].
//!
//! # Example
//!
//! ```rust
//! use portico_core::{ChainResult, OutboundMessage};
//! use portico_middleware::{
//!     handler_fn, BoxFuture, Middleware, MiddlewareRegistry, Next, PipelineContext,
//! };
//! use std::sync::Arc;
//!
//! struct Audit;
//!
//! impl Middleware for Audit {
//!     fn name(&self) -> &'static str {
//!         "audit"
//!     }
//!
//!     fn handle<'a>(&'a self, ctx: &'a mut PipelineContext, next: Next<'a>) -> BoxFuture<'a, ChainResult> {
//!         Box::pin(async move { next.run(ctx).await })
//!     }
//! }
//!
//! let mut registry = MiddlewareRegistry::new();
//! registry
//!     .register("audit", Audit)
//!     .group("admin", ["audit"])
//!     .alias("log", "audit");
//!
//! let handler = Arc::new(handler_fn(|_ctx| async { Ok(OutboundMessage::ok()) }));
//! let pipeline = registry.build(&["admin".to_string()], handler).unwrap();
//! assert_eq!(pipeline.middleware_ids(), ["audit"]);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use portico_core::PipelineError;

use crate::middleware::{Handler, Middleware};
use crate::pipeline::{MiddlewareFactory, MiddlewareSpec, Pipeline, PlannedEntry, Slot, Stage};

type ArgsConstructor =
    Arc<dyn Fn(&[String]) -> Result<Arc<dyn Middleware>, PipelineError> + Send + Sync>;

enum Registration {
    Instance(Arc<dyn Middleware>),
    WithArgs(ArgsConstructor),
    PerRequest(MiddlewareFactory),
}

#[derive(Debug, Clone)]
struct GlobalEntry {
    raw: String,
    priority: i32,
}

/// Registered middleware, groups, aliases and the global list.
///
/// Populated at startup, then used read-only to build one [`Pipeline`] per
/// route.
#[derive(Default)]
pub struct MiddlewareRegistry {
    middleware: HashMap<String, Registration>,
    global: Vec<GlobalEntry>,
    groups: IndexMap<String, Vec<String>>,
    aliases: HashMap<String, String>,
}

impl MiddlewareRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a shared instance that takes no arguments.
    pub fn register<M: Middleware>(&mut self, id: impl Into<String>, middleware: M) -> &mut Self {
        self.middleware
            .insert(id.into(), Registration::Instance(Arc::new(middleware)));
        self
    }

    /// Registers a constructor for middleware written as `id:arg,arg`.
    ///
    /// The constructor runs once per distinct argument list at build time.
    /// The resulting instance is shared by every request.
    pub fn register_with<M, F>(&mut self, id: impl Into<String>, constructor: F) -> &mut Self
    where
        M: Middleware,
        F: Fn(&[String]) -> Result<M, PipelineError> + Send + Sync + 'static,
    {
        let constructor: ArgsConstructor =
            Arc::new(move |args| constructor(args).map(|m| Arc::new(m) as Arc<dyn Middleware>));
        self.middleware
            .insert(id.into(), Registration::WithArgs(constructor));
        self
    }

    /// Registers a factory that builds a fresh instance for every request.
    pub fn register_factory<M, F>(&mut self, id: impl Into<String>, factory: F) -> &mut Self
    where
        M: Middleware,
        F: Fn() -> M + Send + Sync + 'static,
    {
        let factory: MiddlewareFactory = Arc::new(move || Box::new(factory()) as Box<dyn Middleware>);
        self.middleware
            .insert(id.into(), Registration::PerRequest(factory));
        self
    }

    /// Adds middleware that runs for every route.
    ///
    /// Lower priorities run first; equal priorities keep registration order.
    pub fn global(&mut self, spec: impl Into<String>, priority: i32) -> &mut Self {
        self.global.push(GlobalEntry {
            raw: spec.into(),
            priority,
        });
        self
    }

    /// Defines a named group. Members may be middleware, aliases or groups.
    pub fn group<I, S>(&mut self, name: impl Into<String>, members: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups
            .insert(name.into(), members.into_iter().map(Into::into).collect());
        self
    }

    /// Makes `alias` another name for `target`.
    pub fn alias(&mut self, alias: impl Into<String>, target: impl Into<String>) -> &mut Self {
        self.aliases.insert(alias.into(), target.into());
        self
    }

    /// `true` if `id` names registered middleware, a group or an alias.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.middleware.contains_key(id)
            || self.groups.contains_key(id)
            || self.aliases.contains_key(id)
    }

    /// Registered middleware identifiers, sorted.
    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.middleware.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Builds the pipeline for a route's middleware list and handler.
    pub fn build(
        &self,
        route_middleware: &[String],
        handler: Arc<dyn Handler>,
    ) -> Result<Pipeline, PipelineError> {
        let entries = self
            .plan(route_middleware)?
            .into_iter()
            .map(|(spec, stage)| {
                let slot = self.instantiate(&spec)?;
                Ok(PlannedEntry { spec, stage, slot })
            })
            .collect::<Result<Vec<_>, PipelineError>>()?;
        Ok(Pipeline::new(entries, handler))
    }

    /// Checks that a route's middleware list resolves, returning the
    /// flattened identifiers in execution order.
    pub fn validate(&self, route_middleware: &[String]) -> Result<Vec<String>, PipelineError> {
        let plan = self.plan(route_middleware)?;
        for (spec, _) in &plan {
            self.instantiate(spec)?;
        }
        Ok(plan.iter().map(|(spec, _)| spec.to_string()).collect())
    }

    /// Expands, sorts and de-duplicates.
    fn plan(&self, route_middleware: &[String]) -> Result<Vec<(MiddlewareSpec, Stage)>, PipelineError> {
        let mut global = self.global.clone();
        global.sort_by_key(|entry| entry.priority);

        let mut expanded = Vec::new();
        for entry in &global {
            self.expand(&entry.raw, Stage::GlobalBefore, &mut Vec::new(), &mut expanded)?;
        }
        for raw in route_middleware {
            self.expand(raw, Stage::Route, &mut Vec::new(), &mut expanded)?;
        }

        expanded.sort_by_key(|(_, stage)| *stage);

        let mut planned: Vec<(MiddlewareSpec, Stage)> = Vec::with_capacity(expanded.len());
        for (spec, stage) in expanded {
            if !planned.iter().any(|(seen, _)| *seen == spec) {
                planned.push((spec, stage));
            }
        }
        Ok(planned)
    }

    fn expand(
        &self,
        raw: &str,
        stage: Stage,
        path: &mut Vec<String>,
        out: &mut Vec<(MiddlewareSpec, Stage)>,
    ) -> Result<(), PipelineError> {
        let mut spec = MiddlewareSpec::parse(raw)?;
        if let Some(target) = self.aliases.get(&spec.id) {
            spec.id.clone_from(target);
        }

        let Some(members) = self.groups.get(&spec.id) else {
            out.push((spec, stage));
            return Ok(());
        };

        if !spec.args.is_empty() {
            return Err(PipelineError::InvalidArguments {
                id: spec.id,
                reason: "groups take no arguments".to_string(),
            });
        }
        if path.contains(&spec.id) {
            path.push(spec.id);
            return Err(PipelineError::GroupCycle(path.join(" -> ")));
        }

        // Global groups stay global; any other group lands in the group stage.
        let member_stage = if stage == Stage::GlobalBefore {
            Stage::GlobalBefore
        } else {
            Stage::Group
        };
        path.push(spec.id.clone());
        for member in members {
            self.expand(member, member_stage, path, out)?;
        }
        path.pop();
        Ok(())
    }

    fn instantiate(&self, spec: &MiddlewareSpec) -> Result<Slot, PipelineError> {
        let registration = self
            .middleware
            .get(&spec.id)
            .ok_or_else(|| PipelineError::UnknownMiddleware(spec.id.clone()))?;

        match registration {
            Registration::Instance(instance) => {
                reject_args(spec)?;
                Ok(Slot::Shared(Arc::clone(instance)))
            }
            Registration::WithArgs(constructor) => Ok(Slot::Shared(constructor(&spec.args)?)),
            Registration::PerRequest(factory) => {
                reject_args(spec)?;
                Ok(Slot::PerRequest(Arc::clone(factory)))
            }
        }
    }
}

fn reject_args(spec: &MiddlewareSpec) -> Result<(), PipelineError> {
    if spec.args.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::InvalidArguments {
            id: spec.id.clone(),
            reason: "takes no arguments".to_string(),
        })
    }
}

impl fmt::Debug for MiddlewareRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareRegistry")
            .field("middleware", &self.ids())
            .field("global", &self.global)
            .field("groups", &self.groups)
            .field("aliases", &self.aliases)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::PipelineContext;
    use crate::middleware::{handler_fn, BoxFuture, Next};
    use portico_core::{ChainResult, OutboundMessage};

    struct Named(&'static str);

    impl Middleware for Named {
        fn name(&self) -> &'static str {
            self.0
        }

        fn handle<'a>(&'a self, ctx: &'a mut PipelineContext, next: Next<'a>) -> BoxFuture<'a, ChainResult> {
            Box::pin(async move { next.run(ctx).await })
        }
    }

    fn handler() -> Arc<dyn Handler> {
        Arc::new(handler_fn(|_ctx| async { Ok(OutboundMessage::ok()) }))
    }

    fn list(items: &[&str]) -> Vec<String> {
        items.iter().map(ToString::to_string).collect()
    }

    fn registry() -> MiddlewareRegistry {
        let mut registry = MiddlewareRegistry::new();
        registry
            .register("session", Named("session"))
            .register("csrf", Named("csrf"))
            .register("auth", Named("auth"))
            .register("trim", Named("trim"))
            .register("request_id", Named("request_id"));
        registry
    }

    #[test]
    fn test_global_priority_then_groups_then_route() {
        let mut registry = registry();
        registry
            .global("trim", 20)
            .global("request_id", 10)
            .group("web", ["session", "csrf"]);

        let pipeline = registry.build(&list(&["auth", "web"]), handler()).unwrap();
        assert_eq!(
            pipeline.middleware_ids(),
            ["request_id", "trim", "session", "csrf", "auth"]
        );
        assert_eq!(
            pipeline.stages(),
            [
                Stage::GlobalBefore,
                Stage::GlobalBefore,
                Stage::Group,
                Stage::Group,
                Stage::Route
            ]
        );
        assert_eq!(pipeline.len(), 6);
    }

    #[test]
    fn test_equal_priorities_keep_registration_order() {
        let mut registry = registry();
        registry.global("trim", 0).global("request_id", 0);
        let ids = registry.validate(&[]).unwrap();
        assert_eq!(ids, ["trim", "request_id"]);
    }

    #[test]
    fn test_duplicates_keep_first() {
        let mut registry = registry();
        registry.group("web", ["session", "auth"]);
        let ids = registry.validate(&list(&["web", "auth", "session"])).unwrap();
        assert_eq!(ids, ["session", "auth"]);
    }

    #[test]
    fn test_unknown_middleware() {
        let err = registry().validate(&list(&["nope"])).unwrap_err();
        assert_eq!(err, PipelineError::UnknownMiddleware("nope".into()));
    }

    #[test]
    fn test_nested_groups_and_cycles() {
        let mut registry = registry();
        registry
            .group("web", ["session", "panel"])
            .group("panel", ["auth"]);
        assert_eq!(
            registry.validate(&list(&["web"])).unwrap(),
            ["session", "auth"]
        );

        registry.group("panel", ["auth", "web"]);
        let err = registry.validate(&list(&["web"])).unwrap_err();
        assert_eq!(err, PipelineError::GroupCycle("web -> panel -> web".into()));
    }

    #[test]
    fn test_alias_resolves() {
        let mut registry = registry();
        registry.alias("authenticate", "auth");
        assert!(registry.contains("authenticate"));
        assert_eq!(registry.validate(&list(&["authenticate"])).unwrap(), ["auth"]);
    }

    #[test]
    fn test_arguments() {
        let mut registry = registry();
        registry.register_with("limit", |args: &[String]| {
            if args.len() == 1 {
                Ok(Named("limit"))
            } else {
                Err(PipelineError::InvalidArguments {
                    id: "limit".into(),
                    reason: "expected one argument".into(),
                })
            }
        });

        assert_eq!(
            registry.validate(&list(&["limit:5", "limit:6"])).unwrap(),
            ["limit:5", "limit:6"]
        );
        assert!(matches!(
            registry.validate(&list(&["limit"])),
            Err(PipelineError::InvalidArguments { .. })
        ));
        assert!(matches!(
            registry.validate(&list(&["auth:admin"])),
            Err(PipelineError::InvalidArguments { .. })
        ));
    }
}
