//! Selector routing.
//!
//! Selectors are normalized before matching: an empty selector becomes "/",
//! a leading "/" is added, the first "." becomes "/" and the result is
//! lower-cased. So `Math.Add`, `math/add` and `/math/add` all name
//! `/math/add`.
//!
//! Patterns ending in "/" also match every selector below them. An exact
//! match beats a prefix match and the longest prefix wins. A prefix handler
//! that is itself a [`PrefixMatcher`] (for example a nested [`RespondMux`])
//! resolves the rest of the selector.

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::codec::{Codec, JsonCodec};
use crate::error::{Result, RpcError};
use crate::responder::{Call, Responder};

/// Answers calls routed to it.
#[async_trait]
pub trait Handler<C: Codec = JsonCodec>: Send + Sync + 'static {
    async fn respond_rpc(&self, responder: &mut Responder<C>, call: &mut Call<C>) -> Result<()>;

    /// Handlers that route further expose their matcher here.
    fn as_matcher(&self) -> Option<&dyn PrefixMatcher<C>> {
        None
    }
}

/// Resolves the part of a selector left over after a prefix match.
pub trait PrefixMatcher<C: Codec = JsonCodec>: Send + Sync {
    fn match_selector(&self, rest: &str) -> Option<Route<C>>;
}

/// A matched handler and the normalized pattern it was registered under.
pub struct Route<C: Codec = JsonCodec> {
    pub pattern: String,
    pub handler: Arc<dyn Handler<C>>,
}

impl<C: Codec> Clone for Route<C> {
    fn clone(&self) -> Self {
        Self {
            pattern: self.pattern.clone(),
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<C: Codec> std::fmt::Debug for Route<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("pattern", &self.pattern)
            .finish_non_exhaustive()
    }
}

/// Normalize a selector or pattern for matching.
pub fn normalize_selector(selector: &str) -> String {
    let rooted = if selector.is_empty() {
        "/".to_string()
    } else if selector.starts_with('/') {
        selector.to_string()
    } else {
        format!("/{selector}")
    };
    rooted.replacen('.', "/", 1).to_lowercase()
}

/// Responds to every call with `not found: <selector>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotFoundHandler;

#[async_trait]
impl<C: Codec> Handler<C> for NotFoundHandler {
    async fn respond_rpc(&self, responder: &mut Responder<C>, call: &mut Call<C>) -> Result<()> {
        responder
            .return_error(format!("not found: {}", call.selector()))
            .await
    }
}

struct Routes<C: Codec> {
    exact: HashMap<String, Arc<dyn Handler<C>>>,
    /// Prefix patterns, longest first.
    prefixes: Vec<Route<C>>,
}

/// Routes calls to handlers by selector.
pub struct RespondMux<C: Codec = JsonCodec> {
    routes: RwLock<Routes<C>>,
}

impl<C: Codec> Default for RespondMux<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Codec> RespondMux<C> {
    pub fn new() -> Self {
        Self {
            routes: RwLock::new(Routes {
                exact: HashMap::new(),
                prefixes: Vec::new(),
            }),
        }
    }

    /// Register `handler` for `pattern`, replacing any previous handler.
    pub fn handle(&self, pattern: &str, handler: impl Handler<C>) {
        self.handle_shared(pattern, Arc::new(handler));
    }

    /// Register an already shared handler.
    pub fn handle_shared(&self, pattern: &str, handler: Arc<dyn Handler<C>>) {
        let pattern = normalize_selector(pattern);
        let mut routes = self.write();
        if routes
            .exact
            .insert(pattern.clone(), Arc::clone(&handler))
            .is_some()
        {
            warn!(pattern = %pattern, "replacing existing handler");
        }
        if pattern.ends_with('/') {
            routes.prefixes.retain(|route| route.pattern != pattern);
            let at = routes
                .prefixes
                .partition_point(|route| route.pattern.len() >= pattern.len());
            routes.prefixes.insert(at, Route { pattern, handler });
        } else {
            debug!(pattern = %pattern, "handler registered");
        }
    }

    /// Unregister `pattern`, returning its handler.
    pub fn remove(&self, pattern: &str) -> Option<Arc<dyn Handler<C>>> {
        let pattern = normalize_selector(pattern);
        let mut routes = self.write();
        routes.prefixes.retain(|route| route.pattern != pattern);
        routes.exact.remove(&pattern)
    }

    /// Find the handler for `selector`, if any.
    pub fn lookup(&self, selector: &str) -> Option<Route<C>> {
        let path = normalize_selector(selector);
        let prefix = {
            let routes = self.read();
            if let Some(handler) = routes.exact.get(&path) {
                return Some(Route {
                    pattern: path,
                    handler: Arc::clone(handler),
                });
            }
            routes
                .prefixes
                .iter()
                .find(|route| path.starts_with(&route.pattern))
                .cloned()?
        };

        match prefix.handler.as_matcher() {
            Some(matcher) => matcher.match_selector(&path[prefix.pattern.len()..]),
            None => Some(prefix),
        }
    }

    /// Like [`lookup`](Self::lookup), falling back to [`NotFoundHandler`]
    /// under an empty pattern.
    pub fn handler_for(&self, selector: &str) -> Route<C> {
        self.lookup(selector).unwrap_or_else(|| Route {
            pattern: String::new(),
            handler: Arc::new(NotFoundHandler),
        })
    }

    pub fn len(&self) -> usize {
        self.read().exact.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> RwLockReadGuard<'_, Routes<C>> {
        self.routes
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Routes<C>> {
        self.routes
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<C: Codec> PrefixMatcher<C> for RespondMux<C> {
    fn match_selector(&self, rest: &str) -> Option<Route<C>> {
        self.lookup(rest)
    }
}

/// Routing a call through a mux used as a handler looks up the call's full
/// selector. A mux mounted under a prefix is reached through
/// [`Handler::as_matcher`] during the parent's lookup, which resolves the
/// remainder first; dispatching to it directly only works when its patterns
/// are full selectors.
#[async_trait]
impl<C: Codec> Handler<C> for RespondMux<C> {
    async fn respond_rpc(&self, responder: &mut Responder<C>, call: &mut Call<C>) -> Result<()> {
        let route = self.handler_for(call.selector());
        route.handler.respond_rpc(responder, call).await
    }

    fn as_matcher(&self) -> Option<&dyn PrefixMatcher<C>> {
        Some(self)
    }
}

impl<C: Codec> std::fmt::Debug for RespondMux<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let routes = self.read();
        let mut patterns: Vec<&String> = routes.exact.keys().collect();
        patterns.sort();
        f.debug_struct("RespondMux")
            .field("patterns", &patterns)
            .finish()
    }
}

/// A handler that decodes its arguments, runs `f` and returns the result.
///
/// ```ignore
/// mux.handle("math/add", unary(|(a, b): (i64, i64)| async move { Ok::<_, RpcError>(a + b) }));
/// ```
pub fn unary<A, R, F, Fut>(f: F) -> Unary<F, A, R>
where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R>> + Send,
{
    Unary {
        f,
        _marker: PhantomData,
    }
}

/// See [`unary`].
pub struct Unary<F, A, R> {
    f: F,
    _marker: PhantomData<fn(A) -> R>,
}

#[async_trait]
impl<C, F, Fut, A, R> Handler<C> for Unary<F, A, R>
where
    C: Codec,
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R>> + Send,
    A: DeserializeOwned + Send + 'static,
    R: Serialize + Send + Sync + 'static,
{
    async fn respond_rpc(&self, responder: &mut Responder<C>, call: &mut Call<C>) -> Result<()> {
        let args: A = call
            .receive()
            .await?
            .ok_or(RpcError::MissingValue("call arguments"))?;
        let value = (self.f)(args).await?;
        responder.return_value(&value).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named;

    #[async_trait]
    impl Handler for Named {
        async fn respond_rpc(&self, responder: &mut Responder, _call: &mut Call) -> Result<()> {
            responder.return_value(&()).await
        }
    }

    fn pattern(mux: &RespondMux, selector: &str) -> Option<String> {
        mux.lookup(selector).map(|route| route.pattern)
    }

    #[test]
    fn normalization() {
        assert_eq!(normalize_selector(""), "/");
        assert_eq!(normalize_selector("ping"), "/ping");
        assert_eq!(normalize_selector("/Math/Add"), "/math/add");
        assert_eq!(normalize_selector("Math.Add"), "/math/add");
        assert_eq!(normalize_selector("a.b.c"), "/a/b.c");
    }

    #[test]
    fn exact_beats_prefix_and_longest_prefix_wins() {
        let mux = RespondMux::new();
        mux.handle("a", Named);
        mux.handle("a/b", Named);
        mux.handle("a/", Named);
        mux.handle("a/b/c/", Named);

        assert_eq!(pattern(&mux, "a/b/c/d").as_deref(), Some("/a/b/c/"));
        assert_eq!(pattern(&mux, "a/b").as_deref(), Some("/a/b"));
        assert_eq!(pattern(&mux, "A.B").as_deref(), Some("/a/b"));
        assert_eq!(pattern(&mux, "a/x").as_deref(), Some("/a/"));
        assert_eq!(pattern(&mux, "a").as_deref(), Some("/a"));
        assert_eq!(pattern(&mux, "x"), None);
        assert_eq!(mux.handler_for("x").pattern, "");
    }

    #[test]
    fn nested_mux_resolves_remainder() {
        let inner = RespondMux::new();
        inner.handle("ping", Named);
        inner.handle("deep/", Named);

        let outer = RespondMux::new();
        outer.handle("svc/", inner);

        assert_eq!(pattern(&outer, "svc/ping").as_deref(), Some("/ping"));
        assert_eq!(pattern(&outer, "svc/deep/er").as_deref(), Some("/deep/"));
        assert_eq!(pattern(&outer, "svc/missing"), None);
    }

    #[test]
    fn unary_closures_register_as_handlers() {
        let mux = RespondMux::new();
        mux.handle(
            "echo",
            unary(|text: String| async move { Ok::<_, RpcError>(text) }),
        );
        mux.handle(
            "pair",
            unary(|n: u32| async move { Ok::<_, RpcError>(vec![n; 2]) }),
        );
        assert_eq!(mux.len(), 2);
        assert_eq!(pattern(&mux, "echo").as_deref(), Some("/echo"));
    }

    #[test]
    fn mounted_mux_only_sees_the_remainder() {
        let inner = RespondMux::new();
        inner.handle("ping", Named);
        assert_eq!(inner.handler_for("svc/ping").pattern, "");
        assert_eq!(inner.handler_for("ping").pattern, "/ping");

        let outer = RespondMux::new();
        outer.handle("svc/", inner);
        assert_eq!(outer.handler_for("svc/ping").pattern, "/ping");
    }

    #[test]
    fn replace_and_remove() {
        let mux = RespondMux::new();
        mux.handle("x/", Named);
        mux.handle("x/", Named);
        assert_eq!(mux.len(), 1);
        assert_eq!(pattern(&mux, "x/y").as_deref(), Some("/x/"));

        assert!(mux.remove("X/").is_some());
        assert!(mux.remove("x/").is_none());
        assert!(mux.is_empty());
        assert_eq!(pattern(&mux, "x/y"), None);
    }
}
