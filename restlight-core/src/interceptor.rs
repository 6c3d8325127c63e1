// Handler interceptors and per-route interceptor matching

use crate::http::{AsyncRequest, AsyncResponse};
use crate::param::MethodMeta;
use crate::route::pattern::PathPattern;
use crate::route::predicate::RouteCondition;
use crate::{Error, Result};
use async_trait::async_trait;
use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

/// Hooks around handler invocation.
///
/// `pre_handle` runs in ascending [`Interceptor::order`]; `post_handle` and
/// `after_completion` run in reverse. Returning `false` from `pre_handle`
/// stops the request: the handler is not invoked, no `post_handle` runs, and
/// `after_completion` runs for every interceptor whose `pre_handle` completed.
#[async_trait]
pub trait Interceptor: Send + Sync {
    async fn pre_handle(
        &self,
        _request: &AsyncRequest,
        _response: &mut AsyncResponse,
        _handler: &MethodMeta,
    ) -> Result<bool> {
        Ok(true)
    }

    async fn post_handle(
        &self,
        _request: &AsyncRequest,
        _response: &mut AsyncResponse,
        _handler: &MethodMeta,
    ) -> Result<()> {
        Ok(())
    }

    /// Always called once `pre_handle` completed, with the request's error if
    /// it failed. Errors returned here are logged and dropped.
    async fn after_completion(
        &self,
        _request: &AsyncRequest,
        _response: &mut AsyncResponse,
        _handler: &MethodMeta,
        _error: Option<&Error>,
    ) -> Result<()> {
        Ok(())
    }

    /// Lower runs first.
    fn order(&self) -> i32 {
        0
    }

    /// Which routes and requests this interceptor applies to.
    fn predicate(&self) -> InterceptorPredicate {
        InterceptorPredicate::Always
    }

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

type RouteFn = Arc<dyn Fn(&MethodMeta, &RouteCondition) -> bool + Send + Sync>;
type RequestFn = Arc<dyn Fn(&AsyncRequest) -> bool + Send + Sync>;

/// When an interceptor applies.
///
/// `Always` and `Route` are decided once per route at deploy time; `Paths`
/// and `Request` are tested on every request.
#[derive(Clone)]
pub enum InterceptorPredicate {
    Always,
    Never,
    Route(RouteFn),
    /// Request path must match an include pattern (or there are none) and no
    /// exclude pattern.
    Paths {
        includes: Vec<String>,
        excludes: Vec<String>,
    },
    Request(RequestFn),
}

impl InterceptorPredicate {
    pub fn route(f: impl Fn(&MethodMeta, &RouteCondition) -> bool + Send + Sync + 'static) -> Self {
        InterceptorPredicate::Route(Arc::new(f))
    }

    pub fn request(f: impl Fn(&AsyncRequest) -> bool + Send + Sync + 'static) -> Self {
        InterceptorPredicate::Request(Arc::new(f))
    }

    pub fn paths<I, E>(includes: I, excludes: E) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        E: IntoIterator,
        E::Item: Into<String>,
    {
        InterceptorPredicate::Paths {
            includes: includes.into_iter().map(Into::into).collect(),
            excludes: excludes.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Debug for InterceptorPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterceptorPredicate::Always => f.write_str("Always"),
            InterceptorPredicate::Never => f.write_str("Never"),
            InterceptorPredicate::Route(_) => f.write_str("Route(..)"),
            InterceptorPredicate::Paths { includes, excludes } => f
                .debug_struct("Paths")
                .field("includes", includes)
                .field("excludes", excludes)
                .finish(),
            InterceptorPredicate::Request(_) => f.write_str("Request(..)"),
        }
    }
}

#[derive(Clone)]
enum RequestTest {
    Paths {
        includes: Vec<PathPattern>,
        excludes: Vec<PathPattern>,
    },
    Request(RequestFn),
}

impl RequestTest {
    fn test(&self, request: &AsyncRequest, matrix: bool) -> bool {
        match self {
            RequestTest::Paths { includes, excludes } => {
                let path = request.path();
                (includes.is_empty() || includes.iter().any(|p| p.matches(path, matrix).is_some()))
                    && !excludes.iter().any(|p| p.matches(path, matrix).is_some())
            }
            RequestTest::Request(f) => f(request),
        }
    }
}

#[derive(Clone)]
struct Entry {
    order: i32,
    /// Registration position, breaks ties between equal orders.
    seq: usize,
    interceptor: Arc<dyn Interceptor>,
}

thread_local! {
    static SCRATCH: RefCell<Vec<Entry>> = const { RefCell::new(Vec::new()) };
}

/// The interceptors bound to one route.
///
/// Built at deploy time. Interceptors whose predicate is decided per route
/// are kept in a ready list; the rest are tested on every request and merged
/// in by order.
#[derive(Clone, Default)]
pub struct InterceptorMatcher {
    fixed: Vec<Entry>,
    dynamic: Vec<(Entry, RequestTest)>,
    matrix: bool,
}

impl InterceptorMatcher {
    /// Bind `interceptors` (in registration order) to one route.
    pub fn new(
        interceptors: &[Arc<dyn Interceptor>],
        method: &MethodMeta,
        condition: &RouteCondition,
        matrix: bool,
    ) -> Result<Self> {
        let mut matcher = InterceptorMatcher {
            matrix,
            ..Default::default()
        };

        for (seq, interceptor) in interceptors.iter().enumerate() {
            let entry = Entry {
                order: interceptor.order(),
                seq,
                interceptor: interceptor.clone(),
            };
            match interceptor.predicate() {
                InterceptorPredicate::Always => matcher.fixed.push(entry),
                InterceptorPredicate::Never => {}
                InterceptorPredicate::Route(f) => {
                    if f(method, condition) {
                        matcher.fixed.push(entry);
                    }
                }
                InterceptorPredicate::Paths { includes, excludes } => {
                    let test = RequestTest::Paths {
                        includes: compile(&includes)?,
                        excludes: compile(&excludes)?,
                    };
                    matcher.dynamic.push((entry, test));
                }
                InterceptorPredicate::Request(f) => {
                    matcher.dynamic.push((entry, RequestTest::Request(f)));
                }
            }
        }

        matcher.fixed.sort_by_key(|e| (e.order, e.seq));
        matcher.dynamic.sort_by_key(|(e, _)| (e.order, e.seq));
        tracing::debug!(
            handler = %method.qualified_name(),
            fixed = matcher.fixed.len(),
            dynamic = matcher.dynamic.len(),
            "interceptors bound"
        );
        Ok(matcher)
    }

    pub fn is_empty(&self) -> bool {
        self.fixed.is_empty() && self.dynamic.is_empty()
    }

    /// Interceptors that apply to `request`, in `pre_handle` order.
    pub fn matching(&self, request: &AsyncRequest) -> Vec<Arc<dyn Interceptor>> {
        if self.dynamic.is_empty() {
            return self.fixed.iter().map(|e| e.interceptor.clone()).collect();
        }

        SCRATCH.with(|scratch| match scratch.try_borrow_mut() {
            Ok(mut buf) => self.collect_into(&mut buf, request),
            // re-entered from a request predicate
            Err(_) => self.collect_into(&mut Vec::new(), request),
        })
    }

    fn collect_into(&self, buf: &mut Vec<Entry>, request: &AsyncRequest) -> Vec<Arc<dyn Interceptor>> {
        buf.clear();
        buf.extend(self.fixed.iter().cloned());
        buf.extend(
            self.dynamic
                .iter()
                .filter(|(_, test)| test.test(request, self.matrix))
                .map(|(e, _)| e.clone()),
        );
        buf.sort_by_key(|e| (e.order, e.seq));
        buf.drain(..).map(|e| e.interceptor).collect()
    }
}

impl fmt::Debug for InterceptorMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorMatcher")
            .field("fixed", &self.fixed.len())
            .field("dynamic", &self.dynamic.len())
            .finish()
    }
}

fn compile(patterns: &[String]) -> Result<Vec<PathPattern>> {
    patterns.iter().map(|p| PathPattern::parse(p)).collect()
}
