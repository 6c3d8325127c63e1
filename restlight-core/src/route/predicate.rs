// Route predicates: method, path, consumes, produces, headers and params

use super::pattern::{PathMatch, PathPattern, PatternRank};
use crate::http::{AsyncRequest, HttpMethod};
use crate::media_type::Accept;
use crate::{Error, MediaType, Result};

/// A `name`, `!name`, `name=value` or `name!=value` condition on a header or
/// a request parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    Present(String),
    Absent(String),
    Equals(String, String),
    NotEquals(String, String),
}

impl Expression {
    pub fn parse(expr: &str) -> Result<Self> {
        let expr = expr.trim();
        let parsed = if let Some((name, value)) = expr.split_once("!=") {
            Expression::NotEquals(name.trim().to_string(), value.trim().to_string())
        } else if let Some((name, value)) = expr.split_once('=') {
            Expression::Equals(name.trim().to_string(), value.trim().to_string())
        } else if let Some(name) = expr.strip_prefix('!') {
            Expression::Absent(name.trim().to_string())
        } else {
            Expression::Present(expr.to_string())
        };
        if parsed.name().is_empty() {
            return Err(Error::config(format!("invalid condition expression '{}'", expr)));
        }
        Ok(parsed)
    }

    pub fn name(&self) -> &str {
        match self {
            Expression::Present(n)
            | Expression::Absent(n)
            | Expression::Equals(n, _)
            | Expression::NotEquals(n, _) => n,
        }
    }

    fn test(&self, value: Option<&str>) -> bool {
        match self {
            Expression::Present(_) => value.is_some(),
            Expression::Absent(_) => value.is_none(),
            Expression::Equals(_, expected) => value == Some(expected.as_str()),
            Expression::NotEquals(_, expected) => value != Some(expected.as_str()),
        }
    }

    /// Whether no value can satisfy both expressions.
    fn contradicts(&self, other: &Expression) -> bool {
        if self.name() != other.name() {
            return false;
        }
        match (self, other) {
            (Expression::Present(_), Expression::Absent(_))
            | (Expression::Absent(_), Expression::Present(_))
            | (Expression::Absent(_), Expression::Equals(..))
            | (Expression::Equals(..), Expression::Absent(_)) => true,
            (Expression::Equals(_, a), Expression::Equals(_, b)) => a != b,
            (Expression::Equals(_, a), Expression::NotEquals(_, b))
            | (Expression::NotEquals(_, b), Expression::Equals(_, a)) => a == b,
            _ => false,
        }
    }
}

fn any_contradiction(a: &[Expression], b: &[Expression]) -> bool {
    a.iter().any(|x| b.iter().any(|y| x.contradicts(y)))
}

/// Header conditions; names compare case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadersPredicate(Vec<Expression>);

impl HeadersPredicate {
    pub fn test(&self, request: &AsyncRequest) -> bool {
        self.0.iter().all(|e| e.test(request.header(e.name())))
    }
}

/// Query parameter conditions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamsPredicate(Vec<Expression>);

impl ParamsPredicate {
    pub fn test(&self, request: &AsyncRequest) -> bool {
        self.0.iter().all(|e| e.test(request.param(e.name())))
    }
}

/// Allowed methods; empty allows any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodsPredicate(Vec<HttpMethod>);

impl MethodsPredicate {
    pub fn test(&self, request: &AsyncRequest) -> bool {
        self.0.is_empty() || self.0.contains(&request.method())
    }

    pub fn methods(&self) -> &[HttpMethod] {
        &self.0
    }

    fn overlaps(&self, other: &MethodsPredicate) -> bool {
        self.0.is_empty() || other.0.is_empty() || self.0.iter().any(|m| other.0.contains(m))
    }
}

/// Request `Content-Type` the route accepts; empty accepts any. A request
/// without a content type passes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsumesPredicate(Vec<MediaType>);

impl ConsumesPredicate {
    pub fn test(&self, request: &AsyncRequest) -> bool {
        if self.0.is_empty() {
            return true;
        }
        match request.content_type() {
            Some(content_type) => self.0.iter().any(|mt| mt.includes(&content_type)),
            None => true,
        }
    }

    pub fn media_types(&self) -> &[MediaType] {
        &self.0
    }
}

/// Media types the route produces.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProducesPredicate(Vec<MediaType>);

impl ProducesPredicate {
    /// Declared types acceptable to the client, by client preference.
    ///
    /// `None` when nothing is acceptable. Without an `Accept` header every
    /// declared type is returned.
    pub fn compatible(&self, request: &AsyncRequest) -> Option<Vec<MediaType>> {
        if self.0.is_empty() {
            return Some(Vec::new());
        }
        let Some(header) = request.headers().accept() else {
            return Some(self.0.clone());
        };
        let accept = Accept::parse(header);
        let mut ranked: Vec<(f32, &MediaType)> = self
            .0
            .iter()
            .map(|mt| (accept.quality_for(mt), mt))
            .filter(|(q, _)| *q > 0.0)
            .collect();
        if ranked.is_empty() {
            return None;
        }
        ranked.sort_by(|a, b| b.0.total_cmp(&a.0));
        Some(ranked.into_iter().map(|(_, mt)| mt.clone()).collect())
    }

    pub fn media_types(&self) -> &[MediaType] {
        &self.0
    }
}

fn media_overlap(a: &[MediaType], b: &[MediaType]) -> bool {
    a.is_empty() || b.is_empty() || a.iter().any(|x| b.iter().any(|y| x.is_compatible_with(y)))
}

pub(crate) type ConditionRank = (Option<PatternRank>, std::cmp::Reverse<usize>, bool);

/// Why a route did not take a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Mismatch {
    Path,
    Method,
    Headers,
    Params,
    Consumes,
    Produces,
}

/// A route that accepted a request.
#[derive(Debug, Clone, Default)]
pub struct RouteMatch {
    pub path: PathMatch,
    /// Compatible produces types, recorded as a request attribute.
    pub produces: Vec<MediaType>,
}

/// Every predicate of one route, AND-composed.
#[derive(Debug, Clone, Default)]
pub struct RouteCondition {
    patterns: Vec<PathPattern>,
    methods: MethodsPredicate,
    consumes: ConsumesPredicate,
    produces: ProducesPredicate,
    headers: HeadersPredicate,
    params: ParamsPredicate,
}

impl RouteCondition {
    pub fn builder() -> RouteConditionBuilder {
        RouteConditionBuilder::default()
    }

    pub fn patterns(&self) -> &[PathPattern] {
        &self.patterns
    }

    pub fn methods(&self) -> &[HttpMethod] {
        self.methods.methods()
    }

    pub fn consumes(&self) -> &[MediaType] {
        self.consumes.media_types()
    }

    pub fn produces(&self) -> &[MediaType] {
        self.produces.media_types()
    }

    /// Path variables declared by every pattern.
    pub fn path_variables(&self) -> Vec<String> {
        let mut vars: Vec<String> = Vec::new();
        for pattern in &self.patterns {
            for var in pattern.variables() {
                if !vars.iter().any(|v| v == var) {
                    vars.push(var.to_string());
                }
            }
        }
        vars
    }

    /// Most specific pattern that matches `path`.
    pub fn match_path(&self, path: &str, matrix: bool) -> Option<PathMatch> {
        self.patterns.iter().find_map(|p| p.matches(path, matrix))
    }

    /// Evaluate every predicate against the request.
    pub fn evaluate(&self, request: &AsyncRequest, matrix: bool) -> std::result::Result<RouteMatch, Mismatch> {
        let path = self.match_path(request.path(), matrix).ok_or(Mismatch::Path)?;
        if !self.methods.test(request) {
            return Err(Mismatch::Method);
        }
        if !self.headers.test(request) {
            return Err(Mismatch::Headers);
        }
        if !self.params.test(request) {
            return Err(Mismatch::Params);
        }
        if !self.consumes.test(request) {
            return Err(Mismatch::Consumes);
        }
        let produces = self.produces.compatible(request).ok_or(Mismatch::Produces)?;
        Ok(RouteMatch { path, produces })
    }

    /// Whether some request could satisfy both conditions.
    pub fn may_ambiguous_with(&self, other: &RouteCondition) -> bool {
        let paths = self
            .patterns
            .iter()
            .any(|a| other.patterns.iter().any(|b| a.may_overlap(b)));

        paths
            && self.methods.overlaps(&other.methods)
            && media_overlap(&self.consumes.0, &other.consumes.0)
            && media_overlap(&self.produces.0, &other.produces.0)
            && !any_contradiction(&self.headers.0, &other.headers.0)
            && !any_contradiction(&self.params.0, &other.params.0)
    }

    /// Ranking key: most specific pattern first, then narrower conditions.
    pub(crate) fn rank(&self) -> ConditionRank {
        let best = self.patterns.iter().map(PathPattern::rank).min();
        let conditions = self.headers.0.len()
            + self.params.0.len()
            + self.consumes.0.len().min(1)
            + self.produces.0.len().min(1);
        (best, std::cmp::Reverse(conditions), self.methods.0.is_empty())
    }
}

impl std::fmt::Display for RouteCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let methods: Vec<&str> = self.methods.0.iter().map(HttpMethod::as_str).collect();
        let patterns: Vec<&str> = self.patterns.iter().map(PathPattern::as_str).collect();
        if methods.is_empty() {
            write!(f, "* {}", patterns.join(" | "))
        } else {
            write!(f, "{} {}", methods.join(","), patterns.join(" | "))
        }
    }
}

#[derive(Debug, Default)]
pub struct RouteConditionBuilder {
    patterns: Vec<String>,
    methods: Vec<HttpMethod>,
    consumes: Vec<String>,
    produces: Vec<String>,
    headers: Vec<String>,
    params: Vec<String>,
}

impl RouteConditionBuilder {
    pub fn path(mut self, pattern: impl Into<String>) -> Self {
        self.patterns.push(pattern.into());
        self
    }

    pub fn method(mut self, method: HttpMethod) -> Self {
        if !self.methods.contains(&method) {
            self.methods.push(method);
        }
        self
    }

    pub fn consumes(mut self, media_type: impl Into<String>) -> Self {
        self.consumes.push(media_type.into());
        self
    }

    pub fn produces(mut self, media_type: impl Into<String>) -> Self {
        self.produces.push(media_type.into());
        self
    }

    pub fn header(mut self, expression: impl Into<String>) -> Self {
        self.headers.push(expression.into());
        self
    }

    pub fn param(mut self, expression: impl Into<String>) -> Self {
        self.params.push(expression.into());
        self
    }

    pub fn build(self) -> Result<RouteCondition> {
        if self.patterns.is_empty() {
            return Err(Error::config("route has no path pattern"));
        }
        let mut patterns = self
            .patterns
            .iter()
            .map(|p| PathPattern::parse(p))
            .collect::<Result<Vec<_>>>()?;
        patterns.sort_by_key(PathPattern::rank);

        Ok(RouteCondition {
            patterns,
            methods: MethodsPredicate(self.methods),
            consumes: ConsumesPredicate(parse_media_types(&self.consumes)?),
            produces: ProducesPredicate(parse_media_types(&self.produces)?),
            headers: HeadersPredicate(parse_expressions(&self.headers)?),
            params: ParamsPredicate(parse_expressions(&self.params)?),
        })
    }
}

fn parse_media_types(raw: &[String]) -> Result<Vec<MediaType>> {
    raw.iter()
        .map(|s| {
            MediaType::parse(s).ok_or_else(|| Error::config(format!("invalid media type '{}'", s)))
        })
        .collect()
}

fn parse_expressions(raw: &[String]) -> Result<Vec<Expression>> {
    raw.iter().map(|s| Expression::parse(s)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get(path: &str) -> RouteCondition {
        RouteCondition::builder()
            .path(path)
            .method(HttpMethod::GET)
            .build()
            .unwrap()
    }

    #[test]
    fn test_expression_parsing() {
        assert_eq!(
            Expression::parse("X-Version=2").unwrap(),
            Expression::Equals("X-Version".into(), "2".into())
        );
        assert_eq!(
            Expression::parse("debug!=true").unwrap(),
            Expression::NotEquals("debug".into(), "true".into())
        );
        assert_eq!(Expression::parse("!debug").unwrap(), Expression::Absent("debug".into()));
        assert!(Expression::parse("=x").is_err());
    }

    #[test]
    fn test_evaluate_method_mismatch() {
        let cond = get("/users/{id}");
        let req = AsyncRequest::new(HttpMethod::POST, "/users/1");
        assert_eq!(cond.evaluate(&req, true).unwrap_err(), Mismatch::Method);
        let req = AsyncRequest::new(HttpMethod::GET, "/posts/1");
        assert_eq!(cond.evaluate(&req, true).unwrap_err(), Mismatch::Path);
    }

    #[test]
    fn test_headers_and_params() {
        let cond = RouteCondition::builder()
            .path("/search")
            .header("X-Version=2")
            .param("!debug")
            .build()
            .unwrap();
        let ok = AsyncRequest::builder(HttpMethod::GET, "/search?q=a")
            .header("x-version", "2")
            .build();
        assert!(cond.evaluate(&ok, true).is_ok());

        let debug = AsyncRequest::builder(HttpMethod::GET, "/search?debug=1")
            .header("X-Version", "2")
            .build();
        assert_eq!(cond.evaluate(&debug, true).unwrap_err(), Mismatch::Params);
    }

    #[test]
    fn test_produces_records_compatible_types() {
        let cond = RouteCondition::builder()
            .path("/pets")
            .produces("application/json")
            .produces("application/x-protobuf")
            .build()
            .unwrap();

        let no_accept = AsyncRequest::new(HttpMethod::GET, "/pets");
        assert_eq!(cond.evaluate(&no_accept, true).unwrap().produces.len(), 2);

        let proto = AsyncRequest::builder(HttpMethod::GET, "/pets")
            .accept("application/x-protobuf, application/json;q=0.5")
            .build();
        let m = cond.evaluate(&proto, true).unwrap();
        assert_eq!(m.produces[0], MediaType::protobuf());
        assert_eq!(m.produces[1], MediaType::json());

        let html = AsyncRequest::builder(HttpMethod::GET, "/pets")
            .accept("text/html")
            .build();
        assert_eq!(cond.evaluate(&html, true).unwrap_err(), Mismatch::Produces);
    }

    #[test]
    fn test_consumes() {
        let cond = RouteCondition::builder()
            .path("/pets")
            .consumes("application/json")
            .build()
            .unwrap();
        let xml = AsyncRequest::builder(HttpMethod::POST, "/pets")
            .content_type("application/xml")
            .build();
        assert_eq!(cond.evaluate(&xml, true).unwrap_err(), Mismatch::Consumes);
        let json = AsyncRequest::builder(HttpMethod::POST, "/pets")
            .content_type("application/json;charset=utf-8")
            .build();
        assert!(cond.evaluate(&json, true).is_ok());
    }

    #[test]
    fn test_may_ambiguous_with() {
        assert!(get("/users/{id}").may_ambiguous_with(&get("/users/{name}")));
        assert!(!get("/users/{id}").may_ambiguous_with(&get("/posts/{id}")));

        let post = RouteCondition::builder()
            .path("/users/{id}")
            .method(HttpMethod::POST)
            .build()
            .unwrap();
        assert!(!get("/users/{id}").may_ambiguous_with(&post));

        let v1 = RouteCondition::builder().path("/api").header("X-V=1").build().unwrap();
        let v2 = RouteCondition::builder().path("/api").header("X-V=2").build().unwrap();
        assert!(!v1.may_ambiguous_with(&v2));

        let json = RouteCondition::builder().path("/api").produces("application/json").build().unwrap();
        let proto = RouteCondition::builder()
            .path("/api")
            .produces("application/x-protobuf")
            .build()
            .unwrap();
        assert!(!json.may_ambiguous_with(&proto));
    }

    #[test]
    fn test_path_variables_and_display() {
        let cond = RouteCondition::builder()
            .path("/a/{x}")
            .path("/b/{x}/{y}")
            .method(HttpMethod::GET)
            .build()
            .unwrap();
        assert_eq!(cond.path_variables(), vec!["x".to_string(), "y".to_string()]);
        assert!(cond.to_string().starts_with("GET "));
    }
}
