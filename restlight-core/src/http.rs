// Request and response views handed over by the transport layer

use crate::{Error, HeaderMap, MediaType};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::{Read, Write};
use std::sync::Arc;

/// HTTP methods
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    GET,
    POST,
    PUT,
    DELETE,
    PATCH,
    HEAD,
    OPTIONS,
}

impl HttpMethod {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Some(HttpMethod::GET),
            "POST" => Some(HttpMethod::POST),
            "PUT" => Some(HttpMethod::PUT),
            "DELETE" => Some(HttpMethod::DELETE),
            "PATCH" => Some(HttpMethod::PATCH),
            "HEAD" => Some(HttpMethod::HEAD),
            "OPTIONS" => Some(HttpMethod::OPTIONS),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::GET => "GET",
            HttpMethod::POST => "POST",
            HttpMethod::PUT => "PUT",
            HttpMethod::DELETE => "DELETE",
            HttpMethod::PATCH => "PATCH",
            HttpMethod::HEAD => "HEAD",
            HttpMethod::OPTIONS => "OPTIONS",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request cookie.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cookie {
    name: String,
    value: String,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Parse every `Cookie` header value (`a=1; b=2`).
    pub fn parse_all<'a>(headers: impl IntoIterator<Item = &'a str>) -> Vec<Cookie> {
        headers
            .into_iter()
            .flat_map(|header| header.split(';'))
            .filter_map(|pair| {
                let (name, value) = pair.trim().split_once('=')?;
                let name = name.trim();
                if name.is_empty() {
                    return None;
                }
                let value = value.trim().trim_matches('"');
                let value = urlencoding::decode(value)
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| value.to_string());
                Some(Cookie::new(name, value))
            })
            .collect()
    }
}

/// Matrix variables grouped by the path variable whose segment carried them,
/// in path order.
///
/// For the pattern `/cars/{car}/owners/{owner}` and the path
/// `/cars/vw;color=red;year=2012/owners/bob;age=30`, segment `car` holds
/// `{color: [red], year: [2012]}` and segment `owner` holds `{age: [30]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatrixVariables {
    segments: Vec<(String, BTreeMap<String, Vec<String>>)>,
}

impl MatrixVariables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one `key=value` pair to the segment of `path_var`.
    pub fn insert(
        &mut self,
        path_var: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) {
        let path_var = path_var.into();
        let pos = match self.segments.iter().position(|(name, _)| *name == path_var) {
            Some(pos) => pos,
            None => {
                self.segments.push((path_var, BTreeMap::new()));
                self.segments.len() - 1
            }
        };
        self.segments[pos]
            .1
            .entry(key.into())
            .or_default()
            .push(value.into());
    }

    /// Variables of one path segment.
    pub fn segment(&self, path_var: &str) -> Option<&BTreeMap<String, Vec<String>>> {
        self.segments
            .iter()
            .find(|(name, _)| name == path_var)
            .map(|(_, vars)| vars)
    }

    /// All segments in path order.
    pub fn segments(&self) -> impl Iterator<Item = (&str, &BTreeMap<String, Vec<String>>)> {
        self.segments.iter().map(|(name, vars)| (name.as_str(), vars))
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

/// Request-scoped attributes shared between predicates, interceptors and resolvers.
#[derive(Clone, Default)]
pub struct Attributes {
    map: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl Attributes {
    pub fn insert<T: Any + Send + Sync>(&mut self, name: impl Into<String>, value: T) {
        self.map.insert(name.into(), Arc::new(value));
    }

    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Option<&T> {
        self.map.get(name).and_then(|v| v.downcast_ref::<T>())
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.map.remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl fmt::Debug for Attributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.map.keys()).finish()
    }
}

/// The request as seen by the dispatch core.
///
/// The transport has already read the whole body; [`AsyncRequest::input_stream`]
/// exposes it as a reader for serializers that prefer streaming.
#[derive(Debug, Clone)]
pub struct AsyncRequest {
    method: HttpMethod,
    path: String,
    query: String,
    query_params: HashMap<String, Vec<String>>,
    headers: HeaderMap,
    cookies: Vec<Cookie>,
    body: Bytes,
    path_variables: HashMap<String, String>,
    matrix_variables: MatrixVariables,
    attributes: Attributes,
}

impl AsyncRequest {
    /// Create a request for `uri` (path plus optional query string).
    pub fn new(method: HttpMethod, uri: &str) -> Self {
        let (path, query) = uri.split_once('?').unwrap_or((uri, ""));
        Self {
            method,
            path: path.to_string(),
            query: query.to_string(),
            query_params: parse_query_string(query),
            headers: HeaderMap::new(),
            cookies: Vec::new(),
            body: Bytes::new(),
            path_variables: HashMap::new(),
            matrix_variables: MatrixVariables::new(),
            attributes: Attributes::default(),
        }
    }

    pub fn builder(method: HttpMethod, uri: &str) -> AsyncRequestBuilder {
        AsyncRequestBuilder {
            request: AsyncRequest::new(method, uri),
        }
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    /// Raw path, matrix parameters included.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn content_type(&self) -> Option<MediaType> {
        self.headers.content_type().and_then(MediaType::parse)
    }

    /// First value of a query parameter.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.query_params
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Every value of a query parameter.
    pub fn params(&self, name: &str) -> Option<&[String]> {
        self.query_params.get(name).map(Vec::as_slice)
    }

    pub fn param_map(&self) -> &HashMap<String, Vec<String>> {
        &self.query_params
    }

    pub fn cookies(&self) -> &[Cookie] {
        &self.cookies
    }

    pub fn cookie(&self, name: &str) -> Option<&Cookie> {
        self.cookies.iter().find(|c| c.name() == name)
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// The body as a reader.
    pub fn input_stream(&self) -> impl Read + '_ {
        self.body.clone().reader()
    }

    pub fn path_variable(&self, name: &str) -> Option<&str> {
        self.path_variables.get(name).map(String::as_str)
    }

    pub fn path_variables(&self) -> &HashMap<String, String> {
        &self.path_variables
    }

    pub fn matrix_variables(&self) -> &MatrixVariables {
        &self.matrix_variables
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut Attributes {
        &mut self.attributes
    }

    pub(crate) fn set_route_variables(
        &mut self,
        path_variables: HashMap<String, String>,
        matrix_variables: MatrixVariables,
    ) {
        self.path_variables = path_variables;
        self.matrix_variables = matrix_variables;
    }
}

/// Builder used by transports and tests.
#[derive(Debug)]
pub struct AsyncRequestBuilder {
    request: AsyncRequest,
}

impl AsyncRequestBuilder {
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        if name.eq_ignore_ascii_case("cookie") {
            self.request.cookies.extend(Cookie::parse_all([value.as_str()]));
        }
        self.request.headers.append(name, value);
        self
    }

    pub fn content_type(self, media_type: impl Into<String>) -> Self {
        self.header("Content-Type", media_type)
    }

    pub fn accept(self, media_types: impl Into<String>) -> Self {
        self.header("Accept", media_types)
    }

    pub fn cookie(self, name: &str, value: &str) -> Self {
        self.header("Cookie", format!("{}={}", name, value))
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.request.body = body.into();
        self
    }

    pub fn path_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request
            .path_variables
            .insert(name.into(), value.into());
        self
    }

    pub fn matrix_variable(mut self, path_var: &str, key: &str, value: &str) -> Self {
        self.request.matrix_variables.insert(path_var, key, value);
        self
    }

    pub fn attribute<T: Any + Send + Sync>(mut self, name: &str, value: T) -> Self {
        self.request.attributes.insert(name, value);
        self
    }

    pub fn build(self) -> AsyncRequest {
        self.request
    }
}

/// The response being produced for one request.
#[derive(Debug)]
pub struct AsyncResponse {
    status: u16,
    headers: HeaderMap,
    body: BytesMut,
    committed: bool,
}

impl AsyncResponse {
    pub fn new() -> Self {
        Self {
            status: 200,
            headers: HeaderMap::new(),
            body: BytesMut::new(),
            committed: false,
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn set_status(&mut self, status: u16) {
        self.status = status;
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name, value);
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Writer appending to the pending body.
    pub fn output_stream(&mut self) -> impl Write + '_ {
        (&mut self.body).writer()
    }

    /// Headers and body writer at once, for serializers that set headers while writing.
    pub fn headers_and_output(&mut self) -> (&mut HeaderMap, impl Write + '_) {
        (&mut self.headers, (&mut self.body).writer())
    }

    /// Whether a result has been sent already.
    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// Send `body` as the final result. Fails if a result was already sent.
    pub fn send_result(&mut self, body: impl AsRef<[u8]>) -> Result<(), Error> {
        if self.committed {
            return Err(Error::Internal("response already committed".to_string()));
        }
        self.body.clear();
        self.body.extend_from_slice(body.as_ref());
        self.committed = true;
        Ok(())
    }

    /// Commit whatever was written through [`AsyncResponse::output_stream`].
    pub fn commit(&mut self) -> Result<(), Error> {
        if self.committed {
            return Err(Error::Internal("response already committed".to_string()));
        }
        self.committed = true;
        Ok(())
    }

    /// Take the final body, for the transport.
    pub fn take_body(&mut self) -> Bytes {
        self.body.split().freeze()
    }
}

impl Default for AsyncResponse {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a query string into a multi-value map, percent-decoding names and values.
pub(crate) fn parse_query_string(query: &str) -> HashMap<String, Vec<String>> {
    let mut params: HashMap<String, Vec<String>> = HashMap::new();
    for part in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = part.split_once('=').unwrap_or((part, ""));
        params
            .entry(decode_component(key))
            .or_default()
            .push(decode_component(value));
    }
    params
}

fn decode_component(s: &str) -> String {
    let s = s.replace('+', " ");
    match urlencoding::decode(&s) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_parsing() {
        let req = AsyncRequest::new(HttpMethod::GET, "/search?q=rust+lang&tag=a&tag=b&flag");
        assert_eq!(req.path(), "/search");
        assert_eq!(req.param("q"), Some("rust lang"));
        assert_eq!(req.params("tag").unwrap(), ["a", "b"]);
        assert_eq!(req.param("flag"), Some(""));
        assert_eq!(req.param("missing"), None);
    }

    #[test]
    fn test_cookie_parsing() {
        let req = AsyncRequest::builder(HttpMethod::GET, "/")
            .header("Cookie", "foo=1; bar=hello%20world")
            .cookie("baz", "3")
            .build();
        assert_eq!(req.cookies().len(), 3);
        assert_eq!(req.cookie("bar").unwrap().value(), "hello world");
        assert_eq!(req.cookie("baz").unwrap().value(), "3");
    }

    #[test]
    fn test_matrix_variables_keep_segment_order() {
        let mut vars = MatrixVariables::new();
        vars.insert("b", "x", "1");
        vars.insert("a", "x", "2");
        vars.insert("b", "x", "3");
        let names: Vec<&str> = vars.segments().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(vars.segment("b").unwrap()["x"], vec!["1", "3"]);
    }

    #[test]
    fn test_response_commit_once() {
        let mut resp = AsyncResponse::new();
        resp.send_result(b"hello").unwrap();
        assert!(resp.is_committed());
        assert!(resp.send_result(b"again").is_err());
        assert_eq!(resp.body(), b"hello");
    }

    #[test]
    fn test_output_stream_then_commit() {
        let mut resp = AsyncResponse::new();
        resp.output_stream().write_all(b"streamed").unwrap();
        resp.commit().unwrap();
        assert_eq!(resp.take_body().as_ref(), b"streamed");
    }
}
