// Path patterns: literals, `{var}`, `{var:regex}`, `*` and `**`

use crate::http::MatrixVariables;
use crate::{Error, Result};
use regex::Regex;
use std::cmp::Reverse;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Variable { name: String, regex: Option<Regex> },
    /// `*`, exactly one segment
    Wildcard,
    /// `**`, any number of segments
    Rest,
}

impl Segment {
    fn parse(raw: &str) -> Result<Self> {
        match raw {
            "*" => return Ok(Segment::Wildcard),
            "**" => return Ok(Segment::Rest),
            _ => {}
        }
        let Some(inner) = raw.strip_prefix('{').and_then(|s| s.strip_suffix('}')) else {
            if raw.contains('{') || raw.contains('}') {
                return Err(Error::config(format!("malformed path segment '{}'", raw)));
            }
            return Ok(Segment::Literal(raw.to_string()));
        };

        let (name, regex) = match inner.split_once(':') {
            Some((name, re)) => {
                let regex = Regex::new(&format!("^(?:{})$", re)).map_err(|e| {
                    Error::config(format!("invalid regex for path variable '{}': {}", name, e))
                })?;
                (name.trim(), Some(regex))
            }
            None => (inner.trim(), None),
        };
        if name.is_empty() {
            return Err(Error::config(format!("unnamed path variable in '{}'", raw)));
        }
        Ok(Segment::Variable {
            name: name.to_string(),
            regex,
        })
    }

    fn accepts(&self, value: &str) -> bool {
        match self {
            Segment::Literal(lit) => lit == value,
            Segment::Variable { regex, .. } => regex.as_ref().is_none_or(|re| re.is_match(value)),
            Segment::Wildcard | Segment::Rest => true,
        }
    }
}

pub(crate) type PatternRank = (usize, usize, Reverse<usize>, usize, Reverse<usize>);

/// Variables captured by a successful match.
#[derive(Debug, Clone, Default)]
pub struct PathMatch {
    pub variables: HashMap<String, String>,
    pub matrix: MatrixVariables,
}

/// A compiled path pattern such as `/users/{id:\d+}/**`.
#[derive(Debug, Clone)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn parse(pattern: &str) -> Result<Self> {
        let trimmed = pattern.trim();
        let mut segments = Vec::new();
        for raw in trimmed.split('/').filter(|s| !s.is_empty()) {
            let segment = Segment::parse(raw)?;
            if let Segment::Variable { name, .. } = &segment {
                let duplicate = segments
                    .iter()
                    .any(|s| matches!(s, Segment::Variable { name: n, .. } if n == name));
                if duplicate {
                    return Err(Error::config(format!(
                        "path variable '{}' declared twice in '{}'",
                        name, pattern
                    )));
                }
            }
            segments.push(segment);
        }

        let raw = if trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{}", trimmed)
        };
        Ok(Self { raw, segments })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Names of the declared path variables, in order.
    pub fn variables(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Variable { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn is_literal(&self) -> bool {
        self.segments.iter().all(|s| matches!(s, Segment::Literal(_)))
    }

    /// Match a request path.
    ///
    /// With `matrix` set, `;k=v` parameters are stripped from every segment
    /// first and recorded under the path variable bound to that segment.
    pub fn matches(&self, path: &str, matrix: bool) -> Option<PathMatch> {
        let parts: Vec<(&str, Option<&str>)> = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| match s.split_once(';').filter(|_| matrix) {
                Some((clean, params)) => (clean, Some(params)),
                None => (s, None),
            })
            .collect();

        let mut bindings = Vec::new();
        if !match_from(&self.segments, &parts, &mut bindings) {
            return None;
        }

        let mut result = PathMatch::default();
        for (name, index) in bindings {
            let (value, params) = parts[index];
            let value = urlencoding::decode(value)
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| value.to_string());
            result.variables.insert(name.to_string(), value);
            if let Some(params) = params {
                record_matrix(&mut result.matrix, name, params);
            }
        }
        Some(result)
    }

    /// Sort key, most specific first: fewer `**`, fewer `*`, more literals,
    /// fewer variables, then longer patterns.
    pub(crate) fn rank(&self) -> PatternRank {
        let mut rest = 0;
        let mut wildcards = 0;
        let mut literals = 0;
        let mut variables = 0;
        for segment in &self.segments {
            match segment {
                Segment::Rest => rest += 1,
                Segment::Wildcard => wildcards += 1,
                Segment::Literal(_) => literals += 1,
                Segment::Variable { .. } => variables += 1,
            }
        }
        (
            rest,
            wildcards,
            Reverse(literals),
            variables,
            Reverse(self.segments.len()),
        )
    }

    /// Whether some path could match both patterns.
    ///
    /// Exact for literal segments; variables and wildcards are assumed to
    /// overlap unless a regex rejects the other side's literal.
    pub fn may_overlap(&self, other: &PathPattern) -> bool {
        overlap(&self.segments, &other.segments)
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn match_from<'p>(
    pattern: &'p [Segment],
    parts: &[(&str, Option<&str>)],
    bindings: &mut Vec<(&'p str, usize)>,
) -> bool {
    fn go<'p>(
        pattern: &'p [Segment],
        parts: &[(&str, Option<&str>)],
        offset: usize,
        bindings: &mut Vec<(&'p str, usize)>,
    ) -> bool {
        let Some((first, rest)) = pattern.split_first() else {
            return offset == parts.len();
        };
        if let Segment::Rest = first {
            for skip in offset..=parts.len() {
                let mark = bindings.len();
                if go(rest, parts, skip, bindings) {
                    return true;
                }
                bindings.truncate(mark);
            }
            return false;
        }
        let Some((value, _)) = parts.get(offset) else {
            return false;
        };
        if !first.accepts(value) {
            return false;
        }
        if let Segment::Variable { name, .. } = first {
            bindings.push((name.as_str(), offset));
        }
        go(rest, parts, offset + 1, bindings)
    }

    go(pattern, parts, 0, bindings)
}

fn record_matrix(matrix: &mut MatrixVariables, path_var: &str, params: &str) {
    for pair in params.split(';').filter(|p| !p.is_empty()) {
        let (key, values) = pair.split_once('=').unwrap_or((pair, ""));
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        for value in values.split(',') {
            let value = urlencoding::decode(value)
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| value.to_string());
            matrix.insert(path_var, key, value);
        }
    }
}

fn overlap(a: &[Segment], b: &[Segment]) -> bool {
    match (a.split_first(), b.split_first()) {
        (None, None) => true,
        (Some((Segment::Rest, rest)), _) => {
            overlap(rest, b) || (!b.is_empty() && overlap(a, &b[1..]))
        }
        (_, Some((Segment::Rest, rest))) => {
            overlap(a, rest) || (!a.is_empty() && overlap(&a[1..], b))
        }
        (None, Some(_)) | (Some(_), None) => false,
        (Some((x, xs)), Some((y, ys))) => segments_overlap(x, y) && overlap(xs, ys),
    }
}

fn segments_overlap(a: &Segment, b: &Segment) -> bool {
    match (a, b) {
        (Segment::Literal(x), Segment::Literal(y)) => x == y,
        (Segment::Literal(lit), other) | (other, Segment::Literal(lit)) => other.accepts(lit),
        _ => true,
    }
}
