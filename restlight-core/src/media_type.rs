//! Media types and `Accept` header negotiation.
//!
//! Serializers declare the media types they read and write, route predicates
//! declare what they consume and produce, and the response side picks a
//! serializer by walking the client's `Accept` preferences.
//!
//! ```
//! use restlight_core::media_type::{Accept, MediaType};
//!
//! let accept = Accept::parse("application/x-protobuf, application/json;q=0.5");
//! assert_eq!(accept.preferred(), Some(&MediaType::protobuf()));
//! assert!(accept.accepts(&MediaType::json()));
//! ```

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Represents a media type (MIME type) with optional parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaType {
    /// The type (e.g., "application", "text")
    pub type_: String,
    /// The subtype (e.g., "json", "plain")
    pub subtype: String,
    /// Parameters other than the quality value (e.g., charset=utf-8)
    pub params: BTreeMap<String, String>,
}

impl MediaType {
    /// Create a new media type.
    pub fn new(type_: impl Into<String>, subtype: impl Into<String>) -> Self {
        Self {
            type_: type_.into().to_ascii_lowercase(),
            subtype: subtype.into().to_ascii_lowercase(),
            params: BTreeMap::new(),
        }
    }

    /// Create a media type with a parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params
            .insert(key.into().to_ascii_lowercase(), value.into());
        self
    }

    /// `application/json`
    pub fn json() -> Self {
        Self::new("application", "json")
    }

    /// `application/x-protobuf`
    pub fn protobuf() -> Self {
        Self::new("application", "x-protobuf")
    }

    /// `text/plain`
    pub fn text_plain() -> Self {
        Self::new("text", "plain")
    }

    /// `text/plain; charset=utf-8`
    pub fn text_plain_utf8() -> Self {
        Self::text_plain().with_param("charset", "utf-8")
    }

    /// `application/octet-stream`
    pub fn octet_stream() -> Self {
        Self::new("application", "octet-stream")
    }

    /// `*/*`
    pub fn any() -> Self {
        Self::new("*", "*")
    }

    /// Parse a media type from a string. A `q` parameter is dropped.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.trim().split(';');

        let (type_, subtype) = parts.next()?.trim().split_once('/')?;
        let type_ = type_.trim();
        let subtype = subtype.trim();
        if type_.is_empty() || subtype.is_empty() {
            return None;
        }

        let mut media_type = Self::new(type_, subtype);
        for param in parts {
            if let Some((key, value)) = param.trim().split_once('=') {
                let key = key.trim().to_ascii_lowercase();
                if key != "q" {
                    media_type
                        .params
                        .insert(key, value.trim().trim_matches('"').to_string());
                }
            }
        }
        Some(media_type)
    }

    /// Media type named by a `format` request parameter (`json`, `protobuf`).
    pub fn from_format(format: &str) -> Option<Self> {
        match format.to_ascii_lowercase().as_str() {
            "json" => Some(Self::json()),
            "protobuf" | "proto" => Some(Self::protobuf()),
            _ => None,
        }
    }

    /// Parse a comma separated list, skipping malformed entries.
    pub fn parse_list(s: &str) -> Vec<Self> {
        s.split(',').filter_map(Self::parse).collect()
    }

    /// `*/*`
    pub fn is_wildcard_type(&self) -> bool {
        self.type_ == "*"
    }

    /// `type/*` or `type/*+suffix`
    pub fn is_wildcard_subtype(&self) -> bool {
        self.subtype == "*" || self.subtype.starts_with("*+")
    }

    /// Structured syntax suffix, `json` for `application/problem+json`.
    pub fn suffix(&self) -> Option<&str> {
        self.subtype.rsplit_once('+').map(|(_, suffix)| suffix)
    }

    /// Whether either type could stand for the other (wildcards on both sides).
    pub fn is_compatible_with(&self, other: &MediaType) -> bool {
        if self.is_wildcard_type() || other.is_wildcard_type() {
            return true;
        }
        if self.type_ != other.type_ {
            return false;
        }
        if self.subtype == other.subtype {
            return true;
        }
        if self.is_wildcard_subtype() || other.is_wildcard_subtype() {
            let this_suffix = self.suffix();
            let other_suffix = other.suffix();
            return match (self.subtype.as_str(), other.subtype.as_str()) {
                ("*", _) | (_, "*") => true,
                _ => this_suffix.is_some() && this_suffix == other_suffix,
            };
        }
        false
    }

    /// Whether this type includes `other` (`text/*` includes `text/plain`, not the reverse).
    pub fn includes(&self, other: &MediaType) -> bool {
        if self.is_wildcard_type() {
            return true;
        }
        if self.type_ != other.type_ {
            return false;
        }
        if self.subtype == other.subtype || self.subtype == "*" {
            return true;
        }
        match self.subtype.strip_prefix("*+") {
            Some(suffix) => other.suffix() == Some(suffix),
            None => false,
        }
    }

    /// Compare type and subtype only.
    pub fn same_mime(&self, other: &MediaType) -> bool {
        self.type_ == other.type_ && self.subtype == other.subtype
    }

    /// How concrete this type is; used to rank equally weighted candidates.
    pub fn specificity(&self) -> u8 {
        let mut score = 0u8;
        if !self.is_wildcard_type() {
            score += 2;
        }
        if !self.is_wildcard_subtype() {
            score += 1;
        }
        score
    }

    /// Charset parameter, if any.
    pub fn charset(&self) -> Option<&str> {
        self.params.get("charset").map(String::as_str)
    }

    /// Get the full MIME type string.
    pub fn mime_type(&self) -> String {
        format!("{}/{}", self.type_, self.subtype)
    }

    /// Get the full MIME type string with parameters.
    pub fn to_header_value(&self) -> String {
        let mut result = self.mime_type();
        for (key, value) in &self.params {
            result.push_str(&format!(";{}={}", key, value));
        }
        result
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_header_value())
    }
}

/// Parsed `Accept` header, sorted by preference.
#[derive(Debug, Clone, Default)]
pub struct Accept {
    /// Media types with their quality values, highest preference first.
    pub media_types: Vec<(MediaType, f32)>,
}

impl Accept {
    /// Accepts anything.
    pub fn any() -> Self {
        Self {
            media_types: vec![(MediaType::any(), 1.0)],
        }
    }

    /// Parse an Accept header string.
    pub fn parse(header: &str) -> Self {
        let mut media_types: Vec<(MediaType, f32)> = header
            .split(',')
            .filter_map(|part| {
                let part = part.trim();
                if part.is_empty() {
                    return None;
                }
                let quality = Self::extract_quality(part);
                MediaType::parse(part).map(|mt| (mt, quality))
            })
            .collect();

        // stable: equal entries keep header order
        media_types.sort_by(|a, b| match b.1.partial_cmp(&a.1) {
            Some(Ordering::Equal) | None => b.0.specificity().cmp(&a.0.specificity()),
            Some(ord) => ord,
        });

        Self { media_types }
    }

    fn extract_quality(part: &str) -> f32 {
        part.split(';')
            .skip(1)
            .filter_map(|p| p.trim().split_once('='))
            .find(|(k, _)| k.trim().eq_ignore_ascii_case("q"))
            .and_then(|(_, v)| v.trim().parse::<f32>().ok())
            .unwrap_or(1.0)
            .clamp(0.0, 1.0)
    }

    /// Get the quality value for a specific media type.
    pub fn quality_for(&self, media_type: &MediaType) -> f32 {
        self.media_types
            .iter()
            .find(|(mt, _)| mt.is_compatible_with(media_type))
            .map(|(_, q)| *q)
            .unwrap_or(0.0)
    }

    /// Check if a media type is acceptable.
    pub fn accepts(&self, media_type: &MediaType) -> bool {
        self.quality_for(media_type) > 0.0
    }

    /// Get the preferred media type from this Accept header.
    pub fn preferred(&self) -> Option<&MediaType> {
        self.media_types.first().map(|(mt, _)| mt)
    }

    /// Accepted types (q > 0) in preference order.
    pub fn acceptable(&self) -> impl Iterator<Item = &MediaType> {
        self.media_types
            .iter()
            .filter(|(_, q)| *q > 0.0)
            .map(|(mt, _)| mt)
    }
}

/// Negotiate the best media type from available options.
pub fn negotiate_media_type<'a>(
    accept: &Accept,
    available: &'a [MediaType],
) -> Option<&'a MediaType> {
    let mut best: Option<(&'a MediaType, f32, u8)> = None;

    for candidate in available {
        let quality = accept.quality_for(candidate);
        if quality <= 0.0 {
            continue;
        }
        let specificity = candidate.specificity();
        let better = match best {
            None => true,
            Some((_, best_q, best_s)) => {
                quality > best_q || (quality == best_q && specificity > best_s)
            }
        };
        if better {
            best = Some((candidate, quality, specificity));
        }
    }

    best.map(|(mt, _, _)| mt)
}
