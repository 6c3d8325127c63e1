// Deployment options

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Prefix of the environment variables read by [`RestlightOptions::from_env`].
pub const ENV_PREFIX: &str = "RESTLIGHT";

/// Serialization options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerializeOptions {
    /// Let a request parameter choose the body format (`?format=protobuf`).
    pub negotiation: bool,
    pub negotiation_param: String,
}

impl Default for SerializeOptions {
    fn default() -> Self {
        Self {
            negotiation: false,
            negotiation_param: "format".to_string(),
        }
    }
}

/// Route table options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteOptions {
    /// Fail deployment instead of warning when two routes may match the same
    /// request.
    pub reject_ambiguous_routes: bool,
    /// Strip `;k=v` matrix parameters from path segments while matching.
    pub use_matrix_variables: bool,
}

impl Default for RouteOptions {
    fn default() -> Self {
        Self {
            reject_ambiguous_routes: false,
            use_matrix_variables: true,
        }
    }
}

/// Options read by a [`Deployment`](crate::deploy::Deployment).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestlightOptions {
    pub serialize: SerializeOptions,
    pub route: RouteOptions,
}

impl RestlightOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse options from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::config(format!("invalid options: {}", e)))
    }

    /// Defaults overlaid with `RESTLIGHT_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::default().with_vars(std::env::vars())
    }

    /// Overlay `RESTLIGHT_*` variables from any source.
    ///
    /// Recognised: `RESTLIGHT_SERIALIZE_NEGOTIATION`,
    /// `RESTLIGHT_SERIALIZE_NEGOTIATION_PARAM`,
    /// `RESTLIGHT_ROUTE_REJECT_AMBIGUOUS_ROUTES`,
    /// `RESTLIGHT_ROUTE_USE_MATRIX_VARIABLES`. Others are ignored.
    pub fn with_vars<K, V>(mut self, vars: impl IntoIterator<Item = (K, V)>) -> Result<Self>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let Some(key) = key
                .as_ref()
                .strip_prefix(ENV_PREFIX)
                .and_then(|k| k.strip_prefix('_'))
            else {
                continue;
            };
            let value = value.as_ref();
            match key.to_ascii_uppercase().as_str() {
                "SERIALIZE_NEGOTIATION" => self.serialize.negotiation = parse_bool(key, value)?,
                "SERIALIZE_NEGOTIATION_PARAM" => {
                    self.serialize.negotiation_param = value.trim().to_string()
                }
                "ROUTE_REJECT_AMBIGUOUS_ROUTES" => {
                    self.route.reject_ambiguous_routes = parse_bool(key, value)?
                }
                "ROUTE_USE_MATRIX_VARIABLES" => {
                    self.route.use_matrix_variables = parse_bool(key, value)?
                }
                _ => {}
            }
        }
        self.validate()?;
        Ok(self)
    }

    pub fn negotiation(mut self, enable: bool) -> Self {
        self.serialize.negotiation = enable;
        self
    }

    pub fn negotiation_param(mut self, name: impl Into<String>) -> Self {
        self.serialize.negotiation_param = name.into();
        self
    }

    pub fn reject_ambiguous_routes(mut self, enable: bool) -> Self {
        self.route.reject_ambiguous_routes = enable;
        self
    }

    pub fn use_matrix_variables(mut self, enable: bool) -> Self {
        self.route.use_matrix_variables = enable;
        self
    }

    /// Reject option combinations that cannot work.
    pub fn validate(&self) -> Result<()> {
        if self.serialize.negotiation && self.serialize.negotiation_param.is_empty() {
            return Err(Error::config(
                "serialize.negotiation is enabled but serialize.negotiation_param is empty",
            ));
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(Error::config(format!(
            "{}_{} must be a boolean, got '{}'",
            ENV_PREFIX, key, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = RestlightOptions::default();
        assert!(!options.serialize.negotiation);
        assert_eq!(options.serialize.negotiation_param, "format");
        assert!(!options.route.reject_ambiguous_routes);
        assert!(options.route.use_matrix_variables);
    }

    #[test]
    fn test_from_json_partial() {
        let options =
            RestlightOptions::from_json(r#"{"serialize": {"negotiation": true}}"#).unwrap();
        assert!(options.serialize.negotiation);
        assert_eq!(options.serialize.negotiation_param, "format");
        assert_eq!(options.route, RouteOptions::default());
    }

    #[test]
    fn test_from_json_invalid() {
        let err = RestlightOptions::from_json("{not json").unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_env_overlay() {
        let options = RestlightOptions::default()
            .with_vars([
                ("RESTLIGHT_SERIALIZE_NEGOTIATION", "on"),
                ("RESTLIGHT_SERIALIZE_NEGOTIATION_PARAM", "fmt"),
                ("RESTLIGHT_ROUTE_REJECT_AMBIGUOUS_ROUTES", "true"),
                ("PATH", "/usr/bin"),
            ])
            .unwrap();
        assert!(options.serialize.negotiation);
        assert_eq!(options.serialize.negotiation_param, "fmt");
        assert!(options.route.reject_ambiguous_routes);
    }

    #[test]
    fn test_env_bad_bool() {
        let err = RestlightOptions::default()
            .with_vars([("RESTLIGHT_ROUTE_USE_MATRIX_VARIABLES", "maybe")])
            .unwrap_err();
        assert!(err.to_string().contains("RESTLIGHT_ROUTE_USE_MATRIX_VARIABLES"));
    }

    #[test]
    fn test_builder_and_validate() {
        let options = RestlightOptions::new().negotiation(true).negotiation_param("");
        assert!(options.validate().is_err());
        assert!(RestlightOptions::new().negotiation(true).validate().is_ok());
    }
}
