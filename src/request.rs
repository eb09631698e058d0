//! Render request normalization.
//!
//! Requests arrive either as query strings (`GET /render`) or as JSON bodies
//! (`POST /render`). Both shapes are first read into a [`RawRenderRequest`],
//! and [`RawRenderRequest::normalize`] turns that into a fully resolved
//! [`RenderRequest`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;
use tracing::debug;

use crate::viewport::{RawViewport, ViewportOptions};
use crate::{RenderError, Result};

pub const PROPS_PREFIX: &str = "props-";
pub const VIEWPORT_PREFIX: &str = "viewport-";

pub type Props = Map<String, Value>;

/// How the rendered component is returned to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputType {
    /// The assembled HTML document.
    #[default]
    Markup,
    /// A PNG screenshot clipped to the rendered content.
    Raster,
}

impl FromStr for OutputType {
    type Err = RenderError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "markup" | "html" => Ok(OutputType::Markup),
            "raster" | "png" => Ok(OutputType::Raster),
            other => Err(RenderError::invalid_request(format!(
                "unsupported output type '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for OutputType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputType::Markup => f.write_str("markup"),
            OutputType::Raster => f.write_str("raster"),
        }
    }
}

/// A fully resolved render request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderRequest {
    pub component: String,
    pub output_type: OutputType,
    pub props: Props,
    pub viewport: ViewportOptions,
}

/// Transport-neutral request fields prior to defaulting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRenderRequest {
    pub component: Option<String>,
    pub output_type: Option<String>,
    pub props: Props,
    pub viewport: RawViewport,
}

/// JSON body accepted by `POST /render`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RenderBody {
    #[serde(default)]
    pub component: Option<String>,
    #[serde(default, rename = "type")]
    pub output_type: Option<String>,
    #[serde(default)]
    pub props: Option<Value>,
    #[serde(default)]
    pub viewport: Option<Value>,
}

impl RawRenderRequest {
    /// Reads a query string's key/value pairs. Later duplicates win.
    pub fn from_query<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut raw = RawRenderRequest::default();
        for (key, value) in pairs {
            let key = key.as_ref();
            let value = value.as_ref();
            if let Some(prop) = key.strip_prefix(PROPS_PREFIX) {
                if !prop.is_empty() {
                    raw.props.insert(prop.to_string(), parse_prop_value(value));
                }
            } else if let Some(field) = key.strip_prefix(VIEWPORT_PREFIX) {
                if !raw.viewport.set_field(field, Value::String(value.to_string())) {
                    debug!(field, "ignoring unknown viewport query parameter");
                }
            } else {
                match key {
                    "component" => raw.component = Some(value.to_string()),
                    "type" => raw.output_type = Some(value.to_string()),
                    _ => {}
                }
            }
        }
        raw
    }

    /// Reads a JSON body. `props` and `viewport` must be objects when present.
    pub fn from_body(body: RenderBody) -> Result<Self> {
        let props = match body.props {
            None | Some(Value::Null) => Props::new(),
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Err(RenderError::invalid_request(
                    "props must be a JSON object",
                ))
            }
        };
        let viewport = match body.viewport {
            None | Some(Value::Null) => RawViewport::default(),
            Some(Value::Object(map)) => RawViewport::from_object(&map),
            Some(_) => {
                return Err(RenderError::invalid_request(
                    "viewport must be a JSON object",
                ))
            }
        };
        Ok(Self {
            component: body.component,
            output_type: body.output_type,
            props,
            viewport,
        })
    }

    /// Resolves defaults and validates the output type.
    pub fn normalize(self, default_component: &str) -> Result<RenderRequest> {
        let component = self
            .component
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| default_component.to_string());
        let output_type = match self.output_type.as_deref().map(str::trim) {
            None | Some("") => OutputType::default(),
            Some(value) => value.parse()?,
        };
        Ok(RenderRequest {
            component,
            output_type,
            props: self.props,
            viewport: self.viewport.resolve(),
        })
    }
}

/// Interprets a query-string prop value: JSON when it parses, the literal text otherwise.
pub fn parse_prop_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn query(pairs: &[(&str, &str)]) -> RawRenderRequest {
        RawRenderRequest::from_query(pairs.iter().copied())
    }

    #[test]
    fn prop_values_parse_as_json_or_fall_back_to_text() {
        assert_eq!(parse_prop_value("5"), json!(5));
        assert_eq!(parse_prop_value("abc"), json!("abc"));
        assert_eq!(parse_prop_value("true"), json!(true));
        assert_eq!(parse_prop_value("[1,2]"), json!([1, 2]));
        assert_eq!(parse_prop_value("{\"a\":1}"), json!({"a": 1}));
        assert_eq!(parse_prop_value(""), json!(""));
    }

    #[test]
    fn query_props_round_trip() {
        let request = query(&[("props-count", "5"), ("props-name", "abc")])
            .normalize("MyView")
            .unwrap();
        assert_eq!(request.props.get("count"), Some(&json!(5)));
        assert_eq!(request.props.get("name"), Some(&json!("abc")));
    }

    #[test]
    fn query_without_fields_uses_defaults() {
        let request = query(&[]).normalize("MyView").unwrap();
        assert_eq!(request.component, "MyView");
        assert_eq!(request.output_type, OutputType::Markup);
        assert!(request.props.is_empty());
        assert_eq!(request.viewport, ViewportOptions::default());
    }

    #[test]
    fn query_viewport_fields_are_read_individually() {
        let request = query(&[
            ("component", "Card"),
            ("type", "raster"),
            ("viewport-width", "notanumber"),
            ("viewport-height", "300"),
            ("viewport-padding", "12"),
            ("viewport-timeoutMs", "0"),
            ("viewport-backgroundColor", "white"),
        ])
        .normalize("MyView")
        .unwrap();
        assert_eq!(request.component, "Card");
        assert_eq!(request.output_type, OutputType::Raster);
        assert_eq!(request.viewport.width, 800);
        assert_eq!(request.viewport.height, 300);
        assert_eq!(request.viewport.padding, 12);
        assert_eq!(request.viewport.timeout_ms, 0.0);
        assert_eq!(request.viewport.background_color, "white");
    }

    #[test]
    fn later_query_duplicates_win() {
        let request = query(&[("props-n", "1"), ("props-n", "2"), ("type", "png")])
            .normalize("MyView")
            .unwrap();
        assert_eq!(request.props.get("n"), Some(&json!(2)));
        assert_eq!(request.output_type, OutputType::Raster);
    }

    #[test]
    fn unknown_viewport_query_fields_are_ignored() {
        let raw = query(&[("viewport-depth", "3"), ("viewport-width", "320")]);
        assert_eq!(raw.viewport.width, Some(json!("320")));
        let request = raw.normalize("MyView").unwrap();
        assert_eq!(request.viewport.width, 320);
        assert!(request.props.is_empty());
    }

    #[test]
    fn unsupported_type_is_rejected() {
        let err = query(&[("type", "svg")]).normalize("MyView").unwrap_err();
        match err {
            RenderError::InvalidRequest(msg) => assert!(msg.contains("svg"), "got: {msg}"),
            other => panic!("expected invalid request, got {other:?}"),
        }
    }

    #[test]
    fn blank_component_uses_default() {
        let request = query(&[("component", "  ")]).normalize("MyView").unwrap();
        assert_eq!(request.component, "MyView");
    }

    #[test]
    fn body_shape_takes_objects_directly() {
        let body: RenderBody = serde_json::from_value(json!({
            "component": "Card",
            "type": "html",
            "props": {"title": "Hi", "items": [1, 2]},
            "viewport": {"width": 400, "padding": "8"}
        }))
        .unwrap();
        let request = RawRenderRequest::from_body(body)
            .unwrap()
            .normalize("MyView")
            .unwrap();
        assert_eq!(request.component, "Card");
        assert_eq!(request.output_type, OutputType::Markup);
        assert_eq!(request.props.get("items"), Some(&json!([1, 2])));
        assert_eq!(request.viewport.width, 400);
        assert_eq!(request.viewport.padding, 8);
    }

    #[test]
    fn body_without_props_or_viewport_defaults_to_empty() {
        let request = RawRenderRequest::from_body(RenderBody::default())
            .unwrap()
            .normalize("MyView")
            .unwrap();
        assert!(request.props.is_empty());
        assert_eq!(request.viewport, ViewportOptions::default());
    }

    #[test]
    fn body_props_must_be_an_object() {
        let body: RenderBody = serde_json::from_value(json!({"props": [1, 2]})).unwrap();
        assert!(matches!(
            RawRenderRequest::from_body(body),
            Err(RenderError::InvalidRequest(_))
        ));
    }

    #[test]
    fn both_shapes_normalize_to_the_same_request() {
        let from_query = query(&[
            ("component", "Card"),
            ("type", "raster"),
            ("props-count", "5"),
            ("viewport-width", "640"),
        ])
        .normalize("MyView")
        .unwrap();
        let body: RenderBody = serde_json::from_value(json!({
            "component": "Card",
            "type": "raster",
            "props": {"count": 5},
            "viewport": {"width": "640"}
        }))
        .unwrap();
        let from_body = RawRenderRequest::from_body(body)
            .unwrap()
            .normalize("MyView")
            .unwrap();
        assert_eq!(from_query, from_body);
    }
}
