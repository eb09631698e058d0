//! Component rendering.
//!
//! The pipeline only depends on [`ComponentRenderer`]. [`TemplateLibrary`] is
//! the bundled implementation: each component is an HTML file whose
//! `{{ name }}` placeholders are filled from the request props.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::request::Props;

pub const TEMPLATE_EXTENSION: &str = "html";

#[derive(Debug, Error)]
pub enum ComponentError {
    #[error("Component not found: {0}")]
    NotFound(String),
    #[error("Invalid component name '{0}': use letters, digits, '-', '_' and '/' separated segments")]
    InvalidName(String),
    #[error("Component '{component}' failed to render: {message}")]
    Render { component: String, message: String },
    #[error("Failed to read component '{component}': {source}")]
    Read {
        component: String,
        #[source]
        source: std::io::Error,
    },
}

impl ComponentError {
    /// True when the component could not be resolved from the requested name.
    pub fn is_lookup_failure(&self) -> bool {
        matches!(self, ComponentError::NotFound(_) | ComponentError::InvalidName(_))
    }
}

/// Turns a component name plus props into an HTML fragment.
#[async_trait]
pub trait ComponentRenderer: Send + Sync {
    async fn render(&self, component: &str, props: &Props) -> Result<String, ComponentError>;
}

/// File-backed component templates with optional in-memory registrations.
///
/// Files are read on every render so edits show up without a restart.
#[derive(Debug, Clone, Default)]
pub struct TemplateLibrary {
    root: Option<PathBuf>,
    inline: HashMap<String, String>,
}

impl TemplateLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            inline: HashMap::new(),
        }
    }

    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Registers a template that takes precedence over files with the same name.
    pub fn with_template(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.inline.insert(name.into(), source.into());
        self
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    async fn load(&self, component: &str) -> Result<String, ComponentError> {
        validate_name(component)?;
        if let Some(source) = self.inline.get(component) {
            return Ok(source.clone());
        }
        let Some(root) = &self.root else {
            return Err(ComponentError::NotFound(component.to_string()));
        };
        let path = root.join(format!("{component}.{TEMPLATE_EXTENSION}"));
        match tokio::fs::read_to_string(&path).await {
            Ok(source) => Ok(source),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(ComponentError::NotFound(component.to_string()))
            }
            Err(source) => Err(ComponentError::Read {
                component: component.to_string(),
                source,
            }),
        }
    }
}

#[async_trait]
impl ComponentRenderer for TemplateLibrary {
    async fn render(&self, component: &str, props: &Props) -> Result<String, ComponentError> {
        let source = self.load(component).await?;
        render_template(&source, props).map_err(|message| ComponentError::Render {
            component: component.to_string(),
            message,
        })
    }
}

fn validate_name(component: &str) -> Result<(), ComponentError> {
    let valid = !component.is_empty()
        && component.split('/').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        });
    if valid {
        Ok(())
    } else {
        Err(ComponentError::InvalidName(component.to_string()))
    }
}

/// Substitutes `{{ key }}` placeholders with HTML-escaped prop values.
///
/// `{{ key | default }}` supplies text for absent props; an absent prop with no
/// default renders as nothing. Dotted keys walk into nested objects.
pub fn render_template(source: &str, props: &Props) -> Result<String, String> {
    let mut out = String::with_capacity(source.len());
    let mut rest = source;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| format!("unclosed placeholder at byte {}", source.len() - rest.len() + start))?;
        let expr = after[..end].trim();
        let (key, fallback) = match expr.split_once('|') {
            Some((key, fallback)) => (key.trim(), Some(fallback.trim())),
            None => (expr, None),
        };
        if key.is_empty() {
            return Err("empty placeholder".to_string());
        }
        match lookup(props, key) {
            Some(value) => out.push_str(&escape_html(&display_value(value))),
            None => out.push_str(&escape_html(fallback.unwrap_or_default())),
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

fn lookup<'a>(props: &'a Props, key: &str) -> Option<&'a Value> {
    let mut parts = key.split('.');
    let mut current = props.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    (!current.is_null()).then_some(current)
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
