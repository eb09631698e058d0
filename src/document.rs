//! Assembles the self-contained HTML document served as markup or loaded
//! into the browser page for capture.

use crate::components::escape_html;
use crate::viewport::ViewportOptions;

/// Element id of the wrapper whose bounding box defines the screenshot clip.
pub const CONTENT_WRAPPER_ID: &str = "main-screenshot-viewport";

pub const DEFAULT_FRAMEWORK_SCRIPT: &str = "https://cdn.tailwindcss.com";

/// Document-level settings shared by every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentShell {
    pub base_url: String,
    pub framework_script: Option<String>,
}

impl Default for DocumentShell {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000/".to_string(),
            framework_script: Some(DEFAULT_FRAMEWORK_SCRIPT.to_string()),
        }
    }
}

impl DocumentShell {
    /// Builds the full document for a rendered component.
    pub fn assemble(&self, component: &str, markup: &str, viewport: &ViewportOptions) -> String {
        let script = self
            .framework_script
            .as_deref()
            .map(|src| format!("\n    <script src=\"{}\"></script>", escape_html(src)))
            .unwrap_or_default();
        format!(
            "<!DOCTYPE html>\n<html>\n  <head>\n    <meta charset=\"utf-8\">\n    <title>{title}</title>\n    <base href=\"{base}\">{script}\n  </head>\n  <body style=\"margin:0;padding:0;\">\n    {body}\n  </body>\n</html>\n",
            title = escape_html(component),
            base = escape_html(&self.base_url),
            script = script,
            body = wrap_viewport(markup, viewport),
        )
    }
}

/// Wraps markup in the layout element that carries the requested size and background.
pub fn wrap_viewport(markup: &str, viewport: &ViewportOptions) -> String {
    let mut style = format!(
        "display:inline-block;box-sizing:border-box;width:{}px;",
        viewport.width
    );
    if viewport.height > 0 {
        style.push_str(&format!("height:{}px;", viewport.height));
    }
    style.push_str(&format!("padding:{}px;", viewport.padding));
    style.push_str(&format!(
        "background-color:{};",
        sanitize_css_value(&viewport.background_color)
    ));
    format!("<div id=\"{CONTENT_WRAPPER_ID}\" style=\"{style}\">{markup}</div>")
}

/// Drops characters that could end the declaration or the attribute.
fn sanitize_css_value(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .filter(|c| !matches!(c, ';' | '"' | '\'' | '<' | '>' | '{' | '}' | '\\'))
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        crate::viewport::TRANSPARENT.to_string()
    } else {
        cleaned.to_string()
    }
}
