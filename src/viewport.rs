use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_WIDTH: u32 = 800;
/// Zero means "derive the height from the rendered content".
pub const DEFAULT_HEIGHT: u32 = 0;
pub const DEFAULT_PADDING: u32 = 0;
pub const DEFAULT_TIMEOUT_MS: f64 = 1000.0;
pub const TRANSPARENT: &str = "transparent";

/// Size of the browser page viewport in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl std::fmt::Display for Viewport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Resolved layout options for one render request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewportOptions {
    pub width: u32,
    pub height: u32,
    pub padding: u32,
    pub timeout_ms: f64,
    pub background_color: String,
}

impl Default for ViewportOptions {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            padding: DEFAULT_PADDING,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            background_color: TRANSPARENT.to_string(),
        }
    }
}

impl ViewportOptions {
    pub fn is_transparent(&self) -> bool {
        self.background_color.eq_ignore_ascii_case(TRANSPARENT)
    }
}

/// Viewport fields as they arrive from a transport, before defaulting.
///
/// Query strings deliver every field as text while JSON bodies may carry
/// numbers or strings, so each field is kept as a loose JSON value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawViewport {
    pub width: Option<Value>,
    pub height: Option<Value>,
    pub padding: Option<Value>,
    pub timeout_ms: Option<Value>,
    pub background_color: Option<Value>,
}

impl RawViewport {
    /// Reads the known fields out of a JSON object, ignoring anything else.
    pub fn from_object(object: &serde_json::Map<String, Value>) -> Self {
        Self {
            width: object.get("width").cloned(),
            height: object.get("height").cloned(),
            padding: object.get("padding").cloned(),
            timeout_ms: object.get("timeoutMs").cloned(),
            background_color: object.get("backgroundColor").cloned(),
        }
    }

    /// Assigns a field by its wire name; returns false for unknown names.
    pub fn set_field(&mut self, name: &str, value: Value) -> bool {
        let slot = match name {
            "width" => &mut self.width,
            "height" => &mut self.height,
            "padding" => &mut self.padding,
            "timeoutMs" => &mut self.timeout_ms,
            "backgroundColor" => &mut self.background_color,
            _ => return false,
        };
        *slot = Some(value);
        true
    }

    /// Resolves every field, substituting the default for anything missing or malformed.
    pub fn resolve(&self) -> ViewportOptions {
        let defaults = ViewportOptions::default();
        ViewportOptions {
            width: lenient_u32(self.width.as_ref()).unwrap_or(defaults.width),
            height: lenient_u32(self.height.as_ref()).unwrap_or(defaults.height),
            padding: lenient_u32(self.padding.as_ref()).unwrap_or(defaults.padding),
            timeout_ms: lenient_f64(self.timeout_ms.as_ref()).unwrap_or(defaults.timeout_ms),
            background_color: self
                .background_color
                .as_ref()
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .unwrap_or(defaults.background_color),
        }
    }
}

fn lenient_u32(value: Option<&Value>) -> Option<u32> {
    match value? {
        Value::Number(n) => {
            let f = n.as_f64()?;
            if f.is_finite() && f >= 0.0 && f <= u32::MAX as f64 {
                Some(f.trunc() as u32)
            } else {
                None
            }
        }
        Value::String(s) => parse_int_prefix(s).and_then(|n| u32::try_from(n).ok()),
        _ => None,
    }
}

fn lenient_f64(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_float_prefix(s),
        _ => None,
    }?;
    (parsed.is_finite() && parsed >= 0.0).then_some(parsed)
}

/// Integer parse with `parseInt` semantics: leading whitespace, optional sign,
/// then as many digits as are present. `"800px"` yields 800.
pub fn parse_int_prefix(input: &str) -> Option<i64> {
    let trimmed = input.trim_start();
    let (negative, rest) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let digits_len = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits_len == 0 {
        return None;
    }
    let magnitude: i64 = rest[..digits_len].parse().ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

/// Float parse with `parseFloat` semantics: optional sign, digits with at most
/// one `.`, optional exponent. Scanning stops at the first character that
/// cannot extend the number, so `"1.5.2"` yields 1.5.
pub fn parse_float_prefix(input: &str) -> Option<f64> {
    let trimmed = input.trim_start();
    let bytes = trimmed.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'-' | b'+')) {
        end = 1;
    }
    let mut digits = 0;
    let mut seen_dot = false;
    while let Some(&b) = bytes.get(end) {
        match b {
            b'0'..=b'9' => digits += 1,
            b'.' if !seen_dot => seen_dot = true,
            _ => break,
        }
        end += 1;
    }
    if digits == 0 {
        return None;
    }
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'-' | b'+')) {
            exp_end += 1;
        }
        let exp_digits = bytes[exp_end..].iter().take_while(|b| b.is_ascii_digit()).count();
        if exp_digits > 0 {
            end = exp_end + exp_digits;
        }
    }
    trimmed[..end].parse().ok()
}
