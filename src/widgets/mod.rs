// Widget directives embedded in agent markdown output.
//
// Grammar: :::widget{type=chart panel=true}\n{"series": [...]}\n:::
// Attributes are key=value pairs, values optionally double-quoted. The body
// is a JSON object used as widget props.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

static WIDGET_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s):::widget\{([^}]+)\}\s*\n(.*?)\n:::").unwrap());

static ATTR_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(\w+)=(?:"([^"]+)"|(\S+))"#).unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WidgetDisplay {
    Inline,
    Panel,
}

/// A parsed widget directive ready to be rendered by the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WidgetDirective {
    #[serde(rename = "type")]
    pub widget_type: String,
    pub props: Value,
    pub display: WidgetDisplay,
    pub blocking: bool,
    pub action: Option<String>,
}

/// Result of parsing agent output for widget directives.
#[derive(Debug, Clone, Default)]
pub struct ParseResult {
    pub text_segments: Vec<String>,
    pub widgets: Vec<WidgetDirective>,
}

impl ParseResult {
    /// The response text with widget blocks removed.
    pub fn stripped_text(&self) -> String {
        self.text_segments.join("\n\n")
    }
}

pub struct WidgetParser;

impl WidgetParser {
    pub fn parse(text: &str) -> ParseResult {
        let mut result = ParseResult::default();
        let mut last_end = 0;

        for capture in WIDGET_PATTERN.captures_iter(text) {
            let whole = capture.get(0).expect("capture 0 always present");
            let before = text[last_end..whole.start()].trim();
            if !before.is_empty() {
                result.text_segments.push(before.to_string());
            }

            let attrs = Self::parse_attrs(&capture[1]);
            let json_str = capture[2].trim();
            let props = if json_str.is_empty() {
                Value::Object(Default::default())
            } else {
                serde_json::from_str(json_str).unwrap_or(Value::Object(Default::default()))
            };

            let display = if attrs_flag(&attrs, "panel") {
                WidgetDisplay::Panel
            } else {
                WidgetDisplay::Inline
            };

            result.widgets.push(WidgetDirective {
                widget_type: attrs
                    .iter()
                    .find(|(k, _)| k == "type")
                    .map(|(_, v)| v.clone())
                    .unwrap_or_else(|| "unknown".to_string()),
                props,
                display,
                blocking: attrs_flag(&attrs, "blocking"),
                action: attrs
                    .iter()
                    .find(|(k, _)| k == "action")
                    .map(|(_, v)| v.clone()),
            });
            last_end = whole.end();
        }

        let after = text[last_end..].trim();
        if !after.is_empty() {
            result.text_segments.push(after.to_string());
        }

        result
    }

    fn parse_attrs(attrs_str: &str) -> Vec<(String, String)> {
        ATTR_PATTERN
            .captures_iter(attrs_str)
            .map(|c| {
                let key = c[1].to_string();
                let value = c
                    .get(2)
                    .or_else(|| c.get(3))
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default();
                (key, value)
            })
            .collect()
    }
}

fn attrs_flag(attrs: &[(String, String)], key: &str) -> bool {
    attrs.iter().any(|(k, v)| k == key && v == "true")
}
