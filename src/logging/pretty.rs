//! Bounded pretty printer for `Channel::dump`
//!
//! Renders a JSON value on one line when it fits in the remaining width, otherwise one
//! entry per line. Containers nested deeper than `depth` collapse to `[...]` / `{...}`.
//! Object keys come out sorted, so the same value always renders the same way.

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrettyOptions {
    pub indent: usize,
    pub width: usize,
    pub depth: usize,
}

impl Default for PrettyOptions {
    fn default() -> Self {
        Self {
            indent: 4,
            width: 180,
            depth: 5,
        }
    }
}

/// Render `value` as deterministic, human-readable text
pub fn render(value: &Value, options: &PrettyOptions) -> String {
    let mut out = String::new();
    Printer { options }.write(value, 1, 0, &mut out);
    out
}

struct Printer<'a> {
    options: &'a PrettyOptions,
}

impl Printer<'_> {
    fn compact(&self, value: &Value, level: usize) -> String {
        match value {
            Value::Array(items) => {
                if level > self.options.depth {
                    return "[...]".to_string();
                }
                let parts: Vec<String> = items.iter().map(|v| self.compact(v, level + 1)).collect();
                format!("[{}]", parts.join(", "))
            }
            Value::Object(map) => {
                if level > self.options.depth {
                    return "{...}".to_string();
                }
                let parts: Vec<String> = map
                    .iter()
                    .map(|(k, v)| format!("{}: {}", quote(k), self.compact(v, level + 1)))
                    .collect();
                format!("{{{}}}", parts.join(", "))
            }
            scalar => scalar.to_string(),
        }
    }

    fn write(&self, value: &Value, level: usize, column: usize, out: &mut String) {
        let compact = self.compact(value, level);
        if column + compact.len() <= self.options.width || level > self.options.depth {
            out.push_str(&compact);
            return;
        }

        let pad = " ".repeat(self.options.indent * level);
        let close_pad = " ".repeat(self.options.indent * (level - 1));

        match value {
            Value::Array(items) if !items.is_empty() => {
                out.push_str("[\n");
                for (i, item) in items.iter().enumerate() {
                    out.push_str(&pad);
                    self.write(item, level + 1, pad.len(), out);
                    if i + 1 < items.len() {
                        out.push(',');
                    }
                    out.push('\n');
                }
                out.push_str(&close_pad);
                out.push(']');
            }
            Value::Object(map) if !map.is_empty() => {
                out.push_str("{\n");
                let last = map.len() - 1;
                for (i, (key, item)) in map.iter().enumerate() {
                    let prefix = format!("{}: ", quote(key));
                    out.push_str(&pad);
                    out.push_str(&prefix);
                    self.write(item, level + 1, pad.len() + prefix.len(), out);
                    if i < last {
                        out.push(',');
                    }
                    out.push('\n');
                }
                out.push_str(&close_pad);
                out.push('}');
            }
            _ => out.push_str(&compact),
        }
    }
}

fn quote(key: &str) -> String {
    Value::String(key.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_small_value_stays_on_one_line() {
        let value = json!({"b": 1, "a": [1, 2], "c": null});
        assert_eq!(
            render(&value, &PrettyOptions::default()),
            r#"{"a": [1, 2], "b": 1, "c": null}"#
        );
    }

    #[test]
    fn test_wide_value_breaks_lines() {
        let options = PrettyOptions {
            width: 10,
            ..PrettyOptions::default()
        };
        let value = json!({"name": "x", "list": [1, 2, 3]});
        let expected = "{\n    \"list\": [\n        1,\n        2,\n        3\n    ],\n    \"name\": \"x\"\n}";
        assert_eq!(render(&value, &options), expected);
    }

    #[test]
    fn test_depth_limit_elides_nested_containers() {
        let options = PrettyOptions {
            depth: 2,
            ..PrettyOptions::default()
        };
        assert_eq!(render(&json!([[[1]]]), &options), "[[[...]]]");
        assert_eq!(render(&json!({"a": {"b": {"c": 1}}}), &options), r#"{"a": {"b": {...}}}"#);
    }

    #[test]
    fn test_scalars() {
        let options = PrettyOptions::default();
        assert_eq!(render(&json!(42), &options), "42");
        assert_eq!(render(&json!("a\"b"), &options), r#""a\"b""#);
        assert_eq!(render(&json!([]), &options), "[]");
    }
}
