use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// Named values substituted into a prompt template.
#[derive(Debug, Clone, Default)]
pub struct TemplateVars {
    values: HashMap<String, Value>,
}

impl TemplateVars {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a string, substituted verbatim.
    pub fn text(mut self, name: &str, value: impl Into<String>) -> Self {
        self.values.insert(name.to_string(), Value::String(value.into()));
        self
    }

    /// Insert any serializable value, substituted as pretty-printed JSON.
    pub fn json<T: Serialize + ?Sized>(
        mut self,
        name: &str,
        value: &T,
    ) -> Result<Self, serde_json::Error> {
        self.values.insert(name.to_string(), serde_json::to_value(value)?);
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }
}

/// Substitute `{name}` placeholders in `template`.
///
/// The template is scanned once, left to right, so text coming from a
/// substituted value is never scanned again. Placeholders without a value, and
/// braces that do not enclose a plain name, are copied through unchanged.
pub fn interpolate(template: &str, vars: &TemplateVars) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        let replacement = after.find('}').and_then(|close| {
            let name = &after[..close];
            if !is_placeholder_name(name) {
                return None;
            }
            vars.get(name).map(|value| (render(value), close))
        });

        match replacement {
            Some((text, close)) => {
                out.push_str(&text);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

fn is_placeholder_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strings_are_inserted_verbatim() {
        let vars = TemplateVars::new().text("name", "\"quoted\"");
        assert_eq!(interpolate("Hello {name}!", &vars), "Hello \"quoted\"!");
    }

    #[test]
    fn test_structures_are_pretty_printed() {
        let vars = TemplateVars::new()
            .json("data", &json!({"a": [1, 2]}))
            .unwrap();
        assert_eq!(
            interpolate("<d>{data}</d>", &vars),
            "<d>{\n  \"a\": [\n    1,\n    2\n  ]\n}</d>"
        );
    }

    #[test]
    fn test_missing_keys_are_left_untouched() {
        let vars = TemplateVars::new().text("a", "1");
        assert_eq!(interpolate("{a} {b} {a}", &vars), "1 {b} 1");
    }

    #[test]
    fn test_substituted_values_are_not_rescanned() {
        let vars = TemplateVars::new()
            .text("first", "{second}")
            .text("second", "boom");
        assert_eq!(interpolate("{first}|{second}", &vars), "{second}|boom");
    }

    #[test]
    fn test_non_placeholder_braces_pass_through() {
        let vars = TemplateVars::new().text("x", "X");
        assert_eq!(
            interpolate(r#"{"id": 1} {{x}} { x } {x"#, &vars),
            r#"{"id": 1} {X} { x } {x"#
        );
    }

    #[test]
    fn test_repeated_placeholder_replaced_everywhere() {
        let vars = TemplateVars::new().text("r", "");
        assert_eq!(interpolate("a{r}b{r}c", &vars), "abc");
    }
}
