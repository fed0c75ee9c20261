// Message template rendering

use std::collections::BTreeMap;

/// Renders a `{name}` placeholder template against string bindings.
///
/// Formatting must never fail outward: a malformed template or a placeholder
/// with no binding yields `fallback` instead. `{{` and `}}` escape literal
/// braces. The function is pure, so re-rendering at span exit with updated
/// bindings is safe to repeat.
pub fn format_template(
    template: &str,
    bindings: &BTreeMap<String, String>,
    fallback: &str,
) -> String {
    match try_format(template, bindings) {
        Some(rendered) => rendered,
        None => fallback.to_string(),
    }
}

fn try_format(template: &str, bindings: &BTreeMap<String, String>) -> Option<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' => {
                if chars.peek() == Some(&'{') {
                    chars.next();
                    out.push('{');
                    continue;
                }
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        // nested or unclosed placeholder
                        Some('{') | None => return None,
                        Some(c) => name.push(c),
                    }
                }
                // `{name=}` renders as `name=value`
                let (key, echo) = match name.strip_suffix('=') {
                    Some(stripped) => (stripped, true),
                    None => (name.as_str(), false),
                };
                let value = bindings.get(key)?;
                if echo {
                    out.push_str(key);
                    out.push('=');
                }
                out.push_str(value);
            }
            '}' => {
                if chars.peek() == Some(&'}') {
                    chars.next();
                    out.push('}');
                } else {
                    // stray closing brace
                    return None;
                }
            }
            c => out.push(c),
        }
    }

    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_simple_substitution() {
        let b = bindings(&[("name", "world")]);
        assert_eq!(format_template("hello {name}", &b, "..."), "hello world");
    }

    #[test]
    fn test_echo_placeholder() {
        let b = bindings(&[("a", "1")]);
        assert_eq!(format_template("span {a=}", &b, "..."), "span a=1");
    }

    #[test]
    fn test_missing_binding_falls_back() {
        let b = bindings(&[]);
        assert_eq!(format_template("hello {name}", &b, "..."), "...");
    }

    #[test]
    fn test_malformed_template_falls_back() {
        let b = bindings(&[("a", "1")]);
        assert_eq!(format_template("oops {a", &b, "..."), "...");
        assert_eq!(format_template("oops }", &b, "..."), "...");
        assert_eq!(format_template("oops {a{b}}", &b, "..."), "...");
    }

    #[test]
    fn test_escaped_braces() {
        let b = bindings(&[]);
        assert_eq!(format_template("literal {{x}}", &b, "..."), "literal {x}");
    }

    #[test]
    fn test_rerender_is_stable() {
        let b = bindings(&[("n", "3")]);
        let first = format_template("count {n}", &b, "...");
        let second = format_template("count {n}", &b, "...");
        assert_eq!(first, second);
    }
}
