//! `{{placeholder}}` interpolation.
//!
//! Supports:
//! - `{{name}}`, with optional whitespace inside the braces
//! - unknown names are left in the output verbatim

use std::sync::LazyLock;

use regex::{Captures, Regex};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([^{}\s]+)\s*\}\}").expect("Invalid regex pattern")
});

/// Replace every placeholder for which `lookup` yields a value.
pub fn interpolate<F>(template: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            let name = &caps[1];
            lookup(name).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn vars(name: &str) -> Option<String> {
        match name {
            "userId" => Some("u1".into()),
            "filename" => Some("test.guac".into()),
            _ => None,
        }
    }

    #[rstest]
    #[case("recordings/{{userId}}/{{filename}}", "recordings/u1/test.guac")]
    #[case("{{ userId }}-{{filename  }}", "u1-test.guac")]
    #[case("{{missing}}/{{filename}}", "{{missing}}/test.guac")]
    #[case("no placeholders", "no placeholders")]
    #[case("{{}}{{userId", "{{}}{{userId")]
    fn interpolates(#[case] template: &str, #[case] expected: &str) {
        assert_eq!(interpolate(template, vars), expected);
    }

    #[test]
    fn substituted_values_are_not_rescanned() {
        let out = interpolate("{{a}}", |name| (name == "a").then(|| "{{a}}".to_string()));
        assert_eq!(out, "{{a}}");
    }
}
