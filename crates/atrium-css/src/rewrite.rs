//! Selector rewriting.
//!
//! A sheet is split into top-level rules. Style rules get their selectors
//! scoped; `@media` and `@supports` recurse into their bodies with the
//! condition text preserved; every other at-rule (keyframes, font-face,
//! page, import) passes through verbatim.

use regex::{Captures, Regex};
use std::sync::LazyLock;

/// A root selector with its left boundary: start of selector or any
/// character that cannot continue an identifier, class, or id.
static ROOT_SELECTOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"((?:[^\w\-.#]|^)(body|html|:root))").expect("valid pattern"));
/// A root element followed by a combinator, as in `html body` or `html > body`.
static ROOT_COMBINATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(html[^\w\{\[]+)").expect("valid pattern"));
/// A root combination whose combinator is a sibling combinator.
static SIBLING_COMBINATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(html[^\w\{]+)(\+|~)").expect("valid pattern"));

enum Rule<'a> {
    /// A braceless statement such as `@import url(x.css);`.
    Statement(&'a str),
    /// `prelude { body }`.
    Block { prelude: &'a str, body: &'a str },
}

/// Split a sheet into top-level rules, tolerating nested braces.
fn split_rules(css: &str) -> Vec<Rule<'_>> {
    let mut rules = Vec::new();
    let bytes = css.as_bytes();
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b';' => {
                let statement = css[start..i].trim();
                if !statement.is_empty() {
                    rules.push(Rule::Statement(statement));
                }
                start = i + 1;
                i += 1;
            }
            b'{' => {
                let prelude = &css[start..i];
                let mut depth = 1;
                let body_start = i + 1;
                let mut j = body_start;
                while j < bytes.len() && depth > 0 {
                    match bytes[j] {
                        b'{' => depth += 1,
                        b'}' => depth -= 1,
                        _ => {}
                    }
                    j += 1;
                }
                let body_end = if depth == 0 { j - 1 } else { j };
                rules.push(Rule::Block {
                    prelude,
                    body: &css[body_start..body_end],
                });
                start = j;
                i = j;
            }
            _ => i += 1,
        }
    }
    let tail = css[start..].trim();
    if !tail.is_empty() {
        rules.push(Rule::Statement(tail));
    }
    rules
}

/// Scope one style rule's selector list.
fn scope_selectors(prelude: &str, scope: &str) -> String {
    let selector = prelude.trim();

    // A rule that targets only the root maps onto the wrapper itself.
    if matches!(selector, "html" | "body" | ":root") {
        return ROOT_SELECTOR_RE.replace_all(selector, scope).into_owned();
    }

    let mut text = selector.to_string();
    if ROOT_COMBINATION_RE.is_match(&text) && !SIBLING_COMBINATION_RE.is_match(&text) {
        // `html body .x` means `.x` under the wrapper; drop the root chain.
        // Sibling combinators would change meaning, so those keep it.
        text = ROOT_COMBINATION_RE.replace_all(&text, "").into_owned();
    }

    text.split(',')
        .map(|item| {
            if ROOT_SELECTOR_RE.is_match(item) {
                ROOT_SELECTOR_RE
                    .replace_all(item, |caps: &Captures<'_>| {
                        let matched = caps.get(0).map_or("", |m| m.as_str());
                        match matched.chars().next() {
                            Some(boundary @ (',' | '(')) => format!("{boundary}{scope}"),
                            _ => scope.to_string(),
                        }
                    })
                    .into_owned()
            } else {
                format!("{scope} {}", item.trim_start())
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Rewrite a whole sheet under `scope`.
#[must_use]
pub fn rewrite(css: &str, scope: &str) -> String {
    let mut out = String::with_capacity(css.len());
    for rule in split_rules(css) {
        match rule {
            Rule::Statement(statement) => {
                out.push_str(statement);
                out.push(';');
            }
            Rule::Block { prelude, body } => {
                let trimmed = prelude.trim();
                if let Some(condition) = trimmed.strip_prefix("@media") {
                    out.push_str(&format!(
                        "@media {} {{{}}}",
                        condition.trim(),
                        rewrite(body, scope)
                    ));
                } else if let Some(condition) = trimmed.strip_prefix("@supports") {
                    out.push_str(&format!(
                        "@supports {} {{{}}}",
                        condition.trim(),
                        rewrite(body, scope)
                    ));
                } else if trimmed.starts_with('@') {
                    out.push_str(&format!("{trimmed} {{{body}}}"));
                } else {
                    out.push_str(&format!("{} {{{body}}}", scope_selectors(prelude, scope)));
                }
            }
        }
    }
    out
}
