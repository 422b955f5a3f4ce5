//! Markup template processing.
//!
//! An application entry arrives as a markup document. Processing strips
//! comments, lifts every script and external stylesheet out of the document
//! in order, and leaves an order-preserving placeholder comment at each
//! extraction site so embedded content can be put back in place later. The
//! document that remains is the application's wrapper template.

use regex::{Captures, Regex};
use std::sync::LazyLock;
use url::Url;

use crate::error::{EntryError, EntryResult};

static COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid pattern"));
static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<link\b([^>]*?)>").expect("valid pattern"));
static STYLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<style\b([^>]*?)>.*?</style\s*>").expect("valid pattern"));
static SCRIPT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b([^>]*?)>(.*?)</script\s*>|<script\b([^>]*?)/\s*>")
        .expect("valid pattern")
});
static SRC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bsrc\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>'"]+))"#).expect("valid pattern")
});
static HREF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bhref\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>'"]+))"#).expect("valid pattern")
});
static REL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\brel\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>'"]+))"#).expect("valid pattern")
});
static TYPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\btype\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>'"]+))"#).expect("valid pattern")
});
// Flags are matched against an attribute span only (never a full tag), so
// the trailing boundary is whitespace, `=`, a self-closing `/`, or the end
// of the span.
static ENTRY_FLAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:^|\s)entry(?:[\s=/]|$)").expect("valid pattern"));
static IGNORE_FLAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:^|\s)ignore(?:[\s=/]|$)").expect("valid pattern"));

/// Script media types treated as executable.
const EXECUTABLE_TYPES: &[&str] = &[
    "text/javascript",
    "module",
    "application/javascript",
    "text/ecmascript",
    "application/ecmascript",
];

/// A script reference lifted out of the template, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptRef {
    /// An external script address, resolved against the entry's base.
    External {
        /// The absolute address.
        url: String,
    },
    /// An inline fragment preserved verbatim.
    Inline {
        /// The full tag text; its leading `<` marks the reference as inline.
        markup: String,
        /// The fragment body.
        code: String,
    },
}

impl ScriptRef {
    /// The reference identity: address for external scripts, verbatim tag
    /// text for inline fragments.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::External { url } => url,
            Self::Inline { markup, .. } => markup,
        }
    }

    /// Whether this is an inline fragment.
    #[must_use]
    pub fn is_inline(&self) -> bool {
        matches!(self, Self::Inline { .. })
    }
}

/// The outcome of processing an entry's markup.
#[derive(Debug, Clone)]
pub struct TemplateAssets {
    /// The markup with scripts and external stylesheets lifted out.
    pub template: String,
    /// Script references in document order.
    pub scripts: Vec<ScriptRef>,
    /// External stylesheet addresses in document order.
    pub styles: Vec<String>,
    /// The entry script's reference identity: the script marked as entry,
    /// else the last script in the document.
    pub entry: Option<String>,
}

/// Placeholder left where an external stylesheet was lifted out.
#[must_use]
pub fn style_placeholder(url: &str) -> String {
    format!("<!-- stylesheet {url} extracted -->")
}

/// Placeholder left where an external script was lifted out.
#[must_use]
pub fn script_placeholder(url: &str) -> String {
    format!("<!-- script {url} extracted -->")
}

/// Placeholder left where an inline script was lifted out.
#[must_use]
pub fn inline_script_placeholder() -> String {
    "<!-- inline script extracted -->".to_string()
}

/// Placeholder left where an ignore-marked asset was dropped.
#[must_use]
pub fn ignored_asset_placeholder(what: &str) -> String {
    format!("<!-- {what} ignored as marked -->")
}

/// Base address an entry's relative references resolve against: the locator
/// with its last path segment dropped.
pub fn public_path(locator: &str) -> EntryResult<Url> {
    let url = Url::parse(locator).map_err(|e| EntryError::InvalidAddress {
        url: locator.to_string(),
        message: e.to_string(),
    })?;
    url.join("./").map_err(|e| EntryError::InvalidAddress {
        url: locator.to_string(),
        message: e.to_string(),
    })
}

/// Resolve a raw reference against the entry's base.
///
/// Scheme-relative references assume https; absolute references pass
/// through; without a base, relative references pass through unchanged.
#[must_use]
pub fn resolve_ref(base: Option<&Url>, raw: &str) -> String {
    if let Some(rest) = raw.strip_prefix("//") {
        return format!("https://{rest}");
    }
    if Url::parse(raw).is_ok() {
        return raw.to_string();
    }
    match base {
        Some(base) => base
            .join(raw)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| raw.to_string()),
        None => raw.to_string(),
    }
}

fn attr_value(attrs: &str, re: &Regex) -> Option<String> {
    re.captures(attrs).and_then(|caps| {
        caps.get(1)
            .or_else(|| caps.get(2))
            .or_else(|| caps.get(3))
            .map(|m| m.as_str().to_string())
    })
}

fn has_flag(attrs: &str, re: &Regex) -> bool {
    re.is_match(attrs)
}

/// Rewrite every match of `re`, keeping the original text where the
/// callback yields `None`.
fn rewrite<F>(input: &str, re: &Regex, mut f: F) -> String
where
    F: FnMut(&Captures<'_>) -> Option<String>,
{
    let mut out = String::with_capacity(input.len());
    let mut last = 0;
    for caps in re.captures_iter(input) {
        let m = caps.get(0).map_or((0, 0), |m| (m.start(), m.end()));
        out.push_str(&input[last..m.0]);
        match f(&caps) {
            Some(replacement) => out.push_str(&replacement),
            None => out.push_str(&input[m.0..m.1]),
        }
        last = m.1;
    }
    out.push_str(&input[last..]);
    out
}

/// Lift scripts and external stylesheets out of `markup`.
///
/// `locator` only labels errors; `base` resolves relative references.
pub fn process_markup(
    markup: &str,
    base: Option<&Url>,
    locator: &str,
) -> EntryResult<TemplateAssets> {
    let stripped = COMMENT_RE.replace_all(markup, "");

    let mut styles = Vec::new();
    let with_links = rewrite(&stripped, &LINK_RE, |caps| {
        let attrs = caps.get(1).map_or("", |m| m.as_str());
        let rel = attr_value(attrs, &REL_RE);
        if rel.as_deref() != Some("stylesheet") {
            return None;
        }
        let href = attr_value(attrs, &HREF_RE)?;
        if has_flag(attrs, &IGNORE_FLAG_RE) {
            return Some(ignored_asset_placeholder(&href));
        }
        let url = resolve_ref(base, &href);
        let placeholder = style_placeholder(&url);
        styles.push(url);
        Some(placeholder)
    });

    let with_styles = rewrite(&with_links, &STYLE_RE, |caps| {
        let attrs = caps.get(1).map_or("", |m| m.as_str());
        if has_flag(attrs, &IGNORE_FLAG_RE) {
            Some(ignored_asset_placeholder("style block"))
        } else {
            None
        }
    });

    let mut scripts: Vec<ScriptRef> = Vec::new();
    let mut entry: Option<String> = None;
    let mut duplicate_entry = false;
    let template = rewrite(&with_styles, &SCRIPT_RE, |caps| {
        let attrs = caps
            .get(1)
            .or_else(|| caps.get(3))
            .map_or("", |m| m.as_str());
        let body = caps.get(2).map_or("", |m| m.as_str());

        if let Some(kind) = attr_value(attrs, &TYPE_RE)
            && !EXECUTABLE_TYPES.contains(&kind.to_ascii_lowercase().as_str())
        {
            return None;
        }

        if let Some(src) = attr_value(attrs, &SRC_RE) {
            if has_flag(attrs, &IGNORE_FLAG_RE) {
                return Some(ignored_asset_placeholder(&src));
            }
            let url = resolve_ref(base, &src);
            if has_flag(attrs, &ENTRY_FLAG_RE) {
                if entry.is_some() {
                    duplicate_entry = true;
                } else {
                    entry = Some(url.clone());
                }
            }
            let placeholder = script_placeholder(&url);
            scripts.push(ScriptRef::External { url });
            return Some(placeholder);
        }

        if has_flag(attrs, &IGNORE_FLAG_RE) {
            return Some(ignored_asset_placeholder("inline script"));
        }
        let code = body.trim();
        if code.is_empty() {
            return Some(String::new());
        }
        let markup = caps.get(0).map_or("", |m| m.as_str()).to_string();
        scripts.push(ScriptRef::Inline {
            markup,
            code: code.to_string(),
        });
        Some(inline_script_placeholder())
    });

    if duplicate_entry {
        return Err(EntryError::MultipleEntryScripts {
            url: locator.to_string(),
        });
    }
    let entry = entry.or_else(|| scripts.last().map(|s| s.id().to_string()));

    Ok(TemplateAssets {
        template,
        scripts,
        styles,
        entry,
    })
}
