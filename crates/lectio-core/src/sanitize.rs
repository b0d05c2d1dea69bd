//! Inline-markup sanitizer for free-text block fields.
//!
//! Only `strong`, `em`, `br`, `u`, `span`, `p` and `code` survive. Other tags are unwrapped
//! (their text is kept); `script`, `style` and `iframe` are dropped with their content. The
//! surviving tags are then balanced so the fragment can be embedded anywhere. Any `<` left
//! over that does not open a complete allowed tag is escaped.

use lol_html::{RewriteStrSettings, doc_comments, element, rewrite_str};
use regex::Regex;
use std::borrow::Cow;
use std::sync::OnceLock;

pub const ALLOWED_TAGS: &[&str] = &["strong", "em", "br", "u", "span", "p", "code"];

const ALLOWED_ATTRS: &[&str] = &["class", "style"];

const VOID_TAGS: &[&str] = &["br"];

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"<(/?)([A-Za-z][A-Za-z0-9-]*)((?:[^>\x22']|\x22[^\x22]*\x22|'[^']*')*?)(/?)>")
            .expect("valid regex")
    })
}

/// Doctypes, processing instructions and CDATA sections.
fn declaration_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[!?][^>]*>").expect("valid regex"))
}

fn is_allowed(lc_tag: &str) -> bool {
    ALLOWED_TAGS.contains(&lc_tag)
}

/// Restricts `text` to the inline allow-list. Idempotent.
pub fn sanitize(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    if !text.contains('<') {
        return text.to_string();
    }

    let escaped = escape_stray_lt(text);
    let stripped = strip_disallowed(&escaped);
    let stripped = declaration_regex().replace_all(&stripped, "");
    let balanced = balance_tags(&stripped);
    escape_incomplete_tags(&balanced).into_owned()
}

pub fn sanitize_opt(text: Option<&str>) -> Option<String> {
    text.map(sanitize)
}

/// Escapes `<` that cannot start a tag, so the rewriter treats it as text the way a browser
/// would (`a < b` → `a &lt; b`).
fn escape_stray_lt(input: &str) -> Cow<'_, str> {
    fn starts_tag(next: Option<u8>) -> bool {
        next.is_some_and(|b| b.is_ascii_alphabetic() || matches!(b, b'/' | b'!' | b'?'))
    }

    let bytes = input.as_bytes();
    let needs_escape = bytes
        .iter()
        .enumerate()
        .any(|(i, &b)| b == b'<' && !starts_tag(bytes.get(i + 1).copied()));
    if !needs_escape {
        return Cow::Borrowed(input);
    }

    let mut out = String::with_capacity(input.len() + 8);
    let mut last = 0usize;
    for (i, &b) in bytes.iter().enumerate() {
        if b == b'<' && !starts_tag(bytes.get(i + 1).copied()) {
            out.push_str(&input[last..i]);
            out.push_str("&lt;");
            last = i + 1;
        }
    }
    out.push_str(&input[last..]);
    Cow::Owned(out)
}

/// Escapes every `<` that does not open one of the complete tags kept by [`balance_tags`].
/// Unterminated tags (`<img src=x onerror=y` at the end of the text) end up as inert text.
fn escape_incomplete_tags(text: &str) -> Cow<'_, str> {
    let starts: Vec<usize> = tag_regex().find_iter(text).map(|m| m.start()).collect();
    if text.matches('<').count() == starts.len() {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len() + 8);
    let mut last = 0usize;
    for (i, _) in text.match_indices('<') {
        if starts.binary_search(&i).is_ok() {
            continue;
        }
        out.push_str(&text[last..i]);
        out.push_str("&lt;");
        last = i + 1;
    }
    out.push_str(&text[last..]);
    Cow::Owned(out)
}

fn strip_disallowed(text: &str) -> String {
    let handlers = vec![
        element!("script", |el| {
            el.remove();
            Ok(())
        }),
        element!("style", |el| {
            el.remove();
            Ok(())
        }),
        element!("iframe", |el| {
            el.remove();
            Ok(())
        }),
        element!("*", |el| {
            let lc_tag = el.tag_name().to_ascii_lowercase();
            if !is_allowed(&lc_tag) {
                el.remove_and_keep_content();
                return Ok(());
            }

            let names: Vec<String> = el.attributes().iter().map(|a| a.name()).collect();
            for name in names {
                if !ALLOWED_ATTRS.contains(&name.to_ascii_lowercase().as_str()) {
                    el.remove_attribute(&name);
                }
            }
            Ok(())
        }),
    ];

    rewrite_str(
        text,
        RewriteStrSettings {
            element_content_handlers: handlers,
            document_content_handlers: vec![doc_comments!(|c| {
                c.remove();
                Ok(())
            })],
            ..RewriteStrSettings::new()
        },
    )
    .unwrap_or_else(|err| {
        tracing::debug!(%err, "markup rewrite failed; falling back to tag scan");
        strip_disallowed_by_scan(text)
    })
}

/// Regex-based fallback used when the rewriter rejects the fragment.
fn strip_disallowed_by_scan(text: &str) -> String {
    tag_regex()
        .replace_all(text, |caps: &regex::Captures| {
            let lc_tag = caps[2].to_ascii_lowercase();
            if is_allowed(&lc_tag) {
                format!("<{}{}{}>", &caps[1], lc_tag, &caps[4])
            } else {
                String::new()
            }
        })
        .into_owned()
}

/// Drops unmatched closing tags and closes whatever is still open, innermost first.
fn balance_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    let mut open: Vec<String> = Vec::new();
    let mut last = 0usize;

    for caps in tag_regex().captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        out.push_str(&text[last..whole.start()]);
        last = whole.end();

        let closing = !caps[1].is_empty();
        let lc_tag = caps[2].to_ascii_lowercase();
        if !is_allowed(&lc_tag) {
            continue;
        }

        if VOID_TAGS.contains(&lc_tag.as_str()) {
            if !closing {
                out.push_str(whole.as_str());
            }
            continue;
        }

        if closing {
            let Some(pos) = open.iter().rposition(|t| *t == lc_tag) else {
                continue;
            };
            for inner in open.drain(pos..).rev() {
                out.push_str("</");
                out.push_str(&inner);
                out.push('>');
            }
            continue;
        }

        if !caps[4].is_empty() {
            // `<span/>` is not a void element; emit it as an empty pair.
            out.push_str(&whole.as_str()[..whole.as_str().len() - 2]);
            out.push_str("></");
            out.push_str(&lc_tag);
            out.push('>');
            continue;
        }

        out.push_str(whole.as_str());
        open.push(lc_tag);
    }
    out.push_str(&text[last..]);

    for tag in open.iter().rev() {
        out.push_str("</");
        out.push_str(tag);
        out.push('>');
    }
    out
}
