//! Markdown stripping for assistant replies
//!
//! Only a handful of markers are recognised: ATX headings at line start,
//! `*`/`_` emphasis and inline links. Anything else is left untouched. Bare
//! URLs are copied through verbatim so underscores in product links survive.

use regex::Regex;
use std::sync::LazyLock;

static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]{0,3}#{1,6}[ \t]+").expect("valid heading regex"));
static EMPHASIS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[*_]+").expect("valid emphasis regex"));
static LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").expect("valid link regex"));
static BARE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[^\s)*]+").expect("valid url regex"));

/// Strip recognised markdown from `text`.
///
/// Passes repeat until nothing changes, so stripping one marker can never
/// leave behind another one; `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(text: &str) -> String {
    let mut current = text.to_string();
    loop {
        let next = normalize_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn normalize_once(text: &str) -> String {
    let without_headings = HEADING.replace_all(text, "");
    let without_emphasis = strip_emphasis(&without_headings);
    LINK.replace_all(&without_emphasis, "$1 ($2)").into_owned()
}

fn strip_emphasis(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for url in BARE_URL.find_iter(text) {
        // A closing `_` marker hugging the URL is emphasis, not path.
        let kept = url.as_str().trim_end_matches('_');
        out.push_str(&EMPHASIS.replace_all(&text[last..url.start()], ""));
        out.push_str(kept);
        last = url.start() + kept.len();
    }
    out.push_str(&EMPHASIS.replace_all(&text[last..], ""));
    out
}
