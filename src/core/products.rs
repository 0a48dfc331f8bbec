//! Best-effort product mining from assistant text
//!
//! The assistant answers in prose, so product boundaries are guessed from
//! runs of word-like characters. A run directly followed by a URL takes that
//! URL as its link; otherwise it borrows a marketplace URL found elsewhere in
//! the text, cycling through them in order.

use crate::core::config::ExtractionConfig;
use crate::core::models::ExtractedProduct;
use regex::Regex;
use std::sync::LazyLock;

const MIN_NAME_LEN: usize = 4;
const URL_TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?'];

static URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[^\s)]+").expect("valid url regex"));
static NAME_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9 \t&'-]+").expect("valid name regex"));
// What may sit between a name and the URL that belongs to it.
static ADJACENT_GAP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ \t]*\(?[ \t]*$").expect("valid gap regex"));

#[derive(Debug, Clone)]
pub struct ProductExtractor {
    marketplace_domains: Vec<String>,
}

impl ProductExtractor {
    pub fn new(marketplace_domains: Vec<String>) -> Self {
        Self {
            marketplace_domains: marketplace_domains
                .into_iter()
                .map(|d| d.trim().to_ascii_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
        }
    }

    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self::new(config.marketplace_domains.clone())
    }

    /// Every marketplace URL in `text`, in order of appearance.
    pub fn marketplace_links(&self, text: &str) -> Vec<String> {
        URL.find_iter(text)
            .map(|m| clean_url(m.as_str()))
            .filter(|u| self.is_marketplace_url(u))
            .collect()
    }

    pub fn extract(&self, text: &str) -> Vec<ExtractedProduct> {
        let fallback_links = self.marketplace_links(text);
        let mut products: Vec<ExtractedProduct> = Vec::new();

        // URLs split the text into segments; names are only searched between
        // them so pieces of a URL ("amazon", "www") never become products.
        let mut segment_start = 0;
        let mut urls = URL.find_iter(text);
        loop {
            let next_url = urls.next();
            let segment_end = next_url.map_or(text.len(), |m| m.start());
            let segment = &text[segment_start..segment_end];

            let runs: Vec<_> = NAME_RUN.find_iter(segment).collect();
            for (i, run) in runs.iter().enumerate() {
                let name = run.as_str().trim();
                if name.chars().count() < MIN_NAME_LEN
                    || name.to_ascii_lowercase().starts_with("http")
                {
                    continue;
                }

                let is_last = i + 1 == runs.len();
                let adjacent = next_url
                    .filter(|_| is_last && ADJACENT_GAP.is_match(&segment[run.end()..]))
                    .map(|m| clean_url(m.as_str()));
                let link = match adjacent {
                    Some(link) => Some(link),
                    None if !fallback_links.is_empty() => {
                        Some(fallback_links[products.len() % fallback_links.len()].clone())
                    }
                    None => None,
                };

                if !products.iter().any(|p| p.name == name) {
                    products.push(ExtractedProduct::new(name, link));
                }
            }

            match next_url {
                Some(m) => segment_start = m.end(),
                None => break,
            }
        }

        log::debug!(
            "Extracted {} product(s) using {} marketplace link(s)",
            products.len(),
            fallback_links.len()
        );
        products
    }

    fn is_marketplace_url(&self, candidate: &str) -> bool {
        let Ok(parsed) = url::Url::parse(candidate) else {
            return false;
        };
        let Some(host) = parsed.domain() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        self.marketplace_domains
            .iter()
            .any(|d| host == *d || host.ends_with(&format!(".{d}")))
    }
}

impl Default for ProductExtractor {
    fn default() -> Self {
        Self::from_config(&ExtractionConfig::default())
    }
}

fn clean_url(raw: &str) -> String {
    raw.trim_end_matches(URL_TRAILING_PUNCTUATION).to_string()
}
