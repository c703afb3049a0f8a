//! Best-effort extraction of component entries from a listing page.
//!
//! The listing page has no structural contract, so extraction never trusts a
//! single selector. The page is cut into anchor blocks that link to
//! `/components/<slug>`, and each block runs through [`STRATEGIES`] in order.
//! The first strategy that yields an entry wins. A block that no strategy
//! accepts is skipped and counted; it never aborts the page.
//!
//! Every strategy is a pure function from one block of raw markup to zero or
//! one [`ListingEntry`], so each can be tested without a network.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::fetch::validate_slug;
use crate::normalize::normalize;

/// A component found on a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub name: String,
    pub slug: String,
}

/// A single extraction strategy.
pub type Strategy = fn(&str) -> Option<ListingEntry>;

/// Strategies in priority order.
pub const STRATEGIES: &[(&str, Strategy)] = &[
    ("heading", from_heading),
    ("label", from_label),
    ("text", from_anchor_text),
    ("slug", from_slug),
];

/// Longest anchor text accepted as a display name. Longer text is a card
/// body, not a name.
const MAX_TEXT_NAME: usize = 60;

static ANCHOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\b[^>]*?\bhref\s*=\s*["'][^"']*/components/[^"']+["'][^>]*>.*?</a>"#)
        .expect("anchor pattern")
});
static HREF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bhref\s*=\s*["']([^"']+)["']"#).expect("href pattern")
});
static HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<h[1-6]\b[^>]*>(.*?)</h[1-6]>").expect("heading pattern")
});
static LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(?:aria-label|title)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
        .expect("label pattern")
});
static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("tag pattern"));
static INNER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^<a\b[^>]*>(.*)</a>$").expect("inner pattern"));

/// Result of extracting a whole page.
#[derive(Debug, Default)]
pub struct Extraction {
    pub entries: Vec<ListingEntry>,
    /// Anchor blocks that no strategy could turn into an entry.
    pub skipped: usize,
}

/// Runs every anchor block on the page through the strategy list.
///
/// Duplicate slugs keep their first occurrence.
pub fn extract_listing(html: &str) -> Extraction {
    let mut extraction = Extraction::default();
    let mut seen = HashSet::new();

    for block in ANCHOR_RE.find_iter(html) {
        let block = block.as_str();
        let found = STRATEGIES
            .iter()
            .find_map(|(name, strategy)| strategy(block).map(|entry| (*name, entry)));

        match found {
            Some((strategy, entry)) => {
                if seen.insert(entry.slug.clone()) {
                    tracing::trace!(strategy, slug = %entry.slug, name = %entry.name, "extracted listing entry");
                    extraction.entries.push(entry);
                }
            }
            None => extraction.skipped += 1,
        }
    }

    extraction
}

/// Slug of the `/components/<slug>` link in a block, if it is a safe slug.
pub fn component_slug(block: &str) -> Option<String> {
    let href = HREF_RE.captures(block)?.get(1)?.as_str();
    let (_, rest) = href.split_once("/components/")?;
    let slug = rest.split(['/', '?', '#']).next()?.trim();
    validate_slug(slug).ok()?;
    Some(slug.to_string())
}

/// Name from the first non-empty heading inside the anchor.
pub fn from_heading(block: &str) -> Option<ListingEntry> {
    let slug = component_slug(block)?;
    let name = HEADING_RE
        .captures_iter(block)
        .filter_map(|c| c.get(1))
        .map(|m| visible_text(m.as_str()))
        .find(|text| is_usable_name(text))?;
    Some(ListingEntry { name, slug })
}

/// Name from an `aria-label` or `title` attribute.
pub fn from_label(block: &str) -> Option<ListingEntry> {
    let slug = component_slug(block)?;
    let name = LABEL_RE
        .captures_iter(block)
        .filter_map(|c| c.get(1).or_else(|| c.get(2)))
        .map(|m| collapse_whitespace(&decode_entities(m.as_str())))
        .find(|text| is_usable_name(text))?;
    Some(ListingEntry { name, slug })
}

/// Name from the anchor's visible text, when it is short enough to be one.
pub fn from_anchor_text(block: &str) -> Option<ListingEntry> {
    let slug = component_slug(block)?;
    let inner = INNER_RE.captures(block)?.get(1)?.as_str();
    let name = visible_text(inner);
    if !is_usable_name(&name) || name.chars().count() > MAX_TEXT_NAME {
        return None;
    }
    Some(ListingEntry { name, slug })
}

/// Name derived from the slug itself. Succeeds whenever the link does.
pub fn from_slug(block: &str) -> Option<ListingEntry> {
    let slug = component_slug(block)?;
    let name = slug
        .split(['-', '_', '.'])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ");
    if !is_usable_name(&name) {
        return None;
    }
    Some(ListingEntry { name, slug })
}

fn is_usable_name(text: &str) -> bool {
    normalize(text).is_ok()
}

fn visible_text(markup: &str) -> String {
    collapse_whitespace(&decode_entities(&TAG_RE.replace_all(markup, " ")))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heading_strategy_wins() {
        let block = r#"<a href="/components/3d-pin" class="card"><div><h3 class="font-bold">3D Pin</h3><p>A gradient pin that animates on hover.</p></div></a>"#;
        assert_eq!(
            from_heading(block),
            Some(ListingEntry {
                name: "3D Pin".into(),
                slug: "3d-pin".into()
            })
        );
    }

    #[test]
    fn label_strategy_reads_attributes() {
        let block = r#"<a aria-label="Bento &amp; Grid" href="/components/bento-grid"><img src="x.png"/></a>"#;
        assert_eq!(from_heading(block), None);
        assert_eq!(from_label(block).unwrap().name, "Bento & Grid");

        let single = "<a title='Lamp Effect' href='/components/lamp-effect'></a>";
        assert_eq!(from_label(single).unwrap().name, "Lamp Effect");
    }

    #[test]
    fn text_strategy_rejects_card_bodies() {
        let short = r#"<a href="https://ui.aceternity.com/components/spotlight">  <span>Spot</span>light </a>"#;
        assert_eq!(from_anchor_text(short).unwrap().name, "Spot light");

        let long = format!(
            r#"<a href="/components/x">{}</a>"#,
            "word ".repeat(30)
        );
        assert_eq!(from_anchor_text(&long), None);
    }

    #[test]
    fn slug_strategy_is_last_resort() {
        let block = r#"<a href="/components/3d-card-effect/"><svg></svg></a>"#;
        assert_eq!(from_label(block), None);
        assert_eq!(from_anchor_text(block), None);
        assert_eq!(from_slug(block).unwrap().name, "3d Card Effect");
    }

    #[test]
    fn unsafe_slugs_fail_every_strategy() {
        let block = r#"<a href="/components/..%2Fetc"><h3>Evil</h3></a>"#;
        for (name, strategy) in STRATEGIES {
            assert_eq!(strategy(block), None, "strategy {name} accepted unsafe slug");
        }
    }

    #[test]
    fn extracts_a_messy_page() {
        let html = r#"
<nav><a href="/components">All components</a></nav>
<main>
  <a href="/components/3d-pin"><h3>3D Pin</h3></a>
  <a href="/components/3d-pin"><h3>3D Pin (again)</h3></a>
  <A HREF='/components/bento-grid' aria-label='Bento Grid'><img/></A>
  <a href="/components/sparkles?ref=nav">Sparkles</a>
  <a href="/components/..bad"><h3>Bad</h3></a>
  <a href="/docs/install">Install</a>
</main>"#;
        let extraction = extract_listing(html);
        let slugs: Vec<_> = extraction.entries.iter().map(|e| e.slug.as_str()).collect();
        assert_eq!(slugs, vec!["3d-pin", "bento-grid", "sparkles"]);
        assert_eq!(extraction.entries[0].name, "3D Pin");
        assert_eq!(extraction.entries[1].name, "Bento Grid");
        assert_eq!(extraction.entries[2].name, "Sparkles");
        assert_eq!(extraction.skipped, 1);
    }
}
