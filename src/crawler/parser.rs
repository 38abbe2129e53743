//! Listing page parser
//!
//! This module turns a listing page into novel records. A page holds its
//! entries as `ul.flex li` items; only items carrying both a title heading and
//! a description paragraph are real listing entries. Each entry is parsed
//! independently and a broken entry never affects its neighbours.

use crate::crawler::time::{normalize_update_time, TimeParseError};
use crate::storage::Novel;
use chrono::NaiveDateTime;
use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;
use thiserror::Error;
use url::Url;

pub const UNKNOWN_TITLE: &str = "未知标题";
pub const UNKNOWN_AUTHOR: &str = "未知作者";
pub const UNKNOWN_CATEGORY: &str = "未知分类";
pub const UNKNOWN_STATUS: &str = "未知状态";

/// Unit suffix of the word-count token, worth ten thousand characters
const WORD_COUNT_UNIT: &str = "万字";
const WORD_COUNT_MULTIPLIER: i64 = 10_000;

/// Why a listing entry produced no record
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkipReason {
    #[error("entry has no link")]
    MissingLink,

    #[error("link '{0}' cannot be resolved against the base URL")]
    InvalidLink(String),

    #[error("cannot derive a numeric id from '{0}'")]
    InvalidId(String),

    #[error(transparent)]
    UpdateTime(#[from] TimeParseError),
}

/// Records extracted from one listing page
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    pub novels: Vec<Novel>,
    /// Entries that were listing items but yielded no record
    pub skipped: Vec<SkipReason>,
}

struct Selectors {
    item: Selector,
    title: Selector,
    link: Selector,
    label: Selector,
    author: Selector,
    word_count: Selector,
    update_time: Selector,
    description: Selector,
}

fn selectors() -> &'static Selectors {
    static SELECTORS: OnceLock<Selectors> = OnceLock::new();
    SELECTORS.get_or_init(|| {
        let parse = |css: &str| Selector::parse(css).expect("static selector is valid");
        Selectors {
            item: parse("ul.flex li"),
            title: parse("h2"),
            link: parse("a[href]"),
            label: parse("span"),
            author: parse("i.fa-user-circle-o"),
            word_count: parse("em.orange"),
            update_time: parse("em.blue"),
            description: parse("p.indent"),
        }
    })
}

/// Parses a listing page into novel records
///
/// Items lacking a title or description element are ignored outright; items
/// that are listing entries but cannot be turned into a record are reported
/// in `skipped`.
///
/// # Arguments
///
/// * `html` - The listing page body
/// * `base_url` - The site base URL, used to resolve relative links
/// * `now` - Reference time for relative update phrases
pub fn parse_listing(html: &str, base_url: &Url, now: NaiveDateTime) -> ParsedPage {
    let document = Html::parse_document(html);
    let sel = selectors();
    let mut page = ParsedPage::default();

    let candidates = document.select(&sel.item).filter(|item| {
        item.select(&sel.title).next().is_some() && item.select(&sel.description).next().is_some()
    });

    for item in candidates {
        match parse_novel(item, base_url, now) {
            Ok(novel) => page.novels.push(novel),
            Err(reason) => {
                tracing::warn!("Skipping listing entry: {}", reason);
                page.skipped.push(reason);
            }
        }
    }

    page
}

/// Parses a single listing entry
pub fn parse_novel(
    item: ElementRef<'_>,
    base_url: &Url,
    now: NaiveDateTime,
) -> Result<Novel, SkipReason> {
    let sel = selectors();

    let title = first_text(item, &sel.title).unwrap_or_else(|| UNKNOWN_TITLE.to_string());

    let href = item
        .select(&sel.link)
        .next()
        .and_then(|a| a.value().attr("href"))
        .ok_or(SkipReason::MissingLink)?;
    let source_url = base_url
        .join(href.trim())
        .map_err(|_| SkipReason::InvalidLink(href.to_string()))?;
    let id = novel_id_from_url(&source_url)?;

    let (category, status) = match first_text(item, &sel.label) {
        Some(label) => split_label(&label),
        None => (UNKNOWN_CATEGORY.to_string(), UNKNOWN_STATUS.to_string()),
    };

    let author = first_text(item, &sel.author)
        .map(|text| clean_author(&text))
        .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string());

    let word_count = first_text(item, &sel.word_count)
        .map(|text| parse_word_count(&text))
        .unwrap_or(0);

    let update_phrase = first_text(item, &sel.update_time).unwrap_or_default();
    let updated_at = normalize_update_time(&update_phrase, now)?;

    let description = first_text(item, &sel.description).unwrap_or_default();

    Ok(Novel {
        id,
        title,
        author,
        category,
        status,
        word_count,
        description,
        source_url: source_url.to_string(),
        created_at: None,
        updated_at,
    })
}

/// Derives the novel id from the last path segment of its detail URL
///
/// `https://site/book/1234.html` yields `1234`.
pub fn novel_id_from_url(url: &Url) -> Result<i64, SkipReason> {
    let segment = url.path().rsplit('/').next().unwrap_or_default();
    let id = segment.strip_suffix(".html").unwrap_or(segment);

    id.parse::<i64>()
        .map_err(|_| SkipReason::InvalidId(url.to_string()))
}

/// Converts a `N万字` token into a character count
///
/// Missing or unparsable numbers count as zero.
pub fn parse_word_count(text: &str) -> i64 {
    let number = text.trim().trim_end_matches(WORD_COUNT_UNIT).trim();
    match number.parse::<i64>() {
        Ok(n) => n.saturating_mul(WORD_COUNT_MULTIPLIER),
        Err(_) => {
            tracing::debug!("Unparsable word count '{}', using 0", text);
            0
        }
    }
}

/// Splits a `category/status` label
fn split_label(label: &str) -> (String, String) {
    let mut parts = label.split('/').map(str::trim);
    let category = parts.next().unwrap_or(UNKNOWN_CATEGORY).to_string();
    let status = parts.next().unwrap_or(UNKNOWN_STATUS).to_string();
    (category, status)
}

/// Strips non-breaking spaces and plain spaces from an author name
fn clean_author(text: &str) -> String {
    text.replace("&nbsp;", "")
        .chars()
        .filter(|c| *c != '\u{a0}' && *c != ' ')
        .collect::<String>()
        .trim()
        .to_string()
}

/// Text of the first element matching `selector`, trimmed
fn first_text(item: ElementRef<'_>, selector: &Selector) -> Option<String> {
    item.select(selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn base_url() -> Url {
        Url::parse("http://www.example.cc").unwrap()
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 10)
            .unwrap()
            .and_hms_opt(14, 25, 40)
            .unwrap()
    }

    fn wrap(items: &str) -> String {
        format!(
            r#"<html><body><ul class="flex">{}</ul></body></html>"#,
            items
        )
    }

    const FULL_ITEM: &str = r#"
        <li>
            <a href="/book/1234.html"><img src="/cover.jpg"></a>
            <h2> 斗破苍穹 </h2>
            <span>玄幻 / 完本</span>
            <i class="fa fa-user-circle-o">&nbsp;天蚕 土豆</i>
            <em class="orange">532万字</em>
            <em class="blue">3天前</em>
            <p class="indent"> 这里是属于斗气的世界。 </p>
        </li>"#;

    #[test]
    fn test_parse_full_item() {
        let page = parse_listing(&wrap(FULL_ITEM), &base_url(), now());
        assert_eq!(page.novels.len(), 1);
        assert!(page.skipped.is_empty());

        let novel = &page.novels[0];
        assert_eq!(novel.id, 1234);
        assert_eq!(novel.title, "斗破苍穹");
        assert_eq!(novel.source_url, "http://www.example.cc/book/1234.html");
        assert_eq!(novel.category, "玄幻");
        assert_eq!(novel.status, "完本");
        assert_eq!(novel.author, "天蚕土豆");
        assert_eq!(novel.word_count, 5_320_000);
        assert_eq!(novel.description, "这里是属于斗气的世界。");
        assert_eq!(
            novel.updated_at,
            NaiveDate::from_ymd_opt(2024, 3, 7)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        );
        assert!(novel.created_at.is_none());
    }

    #[test]
    fn test_absolute_link_kept() {
        let item = r#"<li><a href="https://mirror.example.org/b/77.html">x</a>
            <h2>T</h2><em class="blue">刚刚</em><p class="indent"></p></li>"#;
        let page = parse_listing(&wrap(item), &base_url(), now());
        assert_eq!(page.novels[0].id, 77);
        assert_eq!(page.novels[0].source_url, "https://mirror.example.org/b/77.html");
        assert_eq!(page.novels[0].description, "");
    }

    #[test]
    fn test_defaults_for_missing_fields() {
        let item = r#"<li><a href="/book/9.html">x</a><h2>T</h2>
            <em class="blue">刚刚</em><p class="indent">d</p></li>"#;
        let page = parse_listing(&wrap(item), &base_url(), now());
        let novel = &page.novels[0];

        assert_eq!(novel.category, UNKNOWN_CATEGORY);
        assert_eq!(novel.status, UNKNOWN_STATUS);
        assert_eq!(novel.author, UNKNOWN_AUTHOR);
        assert_eq!(novel.word_count, 0);
        assert_eq!(novel.updated_at, now());
    }

    #[test]
    fn test_label_without_status() {
        let item = r#"<li><a href="/book/9.html">x</a><h2>T</h2><span>都市</span>
            <em class="blue">刚刚</em><p class="indent">d</p></li>"#;
        let novel = &parse_listing(&wrap(item), &base_url(), now()).novels[0];
        assert_eq!(novel.category, "都市");
        assert_eq!(novel.status, UNKNOWN_STATUS);
    }

    #[test]
    fn test_missing_link_is_skipped() {
        let item = r#"<li><h2>T</h2><em class="blue">刚刚</em><p class="indent">d</p></li>"#;
        let page = parse_listing(&wrap(item), &base_url(), now());
        assert!(page.novels.is_empty());
        assert_eq!(page.skipped, vec![SkipReason::MissingLink]);
    }

    #[test]
    fn test_non_numeric_id_is_skipped() {
        let item = r#"<li><a href="/book/about.html">x</a><h2>T</h2>
            <em class="blue">刚刚</em><p class="indent">d</p></li>"#;
        let page = parse_listing(&wrap(item), &base_url(), now());
        assert!(page.novels.is_empty());
        assert!(matches!(page.skipped[0], SkipReason::InvalidId(_)));
    }

    #[test]
    fn test_unparsable_update_time_is_skipped() {
        let item = r#"<li><a href="/book/5.html">x</a><h2>T</h2>
            <em class="blue">很久以前</em><p class="indent">d</p></li>"#;
        let page = parse_listing(&wrap(item), &base_url(), now());
        assert!(page.novels.is_empty());
        assert!(matches!(page.skipped[0], SkipReason::UpdateTime(_)));
    }

    #[test]
    fn test_non_entries_are_ignored() {
        let items = r#"
            <li><a href="/book/1.html">no title or description</a></li>
            <li><h2>title only</h2><a href="/book/2.html">x</a></li>
            <li><p class="indent">description only</p></li>"#;
        let page = parse_listing(&wrap(items), &base_url(), now());
        assert!(page.novels.is_empty());
        assert!(page.skipped.is_empty());
    }

    #[test]
    fn test_one_bad_entry_does_not_affect_others() {
        let bad = r#"<li><h2>broken</h2><p class="indent">d</p></li>"#;
        let items = format!("{}{}{}", FULL_ITEM, bad, FULL_ITEM.replace("1234", "5678"));
        let page = parse_listing(&wrap(&items), &base_url(), now());

        let ids: Vec<i64> = page.novels.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![1234, 5678]);
        assert_eq!(page.skipped.len(), 1);
    }

    #[test]
    fn test_novel_id_from_url() {
        let url = |s: &str| Url::parse(s).unwrap();
        assert_eq!(novel_id_from_url(&url("http://x.cc/book/42.html")), Ok(42));
        assert_eq!(novel_id_from_url(&url("http://x.cc/book/0042")), Ok(42));
        assert!(novel_id_from_url(&url("http://x.cc/book/42.htm")).is_err());
        assert!(novel_id_from_url(&url("http://x.cc/book/42/")).is_err());
        assert!(novel_id_from_url(&url("http://x.cc/book/abc.html")).is_err());
    }

    #[test]
    fn test_parse_word_count() {
        assert_eq!(parse_word_count("12万字"), 120_000);
        assert_eq!(parse_word_count(" 0万字 "), 0);
        assert_eq!(parse_word_count("很多万字"), 0);
        assert_eq!(parse_word_count(""), 0);
    }

    #[test]
    fn test_clean_author() {
        assert_eq!(clean_author("\u{a0}唐家 三少 "), "唐家三少");
        assert_eq!(clean_author("&nbsp;辰东"), "辰东");
    }
}
