//! 书籍 ID/链接解析与规范化。

use regex::Regex;
use std::sync::OnceLock;

static RE_URL: OnceLock<Regex> = OnceLock::new();
static RE_DETAILS: OnceLock<Regex> = OnceLock::new();
static RE_IDENT: OnceLock<Regex> = OnceLock::new();

fn re_url() -> &'static Regex {
    RE_URL.get_or_init(|| Regex::new(r"https?://\S+").expect("compile RE_URL"))
}

fn re_details() -> &'static Regex {
    RE_DETAILS.get_or_init(|| {
        Regex::new(r"archive\.org/(?:details|borrow|stream)/([A-Za-z0-9._-]+)")
            .expect("compile RE_DETAILS")
    })
}

fn re_ident() -> &'static Regex {
    RE_IDENT.get_or_init(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("compile RE_IDENT"))
}

/// 从用户输入中提取 archive.org 条目标识（`/details/` 之后的部分）。
pub fn parse_book_id(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    if re_ident().is_match(trimmed) {
        return Some(trimmed.to_string());
    }

    // If user pasted extra text around the URL, try to extract URL first.
    let target = re_url()
        .find(trimmed)
        .map(|m| m.as_str())
        .unwrap_or(trimmed);

    re_details()
        .captures(target)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
