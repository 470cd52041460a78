//! `ContentExtractor` — deterministic HTML -> structured content (§4.4).

use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::{CoreResult, ExtractError};
use crate::types::{Confidence, ExtractedLink, ExtractedTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitleSource {
    OgTitle,
    TitleTag,
    H1,
    Unknown,
}

impl TitleSource {
    fn confidence_score(self) -> f32 {
        match self {
            TitleSource::OgTitle => 0.9,
            TitleSource::TitleTag => 0.85,
            TitleSource::H1 => 0.6,
            TitleSource::Unknown => 0.05,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExtractionResult {
    pub title: String,
    pub title_source: TitleSource,
    pub text: String,
    pub markdown: String,
    pub links: Vec<ExtractedLink>,
    pub tables: Vec<ExtractedTable>,
    pub language: Option<String>,
    pub confidence: Confidence,
}

/// Length thresholds for the field-confidence step (§4.4 step 8).
fn length_confidence(len: usize) -> f32 {
    match len {
        0..=49 => 0.1,
        50..=199 => 0.3,
        200..=999 => 0.6,
        _ => 0.9,
    }
}

/// Tags stripped before flattening main content to text/markdown.
const STRIPPED_TAGS: &[&str] = &["nav", "header", "footer", "aside", "script", "style"];

/// `extract(html, url)` per §4.4. Pure function: no I/O, no shared state.
pub fn extract(html: &str, url: &str) -> CoreResult<ExtractionResult> {
    let base = Url::parse(url).map_err(ExtractError::InvalidBaseUrl)?;
    let document = Html::parse_document(html);

    let (title, title_source) = extract_title(&document);
    let main = select_main_content(&document);

    let text = main
        .as_ref()
        .map(|el| flatten_text(*el))
        .unwrap_or_default();
    let markdown = main
        .as_ref()
        .map(|el| to_markdown(*el))
        .unwrap_or_default();
    let links = main
        .as_ref()
        .map(|el| extract_links(*el, &base))
        .unwrap_or_default();
    let tables = main
        .as_ref()
        .map(|el| extract_tables(*el))
        .unwrap_or_default();
    let language = extract_language(&document);

    let confidence_score = if text.is_empty() {
        0.0
    } else {
        (title_source.confidence_score() * 0.3 + length_confidence(text.len()) * 0.7).min(1.0)
    };

    Ok(ExtractionResult {
        title,
        title_source,
        text,
        markdown,
        links,
        tables,
        language,
        confidence: Confidence::new(confidence_score, "content_extractor"),
    })
}

fn extract_title(document: &Html) -> (String, TitleSource) {
    if let Some(title) = select_attr(document, r#"meta[property="og:title"]"#, "content") {
        let title = title.trim();
        if !title.is_empty() {
            return (title.to_string(), TitleSource::OgTitle);
        }
    }

    if let Some(selector) = Selector::parse("title").ok() {
        if let Some(el) = document.select(&selector).next() {
            let raw: String = el.text().collect();
            let title = strip_site_suffix(raw.trim());
            if !title.is_empty() {
                return (title, TitleSource::TitleTag);
            }
        }
    }

    if let Some(main) = select_main_content(document) {
        if let Ok(h1_sel) = Selector::parse("h1") {
            if let Some(h1) = main.select(&h1_sel).next() {
                let text: String = h1.text().collect();
                let text = text.trim();
                if !text.is_empty() {
                    return (text.to_string(), TitleSource::H1);
                }
            }
        }
    }

    ("Untitled".to_string(), TitleSource::Unknown)
}

/// Strip a trailing `" | Site Name"` / `" — Site Name"` suffix.
fn strip_site_suffix(title: &str) -> String {
    for sep in [" | ", " — "] {
        if let Some(idx) = title.find(sep) {
            return title[..idx].trim().to_string();
        }
    }
    title.to_string()
}

fn select_attr(document: &Html, selector: &str, attr: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(str::to_string)
}

/// Candidate container scoring per §4.4 step 2: `<main>`/`<article>`/
/// `[role=main]` first, then the `<body>` itself as a density-scored
/// fallback.
fn select_main_content(document: &Html) -> Option<ElementRef<'_>> {
    for selector in ["main", "article", "[role=main]"] {
        if let Ok(sel) = Selector::parse(selector) {
            if let Some(el) = document.select(&sel).next() {
                return Some(el);
            }
        }
    }
    Selector::parse("body")
        .ok()
        .and_then(|sel| document.select(&sel).next())
}

fn is_stripped(el: &ElementRef) -> bool {
    STRIPPED_TAGS.contains(&el.value().name())
        || el.value().attr("aria-hidden") == Some("true")
        || el
            .value()
            .attr("class")
            .map(|c| c.split_whitespace().any(|cls| cls.contains("ad-") || cls.contains("advert")))
            .unwrap_or(false)
}

fn flatten_text(root: ElementRef) -> String {
    let mut paragraphs: Vec<String> = Vec::new();
    collect_text(root, &mut paragraphs);
    paragraphs
        .into_iter()
        .map(|p| collapse_whitespace(&p))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn collect_text(el: ElementRef, out: &mut Vec<String>) {
    if is_stripped(&el) {
        return;
    }
    let mut buf = String::new();
    for child in el.children() {
        if let Some(child_el) = ElementRef::wrap(child) {
            if matches!(
                child_el.value().name(),
                "p" | "div" | "li" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "section"
            ) {
                if !buf.trim().is_empty() {
                    out.push(buf.clone());
                    buf.clear();
                }
                collect_text(child_el, out);
                continue;
            }
            collect_text(child_el, out);
        } else if let Some(text) = child.value().as_text() {
            buf.push_str(text);
            buf.push(' ');
        }
    }
    if !buf.trim().is_empty() {
        out.push(buf);
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn to_markdown(root: ElementRef) -> String {
    let mut out = String::new();
    render_markdown(root, &mut out);
    out.trim().to_string()
}

fn render_markdown(el: ElementRef, out: &mut String) {
    if is_stripped(&el) {
        return;
    }
    match el.value().name() {
        "h1" => md_heading(el, out, 1),
        "h2" => md_heading(el, out, 2),
        "h3" => md_heading(el, out, 3),
        "h4" | "h5" | "h6" => md_heading(el, out, 4),
        "p" => {
            out.push_str(collect_inline(el).trim());
            out.push_str("\n\n");
        }
        "a" => {
            let href = el.value().attr("href").unwrap_or("");
            let text: String = el.text().collect();
            out.push_str(&format!("[{}]({})", text.trim(), href));
        }
        "code" => {
            out.push('`');
            out.push_str(&el.text().collect::<String>());
            out.push('`');
        }
        "pre" => {
            out.push_str("```\n");
            out.push_str(&el.text().collect::<String>());
            out.push_str("\n```\n\n");
        }
        "ul" | "ol" => {
            for (i, child) in el.children().filter_map(ElementRef::wrap).enumerate() {
                if child.value().name() == "li" {
                    let marker = if el.value().name() == "ol" {
                        format!("{}.", i + 1)
                    } else {
                        "-".to_string()
                    };
                    out.push_str(&format!("{marker} {}\n", collect_inline(child).trim()));
                }
            }
            out.push('\n');
        }
        "table" => {
            out.push_str(&render_table_markdown(el));
        }
        _ => {
            for child in el.children().filter_map(ElementRef::wrap) {
                render_markdown(child, out);
            }
        }
    }
}

fn md_heading(el: ElementRef, out: &mut String, level: usize) {
    let text: String = el.text().collect();
    out.push_str(&"#".repeat(level));
    out.push(' ');
    out.push_str(text.trim());
    out.push_str("\n\n");
}

fn collect_inline(el: ElementRef) -> String {
    el.text().collect::<Vec<_>>().join(" ")
}

fn render_table_markdown(table: ElementRef) -> String {
    let extracted = extract_table(table);
    let Some(extracted) = extracted else { return String::new() };
    let mut out = String::new();
    if !extracted.headers.is_empty() {
        out.push_str(&format!("| {} |\n", extracted.headers.join(" | ")));
        out.push_str(&format!(
            "|{}|\n",
            extracted.headers.iter().map(|_| " --- ").collect::<Vec<_>>().join("|")
        ));
    }
    for row in &extracted.rows {
        out.push_str(&format!("| {} |\n", row.join(" | ")));
    }
    out.push('\n');
    out
}

/// §4.4 step 5: a `<table>` qualifies if it has a `<thead>` or at least two
/// `<tr>`s with at least two `<td>`s.
fn extract_table(table: ElementRef) -> Option<ExtractedTable> {
    let row_sel = Selector::parse("tr").ok()?;
    let th_sel = Selector::parse("th").ok()?;
    let td_sel = Selector::parse("td").ok()?;
    let caption_sel = Selector::parse("caption").ok()?;

    let rows: Vec<ElementRef> = table.select(&row_sel).collect();
    let has_thead = table.select(&Selector::parse("thead").ok()?).next().is_some();
    let qualifying_rows = rows
        .iter()
        .filter(|r| r.select(&td_sel).count() >= 2)
        .count();
    if !has_thead && qualifying_rows < 2 {
        return None;
    }

    let headers: Vec<String> = rows
        .first()
        .map(|r| {
            r.select(&th_sel)
                .map(|th| th.text().collect::<String>().trim().to_string())
                .collect()
        })
        .unwrap_or_default();

    let body_rows: Vec<ElementRef> = if headers.is_empty() {
        rows
    } else {
        rows.into_iter().skip(1).collect()
    };

    let width = headers.len();
    let data_rows: Vec<Vec<String>> = body_rows
        .into_iter()
        .map(|r| {
            let mut cells: Vec<String> = r
                .select(&td_sel)
                .map(|td| td.text().collect::<String>().trim().to_string())
                .collect();
            if width > 0 {
                while cells.len() < width {
                    cells.push(String::new());
                }
            }
            cells
        })
        .filter(|r| !r.is_empty())
        .collect();

    let caption = table
        .select(&caption_sel)
        .next()
        .map(|c| c.text().collect::<String>().trim().to_string());

    Some(ExtractedTable {
        headers,
        rows: data_rows,
        caption,
    })
}

fn extract_tables(root: ElementRef) -> Vec<ExtractedTable> {
    let Ok(selector) = Selector::parse("table") else {
        return Vec::new();
    };
    root.select(&selector).filter_map(extract_table).collect()
}

/// §4.4 step 6: absolutize and keep only http(s), non-anchor links.
fn extract_links(root: ElementRef, base: &Url) -> Vec<ExtractedLink> {
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    root.select(&selector)
        .filter_map(|a| {
            let href = a.value().attr("href")?;
            if href.starts_with('#') {
                return None;
            }
            let absolute = base.join(href).ok()?;
            if absolute.scheme() != "http" && absolute.scheme() != "https" {
                return None;
            }
            Some(ExtractedLink {
                href: absolute.to_string(),
                text: a.text().collect::<Vec<_>>().join(" ").trim().to_string(),
                rel: a.value().attr("rel").map(str::to_string),
            })
        })
        .collect()
}

fn extract_language(document: &Html) -> Option<String> {
    select_attr(document, "html", "lang")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_prefers_og_title_over_title_tag() {
        let html = r#"<html><head>
            <meta property="og:title" content="Real Title" />
            <title>Fallback | Site Name</title>
        </head><body></body></html>"#;
        let result = extract(html, "https://example.com").unwrap();
        assert_eq!(result.title, "Real Title");
        assert_eq!(result.title_source, TitleSource::OgTitle);
    }

    #[test]
    fn title_tag_strips_site_suffix() {
        let html = r#"<html><head><title>Article Name | My Blog</title></head><body></body></html>"#;
        let result = extract(html, "https://example.com").unwrap();
        assert_eq!(result.title, "Article Name");
    }

    #[test]
    fn falls_back_to_h1_then_untitled() {
        let html = r#"<html><body><main><h1>Heading Title</h1></main></body></html>"#;
        let result = extract(html, "https://example.com").unwrap();
        assert_eq!(result.title, "Heading Title");
        assert_eq!(result.title_source, TitleSource::H1);

        let empty = extract("<html><body></body></html>", "https://example.com").unwrap();
        assert_eq!(empty.title, "Untitled");
    }

    #[test]
    fn extracts_qualifying_tables_and_pads_rows() {
        let html = r#"<html><body><main>
            <table>
                <tr><th>Name</th><th>Price</th><th>Qty</th></tr>
                <tr><td>Widget</td><td>5.00</td></tr>
                <tr><td>Gadget</td><td>9.00</td><td>3</td></tr>
            </table>
        </main></body></html>"#;
        let result = extract(html, "https://example.com").unwrap();
        assert_eq!(result.tables.len(), 1);
        let table = &result.tables[0];
        assert_eq!(table.headers, vec!["Name", "Price", "Qty"]);
        assert_eq!(table.rows[0], vec!["Widget", "5.00", ""]);
    }

    #[test]
    fn links_are_absolutized_and_anchors_dropped() {
        let html = r##"<html><body><main>
            <a href="/about">About</a>
            <a href="#section">Jump</a>
            <a href="mailto:hi@example.com">Mail</a>
        </main></body></html>"##;
        let result = extract(html, "https://example.com/page").unwrap();
        assert_eq!(result.links.len(), 1);
        assert_eq!(result.links[0].href, "https://example.com/about");
    }

    #[test]
    fn strips_nav_and_footer_from_text() {
        let html = r#"<html><body><main>
            <nav>Skip this nav text</nav>
            <p>Actual content paragraph that matters.</p>
            <footer>Skip this footer text</footer>
        </main></body></html>"#;
        let result = extract(html, "https://example.com").unwrap();
        assert!(result.text.contains("Actual content"));
        assert!(!result.text.contains("Skip this"));
    }

    #[test]
    fn empty_document_yields_very_low_confidence() {
        let result = extract("<html><body></body></html>", "https://example.com").unwrap();
        assert_eq!(result.text, "");
        assert_eq!(result.confidence.score, 0.0);
    }

    #[test]
    fn language_read_from_html_lang_attribute() {
        let html = r#"<html lang="fr"><body><main><p>Bonjour</p></main></body></html>"#;
        let result = extract(html, "https://example.com").unwrap();
        assert_eq!(result.language.as_deref(), Some("fr"));
    }
}
