//! Markdown rendering
//!
//! Post bodies, short descriptions and pages are stored as Markdown and
//! rendered with pulldown-cmark. Fenced code blocks are highlighted with
//! syntect.
//!
//! [`auto_link`] post-processes a rendered body: the first mention of each
//! related post's keywords becomes a link, and a "Read also" box is placed
//! after the second paragraph.
//!
//! ```
//! use quillpress::services::markdown::MarkdownRenderer;
//!
//! let renderer = MarkdownRenderer::new();
//! let html = renderer.render("# Hello\n\nSome **bold** text.");
//! assert!(html.contains("<h1>"));
//! assert!(html.contains("<strong>"));
//! ```

use once_cell::sync::Lazy;
use pulldown_cmark::{html, CodeBlockKind, Event, Options, Parser, Tag, TagEnd};
use regex::Regex;
use std::sync::Arc;
use syntect::highlighting::ThemeSet;
use syntect::html::highlighted_html_for_string;
use syntect::parsing::SyntaxSet;

const DEFAULT_THEME: &str = "base16-ocean.dark";

/// Related posts listed inline; the rest go in a "More" list at the end
const INLINE_RELATED: usize = 4;

/// Segments auto-linking must not touch: existing links, headings and bold text
static PROTECTED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<a\b[^>]*>.*?</a>|<h[1-6]\b[^>]*>.*?</h[1-6]>|<strong\b[^>]*>.*?</strong>|<b\b[^>]*>.*?</b>")
        .expect("valid protected-segment regex")
});

static OUTER_P_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^<p>(.*?)</p>$").expect("valid outer paragraph regex"));

/// Thread-safe Markdown renderer with syntax highlighting
#[derive(Clone)]
pub struct MarkdownRenderer {
    syntax_set: Arc<SyntaxSet>,
    theme_set: Arc<ThemeSet>,
    theme_name: String,
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownRenderer {
    pub fn new() -> Self {
        Self::with_theme(DEFAULT_THEME)
    }

    /// Renderer using a specific syntect theme, falling back to the default one
    pub fn with_theme(theme_name: &str) -> Self {
        let theme_set = ThemeSet::load_defaults();
        let theme_name = if theme_set.themes.contains_key(theme_name) {
            theme_name.to_string()
        } else {
            DEFAULT_THEME.to_string()
        };

        Self {
            syntax_set: Arc::new(SyntaxSet::load_defaults_newlines()),
            theme_set: Arc::new(theme_set),
            theme_name,
        }
    }

    /// Render Markdown to HTML
    pub fn render(&self, markdown: &str) -> String {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);
        options.insert(Options::ENABLE_SMART_PUNCTUATION);

        let events = self.highlight_code_blocks(Parser::new_ext(markdown, options));

        let mut html_output = String::with_capacity(markdown.len() * 3 / 2);
        html::push_html(&mut html_output, events.into_iter());
        html_output
    }

    fn highlight_code_blocks<'a>(&self, parser: Parser<'a>) -> Vec<Event<'a>> {
        let mut events = Vec::new();
        let mut code: Option<(Option<String>, String)> = None;

        for event in parser {
            match event {
                Event::Start(Tag::CodeBlock(kind)) => {
                    let lang = match kind {
                        CodeBlockKind::Fenced(lang) if !lang.is_empty() => Some(lang.to_string()),
                        _ => None,
                    };
                    code = Some((lang, String::new()));
                }
                Event::End(TagEnd::CodeBlock) => {
                    if let Some((lang, content)) = code.take() {
                        let html = match lang {
                            Some(lang) => self.highlight(&content, &lang),
                            None => format!("<pre><code>{}</code></pre>", html_escape(&content)),
                        };
                        events.push(Event::Html(html.into()));
                    }
                }
                Event::Text(text) if code.is_some() => {
                    if let Some((_, content)) = code.as_mut() {
                        content.push_str(&text);
                    }
                }
                other => events.push(other),
            }
        }

        events
    }

    fn highlight(&self, code: &str, lang: &str) -> String {
        let syntax = self
            .syntax_set
            .find_syntax_by_token(lang)
            .or_else(|| self.syntax_set.find_syntax_by_extension(lang));

        let plain = || {
            format!(
                "<pre><code class=\"language-{}\">{}</code></pre>",
                html_escape(lang),
                html_escape(code)
            )
        };

        match (syntax, self.theme_set.themes.get(&self.theme_name)) {
            (Some(syntax), Some(theme)) => {
                highlighted_html_for_string(code, &self.syntax_set, syntax, theme)
                    .unwrap_or_else(|_| plain())
            }
            _ => plain(),
        }
    }
}

/// Remove a single `<p>...</p>` wrapper around the whole value
pub fn strip_outer_p(html: &str) -> String {
    let trimmed = html.trim();
    match OUTER_P_RE.captures(trimmed) {
        // Only strip when the wrapper is the sole paragraph
        Some(caps) if !caps[1].contains("</p>") => caps[1].to_string(),
        _ => trimmed.to_string(),
    }
}

/// A post that rendered content may link to
#[derive(Debug, Clone)]
pub struct LinkTarget {
    pub id: i64,
    pub title: String,
    pub url: String,
    /// Comma separated SEO keywords; the title is used when empty
    pub keywords: String,
}

impl LinkTarget {
    fn phrases(&self) -> Vec<&str> {
        let keywords: Vec<&str> = self
            .keywords
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .collect();
        if keywords.is_empty() {
            vec![self.title.trim()]
        } else {
            keywords
        }
    }
}

/// Output of [`auto_link`]
#[derive(Debug, Clone, Default)]
pub struct AutoLinked {
    pub html: String,
    /// Ids of targets that received an in-text link
    pub linked_ids: Vec<i64>,
}

/// Link the first mention of each target's keywords and insert related-post boxes.
///
/// Text inside existing links, headings and bold runs is left alone. Each
/// target is linked at most once. The first four targets are listed in a
/// "Read also" box after the second paragraph, any others in a "More"
/// list appended at the end.
pub fn auto_link(html: &str, targets: &[LinkTarget]) -> AutoLinked {
    if html.is_empty() {
        return AutoLinked::default();
    }

    // Alternating plain / protected segments
    let mut segments: Vec<(String, bool)> = Vec::new();
    let mut last = 0;
    for m in PROTECTED_RE.find_iter(html) {
        segments.push((html[last..m.start()].to_string(), false));
        segments.push((m.as_str().to_string(), true));
        last = m.end();
    }
    segments.push((html[last..].to_string(), false));

    let mut linked_ids = Vec::new();
    'targets: for target in targets {
        if target.url.is_empty() {
            continue;
        }
        for phrase in target.phrases() {
            if phrase.is_empty() {
                continue;
            }
            for (text, protected) in segments.iter_mut() {
                if *protected {
                    continue;
                }
                if let Some(linked) = link_once(text, phrase, &target.url) {
                    *text = linked;
                    linked_ids.push(target.id);
                    continue 'targets;
                }
            }
        }
    }

    let mut output: String = segments.into_iter().map(|(text, _)| text).collect();

    if !targets.is_empty() {
        let inline = related_list(
            "related-inline",
            "h4",
            "Read also",
            &targets[..targets.len().min(INLINE_RELATED)],
        );
        output = insert_after_paragraph(&output, 2, &inline);

        if targets.len() > INLINE_RELATED {
            output.push_str(&related_list("related-more", "h3", "More", &targets[INLINE_RELATED..]));
        }
    }

    AutoLinked {
        html: output,
        linked_ids,
    }
}

/// Wrap the first whole-word, case-insensitive match of `phrase` in a link.
///
/// The match is only taken when it sits in text, not inside a tag.
fn link_once(text: &str, phrase: &str, url: &str) -> Option<String> {
    let pattern = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(phrase))).ok()?;
    let m = pattern
        .find_iter(text)
        .find(|m| !inside_tag(text, m.start()))?;

    Some(format!(
        "{}<a href=\"{}\">{}</a>{}",
        &text[..m.start()],
        html_escape(url),
        m.as_str(),
        &text[m.end()..]
    ))
}

fn inside_tag(text: &str, pos: usize) -> bool {
    let before = &text[..pos];
    matches!((before.rfind('<'), before.rfind('>')), (Some(open), close) if close.map_or(true, |c| c < open))
}

fn related_list(class: &str, heading_tag: &str, heading: &str, targets: &[LinkTarget]) -> String {
    let mut out = format!(
        "<div class=\"{}\"><{}>{}</{}><ul>",
        class, heading_tag, heading, heading_tag
    );
    for target in targets {
        out.push_str(&format!(
            "<li><a href=\"{}\">{}</a></li>",
            html_escape(&target.url),
            html_escape(&target.title)
        ));
    }
    out.push_str("</ul></div>");
    out
}

/// Insert `snippet` after the `n`th closing `</p>`, or at the end when there are fewer
fn insert_after_paragraph(html: &str, n: usize, snippet: &str) -> String {
    let lower = html.to_ascii_lowercase();
    let mut pos = None;
    let mut from = 0;
    for _ in 0..n {
        match lower[from..].find("</p>") {
            Some(i) => {
                from += i + "</p>".len();
                pos = Some(from);
            }
            None => {
                pos = None;
                break;
            }
        }
    }

    let at = pos.unwrap_or(html.len());
    let mut out = String::with_capacity(html.len() + snippet.len());
    out.push_str(&html[..at]);
    out.push_str(snippet);
    out.push_str(&html[at..]);
    out
}

/// Escape HTML special characters
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(id: i64, title: &str, keywords: &str) -> LinkTarget {
        LinkTarget {
            id,
            title: title.to_string(),
            url: format!("/rust/post-{}/", id),
            keywords: keywords.to_string(),
        }
    }

    #[test]
    fn test_render_basic_markdown() {
        let renderer = MarkdownRenderer::new();
        let html = renderer.render("# Title\n\n- one\n- two\n\n~~gone~~ and `code`");
        assert!(html.contains("<h1>Title</h1>"));
        assert!(html.contains("<li>one</li>"));
        assert!(html.contains("<del>gone</del>"));
        assert!(html.contains("<code>code</code>"));
    }

    #[test]
    fn test_render_code_blocks() {
        let renderer = MarkdownRenderer::new();

        let plain = renderer.render("```\n<b>raw</b>\n```");
        assert!(plain.contains("<pre><code>&lt;b&gt;raw&lt;/b&gt;"));

        let rust = renderer.render("```rust\nfn main() {}\n```");
        assert!(rust.contains("<pre"));
        assert!(rust.contains("style="));

        let unknown = renderer.render("```nosuchlang\nx\n```");
        assert!(unknown.contains("language-nosuchlang"));
    }

    #[test]
    fn test_invalid_theme_falls_back() {
        let renderer = MarkdownRenderer::with_theme("missing-theme");
        assert_eq!(renderer.theme_name, DEFAULT_THEME);
    }

    #[test]
    fn test_strip_outer_p() {
        assert_eq!(strip_outer_p("<p>hello</p>\n"), "hello");
        assert_eq!(strip_outer_p("<p>a</p><p>b</p>"), "<p>a</p><p>b</p>");
        assert_eq!(strip_outer_p("plain"), "plain");
    }

    #[test]
    fn test_auto_link_first_occurrence_only() {
        let html = "<p>Learn async rust today. More async rust later.</p>";
        let result = auto_link(html, &[target(1, "Async Rust", "")]);

        assert_eq!(result.linked_ids, vec![1]);
        assert_eq!(result.html.matches("<a href=\"/rust/post-1/\">").count(), 2);
        assert!(result.html.contains("<a href=\"/rust/post-1/\">async rust</a> today"));
        assert!(result.html.contains("More async rust later"));
    }

    #[test]
    fn test_auto_link_skips_protected_segments() {
        let html = "<h2>Tokio</h2><p><strong>Tokio</strong> and <a href=\"/x\">tokio</a></p>";
        let result = auto_link(html, &[target(2, "Unrelated", "tokio")]);
        assert!(result.linked_ids.is_empty());
        assert!(result.html.starts_with("<h2>Tokio</h2><p><strong>Tokio</strong>"));
    }

    #[test]
    fn test_auto_link_ignores_attribute_text() {
        let html = "<p><img alt=\"serde\" src=\"a.png\"> serde rocks</p>";
        let result = auto_link(html, &[target(3, "Serde", "")]);
        assert!(result.html.contains("<img alt=\"serde\""));
        assert!(result.html.contains("<a href=\"/rust/post-3/\">serde</a> rocks"));
    }

    #[test]
    fn test_related_boxes() {
        let html = "<p>one</p><p>two</p><p>three</p>";
        let targets: Vec<_> = (1..=6).map(|i| target(i, &format!("Post {}", i), "zzz")).collect();
        let result = auto_link(html, &targets);

        let inline_at = result.html.find("related-inline").unwrap();
        let second_p = result.html.find("<p>three</p>").unwrap();
        assert!(inline_at < second_p);
        assert!(result.html.ends_with("</ul></div>"));
        assert!(result.html.contains("<div class=\"related-more\"><h3>More</h3>"));
        assert!(result.html.contains("Post 6"));
    }

    #[test]
    fn test_auto_link_empty() {
        let result = auto_link("", &[target(1, "x", "")]);
        assert!(result.html.is_empty());
        assert_eq!(auto_link("<p>x</p>", &[]).html, "<p>x</p>");
    }
}
