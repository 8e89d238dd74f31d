//! Markdown rendering
//!
//! pulldown-cmark parses the post body; fenced code blocks with a known
//! language are highlighted with syntect. The same parse also yields the
//! plain text used for excerpts, word counts and reading time.
//!
//! ```
//! use homestead::services::markdown::MarkdownRenderer;
//!
//! let renderer = MarkdownRenderer::new();
//! let html = renderer.render("# Hello\n\nSome **bold** text.");
//! assert!(html.contains("<h1>"));
//! assert!(html.contains("<strong>bold</strong>"));
//! ```

use pulldown_cmark::{html, CodeBlockKind, Event, Options, Parser, Tag, TagEnd};
use std::sync::Arc;
use syntect::highlighting::ThemeSet;
use syntect::html::highlighted_html_for_string;
use syntect::parsing::SyntaxSet;

const DEFAULT_THEME: &str = "base16-ocean.dark";

/// Reading speed used for `reading_minutes`
pub const WORDS_PER_MINUTE: usize = 200;

/// Thread-safe renderer; cloning shares the loaded syntax and theme sets.
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

    /// Use a specific syntect theme, falling back to the default when unknown.
    pub fn with_theme(theme_name: &str) -> Self {
        let theme_set = ThemeSet::load_defaults();
        let theme_name = if theme_set.themes.contains_key(theme_name) {
            theme_name.to_string()
        } else {
            tracing::warn!(theme = theme_name, "Unknown highlight theme, using default");
            DEFAULT_THEME.to_string()
        };

        Self {
            syntax_set: Arc::new(SyntaxSet::load_defaults_newlines()),
            theme_set: Arc::new(theme_set),
            theme_name,
        }
    }

    fn options() -> Options {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);
        options
    }

    pub fn render(&self, markdown: &str) -> String {
        let parser = Parser::new_ext(markdown, Self::options());
        let events = self.highlight_code_blocks(parser);

        let mut output = String::with_capacity(markdown.len() * 3 / 2);
        html::push_html(&mut output, events.into_iter());
        output
    }

    /// Text content with markup stripped and whitespace collapsed.
    /// Code blocks are left out.
    pub fn plain_text(&self, markdown: &str) -> String {
        let mut text = String::new();
        let mut in_code_block = false;

        for event in Parser::new_ext(markdown, Self::options()) {
            match event {
                Event::Start(Tag::CodeBlock(_)) => in_code_block = true,
                Event::End(TagEnd::CodeBlock) => in_code_block = false,
                Event::Text(t) | Event::Code(t) if !in_code_block => {
                    text.push_str(&t);
                }
                Event::SoftBreak
                | Event::HardBreak
                | Event::End(TagEnd::Paragraph)
                | Event::End(TagEnd::Heading(_))
                | Event::End(TagEnd::Item)
                | Event::End(TagEnd::TableCell) => text.push(' '),
                _ => {}
            }
        }

        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// First `max_chars` characters of the plain text, cut at a word
    /// boundary with an ellipsis when truncated.
    pub fn excerpt(&self, markdown: &str, max_chars: usize) -> String {
        truncate_words(&self.plain_text(markdown), max_chars)
    }

    pub fn word_count(&self, markdown: &str) -> usize {
        self.plain_text(markdown).split_whitespace().count()
    }

    /// Whole minutes at [`WORDS_PER_MINUTE`], never less than one.
    pub fn reading_minutes(&self, markdown: &str) -> i32 {
        reading_minutes_for(self.word_count(markdown))
    }

    fn highlight_code_blocks<'a>(&self, parser: Parser<'a>) -> Vec<Event<'a>> {
        let mut events = Vec::new();
        let mut code: Option<(Option<String>, String)> = None;

        for event in parser {
            match event {
                Event::Start(Tag::CodeBlock(kind)) => {
                    let lang = match kind {
                        CodeBlockKind::Fenced(info) => info
                            .split_whitespace()
                            .next()
                            .map(str::to_string),
                        CodeBlockKind::Indented => None,
                    };
                    code = Some((lang, String::new()));
                }
                Event::End(TagEnd::CodeBlock) => {
                    if let Some((lang, body)) = code.take() {
                        let html = match lang {
                            Some(lang) => self.highlight(&body, &lang),
                            None => format!("<pre><code>{}</code></pre>", escape_html(&body)),
                        };
                        events.push(Event::Html(html.into()));
                    }
                }
                Event::Text(text) if code.is_some() => {
                    if let Some((_, body)) = code.as_mut() {
                        body.push_str(&text);
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
        let theme = self.theme_set.themes.get(&self.theme_name);

        if let (Some(syntax), Some(theme)) = (syntax, theme) {
            match highlighted_html_for_string(code, &self.syntax_set, syntax, theme) {
                Ok(html) => return html,
                Err(e) => tracing::debug!(lang, error = %e, "Highlighting failed"),
            }
        }

        format!(
            "<pre><code class=\"language-{}\">{}</code></pre>",
            escape_html(lang),
            escape_html(code)
        )
    }
}

pub fn reading_minutes_for(words: usize) -> i32 {
    words.div_ceil(WORDS_PER_MINUTE).max(1) as i32
}

fn truncate_words(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let cut: String = text.chars().take(max_chars).collect();
    let trimmed = match cut.rfind(' ') {
        Some(idx) if idx > 0 => &cut[..idx],
        _ => cut.as_str(),
    };
    format!("{}…", trimmed.trim_end_matches(|c: char| c.is_ascii_punctuation()))
}

pub(crate) fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}
