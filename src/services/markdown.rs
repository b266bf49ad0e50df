//! Markdown rendering
//!
//! Page, service and post bodies are stored as Markdown and rendered to HTML
//! on write. Raw HTML in the source is escaped, so stored HTML only ever
//! contains markup produced by the renderer.
//!
//! # Example
//!
//! ```
//! use portalen::services::markdown::MarkdownRenderer;
//!
//! let renderer = MarkdownRenderer::new();
//! let html = renderer.render("# Välkommen\n\nDetta är **fetstil**.");
//! assert!(html.contains("<h1>"));
//! assert!(html.contains("<strong>"));
//! ```

use pulldown_cmark::{html, CodeBlockKind, Event, Options, Parser, Tag, TagEnd};

/// Stateless Markdown to HTML renderer.
#[derive(Debug, Clone)]
pub struct MarkdownRenderer {
    options: Options,
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownRenderer {
    /// Tables, strikethrough, task lists and smart punctuation enabled.
    pub fn new() -> Self {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);
        options.insert(Options::ENABLE_SMART_PUNCTUATION);
        Self { options }
    }

    pub fn render(&self, markdown: &str) -> String {
        let parser = Parser::new_ext(markdown, self.options);
        let events = process_events(parser);

        let mut html_output = String::with_capacity(markdown.len() * 3 / 2);
        html::push_html(&mut html_output, events.into_iter());
        html_output
    }

    /// Plain-text summary of the first paragraphs, cut at a word boundary
    pub fn excerpt(&self, markdown: &str, max_chars: usize) -> String {
        let mut text = String::new();
        for event in Parser::new_ext(markdown, self.options) {
            match event {
                Event::Text(t) | Event::Code(t) => text.push_str(&t),
                Event::SoftBreak
                | Event::HardBreak
                | Event::End(
                    TagEnd::Paragraph
                    | TagEnd::Heading(_)
                    | TagEnd::Item
                    | TagEnd::BlockQuote
                    | TagEnd::TableCell,
                ) => text.push(' '),
                _ => {}
            }
            if text.chars().count() > max_chars {
                break;
            }
        }

        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if text.chars().count() <= max_chars {
            return text;
        }

        let cut: String = text.chars().take(max_chars).collect();
        let trimmed = match cut.rfind(' ') {
            Some(pos) if pos > 0 => &cut[..pos],
            _ => cut.as_str(),
        };
        format!("{}…", trimmed.trim_end_matches(|c: char| c.is_ascii_punctuation()))
    }
}

/// Escape raw HTML and render fenced code with a language class.
fn process_events(parser: Parser<'_>) -> Vec<Event<'_>> {
    let mut events = Vec::new();
    let mut in_code_block = false;
    let mut code_lang: Option<String> = None;
    let mut code_content = String::new();

    for event in parser {
        match event {
            Event::Start(Tag::CodeBlock(kind)) => {
                in_code_block = true;
                code_content.clear();
                code_lang = match kind {
                    CodeBlockKind::Fenced(lang) if !lang.is_empty() => Some(lang.to_string()),
                    _ => None,
                };
            }
            Event::End(TagEnd::CodeBlock) => {
                in_code_block = false;
                let block = match code_lang.take() {
                    Some(lang) => format!(
                        "<pre><code class=\"language-{}\">{}</code></pre>\n",
                        html_escape(&lang),
                        html_escape(&code_content)
                    ),
                    None => format!("<pre><code>{}</code></pre>\n", html_escape(&code_content)),
                };
                events.push(Event::Html(block.into()));
            }
            Event::Text(text) if in_code_block => code_content.push_str(&text),
            Event::Html(raw) | Event::InlineHtml(raw) => events.push(Event::Text(raw)),
            _ => events.push(event),
        }
    }

    events
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_heading_and_emphasis() {
        let renderer = MarkdownRenderer::new();
        let html = renderer.render("## Tjänster\n\n*kursiv* och ~~struken~~");
        assert!(html.contains("<h2>Tjänster</h2>"));
        assert!(html.contains("<em>kursiv</em>"));
        assert!(html.contains("<del>struken</del>"));
    }

    #[test]
    fn test_render_table() {
        let renderer = MarkdownRenderer::new();
        let html = renderer.render("| A | B |\n|---|---|\n| 1 | 2 |");
        assert!(html.contains("<table>"));
        assert!(html.contains("<td>1</td>"));
    }

    #[test]
    fn test_raw_html_is_escaped() {
        let renderer = MarkdownRenderer::new();
        let html = renderer.render("Hej <script>alert(1)</script>\n\n<div onclick=\"x\">block</div>");
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<div"));
    }

    #[test]
    fn test_code_block_language_class() {
        let renderer = MarkdownRenderer::new();
        let html = renderer.render("```rust\nlet x = 1 < 2;\n```");
        assert!(html.contains("class=\"language-rust\""));
        assert!(html.contains("1 &lt; 2"));

        let plain = renderer.render("```\nkod\n```");
        assert!(plain.contains("<pre><code>kod"));
    }

    #[test]
    fn test_excerpt_cuts_at_word() {
        let renderer = MarkdownRenderer::new();
        let md = "# Rubrik\n\nVi hjälper företag med **IT-drift** och support i hela Sverige.";
        assert_eq!(renderer.excerpt(md, 200), "Rubrik Vi hjälper företag med IT-drift och support i hela Sverige.");

        let short = renderer.excerpt(md, 30);
        assert!(short.ends_with('…'));
        assert!(short.chars().count() <= 31);
        assert!(!short.contains("**"));
    }

    #[test]
    fn test_excerpt_separates_blocks() {
        let renderer = MarkdownRenderer::default();
        let md = "## Tjänster\n- Drift\n- Support\n\n> Snabbt svar\n\n| Ort | Tid |\n|---|---|\n| Umeå | 24h |";
        assert_eq!(renderer.excerpt(md, 200), "Tjänster Drift Support Snabbt svar Ort Tid Umeå 24h");
    }
}
