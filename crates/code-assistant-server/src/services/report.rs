use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::chat::{ChatMessage, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Html,
    Markdown,
}

impl ReportFormat {
    /// `None` for an unrecognized format
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "html" => Some(Self::Html),
            "md" | "markdown" => Some(Self::Markdown),
            _ => None,
        }
    }
}

// Fenced block with an optional language tag
static CODE_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?:\w+)?\n(?P<code>.*?)```").expect("invalid code fence regex")
});

const REPORT_TITLE: &str = "Code Assistant Report";

const REPORT_CSS: &str = r#"<style>
    body { font-family: -apple-system, BlinkMacSystemFont, sans-serif; max-width: 800px; margin: 0 auto; padding: 20px; }
    .code-block { background: #f8f9fa; padding: 15px; border-radius: 6px; margin: 10px 0; }
    .user { color: #2c3e50; margin: 15px 0; }
    .assistant { color: #3498db; margin: 15px 0; }
</style>"#;

/// Pure presentation of a stored history
pub struct ReportRenderer;

impl ReportRenderer {
    pub fn render(history: &[ChatMessage], format: ReportFormat) -> String {
        match format {
            ReportFormat::Html => Self::render_html(history),
            ReportFormat::Markdown => Self::render_markdown(history),
        }
    }

    fn speaker(role: Role) -> &'static str {
        match role {
            Role::User => "User",
            _ => "Assistant",
        }
    }

    pub fn render_html(history: &[ChatMessage]) -> String {
        let mut body = format!("<h1>{}</h1>\n", REPORT_TITLE);
        for msg in history {
            body.push_str(&format!(
                "<div class=\"{}\">\n<h3>{}</h3>\n<div>{}</div>\n</div>\n",
                msg.role.as_str(),
                Self::speaker(msg.role),
                format_content(&msg.content)
            ));
        }

        format!(
            "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>{}</title>{}</head><body>{}</body></html>",
            REPORT_TITLE, REPORT_CSS, body
        )
    }

    pub fn render_markdown(history: &[ChatMessage]) -> String {
        let mut out = format!("# {}\n\n", REPORT_TITLE);
        for msg in history {
            out.push_str(&format!("## {}\n{}\n\n", Self::speaker(msg.role), msg.content));
        }
        out
    }
}

/// Escape the text, then turn fenced code blocks into `.code-block` divs
fn format_content(text: &str) -> String {
    let escaped = html_escape::encode_text(text);
    CODE_FENCE
        .replace_all(&escaped, "<div class=\"code-block\"><pre><code>$code</code></pre></div>")
        .into_owned()
}
