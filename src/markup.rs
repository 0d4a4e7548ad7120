//! Markdown in AI replies, rendered as Pango markup for `gtk::Label`.

use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd};

/// Escapes the characters Pango markup treats specially.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

fn heading_size(level: HeadingLevel) -> &'static str {
    match level {
        HeadingLevel::H1 => "x-large",
        HeadingLevel::H2 => "large",
        _ => "medium",
    }
}

/// Converts markdown to Pango markup. Unsupported constructs (tables,
/// images) degrade to their text.
pub fn markdown_to_pango(src: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);

    let mut out = String::new();
    // closing tags for open inline spans, innermost last
    let mut closers: Vec<&'static str> = Vec::new();
    // None for bullet lists, Some(n) for the next number of an ordered list
    let mut lists: Vec<Option<u64>> = Vec::new();

    for event in Parser::new_ext(src, options) {
        match event {
            Event::Start(tag) => match tag {
                Tag::Paragraph => {}
                Tag::Heading { level, .. } => {
                    out.push_str(&format!("<span weight=\"bold\" size=\"{}\">", heading_size(level)));
                    closers.push("</span>");
                }
                Tag::BlockQuote { .. } | Tag::Emphasis => {
                    out.push_str("<i>");
                    closers.push("</i>");
                }
                Tag::Strong => {
                    out.push_str("<b>");
                    closers.push("</b>");
                }
                Tag::Strikethrough => {
                    out.push_str("<s>");
                    closers.push("</s>");
                }
                Tag::CodeBlock(_) => {
                    out.push_str("<tt>");
                    closers.push("</tt>");
                }
                Tag::Link { dest_url, .. } => {
                    out.push_str(&format!("<a href=\"{}\">", escape(&dest_url)));
                    closers.push("</a>");
                }
                Tag::List(start) => lists.push(start),
                Tag::Item => {
                    let depth = lists.len().saturating_sub(1);
                    out.push_str(&"  ".repeat(depth));
                    match lists.last_mut() {
                        Some(Some(n)) => {
                            out.push_str(&format!("{n}. "));
                            *n += 1;
                        }
                        _ => out.push_str("• "),
                    }
                }
                _ => {}
            },
            Event::End(tag) => match tag {
                TagEnd::Paragraph => out.push_str("\n\n"),
                TagEnd::Heading { .. } => {
                    out.push_str(closers.pop().unwrap_or_default());
                    out.push_str("\n\n");
                }
                TagEnd::BlockQuote { .. } => {
                    out.push_str(closers.pop().unwrap_or_default());
                    out.push('\n');
                }
                TagEnd::CodeBlock => {
                    if out.ends_with('\n') {
                        out.pop();
                    }
                    out.push_str(closers.pop().unwrap_or_default());
                    out.push_str("\n\n");
                }
                TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough | TagEnd::Link => {
                    out.push_str(closers.pop().unwrap_or_default());
                }
                TagEnd::List { .. } => {
                    lists.pop();
                    if lists.is_empty() {
                        out.push('\n');
                    }
                }
                TagEnd::Item => {
                    // tight list items have no paragraph to end the line
                    if !out.ends_with('\n') {
                        out.push('\n');
                    }
                    while out.ends_with("\n\n") {
                        out.pop();
                    }
                }
                TagEnd::TableCell => out.push('\t'),
                TagEnd::TableRow | TagEnd::TableHead => out.push('\n'),
                _ => {}
            },
            Event::Text(text) => out.push_str(&escape(&text)),
            Event::Code(code) => {
                out.push_str("<tt>");
                out.push_str(&escape(&code));
                out.push_str("</tt>");
            }
            Event::SoftBreak => out.push(' '),
            Event::HardBreak => out.push('\n'),
            Event::Rule => out.push_str("──────────\n\n"),
            Event::Html(html) | Event::InlineHtml(html) => out.push_str(&escape(&html)),
            _ => {}
        }
    }

    // unbalanced input still yields well-formed markup
    while let Some(closer) = closers.pop() {
        out.push_str(closer);
    }
    out.trim().to_string()
}
