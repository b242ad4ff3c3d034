//! Markdown → HTML pass, plus the HTML-level rewrites that follow it.

use super::templates;
use once_cell::sync::Lazy;
use pulldown_cmark::{html, CowStr, Event, Options, Parser, Tag, TagEnd};
use regex::{Captures, Regex};
use std::collections::HashMap;

static ADMONITION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<div class="admonition (info|note|warning)">(.*?)</div>"#)
        .expect("admonition pattern")
});

static MACRO_LIKE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<ac:structured-macro[^>]*>[^<]*\.\.\.[^<]*\)").expect("macro-like pattern")
});

const MACRO_CLOSE: &str = "</ac:structured-macro>";
const MACRO_LOOKAHEAD_CHARS: usize = 500;

fn options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_DEFINITION_LIST);
    options
}

/// Heading anchor: lowercase words joined by `-`, punctuation dropped.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;
    for ch in text.trim().chars() {
        if ch.is_alphanumeric() || ch == '_' {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(ch.to_lowercase());
        } else if ch.is_whitespace() || ch == '-' {
            pending_dash = true;
        }
    }
    slug
}

/// Render markdown to HTML, giving every heading a unique slug id.
pub fn markdown_to_html(markdown: &str) -> String {
    let events: Vec<Event> = Parser::new_ext(markdown, options()).collect();

    let mut used: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<Event> = Vec::with_capacity(events.len());
    let mut i = 0;
    while i < events.len() {
        match &events[i] {
            Event::Start(Tag::Heading {
                level,
                id,
                classes,
                attrs,
            }) => {
                let id = match id {
                    Some(explicit) => explicit.clone(),
                    None => {
                        let mut text = String::new();
                        for event in &events[i + 1..] {
                            match event {
                                Event::End(TagEnd::Heading(_)) => break,
                                Event::Text(t) | Event::Code(t) => text.push_str(t),
                                _ => {}
                            }
                        }
                        CowStr::from(unique_slug(&slugify(&text), &mut used))
                    }
                };
                out.push(Event::Start(Tag::Heading {
                    level: *level,
                    id: Some(id),
                    classes: classes.clone(),
                    attrs: attrs.clone(),
                }));
            }
            other => out.push(other.clone()),
        }
        i += 1;
    }

    let mut rendered = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut rendered, out.into_iter());
    rendered.replace("<p>[TOC]</p>", templates::toc_macro())
}

fn unique_slug(base: &str, used: &mut HashMap<String, usize>) -> String {
    let base = if base.is_empty() { "section" } else { base };
    let count = used.entry(base.to_string()).or_insert(0);
    let slug = if *count == 0 {
        base.to_string()
    } else {
        format!("{base}_{count}")
    };
    *count += 1;
    slug
}

/// `<div class="admonition KIND">` → callout macro.
pub fn admonitions(html: &str) -> String {
    ADMONITION
        .replace_all(html, |caps: &Captures| templates::callout_macro(&caps[1], &caps[2]))
        .into_owned()
}

/// `&amp;` → `&` and `<br>` → `<br />`.
pub fn normalize_entities(html: &str) -> String {
    html.replace("&amp;", "&").replace("<br>", "<br />")
}

/// Escape macro openings that read like prose about macros (they contain `...`)
/// or that have no closing tag within the next 500 characters.
pub fn escape_macro_like(html: &str) -> String {
    MACRO_LIKE
        .replace_all(html, |caps: &Captures| {
            let matched = caps.get(0).map(|m| (m.as_str(), m.end())).unwrap_or(("", 0));
            let (text, end) = matched;
            let window: String = html[end..].chars().take(MACRO_LOOKAHEAD_CHARS).collect();
            if text.contains("...") || !window.contains(MACRO_CLOSE) {
                text.replace('<', "&lt;").replace('>', "&gt;")
            } else {
                text.to_string()
            }
        })
        .into_owned()
}
