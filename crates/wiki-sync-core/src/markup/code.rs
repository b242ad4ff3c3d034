//! Fenced code blocks are pulled out before rendering and put back as macros.

use super::templates;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static FENCED_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(\w+)?\n(.*?)\n```").expect("fenced code pattern"));

pub const PLACEHOLDER_PREFIX: &str = "CODE_BLOCK_";

#[derive(Debug, Clone, PartialEq)]
pub struct CodeBlock {
    pub placeholder: String,
    pub language: String,
    pub code: String,
}

/// Replace every fenced block with `CODE_BLOCK_n`.
pub fn extract(markdown: &str) -> (String, Vec<CodeBlock>) {
    let mut blocks = Vec::new();
    let text = FENCED_CODE.replace_all(markdown, |caps: &Captures| {
        let placeholder = format!("{PLACEHOLDER_PREFIX}{}", blocks.len());
        blocks.push(CodeBlock {
            placeholder: placeholder.clone(),
            language: caps
                .get(1)
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| "text".to_string()),
            code: caps[2].to_string(),
        });
        placeholder
    });
    (text.into_owned(), blocks)
}

/// Put code macros back, highest index first so `_1` never matches inside `_10`.
pub fn restore(html: &str, blocks: &[CodeBlock]) -> String {
    let mut html = html.to_string();
    for block in blocks.iter().rev() {
        let markup = templates::code_macro(&block.language, block.code.trim());
        html = replace_placeholder(&html, &block.placeholder, &markup);
    }
    html
}

/// Swap a placeholder for block-level markup, dropping the paragraph the renderer
/// wrapped around it when it stands alone.
pub(crate) fn replace_placeholder(html: &str, placeholder: &str, markup: &str) -> String {
    let paragraph = format!("<p>{placeholder}</p>");
    html.replace(&paragraph, markup).replace(placeholder, markup)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_with_and_without_language() {
        let markdown = "Intro\n\n```rust\nfn main() {}\n```\n\n```\nplain\n```\n";
        let (text, blocks) = extract(markdown);

        assert_eq!(text, "Intro\n\nCODE_BLOCK_0\n\nCODE_BLOCK_1\n");
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].language, "rust");
        assert_eq!(blocks[0].code, "fn main() {}");
        assert_eq!(blocks[1].language, "text");
        assert_eq!(blocks[1].code, "plain");
    }

    #[test]
    fn test_restore_is_byte_identical() {
        let code = "if a < b && c > d {\n    println!(\"<tag> &amp;\");\n}";
        let markdown = format!("```rust\n{code}\n```");
        let (text, blocks) = extract(&markdown);

        let html = restore(&format!("<p>{text}</p>"), &blocks);

        assert!(html.starts_with("<ac:structured-macro ac:name=\"code\">"));
        assert!(html.contains(&format!("<![CDATA[{code}]]>")));
    }

    #[test]
    fn test_restore_many_placeholders() {
        let markdown: String = (0..12)
            .map(|i| format!("```\nblock {i}\n```\n\n"))
            .collect();
        let (text, blocks) = extract(&markdown);
        assert_eq!(blocks.len(), 12);

        let html = restore(&text, &blocks);

        assert!(html.contains("<![CDATA[block 1]]>"));
        assert!(html.contains("<![CDATA[block 10]]>"));
        assert!(html.contains("<![CDATA[block 11]]>"));
        assert!(!html.contains(PLACEHOLDER_PREFIX));
    }
}
