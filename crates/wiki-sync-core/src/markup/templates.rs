//! Storage-markup snippets emitted by the converter and the engine.

/// Escape text for use inside an XML attribute or element.
pub fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
    out
}

/// `code` macro with a CDATA body. A literal `]]>` is split across two sections.
pub fn code_macro(language: &str, code: &str) -> String {
    let body = code.replace("]]>", "]]]]><![CDATA[>");
    format!(
        "<ac:structured-macro ac:name=\"code\">\
         <ac:parameter ac:name=\"language\">{}</ac:parameter>\
         <ac:plain-text-body><![CDATA[{}]]></ac:plain-text-body>\
         </ac:structured-macro>",
        xml_escape(language),
        body
    )
}

/// `info` / `note` / `warning` callout around already-rendered content.
pub fn callout_macro(kind: &str, content: &str) -> String {
    format!(
        "<ac:structured-macro ac:name=\"{kind}\">\
         <ac:rich-text-body>{content}</ac:rich-text-body>\
         </ac:structured-macro>"
    )
}

/// Embed of an attachment on the same page.
pub fn attachment_image(alt_text: &str, filename: &str) -> String {
    let width = if alt_text.is_empty() {
        ""
    } else {
        " ac:width=\"600\""
    };
    format!(
        "<ac:image ac:alt=\"{}\"{}><ri:attachment ri:filename=\"{}\"/></ac:image>",
        xml_escape(alt_text),
        width,
        xml_escape(filename)
    )
}

/// Visible placeholder for an image that could not be attached.
pub fn image_fallback(original_reference: &str, alt_text: &str) -> String {
    let mut content = format!(
        "<p><strong>Image not available:</strong> {}</p>",
        xml_escape(original_reference)
    );
    if !alt_text.is_empty() {
        content.push_str(&format!("<p><em>{}</em></p>", xml_escape(alt_text)));
    }
    callout_macro("info", &content)
}

pub fn toc_macro() -> &'static str {
    "<ac:structured-macro ac:name=\"toc\"/>"
}

/// Body of the page that stands in for a directory.
pub fn folder_landing_page(title: &str) -> String {
    format!(
        "<p>This section contains documentation for <strong>{}</strong>.</p>\
         <ac:structured-macro ac:name=\"children\">\
         <ac:parameter ac:name=\"all\">true</ac:parameter>\
         </ac:structured-macro>",
        xml_escape(title)
    )
}
