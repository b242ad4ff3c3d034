//! Local image references: extraction before rendering, attachment embeds after upload.

use super::{templates, UploadResults};
use crate::paths;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

static MARKDOWN_IMAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"!\[([^\]]*)\]\(([^)]+?)(?:\s+"([^"]*)")?\)"#).expect("markdown image pattern")
});

static HTML_IMAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<img src="([^"]+)"(?:\s+alt="([^"]*)")?[^>]*>"#).expect("html image pattern")
});

pub const PLACEHOLDER_PREFIX: &str = "LOCAL_IMAGE_";
const LITERAL_PREFIX: &str = "LITERAL_IMAGE_";

const SUPPORTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "svg", "webp"];

/// An image that has to be uploaded as an attachment before the page is final.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalImage {
    /// Token standing in for the image in the converted markup
    pub placeholder: String,
    /// Resolved file on disk
    pub source_path: PathBuf,
    pub alt_text: String,
    pub title_text: String,
    /// The reference exactly as written in the document
    pub original_reference: String,
    /// Attachment name (file name of `source_path`)
    pub filename: String,
}

/// Result of scanning a document for image references.
#[derive(Debug, Default)]
pub(crate) struct Extracted {
    pub text: String,
    pub images: Vec<LocalImage>,
    /// Local references that were not extracted, kept verbatim
    pub literals: Vec<(String, String)>,
}

fn is_remote(reference: &str) -> bool {
    reference.starts_with("http://")
        || reference.starts_with("https://")
        || reference.starts_with("data:")
}

pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            SUPPORTED_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Replace qualifying local images with `LOCAL_IMAGE_n`.
///
/// Local references that are missing or unsupported get a literal placeholder so the
/// original markdown survives rendering untouched. Remote references are left alone.
pub(crate) fn extract(markdown: &str, base_dir: Option<&Path>) -> Extracted {
    let mut images: Vec<LocalImage> = Vec::new();
    let mut literals: Vec<(String, String)> = Vec::new();

    let text = MARKDOWN_IMAGE.replace_all(markdown, |caps: &Captures| {
        let whole = caps[0].to_string();
        let reference = caps[2].to_string();
        if is_remote(&reference) {
            return whole;
        }

        let full_path = match base_dir {
            Some(base) => base.join(&reference),
            None => PathBuf::from(&reference),
        };
        if full_path.is_file() && is_supported_image(&full_path) {
            let placeholder = format!("{PLACEHOLDER_PREFIX}{}", images.len());
            debug!("Found local image: {} -> {}", reference, full_path.display());
            images.push(LocalImage {
                placeholder: placeholder.clone(),
                filename: full_path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                source_path: full_path,
                alt_text: caps.get(1).map(|m| m.as_str()).unwrap_or("").to_string(),
                title_text: caps.get(3).map(|m| m.as_str()).unwrap_or("").to_string(),
                original_reference: reference,
            });
            placeholder
        } else {
            warn!("Image not found or unsupported format: {}", reference);
            let placeholder = format!("{LITERAL_PREFIX}{}", literals.len());
            literals.push((placeholder.clone(), whole));
            placeholder
        }
    });

    Extracted {
        text: text.into_owned(),
        images,
        literals,
    }
}

/// Put the untouched markdown of skipped references back as text.
pub(crate) fn restore_literals(html: &str, literals: &[(String, String)]) -> String {
    let mut html = html.to_string();
    for (placeholder, original) in literals.iter().rev() {
        let escaped = original.replace('<', "&lt;").replace('>', "&gt;");
        html = html.replace(placeholder, &escaped);
    }
    html
}

/// Absolutize relative `<img>` sources that exist under `base_dir`.
pub(crate) fn resolve_html_images(html: &str, base_dir: Option<&Path>) -> String {
    let Some(base) = base_dir else {
        return html.to_string();
    };

    HTML_IMAGE
        .replace_all(html, |caps: &Captures| {
            let mut src = caps[1].to_string();
            let alt = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            if !is_remote(&src) && !src.starts_with('/') {
                let candidate = base.join(&src);
                if candidate.exists() {
                    src = paths::key(&paths::normalize(&candidate));
                }
            }
            format!("<img src=\"{}\" alt=\"{}\" />", src, alt)
        })
        .into_owned()
}

/// Replace image placeholders with attachment embeds or fallback callouts.
pub(crate) fn finalize(text: &str, images: &[LocalImage], uploads: &UploadResults) -> String {
    let mut text = text.to_string();
    for image in images.iter().rev() {
        let uploaded = uploads.get(&image.filename).copied().unwrap_or(false);
        if uploaded {
            let markup = templates::attachment_image(&image.alt_text, &image.filename);
            text = text.replace(&image.placeholder, &markup);
            debug!("Embedded attachment {} for {}", image.filename, image.placeholder);
        } else {
            let markup = templates::image_fallback(&image.original_reference, &image.alt_text);
            text = super::code::replace_placeholder(&text, &image.placeholder, &markup);
            warn!("Image {} was not uploaded, using fallback", image.filename);
        }
    }
    text
}
