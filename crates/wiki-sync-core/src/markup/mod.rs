//! Markdown → storage markup conversion.
//!
//! The pipeline, in order:
//! 1. Fenced code blocks → `CODE_BLOCK_n`
//! 2. (image-aware only) Local images → `LOCAL_IMAGE_n`
//! 3. Markdown → HTML with heading ids, tables, footnotes and a `[TOC]` marker
//! 4. Admonition `<div>`s → callout macros
//! 5. Relative `<img>` sources absolutized against the base directory
//! 6. `&amp;` → `&`, `<br>` → `<br />`
//! 7. Macro-like prose escaped
//! 8. Code placeholders → `code` macros
//!
//! Code is restored last so entity normalization and escaping never touch it.

mod code;
mod images;
mod render;
pub mod templates;

pub use images::{is_supported_image, LocalImage};
pub use render::slugify;

use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// Attachment filename → whether the upload succeeded.
pub type UploadResults = HashMap<String, bool>;

#[derive(Debug, Clone, Default)]
pub struct MarkupConverter;

impl MarkupConverter {
    pub fn new() -> Self {
        Self
    }

    /// Convert a document, leaving local images to the renderer.
    pub fn convert(&self, markdown: &str, base_dir: Option<&Path>) -> String {
        info!("Converting markdown to storage markup");
        let (text, blocks) = code::extract(markdown);
        let html = self.render(&text, base_dir);
        let html = code::restore(&html, &blocks);
        debug!("Conversion completed ({} code blocks)", blocks.len());
        html
    }

    /// Convert a document, pulling out local images for upload.
    ///
    /// The returned markup still contains `LOCAL_IMAGE_n` placeholders; pass it to
    /// [`MarkupConverter::finalize`] once the uploads are done.
    pub fn convert_with_images(
        &self,
        markdown: &str,
        base_dir: Option<&Path>,
    ) -> (String, Vec<LocalImage>) {
        info!("Converting markdown with image extraction");
        let (text, blocks) = code::extract(markdown);
        let extracted = images::extract(&text, base_dir);

        let html = self.render(&extracted.text, base_dir);
        let html = images::restore_literals(&html, &extracted.literals);
        let html = code::restore(&html, &blocks);

        debug!(
            "Conversion completed ({} code blocks, {} local images)",
            blocks.len(),
            extracted.images.len()
        );
        (html, extracted.images)
    }

    /// Replace image placeholders with attachment embeds or fallback callouts.
    pub fn finalize(&self, text: &str, images: &[LocalImage], uploads: &UploadResults) -> String {
        debug!("Finalizing markup with {} images", images.len());
        images::finalize(text, images, uploads)
    }

    /// Read and convert a file, resolving references against its directory.
    pub fn convert_file(&self, path: &Path) -> std::io::Result<(String, Vec<LocalImage>)> {
        let markdown = std::fs::read_to_string(path)?;
        Ok(self.convert_with_images(&markdown, path.parent()))
    }

    /// Steps shared by both variants, between extraction and code restoration.
    fn render(&self, text: &str, base_dir: Option<&Path>) -> String {
        let html = render::markdown_to_html(text);
        let html = render::admonitions(&html);
        let html = images::resolve_html_images(&html, base_dir);
        let html = render::normalize_entities(&html);
        render::escape_macro_like(&html)
    }
}
