//! HTML template minification.
//!
//! Page templates are copied verbatim by default. Prod builds with
//! `[build] minify_templates = true` run them through `minify_html`.

use std::borrow::Cow;

/// Minify an HTML template when `enabled`.
///
/// Returns `Cow::Borrowed` if disabled, `Cow::Owned` if minified.
pub fn minify_template(html: &[u8], enabled: bool) -> Cow<'_, [u8]> {
    if enabled {
        Cow::Owned(minify_html_inner(html))
    } else {
        Cow::Borrowed(html)
    }
}

fn minify_html_inner(html: &[u8]) -> Vec<u8> {
    let mut cfg = minify_html::Cfg::new();
    // Extension pages are loaded as standalone documents; keep the skeleton.
    cfg.keep_closing_tags = true;
    cfg.keep_html_and_head_opening_tags = true;
    cfg.keep_comments = false;
    cfg.minify_css = true;
    // Inline scripts are left to the script unit pipeline.
    cfg.minify_js = false;
    minify_html::minify(html, &cfg)
}
