//! Custom Tera filters
//!
//! - `picture`: responsive `<picture>` for a post's featured image
//! - `strip_outer_p`: drop the `<p>` wrapper Markdown puts around one-liners
//! - `depth_class`: CSS class for a comment's nesting level
//! - `avatar`: avatar URL for a comment author or profile

use std::collections::HashMap;

use serde_json::Value;
use tera::{Filter, Result as TeraResult, Tera};

use crate::services::markdown::{html_escape, strip_outer_p};

/// Served when an author has no avatar
pub const DEFAULT_AVATAR: &str = "/static/images/default-avatar.svg";

/// Shown when a post has no featured image
pub const PLACEHOLDER_IMAGE: &str = "/static/images/placeholder.svg";

/// Deepest level with its own CSS class
const MAX_DEPTH_CLASS: i64 = 4;

/// Register every filter on `tera`
pub fn register(tera: &mut Tera, responsive_widths: &[u32]) {
    tera.register_filter(
        "picture",
        PictureFilter {
            widths: responsive_widths.to_vec(),
        },
    );
    tera.register_filter("strip_outer_p", strip_outer_p_filter);
    tera.register_filter("depth_class", depth_class);
    tera.register_filter("avatar", avatar);
}

/// Emits markup, so it is marked safe for autoescaping
struct PictureFilter {
    widths: Vec<u32>,
}

impl Filter for PictureFilter {
    fn filter(&self, value: &Value, args: &HashMap<String, Value>) -> TeraResult<Value> {
        picture(value, args, &self.widths)
    }

    fn is_safe(&self) -> bool {
        true
    }
}

fn picture(value: &Value, args: &HashMap<String, Value>, widths: &[u32]) -> TeraResult<Value> {
    let arg = |name: &str| args.get(name).and_then(Value::as_str).unwrap_or_default();
    let sizes = match arg("sizes") {
        "" => "100vw",
        s => s,
    };
    let class_attr = match arg("class") {
        "" => String::new(),
        c => format!(" class=\"{}\"", html_escape(c)),
    };
    let loading = match arg("loading") {
        "eager" => "eager",
        _ => "lazy",
    };

    let (source, alt, base_name, width, height) = match value {
        Value::String(path) => (Some(path.as_str()), "", None, None, None),
        Value::Object(post) => (
            post.get("featured_image").and_then(Value::as_str),
            post.get("title").and_then(Value::as_str).unwrap_or_default(),
            post.get("image_base_name").and_then(Value::as_str),
            post.get("image_width").and_then(Value::as_i64),
            post.get("image_height").and_then(Value::as_i64),
        ),
        _ => (None, "", None, None, None),
    };
    let alt = match arg("alt") {
        "" => alt,
        a => a,
    };

    let Some(source) = source.filter(|s| !s.is_empty()) else {
        return Ok(Value::String(format!(
            "<img src=\"{}\" alt=\"{}\"{} loading=\"{}\">",
            PLACEHOLDER_IMAGE,
            html_escape(alt),
            class_attr,
            loading
        )));
    };

    let src = media_url(source);
    let mut size_attrs = String::new();
    if let (Some(w), Some(h)) = (width, height) {
        size_attrs = format!(" width=\"{}\" height=\"{}\"", w, h);
    }
    let img = format!(
        "<img src=\"{}\" alt=\"{}\"{}{} loading=\"{}\" decoding=\"async\">",
        html_escape(&src),
        html_escape(alt),
        class_attr,
        size_attrs,
        loading
    );

    // Variants exist only after optimization, and never wider than the original
    let Some(base_name) = base_name.filter(|b| !b.is_empty()) else {
        return Ok(Value::String(img));
    };
    let srcset: Vec<String> = widths
        .iter()
        .filter(|w| width.map_or(true, |orig| i64::from(**w) <= orig))
        .map(|w| format!("/media/resized/{}-{}.webp {}w", base_name, w, w))
        .collect();
    if srcset.is_empty() {
        return Ok(Value::String(img));
    }

    Ok(Value::String(format!(
        "<picture><source type=\"image/webp\" srcset=\"{}\" sizes=\"{}\">{}</picture>",
        html_escape(&srcset.join(", ")),
        html_escape(sizes),
        img
    )))
}

fn media_url(path: &str) -> String {
    if path.starts_with('/') || path.starts_with("http://") || path.starts_with("https://") {
        path.to_string()
    } else {
        format!("/media/{}", path)
    }
}

fn strip_outer_p_filter(value: &Value, _: &HashMap<String, Value>) -> TeraResult<Value> {
    let html = value.as_str().unwrap_or_default();
    Ok(Value::String(strip_outer_p(html)))
}

fn depth_class(value: &Value, _: &HashMap<String, Value>) -> TeraResult<Value> {
    let depth = value.as_i64().unwrap_or(0).clamp(0, MAX_DEPTH_CLASS);
    Ok(Value::String(format!("depth-{}", depth)))
}

fn avatar(value: &Value, _: &HashMap<String, Value>) -> TeraResult<Value> {
    let path = match value {
        Value::String(s) => Some(s.as_str()),
        Value::Object(obj) => obj.get("avatar").and_then(Value::as_str),
        _ => None,
    };
    let url = match path.filter(|p| !p.is_empty()) {
        Some(p) => media_url(p),
        None => DEFAULT_AVATAR.to_string(),
    };
    Ok(Value::String(url))
}
