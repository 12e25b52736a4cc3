//! Rendering linking codes into scannable artifacts.
//!
//! The use case hands this module the opaque code string the gateway issued
//! and expects back something a chat client or terminal can display: a
//! `data:image/svg+xml;base64,…` URI. Packing the image into a data URI
//! keeps the artifact a plain `String` all the way through the linking flow,
//! so no temp files are involved unless the user passes `--out`.

use pairlink_core::CodeRenderer;

/// Canvas width of the rendered placard in SVG user units.
const CANVAS_WIDTH: u32 = 480;
/// Canvas height of the rendered placard in SVG user units.
const CANVAS_HEIGHT: u32 = 160;

/// Renders a linking code into an SVG placard wrapped in a data URI.
///
/// The placard shows the code payload as monospace text. Production code
/// should draw a real QR module matrix here; the placard keeps the artifact
/// contract identical, so swapping the drawing logic touches nothing else.
pub struct SvgCodeRenderer;

impl SvgCodeRenderer {
    /// Builds the SVG document for `code` (XML-escaped inside).
    fn svg_document(code: &str) -> String {
        format!(
            r##"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">
<rect width="{w}" height="{h}" fill="#ffffff"/>
<text x="{cx}" y="62" text-anchor="middle" font-family="monospace" font-size="16">PairLink</text>
<text x="{cx}" y="94" text-anchor="middle" font-family="monospace" font-size="11">{code}</text>
</svg>"##,
            w = CANVAS_WIDTH,
            h = CANVAS_HEIGHT,
            cx = CANVAS_WIDTH / 2,
            code = xml_escape(code),
        )
    }
}

impl CodeRenderer for SvgCodeRenderer {
    fn render(&self, code: &str) -> Result<String, String> {
        if code.is_empty() {
            return Err("refusing to render an empty linking code".to_string());
        }

        let svg = Self::svg_document(code);
        Ok(format!(
            "data:image/svg+xml;base64,{}",
            base64_encode(svg.as_bytes())
        ))
    }
}

/// Escapes the five XML-reserved characters so arbitrary code payloads can
/// sit inside a `<text>` element.
fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

/// Standard base64 (RFC 4648 §4) without line wrapping.
///
/// Hand-rolled because this is the only place the agent needs base64;
/// pulling in an encoder crate for one call is not worth the dependency.
pub fn base64_encode(data: &[u8]) -> String {
    const ALPHABET: &[u8; 64] =
        b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

    let mut out = String::with_capacity(data.len().div_ceil(3) * 4);

    for chunk in data.chunks(3) {
        // Widen up to three input bytes into one left-aligned 24-bit group.
        let mut group = u32::from(chunk[0]) << 16;
        if let Some(&b) = chunk.get(1) {
            group |= u32::from(b) << 8;
        }
        if let Some(&b) = chunk.get(2) {
            group |= u32::from(b);
        }

        // Emit the four 6-bit slices high to low; slices that lie entirely
        // past the end of the input become '=' padding.
        out.push(ALPHABET[((group >> 18) & 0x3F) as usize] as char);
        out.push(ALPHABET[((group >> 12) & 0x3F) as usize] as char);
        out.push(if chunk.len() > 1 {
            ALPHABET[((group >> 6) & 0x3F) as usize] as char
        } else {
            '='
        });
        out.push(if chunk.len() > 2 {
            ALPHABET[(group & 0x3F) as usize] as char
        } else {
            '='
        });
    }

    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────
