//! Minimal HTML tag scanning.
//!
//! Discovery only needs `<link>` tags and filtering only needs `<meta>`
//! tags, both of which live in `<head>` and carry all their information in
//! attributes, so a string scanner is enough and no DOM is built.

/// Attributes of one tag: lowercased names, entity-decoded values, in
/// document order.
pub(crate) type Attributes = Vec<(String, String)>;

/// Returns the attribute lists of every `<tag_name ...>` in `html`.
pub(crate) fn scan_tags(html: &str, tag_name: &str) -> Vec<Attributes> {
    // ASCII lowercasing keeps byte offsets aligned with `html`
    let lower = html.to_ascii_lowercase();
    let needle = format!("<{}", tag_name.to_ascii_lowercase());
    let mut tags = Vec::new();
    let mut from = 0;

    while let Some(found) = lower[from..].find(&needle) {
        let start = from + found + needle.len();
        match lower.as_bytes().get(start) {
            Some(b) if b.is_ascii_whitespace() || *b == b'/' || *b == b'>' => {}
            Some(_) => {
                // `<linkfoo` or `<metadata`
                from = start;
                continue;
            }
            None => break,
        }

        let (attrs, end) = parse_attributes(html, start);
        tags.push(attrs);
        from = end;
    }

    tags
}

/// Looks up an attribute value by (lowercase) name.
pub(crate) fn attr<'a>(attrs: &'a Attributes, name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

/// Parses `name="value"`, `name='value'`, `name=value` and bare `name`
/// attributes starting at byte `pos` up to the closing `>`.
fn parse_attributes(html: &str, mut pos: usize) -> (Attributes, usize) {
    let bytes = html.as_bytes();
    let mut attrs = Vec::new();

    loop {
        while pos < bytes.len() && (bytes[pos].is_ascii_whitespace() || bytes[pos] == b'/') {
            pos += 1;
        }
        if pos >= bytes.len() {
            return (attrs, pos);
        }
        if bytes[pos] == b'>' {
            return (attrs, pos + 1);
        }

        let name_start = pos;
        while pos < bytes.len()
            && !bytes[pos].is_ascii_whitespace()
            && !matches!(bytes[pos], b'=' | b'>' | b'/')
        {
            pos += 1;
        }
        let name = html[name_start..pos].to_ascii_lowercase();

        while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        if pos >= bytes.len() || bytes[pos] != b'=' {
            attrs.push((name, String::new()));
            continue;
        }
        pos += 1;
        while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }

        let value = match bytes.get(pos) {
            Some(&quote) if quote == b'"' || quote == b'\'' => {
                let value_start = pos + 1;
                let value_end = html[value_start..]
                    .find(quote as char)
                    .map(|i| value_start + i)
                    .unwrap_or(bytes.len());
                pos = (value_end + 1).min(bytes.len());
                &html[value_start..value_end]
            }
            _ => {
                let value_start = pos;
                while pos < bytes.len() && !bytes[pos].is_ascii_whitespace() && bytes[pos] != b'>'
                {
                    pos += 1;
                }
                &html[value_start..pos]
            }
        };

        attrs.push((name, html_escape::decode_html_entities(value).into_owned()));
    }
}
