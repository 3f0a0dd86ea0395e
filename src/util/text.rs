use std::borrow::Cow;

/// Removes terminal control characters and ANSI escape sequences.
///
/// Feed titles and metadata are attacker-controlled and end up both in the
/// console and in toots, so everything except tab, newline and carriage
/// return below 0x20 is dropped, as is DEL. CSI (`ESC [ ... final`) and OSC
/// (`ESC ] ... BEL|ST`) sequences are removed as a whole.
///
/// Returns `Cow::Borrowed` when nothing needed stripping.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    if !s.chars().any(is_stripped) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\x1b' {
            if !is_stripped(c) {
                out.push(c);
            }
            continue;
        }

        match chars.peek() {
            Some('[') => {
                chars.next();
                // parameter and intermediate bytes run until a final byte in @..~
                for c in chars.by_ref() {
                    if ('\x40'..='\x7e').contains(&c) {
                        break;
                    }
                }
            }
            Some(']') => {
                chars.next();
                while let Some(c) = chars.next() {
                    if c == '\x07' {
                        break;
                    }
                    if c == '\x1b' && chars.peek() == Some(&'\\') {
                        chars.next();
                        break;
                    }
                }
            }
            _ => {}
        }
    }

    Cow::Owned(out)
}

fn is_stripped(c: char) -> bool {
    c == '\x7f' || (c < '\x20' && c != '\t' && c != '\n' && c != '\r')
}

/// Cuts `s` to at most `max_chars` characters (not bytes).
///
/// Mastodon counts characters, so this never splits a multi-byte character.
pub fn truncate_chars(s: &str, max_chars: usize) -> Cow<'_, str> {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => Cow::Owned(s[..byte_idx].to_owned()),
        None => Cow::Borrowed(s),
    }
}

/// Reduces the HTML body of a status to plain text.
///
/// Each paragraph is stripped of markup, entity-decoded and trimmed; the
/// non-empty paragraphs are joined with a single space. Content without any
/// `<p>` element is treated as one paragraph.
pub fn html_to_text(html: &str) -> String {
    let lower = html.to_ascii_lowercase();
    let mut paragraphs = Vec::new();

    if lower.contains("<p") {
        let mut search_from = 0;
        while let Some(start) = find_paragraph_start(&lower, search_from) {
            let Some(open_end) = lower[start..].find('>') else {
                break;
            };
            let body_start = start + open_end + 1;
            let body_end = lower[body_start..]
                .find("</p>")
                .map(|pos| body_start + pos)
                .unwrap_or(html.len());
            paragraphs.push(plain_text(&html[body_start..body_end]));
            search_from = body_end;
        }
    } else {
        paragraphs.push(plain_text(html));
    }

    paragraphs
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Finds the next `<p>` or `<p ...>` opening tag (not `<pre>`, `<param>`...).
fn find_paragraph_start(lower: &str, from: usize) -> Option<usize> {
    let mut pos = from;
    while let Some(found) = lower[pos..].find("<p") {
        let start = pos + found;
        match lower.as_bytes().get(start + 2) {
            Some(b'>') | Some(b' ') | Some(b'\t') | Some(b'\n') => return Some(start),
            _ => pos = start + 2,
        }
    }
    None
}

fn plain_text(fragment: &str) -> String {
    let mut text = String::with_capacity(fragment.len());
    let mut in_tag = false;
    let mut tag = String::new();

    for c in fragment.chars() {
        match (in_tag, c) {
            (false, '<') => {
                in_tag = true;
                tag.clear();
            }
            (false, c) => text.push(c),
            (true, '>') => {
                in_tag = false;
                if tag.trim_start_matches('/').to_lowercase().starts_with("br") {
                    text.push(' ');
                }
            }
            (true, c) => tag.push(c),
        }
    }

    let decoded = html_escape::decode_html_entities(&text);
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Packs lines into messages of at most `max_chars` characters.
///
/// Lines are never split: a line that alone exceeds the limit becomes its
/// own message. Each line is terminated by `\n` inside its message.
pub fn chunk_lines<I>(lines: I, max_chars: usize) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in lines {
        let line_len = line.chars().count() + 1;
        if current_len > 0 && current_len + line_len > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        current.push_str(&line);
        current.push('\n');
        current_len += line_len;
    }

    if current_len > 0 {
        chunks.push(current);
    }
    chunks
}
