use std::borrow::Cow;

use scraper::Html;

/// Ellipsis appended when text is cut short
const ELLIPSIS: &str = "...";

/// Converts an HTML fragment into a single line of plain text.
///
/// Tags are dropped and entities decoded; the result is trimmed and newlines are
/// replaced by spaces so descriptions render on one line in reports.
///
/// # Examples
///
/// ```
/// use feedsieve::util::html_to_text;
///
/// assert_eq!(html_to_text("<p>Patch <b>now</b> &amp; reboot</p>"), "Patch now & reboot");
/// ```
pub fn html_to_text(html: &str) -> String {
    if !html.contains('<') && !html.contains('&') {
        return html.trim().replace('\n', " ");
    }

    let fragment = Html::parse_fragment(html);
    let text: String = fragment.root_element().text().collect();
    text.trim().replace('\n', " ")
}

/// Truncates `s` to at most `max_chars` characters, backing up to the last word
/// boundary and appending `"..."` when anything was cut.
///
/// Returns `Cow::Borrowed` when the string already fits. A cut with no space inside
/// the bound keeps the hard-cut prefix.
///
/// # Examples
///
/// ```
/// use feedsieve::util::truncate_at_word;
///
/// assert_eq!(truncate_at_word("short", 10), "short");
/// assert_eq!(truncate_at_word("the quick brown fox", 12), "the quick...");
/// ```
pub fn truncate_at_word(s: &str, max_chars: usize) -> Cow<'_, str> {
    let Some((cut, _)) = s.char_indices().nth(max_chars) else {
        return Cow::Borrowed(s);
    };

    let head = &s[..cut];
    let head = match head.rfind(' ') {
        Some(space) => &head[..space],
        None => head,
    };
    Cow::Owned(format!("{head}{ELLIPSIS}"))
}

/// Hard-cuts `s` to at most `max_chars` characters, never splitting a code point.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((cut, _)) => &s[..cut],
        None => s,
    }
}

fn is_stripped_control(c: char) -> bool {
    c == '\x7f' || (c < ' ' && c != '\t' && c != '\n' && c != '\r')
}

/// SEC-001: Removes terminal control characters and ANSI escape sequences.
///
/// Feed titles and descriptions are remote input and get echoed to the console;
/// this keeps them from moving the cursor or retitling the terminal.
///
/// Strips C0 controls except tab/newline/CR, DEL, CSI sequences (`ESC [` ... final
/// byte), OSC sequences (`ESC ]` ... BEL or `ESC \`) and bare ESC.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    if !s.chars().any(|c| c == '\x1b' || is_stripped_control(c)) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\x1b' {
            match chars.peek() {
                Some('[') => {
                    chars.next();
                    for n in chars.by_ref() {
                        if ('\x40'..='\x7e').contains(&n) {
                            break;
                        }
                    }
                }
                Some(']') => {
                    chars.next();
                    while let Some(n) = chars.next() {
                        if n == '\x07' {
                            break;
                        }
                        if n == '\x1b' && chars.peek() == Some(&'\\') {
                            chars.next();
                            break;
                        }
                    }
                }
                _ => {}
            }
        } else if !is_stripped_control(c) {
            out.push(c);
        }
    }

    Cow::Owned(out)
}
