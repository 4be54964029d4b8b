//! Best-effort cleanup of feed markup that a strict XML parser rejects.
//!
//! Only invoked after a parse attempt failed; well-formed documents are never
//! rewritten.

/// Entities that are left alone when rewriting bare ampersands.
const KNOWN_ENTITIES: [&str; 5] = ["amp;", "lt;", "gt;", "apos;", "quot;"];

/// Repairs raw feed bytes so a strict parser has a chance of accepting them.
///
/// Total and idempotent (`repair(&repair(x)) == repair(x)`). In order:
///
/// 1. decode as UTF-8, substituting U+FFFD for invalid sequences
/// 2. replace tabs with spaces
/// 3. drop C0 controls other than `\n` and `\r`
/// 4. drop U+FFFE and U+FFFF (surrogates cannot survive step 1)
/// 5. rewrite every `&` that does not start `&amp;`, `&lt;`, `&gt;`, `&apos;` or
///    `&quot;` into `&amp;`
/// 6. normalize `\r\n` and lone `\r` to `\n`
///
/// Numeric character references are not in the allow-list and get escaped too.
pub fn repair(raw: &[u8]) -> Vec<u8> {
    let decoded = String::from_utf8_lossy(raw);
    let mut out = String::with_capacity(decoded.len() + 16);

    let mut rest: &str = &decoded;
    while let Some(c) = rest.chars().next() {
        let after = &rest[c.len_utf8()..];
        match c {
            '\t' => out.push(' '),
            '\n' => out.push('\n'),
            '\r' => {
                out.push('\n');
                if after.starts_with('\n') {
                    rest = &after[1..];
                    continue;
                }
            }
            '\u{0}'..='\u{1f}' | '\u{fffe}' | '\u{ffff}' => {}
            '&' => {
                if starts_with_entity(after) {
                    out.push('&');
                } else {
                    out.push_str("&amp;");
                }
            }
            _ => out.push(c),
        }
        rest = after;
    }

    out.into_bytes()
}

/// Checks whether the text after an `&` begins a known entity, looking past any
/// characters that step 3/4 would delete anyway.
fn starts_with_entity(after: &str) -> bool {
    let visible = after
        .chars()
        .filter(|&c| !is_dropped(c))
        .take(5)
        .collect::<String>();
    KNOWN_ENTITIES.iter().any(|e| visible.starts_with(e))
}

fn is_dropped(c: char) -> bool {
    matches!(c, '\u{0}'..='\u{8}' | '\u{b}' | '\u{c}' | '\u{e}'..='\u{1f}' | '\u{fffe}' | '\u{ffff}')
}
