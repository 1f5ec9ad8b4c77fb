//! Character escaping for markup text

use crate::error::{Error, Result};

/// Append `text` to `out`, replacing reserved and control characters with references
pub fn escape_into(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("&#x{:X};", c as u32));
            }
            c => out.push(c),
        }
    }
}

/// Resolve entity and character references
///
/// `offset` is the byte position of `text` in the document, used for error reporting.
pub fn unescape(text: &str, offset: usize) -> Result<String> {
    if !text.contains('&') {
        return Ok(text.to_string());
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    let mut consumed = 0;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let semi = after.find(';').ok_or_else(|| Error::Parse {
            position: offset + consumed + amp,
            message: "unterminated entity reference".to_string(),
        })?;
        let entity = &after[..semi];

        let resolved = match entity {
            "amp" => '&',
            "lt" => '<',
            "gt" => '>',
            "quot" => '"',
            "apos" => '\'',
            _ => resolve_char_ref(entity).ok_or_else(|| Error::Parse {
                position: offset + consumed + amp,
                message: format!("unknown entity reference '&{};'", entity),
            })?,
        };
        out.push(resolved);

        let advance = amp + 1 + semi + 1;
        consumed += advance;
        rest = &rest[advance..];
    }

    out.push_str(rest);
    Ok(out)
}

fn resolve_char_ref(entity: &str) -> Option<char> {
    let digits = entity.strip_prefix('#')?;
    let code = match digits.strip_prefix('x').or_else(|| digits.strip_prefix('X')) {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<u32>().ok()?,
    };
    char::from_u32(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn escape(text: &str) -> String {
        let mut out = String::new();
        escape_into(text, &mut out);
        out
    }

    #[test]
    fn test_escape_reserved() {
        assert_eq!(escape(r#"a<b>&"c"'d'"#), "a&lt;b&gt;&amp;&quot;c&quot;&apos;d&apos;");
    }

    #[test]
    fn test_escape_control_characters() {
        assert_eq!(escape("a\tb\nc\u{0}"), "a&#x9;b&#xA;c&#x0;");
    }

    #[test]
    fn test_unescape_inverts_escape() {
        let original = "tab\there & <there>\n\"quoted\" 'single' \u{1}\u{1f} ünïcödé";
        assert_eq!(unescape(&escape(original), 0).unwrap(), original);
    }

    #[test]
    fn test_unescape_decimal_reference() {
        assert_eq!(unescape("&#65;&#x42;", 0).unwrap(), "AB");
    }

    #[test]
    fn test_unescape_unknown_entity() {
        let err = unescape("abc &nbsp; def", 10).unwrap_err();
        match err {
            Error::Parse { position, .. } => assert_eq!(position, 14),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_unescape_unterminated() {
        assert!(unescape("abc &amp def", 0).is_err());
    }
}
