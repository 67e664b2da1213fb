/// Convert Markdown-style text to WhatsApp's formatting dialect.
///
/// - `**bold**` / `__bold__` → `*bold*`
/// - `*italic*` → `_italic_` (`_italic_` is kept)
/// - `~~strike~~` → `~strike~`
/// - `` `code` `` and ` ```blocks``` ` pass through unchanged
/// - line-leading `*` / `-` bullets become `* `
///
/// Inline markers only pair up within a single line.
pub fn format_text_for_whatsapp(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let len = chars.len();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;

    while i < len {
        let line_start = i == 0 || chars[i - 1] == '\n';
        if line_start && let Some(next) = bullet_end(&chars, i) {
            out.push_str("* ");
            i = next;
            continue;
        }

        // Fenced code block: copied verbatim up to and including the closing fence.
        if starts_with(&chars, i, "```") {
            out.push_str("```");
            i += 3;
            while i < len && !starts_with(&chars, i, "```") {
                out.push(chars[i]);
                i += 1;
            }
            if i < len {
                out.push_str("```");
                i += 3;
            }
            continue;
        }

        if chars[i] == '`' {
            out.push('`');
            i += 1;
            while i < len && chars[i] != '`' {
                out.push(chars[i]);
                i += 1;
            }
            if i < len {
                out.push('`');
                i += 1;
            }
            continue;
        }

        if let Some((marker, replacement)) = [("**", '*'), ("__", '*'), ("~~", '~')]
            .into_iter()
            .find(|(m, _)| starts_with(&chars, i, m))
        {
            if let Some(close) = find_on_line(&chars, i + 2, marker) {
                out.push(replacement);
                out.extend(&chars[i + 2..close]);
                out.push(replacement);
                i = close + 2;
            } else {
                out.push_str(marker);
                i += 2;
            }
            continue;
        }

        if chars[i] == '*'
            && chars.get(i + 1).is_some_and(|c| !c.is_whitespace())
            && let Some(close) = find_on_line(&chars, i + 1, "*")
        {
            out.push('_');
            out.extend(&chars[i + 1..close]);
            out.push('_');
            i = close + 1;
            continue;
        }

        out.push(chars[i]);
        i += 1;
    }

    out
}

/// If a bullet (`*` or `-` after optional indentation, followed by
/// whitespace) starts at `i`, return the index of the first content char.
fn bullet_end(chars: &[char], mut i: usize) -> Option<usize> {
    while i < chars.len() && (chars[i] == ' ' || chars[i] == '\t') {
        i += 1;
    }
    if i >= chars.len() || !(chars[i] == '*' || chars[i] == '-') {
        return None;
    }
    i += 1;
    let after_marker = i;
    while i < chars.len() && (chars[i] == ' ' || chars[i] == '\t') {
        i += 1;
    }
    (i > after_marker).then_some(i)
}

fn starts_with(chars: &[char], i: usize, pat: &str) -> bool {
    let mut idx = i;
    for p in pat.chars() {
        if chars.get(idx) != Some(&p) {
            return false;
        }
        idx += 1;
    }
    true
}

fn find_on_line(chars: &[char], from: usize, pat: &str) -> Option<usize> {
    let mut i = from;
    while i < chars.len() && chars[i] != '\n' {
        if i > from && starts_with(chars, i, pat) {
            return Some(i);
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bold_converted() {
        assert_eq!(format_text_for_whatsapp("**bold**"), "*bold*");
        assert_eq!(format_text_for_whatsapp("this is __bold__ text"), "this is *bold* text");
    }

    #[test]
    fn inline_code_preserved() {
        assert_eq!(format_text_for_whatsapp("`code`"), "`code`");
        assert_eq!(format_text_for_whatsapp("use `**raw**` here"), "use `**raw**` here");
    }

    #[test]
    fn code_block_preserved() {
        let input = "```\nlet x = **y**;\n```";
        assert_eq!(format_text_for_whatsapp(input), input);
    }

    #[test]
    fn italic_and_strikethrough_converted() {
        assert_eq!(format_text_for_whatsapp("an *italic* word"), "an _italic_ word");
        assert_eq!(format_text_for_whatsapp("keep _this_"), "keep _this_");
        assert_eq!(format_text_for_whatsapp("~~gone~~"), "~gone~");
    }

    #[test]
    fn bullets_normalised() {
        let input = "Rivers:\n- Nile\n  * Rufiji\n-not a bullet";
        assert_eq!(
            format_text_for_whatsapp(input),
            "Rivers:\n* Nile\n* Rufiji\n-not a bullet"
        );
    }

    #[test]
    fn bold_at_line_start_is_not_a_bullet() {
        assert_eq!(format_text_for_whatsapp("**Note**: read"), "*Note*: read");
    }

    #[test]
    fn unpaired_markers_left_alone() {
        assert_eq!(format_text_for_whatsapp("2 * 3 = 6"), "2 * 3 = 6");
        assert_eq!(format_text_for_whatsapp("**open\nclose**"), "**open\nclose**");
    }

    #[test]
    fn plain_text_unchanged() {
        assert_eq!(format_text_for_whatsapp("hello world"), "hello world");
    }
}
