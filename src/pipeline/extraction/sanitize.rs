/// Minimum trimmed length for an embedded text layer to be trusted.
pub const MIN_MEANINGFUL_CHARS: usize = 50;

/// Minimum non-whitespace characters for an embedded text layer to be trusted.
pub const MIN_MEANINGFUL_NON_WS: usize = 25;

/// Sanitize extracted text before passing downstream.
/// Strips control characters, trims lines, drops blank lines, and folds
/// typographic dashes and quotes to ASCII so date and amount rules see one
/// spelling. Currency and medical punctuation are preserved.
pub fn sanitize_extracted_text(raw: &str) -> String {
    raw.chars()
        .filter_map(|c| match c {
            '\u{2013}' | '\u{2014}' | '\u{2212}' => Some('-'),
            '\u{2018}' | '\u{2019}' => Some('\''),
            '\u{201C}' | '\u{201D}' => Some('"'),
            '\u{00A0}' | '\t' => Some(' '),
            c if c.is_alphanumeric() || c.is_whitespace() => Some(c),
            '.' | ',' | ';' | ':' | '-' | '/' | '(' | ')' | '[' | ']' | '+' | '=' | '%' | '#'
            | '@' | '&' | '\'' | '"' | '!' | '?' | '<' | '>' | '*' | '_' | '$' | '|' | '~'
            | '°' | '²' | '³' | 'µ' | '€' | '£' => Some(c),
            _ => None,
        })
        .collect::<String>()
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Whether an embedded text layer carries enough content to skip OCR.
pub fn is_meaningful(text: &str) -> bool {
    let trimmed = text.trim();
    trimmed.chars().count() >= MIN_MEANINGFUL_CHARS
        && trimmed.chars().filter(|c| !c.is_whitespace()).count() >= MIN_MEANINGFUL_NON_WS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_control_characters() {
        let raw = "DOS: 01/15/2024\x01\x02\x03\nProvider: Mercy Clinic\x00";
        let clean = sanitize_extracted_text(raw);
        assert!(!clean.contains('\x01'));
        assert!(!clean.contains('\x00'));
        assert_eq!(clean, "DOS: 01/15/2024\nProvider: Mercy Clinic");
    }

    #[test]
    fn preserves_medical_punctuation_and_currency() {
        let raw = "BP: 120/80 mmHg (normal)  Total Charges: $1,250.00  Pain 7/10";
        let clean = sanitize_extracted_text(raw);
        assert!(clean.contains("120/80"));
        assert!(clean.contains("(normal)"));
        assert!(clean.contains("$1,250.00"));
        assert!(clean.contains("7/10"));
    }

    #[test]
    fn folds_typographic_dashes() {
        let clean = sanitize_extracted_text("Dates of Service: 03/01/2024 \u{2013} 03/09/2024");
        assert_eq!(clean, "Dates of Service: 03/01/2024 - 03/09/2024");
    }

    #[test]
    fn collapses_blank_lines() {
        let raw = "Line one\n\n\n\nLine two\n\n\nLine three";
        assert_eq!(sanitize_extracted_text(raw), "Line one\nLine two\nLine three");
    }

    #[test]
    fn trims_whitespace_per_line() {
        let raw = "  leading spaces  \n\ttrailing too  ";
        assert_eq!(sanitize_extracted_text(raw), "leading spaces\ntrailing too");
    }

    #[test]
    fn empty_input_returns_empty() {
        assert_eq!(sanitize_extracted_text(""), "");
        assert_eq!(sanitize_extracted_text("\x00\x01\x02"), "");
    }

    #[test]
    fn meaningful_threshold() {
        assert!(!is_meaningful("Page 1 of 3"));
        assert!(!is_meaningful(&format!("a{}b", " ".repeat(60))));
        assert!(is_meaningful(
            "Chief Complaint: neck pain after motor vehicle collision on 01/02/2024"
        ));
    }
}
