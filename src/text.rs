//! Text normalization shared by every reconciliation pass.
//!
//! Column headers, category values, and soft-key values all funnel through
//! [`normalize()`] before any matching happens, so keyword vocabularies can be
//! written once in unaccented lowercase.

/// Lower-cases, strips accented characters, collapses whitespace runs to a
/// single space, and trims. Deterministic and total.
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let stripped: String = lowered.chars().map(strip_diacritic).collect();
    collapse_whitespace(&stripped)
}

/// Trimmed, upper-cased comparison form for cell values, so "ana@x.com " and
/// "ANA@X.COM" compare equal across tables.
pub fn fold_upper(text: &str) -> String {
    text.trim().to_uppercase()
}

fn strip_diacritic(c: char) -> char {
    match c {
        'á' | 'à' | 'ã' | 'â' | 'ä' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'õ' | 'ô' | 'ö' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ç' | 'ć' | 'č' => 'c',
        'ñ' | 'ń' => 'n',
        'ý' | 'ÿ' => 'y',
        other => other,
    }
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for c in text.trim().chars() {
        if c.is_whitespace() {
            pending_space = true;
        } else {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(c);
        }
    }
    out
}

/// First-letter-per-word capitalization preserving separators, applied to
/// raw values that fall through every category rule.
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut at_word_start = true;
    for c in text.trim().chars() {
        if c.is_alphabetic() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = !c.is_numeric();
        }
    }
    out
}

/// Removes standalone filler words (e.g. "de", "recebe") before category
/// pattern matching. Operates on already-normalized input.
pub fn strip_filler_words(text: &str, fillers: &[String]) -> String {
    let kept: Vec<&str> = text
        .split(' ')
        .filter(|word| !fillers.iter().any(|f| f == word))
        .collect();
    kept.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_accents_and_whitespace() {
        assert_eq!(normalize("  Conclusão   do  Curso "), "conclusao do curso");
        assert_eq!(normalize("CEILÂNDIA"), "ceilandia");
        assert_eq!(normalize("ú ù û ü"), "u u u u");
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = normalize("Água de Março");
        assert_eq!(normalize(&once), once);
    }

    #[test]
    fn fold_upper_trims_and_uppercases() {
        assert_eq!(fold_upper(" ana@example.com  "), "ANA@EXAMPLE.COM");
    }

    #[test]
    fn title_case_keeps_separators() {
        assert_eq!(title_case("bolsa ESTUDANTIL"), "Bolsa Estudantil");
        assert_eq!(title_case("2-3 salarios"), "2-3 Salarios");
    }

    #[test]
    fn strip_filler_words_removes_whole_words_only() {
        let fillers = vec!["de".to_string(), "recebe".to_string()];
        assert_eq!(
            strip_filler_words("recebe de 2 a 3 salarios", &fillers),
            "2 a 3 salarios"
        );
        // "desistente" contains "de" but is not a standalone filler
        assert_eq!(strip_filler_words("desistente", &fillers), "desistente");
    }
}
