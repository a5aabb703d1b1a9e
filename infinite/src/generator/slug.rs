/// Used when a title has no sluggable characters at all.
pub const FALLBACK_SLUG: &str = "clanok";

fn fold_diacritic(c: char) -> char {
    match c {
        'á' | 'ä' => 'a',
        'č' => 'c',
        'ď' => 'd',
        'é' => 'e',
        'í' => 'i',
        'ĺ' | 'ľ' => 'l',
        'ň' => 'n',
        'ó' | 'ô' => 'o',
        'ŕ' => 'r',
        'š' => 's',
        'ť' => 't',
        'ú' => 'u',
        'ý' => 'y',
        'ž' => 'z',
        other => other,
    }
}

/// URL slug: lowercase, Slovak diacritics folded, anything outside
/// `[a-z0-9]` dropped, words joined by single hyphens.
///
/// Idempotent, and the output always matches `^[a-z0-9]+(-[a-z0-9]+)*$`.
pub fn slugify(text: &str) -> String {
    let kept: String = text
        .to_lowercase()
        .chars()
        .map(fold_diacritic)
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace() || *c == '-')
        .collect();

    let slug = kept
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-");

    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug
    }
}

/// Disambiguate a taken slug with the first 6 hex digits of the article id.
pub fn with_suffix(slug: &str, article_id: &str) -> String {
    let suffix: String = article_id
        .chars()
        .filter(|c| c.is_ascii_hexdigit())
        .take(6)
        .collect::<String>()
        .to_ascii_lowercase();
    format!("{}-{}", slug, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn slovak_title_is_folded() {
        assert_eq!(
            slugify("Čierna diera v galaxii M87: Ďalší krok!"),
            "cierna-diera-v-galaxii-m87-dalsi-krok"
        );
        assert_eq!(slugify("Ľadový mesiac Európa · ôsmy div"), "ladovy-mesiac-europa-osmy-div");
        assert_eq!(slugify("Päť hviezd ŕ ĺ ň ť ý ž"), "pat-hviezd-r-l-n-t-y-z");
    }

    #[test]
    fn separators_collapse_and_trim() {
        assert_eq!(slugify("  --Hello   --  World--  "), "hello-world");
        assert_eq!(slugify("a_b"), "ab");
    }

    #[test]
    fn slugify_is_idempotent_and_well_formed() {
        let pattern = Regex::new(r"^[a-z0-9]+(-[a-z0-9]+)*$").unwrap();
        for input in [
            "M87 Supernova",
            "Hmlovina Orión (NGC 1976)",
            "!!!",
            "",
            "Galaxia   s   prstencom",
            "Ústie·rieky 2025/01/07",
        ] {
            let once = slugify(input);
            assert_eq!(slugify(&once), once, "input {:?}", input);
            assert!(pattern.is_match(&once), "{:?} -> {:?}", input, once);
        }
    }

    #[test]
    fn suffix_uses_article_id_hex() {
        assert_eq!(
            with_suffix("m87", "3F2A9B1C-0000-4000-8000-000000000000"),
            "m87-3f2a9b"
        );
    }
}
