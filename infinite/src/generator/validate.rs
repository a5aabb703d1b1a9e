use super::parse::GeneratedContent;
use crate::model::ArticleKind;

pub const MAX_META_TITLE_CHARS: usize = 60;
pub const MAX_META_DESCRIPTION_CHARS: usize = 160;
pub const MIN_PEREX_CHARS: usize = 50;
pub const MIN_FAQ_ENTRIES: usize = 3;

fn chars(text: &str) -> usize {
    text.chars().count()
}

/// Hard structural and length constraints; an empty list means publishable.
/// Lengths are counted in characters.
pub fn validate(content: &GeneratedContent, kind: ArticleKind) -> Vec<String> {
    let mut issues = Vec::new();

    let meta_title = content.meta_title.trim();
    if meta_title.is_empty() || chars(meta_title) > MAX_META_TITLE_CHARS {
        issues.push(format!(
            "Meta title is missing or too long (max {} characters)",
            MAX_META_TITLE_CHARS
        ));
    }

    let meta_description = content.meta_description.trim();
    if meta_description.is_empty() || chars(meta_description) > MAX_META_DESCRIPTION_CHARS {
        issues.push(format!(
            "Meta description is missing or too long (max {} characters)",
            MAX_META_DESCRIPTION_CHARS
        ));
    }

    if chars(content.perex.trim()) < MIN_PEREX_CHARS {
        issues.push(format!(
            "Perex is missing or too short (min {} characters)",
            MIN_PEREX_CHARS
        ));
    }

    if content.sections.len() != kind.section_count() {
        issues.push(format!("Must have exactly {} sections", kind.section_count()));
    }

    if content.faq.len() < MIN_FAQ_ENTRIES {
        issues.push(format!("Must have at least {} FAQ items", MIN_FAQ_ENTRIES));
    }

    let total = chars(&content.perex) + content.sections.iter().map(|s| chars(&s.content)).sum::<usize>();
    if total < kind.min_total_chars() {
        issues.push(format!(
            "Total content length is too short (min {} characters)",
            kind.min_total_chars()
        ));
    }

    for (index, section) in content.sections.iter().enumerate() {
        if section.title.trim().is_empty() {
            issues.push(format!("Section {} has no title", index + 1));
        }
        let len = chars(&section.content);
        if len < kind.min_section_chars() {
            issues.push(format!(
                "Section {} is too short (min {} characters, got {})",
                index + 1,
                kind.min_section_chars(),
                len
            ));
        }
    }

    for (index, entry) in content.faq.iter().enumerate() {
        if entry.question.trim().is_empty() || entry.answer.trim().is_empty() {
            issues.push(format!("FAQ item {} is incomplete", index + 1));
        }
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FaqEntry, Section};

    fn content(sections: usize, section_len: usize) -> GeneratedContent {
        GeneratedContent {
            meta_title: "Čierna diera v M87".into(),
            meta_description: "Pozrite sa na výtrysk z čiernej diery.".into(),
            h1_title: Some("Čierna diera v galaxii M87".into()),
            perex: "p".repeat(120),
            sections: (0..sections)
                .map(|i| Section {
                    title: format!("Sekcia {}", i + 1),
                    content: "š".repeat(section_len),
                })
                .collect(),
            faq: (0..3)
                .map(|i| FaqEntry {
                    question: format!("Otázka {}?", i),
                    answer: "Odpoveď.".into(),
                })
                .collect(),
            keywords: vec![],
            estimated_reading_time: None,
        }
    }

    #[test]
    fn well_formed_discovery_passes() {
        assert!(validate(&content(5, 400), ArticleKind::Discovery).is_empty());
    }

    #[test]
    fn weekly_pick_uses_its_own_minimums() {
        assert!(validate(&content(4, 350), ArticleKind::WeeklyPick).is_empty());
        let issues = validate(&content(5, 350), ArticleKind::WeeklyPick);
        assert_eq!(issues, vec!["Must have exactly 4 sections".to_string()]);
    }

    #[test]
    fn wrong_section_count_is_reported_exactly() {
        let issues = validate(&content(2, 500), ArticleKind::Discovery);
        assert!(issues.contains(&"Must have exactly 5 sections".to_string()));
        assert!(issues.iter().any(|i| i.starts_with("Total content length is too short")));
    }

    #[test]
    fn lengths_count_characters() {
        // 399 two-byte characters are still too short for a discovery section.
        let issues = validate(&content(5, 399), ArticleKind::Discovery);
        assert_eq!(issues.len(), 5);
        assert!(issues[0].contains("got 399"));
    }

    #[test]
    fn meta_limits_and_faq_floor() {
        let mut c = content(5, 400);
        c.meta_title = "x".repeat(61);
        c.meta_description = String::new();
        c.perex = "short".into();
        c.faq.truncate(2);
        let issues = validate(&c, ArticleKind::Discovery);
        assert!(issues.iter().any(|i| i.starts_with("Meta title")));
        assert!(issues.iter().any(|i| i.starts_with("Meta description")));
        assert!(issues.iter().any(|i| i.starts_with("Perex")));
        assert!(issues.contains(&"Must have at least 3 FAQ items".to_string()));
    }
}
