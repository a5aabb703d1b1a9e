//! Slovak prompts for article generation.

use serde::{Deserialize, Serialize};

use crate::model::{ArticleKind, RawContentItem};

/// Optional editorial brief for an SEO-focused rewrite.
/// Missing fields deserialize as empty and leave the brief incomplete.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SeoBrief {
    pub topic: String,
    pub keywords: String,
    pub target_audience: String,
}

impl SeoBrief {
    /// All three fields must be filled for the brief to apply.
    pub fn is_complete(&self) -> bool {
        !self.topic.trim().is_empty()
            && !self.keywords.trim().is_empty()
            && !self.target_audience.trim().is_empty()
    }
}

pub fn system_prompt() -> String {
    "Si expertný astronóm a skvelý slovenský spisovateľ. Tvoja úloha je vytvoriť zaujímavý, \
     vedecky presný a ľahko zrozumiteľný článok o astronómii v slovenčine. \
     Píšeš populárno-náučným štýlom pre magazín Infinite. Odpovedáš výlučne platným JSON objektom."
        .to_string()
}

fn section_titles(kind: ArticleKind) -> &'static [&'static str] {
    match kind {
        ArticleKind::Discovery => &[
            "Čo vidíme na snímke",
            "Prečo je tento objav dôležitý",
            "Ako záber vznikol",
            "Zaujímavosti o objekte",
            "Vedecký význam a budúcnosť",
        ],
        ArticleKind::WeeklyPick => &[
            "Prečo sme si vybrali tento objav",
            "Čo vidíme na snímke",
            "Prečo je tento objav dôležitý",
            "Zaujímavosti a budúcnosť",
        ],
    }
}

/// User prompt carrying the source material and the structural contract.
pub fn user_prompt(item: &RawContentItem, kind: ArticleKind, brief: Option<&SeoBrief>) -> String {
    let sections = kind.section_count();
    let section_min = kind.min_section_chars();
    let mut prompt = String::new();

    prompt.push_str(&format!(
        "KRITICKÉ POŽIADAVKY NA DĹŽKU:\n\
         - Perex: MINIMÁLNE {perex} znakov\n\
         - Každá z {sections} sekcií: MINIMÁLNE {section_min} znakov\n\
         - FAQ odpovede: MINIMÁLNE {faq} znakov na odpoveď\n\
         - CELKOVÝ obsah: MINIMÁLNE {total} znakov (perex + sekcie)\n\n",
        perex = kind.perex_prompt_chars(),
        faq = kind.faq_answer_prompt_chars(),
        total = kind.min_total_chars(),
    ));

    prompt.push_str(&format!(
        "Napíš článok pre rubriku \"{label}\" na základe tohto zdroja:\n\
         Názov (EN): {title}\n\
         Dátum: {date}\n\
         Zdroj: {source}\n\
         Popis (EN): {body}\n\n",
        label = kind.label(),
        title = item.title,
        date = item.date,
        source = item.source.credit_label(),
        body = item.body_text(),
    ));

    prompt.push_str("Článok musí obsahovať:\n");
    prompt.push_str("1. Meta title (max 60 znakov) výlučne v slovenčine\n");
    prompt.push_str("2. Meta description (max 160 znakov) výlučne v slovenčine\n");
    prompt.push_str("3. H1 nadpis v slovenčine\n");
    prompt.push_str(&format!(
        "4. Perex (MINIMÁLNE {} znakov)\n",
        kind.perex_prompt_chars()
    ));
    prompt.push_str(&format!(
        "5. Presne {} H2 sekcií (každá MINIMÁLNE {} znakov):\n",
        sections, section_min
    ));
    for title in section_titles(kind) {
        prompt.push_str(&format!("   - {}\n", title));
    }
    prompt.push_str(&format!(
        "6. FAQ s 3 až 5 otázkami (každá odpoveď MINIMÁLNE {} znakov)\n",
        kind.faq_answer_prompt_chars()
    ));
    prompt.push_str("7. 8 až 12 slovenských SEO kľúčových slov\n\n");

    if let Some(brief) = brief.filter(|b| b.is_complete()) {
        prompt.push_str(&format!(
            "SEO ZADANIE:\n- Téma: {}\n- Hlavné kľúčové slová: {}\n- Cieľové publikum: {}\n\n",
            brief.topic, brief.keywords, brief.target_audience
        ));
    }

    prompt.push_str(&format!(
        "Vráť obsah v JSON formáte:\n\
         {{\n\
         \x20 \"metaTitle\": \"...\",\n\
         \x20 \"metaDescription\": \"...\",\n\
         \x20 \"h1Title\": \"...\",\n\
         \x20 \"perex\": \"...\",\n\
         \x20 \"sections\": [{{\"title\": \"...\", \"content\": \"...\"}}],\n\
         \x20 \"faq\": [{{\"question\": \"...\", \"answer\": \"...\"}}],\n\
         \x20 \"keywords\": [\"...\"],\n\
         \x20 \"estimatedReadingTime\": \"5 minút\"\n\
         }}\n\n\
         PAMÄTAJ SI: celkový obsah MUSÍ mať aspoň {} znakov, inak bude článok zamietnutý.",
        kind.min_total_chars()
    ));

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ApodRawItem, ContentSource, SourceItem};
    use chrono::NaiveDate;

    fn item() -> RawContentItem {
        RawContentItem::new(
            ContentSource::Apod,
            NaiveDate::from_ymd_opt(2025, 1, 7).unwrap(),
            "M87 Supernova",
            None,
            SourceItem::Apod(ApodRawItem {
                explanation: "A stellar explosion.".into(),
                url: None,
                hdurl: None,
                image_url: None,
                media_type: "image".into(),
                copyright: None,
                thumbnail_url: None,
            }),
        )
    }

    #[test]
    fn prompt_states_structure_for_kind() {
        let prompt = user_prompt(&item(), ArticleKind::Discovery, None);
        assert!(prompt.contains("Presne 5 H2 sekcií (každá MINIMÁLNE 400 znakov)"));
        assert!(prompt.contains("MINIMÁLNE 2000 znakov"));
        assert!(prompt.contains("M87 Supernova"));
        assert!(prompt.contains("\"estimatedReadingTime\""));
        assert!(!prompt.contains("SEO ZADANIE"));

        let weekly = user_prompt(&item(), ArticleKind::WeeklyPick, None);
        assert!(weekly.contains("Presne 4 H2 sekcií (každá MINIMÁLNE 300 znakov)"));
    }

    #[test]
    fn complete_brief_is_included() {
        let brief = SeoBrief {
            topic: "Čierne diery".into(),
            keywords: "m87, čierna diera".into(),
            target_audience: "študenti".into(),
        };
        let prompt = user_prompt(&item(), ArticleKind::Discovery, Some(&brief));
        assert!(prompt.contains("Cieľové publikum: študenti"));

        let partial = SeoBrief { target_audience: " ".into(), ..brief };
        assert!(!user_prompt(&item(), ArticleKind::Discovery, Some(&partial)).contains("SEO ZADANIE"));
    }

    #[test]
    fn partial_brief_deserializes_incomplete() {
        let empty: SeoBrief = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, SeoBrief::default());
        assert!(!empty.is_complete());

        let topic_only: SeoBrief = serde_json::from_str(r#"{"topic": "M87"}"#).unwrap();
        assert_eq!(topic_only.topic, "M87");
        assert!(!topic_only.is_complete());
    }
}
