#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::Mutex;

use chrono::{NaiveDate, Utc};
use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use infinite::llm::{LlmProvider, LlmRequest, LlmResponse, UsageMetadata};
use infinite::model::{
    ApodRawItem, Article, ArticleKind, ArticleStatus, ContentSource, FaqEntry, HubbleRawItem, RawContentItem, Section,
    SourceItem,
};
use serde_json::json;

/// Canned model: answers title, keyword and article prompts differently and
/// records every user prompt it sees.
pub struct ScriptedLlm {
    pub h1_title: Option<String>,
    pub sections_override: Option<usize>,
    pub keywords: Vec<String>,
    pub fail_articles: bool,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self {
            h1_title: Some("Supernova v galaxii M87".into()),
            sections_override: None,
            keywords: (1..=8).map(|i| format!("kľúčové slovo {}", i)).collect(),
            fail_articles: false,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl LlmProvider for ScriptedLlm {
    async fn generate(&self, request: LlmRequest) -> anyhow::Result<LlmResponse> {
        self.prompts.lock().unwrap().push(request.prompt.clone());
        let system = request.system.unwrap_or_default();

        let content = if system.contains("nadpisov") {
            "Slovenský titulok o M87".to_string()
        } else if system.contains("SEO") {
            json!(["vesmír", "galaxia", "M87", "supernova", "Hubble", "NASA", "hviezdy"]).to_string()
        } else {
            if self.fail_articles {
                anyhow::bail!("LLM API error 500 Internal Server Error: upstream down");
            }
            let sections = self.sections_override.unwrap_or_else(|| {
                if request.prompt.contains("Presne 4 H2") {
                    4
                } else {
                    5
                }
            });
            format!(
                "Tu je článok:\n```json\n{}\n```",
                article_json(sections, self.h1_title.as_deref(), &self.keywords)
            )
        };

        Ok(LlmResponse {
            content,
            usage: UsageMetadata::default(),
            model: "scripted".into(),
        })
    }
}

pub fn article_json(sections: usize, h1_title: Option<&str>, keywords: &[String]) -> String {
    let mut body = json!({
        "metaTitle": "Supernova v M87 | Infinite",
        "metaDescription": "Čo sa deje v strede galaxie M87 a prečo na tom záleží.",
        "perex": "Výbuch hviezdy v obrovskej eliptickej galaxii M87 ponúka astronómom vzácny pohľad do jej jadra. ".repeat(3),
        "sections": (1..=sections).map(|i| json!({
            "title": format!("Sekcia {}", i),
            "content": "Astronómovia sledujú výtrysk z čiernej diery a jeho vplyv na okolité hviezdy. ".repeat(6),
        })).collect::<Vec<_>>(),
        "faq": (1..=3).map(|i| json!({
            "question": format!("Otázka {}?", i),
            "answer": "Odpoveď s dostatočným vysvetlením pre čitateľa.",
        })).collect::<Vec<_>>(),
        "keywords": keywords,
        "estimatedReadingTime": 6,
    });
    if let Some(title) = h1_title {
        body["h1Title"] = json!(title);
    }
    body.to_string()
}

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn apod_item(date: NaiveDate, image_url: Option<&str>) -> RawContentItem {
    RawContentItem::new(
        ContentSource::Apod,
        date,
        "M87 Supernova",
        None,
        SourceItem::Apod(ApodRawItem {
            explanation: "What is happening in the center of M87?".into(),
            url: Some("https://apod.nasa.gov/apod/ap250107.html".into()),
            hdurl: image_url.map(str::to_string),
            image_url: image_url.map(str::to_string),
            media_type: "image".into(),
            copyright: None,
            thumbnail_url: None,
        }),
    )
}

pub fn hubble_item(date: NaiveDate, title: &str) -> RawContentItem {
    RawContentItem::new(
        ContentSource::EsaHubble,
        date,
        title,
        Some(format!("guid-{}", title)),
        SourceItem::Hubble(HubbleRawItem {
            description: "A spiral galaxy seen by Hubble.".into(),
            excerpt: "A spiral galaxy seen by Hubble.".into(),
            link: Some("https://esahubble.org/images/potw2501a/".into()),
            image_url: None,
            image_variants: vec![],
            credit: Some("ESA/Hubble".into()),
            copyright: None,
            keywords: vec!["galaxy".into()],
        }),
    )
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 128]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, ImageOutputFormat::Png)
        .unwrap();
    out.into_inner()
}

/// A minimal published article, keyed by slug.
pub fn article(slug: &str, kind: ArticleKind, date: NaiveDate, title: &str) -> Article {
    let now = Utc::now();
    Article {
        article_id: format!("id-{}", slug),
        slug: slug.to_string(),
        title: title.to_string(),
        meta_title: title.to_string(),
        meta_description: "Popis".into(),
        perex: format!("Perex k článku {}", title),
        content: vec![Section {
            title: "Sekcia".into(),
            content: "Obsah".into(),
        }],
        faq: vec![FaqEntry {
            question: "Prečo?".into(),
            answer: "Preto.".into(),
        }],
        keywords: vec!["vesmír".into()],
        estimated_reading_time: "5 minút".into(),
        category: kind.category().to_string(),
        kind,
        status: ArticleStatus::Published,
        source: ContentSource::Apod,
        source_url: None,
        original_date: date,
        raw_content_id: format!("raw-{}", slug),
        author: "Infinite AI".into(),
        image_url: None,
        images: BTreeMap::new(),
        published_at: now,
        created_at: now,
        updated_at: now,
    }
}
