// Non-critical enrichment calls: each falls back to a deterministic default
use std::collections::HashSet;

use tracing::{info, warn};

use super::{extract_json_array, LlmProvider, LlmRequest};

pub const MAX_KEYWORDS: usize = 12;
/// Fewer model keywords than this triggers a dedicated SEO keyword call.
pub const MIN_KEYWORDS: usize = 6;
/// Per-call timeout for title and keyword requests.
pub const ENRICH_TIMEOUT_SECS: u64 = 30;
pub const FALLBACK_KEYWORDS: [&str; 5] = ["astronómia", "vesmír", "NASA", "APOD", "slovensko"];

pub fn fallback_title(original: &str) -> String {
    format!("Slovenský názov: {}", original)
}

/// Slovak rendering of a source title, with fallback to a prefixed original
pub async fn polish_title<P: LlmProvider + ?Sized>(provider: &P, title: &str, context: &str) -> String {
    let mut prompt = format!(
        "Prelož a lokalizuj nasledujúci nadpis do slovenčiny.\n\
         Buď stručný, zrozumiteľný, prirodzený. Nevracaj nič iné ako samotný nadpis bez úvodzoviek.\n\n\
         Nadpis (EN): {}",
        title
    );
    if !context.is_empty() {
        prompt.push_str(&format!("\nKontext: {}", context.chars().take(1500).collect::<String>()));
    }

    let request = LlmRequest::new(prompt)
        .with_system("Si štylista a prekladateľ nadpisov do slovenčiny. Vráť iba finálny nadpis.")
        .with_limits(60, 0.4)
        .with_timeout(ENRICH_TIMEOUT_SECS);

    match provider.generate(request).await {
        Ok(response) => {
            let polished = response
                .content
                .lines()
                .map(|l| l.trim().trim_matches(['"', '\'', '„', '“']).trim())
                .find(|l| !l.is_empty())
                .unwrap_or_default()
                .to_string();
            if polished.is_empty() {
                warn!(%title, "empty Slovak title, using fallback");
                fallback_title(title)
            } else {
                info!(%title, %polished, "Slovak title generated");
                polished
            }
        }
        Err(e) => {
            warn!(%title, "Slovak title generation failed: {}, using fallback", e);
            fallback_title(title)
        }
    }
}

/// 8-12 Slovak SEO keywords from an article, or the generic set on failure
pub async fn seo_keywords<P: LlmProvider + ?Sized>(provider: &P, title: &str, article_text: &str) -> Vec<String> {
    let prompt = format!(
        "Z textu nižšie vyber 8 až 12 najdôležitejších slovenských SEO kľúčových slov alebo krátkych fráz.\n\
         Vráť výstup ako JSON pole reťazcov, bez ďalšieho textu. Nepoužívaj úvodný ani záverečný komentár.\n\n\
         Nadpis: {}\nČlánok:\n{}",
        title, article_text
    );
    let request = LlmRequest::new(prompt)
        .with_system("Si SEO špecialista pre slovenčinu. Vráť iba platné JSON pole reťazcov.")
        .with_limits(200, 0.3)
        .with_timeout(ENRICH_TIMEOUT_SECS);

    match provider.generate(request).await {
        Ok(response) => {
            let keywords = clean_keywords(parse_keyword_list(&response.content));
            if keywords.len() >= MIN_KEYWORDS {
                keywords
            } else {
                warn!(count = keywords.len(), "too few SEO keywords, using fallback");
                fallback_keywords()
            }
        }
        Err(e) => {
            warn!("SEO keyword generation failed: {}, using fallback", e);
            fallback_keywords()
        }
    }
}

pub fn fallback_keywords() -> Vec<String> {
    FALLBACK_KEYWORDS.iter().map(|k| k.to_string()).collect()
}

/// JSON array when present, otherwise comma/line separated text
fn parse_keyword_list(content: &str) -> Vec<String> {
    if let Some(array) = extract_json_array(content) {
        if let Ok(values) = serde_json::from_str::<Vec<serde_json::Value>>(array) {
            return values
                .into_iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect();
        }
    }
    content
        .replace('\n', ",")
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Strip quoting debris, drop empties, dedup case-insensitively, cap at 12
pub fn clean_keywords<I, S>(keywords: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut cleaned = Vec::new();
    for keyword in keywords {
        let value = keyword
            .as_ref()
            .replace('`', "")
            .trim()
            .trim_start_matches(['"', '['])
            .trim_end_matches(['"', ']'])
            .trim()
            .to_string();
        if value.is_empty() || !seen.insert(value.to_lowercase()) {
            continue;
        }
        cleaned.push(value);
        if cleaned.len() >= MAX_KEYWORDS {
            break;
        }
    }
    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmResponse;

    #[test]
    fn keywords_are_cleaned_and_capped() {
        let raw = vec![
            "\"Galaxia\"", "galaxia", "`hmlovina`", "[M87", "čierna diera]", "", "  ",
            "a", "b", "c", "d", "e", "f", "g", "h", "i",
        ];
        let cleaned = clean_keywords(raw);
        assert_eq!(cleaned.len(), MAX_KEYWORDS);
        assert_eq!(&cleaned[..4], &["Galaxia", "hmlovina", "M87", "čierna diera"]);
    }

    #[test]
    fn keyword_list_accepts_array_or_csv() {
        assert_eq!(
            parse_keyword_list("Tu sú: [\"vesmír\", \"hviezdy\"]"),
            vec!["vesmír", "hviezdy"]
        );
        assert_eq!(parse_keyword_list("vesmír, hviezdy\nplanéty"), vec!["vesmír", "hviezdy", "planéty"]);
    }

    /// Records each request and answers with a fixed text.
    struct Recorder {
        answer: &'static str,
        seen: std::sync::Mutex<Vec<LlmRequest>>,
    }

    #[async_trait::async_trait]
    impl LlmProvider for Recorder {
        async fn generate(&self, request: LlmRequest) -> anyhow::Result<LlmResponse> {
            self.seen.lock().unwrap().push(request);
            Ok(LlmResponse {
                content: self.answer.to_string(),
                usage: Default::default(),
                model: "recorder".into(),
            })
        }
    }

    #[tokio::test]
    async fn enrichment_calls_carry_their_own_timeout() {
        let provider = Recorder {
            answer: "[\"a\", \"b\", \"c\", \"d\", \"e\", \"f\"]",
            seen: Default::default(),
        };
        let keywords = seo_keywords(&provider, "Titulok", "Text").await;
        assert_eq!(keywords.len(), 6);
        polish_title(&provider, "M87 Jet", "").await;

        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|r| r.timeout_seconds == Some(ENRICH_TIMEOUT_SECS)));
    }

    #[test]
    fn fallback_title_keeps_original() {
        assert_eq!(fallback_title("M87 Jet"), "Slovenský názov: M87 Jet");
    }
}
