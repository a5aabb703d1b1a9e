use chrono::NaiveDate;
use common::init_memory_pool;
use infinite::fetch::dedup::is_duplicate;
use infinite::fetch::{store_candidate, FetchOutcome};
use infinite::model::{ContentSource, HubbleRawItem, RawContentItem, SourceItem};
use infinite::store::raw::{IDX_GUID, IDX_SOURCE_DATE};
use infinite::store::{query_indexed, Lookup, RawContentStore};

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn hubble_item(title: &str, date: NaiveDate, guid: Option<&str>) -> RawContentItem {
    RawContentItem::new(
        ContentSource::EsaHubble,
        date,
        title,
        guid.map(str::to_string),
        SourceItem::Hubble(HubbleRawItem {
            description: "A supernova in M87.".into(),
            excerpt: "A supernova in M87.".into(),
            link: Some("https://esahubble.org/images/m87/".into()),
            image_url: None,
            image_variants: vec![],
            credit: None,
            copyright: None,
            keywords: vec![],
        }),
    )
}

async fn setup() -> RawContentStore {
    RawContentStore::new(init_memory_pool().await.expect("memory pool"))
}

#[tokio::test]
async fn second_ingestion_of_same_item_is_skipped() {
    let store = setup().await;
    let first = hubble_item("M87 Supernova", day(2025, 1, 7), Some("g1"));
    let again = hubble_item("M87 Supernova", day(2025, 1, 7), Some("g1"));

    assert!(matches!(store_candidate(&store, &first).await, FetchOutcome::Inserted { .. }));
    assert_eq!(store_candidate(&store, &again).await, FetchOutcome::Duplicate);

    let stored = store.find_by_guid("g1").await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].content_id, first.content_id);
}

#[tokio::test]
async fn same_day_and_title_without_guid_is_a_duplicate() {
    let store = setup().await;
    store.insert(&hubble_item("M87 Supernova", day(2025, 1, 7), None)).await.unwrap();

    let source = ContentSource::EsaHubble;
    assert!(is_duplicate(&store, source, day(2025, 1, 7), None, "M87 Supernova").await.unwrap());
    assert!(!is_duplicate(&store, source, day(2025, 1, 7), None, "Another Title").await.unwrap());
    assert!(!is_duplicate(&store, source, day(2025, 1, 8), None, "M87 Supernova").await.unwrap());
    assert!(!is_duplicate(&store, ContentSource::EsaHubblePotw, day(2025, 1, 7), None, "M87 Supernova")
        .await
        .unwrap());
    // A known guid wins even when the title changed upstream.
    store.insert(&hubble_item("Old Title", day(2025, 1, 1), Some("g7"))).await.unwrap();
    assert!(is_duplicate(&store, source, day(2025, 1, 9), Some("g7"), "New Title").await.unwrap());
}

#[tokio::test]
async fn scan_fallback_matches_indexed_answers() {
    let store = setup().await;
    store.insert(&hubble_item("M87 Supernova", day(2025, 1, 7), Some("g1"))).await.unwrap();
    store.insert(&hubble_item("Crab Nebula", day(2025, 1, 7), None)).await.unwrap();

    let probes = [
        (day(2025, 1, 7), Some("g1"), "M87 Supernova"),
        (day(2025, 1, 7), Some("g2"), "M87 Supernova"),
        (day(2025, 1, 7), None, "Crab Nebula"),
        (day(2025, 1, 7), None, "Orion"),
        (day(2025, 1, 8), Some("g9"), "Crab Nebula"),
    ];

    let mut indexed = Vec::new();
    for (date, guid, title) in probes {
        indexed.push(is_duplicate(&store, ContentSource::EsaHubble, date, guid, title).await.unwrap());
    }
    assert_eq!(indexed, vec![true, true, true, false, false]);

    for index in [IDX_GUID, IDX_SOURCE_DATE] {
        sqlx::query(&format!("DROP INDEX {}", index))
            .execute(store.pool())
            .await
            .unwrap();
    }
    let lookup = Lookup::on(IDX_GUID).key("guid", "g1");
    assert!(query_indexed::<RawContentItem>(store.pool(), &lookup).await.is_err());

    let mut scanned = Vec::new();
    for (date, guid, title) in probes {
        scanned.push(is_duplicate(&store, ContentSource::EsaHubble, date, guid, title).await.unwrap());
    }
    assert_eq!(scanned, indexed);
}
