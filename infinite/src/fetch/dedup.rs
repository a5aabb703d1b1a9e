use anyhow::Result;
use chrono::NaiveDate;

use crate::model::ContentSource;
use crate::store::RawContentStore;

/// An item is a duplicate when its guid is already stored, or when an item
/// with the same source, date and title exists.
pub async fn is_duplicate(
    store: &RawContentStore,
    source: ContentSource,
    date: NaiveDate,
    guid: Option<&str>,
    title: &str,
) -> Result<bool> {
    if let Some(guid) = guid.filter(|g| !g.is_empty()) {
        if !store.find_by_guid(guid).await?.is_empty() {
            return Ok(true);
        }
    }

    let same_day = store.find_by_source_date(source, date, Some(title)).await?;
    Ok(!same_day.is_empty())
}
