//! Image caching: download the source image with bounded retry, crop it to
//! the fixed article sizes, and upload each crop once.
//!
//! Nothing here fails the article. Sizes that cannot be produced are simply
//! missing from the returned map.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use image::imageops::FilterType;
use image::{DynamicImage, ImageOutputFormat};
use reqwest::{header, redirect, Client};
use tracing::{debug, info, warn};

use common::ImagesConfig;

use crate::fetch::normalize::resolve_url;
use crate::model::ArticleImage;

pub mod store;

pub use store::{FsObjectStore, ObjectStore};

const JPEG_QUALITY: u8 = 85;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSize {
    pub name: &'static str,
    pub width: u32,
    pub height: u32,
}

pub const IMAGE_SIZES: [ImageSize; 4] = [
    ImageSize { name: "og", width: 1200, height: 630 },
    ImageSize { name: "hero", width: 1200, height: 675 },
    ImageSize { name: "card", width: 400, height: 225 },
    ImageSize { name: "thumb", width: 200, height: 112 },
];

/// `images/{size}/{contentId}-{size}.jpg`
pub fn object_key(content_id: &str, size: &ImageSize) -> String {
    format!("images/{}/{}-{}.jpg", size.name, content_id, size.name)
}

/// Convenience URL for listings: hero, else card, else og.
pub fn primary_url(images: &BTreeMap<String, ArticleImage>) -> Option<String> {
    ["hero", "card", "og"]
        .iter()
        .find_map(|name| images.get(*name))
        .map(|img| img.url.clone())
}

pub struct ImagePipeline {
    client: Client,
    store: Arc<dyn ObjectStore>,
    max_attempts: u32,
    backoff_base: Duration,
}

impl ImagePipeline {
    pub fn new(store: Arc<dyn ObjectStore>, config: &ImagesConfig, user_agent: &str) -> Result<Self> {
        // Redirects are followed by hand, one hop per attempt.
        let client = Client::builder()
            .timeout(config.download_timeout())
            .user_agent(user_agent)
            .redirect(redirect::Policy::none())
            .build()
            .context("failed to build image download client")?;

        Ok(Self {
            client,
            store,
            max_attempts: config.max_attempts(),
            backoff_base: config.backoff_base(),
        })
    }

    /// Produce every size for `content_id`, reusing crops already stored.
    pub async fn process(&self, content_id: &str, image_url: &str, alt: &str) -> BTreeMap<String, ArticleImage> {
        let mut images = BTreeMap::new();
        let mut missing = Vec::new();

        for size in IMAGE_SIZES {
            let key = object_key(content_id, &size);
            match self.store.exists(&key).await {
                Ok(true) => {
                    debug!(%key, "image size already stored");
                    images.insert(size.name.to_string(), self.describe(&key, &size, alt));
                }
                Ok(false) => missing.push(size),
                Err(e) => {
                    warn!(%key, error = %e, "existence check failed, regenerating");
                    missing.push(size);
                }
            }
        }
        if missing.is_empty() {
            return images;
        }

        let bytes = match self.download(image_url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(content_id, url = image_url, error = %format!("{:#}", e), "image download failed, continuing without it");
                return images;
            }
        };

        let sizes = missing.clone();
        let rendered = match tokio::task::spawn_blocking(move || render_sizes(&bytes, &sizes)).await {
            Ok(Ok(rendered)) => rendered,
            Ok(Err(e)) => {
                warn!(content_id, error = %e, "image could not be decoded");
                return images;
            }
            Err(e) => {
                warn!(content_id, error = %e, "image render task failed");
                return images;
            }
        };

        for (size, jpeg) in rendered {
            let key = object_key(content_id, &size);
            match self.store.put(&key, jpeg, "image/jpeg").await {
                Ok(()) => {
                    images.insert(size.name.to_string(), self.describe(&key, &size, alt));
                }
                Err(e) => warn!(%key, error = %e, "image upload failed"),
            }
        }

        info!(content_id, sizes = images.len(), "image sizes ready");
        images
    }

    fn describe(&self, key: &str, size: &ImageSize, alt: &str) -> ArticleImage {
        ArticleImage {
            url: self.store.url_for(key),
            s3_key: key.to_string(),
            alt: alt.to_string(),
            width: size.width,
            height: size.height,
        }
    }

    /// Download with capped attempts and exponential backoff.
    pub async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let mut last_error = None;

        for attempt in 1..=self.max_attempts {
            match self.download_once(url).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) => {
                    warn!(url, attempt, max_attempts = self.max_attempts, error = %e, "image download attempt failed");
                    last_error = Some(e);
                }
            }
            if attempt < self.max_attempts {
                tokio::time::sleep(backoff_delay(self.backoff_base, attempt)).await;
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("no download attempts made")))
            .with_context(|| format!("giving up on {} after {} attempts", url, self.max_attempts))
    }

    /// One GET, following at most one redirect.
    async fn download_once(&self, url: &str) -> Result<Vec<u8>> {
        let mut target = url.to_string();
        for hop in 0..=1 {
            let response = self
                .client
                .get(&target)
                .send()
                .await
                .with_context(|| format!("request to {} failed", target))?;
            let status = response.status();

            if status.is_redirection() {
                if hop == 1 {
                    anyhow::bail!("too many redirects for {}", url);
                }
                let location = response
                    .headers()
                    .get(header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .with_context(|| format!("redirect from {} without Location", target))?;
                target = resolve_url(&target, location)
                    .with_context(|| format!("unusable redirect target {}", location))?;
                continue;
            }
            if !status.is_success() {
                anyhow::bail!("image download failed with status: {}", status);
            }
            let bytes = response.bytes().await.context("failed to read image body")?;
            return Ok(bytes.to_vec());
        }
        anyhow::bail!("too many redirects for {}", url)
    }
}

/// Decode once, then cover-crop and JPEG-encode each requested size.
/// A size that fails to encode is left out.
pub fn render_sizes(bytes: &[u8], sizes: &[ImageSize]) -> Result<Vec<(ImageSize, Vec<u8>)>> {
    let source = image::load_from_memory(bytes).context("unsupported or corrupt image")?;

    let mut rendered = Vec::with_capacity(sizes.len());
    for size in sizes {
        let cropped = source.resize_to_fill(size.width, size.height, FilterType::Lanczos3);
        let rgb = DynamicImage::ImageRgb8(cropped.to_rgb8());
        let mut out = Cursor::new(Vec::new());
        match rgb.write_to(&mut out, ImageOutputFormat::Jpeg(JPEG_QUALITY)) {
            Ok(()) => rendered.push((*size, out.into_inner())),
            Err(e) => warn!(size = size.name, error = %e, "JPEG encoding failed"),
        }
    }
    Ok(rendered)
}

/// `base * 2^(attempt-1)`, saturating instead of overflowing.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(factor)
}
