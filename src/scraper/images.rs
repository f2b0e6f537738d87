use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use ::scraper::node::Element;
use ::scraper::{ElementRef, Html, Selector};
use html_escape::encode_double_quoted_attribute;
use sha2::{Digest, Sha256};
use url::Url;

use crate::app::{FreshetError, Result};
use crate::config::ContentSettings;
use crate::domain::{ExtractedContent, ImageRef};
use crate::fetcher::Fetcher;
use crate::scraper::config::{ScraperConfig, GENERIC_IMAGE_SELECTORS, META_IMAGE_SELECTORS};

/// Attributes that may carry an image URL, in order of preference.
pub const SOURCE_ATTRS: &[&str] = &["src", "data-src", "data-lazy-src", "data-original"];
const IMAGE_ACCEPT: &str = "image/webp,image/apng,image/*,*/*;q=0.8";

/// Collect article images: site selectors, then generic ones, then social
/// meta tags when nothing else matched. First image is the featured one.
pub fn extract_images(
    doc: &Html,
    page_url: &str,
    site_selectors: &[&str],
    alt_fallback: &str,
    config: &ScraperConfig,
) -> Vec<ImageRef> {
    let Ok(base) = Url::parse(page_url) else {
        return Vec::new();
    };
    let mut images: Vec<ImageRef> = Vec::new();

    for selector in site_selectors.iter().chain(GENERIC_IMAGE_SELECTORS.iter()) {
        if images.len() >= config.max_images {
            break;
        }
        let Ok(selector) = Selector::parse(selector) else {
            continue;
        };
        for img in doc.select(&selector) {
            if images.len() >= config.max_images {
                break;
            }
            if let Some(image) = image_from_element(img, &base, alt_fallback, config) {
                if !images.iter().any(|i| i.url == image.url) {
                    images.push(image);
                }
            }
        }
    }

    if images.is_empty() {
        if let Some(url) = meta_image(doc, &base) {
            images.push(ImageRef {
                url,
                alt: alt_fallback.to_string(),
            });
        }
    }

    images
}

/// Images referenced by `<img>` tags inside an article body.
pub fn body_images(html_body: &str, page_url: &str, alt_fallback: &str, config: &ScraperConfig) -> Vec<ImageRef> {
    let (Ok(base), Ok(selector)) = (Url::parse(page_url), Selector::parse("img")) else {
        return Vec::new();
    };
    let fragment = Html::parse_fragment(html_body);
    let mut images: Vec<ImageRef> = Vec::new();
    for img in fragment.select(&selector) {
        if let Some(image) = image_from_element(img, &base, alt_fallback, config) {
            if !images.iter().any(|i| i.url == image.url) {
                images.push(image);
            }
        }
    }
    images
}

/// Append `extra` images not already present, up to `max` in total.
pub fn merge_images(images: &mut Vec<ImageRef>, extra: Vec<ImageRef>, max: usize) {
    for image in extra {
        if images.len() >= max {
            break;
        }
        if !images.iter().any(|i| i.url == image.url) {
            images.push(image);
        }
    }
}

/// First usable source of an `<img>`, resolved against `base`. `data:` URIs
/// are not resolved.
pub fn image_source(el: &Element, base: &Url) -> Option<Url> {
    let src = SOURCE_ATTRS
        .iter()
        .filter_map(|attr| el.attr(attr))
        .map(str::trim)
        .find(|s| !s.is_empty())?;

    if src.starts_with("data:") {
        return None;
    }
    base.join(src).ok()
}

fn image_from_element(
    img: ElementRef<'_>,
    base: &Url,
    alt_fallback: &str,
    config: &ScraperConfig,
) -> Option<ImageRef> {
    let el = img.value();
    let url = image_source(el, base)?;

    let width = el.attr("width").and_then(|w| w.trim().parse::<u32>().ok());
    let height = el.attr("height").and_then(|h| h.trim().parse::<u32>().ok());
    if let (Some(w), Some(h)) = (width, height) {
        if w < config.min_image_dimension || h < config.min_image_dimension {
            tracing::debug!("Skipping small image {}x{} {}", w, h, url);
            return None;
        }
    }

    let alt = el
        .attr("alt")
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .unwrap_or(alt_fallback);

    Some(ImageRef {
        url: url.to_string(),
        alt: alt.to_string(),
    })
}

fn meta_image(doc: &Html, base: &Url) -> Option<String> {
    META_IMAGE_SELECTORS
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .find_map(|selector| {
            doc.select(&selector)
                .filter_map(|m| m.value().attr("content"))
                .map(str::trim)
                .find(|c| !c.is_empty() && !c.starts_with("data:"))
                .and_then(|c| base.join(c).ok())
        })
        .map(|u| u.to_string())
}

/// Downloads images into a local directory and rewrites references.
pub struct ImageSaver {
    dir: PathBuf,
    url_prefix: String,
    max_bytes: u64,
}

impl ImageSaver {
    pub fn new(dir: impl Into<PathBuf>, url_prefix: &str, max_bytes: u64) -> Self {
        Self {
            dir: dir.into(),
            url_prefix: url_prefix.trim_end_matches('/').to_string(),
            max_bytes,
        }
    }

    pub fn from_settings(settings: &ContentSettings) -> Self {
        Self::new(
            settings.image_dir.clone(),
            &settings.image_url_prefix,
            settings.max_image_size,
        )
    }

    /// Fetch one image and write it as `<slug>-<sha256 prefix>.<ext>`.
    pub async fn save<F>(&self, fetcher: &F, image: &ImageRef, slug: &str, user_agent: &str) -> Result<ImageRef>
    where
        F: Fetcher + Send + Sync + ?Sized,
    {
        let headers = vec![
            ("User-Agent".to_string(), user_agent.to_string()),
            ("Accept".to_string(), IMAGE_ACCEPT.to_string()),
        ];
        let body = fetcher.fetch(&image.url, &headers).await?.into_body(&image.url)?;

        if body.is_empty() {
            return Err(FreshetError::Other(format!("empty image {}", image.url)));
        }
        if body.len() as u64 > self.max_bytes {
            return Err(FreshetError::Other(format!(
                "image {} exceeds {} bytes",
                image.url, self.max_bytes
            )));
        }

        let digest = hex::encode(Sha256::digest(&body));
        let file_name = format!("{}-{}.{}", slug, &digest[..12], extension_for(&image.url));

        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.dir.join(&file_name), &body).await?;

        Ok(ImageRef {
            url: format!("{}/{}", self.url_prefix, file_name),
            alt: image.alt.clone(),
        })
    }

    /// Replace every image with its local copy. Featured and gallery
    /// images that fail are dropped. Every `<img>` in the body that was saved
    /// points at the local file; inline images that fail keep their remote
    /// source.
    pub async fn persist_all<F>(&self, fetcher: &F, content: &mut ExtractedContent, slug: &str, user_agent: &str)
    where
        F: Fetcher + Send + Sync + ?Sized,
    {
        let originals: Vec<ImageRef> = content.images().cloned().collect();
        let mut attempted: HashSet<String> = HashSet::new();
        let mut local_urls: HashMap<String, String> = HashMap::new();
        let mut saved = Vec::with_capacity(originals.len());

        for image in &originals {
            attempted.insert(image.url.clone());
            match self.save(fetcher, image, slug, user_agent).await {
                Ok(local) => {
                    local_urls.insert(image.url.clone(), local.url.clone());
                    saved.push(local);
                }
                Err(e) => tracing::warn!("Dropping image {}: {}", image.url, e),
            }
        }

        for url in inline_sources(&content.html_body) {
            if !attempted.insert(url.clone()) {
                continue;
            }
            let inline = ImageRef {
                url: url.clone(),
                alt: String::new(),
            };
            match self.save(fetcher, &inline, slug, user_agent).await {
                Ok(local) => {
                    local_urls.insert(url, local.url);
                }
                Err(e) => tracing::warn!("Keeping remote inline image {}: {}", url, e),
            }
        }

        content.html_body = rewrite_sources(&content.html_body, &local_urls);

        let mut saved = saved.into_iter();
        content.featured_image = saved.next();
        content.gallery = saved.collect();
    }
}

/// Absolute http(s) `src` values of the `<img>` tags in a body.
fn inline_sources(html_body: &str) -> Vec<String> {
    let Ok(selector) = Selector::parse("img[src]") else {
        return Vec::new();
    };
    let fragment = Html::parse_fragment(html_body);
    let mut sources: Vec<String> = Vec::new();
    for img in fragment.select(&selector) {
        let Some(src) = img.value().attr("src").map(str::trim) else {
            continue;
        };
        if (src.starts_with("https://") || src.starts_with("http://")) && !sources.iter().any(|s| s == src) {
            sources.push(src.to_string());
        }
    }
    sources
}

/// Point `src` attributes at local copies. The body is serialized by the
/// cleaner, so every source reads `src="<encoded url>"`.
fn rewrite_sources(html_body: &str, local_urls: &HashMap<String, String>) -> String {
    let mut body = html_body.to_string();
    for (remote, local) in local_urls {
        let from = format!("src=\"{}\"", encode_double_quoted_attribute(remote));
        let to = format!("src=\"{}\"", encode_double_quoted_attribute(local));
        body = body.replace(&from, &to);
    }
    body
}

fn extension_for(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| {
            let path = u.path().to_string();
            let (_, ext) = path.rsplit_once('.')?;
            let ext = ext.to_lowercase();
            (!ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
                .then_some(ext)
        })
        .unwrap_or_else(|| "jpg".to_string())
}
