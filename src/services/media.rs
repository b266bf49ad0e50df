//! Media library
//!
//! Originals live at `media/<uuid>/original.<ext>` and raster images get
//! WebP variants next to them at `media/<uuid>/<kind>.webp`. The database row
//! is the source of truth: storage objects without a row are garbage, never
//! the other way round.

use crate::config::{ImageConfig, UploadConfig};
use crate::db::repositories::{MediaRepository, NewMediaVariant};
use crate::models::{Media, MediaVariant, MediaWithUrls, User, VariantUrl};
use crate::services::imaging::{generate_variants, supports_variants, ProcessedImage};
use crate::services::storage::{ObjectStorage, PresignedUpload};
use anyhow::anyhow;
use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

const MAX_FILENAME_LENGTH: usize = 255;
const MAX_ALT_LENGTH: usize = 500;

#[derive(Debug, thiserror::Error)]
pub enum MediaServiceError {
    #[error("Filen hittades inte: {0}")]
    NotFound(String),

    #[error("{field}: {message}")]
    ValidationError { field: &'static str, message: String },

    #[error("Direktuppladdning stöds inte av den här lagringen")]
    PresignUnsupported,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl MediaServiceError {
    fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::ValidationError { field, message: message.into() }
    }
}

/// Original object handed to [`MediaService::finish`]
enum Original {
    /// Written by this request, deleted again if registration fails
    Owned(String),
    /// Uploaded by the client beforehand, never deleted here
    Borrowed(String),
}

fn already_registered() -> MediaServiceError {
    MediaServiceError::invalid("key", "Lagringsnyckeln är redan registrerad")
}

#[derive(Debug, Serialize)]
pub struct MediaList {
    pub items: Vec<MediaWithUrls>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

pub struct MediaService {
    repo: Arc<dyn MediaRepository>,
    storage: Arc<ObjectStorage>,
    upload: UploadConfig,
    images: ImageConfig,
}

impl MediaService {
    pub fn new(
        repo: Arc<dyn MediaRepository>,
        storage: Arc<ObjectStorage>,
        upload: UploadConfig,
        images: ImageConfig,
    ) -> Self {
        Self {
            repo,
            storage,
            upload,
            images,
        }
    }

    /// Store an upload received by the server
    pub async fn upload(
        &self,
        user: &User,
        filename: &str,
        content_type: &str,
        bytes: Vec<u8>,
        alt_text: Option<String>,
    ) -> Result<MediaWithUrls, MediaServiceError> {
        self.check_type(content_type)?;
        self.check_size(bytes.len())?;
        let filename = clean_filename(filename)?;
        let alt_text = clean_alt(alt_text)?;

        let dir = format!("media/{}", Uuid::new_v4());
        let original_key = format!("{}/original.{}", dir, self.upload.get_extension(content_type));
        self.storage.put(&original_key, bytes.clone()).await?;

        self.finish(user, &dir, Original::Owned(original_key), filename, content_type, bytes, alt_text)
            .await
    }

    /// Reserve a key and sign a direct browser-to-bucket upload for it.
    /// The client calls [`MediaService::register_uploaded`] afterwards.
    pub async fn presign_upload(&self, filename: &str, content_type: &str) -> Result<PresignedUpload, MediaServiceError> {
        if !self.storage.supports_presign() {
            return Err(MediaServiceError::PresignUnsupported);
        }
        self.check_type(content_type)?;
        clean_filename(filename)?;

        let key = format!(
            "media/{}/original.{}",
            Uuid::new_v4(),
            self.upload.get_extension(content_type)
        );
        Ok(self.storage.presigned_upload_url(&key, content_type).await?)
    }

    /// Record an object the client uploaded with a presigned URL
    pub async fn register_uploaded(
        &self,
        user: &User,
        key: &str,
        filename: &str,
        content_type: &str,
        alt_text: Option<String>,
    ) -> Result<MediaWithUrls, MediaServiceError> {
        self.check_type(content_type)?;
        let dir = upload_dir(key, self.upload.get_extension(content_type))
            .ok_or_else(|| MediaServiceError::invalid("key", "Ogiltig lagringsnyckel"))?;
        let filename = clean_filename(filename)?;
        let alt_text = clean_alt(alt_text)?;

        // Variants land next to the original, so an owned directory is off limits
        if self.repo.dir_in_use(&dir).await? {
            return Err(already_registered());
        }

        let bytes = self
            .storage
            .get(key)
            .await?
            .ok_or_else(|| MediaServiceError::NotFound(key.to_string()))?;
        if let Err(e) = self.check_size(bytes.len()) {
            self.remove_objects(&[key.to_string()]).await;
            return Err(e);
        }

        // The client-uploaded original stays put if registration fails after this point
        self.finish(user, &dir, Original::Borrowed(key.to_string()), filename, content_type, bytes, alt_text)
            .await
    }

    pub async fn get(&self, id: i64) -> Result<MediaWithUrls, MediaServiceError> {
        let media = self
            .repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| MediaServiceError::NotFound(id.to_string()))?;
        let variants = self.repo.variants_for(id).await?;
        Ok(self.with_urls(media, &variants))
    }

    pub async fn list(&self, page: i64, per_page: i64) -> Result<MediaList, MediaServiceError> {
        let page = page.max(1);
        let per_page = per_page.clamp(1, 100);
        let (rows, total) = self.repo.list(page, per_page).await?;

        let mut items = Vec::with_capacity(rows.len());
        for media in rows {
            let variants = self.repo.variants_for(media.id).await?;
            items.push(self.with_urls(media, &variants));
        }
        Ok(MediaList { items, total, page, per_page })
    }

    pub async fn update_alt(&self, id: i64, alt_text: Option<String>) -> Result<MediaWithUrls, MediaServiceError> {
        let alt_text = clean_alt(alt_text)?;
        if !self.repo.update_alt(id, alt_text.as_deref()).await? {
            return Err(MediaServiceError::NotFound(id.to_string()));
        }
        self.get(id).await
    }

    /// Remove the row, then its objects. Storage failures leave orphans
    /// behind but never fail the request.
    pub async fn delete(&self, id: i64) -> Result<(), MediaServiceError> {
        let keys = self
            .repo
            .delete(id)
            .await?
            .ok_or_else(|| MediaServiceError::NotFound(id.to_string()))?;
        tracing::info!(media_id = id, objects = keys.len(), "Media deleted");
        self.remove_objects(&keys).await;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn finish(
        &self,
        user: &User,
        dir: &str,
        original: Original,
        filename: String,
        content_type: &str,
        bytes: Vec<u8>,
        alt_text: Option<String>,
    ) -> Result<MediaWithUrls, MediaServiceError> {
        let size_bytes = bytes.len() as i64;
        // Objects this call created, removed again on failure
        let (original_key, mut stored) = match original {
            Original::Owned(key) => (key.clone(), vec![key]),
            Original::Borrowed(key) => (key, Vec::new()),
        };

        let processed = if supports_variants(content_type) {
            match self.process(bytes).await {
                Ok(processed) => Some(processed),
                Err(e) => {
                    self.remove_objects(&stored).await;
                    return Err(e);
                }
            }
        } else {
            None
        };

        let mut variants = Vec::new();
        if let Some(processed) = &processed {
            for variant in &processed.variants {
                let key = format!("{}/{}.webp", dir, variant.kind);
                if let Err(e) = self.storage.put(&key, variant.bytes.clone()).await {
                    self.remove_objects(&stored).await;
                    return Err(e.into());
                }
                stored.push(key.clone());
                variants.push(NewMediaVariant {
                    kind: variant.kind,
                    storage_key: key,
                    width: variant.width as i32,
                    height: variant.height as i32,
                    size_bytes: variant.bytes.len() as i64,
                });
            }
        }

        let media = Media {
            id: 0,
            storage_key: original_key,
            filename,
            content_type: content_type.to_string(),
            size_bytes,
            width: processed.as_ref().map(|p| p.width as i32),
            height: processed.as_ref().map(|p| p.height as i32),
            alt_text,
            uploaded_by: Some(user.id),
            created_at: Utc::now(),
        };

        let (media, variants) = match self.repo.create_with_variants(&media, &variants).await {
            Ok(created) => created,
            Err(e) => {
                self.remove_objects(&stored).await;
                if crate::db::is_unique_violation(&e) {
                    return Err(already_registered());
                }
                return Err(e.into());
            }
        };

        tracing::info!(
            media_id = media.id,
            user_id = user.id,
            content_type = %media.content_type,
            variants = variants.len(),
            "Media uploaded"
        );
        Ok(self.with_urls(media, &variants))
    }

    async fn process(&self, bytes: Vec<u8>) -> Result<ProcessedImage, MediaServiceError> {
        let config = self.images.clone();
        tokio::task::spawn_blocking(move || generate_variants(&bytes, &config))
            .await
            .map_err(|e| anyhow!("Image worker failed: {}", e))?
            .map_err(|e| {
                tracing::debug!(error = %e, "Rejected undecodable image");
                MediaServiceError::invalid("file", "Bilden kunde inte läsas")
            })
    }

    async fn remove_objects(&self, keys: &[String]) {
        let results = join_all(keys.iter().map(|key| self.storage.delete(key))).await;
        for (key, result) in keys.iter().zip(results) {
            if let Err(e) = result {
                tracing::warn!(key = %key, error = %e, "Failed to delete stored object");
            }
        }
    }

    fn check_type(&self, content_type: &str) -> Result<(), MediaServiceError> {
        if !self.upload.is_type_allowed(content_type) {
            return Err(MediaServiceError::invalid(
                "file",
                format!("Filtypen {} är inte tillåten", content_type),
            ));
        }
        Ok(())
    }

    fn check_size(&self, len: usize) -> Result<(), MediaServiceError> {
        if len == 0 {
            return Err(MediaServiceError::invalid("file", "Filen är tom"));
        }
        if len as u64 > self.upload.max_file_size {
            return Err(MediaServiceError::invalid(
                "file",
                format!("Filen är för stor. Högst {} MB", self.upload.max_file_size / 1024 / 1024),
            ));
        }
        Ok(())
    }

    fn with_urls(&self, media: Media, variants: &[MediaVariant]) -> MediaWithUrls {
        MediaWithUrls {
            url: self.storage.public_url(&media.storage_key),
            variants: variants
                .iter()
                .map(|v| VariantUrl {
                    kind: v.kind,
                    url: self.storage.public_url(&v.storage_key),
                    width: v.width,
                    height: v.height,
                })
                .collect(),
            media,
        }
    }
}

/// `media/<uuid>/original.<ext>` -> `media/<uuid>`
fn upload_dir(key: &str, ext: &str) -> Option<String> {
    let rest = key.strip_prefix("media/")?;
    let (id, file) = rest.split_once('/')?;
    Uuid::parse_str(id).ok()?;
    (file == format!("original.{}", ext)).then(|| format!("media/{}", id))
}

fn clean_filename(filename: &str) -> Result<String, MediaServiceError> {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    if name.is_empty() {
        return Err(MediaServiceError::invalid("filename", "Filnamn saknas"));
    }
    Ok(name.chars().filter(|c| !c.is_control()).take(MAX_FILENAME_LENGTH).collect())
}

fn clean_alt(alt_text: Option<String>) -> Result<Option<String>, MediaServiceError> {
    let alt = alt_text.map(|a| a.trim().to_string()).filter(|a| !a.is_empty());
    if alt.as_ref().is_some_and(|a| a.chars().count() > MAX_ALT_LENGTH) {
        return Err(MediaServiceError::invalid(
            "alt_text",
            format!("Alt-texten får vara högst {} tecken", MAX_ALT_LENGTH),
        ));
    }
    Ok(alt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxMediaRepository, SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::{UserRole, VariantKind};
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    struct Fixture {
        svc: MediaService,
        storage: Arc<ObjectStorage>,
        user: User,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.expect("Failed to run migrations");
        let user = SqlxUserRepository::new(pool.clone())
            .create(&User::new("red@firma.se".into(), "h".into(), "Redaktör".into(), UserRole::Author))
            .await
            .unwrap();
        let storage = Arc::new(ObjectStorage::in_memory());
        Fixture {
            svc: MediaService::new(
                SqlxMediaRepository::boxed(pool),
                storage.clone(),
                UploadConfig::default(),
                ImageConfig::default(),
            ),
            storage,
            user,
        }
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, _| Rgb([(x % 256) as u8, 40, 90]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img).write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_upload_dir() {
        let id = Uuid::new_v4();
        assert_eq!(upload_dir(&format!("media/{}/original.png", id), "png"), Some(format!("media/{}", id)));
        assert_eq!(upload_dir(&format!("media/{}/original.png", id), "jpg"), None);
        assert_eq!(upload_dir("media/not-a-uuid/original.png", "png"), None);
        assert_eq!(upload_dir("../etc/passwd", "png"), None);
    }

    #[test]
    fn test_clean_filename() {
        assert_eq!(clean_filename("C:\\bilder\\logo.png").unwrap(), "logo.png");
        assert_eq!(clean_filename("../../hemlig.pdf").unwrap(), "hemlig.pdf");
        assert!(clean_filename("  ").is_err());
    }

    #[tokio::test]
    async fn test_upload_image_stores_variants() {
        let f = setup().await;
        let media = f
            .svc
            .upload(&f.user, "logo.png", "image/png", png(300, 200), Some(" Vår logotyp ".into()))
            .await
            .unwrap();

        assert_eq!(media.media.width, Some(300));
        assert_eq!(media.media.alt_text.as_deref(), Some("Vår logotyp"));
        assert!(media.url.starts_with("/media/media/"));
        assert!(media.url.ends_with("/original.png"));

        let kinds: Vec<_> = media.variants.iter().map(|v| v.kind).collect();
        assert_eq!(kinds, vec![VariantKind::Thumb, VariantKind::Small]);

        let key = media.media.storage_key.replace("original.png", "thumb.webp");
        assert!(f.storage.get(&key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_pdf_has_no_variants() {
        let f = setup().await;
        let media = f
            .svc
            .upload(&f.user, "prislista.pdf", "application/pdf", b"%PDF-1.4".to_vec(), None)
            .await
            .unwrap();
        assert!(media.variants.is_empty());
        assert_eq!(media.media.width, None);
    }

    #[tokio::test]
    async fn test_rejections_leave_nothing_behind() {
        let f = setup().await;
        assert!(matches!(
            f.svc.upload(&f.user, "x.exe", "application/x-msdownload", vec![1], None).await,
            Err(MediaServiceError::ValidationError { .. })
        ));
        assert!(matches!(
            f.svc.upload(&f.user, "trasig.png", "image/png", b"inte en png".to_vec(), None).await,
            Err(MediaServiceError::ValidationError { field: "file", .. })
        ));
        assert_eq!(f.svc.list(1, 20).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_delete_removes_objects() {
        let f = setup().await;
        let media = f.svc.upload(&f.user, "a.png", "image/png", png(200, 100), None).await.unwrap();
        let original = media.media.storage_key.clone();

        f.svc.delete(media.media.id).await.unwrap();
        assert!(f.storage.get(&original).await.unwrap().is_none());
        assert!(matches!(f.svc.get(media.media.id).await, Err(MediaServiceError::NotFound(_))));
        assert!(matches!(f.svc.delete(media.media.id).await, Err(MediaServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_register_uploaded_object() {
        let f = setup().await;
        let key = format!("media/{}/original.png", Uuid::new_v4());
        f.storage.put(&key, png(160, 160)).await.unwrap();

        let media = f.svc.register_uploaded(&f.user, &key, "foto.png", "image/png", None).await.unwrap();
        assert_eq!(media.media.storage_key, key);
        assert_eq!(media.variants.len(), 2);

        let missing = format!("media/{}/original.png", Uuid::new_v4());
        assert!(matches!(
            f.svc.register_uploaded(&f.user, &missing, "x.png", "image/png", None).await,
            Err(MediaServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_register_existing_key_keeps_stored_objects() {
        let f = setup().await;
        let dir = format!("media/{}", Uuid::new_v4());
        let key = format!("{}/original.png", dir);
        let thumb = format!("{}/thumb.webp", dir);
        f.storage.put(&key, png(160, 160)).await.unwrap();
        let first = f.svc.register_uploaded(&f.user, &key, "foto.png", "image/png", None).await.unwrap();

        assert!(matches!(
            f.svc.register_uploaded(&f.user, &key, "igen.png", "image/png", None).await,
            Err(MediaServiceError::ValidationError { field: "key", .. })
        ));
        // Same directory under another extension would overwrite the variants
        let sibling = format!("{}/original.jpg", dir);
        f.storage.put(&sibling, vec![1, 2, 3]).await.unwrap();
        assert!(matches!(
            f.svc.register_uploaded(&f.user, &sibling, "annan.jpg", "image/jpeg", None).await,
            Err(MediaServiceError::ValidationError { field: "key", .. })
        ));

        assert!(f.storage.get(&key).await.unwrap().is_some());
        assert!(f.storage.get(&thumb).await.unwrap().is_some());
        let still = f.svc.get(first.media.id).await.unwrap();
        assert_eq!(still.media.filename, "foto.png");
        assert_eq!(f.svc.list(1, 20).await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn test_failed_registration_keeps_client_original() {
        let f = setup().await;
        let key = format!("media/{}/original.png", Uuid::new_v4());
        f.storage.put(&key, b"inte en png".to_vec()).await.unwrap();

        assert!(matches!(
            f.svc.register_uploaded(&f.user, &key, "trasig.png", "image/png", None).await,
            Err(MediaServiceError::ValidationError { field: "file", .. })
        ));
        assert!(f.storage.get(&key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_update_alt_and_presign_unsupported() {
        let f = setup().await;
        let media = f.svc.upload(&f.user, "a.gif", "image/gif", b"GIF89a".to_vec(), None).await.unwrap();
        let updated = f.svc.update_alt(media.media.id, Some("Animerad".into())).await.unwrap();
        assert_eq!(updated.media.alt_text.as_deref(), Some("Animerad"));

        assert!(matches!(
            f.svc.presign_upload("a.png", "image/png").await,
            Err(MediaServiceError::PresignUnsupported)
        ));
    }
}
