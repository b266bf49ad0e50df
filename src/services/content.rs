//! Content service: products, blog posts, testimonials and campaigns
//!
//! Public listings are cached under `content:*` and invalidated on every
//! write. Campaign variants are served by weighted random choice and count
//! views here; conversions are counted by the form submission service.

use crate::cache::{Cache, CacheLayer};
use crate::db::is_unique_violation;
use crate::db::repositories::{CampaignRepository, PostRepository, ProductRepository, TestimonialRepository};
use crate::models::{
    Campaign, CampaignVariant, CampaignWithVariants, CreateCampaignInput, CreatePostInput, CreateProductInput,
    CreateTestimonialInput, CreateVariantInput, Post, Product, PublishStatus, Testimonial, UpdateCampaignInput,
    UpdatePostInput, UpdateProductInput, UpdateTestimonialInput,
};
use crate::services::hierarchy::{slugify, validate_slug};
use crate::services::random::random_u64;
use crate::services::MarkdownRenderer;
use anyhow::Context;
use chrono::{DateTime, Utc};
use std::sync::Arc;

const CACHE_KEY_PRODUCTS: &str = "content:products";
const CACHE_KEY_TESTIMONIALS: &str = "content:testimonials";
const CACHE_PATTERN_CONTENT: &str = "content:*";
const EXCERPT_LENGTH: usize = 200;

#[derive(Debug, thiserror::Error)]
pub enum ContentServiceError {
    #[error("{kind} hittades inte: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Sluggen \"{0}\" används redan")]
    DuplicateSlug(String),

    #[error("{field}: {message}")]
    ValidationError { field: &'static str, message: String },

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl ContentServiceError {
    fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound { kind, id: id.to_string() }
    }

    fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::ValidationError { field, message: message.into() }
    }
}

pub struct ContentService {
    products: Arc<dyn ProductRepository>,
    posts: Arc<dyn PostRepository>,
    testimonials: Arc<dyn TestimonialRepository>,
    campaigns: Arc<dyn CampaignRepository>,
    cache: Arc<Cache>,
    markdown: MarkdownRenderer,
}

impl ContentService {
    pub fn new(
        products: Arc<dyn ProductRepository>,
        posts: Arc<dyn PostRepository>,
        testimonials: Arc<dyn TestimonialRepository>,
        campaigns: Arc<dyn CampaignRepository>,
        cache: Arc<Cache>,
    ) -> Self {
        Self {
            products,
            posts,
            testimonials,
            campaigns,
            cache,
            markdown: MarkdownRenderer::new(),
        }
    }

    // ========================================================================
    // Products
    // ========================================================================

    pub async fn create_product(&self, input: CreateProductInput) -> Result<Product, ContentServiceError> {
        let name = required("name", &input.name)?;
        let slug = resolve_slug(input.slug.as_deref(), &name)?;
        validate_money_and_stock(input.price_ore, input.stock)?;

        let now = Utc::now();
        let product = Product {
            id: 0,
            name,
            slug: slug.clone(),
            description: input.description,
            price_ore: input.price_ore,
            currency: "SEK".to_string(),
            stock: input.stock,
            active: input.active,
            image_media_id: input.image_media_id,
            created_at: now,
            updated_at: now,
        };

        let created = self.products.create(&product).await.map_err(|e| duplicate_or_internal(e, slug))?;
        self.invalidate_cache().await;
        Ok(created)
    }

    pub async fn get_product(&self, id: i64) -> Result<Product, ContentServiceError> {
        self.products
            .get_by_id(id)
            .await
            .context("Failed to get product")?
            .ok_or_else(|| ContentServiceError::not_found("Produkt", id))
    }

    /// Active product by slug, for the storefront
    pub async fn get_active_product(&self, slug: &str) -> Result<Product, ContentServiceError> {
        self.products
            .get_by_slug(slug)
            .await
            .context("Failed to get product")?
            .filter(|p| p.active)
            .ok_or_else(|| ContentServiceError::not_found("Produkt", slug))
    }

    pub async fn list_products(&self) -> Result<Vec<Product>, ContentServiceError> {
        Ok(self.products.list(false).await.context("Failed to list products")?)
    }

    pub async fn list_active_products(&self) -> Result<Vec<Product>, ContentServiceError> {
        if let Some(list) = self.cache.get::<Vec<Product>>(CACHE_KEY_PRODUCTS).await.ok().flatten() {
            return Ok(list);
        }
        let list = self.products.list(true).await.context("Failed to list products")?;
        let _ = self.cache.set(CACHE_KEY_PRODUCTS, &list, self.cache.default_ttl()).await;
        Ok(list)
    }

    pub async fn update_product(&self, id: i64, input: UpdateProductInput) -> Result<Product, ContentServiceError> {
        let mut product = self.get_product(id).await?;

        if let Some(name) = input.name {
            product.name = required("name", &name)?;
        }
        if let Some(slug) = input.slug {
            product.slug = resolve_slug(Some(&slug), &product.name)?;
        }
        if let Some(description) = input.description {
            product.description = description;
        }
        if let Some(price) = input.price_ore {
            product.price_ore = price;
        }
        if let Some(stock) = input.stock {
            product.stock = stock;
        }
        if let Some(active) = input.active {
            product.active = active;
        }
        if input.image_media_id.is_some() {
            product.image_media_id = input.image_media_id;
        }
        validate_money_and_stock(product.price_ore, product.stock)?;

        let slug = product.slug.clone();
        let updated = self.products.update(&product).await.map_err(|e| duplicate_or_internal(e, slug))?;
        self.invalidate_cache().await;
        Ok(updated)
    }

    pub async fn delete_product(&self, id: i64) -> Result<(), ContentServiceError> {
        self.get_product(id).await?;
        self.products.delete(id).await.context("Failed to delete product")?;
        self.invalidate_cache().await;
        Ok(())
    }

    pub async fn count_products(&self) -> Result<i64, ContentServiceError> {
        Ok(self.products.count().await.context("Failed to count products")?)
    }

    // ========================================================================
    // Posts
    // ========================================================================

    pub async fn create_post(&self, author_id: i64, input: CreatePostInput) -> Result<Post, ContentServiceError> {
        let title = required("title", &input.title)?;
        let slug = resolve_slug(input.slug.as_deref(), &title)?;
        let status = input.status.unwrap_or_default();

        let now = Utc::now();
        let post = Post {
            id: 0,
            author_id: Some(author_id),
            title,
            slug: slug.clone(),
            excerpt: input
                .excerpt
                .filter(|e| !e.trim().is_empty())
                .or_else(|| Some(self.markdown.excerpt(&input.content, EXCERPT_LENGTH)).filter(|e| !e.is_empty())),
            content_html: self.markdown.render(&input.content),
            content: input.content,
            status,
            published_at: (status == PublishStatus::Published).then_some(now),
            created_at: now,
            updated_at: now,
        };

        let created = self.posts.create(&post).await.map_err(|e| duplicate_or_internal(e, slug))?;
        self.invalidate_cache().await;
        Ok(created)
    }

    pub async fn get_post(&self, id: i64) -> Result<Post, ContentServiceError> {
        self.posts
            .get_by_id(id)
            .await
            .context("Failed to get post")?
            .ok_or_else(|| ContentServiceError::not_found("Inlägg", id))
    }

    pub async fn get_published_post(&self, slug: &str) -> Result<Post, ContentServiceError> {
        self.posts
            .get_by_slug(slug)
            .await
            .context("Failed to get post")?
            .filter(|p| p.status == PublishStatus::Published)
            .ok_or_else(|| ContentServiceError::not_found("Inlägg", slug))
    }

    pub async fn list_posts(&self, page: i64, per_page: i64, published_only: bool) -> Result<(Vec<Post>, i64), ContentServiceError> {
        Ok(self
            .posts
            .list(page, per_page.clamp(1, 100), published_only)
            .await
            .context("Failed to list posts")?)
    }

    pub async fn update_post(&self, id: i64, input: UpdatePostInput) -> Result<Post, ContentServiceError> {
        let mut post = self.get_post(id).await?;

        if let Some(title) = input.title {
            post.title = required("title", &title)?;
        }
        if let Some(slug) = input.slug {
            post.slug = resolve_slug(Some(&slug), &post.title)?;
        }
        if let Some(excerpt) = input.excerpt {
            post.excerpt = Some(excerpt).filter(|e| !e.trim().is_empty());
        }
        if let Some(content) = input.content {
            post.content_html = self.markdown.render(&content);
            post.content = content;
        }
        if let Some(status) = input.status {
            // First publication stamps the date; unpublishing keeps it
            if status == PublishStatus::Published && post.published_at.is_none() {
                post.published_at = Some(Utc::now());
            }
            post.status = status;
        }

        let slug = post.slug.clone();
        let updated = self.posts.update(&post).await.map_err(|e| duplicate_or_internal(e, slug))?;
        self.invalidate_cache().await;
        Ok(updated)
    }

    pub async fn delete_post(&self, id: i64) -> Result<(), ContentServiceError> {
        self.get_post(id).await?;
        self.posts.delete(id).await.context("Failed to delete post")?;
        self.invalidate_cache().await;
        Ok(())
    }

    // ========================================================================
    // Testimonials
    // ========================================================================

    pub async fn create_testimonial(&self, input: CreateTestimonialInput) -> Result<Testimonial, ContentServiceError> {
        let now = Utc::now();
        let testimonial = Testimonial {
            id: 0,
            author_name: required("author_name", &input.author_name)?,
            company: input.company.filter(|c| !c.trim().is_empty()),
            quote: required("quote", &input.quote)?,
            rating: validate_rating(input.rating)?,
            published: input.published,
            sort_order: input.sort_order,
            created_at: now,
            updated_at: now,
        };

        let created = self.testimonials.create(&testimonial).await.context("Failed to create testimonial")?;
        self.invalidate_cache().await;
        Ok(created)
    }

    pub async fn get_testimonial(&self, id: i64) -> Result<Testimonial, ContentServiceError> {
        self.testimonials
            .get_by_id(id)
            .await
            .context("Failed to get testimonial")?
            .ok_or_else(|| ContentServiceError::not_found("Omdöme", id))
    }

    pub async fn list_testimonials(&self) -> Result<Vec<Testimonial>, ContentServiceError> {
        Ok(self.testimonials.list(false).await.context("Failed to list testimonials")?)
    }

    pub async fn list_published_testimonials(&self) -> Result<Vec<Testimonial>, ContentServiceError> {
        if let Some(list) = self.cache.get::<Vec<Testimonial>>(CACHE_KEY_TESTIMONIALS).await.ok().flatten() {
            return Ok(list);
        }
        let list = self.testimonials.list(true).await.context("Failed to list testimonials")?;
        let _ = self.cache.set(CACHE_KEY_TESTIMONIALS, &list, self.cache.default_ttl()).await;
        Ok(list)
    }

    pub async fn update_testimonial(&self, id: i64, input: UpdateTestimonialInput) -> Result<Testimonial, ContentServiceError> {
        let mut t = self.get_testimonial(id).await?;
        if let Some(author_name) = input.author_name {
            t.author_name = required("author_name", &author_name)?;
        }
        if let Some(company) = input.company {
            t.company = Some(company).filter(|c| !c.trim().is_empty());
        }
        if let Some(quote) = input.quote {
            t.quote = required("quote", &quote)?;
        }
        if let Some(rating) = input.rating {
            t.rating = validate_rating(rating)?;
        }
        if let Some(published) = input.published {
            t.published = published;
        }
        if let Some(sort_order) = input.sort_order {
            t.sort_order = sort_order;
        }

        let updated = self.testimonials.update(&t).await.context("Failed to update testimonial")?;
        self.invalidate_cache().await;
        Ok(updated)
    }

    pub async fn delete_testimonial(&self, id: i64) -> Result<(), ContentServiceError> {
        self.get_testimonial(id).await?;
        self.testimonials.delete(id).await.context("Failed to delete testimonial")?;
        self.invalidate_cache().await;
        Ok(())
    }

    // ========================================================================
    // Campaigns
    // ========================================================================

    pub async fn create_campaign(&self, input: CreateCampaignInput) -> Result<Campaign, ContentServiceError> {
        let name = required("name", &input.name)?;
        let slug = resolve_slug(input.slug.as_deref(), &name)?;
        validate_window(input.starts_at, input.ends_at)?;

        let now = Utc::now();
        let campaign = Campaign {
            id: 0,
            name,
            slug: slug.clone(),
            headline: required("headline", &input.headline)?,
            description: input.description.filter(|d| !d.trim().is_empty()),
            active: input.active,
            starts_at: input.starts_at,
            ends_at: input.ends_at,
            created_at: now,
            updated_at: now,
        };

        let created = self.campaigns.create(&campaign).await.map_err(|e| duplicate_or_internal(e, slug))?;
        Ok(created)
    }

    pub async fn get_campaign(&self, id: i64) -> Result<CampaignWithVariants, ContentServiceError> {
        let campaign = self
            .campaigns
            .get_by_id(id)
            .await
            .context("Failed to get campaign")?
            .ok_or_else(|| ContentServiceError::not_found("Kampanj", id))?;
        let variants = self.campaigns.list_variants(id).await.context("Failed to list variants")?;
        Ok(CampaignWithVariants { campaign, variants })
    }

    pub async fn list_campaigns(&self) -> Result<Vec<Campaign>, ContentServiceError> {
        Ok(self.campaigns.list().await.context("Failed to list campaigns")?)
    }

    pub async fn update_campaign(&self, id: i64, input: UpdateCampaignInput) -> Result<Campaign, ContentServiceError> {
        let mut campaign = self.get_campaign(id).await?.campaign;
        if let Some(name) = input.name {
            campaign.name = required("name", &name)?;
        }
        if let Some(slug) = input.slug {
            campaign.slug = resolve_slug(Some(&slug), &campaign.name)?;
        }
        if let Some(headline) = input.headline {
            campaign.headline = required("headline", &headline)?;
        }
        if let Some(description) = input.description {
            campaign.description = Some(description).filter(|d| !d.trim().is_empty());
        }
        if let Some(active) = input.active {
            campaign.active = active;
        }
        if input.starts_at.is_some() {
            campaign.starts_at = input.starts_at;
        }
        if input.ends_at.is_some() {
            campaign.ends_at = input.ends_at;
        }
        validate_window(campaign.starts_at, campaign.ends_at)?;

        let slug = campaign.slug.clone();
        Ok(self.campaigns.update(&campaign).await.map_err(|e| duplicate_or_internal(e, slug))?)
    }

    pub async fn delete_campaign(&self, id: i64) -> Result<(), ContentServiceError> {
        self.get_campaign(id).await?;
        self.campaigns.delete(id).await.context("Failed to delete campaign")?;
        Ok(())
    }

    pub async fn add_variant(&self, campaign_id: i64, input: CreateVariantInput) -> Result<CampaignVariant, ContentServiceError> {
        self.get_campaign(campaign_id).await?;
        if !(0..=1000).contains(&input.weight) {
            return Err(ContentServiceError::invalid("weight", "Vikten måste vara mellan 0 och 1000"));
        }

        let variant = CampaignVariant {
            id: 0,
            campaign_id,
            name: required("name", &input.name)?,
            headline: required("headline", &input.headline)?,
            body: input.body.filter(|b| !b.trim().is_empty()),
            weight: input.weight,
            views: 0,
            conversions: 0,
            created_at: Utc::now(),
        };
        Ok(self.campaigns.create_variant(&variant).await.context("Failed to create variant")?)
    }

    pub async fn delete_variant(&self, variant_id: i64) -> Result<(), ContentServiceError> {
        self.get_variant(variant_id).await?;
        self.campaigns.delete_variant(variant_id).await.context("Failed to delete variant")?;
        Ok(())
    }

    pub async fn get_variant(&self, variant_id: i64) -> Result<CampaignVariant, ContentServiceError> {
        self.campaigns
            .get_variant(variant_id)
            .await
            .context("Failed to get variant")?
            .ok_or_else(|| ContentServiceError::not_found("Kampanjvariant", variant_id))
    }

    /// Choose a variant of a running campaign by weight and count the view
    pub async fn pick_variant(&self, campaign_slug: &str) -> Result<CampaignVariant, ContentServiceError> {
        let campaign = self
            .campaigns
            .get_by_slug(campaign_slug)
            .await
            .context("Failed to get campaign")?
            .filter(|c| c.is_running(Utc::now()))
            .ok_or_else(|| ContentServiceError::not_found("Kampanj", campaign_slug))?;

        let variants = self.campaigns.list_variants(campaign.id).await.context("Failed to list variants")?;
        let roll = random_u64()?;
        let mut chosen = pick_weighted(&variants, roll)
            .cloned()
            .ok_or_else(|| ContentServiceError::not_found("Kampanjvariant", campaign_slug))?;

        self.campaigns.record_view(chosen.id).await.context("Failed to record view")?;
        chosen.views += 1;
        Ok(chosen)
    }

    pub async fn record_variant_view(&self, variant_id: i64) -> Result<(), ContentServiceError> {
        if !self.campaigns.record_view(variant_id).await.context("Failed to record view")? {
            return Err(ContentServiceError::not_found("Kampanjvariant", variant_id));
        }
        Ok(())
    }

    async fn invalidate_cache(&self) {
        let _ = self.cache.delete_pattern(CACHE_PATTERN_CONTENT).await;
    }
}

/// Map `roll` onto the cumulative weights. Zero-weight variants are never chosen.
pub fn pick_weighted(variants: &[CampaignVariant], roll: u64) -> Option<&CampaignVariant> {
    let total: u64 = variants.iter().map(|v| v.weight.max(0) as u64).sum();
    if total == 0 {
        return None;
    }

    let mut target = roll % total;
    for variant in variants {
        let weight = variant.weight.max(0) as u64;
        if target < weight {
            return Some(variant);
        }
        target -= weight;
    }
    None
}

fn required(field: &'static str, value: &str) -> Result<String, ContentServiceError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ContentServiceError::invalid(field, "Fältet måste fyllas i"));
    }
    Ok(value.to_string())
}

fn resolve_slug(explicit: Option<&str>, fallback: &str) -> Result<String, ContentServiceError> {
    let slug = match explicit.map(str::trim).filter(|s| !s.is_empty()) {
        Some(slug) => slug.to_string(),
        None => slugify(fallback),
    };
    validate_slug(&slug).map_err(|message| ContentServiceError::invalid("slug", message))?;
    Ok(slug)
}

fn validate_money_and_stock(price_ore: i64, stock: i64) -> Result<(), ContentServiceError> {
    if price_ore < 0 {
        return Err(ContentServiceError::invalid("price_ore", "Priset får inte vara negativt"));
    }
    if stock < 0 {
        return Err(ContentServiceError::invalid("stock", "Lagersaldot får inte vara negativt"));
    }
    Ok(())
}

fn validate_rating(rating: i32) -> Result<i32, ContentServiceError> {
    if !(1..=5).contains(&rating) {
        return Err(ContentServiceError::invalid("rating", "Betyget måste vara mellan 1 och 5"));
    }
    Ok(rating)
}

fn validate_window(starts_at: Option<DateTime<Utc>>, ends_at: Option<DateTime<Utc>>) -> Result<(), ContentServiceError> {
    if let (Some(start), Some(end)) = (starts_at, ends_at) {
        if end <= start {
            return Err(ContentServiceError::invalid("ends_at", "Slutdatum måste vara efter startdatum"));
        }
    }
    Ok(())
}

fn duplicate_or_internal(err: anyhow::Error, slug: String) -> ContentServiceError {
    if is_unique_violation(&err) {
        ContentServiceError::DuplicateSlug(slug)
    } else {
        err.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::db::repositories::{
        SqlxCampaignRepository, SqlxPostRepository, SqlxProductRepository, SqlxTestimonialRepository,
    };
    use crate::db::{create_test_pool, migrations};
    use chrono::Duration;
    use proptest::prelude::*;

    async fn setup() -> ContentService {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.expect("Failed to run migrations");
        ContentService::new(
            SqlxProductRepository::boxed(pool.clone()),
            SqlxPostRepository::boxed(pool.clone()),
            SqlxTestimonialRepository::boxed(pool.clone()),
            SqlxCampaignRepository::boxed(pool),
            Arc::new(MemoryCache::new()),
        )
    }

    fn product_input(name: &str, active: bool) -> CreateProductInput {
        CreateProductInput {
            name: name.into(),
            slug: None,
            description: String::new(),
            price_ore: 19900,
            stock: 5,
            active,
            image_media_id: None,
        }
    }

    fn variant(id: i64, weight: i32) -> CampaignVariant {
        CampaignVariant {
            id,
            campaign_id: 1,
            name: format!("v{}", id),
            headline: String::new(),
            body: None,
            weight,
            views: 0,
            conversions: 0,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_product_listing_and_validation() {
        let svc = setup().await;
        let p = svc.create_product(product_input("Kaffebryggare Deluxe", true)).await.unwrap();
        assert_eq!(p.slug, "kaffebryggare-deluxe");
        svc.create_product(product_input("Utgången", false)).await.unwrap();

        assert_eq!(svc.list_active_products().await.unwrap().len(), 1);
        assert!(svc.get_active_product("utgangen").await.is_err());

        assert!(matches!(
            svc.create_product(product_input("Kaffebryggare Deluxe", true)).await,
            Err(ContentServiceError::DuplicateSlug(_))
        ));
        assert!(matches!(
            svc.create_product(CreateProductInput { price_ore: -1, ..product_input("X", true) }).await,
            Err(ContentServiceError::ValidationError { field: "price_ore", .. })
        ));

        svc.update_product(p.id, UpdateProductInput { active: Some(false), ..Default::default() })
            .await
            .unwrap();
        assert!(svc.list_active_products().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_post_publication_stamps_date_and_excerpt() {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let author = sqlx::query("INSERT INTO users (email, password_hash, display_name) VALUES ('red@firma.se', 'h', 'Red')")
            .execute(&pool)
            .await
            .unwrap()
            .last_insert_rowid();
        let svc = ContentService::new(
            SqlxProductRepository::boxed(pool.clone()),
            SqlxPostRepository::boxed(pool.clone()),
            SqlxTestimonialRepository::boxed(pool.clone()),
            SqlxCampaignRepository::boxed(pool),
            Arc::new(MemoryCache::new()),
        );

        let draft = svc
            .create_post(
                author,
                CreatePostInput {
                    title: "Nyheter i våras".into(),
                    slug: None,
                    excerpt: None,
                    content: "Vi har **öppnat** ett nytt kontor.".into(),
                    status: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(draft.slug, "nyheter-i-varas");
        assert_eq!(draft.excerpt.as_deref(), Some("Vi har öppnat ett nytt kontor."));
        assert!(draft.published_at.is_none());
        assert!(svc.get_published_post("nyheter-i-varas").await.is_err());

        let published = svc
            .update_post(draft.id, UpdatePostInput { status: Some(PublishStatus::Published), ..Default::default() })
            .await
            .unwrap();
        let stamped = published.published_at.unwrap();

        let again = svc
            .update_post(draft.id, UpdatePostInput { title: Some("Nyheter".into()), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(again.published_at, Some(stamped));
        assert_eq!(svc.get_published_post("nyheter-i-varas").await.unwrap().title, "Nyheter");

        let (posts, total) = svc.list_posts(1, 10, true).await.unwrap();
        assert_eq!((posts.len(), total), (1, 1));
    }

    #[tokio::test]
    async fn test_testimonial_rating_bounds() {
        let svc = setup().await;
        let input = CreateTestimonialInput {
            author_name: "Lisa".into(),
            company: None,
            quote: "Fantastiskt".into(),
            rating: 6,
            published: true,
            sort_order: 0,
        };
        assert!(matches!(
            svc.create_testimonial(input.clone()).await,
            Err(ContentServiceError::ValidationError { field: "rating", .. })
        ));

        let t = svc.create_testimonial(CreateTestimonialInput { rating: 4, ..input }).await.unwrap();
        assert_eq!(svc.list_published_testimonials().await.unwrap().len(), 1);
        svc.update_testimonial(t.id, UpdateTestimonialInput { published: Some(false), ..Default::default() })
            .await
            .unwrap();
        assert!(svc.list_published_testimonials().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pick_variant_only_for_running_campaign() {
        let svc = setup().await;
        let campaign = svc
            .create_campaign(CreateCampaignInput {
                name: "Vårkampanj".into(),
                slug: None,
                headline: "Spara 20 %".into(),
                description: None,
                active: true,
                starts_at: Some(Utc::now() - Duration::days(1)),
                ends_at: Some(Utc::now() + Duration::days(1)),
            })
            .await
            .unwrap();
        let a = svc
            .add_variant(campaign.id, CreateVariantInput { name: "A".into(), headline: "A".into(), body: None, weight: 1 })
            .await
            .unwrap();

        let picked = svc.pick_variant("varkampanj").await.unwrap();
        assert_eq!(picked.id, a.id);
        assert_eq!(picked.views, 1);
        assert_eq!(svc.get_variant(a.id).await.unwrap().views, 1);

        svc.update_campaign(campaign.id, UpdateCampaignInput { active: Some(false), ..Default::default() })
            .await
            .unwrap();
        assert!(matches!(svc.pick_variant("varkampanj").await, Err(ContentServiceError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_campaign_window_validated() {
        let svc = setup().await;
        let now = Utc::now();
        let result = svc
            .create_campaign(CreateCampaignInput {
                name: "Bakvänd".into(),
                slug: None,
                headline: "H".into(),
                description: None,
                active: true,
                starts_at: Some(now),
                ends_at: Some(now - Duration::hours(1)),
            })
            .await;
        assert!(matches!(result, Err(ContentServiceError::ValidationError { field: "ends_at", .. })));
    }

    #[test]
    fn test_pick_weighted_boundaries() {
        let variants = vec![variant(1, 1), variant(2, 0), variant(3, 3)];
        assert_eq!(pick_weighted(&variants, 0).unwrap().id, 1);
        assert_eq!(pick_weighted(&variants, 1).unwrap().id, 3);
        assert_eq!(pick_weighted(&variants, 3).unwrap().id, 3);
        assert_eq!(pick_weighted(&variants, 4).unwrap().id, 1);
        assert!(pick_weighted(&[variant(1, 0)], 7).is_none());
        assert!(pick_weighted(&[], 7).is_none());
    }

    proptest! {
        #[test]
        fn prop_pick_weighted_never_picks_zero_weight(
            weights in proptest::collection::vec(0i32..5, 1..8),
            roll in any::<u64>(),
        ) {
            let variants: Vec<_> = weights.iter().enumerate().map(|(i, w)| variant(i as i64, *w)).collect();
            match pick_weighted(&variants, roll) {
                Some(v) => prop_assert!(v.weight > 0),
                None => prop_assert!(weights.iter().all(|w| *w == 0)),
            }
        }
    }
}
