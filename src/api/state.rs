//! Shared application state

use anyhow::Result;
use std::sync::Arc;

use crate::cache::create_cache;
use crate::config::Config;
use crate::db::repositories::{
    SqlxAccountRepository, SqlxCampaignRepository, SqlxCategoryRepository, SqlxFormSubmissionRepository,
    SqlxMediaRepository, SqlxPageRepository, SqlxPostRepository, SqlxProductRepository, SqlxServiceRepository,
    SqlxSessionRepository, SqlxTestimonialRepository, SqlxTwoFactorRepository, SqlxUserRepository,
};
use crate::db::DbPool;
use crate::services::{
    AccountService, CategoryService, ContentService, FormSubmissionService, HubSpotClient, LoginRateLimiter,
    Mailer, MediaService, ObjectStorage, PageService, ServiceCatalog, TurnstileVerifier, TwoFactorService,
    UserService,
};

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: DbPool,
    pub user_service: Arc<UserService>,
    pub two_factor: Arc<TwoFactorService>,
    pub category_service: Arc<CategoryService>,
    pub page_service: Arc<PageService>,
    pub service_catalog: Arc<ServiceCatalog>,
    pub content_service: Arc<ContentService>,
    pub media_service: Arc<MediaService>,
    pub form_service: Arc<FormSubmissionService>,
    pub account_service: Arc<AccountService>,
}

impl AppState {
    /// Wire repositories, integrations and services over one pool
    pub fn build(config: Config, pool: DbPool) -> Result<Self> {
        let storage = Arc::new(ObjectStorage::from_config(&config.storage)?);
        Self::build_with_storage(config, pool, storage)
    }

    pub fn build_with_storage(config: Config, pool: DbPool, storage: Arc<ObjectStorage>) -> Result<Self> {
        let cache = create_cache(&config.cache);

        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let category_repo = SqlxCategoryRepository::boxed(pool.clone());
        let service_repo = SqlxServiceRepository::boxed(pool.clone());
        let campaign_repo = SqlxCampaignRepository::boxed(pool.clone());

        let two_factor = Arc::new(TwoFactorService::new(
            user_repo.clone(),
            SqlxTwoFactorRepository::boxed(pool.clone()),
            &config.security,
        )?);
        let user_service = Arc::new(
            UserService::new(
                user_repo,
                SqlxSessionRepository::boxed(pool.clone()),
                two_factor.clone(),
                Arc::new(LoginRateLimiter::new()),
            )
            .with_session_days(config.security.session_days),
        );

        let mailer = Arc::new(Mailer::from_config(&config.mail)?);
        let form_service = Arc::new(FormSubmissionService::new(
            SqlxFormSubmissionRepository::boxed(pool.clone()),
            campaign_repo.clone(),
            Arc::new(TurnstileVerifier::new(&config.integrations.turnstile)?),
            Arc::new(HubSpotClient::new(&config.integrations.hubspot)?),
            mailer.clone(),
        ));

        Ok(Self {
            category_service: Arc::new(CategoryService::new(
                category_repo.clone(),
                service_repo.clone(),
                cache.clone(),
            )),
            page_service: Arc::new(PageService::new(SqlxPageRepository::boxed(pool.clone()), cache.clone())),
            service_catalog: Arc::new(ServiceCatalog::new(service_repo, category_repo, cache.clone())),
            content_service: Arc::new(ContentService::new(
                SqlxProductRepository::boxed(pool.clone()),
                SqlxPostRepository::boxed(pool.clone()),
                SqlxTestimonialRepository::boxed(pool.clone()),
                campaign_repo,
                cache.clone(),
            )),
            media_service: Arc::new(MediaService::new(
                SqlxMediaRepository::boxed(pool.clone()),
                storage,
                config.upload.clone(),
                config.images.clone(),
            )),
            account_service: Arc::new(AccountService::new(
                SqlxAccountRepository::boxed(pool.clone()),
                mailer,
                cache,
            )),
            form_service,
            user_service,
            two_factor,
            config: Arc::new(config),
            pool,
        })
    }
}
