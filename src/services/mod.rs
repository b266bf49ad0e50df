//! Services layer - Business logic
//!
//! Services enforce business rules and coordinate repositories, cache,
//! object storage and the outside integrations (Turnstile, HubSpot, SMTP).

pub mod account;
pub mod category;
pub mod content;
pub mod email;
pub mod form_submission;
pub mod hierarchy;
pub mod hubspot;
pub mod imaging;
pub mod markdown;
pub mod media;
pub mod page;
pub mod password;
pub mod random;
pub mod rate_limiter;
pub mod service_catalog;
pub mod storage;
pub mod turnstile;
pub mod two_factor;
pub mod user;
pub mod validation;

pub use account::{AccountService, AccountServiceError};
pub use category::{CategoryService, CategoryServiceError};
pub use content::{ContentService, ContentServiceError};
pub use email::Mailer;
pub use form_submission::{FormServiceError, FormSubmissionService};
pub use hubspot::HubSpotClient;
pub use markdown::MarkdownRenderer;
pub use media::{MediaService, MediaServiceError};
pub use page::{PageService, PageServiceError};
pub use password::{hash_password, verify_password};
pub use rate_limiter::LoginRateLimiter;
pub use service_catalog::{ServiceCatalog, ServiceCatalogError};
pub use storage::ObjectStorage;
pub use turnstile::{TurnstileError, TurnstileVerifier};
pub use two_factor::{GraceDecision, TwoFactorError, TwoFactorService};
pub use user::{LoginInput, LoginOutcome, RegisterInput, UserService, UserServiceError};
pub use validation::FieldErrors;
