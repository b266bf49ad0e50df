//! Data models
//!
//! Database entities, API input types and small domain helpers that do not
//! need storage access.

mod account;
mod campaign;
mod category;
mod form;
mod media;
mod page;
mod post;
mod product;
mod service;
mod session;
mod testimonial;
mod user;

pub use account::{
    Address, AddressInput, Order, OrderItem, OrderLineInput, OrderStatus, PlaceOrderInput,
};
pub use campaign::{
    Campaign, CampaignVariant, CampaignWithVariants, CreateCampaignInput, CreateVariantInput,
    UpdateCampaignInput,
};
pub use category::{Category, CategoryTree, CreateCategoryInput, UpdateCategoryInput};
pub use form::{FormSubmission, SubmissionStatus, SubmitFormInput};
pub use media::{Media, MediaVariant, MediaWithUrls, VariantKind, VariantUrl};
pub use page::{CreatePageInput, Page, PageTree, PublishStatus, UpdatePageInput};
pub use post::{CreatePostInput, Post, UpdatePostInput};
pub use product::{format_sek, CreateProductInput, Product, UpdateProductInput};
pub use service::{CreateServiceInput, Service, UpdateServiceInput};
pub use session::Session;
pub use testimonial::{CreateTestimonialInput, Testimonial, UpdateTestimonialInput};
pub use user::{CreateUserInput, UpdateUserInput, User, UserRole, UserStatus};

use serde::{Deserialize, Deserializer};

/// For `Option<Option<T>>` patch fields: a missing key stays `None`, an
/// explicit `null` becomes `Some(None)`. Pair with `#[serde(default)]`.
pub(crate) fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
