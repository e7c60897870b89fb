pub mod db;
pub mod identity;
pub mod inference;

pub use db::PgDataService;
pub use identity::PgIdentityProvider;
pub use inference::{OpenAiInferenceAdapter, UnconfiguredInference};
