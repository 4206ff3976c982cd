// Adapters layer: concrete implementations of the domain ports.

pub mod gemini;
pub mod interactions;
pub mod storage;

pub use gemini::GeminiClient;
pub use interactions::JsonlInteractionStore;
pub use storage::LocalStorage;
