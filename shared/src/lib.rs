mod languages;
mod payload;

pub mod provider;

pub use languages::*;
pub use payload::*;
pub use provider::MalformedPayload;
