//! Everything about the explanation text itself: the options the user picks, the request body
//! sent to the explanation service, and local reshaping of the answer.

pub mod options;
pub mod payload;
pub mod style;

pub use options::{ExplainOptions, ExplainStyle, ReadingLevel};
pub use payload::ExplainRequestPayload;
pub use style::apply_style_and_level;
