//! Page extraction for the odds site

pub mod html;

pub use html::{ExtractorError, HtmlPageExtractor};
