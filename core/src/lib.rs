//! Domain logic for Revision Desk.
//!
//! Pure, synchronous steps of the processing pipeline plus the async
//! extractor entry point:
//!
//! - [`text_extract`] - plain text from PDF or text uploads
//! - [`extract`] - project code, amount and justification fields
//! - [`risk`] - risk score against the seed project
//! - [`presentation`] - decision briefs and knowledge-base entries

#![allow(clippy::missing_errors_doc)]

pub mod errors;
pub mod extract;
pub mod presentation;
#[cfg(feature = "pptx")]
mod pptx;
pub mod risk;
pub mod text_extract;

pub use errors::describe_provider_error;
pub use extract::{parse_revision_request, parse_try_amount, parse_with_rules};
pub use presentation::{
    Brief, Presentation, PresentationError, PresentationKind, find_presentation,
    generate_presentation, render_knowledge_base_entry, render_markdown_brief,
    write_knowledge_base_entry,
};
pub use risk::{NO_RISK_NOTE, assess_risk};
pub use text_extract::{ExtractError, extract_text, normalize_text};
