//! # marinade-anchor
//!
//! Re-locates generated text spans inside documents that keep changing.
//!
//! This crate provides:
//! - [`find_span`]: literal search disambiguated by surrounding context
//! - [`locate`]: maps a suggestion's content to a concrete [`Anchor`]
//! - [`apply`]: produces the edited document for text-edit suggestions
//!
//! Nothing here fails loudly: a span that can no longer be found yields
//! `None`, and the caller simply does not render that suggestion.
//!
//! ## Example
//!
//! ```
//! use marinade_anchor::find_span;
//!
//! let doc = "AAA foo BBB foo CCC";
//! assert_eq!(find_span("foo", "BBB ", " CCC", doc), Some(12..15));
//! ```

pub mod matcher;
pub mod resolve;

pub use matcher::{context_score, find_span, EXACT_CONTEXT_BONUS};
pub use resolve::{apply, locate, Anchor};
