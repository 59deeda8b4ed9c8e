//! Validation of external identifiers cited in research.

pub mod doi;

pub use doi::{normalize_doi, DoiValidator, IdentifierValidator, DOI_HANDLE_API};
