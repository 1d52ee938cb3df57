// src/bibliography/mod.rs
// Bibliography payload normalization, citekey extraction and reference validation

pub mod citation;
pub mod citekeys;
pub mod csl;
pub mod front_matter;
pub mod mapper;
pub mod normalize;
pub mod validate;

pub use citekeys::{CitekeyOccurrence, ExtractedCitekeys, Notation, extract_citekeys};
pub use csl::{
    BibliographyPayload, BibliographyShape, CslEntry, CslName, DiagnosticCode,
    NormalizedBibliography, classify, normalize_bibliography,
};
pub use normalize::{RawText, normalize_path, normalize_text, text_from_value};
pub use validate::{ValidationReport, validate_references};
