// src/export/mod.rs
// Document builds: formats, binary discovery, pandoc invocation and delivery

pub mod build;
pub mod command;
pub mod discovery;
pub mod format;
pub mod manual;

pub use build::{
    BuildArtifact, BuildEnvironment, BuildOutput, BuildRequest, BuildStatus, Delivery,
    build_documents,
};
pub use discovery::{
    ResolvedEngine, current_search_path, find_pandoc, probe_version, resolve_binary,
    resolve_pdf_engine,
};
pub use format::{OutputFormat, PdfEngine, derive_basename, parse_formats, sanitize_basename};
pub use manual::{ManualBuildKit, manual_build_kit};
