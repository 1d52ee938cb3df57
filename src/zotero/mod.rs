// src/zotero/mod.rs
// Zotero library access and CSL style retrieval

pub mod client;
pub mod records;
pub mod source;
pub mod styles;
pub mod suggest;

pub use client::ZoteroClient;
pub use records::{
    AttachmentInfo, CollectionNode, ItemDetails, ItemSummary, collection_tree, item_details,
    pick_attachment, summarize_item,
};
pub use source::{
    ExportFormat, ExportScope, FetchOptions, LibrarySource, QueryMode, SearchQuery,
    UpstreamPayload,
};
pub use styles::{FetchedStyle, StyleFetcher};
pub use suggest::{Suggestion, SuggestionCache};
