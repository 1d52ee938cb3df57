// src/config/mod.rs
// Configuration loaded from the environment

pub mod env;

pub use env::{
    CacheConfig, ConfigValidation, EnvConfig, ExportConfig, FilesConfig, LibraryType, PathConfig,
    ServerConfig, SuggestConfig, ZoteroConfig,
};
