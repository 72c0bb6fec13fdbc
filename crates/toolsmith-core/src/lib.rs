mod layer;
mod repository;
mod settings;

pub use layer::{
    classify_command_layer, is_system_path, layer_priority, nix_profile_bin_dir, tag_priority,
    Layer, NIX_STORE_DIR, SYSTEM_PREFIXES,
};
pub use repository::{CommandField, RepositoryRecord};
pub use settings::{
    expand_home, DirectorySettings, NixSettings, RetrySettings, Settings,
    DEFAULT_RATE_LIMIT_FINGERPRINTS,
};

#[cfg(test)]
mod tests;
