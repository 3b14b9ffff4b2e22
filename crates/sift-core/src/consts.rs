/// The name of the hidden index folder (like .git)
pub const INDEX_DIR: &str = ".sift";

/// Vector store location inside the index folder
pub const VECTORS_DIR: &str = "vectors";

/// Manifest file name inside the index folder
pub const MANIFEST_FILE: &str = "manifest.json";

/// Config file name inside the index folder
pub const CONFIG_FILE: &str = "config.json";

/// Advisory writer lock, placed next to the index folder
pub const LOCK_FILE: &str = ".sift.lock";

/// Default embedding model (small, fast, general purpose)
pub const DEFAULT_MODEL: &str = "all-MiniLM-L6-v2";

/// Default number of blocks per embedding batch
pub const DEFAULT_BATCH_SIZE: usize = 128;

/// Default chunk size in characters (roughly ~512 tokens)
pub const DEFAULT_CHUNK_SIZE: usize = 2000;

/// Default chunk overlap in characters
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Default max file size (1MB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024;

/// Length of the truncated content hash stored in the manifest
pub const HASH_LEN: usize = 16;
