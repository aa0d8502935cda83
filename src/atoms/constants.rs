// ── Phantom State Atoms: Constants ─────────────────────────────────────────
// Default limits and configuration values shared across the engine.

/// Default maximum number of facts returned by a state query.
pub const DEFAULT_FACT_LIMIT: usize = 50;

/// Default maximum number of memories returned by a state query.
pub const DEFAULT_MEMORY_LIMIT: usize = 20;

/// Default maximum number of corpus chunks returned by a query.
pub const DEFAULT_CORPUS_LIMIT: usize = 20;

/// Default embedding width. Matches the bundled potion-base-8M static model.
pub const DEFAULT_VECTOR_DIMENSIONS: usize = 256;

/// Default local embedding model directory.
pub const DEFAULT_LOCAL_MODEL_PATH: &str = "models/potion-base-8M";

/// Default remote embedding model identifier.
pub const DEFAULT_REMOTE_MODEL: &str = "text-embedding-3-small";

/// Default base URL for the remote embedding API.
pub const DEFAULT_REMOTE_BASE_URL: &str = "https://api.openai.com";

/// Environment variable consulted for the remote API key.
pub const REMOTE_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Key under which the store pins its vector width in `engine_config`.
pub const DIMENSIONS_CONFIG_KEY: &str = "vector_dimensions";
