pub mod settings;

pub use settings::Config;

/// Loads `.env` (if present) and reads the environment.
///
/// Callers apply their own overrides, then call [`Config::validate_and_log`].
pub fn load_config() -> Config {
    dotenv::dotenv().ok(); // missing .env is fine
    Config::from_env()
}
