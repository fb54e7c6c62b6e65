/// Default server URL when none is configured.
const DEFAULT_BASE_URL: &str = "http://localhost:5984";
/// Default database holding the room documents.
const DEFAULT_DATABASE: &str = "common-mind";

/// Runtime configuration describing how to connect to CouchDB.
#[derive(Debug, Clone)]
pub struct CouchConfig {
    /// Server base URL, without a trailing slash.
    pub base_url: String,
    /// Database holding the room documents.
    pub database: String,
    /// Optional basic-auth user.
    pub username: Option<String>,
    /// Optional basic-auth password.
    pub password: Option<String>,
}

impl CouchConfig {
    /// Construct a configuration from explicit base URL and database name.
    pub fn new(base_url: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            database: database.into(),
            username: None,
            password: None,
        }
    }

    /// Attach basic-auth credentials to the configuration.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Build a configuration from the environment, falling back to a local
    /// development server.
    pub fn from_env() -> Self {
        let base_url =
            std::env::var("COUCH_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());
        let database = std::env::var("COUCH_DB").unwrap_or_else(|_| DEFAULT_DATABASE.into());

        let mut config = Self::new(base_url, database);
        if let (Some(username), Some(password)) = (
            std::env::var("COUCH_USERNAME").ok(),
            std::env::var("COUCH_PASSWORD").ok(),
        ) {
            config = config.with_credentials(username, password);
        }
        config
    }
}

impl Default for CouchConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL, DEFAULT_DATABASE)
    }
}
