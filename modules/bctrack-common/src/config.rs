use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,

    // Web server
    pub web_host: String,
    pub web_port: u16,

    // Source fetching
    pub user_agent: String,
    pub fetch_timeout_secs: u64,
    pub fetch_retries: u32,
    /// Max posts whose comment trees are walked per cycle.
    pub comment_fetch_cap: i64,
}

impl Config {
    /// Load configuration from environment variables, with local-dev defaults.
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://data/bctrack.db?mode=rwc".to_string()),
            web_host: env::var("WEB_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            web_port: env::var("WEB_PORT")
                .unwrap_or_else(|_| "8050".to_string())
                .parse()
                .expect("WEB_PORT must be a number"),
            user_agent: env::var("TRACKER_USER_AGENT").unwrap_or_else(|_| {
                "bctrack/0.1 (contraceptive mention tracker)".to_string()
            }),
            fetch_timeout_secs: 30,
            fetch_retries: 3,
            comment_fetch_cap: 50,
        }
    }
}

/// Per-forum source configuration.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub name: &'static str,
    /// Posts requested from the "new" listing. The "hot" listing is capped
    /// at 50 regardless.
    pub page_limit: u32,
}

/// The fixed set of forums scanned each cycle. The primary community gets a
/// deeper page; adjacent communities get a shallower one.
pub fn sources() -> Vec<SourceConfig> {
    vec![
        SourceConfig { name: "birthcontrol", page_limit: 200 },
        SourceConfig { name: "TwoXChromosomes", page_limit: 100 },
        SourceConfig { name: "abortion", page_limit: 100 },
        SourceConfig { name: "prochoice", page_limit: 100 },
        SourceConfig { name: "prolife", page_limit: 100 },
        SourceConfig { name: "sex", page_limit: 100 },
        SourceConfig { name: "AskDocs", page_limit: 100 },
        SourceConfig { name: "WomensHealth", page_limit: 100 },
    ]
}
