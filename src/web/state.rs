use crate::config::AppConfig;
use crate::pipeline::PipelineDeps;
use minijinja::Environment;

/// Shared application state for the web server
pub struct AppState {
    pub config: AppConfig,
    pub pipeline: PipelineDeps,
    pub template_env: Environment<'static>,
    pub startup_time: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(config: AppConfig, pipeline: PipelineDeps, template_env: Environment<'static>) -> Self {
        Self {
            config,
            pipeline,
            template_env,
            startup_time: chrono::Utc::now(),
        }
    }

    /// User id for a bearer token, if the token is known.
    pub fn user_for_token(&self, token: &str) -> Option<&str> {
        self.config.auth.tokens.get(token).map(String::as_str)
    }
}
