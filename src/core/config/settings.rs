use super::parsing::{
    env_optional, env_or_default, normalize_pem, parse_authorized_parties, parse_bool,
    parse_cors_origins, parse_environment, parse_u16, parse_u32, parse_u64,
};
use super::types::{
    AiSettings, ConfigError, CorsSettings, DatabaseSettings, IdentitySettings, RuntimeSettings,
    ServerHost, ServerPort, ServerSettings, Settings, TelemetrySettings, UploadSettings,
};

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("QUIZGEN_HOST", "0.0.0.0");
        let port = env_or_default("QUIZGEN_PORT", "8000");

        let environment =
            parse_environment(env_optional("QUIZGEN_ENV").or_else(|| env_optional("ENVIRONMENT")));
        let strict_config =
            env_optional("QUIZGEN_STRICT_CONFIG").map(|value| parse_bool(&value)).unwrap_or(false)
                || environment.is_production();

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "postgres");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "quizgen");
        let database_url = env_optional("DATABASE_URL");
        let max_connections = parse_u32(
            "DATABASE_MAX_CONNECTIONS",
            env_or_default("DATABASE_MAX_CONNECTIONS", "10"),
        )?;

        let openai_api_key = env_or_default("OPENAI_API_KEY", "");
        let openai_base_url = env_or_default("OPENAI_BASE_URL", "https://api.openai.com/v1");
        let generation_model = env_or_default("AI_GENERATION_MODEL", "gpt-4o-mini");
        let grading_model = env_or_default("AI_GRADING_MODEL", "gpt-4o");
        let explanation_model = env_or_default("AI_EXPLANATION_MODEL", "gpt-4o");
        let request_timeout =
            parse_u64("AI_REQUEST_TIMEOUT", env_or_default("AI_REQUEST_TIMEOUT", "600"))?;

        let clerk_secret_key = env_or_default("CLERK_SECRET_KEY", "");
        let clerk_api_url = env_or_default("CLERK_API_URL", "https://api.clerk.com/v1");
        let clerk_jwt_key = env_optional("CLERK_JWT_KEY").map(normalize_pem);
        let authorized_parties = parse_authorized_parties(env_optional("CLERK_AUTHORIZED_PARTIES"));

        let max_upload_size_mb =
            parse_u64("MAX_UPLOAD_SIZE_MB", env_or_default("MAX_UPLOAD_SIZE_MB", "20"))?;

        let log_level = env_or_default("QUIZGEN_LOG_LEVEL", "info");
        let json = env_optional("QUIZGEN_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            cors: CorsSettings { origins: cors_origins },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
                max_connections,
            },
            ai: AiSettings {
                openai_api_key,
                openai_base_url,
                generation_model,
                grading_model,
                explanation_model,
                request_timeout,
            },
            identity: IdentitySettings {
                secret_key: clerk_secret_key,
                api_url: clerk_api_url,
                jwt_key: clerk_jwt_key,
                authorized_parties,
            },
            uploads: UploadSettings { max_upload_size_mb },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;
        Ok(settings)
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host.0, self.server.port.0)
    }

    pub(crate) fn server_host(&self) -> &str {
        &self.server.host.0
    }

    pub(crate) fn server_port(&self) -> u16 {
        self.server.port.0
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn ai(&self) -> &AiSettings {
        &self.ai
    }

    pub(crate) fn identity(&self) -> &IdentitySettings {
        &self.identity
    }

    pub(crate) fn uploads(&self) -> &UploadSettings {
        &self.uploads
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database.max_connections == 0 {
            return Err(ConfigError::InvalidValue {
                field: "DATABASE_MAX_CONNECTIONS",
                value: "0".to_string(),
            });
        }

        if self.uploads.max_upload_size_mb == 0 {
            return Err(ConfigError::InvalidValue {
                field: "MAX_UPLOAD_SIZE_MB",
                value: "0".to_string(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("DATABASE_URL/POSTGRES_PASSWORD"));
        }
        if self.ai.openai_api_key.is_empty() {
            return Err(ConfigError::MissingSecret("OPENAI_API_KEY"));
        }
        if self.identity.secret_key.is_empty() && self.identity.jwt_key.is_none() {
            return Err(ConfigError::MissingSecret("CLERK_SECRET_KEY/CLERK_JWT_KEY"));
        }

        Ok(())
    }
}
