use super::parsing::{
    env_optional, env_or_default, is_supported_upload_type, parse_bool, parse_cors_origins,
    parse_environment, parse_f64, parse_string_list, parse_u32, parse_u64, parse_usize,
};
use super::secret::load_or_create_secret_key;
use super::types::{
    AiSettings, ApiSettings, BatchSettings, ConfigError, CorsSettings, RuntimeSettings,
    SecuritySettings, ServerHost, ServerPort, ServerSettings, Settings, StoreSettings,
    TelemetrySettings, UploadSettings,
};

const MAX_AI_RETRIES: u32 = 10;

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("MARKER_HOST", "0.0.0.0");
        let port = env_or_default("MARKER_PORT", "8000");

        let environment =
            parse_environment(env_optional("MARKER_ENV").or_else(|| env_optional("ENVIRONMENT")));
        let strict_config =
            env_optional("MARKER_STRICT_CONFIG").map(|value| parse_bool(&value)).unwrap_or(false)
                || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "Script Marker API");
        let version = env_or_default("VERSION", env!("CARGO_PKG_VERSION"));
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        let secret_key = match env_optional("SECRET_KEY") {
            Some(value) => value,
            None => load_or_create_secret_key(),
        };

        let access_token_expire_minutes = parse_u64(
            "ACCESS_TOKEN_EXPIRE_MINUTES",
            env_or_default("ACCESS_TOKEN_EXPIRE_MINUTES", "10080"),
        )?;
        let algorithm = env_or_default("ALGORITHM", "HS256");

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let ai_api_key = env_or_default("OPENAI_API_KEY", "");
        let ai_base_url = env_or_default(
            "OPENAI_BASE_URL",
            "https://generativelanguage.googleapis.com/v1beta/openai",
        );
        let ai_model = env_or_default("AI_MODEL", "gemini-2.5-flash");
        let ai_max_tokens = parse_u32("AI_MAX_TOKENS", env_or_default("AI_MAX_TOKENS", "8192"))?;
        let ai_temperature = parse_f64("AI_TEMPERATURE", env_or_default("AI_TEMPERATURE", "0.2"))?;
        let ai_request_timeout =
            parse_u64("AI_REQUEST_TIMEOUT", env_or_default("AI_REQUEST_TIMEOUT", "300"))?;
        let ai_max_retries = parse_u32("AI_MAX_RETRIES", env_or_default("AI_MAX_RETRIES", "2"))?;

        let max_upload_size_mb =
            parse_u64("MAX_UPLOAD_SIZE_MB", env_or_default("MAX_UPLOAD_SIZE_MB", "10"))?;
        let allowed_types = parse_string_list(
            env_optional("ALLOWED_UPLOAD_TYPES"),
            &["png", "jpeg", "webp", "pdf"],
        );
        let max_scripts_per_batch =
            parse_u64("MAX_SCRIPTS_PER_BATCH", env_or_default("MAX_SCRIPTS_PER_BATCH", "60"))?;

        let max_concurrent_marking =
            parse_usize("MAX_CONCURRENT_MARKING", env_or_default("MAX_CONCURRENT_MARKING", "0"))?;

        let school_store_path = env_optional("SCHOOL_STORE_PATH");

        let log_level = env_or_default("MARKER_LOG_LEVEL", "info");
        let json = env_optional("MARKER_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, version, api_v1_str },
            security: SecuritySettings { secret_key, access_token_expire_minutes, algorithm },
            cors: CorsSettings { origins: cors_origins },
            ai: AiSettings {
                api_key: ai_api_key,
                base_url: ai_base_url,
                model: ai_model,
                max_tokens: ai_max_tokens,
                temperature: ai_temperature,
                request_timeout_seconds: ai_request_timeout,
                max_retries: ai_max_retries,
            },
            uploads: UploadSettings { max_upload_size_mb, allowed_types, max_scripts_per_batch },
            batch: BatchSettings { max_concurrent_marking },
            store: StoreSettings { school_store_path },
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

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn security(&self) -> &SecuritySettings {
        &self.security
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn ai(&self) -> &AiSettings {
        &self.ai
    }

    pub(crate) fn uploads(&self) -> &UploadSettings {
        &self.uploads
    }

    pub(crate) fn batch(&self) -> &BatchSettings {
        &self.batch
    }

    pub(crate) fn store(&self) -> &StoreSettings {
        &self.store
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.uploads.allowed_types.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "ALLOWED_UPLOAD_TYPES",
                value: String::from("<empty>"),
            });
        }

        for kind in &self.uploads.allowed_types {
            if !is_supported_upload_type(kind) {
                return Err(ConfigError::InvalidValue {
                    field: "ALLOWED_UPLOAD_TYPES",
                    value: kind.clone(),
                });
            }
        }

        if self.uploads.max_upload_size_mb == 0 {
            return Err(ConfigError::InvalidValue {
                field: "MAX_UPLOAD_SIZE_MB",
                value: "0".to_string(),
            });
        }

        if self.uploads.max_scripts_per_batch == 0 {
            return Err(ConfigError::InvalidValue {
                field: "MAX_SCRIPTS_PER_BATCH",
                value: "0".to_string(),
            });
        }

        if self.batch.max_concurrent_marking > tokio::sync::Semaphore::MAX_PERMITS {
            return Err(ConfigError::InvalidValue {
                field: "MAX_CONCURRENT_MARKING",
                value: self.batch.max_concurrent_marking.to_string(),
            });
        }

        if self.ai.max_retries > MAX_AI_RETRIES {
            return Err(ConfigError::InvalidValue {
                field: "AI_MAX_RETRIES",
                value: self.ai.max_retries.to_string(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.ai.api_key.is_empty() {
            return Err(ConfigError::MissingSecret("OPENAI_API_KEY"));
        }
        if self.ai.base_url.is_empty() {
            return Err(ConfigError::MissingSecret("OPENAI_BASE_URL"));
        }

        Ok(())
    }
}
