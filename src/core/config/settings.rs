use super::parsing::{
    default_consumer_name, env_optional, env_or_default, parse_bool, parse_cors_origins,
    parse_environment, parse_string_list, parse_u16, parse_u64, parse_usize,
};
use super::secret::load_or_create_secret_key;
use super::types::{
    ApiSettings, BrokerSettings, ConfigError, CorsSettings, DatabaseSettings, RealtimeSettings,
    ReconcileSettings, RedisSettings, RuntimeSettings, S3Settings, SecuritySettings, ServerHost,
    ServerPort, ServerSettings, Settings, StorageSettings, TelemetrySettings,
};

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("GRADEFLOW_HOST", "0.0.0.0");
        let port = env_or_default("GRADEFLOW_PORT", "8000");

        let environment = parse_environment(
            env_optional("GRADEFLOW_ENV").or_else(|| env_optional("ENVIRONMENT")),
        );
        let strict_config = env_optional("GRADEFLOW_STRICT_CONFIG")
            .map(|value| parse_bool(&value))
            .unwrap_or(false)
            || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "Gradeflow API");
        let version = env_or_default("VERSION", env!("CARGO_PKG_VERSION"));
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        let secret_key = match env_optional("SECRET_KEY") {
            Some(value) => value,
            None => load_or_create_secret_key(),
        };
        let algorithm = env_or_default("ALGORITHM", "HS256");

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "gradeflow");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "gradeflow");
        let database_url = env_optional("DATABASE_URL");
        let db_timeout_seconds =
            parse_u64("DB_TIMEOUT_SECONDS", env_or_default("DB_TIMEOUT_SECONDS", "3"))?;
        let db_max_connections =
            parse_u64("DB_MAX_CONNECTIONS", env_or_default("DB_MAX_CONNECTIONS", "20"))?;

        let redis_host = env_or_default("REDIS_HOST", "localhost");
        let redis_port = parse_u16("REDIS_PORT", env_or_default("REDIS_PORT", "6379"))?;
        let redis_db = parse_u16("REDIS_DB", env_or_default("REDIS_DB", "0"))?;
        let redis_password = env_or_default("REDIS_PASSWORD", "");
        let redis_reconnect_seconds =
            parse_u64("REDIS_RECONNECT_SECONDS", env_or_default("REDIS_RECONNECT_SECONDS", "5"))?;

        let submissions_queue = env_or_default("SUBMISSIONS_QUEUE", "submissions");
        let status_updates_queue =
            env_or_default("STATUS_UPDATES_QUEUE", "submission-real-time-updates");
        let broker_group = env_or_default("BROKER_GROUP", "gradeflow");
        let consumer_name =
            env_optional("BROKER_CONSUMER_NAME").unwrap_or_else(default_consumer_name);
        let prefetch = parse_usize("BROKER_PREFETCH", env_or_default("BROKER_PREFETCH", "4"))?;
        let block_millis =
            parse_u64("BROKER_BLOCK_MILLIS", env_or_default("BROKER_BLOCK_MILLIS", "2000"))?;

        let max_upload_size_mb =
            parse_u64("MAX_UPLOAD_SIZE_MB", env_or_default("MAX_UPLOAD_SIZE_MB", "20"))?;
        let allowed_archive_extensions =
            parse_string_list(env_optional("ALLOWED_ARCHIVE_EXTENSIONS"), &["zip"]);
        let archive_timeout_seconds = parse_u64(
            "ARCHIVE_TIMEOUT_SECONDS",
            env_or_default("ARCHIVE_TIMEOUT_SECONDS", "10"),
        )?;
        let submit_rate_limit =
            parse_u64("SUBMIT_RATE_LIMIT", env_or_default("SUBMIT_RATE_LIMIT", "10"))?;
        let submit_rate_window_seconds = parse_u64(
            "SUBMIT_RATE_WINDOW_SECONDS",
            env_or_default("SUBMIT_RATE_WINDOW_SECONDS", "60"),
        )?;

        let s3_endpoint = env_or_default("S3_ENDPOINT", "http://localhost:9000");
        let s3_access_key = env_or_default("S3_ACCESS_KEY", "");
        let s3_secret_key = env_or_default("S3_SECRET_KEY", "");
        let s3_bucket = env_or_default("S3_BUCKET", "gradeflow-archives");
        let s3_region = env_or_default("S3_REGION", "us-east-1");

        let ingress_capacity = parse_usize(
            "REALTIME_INGRESS_CAPACITY",
            env_or_default("REALTIME_INGRESS_CAPACITY", "1024"),
        )?;
        let channel_capacity = parse_usize(
            "REALTIME_CHANNEL_CAPACITY",
            env_or_default("REALTIME_CHANNEL_CAPACITY", "16"),
        )?;
        let keep_alive_seconds =
            parse_u64("SSE_KEEP_ALIVE_SECONDS", env_or_default("SSE_KEEP_ALIVE_SECONDS", "15"))?;
        let max_stream_seconds =
            parse_u64("SSE_MAX_STREAM_SECONDS", env_or_default("SSE_MAX_STREAM_SECONDS", "3600"))?;

        let reconcile_interval_seconds = parse_u64(
            "RECONCILE_INTERVAL_SECONDS",
            env_or_default("RECONCILE_INTERVAL_SECONDS", "60"),
        )?;
        let stale_after_seconds = parse_u64(
            "PENDING_STALE_AFTER_SECONDS",
            env_or_default("PENDING_STALE_AFTER_SECONDS", "300"),
        )?;
        let batch_size =
            parse_u64("RECONCILE_BATCH_SIZE", env_or_default("RECONCILE_BATCH_SIZE", "100"))?;

        let log_level = env_or_default("GRADEFLOW_LOG_LEVEL", "info");
        let json = env_optional("GRADEFLOW_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, version, api_v1_str },
            security: SecuritySettings { secret_key, algorithm },
            cors: CorsSettings { origins: cors_origins },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
                timeout_seconds: db_timeout_seconds,
                max_connections: db_max_connections as u32,
            },
            redis: RedisSettings {
                host: redis_host,
                port: redis_port,
                db: redis_db,
                password: redis_password,
                reconnect_seconds: redis_reconnect_seconds,
            },
            broker: BrokerSettings {
                submissions_queue,
                status_updates_queue,
                group: broker_group,
                consumer_name,
                prefetch,
                block_millis,
            },
            storage: StorageSettings {
                max_upload_size_mb,
                allowed_archive_extensions,
                archive_timeout_seconds,
                submit_rate_limit,
                submit_rate_window_seconds,
            },
            s3: S3Settings {
                endpoint: s3_endpoint,
                access_key: s3_access_key,
                secret_key: s3_secret_key,
                bucket: s3_bucket,
                region: s3_region,
            },
            realtime: RealtimeSettings {
                ingress_capacity,
                channel_capacity,
                keep_alive_seconds,
                max_stream_seconds,
            },
            reconcile: ReconcileSettings {
                interval_seconds: reconcile_interval_seconds,
                stale_after_seconds,
                batch_size: batch_size as i64,
            },
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

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn redis(&self) -> &RedisSettings {
        &self.redis
    }

    pub(crate) fn broker(&self) -> &BrokerSettings {
        &self.broker
    }

    pub(crate) fn storage(&self) -> &StorageSettings {
        &self.storage
    }

    pub(crate) fn s3(&self) -> &S3Settings {
        &self.s3
    }

    pub(crate) fn realtime(&self) -> &RealtimeSettings {
        &self.realtime
    }

    pub(crate) fn reconcile(&self) -> &ReconcileSettings {
        &self.reconcile
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=3).contains(&self.database.timeout_seconds) {
            return Err(ConfigError::InvalidValue {
                field: "DB_TIMEOUT_SECONDS",
                value: self.database.timeout_seconds.to_string(),
            });
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::InvalidValue {
                field: "DB_MAX_CONNECTIONS",
                value: self.database.max_connections.to_string(),
            });
        }

        if self.redis.reconnect_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "REDIS_RECONNECT_SECONDS",
                value: self.redis.reconnect_seconds.to_string(),
            });
        }

        if self.storage.allowed_archive_extensions.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "ALLOWED_ARCHIVE_EXTENSIONS",
                value: String::from("<empty>"),
            });
        }

        if self.broker.submissions_queue == self.broker.status_updates_queue {
            return Err(ConfigError::InvalidValue {
                field: "STATUS_UPDATES_QUEUE",
                value: self.broker.status_updates_queue.clone(),
            });
        }

        if self.broker.prefetch == 0 {
            return Err(ConfigError::InvalidValue {
                field: "BROKER_PREFETCH",
                value: self.broker.prefetch.to_string(),
            });
        }

        if self.reconcile.batch_size <= 0 {
            return Err(ConfigError::InvalidValue {
                field: "RECONCILE_BATCH_SIZE",
                value: self.reconcile.batch_size.to_string(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }

        if self.s3.access_key.is_empty() || self.s3.secret_key.is_empty() {
            return Err(ConfigError::MissingSecret("S3_ACCESS_KEY/S3_SECRET_KEY"));
        }

        Ok(())
    }
}
