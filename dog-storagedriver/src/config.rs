use std::collections::HashMap;
use std::env;

use crate::{DriverError, DriverResult};

/// Parameters handed to a driver constructor by the host registry
pub type DriverParameters = HashMap<String, String>;

/// Regions an S3 driver may be pointed at
pub const KNOWN_REGIONS: &[&str] = &[
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
    "us-gov-west-1",
    "ca-central-1",
    "sa-east-1",
    "eu-west-1",
    "eu-west-2",
    "eu-west-3",
    "eu-central-1",
    "eu-north-1",
    "ap-south-1",
    "ap-southeast-1",
    "ap-southeast-2",
    "ap-northeast-1",
    "ap-northeast-2",
    "ap-northeast-3",
    "cn-north-1",
    "cn-northwest-1",
];

/// Store-imposed constants that drive chunk planning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRules {
    /// Smallest part the store accepts (every part but the last)
    pub min_part_size: u64,

    /// Most parts a single multipart session may hold
    pub max_parts: u64,
}

impl Default for ChunkRules {
    fn default() -> Self {
        Self {
            min_part_size: 5 * 1024 * 1024, // 5MB
            max_parts: 1000,
        }
    }
}

impl ChunkRules {
    /// Create new chunk rules
    pub fn new() -> Self {
        Self::default()
    }

    /// Set minimum part size
    pub fn with_min_part_size(mut self, bytes: u64) -> Self {
        self.min_part_size = bytes;
        self
    }

    /// Set max parts
    pub fn with_max_parts(mut self, max: u64) -> Self {
        self.max_parts = max;
        self
    }
}

/// Configuration for the S3 driver
#[derive(Clone)]
pub struct S3DriverConfig {
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    pub bucket: String,

    /// Ask the store for server-side encryption on every write
    pub encrypt: bool,

    /// S3-compatible endpoint; switches the client to path-style addressing
    pub endpoint: Option<String>,

    pub chunk_rules: ChunkRules,
}

impl std::fmt::Debug for S3DriverConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3DriverConfig")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("region", &self.region)
            .field("bucket", &self.bucket)
            .field("encrypt", &self.encrypt)
            .field("endpoint", &self.endpoint)
            .field("chunk_rules", &self.chunk_rules)
            .finish()
    }
}

impl S3DriverConfig {
    /// Build a validated config from registry parameters.
    ///
    /// Required keys: `accesskey`, `secretkey`, `region`, `bucket`, `encrypt`.
    /// Optional: `endpoint`.
    pub fn from_parameters(parameters: &DriverParameters) -> DriverResult<Self> {
        fn required<'a>(parameters: &'a DriverParameters, key: &str) -> DriverResult<&'a str> {
            match parameters.get(key).map(|v| v.trim()) {
                Some(value) if !value.is_empty() => Ok(value),
                _ => Err(DriverError::invalid_parameter(format!(
                    "No {} parameter provided",
                    key
                ))),
            }
        }

        let access_key = required(parameters, "accesskey")?;
        let secret_key = required(parameters, "secretkey")?;
        let region = required(parameters, "region")?;
        let bucket = required(parameters, "bucket")?;

        let encrypt = parameters
            .get("encrypt")
            .ok_or_else(|| DriverError::invalid_parameter("No encrypt parameter provided"))?;
        let encrypt = parse_bool(encrypt).ok_or_else(|| {
            DriverError::invalid_parameter(format!(
                "Unable to parse the encrypt parameter: {:?}",
                encrypt
            ))
        })?;

        let mut config = Self::new(access_key, secret_key, region, bucket, encrypt)?;
        if let Some(endpoint) = parameters.get("endpoint").filter(|e| !e.trim().is_empty()) {
            config = config.with_endpoint(endpoint.trim());
        }
        Ok(config)
    }

    /// Build a config from `DOG_S3_*` environment variables
    pub fn from_env() -> DriverResult<Self> {
        const VARS: &[(&str, &str)] = &[
            ("accesskey", "DOG_S3_ACCESS_KEY"),
            ("secretkey", "DOG_S3_SECRET_KEY"),
            ("region", "DOG_S3_REGION"),
            ("bucket", "DOG_S3_BUCKET"),
            ("encrypt", "DOG_S3_ENCRYPT"),
            ("endpoint", "DOG_S3_ENDPOINT"),
        ];

        let parameters = VARS
            .iter()
            .filter_map(|(key, var)| env::var(var).ok().map(|v| (key.to_string(), v)))
            .collect();

        Self::from_parameters(&parameters)
    }

    /// Create a config, validating the region and the required strings
    pub fn new<S: Into<String>>(
        access_key: S,
        secret_key: S,
        region: S,
        bucket: S,
        encrypt: bool,
    ) -> DriverResult<Self> {
        let region = region.into();
        if !KNOWN_REGIONS.contains(&region.as_str()) {
            return Err(DriverError::invalid_parameter(format!(
                "Invalid region provided: {}",
                region
            )));
        }

        let config = Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            region,
            bucket: bucket.into(),
            encrypt,
            endpoint: None,
            chunk_rules: ChunkRules::default(),
        };

        for (name, value) in [
            ("accesskey", &config.access_key),
            ("secretkey", &config.secret_key),
            ("bucket", &config.bucket),
        ] {
            if value.is_empty() {
                return Err(DriverError::invalid_parameter(format!(
                    "No {} parameter provided",
                    name
                )));
            }
        }

        Ok(config)
    }

    /// Point the driver at an S3-compatible endpoint
    pub fn with_endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Override the store's part constants
    pub fn with_chunk_rules(mut self, rules: ChunkRules) -> Self {
        self.chunk_rules = rules;
        self
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" => Some(true),
        "0" | "f" | "false" => Some(false),
        _ => None,
    }
}
