//! Filesystem configuration
//!
//! Options are resolved through a layered lookup. Highest wins:
//! an explicit fluent setter, the overrides map given at construction,
//! the process property table ([`crate::props`]), the environment variable
//! derived from the option name, and finally the built-in default.

use std::collections::HashMap;

use crate::error::{KfsError, KfsResult};
use crate::props;
use crate::uri::validate_bucket_name;

/// Size of each read-ahead fragment.
pub const READ_MAX_FRAGMENT_SIZE: &str = "s3.spi.read.max-fragment-size";
/// Maximum number of fragments held in a read-ahead window.
pub const READ_MAX_FRAGMENT_NUMBER: &str = "s3.spi.read.max-fragment-number";
/// Endpoint override, `host` or `host:port`. Empty means the service default.
pub const ENDPOINT: &str = "s3.spi.endpoint";
/// Scheme used when building the endpoint override URI.
pub const ENDPOINT_PROTOCOL: &str = "s3.spi.endpoint-protocol";
/// Path-style vs virtual-host-style addressing.
pub const FORCE_PATH_STYLE: &str = "s3.spi.force-path-style";
/// Bucket bound to the filesystem.
pub const BUCKET_NAME: &str = "s3.spi.bucket-name";
/// Region constraint applied when the bucket is created.
pub const LOCATION_CONSTRAINT: &str = "s3.spi.location-constraint";
/// Region of the target service.
pub const REGION: &str = "aws.region";
/// Access key, paired with [`SECRET_ACCESS_KEY`].
pub const ACCESS_KEY: &str = "aws.access-key";
/// Conventional alias for [`ACCESS_KEY`].
pub const ACCESS_KEY_ALIAS: &str = "aws.accessKeyId";
/// Secret key, required whenever the access key is set.
pub const SECRET_ACCESS_KEY: &str = "aws.secret-access-key";
/// Conventional alias for [`SECRET_ACCESS_KEY`].
pub const SECRET_ACCESS_KEY_ALIAS: &str = "aws.secretAccessKey";

pub const DEFAULT_READ_FRAGMENT_SIZE: usize = 5 * 1024 * 1024;
pub const DEFAULT_READ_FRAGMENT_NUMBER: usize = 50;
pub const DEFAULT_ENDPOINT_PROTOCOL: &str = "https";
pub const DEFAULT_FORCE_PATH_STYLE: bool = true;

/// Access credentials, only ever produced as a complete pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
}

/// Layered configuration for one filesystem.
#[derive(Debug, Clone, Default)]
pub struct S3Config {
    explicit: HashMap<String, String>,
    overrides: HashMap<String, String>,
}

/// Convert a dotted option name into the matching environment variable:
/// uppercase, `.` and `-` become `_`. Blank input yields the empty string.
pub fn convert_property_name_to_env_var(name: &str) -> String {
    let name = name.trim();
    if name.is_empty() {
        return String::new();
    }
    name.chars()
        .map(|c| match c {
            '.' | '-' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect()
}

fn validate_endpoint(endpoint: &str) -> KfsResult<()> {
    let invalid = || {
        KfsError::InvalidArgument(format!(
            "endpoint '{endpoint}' does not match format host:port where port is a number"
        ))
    };

    let (host, port) = match endpoint.split_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (endpoint, None),
    };
    if host.is_empty()
        || !host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
    {
        return Err(invalid());
    }
    if let Some(port) = port {
        if port.is_empty() || port.parse::<u16>().is_err() {
            return Err(invalid());
        }
    }
    Ok(())
}

impl S3Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a configuration over an overrides map, usually the options
    /// passed to `new_file_system`.
    pub fn with_overrides(overrides: HashMap<String, String>) -> Self {
        Self {
            explicit: HashMap::new(),
            overrides,
        }
    }

    /// Resolve an option through the full precedence chain.
    pub fn get(&self, name: &str) -> Option<String> {
        if let Some(v) = self.explicit.get(name) {
            return Some(v.clone());
        }
        if let Some(v) = self.overrides.get(name) {
            return Some(v.clone());
        }
        if let Some(v) = props::property(name) {
            return Some(v);
        }
        std::env::var(convert_property_name_to_env_var(name)).ok()
    }

    fn get_aliased(&self, name: &str, alias: &str) -> Option<String> {
        self.get(name).or_else(|| self.get(alias))
    }

    fn positive_or_default(&self, name: &str, default: usize) -> usize {
        match self.get(name) {
            None => default,
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    tracing::debug!(option = name, value = %raw, "unparseable numeric option, using default");
                    default
                }
            },
        }
    }

    pub fn read_fragment_size(&self) -> usize {
        self.positive_or_default(READ_MAX_FRAGMENT_SIZE, DEFAULT_READ_FRAGMENT_SIZE)
    }

    pub fn read_fragment_number(&self) -> usize {
        self.positive_or_default(READ_MAX_FRAGMENT_NUMBER, DEFAULT_READ_FRAGMENT_NUMBER)
    }

    /// Endpoint override as configured, empty when the service default applies.
    pub fn endpoint(&self) -> String {
        self.get(ENDPOINT).map(|v| v.trim().to_string()).unwrap_or_default()
    }

    pub fn endpoint_protocol(&self) -> KfsResult<String> {
        let protocol = self
            .get(ENDPOINT_PROTOCOL)
            .map(|v| v.trim().to_ascii_lowercase())
            .unwrap_or_else(|| DEFAULT_ENDPOINT_PROTOCOL.to_string());
        match protocol.as_str() {
            "http" | "https" => Ok(protocol),
            other => Err(KfsError::InvalidArgument(format!(
                "endpoint protocol '{other}' must be http or https"
            ))),
        }
    }

    /// `<protocol>://<endpoint>` when an endpoint override is configured.
    pub fn endpoint_uri(&self) -> KfsResult<Option<String>> {
        let endpoint = self.endpoint();
        if endpoint.is_empty() {
            return Ok(None);
        }
        Ok(Some(format!("{}://{}", self.endpoint_protocol()?, endpoint)))
    }

    pub fn region(&self) -> Option<String> {
        self.get(REGION)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    pub fn bucket_name(&self) -> Option<String> {
        self.get(BUCKET_NAME)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    pub fn location_constraint(&self) -> Option<String> {
        self.get(LOCATION_CONSTRAINT)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    pub fn force_path_style(&self) -> bool {
        match self.get(FORCE_PATH_STYLE) {
            None => DEFAULT_FORCE_PATH_STYLE,
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "true" => true,
                "false" => false,
                _ => DEFAULT_FORCE_PATH_STYLE,
            },
        }
    }

    /// The complete credential pair, or nothing when either half is missing.
    pub fn credentials(&self) -> Option<Credentials> {
        let access_key = self.get_aliased(ACCESS_KEY, ACCESS_KEY_ALIAS)?;
        let secret_key = self.get_aliased(SECRET_ACCESS_KEY, SECRET_ACCESS_KEY_ALIAS)?;
        Some(Credentials {
            access_key,
            secret_key,
        })
    }

    fn set_or_clear(&mut self, name: &str, value: Option<&str>) {
        match value.map(str::trim).filter(|v| !v.is_empty()) {
            Some(v) => {
                self.explicit.insert(name.to_string(), v.to_string());
            }
            None => {
                self.explicit.remove(name);
            }
        }
    }

    pub fn with_region<'a>(
        &mut self,
        region: impl Into<Option<&'a str>>,
    ) -> KfsResult<&mut Self> {
        self.set_or_clear(REGION, region.into());
        Ok(self)
    }

    pub fn with_endpoint<'a>(
        &mut self,
        endpoint: impl Into<Option<&'a str>>,
    ) -> KfsResult<&mut Self> {
        let endpoint = endpoint.into().map(str::trim).filter(|v| !v.is_empty());
        if let Some(endpoint) = endpoint {
            validate_endpoint(endpoint)?;
        }
        self.set_or_clear(ENDPOINT, endpoint);
        Ok(self)
    }

    pub fn with_endpoint_protocol<'a>(
        &mut self,
        protocol: impl Into<Option<&'a str>>,
    ) -> KfsResult<&mut Self> {
        let protocol = protocol
            .into()
            .map(|v| v.trim().to_ascii_lowercase())
            .filter(|v| !v.is_empty());
        if let Some(ref protocol) = protocol {
            if protocol != "http" && protocol != "https" {
                return Err(KfsError::InvalidArgument(format!(
                    "endpoint protocol '{protocol}' must be http or https"
                )));
            }
        }
        self.set_or_clear(ENDPOINT_PROTOCOL, protocol.as_deref());
        Ok(self)
    }

    pub fn with_read_fragment_size(
        &mut self,
        size: impl Into<Option<usize>>,
    ) -> KfsResult<&mut Self> {
        match size.into() {
            Some(0) => Err(KfsError::InvalidArgument(
                "read fragment size must be positive".into(),
            )),
            Some(n) => {
                self.explicit
                    .insert(READ_MAX_FRAGMENT_SIZE.to_string(), n.to_string());
                Ok(self)
            }
            None => {
                self.explicit.remove(READ_MAX_FRAGMENT_SIZE);
                Ok(self)
            }
        }
    }

    pub fn with_read_fragment_number(
        &mut self,
        count: impl Into<Option<usize>>,
    ) -> KfsResult<&mut Self> {
        match count.into() {
            Some(0) => Err(KfsError::InvalidArgument(
                "read fragment number must be positive".into(),
            )),
            Some(n) => {
                self.explicit
                    .insert(READ_MAX_FRAGMENT_NUMBER.to_string(), n.to_string());
                Ok(self)
            }
            None => {
                self.explicit.remove(READ_MAX_FRAGMENT_NUMBER);
                Ok(self)
            }
        }
    }

    pub fn with_bucket_name<'a>(
        &mut self,
        bucket: impl Into<Option<&'a str>>,
    ) -> KfsResult<&mut Self> {
        let bucket = bucket.into().map(str::trim).filter(|v| !v.is_empty());
        if let Some(bucket) = bucket {
            validate_bucket_name(bucket)?;
        }
        self.set_or_clear(BUCKET_NAME, bucket);
        Ok(self)
    }

    pub fn with_location_constraint<'a>(
        &mut self,
        constraint: impl Into<Option<&'a str>>,
    ) -> KfsResult<&mut Self> {
        self.set_or_clear(LOCATION_CONSTRAINT, constraint.into());
        Ok(self)
    }

    pub fn with_force_path_style(&mut self, force: bool) -> KfsResult<&mut Self> {
        self.explicit
            .insert(FORCE_PATH_STYLE.to_string(), force.to_string());
        Ok(self)
    }

    /// Set or clear the credential pair. A blank access key clears both
    /// halves; an access key without a secret is rejected.
    pub fn with_credentials<'a>(
        &mut self,
        access_key: impl Into<Option<&'a str>>,
        secret_key: impl Into<Option<&'a str>>,
    ) -> KfsResult<&mut Self> {
        let access_key = access_key.into().map(str::trim).filter(|v| !v.is_empty());
        let secret_key = secret_key.into().map(str::trim).filter(|v| !v.is_empty());
        match (access_key, secret_key) {
            (None, _) => {
                self.explicit.remove(ACCESS_KEY);
                self.explicit.remove(SECRET_ACCESS_KEY);
                Ok(self)
            }
            (Some(_), None) => Err(KfsError::InvalidArgument(
                "secret key is required when an access key is set".into(),
            )),
            (Some(access), Some(secret)) => {
                self.explicit
                    .insert(ACCESS_KEY.to_string(), access.to_string());
                self.explicit
                    .insert(SECRET_ACCESS_KEY.to_string(), secret.to_string());
                Ok(self)
            }
        }
    }

    /// Check values that may have arrived through the overrides map, the
    /// property table, or the environment. Filesystem construction calls
    /// this before binding.
    pub fn validate(&self) -> KfsResult<()> {
        self.endpoint_protocol()?;
        let endpoint = self.endpoint();
        if !endpoint.is_empty() {
            validate_endpoint(&endpoint)?;
        }
        if let Some(bucket) = self.bucket_name() {
            validate_bucket_name(&bucket)?;
        }
        Ok(())
    }
}
