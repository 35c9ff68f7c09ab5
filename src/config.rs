//! Config for the LDAP groups lookup.
use std::{
	io::ErrorKind,
	path::{Path, PathBuf},
	sync::Arc,
	time::Duration,
};

use ldap3::LdapConnSettings;
use regex::{Captures, Regex};
use rustls::{Certificate, ClientConfig, PrivateKey, RootCertStore};
use serde::{Deserialize, Serialize};
use tracing::info;
use url::Url;

use crate::error::Error;

/// Environment variable that may name the configuration file to load.
pub const CONFIG_PATH_ENV: &str = "LDAP_GROUPS_LOOKUP_CONFIG";

/// Conventional location of the configuration file, relative to the working
/// directory of the process.
pub const DEFAULT_CONFIG_PATH: &str = "config/ldap_groups_lookup.yml";

/// Standard port of the LDAP protocol.
pub const DEFAULT_PORT: u16 = 389;

/// LDAP configuration.
///
/// Every key is optional in the serialized form. A configuration consisting
/// only of `enabled: false` is the disabled stub.
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct Config {
	/// Whether directory lookups are performed at all. When disabled, every
	/// lookup yields its empty default without contacting a server.
	pub enabled: bool,
	/// Host name of the directory server
	pub host: Option<String>,
	/// Port of the directory server
	pub port: u16,
	/// Credentials to bind with
	pub auth: AuthConfig,
	/// Complete low-level connection options. Takes precedence over `host`,
	/// `port` and `auth` when present.
	#[serde(alias = "config")]
	pub connection: Option<ConnectionConfig>,
	/// The base DN of all searches, e.g. `dc=example,dc=com`
	pub tree: String,
	/// Organizational unit holding accounts, relative to `tree`
	pub account_ou: String,
	/// Organizational unit holding groups, relative to `tree`
	pub group_ou: String,
	/// Substrings restricting which member DNs are treated as nested groups
	#[serde(alias = "member_whitelist")]
	pub member_allowlist: MemberAllowlist,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			enabled: true,
			host: None,
			port: DEFAULT_PORT,
			auth: AuthConfig::default(),
			connection: None,
			tree: String::new(),
			account_ou: String::new(),
			group_ou: String::new(),
			member_allowlist: MemberAllowlist::default(),
		}
	}
}

impl Config {
	/// The stub configuration used when nothing else is available.
	#[must_use]
	pub fn disabled() -> Self {
		Self { enabled: false, ..Self::default() }
	}

	/// Parse a configuration from YAML, substituting environment variables
	/// first (see [`render_template`]).
	pub fn from_yaml(text: &str) -> Result<Self, Error> {
		let rendered = render_template(text)?;
		Ok(serde_yaml::from_str(&rendered)?)
	}

	/// Load a configuration file. A file that does not exist yields the
	/// [disabled](Self::disabled) configuration.
	pub async fn from_file(path: &Path) -> Result<Self, Error> {
		match tokio::fs::read_to_string(path).await {
			Ok(text) => Self::from_yaml(&text),
			Err(err) if err.kind() == ErrorKind::NotFound => {
				info!(path = %path.display(), "No LDAP configuration found, lookups are disabled");
				Ok(Self::disabled())
			}
			Err(err) => Err(err.into()),
		}
	}

	/// The base DN for all searches.
	#[must_use]
	pub fn tree(&self) -> &str {
		&self.tree
	}

	/// The base DN holding accounts.
	#[must_use]
	pub fn account_tree(&self) -> String {
		format!("{},{}", self.account_ou, self.tree)
	}

	/// The base DN holding groups.
	#[must_use]
	pub fn group_tree(&self) -> String {
		format!("{},{}", self.group_ou, self.tree)
	}

	/// Resolve the options used to connect to the server: the explicit
	/// `connection` block if there is one, else `host`, `port` and `auth`.
	pub fn connection_config(&self) -> Result<ConnectionConfig, Error> {
		if let Some(connection) = &self.connection {
			return Ok(connection.clone());
		}
		let host = self
			.host
			.as_deref()
			.ok_or_else(|| Error::Config("Either `host` or `config` must be set".to_owned()))?;
		let url = Url::parse(&format!("ldap://{host}:{}", self.port))?;
		Ok(ConnectionConfig { auth: self.auth.clone(), ..ConnectionConfig::new(url) })
	}
}

/// How to authenticate against the directory server.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum AuthConfig {
	/// Don't bind with credentials
	#[default]
	Anonymous,
	/// Simple bind with a DN and password
	Simple {
		/// The DN of the search user
		username: String,
		/// The password of the search user
		password: String,
	},
}

/// Configuration for how to connect to the LDAP server
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConnectionConfig {
	/// The URL to connect to the server with. Supports ldap, ldaps, and ldapi
	/// schemes
	pub url: Url,

	/// Timeout to establish a connection in seconds.
	#[serde(default = "default_timeout")]
	pub timeout: u64,

	/// LDAP operation timeout in seconds. Applies to each search.
	#[serde(default)]
	pub operation_timeout: Option<u64>,

	/// TLS config
	#[serde(default)]
	pub tls: TLSConfig,

	/// Credentials to bind with
	#[serde(default)]
	pub auth: AuthConfig,
}

/// Default connection timeout in seconds
fn default_timeout() -> u64 {
	5
}

/// TLS Configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TLSConfig {
	/// Use StartTLS extended operation for establishing a secure connection,
	/// rather than TLS on a dedicated port.
	pub starttls: bool,

	/// Disable verification of TLS certificates
	pub no_tls_verify: bool,

	/// TLS root certificates path
	pub root_certificates_path: Option<PathBuf>,

	/// Path of the TLS client key to use for the connection
	pub client_key_path: Option<PathBuf>,

	/// Path of the TLS client certificate to use for the connection
	pub client_certificate_path: Option<PathBuf>,
}

impl ConnectionConfig {
	/// Connection options for `url` with everything else left at defaults.
	#[must_use]
	pub fn new(url: Url) -> Self {
		Self {
			url,
			timeout: default_timeout(),
			operation_timeout: None,
			tls: TLSConfig::default(),
			auth: AuthConfig::default(),
		}
	}

	/// The per-search timeout, if one is configured.
	#[must_use]
	pub fn operation_timeout(&self) -> Option<Duration> {
		self.operation_timeout.map(Duration::from_secs)
	}

	/// Create a [`LdapConnSettings`] based on this [`ConnectionConfig`]
	pub(crate) async fn to_settings(&self) -> Result<LdapConnSettings, Error> {
		let mut settings = LdapConnSettings::new();

		settings = settings.set_conn_timeout(Duration::from_secs(self.timeout));
		settings = settings.set_starttls(self.tls.starttls);
		settings = settings.set_no_tls_verify(self.tls.no_tls_verify);

		if let Some(path) = &self.tls.root_certificates_path {
			let mut roots = RootCertStore::empty();
			for certificate in read_certificates(path).await? {
				roots
					.add(&certificate)
					.map_err(|_| Error::Invalid("Could not read root certificate".to_owned()))?;
			}
			let builder = ClientConfig::builder().with_safe_defaults().with_root_certificates(roots);

			let config = match (&self.tls.client_key_path, &self.tls.client_certificate_path) {
				(Some(key_path), Some(cert_path)) => {
					let certificates = read_certificates(cert_path).await?;
					let key = read_private_key(key_path).await?;
					builder.with_client_auth_cert(certificates, key).map_err(|_| {
						Error::Invalid("Could not read client certificates".to_owned())
					})?
				}
				(None, None) => builder.with_no_client_auth(),
				_ => {
					return Err(Error::Invalid(
						"Both a client certificate and key file in PKCS8 format must be specified"
							.to_owned(),
					))
				}
			};
			settings = settings.set_config(Arc::new(config));
		}
		Ok(settings)
	}
}

/// Read all PEM encoded certificates from a file
async fn read_certificates(path: &Path) -> Result<Vec<Certificate>, Error> {
	let pem = tokio::fs::read(path).await?;
	let certificates: Vec<_> =
		rustls_pemfile::certs(&mut pem.as_slice())?.into_iter().map(Certificate).collect();
	if certificates.is_empty() {
		return Err(Error::Invalid(format!("No certificates found in {}", path.display())));
	}
	Ok(certificates)
}

/// Read the first PEM encoded PKCS8 private key from a file
async fn read_private_key(path: &Path) -> Result<PrivateKey, Error> {
	let pem = tokio::fs::read(path).await?;
	rustls_pemfile::pkcs8_private_keys(&mut pem.as_slice())?
		.into_iter()
		.next()
		.map(PrivateKey)
		.ok_or_else(|| Error::Invalid(format!("No PKCS8 private key found in {}", path.display())))
}

/// Substring filters deciding which member DNs are worth descending into
/// when testing for nested membership. Empty means every member is followed.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct MemberAllowlist(Vec<String>);

impl MemberAllowlist {
	/// Whether no filters are configured
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Whether a member DN may be traversed further
	#[must_use]
	pub fn permits(&self, dn: &str) -> bool {
		self.0.is_empty() || self.0.iter().any(|filter| dn.contains(filter.as_str()))
	}
}

impl<S: Into<String>> FromIterator<S> for MemberAllowlist {
	fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
		Self(iter.into_iter().map(Into::into).collect())
	}
}

/// Where the configuration comes from. Resolved once when the lookup service
/// is constructed.
#[derive(Clone, Debug)]
pub enum ConfigSource {
	/// A configuration built by the host application
	InMemory(Config),
	/// A YAML file, rendered with [`render_template`] before parsing
	FilePath(PathBuf),
	/// No directory; every lookup yields its empty default
	Disabled,
}

impl ConfigSource {
	/// The file named by [`CONFIG_PATH_ENV`], or [`DEFAULT_CONFIG_PATH`].
	#[must_use]
	pub fn discover() -> Self {
		let path = std::env::var_os(CONFIG_PATH_ENV)
			.map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
		Self::FilePath(path)
	}

	/// Produce the configuration this source describes.
	pub async fn resolve(self) -> Result<Config, Error> {
		match self {
			Self::InMemory(config) => Ok(config),
			Self::FilePath(path) => Config::from_file(&path).await,
			Self::Disabled => Ok(Config::disabled()),
		}
	}
}

impl TryFrom<serde_yaml::Value> for ConfigSource {
	type Error = Error;

	/// Interpret a loosely typed value: a mapping is a configuration, a
	/// string is a path and null disables lookups.
	fn try_from(value: serde_yaml::Value) -> Result<Self, Self::Error> {
		use serde_yaml::Value;
		match value {
			Value::Null => Ok(Self::Disabled),
			Value::String(path) => Ok(Self::FilePath(path.into())),
			value @ Value::Mapping(_) => Ok(Self::InMemory(serde_yaml::from_value(value)?)),
			other => Err(Error::Config(format!("Unrecognized configuration: {other:?}"))),
		}
	}
}

/// Substitute `${VAR}` and `${VAR:-default}` with values from the process
/// environment. The default applies when the variable is unset or empty. An
/// unset variable without a default is an error.
pub fn render_template(text: &str) -> Result<String, Error> {
	let pattern = Regex::new(r"\$\{(\w+)(?::-([^}]*))?\}")
		.map_err(|err| Error::Config(err.to_string()))?;
	let mut missing: Option<String> = None;
	let rendered = pattern.replace_all(text, |caps: &Captures<'_>| {
		match (std::env::var(&caps[1]).ok(), caps.get(2)) {
			(Some(value), Some(default)) if value.is_empty() => default.as_str().to_owned(),
			(Some(value), _) => value,
			(None, Some(default)) => default.as_str().to_owned(),
			(None, None) => {
				missing.get_or_insert_with(|| caps[1].to_owned());
				String::new()
			}
		}
	});
	if let Some(name) = missing {
		return Err(Error::Config(format!("Environment variable {name} is not set")));
	}
	Ok(rendered.into_owned())
}
