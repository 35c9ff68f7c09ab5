//! Error codes

/// Errors that can occur when using this library
#[derive(thiserror::Error, Debug)]
pub enum Error {
	/// Some supplied material (certificates, keys) did not conform to the
	/// expected syntax.
	#[error("Malformed data: {0}")]
	Invalid(String),
	/// A distinguished name did not start with a common name component.
	#[error("Distinguished name does not start with a CN component: {0}")]
	InvalidDn(String),
	/// The configuration was of an unrecognized shape or could not be
	/// rendered.
	#[error("Invalid configuration: {0}")]
	Config(String),
	/// An underlying protocol error or similar occurred, including failure
	/// to connect or bind to the directory server.
	#[error(transparent)]
	Ldap(#[from] ldap3::LdapError),
	/// Reading a configuration file or TLS material failed.
	#[error(transparent)]
	Io(#[from] std::io::Error),
	/// The configuration file was not valid YAML for the expected schema.
	#[error(transparent)]
	Yaml(#[from] serde_yaml::Error),
	/// A server URL could not be parsed.
	#[error(transparent)]
	Url(#[from] url::ParseError),
}
