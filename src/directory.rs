//! Client for connecting to LDAP and searching entries

use async_trait::async_trait;
use ldap3::{LdapConnAsync, Scope, SearchEntry};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::{
	config::{AuthConfig, ConnectionConfig},
	error::Error,
};

/// Result code of a search whose base object does not exist (RFC 4511)
const NO_SUCH_OBJECT: u32 = 32;

/// The single capability the lookups need from a directory server.
#[async_trait]
pub trait Directory: Send + Sync {
	/// Search the subtree below `base` for entries matching `filter`,
	/// returning only the requested attributes. A search matching nothing is
	/// an empty list, not an error.
	async fn search(
		&self,
		base: &str,
		filter: &str,
		attributes: &[&str],
	) -> Result<Vec<SearchEntry>, Error>;

	/// Drop any established connection. The next search reconnects.
	async fn reset(&self) -> Result<(), Error> {
		Ok(())
	}
}

/// A [`Directory`] backed by an LDAP server. The connection is established
/// and bound on the first search and shared by all subsequent ones.
#[derive(Debug)]
pub struct LdapDirectory {
	/// How to reach and authenticate against the server
	config: ConnectionConfig,
	/// The bound connection, once established
	connection: RwLock<Option<ldap3::Ldap>>,
}

impl LdapDirectory {
	/// Create a new [`LdapDirectory`]. Does not connect yet.
	#[must_use]
	pub fn new(config: ConnectionConfig) -> Self {
		Self { config, connection: RwLock::new(None) }
	}

	/// The bound connection, establishing it if needed.
	async fn connection(&self) -> Result<ldap3::Ldap, Error> {
		if let Some(ldap) = self.connection.read().await.as_ref() {
			return Ok(ldap.clone());
		}

		let mut connection = self.connection.write().await;
		if let Some(ldap) = connection.as_ref() {
			return Ok(ldap.clone());
		}
		let ldap = self.connect().await?;
		*connection = Some(ldap.clone());
		Ok(ldap)
	}

	/// Create a connection to an ldap server based on the settings and url
	/// specified in the configuration, and bind with the configured
	/// credentials.
	async fn connect(&self) -> Result<ldap3::Ldap, Error> {
		let settings = self.config.to_settings().await?;
		debug!(url = %self.config.url, "Connecting to LDAP server");
		let (conn, mut ldap) =
			LdapConnAsync::from_url_with_settings(settings, &self.config.url).await?;
		tokio::spawn(async move {
			if let Err(err) = conn.drive().await {
				warn!("Ldap connection error {err}");
			}
		});

		match &self.config.auth {
			AuthConfig::Anonymous => {}
			AuthConfig::Simple { username, password } => {
				debug!(username = username.as_str(), "Performing LDAP bind");
				ldap.simple_bind(username, password).await?.success()?;
			}
		}
		info!(url = %self.config.url, "LDAP connection established");
		Ok(ldap)
	}
}

#[async_trait]
impl Directory for LdapDirectory {
	async fn search(
		&self,
		base: &str,
		filter: &str,
		attributes: &[&str],
	) -> Result<Vec<SearchEntry>, Error> {
		let mut ldap = self.connection().await?;
		if let Some(timeout) = self.config.operation_timeout() {
			ldap.with_timeout(timeout);
		}

		debug!(base, filter, ?attributes, "Searching LDAP");
		let result = ldap.search(base, Scope::Subtree, filter, attributes.to_vec()).await?;
		if result.1.rc == NO_SUCH_OBJECT {
			debug!(base, "Search base does not exist");
			return Ok(Vec::new());
		}
		let (entries, _) = result.success()?;
		Ok(entries.into_iter().map(SearchEntry::construct).collect())
	}

	async fn reset(&self) -> Result<(), Error> {
		let connection = self.connection.write().await.take();
		if let Some(mut ldap) = connection {
			debug!(url = %self.config.url, "Dropping LDAP connection");
			ldap.unbind().await?;
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	#![allow(clippy::unwrap_used)]

	use url::Url;

	use super::{Directory, LdapDirectory};
	use crate::{config::ConnectionConfig, error::Error};

	#[tokio::test]
	async fn unreachable_server_is_an_error() -> Result<(), Box<dyn std::error::Error>> {
		let mut config = ConnectionConfig::new(Url::parse("ldap://127.0.0.1:1")?);
		config.timeout = 1;
		let directory = LdapDirectory::new(config);

		let result = directory.search("dc=example,dc=org", "(cn=user)", &["cn"]).await;
		assert!(matches!(result, Err(Error::Ldap(_))));
		assert!(directory.connection.read().await.is_none(), "Failed connections are not cached");
		Ok(())
	}

	#[tokio::test]
	async fn reset_without_connection() -> Result<(), Box<dyn std::error::Error>> {
		let directory = LdapDirectory::new(ConnectionConfig::new(Url::parse("ldap://localhost")?));
		directory.reset().await?;
		Ok(())
	}
}
