//! The lookup service and its one-level-deep searches.
//!
//! All searches start at the configured `tree` and identify entries by their
//! common name. Absent entries and attributes are reported as empty results;
//! only failures to talk to the directory surface as errors.
use ldap3::{dn_escape, ldap_escape};
use tracing::debug;

use crate::{
	config::{Config, ConfigSource},
	directory::{Directory, LdapDirectory},
	entry::{first_rdn, SearchEntryExt},
	error::Error,
	range,
};

/// Attribute listing the groups an entry belongs to
pub const MEMBER_OF: &str = "memberOf";
/// Attribute listing the DNs of a group's members
pub const MEMBER: &str = "member";
/// Attribute holding an entry's e-mail address
pub const MAIL: &str = "mail";
/// Attribute holding an entry's common name
pub const CN: &str = "cn";
/// Pseudo-attribute requesting no attributes at all (RFC 4511 4.5.1.8)
const NO_ATTRIBUTES: &str = "1.1";
/// Active Directory's `LDAP_MATCHING_RULE_IN_CHAIN`, matching transitively
/// through nested groups
pub const MATCHING_RULE_IN_CHAIN: &str = "1.2.840.113556.1.4.1941";

/// The service context shared by every lookup: the configuration and the
/// directory it describes.
///
/// Construct it once and hand it to whatever needs group information. When
/// the configuration is disabled there is no directory and every lookup
/// yields its empty default without searching.
#[derive(Debug)]
pub struct GroupsLookup<D = LdapDirectory> {
	/// The resolved configuration
	config: Config,
	/// The directory to search, absent if lookups are disabled
	directory: Option<D>,
}

impl GroupsLookup<LdapDirectory> {
	/// Resolve `source` and prepare an LDAP directory for it. The server is
	/// contacted on the first lookup, not here.
	pub async fn from_source(source: ConfigSource) -> Result<Self, Error> {
		Self::from_config(source.resolve().await?)
	}

	/// Prepare an LDAP directory for `config`.
	pub fn from_config(config: Config) -> Result<Self, Error> {
		let directory = if config.enabled {
			Some(LdapDirectory::new(config.connection_config()?))
		} else {
			None
		};
		Ok(Self { config, directory })
	}
}

impl<D: Directory> GroupsLookup<D> {
	/// Use `directory` for lookups, e.g. a directory other than LDAP.
	#[must_use]
	pub fn with_directory(config: Config, directory: D) -> Self {
		Self { config, directory: Some(directory) }
	}

	/// The configuration in use
	#[must_use]
	pub fn config(&self) -> &Config {
		&self.config
	}

	/// The directory, if lookups are enabled
	#[must_use]
	pub fn directory(&self) -> Option<&D> {
		self.directory.as_ref().filter(|_| self.config.enabled)
	}

	/// Whether lookups will reach a directory
	#[must_use]
	pub fn is_available(&self) -> bool {
		self.directory().is_some()
	}

	/// Drop the directory connection. The next lookup reconnects.
	pub async fn reset(&self) -> Result<(), Error> {
		match &self.directory {
			Some(directory) => directory.reset().await,
			None => Ok(()),
		}
	}

	/// The groups `cn` is directly a member of, by common name, unsorted.
	pub async fn member_of(&self, cn: &str) -> Result<Vec<String>, Error> {
		let Some(directory) = self.directory() else {
			return Ok(Vec::new());
		};
		let entries = directory.search(self.config.tree(), &cn_filter(cn), &[MEMBER_OF]).await?;
		let groups: Vec<_> = entries
			.first()
			.and_then(|entry| entry.attr_values(MEMBER_OF))
			.unwrap_or_default()
			.iter()
			.filter_map(|dn| first_rdn(dn).map(|(_, value)| value))
			.collect();
		debug!(cn, ?groups, "Resolved direct group memberships");
		Ok(groups)
	}

	/// The DNs of the direct members of group `cn`, following ranged
	/// retrieval to the end.
	pub async fn members_of(&self, cn: &str) -> Result<Vec<String>, Error> {
		let Some(directory) = self.directory() else {
			return Ok(Vec::new());
		};
		range::fetch_all(directory, self.config.tree(), &cn_filter(cn), MEMBER).await
	}

	/// The DN of the entry named `cn`, if there is one.
	pub async fn lookup_dn(&self, cn: &str) -> Result<Option<String>, Error> {
		let Some(directory) = self.directory() else {
			return Ok(None);
		};
		let entries =
			directory.search(self.config.tree(), &cn_filter(cn), &[NO_ATTRIBUTES]).await?;
		Ok(entries.into_iter().next().map(|entry| entry.dn))
	}

	/// The mail address of the entry named `cn`, or an empty string.
	pub async fn lookup_mail(&self, cn: &str) -> Result<String, Error> {
		let Some(directory) = self.directory() else {
			return Ok(String::new());
		};
		let entries = directory.search(self.config.tree(), &cn_filter(cn), &[MAIL]).await?;
		Ok(entries.first().and_then(|entry| entry.attr_first(MAIL)).unwrap_or_default().to_owned())
	}

	/// Whether the account `username` is listed directly in the members of
	/// `group`. Nested groups are not considered.
	pub async fn is_direct_member(&self, username: &str, group: &str) -> Result<bool, Error> {
		let Some(directory) = self.directory() else {
			return Ok(false);
		};
		let filter = format!(
			"(&{}({MEMBER}={}))",
			cn_filter(group),
			ldap_escape(self.account_dn(username))
		);
		let entries = directory.search(self.config.tree(), &filter, &[CN]).await?;
		Ok(!entries.is_empty())
	}

	/// All groups below the group tree that `username` belongs to, directly
	/// or transitively, resolved by the server in a single search.
	///
	/// This relies on Active Directory's in-chain matching rule; other
	/// servers will find nothing. It may be slower than walking the tree
	/// client side.
	pub async fn all_groups_in_chain(&self, username: &str) -> Result<Vec<String>, Error> {
		let Some(directory) = self.directory() else {
			return Ok(Vec::new());
		};
		let filter = format!(
			"(&(objectCategory=group)({MEMBER}:{MATCHING_RULE_IN_CHAIN}:={}))",
			ldap_escape(self.account_dn(username))
		);
		let entries = directory.search(&self.config.group_tree(), &filter, &[CN]).await?;
		Ok(entries.iter().filter_map(|entry| entry.attr_first(CN)).map(str::to_owned).collect())
	}

	/// The DN an account named `username` has below the account tree
	fn account_dn(&self, username: &str) -> String {
		format!("CN={},{}", dn_escape(username), self.config.account_tree())
	}
}

/// An equality filter on the common name
fn cn_filter(cn: &str) -> String {
	format!("({CN}={})", ldap_escape(cn))
}

#[cfg(test)]
mod tests {
	#![allow(clippy::unwrap_used)]

	use super::{cn_filter, GroupsLookup};
	use crate::{config::Config, entry::dn_to_cn};

	#[test]
	fn escapes_filter_values() {
		assert_eq!(cn_filter("Group1"), "(cn=Group1)");
		assert_eq!(cn_filter("a*(b)").to_lowercase(), r"(cn=a\2a\28b\29)");
	}

	#[test]
	fn escapes_account_dn() {
		let config = Config {
			host: Some("localhost".to_owned()),
			tree: "DC=example,DC=net".to_owned(),
			account_ou: "OU=Accounts".to_owned(),
			..Config::default()
		};
		let lookup = GroupsLookup::from_config(config).unwrap();

		assert_eq!(lookup.account_dn("user"), "CN=user,OU=Accounts,DC=example,DC=net");
		let dn = lookup.account_dn("Doe, John");
		assert!(dn.ends_with(",OU=Accounts,DC=example,DC=net"));
		assert_eq!(dn_to_cn(&dn).unwrap(), "Doe, John");
	}
}
