//! Group lookups on behalf of identities supplied by the host application.
//!
//! Anything able to name itself in the directory implements
//! [`LookupKeyProvider`], and thereby gains the [`DirectoryGroups`] methods.
//! A subject without a usable key is not an error: it simply has no groups,
//! no mail address and is a member of nothing.
use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::{directory::Directory, error::Error, lookup::GroupsLookup};

/// An identity that can be looked up in the directory by common name, e.g.
/// a user record holding a username.
pub trait LookupKeyProvider {
	/// The common name to look up, if the subject has one
	fn lookup_key(&self) -> Option<&str>;
}

impl LookupKeyProvider for str {
	fn lookup_key(&self) -> Option<&str> {
		Some(self)
	}
}

impl LookupKeyProvider for String {
	fn lookup_key(&self) -> Option<&str> {
		Some(self)
	}
}

impl<T: LookupKeyProvider + ?Sized> LookupKeyProvider for &T {
	fn lookup_key(&self) -> Option<&str> {
		(**self).lookup_key()
	}
}

impl<T: LookupKeyProvider> LookupKeyProvider for Option<T> {
	fn lookup_key(&self) -> Option<&str> {
		self.as_ref().and_then(LookupKeyProvider::lookup_key)
	}
}

/// The key of `subject`, unless it is missing or empty
fn usable_key<S: LookupKeyProvider + ?Sized>(subject: &S) -> Option<&str> {
	subject.lookup_key().filter(|key| !key.is_empty())
}

/// Candidate groups for a membership test, by common name. A single name
/// converts into a list of one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupNames(Vec<String>);

impl From<&str> for GroupNames {
	fn from(group: &str) -> Self {
		Self(vec![group.to_owned()])
	}
}

impl From<String> for GroupNames {
	fn from(group: String) -> Self {
		Self(vec![group])
	}
}

impl From<Vec<String>> for GroupNames {
	fn from(groups: Vec<String>) -> Self {
		Self(groups)
	}
}

impl From<Vec<&str>> for GroupNames {
	fn from(groups: Vec<&str>) -> Self {
		groups.as_slice().into()
	}
}

impl From<&[&str]> for GroupNames {
	fn from(groups: &[&str]) -> Self {
		Self(groups.iter().map(|group| (*group).to_owned()).collect())
	}
}

impl<const N: usize> From<[&str; N]> for GroupNames {
	fn from(groups: [&str; N]) -> Self {
		groups.as_slice().into()
	}
}

impl From<GroupNames> for Vec<String> {
	fn from(groups: GroupNames) -> Self {
		groups.0
	}
}

impl<D: Directory> GroupsLookup<D> {
	/// All groups `subject` belongs to, directly or through nested groups,
	/// sorted by common name.
	#[instrument(skip_all, fields(key = subject.lookup_key()))]
	pub async fn groups_of<S>(&self, subject: &S) -> Result<Vec<String>, Error>
	where
		S: LookupKeyProvider + Sync + ?Sized,
	{
		let Some(key) = usable_key(subject) else {
			return Ok(Vec::new());
		};
		let groups = self.member_of(key).await?;
		self.walk_groups_upward(groups).await
	}

	/// The mail address of `subject`, or an empty string.
	#[instrument(skip_all, fields(key = subject.lookup_key()))]
	pub async fn mail_of<S>(&self, subject: &S) -> Result<String, Error>
	where
		S: LookupKeyProvider + Sync + ?Sized,
	{
		let Some(key) = usable_key(subject) else {
			return Ok(String::new());
		};
		self.lookup_mail(key).await
	}

	/// Whether `subject` is a member of any of `groups`, directly or through
	/// nested groups.
	#[instrument(skip_all, fields(key = subject.lookup_key()))]
	pub async fn is_member_of<S, G>(&self, subject: &S, groups: G) -> Result<bool, Error>
	where
		S: LookupKeyProvider + Sync + ?Sized,
		G: Into<GroupNames> + Send,
	{
		let Some(key) = usable_key(subject) else {
			return Ok(false);
		};
		if !self.is_available() {
			return Ok(false);
		}
		let groups: GroupNames = groups.into();
		let Some(dn) = self.lookup_dn(key).await? else {
			debug!(key, "Subject not found in directory");
			return Ok(false);
		};
		self.is_member_reachable(groups.into(), &dn).await
	}
}

/// Directory group lookups available on every [`LookupKeyProvider`].
#[async_trait]
pub trait DirectoryGroups: LookupKeyProvider + Sync {
	/// See [`GroupsLookup::groups_of`]
	async fn ldap_groups<D: Directory>(&self, lookup: &GroupsLookup<D>) -> Result<Vec<String>, Error> {
		lookup.groups_of(self).await
	}

	/// See [`GroupsLookup::mail_of`]
	async fn ldap_mail<D: Directory>(&self, lookup: &GroupsLookup<D>) -> Result<String, Error> {
		lookup.mail_of(self).await
	}

	/// See [`GroupsLookup::is_member_of`]
	async fn is_member_of_ldap_group<D, G>(
		&self,
		lookup: &GroupsLookup<D>,
		groups: G,
	) -> Result<bool, Error>
	where
		D: Directory,
		G: Into<GroupNames> + Send,
	{
		lookup.is_member_of(self, groups).await
	}
}

impl<T: LookupKeyProvider + Sync + ?Sized> DirectoryGroups for T {}
