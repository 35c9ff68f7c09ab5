//! Traversal of the group hierarchy.
//!
//! Directory schemas cannot prevent a group from transitively containing
//! itself, so both walks keep a set of visited groups and look up each group
//! at most once. They use explicit worklists rather than recursion; deep
//! hierarchies cost heap, not stack.
use std::collections::{BTreeSet, HashSet};

use tracing::debug;

use crate::{directory::Directory, entry::dn_to_cn, error::Error, lookup::GroupsLookup};

impl<D: Directory> GroupsLookup<D> {
	/// Every group reachable from `groups` by following memberships
	/// upwards, including `groups` themselves, sorted by common name.
	///
	/// Issues one search per distinct group. Yields nothing if lookups are
	/// disabled.
	pub async fn walk_groups_upward(&self, groups: Vec<String>) -> Result<Vec<String>, Error> {
		if !self.is_available() {
			return Ok(Vec::new());
		}

		let mut seen = BTreeSet::new();
		let mut frontier = groups;
		while let Some(group) = frontier.pop() {
			if seen.contains(&group) {
				continue;
			}
			let parents = self.member_of(&group).await?;
			seen.insert(group);
			frontier.extend(parents.into_iter().filter(|parent| !seen.contains(parent)));
		}
		Ok(seen.into_iter().collect())
	}

	/// Whether `member_dn` is a member of any of `groups`, directly or
	/// through nested groups.
	///
	/// Groups are searched depth first in the given order, and the walk stops
	/// at the first group listing `member_dn` verbatim. Only members passing
	/// the configured [allow-list](crate::config::MemberAllowlist) are
	/// descended into.
	pub async fn is_member_reachable(
		&self,
		groups: Vec<String>,
		member_dn: &str,
	) -> Result<bool, Error> {
		if !self.is_available() {
			return Ok(false);
		}
		let allowlist = &self.config().member_allowlist;

		let mut seen = HashSet::new();
		let mut levels = vec![groups.into_iter()];
		while let Some(level) = levels.last_mut() {
			let Some(group) = level.next() else {
				levels.pop();
				continue;
			};
			if seen.contains(&group) {
				continue;
			}

			let members = self.members_of(&group).await?;
			if members.iter().any(|member| member == member_dn) {
				debug!(group = group.as_str(), member_dn, depth = levels.len(), "Found member");
				return Ok(true);
			}

			let nested: Vec<String> = members
				.iter()
				.filter(|member| allowlist.permits(member))
				.filter_map(|member| match dn_to_cn(member) {
					Ok(cn) => Some(cn),
					Err(err) => {
						debug!("Not descending into member: {err}");
						None
					}
				})
				.collect();
			seen.insert(group);
			levels.push(nested.into_iter());
		}
		Ok(false)
	}
}
