#![allow(dead_code)]

use std::{
	collections::HashMap,
	error::Error,
	sync::{Arc, Mutex},
};

use async_trait::async_trait;
use ldap3::{LdapConnAsync, SearchEntry};
use ldap_groups_lookup::{range::AttributeRange, Config, Directory, MemberAllowlist};

pub const TREE: &str = "DC=example,DC=net";

/// A directory held in memory. Member lists are served in ranges of
/// `page_size` values when a range is requested, like Active Directory does.
#[derive(Debug, Default)]
pub struct MockDirectory {
	entries: Vec<SearchEntry>,
	page_size: Option<usize>,
	filters: Arc<Mutex<Vec<String>>>,
}

impl MockDirectory {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_page_size(mut self, page_size: usize) -> Self {
		self.page_size = Some(page_size);
		self
	}

	pub fn entry(mut self, dn: &str, attrs: &[(&str, &[&str])]) -> Self {
		self.entries.push(SearchEntry {
			dn: dn.to_owned(),
			attrs: attrs
				.iter()
				.map(|(name, values)| {
					((*name).to_owned(), values.iter().map(|value| (*value).to_owned()).collect())
				})
				.collect(),
			bin_attrs: HashMap::new(),
		});
		self
	}

	/// A group entry below `OU=Groups` with the given member DNs
	pub fn group(self, cn: &str, members: &[&str]) -> Self {
		let dn = group_dn(cn);
		let names = [cn];
		let mut attrs: Vec<(&str, &[&str])> =
			vec![("cn", &names[..]), ("objectCategory", &["group"][..])];
		if !members.is_empty() {
			attrs.push(("member", members));
		}
		self.entry(&dn, &attrs)
	}

	/// Every filter searched for so far, in order
	pub fn filters(&self) -> Vec<String> {
		self.filters.lock().unwrap().clone()
	}

	pub fn searches(&self) -> usize {
		self.filters.lock().unwrap().len()
	}

	/// The filter log, still readable once the directory has been handed
	/// to a lookup service
	pub fn filter_log(&self) -> Arc<Mutex<Vec<String>>> {
		Arc::clone(&self.filters)
	}

	fn matches(&self, entry: &SearchEntry, attr: &str, value: &str) -> bool {
		if let Some(attr) = attr.strip_suffix(":1.2.840.113556.1.4.1941:") {
			return self.contains_transitively(entry, attr, value, &mut Vec::new());
		}
		values(entry, attr).iter().any(|v| v.eq_ignore_ascii_case(value))
	}

	fn contains_transitively(
		&self,
		entry: &SearchEntry,
		attr: &str,
		value: &str,
		seen: &mut Vec<String>,
	) -> bool {
		if seen.contains(&entry.dn) {
			return false;
		}
		seen.push(entry.dn.clone());
		values(entry, attr).iter().any(|member| {
			member.eq_ignore_ascii_case(value)
				|| self
					.entries
					.iter()
					.filter(|nested| nested.dn.eq_ignore_ascii_case(member))
					.any(|nested| self.contains_transitively(nested, attr, value, seen))
		})
	}

	fn project(&self, entry: &SearchEntry, attributes: &[&str]) -> SearchEntry {
		let mut attrs = HashMap::new();
		for requested in attributes {
			let mut options = requested.split(';');
			let name = options.next().unwrap_or_default();
			let range = options
				.find_map(|option| option.strip_prefix("range="))
				.and_then(AttributeRange::parse);
			let Some((stored, all)) =
				entry.attrs.iter().find(|(stored, _)| stored.eq_ignore_ascii_case(name))
			else {
				continue;
			};
			match (range, self.page_size) {
				(Some(range), Some(page_size)) => {
					let end = (range.start + page_size).min(all.len());
					let page = all.get(range.start..end).unwrap_or_default().to_vec();
					let realized = if end == all.len() {
						format!("{stored};range={}-*", range.start)
					} else {
						format!("{stored};range={}-{}", range.start, end - 1)
					};
					attrs.insert(realized, page);
				}
				_ => {
					attrs.insert(stored.clone(), all.clone());
				}
			}
		}
		SearchEntry { dn: entry.dn.clone(), attrs, bin_attrs: HashMap::new() }
	}
}

#[async_trait]
impl Directory for MockDirectory {
	async fn search(
		&self,
		base: &str,
		filter: &str,
		attributes: &[&str],
	) -> Result<Vec<SearchEntry>, ldap_groups_lookup::Error> {
		self.filters.lock().unwrap().push(filter.to_owned());
		let conditions = parse_filter(filter);
		let base = base.to_lowercase();
		Ok(self
			.entries
			.iter()
			.filter(|entry| entry.dn.to_lowercase().ends_with(&base))
			.filter(|entry| {
				conditions.iter().all(|(attr, value)| self.matches(entry, attr, value))
			})
			.map(|entry| self.project(entry, attributes))
			.collect())
	}
}

fn values<'a>(entry: &'a SearchEntry, attr: &str) -> &'a [String] {
	entry
		.attrs
		.iter()
		.find(|(name, _)| name.eq_ignore_ascii_case(attr))
		.map(|(_, values)| values.as_slice())
		.unwrap_or_default()
}

/// Split `(a=b)` or `(&(a=b)(c=d))` into its equality conditions, undoing
/// the escaping of the values.
fn parse_filter(filter: &str) -> Vec<(String, String)> {
	let inner = filter.strip_prefix("(&").and_then(|f| f.strip_suffix(')')).unwrap_or(filter);
	inner
		.split(')')
		.filter_map(|part| part.strip_prefix('('))
		.filter_map(|part| part.split_once('='))
		.map(|(attr, value)| (attr.to_owned(), unescape(value)))
		.collect()
}

fn unescape(value: &str) -> String {
	let mut bytes = Vec::new();
	let mut rest = value.as_bytes();
	while let Some((&byte, tail)) = rest.split_first() {
		if byte == b'\\' && tail.len() >= 2 {
			let hex = std::str::from_utf8(&tail[..2]).unwrap();
			bytes.push(u8::from_str_radix(hex, 16).unwrap());
			rest = &tail[2..];
		} else {
			bytes.push(byte);
			rest = tail;
		}
	}
	String::from_utf8(bytes).unwrap()
}

pub fn group_dn(cn: &str) -> String {
	format!("CN={cn},OU=Groups,{TREE}")
}

pub fn account_dn(cn: &str) -> String {
	format!("CN={cn},OU=Accounts,{TREE}")
}

pub fn config() -> Config {
	Config {
		tree: TREE.to_owned(),
		account_ou: "OU=Accounts".to_owned(),
		group_ou: "OU=Groups".to_owned(),
		..Config::default()
	}
}

pub fn config_with_allowlist(filters: &[&str]) -> Config {
	Config { member_allowlist: MemberAllowlist::from_iter(filters.iter().copied()), ..config() }
}

pub async fn ldap_connect() -> Result<ldap3::Ldap, Box<dyn Error>> {
	let (conn, mut ldap) = LdapConnAsync::new("ldap://localhost:1389").await?;
	let _handle = tokio::spawn(async move {
		if let Err(err) = conn.drive().await {
			panic!("Ldap connection error {err}");
		}
	});
	ldap.simple_bind("cn=admin,dc=example,dc=org", "adminpassword").await?;
	Ok(ldap)
}

pub async fn ldap_add_organizational_unit(
	ldap: &mut ldap3::Ldap,
	ou: &str,
) -> Result<(), Box<dyn Error>> {
	ldap.add(
		&format!("ou={},dc=example,dc=org", ou),
		vec![("objectClass", ["organizationalUnit"].into())],
	)
	.await?
	.success()?;
	Ok(())
}

pub async fn ldap_delete_organizational_unit(
	ldap: &mut ldap3::Ldap,
	ou: &str,
) -> Result<(), Box<dyn Error>> {
	ldap.delete(&format!("ou={},dc=example,dc=org", ou)).await?.success()?;
	Ok(())
}

pub async fn ldap_add_user(
	ldap: &mut ldap3::Ldap,
	cn: &str,
	mail: &str,
) -> Result<(), Box<dyn Error>> {
	ldap.add(
		&format!("cn={},ou=users,dc=example,dc=org", cn),
		vec![
			("objectClass", ["inetOrgPerson"].into()),
			("sn", [cn].into()),
			("mail", [mail].into()),
		],
	)
	.await?
	.success()?;
	Ok(())
}

pub async fn ldap_delete_user(ldap: &mut ldap3::Ldap, cn: &str) -> Result<(), Box<dyn Error>> {
	ldap.delete(&format!("cn={},ou=users,dc=example,dc=org", cn)).await?.success()?;
	Ok(())
}

pub async fn ldap_add_group(
	ldap: &mut ldap3::Ldap,
	cn: &str,
	members: &[&str],
) -> Result<(), Box<dyn Error>> {
	let members = members.iter().copied().collect();
	ldap.add(
		&format!("cn={},ou=groups,dc=example,dc=org", cn),
		vec![("objectClass", ["groupOfNames"].into()), ("member", members)],
	)
	.await?
	.success()?;
	Ok(())
}

pub async fn ldap_delete_group(ldap: &mut ldap3::Ldap, cn: &str) -> Result<(), Box<dyn Error>> {
	ldap.delete(&format!("cn={},ou=groups,dc=example,dc=org", cn)).await?.success()?;
	Ok(())
}
