//! Retrieval of multi-valued attributes that the server hands out in ranges.
//!
//! Active Directory returns at most `MaxValRange` values of an attribute per
//! search. Asking for `member;range=0-*` yields an attribute named e.g.
//! `member;range=0-1499`, and the client has to continue from `1500` until
//! the server answers with a range ending in `*`. Servers that don't know
//! about ranges answer with the plain attribute, which is complete, or with
//! nothing, in which case the plain attribute is requested instead. Entries
//! that are evidently not groups are not asked twice.
use ldap3::SearchEntry;
use tracing::{debug, warn};

use crate::{directory::Directory, entry::SearchEntryExt, error::Error};

/// Attribute listing the object classes of an entry
const OBJECT_CLASS: &str = "objectClass";

/// Object classes of entries that carry a member list
const GROUP_CLASSES: &[&str] = &["group", "groupOfNames", "groupOfUniqueNames", "groupOfURLs"];

/// The realized index range of a page of attribute values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeRange {
	/// Index of the first value on this page
	pub start: usize,
	/// Index of the last value on this page, `None` if this is the final page
	pub end: Option<usize>,
}

impl AttributeRange {
	/// Parse the value of a `range=` option, e.g. `0-1499` or `1500-*`.
	#[must_use]
	pub fn parse(range: &str) -> Option<Self> {
		let (start, end) = range.split_once('-')?;
		let start = start.parse().ok()?;
		let end = match end {
			"*" => None,
			end => Some(end.parse().ok()?),
		};
		Some(Self { start, end })
	}

	/// Whether the server signalled that no values follow this page.
	#[must_use]
	pub fn is_last(&self) -> bool {
		self.end.is_none()
	}

	/// The attribute description requesting all values of `attr` from
	/// `start` onwards.
	#[must_use]
	pub fn request(attr: &str, start: usize) -> String {
		format!("{attr};range={start}-*")
	}
}

/// Locate `attr` among the attributes of `entry`, wherever and however it was
/// returned. Yields the realized range, `None` for an unranged (complete)
/// attribute, along with the values.
#[must_use]
pub fn find_attribute<'a>(
	entry: &'a SearchEntry,
	attr: &str,
) -> Option<(Option<AttributeRange>, &'a [String])> {
	entry.attrs.iter().find_map(|(description, values)| {
		let mut options = description.split(';');
		if !options.next()?.eq_ignore_ascii_case(attr) {
			return None;
		}
		let range = options.find_map(|option| {
			let (name, value) = option.split_once('=')?;
			name.eq_ignore_ascii_case("range").then_some(value)
		});
		match range {
			Some(range) => Some((Some(AttributeRange::parse(range)?), values.as_slice())),
			None => Some((None, values.as_slice())),
		}
	})
}

/// Fetch every value of `attr` from the first entry matching `filter`,
/// following ranges until the final page. Yields an empty list if no entry
/// matches or the entry lacks the attribute.
///
/// The first request also asks for the object classes. If the entry comes
/// back without the attribute, the plain attribute is requested only when
/// the entry may be a group. Pages are accepted only if they start exactly
/// where the previous one ended; anything else ends the retrieval with a
/// warning.
pub async fn fetch_all<D: Directory + ?Sized>(
	directory: &D,
	base: &str,
	filter: &str,
	attr: &str,
) -> Result<Vec<String>, Error> {
	let mut values = Vec::new();
	let mut start = 0;
	loop {
		let request = AttributeRange::request(attr, start);
		let attributes =
			if start == 0 { vec![request.as_str(), OBJECT_CLASS] } else { vec![request.as_str()] };
		let entries = directory.search(base, filter, &attributes).await?;
		let Some(entry) = entries.first() else {
			break;
		};
		let Some((range, page)) = find_attribute(entry, attr) else {
			if start == 0 && may_be_group(entry) {
				return fetch_plain(directory, base, filter, attr).await;
			}
			break;
		};
		if let Some(range) = range {
			if range.start != start || range.end.is_some_and(|end| end < start) {
				warn!(filter, attr, start, ?range, "Server returned a misaligned range");
				break;
			}
		}
		values.extend_from_slice(page);
		debug!(filter, ?range, count = page.len(), total = values.len(), "Retrieved attribute page");

		let Some(AttributeRange { end: Some(end), .. }) = range else {
			break;
		};
		let Some(next) = end.checked_add(1).filter(|_| !page.is_empty()) else {
			warn!(filter, attr, start, end, "Server returned a range that does not advance");
			break;
		};
		start = next;
	}
	Ok(values)
}

/// Whether `entry` may carry a member list. Entries whose object classes
/// were not returned are given the benefit of the doubt.
fn may_be_group(entry: &SearchEntry) -> bool {
	entry.attr_values(OBJECT_CLASS).map_or(true, |classes| {
		classes
			.iter()
			.any(|class| GROUP_CLASSES.iter().any(|group| group.eq_ignore_ascii_case(class)))
	})
}

/// Fetch `attr` without asking for a range, for servers that ignore or
/// reject the range option.
async fn fetch_plain<D: Directory + ?Sized>(
	directory: &D,
	base: &str,
	filter: &str,
	attr: &str,
) -> Result<Vec<String>, Error> {
	debug!(filter, attr, "No ranged values returned, requesting the plain attribute");
	let entries = directory.search(base, filter, &[attr]).await?;
	Ok(entries
		.first()
		.and_then(|entry| find_attribute(entry, attr))
		.map(|(_, values)| values.to_vec())
		.unwrap_or_default())
}
