//! Helper methods for extracting data from search results.
use ldap3::SearchEntry;

use crate::error::Error;

/// An extension trait for [`SearchEntry`] that provides convenience methods for
/// extracting data.
pub trait SearchEntryExt {
	/// Get all values of an attribute. Attribute names are compared
	/// case-insensitively, since servers are free to return them in the
	/// casing of their schema rather than that of the request.
	fn attr_values(&self, attr: &str) -> Option<&[String]>;

	/// Get the first value of an attribute, `None` if it is absent or empty.
	fn attr_first(&self, attr: &str) -> Option<&str> {
		self.attr_values(attr)?.first().map(String::as_str)
	}
}

impl SearchEntryExt for SearchEntry {
	fn attr_values(&self, attr: &str) -> Option<&[String]> {
		if let Some(values) = self.attrs.get(attr) {
			return Some(values.as_slice());
		}
		self.attrs
			.iter()
			.find(|(name, _)| name.eq_ignore_ascii_case(attr))
			.map(|(_, values)| values.as_slice())
	}
}

/// Split the leading relative distinguished name off `dn`, returning its
/// attribute type and unescaped value. Both `\,` style and `\2C` style
/// escapes are understood. Multi-valued RDNs yield their first value.
#[must_use]
pub fn first_rdn(dn: &str) -> Option<(&str, String)> {
	let (attr, rest) = dn.split_once('=')?;
	let bytes = rest.as_bytes();
	let mut value = Vec::with_capacity(bytes.len());
	let mut i = 0;
	while let Some(&byte) = bytes.get(i) {
		match byte {
			b'\\' => {
				let hex = bytes
					.get(i + 1..i + 3)
					.filter(|pair| pair.iter().all(u8::is_ascii_hexdigit))
					.and_then(|pair| std::str::from_utf8(pair).ok())
					.and_then(|pair| u8::from_str_radix(pair, 16).ok());
				if let Some(decoded) = hex {
					value.push(decoded);
					i += 3;
				} else {
					value.push(*bytes.get(i + 1)?);
					i += 2;
				}
			}
			b',' | b'+' => break,
			_ => {
				value.push(byte);
				i += 1;
			}
		}
	}
	Some((attr.trim(), String::from_utf8(value).ok()?))
}

/// Extract the common name from a DN such as
/// `CN=Group1,OU=Groups,DC=example,DC=net`.
///
/// Fails if the DN does not begin with a `CN` component.
pub fn dn_to_cn(dn: &str) -> Result<String, Error> {
	match first_rdn(dn) {
		Some((attr, value)) if attr.eq_ignore_ascii_case("cn") => Ok(value),
		_ => Err(Error::InvalidDn(dn.to_owned())),
	}
}
