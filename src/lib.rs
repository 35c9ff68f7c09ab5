//! Resolve the LDAP group memberships of an identity.
//!
//! Given anything that can name itself in the directory (a
//! [`LookupKeyProvider`], e.g. a user record holding a username), the library
//! answers two questions: which groups the subject belongs to, directly and
//! through nested groups, and whether it is a member of one of a set of
//! candidate groups.
//!
//! Upwards, memberships are followed through the `memberOf` attribute of each
//! entry. Downwards, the `member` attribute of each candidate group is read,
//! using ranged retrieval where the server splits large member lists into
//! pages, and nested groups are descended into as long as their DN passes the
//! configured allow-list. Both walks remember the groups they visited, so
//! cyclic hierarchies terminate.
//!
//! For a general primer on LDAP, the [introduction] in the `ldap3` crate which
//! is used here for interfacing with LDAP is an excellent resource.
//!
//! [introduction]: https://github.com/inejge/ldap3/blob/master/LDAP-primer.md
//!
//! # Getting started
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use ldap_groups_lookup::{ConfigSource, DirectoryGroups, GroupsLookup};
//!
//! // Reads `config/ldap_groups_lookup.yml`, or the file named by
//! // `$LDAP_GROUPS_LOOKUP_CONFIG`. Without a file, lookups are disabled.
//! let lookup = GroupsLookup::from_source(ConfigSource::discover()).await?;
//!
//! let username = "jdoe";
//! println!("Groups: {:?}", lookup.groups_of(username).await?);
//! println!("Mail: {}", username.ldap_mail(&lookup).await?);
//! if username.is_member_of_ldap_group(&lookup, ["Admins", "Operators"]).await? {
//!     println!("{username} may administrate");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! A configuration file might look like so. `${VAR}` and `${VAR:-default}`
//! are replaced from the environment before parsing:
//! ```yaml
//! host: ldap.example.edu
//! port: 389
//! auth:
//!   method: simple
//!   username: cn=reader,dc=ads,dc=example,dc=edu
//!   password: ${LDAP_PASSWORD}
//! tree: dc=ads,dc=example,dc=edu
//! account_ou: ou=Accounts
//! group_ou: ou=Groups
//! member_whitelist:
//!   - OU=Groups
//! ```
//!
//! # Limitations
//! * Results are not cached; every call searches the directory anew.
//! * Nested groups are found by common name, so common names are assumed to
//!   be unique below the search tree.

pub mod config;
pub mod directory;
pub mod entry;
pub mod error;
pub mod lookup;
pub mod range;
pub mod subject;
mod walker;

pub use ldap3::{self, SearchEntry};

pub use crate::{
	config::{AuthConfig, Config, ConfigSource, ConnectionConfig, MemberAllowlist, TLSConfig},
	directory::{Directory, LdapDirectory},
	entry::{dn_to_cn, SearchEntryExt},
	error::Error,
	lookup::GroupsLookup,
	subject::{DirectoryGroups, GroupNames, LookupKeyProvider},
};
