//! Issuer registry: static configuration merged with persisted registrations.
//!
//! The registry is rebuilt for every login and launch by [`IssuerRegistry::merge`], a pure
//! function of the static blob and the persisted rows. Persisted rows always win when both
//! sources name the same normalized issuer.

mod entry;

pub use entry::*;

// crates.io
use serde_json::Value;
// self
use crate::{_prelude::*, error::ConfigError};

/// Normalized issuer map used for a single request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IssuerRegistry(HashMap<String, IssuerRegistryEntry>);
impl IssuerRegistry {
	/// Builds a registry from the static entries, then overlays the persisted entries.
	pub fn merge<S, D>(static_entries: S, persisted_entries: D) -> Self
	where
		S: IntoIterator<Item = IssuerRegistryEntry>,
		D: IntoIterator<Item = IssuerRegistryEntry>,
	{
		let mut map = HashMap::new();

		for entry in static_entries.into_iter().chain(persisted_entries) {
			map.insert(entry.issuer.clone(), entry);
		}

		Self(map)
	}

	/// Looks up an entry by issuer, normalizing the lookup key first.
	pub fn get(&self, issuer: &str) -> Option<&IssuerRegistryEntry> {
		self.0.get(&normalize_issuer(issuer)?)
	}

	/// Number of distinct issuers.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns `true` if no issuers are registered.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Iterates over all entries in arbitrary order.
	pub fn iter(&self) -> impl Iterator<Item = &IssuerRegistryEntry> {
		self.0.values()
	}
}

/// Normalizes an issuer URL: lowercase scheme and host, default port and trailing slash
/// stripped, query and fragment dropped. Returns `None` for anything but absolute http(s) URLs.
pub fn normalize_issuer(raw: &str) -> Option<String> {
	let url = Url::parse(raw.trim()).ok()?;

	if !matches!(url.scheme(), "http" | "https") {
		return None;
	}

	let host = url.host_str()?;
	let port = url.port().map(|port| format!(":{port}")).unwrap_or_default();
	let path = url.path().trim_end_matches('/');

	Some(format!("{}://{}{port}{path}", url.scheme(), host.to_ascii_lowercase()))
}

/// Parses the static registry blob.
///
/// Two shapes are accepted: an array of entries each carrying `issuer`, or an object keyed by
/// issuer whose values omit it. Any malformed entry fails the whole blob.
pub fn parse_static_registry(blob: &str) -> Result<Vec<IssuerRegistryEntry>, ConfigError> {
	if blob.trim().is_empty() {
		return Ok(Vec::new());
	}

	let value: Value = deserialize_path(blob)?;

	match value {
		Value::Array(_) => {
			let raw: Vec<RawIssuerEntry> = deserialize_path(blob)?;

			raw.into_iter()
				.enumerate()
				.map(|(idx, raw)| {
					let issuer = raw.issuer.clone().ok_or_else(|| ConfigError::RegistryParse {
						path: format!("[{idx}].issuer"),
						message: "missing field `issuer`".into(),
					})?;

					into_entry(raw, issuer)
				})
				.collect()
		},
		Value::Object(_) => {
			let raw: BTreeMap<String, RawIssuerEntry> = deserialize_path(blob)?;

			raw.into_iter()
				.map(|(key, raw)| {
					let issuer = raw.issuer.clone().unwrap_or(key);

					into_entry(raw, issuer)
				})
				.collect()
		},
		_ => Err(ConfigError::RegistryParse {
			path: ".".into(),
			message: "expected an array or an object of issuer entries".into(),
		}),
	}
}

fn into_entry(raw: RawIssuerEntry, issuer: String) -> Result<IssuerRegistryEntry, ConfigError> {
	raw.into_entry(issuer.clone())
		.map_err(|source| ConfigError::InvalidRegistryEntry { issuer, source })
}

fn deserialize_path<T>(blob: &str) -> Result<T, ConfigError>
where
	T: serde::de::DeserializeOwned,
{
	let mut de = serde_json::Deserializer::from_str(blob);

	serde_path_to_error::deserialize(&mut de).map_err(ConfigError::registry_parse)
}
