//! Domain resolver: canonicalizes inbound host/domain strings and resolves
//! them to the public tenant projection.
//!
//! Every public read endpoint scopes its data through `resolve`, so the
//! projection deliberately excludes account internals (password hash, owning
//! account id).

use serde::Serialize;
use uuid::Uuid;

use crate::storage::SharedStore;

/// Public projection of a tenant. No account-internal fields.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TenantSummary {
    pub id: Uuid,
    pub domain: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tagline: Option<String>,
}

/// Canonicalize a host or domain string: strip any scheme, path/query, port
/// and a single leading "www." label, then lowercase.
///
/// Idempotent: `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(host_or_domain: &str) -> String {
    let s = host_or_domain.trim();
    // Scheme prefix ("https://", "http://", anything "://")
    let s = match s.find("://") {
        Some(i) => &s[i + 3..],
        None => s,
    };
    // Path and query
    let s = s.split(['/', '?', '#']).next().unwrap_or("");
    // Port
    let s = s.split(':').next().unwrap_or("");
    let mut s = s.to_ascii_lowercase();
    // Leading "www." labels; repeated so the result is a fixpoint
    while let Some(rest) = s.strip_prefix("www.") {
        s = rest.to_string();
    }
    s
}

/// Exact-match lookup of a canonical domain against stored tenants.
/// Absent domain yields `None`; singleton endpoints surface that as
/// not-found, collection endpoints as an empty collection.
pub fn resolve(store: &SharedStore, canonical: &str) -> Option<TenantSummary> {
    let t = store.find_tenant_by_domain(canonical)?;
    Some(TenantSummary { id: t.id, domain: t.domain, display_name: t.display_name, tagline: t.tagline })
}

/// Tenant-scoped collection read: page sections for a canonical domain.
/// A domain with no tenant is an empty collection, not an error.
pub fn sections_for(store: &SharedStore, canonical: &str) -> Vec<String> {
    store
        .find_tenant_by_domain(canonical)
        .map(|t| t.sections)
        .unwrap_or_default()
}
