//! Relying-party domain derivation.
//!
//! The effective domain a credential is scoped to comes from the requesting
//! origin, optionally narrowed by the relying-party id claimed in the
//! request document. The claimed id must be a registrable suffix of the
//! origin's domain, following
//! <https://html.spec.whatwg.org/multipage/browsers.html#is-a-registrable-domain-suffix-of-or-is-equal-to>.
//!
//! The https-scheme requirement is not checked here; the message bridge
//! rejects insecure origins before a flow ever starts.

use std::borrow::Cow;

use public_suffix::EffectiveTLDProvider;
use url::Url;

/// Failure to map an origin onto a relying-party domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OriginError {
    /// The origin has no domain part (e.g. an IP address).
    MissingDomain,
    /// The claimed relying-party id is not a suffix of the origin domain.
    RpMismatch,
    /// The effective domain is not registrable (public suffix, bare TLD).
    InvalidRpId,
}

impl OriginError {
    /// Message surfaced to the user when this ends a flow.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::MissingDomain => "The request origin is missing a valid domain.",
            Self::RpMismatch => "The request origin does not match the relying party.",
            Self::InvalidRpId => "The relying party identifier is not a registrable domain.",
        }
    }
}

/// Returns a decoded [String] if the domain name is punycode, otherwise the
/// original string reference is returned.
fn decode_host(host: &str) -> Option<Cow<'_, str>> {
    if host.split('.').any(|s| s.starts_with("xn--")) {
        let (decoded, result) = idna::domain_to_unicode(host);
        result.ok().map(|_| Cow::from(decoded))
    } else {
        Some(Cow::from(host))
    }
}

/// Derive the effective relying-party domain for `origin`, honoring a
/// claimed `rp_id` from the request document when present.
pub fn assert_domain<'a>(origin: &'a Url, rp_id: Option<&'a str>) -> Result<&'a str, OriginError> {
    let mut effective_domain = origin.domain().ok_or(OriginError::MissingDomain)?;

    if let Some(rp_id) = rp_id {
        if effective_domain != rp_id
            && !(effective_domain.ends_with(rp_id)
                && effective_domain[..effective_domain.len() - rp_id.len()].ends_with('.'))
        {
            return Err(OriginError::RpMismatch);
        }
        effective_domain = rp_id;
    }

    // the rp id must not be a public suffix and must be registrable
    if decode_host(effective_domain)
        .as_ref()
        .and_then(|s| public_suffix::DEFAULT_PROVIDER.effective_tld_plus_one(s).ok())
        .is_none()
    {
        return Err(OriginError::InvalidRpId);
    }

    Ok(effective_domain)
}
