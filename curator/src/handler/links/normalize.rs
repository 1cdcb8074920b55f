use crate::errors::Result;

use log::trace;
use phf::phf_set;
use url::Url;

static TWITTER_FIELDS: phf::Set<&'static str> = phf_set! {
    "s",
    "t",
};

static YOUTUBE_FIELDS: phf::Set<&'static str> = phf_set! {
    "feature",
    "si",
};

// query fields that only exist to track who shared a link with whom
static TRACKING_FIELDS: phf::Set<&'static str> = phf_set! {
    "utm_source",
    "utm_medium",
    "utm_term",
    "utm_campaign",
    "utm_content",
    "utm_name",
    "mc_cid",
    "mc_eid",
    "fbclid",
    "gclid",
    "igshid",
    "ref",
};

/// Returns true if `field` is dropped from the query string of urls on `host`.
#[inline(always)]
fn tracking_field(host: &str, field: &str) -> bool {
    let host = host.strip_prefix("www.").unwrap_or(host);
    let host_match = match host {
        "twitter.com" | "x.com" => TWITTER_FIELDS.contains(field),
        "youtube.com" | "m.youtube.com" => YOUTUBE_FIELDS.contains(field),
        _ => false,
    };
    host_match || TRACKING_FIELDS.contains(field)
}

/// Rewrites share-link hosts to their canonical form.
fn expand_short_url(url: Url) -> Result<Url> {
    if url.host_str() == Some("youtu.be") {
        let id = url.path().trim_start_matches('/');
        if !id.is_empty() {
            let mut expanded = Url::parse(&format!("https://www.youtube.com/watch?v={id}"))?;
            let rest = url
                .query_pairs()
                .map(|(f, v)| (f.into_owned(), v.into_owned()))
                .collect::<Vec<(String, String)>>();
            expanded.query_pairs_mut().extend_pairs(rest);
            return Ok(expanded);
        }
    }
    Ok(url)
}

/// Canonical form of `url_str` used as the dedup key: lowercase scheme and
/// host, no default port, no fragment, no tracking fields in the query and no
/// trailing slash on a non-root path.
pub fn normalize_url(url_str: &str) -> Result<Url> {
    let mut url = expand_short_url(Url::parse(url_str)?)?;
    url.set_fragment(None);

    let host = url.host_str().unwrap_or_default().to_string();
    let fields = url
        .query_pairs()
        .filter(|(field, _value)| !tracking_field(&host, field))
        .map(|(f, v)| (f.into_owned(), v.into_owned()))
        .collect::<Vec<(String, String)>>();

    if fields.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(fields);
    }

    if url.path().len() > 1 && url.path().ends_with('/') {
        let trimmed = url.path().trim_end_matches('/').to_string();
        url.set_path(if trimmed.is_empty() { "/" } else { &trimmed });
    }

    trace!("normalized {url_str} to {url}");
    Ok(url)
}
