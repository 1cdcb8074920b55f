mod normalize;

pub use normalize::normalize_url;

use lazy_static::lazy_static;
use linkify::{LinkFinder, LinkKind};
use log::warn;
use regex::Regex;

const IGNORED_DOMAINS: [&str; 3] = [
    r"discord\.com/channels",
    r"discord\.gg",
    r"tenor\.com/view",
];

/// returns true if the input link points somewhere never worth curating
fn ignored_domain(text: &str) -> bool {
    lazy_static! {
        static ref RE: Regex =
            Regex::new(format!(r"(?i)^https?://(www\.)?({})(/|$)", IGNORED_DOMAINS.join("|")).as_str())
                .unwrap();
    }
    RE.is_match(text)
}

fn get_links(msg: &str) -> Vec<String> {
    let mut finder = LinkFinder::new();
    finder.kinds(&[LinkKind::Url]);
    finder
        .links(msg)
        .map(|x| x.as_str().to_string())
        .filter(|link| !ignored_domain(link))
        .collect()
}

/// Every curatable link in `msg`, normalized and without repeats. Links that
/// fail to parse are logged and left out.
pub fn normalized_links(msg: &str) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    for link in get_links(msg) {
        match normalize_url(&link) {
            Ok(url) => {
                let url = url.to_string();
                if !urls.contains(&url) {
                    urls.push(url);
                }
            }
            Err(why) => warn!("Failed to normalize {link}: {why}"),
        }
    }
    urls
}
