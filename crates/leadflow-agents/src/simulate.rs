//! Deterministic stand-ins for provider responses.
//!
//! Every value here is a pure function of its inputs so simulated runs are
//! reproducible and tests never need a network.

use sha2::{Digest, Sha256};

/// First eight bytes of SHA-256, big-endian.
pub fn digest(input: &str) -> u64 {
    let hash = Sha256::digest(input.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash[..8]);
    u64::from_be_bytes(bytes)
}

/// Value in `[0, 1)` with three decimals, keyed by `salt`.
pub fn unit(salt: &str, input: &str) -> f64 {
    (digest(&format!("{}:{}", salt, input)) % 1000) as f64 / 1000.0
}

pub fn pick<'a>(items: &[&'a str], salt: &str, input: &str) -> &'a str {
    if items.is_empty() {
        return "";
    }
    items[(digest(&format!("{}:{}", salt, input)) % items.len() as u64) as usize]
}

/// Short hex identifier, e.g. `cmp-3f9a0c12d4e1`.
pub fn short_id(prefix: &str, input: &str) -> String {
    format!("{}-{:012x}", prefix, digest(input) >> 16)
}

pub fn slug(s: &str) -> String {
    s.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

pub const COMPANIES: [&str; 12] = [
    "Northwind Analytics",
    "Bluefin Logistics",
    "Copperleaf Health",
    "Tidewater Robotics",
    "Quarry Labs",
    "Silverline Retail",
    "Juniper Fintech",
    "Harborview Security",
    "Kestrel Energy",
    "Meridian Learning",
    "Oakridge Biotech",
    "Pinecrest Media",
];

pub const FIRST_NAMES: [&str; 10] = [
    "Avery", "Jordan", "Riley", "Morgan", "Casey", "Quinn", "Harper", "Rowan", "Emerson", "Sawyer",
];

pub const LAST_NAMES: [&str; 10] = [
    "Nakamura", "Okafor", "Lindqvist", "Moreau", "Castillo", "Brennan", "Petrov", "Adeyemi",
    "Halvorsen", "Delgado",
];

/// Titles are assigned by record position so the first record is always a manager.
pub const TITLES: [&str; 6] = [
    "Revenue Operations Manager",
    "VP of Sales",
    "Director of Marketing",
    "Chief Revenue Officer",
    "Head of Growth",
    "Account Executive",
];

pub const TECHNOLOGIES: [&str; 10] = [
    "Salesforce",
    "HubSpot",
    "Snowflake",
    "Segment",
    "Marketo",
    "Outreach",
    "Gong",
    "Zendesk",
    "Stripe",
    "AWS",
];

pub const INDUSTRIES: [&str; 6] = [
    "SaaS",
    "Logistics",
    "Healthcare",
    "Fintech",
    "Manufacturing",
    "Education",
];

pub const LOCATIONS: [&str; 6] = [
    "Austin, United States",
    "Toronto, Canada",
    "London, United Kingdom",
    "Berlin, Germany",
    "Denver, United States",
    "Sydney, Australia",
];
