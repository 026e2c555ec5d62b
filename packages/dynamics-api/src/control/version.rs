use regex::Regex;
use semver::Version;
use std::sync::LazyLock;

/// First firmware release that removes several destinations in one request.
pub const BULK_DELETE_MIN_VERSION: Version = Version::new(1, 7, 0);

static IMAGE_VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"v(\d+)\.(\d+)\.(\d+)").expect("image version regex is valid"));

/// Extracts `major.minor.patch` from an image version such as
/// `rc_visard_v1.7.0-12-gabcdef`.
pub fn parse_firmware_version(image_version: &str) -> Option<Version> {
    let caps = IMAGE_VERSION_RE.captures(image_version)?;
    let part = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u64>().ok());
    Some(Version::new(part(1)?, part(2)?, part(3)?))
}

/// Unknown firmware is treated as legacy.
pub fn unknown_version() -> Version {
    Version::new(0, 0, 0)
}

pub fn supports_bulk_delete(version: &Version) -> bool {
    *version >= BULK_DELETE_MIN_VERSION
}
