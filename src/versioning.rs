use semver::{BuildMetadata, Prerelease, Version};

use crate::{errors::ReleaseError, errors::Result, types::BumpLevel};

/// Applies `level` to `current`, resetting the lower components and any
/// pre-release/build metadata. `level` must be greater than `None` — callers
/// only reach this with strategy-map entries that already cleared that bar.
///
/// When `preid` is set the crate is being released on a pre-release track:
/// if `current` is already a pre-release under the same identifier, only the
/// pre-release suffix advances and the release triple is left untouched;
/// otherwise `level` is applied to the release triple and the pre-release
/// counter restarts at `.1`.
pub fn bump_version(current: &Version, level: BumpLevel, preid: Option<&str>) -> Result<Version> {
    if level == BumpLevel::None {
        return Err(ReleaseError::configuration(
            "bump_version requires a level greater than none",
        ));
    }

    let mut next = current.clone();

    let Some(preid) = preid else {
        apply_level(&mut next, level);
        next.pre = Prerelease::EMPTY;
        next.build = BuildMetadata::EMPTY;
        return Ok(next);
    };

    let continuing_same_track = !current.pre.is_empty() && current.pre.as_str().starts_with(preid);
    if !continuing_same_track {
        apply_level(&mut next, level);
    }

    next.pre = next_prerelease(current, preid)?;
    next.build = BuildMetadata::EMPTY;
    Ok(next)
}

fn apply_level(version: &mut Version, level: BumpLevel) {
    match level {
        BumpLevel::Major => {
            version.major += 1;
            version.minor = 0;
            version.patch = 0;
        }
        BumpLevel::Minor => {
            version.minor += 1;
            version.patch = 0;
        }
        BumpLevel::Patch => {
            version.patch += 1;
        }
        BumpLevel::None => {}
    }
}

fn next_prerelease(current: &Version, preid: &str) -> Result<Prerelease> {
    if current.pre.is_empty() {
        return Prerelease::new(&format!("{preid}.1")).map_err(Into::into);
    }

    let raw = current.pre.as_str();
    if !raw.starts_with(preid) {
        return Prerelease::new(&format!("{preid}.1")).map_err(Into::into);
    }

    let suffix = raw.strip_prefix(preid).unwrap_or_default();
    if let Some(number_part) = suffix.strip_prefix('.') {
        if let Ok(number) = number_part.parse::<u64>() {
            return Prerelease::new(&format!("{preid}.{}", number + 1)).map_err(Into::into);
        }
    }

    Prerelease::new(&format!("{preid}.1")).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bump_major_resets_minor_and_patch() {
        let current = Version::parse("1.2.3").unwrap();
        let next = bump_version(&current, BumpLevel::Major, None).unwrap();
        assert_eq!(next, Version::parse("2.0.0").unwrap());
    }

    #[test]
    fn bump_minor_resets_patch() {
        let current = Version::parse("1.2.3").unwrap();
        let next = bump_version(&current, BumpLevel::Minor, None).unwrap();
        assert_eq!(next, Version::parse("1.3.0").unwrap());
    }

    #[test]
    fn bump_patch_increments_patch() {
        let current = Version::parse("1.2.3").unwrap();
        let next = bump_version(&current, BumpLevel::Patch, None).unwrap();
        assert_eq!(next, Version::parse("1.2.4").unwrap());
    }

    #[test]
    fn bump_none_is_rejected() {
        let current = Version::parse("1.2.3").unwrap();
        let error = bump_version(&current, BumpLevel::None, None).unwrap_err();
        assert_eq!(error.kind, crate::errors::ErrorKind::Configuration);
    }

    #[test]
    fn prerelease_from_a_release_version_starts_a_new_track() {
        let current = Version::parse("1.2.3").unwrap();
        let next = bump_version(&current, BumpLevel::Patch, Some("rc")).unwrap();
        assert_eq!(next, Version::parse("1.2.4-rc.1").unwrap());
    }

    #[test]
    fn prerelease_continuing_the_same_track_only_advances_the_suffix() {
        let current = Version::parse("1.2.4-rc.1").unwrap();
        let next = bump_version(&current, BumpLevel::Patch, Some("rc")).unwrap();
        assert_eq!(next, Version::parse("1.2.4-rc.2").unwrap());
    }

    #[test]
    fn prerelease_with_a_different_identifier_restarts_the_track() {
        let current = Version::parse("1.2.4-rc.3").unwrap();
        let next = bump_version(&current, BumpLevel::Patch, Some("beta")).unwrap();
        assert_eq!(next, Version::parse("1.2.5-beta.1").unwrap());
    }
}
