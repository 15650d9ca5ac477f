//! Dynamic version resolution
//!
//! Turns a (possibly wildcarded) [`VersionSpec`] query into one concrete
//! [`PackageVersion`] taken from the versions of a single package.
//!
//! Wildcards are resolved most-significant first:
//! - `x.x.x`: greatest version overall
//! - `1.x.x`: greatest minor, then greatest build within major 1
//! - `1.2.x`: greatest build within 1.2
//! - `1.2.3`: exact match
//!
//! Betas are excluded from every wildcard step unless `allow_beta` is set.

use crate::catalog::model::PackageVersion;
use crate::version::spec::VersionSpec;

/// Resolve `query` against `candidates`, all belonging to one package.
///
/// Returns `None` when no candidate satisfies the query.
pub fn resolve_version<'a>(
    query: &VersionSpec,
    candidates: &'a [PackageVersion],
    allow_beta: bool,
) -> Option<&'a PackageVersion> {
    if !query.is_dynamic() {
        return candidates.iter().find(|p| p.version == *query);
    }

    let visible = candidates.iter().filter(|p| allow_beta || !p.is_beta());

    let Some(major) = query.major() else {
        return first_max_by_key(visible, |p| p.version);
    };

    let packages: Vec<&PackageVersion> = visible
        .filter(|p| p.version.major() == Some(major))
        .collect();
    if packages.len() <= 1 {
        return packages.first().copied();
    }

    let Some(minor) = query.minor() else {
        let packages = retain_max(packages, |p| p.version.minor());
        let packages = retain_max(packages, |p| p.version.build());
        return first_max_by_key(packages, |p| p.version.beta());
    };

    let packages: Vec<&PackageVersion> = packages
        .into_iter()
        .filter(|p| p.version.minor() == Some(minor))
        .collect();
    if packages.len() <= 1 {
        return packages.first().copied();
    }

    let Some(build) = query.build() else {
        let packages = retain_max(packages, |p| p.version.build());
        return first_max_by_key(packages, |p| p.version.beta());
    };

    let packages: Vec<&PackageVersion> = packages
        .into_iter()
        .filter(|p| p.version.build() == Some(build))
        .collect();

    // NOTE: the lowest beta wins here while the wildcard steps above pick the
    // highest one. Suspicious, kept as observed.
    first_min_by_key(packages, |p| p.version.beta())
}

/// Keep only the candidates sharing the greatest key
fn retain_max<'a, K: Ord>(
    packages: Vec<&'a PackageVersion>,
    key: impl Fn(&PackageVersion) -> K,
) -> Vec<&'a PackageVersion> {
    let Some(max) = packages.iter().map(|p| key(*p)).max() else {
        return packages;
    };
    packages.into_iter().filter(|p| key(*p) == max).collect()
}

/// Greatest element by key; the earliest one wins ties
fn first_max_by_key<'a, K: Ord>(
    packages: impl IntoIterator<Item = &'a PackageVersion>,
    key: impl Fn(&PackageVersion) -> K,
) -> Option<&'a PackageVersion> {
    packages
        .into_iter()
        .reduce(|best, p| if key(p) > key(best) { p } else { best })
}

/// Least element by key; the earliest one wins ties
fn first_min_by_key<'a, K: Ord>(
    packages: impl IntoIterator<Item = &'a PackageVersion>,
    key: impl Fn(&PackageVersion) -> K,
) -> Option<&'a PackageVersion> {
    packages
        .into_iter()
        .reduce(|best, p| if key(p) < key(best) { p } else { best })
}
