// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

/// Characters that end the namespace part of a cache key.
pub const NAMESPACE_DELIMITERS: [char; 2] = [':', '_'];

/// Returns the namespace of a cache key: the substring before the first `:` or `_`.
///
/// A key without a delimiter is its own namespace.
///
/// # Examples
///
/// ```
/// use colcache_tier::namespace_of;
///
/// assert_eq!(namespace_of("weather:paris"), "weather");
/// assert_eq!(namespace_of("terrain_alps:12"), "terrain");
/// assert_eq!(namespace_of("standalone"), "standalone");
/// ```
#[must_use]
pub fn namespace_of(key: &str) -> &str {
    key.find(NAMESPACE_DELIMITERS).map_or(key, |index| &key[..index])
}
