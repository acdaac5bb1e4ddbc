//! Rewrites build-time file paths into repository paths.

/// Maps `file_name` as captured at runtime to its path in the repository.
///
/// | build prefix | repo prefix | result                                  |
/// |--------------|-------------|-----------------------------------------|
/// | set          | set         | first `build` replaced by `repo`        |
/// | set          | unset       | first `build` removed                   |
/// | unset        | set         | `repo` prepended                        |
/// | unset        | unset       | unchanged                               |
#[must_use]
pub fn repository_path(
    file_name: &str,
    build_prefix: Option<&str>,
    repo_prefix: Option<&str>,
) -> String {
    match (build_prefix, repo_prefix) {
        (Some(build), Some(repo)) => file_name.replacen(build, repo, 1),
        (Some(build), None) => file_name.replacen(build, "", 1),
        (None, Some(repo)) => format!("{repo}{file_name}"),
        (None, None) => file_name.to_owned(),
    }
}
