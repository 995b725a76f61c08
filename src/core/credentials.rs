//! Registry credential identifiers

/// Credential id for the registry account of an organization
pub fn registry_credential_id(org: &str) -> String {
    format!("{}_DOCKERHUB", org.to_uppercase())
}

/// Organization owning a repository, from its clone URL.
///
/// Accepts `https://host/org/repo(.git)` and `git@host:org/repo.git`.
pub fn org_from_repository(url: &str) -> Option<&str> {
    owner_and_name(url).map(|(org, _)| org)
}

/// `org/repo` of a clone URL, without the `.git` suffix
pub fn repository_slug(url: &str) -> Option<String> {
    owner_and_name(url).map(|(org, repo)| format!("{}/{}", org, repo))
}

fn owner_and_name(url: &str) -> Option<(&str, &str)> {
    let path = if let Some((_, rest)) = url.split_once("://") {
        rest.split_once('/').map(|(_, path)| path)?
    } else {
        url.split_once(':').map(|(_, path)| path)?
    };

    let mut segments = path.trim_matches('/').split('/');
    let org = segments.next().filter(|s| !s.is_empty())?;
    let repo = segments.next().filter(|s| !s.is_empty())?;
    Some((org, repo.trim_end_matches(".git")))
}
