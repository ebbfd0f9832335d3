use crate::platform::RepoMetadata;

use super::types::GitHubRepo;

/// GitHub reports an unset homepage as `""` on some repositories.
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl From<GitHubRepo> for RepoMetadata {
    fn from(repo: GitHubRepo) -> Self {
        RepoMetadata {
            full_name: repo.full_name,
            repo_name: repo.name,
            username: repo.owner.login,
            fork: repo.fork,
            user_type: repo.owner.owner_type,
            user_avatar_url: repo.owner.avatar_url,
            description: repo.description,
            forks: repo.forks_count,
            created_at: repo.created_at,
            updated_at: repo.updated_at,
            pushed_at: repo.pushed_at,
            clone_url: repo.clone_url,
            homepage: non_empty(repo.homepage),
            size: repo.size,
            stargazers_count: repo.stargazers_count,
            watchers: repo.watchers_count,
            language: repo.language,
            open_issues: repo.open_issues_count,
            license: repo.license.and_then(|l| l.name.or(l.spdx_id)),
            topics: repo.topics,
        }
    }
}
