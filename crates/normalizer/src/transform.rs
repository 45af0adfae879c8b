use tracing::debug;

use crate::models::{NormalizedPullRequest, NormalizedUser, PrState};
use crate::payloads::{SearchIssuePayload, UserPayload};

pub fn normalize_user(payload: &UserPayload) -> NormalizedUser {
    NormalizedUser {
        login: payload.login.clone(),
        display_name: non_blank(payload.name.as_deref()),
        email: non_blank(payload.email.as_deref()),
    }
}

/// Returns `None` for search hits that are not pull requests or have no author.
pub fn normalize_pull_request(payload: &SearchIssuePayload) -> Option<NormalizedPullRequest> {
    let Some(pr) = payload.pull_request.as_ref() else {
        debug!(id = payload.id, "skipping search hit that is not a pull request");
        return None;
    };
    let Some(author) = payload.user.as_ref() else {
        debug!(id = payload.id, "skipping pull request without author");
        return None;
    };

    let state = if pr.merged_at.is_some() {
        PrState::Merged
    } else if payload.state.eq_ignore_ascii_case("closed") {
        PrState::Closed
    } else {
        PrState::Open
    };

    Some(NormalizedPullRequest {
        id: payload.id,
        number: payload.number,
        author_login: author.login.clone(),
        repository: repository_from_url(&payload.repository_url),
        title: payload.title.clone(),
        url: payload.html_url.clone(),
        state,
        created_at_utc: payload.created_at,
    })
}

/// `https://api.github.com/repos/acme/widgets` -> `acme/widgets`.
pub fn repository_from_url(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    match trimmed.split_once("/repos/") {
        Some((_, full_name)) => full_name.to_string(),
        None => trimmed
            .rsplitn(3, '/')
            .take(2)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect::<Vec<_>>()
            .join("/"),
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
