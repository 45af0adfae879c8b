use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use common::{AppError, DateRange, Result};
use gh_broker::model::parse_next_link;
use gh_broker::GithubBroker;
use http::{header, Request};
use normalizer::{
    normalize_pull_request, normalize_user, MemberPayload, NormalizedPullRequest, NormalizedUser,
    SearchPage, UserPayload,
};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};
use url::Url;

/// Read side of the GitHub REST API used by the monitor.
#[async_trait]
pub trait GithubClient: Send + Sync {
    /// Team members in the order GitHub returns them, enriched with profile details.
    async fn fetch_team_members(&self, org: &str, team: &str) -> Result<Vec<NormalizedUser>>;

    /// Pull requests authored by `members` and created within `range` (UTC days).
    async fn fetch_pull_requests(
        &self,
        org: &str,
        members: &[String],
        range: DateRange,
    ) -> Result<Vec<NormalizedPullRequest>>;
}

pub struct BrokerGithubClient {
    broker: Arc<dyn GithubBroker>,
    base: Url,
    user_agent: String,
    page_size: u32,
}

impl BrokerGithubClient {
    pub fn new(
        broker: Arc<dyn GithubBroker>,
        api_base: &str,
        user_agent: impl Into<String>,
        page_size: u32,
    ) -> Result<Self> {
        let mut base = api_base.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base = Url::parse(&base)
            .map_err(|err| AppError::config(format!("invalid github.api_base {api_base:?}: {err}")))?;
        Ok(Self {
            broker,
            base,
            user_agent: user_agent.into(),
            page_size: page_size.clamp(1, 100),
        })
    }

    fn join(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|err| AppError::config(format!("invalid endpoint {path}: {err}")))
    }

    fn with_query(url: &mut Url, params: &[(&str, String)]) {
        let mut query_pairs = url.query_pairs_mut();
        for (key, val) in params {
            query_pairs.append_pair(key, val);
        }
    }

    /// Decoded body plus the `rel="next"` page, if any.
    async fn get_page<T: DeserializeOwned>(&self, url: Url) -> Result<(T, Option<Url>)> {
        let endpoint = url.path().trim_start_matches('/').to_string();
        debug!(endpoint = %endpoint, url = %url, "dispatching GitHub request");

        let uri: http::Uri = url.as_str().parse().map_err(AppError::http)?;
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .header(header::USER_AGENT, self.user_agent.as_str())
            .header(header::ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .body(Vec::new())
            .map_err(AppError::http)?;

        let response = self.broker.execute(request).await?;
        let next = parse_next_link(response.headers())
            .map(|link| Url::parse(&link))
            .transpose()
            .map_err(|err| AppError::http(anyhow!("bad next link from {endpoint}: {err}")))?;
        let body = serde_json::from_slice(response.body())
            .map_err(|err| AppError::http(anyhow!("undecodable body from {endpoint}: {err}")))?;
        Ok((body, next))
    }

    async fn get_all<T: DeserializeOwned>(&self, first: Url) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut next = Some(first);
        while let Some(url) = next {
            let (page, following): (Vec<T>, _) = self.get_page(url).await?;
            items.extend(page);
            next = following;
        }
        Ok(items)
    }

    async fn fetch_user_details(&self, member: &MemberPayload) -> Result<NormalizedUser> {
        let url = self.join(&format!("users/{}", member.login))?;
        match self.get_page::<UserPayload>(url).await {
            Ok((payload, _)) => Ok(normalize_user(&payload)),
            Err(AppError::NotFound(endpoint)) => {
                warn!(login = %member.login, endpoint = %endpoint, "user profile missing; using login only");
                Ok(NormalizedUser {
                    login: member.login.clone(),
                    display_name: None,
                    email: None,
                })
            }
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl GithubClient for BrokerGithubClient {
    #[instrument(skip(self))]
    async fn fetch_team_members(&self, org: &str, team: &str) -> Result<Vec<NormalizedUser>> {
        let mut url = self.join(&format!("orgs/{org}/teams/{team}/members"))?;
        Self::with_query(&mut url, &[("per_page", self.page_size.to_string())]);
        let members: Vec<MemberPayload> = self.get_all(url).await?;
        debug!(count = members.len(), "fetched team members");

        let mut users = Vec::with_capacity(members.len());
        for member in &members {
            users.push(self.fetch_user_details(member).await?);
        }
        Ok(users)
    }

    #[instrument(skip(self, members), fields(members = members.len(), %range))]
    async fn fetch_pull_requests(
        &self,
        org: &str,
        members: &[String],
        range: DateRange,
    ) -> Result<Vec<NormalizedPullRequest>> {
        let team: HashSet<&str> = members.iter().map(String::as_str).collect();
        // Search and cache windows work in UTC days. Local days west of UTC end
        // after `to`, so their evening is only cached once the next UTC day is fetched.
        let (from, to) = range.utc_bounds();
        let mut found: BTreeMap<i64, NormalizedPullRequest> = BTreeMap::new();

        for login in members {
            let mut url = self.join("search/issues")?;
            let query = format!(
                "is:pr org:{org} author:{login} created:{}..{}",
                range.start(),
                range.end()
            );
            Self::with_query(
                &mut url,
                &[("q", query), ("per_page", self.page_size.to_string())],
            );

            let mut next = Some(url);
            while let Some(page_url) = next {
                let (page, following): (SearchPage, _) = self.get_page(page_url).await?;
                if page.incomplete_results {
                    warn!(login = %login, total = page.total_count, "search results incomplete");
                }
                for item in &page.items {
                    let Some(pr) = normalize_pull_request(item) else {
                        continue;
                    };
                    if !team.contains(pr.author_login.as_str())
                        || pr.created_at_utc < from
                        || pr.created_at_utc >= to
                    {
                        continue;
                    }
                    found.insert(pr.id, pr);
                }
                next = following;
            }
        }

        let mut prs: Vec<_> = found.into_values().collect();
        prs.sort_by(|a, b| a.created_at_utc.cmp(&b.created_at_utc).then(a.id.cmp(&b.id)));
        debug!(count = prs.len(), "fetched pull requests");
        Ok(prs)
    }
}
