use std::sync::OnceLock;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use repodesk_core::{
    BranchRef, CommitRecord, FileNode, FileWrite, GatewayError, GatewayResult, RemoteGateway,
    RepositoryRef, User,
};

use crate::config::{ConfigError, GitHubConfig};
use crate::dto::{
    ApiErrorDto, BranchDto, CommitDto, ContentItemDto, CreateRefRequest,
    CreateRepositoryRequest, FileContentDto, PutContentRequest, PutContentResponse, RefDto,
    RepositoryDto, UserDto,
};

const API_VERSION: &str = "2022-11-28";
const PAGE_SIZE: &str = "100";

/// [`RemoteGateway`] over the GitHub REST API.
///
/// Every method is exactly one HTTP request and never retries.
pub struct GitHubGateway {
    client: reqwest::Client,
    base_url: Url,
    token: String,
    /// Login of the token's owner, learned from the first `/user` call.
    login: OnceLock<String>,
}

impl GitHubGateway {
    /// Build a gateway from `config`.
    pub fn new(config: &GitHubConfig) -> Result<Self, ConfigError> {
        let base_url = Url::parse(&config.api_url)
            .map_err(|_| ConfigError::InvalidApiUrl(config.api_url.clone()))?;
        if base_url.cannot_be_a_base() {
            return Err(ConfigError::InvalidApiUrl(config.api_url.clone()));
        }
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            token: config.token.clone(),
            login: OnceLock::new(),
        })
    }

    /// Build a gateway from the environment (see [`GitHubConfig::from_env`]).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::new(&GitHubConfig::from_env()?)
    }

    /// The API URL for `segments`, each percent-encoded on its own.
    fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty()
                .extend(segments.into_iter().filter(|s| !s.is_empty()));
        }
        url
    }

    fn contents_url(&self, owner: &str, repo: &str, path: &str) -> Url {
        self.endpoint(
            ["repos", owner, repo, "contents"]
                .into_iter()
                .chain(path.split('/')),
        )
    }

    async fn send(&self, request: RequestBuilder) -> GatewayResult<Response> {
        let response = request
            .bearer_auth(&self.token)
            .header(ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let url = response.url().path().to_string();
        let body = response.text().await.unwrap_or_default();
        let error = status_error(status, &body);
        if status.is_server_error() {
            warn!("GitHub {} failed: {} {}", url, status, body);
        } else {
            debug!("GitHub {} failed: {}", url, error);
        }
        Err(error)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> GatewayResult<T> {
        let response = self.send(self.client.get(url)).await?;
        decode(response).await
    }

    /// Login learned by the last successful `get_user`.
    fn login(&self) -> GatewayResult<String> {
        self.login
            .get()
            .cloned()
            .ok_or_else(|| GatewayError::Auth("not signed in; call get_user first".to_string()))
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> GatewayResult<T> {
    response
        .json::<T>()
        .await
        .map_err(|e| GatewayError::Decode(e.to_string()))
}

/// Map a non-success status to the gateway error taxonomy.
pub fn status_error(status: StatusCode, body: &str) -> GatewayError {
    let message = serde_json::from_str::<ApiErrorDto>(body)
        .map(|e| e.message)
        .unwrap_or_else(|_| status.to_string());
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GatewayError::Auth(message),
        StatusCode::NOT_FOUND => GatewayError::NotFound(message),
        StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => GatewayError::Conflict(message),
        StatusCode::UNPROCESSABLE_ENTITY | StatusCode::BAD_REQUEST => {
            GatewayError::Validation(message)
        }
        _ => GatewayError::Network(format!("{status}: {message}")),
    }
}

#[async_trait]
impl RemoteGateway for GitHubGateway {
    async fn get_user(&self) -> GatewayResult<User> {
        let user: User = self
            .get_json::<UserDto>(self.endpoint(["user"]))
            .await?
            .into();
        let _ = self.login.set(user.login.clone());
        Ok(user)
    }

    async fn list_repositories(&self) -> GatewayResult<Vec<RepositoryRef>> {
        let mut url = self.endpoint(["user", "repos"]);
        url.query_pairs_mut()
            .append_pair("per_page", PAGE_SIZE)
            .append_pair("sort", "updated");
        let repos: Vec<RepositoryDto> = self.get_json(url).await?;
        debug!("Listed {} repositories", repos.len());
        Ok(repos.into_iter().map(RepositoryRef::from).collect())
    }

    async fn list_branches(&self, owner: &str, repo: &str) -> GatewayResult<Vec<BranchRef>> {
        let mut url = self.endpoint(["repos", owner, repo, "branches"]);
        url.query_pairs_mut().append_pair("per_page", PAGE_SIZE);
        let branches: Vec<BranchDto> = self.get_json(url).await?;
        Ok(branches.into_iter().map(BranchRef::from).collect())
    }

    async fn list_contents(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        git_ref: &str,
    ) -> GatewayResult<Vec<FileNode>> {
        let mut url = self.contents_url(owner, repo, path);
        url.query_pairs_mut().append_pair("ref", git_ref);
        let response = self.send(self.client.get(url)).await?;

        // A file path answers with a single object instead of a listing.
        let value: serde_json::Value = decode(response).await?;
        if !value.is_array() {
            return Err(GatewayError::Decode(format!("'{path}' is not a directory")));
        }
        let items: Vec<ContentItemDto> =
            serde_json::from_value(value).map_err(|e| GatewayError::Decode(e.to_string()))?;
        Ok(items.into_iter().map(FileNode::from).collect())
    }

    async fn get_file_content(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        git_ref: &str,
    ) -> GatewayResult<String> {
        let mut url = self.contents_url(owner, repo, path);
        url.query_pairs_mut().append_pair("ref", git_ref);
        let dto: FileContentDto = self.get_json(url).await?;
        dto.into_text()
    }

    async fn update_file(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        content: &str,
        message: &str,
        known_sha: Option<&str>,
        branch: &str,
    ) -> GatewayResult<FileWrite> {
        let mut body = PutContentRequest::new(message, content);
        body.sha = known_sha;
        body.branch = Some(branch);

        let url = self.contents_url(owner, repo, path);
        let response = self.send(self.client.put(url).json(&body)).await?;
        let write: FileWrite = decode::<PutContentResponse>(response).await?.into();
        info!("Updated {}/{}:{} on {}", owner, repo, path, branch);
        Ok(write)
    }

    async fn create_file(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        content: &str,
        message: &str,
    ) -> GatewayResult<FileWrite> {
        let body = PutContentRequest::new(message, content);
        let url = self.contents_url(owner, repo, path);
        let response = self.send(self.client.put(url).json(&body)).await?;
        let write: FileWrite = decode::<PutContentResponse>(response).await?.into();
        info!("Created {}/{}:{}", owner, repo, path);
        Ok(write)
    }

    async fn create_repository(
        &self,
        name: &str,
        description: &str,
        private: bool,
    ) -> GatewayResult<RepositoryRef> {
        let body = CreateRepositoryRequest {
            name,
            description,
            private,
            auto_init: false,
        };
        let url = self.endpoint(["user", "repos"]);
        let response = self.send(self.client.post(url).json(&body)).await?;
        let repo: RepositoryRef = decode::<RepositoryDto>(response).await?.into();
        info!("Created repository {}", repo.full_name());
        Ok(repo)
    }

    /// Looks `name` up under the signed-in account, so `get_user` must have
    /// succeeded first.
    async fn repository_exists(&self, name: &str) -> GatewayResult<bool> {
        let owner = self.login()?;
        let url = self.endpoint(["repos", owner.as_str(), name]);
        match self.send(self.client.get(url)).await {
            Ok(_) => Ok(true),
            Err(GatewayError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn create_branch(
        &self,
        owner: &str,
        repo: &str,
        name: &str,
        base_commit: &str,
    ) -> GatewayResult<BranchRef> {
        let body = CreateRefRequest {
            git_ref: format!("refs/heads/{name}"),
            sha: base_commit.to_string(),
        };
        let url = self.endpoint(["repos", owner, repo, "git", "refs"]);
        let response = self.send(self.client.post(url).json(&body)).await?;
        let branch: BranchRef = decode::<RefDto>(response).await?.into();
        info!("Created branch {} on {}/{}", branch.name, owner, repo);
        Ok(branch)
    }

    async fn list_commits(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> GatewayResult<Vec<CommitRecord>> {
        let mut url = self.endpoint(["repos", owner, repo, "commits"]);
        url.query_pairs_mut()
            .append_pair("sha", branch)
            .append_pair("per_page", PAGE_SIZE);
        match self.get_json::<Vec<CommitDto>>(url).await {
            Ok(commits) => Ok(commits.into_iter().map(CommitRecord::from).collect()),
            // An empty repository has no history yet.
            Err(GatewayError::Conflict(message)) => {
                debug!("No history for {}/{}: {}", owner, repo, message);
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }
}
