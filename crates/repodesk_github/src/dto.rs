//! GitHub REST payloads and their conversion into the core model.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use repodesk_core::{
    BranchRef, CommitRecord, FileNode, FileWrite, GatewayError, RepositoryRef, User,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub(crate) struct UserDto {
    pub login: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

impl From<UserDto> for User {
    fn from(dto: UserDto) -> Self {
        User {
            login: dto.login,
            name: dto.name,
            avatar_url: dto.avatar_url,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct OwnerDto {
    pub login: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RepositoryDto {
    pub name: String,
    pub owner: OwnerDto,
    pub default_branch: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub private: bool,
}

impl From<RepositoryDto> for RepositoryRef {
    fn from(dto: RepositoryDto) -> Self {
        RepositoryRef {
            owner: dto.owner.login,
            name: dto.name,
            default_branch: dto.default_branch.unwrap_or_else(|| "main".to_string()),
            description: dto.description,
            private: dto.private,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ShaDto {
    pub sha: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BranchDto {
    pub name: String,
    pub commit: ShaDto,
}

impl From<BranchDto> for BranchRef {
    fn from(dto: BranchDto) -> Self {
        BranchRef::new(dto.name, dto.commit.sha)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ContentItemDto {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub sha: Option<String>,
    pub size: Option<u64>,
}

impl From<ContentItemDto> for FileNode {
    fn from(dto: ContentItemDto) -> Self {
        match dto.kind.as_str() {
            "dir" => FileNode::directory(dto.path),
            _ => FileNode::file(dto.path, dto.sha, dto.size),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct FileContentDto {
    pub content: Option<String>,
    pub encoding: Option<String>,
}

impl FileContentDto {
    /// Decode the file body. GitHub wraps base64 at 60 columns.
    pub fn into_text(self) -> Result<String, GatewayError> {
        match self.encoding.as_deref() {
            Some("base64") => {}
            Some(other) => {
                return Err(GatewayError::Decode(format!(
                    "unsupported content encoding '{other}'"
                )));
            }
            None => return Err(GatewayError::Decode("missing content encoding".to_string())),
        }
        let compact: String = self
            .content
            .unwrap_or_default()
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        let bytes = STANDARD
            .decode(compact)
            .map_err(|e| GatewayError::Decode(format!("invalid base64 content: {e}")))?;
        String::from_utf8(bytes)
            .map_err(|_| GatewayError::Decode("file is not valid UTF-8 text".to_string()))
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct PutContentRequest<'a> {
    pub message: &'a str,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<&'a str>,
}

impl<'a> PutContentRequest<'a> {
    pub fn new(message: &'a str, text: &str) -> Self {
        Self {
            message,
            content: STANDARD.encode(text.as_bytes()),
            sha: None,
            branch: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct PutContentResponse {
    pub content: Option<ShaDto>,
    pub commit: Option<ShaDto>,
}

impl From<PutContentResponse> for FileWrite {
    fn from(dto: PutContentResponse) -> Self {
        FileWrite {
            sha: dto.content.map(|c| c.sha),
            commit: dto.commit.map(|c| c.sha),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateRepositoryRequest<'a> {
    pub name: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    pub description: &'a str,
    pub private: bool,
    pub auto_init: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateRefRequest {
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub sha: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RefDto {
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub object: ShaDto,
}

impl From<RefDto> for BranchRef {
    fn from(dto: RefDto) -> Self {
        let name = dto
            .git_ref
            .strip_prefix("refs/heads/")
            .unwrap_or(&dto.git_ref)
            .to_string();
        BranchRef::new(name, dto.object.sha)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CommitAuthorDto {
    pub name: Option<String>,
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CommitDetailDto {
    pub message: String,
    pub author: Option<CommitAuthorDto>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CommitDto {
    pub sha: String,
    pub commit: CommitDetailDto,
    pub author: Option<OwnerDto>,
}

impl From<CommitDto> for CommitRecord {
    fn from(dto: CommitDto) -> Self {
        let (name, date) = match dto.commit.author {
            Some(author) => (author.name, author.date),
            None => (None, None),
        };
        let author = name
            .or_else(|| dto.author.map(|a| a.login))
            .unwrap_or_else(|| "unknown".to_string());
        CommitRecord {
            sha: dto.sha,
            message: dto.commit.message,
            author,
            timestamp: date.unwrap_or_default(),
        }
    }
}

/// `{"message": "..."}` body GitHub sends with most errors.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorDto {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use repodesk_core::NodeKind;

    #[test]
    fn test_repository_from_json() {
        let json = r#"{
            "name": "site",
            "full_name": "octo/site",
            "owner": {"login": "octo", "id": 1},
            "default_branch": "trunk",
            "description": null,
            "private": true
        }"#;
        let repo: RepositoryRef = serde_json::from_str::<RepositoryDto>(json).unwrap().into();
        assert_eq!(repo.full_name(), "octo/site");
        assert_eq!(repo.default_branch, "trunk");
        assert!(repo.private);
    }

    #[test]
    fn test_contents_kinds() {
        let json = r#"[
            {"name": "src", "path": "src", "type": "dir", "sha": "d1", "size": 0},
            {"name": "index.html", "path": "index.html", "type": "file", "sha": "f1", "size": 42}
        ]"#;
        let nodes: Vec<FileNode> = serde_json::from_str::<Vec<ContentItemDto>>(json)
            .unwrap()
            .into_iter()
            .map(FileNode::from)
            .collect();
        assert!(nodes[0].is_dir());
        assert_eq!(
            nodes[1].kind,
            NodeKind::File {
                sha: Some("f1".into()),
                size: Some(42)
            }
        );
    }

    #[test]
    fn test_wrapped_base64_decodes() {
        let dto = FileContentDto {
            content: Some("PGgxPmhp\nPC9oMT4=\n".to_string()),
            encoding: Some("base64".to_string()),
        };
        assert_eq!(dto.into_text().unwrap(), "<h1>hi</h1>");
    }

    #[test]
    fn test_oversized_files_are_rejected() {
        let dto = FileContentDto {
            content: Some(String::new()),
            encoding: Some("none".to_string()),
        };
        assert!(matches!(dto.into_text(), Err(GatewayError::Decode(_))));
    }

    #[test]
    fn test_put_request_omits_missing_sha() {
        let request = PutContentRequest::new("Add a.txt", "hi");
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["content"], "aGk=");
        assert!(json.get("sha").is_none());
        assert!(json.get("branch").is_none());
    }

    #[test]
    fn test_commit_author_falls_back_to_login() {
        let json = r#"{
            "sha": "abc",
            "commit": {"message": "Update index.html", "author": null},
            "author": {"login": "octo"}
        }"#;
        let record: CommitRecord = serde_json::from_str::<CommitDto>(json).unwrap().into();
        assert_eq!(record.author, "octo");
        assert_eq!(record.timestamp, DateTime::<Utc>::default());
    }

    #[test]
    fn test_ref_name_is_stripped() {
        let json = r#"{"ref": "refs/heads/feature-x", "object": {"sha": "abc123"}}"#;
        let branch: BranchRef = serde_json::from_str::<RefDto>(json).unwrap().into();
        assert_eq!(branch, BranchRef::new("feature-x", "abc123"));
    }
}
