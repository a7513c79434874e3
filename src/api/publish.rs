//! Purpose: Publish a converted dataset to a registry as an ordered sequence of steps.
//! Exports: `DatasetRegistry`, `PublishRequest`, `PublishReport`, `PublishStep`, `StepStatus`,
//!          `publish`.
//! Role: Orchestration behind `essayset upload`; transport lives behind `DatasetRegistry`.
//! Invariants: Steps run as login, create-repo, upload, readme; the first three halt on failure.
//! Invariants: The local dataset must load before any registry call is made.
//! Invariants: README problems never fail the run; they become notices on the report.
//! Invariants: Only `dataset/`, `dataset_info.json` and `README.md` leave the output root.
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::dataset::{DATASET_DIR, INFO_FILE, README_FILE, load_dataset};
use super::hub::{CommitReport, HubClient, Identity, RepoId, UploadedFile};
use crate::core::error::{Error, ErrorKind};

pub const STEP_LOGIN: &str = "login";
pub const STEP_CREATE_REPO: &str = "create-repo";
pub const STEP_UPLOAD: &str = "upload";
pub const STEP_README: &str = "readme";

/// Registry operations used by `publish`.
pub trait DatasetRegistry {
    fn whoami(&self) -> Result<Identity, Error>;
    fn create_repository(&self, repo_id: &RepoId, private: bool) -> Result<String, Error>;
    fn upload_folder(
        &self,
        folder: &Path,
        path_in_repo: &str,
        repo_id: &RepoId,
        summary: &str,
    ) -> Result<CommitReport, Error>;
    fn upload_file(
        &self,
        path: &Path,
        path_in_repo: &str,
        repo_id: &RepoId,
        summary: &str,
    ) -> Result<CommitReport, Error>;
    fn repo_url(&self, repo_id: &RepoId) -> String;
}

impl DatasetRegistry for HubClient {
    fn whoami(&self) -> Result<Identity, Error> {
        HubClient::whoami(self)
    }

    fn create_repository(&self, repo_id: &RepoId, private: bool) -> Result<String, Error> {
        HubClient::create_repository(self, repo_id, private)
    }

    fn upload_folder(
        &self,
        folder: &Path,
        path_in_repo: &str,
        repo_id: &RepoId,
        summary: &str,
    ) -> Result<CommitReport, Error> {
        HubClient::upload_folder(self, folder, path_in_repo, repo_id, summary)
    }

    fn upload_file(
        &self,
        path: &Path,
        path_in_repo: &str,
        repo_id: &RepoId,
        summary: &str,
    ) -> Result<CommitReport, Error> {
        HubClient::upload_file(self, path, path_in_repo, repo_id, summary)
    }

    fn repo_url(&self, repo_id: &RepoId) -> String {
        HubClient::repo_url(self, repo_id)
    }
}

#[derive(Clone, Debug)]
pub struct PublishRequest {
    pub dataset: PathBuf,
    pub repo_id: RepoId,
    pub private: bool,
    pub summary: Option<String>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Ok,
    Failed,
    Skipped,
}

#[derive(Clone, Debug, Serialize)]
pub struct PublishStep {
    pub name: &'static str,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct PublishReport {
    pub repo_id: String,
    pub url: String,
    pub user: String,
    pub rows: usize,
    pub steps: Vec<PublishStep>,
    pub files: Vec<UploadedFile>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notices: Vec<String>,
}

impl PublishReport {
    pub fn step(&self, name: &str) -> Option<&PublishStep> {
        self.steps.iter().find(|step| step.name == name)
    }
}

pub fn publish<R: DatasetRegistry + ?Sized>(
    registry: &R,
    request: &PublishRequest,
) -> Result<PublishReport, Error> {
    let dataset = load_dataset(&request.dataset)?;
    let root = dataset.layout.root().to_path_buf();
    let repo_id = &request.repo_id;
    let summary = request
        .summary
        .clone()
        .unwrap_or_else(|| format!("Upload {}", dataset.name()));
    tracing::info!(repo = %repo_id, rows = dataset.store.len(), "publishing dataset");

    let mut steps = Vec::with_capacity(4);

    let identity = run_step(STEP_LOGIN, registry.whoami())?;
    steps.push(ok_step(STEP_LOGIN, Some(format!("as {}", identity.name))));

    let url = run_step(
        STEP_CREATE_REPO,
        registry.create_repository(repo_id, request.private),
    )?;
    steps.push(ok_step(STEP_CREATE_REPO, Some(url.clone())));

    let commit = run_step(
        STEP_UPLOAD,
        registry.upload_folder(&dataset.layout.dataset_dir(), DATASET_DIR, repo_id, &summary),
    )?;
    let mut files = commit.files;
    let info = dataset.layout.info_file();
    if info.is_file() {
        let commit = run_step(
            STEP_UPLOAD,
            registry.upload_file(&info, INFO_FILE, repo_id, &summary),
        )?;
        files.extend(commit.files);
    }
    steps.push(ok_step(STEP_UPLOAD, Some(format!("{} files", files.len()))));

    let mut notices = Vec::new();
    let readme = root.join(README_FILE);
    if readme.is_file() {
        match registry.upload_file(&readme, README_FILE, repo_id, "Upload README") {
            Ok(commit) => {
                files.extend(commit.files);
                steps.push(ok_step(STEP_README, None));
            }
            Err(err) => {
                tracing::warn!(error = %err, "README upload failed");
                notices.push(format!("README upload failed: {err}"));
                steps.push(PublishStep {
                    name: STEP_README,
                    status: StepStatus::Failed,
                    detail: Some(err.to_string()),
                });
            }
        }
    } else {
        notices.push(format!("{} not found; skipped README upload", readme.display()));
        steps.push(PublishStep {
            name: STEP_README,
            status: StepStatus::Skipped,
            detail: Some("README.md not found".to_string()),
        });
    }

    Ok(PublishReport {
        repo_id: repo_id.to_string(),
        url: if url.is_empty() {
            registry.repo_url(repo_id)
        } else {
            url
        },
        user: identity.name,
        rows: dataset.store.len(),
        steps,
        files,
        notices,
    })
}

fn run_step<T>(step: &'static str, result: Result<T, Error>) -> Result<T, Error> {
    result.map_err(|err| {
        tracing::error!(step, error = %err, "publish step failed");
        let mut wrapped = Error::new(ErrorKind::Registry)
            .with_message(format!(
                "{step} failed: {}",
                err.message().unwrap_or("registry error")
            ))
            .with_step(step);
        if let Some(hint) = err.hint() {
            wrapped = wrapped.with_hint(hint.to_string());
        }
        wrapped.with_source(err)
    })
}

fn ok_step(name: &'static str, detail: Option<String>) -> PublishStep {
    PublishStep {
        name,
        status: StepStatus::Ok,
        detail,
    }
}

#[cfg(test)]
mod tests {
    use super::{
        DatasetRegistry, PublishRequest, STEP_CREATE_REPO, STEP_README, STEP_UPLOAD, StepStatus,
        publish,
    };
    use crate::api::dataset::{DatasetInfo, README_FILE, save_dataset};
    use crate::api::hub::{CommitReport, Identity, RepoId, UploadedFile};
    use crate::core::error::{Error, ErrorKind};
    use crate::core::normalize::normalize;
    use crate::core::schema::essay_schema;
    use crate::core::table::{RawTable, RawValue};
    use std::cell::RefCell;
    use std::path::Path;

    #[derive(Default)]
    struct FakeRegistry {
        fail: Option<&'static str>,
        calls: RefCell<Vec<String>>,
    }

    impl FakeRegistry {
        fn failing(step: &'static str) -> Self {
            Self {
                fail: Some(step),
                ..Self::default()
            }
        }

        fn record(&self, step: &'static str) -> Result<(), Error> {
            self.calls.borrow_mut().push(step.to_string());
            if self.fail == Some(step) {
                return Err(Error::new(ErrorKind::Permission).with_message("denied"));
            }
            Ok(())
        }
    }

    impl DatasetRegistry for FakeRegistry {
        fn whoami(&self) -> Result<Identity, Error> {
            self.record("login")?;
            Ok(Identity {
                name: "alice".to_string(),
                kind: Some("user".to_string()),
            })
        }

        fn create_repository(&self, repo_id: &RepoId, _private: bool) -> Result<String, Error> {
            self.record("create-repo")?;
            Ok(self.repo_url(repo_id))
        }

        fn upload_folder(
            &self,
            folder: &Path,
            path_in_repo: &str,
            _repo_id: &RepoId,
            _summary: &str,
        ) -> Result<CommitReport, Error> {
            self.record("upload")?;
            assert!(folder.join("dataset_dict.json").is_file());
            assert_eq!(path_in_repo, "dataset");
            Ok(CommitReport {
                files: vec![UploadedFile {
                    path_in_repo: "dataset/train/data.jsonl".to_string(),
                    size: 1,
                    sha256: "00".to_string(),
                }],
                commit_url: None,
            })
        }

        fn upload_file(
            &self,
            path: &Path,
            path_in_repo: &str,
            _repo_id: &RepoId,
            _summary: &str,
        ) -> Result<CommitReport, Error> {
            assert!(path.is_file());
            if path_in_repo == README_FILE {
                self.record("readme")?;
            } else {
                self.record("upload-info")?;
            }
            Ok(CommitReport {
                files: vec![UploadedFile {
                    path_in_repo: path_in_repo.to_string(),
                    size: 1,
                    sha256: "11".to_string(),
                }],
                commit_url: None,
            })
        }

        fn repo_url(&self, repo_id: &RepoId) -> String {
            format!("https://registry.test/datasets/{repo_id}")
        }
    }

    fn dataset_dir() -> tempfile::TempDir {
        let temp = tempfile::tempdir().expect("tempdir");
        let table = RawTable::new(
            vec!["Essay_id".to_string(), "Essay".to_string()],
            vec![vec![RawValue::Int(1), RawValue::Text("text".to_string())]],
        );
        let store = normalize(&table, essay_schema()).expect("normalize");
        save_dataset(&store, &DatasetInfo::for_store(&store), temp.path()).expect("save");
        temp
    }

    fn request(path: &Path) -> PublishRequest {
        PublishRequest {
            dataset: path.to_path_buf(),
            repo_id: "alice/essays".parse().expect("repo"),
            private: false,
            summary: None,
        }
    }

    #[test]
    fn successful_publish_runs_all_steps_in_order() {
        let temp = dataset_dir();
        let registry = FakeRegistry::default();
        let report = publish(&registry, &request(temp.path())).expect("publish");
        assert_eq!(
            *registry.calls.borrow(),
            vec!["login", "create-repo", "upload", "upload-info", "readme"]
        );
        assert!(report.steps.iter().all(|step| step.status == StepStatus::Ok));
        let paths: Vec<&str> = report
            .files
            .iter()
            .map(|file| file.path_in_repo.as_str())
            .collect();
        assert_eq!(
            paths,
            vec!["dataset/train/data.jsonl", "dataset_info.json", "README.md"]
        );
        assert_eq!(report.user, "alice");
        assert_eq!(report.rows, 1);
        assert_eq!(report.url, "https://registry.test/datasets/alice/essays");
        assert!(report.notices.is_empty());
    }

    #[test]
    fn create_repo_failure_halts_before_upload() {
        let temp = dataset_dir();
        let registry = FakeRegistry::failing("create-repo");
        let err = publish(&registry, &request(temp.path())).expect_err("halt");
        assert_eq!(err.kind(), ErrorKind::Registry);
        assert_eq!(err.step(), Some(STEP_CREATE_REPO));
        assert_eq!(*registry.calls.borrow(), vec!["login", "create-repo"]);
    }

    #[test]
    fn upload_failure_names_the_step() {
        let temp = dataset_dir();
        let registry = FakeRegistry::failing("upload");
        let err = publish(&registry, &request(temp.path())).expect_err("halt");
        assert_eq!(err.step(), Some(STEP_UPLOAD));
    }

    #[test]
    fn readme_failure_is_a_notice() {
        let temp = dataset_dir();
        let registry = FakeRegistry::failing("readme");
        let report = publish(&registry, &request(temp.path())).expect("publish");
        assert_eq!(
            report.step(STEP_README).map(|step| step.status),
            Some(StepStatus::Failed)
        );
        assert_eq!(report.notices.len(), 1);
        assert_eq!(report.files.len(), 2);
    }

    #[test]
    fn missing_readme_is_skipped() {
        let temp = dataset_dir();
        std::fs::remove_file(temp.path().join(README_FILE)).expect("remove");
        let registry = FakeRegistry::default();
        let report = publish(&registry, &request(temp.path())).expect("publish");
        assert_eq!(
            report.step(STEP_README).map(|step| step.status),
            Some(StepStatus::Skipped)
        );
        assert_eq!(
            *registry.calls.borrow(),
            vec!["login", "create-repo", "upload", "upload-info"]
        );
    }

    #[test]
    fn stray_files_in_output_root_stay_local() {
        let temp = dataset_dir();
        std::fs::write(temp.path().join("notes.txt"), "private").expect("write");
        std::fs::write(temp.path().join(".DS_Store"), "x").expect("write");
        let registry = FakeRegistry::default();
        let report = publish(&registry, &request(&temp.path().join("dataset"))).expect("publish");
        assert!(
            report
                .files
                .iter()
                .all(|file| file.path_in_repo != "notes.txt" && file.path_in_repo != ".DS_Store")
        );
        assert_eq!(report.step(STEP_UPLOAD).map(|step| step.status), Some(StepStatus::Ok));
    }

    #[test]
    fn info_upload_failure_halts_at_upload() {
        let temp = dataset_dir();
        let registry = FakeRegistry::failing("upload-info");
        let err = publish(&registry, &request(temp.path())).expect_err("halt");
        assert_eq!(err.step(), Some(STEP_UPLOAD));
        assert!(!registry.calls.borrow().contains(&"readme".to_string()));
    }

    #[test]
    fn missing_dataset_fails_before_login() {
        let temp = tempfile::tempdir().expect("tempdir");
        let registry = FakeRegistry::default();
        let err = publish(&registry, &request(temp.path())).expect_err("missing");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(registry.calls.borrow().is_empty());
    }
}
