//! End-to-end attempts against throwaway repositories.
//!
//! Requires the `git`, `tar`, `gzip`, `bzip2`, `zip` and `unzip` binaries.

use async_trait::async_trait;
use bytes::Bytes;
use patchbot_config::PatchbotConfig;
use patchbot_core::resolver::{PatchMessage, PatchSource, ThreadResolver};
use patchbot_core::{AttemptError, Submission, SubmissionKey, SubmissionStatus};
use patchbot_git::{PatchPipeline, Pipeline};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const ARCHIVE: &str = "https://archive.example.org/message-id/attachment";
const BRANCH: &str = "commitfest/52/4101";

fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).unwrap()
}

/// Serves one message and its attachments from memory.
#[derive(Default)]
struct FakeArchive {
    message: Option<PatchMessage>,
    files: HashMap<String, Bytes>,
    fetched: Mutex<Vec<String>>,
}

impl FakeArchive {
    fn with_patches(message_id: &str, patches: &[(&str, Vec<u8>)]) -> Self {
        let mut archive = FakeArchive::default();
        let mut attachments = Vec::new();
        for (i, (name, body)) in patches.iter().enumerate() {
            let url = format!("{ARCHIVE}/{}/{}", 100 + i, name);
            archive.files.insert(url.clone(), Bytes::from(body.clone()));
            attachments.push(url);
        }
        archive.message = Some(PatchMessage {
            message_id: message_id.to_string(),
            attachments,
        });
        archive
    }

    fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl ThreadResolver for FakeArchive {
    async fn thread_url(&self, _key: &SubmissionKey) -> Result<Option<String>, AttemptError> {
        Ok(self
            .message
            .as_ref()
            .map(|m| format!("https://archive.example.org/message-id/flat/{}", m.message_id)))
    }

    async fn latest_patch_message(
        &self,
        _thread_url: &str,
    ) -> Result<Option<PatchMessage>, AttemptError> {
        Ok(self.message.clone())
    }
}

#[async_trait]
impl PatchSource for FakeArchive {
    async fn fetch(&self, url: &str) -> Result<Bytes, AttemptError> {
        self.fetched.lock().unwrap().push(url.to_string());
        self.files.get(url).cloned().ok_or_else(|| AttemptError::Fetch {
            url: url.to_string(),
            message: "HTTP 404".to_string(),
        })
    }
}

/// An upstream checkout on `master` with two files, a bare remote, and a
/// patches directory.
struct Fixture {
    _tmp: TempDir,
    upstream: PathBuf,
    remote: PathBuf,
    patches: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let upstream = tmp.path().join("upstream");
        let remote = tmp.path().join("remote.git");
        let patches = tmp.path().join("patches");
        std::fs::create_dir_all(&upstream).unwrap();
        std::fs::create_dir_all(&remote).unwrap();

        git(&upstream, &["init", "-q", "-b", "master"]);
        git(&upstream, &["config", "user.name", "Patch Bot"]);
        git(&upstream, &["config", "user.email", "bot@example.org"]);
        git(&upstream, &["config", "commit.gpgsign", "false"]);
        std::fs::write(upstream.join("a.txt"), "one\ntwo\nthree\n").unwrap();
        std::fs::write(upstream.join("b.txt"), "alpha\nbeta\n").unwrap();
        git(&upstream, &["add", "a.txt", "b.txt"]);
        git(&upstream, &["commit", "-q", "-m", "Initial"]);
        git(&remote, &["init", "-q", "--bare"]);

        Self {
            _tmp: tmp,
            upstream,
            remote,
            patches,
        }
    }

    fn config(&self, push: bool) -> PatchbotConfig {
        let mut config = PatchbotConfig::default();
        config.git.repo = self.upstream.clone();
        config.git.pull = false;
        config.git.remote = push.then(|| self.remote.display().to_string());
        config.paths.patches = self.patches.clone();
        config
    }

    /// `format-patch` mails for commits made on a scratch branch, which is
    /// then deleted.
    fn mail_patches(&self, edits: &[(&str, &str, &str)]) -> Vec<Vec<u8>> {
        git(&self.upstream, &["checkout", "-q", "-b", "scratch", "master"]);
        for &(file, contents, subject) in edits {
            std::fs::write(self.upstream.join(file), contents).unwrap();
            git(&self.upstream, &["add", file]);
            git(
                &self.upstream,
                &["commit", "-q", "--author", "Jane Doe <jane@example.org>", "-m", subject],
            );
        }
        let mails = (0..edits.len())
            .rev()
            .map(|skip| {
                let rev = format!("scratch~{skip}");
                git(&self.upstream, &["format-patch", "-1", "--stdout", &rev]).into_bytes()
            })
            .collect();
        git(&self.upstream, &["checkout", "-q", "master"]);
        git(&self.upstream, &["branch", "-q", "-D", "scratch"]);
        mails
    }

    /// A plain `git diff` for a change to a tracked file.
    fn raw_diff(&self, file: &str, contents: &str) -> Vec<u8> {
        std::fs::write(self.upstream.join(file), contents).unwrap();
        let diff = git(&self.upstream, &["diff"]);
        git(&self.upstream, &["checkout", "-q", "--", file]);
        diff.into_bytes()
    }

    fn commits_on_branch(&self) -> Vec<String> {
        let range = format!("master..{BRANCH}");
        git(&self.upstream, &["log", "--reverse", "--format=%an|%s", &range])
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn show(&self, spec: &str) -> String {
        git(&self.upstream, &["show", spec])
    }

    fn remote_has_branch(&self) -> bool {
        let refname = format!("refs/heads/{BRANCH}");
        !git(&self.remote, &["for-each-ref", &refname]).trim().is_empty()
    }
}

fn submission() -> Submission {
    let mut submission = Submission::new(
        SubmissionKey::new(52, 4101),
        "Improve a.txt",
        SubmissionStatus::NeedsReview,
    );
    submission.last_message_id = Some("v1@mail".to_string());
    submission
}

fn pipeline(fixture: &Fixture, archive: Arc<FakeArchive>, push: bool) -> PatchPipeline {
    PatchPipeline::new(&fixture.config(push), archive.clone(), archive)
}

#[tokio::test]
async fn test_mailbox_patch_becomes_one_commit_with_its_author() {
    let fixture = Fixture::new();
    let mails = fixture.mail_patches(&[("a.txt", "one\nTWO\nthree\n", "Shout two")]);
    let archive = Arc::new(FakeArchive::with_patches(
        "v1@mail",
        &[("0001-Shout-two.patch", mails[0].clone())],
    ));

    let published = pipeline(&fixture, archive, true)
        .run(&submission())
        .await
        .unwrap();

    assert_eq!(published.branch, BRANCH);
    assert_eq!(published.message_id, "v1@mail");
    assert!(published.pushed);
    assert_eq!(
        published.baseline_commit,
        git(&fixture.upstream, &["rev-parse", "master"]).trim()
    );
    assert_eq!(
        fixture.commits_on_branch(),
        vec!["Jane Doe|Shout two", "Patch Bot|[CF 52/4101] Improve a.txt"]
    );
    assert!(fixture.remote_has_branch());
}

#[tokio::test]
async fn test_raw_diff_is_committed_only_by_the_provenance_commit() {
    let fixture = Fixture::new();
    let diff = fixture.raw_diff("a.txt", "one\ntwo\nthree\nfour\n");
    let archive = Arc::new(FakeArchive::with_patches("v1@mail", &[("fix.diff", diff)]));

    pipeline(&fixture, archive, false)
        .run(&submission())
        .await
        .unwrap();

    assert_eq!(
        fixture.commits_on_branch(),
        vec!["Patch Bot|[CF 52/4101] Improve a.txt"]
    );
    let contents = fixture.show(&format!("{BRANCH}:a.txt"));
    assert_eq!(contents, "one\ntwo\nthree\nfour\n");
}

#[tokio::test]
async fn test_patches_apply_in_file_name_order() {
    let fixture = Fixture::new();
    let mails = fixture.mail_patches(&[
        ("a.txt", "one\ntwo\nthree\nfour\n", "Add four"),
        ("a.txt", "one\ntwo\nthree\nfour\nfive\n", "Add five"),
    ]);
    // Listed out of order in the message.
    let archive = Arc::new(FakeArchive::with_patches(
        "v1@mail",
        &[
            ("0002-Add-five.patch", mails[1].clone()),
            ("0001-Add-four.patch", mails[0].clone()),
        ],
    ));

    let published = pipeline(&fixture, archive, false)
        .run(&submission())
        .await
        .unwrap();

    assert_eq!(published.patches, 2);
    assert!(!published.pushed);
    assert_eq!(
        fixture.commits_on_branch(),
        vec![
            "Jane Doe|Add four",
            "Jane Doe|Add five",
            "Patch Bot|[CF 52/4101] Improve a.txt",
        ]
    );
}

#[tokio::test]
async fn test_failure_stops_at_the_failing_patch_and_never_pushes() {
    let fixture = Fixture::new();
    let good = fixture.mail_patches(&[("a.txt", "one\nTWO\nthree\n", "Shout two")]);
    let mut bad = fixture.mail_patches(&[("c.txt", "new file\n", "Add c")]);
    // Make the second patch modify a file that does not exist upstream.
    let text = String::from_utf8(bad.remove(0))
        .unwrap()
        .replace("new file mode 100644\n", "")
        .replace("--- /dev/null", "--- a/c.txt");
    let archive = Arc::new(FakeArchive::with_patches(
        "v1@mail",
        &[
            ("0001-Shout-two.patch", good[0].clone()),
            ("0002-Add-c.patch", text.into_bytes()),
        ],
    ));

    let err = pipeline(&fixture, archive, true)
        .run(&submission())
        .await
        .unwrap_err();

    match err {
        AttemptError::Apply { index, file, .. } => {
            assert_eq!(index, 1);
            assert_eq!(file, "0002-Add-c.patch");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(fixture.commits_on_branch(), vec!["Jane Doe|Shout two"]);
    assert!(!fixture.remote_has_branch());

    let log = std::fs::read_to_string(fixture.patches.join("52/4101/patch.log")).unwrap();
    assert!(log.contains("=== Failed (apply)"));
}

#[tokio::test]
async fn test_rebuilding_the_same_message_is_idempotent() {
    let fixture = Fixture::new();
    let mails = fixture.mail_patches(&[("a.txt", "one\nTWO\nthree\n", "Shout two")]);
    let diff = fixture.raw_diff("b.txt", "alpha\nbeta\ngamma\n");
    let archive = Arc::new(FakeArchive::with_patches(
        "v1@mail",
        &[("0001-Shout-two.patch", mails[0].clone()), ("0002-gamma.diff", diff)],
    ));
    let pipeline = pipeline(&fixture, archive, false);
    let tree = format!("{BRANCH}^{{tree}}");

    pipeline.run(&submission()).await.unwrap();
    let first = git(&fixture.upstream, &["rev-parse", &tree]);
    let first_commits = fixture.commits_on_branch();

    pipeline.run(&submission()).await.unwrap();
    let second = git(&fixture.upstream, &["rev-parse", &tree]);

    assert_eq!(first, second);
    assert_eq!(first_commits, fixture.commits_on_branch());

    let log = std::fs::read_to_string(fixture.patches.join("52/4101/patch.log")).unwrap();
    assert_eq!(log.matches("=== Applying patches on top of commit").count(), 2);
    assert!(log.contains("fetched 0001-Shout-two.patch sha256:"));
}

/// Stage `mail` as `v2/0001-Shout-two.patch`, run `program` in the staging
/// directory and return the bytes of `output`.
fn pack(mail: &[u8], program: &str, args: &[&str], output: &str) -> Vec<u8> {
    let staging = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(staging.path().join("v2")).unwrap();
    std::fs::write(staging.path().join("v2/0001-Shout-two.patch"), mail).unwrap();
    let status = Command::new(program)
        .args(args)
        .current_dir(staging.path())
        .status()
        .unwrap();
    assert!(status.success(), "{program} {args:?} failed");
    std::fs::read(staging.path().join(output)).unwrap()
}

async fn assert_packed_patch_applies(name: &str, packed: Vec<u8>) {
    let fixture = Fixture::new();
    let archive = Arc::new(FakeArchive::with_patches("v2@mail", &[(name, packed)]));
    let published = pipeline(&fixture, archive, false)
        .run(&submission())
        .await
        .unwrap();

    assert_eq!(published.message_id, "v2@mail");
    assert_eq!(published.patches, 1);
    assert_eq!(
        fixture.commits_on_branch(),
        vec!["Jane Doe|Shout two", "Patch Bot|[CF 52/4101] Improve a.txt"]
    );
}

fn shout_two_mail() -> Vec<u8> {
    let fixture = Fixture::new();
    fixture
        .mail_patches(&[("a.txt", "one\nTWO\nthree\n", "Shout two")])
        .remove(0)
}

#[tokio::test]
async fn test_tarball_contents_are_applied() {
    let tarball = pack(&shout_two_mail(), "tar", &["czf", "v2.tar.gz", "v2"], "v2.tar.gz");
    assert_packed_patch_applies("v2.tar.gz", tarball).await;
}

#[tokio::test]
async fn test_bzip2_tarball_contents_are_applied() {
    let tarball = pack(&shout_two_mail(), "tar", &["cjf", "v2.tar.bz2", "v2"], "v2.tar.bz2");
    assert_packed_patch_applies("v2.tar.bz2", tarball).await;
}

#[tokio::test]
async fn test_zip_contents_are_applied() {
    let zip = pack(&shout_two_mail(), "zip", &["-q", "-r", "v2.zip", "v2"], "v2.zip");
    assert_packed_patch_applies("v2.zip", zip).await;
}

#[tokio::test]
async fn test_gzipped_patch_is_applied() {
    let gzipped = pack(
        &shout_two_mail(),
        "gzip",
        &["-k", "v2/0001-Shout-two.patch"],
        "v2/0001-Shout-two.patch.gz",
    );
    assert_packed_patch_applies("0001-Shout-two.patch.gz", gzipped).await;
}

#[tokio::test]
async fn test_raw_diff_that_does_not_apply_leaves_the_index_clean() {
    let fixture = Fixture::new();
    let diff = "diff --git a/missing.txt b/missing.txt\n\
                --- a/missing.txt\n\
                +++ b/missing.txt\n\
                @@ -1 +1 @@\n\
                -old\n\
                +new\n";
    let archive = Arc::new(FakeArchive::with_patches(
        "v1@mail",
        &[("fix.diff", diff.as_bytes().to_vec())],
    ));

    let err = pipeline(&fixture, archive, true)
        .run(&submission())
        .await
        .unwrap_err();

    match err {
        AttemptError::Apply { index, file, .. } => {
            assert_eq!(index, 0);
            assert_eq!(file, "fix.diff");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(git(&fixture.upstream, &["diff", "--cached"]).is_empty());
    assert!(fixture.commits_on_branch().is_empty());
    assert!(!fixture.remote_has_branch());
}

#[tokio::test]
async fn test_push_failure_is_reported() {
    let fixture = Fixture::new();
    let mails = fixture.mail_patches(&[("a.txt", "one\nTWO\nthree\n", "Shout two")]);
    let archive = Arc::new(FakeArchive::with_patches(
        "v1@mail",
        &[("0001-Shout-two.patch", mails[0].clone())],
    ));
    let mut config = fixture.config(true);
    let missing = fixture.remote.with_file_name("missing.git");
    config.git.remote = Some(missing.display().to_string());

    let err = PatchPipeline::new(&config, archive.clone(), archive)
        .run(&submission())
        .await
        .unwrap_err();

    assert!(matches!(err, AttemptError::Push { .. }), "unexpected error: {err:?}");
    assert!(!fixture.remote_has_branch());
    // The branch is still built locally.
    assert_eq!(
        fixture.commits_on_branch(),
        vec!["Jane Doe|Shout two", "Patch Bot|[CF 52/4101] Improve a.txt"]
    );
    let log = std::fs::read_to_string(fixture.patches.join("52/4101/patch.log")).unwrap();
    assert!(log.contains("=== Failed (push)"));
}

#[tokio::test]
async fn test_tarball_mixed_with_patch_is_rejected_before_fetching() {
    let fixture = Fixture::new();
    let archive = Arc::new(FakeArchive::with_patches(
        "v1@mail",
        &[("v1.tar.gz", b"x".to_vec()), ("0001-a.patch", b"y".to_vec())],
    ));

    let err = pipeline(&fixture, archive.clone(), false)
        .run(&submission())
        .await
        .unwrap_err();

    assert_eq!(err, AttemptError::AmbiguousAttachments { count: 2 });
    assert!(archive.fetched().is_empty());
}

#[tokio::test]
async fn test_missing_thread() {
    let fixture = Fixture::new();
    let archive = Arc::new(FakeArchive::default());

    let err = pipeline(&fixture, archive, false)
        .run(&submission())
        .await
        .unwrap_err();

    assert_eq!(err, AttemptError::NoThread);
}
