//! API tests against a running server on an ephemeral port.

mod common;

use common::{commit_files, lfs_pointer, spawn_server};
use sha2::{Digest, Sha256};

#[tokio::test]
async fn test_repository_crud() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();

    // Create.
    let resp = client
        .post(format!("{}/api/repositories/a/b.git", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    // Create again conflicts.
    let resp = client
        .post(format!("{}/api/repositories/a/b.git", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);

    // Metadata.
    let resp = client
        .get(format!("{}/api/repositories/a/b.git", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let info: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(info["name"], "a/b.git");
    assert_eq!(info["default_branch"], "main");
    assert_eq!(info["is_mirror"], false);

    // Listing walks nested directories.
    let resp = client
        .get(format!("{}/api/repositories", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let repos: Vec<serde_json::Value> = resp.json().await.unwrap();
    assert_eq!(repos.len(), 1);
    assert_eq!(repos[0]["name"], "a/b");

    // Delete.
    let resp = client
        .delete(format!("{}/api/repositories/a/b.git", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    let resp = client
        .get(format!("{}/api/repositories/a/b.git", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_path_traversal_is_rejected() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();

    for url in [
        format!("{}/api/repositories/..%2f..%2fetc%2fpasswd", server.base),
        format!("{}/api/repositories/..%2fescape.git", server.base),
    ] {
        let resp = client.get(&url).send().await.unwrap();
        assert_eq!(resp.status(), 400, "expected 400 for {url}");
    }

    // Creation through a traversal name never touches the filesystem.
    let resp = client
        .post(format!(
            "{}/api/repositories/..%2foutside.git",
            server.base
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    assert!(!server.root.parent().unwrap().join("outside.git").exists());
}

#[tokio::test]
async fn test_model_info() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();

    // Unknown repository.
    let resp = client
        .get(format!("{}/api/models/nonexistent/repo", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    client
        .post(format!("{}/api/repositories/org/model.git", server.base))
        .send()
        .await
        .unwrap();

    // Empty repository: no sha, empty siblings, but not an error.
    let resp = client
        .get(format!("{}/api/models/org/model", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let info: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(info["id"], "org/model");
    assert_eq!(info["modelId"], "org/model");
    assert_eq!(info["defaultBranch"], "main");
    assert_eq!(info["siblings"].as_array().unwrap().len(), 0);
    assert_eq!(info["private"], false);
    assert_eq!(info["downloads"], 0);

    // With a commit: siblings list top-level files only.
    let sha = commit_files(
        &server.root.join("org/model.git"),
        "main",
        &[("README.md", b"# model"), ("sub/nested.txt", b"x")],
        "initial",
    );
    let resp = client
        .get(format!("{}/api/models/org/model", server.base))
        .send()
        .await
        .unwrap();
    let info: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(info["sha"], sha);
    let siblings: Vec<String> = info["siblings"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["rfilename"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(siblings, vec!["README.md".to_string()]);

    // Revision-pinned variant.
    let resp = client
        .get(format!(
            "{}/api/models/org/model/revision/{sha}",
            server.base
        ))
        .send()
        .await
        .unwrap();
    let info: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(info["sha"], sha);
}

#[tokio::test]
async fn test_hub_tree() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();

    client
        .post(format!("{}/api/repositories/t.git", server.base))
        .send()
        .await
        .unwrap();
    commit_files(
        &server.root.join("t.git"),
        "main",
        &[("dir/inner.txt", b"inner"), ("top.txt", b"top")],
        "initial",
    );

    let resp = client
        .get(format!("{}/api/models/t/tree/main", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let entries: Vec<serde_json::Value> = resp.json().await.unwrap();
    assert_eq!(entries.len(), 2);

    // Subdirectory listing with the ambiguous ref/path URL.
    let resp = client
        .get(format!("{}/api/models/t/tree/main/dir", server.base))
        .send()
        .await
        .unwrap();
    let entries: Vec<serde_json::Value> = resp.json().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["path"], "dir/inner.txt");
    assert_eq!(entries[0]["type"], "file");
    assert_eq!(entries[0]["size"], 5);

    // Recursive mode lists children before their directory.
    let resp = client
        .get(format!(
            "{}/api/models/t/tree/main?recursive=true",
            server.base
        ))
        .send()
        .await
        .unwrap();
    let entries: Vec<serde_json::Value> = resp.json().await.unwrap();
    let paths: Vec<&str> = entries.iter().map(|e| e["path"].as_str().unwrap()).collect();
    assert_eq!(paths, vec!["dir/inner.txt", "dir", "top.txt"]);

    // Expand attaches the tip commit.
    let resp = client
        .get(format!(
            "{}/api/models/t/tree/main?expand=true",
            server.base
        ))
        .send()
        .await
        .unwrap();
    let entries: Vec<serde_json::Value> = resp.json().await.unwrap();
    assert!(entries[0]["lastCommit"]["id"].is_string());
}

#[tokio::test]
async fn test_resolve_regular_file() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();

    client
        .post(format!("{}/api/repositories/files.git", server.base))
        .send()
        .await
        .unwrap();
    let sha = commit_files(
        &server.root.join("files.git"),
        "main",
        &[("docs/readme.md", b"file body")],
        "initial",
    );

    let url = format!("{}/files/resolve/main/docs/readme.md", server.base);
    let resp = client.get(&url).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["x-repo-commit"], sha.as_str());
    assert!(resp.headers()["etag"].to_str().unwrap().starts_with('"'));
    assert_eq!(resp.headers()["content-length"], "9");
    assert!(resp.headers().contains_key("last-modified"));
    assert_eq!(resp.bytes().await.unwrap().as_ref(), b"file body");

    // HEAD: headers only.
    let resp = client.head(&url).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["x-repo-commit"], sha.as_str());
    assert_eq!(resp.bytes().await.unwrap().len(), 0);

    // Missing file.
    let resp = client
        .get(format!("{}/files/resolve/main/missing.md", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_resolve_lfs_from_content_store() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();

    // Back the pointer with 10240 bytes of deterministic content.
    let content: Vec<u8> = (0..10240u32).map(|i| (i % 256) as u8).collect();
    let oid = hex::encode(Sha256::digest(&content));
    server
        .state
        .content
        .put(&oid, &mut content.as_slice())
        .await
        .unwrap();

    client
        .post(format!("{}/api/repositories/lfs.git", server.base))
        .send()
        .await
        .unwrap();
    let pointer = lfs_pointer(&oid, content.len() as u64);
    let sha = commit_files(
        &server.root.join("lfs.git"),
        "main",
        &[("model.bin", pointer.as_bytes()), (".gitattributes", b"*.bin filter=lfs diff=lfs merge=lfs -text\n")],
        "add model",
    );

    let url = format!("{}/lfs/resolve/main/model.bin", server.base);
    let resp = client.get(&url).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["x-repo-commit"], sha.as_str());
    assert_eq!(
        resp.headers()["etag"].to_str().unwrap(),
        format!("\"{oid}\"")
    );
    assert_eq!(resp.headers()["content-length"], "10240");
    assert_eq!(resp.bytes().await.unwrap().as_ref(), content.as_slice());

    // HEAD keeps the headers and drops the body.
    let resp = client.head(&url).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers()["etag"].to_str().unwrap(),
        format!("\"{oid}\"")
    );
    assert_eq!(resp.bytes().await.unwrap().len(), 0);

    // A pointer whose object is absent is a 404.
    let ghost_oid = hex::encode(Sha256::digest(b"never stored"));
    let ghost = lfs_pointer(&ghost_oid, 12);
    commit_files(
        &server.root.join("lfs.git"),
        "main",
        &[("model.bin", pointer.as_bytes()), ("ghost.bin", ghost.as_bytes())],
        "add ghost",
    );
    let resp = client
        .get(format!("{}/lfs/resolve/main/ghost.bin", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_resolve_lfs_with_signer() {
    struct FakeSigner;
    impl hubd_lfs::SignedUrlStore for FakeSigner {
        fn sign_get(&self, oid: &str) -> hubd_lfs::Result<String> {
            Ok(format!("https://signer.example/{oid}?sig=abc"))
        }
    }

    let tmp = tempfile::TempDir::new().unwrap();
    let state = hubd::AppState::new(&tmp.path().join("data"))
        .unwrap()
        .with_signer(std::sync::Arc::new(FakeSigner));
    let server = common::spawn_with_state(state, tmp).await;

    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();

    client
        .post(format!("{}/api/repositories/signed.git", server.base))
        .send()
        .await
        .unwrap();
    let content = b"signed object";
    let oid = hex::encode(Sha256::digest(content));
    let pointer = lfs_pointer(&oid, content.len() as u64);
    let sha = commit_files(
        &server.root.join("signed.git"),
        "main",
        &[("big.bin", pointer.as_bytes())],
        "add big",
    );

    let resp = client
        .get(format!("{}/signed/resolve/main/big.bin", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 307);
    assert_eq!(
        resp.headers()["location"].to_str().unwrap(),
        format!("https://signer.example/{oid}?sig=abc")
    );
    assert_eq!(resp.headers()["x-repo-commit"], sha.as_str());
    assert_eq!(
        resp.headers()["etag"].to_str().unwrap(),
        format!("\"{oid}\"")
    );
}

#[tokio::test]
async fn test_lock_lifecycle() {
    let server = spawn_server().await;
    let alice = reqwest::Client::new();

    alice
        .post(format!("{}/api/repositories/locked.git", server.base))
        .send()
        .await
        .unwrap();

    // Alice locks a path.
    let resp = alice
        .post(format!("{}/locked.git/locks", server.base))
        .basic_auth("alice", Some("pw"))
        .json(&serde_json::json!({"path": "data/file.bin"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    assert_eq!(
        resp.headers()["content-type"],
        "application/vnd.git-lfs+json"
    );
    let created: serde_json::Value = resp.json().await.unwrap();
    let lock_id = created["lock"]["id"].as_str().unwrap().to_string();
    assert_eq!(created["lock"]["path"], "data/file.bin");
    assert_eq!(created["lock"]["owner"]["name"], "alice");

    // Locking the same path again conflicts.
    let resp = alice
        .post(format!("{}/locked.git/locks", server.base))
        .basic_auth("bob", Some("pw"))
        .json(&serde_json::json!({"path": "data/file.bin"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);

    // Listing, filtered by path.
    let resp = alice
        .get(format!(
            "{}/locked.git/locks?path=data%2Ffile.bin",
            server.base
        ))
        .send()
        .await
        .unwrap();
    let list: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(list["locks"].as_array().unwrap().len(), 1);

    // Bob's verify call sees the lock under "theirs".
    let resp = alice
        .post(format!("{}/locked.git/locks/verify", server.base))
        .basic_auth("bob", Some("pw"))
        .json(&serde_json::json!({}))
        .send()
        .await
        .unwrap();
    let verify: serde_json::Value = resp.json().await.unwrap();
    assert!(verify["ours"].as_array().unwrap().is_empty());
    assert_eq!(verify["theirs"].as_array().unwrap().len(), 1);

    // Bob may not unlock without force.
    let resp = alice
        .post(format!(
            "{}/locked.git/locks/{lock_id}/unlock",
            server.base
        ))
        .basic_auth("bob", Some("pw"))
        .json(&serde_json::json!({"force": false}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
    let denied: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(denied["message"], "attempt to delete other user's lock");

    // Alice unlocks.
    let resp = alice
        .post(format!(
            "{}/locked.git/locks/{lock_id}/unlock",
            server.base
        ))
        .basic_auth("alice", Some("pw"))
        .json(&serde_json::json!({"force": false}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let released: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(released["lock"]["id"], lock_id.as_str());

    // Second unlock finds nothing.
    let resp = alice
        .post(format!(
            "{}/locked.git/locks/{lock_id}/unlock",
            server.base
        ))
        .basic_auth("alice", Some("pw"))
        .json(&serde_json::json!({"force": false}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_import_validation() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();

    // Malformed body.
    let resp = client
        .post(format!("{}/api/repositories/m.git/import", server.base))
        .body("not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // Missing source_url.
    let resp = client
        .post(format!("{}/api/repositories/m.git/import", server.base))
        .json(&serde_json::json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // Importing over an existing repository conflicts.
    client
        .post(format!("{}/api/repositories/exists.git", server.base))
        .send()
        .await
        .unwrap();
    let resp = client
        .post(format!(
            "{}/api/repositories/exists.git/import",
            server.base
        ))
        .json(&serde_json::json!({"source_url": "https://remote/x.git"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);

    // No tasks yet.
    let resp = client
        .get(format!(
            "{}/api/repositories/m.git/import/status",
            server.base
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    // Sync of a plain repository is not allowed.
    let resp = client
        .post(format!("{}/api/repositories/exists.git/sync", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_transport_service_validation() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();

    client
        .post(format!("{}/api/repositories/svc.git", server.base))
        .send()
        .await
        .unwrap();

    let resp = client
        .get(format!("{}/svc.git/info/refs", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .get(format!(
            "{}/svc.git/info/refs?service=git-frobnicate",
            server.base
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let resp = client
        .get(format!(
            "{}/missing.git/info/refs?service=git-upload-pack",
            server.base
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_push_to_mirror_is_refused() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();

    client
        .post(format!("{}/api/repositories/mir.git", server.base))
        .send()
        .await
        .unwrap();

    // Flag the repository as a mirror.
    {
        let repo = git2::Repository::open(server.root.join("mir.git")).unwrap();
        let mut config = repo.config().unwrap();
        config.set_str("remote.origin.url", "https://remote/x.git").unwrap();
        config.set_bool("remote.origin.mirror", true).unwrap();
    }

    // Both phases refuse the push.
    let resp = client
        .get(format!(
            "{}/mir.git/info/refs?service=git-receive-pack",
            server.base
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
    assert!(resp.text().await.unwrap().contains("push to mirror"));

    let resp = client
        .post(format!("{}/mir.git/git-receive-pack", server.base))
        .body("0000")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    // Mirror info reflects the configuration.
    let resp = client
        .get(format!("{}/api/repositories/mir.git/mirror", server.base))
        .send()
        .await
        .unwrap();
    let info: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(info["is_mirror"], true);
    assert_eq!(info["source_url"], "https://remote/x.git");
}
