use super::*;
use std::fs as std_fs;
use tempfile::TempDir;

fn log_dir() -> TempDir {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let root = temp_dir.path();
    std_fs::write(
        root.join("app.log"),
        "2024-05-01 10:00:01 ERROR OrderService - java.lang.IllegalStateException: stock below zero\n",
    )
    .expect("should write log");
    std_fs::write(root.join("access.LOG"), "GET /orders 500\n").expect("should write log");
    std_fs::write(root.join("notes.txt"), "not a log").expect("should write txt");
    std_fs::write(root.join(".hidden.log"), "skip me").expect("should write hidden");
    std_fs::create_dir(root.join("archive")).expect("should create subdir");
    std_fs::write(root.join("archive").join("old.log"), "old entry").expect("should write log");
    temp_dir
}

#[tokio::test]
async fn loads_matching_files_only() {
    let temp_dir = log_dir();
    let loader = DirectoryLoader::new(temp_dir.path(), vec![".log".to_string()]);

    let documents = loader.load_data().await.expect("load should succeed");
    let paths: Vec<&str> = documents
        .iter()
        .map(|d| d.metadata.file_path.as_str())
        .collect();

    assert_eq!(paths, vec!["access.LOG", "app.log"]);
    assert!(documents[1].text.contains("IllegalStateException"));
    assert_eq!(documents[1].metadata.extension, ".log");
    assert!(matches!(
        documents[0].metadata.source,
        DocumentSource::Directory { .. }
    ));
}

#[tokio::test]
async fn recursive_walk_includes_subdirectories() {
    let temp_dir = log_dir();
    let loader =
        DirectoryLoader::new(temp_dir.path(), vec![".log".to_string()]).recursive(true);

    let documents = loader.load_data().await.expect("load should succeed");
    assert!(
        documents
            .iter()
            .any(|d| d.metadata.file_path == "archive/old.log")
    );
    assert_eq!(documents.len(), 3);
}

#[tokio::test]
async fn missing_directory_is_an_error() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let loader = DirectoryLoader::new(temp_dir.path().join("nope"), vec![".log".to_string()]);
    assert!(loader.load_data().await.is_err());
}

#[tokio::test]
async fn directory_without_matches_is_an_error() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    std_fs::write(temp_dir.path().join("readme.md"), "# hi").expect("should write file");

    let loader = DirectoryLoader::new(temp_dir.path(), vec![".log".to_string()]);
    let err = loader.load_data().await.expect_err("should fail without logs");
    assert!(err.to_string().contains("No files"));
}
