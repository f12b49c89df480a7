//! Tests for remote identifier handling and the bundled fetchers.

use hbscope::scope::{
    DirectoryFetcher, FetchError, InMemoryFetcher, NoRemoteFetcher, RemoteFetcher,
    is_remote_reference, normalize_identifier,
};
use tempfile::TempDir;

#[test]
fn test_remote_reference_shapes() {
    for name in ["zoo:lion", "urn:isbn:0451450523", "https://example.org/t/card", "<urn:x>"] {
        assert!(is_remote_reference(name), "{name} should be remote");
    }
    for name in ["lion", "header-main", "@partial-block", ":lion", "<>", "<a b>", "x: y"] {
        assert!(!is_remote_reference(name), "{name} should not be remote");
    }
    assert_eq!(normalize_identifier("<https://example.org/t>"), "https://example.org/t");
}

#[tokio::test]
async fn test_directory_fetcher_reads_files() {
    let temp = TempDir::new().unwrap();
    std::fs::create_dir_all(temp.path().join("zoo/big")).unwrap();
    std::fs::write(temp.path().join("zoo/big/lion.hbs"), "lion!").unwrap();
    std::fs::create_dir_all(temp.path().join("https/example.org")).unwrap();
    std::fs::write(temp.path().join("https/example.org/card.hbs"), "card").unwrap();

    let fetcher = DirectoryFetcher::new(temp.path());
    assert_eq!(fetcher.root(), temp.path());
    assert_eq!(fetcher.fetch("zoo:big/lion").await.unwrap(), "lion!");
    assert_eq!(fetcher.fetch("https://example.org/card").await.unwrap(), "card");

    let err = fetcher.fetch("zoo:tiger").await.unwrap_err();
    assert!(matches!(err, FetchError::NotFound { ref identifier } if identifier == "zoo:tiger"));
}

#[tokio::test]
async fn test_directory_fetcher_custom_extension() {
    let temp = TempDir::new().unwrap();
    std::fs::create_dir_all(temp.path().join("mail")).unwrap();
    std::fs::write(temp.path().join("mail/footer.mustache"), "bye").unwrap();

    let fetcher = DirectoryFetcher::new(temp.path()).with_extension("mustache");
    assert_eq!(fetcher.fetch("mail:footer").await.unwrap(), "bye");
}

#[tokio::test]
async fn test_directory_fetcher_stays_below_root() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("root");
    std::fs::create_dir_all(&root).unwrap();
    std::fs::write(temp.path().join("secret.hbs"), "secret").unwrap();

    let fetcher = DirectoryFetcher::new(&root);
    for identifier in ["x:../secret", "x:a/../../secret"] {
        let err = fetcher.fetch(identifier).await.unwrap_err();
        assert!(
            matches!(err, FetchError::InvalidIdentifier { .. }),
            "{identifier} escaped the root: {err}"
        );
    }
}

#[tokio::test]
async fn test_in_memory_fetcher_from_iterator() {
    let fetcher: InMemoryFetcher = [("a:one", "1"), ("a:two", "2")].into_iter().collect();
    assert_eq!(fetcher.fetch("a:two").await.unwrap(), "2");

    let mut fetcher = fetcher;
    fetcher.insert("a:two", "two");
    assert_eq!(fetcher.fetch("a:two").await.unwrap(), "two");
}

#[tokio::test]
async fn test_disabled_fetcher_names_identifier() {
    let err = NoRemoteFetcher.fetch("a:one").await.unwrap_err();
    assert_eq!(err.identifier(), "a:one");
    assert!(err.to_string().contains("disabled"));
}
