use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use getfile::client::{self, ClientConfig};
use getfile::proto::Status;
use getfile::server::{self, ServerConfig, ServerHandle};

fn files_under(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            files.extend(files_under(&path));
        } else {
            files.push(path);
        }
    }
    files
}

/// Write `files` and a content map for them under `dir`, then start a server on it.
fn start_server(dir: &Path, files: &[(&str, &[u8])], workers: usize) -> ServerHandle<server::ContentMap> {
    let mut map = String::new();
    for (i, (key, content)) in files.iter().enumerate() {
        let name = format!("file-{i}");
        fs::write(dir.join(&name), content).unwrap();
        map.push_str(&format!("{key} {name}\n"));
    }
    fs::write(dir.join("content.txt"), map).unwrap();

    let config = ServerConfig {
        address: Ipv4Addr::LOCALHOST.into(),
        port: 0,
        workers: workers.try_into().unwrap(),
        content_map: dir.join("content.txt"),
    };

    server::start(&config).unwrap()
}

fn client_config(server: &ServerHandle<server::ContentMap>, dir: &Path, workload: &[&str], workers: usize, requests: usize) -> ClientConfig {
    fs::write(dir.join("workload.txt"), workload.join("\n")).unwrap();

    ClientConfig {
        server: url::Host::Ipv4(Ipv4Addr::LOCALHOST),
        port: server.local_addr().port(),
        workers: workers.try_into().unwrap(),
        requests_per_worker: requests.try_into().unwrap(),
        workload: dir.join("workload.txt"),
        output_dir: dir.join("downloads"),
    }
}

#[test]
fn test_workload_with_missing_entry() {
    let a = b"The quick brown fox jumps over the lazy dog.\n".repeat(300);
    let b: Vec<u8> = (0..50_000u32).map(|i| (i % 256) as u8).collect();

    let content = tempfile::tempdir().unwrap();
    let server = start_server(content.path(), &[("/a.txt", &a), ("/b.bin", &b)], 4);

    let work = tempfile::tempdir().unwrap();
    let config = client_config(&server, work.path(), &["/a.txt", "/b.bin", "/missing"], 2, 3);

    let outcomes = client::run(&config).unwrap();
    server.shutdown().unwrap();

    assert_eq!(outcomes.len(), 6);
    assert_eq!(outcomes.iter().filter(|outcome| outcome.is_success()).count(), 4);

    for outcome in &outcomes {
        match outcome.request_path.as_str() {
            "/a.txt" | "/b.bin" => {
                let expected = if outcome.request_path == "/a.txt" { &a } else { &b };
                let local = outcome.local_path.as_ref().unwrap();
                assert_eq!(outcome.bytes_received, expected.len() as u64);
                assert_eq!(outcome.file_len, expected.len() as u64);
                assert_eq!(&fs::read(local).unwrap(), expected);
            }
            "/missing" => {
                assert_eq!(outcome.status, Status::FileNotFound);
                assert!(outcome.local_path.is_none());
            }
            path => panic!("unexpected path {path}"),
        }
    }

    let stored = files_under(&config.output_dir);
    let named = |prefix: &str| stored.iter().filter(|path| path.file_name().unwrap().to_str().unwrap().starts_with(prefix)).count();

    assert_eq!(stored.len(), 4);
    assert_eq!(named("a.txt-"), 2);
    assert_eq!(named("b.bin-"), 2);
    assert_eq!(named("missing-"), 0);

    let total: u64 = stored.iter().map(|path| fs::metadata(path).unwrap().len()).sum();
    assert_eq!(total, 2 * (a.len() + b.len()) as u64);
}

#[test]
fn test_empty_file_and_nested_paths() {
    let content = tempfile::tempdir().unwrap();
    let server = start_server(content.path(), &[("/empty", b""), ("/deep/er/file.txt", b"nested")], 2);

    let work = tempfile::tempdir().unwrap();
    let config = client_config(&server, work.path(), &["/empty", "/deep/er/file.txt"], 1, 2);

    let outcomes = client::run(&config).unwrap();
    server.shutdown().unwrap();

    assert!(outcomes.iter().all(|outcome| outcome.is_success()));

    let empty = outcomes.iter().find(|outcome| outcome.request_path == "/empty").unwrap();
    assert_eq!(empty.file_len, 0);
    assert_eq!(fs::metadata(empty.local_path.as_ref().unwrap()).unwrap().len(), 0);

    let nested = outcomes.iter().find(|outcome| outcome.request_path == "/deep/er/file.txt").unwrap();
    let local = nested.local_path.as_ref().unwrap();
    assert!(local.starts_with(config.output_dir.join("deep/er")));
    assert_eq!(fs::read(local).unwrap(), b"nested");
}

#[test]
fn test_many_clients_few_server_workers() {
    let file: Vec<u8> = (0..20_000u32).map(|i| (i * 7 % 256) as u8).collect();

    let content = tempfile::tempdir().unwrap();
    let server = start_server(content.path(), &[("/f", &file)], 2);

    let work = tempfile::tempdir().unwrap();
    let config = client_config(&server, work.path(), &["/f"], 8, 10);

    let outcomes = client::run(&config).unwrap();
    let served = server.shutdown().unwrap();

    assert_eq!(served, 80);
    assert_eq!(outcomes.len(), 80);
    assert!(outcomes.iter().all(|outcome| outcome.is_success() && outcome.bytes_received == file.len() as u64));
    assert_eq!(files_under(&config.output_dir).len(), 80);
}

#[test]
fn test_unreadable_workload_is_fatal() {
    let work = tempfile::tempdir().unwrap();
    let config = ClientConfig {
        workload: work.path().join("nope.txt"),
        output_dir: work.path().to_path_buf(),
        ..Default::default()
    };

    assert!(matches!(client::run(&config), Err(client::Error::Workload { .. })));
}
