//! Exercises the HTTP client's Range-chunked download against a local
//! server, covering both a Range-honouring origin and one that ignores
//! Range headers entirely.

use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tubeloader::net::HttpClient;
use tubeloader::utils::Settings;

/// Serve `data` on a local port. `honour_range` controls whether Range
/// requests get 206 slices or the whole body with 200.
async fn spawn_server(data: Vec<u8>, honour_range: bool) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let data = data.clone();
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut byte = [0u8; 1];
                // Read request head only; GET carries no body
                while !buf.ends_with(b"\r\n\r\n") {
                    match socket.read(&mut byte).await {
                        Ok(0) | Err(_) => return,
                        Ok(_) => buf.push(byte[0]),
                    }
                }
                let head = String::from_utf8_lossy(&buf);

                let range = head
                    .lines()
                    .find(|l| l.to_ascii_lowercase().starts_with("range:"))
                    .and_then(|l| l.split('=').nth(1))
                    .and_then(|spec| {
                        let (start, end) = spec.trim().split_once('-')?;
                        let start: usize = start.parse().ok()?;
                        let end: usize = end.parse().ok()?;
                        Some((start, end.min(data.len().saturating_sub(1))))
                    });

                let response = match range {
                    Some((start, end)) if honour_range && start < data.len() => {
                        let body = &data[start..=end];
                        let mut r = format!(
                            "HTTP/1.1 206 Partial Content\r\n\
                             Content-Range: bytes {}-{}/{}\r\n\
                             Content-Length: {}\r\n\
                             Connection: close\r\n\r\n",
                            start,
                            end,
                            data.len(),
                            body.len()
                        )
                        .into_bytes();
                        r.extend_from_slice(body);
                        r
                    }
                    _ => {
                        let mut r = format!(
                            "HTTP/1.1 200 OK\r\n\
                             Content-Length: {}\r\n\
                             Connection: close\r\n\r\n",
                            data.len()
                        )
                        .into_bytes();
                        r.extend_from_slice(&data);
                        r
                    }
                };
                let _ = socket.write_all(&response).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    format!("http://{}/file.bin", addr)
}

fn small_chunk_settings() -> Settings {
    Settings {
        chunk_size: 1024,
        ..Default::default()
    }
}

#[tokio::test]
async fn download_is_range_chunked() {
    let data: Vec<u8> = (0..3000u32).map(|i| (i % 251) as u8).collect();
    let url = spawn_server(data.clone(), true).await;

    let client = HttpClient::new(&small_chunk_settings()).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.bin");

    let observed = std::sync::Mutex::new((0u64, 0u64));
    let progress = |done: u64, total: u64| {
        *observed.lock().unwrap() = (done, total);
    };

    let written = client
        .download_file(&url, &path, Some(&progress), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(written, data.len() as u64);
    assert_eq!(std::fs::read(&path).unwrap(), data);
    assert_eq!(
        *observed.lock().unwrap(),
        (data.len() as u64, data.len() as u64)
    );
}

#[tokio::test]
async fn download_survives_server_without_range_support() {
    let data: Vec<u8> = (0..5000u32).map(|i| (i % 13) as u8).collect();
    let url = spawn_server(data.clone(), false).await;

    let client = HttpClient::new(&small_chunk_settings()).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("flat.bin");

    let written = client
        .download_file(&url, &path, None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(written, data.len() as u64);
    assert_eq!(std::fs::read(&path).unwrap(), data);
}

#[tokio::test]
async fn cancelled_download_stops() {
    let data = vec![7u8; 2000];
    let url = spawn_server(data, true).await;

    let client = HttpClient::new(&small_chunk_settings()).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("never.bin");

    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = client.download_file(&url, &path, None, &cancel).await;
    assert!(matches!(result, Err(tubeloader::Error::Cancelled)));
}

#[tokio::test]
async fn get_returns_status_and_body() {
    let url = spawn_server(b"hello body".to_vec(), false).await;
    let client = HttpClient::new(&Settings::default()).unwrap();

    let response = client
        .get(&url, &[("User-Agent", "test")], &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(response.status, 200);
    assert!(response.is_success());
    assert_eq!(response.body, "hello body");
    assert_eq!(
        response.headers.get("content-length").map(String::as_str),
        Some("10")
    );
}

#[tokio::test]
async fn engine_downloads_single_format_with_template() {
    use tubeloader::downloader::DownloadEngine;
    use tubeloader::extractor::{VideoFormat, VideoInfo};

    let data: Vec<u8> = (0..4096u32).map(|i| (i % 200) as u8).collect();
    let url = spawn_server(data.clone(), true).await;

    let info = VideoInfo {
        id: "aBcDeFgHiJk".into(),
        title: "A: Title?".into(),
        formats: vec![VideoFormat {
            itag: 18,
            url,
            ext: "mp4".into(),
            vcodec: "avc1".into(),
            acodec: "mp4a".into(),
            width: 640,
            height: 360,
            content_length: data.len() as u64,
            ..Default::default()
        }],
        ..Default::default()
    };

    let client = std::sync::Arc::new(HttpClient::new(&small_chunk_settings()).unwrap());
    let engine = DownloadEngine::new(client);
    let dir = tempfile::tempdir().unwrap();

    let output = engine
        .download(
            &info,
            "18",
            None,
            Some("%(id)s-%(title)s.%(ext)s"),
            dir.path(),
            None,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    // Unsafe filename characters from the title were replaced
    assert_eq!(
        output.file_name().unwrap().to_str().unwrap(),
        "aBcDeFgHiJk-A_ Title_.mp4"
    );
    assert_eq!(std::fs::read(&output).unwrap(), data);
}

#[tokio::test]
async fn missing_server_is_a_request_error() {
    let settings = Settings {
        retry_attempts: 0,
        ..Default::default()
    };
    let client = HttpClient::new(&settings).unwrap();
    let path = Path::new("/tmp/na.bin");
    let result = client
        .download_file(
            "http://127.0.0.1:9/na.bin",
            path,
            None,
            &CancellationToken::new(),
        )
        .await;
    assert!(result.is_err());
}
